//! Record file durability and offline reconciliation over real files.

mod common;

use common::*;
use geoq::error::Error;
use geoq::model::{JobResult, Outcome};
use geoq::reconcile::reconcile_files;
use geoq::record::{RecordWriter, read_record};
use std::io::Write;

#[tokio::test]
async fn reopening_appends_instead_of_truncating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.jsonl");

    let mut writer = RecordWriter::open(&path).await.unwrap();
    writer
        .append(&JobResult::new("A", Outcome::Found(viewport(1.0))))
        .await
        .unwrap();
    drop(writer);

    let mut writer = RecordWriter::open(&path).await.unwrap();
    writer
        .append(&JobResult::new("B", Outcome::Failed))
        .await
        .unwrap();

    let record = read_record(&path).await.unwrap();
    assert_eq!(record.len(), 2);
    assert_eq!(record[0].key, "A");
    assert_eq!(record[1], JobResult::new("B", Outcome::Failed));
}

#[tokio::test]
async fn torn_append_leaves_earlier_entries_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.jsonl");

    let mut writer = RecordWriter::open(&path).await.unwrap();
    writer
        .append(&JobResult::new("A", Outcome::Found(viewport(1.0))))
        .await
        .unwrap();
    writer
        .append(&JobResult::new("B", Outcome::Failed))
        .await
        .unwrap();
    drop(writer);

    // Crash halfway through writing the third line.
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"C": {"northeast": {"la"#).unwrap();
    drop(file);

    // Strict readers refuse the torn line rather than guess.
    match read_record(&path).await {
        Err(Error::MalformedRecord { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected MalformedRecord, got {other:?}"),
    }

    // Reopening for append cuts the tail back to the last full line.
    let mut writer = RecordWriter::open(&path).await.unwrap();
    let record = read_record(&path).await.unwrap();
    assert_eq!(record.len(), 2);

    writer
        .append(&JobResult::new("C", Outcome::Found(viewport(3.0))))
        .await
        .unwrap();
    let record = read_record(&path).await.unwrap();
    let keys: Vec<_> = record.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn torn_first_line_empties_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.jsonl");
    std::fs::write(&path, br#"{"A": nu"#).unwrap();

    let _writer = RecordWriter::open(&path).await.unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    assert!(read_record(&path).await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.jsonl");
    std::fs::write(&path, "{\"A\": null}\n\n{\"B\": null}\n").unwrap();
    assert_eq!(read_record(&path).await.unwrap().len(), 2);
}

#[tokio::test]
async fn reconcile_writes_lost_set_as_seed() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("sources.json");
    let record = dir.path().join("results.jsonl");
    let out = dir.path().join("lost.json");

    std::fs::write(&seed, r#"["A", "B", "C"]"#).unwrap();
    std::fs::write(
        &record,
        "{\"A\": {\"northeast\": {\"lat\": 1.0}}}\n{\"B\": null}\n",
    )
    .unwrap();

    let report = reconcile_files(&seed, &record, &out).await.unwrap();
    assert_eq!(report.lost, keys(&["B", "C"]));

    let lost = geoq::seed::load_seed(&out).await.unwrap();
    assert_eq!(lost, keys(&["B", "C"]));
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("sources.json");
    let record = dir.path().join("results.jsonl");
    let out = dir.path().join("lost.json");

    std::fs::write(&seed, r#"["A", "B", "C", "D"]"#).unwrap();
    std::fs::write(
        &record,
        "{\"A\": null}\n{\"A\": {\"lat\": 1.0}}\n{\"C\": null}\n{\"C\": null}\n",
    )
    .unwrap();

    let first = reconcile_files(&seed, &record, &out).await.unwrap();
    let first_out = std::fs::read_to_string(&out).unwrap();
    let second = reconcile_files(&seed, &record, &out).await.unwrap();
    let second_out = std::fs::read_to_string(&out).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_out, second_out);
    assert_eq!(first.lost, keys(&["B", "C", "D"]));
}

#[tokio::test]
async fn malformed_entry_aborts_reconciliation() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("sources.json");
    let record = dir.path().join("results.jsonl");
    let out = dir.path().join("lost.json");

    std::fs::write(&seed, r#"["A", "B"]"#).unwrap();
    std::fs::write(&record, "{\"A\": null}\n{\"A\": null, \"B\": null}\n").unwrap();

    let err = reconcile_files(&seed, &record, &out).await.unwrap_err();
    assert!(matches!(err, Error::MalformedRecord { line: 2, .. }));
    assert!(!out.exists(), "no lost set should be written on error");
}
