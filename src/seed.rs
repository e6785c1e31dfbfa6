//! Seed and lost-set files.
//!
//! Both are JSON arrays of job keys, so a lost set can be fed back to the
//! producer unchanged. Seed entries may also be arrays of strings, which
//! are joined with a tab into one key.

use crate::error::Result;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedEntry {
    Key(String),
    Parts(Vec<String>),
}

impl SeedEntry {
    fn into_key(self) -> String {
        match self {
            SeedEntry::Key(key) => key,
            SeedEntry::Parts(parts) => parts.join("\t"),
        }
    }
}

/// Parse seed JSON into job keys, in file order, duplicates kept.
pub fn parse_seed(json: &str) -> Result<Vec<String>> {
    let entries: Vec<SeedEntry> = serde_json::from_str(json)?;
    Ok(entries.into_iter().map(SeedEntry::into_key).collect())
}

/// Read and parse a seed file.
pub async fn load_seed(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_seed(&content)
}

/// Write a list of keys as a JSON array.
pub async fn write_keys(path: &Path, keys: &[String]) -> Result<()> {
    let json = serde_json::to_string_pretty(keys)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys() {
        let keys = parse_seed(r#"["10001", "BAD", "10001"]"#).unwrap();
        assert_eq!(keys, vec!["10001", "BAD", "10001"]);
    }

    #[test]
    fn pair_entries_join_with_tab() {
        let keys = parse_seed(r#"[["SW1A", "1AA"], "EC1A 1BB"]"#).unwrap();
        assert_eq!(keys, vec!["SW1A\t1AA", "EC1A 1BB"]);
    }

    #[test]
    fn rejects_non_key_entries() {
        assert!(parse_seed(r#"[1, 2]"#).is_err());
        assert!(parse_seed(r#"{"10001": null}"#).is_err());
    }
}
