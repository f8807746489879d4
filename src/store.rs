use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::AppRecord;

pub fn record_path(out_dir: &Path, id: &str) -> PathBuf {
    out_dir.join(format!("{id}.json"))
}

/// Persist one record as pretty-printed JSON keyed by its id.
///
/// Overlapping partitions may hand the same id to two workers; both writes
/// target the same path and the last one wins.
pub fn write_record(out_dir: &Path, record: &AppRecord) -> anyhow::Result<()> {
    if record.id.contains(['/', '\\']) || record.id.contains("..") {
        anyhow::bail!("record id is not a safe file name: {}", record.id);
    }

    let path = record_path(out_dir, &record.id);
    let json = serde_json::to_vec_pretty(record).context("serialize app record")?;
    std::fs::write(&path, json)
        .with_context(|| format!("write app record: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> AppRecord {
        AppRecord {
            id: id.to_owned(),
            name: "Foo".to_owned(),
            stars: 4.5,
            category: "GAME".to_owned(),
            current_version: Some("1.2.3".to_owned()),
        }
    }

    #[test]
    fn writes_pascal_case_payload_named_by_id() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        write_record(dir.path(), &record("com.example.app"))?;

        let payload = std::fs::read_to_string(dir.path().join("com.example.app.json"))?;
        let value: serde_json::Value = serde_json::from_str(&payload)?;
        assert_eq!(value["Id"], "com.example.app");
        assert_eq!(value["Name"], "Foo");
        assert_eq!(value["Stars"], 4.5);
        assert_eq!(value["Category"], "GAME");
        assert_eq!(value["CurrentVersion"], "1.2.3");

        Ok(())
    }

    #[test]
    fn unset_version_is_omitted_from_the_payload() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut record = record("com.example.app");
        record.current_version = None;

        write_record(dir.path(), &record)?;

        let payload = std::fs::read_to_string(dir.path().join("com.example.app.json"))?;
        assert!(!payload.contains("CurrentVersion"));

        Ok(())
    }

    #[test]
    fn rejects_ids_that_escape_the_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");

        for id in ["../evil", "a/b", "a\\b"] {
            assert!(write_record(dir.path(), &record(id)).is_err(), "id={id}");
        }
    }
}
