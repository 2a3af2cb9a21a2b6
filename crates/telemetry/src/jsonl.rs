use anyhow::Context;
use anyhow::Result;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Appends one record as a single JSON line. The file is opened in
/// append mode per call; a run writes from exactly one task, so no
/// interleaving can occur.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    let line = serde_json::to_string(record).context("serialize jsonl record")?;
    writeln!(file, "{}", line).with_context(|| format!("append {}", path.display()))?;
    Ok(())
}

/// Reads every well-formed JSON object from a JSONL file. Missing files
/// read as empty; malformed lines are skipped.
pub fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .filter(|value: &serde_json::Value| value.is_object())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append_jsonl(&path, &json!({"seq": 0})).unwrap();
        append_jsonl(&path, &json!({"seq": 1})).unwrap();
        let records = read_jsonl(&path);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["seq"], 1);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_jsonl(&dir.path().join("nope.jsonl")).is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{\"ok\":1}\nnot json\n42\n").unwrap();
        let records = read_jsonl(&path);
        assert_eq!(records.len(), 1);
    }
}
