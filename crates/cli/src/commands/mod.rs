//! Subcommand implementations

pub mod insights;
pub mod predict;
pub mod status;

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Read a JSON document from a file, or from stdin when the path is `-`
pub fn read_json_input(path: &Path) -> Result<Value> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };

    serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_json_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"distance_km": 120}"#).unwrap();
        let value = read_json_input(file.path()).unwrap();
        assert_eq!(value["distance_km"], 120);
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{").unwrap();
        let err = read_json_input(file.path()).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
