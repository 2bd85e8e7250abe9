use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serialize `value` as one JSON document followed by a newline
fn write_json<T: Serialize, W: Write>(value: &T, compact: bool, mut writer: W) -> Result<(), String> {
    let serialized = if compact {
        serde_json::to_writer(&mut writer, value)
    } else {
        serde_json::to_writer_pretty(&mut writer, value)
    };
    serialized.map_err(|e| format!("JSON serialization failed: {}", e))?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| format!("Failed to write JSON: {}", e))
}

/// Write a report to `output_path`, or to stdout when no path is given.
///
/// Missing parent directories of the output file are created.
pub fn emit<T: Serialize>(value: &T, compact: bool, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => {
            let path = Path::new(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    format!("Failed to create directory '{}': {}", parent.display(), e)
                })?;
            }
            let file = std::fs::File::create(path).map_err(|e| {
                format!("Failed to write output file '{}': {}", path.display(), e)
            })?;
            write_json(value, compact, std::io::BufWriter::new(file))
        }
        None => write_json(value, compact, std::io::stdout().lock()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmr_rs::{ScoringResult, Stage};

    #[test]
    fn test_compact_json_is_single_line() {
        let mut out = Vec::new();
        write_json(&ScoringResult::new(Stage::Rem, 4.5), true, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.ends_with('\n'));
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["confidence"], 4.5);
    }

    #[test]
    fn test_emit_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reports").join("config.json");

        emit(&tmr_rs::SessionConfig::default(), false, path.to_str()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["loop"]["buffer_ms"], 100);
    }
}
