//! JSONL dataset loading

use serde_json::Value;
use std::path::Path;

use super::Example;
use crate::error::{EvalError, EvalResult};

/// Read a JSONL dataset, one object per line.
///
/// Blank lines are skipped. `validate` runs on every record; the first
/// unparsable or invalid record fails the whole load with its line number.
pub fn read_jsonl<F>(path: impl AsRef<Path>, validate: F) -> EvalResult<Vec<Example>>
where
    F: Fn(&Example) -> Result<(), String>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| EvalError::dataset(path, format!("cannot read file: {}", e)))?;

    let mut examples = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;

        let example = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(obj)) => obj,
            Ok(other) => {
                return Err(EvalError::dataset(
                    path,
                    format!("line {}: expected an object, got {}", line_no, type_name(&other)),
                ))
            }
            Err(e) => {
                return Err(EvalError::dataset(path, format!("line {}: {}", line_no, e)));
            }
        };

        validate(&example)
            .map_err(|msg| EvalError::dataset(path, format!("line {}: {}", line_no, msg)))?;
        examples.push(example);
    }

    tracing::debug!("Loaded {} examples from {}", examples.len(), path.display());
    Ok(examples)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_lines(lines: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reads_records_and_skips_blank_lines() {
        let file = write_lines("{\"id\":\"a\"}\n\n   \n{\"id\":\"b\"}\n");
        let examples = read_jsonl(file.path(), |_| Ok(())).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1]["id"], "b");
    }

    #[test]
    fn test_malformed_line_fails_whole_load() {
        let file = write_lines("{\"id\":\"a\"}\n{not json\n{\"id\":\"c\"}\n");
        let err = read_jsonl(file.path(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, EvalError::Dataset { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_non_object_record() {
        let file = write_lines("[1, 2, 3]\n");
        let err = read_jsonl(file.path(), |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("expected an object, got an array"));
    }

    #[test]
    fn test_validation_failure_reports_line() {
        let file = write_lines("{\"id\":\"a\"}\n{\"id\":\"b\"}\n");
        let err = read_jsonl(file.path(), |ex| {
            if ex["id"] == "b" {
                Err("bad record".to_string())
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert!(err.to_string().contains("line 2: bad record"));
    }

    #[test]
    fn test_missing_file() {
        let err = read_jsonl("/definitely/not/here.jsonl", |_| Ok(())).unwrap_err();
        assert!(matches!(err, EvalError::Dataset { .. }));
    }
}
