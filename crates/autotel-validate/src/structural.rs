use serde_yaml::Value;

use crate::error::ValidateError;

/// Parse candidate bytes as the collector's declarative YAML format.
/// Syntactic errors are rejected with their location.
pub fn parse(config_bytes: &[u8]) -> Result<Value, ValidateError> {
    let text = std::str::from_utf8(config_bytes).map_err(|e| ValidateError::Structural {
        line: 0,
        column: 0,
        message: format!("not valid UTF-8: {}", e),
    })?;

    serde_yaml::from_str(text).map_err(|e| {
        let location = e.location();
        ValidateError::Structural {
            line: location.as_ref().map(|l| l.line()).unwrap_or(0),
            column: location.as_ref().map(|l| l.column()).unwrap_or(0),
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_yaml_parses() {
        let value = parse(b"receivers:\n  hostmetrics: {}\n").unwrap();
        assert!(value.get("receivers").is_some());
    }

    #[test]
    fn syntax_error_carries_location() {
        let err = parse(b"receivers:\n  bad: [unclosed\n").unwrap_err();
        match err {
            ValidateError::Structural { line, .. } => assert!(line > 0),
            other => panic!("expected structural error, got {other}"),
        }
    }
}
