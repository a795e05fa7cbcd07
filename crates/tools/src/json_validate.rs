use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct JsonValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Never fails: an invalid payload is a normal `{valid: false}` result.
pub fn json_validate(json_string: &str) -> JsonValidation {
    match serde_json::from_str::<serde_json::Value>(json_string) {
        Ok(_) => JsonValidation {
            valid: true,
            error: None,
        },
        Err(err) => JsonValidation {
            valid: false,
            error: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_json_reports_no_error() {
        let result = json_validate(r#"{"a": 1}"#);
        assert!(result.valid);
        assert!(result.error.is_none());
    }

    #[test]
    fn invalid_json_reports_error() {
        let result = json_validate("{not json}");
        assert!(!result.valid);
        assert!(result.error.is_some());
    }
}
