use serde_json::Value;

pub(crate) trait BodyFormatter {
    /// Format a response body for printing to stdout
    fn format(&self, body: &str) -> String;
}

/// Print the body exactly as received
pub(crate) struct Raw;

impl BodyFormatter for Raw {
    fn format(&self, body: &str) -> String {
        body.to_string()
    }
}

/// One JSON document per line. Non-JSON bodies are printed as received.
pub(crate) struct Compact;

impl BodyFormatter for Compact {
    fn format(&self, body: &str) -> String {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => value.to_string(),
            Err(_) => body.trim_end().to_string(),
        }
    }
}

/// Indented JSON. Non-JSON bodies are printed as received.
pub(crate) struct Pretty;

impl BodyFormatter for Pretty {
    fn format(&self, body: &str) -> String {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => format!("{value:#}"),
            Err(_) => body.trim_end().to_string(),
        }
    }
}
