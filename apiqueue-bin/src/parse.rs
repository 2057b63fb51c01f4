use anyhow::{Context, Result, anyhow};
use apiqueue_lib::Params;
use http::Method;
use serde_json::Value;
use std::str::FromStr;

/// Split a single `key=value` parameter at the first `=`
pub(crate) fn parse_param(input: &str) -> Result<(String, String)> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(anyhow!(
            "Parameter must be of the form key=value, got {input}"
        )),
    }
}

/// Read a parameter value as JSON, falling back to a plain string
fn parse_value(value: &str) -> Value {
    serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

/// Build the parameter bag shared by all requests of a run
pub(crate) fn parse_params(params: &[(String, String)], query: Option<&str>) -> Params {
    if let Some(query) = query {
        return Params::query(query);
    }
    if params.is_empty() {
        return Params::None;
    }
    Params::Map(
        params
            .iter()
            .map(|(key, value)| (key.clone(), parse_value(value)))
            .collect(),
    )
}

/// Parse an HTTP method, ignoring case
pub(crate) fn parse_method(method: &str) -> Result<Method> {
    Method::from_str(&method.to_uppercase())
        .with_context(|| format!("Invalid request method `{method}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("id=550").unwrap(),
            ("id".to_string(), "550".to_string())
        );
        assert_eq!(
            parse_param("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_param("language=").unwrap(),
            ("language".to_string(), String::new())
        );
        assert!(parse_param("550").is_err());
        assert!(parse_param("=550").is_err());
    }

    #[test]
    fn test_parse_params_reads_json_values() {
        let params = parse_params(
            &[
                ("id".to_string(), "550".to_string()),
                ("name".to_string(), "Fight Club".to_string()),
                ("adult".to_string(), "false".to_string()),
                ("value".to_string(), "8.5".to_string()),
            ],
            None,
        );
        assert_eq!(
            params,
            Params::map([
                ("id", json!(550)),
                ("name", json!("Fight Club")),
                ("adult", json!(false)),
                ("value", json!(8.5)),
            ])
        );
    }

    #[test]
    fn test_parse_params_without_values() {
        assert_eq!(parse_params(&[], None), Params::None);
        assert_eq!(
            parse_params(&[], Some("language=de&page=2")),
            Params::query("language=de&page=2")
        );
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method("Post").unwrap(), Method::POST);
        assert!(parse_method("NOT A METHOD").is_err());
    }
}
