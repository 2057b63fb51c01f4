//! Endpoint templates with named placeholders.
//!
//! A template like `movie/:id/credits` is turned into a concrete path by
//! filling `:id` from the caller's [`Params`]. Parameters that don't match a
//! placeholder are handed back as the remainder, to be sent as query or body
//! parameters.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use crate::{ErrorKind, Params, Result};

/// Name of the placeholder that identifies an account, as in `account/:id/lists`
pub const IDENTITY_PLACEHOLDER: &str = "id";

/// Stands in for "the account of the current session" when an identity
/// placeholder is left empty and a session is active
pub const CURRENT_ACCOUNT: &str = "{account_id}";

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Characters escaped when a value is substituted into a path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A path pattern with zero or more `:name` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointTemplate(String);

/// The outcome of resolving an [`EndpointTemplate`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedEndpoint {
    /// Concrete path, including a raw query string if one was given
    pub path: String,
    /// Parameter keys consumed as path segments
    pub consumed: BTreeSet<String>,
    /// Parameters that were not consumed by the template
    pub remainder: BTreeMap<String, Value>,
}

impl EndpointTemplate {
    /// Create a new template
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// The template as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Distinct placeholder names, in order of first appearance
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for caps in PLACEHOLDER_REGEX.captures_iter(&self.0) {
            if let Some(name) = caps.get(1).map(|m| m.as_str())
                && !names.contains(&name)
            {
                names.push(name);
            }
        }
        names
    }

    /// Returns `true` if the template contains the placeholder `:name`
    #[must_use]
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.placeholders().contains(&name)
    }

    /// Resolve the template with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidParameters`] if a scalar is given for a
    /// template without exactly one placeholder, or if any placeholder is
    /// left without a value.
    pub fn resolve(&self, params: &Params) -> Result<ResolvedEndpoint> {
        match params {
            Params::None => self.substitute(|_| None, BTreeMap::new()),
            Params::Scalar(value) => {
                let placeholders = self.placeholders();
                let [name] = placeholders.as_slice() else {
                    return Err(ErrorKind::invalid_parameters(
                        &self.0,
                        format!(
                            "a single value needs exactly one placeholder, found {}",
                            placeholders.len()
                        ),
                    ));
                };
                let name = (*name).to_string();
                let encoded = encode_segment(value);
                self.substitute(
                    |placeholder| (placeholder == name).then(|| encoded.clone()),
                    BTreeMap::new(),
                )
            }
            Params::Map(map) => {
                let placeholders = self.placeholders();
                let remainder = map
                    .iter()
                    .filter(|(key, _)| !placeholders.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                self.substitute(
                    |placeholder| map.get(placeholder).map(|v| encode_segment(&value_text(v))),
                    remainder,
                )
            }
            Params::Query(query) => {
                let mut resolved = self.substitute(|_| None, BTreeMap::new())?;
                if !query.is_empty() {
                    if !query.starts_with('?') {
                        resolved.path.push('?');
                    }
                    resolved.path.push_str(query);
                }
                Ok(resolved)
            }
        }
    }

    /// Resolve the template, filling an otherwise empty identity placeholder
    /// with [`CURRENT_ACCOUNT`] when a session is active.
    ///
    /// # Errors
    ///
    /// Same as [`EndpointTemplate::resolve`]. Without an active session an
    /// empty identity placeholder stays unresolved and is rejected.
    pub fn resolve_for_session(
        &self,
        params: &Params,
        session_active: bool,
    ) -> Result<ResolvedEndpoint> {
        if session_active && params.is_empty() && self.has_placeholder(IDENTITY_PLACEHOLDER) {
            return self.substitute(
                |placeholder| (placeholder == IDENTITY_PLACEHOLDER).then(|| CURRENT_ACCOUNT.to_string()),
                BTreeMap::new(),
            );
        }
        self.resolve(params)
    }

    /// Replace every placeholder for which `lookup` returns a value.
    /// Fails if any placeholder is left over.
    fn substitute<F>(&self, lookup: F, remainder: BTreeMap<String, Value>) -> Result<ResolvedEndpoint>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut consumed = BTreeSet::new();
        let mut unresolved = BTreeSet::new();

        let path = PLACEHOLDER_REGEX
            .replace_all(&self.0, |caps: &Captures| {
                let name = &caps[1];
                if let Some(value) = lookup(name) {
                    consumed.insert(name.to_string());
                    value
                } else {
                    unresolved.insert(name.to_string());
                    caps[0].to_string()
                }
            })
            .into_owned();

        if !unresolved.is_empty() {
            let names: Vec<String> = unresolved.into_iter().map(|n| format!(":{n}")).collect();
            return Err(ErrorKind::invalid_parameters(
                &self.0,
                format!("no value for {}", names.join(", ")),
            ));
        }

        Ok(ResolvedEndpoint {
            path,
            consumed,
            remainder,
        })
    }
}

/// Text representation of a parameter value for paths and query strings
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

impl From<&str> for EndpointTemplate {
    fn from(template: &str) -> Self {
        Self(template.to_string())
    }
}

impl From<String> for EndpointTemplate {
    fn from(template: String) -> Self {
        Self(template)
    }
}

impl fmt::Display for EndpointTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("movie/:id", "550", "movie/550")]
    #[case("tv/:tv_id/season/1", "1399", "tv/1399/season/1")]
    #[case(":id/images", "x", "x/images")]
    #[case("person/:id/:id", "287", "person/287/287")]
    #[case("search/:query", "a b/c", "search/a%20b%2Fc")]
    fn test_scalar_substitution(#[case] template: &str, #[case] value: &str, #[case] path: &str) {
        let resolved = EndpointTemplate::from(template)
            .resolve(&Params::from(value))
            .unwrap();
        assert_eq!(resolved.path, path);
        assert!(!PLACEHOLDER_REGEX.is_match(&resolved.path));
        assert_eq!(resolved.consumed.len(), 1);
        assert!(resolved.remainder.is_empty());
    }

    #[rstest]
    #[case("movie/:id/:kind")]
    #[case("configuration")]
    fn test_scalar_needs_exactly_one_placeholder(#[case] template: &str) {
        let result = EndpointTemplate::from(template).resolve(&Params::from(550));
        assert!(matches!(result, Err(ErrorKind::InvalidParameters { .. })));
    }

    #[test]
    fn test_map_substitution_and_remainder() {
        let template = EndpointTemplate::from("tv/:tv_id/season/:season_number");
        let params = Params::map([
            ("tv_id", json!(1399)),
            ("season_number", json!(1)),
            ("language", json!("de")),
        ]);

        let resolved = template.resolve(&params).unwrap();

        assert_eq!(resolved.path, "tv/1399/season/1");
        assert_eq!(
            resolved.consumed,
            BTreeSet::from(["season_number".to_string(), "tv_id".to_string()])
        );
        assert_eq!(
            resolved.remainder,
            BTreeMap::from([("language".to_string(), json!("de"))])
        );
    }

    #[test]
    fn test_map_missing_placeholder() {
        let template = EndpointTemplate::from("tv/:tv_id/season/:season_number");
        let params = Params::map([("tv_id", 1399)]);

        let Err(ErrorKind::InvalidParameters { reason, .. }) = template.resolve(&params) else {
            panic!("expected invalid parameters");
        };
        assert_eq!(reason, "no value for :season_number");
    }

    #[rstest]
    #[case("language=de", "discover/movie?language=de")]
    #[case("?language=de", "discover/movie?language=de")]
    #[case("", "discover/movie")]
    fn test_raw_query(#[case] query: &str, #[case] path: &str) {
        let resolved = EndpointTemplate::from("discover/movie")
            .resolve(&Params::query(query))
            .unwrap();
        assert_eq!(resolved.path, path);
    }

    #[test]
    fn test_identity_placeholder_with_session() {
        let template = EndpointTemplate::from("users/:id/lists");

        let resolved = template.resolve_for_session(&Params::None, true).unwrap();
        assert_eq!(resolved.path, "users/{account_id}/lists");
        assert!(resolved.consumed.contains(IDENTITY_PLACEHOLDER));

        let empty_map = Params::Map(BTreeMap::new());
        let resolved = template.resolve_for_session(&empty_map, true).unwrap();
        assert_eq!(resolved.path, "users/{account_id}/lists");
    }

    #[test]
    fn test_identity_placeholder_without_session() {
        let template = EndpointTemplate::from("users/:id/lists");
        let result = template.resolve_for_session(&Params::None, false);
        assert!(matches!(result, Err(ErrorKind::InvalidParameters { .. })));
    }

    #[test]
    fn test_explicit_identity_wins_over_session() {
        let template = EndpointTemplate::from("users/:id/lists");
        let resolved = template
            .resolve_for_session(&Params::from(42), true)
            .unwrap();
        assert_eq!(resolved.path, "users/42/lists");
    }

    #[test]
    fn test_placeholders_are_distinct() {
        let template = EndpointTemplate::from("a/:x/b/:y/c/:x");
        assert_eq!(template.placeholders(), vec!["x", "y"]);
        assert!(template.has_placeholder("y"));
        assert!(!template.has_placeholder("z"));
    }
}
