use http::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::EndpointTemplate;

/// The parameter bag of a request.
///
/// Parameters fill the placeholders of an [`EndpointTemplate`]; whatever is
/// not consumed by the template ends up in the query string or, for methods
/// with a body, in a JSON body.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// No parameters at all
    #[default]
    None,
    /// A single value, substituted into a template with exactly one
    /// placeholder
    Scalar(String),
    /// Named values. Keys matching a `:key` placeholder are substituted,
    /// the rest are sent along with the request.
    Map(BTreeMap<String, Value>),
    /// A raw query string such as `language=de&page=2`, appended to the path
    Query(String),
}

impl Params {
    /// Build a [`Params::Map`] from key-value pairs
    ///
    /// ```
    /// use apiqueue_lib::Params;
    ///
    /// let params = Params::map([("id", 550), ("page", 2)]);
    /// assert!(!params.is_empty());
    /// ```
    pub fn map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a [`Params::Query`] from a raw query string
    pub fn query(query: impl Into<String>) -> Self {
        Self::Query(query.into())
    }

    /// Returns `true` if the caller supplied no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Map(map) => map.is_empty(),
            Self::Scalar(_) | Self::Query(_) => false,
        }
    }
}

impl From<&str> for Params {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for Params {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

macro_rules! scalar_from_number {
    ( $( $t:ty ),* ) => {
        $(
            impl From<$t> for Params {
                fn from(value: $t) -> Self {
                    Self::Scalar(value.to_string())
                }
            }
        )*
    };
}

scalar_from_number!(u32, u64, i32, i64, usize);

impl From<BTreeMap<String, Value>> for Params {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl From<serde_json::Map<String, Value>> for Params {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self::Map(map.into_iter().collect())
    }
}

impl<T: Into<Params>> From<Option<T>> for Params {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

/// Per-request options
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestOptions {
    /// Timeout for this request, overriding the client-wide timeout
    pub timeout: Option<Duration>,
    /// Sub-resources to embed in the response.
    /// Sent as a single comma-separated `append_to_response` query parameter.
    pub append_to_response: Vec<String>,
}

impl RequestOptions {
    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add sub-resources to embed in the response
    #[must_use]
    pub fn append_to_response<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append_to_response
            .extend(resources.into_iter().map(Into::into));
        self
    }
}

/// Caller-facing description of a single API call.
///
/// A `RequestSpec` is never modified after submission; the endpoint
/// template is resolved into a fresh path for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Path template, e.g. `movie/:id/credits`
    pub template: EndpointTemplate,
    /// Parameter bag
    pub params: Params,
    /// Per-request options
    pub options: RequestOptions,
}

impl RequestSpec {
    /// Create a request without parameters and with default options
    pub fn new(method: Method, template: impl Into<EndpointTemplate>) -> Self {
        Self {
            method,
            template: template.into(),
            params: Params::None,
            options: RequestOptions::default(),
        }
    }

    /// Shorthand for a `GET` request
    pub fn get(template: impl Into<EndpointTemplate>) -> Self {
        Self::new(Method::GET, template)
    }

    /// Set the parameter bag
    #[must_use]
    pub fn with_params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    /// Set the request options
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns `true` if leftover parameters travel in a JSON body
    /// instead of the query string
    #[must_use]
    pub fn sends_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_emptiness() {
        assert!(Params::None.is_empty());
        assert!(Params::Map(BTreeMap::new()).is_empty());
        assert!(!Params::from(550).is_empty());
        assert!(!Params::query("page=2").is_empty());
        assert!(Params::from(None::<&str>).is_empty());
    }

    #[test]
    fn test_params_map() {
        let params = Params::map([("id", json!(550)), ("language", json!("de"))]);
        let Params::Map(map) = params else {
            panic!("expected a map");
        };
        assert_eq!(map.get("id"), Some(&json!(550)));
        assert_eq!(map.get("language"), Some(&json!("de")));
    }

    #[test]
    fn test_sends_body() {
        assert!(!RequestSpec::get("movie/:id").sends_body());
        assert!(!RequestSpec::new(Method::DELETE, "list/:id").sends_body());
        assert!(RequestSpec::new(Method::POST, "movie/:id/rating").sends_body());
    }

    #[test]
    fn test_options_builder() {
        let options = RequestOptions::default()
            .with_timeout(Duration::from_secs(3))
            .append_to_response(["credits", "videos"]);
        assert_eq!(options.timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.append_to_response, vec!["credits", "videos"]);
    }
}
