use crate::options::{Config, HeaderMapExt};
use anyhow::{Context, Result};
use apiqueue_lib::{Client, ClientBuilder, SessionStore, ratelimit::RateLimitConfig};
use http::HeaderMap;
use std::sync::Arc;

/// Creates a client according to the command-line config
pub(crate) fn create(cfg: &Config) -> Result<Client> {
    let base_url = cfg
        .base_url
        .clone()
        .context("No base URL given. Use `--base-url` or set `APIQUEUE_BASE_URL`")?;

    let headers = HeaderMap::from_header_pairs(&cfg.header)?;

    let rate_limit = RateLimitConfig::from_options(
        !cfg.no_rate_limit,
        cfg.limit_ceiling,
        cfg.window,
        cfg.max_queue_wait,
    );

    let session = match &cfg.session_id {
        Some(session_id) => SessionStore::with_session_id(session_id.clone()),
        None => SessionStore::new(),
    };

    ClientBuilder::builder()
        .base_url(base_url)
        .api_key(cfg.api_key.clone())
        .rate_limit(rate_limit)
        .timeout(cfg.timeout)
        .user_agent(cfg.user_agent.clone())
        .custom_headers(headers)
        .session(Arc::new(session))
        .build()
        .client()
        .context("Failed to create request client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            base_url: Some("https://api.example.com/3".to_string()),
            method: "GET".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_create_client() {
        let cfg = Config {
            api_key: Some(SecretString::from("top-secret".to_string())),
            limit_ceiling: Some(5),
            window: Some(Duration::from_secs(1)),
            timeout: Some(Duration::from_secs(3)),
            header: vec![("Accept-Language".to_string(), "de".to_string())],
            ..config()
        };
        let client = create(&cfg).unwrap();
        assert_eq!(client.quota().remaining, 5);
        assert_eq!(client.queue_len(), 0);
    }

    #[test]
    fn test_missing_base_url() {
        let cfg = Config {
            base_url: None,
            ..config()
        };
        let error = create(&cfg).unwrap_err();
        assert!(error.to_string().contains("--base-url"));
    }

    #[test]
    fn test_invalid_rate_limit() {
        let cfg = Config {
            limit_ceiling: Some(0),
            ..config()
        };
        assert!(create(&cfg).is_err());

        // The ceiling is irrelevant without rate limiting
        let cfg = Config {
            limit_ceiling: Some(0),
            no_rate_limit: true,
            ..config()
        };
        assert!(create(&cfg).is_ok());
    }

    #[test]
    fn test_invalid_header() {
        let cfg = Config {
            header: vec![("X-Test".to_string(), "line\nbreak".to_string())],
            ..config()
        };
        assert!(create(&cfg).is_err());
    }
}
