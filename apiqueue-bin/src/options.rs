use crate::parse::parse_param;
use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use apiqueue_lib::DEFAULT_USER_AGENT;
use clap::builder::PossibleValuesParser;
use clap::{Parser, builder::TypedValueParser};
use const_format::formatcp;
use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};
use strum::{Display, EnumIter, EnumString, VariantNames};

pub(crate) const APIQUEUE_CONFIG_FILE: &str = "apiqueue.toml";

const DEFAULT_METHOD: &str = "GET";

// We use a custom help message here because we want to show the default
// value of the config file, but also be able to check if the user has
// provided a custom value. If they didn't, we won't throw an error if
// the file doesn't exist.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    APIQUEUE_CONFIG_FILE,
);

/// How response bodies are printed
#[derive(
    Debug, Deserialize, Default, Clone, Display, EnumIter, EnumString, VariantNames, PartialEq, Eq,
)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub(crate) enum OutputFormat {
    /// The body exactly as the server sent it
    Raw,
    /// One JSON document per line
    #[default]
    Compact,
    /// Indented JSON
    Pretty,
}

/// The format of the request statistics printed with `--stats`
#[derive(
    Debug, Deserialize, Default, Clone, Display, EnumIter, EnumString, VariantNames, PartialEq, Eq,
)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StatsFormat {
    #[default]
    Compact,
    Json,
}

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    method: String = DEFAULT_METHOD.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Parse a single header into a [`HeaderName`] and [`HeaderValue`]
///
/// Headers are expected to be in format `Header-Name: Header-Value`.
/// The header name and value are trimmed of whitespace.
///
/// If the header contains multiple colons, the part after the first colon is
/// considered the value.
///
/// # Errors
///
/// This fails if the header does not contain exactly one `:` character or
/// if the header name contains non-ASCII characters.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let parts: Vec<&str> = header.splitn(2, ':').collect();
    match parts.as_slice() {
        [name, value] => {
            let name = name.trim();
            let name = HeaderName::from_str(name)
                .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
            Ok((name, value))
        }
        _ => Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        )),
    }
}

/// Parses a single HTTP header into a tuple of (String, String)
///
/// This does NOT merge multiple headers into one.
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let header_str = value.to_str().ok_or_else(|| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                "Header value contains invalid UTF-8",
            )
        })?;

        match parse_single_header(header_str) {
            Ok((name, value)) => {
                let Ok(value) = value.to_str() else {
                    return Err(clap::Error::raw(
                        clap::error::ErrorKind::InvalidValue,
                        "Header value contains invalid UTF-8",
                    ));
                };

                Ok((name.to_string(), value.to_string()))
            }
            Err(e) => Err(clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                e.to_string(),
            )),
        }
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Extension trait for converting a Vec of header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value '{value}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// apiqueue sends requests to a rate-limited, token-templated HTTP API.
///
/// Endpoints are given as templates such as `movie/:id`, filled from
/// `--param` values. Requests that exceed the client-side quota, or that the
/// server rejects with `429 Too Many Requests`, are queued and sent once the
/// quota recovers.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct ApiQueueOptions {
    /// Endpoint templates to request
    #[arg(
        name = "templates",
        required = true,
        long_help = "Endpoint templates to request, relative to the base URL.

Placeholders start with a colon and are filled from `--param` values,
e.g. `movie/:id` with `--param id=550`. In a request without parameters,
`:id` refers to the account of the current session (see `--session-id`).

All templates are submitted at once and share one quota. Response bodies
are printed in the order the templates were given.

NOTE: Use `--` to separate templates from options that allow multiple arguments."
    )]
    pub(crate) templates: Vec<String>,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

// Header tables in the config file map names to values
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

// Parameter tables may hold any value; non-strings keep their JSON form so
// that they are parsed back into the same value later on
fn deserialize_params<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = BTreeMap::<String, Value>::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect())
}

/// The main configuration for apiqueue
#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Base URL of the API, e.g. `https://api.example.com/3`
    #[arg(short, long, env = "APIQUEUE_BASE_URL")]
    #[serde(default)]
    pub(crate) base_url: Option<String>,

    /// API key, sent as the `api_key` query parameter of every request
    #[arg(long, env = "APIQUEUE_API_KEY", hide_env_values = true)]
    #[serde(default)]
    pub(crate) api_key: Option<SecretString>,

    /// Session id, sent as the `session_id` query parameter of every request
    #[arg(long, env = "APIQUEUE_SESSION_ID", hide_env_values = true)]
    #[serde(default)]
    pub(crate) session_id: Option<SecretString>,

    /// Request parameter in the form `key=value`
    #[arg(
        short,
        long,
        action = clap::ArgAction::Append,
        value_parser = parse_param,
        value_name = "KEY=VALUE",
        long_help = "Request parameter in the form `key=value`

Parameters named like a placeholder of the template are substituted into
the path. All others are sent as query parameters, or as a JSON body for
POST, PUT and PATCH requests. Values are read as JSON where possible,
so `--param page=2` sends a number and `--param name=Fight Club` a string.
Can be given multiple times."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_params")]
    pub(crate) param: Vec<(String, String)>,

    /// Raw query string appended to every request, e.g. `language=de&page=2`
    #[arg(long, conflicts_with = "param")]
    #[serde(default)]
    pub(crate) query: Option<String>,

    /// Sub-resources to embed in every response, e.g. `credits,videos`
    #[arg(long, value_delimiter = ',')]
    #[serde(default)]
    pub(crate) append_to_response: Vec<String>,

    /// Request method
    #[arg(short = 'X', long, default_value = DEFAULT_METHOD)]
    #[serde(default = "method")]
    pub(crate) method: String,

    /// Timeout of a single request, e.g. `30s` (no timeout by default)
    #[arg(short, long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) timeout: Option<Duration>,

    /// Set custom header for requests
    #[arg(
        short = 'H',
        long,
        action = clap::ArgAction::Append,
        value_parser = HeaderParser,
        value_name = "HEADER:VALUE",
        long_help = "Set custom header for requests

Headers are given in the format 'Name: Value', e.g. 'Accept-Language: de'.
Multiple headers can be specified by using the flag multiple times."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Send every request immediately, without tracking the quota.
    /// Requests rejected with `429 Too Many Requests` fail instead of being retried.
    #[arg(long, verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) no_rate_limit: bool,

    /// Maximum number of requests per quota window [default: 40]
    #[arg(long)]
    #[serde(default)]
    pub(crate) limit_ceiling: Option<usize>,

    /// Length of a quota window, e.g. `10s` [default: 10s]
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) window: Option<Duration>,

    /// Give up on requests that waited this long for quota, e.g. `1m`.
    /// By default requests wait until the quota recovers.
    #[arg(long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) max_queue_wait: Option<Duration>,

    /// Output format of response bodies
    #[arg(short, long, default_value = "compact", value_parser = PossibleValuesParser::new(OutputFormat::VARIANTS).map(|s| s.parse::<OutputFormat>().unwrap()))]
    #[serde(default)]
    pub(crate) format: OutputFormat,

    /// Print request statistics to stderr when done
    #[arg(long)]
    #[serde(default)]
    pub(crate) stats: bool,

    /// Format of the statistics printed with `--stats`
    #[arg(long, default_value = "compact", value_parser = PossibleValuesParser::new(StatsFormat::VARIANTS).map(|s| s.parse::<StatsFormat>().unwrap()))]
    #[serde(default)]
    pub(crate) stats_format: StatsFormat,

    /// Number of threads to utilize.
    /// Defaults to number of cores available to the system
    #[arg(short = 'T', long)]
    #[serde(default)]
    pub(crate) threads: Option<usize>,
}

impl Config {
    /// Merge two lists of key-value pairs.
    /// Keys given on the command line win over keys from the config file.
    fn merge_pairs(cli: &mut Vec<(String, String)>, toml: Vec<(String, String)>) {
        let merged: BTreeMap<_, _> = toml.into_iter().chain(cli.drain(..)).collect();
        *cli = merged.into_iter().collect();
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        Self::merge_pairs(&mut self.header, toml.header);
        Self::merge_pairs(&mut self.param, toml.param);

        // Secrets are outside of fold_in! because SecretBox doesn't implement Eq.
        if self.api_key.is_none() && toml.api_key.is_some() {
            self.api_key = toml.api_key;
        }
        if self.session_id.is_none() && toml.session_id.is_some() {
            self.session_id = toml.session_id;
        }

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..header,
                ..param,
                ..api_key,
                ..session_id,

                // Keys with defaults to assign
                append_to_response: Vec::<String>::new(),
                base_url: None,
                format: OutputFormat::default(),
                limit_ceiling: None,
                max_queue_wait: None,
                method: DEFAULT_METHOD,
                no_rate_limit: false,
                query: None,
                stats: false,
                stats_format: StatsFormat::default(),
                threads: None,
                timeout: None,
                user_agent: DEFAULT_USER_AGENT,
                verbose: Verbosity::default(),
                window: None,
            }
        }
    }
}
