//! `apiqueue` sends requests to a rate-limited, token-templated HTTP API
//! without tripping its rate limit.
//!
//! The apiqueue binary is a wrapper around apiqueue-lib: every template
//! given on the command line becomes one request, all requests share one
//! client-side quota and the ones that don't fit are queued until it
//! recovers.
//!
//! Fetch a single resource:
//!
//! ```sh
//! apiqueue --base-url https://api.example.com/3 --api-key "$KEY" -p id=550 movie/:id
//! ```
//!
//! Fetch several resources at once, embedding sub-resources:
//!
//! ```sh
//! apiqueue -p id=550 --append-to-response credits,videos movie/:id movie/:id/reviews
//! ```
//!
//! Rate a movie (leftover parameters become the JSON body):
//!
//! ```sh
//! apiqueue -X post -p id=550 -p value=8.5 --session-id "$SESSION" movie/:id/rating
//! ```
//!
//! Print request statistics when done:
//! ```sh
//! apiqueue --stats --stats-format json -p id=550 movie/:id
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{Error, Result, bail};
use apiqueue_lib::{RequestOptions, RequestSpec};
use clap::Parser;
use futures::future::join_all;
use log::{error, info};
#[cfg(feature = "native-tls")]
use openssl_sys as _; // required for vendored-openssl feature

mod client;
mod formatters;
mod options;
mod parse;
mod verbosity;

use crate::formatters::{get_body_formatter, get_stats_formatter, log::init_logging};
use crate::options::{APIQUEUE_CONFIG_FILE, ApiQueueOptions, Config};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator, e.g. an invalid base URL.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<ApiQueueOptions> {
    let mut opts = ApiQueueOptions::parse();

    init_logging(&opts.config.verbose);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // Without an explicit config file, the default one is used if it
        // exists. An invalid default file is still an error.
        let default_config = PathBuf::from(APIQUEUE_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Set up runtime and call apiqueue entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = match opts.config.threads {
        Some(threads) => {
            // We define our own runtime instead of the `tokio::main` attribute
            // since we want to make the number of threads configurable
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .enable_all()
                .build()?
        }
        None => tokio::runtime::Runtime::new()?,
    };

    match runtime.block_on(run(&opts)) {
        Err(e) if Some(ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
/// This is helpful for troubleshooting the root cause of an error.
/// Code is taken from the anyhow documentation.
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Submit one request per template and print the results in order
async fn run(opts: &ApiQueueOptions) -> Result<i32> {
    let cfg = &opts.config;
    let client = client::create(cfg)?;

    let method = parse::parse_method(&cfg.method)?;
    let params = parse::parse_params(&cfg.param, cfg.query.as_deref());
    let options = RequestOptions::default().append_to_response(cfg.append_to_response.clone());

    info!(
        "Submitting {} request(s) to {}",
        opts.templates.len(),
        cfg.base_url.as_deref().unwrap_or_default()
    );

    let requests = opts.templates.iter().map(|template| {
        let spec = RequestSpec::new(method.clone(), template.as_str())
            .with_params(params.clone())
            .with_options(options.clone());
        client.submit(spec)
    });
    let results = join_all(requests).await;

    let formatter = get_body_formatter(&cfg.format);
    let mut exit_code = ExitCode::Success;
    let mut stdout = io::stdout().lock();
    for (template, result) in opts.templates.iter().zip(results) {
        match result {
            Ok(response) => writeln!(stdout, "{}", formatter.format(response.body()))?,
            Err(apiqueue_lib::ErrorKind::RejectedStatusCode { status, body }) => {
                error!("{template}: {status}: {}", body.trim());
                exit_code = ExitCode::RequestFailure;
            }
            Err(e) => {
                error!("{template}: {e}");
                exit_code = ExitCode::RequestFailure;
            }
        }
    }
    stdout.flush()?;

    if cfg.stats {
        let stats = get_stats_formatter(&cfg.stats_format).format(&client.stats())?;
        writeln!(io::stderr(), "{stats}")?;
    }

    client.shutdown();
    Ok(exit_code as i32)
}
