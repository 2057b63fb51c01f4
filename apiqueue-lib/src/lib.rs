//! `apiqueue` is a client library for rate-limited, token-templated HTTP APIs.
//!
//! Requests are described by an endpoint template such as `movie/:id` and a
//! parameter bag. The client resolves the template, attaches credentials and
//! admits the request against a per-client quota. Requests that don't fit into
//! the current quota window, or that the server rejects with
//! `429 Too Many Requests`, are queued and resumed in order once the quota
//! recovers. Every caller gets exactly one result.
//!
//! ```no_run
//! use apiqueue_lib::{ClientBuilder, Params, Result};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder()
//!       .base_url("https://api.example.com/3")
//!       .api_key(SecretString::from("my-api-key".to_string()))
//!       .build()
//!       .client()?;
//!   let response = client.get("movie/:id", Params::from(550)).await?;
//!   println!("{}", response.body());
//!   Ok(())
//! }
//! ```
//!
//! See [`ClientBuilder`] for the configuration surface and
//! [`ratelimit`] for the scheduling internals.
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    semicolon_in_expressions_from_macros,
    unused_extern_crates,
    variant_size_differences
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]

mod client;
mod session;
mod template;
mod transport;
mod types;

pub mod ratelimit;

#[cfg(test)]
mod test_utils;

pub use crate::{
    client::{Client, ClientBuilder, DEFAULT_USER_AGENT},
    session::{SessionProvider, SessionStore},
    template::{CURRENT_ACCOUNT, EndpointTemplate, IDENTITY_PLACEHOLDER, ResolvedEndpoint},
    transport::{OutgoingRequest, ReqwestTransport, Transport},
    types::{ApiResponse, ErrorKind, Params, RequestOptions, RequestSpec, Result},
};
