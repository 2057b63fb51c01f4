#![allow(unreachable_pub)]

mod error;
mod request;
mod response;

pub use error::ErrorKind;
pub use request::{Params, RequestOptions, RequestSpec};
pub use response::ApiResponse;

/// The apiqueue `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
