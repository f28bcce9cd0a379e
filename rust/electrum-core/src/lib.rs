#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod atomic;
mod config;
mod error;
mod session;
mod transport;
mod wire;

pub use atomic::*;
pub use config::*;
pub use error::*;
pub use session::*;
pub use transport::*;
pub use wire::*;

// Callers of `Session::request_cancellable` need the token type.
pub use tokio_util::sync::CancellationToken;
