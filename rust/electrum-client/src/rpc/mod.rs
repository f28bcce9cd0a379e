//! Typed wrappers for the Electrum protocol methods.
//!
//! Each submodule adds an `impl Client` block for one family of methods.

mod chain;
mod scripthash;
mod server;
mod transaction;

pub use chain::*;
