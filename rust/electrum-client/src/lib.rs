#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod address;
mod client;
mod rpc;
mod subscribe;
mod types;

pub use address::*;
pub use client::*;
pub use rpc::*;
pub use subscribe::*;
pub use types::*;

pub use electrum_core::{
    CancellationToken, ErrorKind, RpcError, ServerError, SessionConfig, TransportError,
    ValidationError,
};
