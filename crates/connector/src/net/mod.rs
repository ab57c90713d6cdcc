//! Request/response protocol between a [`NetHost`] and a [`HostServer`].
//!
//! Each request and each response is one binary websocket message made of
//! length-prefixed segments (see [`FrameWriter`]). The first segment names
//! the operation, or carries `OK` / `ERROR` in a response.

mod client;
mod frame;
mod protocol;
mod server;

pub use client::NetHost;
pub use frame::{FrameReader, FrameWriter};
pub use protocol::{ContextCall, Request};
pub use server::{handle_request, HostServer, DEFAULT_POLL_INTERVAL, DEFAULT_PORT};
