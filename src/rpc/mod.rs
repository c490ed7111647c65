//! JSON-RPC surface for the processor host.

pub mod server;

pub use server::{RpcServer, ServerState, MAX_MESSAGE_BYTES};
