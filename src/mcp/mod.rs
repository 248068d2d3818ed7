//! Model Context Protocol (MCP) over JSON-RPC
//!
//! Message validation, protocol negotiation and method routing, plus the
//! newline-delimited stdio transport.

pub mod rpc;
pub mod server;
pub mod stdio;
