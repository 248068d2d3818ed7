//! Model listing and simulation handlers
//!
//! `models` holds the transport-independent handlers; `resources` and
//! `tools` expose them over MCP.

pub mod models;
pub mod resources;
pub mod tools;
