//! HTTP transport for the Model Context Protocol

pub mod handlers;
