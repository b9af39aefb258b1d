//! HTTP surface of the audit lifecycle service.

pub mod config;
pub mod server;
