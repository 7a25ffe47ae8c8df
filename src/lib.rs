// Public module for parsing and validating server configuration.
pub mod config;

// Public module exposing logging utilities for exchanged messages and server lifecycle events.
pub mod logger;

// The WebSocket relay server: registry, sessions, fan-out, wire protocol.
pub mod server;

// The external translation collaborator behind a synchronous trait.
pub mod translate;

pub use config::ServerConfig;
pub use server::run_server;
