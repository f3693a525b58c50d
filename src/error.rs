use std::{
    io,
    path::PathBuf
};

use thiserror::Error;

/// Problems with static configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("a listener is already using name: {0}")]
    DuplicateListener(String),

    #[error("interface not registered: {0}")]
    UnknownInterface(String),

    #[error("invalid port: {0}. Port must be a number between 0 and 65535")]
    InvalidPort(i64),

    #[error("TLS context not registered: {0}")]
    UnknownTls(String),

    #[error("could not load TLS context {name}: {reason}")]
    Tls { name: String, reason: String },
}

/// Socket and link failures. Recovered locally by tearing down whatever broke.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("could not bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),

    #[error("channel closed: {0}")]
    Closed(&'static str),
}

/// A single malformed frame. The frame is dropped and the channel stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected frame type: {0}")]
    UnexpectedFrame(&'static str),
}
