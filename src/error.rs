// src/error.rs

//! Crate-wide error type and result alias

use thiserror::Error;

/// Errors produced by the agent
#[derive(Debug, Error)]
pub enum Error {
    /// No handler is registered for a content type. This indicates a
    /// caller or configuration bug, never a transient fault.
    #[error("No handler for content type: {0}")]
    HandlerNotFound(String),

    /// The operation is not implemented for this content type
    /// (e.g. uninstalling an erratum).
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// Backend or subsystem initialization failed
    #[error("{0}")]
    InitError(String),

    /// A named entity (package group, advisory, consumer) was not found
    #[error("{0}")]
    NotFoundError(String),

    /// A required external tool is missing from the host
    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    /// A package manager subprocess exited with an error
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Output from a subprocess or file could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The host has no consumer identity certificate
    #[error("Host is not registered: {0}")]
    NotRegistered(String),

    /// The management server rejected an upload
    #[error("Upload failed: {0}")]
    UploadError(String),

    /// Invalid agent configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
