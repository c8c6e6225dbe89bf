// src/lib.rs

//! Katello host agent
//!
//! Host-side content management for RPM-based systems. The agent receives
//! content operations (install/update/uninstall) for mixed content types,
//! routes them to type-specific handlers backed by the native package
//! manager (dnf, or legacy yum), and aggregates per-type results into a
//! single dispatch report that survives partial failure.
//!
//! # Architecture
//!
//! - Dispatch layer: content units collated by type, one handler per type,
//!   per-type fault isolation
//! - Capability backends: dnf-flavored and legacy yum-flavored drivers
//!   behind one `ContentBackend` trait, selected at startup by detection
//! - Host reporting: installed-package profile, enabled repositories, and
//!   processes needing restart, uploaded to the management server with
//!   cache-based deduplication

pub mod advisory;
pub mod backend;
pub mod config;
pub mod content;
mod error;
pub mod profile;
pub mod tracer;
pub mod upload;
pub mod version;

pub use advisory::{AdvisoryFilter, AdvisoryKind};
pub use backend::{ContentBackend, PackageChange, TransactionReport, TxKind};
pub use config::AgentConfig;
pub use content::{
    ContentHandler, ContentOptions, ContentUnit, DispatchReport, Dispatcher, ErratumHandler,
    GroupHandler, HandlerRegistry, HandlerReport, PackageHandler, Pattern,
};
pub use error::{Error, Result};
pub use version::RpmVersion;
