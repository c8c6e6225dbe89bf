// src/content/mod.rs

//! Content dispatch layer
//!
//! Receives batches of mixed-type content units, routes each type to its
//! registered handler, and folds per-type results into one dispatch report.
//! A failing type never aborts the remaining types.

mod dispatch;
mod handler;
mod pattern;
mod report;

pub use dispatch::{Dispatcher, HandlerRegistry, Role};
pub use handler::{ContentHandler, ErratumHandler, GroupHandler, PackageHandler};
pub use pattern::{ContentOptions, ContentUnit, Pattern, UnitKey};
pub use report::{DispatchReport, HandlerReport, RebootHint, TypeOutcome};
