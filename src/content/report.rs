// src/content/report.rs

//! Handler and dispatch reports
//!
//! A `HandlerReport` is the result of one handler operation. A
//! `DispatchReport` aggregates handler reports keyed by content type:
//! the overall `succeeded` is the AND of every contributing report, and
//! `num_changes` sums only the successful ones. Failed types keep their
//! failure details under their own key.

use crate::error::Error;
use serde::Serialize;
use serde_json::{Value, json};
use std::backtrace::Backtrace;
use std::collections::BTreeMap;

/// Result of one handler operation. Created per invocation, written once,
/// then folded into a `DispatchReport`.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerReport {
    pub succeeded: bool,
    pub details: Value,
    pub num_changes: u64,
}

impl HandlerReport {
    /// A successful operation.
    pub fn succeeded(details: Value, num_changes: u64) -> Self {
        Self {
            succeeded: true,
            details,
            num_changes,
        }
    }

    /// A failed operation. Failed reports never contribute changes.
    pub fn failed(details: Value) -> Self {
        Self {
            succeeded: false,
            details,
            num_changes: 0,
        }
    }

    /// A failure synthesized from an uncaught handler error. Captures the
    /// error message and a backtrace of the capture point.
    pub fn from_error(err: &Error) -> Self {
        Self::failed(json!({
            "message": err.to_string(),
            "trace": Backtrace::force_capture().to_string(),
        }))
    }

    /// Fold this report into a dispatch report under the given
    /// aggregation key (the content type id).
    pub fn fold_into(self, aggregation_key: &str, report: &mut DispatchReport) {
        if !self.succeeded {
            report.succeeded = false;
        } else {
            report.num_changes += self.num_changes;
        }
        report.details.insert(
            aggregation_key.to_string(),
            TypeOutcome {
                succeeded: self.succeeded,
                details: self.details,
            },
        );
    }
}

/// Per-type outcome entry within a dispatch report.
#[derive(Debug, Clone, Serialize)]
pub struct TypeOutcome {
    pub succeeded: bool,
    pub details: Value,
}

/// Reboot stanza, carried for wire compatibility. Nothing in this layer
/// schedules reboots.
#[derive(Debug, Clone, Serialize)]
pub struct RebootHint {
    pub scheduled: bool,
    pub details: Value,
}

impl Default for RebootHint {
    fn default() -> Self {
        Self {
            scheduled: false,
            details: json!({}),
        }
    }
}

/// Aggregated result of one dispatch call.
///
/// Wire form:
/// ```json
/// { "succeeded": false,
///   "num_changes": 6,
///   "reboot": { "scheduled": false, "details": {} },
///   "details": {
///     "rpm":     { "succeeded": true,  "details": {...} },
///     "erratum": { "succeeded": false, "details": { "message": "...", "trace": "..." } }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub succeeded: bool,
    pub num_changes: u64,
    pub reboot: RebootHint,
    pub details: BTreeMap<String, TypeOutcome>,
}

impl DispatchReport {
    pub fn new() -> Self {
        Self {
            succeeded: true,
            num_changes: 0,
            reboot: RebootHint::default(),
            details: BTreeMap::new(),
        }
    }
}

impl Default for DispatchReport {
    fn default() -> Self {
        Self::new()
    }
}
