// tests/dispatch.rs

//! Integration tests for content dispatch.
//!
//! These tests verify that:
//! 1. Units are collated by type and routed to the right handler
//! 2. Per-type failures are contained without aborting other types
//! 3. The dispatch report aggregates outcomes and change counts
//! 4. Dry runs never commit through the backend

use katello_agent::backend::{ContentBackend, PackageChange, TransactionReport, TxKind};
use katello_agent::content::{ContentOptions, ContentUnit, Dispatcher, UnitKey};
use katello_agent::{AdvisoryFilter, Error, Result};
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;

/// Records every backend call so tests can assert routing and commit
/// flags.
#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    fail_advisories: bool,
}

impl RecordingBackend {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn report(count: usize, kind: TxKind) -> TransactionReport {
        let mut report = TransactionReport::new(kind);
        for i in 0..count {
            report.resolved.push(PackageChange {
                qname: format!("pkg{}-1.0-1.el9.x86_64", i),
                repoid: "baseos".to_string(),
                name: format!("pkg{}", i),
                epoch: "0".to_string(),
                version: "1.0".to_string(),
                release: "1.el9".to_string(),
                arch: "x86_64".to_string(),
            });
        }
        report
    }
}

impl ContentBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn install(&self, patterns: &[katello_agent::Pattern], commit: bool) -> Result<TransactionReport> {
        self.record(format!("install:{}:{}", patterns.len(), commit));
        Ok(Self::report(patterns.len(), TxKind::Install))
    }

    fn update(&self, patterns: &[katello_agent::Pattern], commit: bool) -> Result<TransactionReport> {
        self.record(format!("update:{}:{}", patterns.len(), commit));
        Ok(Self::report(patterns.len(), TxKind::Update))
    }

    fn update_all(&self, commit: bool) -> Result<TransactionReport> {
        self.record(format!("update_all:{}", commit));
        Ok(Self::report(3, TxKind::Update))
    }

    fn update_by_advisories(
        &self,
        filter: &AdvisoryFilter,
        commit: bool,
    ) -> Result<TransactionReport> {
        self.record(format!("advisories:{}:{}", !filter.is_empty(), commit));
        if self.fail_advisories {
            return Err(Error::CommandFailed("updateinfo unavailable".to_string()));
        }
        Ok(Self::report(1, TxKind::Update))
    }

    fn uninstall(&self, patterns: &[katello_agent::Pattern], commit: bool) -> Result<TransactionReport> {
        self.record(format!("uninstall:{}:{}", patterns.len(), commit));
        Ok(Self::report(patterns.len(), TxKind::Erase))
    }

    fn resolve_groups(&self, names: &[String]) -> Result<Vec<String>> {
        self.record(format!("resolve_groups:{}", names.len()));
        names
            .iter()
            .map(|name| {
                if name == "missing" {
                    Err(Error::NotFoundError(format!("Group \"{}\" not found.", name)))
                } else {
                    Ok(name.to_lowercase().replace(' ', "-"))
                }
            })
            .collect()
    }

    fn group_install(&self, group_ids: &[String], commit: bool) -> Result<TransactionReport> {
        self.record(format!("group_install:{}:{}", group_ids.len(), commit));
        Ok(Self::report(5, TxKind::Install))
    }

    fn group_remove(&self, group_ids: &[String], commit: bool) -> Result<TransactionReport> {
        self.record(format!("group_remove:{}:{}", group_ids.len(), commit));
        Ok(Self::report(5, TxKind::Erase))
    }
}

fn unit(type_id: &str, key: serde_json::Value) -> ContentUnit {
    let unit_key: UnitKey = serde_json::from_value(key).unwrap();
    ContentUnit {
        type_id: type_id.to_string(),
        unit_key,
    }
}

#[test]
fn test_mixed_types_route_to_their_handlers() {
    let backend = Arc::new(RecordingBackend::default());
    let dispatcher = Dispatcher::with_default_handlers(backend.clone());

    let units = vec![
        unit("rpm", json!({"name": "zsh"})),
        unit("rpm", json!({"name": "vim-enhanced"})),
        unit("package_group", json!({"name": "Development Tools"})),
    ];
    let report = dispatcher.install(&units, &ContentOptions::default());

    assert!(report.succeeded);
    assert_eq!(report.details.len(), 2);
    assert!(report.details.contains_key("rpm"));
    assert!(report.details.contains_key("package_group"));
    // Two rpm changes plus the five from the group.
    assert_eq!(report.num_changes, 7);

    let calls = backend.calls();
    assert!(calls.contains(&"install:2:true".to_string()));
    assert!(calls.contains(&"resolve_groups:1".to_string()));
    assert!(calls.contains(&"group_install:1:true".to_string()));
}

#[test]
fn test_failure_in_one_type_does_not_abort_others() {
    let backend = Arc::new(RecordingBackend {
        fail_advisories: true,
        ..Default::default()
    });
    let dispatcher = Dispatcher::with_default_handlers(backend.clone());

    let units = vec![
        unit("rpm", json!({"name": "zsh"})),
        unit("erratum", json!({"id": "RHSA-2024:1234"})),
    ];
    let report = dispatcher.install(&units, &ContentOptions::default());

    // The erratum failed; the rpm install still ran and succeeded.
    assert!(!report.succeeded);
    assert!(report.details["rpm"].succeeded);
    assert!(!report.details["erratum"].succeeded);
    assert_eq!(report.num_changes, 1);
    assert!(backend.calls().contains(&"advisories:true:true".to_string()));
    assert!(backend.calls().contains(&"install:1:true".to_string()));
}

#[test]
fn test_unknown_type_is_reported_not_fatal() {
    let backend = Arc::new(RecordingBackend::default());
    let dispatcher = Dispatcher::with_default_handlers(backend.clone());

    let units = vec![
        unit("module", json!({"name": "nodejs"})),
        unit("rpm", json!({"name": "zsh"})),
    ];
    let report = dispatcher.install(&units, &ContentOptions::default());

    assert!(!report.succeeded);
    assert!(!report.details["module"].succeeded);
    assert!(report.details["rpm"].succeeded);
    assert_eq!(report.num_changes, 1);
}

#[test]
fn test_dry_run_never_commits() {
    let backend = Arc::new(RecordingBackend::default());
    let dispatcher = Dispatcher::with_default_handlers(backend.clone());

    let units = vec![unit("rpm", json!({"name": "zsh"}))];
    let options = ContentOptions {
        apply: false,
        all: false,
    };
    let report = dispatcher.uninstall(&units, &options);

    assert!(report.succeeded);
    assert_eq!(backend.calls(), vec!["uninstall:1:false".to_string()]);
}

#[test]
fn test_update_all_routes_to_full_system_update() {
    let backend = Arc::new(RecordingBackend::default());
    let dispatcher = Dispatcher::with_default_handlers(backend.clone());

    let units = vec![ContentUnit {
        type_id: "rpm".to_string(),
        unit_key: UnitKey::new(),
    }];
    let options = ContentOptions {
        apply: true,
        all: true,
    };
    let report = dispatcher.update(&units, &options);

    assert!(report.succeeded);
    assert_eq!(report.num_changes, 3);
    assert_eq!(backend.calls(), vec!["update_all:true".to_string()]);
}

#[test]
fn test_unresolvable_group_fails_that_type() {
    let backend = Arc::new(RecordingBackend::default());
    let dispatcher = Dispatcher::with_default_handlers(backend.clone());

    let units = vec![unit("package_group", json!({"name": "missing"}))];
    let report = dispatcher.install(&units, &ContentOptions::default());

    assert!(!report.succeeded);
    assert_eq!(report.num_changes, 0);
    // Resolution failed before any mutation.
    assert_eq!(backend.calls(), vec!["resolve_groups:1".to_string()]);
}

#[test]
fn test_report_wire_shape() {
    let backend = Arc::new(RecordingBackend::default());
    let dispatcher = Dispatcher::with_default_handlers(backend);

    let units = vec![unit("rpm", json!({"name": "zsh"}))];
    let report = dispatcher.install(&units, &ContentOptions::default());

    let wire = serde_json::to_value(&report).unwrap();
    assert_eq!(wire["succeeded"], json!(true));
    assert_eq!(wire["num_changes"], json!(1));
    assert_eq!(wire["reboot"]["scheduled"], json!(false));
    assert!(wire["details"]["rpm"]["details"].is_object());
}
