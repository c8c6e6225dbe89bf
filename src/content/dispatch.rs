// src/content/dispatch.rs

//! Content dispatch
//!
//! Routes a batch of mixed-type content units to registered handlers and
//! aggregates the per-type results. Each type runs in isolation: a
//! handler failure is recorded under its type id and dispatch proceeds to
//! the next type.

use crate::backend::ContentBackend;
use crate::content::handler::{ContentHandler, ErratumHandler, GroupHandler, PackageHandler};
use crate::content::pattern::{ContentOptions, ContentUnit, UnitKey};
use crate::content::report::{DispatchReport, HandlerReport};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::error;

/// Handler roles. Only `Content` handlers are registered today; the
/// `System` role exists for dispatch requests that target the host rather
/// than its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    Content,
}

/// Explicit handler registry, constructed at startup and injected into
/// the dispatcher.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(Role, String), Arc<dyn ContentHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        role: Role,
        type_id: impl Into<String>,
        handler: Arc<dyn ContentHandler>,
    ) {
        self.handlers.insert((role, type_id.into()), handler);
    }

    /// Look up a handler. A missing registration is a caller or
    /// configuration bug, reported with a distinct error variant.
    pub fn find(&self, role: Role, type_id: &str) -> Result<&Arc<dyn ContentHandler>> {
        self.handlers
            .get(&(role, type_id.to_string()))
            .ok_or_else(|| Error::HandlerNotFound(type_id.to_string()))
    }
}

/// Dispatch operation, selecting the handler method to invoke.
#[derive(Debug, Clone, Copy)]
enum Op {
    Install,
    Update,
    Uninstall,
}

/// Delegates content operations to handlers based on each unit's type id.
pub struct Dispatcher {
    registry: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// A dispatcher with the standard content handlers (rpm,
    /// package_group, erratum) bound to one backend.
    pub fn with_default_handlers(backend: Arc<dyn ContentBackend>) -> Self {
        let mut registry = HandlerRegistry::new();
        registry.register(
            Role::Content,
            "rpm",
            Arc::new(PackageHandler::new(backend.clone())),
        );
        registry.register(
            Role::Content,
            "package_group",
            Arc::new(GroupHandler::new(backend.clone())),
        );
        registry.register(
            Role::Content,
            "erratum",
            Arc::new(ErratumHandler::new(backend)),
        );
        Self::new(registry)
    }

    /// Install content.
    pub fn install(&self, units: &[ContentUnit], options: &ContentOptions) -> DispatchReport {
        self.dispatch(Op::Install, units, options)
    }

    /// Update content.
    pub fn update(&self, units: &[ContentUnit], options: &ContentOptions) -> DispatchReport {
        self.dispatch(Op::Update, units, options)
    }

    /// Uninstall content.
    pub fn uninstall(&self, units: &[ContentUnit], options: &ContentOptions) -> DispatchReport {
        self.dispatch(Op::Uninstall, units, options)
    }

    /// Unit keys collated by type id.
    fn collated(units: &[ContentUnit]) -> BTreeMap<String, Vec<UnitKey>> {
        let mut collated: BTreeMap<String, Vec<UnitKey>> = BTreeMap::new();
        for unit in units {
            collated
                .entry(unit.type_id.clone())
                .or_default()
                .push(unit.unit_key.clone());
        }
        collated
    }

    fn dispatch(
        &self,
        op: Op,
        units: &[ContentUnit],
        options: &ContentOptions,
    ) -> DispatchReport {
        let mut dispatch_report = DispatchReport::new();
        for (type_id, unit_keys) in Self::collated(units) {
            let outcome = self
                .registry
                .find(Role::Content, &type_id)
                .and_then(|handler| match op {
                    Op::Install => handler.install(&unit_keys, options),
                    Op::Update => handler.update(&unit_keys, options),
                    Op::Uninstall => handler.uninstall(&unit_keys, options),
                });
            let report = match outcome {
                Ok(report) => report,
                Err(err) => {
                    error!("Handler failed for type {}: {}", type_id, err);
                    HandlerReport::from_error(&err)
                }
            };
            report.fold_into(&type_id, &mut dispatch_report);
        }
        dispatch_report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::handler::tests::MockBackend;
    use serde_json::json;

    fn unit(type_id: &str, key: serde_json::Value) -> ContentUnit {
        ContentUnit {
            type_id: type_id.to_string(),
            unit_key: match key {
                serde_json::Value::Object(map) => map,
                _ => panic!("expected object"),
            },
        }
    }

    fn dispatcher(backend: Arc<MockBackend>) -> Dispatcher {
        Dispatcher::with_default_handlers(backend)
    }

    #[test]
    fn test_install_mixed_types() {
        let backend = Arc::new(MockBackend::new());
        let units = vec![
            unit("rpm", json!({"name": "zsh"})),
            unit("rpm", json!({"name": "gawk"})),
            unit("package_group", json!({"name": "Development Tools"})),
        ];
        let report = dispatcher(backend).install(&units, &ContentOptions::default());
        assert!(report.succeeded);
        assert_eq!(report.details.len(), 2);
        // Two rpm changes plus one from the group transaction.
        assert_eq!(report.num_changes, 3);
    }

    #[test]
    fn test_partial_failure_is_contained_per_type() {
        let mut mock = MockBackend::new();
        mock.fail_advisories = true;
        let backend = Arc::new(mock);
        let units = vec![
            unit("rpm", json!({"name": "zsh"})),
            unit("erratum", json!({"id": "RHSA-2023:1234"})),
        ];
        let report = dispatcher(backend).install(&units, &ContentOptions::default());

        assert!(!report.succeeded);
        assert_eq!(report.details.len(), 2);
        assert!(report.details["rpm"].succeeded);
        assert!(!report.details["erratum"].succeeded);
        // Only the surviving type contributes changes.
        assert_eq!(report.num_changes, 1);
        assert_eq!(
            report.details["erratum"].details["message"],
            "Command failed: updateinfo unavailable"
        );
        assert!(report.details["erratum"].details["trace"].is_string());
    }

    #[test]
    fn test_unregistered_type_recorded_as_failure() {
        let backend = Arc::new(MockBackend::new());
        let units = vec![
            unit("rpm", json!({"name": "zsh"})),
            unit("module", json!({"name": "nodejs"})),
        ];
        let report = dispatcher(backend).install(&units, &ContentOptions::default());
        assert!(!report.succeeded);
        assert!(!report.details["module"].succeeded);
        assert_eq!(
            report.details["module"].details["message"],
            "No handler for content type: module"
        );
        assert!(report.details["rpm"].succeeded);
    }

    #[test]
    fn test_registry_find_distinguishes_missing_handler() {
        let registry = HandlerRegistry::new();
        let err = registry.find(Role::Content, "rpm").err();
        assert!(matches!(err, Some(Error::HandlerNotFound(_))));
    }

    #[test]
    fn test_details_entry_per_distinct_type() {
        let backend = Arc::new(MockBackend::new());
        let units = vec![
            unit("rpm", json!({"name": "a"})),
            unit("rpm", json!({"name": "b"})),
            unit("erratum", json!({"id": "RHSA-1"})),
            unit("package_group", json!({"name": "development"})),
        ];
        let report = dispatcher(backend).update(&units, &ContentOptions::default());
        assert_eq!(report.details.len(), 3);
    }

    #[test]
    fn test_uninstall_routes_to_handlers() {
        let backend = Arc::new(MockBackend::new());
        let units = vec![unit("rpm", json!({"name": "zsh"}))];
        let report = dispatcher(backend.clone()).uninstall(&units, &ContentOptions::default());
        assert!(report.succeeded);
        assert_eq!(backend.recorded(), vec!["uninstall:1:true"]);
    }
}
