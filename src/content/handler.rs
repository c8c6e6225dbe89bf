// src/content/handler.rs

//! Content-type handlers
//!
//! One handler per content type performs the type-specific operation
//! against the package management backend. Handlers do not catch their own
//! errors; the dispatcher is the single containment layer above them.

use crate::advisory::AdvisoryFilter;
use crate::backend::{ContentBackend, TransactionReport};
use crate::content::pattern::{ContentOptions, Pattern, UnitKey};
use crate::content::report::HandlerReport;
use crate::error::{Error, Result};
use serde_json::json;
use std::sync::Arc;

/// Interface for handlers implementing content management requests.
pub trait ContentHandler: Send + Sync {
    /// Install content units.
    fn install(&self, unit_keys: &[UnitKey], options: &ContentOptions) -> Result<HandlerReport>;

    /// Update content units.
    fn update(&self, unit_keys: &[UnitKey], options: &ContentOptions) -> Result<HandlerReport>;

    /// Uninstall content units.
    fn uninstall(&self, unit_keys: &[UnitKey], options: &ContentOptions) -> Result<HandlerReport>;
}

/// Wrap a backend transaction into a handler report. The change count is
/// the resolved plus dependency changes; any failed item fails the report.
fn transaction_report(tx: &TransactionReport) -> Result<HandlerReport> {
    let details = serde_json::to_value(tx)?;
    if tx.failed.is_empty() {
        Ok(HandlerReport::succeeded(details, tx.num_changes()))
    } else {
        Ok(HandlerReport::failed(details))
    }
}

/// The package (rpm) content handler.
pub struct PackageHandler {
    backend: Arc<dyn ContentBackend>,
}

impl PackageHandler {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        Self { backend }
    }

    fn patterns(unit_keys: &[UnitKey]) -> Result<Vec<Pattern>> {
        unit_keys.iter().map(Pattern::from_unit_key).collect()
    }
}

impl ContentHandler for PackageHandler {
    fn install(&self, unit_keys: &[UnitKey], options: &ContentOptions) -> Result<HandlerReport> {
        let patterns = Self::patterns(unit_keys)?;
        let tx = self.backend.install(&patterns, options.apply)?;
        transaction_report(&tx)
    }

    fn update(&self, unit_keys: &[UnitKey], options: &ContentOptions) -> Result<HandlerReport> {
        if options.all {
            let tx = self.backend.update_all(options.apply)?;
            return transaction_report(&tx);
        }
        let patterns = Self::patterns(unit_keys)?;
        if patterns.is_empty() {
            // Nothing requested and no all-flag: a no-op success.
            return Ok(HandlerReport::succeeded(json!({}), 0));
        }
        let tx = self.backend.update(&patterns, options.apply)?;
        transaction_report(&tx)
    }

    fn uninstall(&self, unit_keys: &[UnitKey], options: &ContentOptions) -> Result<HandlerReport> {
        let patterns = Self::patterns(unit_keys)?;
        let tx = self.backend.uninstall(&patterns, options.apply)?;
        transaction_report(&tx)
    }
}

/// The package group content handler.
pub struct GroupHandler {
    backend: Arc<dyn ContentBackend>,
}

impl GroupHandler {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        Self { backend }
    }

    fn names(unit_keys: &[UnitKey]) -> Result<Vec<String>> {
        unit_keys
            .iter()
            .map(|key| match key.get("name").and_then(|v| v.as_str()) {
                Some(name) => Ok(name.to_string()),
                None => Err(Error::ParseError(format!(
                    "Group unit key has no name: {}",
                    serde_json::Value::Object(key.clone())
                ))),
            })
            .collect()
    }
}

impl ContentHandler for GroupHandler {
    fn install(&self, unit_keys: &[UnitKey], options: &ContentOptions) -> Result<HandlerReport> {
        let names = Self::names(unit_keys)?;
        // Every name must resolve before any group is touched.
        let group_ids = self.backend.resolve_groups(&names)?;
        let tx = self.backend.group_install(&group_ids, options.apply)?;
        transaction_report(&tx)
    }

    fn update(&self, _unit_keys: &[UnitKey], _options: &ContentOptions) -> Result<HandlerReport> {
        Err(Error::Unsupported("package group update"))
    }

    fn uninstall(&self, unit_keys: &[UnitKey], options: &ContentOptions) -> Result<HandlerReport> {
        let names = Self::names(unit_keys)?;
        let group_ids = self.backend.resolve_groups(&names)?;
        let tx = self.backend.group_remove(&group_ids, options.apply)?;
        transaction_report(&tx)
    }
}

/// The erratum (advisory) content handler. Advisories can only be
/// applied; they cannot be updated or uninstalled.
pub struct ErratumHandler {
    backend: Arc<dyn ContentBackend>,
}

impl ErratumHandler {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        Self { backend }
    }

    fn advisory_ids(unit_keys: &[UnitKey]) -> Result<Vec<String>> {
        unit_keys
            .iter()
            .map(|key| match key.get("id").and_then(|v| v.as_str()) {
                Some(id) => Ok(id.to_string()),
                None => Err(Error::ParseError(format!(
                    "Erratum unit key has no id: {}",
                    serde_json::Value::Object(key.clone())
                ))),
            })
            .collect()
    }
}

impl ContentHandler for ErratumHandler {
    fn install(&self, unit_keys: &[UnitKey], options: &ContentOptions) -> Result<HandlerReport> {
        let ids = Self::advisory_ids(unit_keys)?;
        let filter = AdvisoryFilter::by_ids(ids);
        let tx = self.backend.update_by_advisories(&filter, options.apply)?;
        transaction_report(&tx)
    }

    fn update(&self, _unit_keys: &[UnitKey], _options: &ContentOptions) -> Result<HandlerReport> {
        Err(Error::Unsupported("erratum update"))
    }

    fn uninstall(&self, _unit_keys: &[UnitKey], _options: &ContentOptions) -> Result<HandlerReport> {
        Err(Error::Unsupported("erratum uninstall"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::{PackageChange, TxKind};
    use serde_json::json;
    use std::sync::Mutex;

    /// Records backend calls and serves canned transactions.
    pub(crate) struct MockBackend {
        pub calls: Mutex<Vec<String>>,
        pub resolved_groups: Vec<(String, String)>,
        pub fail_advisories: bool,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                resolved_groups: vec![("Development Tools".to_string(), "development".to_string())],
                fail_advisories: false,
            }
        }

        pub fn recorded(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn canned(kind: TxKind, names: &[String]) -> TransactionReport {
            let mut tx = TransactionReport::new(kind);
            for name in names {
                tx.resolved.push(PackageChange {
                    qname: format!("{name}-1.0-1.el9.x86_64"),
                    repoid: "baseos".to_string(),
                    name: name.clone(),
                    epoch: "0".to_string(),
                    version: "1.0".to_string(),
                    release: "1.el9".to_string(),
                    arch: "x86_64".to_string(),
                });
            }
            tx
        }
    }

    impl ContentBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn install(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport> {
            self.record(format!("install:{}:{}", patterns.len(), commit));
            let names: Vec<String> = patterns.iter().map(|p| p.name.clone()).collect();
            Ok(Self::canned(TxKind::Install, &names))
        }

        fn update(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport> {
            self.record(format!("update:{}:{}", patterns.len(), commit));
            let names: Vec<String> = patterns.iter().map(|p| p.name.clone()).collect();
            Ok(Self::canned(TxKind::Update, &names))
        }

        fn update_all(&self, commit: bool) -> Result<TransactionReport> {
            self.record(format!("update_all:{}", commit));
            Ok(Self::canned(TxKind::Update, &["kernel".to_string()]))
        }

        fn update_by_advisories(
            &self,
            _filter: &AdvisoryFilter,
            commit: bool,
        ) -> Result<TransactionReport> {
            self.record(format!("update_by_advisories:{}", commit));
            if self.fail_advisories {
                return Err(Error::CommandFailed("updateinfo unavailable".to_string()));
            }
            Ok(Self::canned(TxKind::Update, &["httpd".to_string()]))
        }

        fn uninstall(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport> {
            self.record(format!("uninstall:{}:{}", patterns.len(), commit));
            let names: Vec<String> = patterns.iter().map(|p| p.name.clone()).collect();
            Ok(Self::canned(TxKind::Erase, &names))
        }

        fn resolve_groups(&self, names: &[String]) -> Result<Vec<String>> {
            self.record(format!("resolve_groups:{}", names.len()));
            names
                .iter()
                .map(|wanted| {
                    self.resolved_groups
                        .iter()
                        .find(|(name, id)| {
                            name.eq_ignore_ascii_case(wanted) || id.eq_ignore_ascii_case(wanted)
                        })
                        .map(|(_, id)| id.clone())
                        .ok_or_else(|| {
                            Error::NotFoundError(format!("Group \"{}\" not found.", wanted))
                        })
                })
                .collect()
        }

        fn group_install(&self, group_ids: &[String], commit: bool) -> Result<TransactionReport> {
            self.record(format!("group_install:{}:{}", group_ids.len(), commit));
            Ok(Self::canned(TxKind::Install, &["gcc".to_string()]))
        }

        fn group_remove(&self, group_ids: &[String], commit: bool) -> Result<TransactionReport> {
            self.record(format!("group_remove:{}:{}", group_ids.len(), commit));
            Ok(Self::canned(TxKind::Erase, &["gcc".to_string()]))
        }
    }

    fn unit_key(value: serde_json::Value) -> UnitKey {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_package_install_counts_changes() {
        let backend = Arc::new(MockBackend::new());
        let handler = PackageHandler::new(backend.clone());
        let keys = vec![unit_key(json!({"name": "zsh"}))];
        let report = handler.install(&keys, &ContentOptions::default()).unwrap();
        assert!(report.succeeded);
        assert_eq!(report.num_changes, 1);
        assert_eq!(backend.recorded(), vec!["install:1:true"]);
    }

    #[test]
    fn test_package_update_noop_without_patterns_or_all_flag() {
        let backend = Arc::new(MockBackend::new());
        let handler = PackageHandler::new(backend.clone());
        let report = handler.update(&[], &ContentOptions::default()).unwrap();
        assert!(report.succeeded);
        assert_eq!(report.num_changes, 0);
        assert!(backend.recorded().is_empty(), "no backend call expected");
    }

    #[test]
    fn test_package_update_all() {
        let backend = Arc::new(MockBackend::new());
        let handler = PackageHandler::new(backend.clone());
        let options = ContentOptions {
            apply: true,
            all: true,
        };
        let report = handler.update(&[], &options).unwrap();
        assert!(report.succeeded);
        assert_eq!(backend.recorded(), vec!["update_all:true"]);
    }

    #[test]
    fn test_package_dry_run_propagates_apply_flag() {
        let backend = Arc::new(MockBackend::new());
        let handler = PackageHandler::new(backend.clone());
        let keys = vec![unit_key(json!({"name": "zsh"}))];
        let options = ContentOptions {
            apply: false,
            all: false,
        };
        handler.uninstall(&keys, &options).unwrap();
        assert_eq!(backend.recorded(), vec!["uninstall:1:false"]);
    }

    #[test]
    fn test_group_install_fails_fast_on_unresolvable_name() {
        let backend = Arc::new(MockBackend::new());
        let handler = GroupHandler::new(backend.clone());
        let keys = vec![
            unit_key(json!({"name": "Development Tools"})),
            unit_key(json!({"name": "No Such Group"})),
        ];
        let err = handler
            .install(&keys, &ContentOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
        // Resolution failed before any mutation.
        assert_eq!(backend.recorded(), vec!["resolve_groups:2"]);
    }

    #[test]
    fn test_group_update_unsupported() {
        let backend = Arc::new(MockBackend::new());
        let handler = GroupHandler::new(backend);
        let err = handler.update(&[], &ContentOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_erratum_install() {
        let backend = Arc::new(MockBackend::new());
        let handler = ErratumHandler::new(backend.clone());
        let keys = vec![unit_key(json!({"id": "RHSA-2023:1234"}))];
        let report = handler.install(&keys, &ContentOptions::default()).unwrap();
        assert!(report.succeeded);
        assert_eq!(backend.recorded(), vec!["update_by_advisories:true"]);
    }

    #[test]
    fn test_erratum_uninstall_unsupported() {
        let backend = Arc::new(MockBackend::new());
        let handler = ErratumHandler::new(backend);
        let err = handler
            .uninstall(&[], &ContentOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
