// src/backend/dnf.rs

//! dnf-flavored backend
//!
//! Drives dnf as a subprocess. Repository metadata is refreshed at most
//! once per process through an explicit initialization token; dnf's own
//! plugin and logging state cannot be safely reinitialized, and this layer
//! assumes no two transaction sessions run concurrently in one process.

use crate::advisory::AdvisoryFilter;
use crate::backend::{
    ContentBackend, TransactionReport, TxKind, installed_evr, parse_group_listing,
    parse_transaction_table, parse_updateinfo_listing,
};
use crate::content::Pattern;
use crate::error::{Error, Result};
use crate::version::RpmVersion;
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Process-wide initialization token. Set exactly once, never cleared.
static LIB_INIT: OnceLock<()> = OnceLock::new();

/// The dnf content backend.
pub struct DnfBackend;

impl DnfBackend {
    pub fn new() -> Self {
        Self
    }

    /// Idempotent one-time setup: refresh repository metadata. Later
    /// calls are no-ops for the lifetime of the process.
    fn ensure_initialized() -> Result<()> {
        if LIB_INIT.get().is_some() {
            return Ok(());
        }
        debug!("Refreshing dnf metadata (one-time per process)");
        let output = Command::new("dnf")
            .args(["-q", "--color=never", "makecache", "--timer"])
            .output()
            .map_err(|e| Error::InitError(format!("Failed to run dnf: {}. Is dnf installed?", e)))?;
        if !output.status.success() {
            // Stale metadata degrades resolution but does not block it.
            warn!(
                "dnf makecache failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let _ = LIB_INIT.set(());
        Ok(())
    }

    /// Run one dnf transaction and translate its output.
    ///
    /// Dry runs on install/upgrade paths use `--downloadonly` so that
    /// artifacts are resolved and fetched without committing; removal dry
    /// runs use `--assumeno`, whose abort after resolution is expected and
    /// not an error. Implicit erasures stay disallowed: `--allowerasing`
    /// is never passed and dependent cleanup on remove is disabled.
    fn transaction(
        &self,
        kind: TxKind,
        verb: &[&str],
        arguments: &[String],
        commit: bool,
    ) -> Result<TransactionReport> {
        Self::ensure_initialized()?;
        let downloads = matches!(kind, TxKind::Install | TxKind::Update);
        let mut cmd = Command::new("dnf");
        cmd.args(["--color=never", "--setopt=clean_requirements_on_remove=0"]);
        let abort_expected = !commit && !downloads;
        if commit {
            cmd.arg("--assumeyes");
        } else if downloads {
            cmd.args(["--assumeyes", "--downloadonly"]);
        } else {
            cmd.arg("--assumeno");
        }
        cmd.args(verb);
        cmd.args(arguments);

        debug!("Running dnf {} ({} arguments)", verb.join(" "), arguments.len());
        let output = cmd
            .output()
            .map_err(|e| Error::InitError(format!("Failed to run dnf: {}", e)))?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        let mut report = TransactionReport::new(kind);
        for (change, _section) in parse_transaction_table(&stdout) {
            // dnf does not distinguish explicit from dependency changes;
            // everything lands in resolved and deps stays empty.
            report.resolved.push(change);
        }

        if !output.status.success() && !abort_expected {
            if report.num_changes() == 0 {
                return Err(Error::CommandFailed(format!(
                    "dnf {}: {}",
                    verb.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            report.mark_failed();
            return Ok(report);
        }

        if commit {
            report.log_committed();
        }
        Ok(report)
    }

    fn group_listing(&self) -> Result<Vec<(String, String)>> {
        Self::ensure_initialized()?;
        let output = Command::new("dnf")
            .args(["-q", "--color=never", "group", "list", "--hidden", "-v"])
            .output()
            .map_err(|e| Error::InitError(format!("Failed to run dnf: {}", e)))?;
        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "dnf group list: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_group_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Patterns for every advisory-affected package whose installed
    /// version is strictly older than the advisory target.
    fn applicable_patterns(&self, filter: &AdvisoryFilter) -> Result<Vec<String>> {
        Self::ensure_initialized()?;
        let output = Command::new("dnf")
            .args(["-q", "--color=never", "updateinfo", "list"])
            .output()
            .map_err(|e| Error::InitError(format!("Failed to run dnf: {}", e)))?;
        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "dnf updateinfo list: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let mut patterns = Vec::new();
        for listing in parse_updateinfo_listing(&String::from_utf8_lossy(&output.stdout)) {
            if !filter.matches(&listing.id, listing.kind) {
                continue;
            }
            let Some(installed) = installed_evr(&listing.name, &listing.arch)? else {
                continue;
            };
            let candidate = match RpmVersion::parse(&listing.evr) {
                Ok(version) => version,
                Err(_) => continue,
            };
            if installed < candidate {
                patterns.push(format!("{}-{}", listing.name, listing.evr));
            }
        }
        patterns.sort();
        patterns.dedup();
        Ok(patterns)
    }
}

impl Default for DnfBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentBackend for DnfBackend {
    fn name(&self) -> &'static str {
        "dnf"
    }

    fn install(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport> {
        let arguments: Vec<String> = patterns.iter().map(Pattern::nevra).collect();
        self.transaction(TxKind::Install, &["install"], &arguments, commit)
    }

    fn update(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport> {
        let arguments: Vec<String> = patterns.iter().map(Pattern::nevra).collect();
        self.transaction(TxKind::Update, &["upgrade"], &arguments, commit)
    }

    fn update_all(&self, commit: bool) -> Result<TransactionReport> {
        self.transaction(TxKind::Update, &["upgrade"], &[], commit)
    }

    fn update_by_advisories(
        &self,
        filter: &AdvisoryFilter,
        commit: bool,
    ) -> Result<TransactionReport> {
        let patterns = self.applicable_patterns(filter)?;
        if patterns.is_empty() {
            return Ok(TransactionReport::new(TxKind::Update));
        }
        self.transaction(TxKind::Update, &["upgrade"], &patterns, commit)
    }

    fn uninstall(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport> {
        let arguments: Vec<String> = patterns.iter().map(Pattern::nevra).collect();
        self.transaction(TxKind::Erase, &["remove"], &arguments, commit)
    }

    fn resolve_groups(&self, names: &[String]) -> Result<Vec<String>> {
        let listing = self.group_listing()?;
        let mut resolved = Vec::with_capacity(names.len());
        for wanted in names {
            let found = listing.iter().find(|(name, id)| {
                name.eq_ignore_ascii_case(wanted) || id.eq_ignore_ascii_case(wanted)
            });
            match found {
                Some((_, id)) => resolved.push(id.clone()),
                None => {
                    return Err(Error::NotFoundError(format!(
                        "Group \"{}\" not found.",
                        wanted
                    )));
                }
            }
        }
        Ok(resolved)
    }

    fn group_install(&self, group_ids: &[String], commit: bool) -> Result<TransactionReport> {
        self.transaction(TxKind::Install, &["group", "install"], group_ids, commit)
    }

    fn group_remove(&self, group_ids: &[String], commit: bool) -> Result<TransactionReport> {
        self.transaction(TxKind::Erase, &["group", "remove"], group_ids, commit)
    }
}
