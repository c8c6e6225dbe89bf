// src/backend/yum.rs

//! Legacy yum-flavored backend
//!
//! Same contract as the dnf backend, for hosts where only yum exists.
//! Unlike dnf, yum's transaction table separates explicit changes from
//! dependency pulls, so this backend populates the `deps` partition.

use crate::advisory::AdvisoryFilter;
use crate::backend::{
    ContentBackend, SectionKind, TransactionReport, TxKind, installed_evr, parse_group_listing,
    parse_transaction_table, parse_updateinfo_listing,
};
use crate::content::Pattern;
use crate::error::{Error, Result};
use crate::version::RpmVersion;
use std::process::Command;
use tracing::debug;

/// The legacy yum content backend.
pub struct YumBackend;

impl YumBackend {
    pub fn new() -> Self {
        Self
    }

    fn transaction(
        &self,
        kind: TxKind,
        verb: &[&str],
        arguments: &[String],
        commit: bool,
    ) -> Result<TransactionReport> {
        let downloads = matches!(kind, TxKind::Install | TxKind::Update);
        let mut cmd = Command::new("yum");
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

        debug!("Running yum {} ({} arguments)", verb.join(" "), arguments.len());
        let output = cmd
            .output()
            .map_err(|e| Error::InitError(format!("Failed to run yum: {}. Is yum installed?", e)))?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        let mut report = TransactionReport::new(kind);
        for (change, section) in parse_transaction_table(&stdout) {
            match section {
                SectionKind::Primary => report.resolved.push(change),
                SectionKind::Dependency => report.deps.push(change),
            }
        }

        if !output.status.success() && !abort_expected {
            if report.num_changes() == 0 {
                return Err(Error::CommandFailed(format!(
                    "yum {}: {}",
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
        let output = Command::new("yum")
            .args(["-q", "--color=never", "-v", "grouplist", "hidden"])
            .output()
            .map_err(|e| Error::InitError(format!("Failed to run yum: {}", e)))?;
        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "yum grouplist: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_group_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn applicable_patterns(&self, filter: &AdvisoryFilter) -> Result<Vec<String>> {
        let output = Command::new("yum")
            .args(["-q", "--color=never", "updateinfo", "list"])
            .output()
            .map_err(|e| Error::InitError(format!("Failed to run yum: {}", e)))?;
        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "yum updateinfo list: {}",
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

impl Default for YumBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentBackend for YumBackend {
    fn name(&self) -> &'static str {
        "yum"
    }

    fn install(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport> {
        let arguments: Vec<String> = patterns.iter().map(Pattern::nevra).collect();
        self.transaction(TxKind::Install, &["install"], &arguments, commit)
    }

    fn update(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport> {
        let arguments: Vec<String> = patterns.iter().map(Pattern::nevra).collect();
        self.transaction(TxKind::Update, &["update"], &arguments, commit)
    }

    fn update_all(&self, commit: bool) -> Result<TransactionReport> {
        self.transaction(TxKind::Update, &["update"], &[], commit)
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
        self.transaction(TxKind::Update, &["update"], &patterns, commit)
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
        self.transaction(TxKind::Install, &["groupinstall"], group_ids, commit)
    }

    fn group_remove(&self, group_ids: &[String], commit: bool) -> Result<TransactionReport> {
        self.transaction(TxKind::Erase, &["groupremove"], group_ids, commit)
    }
}
