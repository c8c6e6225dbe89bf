// src/backend/mod.rs

//! Package management backends
//!
//! Two interchangeable drivers for the system's native package manager sit
//! behind the `ContentBackend` trait: a dnf-flavored backend and a legacy
//! yum-flavored one. Selection happens once at startup by explicit tool
//! detection (dnf preferred). Both drive the package manager as a
//! subprocess with machine-parsable flags and translate the transaction
//! output into a `TransactionReport`.

pub mod dnf;
pub mod yum;

use crate::advisory::{AdvisoryFilter, AdvisoryKind};
use crate::content::Pattern;
use crate::error::{Error, Result};
use crate::version::RpmVersion;
use serde::Serialize;
use std::process::Command;
use tracing::{debug, info};

pub use dnf::DnfBackend;
pub use yum::YumBackend;

/// Capability interface over the native package manager.
///
/// All operations stage pattern-based mutations, resolve dependencies
/// without allowing implicit erasures, and either commit or dry-run
/// depending on `commit`. Every operation yields a `TransactionReport`,
/// even when the transaction partially failed.
pub trait ContentBackend: Send + Sync {
    /// Backend name ("dnf" or "yum").
    fn name(&self) -> &'static str;

    /// Install packages matching the patterns.
    fn install(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport>;

    /// Update packages matching the patterns.
    fn update(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport>;

    /// Full-system update.
    fn update_all(&self, commit: bool) -> Result<TransactionReport>;

    /// Upgrade every installed package affected by an advisory matching
    /// the filter, where the installed version is strictly older than the
    /// advisory's target version.
    fn update_by_advisories(&self, filter: &AdvisoryFilter, commit: bool)
    -> Result<TransactionReport>;

    /// Remove packages matching the patterns.
    fn uninstall(&self, patterns: &[Pattern], commit: bool) -> Result<TransactionReport>;

    /// Resolve group names to backend group ids. Fails on the first
    /// unresolvable name, before any mutation.
    fn resolve_groups(&self, names: &[String]) -> Result<Vec<String>>;

    /// Install the given package groups (by resolved id).
    fn group_install(&self, group_ids: &[String], commit: bool) -> Result<TransactionReport>;

    /// Remove the given package groups (by resolved id).
    fn group_remove(&self, group_ids: &[String], commit: bool) -> Result<TransactionReport>;
}

/// Select a backend by explicit tool detection: dnf first, yum as the
/// legacy fallback.
pub fn detect() -> Result<Box<dyn ContentBackend>> {
    if which::which("dnf").is_ok() {
        debug!("Selected dnf backend");
        return Ok(Box::new(DnfBackend::new()));
    }
    if which::which("yum").is_ok() {
        debug!("Selected legacy yum backend");
        return Ok(Box::new(YumBackend::new()));
    }
    Err(Error::ToolNotFound(
        "neither dnf nor yum is installed".to_string(),
    ))
}

/// Transaction verb, used for report logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Install,
    Update,
    Erase,
}

impl TxKind {
    fn heading(self) -> &'static str {
        match self {
            Self::Install => "Installed",
            Self::Update => "Updated",
            Self::Erase => "Erased",
        }
    }
}

/// One package touched by a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct PackageChange {
    pub qname: String,
    pub repoid: String,
    pub name: String,
    pub epoch: String,
    pub version: String,
    pub release: String,
    pub arch: String,
}

/// Partitioned view of one native transaction: `resolved` holds the
/// intentional changes, `failed` the errored items, and `deps` changes
/// pulled in only as dependencies. The dnf backend does not distinguish
/// dependency changes, so its `deps` list is always empty.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    #[serde(skip)]
    kind: TxKind,
    pub resolved: Vec<PackageChange>,
    pub failed: Vec<PackageChange>,
    pub deps: Vec<PackageChange>,
}

impl TransactionReport {
    pub fn new(kind: TxKind) -> Self {
        Self {
            kind,
            resolved: Vec::new(),
            failed: Vec::new(),
            deps: Vec::new(),
        }
    }

    /// Number of changes the transaction made (or would make).
    pub fn num_changes(&self) -> u64 {
        (self.resolved.len() + self.deps.len()) as u64
    }

    /// Move every pending change into the failed list. Used when the
    /// package manager aborted after resolution.
    pub fn mark_failed(&mut self) {
        self.failed.append(&mut self.resolved);
        self.failed.append(&mut self.deps);
    }

    /// Log a human-readable summary of committed changes.
    pub fn log_committed(&self) {
        if self.resolved.is_empty() && self.deps.is_empty() {
            return;
        }
        for change in self.resolved.iter().chain(&self.deps) {
            info!("{}: {}", self.kind.heading(), change.qname);
        }
    }
}

/// Transaction table section classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SectionKind {
    /// Intentional change ("Installing:", "Upgrading:", "Removing:", ...).
    Primary,
    /// Change pulled in only as a dependency.
    Dependency,
}

fn section_kind(header: &str) -> Option<SectionKind> {
    match header {
        "Installing:" | "Upgrading:" | "Updating:" | "Removing:" | "Reinstalling:"
        | "Downgrading:" => Some(SectionKind::Primary),
        "Installing dependencies:"
        | "Installing weak dependencies:"
        | "Installing for dependencies:"
        | "Updating for dependencies:"
        | "Removing dependent packages:"
        | "Removing unused dependencies:" => Some(SectionKind::Dependency),
        _ => None,
    }
}

/// Parse the transaction table dnf/yum print before acting.
///
/// The table lists one package per line under section headers:
///
/// ```text
/// Installing:
///  zsh          x86_64       5.8-9.el9        baseos       3.2 M
/// Installing dependencies:
///  zsh-common   noarch       5.8-9.el9        baseos       1.1 M
/// ```
///
/// Columns are name, arch, [epoch:]version-release, repository. Parsing
/// stops at the transaction summary.
pub(crate) fn parse_transaction_table(stdout: &str) -> Vec<(PackageChange, SectionKind)> {
    let mut changes = Vec::new();
    let mut current: Option<SectionKind> = None;
    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Transaction Summary") {
            break;
        }
        if let Some(kind) = section_kind(trimmed) {
            current = Some(kind);
            continue;
        }
        // Section content is indented; anything else ends the section.
        if !line.starts_with(' ') {
            current = None;
            continue;
        }
        let Some(kind) = current else { continue };
        let columns: Vec<&str> = trimmed.split_whitespace().collect();
        if columns.len() < 4 {
            continue;
        }
        let (name, arch, evr, repoid) = (columns[0], columns[1], columns[2], columns[3]);
        let (epoch, version, release) = split_evr(evr);
        changes.push((
            PackageChange {
                qname: qualified_name(name, &epoch, &version, &release, arch),
                repoid: repoid.to_string(),
                name: name.to_string(),
                epoch,
                version,
                release,
                arch: arch.to_string(),
            },
            kind,
        ));
    }
    changes
}

/// Split `[epoch:]version[-release]` into its components. A missing epoch
/// is "0", a missing release is empty.
pub(crate) fn split_evr(evr: &str) -> (String, String, String) {
    let (epoch, rest) = match evr.split_once(':') {
        Some((e, r)) => (e.to_string(), r),
        None => ("0".to_string(), evr),
    };
    let (version, release) = match rest.rsplit_once('-') {
        Some((v, r)) => (v.to_string(), r.to_string()),
        None => (rest.to_string(), String::new()),
    };
    (epoch, version, release)
}

fn qualified_name(name: &str, epoch: &str, version: &str, release: &str, arch: &str) -> String {
    let mut qname = String::new();
    if !epoch.is_empty() && epoch != "0" {
        qname.push_str(epoch);
        qname.push(':');
    }
    qname.push_str(name);
    qname.push('-');
    qname.push_str(version);
    if !release.is_empty() {
        qname.push('-');
        qname.push_str(release);
    }
    qname.push('.');
    qname.push_str(arch);
    qname
}

/// Parse a verbose group listing ("Group Name (group-id)" lines).
pub(crate) fn parse_group_listing(stdout: &str) -> Vec<(String, String)> {
    let mut groups = Vec::new();
    for line in stdout.lines() {
        let trimmed = line.trim();
        let Some(open) = trimmed.rfind('(') else {
            continue;
        };
        let Some(close) = trimmed.rfind(')') else {
            continue;
        };
        if close < open {
            continue;
        }
        let name = trimmed[..open].trim();
        let id = trimmed[open + 1..close].trim();
        if name.is_empty() || id.is_empty() || id.contains(' ') {
            continue;
        }
        groups.push((name.to_string(), id.to_string()));
    }
    groups
}

/// One row of `updateinfo list`: advisory id, category label, package NEVRA.
#[derive(Debug, Clone)]
pub(crate) struct AdvisoryListing {
    pub id: String,
    pub kind: AdvisoryKind,
    pub name: String,
    pub evr: String,
    pub arch: String,
}

/// Parse `dnf updateinfo list` / `yum updateinfo list` output. Rows are
/// three whitespace-separated columns; anything else is chatter.
pub(crate) fn parse_updateinfo_listing(stdout: &str) -> Vec<AdvisoryListing> {
    let mut listings = Vec::new();
    for line in stdout.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() != 3 {
            continue;
        }
        let (id, label, nevra) = (columns[0], columns[1], columns[2]);
        let Some((name, evr, arch)) = split_nevra(nevra) else {
            continue;
        };
        listings.push(AdvisoryListing {
            id: id.to_string(),
            kind: AdvisoryKind::parse(label),
            name,
            evr,
            arch,
        });
    }
    listings
}

/// Split a full `name-[epoch:]version-release.arch` string.
pub(crate) fn split_nevra(nevra: &str) -> Option<(String, String, String)> {
    let (rest, arch) = nevra.rsplit_once('.')?;
    let mut pieces = rest.rsplitn(3, '-');
    let release = pieces.next()?;
    let version = pieces.next()?;
    let name = pieces.next()?;
    if name.is_empty() || version.is_empty() || release.is_empty() {
        return None;
    }
    Some((
        name.to_string(),
        format!("{version}-{release}"),
        arch.to_string(),
    ))
}

/// Query the installed version of a package from the RPM database.
/// Multi-install packages (kernel) report one EVR per line; the newest
/// one is the comparison base. Returns None when the package is not
/// installed.
pub(crate) fn installed_evr(name: &str, arch: &str) -> Result<Option<RpmVersion>> {
    let output = Command::new("rpm")
        .args([
            "-q",
            &format!("{name}.{arch}"),
            "--queryformat",
            "%{EPOCH}:%{VERSION}-%{RELEASE}\n",
        ])
        .output()
        .map_err(|e| Error::InitError(format!("Failed to run rpm: {}", e)))?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(newest_evr(&String::from_utf8_lossy(&output.stdout)))
}

/// The newest EVR among the query output lines.
pub(crate) fn newest_evr(stdout: &str) -> Option<RpmVersion> {
    stdout
        .lines()
        .filter_map(|line| {
            let evr = line.trim().replace("(none):", "0:");
            RpmVersion::parse(&evr).ok()
        })
        .max()
}
