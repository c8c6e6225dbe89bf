// src/tracer/mod.rs

//! Restart tracing
//!
//! Detects applications still running with outdated binaries or
//! libraries after an update and reports them to the management server,
//! each with a hint telling the operator what kind of restart fixes it.

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::upload::{ConsumerIdentity, UepClient};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::process::Command;
use tracing::{debug, info};

/// Restart hint for processes requiring a full reboot.
pub const REBOOT_HELPER: &str = "You will have to reboot your computer";

/// Restart hint for session-scoped processes.
pub const SESSION_HELPER: &str = "You will have to log out & log in again";

/// Services that cannot be restarted without a reboot.
const STATIC_SERVICES: &[&str] = &["systemd", "dbus"];

/// Processes that are never worth reporting.
const IGNORE_APPS: &[&str] = &["sudo", "su", "(sd-pam)"];

/// What kind of restart clears a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// A daemon that can be restarted in place.
    Daemon,
    /// A user-session process; log out and back in.
    Session,
    /// Core plumbing that only a reboot replaces.
    Static,
}

impl TraceKind {
    pub fn label(&self) -> &'static str {
        match self {
            TraceKind::Daemon => "daemon",
            TraceKind::Session => "session",
            TraceKind::Static => "static",
        }
    }
}

/// One application that needs a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub name: String,
    pub helper: String,
    pub kind: TraceKind,
}

impl Trace {
    fn new(name: &str) -> Self {
        let kind = classify(name);
        let helper = match kind {
            TraceKind::Daemon => format!("systemctl restart {}", name),
            TraceKind::Session => SESSION_HELPER.to_string(),
            TraceKind::Static => REBOOT_HELPER.to_string(),
        };
        Self {
            name: name.to_string(),
            helper,
            kind,
        }
    }

    fn kernel() -> Self {
        Self {
            name: "kernel".to_string(),
            helper: REBOOT_HELPER.to_string(),
            kind: TraceKind::Static,
        }
    }
}

fn classify(name: &str) -> TraceKind {
    if STATIC_SERVICES.contains(&name) {
        TraceKind::Static
    } else if name.starts_with("gnome-")
        || name.starts_with("kde")
        || name.ends_with("-session")
    {
        TraceKind::Session
    } else {
        TraceKind::Daemon
    }
}

/// Collect the applications that need restarting.
///
/// `dnf needs-restarting` lists processes running with files replaced
/// since they started; its `-r` mode reports (via exit code 1) whether
/// the booted kernel or core libraries are outdated.
pub fn collect_traces() -> Result<Vec<Trace>> {
    debug!("Querying processes that need restarting");

    let output = Command::new("dnf")
        .args(["-q", "needs-restarting"])
        .output()
        .map_err(|e| Error::InitError(format!("Failed to run dnf: {}. Is dnf installed?", e)))?;
    if !output.status.success() {
        return Err(Error::CommandFailed(format!(
            "dnf needs-restarting: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let mut traces = parse_needs_restarting(&String::from_utf8_lossy(&output.stdout));

    let reboot = Command::new("dnf")
        .args(["-q", "needs-restarting", "-r"])
        .output()
        .map_err(|e| Error::InitError(format!("Failed to run dnf: {}", e)))?;
    if reboot.status.code() == Some(1) {
        traces.push(Trace::kernel());
    }

    debug!("Found {} traces", traces.len());
    Ok(traces)
}

/// Parse `dnf needs-restarting` output: one `pid : cmdline` per line.
/// Process names are resolved from the command line, deduplicated, and
/// filtered against the ignore list.
pub(crate) fn parse_needs_restarting(stdout: &str) -> Vec<Trace> {
    let mut seen = Vec::new();
    let mut traces = Vec::new();
    for line in stdout.lines() {
        let Some((pid, cmdline)) = line.split_once(':') else {
            continue;
        };
        if pid.trim().parse::<u32>().is_err() {
            continue;
        }
        let Some(name) = process_name(cmdline.trim()) else {
            continue;
        };
        if IGNORE_APPS.contains(&name.as_str()) || seen.contains(&name) {
            continue;
        }
        seen.push(name.clone());
        traces.push(Trace::new(&name));
    }
    traces
}

/// Derive a process name from a command line: the executable basename,
/// skipping interpreter prefixes.
fn process_name(cmdline: &str) -> Option<String> {
    let first = cmdline.split_whitespace().next()?;
    let base = first.rsplit('/').next()?;
    // Interpreted processes report as "python3 /usr/sbin/foo"; use the
    // script name instead.
    if base.starts_with("python") || base == "perl" || base == "ruby" {
        if let Some(script) = cmdline.split_whitespace().nth(1) {
            return script.rsplit('/').next().map(|s| s.to_string());
        }
    }
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

/// Build the wire document: `{traces: {name: {helper, type}}}`.
///
/// The package-manager processes themselves are dropped when the report
/// is triggered by a transaction; the transaction that just ran is what
/// made them outdated.
pub fn traces_document(traces: &[Trace], skip_package_manager: bool) -> Value {
    let mut entries = BTreeMap::new();
    for trace in traces {
        if skip_package_manager && matches!(trace.name.as_str(), "dnf" | "yum") {
            continue;
        }
        entries.insert(
            trace.name.clone(),
            json!({ "helper": trace.helper, "type": trace.kind.label() }),
        );
    }
    json!({ "traces": entries })
}

/// Collect and upload the restart traces.
pub fn upload_traces(config: &AgentConfig, skip_package_manager: bool) -> Result<usize> {
    let identity = ConsumerIdentity::load(&config.server.consumer_cert)?;
    let traces = collect_traces()?;
    let document = traces_document(&traces, skip_package_manager);

    let client = UepClient::new(&config.server)?;
    client.put_json(&format!("/consumers/{}/tracer", identity.id), &document)?;
    info!("Uploaded {} restart traces", traces.len());
    Ok(traces.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_needs_restarting() {
        let stdout = "\
1 : /usr/lib/systemd/systemd --switched-root --system
824 : /usr/sbin/sshd -D
901 : python3 /usr/sbin/firewalld --nofork
1044 : sudo -i
1100 : /usr/sbin/sshd -D
";
        let traces = parse_needs_restarting(stdout);
        let names: Vec<&str> = traces.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["systemd", "sshd", "firewalld"]);
    }

    #[test]
    fn test_classification_and_helpers() {
        let systemd = Trace::new("systemd");
        assert_eq!(systemd.kind, TraceKind::Static);
        assert_eq!(systemd.helper, REBOOT_HELPER);

        let session = Trace::new("gnome-shell");
        assert_eq!(session.kind, TraceKind::Session);
        assert_eq!(session.helper, SESSION_HELPER);

        let daemon = Trace::new("sshd");
        assert_eq!(daemon.kind, TraceKind::Daemon);
        assert_eq!(daemon.helper, "systemctl restart sshd");
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let traces = parse_needs_restarting("not a pid : /usr/bin/foo\nno separator line\n");
        assert!(traces.is_empty());
    }

    #[test]
    fn test_document_shape_and_package_manager_skip() {
        let traces = vec![Trace::new("sshd"), Trace::new("dnf")];

        let document = traces_document(&traces, true);
        assert_eq!(
            document,
            json!({
                "traces": {
                    "sshd": {"helper": "systemctl restart sshd", "type": "daemon"}
                }
            })
        );

        let full = traces_document(&traces, false);
        assert!(full["traces"].get("dnf").is_some());
    }

    #[test]
    fn test_kernel_trace() {
        let kernel = Trace::kernel();
        assert_eq!(kernel.kind, TraceKind::Static);
        assert_eq!(kernel.helper, REBOOT_HELPER);
    }
}
