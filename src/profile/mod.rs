// src/profile/mod.rs

//! Installed-package profile
//!
//! Queries the local RPM database for the full package set and uploads it
//! to the management server, deduplicated through the upload cache.

pub mod repos;

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::upload::{ConsumerIdentity, UepClient, UploadCache};
use serde::Serialize;
use std::process::Command;
use tracing::{debug, info};

/// Cache file holding the last uploaded profile.
pub const PROFILE_CACHE_NAME: &str = "packages.json";

/// One installed package as reported to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileEntry {
    pub name: String,
    pub epoch: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub vendor: String,
}

/// Query the installed-package profile from the RPM database.
pub fn collect_profile() -> Result<Vec<ProfileEntry>> {
    debug!("Querying installed packages for profile upload");

    let output = Command::new("rpm")
        .args([
            "-qa",
            "--queryformat",
            "%{NAME}|%{EPOCH}|%{VERSION}|%{RELEASE}|%{ARCH}|%{VENDOR}\n",
        ])
        .output()
        .map_err(|e| Error::InitError(format!("Failed to run rpm: {}. Is rpm installed?", e)))?;

    if !output.status.success() {
        return Err(Error::CommandFailed(format!(
            "rpm -qa: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let entries = parse_profile_output(&String::from_utf8_lossy(&output.stdout));
    debug!("Collected {} packages", entries.len());
    Ok(entries)
}

/// Parse `rpm -qa` queryformat lines into profile entries. Malformed
/// lines are skipped.
pub(crate) fn parse_profile_output(stdout: &str) -> Vec<ProfileEntry> {
    let mut entries = Vec::new();
    for line in stdout.lines() {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 6 {
            continue;
        }
        entries.push(ProfileEntry {
            name: parts[0].to_string(),
            epoch: none_to_zero(parts[1]),
            version: parts[2].to_string(),
            release: parts[3].to_string(),
            arch: none_to_default(parts[4], "noarch"),
            vendor: none_to_default(parts[5], ""),
        });
    }
    entries
}

fn none_to_zero(value: &str) -> String {
    if value == "(none)" || value.is_empty() {
        "0".to_string()
    } else {
        value.to_string()
    }
}

fn none_to_default(value: &str, default: &str) -> String {
    if value == "(none)" {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Upload the package profile. Returns false when the upload was skipped
/// (plugin disabled or content unchanged since the last upload).
pub fn upload_profile(config: &AgentConfig, force: bool) -> Result<bool> {
    if !config.package_profile_enabled(force) {
        info!("Package profile upload is disabled");
        return Ok(false);
    }
    let identity = ConsumerIdentity::load(&config.server.consumer_cert)?;
    let profile = collect_profile()?;
    let content = serde_json::to_value(&profile)?;

    let cache = UploadCache::new(&config.paths.cache_dir, PROFILE_CACHE_NAME);
    if !force && cache.is_current(&identity.id, &content) {
        debug!("Package profile unchanged, skipping upload");
        return Ok(false);
    }

    let client = UepClient::new(&config.server)?;
    client.put_json(&format!("/consumers/{}/profiles", identity.id), &content)?;
    cache.save(&identity.id, &content)?;
    info!("Uploaded package profile ({} packages)", profile.len());
    Ok(true)
}

/// Drop the profile cache so the next upload is unconditional.
pub fn purge_profile_cache(config: &AgentConfig) -> Result<()> {
    UploadCache::new(&config.paths.cache_dir, PROFILE_CACHE_NAME).purge()
}
