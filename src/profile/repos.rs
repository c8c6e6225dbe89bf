// src/profile/repos.rs

//! Enabled-repositories report
//!
//! Builds the `{enabled_repos: {repos: [...]}}` document the server
//! expects, either from the subscription-managed yum/dnf `.repo` file or
//! from `zypper -x lr` XML on SUSE hosts, and uploads it with cache-based
//! deduplication.

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::upload::{ConsumerIdentity, UepClient, UploadCache};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use serde_json::{Value, json};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Cache file holding the last uploaded enabled-repos report.
pub const ENABLED_REPOS_CACHE_NAME: &str = "enabled_repos.json";

/// One enabled repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnabledRepo {
    pub repositoryid: String,
    pub baseurl: Vec<String>,
}

/// The enabled-repositories report.
#[derive(Debug, Clone)]
pub struct EnabledReport {
    pub content: Value,
}

impl EnabledReport {
    pub fn new(repos: Vec<EnabledRepo>) -> Result<Self> {
        Ok(Self {
            content: json!({ "enabled_repos": { "repos": serde_json::to_value(repos)? } }),
        })
    }

    /// Build the report from a yum/dnf `.repo` file. A missing file
    /// yields an empty report.
    pub fn from_repo_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        Self::new(parse_repo_file(&text))
    }

    /// Build the report from `zypper -x lr` output.
    pub fn from_zypper() -> Result<Self> {
        let output = Command::new("zypper")
            .args(["-x", "lr"])
            .output()
            .map_err(|e| Error::InitError(format!("Failed to run zypper: {}", e)))?;
        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "zypper lr: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Self::new(parse_zypper_xml(&String::from_utf8_lossy(&output.stdout))?)
    }

    /// Build the report for this host: the `.repo` file when present,
    /// zypper when available, an empty report otherwise.
    pub fn generate(config: &AgentConfig) -> Result<Self> {
        if config.paths.repo_file.exists() {
            return Self::from_repo_file(&config.paths.repo_file);
        }
        if which::which("zypper").is_ok() {
            return Self::from_zypper();
        }
        Self::new(Vec::new())
    }
}

/// Parse a yum/dnf `.repo` INI file, keeping only enabled sections.
/// A `baseurl` option may carry several URLs, separated by whitespace or
/// spread over indented continuation lines. Query strings are stripped
/// from the URLs; they carry entitlement tokens that must not be
/// reported.
pub(crate) fn parse_repo_file(text: &str) -> Vec<EnabledRepo> {
    let mut repos = Vec::new();
    let mut section: Option<String> = None;
    let mut enabled = false;
    let mut baseurl: Vec<String> = Vec::new();
    let mut in_baseurl = false;

    let mut flush = |section: &Option<String>, enabled: bool, baseurl: &[String]| {
        if let (Some(id), true) = (section, enabled) {
            repos.push(EnabledRepo {
                repositoryid: id.clone(),
                baseurl: baseurl.iter().map(|url| strip_query(url)).collect(),
            });
        }
    };

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            in_baseurl = false;
            continue;
        }
        // Indented lines continue the previous option; only baseurl
        // takes multiple values.
        if raw.starts_with([' ', '\t']) {
            if in_baseurl {
                baseurl.extend(line.split_whitespace().map(str::to_string));
            }
            continue;
        }
        in_baseurl = false;
        if line.starts_with('[') && line.ends_with(']') {
            flush(&section, enabled, &baseurl);
            section = Some(line[1..line.len() - 1].to_string());
            enabled = false;
            baseurl.clear();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "enabled" => enabled = matches!(value.trim(), "1" | "true" | "yes"),
            "baseurl" => {
                baseurl = value.split_whitespace().map(str::to_string).collect();
                in_baseurl = true;
            }
            _ => {}
        }
    }
    flush(&section, enabled, &baseurl);
    repos
}

fn strip_query(url: &str) -> String {
    match url.find('?') {
        Some(pos) => url[..pos].to_string(),
        None => url.to_string(),
    }
}

/// Parse `zypper -x lr` XML. Aliases carry an `rhsm:` prefix on
/// subscription-managed repositories which is stripped from the reported
/// id.
pub(crate) fn parse_zypper_xml(xml: &str) -> Result<Vec<EnabledRepo>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut repos = Vec::new();
    let mut alias: Option<String> = None;
    let mut enabled = false;
    let mut in_url = false;
    let mut url: Option<String> = None;

    loop {
        match reader
            .read_event()
            .map_err(|e| Error::ParseError(format!("zypper xml: {}", e)))?
        {
            Event::Start(ref tag) if tag.name().as_ref() == b"repo" => {
                alias = None;
                enabled = false;
                url = None;
                for attribute in tag.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attribute.value).to_string();
                    match attribute.key.as_ref() {
                        b"alias" => alias = Some(value),
                        b"enabled" => enabled = value == "1",
                        _ => {}
                    }
                }
            }
            Event::Start(ref tag) if tag.name().as_ref() == b"url" => {
                in_url = true;
            }
            Event::Text(ref text) if in_url => {
                url = Some(
                    text.unescape()
                        .map_err(|e| Error::ParseError(format!("zypper xml: {}", e)))?
                        .to_string(),
                );
            }
            Event::End(ref tag) if tag.name().as_ref() == b"url" => {
                in_url = false;
            }
            Event::End(ref tag) if tag.name().as_ref() == b"repo" => {
                if enabled && let Some(alias) = alias.take() {
                    let repositoryid = alias.strip_prefix("rhsm:").unwrap_or(&alias).to_string();
                    repos.push(EnabledRepo {
                        repositoryid,
                        baseurl: url.take().map(|u| strip_query(&u)).into_iter().collect(),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(repos)
}

/// Upload the enabled-repos report. Returns false when skipped (plugin
/// disabled or unchanged content).
pub fn upload_enabled_repos(config: &AgentConfig, force: bool) -> Result<bool> {
    if !config.enabled_repos_enabled(force) {
        info!("Enabled-repos upload is disabled");
        return Ok(false);
    }
    let identity = ConsumerIdentity::load(&config.server.consumer_cert)?;
    let report = EnabledReport::generate(config)?;

    let cache = UploadCache::new(&config.paths.cache_dir, ENABLED_REPOS_CACHE_NAME);
    if !force && cache.is_current(&identity.id, &report.content) {
        debug!("Enabled repos unchanged, skipping upload");
        return Ok(false);
    }

    let client = UepClient::new(&config.server)?;
    client.put_json(
        &format!("/systems/{}/enabled_repos", identity.id),
        &report.content,
    )?;
    cache.save(&identity.id, &report.content)?;
    info!("Uploaded enabled-repos report");
    Ok(true)
}

/// Drop the enabled-repos cache.
pub fn purge_enabled_repos_cache(config: &AgentConfig) -> Result<()> {
    UploadCache::new(&config.paths.cache_dir, ENABLED_REPOS_CACHE_NAME).purge()
}
