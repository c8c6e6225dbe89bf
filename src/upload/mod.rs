// src/upload/mod.rs

//! Management server uploads
//!
//! The consumer identity comes from the subscription certificate; its
//! subject CN is the consumer id the server keys everything on. Reports
//! are PUT as JSON to per-consumer URLs, and an on-disk cache skips
//! uploads whose content has not changed since the last success.

use crate::config::ServerSection;
use crate::error::{Error, Result};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;
use x509_cert::Certificate;
use x509_cert::der::DecodePem;

/// The registered consumer this host acts as.
#[derive(Debug, Clone)]
pub struct ConsumerIdentity {
    pub id: String,
}

impl ConsumerIdentity {
    /// Read the consumer id from the identity certificate. A missing
    /// certificate means the host is not registered.
    pub fn load(cert_path: impl AsRef<Path>) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let pem = fs::read(cert_path).map_err(|_| {
            Error::NotRegistered(format!("no consumer certificate at {}", cert_path.display()))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|e| {
            Error::ParseError(format!("{}: {}", cert_path.display(), e))
        })?;
        let subject = certificate.tbs_certificate.subject.to_string();
        let id = cn_from_subject(&subject).ok_or_else(|| {
            Error::ParseError(format!("consumer certificate has no CN: {}", subject))
        })?;
        Ok(Self { id })
    }
}

/// Extract the CN attribute from an RFC 4514 subject string.
pub(crate) fn cn_from_subject(subject: &str) -> Option<String> {
    subject
        .split(',')
        .map(str::trim)
        .find_map(|component| component.strip_prefix("CN="))
        .map(|cn| cn.to_string())
}

/// Blocking client for the management server's consumer API.
pub struct UepClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl UepClient {
    /// Build a client authenticated with the consumer certificate.
    pub fn new(server: &ServerSection) -> Result<Self> {
        // Validate the base URL up front; failures here are configuration
        // bugs, not transport errors.
        Url::parse(&server.base_url)
            .map_err(|e| Error::ConfigError(format!("base_url {}: {}", server.base_url, e)))?;
        let mut pem = fs::read(&server.consumer_cert).map_err(|_| {
            Error::NotRegistered(format!(
                "no consumer certificate at {}",
                server.consumer_cert.display()
            ))
        })?;
        let key = fs::read(&server.consumer_key).map_err(|_| {
            Error::NotRegistered(format!(
                "no consumer key at {}",
                server.consumer_key.display()
            ))
        })?;
        pem.extend_from_slice(&key);
        let identity = reqwest::Identity::from_pem(&pem)?;
        let client = reqwest::blocking::Client::builder()
            .identity(identity)
            .build()?;
        Ok(Self {
            base_url: server.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// PUT a JSON document to a server path (e.g.
    /// `/consumers/{id}/tracer`).
    pub fn put_json(&self, path: &str, body: &Value) -> Result<()> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("PUT {}", url);
        let response = self.client.put(&url).json(body).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UploadError(format!(
                "{} returned {}",
                url,
                status
            )));
        }
        Ok(())
    }
}

/// On-disk JSON cache deduplicating uploads per consumer. The cache holds
/// the last successfully uploaded document keyed by consumer id; an
/// identical document does not need to be re-sent.
pub struct UploadCache {
    path: PathBuf,
}

impl UploadCache {
    pub fn new(cache_dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            path: cache_dir.as_ref().join(name),
        }
    }

    fn keyed(consumer_id: &str, content: &Value) -> Value {
        json!({ consumer_id: content })
    }

    /// True when the cache already holds exactly this document for this
    /// consumer. An unreadable or corrupt cache is treated as stale.
    pub fn is_current(&self, consumer_id: &str, content: &Value) -> bool {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return false;
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(cached) => cached == Self::keyed(consumer_id, content),
            Err(_) => false,
        }
    }

    /// Record a successful upload.
    pub fn save(&self, consumer_id: &str, content: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(
            &self.path,
            serde_json::to_string(&Self::keyed(consumer_id, content))?,
        )?;
        Ok(())
    }

    /// Drop the cache so the next upload is unconditional.
    pub fn purge(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Purged upload cache {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
