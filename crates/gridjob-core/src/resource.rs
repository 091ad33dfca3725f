//! Deployment resources — code units, archives and data blobs shipped to
//! the cluster before a job runs.
//!
//! A resource is immutable once built. Its `digest` (SHA-256, hex) is the
//! content identity used to tell a harmless re-registration apart from a
//! conflicting one.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ResourceError;

/// What a resource is used for on the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// A single loadable code unit.
    Code,
    /// A packaged set of code units.
    Archive,
    /// Opaque data the job reads at runtime.
    Data,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Code => f.write_str("code"),
            ResourceType::Archive => f.write_str("archive"),
            ResourceType::Data => f.write_str("data"),
        }
    }
}

/// Resource content: bytes read on the client, or a locator the cluster fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Inline(#[serde(with = "hex_bytes")] Vec<u8>),
    Remote(String),
}

/// An immutable, named deployable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentResource {
    name: String,
    kind: ResourceType,
    payload: Payload,
    digest: String,
}

impl DeploymentResource {
    /// Build a resource from bytes already in memory.
    pub fn inline(name: &str, kind: ResourceType, bytes: Vec<u8>) -> Result<Self, ResourceError> {
        validate_resource_name(name)?;
        let digest = hex::encode(Sha256::digest(&bytes));
        Ok(Self {
            name: name.to_string(),
            kind,
            payload: Payload::Inline(bytes),
            digest,
        })
    }

    /// Build a resource from a locator.
    ///
    /// Local paths are read immediately; remote locators are kept as-is.
    /// `name` defaults to the last path segment of the locator.
    pub fn from_locator(
        locator: &str,
        name: Option<&str>,
        kind: ResourceType,
    ) -> Result<Self, ResourceError> {
        let parsed = Locator::parse(locator)?;
        let name = match name {
            Some(n) => n.to_string(),
            None => parsed.file_name(),
        };

        match parsed {
            Locator::File(path) => {
                let bytes = std::fs::read(&path).map_err(|e| ResourceError::unreadable(&path, e))?;
                Self::inline(&name, kind, bytes)
            }
            Locator::Remote(url) => {
                validate_resource_name(&name)?;
                let digest = hex::encode(Sha256::digest(url.as_bytes()));
                Ok(Self {
                    name,
                    kind,
                    payload: Payload::Remote(url),
                    digest,
                })
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceType {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// SHA-256 content identity (hex).
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Inline byte count; zero for remote payloads.
    pub fn size(&self) -> usize {
        match &self.payload {
            Payload::Inline(bytes) => bytes.len(),
            Payload::Remote(_) => 0,
        }
    }

    /// Same name, kind and content.
    pub fn same_content(&self, other: &DeploymentResource) -> bool {
        self.name == other.name && self.kind == other.kind && self.digest == other.digest
    }
}

/// Where a resource's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `file:///abs/path`, `/abs/path` or a relative path.
    File(PathBuf),
    /// `http://` or `https://`, fetched cluster-side.
    Remote(String),
}

impl Locator {
    pub fn parse(locator: &str) -> Result<Self, ResourceError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(ResourceError::UnsupportedLocator(locator.to_string()));
        }
        if let Some(path) = locator.strip_prefix("file://") {
            return Ok(Locator::File(PathBuf::from(path)));
        }
        if locator.starts_with("https://") || locator.starts_with("http://") {
            return Ok(Locator::Remote(locator.to_string()));
        }
        match locator.split_once("://") {
            Some((scheme, _)) => Err(ResourceError::UnsupportedLocator(format!(
                "{locator} (scheme '{scheme}')"
            ))),
            None => Ok(Locator::File(PathBuf::from(locator))),
        }
    }

    /// Last path segment, ignoring any query string or fragment.
    pub fn file_name(&self) -> String {
        match self {
            Locator::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Locator::Remote(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.rsplit('/').next().unwrap_or_default().to_string()
            }
        }
    }
}

/// Retrieves the bytes of a code unit from its stable identifier.
pub trait CodeLoader: Send + Sync {
    fn load(&self, identifier: &str) -> std::io::Result<Vec<u8>>;
}

/// Loads code units from files under a root directory.
///
/// Dotted identifiers map to nested paths: `com.acme.Tokenizer` resolves to
/// `{root}/com/acme/Tokenizer` when that file exists, otherwise the
/// identifier is used as a relative path verbatim.
#[derive(Debug, Clone)]
pub struct FsCodeLoader {
    root: PathBuf,
}

impl FsCodeLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, identifier: &str) -> PathBuf {
        let nested: PathBuf = identifier.split('.').collect();
        let candidate = self.root.join(nested);
        if candidate.is_file() {
            candidate
        } else {
            self.root.join(identifier)
        }
    }
}

impl CodeLoader for FsCodeLoader {
    fn load(&self, identifier: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.resolve(identifier))
    }
}

fn validate_resource_name(name: &str) -> Result<(), ResourceError> {
    if name.is_empty() || name.contains(['/', '\\', ':']) || name.chars().any(char::is_control) {
        return Err(ResourceError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Serialize byte payloads as a hex string instead of a JSON number array.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
