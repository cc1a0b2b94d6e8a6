//! Common types used throughout Lantern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally supplied cache version tag (e.g. `v1.0.0`).
///
/// Changing the tag and re-running install/activate is the only way to
/// invalidate the cache as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag(String);

impl VersionTag {
    /// Create a new tag.
    ///
    /// # Errors
    /// - Returns error if the tag is empty or contains whitespace
    pub fn new(tag: impl Into<String>) -> crate::Result<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Version tag cannot be empty".to_string(),
            ));
        }
        if tag.chars().any(char::is_whitespace) {
            return Err(crate::Error::InvalidInput(format!(
                "Version tag cannot contain whitespace: {:?}",
                tag
            )));
        }
        Ok(Self(tag))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical role of a cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceRole {
    /// Pre-cached shell plus style/script assets.
    Static,
    /// Navigable pages and other same-origin reads.
    Pages,
    /// Image files.
    Images,
}

impl NamespaceRole {
    /// Every role, in a stable order.
    pub const ALL: [NamespaceRole; 3] = [
        NamespaceRole::Static,
        NamespaceRole::Pages,
        NamespaceRole::Images,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceRole::Static => "static",
            NamespaceRole::Pages => "pages",
            NamespaceRole::Images => "images",
        }
    }
}

impl fmt::Display for NamespaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, versioned partition of the cache store.
///
/// Identity is `name + version`, rendered as `name-version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheNamespace {
    pub name: String,
    pub version: String,
}

impl CacheNamespace {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// The namespace designated for `role` under `version`.
    pub fn for_role(role: NamespaceRole, version: &VersionTag) -> Self {
        Self::new(role.as_str(), version.as_str())
    }

    /// Storage identity, e.g. `static-v1.0.0`.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// Kind of a queued offline mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Form,
    Analytics,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Form => "form",
            ItemKind::Analytics => "analytics",
        }
    }

    /// Parse the stored representation.
    pub fn parse(kind: &str) -> crate::Result<Self> {
        match kind {
            "form" => Ok(ItemKind::Form),
            "analytics" => Ok(ItemKind::Analytics),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown queue item kind: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending offline mutation.
///
/// The id is assigned by the store at insertion and is strictly increasing;
/// items are never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub payload: serde_json::Value,
    #[serde(rename = "timestamp")]
    pub enqueued_at: DateTime<Utc>,
}
