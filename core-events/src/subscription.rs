//! Declarative provider subscriptions.

use crate::error::{EventError, Result};
use crate::event::TraceEvent;
use crate::level::Level;
use crate::provider::{provider_id_for_name, ProviderDescriptor};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A filter admitting events of one provider at or below a severity level
/// and matching a keyword mask.
///
/// The provider may be referenced by explicit identifier, by name (resolved
/// through the deterministic name hash), or both; an explicit identifier
/// wins. A keyword mask of zero admits every keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<Uuid>,
    #[serde(default)]
    pub min_level: Level,
    #[serde(default)]
    pub keywords: u64,
}

impl Subscription {
    /// Subscription referencing a provider by name.
    pub fn by_name(name: impl Into<String>, min_level: Level, keywords: u64) -> Self {
        Self {
            provider_name: Some(name.into()),
            provider_id: None,
            min_level,
            keywords,
        }
    }

    /// Subscription referencing a provider by explicit identifier.
    pub fn by_id(id: Uuid, min_level: Level, keywords: u64) -> Self {
        Self {
            provider_name: None,
            provider_id: Some(id),
            min_level,
            keywords,
        }
    }

    /// Subscription referencing a registered provider handle.
    pub fn for_provider(provider: &ProviderDescriptor, min_level: Level, keywords: u64) -> Self {
        Self {
            provider_name: Some(provider.name().to_string()),
            provider_id: Some(provider.id()),
            min_level,
            keywords,
        }
    }

    /// Checks the identity constraints.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when neither name nor identifier is present, the
    /// name is empty, or the identifier is the nil GUID.
    pub fn validate(&self) -> Result<()> {
        match (&self.provider_name, &self.provider_id) {
            (None, None) => Err(EventError::InvalidArgument(
                "subscription must identify a provider by name or id".to_string(),
            )),
            (Some(name), _) if name.is_empty() => Err(EventError::InvalidArgument(
                "subscription provider name cannot be empty".to_string(),
            )),
            (_, Some(id)) if id.is_nil() => Err(EventError::InvalidArgument(
                "subscription provider id cannot be the nil GUID".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// The provider identifier this subscription resolves to.
    pub fn resolved_id(&self) -> Result<Uuid> {
        if let Some(id) = self.provider_id {
            if id.is_nil() {
                return Err(EventError::InvalidArgument(
                    "subscription provider id cannot be the nil GUID".to_string(),
                ));
            }
            return Ok(id);
        }
        match &self.provider_name {
            Some(name) if !name.is_empty() => Ok(provider_id_for_name(name)),
            _ => Err(EventError::InvalidArgument(
                "subscription must identify a provider by name or id".to_string(),
            )),
        }
    }

    /// Level/keyword admission, independent of provider identity.
    pub fn admits(&self, level: Level, keywords: u64) -> bool {
        level <= self.min_level && (self.keywords == 0 || (keywords & self.keywords) != 0)
    }

    /// Full admission check against an event.
    pub fn matches(&self, event: &TraceEvent) -> bool {
        match self.resolved_id() {
            Ok(id) => id == event.provider_id() && self.admits(event.level(), event.keywords()),
            Err(_) => false,
        }
    }
}

/// Equality is by resolved provider identity plus `(min_level, keywords)`,
/// so a name reference and its derived identifier compare equal.
impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        if self.min_level != other.min_level || self.keywords != other.keywords {
            return false;
        }
        match (self.resolved_id(), other.resolved_id()) {
            (Ok(a), Ok(b)) => a == b,
            _ => {
                self.provider_name == other.provider_name && self.provider_id == other.provider_id
            }
        }
    }
}

impl Eq for Subscription {}
