//! Event provider identity.

use crate::error::{EventError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace GUID used to derive provider identifiers from their names, so
/// that a provider referenced by name alone resolves to the same identifier
/// everywhere in the process.
pub const PROVIDER_NAMESPACE: Uuid = Uuid::from_bytes([
    0x48, 0x2c, 0x2d, 0xb2, 0xc3, 0x90, 0x47, 0xc8, 0x87, 0xf8, 0x1a, 0x15, 0xbf, 0xc1, 0x30,
    0xfb,
]);

/// Derives the deterministic identifier for a provider name.
///
/// The name is upper-cased before hashing so lookups are case-insensitive.
pub fn provider_id_for_name(name: &str) -> Uuid {
    Uuid::new_v5(&PROVIDER_NAMESPACE, name.to_uppercase().as_bytes())
}

/// Identity of a compile-time-declared source of events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    id: Uuid,
    name: String,
}

impl ProviderDescriptor {
    /// Creates a descriptor with an explicit identifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the name is empty or the identifier is
    /// the nil GUID.
    pub fn new(name: impl Into<String>, id: Uuid) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(EventError::InvalidArgument(
                "provider name cannot be empty".to_string(),
            ));
        }
        if id.is_nil() {
            return Err(EventError::InvalidArgument(
                "provider id cannot be the nil GUID".to_string(),
            ));
        }
        Ok(Self { id, name })
    }

    /// Creates a descriptor whose identifier is derived from the name.
    pub fn from_name(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let id = provider_id_for_name(&name);
        Self::new(name, id)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
