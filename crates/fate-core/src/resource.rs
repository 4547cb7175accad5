use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Kind of resource a reservation applies to.
///
/// Reservations of different kinds never conflict with each other, even when
/// the ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Table,
    Namespace,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Namespace => "namespace",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "table" => Ok(Self::Table),
            "namespace" => Ok(Self::Namespace),
            other => Err(CoreError::UnknownResourceKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    kind: ResourceKind,
    id: String,
}

impl ResourceId {
    /// # Errors
    ///
    /// Returns an error if `id` is empty or contains `/`, which would break
    /// the store key layout.
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::EmptyResourceId);
        }
        if id.contains('/') {
            return Err(CoreError::ResourceIdSeparator(id));
        }
        Ok(Self { kind, id })
    }

    /// # Errors
    ///
    /// See [`ResourceId::new`].
    pub fn table(id: impl Into<String>) -> Result<Self> {
        Self::new(ResourceKind::Table, id)
    }

    /// # Errors
    ///
    /// See [`ResourceId::new`].
    pub fn namespace(id: impl Into<String>) -> Result<Self> {
        Self::new(ResourceKind::Namespace, id)
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    Read,
    Write,
}

impl LockMode {
    #[must_use]
    pub fn from_write(write: bool) -> Self {
        if write { Self::Write } else { Self::Read }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}
