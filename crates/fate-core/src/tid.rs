use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Transaction identifier, assigned monotonically by the executor.
///
/// Displayed as `FATE[<16 hex digits>]`. Parsing accepts that form or the
/// bare hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(u64);

impl TxId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Fixed-width hex form used to name store entries, so lexical order is
    /// numeric order.
    #[must_use]
    pub fn hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FATE[{:016x}]", self.0)
    }
}

impl FromStr for TxId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("FATE[")
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(s);
        if digits.is_empty() || digits.len() > 16 {
            return Err(CoreError::InvalidTxId(s.to_string()));
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| CoreError::InvalidTxId(s.to_string()))
    }
}

impl From<u64> for TxId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
