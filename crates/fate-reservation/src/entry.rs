use fate_core::{LockMode, TxId};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Current grants on one resource.
///
/// Either `writer` is set and `readers` is empty, or `writer` is unset and
/// any number of readers hold the resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    writer: Option<TxId>,
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    readers: IndexSet<TxId>,
}

impl Reservation {
    #[must_use]
    pub fn writer(&self) -> Option<TxId> {
        self.writer
    }

    /// Readers in the order they were granted.
    #[must_use]
    pub fn readers(&self) -> Vec<TxId> {
        self.readers.iter().copied().collect()
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }

    #[must_use]
    pub fn holds(&self, tid: TxId, mode: LockMode) -> bool {
        match mode {
            LockMode::Write => self.writer == Some(tid),
            LockMode::Read => self.writer == Some(tid) || self.readers.contains(&tid),
        }
    }

    /// Grants `mode` to `tid` if compatible with the current holders.
    ///
    /// A writer already covers reads, and a sole reader may upgrade to write.
    /// Asking again for a grant already held succeeds.
    pub(crate) fn grant(&mut self, tid: TxId, mode: LockMode) -> bool {
        if self.writer == Some(tid) {
            return true;
        }
        match mode {
            LockMode::Read => {
                if self.writer.is_some() {
                    return false;
                }
                self.readers.insert(tid);
                true
            }
            LockMode::Write => {
                if self.writer.is_some() || self.readers.iter().any(|r| *r != tid) {
                    return false;
                }
                self.readers.clear();
                self.writer = Some(tid);
                true
            }
        }
    }

    /// Drops the `mode` grant of `tid`; a grant that isn't held is ignored.
    pub(crate) fn release(&mut self, tid: TxId, mode: LockMode) {
        match mode {
            LockMode::Read => {
                self.readers.shift_remove(&tid);
            }
            LockMode::Write => {
                if self.writer == Some(tid) {
                    self.writer = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: TxId = TxId::new(1);
    const B: TxId = TxId::new(2);
    const C: TxId = TxId::new(3);

    fn exclusive(entry: &Reservation) -> bool {
        entry.writer.is_none() || entry.readers.is_empty()
    }

    #[test]
    fn readers_share() {
        let mut entry = Reservation::default();

        assert!(entry.grant(A, LockMode::Read));
        assert!(entry.grant(B, LockMode::Read));

        assert_eq!(entry.readers(), vec![A, B]);
        assert!(exclusive(&entry));
    }

    #[test]
    fn writer_excludes_everyone_else() {
        let mut entry = Reservation::default();
        assert!(entry.grant(A, LockMode::Write));

        assert!(!entry.grant(B, LockMode::Write));
        assert!(!entry.grant(B, LockMode::Read));
        assert!(exclusive(&entry));
    }

    #[test]
    fn readers_block_writer() {
        let mut entry = Reservation::default();
        assert!(entry.grant(A, LockMode::Read));

        assert!(!entry.grant(B, LockMode::Write));
        assert_eq!(entry.writer(), None);
    }

    #[test]
    fn repeated_grant_is_idempotent() {
        let mut entry = Reservation::default();

        assert!(entry.grant(A, LockMode::Read));
        assert!(entry.grant(A, LockMode::Read));
        assert_eq!(entry.readers(), vec![A]);

        let mut entry = Reservation::default();
        assert!(entry.grant(A, LockMode::Write));
        assert!(entry.grant(A, LockMode::Write));
        assert!(entry.grant(A, LockMode::Read));
        assert!(entry.readers().is_empty());
    }

    #[test]
    fn sole_reader_upgrades_to_writer() {
        let mut entry = Reservation::default();
        assert!(entry.grant(A, LockMode::Read));

        assert!(entry.grant(A, LockMode::Write));

        assert_eq!(entry.writer(), Some(A));
        assert!(entry.readers().is_empty());
    }

    #[test]
    fn shared_reader_cannot_upgrade() {
        let mut entry = Reservation::default();
        assert!(entry.grant(A, LockMode::Read));
        assert!(entry.grant(C, LockMode::Read));

        assert!(!entry.grant(A, LockMode::Write));
    }

    #[test]
    fn release_is_idempotent() {
        let mut entry = Reservation::default();
        assert!(entry.grant(A, LockMode::Write));

        entry.release(A, LockMode::Write);
        entry.release(A, LockMode::Write);
        entry.release(B, LockMode::Read);

        assert!(entry.is_free());
    }

    #[test]
    fn release_by_non_owner_keeps_writer() {
        let mut entry = Reservation::default();
        assert!(entry.grant(A, LockMode::Write));

        entry.release(B, LockMode::Write);

        assert!(entry.holds(A, LockMode::Write));
    }
}
