//! Last-writer-wins choice between the local and remote blobs.

/// Which copy of the state is authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Remote is strictly newer.
    AcceptRemote,
    /// Local is newer or equal.
    KeepLocal,
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// Compare the two `t` slot timestamps (ms since epoch, 0 when absent).
    ///
    /// Ties keep local, so two empty stores or an already-synced pair
    /// trigger no writes.
    pub fn resolve(local_timestamp: i64, remote_timestamp: i64) -> Resolution {
        if remote_timestamp > local_timestamp {
            Resolution::AcceptRemote
        } else {
            Resolution::KeepLocal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_remote_wins() {
        assert_eq!(ConflictResolver::resolve(1000, 2000), Resolution::AcceptRemote);
    }

    #[test]
    fn newer_local_wins() {
        assert_eq!(ConflictResolver::resolve(2000, 1000), Resolution::KeepLocal);
    }

    #[test]
    fn tie_keeps_local() {
        assert_eq!(ConflictResolver::resolve(1000, 1000), Resolution::KeepLocal);
        assert_eq!(ConflictResolver::resolve(0, 0), Resolution::KeepLocal);
    }

    #[test]
    fn empty_local_loses_to_any_remote() {
        assert_eq!(ConflictResolver::resolve(0, 1), Resolution::AcceptRemote);
    }
}
