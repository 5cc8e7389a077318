//! Typed errors for cache operations and the resize planner.

use thiserror::Error;

use crate::pod::PodKey;

/// Errors returned by [`crate::cache::SchedulerCache`] operations.
///
/// All of these are reported to the caller; none of them, on their own,
/// indicate cache corruption. The two fatal conditions described in the
/// design (node reassignment observed by `update`/`remove`, and the
/// expiration sweep finding an assumed key with no backing `PodState`)
/// are not represented here because they terminate the process instead
/// of returning to the caller.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("pod {0:?} is already present in the cache")]
    AlreadyPresent(PodKey),

    #[error("pod {0:?} was already in added state")]
    AlreadyAdded(PodKey),

    #[error("pod {0:?} is not assumed, so cannot be forgotten")]
    NotAssumed(PodKey),

    #[error("pod {0:?} is not found in the cache")]
    PodNotFound(PodKey),

    #[error("pod {0:?} is not in added state, so cannot be updated or removed")]
    NotAdded(PodKey),

    #[error("pod {key:?} was assumed on node {assumed_node:?} but supplied node was {given_node:?}")]
    NodeMismatch {
        key: PodKey,
        assumed_node: String,
        given_node: String,
    },

    #[error("node {0:?} not found for resize")]
    NodeNotFound(String),

    #[error("failed to parse resize-resources annotation: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl PartialEq for CacheError {
    /// Structural equality for every variant except `ParseError`, whose
    /// inner `serde_json::Error` isn't `PartialEq`; two parse errors are
    /// compared by their rendered message instead.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::AlreadyPresent(a), Self::AlreadyPresent(b)) => a == b,
            (Self::AlreadyAdded(a), Self::AlreadyAdded(b)) => a == b,
            (Self::NotAssumed(a), Self::NotAssumed(b)) => a == b,
            (Self::PodNotFound(a), Self::PodNotFound(b)) => a == b,
            (Self::NotAdded(a), Self::NotAdded(b)) => a == b,
            (
                Self::NodeMismatch {
                    key: k1,
                    assumed_node: a1,
                    given_node: g1,
                },
                Self::NodeMismatch {
                    key: k2,
                    assumed_node: a2,
                    given_node: g2,
                },
            ) => k1 == k2 && a1 == a2 && g1 == g2,
            (Self::NodeNotFound(a), Self::NodeNotFound(b)) => a == b,
            (Self::ParseError(a), Self::ParseError(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl Eq for CacheError {}
