//! Target identifier
//!
//! Targets are numbered in registration order when a `RoutingTable` is
//! compiled. The id indexes straight into the pipeline vector of the live
//! route graph, so dispatch never touches target names.

use std::fmt;

/// Index of a registered target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u16);

impl TargetId {
    /// Maximum number of targets in one table
    pub const MAX_TARGETS: usize = u16::MAX as usize;

    #[inline]
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Index for slice access
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target:{}", self.0)
    }
}

impl From<TargetId> for usize {
    #[inline]
    fn from(id: TargetId) -> Self {
        id.as_usize()
    }
}
