//! LAG table identifiers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Index into the device LAG membership table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LagId(pub u16);

impl LagId {
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lag{}", self.0)
    }
}

impl FromStr for LagId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("lag");
        digits
            .parse::<u16>()
            .map(LagId)
            .map_err(|_| ParseError::InvalidLagId(s.to_string()))
    }
}

/// Ordered set of LAG ids carried by a replication node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LagSet(BTreeSet<LagId>);

impl LagSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, lag: LagId) -> bool {
        self.0.insert(lag)
    }

    pub fn contains(&self, lag: LagId) -> bool {
        self.0.contains(&lag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = LagId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<LagId> for LagSet {
    fn from_iter<I: IntoIterator<Item = LagId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[u16; N]> for LagSet {
    fn from(lags: [u16; N]) -> Self {
        lags.into_iter().map(LagId).collect()
    }
}
