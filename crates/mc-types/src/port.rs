//! Device, pipe and port identifiers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Switch device identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DevId(pub u8);

impl fmt::Display for DevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

/// Pipeline index within a device.
///
/// Each pipe owns its own replication memory pool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PipeId(pub u8);

impl PipeId {
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe{}", self.0)
    }
}

/// Device port number.
///
/// Ports are numbered densely; the owning pipe is `port / ports_per_pipe`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PortId(pub u16);

impl PortId {
    /// Returns the pipe this port belongs to.
    pub const fn pipe(&self, ports_per_pipe: u16) -> PipeId {
        PipeId((self.0 / ports_per_pipe) as u8)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PortId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .map(PortId)
            .map_err(|_| ParseError::InvalidPortId(s.to_string()))
    }
}

/// Ordered set of ports.
///
/// Iteration is ascending by port number, which is the member order used by
/// LAG hash selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortSet(BTreeSet<PortId>);

impl PortSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, port: PortId) -> bool {
        self.0.insert(port)
    }

    pub fn remove(&mut self, port: PortId) -> bool {
        self.0.remove(&port)
    }

    pub fn contains(&self, port: PortId) -> bool {
        self.0.contains(&port)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PortId> + '_ {
        self.0.iter().copied()
    }

    /// Returns the `index`-th port in ascending order.
    pub fn nth(&self, index: usize) -> Option<PortId> {
        self.0.iter().nth(index).copied()
    }

    /// Returns the subset of ports that live in `pipe`.
    pub fn in_pipe(&self, pipe: PipeId, ports_per_pipe: u16) -> PortSet {
        self.iter()
            .filter(|p| p.pipe(ports_per_pipe) == pipe)
            .collect()
    }

    /// Returns the highest port number, if any.
    pub fn max(&self) -> Option<PortId> {
        self.0.iter().next_back().copied()
    }
}

impl FromIterator<PortId> for PortSet {
    fn from_iter<I: IntoIterator<Item = PortId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[u16; N]> for PortSet {
    fn from(ports: [u16; N]) -> Self {
        ports.into_iter().map(PortId).collect()
    }
}

impl fmt::Display for PortSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|p| p.to_string()).collect();
        write!(f, "{{{}}}", parts.join(","))
    }
}

impl FromStr for PortSet {
    type Err = ParseError;

    /// Parses a comma separated list such as `"1,2,8"`. Braces are optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('{').trim_end_matches('}');
        if inner.trim().is_empty() {
            return Ok(PortSet::new());
        }
        inner
            .split(',')
            .map(|part| {
                part.parse::<PortId>()
                    .map_err(|_| ParseError::InvalidPortSet(s.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_port_pipe() {
        assert_eq!(PortId(0).pipe(72), PipeId(0));
        assert_eq!(PortId(71).pipe(72), PipeId(0));
        assert_eq!(PortId(72).pipe(72), PipeId(1));
        assert_eq!(PortId(290).pipe(72), PipeId(4));
    }

    #[test]
    fn test_port_set_order() {
        let set = PortSet::from([9, 1, 4]);
        let ports: Vec<u16> = set.iter().map(|p| p.0).collect();
        assert_eq!(ports, vec![1, 4, 9]);
        assert_eq!(set.nth(1), Some(PortId(4)));
        assert_eq!(set.nth(3), None);
        assert_eq!(set.max(), Some(PortId(9)));
    }

    #[test]
    fn test_port_set_in_pipe() {
        let set = PortSet::from([1, 2, 80, 150]);
        assert_eq!(set.in_pipe(PipeId(0), 72), PortSet::from([1, 2]));
        assert_eq!(set.in_pipe(PipeId(1), 72), PortSet::from([80]));
        assert!(set.in_pipe(PipeId(3), 72).is_empty());
    }

    #[test]
    fn test_port_set_parse() {
        assert_eq!("1,2,3".parse::<PortSet>().unwrap(), PortSet::from([1, 2, 3]));
        assert_eq!("{4, 5}".parse::<PortSet>().unwrap(), PortSet::from([4, 5]));
        assert!("{}".parse::<PortSet>().unwrap().is_empty());
        assert!("1,x".parse::<PortSet>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(PortSet::from([2, 1]).to_string(), "{1,2}");
        assert_eq!(DevId(0).to_string(), "dev0");
        assert_eq!(PipeId(3).to_string(), "pipe3");
    }
}
