//! Address/port/protocol filtering
//!
//! A [`FilterSet`] holds an ordered list of [`AddressFilter`] rules. A packet
//! is delivered when any rule matches, so one capture socket can watch
//! several independent endpoints at once.

mod address;

pub use address::{AddressFilter, Direction, FilterAddress};

use crate::error::{Error, Result};
use crate::packet::PacketEndpoints;
use tracing::trace;

/// Default bound on the number of rules in a set
pub const DEFAULT_MAX_FILTERS: usize = 20;

/// Bounded, ordered collection of address filters
#[derive(Debug, Clone)]
pub struct FilterSet {
    filters: Vec<AddressFilter>,
    max: usize,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterSet {
    /// Create an empty set with the default bound
    pub fn new() -> Self {
        Self::with_max(DEFAULT_MAX_FILTERS)
    }

    /// Create an empty set holding at most `max` rules
    pub fn with_max(max: usize) -> Self {
        Self {
            filters: Vec::with_capacity(max.min(DEFAULT_MAX_FILTERS)),
            max,
        }
    }

    /// Append a rule
    pub fn add(&mut self, filter: AddressFilter) -> Result<()> {
        if self.filters.len() >= self.max {
            return Err(Error::CapacityExceeded { max: self.max });
        }
        self.filters.push(filter);
        Ok(())
    }

    /// Whether any rule admits the packet
    pub fn matches(&self, packet: &PacketEndpoints) -> bool {
        let hit = self.filters.iter().position(|f| f.matches(packet));
        if let Some(index) = hit {
            trace!(index, filter = %self.filters[index], "Filter matched");
        }
        hit.is_some()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if the set has no rules
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Maximum number of rules
    pub fn max(&self) -> usize {
        self.max
    }

    /// Iterate rules in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &AddressFilter> {
        self.filters.iter()
    }
}
