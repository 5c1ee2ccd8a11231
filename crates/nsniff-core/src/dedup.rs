//! Duplicate suppression for link-layer captures
//!
//! A packet socket bound to an interface sees locally sent traffic on the
//! outgoing path, and loopback traffic twice. The guard uses the link-layer
//! delivery type reported with each frame together with the interface's own
//! address to drop the copies that were not really sent by, or addressed
//! to, this interface.

use std::net::Ipv4Addr;

/// Link-layer delivery type reported by the capture backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Addressed to this host
    HostBound,
    /// Sent by this host
    Outgoing,
    /// Broadcast, multicast or another host's traffic
    Other,
}

/// Why a frame was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    /// Outgoing copy of a packet whose source equals its destination
    LoopbackEcho,
    /// Outgoing, but not from the interface address
    ForeignSource,
    /// Host-bound, but not to the interface address
    ForeignDestination,
}

/// Guard decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the packet on to the filters
    Accept,
    /// Drop the packet
    Discard(DuplicateReason),
}

impl Verdict {
    /// Check if the packet should be dropped
    pub fn is_discard(self) -> bool {
        matches!(self, Verdict::Discard(_))
    }
}

/// Suppresses duplicate deliveries of self-originated packets
#[derive(Debug, Clone, Copy)]
pub struct DedupGuard {
    local_ip: Ipv4Addr,
}

impl DedupGuard {
    /// Create a guard for an interface bound to `local_ip`
    pub fn new(local_ip: Ipv4Addr) -> Self {
        Self { local_ip }
    }

    /// Interface address the guard compares against
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    /// Evaluate one packet
    ///
    /// `delivery` is `None` when the backend has no link-layer metadata, in
    /// which case every packet is accepted.
    pub fn check(
        &self,
        delivery: Option<Delivery>,
        source: Ipv4Addr,
        destination: Ipv4Addr,
    ) -> Verdict {
        match delivery {
            Some(Delivery::Outgoing) if source == destination => {
                Verdict::Discard(DuplicateReason::LoopbackEcho)
            }
            Some(Delivery::Outgoing) if self.local_ip != source => {
                Verdict::Discard(DuplicateReason::ForeignSource)
            }
            Some(Delivery::HostBound) if self.local_ip != destination => {
                Verdict::Discard(DuplicateReason::ForeignDestination)
            }
            _ => Verdict::Accept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const PEER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    #[test]
    fn test_outgoing_loopback_echo() {
        let guard = DedupGuard::new(Ipv4Addr::LOCALHOST);
        assert_eq!(
            guard.check(Some(Delivery::Outgoing), Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST),
            Verdict::Discard(DuplicateReason::LoopbackEcho)
        );
    }

    #[test]
    fn test_outgoing_foreign_source() {
        let guard = DedupGuard::new(Ipv4Addr::LOCALHOST);
        let other_loopback = Ipv4Addr::new(127, 0, 0, 2);
        assert_eq!(
            guard.check(Some(Delivery::Outgoing), other_loopback, Ipv4Addr::LOCALHOST),
            Verdict::Discard(DuplicateReason::ForeignSource)
        );
    }

    #[test]
    fn test_host_bound_foreign_destination() {
        let guard = DedupGuard::new(LOCAL);
        assert_eq!(
            guard.check(Some(Delivery::HostBound), PEER, Ipv4Addr::new(192, 168, 1, 99)),
            Verdict::Discard(DuplicateReason::ForeignDestination)
        );
    }

    #[test]
    fn test_genuine_traffic_accepted() {
        let guard = DedupGuard::new(LOCAL);
        assert_eq!(guard.check(Some(Delivery::Outgoing), LOCAL, PEER), Verdict::Accept);
        assert_eq!(guard.check(Some(Delivery::HostBound), PEER, LOCAL), Verdict::Accept);
        assert_eq!(
            guard.check(Some(Delivery::Other), PEER, Ipv4Addr::BROADCAST),
            Verdict::Accept
        );
    }

    #[test]
    fn test_no_metadata_is_noop() {
        let guard = DedupGuard::new(LOCAL);
        assert_eq!(guard.check(None, PEER, PEER), Verdict::Accept);
        assert!(!guard.check(None, LOCAL, LOCAL).is_discard());
    }
}
