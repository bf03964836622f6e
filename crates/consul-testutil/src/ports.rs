//! Deterministic port allocation for concurrently running agents.
//!
//! Each agent gets an instance index from a [`PortAllocator`]; its six ports are
//! `base_for_role + index`. Role bases are at least 200 apart, so any two indices less than 200
//! apart produce disjoint port sets. Nothing here checks whether a port is actually free.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub const SERVER_BASE: u16 = 18000;
pub const SERF_LAN_BASE: u16 = 18200;
pub const SERF_WAN_BASE: u16 = 18400;
pub const RPC_BASE: u16 = 18600;
pub const HTTP_BASE: u16 = 18800;
pub const DNS_BASE: u16 = 19000;

/// Smallest gap between two role bases. Indices this far apart may collide across roles.
pub const ROLE_SEPARATION: u64 = 200;

static GLOBAL: PortAllocator = PortAllocator::new();

/// Monotonic instance counter. The first index handed out is 1.
#[derive(Debug, Default)]
pub struct PortAllocator {
    counter: AtomicU64,
}

impl PortAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Process-wide allocator used when no explicit one is supplied.
    #[must_use]
    pub fn global() -> &'static PortAllocator {
        &GLOBAL
    }

    /// Claim the next instance index.
    pub fn next_index(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Claim the next index and derive its port set.
    pub fn next_ports(&self) -> (u64, PortConfig) {
        let index = self.next_index();
        (index, PortConfig::for_index(index))
    }
}

/// The six ports a Consul agent listens on. Zero means "unset" and is left out of the config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dns: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub http: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rpc: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub serf_lan: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub serf_wan: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub server: u16,
}

impl PortConfig {
    /// Default ports for instance `index`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn for_index(index: u64) -> Self {
        let offset = index as u16;
        Self {
            dns: DNS_BASE.wrapping_add(offset),
            http: HTTP_BASE.wrapping_add(offset),
            rpc: RPC_BASE.wrapping_add(offset),
            serf_lan: SERF_LAN_BASE.wrapping_add(offset),
            serf_wan: SERF_WAN_BASE.wrapping_add(offset),
            server: SERVER_BASE.wrapping_add(offset),
        }
    }

    /// All six ports, in declaration order.
    #[must_use]
    pub fn as_array(&self) -> [u16; 6] {
        [
            self.dns,
            self.http,
            self.rpc,
            self.serf_lan,
            self.serf_wan,
            self.server,
        ]
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &u16) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn indices_start_at_one_and_increase() {
        let alloc = PortAllocator::new();
        let got: Vec<u64> = (0..5).map(|_| alloc.next_index()).collect();
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn concurrent_callers_never_share_an_index() {
        let alloc = Arc::new(PortAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                std::thread::spawn(move || (0..500).map(|_| alloc.next_index()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            let per_thread = h.join().expect("thread panicked");
            assert!(
                per_thread.windows(2).all(|w| w[0] < w[1]),
                "indices observed by one thread must increase"
            );
            for idx in per_thread {
                assert!(seen.insert(idx), "duplicate index {idx}");
            }
        }
        assert_eq!(seen.len(), 8 * 500);
        assert_eq!(seen.iter().max().copied(), Some(8 * 500));
    }

    #[test]
    fn index_one_uses_base_plus_one() {
        let ports = PortConfig::for_index(1);
        assert_eq!(
            ports,
            PortConfig {
                dns: 19001,
                http: 18801,
                rpc: 18601,
                serf_lan: 18201,
                serf_wan: 18401,
                server: 18001,
            }
        );
    }

    #[test]
    fn port_sets_within_separation_window_are_disjoint() {
        let sets: Vec<HashSet<u16>> = (1..ROLE_SEPARATION)
            .map(|i| PortConfig::for_index(i).as_array().into_iter().collect())
            .collect();

        for (i, a) in sets.iter().enumerate() {
            assert_eq!(a.len(), 6, "roles overlap within index {}", i + 1);
            for b in &sets[i + 1..] {
                assert!(a.is_disjoint(b));
            }
        }
    }

    #[test]
    fn separate_allocators_count_independently() {
        let a = PortAllocator::new();
        let b = PortAllocator::new();
        assert_eq!(a.next_index(), 1);
        assert_eq!(a.next_index(), 2);
        assert_eq!(b.next_index(), 1);
    }

    #[test]
    fn zero_ports_are_omitted_from_json() {
        let ports = PortConfig {
            http: 8500,
            ..PortConfig::default()
        };
        let v = serde_json::to_value(ports).expect("serialize");
        assert_eq!(v, serde_json::json!({"http": 8500}));
    }
}
