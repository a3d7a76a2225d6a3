//! RTP port allocation.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use tracing::debug;

/// Inclusive range of UDP ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Self {
        PortRange { min, max }
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.min && port <= self.max
    }

    /// Non-empty and holding at least one even port
    pub fn is_valid(&self) -> bool {
        self.min > 0 && self.min <= self.max && self.first_even().is_some()
    }

    fn first_even(&self) -> Option<u16> {
        let first = if self.min % 2 == 0 { self.min } else { self.min.checked_add(1)? };
        (first <= self.max).then_some(first)
    }

    /// Even ports in the range; odd ports are left to RTCP
    pub fn even_ports(&self) -> impl Iterator<Item = u16> {
        let start = self.first_even().unwrap_or(1);
        let end = if self.first_even().is_some() { self.max } else { 0 };
        (start..=end).step_by(2)
    }

    fn intersect(&self, other: &PortRange) -> Option<PortRange> {
        let range = PortRange::new(self.min.max(other.min), self.max.min(other.max));
        (range.min <= range.max).then_some(range)
    }
}

impl Default for PortRange {
    fn default() -> Self {
        PortRange::new(34534, 65534)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("No free RTP port in range {min}-{max}")]
    Exhausted { min: u16, max: u16 },

    #[error("Requested range {min}-{max} does not overlap the pool")]
    OutOfRange { min: u16, max: u16 },
}

/// Hands out RTP ports to sessions
pub trait PortAllocator: Send + Sync {
    /// Reserve an even port on `ip`, inside `preferred` when given.
    fn allocate(&self, ip: IpAddr, preferred: Option<PortRange>) -> Result<SocketAddr, AllocationError>;

    /// Return a port to the pool. Returns `false` if it was not allocated.
    fn release(&self, address: SocketAddr) -> bool;

    /// Number of ports still available
    fn available(&self) -> usize;
}

struct PoolState {
    in_use: HashSet<u16>,
    next: u16,
}

/// Mutex-guarded pool of even ports shared by every session of a process
pub struct PortPool {
    range: PortRange,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl PortPool {
    pub fn new(range: PortRange) -> Self {
        let capacity = range.even_ports().count();
        PortPool {
            range,
            capacity,
            state: Mutex::new(PoolState {
                in_use: HashSet::new(),
                next: range.first_even().unwrap_or(range.min),
            }),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    pub fn in_use(&self) -> usize {
        self.state.lock().in_use.len()
    }
}

impl PortAllocator for PortPool {
    fn allocate(&self, ip: IpAddr, preferred: Option<PortRange>) -> Result<SocketAddr, AllocationError> {
        let window = match preferred {
            Some(requested) => self.range.intersect(&requested).ok_or(AllocationError::OutOfRange {
                min: requested.min,
                max: requested.max,
            })?,
            None => self.range,
        };

        let mut state = self.state.lock();

        // Round-robin from the cursor so a released port is not reused immediately.
        let start = if window.contains(state.next) { state.next } else { window.min };
        let candidates = window
            .even_ports()
            .skip_while(|port| *port < start)
            .chain(window.even_ports().take_while(|port| *port < start));

        for port in candidates {
            if state.in_use.insert(port) {
                state.next = port.checked_add(2).filter(|p| self.range.contains(*p)).unwrap_or(self.range.min);
                debug!("Allocated RTP port {} on {}", port, ip);
                return Ok(SocketAddr::new(ip, port));
            }
        }

        Err(AllocationError::Exhausted {
            min: window.min,
            max: window.max,
        })
    }

    fn release(&self, address: SocketAddr) -> bool {
        let released = self.state.lock().in_use.remove(&address.port());
        if released {
            debug!("Released RTP port {}", address.port());
        }
        released
    }

    fn available(&self) -> usize {
        self.capacity - self.in_use()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn allocates_even_ports_until_exhausted() {
        let pool = PortPool::new(PortRange::new(5001, 5006));
        assert_eq!(pool.available(), 3);

        let ports: Vec<u16> = (0..3)
            .map(|_| pool.allocate(LOCALHOST, None).unwrap().port())
            .collect();
        assert_eq!(ports, vec![5002, 5004, 5006]);

        assert_eq!(
            pool.allocate(LOCALHOST, None),
            Err(AllocationError::Exhausted { min: 5001, max: 5006 })
        );
    }

    #[test]
    fn release_is_idempotent() {
        let pool = PortPool::new(PortRange::new(6000, 6002));
        let addr = pool.allocate(LOCALHOST, None).unwrap();

        assert!(pool.release(addr));
        assert!(!pool.release(addr));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn released_port_is_reused_after_wrapping() {
        let pool = PortPool::new(PortRange::new(7000, 7002));
        let first = pool.allocate(LOCALHOST, None).unwrap();
        let second = pool.allocate(LOCALHOST, None).unwrap();
        pool.release(first);

        assert_eq!(pool.allocate(LOCALHOST, None).unwrap(), first);
        assert_ne!(first, second);
    }

    #[test]
    fn preferred_range_is_honoured() {
        let pool = PortPool::new(PortRange::new(8000, 8100));
        let addr = pool
            .allocate(LOCALHOST, Some(PortRange::new(8050, 8060)))
            .unwrap();
        assert!((8050..=8060).contains(&addr.port()));

        assert!(matches!(
            pool.allocate(LOCALHOST, Some(PortRange::new(9000, 9010))),
            Err(AllocationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn range_validation() {
        assert!(PortRange::default().is_valid());
        assert!(!PortRange::new(10, 5).is_valid());
        assert!(!PortRange::new(7, 7).is_valid());
        assert!(PortRange::new(8, 8).is_valid());
    }
}
