//! Monotonic port allocation for daemon sub-services.

use crate::error::{ClusterError, ClusterResult};

/// Hands out ports starting at a configured base, strictly increasing for
/// the lifetime of one cluster. Ports are never reused, even after the
/// daemon holding one is killed.
///
/// TODO: recycle ports vacated by killed daemons so long-running clusters
/// cannot walk off the end of the range.
#[derive(Debug)]
pub struct PortAllocator {
    // One past u16::MAX marks exhaustion, so the cursor is wider than a port.
    next: u32,
}

impl PortAllocator {
    pub fn new(base: u16) -> Self {
        Self { next: u32::from(base) }
    }

    /// The next unused port. Each call returns a strictly larger value than
    /// every earlier call on this allocator.
    pub fn next_port(&mut self) -> ClusterResult<u16> {
        if self.next > u32::from(u16::MAX) {
            return Err(ClusterError::PortsExhausted);
        }
        let port = self.next as u16;
        self.next += 1;
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_base_and_increases() {
        let mut alloc = PortAllocator::new(25_000);
        assert_eq!(alloc.next_port().unwrap(), 25_000);
        assert_eq!(alloc.next_port().unwrap(), 25_001);
        assert_eq!(alloc.next_port().unwrap(), 25_002);
    }

    #[test]
    fn never_reissues_a_port() {
        let mut alloc = PortAllocator::new(100);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(alloc.next_port().unwrap()));
        }
    }

    #[test]
    fn exhausts_at_the_top_of_the_range() {
        let mut alloc = PortAllocator::new(u16::MAX - 1);
        assert_eq!(alloc.next_port().unwrap(), u16::MAX - 1);
        assert_eq!(alloc.next_port().unwrap(), u16::MAX);
        assert!(matches!(
            alloc.next_port(),
            Err(ClusterError::PortsExhausted)
        ));
        // Exhaustion is sticky.
        assert!(matches!(
            alloc.next_port(),
            Err(ClusterError::PortsExhausted)
        ));
    }
}
