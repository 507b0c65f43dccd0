use std::fmt::{self, Display, Formatter};

/// Transaction kinds the cache can drive onto the shared bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Read,
    Write,
    Invalidate,
    /// Read with intent to modify; invalidates all other copies.
    Rwim,
}

impl Display for BusOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "READ"),
            Self::Write => write!(f, "WRITE"),
            Self::Invalidate => write!(f, "INVALIDATE"),
            Self::Rwim => write!(f, "RWIM"),
        }
    }
}

/// Combined snoop response observed on the bus for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnoopResult {
    /// No other cache holds the line.
    NoHit,
    /// Another cache holds the line clean.
    Hit,
    /// Another cache holds the line modified.
    Hitm,
}

impl SnoopResult {
    /// Deterministic stand-in for the peer caches: the response is a pure
    /// function of the low 2 address bits (0 → HIT, 1 → HITM, 2|3 → NOHIT).
    #[must_use]
    pub fn for_address(address: u32) -> Self {
        match address & 0x3 {
            0 => Self::Hit,
            1 => Self::Hitm,
            _ => Self::NoHit,
        }
    }

    /// True when some other cache holds the line, clean or modified.
    #[must_use]
    pub fn is_hit(self) -> bool {
        matches!(self, Self::Hit | Self::Hitm)
    }
}

impl Display for SnoopResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHit => write!(f, "NOHIT"),
            Self::Hit => write!(f, "HIT"),
            Self::Hitm => write!(f, "HITM"),
        }
    }
}

/// Messages the L2 sends up to the L1 above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L1Message {
    /// Request the (possibly newer) data for a line L1 holds modified.
    GetLine,
    /// Hand the requested line to L1.
    SendLine,
    /// Invalidate L1's copy of a line.
    InvalidateLine,
    /// Tell L1 to drop a line the L2 is evicting.
    EvictLine,
}

impl Display for L1Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetLine => write!(f, "GETLINE"),
            Self::SendLine => write!(f, "SENDLINE"),
            Self::InvalidateLine => write!(f, "INVALIDATELINE"),
            Self::EvictLine => write!(f, "EVICTLINE"),
        }
    }
}

/// The cache's window onto the rest of the system. Handlers emit every bus
/// transaction and L2→L1 message through this trait, in the order the
/// protocol requires; implementations decide how events are recorded.
pub trait BusInterface {
    /// Drive a transaction onto the bus and return the combined snoop
    /// response from the other caches. `address` is the raw reference
    /// address: its low bits feed the snoop oracle, and implementations
    /// record the event against the cache-aligned form (low 6 bits zeroed).
    fn bus_op(&mut self, op: BusOp, address: u32) -> SnoopResult;

    /// Report this cache's own response to a transaction snooped from a
    /// peer.
    fn put_snoop_result(&mut self, address: u32, result: SnoopResult);

    /// Send a message up to the L1 cache.
    fn message_to_cache(&mut self, message: L1Message, address: u32);
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BusEvent {
    Bus(BusOp, u32),
    SnoopReported(u32, SnoopResult),
    Message(L1Message, u32),
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingBus {
    pub(crate) events: Vec<BusEvent>,
}

#[cfg(test)]
impl RecordingBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn take_events(&mut self) -> Vec<BusEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
impl BusInterface for RecordingBus {
    fn bus_op(&mut self, op: BusOp, address: u32) -> SnoopResult {
        self.events.push(BusEvent::Bus(op, crate::address::CacheAddress::align(address)));
        SnoopResult::for_address(address)
    }

    fn put_snoop_result(&mut self, address: u32, result: SnoopResult) {
        self.events.push(BusEvent::SnoopReported(address, result));
    }

    fn message_to_cache(&mut self, message: L1Message, address: u32) {
        self.events.push(BusEvent::Message(message, address));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_maps_low_bits() {
        assert_eq!(SnoopResult::for_address(0x1000), SnoopResult::Hit);
        assert_eq!(SnoopResult::for_address(0x1001), SnoopResult::Hitm);
        assert_eq!(SnoopResult::for_address(0x1002), SnoopResult::NoHit);
        assert_eq!(SnoopResult::for_address(0x1003), SnoopResult::NoHit);
    }

    #[test]
    fn oracle_is_memoryless() {
        for _ in 0..3 {
            assert_eq!(SnoopResult::for_address(0xABCD41), SnoopResult::Hitm);
        }
    }
}
