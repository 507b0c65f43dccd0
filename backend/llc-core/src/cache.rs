//! The cache state engine: dispatch of trace operations to the per-operation
//! handlers that drive MESI transitions, PLRU updates, bus traffic, and
//! L2→L1 messaging.


use crate::address::CacheAddress;
use crate::set::{CacheLine, CacheSet, MesiState};
use crate::traits::{BusInterface, BusOp, L1Message, SnoopResult};
use crate::NUM_SETS;
use std::fmt::{self, Display, Formatter};

/// One operation consumed from the trace, with its operand where the
/// operation takes one. Codes 8 and 9 take no address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    DataRead(u32),
    DataWrite(u32),
    InstRead(u32),
    SnoopRead(u32),
    SnoopWrite(u32),
    SnoopRwim(u32),
    SnoopInvalidate(u32),
    ClearCache,
    PrintState,
}

impl CacheOp {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::DataRead(_) => 0,
            Self::DataWrite(_) => 1,
            Self::InstRead(_) => 2,
            Self::SnoopRead(_) => 3,
            Self::SnoopWrite(_) => 4,
            Self::SnoopRwim(_) => 5,
            Self::SnoopInvalidate(_) => 6,
            Self::ClearCache => 8,
            Self::PrintState => 9,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DataRead(_) => "Read request from L1 data cache",
            Self::DataWrite(_) => "Write request from L1 data cache",
            Self::InstRead(_) => "Read request from L1 instruction cache",
            Self::SnoopRead(_) => "Snooped read request",
            Self::SnoopWrite(_) => "Snooped write request",
            Self::SnoopRwim(_) => "Snooped read with intent to modify",
            Self::SnoopInvalidate(_) => "Snooped invalidate command",
            Self::ClearCache => "Clear cache and reset state",
            Self::PrintState => "Print contents and state of each valid cache line",
        }
    }

    #[must_use]
    pub fn address(self) -> Option<u32> {
        match self {
            Self::DataRead(address)
            | Self::DataWrite(address)
            | Self::InstRead(address)
            | Self::SnoopRead(address)
            | Self::SnoopWrite(address)
            | Self::SnoopRwim(address)
            | Self::SnoopInvalidate(address) => Some(address),
            Self::ClearCache | Self::PrintState => None,
        }
    }
}

/// How an L1-initiated access (codes 0-2) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Hit,
    MissEmptySlot,
    MissEviction,
}

/// The line displaced by a miss fill into a full set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictedLine {
    pub address: u32,
    pub state: MesiState,
}

/// What a single operation did to the cache, for the caller's log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpResult {
    /// An L1 read or write resolved against the set.
    Access {
        kind: AccessKind,
        way: u8,
        prior: Option<MesiState>,
        state: MesiState,
        evicted: Option<EvictedLine>,
        /// PLRU node bits after the access touched its way.
        plru: u16,
    },
    /// A snooped transaction found the line and (possibly) transitioned it.
    SnoopApplied { prior: MesiState, state: MesiState },
    /// A snooped transaction for a line this cache does not hold.
    SnoopMiss,
    /// A snooped invalidate arrived for a line held Modified or Exclusive.
    ProtocolError { state: MesiState },
    /// Cache cleared; count of dirty lines written back.
    Cleared { writebacks: u32 },
    /// State dump requested; the cache itself is untouched.
    Printed,
}

/// Aggregate hit/miss statistics. Reads count codes 0 and 2, writes count
/// code 1; hits and misses only move on L1-initiated accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_ratio(self) -> f64 {
        let accesses = self.hits + self.misses;
        if accesses == 0 {
            0.0
        } else {
            self.hits as f64 / accesses as f64
        }
    }
}

impl Display for CacheStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cache Statistics:")?;
        writeln!(f, "  Reads:     {}", self.reads)?;
        writeln!(f, "  Writes:    {}", self.writes)?;
        writeln!(f, "  Hits:      {}", self.hits)?;
        writeln!(f, "  Misses:    {}", self.misses)?;
        write!(f, "  Hit Ratio: {:.2}%", 100.0 * self.hit_ratio())
    }
}

/// The full L2 cache: `NUM_SETS` sets of 16 ways plus aggregate statistics.
/// All mutation happens inside [`Cache::apply`]; one call processes one
/// trace operation to completion.
#[derive(Debug, Clone)]
pub struct Cache {
    sets: Box<[CacheSet]>,
    stats: CacheStats,
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sets: vec![CacheSet::new(); NUM_SETS].into_boxed_slice(),
            stats: CacheStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    #[must_use]
    pub fn set(&self, index: u16) -> &CacheSet {
        &self.sets[usize::from(index)]
    }

    /// Yields `(index, way, line)` for every present line, in set then way
    /// order. The print handler formats from this.
    pub fn valid_lines(&self) -> impl Iterator<Item = (u16, u8, CacheLine)> + '_ {
        self.sets.iter().enumerate().flat_map(|(index, set)| {
            set.iter_valid().map(move |(way, line)| (index as u16, way, line))
        })
    }

    /// Process one trace operation to completion, emitting bus and message
    /// events through `bus` in protocol order.
    pub fn apply<B: BusInterface>(&mut self, op: CacheOp, bus: &mut B) -> OpResult {
        match op {
            CacheOp::DataRead(address) | CacheOp::InstRead(address) => {
                self.stats.reads += 1;
                let result = self.read(address, bus);
                self.count_access(result);
                result
            }
            CacheOp::DataWrite(address) => {
                self.stats.writes += 1;
                let result = self.write(address, bus);
                self.count_access(result);
                result
            }
            CacheOp::SnoopRead(address) => self.snoop_read(address, bus),
            CacheOp::SnoopWrite(address) => self.snoop_write(address, bus),
            CacheOp::SnoopRwim(address) => self.snoop_rwim(address, bus),
            CacheOp::SnoopInvalidate(address) => self.snoop_invalidate(address, bus),
            CacheOp::ClearCache => self.clear(bus),
            CacheOp::PrintState => OpResult::Printed,
        }
    }

    fn count_access(&mut self, result: OpResult) {
        if let OpResult::Access { kind, .. } = result {
            match kind {
                AccessKind::Hit => self.stats.hits += 1,
                AccessKind::MissEmptySlot | AccessKind::MissEviction => self.stats.misses += 1,
            }
        }
    }

    /// L1 data read (code 0) and instruction read (code 2).
    fn read<B: BusInterface>(&mut self, address: u32, bus: &mut B) -> OpResult {
        let parsed = CacheAddress::decompose(address);
        let aligned = parsed.aligned();
        let set = &mut self.sets[usize::from(parsed.index)];

        if let Some(way) = present_hit(set, parsed.index, parsed.tag) {
            let state = set.line(way).state;
            log::trace!("read {aligned:#010X}: hit way {way} ({state})");
            set.plru.touch(way);
            bus.message_to_cache(L1Message::SendLine, aligned);
            return OpResult::Access {
                kind: AccessKind::Hit,
                way,
                prior: Some(state),
                state,
                evicted: None,
                plru: set.plru.bits(),
            };
        }

        if let Some(way) = set.first_invalid() {
            // The raw address goes on the bus so its byte offset reaches
            // the snoop oracle; the event itself is recorded aligned.
            let snoop = bus.bus_op(BusOp::Read, address);
            let state = read_fill_state(snoop);
            log::trace!("read {aligned:#010X}: miss, filling way {way} as {state}");
            set.install(way, parsed.tag, state);
            set.plru.touch(way);
            bus.message_to_cache(L1Message::SendLine, aligned);
            return OpResult::Access {
                kind: AccessKind::MissEmptySlot,
                way,
                prior: None,
                state,
                evicted: None,
                plru: set.plru.bits(),
            };
        }

        let (way, evicted) = flush_victim(set, parsed.index, bus);
        let snoop = bus.bus_op(BusOp::Read, address);
        set.invalidate(way);
        let state = read_fill_state(snoop);
        log::trace!("read {aligned:#010X}: miss, evicting way {way} and refilling as {state}");
        set.install(way, parsed.tag, state);
        set.plru.touch(way);
        bus.message_to_cache(L1Message::SendLine, aligned);
        OpResult::Access {
            kind: AccessKind::MissEviction,
            way,
            prior: None,
            state,
            evicted: Some(evicted),
            plru: set.plru.bits(),
        }
    }

    /// L1 data write (code 1). The line always ends up Modified and dirty.
    fn write<B: BusInterface>(&mut self, address: u32, bus: &mut B) -> OpResult {
        let parsed = CacheAddress::decompose(address);
        let aligned = parsed.aligned();
        let set = &mut self.sets[usize::from(parsed.index)];

        if let Some(way) = present_hit(set, parsed.index, parsed.tag) {
            let prior = set.line(way).state;
            if prior == MesiState::Shared {
                // Take ownership: every other copy must go away first.
                bus.bus_op(BusOp::Invalidate, address);
            }
            log::trace!("write {aligned:#010X}: hit way {way} ({prior} -> MODIFIED)");
            set.set_state(way, MesiState::Modified);
            set.plru.touch(way);
            bus.message_to_cache(L1Message::SendLine, aligned);
            return OpResult::Access {
                kind: AccessKind::Hit,
                way,
                prior: Some(prior),
                state: MesiState::Modified,
                evicted: None,
                plru: set.plru.bits(),
            };
        }

        if let Some(way) = set.first_invalid() {
            bus.bus_op(BusOp::Rwim, address);
            log::trace!("write {aligned:#010X}: miss, filling way {way} as MODIFIED");
            set.install(way, parsed.tag, MesiState::Modified);
            set.plru.touch(way);
            bus.message_to_cache(L1Message::SendLine, aligned);
            return OpResult::Access {
                kind: AccessKind::MissEmptySlot,
                way,
                prior: None,
                state: MesiState::Modified,
                evicted: None,
                plru: set.plru.bits(),
            };
        }

        let (way, evicted) = flush_victim(set, parsed.index, bus);
        bus.bus_op(BusOp::Rwim, address);
        set.invalidate(way);
        log::trace!("write {aligned:#010X}: miss, evicting way {way} and refilling as MODIFIED");
        set.install(way, parsed.tag, MesiState::Modified);
        set.plru.touch(way);
        bus.message_to_cache(L1Message::SendLine, aligned);
        OpResult::Access {
            kind: AccessKind::MissEviction,
            way,
            prior: None,
            state: MesiState::Modified,
            evicted: Some(evicted),
            plru: set.plru.bits(),
        }
    }

    /// Snooped read (code 3): another cache wants the line for reading.
    fn snoop_read<B: BusInterface>(&mut self, address: u32, bus: &mut B) -> OpResult {
        let parsed = CacheAddress::decompose(address);
        let aligned = parsed.aligned();
        let set = &mut self.sets[usize::from(parsed.index)];

        let way = set.lookup(parsed.tag);
        bus.put_snoop_result(aligned, snoop_response(set, way));
        let Some(way) = way else {
            return OpResult::SnoopMiss;
        };

        let prior = set.line(way).state;
        match prior {
            MesiState::Modified => {
                // Write-back must hit the bus before the transition is
                // externally observable.
                bus.bus_op(BusOp::Write, address);
                bus.message_to_cache(L1Message::GetLine, aligned);
                set.set_state(way, MesiState::Shared);
                OpResult::SnoopApplied { prior, state: MesiState::Shared }
            }
            MesiState::Exclusive => {
                bus.message_to_cache(L1Message::GetLine, aligned);
                set.set_state(way, MesiState::Shared);
                OpResult::SnoopApplied { prior, state: MesiState::Shared }
            }
            MesiState::Shared => OpResult::SnoopApplied { prior, state: MesiState::Shared },
            MesiState::Invalid => OpResult::SnoopMiss,
        }
    }

    /// Snooped write (code 4): another cache took ownership and is writing;
    /// any copy we hold is stale.
    fn snoop_write<B: BusInterface>(&mut self, address: u32, bus: &mut B) -> OpResult {
        let parsed = CacheAddress::decompose(address);
        let aligned = parsed.aligned();
        let set = &mut self.sets[usize::from(parsed.index)];

        let way = set.lookup(parsed.tag);
        bus.put_snoop_result(aligned, snoop_response(set, way));
        let Some(way) = way else {
            return OpResult::SnoopMiss;
        };

        let prior = set.line(way).state;
        match prior {
            MesiState::Modified => {
                bus.bus_op(BusOp::Write, address);
                set.invalidate(way);
                OpResult::SnoopApplied { prior, state: MesiState::Invalid }
            }
            MesiState::Exclusive | MesiState::Shared => {
                set.invalidate(way);
                OpResult::SnoopApplied { prior, state: MesiState::Invalid }
            }
            MesiState::Invalid => OpResult::SnoopMiss,
        }
    }

    /// Snooped read with intent to modify (code 5).
    fn snoop_rwim<B: BusInterface>(&mut self, address: u32, bus: &mut B) -> OpResult {
        let parsed = CacheAddress::decompose(address);
        let aligned = parsed.aligned();
        let set = &mut self.sets[usize::from(parsed.index)];

        let way = set.lookup(parsed.tag);
        bus.put_snoop_result(aligned, snoop_response(set, way));
        let Some(way) = way else {
            return OpResult::SnoopMiss;
        };

        let prior = set.line(way).state;
        match prior {
            MesiState::Modified => {
                bus.message_to_cache(L1Message::GetLine, aligned);
                bus.message_to_cache(L1Message::InvalidateLine, aligned);
                bus.bus_op(BusOp::Write, address);
                set.invalidate(way);
                OpResult::SnoopApplied { prior, state: MesiState::Invalid }
            }
            MesiState::Exclusive | MesiState::Shared => {
                bus.message_to_cache(L1Message::InvalidateLine, aligned);
                set.invalidate(way);
                OpResult::SnoopApplied { prior, state: MesiState::Invalid }
            }
            MesiState::Invalid => OpResult::SnoopMiss,
        }
    }

    /// Snooped invalidate (code 6): only a Shared line can legally receive
    /// one; M/E ownership means no other cache should be invalidating.
    fn snoop_invalidate<B: BusInterface>(&mut self, address: u32, bus: &mut B) -> OpResult {
        let parsed = CacheAddress::decompose(address);
        let aligned = parsed.aligned();
        let set = &mut self.sets[usize::from(parsed.index)];

        let way = set.lookup(parsed.tag);
        bus.put_snoop_result(aligned, snoop_response(set, way));
        let Some(way) = way else {
            return OpResult::SnoopMiss;
        };

        let prior = set.line(way).state;
        match prior {
            MesiState::Shared => {
                bus.message_to_cache(L1Message::InvalidateLine, aligned);
                set.invalidate(way);
                OpResult::SnoopApplied { prior, state: MesiState::Invalid }
            }
            MesiState::Modified | MesiState::Exclusive => {
                log::error!(
                    "snooped invalidate for {aligned:#010X} held {prior}; ignoring"
                );
                OpResult::ProtocolError { state: prior }
            }
            MesiState::Invalid => OpResult::SnoopMiss,
        }
    }

    /// Clear cache (code 8): write back every dirty line, then reset all
    /// lines and PLRU state to initial values. Statistics are preserved.
    fn clear<B: BusInterface>(&mut self, bus: &mut B) -> OpResult {
        let mut writebacks = 0_u32;
        for (index, set) in self.sets.iter_mut().enumerate() {
            for (_, line) in set.iter_valid() {
                if line.dirty {
                    bus.bus_op(BusOp::Write, CacheAddress::line_address(line.tag, index as u16));
                    writebacks += 1;
                }
            }
            set.reset();
        }

        log::debug!("cache cleared; {writebacks} dirty lines written back");
        OpResult::Cleared { writebacks }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

/// The way holding a present line with this tag. A valid line in state
/// `Invalid` would be a metadata desync; report it and treat as a miss.
fn present_hit(set: &CacheSet, index: u16, tag: u16) -> Option<u8> {
    let way = set.lookup(tag)?;
    if set.line(way).state.is_present() {
        Some(way)
    } else {
        log::error!("hit on INVALID line (index {index:#06X}, tag {tag:#05X}); treating as miss");
        None
    }
}

/// MESI state for a line filled by a bus read: Shared if any other cache
/// holds it, Exclusive otherwise.
fn read_fill_state(snoop: SnoopResult) -> MesiState {
    if snoop.is_hit() {
        MesiState::Shared
    } else {
        MesiState::Exclusive
    }
}

/// This cache's response to a snooped transaction for the given way.
fn snoop_response(set: &CacheSet, way: Option<u8>) -> SnoopResult {
    match way {
        None => SnoopResult::NoHit,
        Some(way) => match set.line(way).state {
            MesiState::Modified => SnoopResult::Hitm,
            _ => SnoopResult::Hit,
        },
    }
}

/// Notify L1 and the bus about the victim leaving a full set. A modified
/// victim is collected from L1 and written back; anything else is just
/// dropped from L1. The caller invalidates and refills the way.
fn flush_victim<B: BusInterface>(set: &CacheSet, index: u16, bus: &mut B) -> (u8, EvictedLine) {
    let way = set.plru.victim();
    let line = set.line(way);
    let address = CacheAddress::line_address(line.tag, index);

    if line.state == MesiState::Modified {
        bus.message_to_cache(L1Message::GetLine, address);
        bus.message_to_cache(L1Message::InvalidateLine, address);
        bus.bus_op(BusOp::Write, address);
    } else {
        bus.message_to_cache(L1Message::EvictLine, address);
    }

    (way, EvictedLine { address, state: line.state })
}
