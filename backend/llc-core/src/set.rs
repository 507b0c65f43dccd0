//! Line and set storage: the MESI metadata for one way and the 16-way
//! associative set that groups them with their replacement state.

use crate::plru::PlruTree;
use crate::WAYS;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MesiState {
    #[default]
    Invalid,
    Modified,
    Exclusive,
    Shared,
}

impl MesiState {
    /// A line is present in the cache iff its state is not `Invalid`.
    #[must_use]
    pub fn is_present(self) -> bool {
        self != Self::Invalid
    }
}

impl Display for MesiState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "INVALID"),
            Self::Modified => write!(f, "MODIFIED"),
            Self::Exclusive => write!(f, "EXCLUSIVE"),
            Self::Shared => write!(f, "SHARED"),
        }
    }
}

/// One way of a set. `valid` and `dirty` are kept in lockstep with `state`
/// at every mutation site: `valid ⇔ state != Invalid`,
/// `dirty ⇔ state == Modified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheLine {
    pub tag: u16,
    pub state: MesiState,
    pub valid: bool,
    pub dirty: bool,
}

impl CacheLine {
    fn with_state(tag: u16, state: MesiState) -> Self {
        Self {
            tag,
            state,
            valid: state != MesiState::Invalid,
            dirty: state == MesiState::Modified,
        }
    }
}

/// One row of the cache: `WAYS` lines plus the set's replacement state.
#[derive(Debug, Clone)]
pub struct CacheSet {
    lines: [CacheLine; WAYS],
    pub plru: PlruTree,
}

impl CacheSet {
    pub(crate) fn new() -> Self {
        Self {
            lines: [CacheLine::default(); WAYS],
            plru: PlruTree::default(),
        }
    }

    /// The way holding a valid line with this tag, if any. At most one such
    /// line can exist per set; the scan returns the first match.
    #[must_use]
    pub fn lookup(&self, tag: u16) -> Option<u8> {
        self.lines
            .iter()
            .position(|line| line.valid && line.tag == tag)
            .map(|way| way as u8)
    }

    /// First way without a valid line; miss fills prefer this over eviction.
    #[must_use]
    pub fn first_invalid(&self) -> Option<u8> {
        self.lines.iter().position(|line| !line.valid).map(|way| way as u8)
    }

    #[must_use]
    pub fn line(&self, way: u8) -> CacheLine {
        self.lines[usize::from(way)]
    }

    /// Overwrite a way with a freshly fetched line.
    pub fn install(&mut self, way: u8, tag: u16, state: MesiState) {
        self.lines[usize::from(way)] = CacheLine::with_state(tag, state);
    }

    /// Transition a way's coherence state in place, keeping the metadata
    /// bits derived from it.
    pub fn set_state(&mut self, way: u8, state: MesiState) {
        let line = &mut self.lines[usize::from(way)];
        *line = CacheLine::with_state(line.tag, state);
    }

    /// Return a way to the reset state: zero tag, `Invalid`, clean.
    pub fn invalidate(&mut self, way: u8) {
        self.lines[usize::from(way)] = CacheLine::default();
    }

    /// Yields `(way, line)` for each present line in way order.
    pub fn iter_valid(&self) -> impl Iterator<Item = (u8, CacheLine)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.valid)
            .map(|(way, line)| (way as u8, *line))
    }

    pub(crate) fn reset(&mut self) {
        self.lines = [CacheLine::default(); WAYS];
        self.plru.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_invalid_lines() {
        let mut set = CacheSet::new();
        set.install(0, 0x123, MesiState::Shared);
        set.invalidate(0);
        assert_eq!(set.lookup(0x123), None);
        // An invalidated way holds tag 0; a lookup for tag 0 must not hit it.
        assert_eq!(set.lookup(0), None);
    }

    #[test]
    fn lookup_finds_installed_tag() {
        let mut set = CacheSet::new();
        set.install(3, 0x456, MesiState::Exclusive);
        assert_eq!(set.lookup(0x456), Some(3));
    }

    #[test]
    fn first_invalid_scans_in_way_order() {
        let mut set = CacheSet::new();
        assert_eq!(set.first_invalid(), Some(0));
        set.install(0, 0x1, MesiState::Shared);
        set.install(1, 0x2, MesiState::Shared);
        assert_eq!(set.first_invalid(), Some(2));
        for way in 2..WAYS as u8 {
            set.install(way, 0x10 + u16::from(way), MesiState::Shared);
        }
        assert_eq!(set.first_invalid(), None);
    }

    #[test]
    fn metadata_bits_track_state() {
        let mut set = CacheSet::new();
        set.install(0, 0x1, MesiState::Modified);
        let line = set.line(0);
        assert!(line.valid);
        assert!(line.dirty);

        set.set_state(0, MesiState::Shared);
        let line = set.line(0);
        assert!(line.valid);
        assert!(!line.dirty);

        set.set_state(0, MesiState::Invalid);
        let line = set.line(0);
        assert!(!line.valid);
        assert!(!line.dirty);
    }

    #[test]
    fn install_resets_dirty_unless_modified() {
        let mut set = CacheSet::new();
        set.install(2, 0x9, MesiState::Modified);
        assert!(set.line(2).dirty);
        set.install(2, 0xA, MesiState::Exclusive);
        assert!(!set.line(2).dirty);
    }

    #[test]
    fn iter_valid_yields_present_lines_in_way_order() {
        let mut set = CacheSet::new();
        set.install(5, 0x50, MesiState::Shared);
        set.install(1, 0x10, MesiState::Modified);
        set.install(9, 0x90, MesiState::Exclusive);

        let ways: Vec<u8> = set.iter_valid().map(|(way, _)| way).collect();
        assert_eq!(ways, vec![1, 5, 9]);
    }

    #[test]
    fn unique_valid_tag_per_set_holds_under_install() {
        let mut set = CacheSet::new();
        set.install(0, 0x77, MesiState::Shared);
        set.install(4, 0x78, MesiState::Shared);

        for (w1, l1) in set.iter_valid() {
            for (w2, l2) in set.iter_valid() {
                assert!(w1 == w2 || l1.tag != l2.tag);
            }
        }
    }
}
