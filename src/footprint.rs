//! Compact descriptors for the miss lines observed under a signature.

use bitvec::prelude::*;

use crate::table::LruRanks;

/// An address a [`MissInfo`] can record.
///
/// Implementations define what "same region" means: plain line addresses
/// are one unbounded region, while compressed addresses only relate when
/// their upper bits match.
pub trait MissAddress: Copy + Eq {
    /// Offset of `self` relative to `base`, in lines. [None] when the two
    /// addresses do not share a region.
    fn offset_from(self, base: Self) -> Option<i64>;

    /// The address `lines` lines beyond this one.
    fn advance(self, lines: u64) -> Self;
}

impl MissAddress for u64 {
    fn offset_from(self, base: Self) -> Option<i64> {
        Some(self.wrapping_sub(base) as i64)
    }
    fn advance(self, lines: u64) -> Self {
        self + lines
    }
}

/// A base line address plus a bit-vector of successor lines.
///
/// Bit `i` records the line at offset `i + 1` from the base, so a single
/// descriptor covers a window of `1 + vector_size` contiguous-region lines.
/// The base is fixed once seeded; earlier or out-of-window lines must go to
/// another slot.
#[derive(Clone, Debug)]
pub struct MissInfo<A: MissAddress> {
    base: Option<A>,
    bits: BitVec,
}
impl<A: MissAddress> MissInfo<A> {
    pub fn new(vector_size: usize) -> Self {
        Self { base: None, bits: bitvec![0; vector_size] }
    }

    pub fn is_valid(&self) -> bool { self.base.is_some() }

    pub fn base(&self) -> Option<A> { self.base }

    /// Forget the recorded window.
    pub fn clear(&mut self) {
        self.base = None;
        self.bits.fill(false);
    }

    /// Try to record `addr`, returning 'true' on success.
    ///
    /// An empty descriptor is seeded with `addr` as its base. Otherwise the
    /// address is accepted when it lies in the base's region at an offset in
    /// `[0, vector_size]`; recording the base again is a successful no-op.
    pub fn add(&mut self, addr: A) -> bool {
        let base = match self.base {
            None => {
                self.base = Some(addr);
                return true;
            },
            Some(base) => base,
        };

        let diff = match addr.offset_from(base) {
            Some(diff) => diff,
            None => return false,
        };

        if (diff < 0) {
            return false;
        }
        if (diff == 0) {
            return true;
        }
        if (diff as usize <= self.bits.len()) {
            self.bits.set(diff as usize - 1, true);
            return true;
        }
        false
    }

    /// Visit every recorded address: the base first, then set offsets in
    /// ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = A> + '_ {
        let base = self.base;
        base.into_iter().chain(
            self.bits.iter_ones()
                .filter_map(move |i| base.map(|b| b.advance(i as u64 + 1)))
        )
    }
}

/// The payload of one miss-table entry: a small, ordered set of
/// [`MissInfo`] slots.
///
/// Two insertion policies are provided. [`MissTableEntry::insert_or_touch`]
/// keeps an LRU order over the slots and evicts when no slot accepts the
/// address; [`MissTableEntry::insert_first_fit`] never evicts and reports
/// refusal so the caller can redirect the address elsewhere.
#[derive(Clone, Debug)]
pub struct MissTableEntry<A: MissAddress> {
    slots: Vec<MissInfo<A>>,
    lru: LruRanks,
}
impl<A: MissAddress> MissTableEntry<A> {
    pub fn new(n_slots: usize, vector_size: usize) -> Self {
        assert!(n_slots > 0);
        Self {
            slots: vec![MissInfo::new(vector_size); n_slots],
            lru: LruRanks::new(n_slots),
        }
    }

    /// Record `addr` in the first accepting slot, evicting the LRU slot if
    /// every slot refuses. The slot that takes the address becomes
    /// most-recently-used.
    pub fn insert_or_touch(&mut self, addr: A) {
        for idx in 0..self.slots.len() {
            if self.slots[idx].add(addr) {
                self.lru.touch(idx);
                return;
            }
        }
        let victim = self.lru.victim();
        self.slots[victim].clear();
        let seeded = self.slots[victim].add(addr);
        assert!(seeded);
        self.lru.touch(victim);
    }

    /// Record `addr` in the first accepting slot without evicting anything.
    /// Returns 'false' when every slot refuses.
    pub fn insert_first_fit(&mut self, addr: A) -> bool {
        self.slots.iter_mut().any(|slot| slot.add(addr))
    }

    /// Visit the slots holding a recorded window, in slot order.
    pub fn valid_slots(&self) -> impl Iterator<Item = &MissInfo<A>> {
        self.slots.iter().filter(|slot| slot.is_valid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_then_window() {
        let mut info: MissInfo<u64> = MissInfo::new(8);
        assert!(!info.is_valid());
        assert!(info.add(0x200));
        assert!(info.add(0x203));
        let addrs: Vec<u64> = info.addresses().collect();
        assert_eq!(addrs, vec![0x200, 0x203]);
    }

    #[test]
    fn window_boundary() {
        let mut info: MissInfo<u64> = MissInfo::new(8);
        assert!(info.add(0x200));
        // Offset 8 is the last representable line
        assert!(info.add(0x208));
        assert!(!info.add(0x209));
        let addrs: Vec<u64> = info.addresses().collect();
        assert_eq!(addrs, vec![0x200, 0x208]);
    }

    #[test]
    fn rejects_lines_before_the_base() {
        let mut info: MissInfo<u64> = MissInfo::new(8);
        assert!(info.add(0x200));
        assert!(!info.add(0x1ff));
    }

    #[test]
    fn base_readd_is_a_noop() {
        let mut info: MissInfo<u64> = MissInfo::new(8);
        assert!(info.add(0x200));
        assert!(info.add(0x200));
        assert_eq!(info.addresses().count(), 1);
    }

    #[test]
    fn addresses_are_base_first_and_ascending() {
        let mut info: MissInfo<u64> = MissInfo::new(8);
        for addr in [0x100u64, 0x105, 0x101, 0x108] {
            assert!(info.add(addr));
        }
        let addrs: Vec<u64> = info.addresses().collect();
        assert_eq!(addrs, vec![0x100, 0x101, 0x105, 0x108]);
    }

    #[test]
    fn first_fit_spills_to_later_slots() {
        let mut entry: MissTableEntry<u64> = MissTableEntry::new(2, 8);
        assert!(entry.insert_first_fit(0x100));
        // Out of the first slot's window, lands in the second
        assert!(entry.insert_first_fit(0x200));
        // Refused by both
        assert!(!entry.insert_first_fit(0x300));
        let bases: Vec<u64> =
            entry.valid_slots().filter_map(|s| s.base()).collect();
        assert_eq!(bases, vec![0x100, 0x200]);
    }

    #[test]
    fn insert_or_touch_evicts_the_lru_slot() {
        let mut entry: MissTableEntry<u64> = MissTableEntry::new(2, 8);
        entry.insert_or_touch(0x100);
        entry.insert_or_touch(0x200);
        // Make the 0x100 slot most-recently-used again
        entry.insert_or_touch(0x100);
        // No slot accepts 0x300; the 0x200 slot is the victim
        entry.insert_or_touch(0x300);
        let bases: Vec<u64> =
            entry.valid_slots().filter_map(|s| s.base()).collect();
        assert_eq!(bases, vec![0x100, 0x300]);
    }

    #[test]
    fn insert_or_touch_extends_an_existing_window() {
        let mut entry: MissTableEntry<u64> = MissTableEntry::new(3, 8);
        entry.insert_or_touch(0x100);
        entry.insert_or_touch(0x104);
        let addrs: Vec<u64> = entry.valid_slots()
            .flat_map(|s| s.addresses().collect::<Vec<_>>())
            .collect();
        assert_eq!(addrs, vec![0x100, 0x104]);
    }
}
