//! A return-address-stack directed instruction prefetcher.
//!
//! Folds the whole shadow RAS into a 32-bit signature on every call and
//! return, learns the miss lines that follow each signature, and replays
//! them when the signature recurs.
//!
//! See the following:
//!  - "RDIP: Return-address-stack Directed Instruction Prefetching"
//!  (Kolli, Saidi and Wenisch, 2013).

use crate::branch::BranchKind;
use crate::history::{ RasSignature, SignatureHistory };
use crate::footprint::MissTableEntry;
use crate::table::SetAssocLruTable;
use crate::stats::PrefetchStats;
use crate::prefetcher::{ CachePrefetcher, PrefetchSink };

/// Configuration for building a [`RDIPPrefetcher`].
#[derive(Clone, Copy, Debug)]
pub struct RDIPConfig {
    pub log2_block_size: u32,

    /// Depth of the shadow return-address stack
    pub ras_depth: usize,

    /// Look-ahead distance in branch events
    pub distance: usize,

    /// Miss-table geometry
    pub sets: usize,
    pub ways: usize,

    /// Miss-descriptor slots per table entry
    pub vectors_per_entry: usize,

    /// Successor bits per miss descriptor
    pub vector_size: usize,
}
impl Default for RDIPConfig {
    fn default() -> Self {
        Self {
            log2_block_size: 6,
            ras_depth: 4,
            distance: 2,
            sets: 2048,
            ways: 4,
            vectors_per_entry: 3,
            vector_size: 8,
        }
    }
}
impl RDIPConfig {
    pub fn build(self) -> RDIPPrefetcher {
        RDIPPrefetcher {
            siggen: RasSignature::new(self.ras_depth),
            history: SignatureHistory::new(self.distance),
            // Signatures are already well-mixed hashes; index directly.
            table: SetAssocLruTable::new(self.sets, self.ways, |sig| sig),
            stat: PrefetchStats::new(),
            cfg: self,
        }
    }
}

/// The RAS-directed prefetcher front-end.
pub struct RDIPPrefetcher {
    /// The configuration used to create this object
    pub cfg: RDIPConfig,

    pub stat: PrefetchStats,

    /// Signature generator over the shadow RAS
    siggen: RasSignature,

    /// Signatures of the most recent call/return events
    history: SignatureHistory<u32>,

    /// Learned miss lines, keyed by signature
    table: SetAssocLruTable<MissTableEntry<u64>>,
}
impl RDIPPrefetcher {
    /// Replay every line learned under `sig`. The lookup leaves the table's
    /// replacement order untouched.
    fn replay(&mut self, sig: u32, sink: &mut dyn PrefetchSink) {
        let entry = match self.table.get(sig as u64) {
            Some(entry) => entry,
            None => return,
        };
        let mut issued = 0;
        for info in entry.valid_slots() {
            for line in info.addresses() {
                sink.prefetch_code_line(line << self.cfg.log2_block_size);
                issued += 1;
            }
        }
        self.stat.directed += issued;
        if (issued > 0) {
            self.stat.replays += 1;
        }
    }

    /// Record a missing line under the signature most recently enqueued.
    fn learn(&mut self, line: u64) {
        let sig = self.history.back() as u64;
        if !self.table.contains(sig) {
            self.table.insert(sig, MissTableEntry::new(
                self.cfg.vectors_per_entry,
                self.cfg.vector_size,
            ));
        } else {
            self.table.touch(sig);
        }
        let entry = self.table.get_mut(sig)
            .expect("miss-table entry resident after insert");
        entry.insert_or_touch(line);
    }
}

impl CachePrefetcher for RDIPPrefetcher {
    fn name(&self) -> &'static str { "rdip" }

    fn branch_operate(&mut self,
        ip: u64,
        kind: BranchKind,
        _target: u64,
        sink: &mut dyn PrefetchSink,
    )
    {
        let sig = if kind.is_call() {
            self.siggen.on_call(ip)
        } else if kind.is_return() {
            self.siggen.on_return()
        } else {
            return;
        };
        self.stat.branches += 1;

        // A signature recurring exactly `distance` events later is
        // suppressed outright: no enqueue, no replay.
        if (sig == self.history.front()) {
            self.stat.suppressed += 1;
            return;
        }

        self.history.push(sig);
        self.replay(sig, sink);
    }

    fn cache_operate(&mut self,
        addr: u64,
        cache_hit: bool,
        _prefetch_hit: bool,
        _sink: &mut dyn PrefetchSink,
    )
    {
        if cache_hit {
            return;
        }
        self.stat.misses += 1;
        self.learn(addr >> self.cfg.log2_block_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALL: BranchKind = BranchKind::DirectCall;
    const RET: BranchKind = BranchKind::Return;

    fn drive_branch(pf: &mut RDIPPrefetcher, ip: u64, kind: BranchKind)
        -> Vec<u64>
    {
        let mut out = Vec::new();
        pf.branch_operate(ip, kind, 0, &mut |addr| out.push(addr));
        out
    }

    fn drive_miss(pf: &mut RDIPPrefetcher, addr: u64) {
        pf.cache_operate(addr, false, false, &mut |_addr| {});
    }

    #[test]
    fn single_training_replays_on_recurrence() {
        let mut pf = RDIPConfig::default().build();

        // Learn two miss lines under the signature of CALL@0x1000
        assert!(drive_branch(&mut pf, 0x1000, CALL).is_empty());
        drive_miss(&mut pf, 0x4000);
        drive_miss(&mut pf, 0x4080);

        // Unwind and take a different call so the recurrence does not land
        // exactly `distance` events later
        drive_branch(&mut pf, 0x1000, RET);
        drive_branch(&mut pf, 0x2000, CALL);
        drive_branch(&mut pf, 0x2000, RET);

        // The original call context recurs and replays both lines
        let out = drive_branch(&mut pf, 0x1000, CALL);
        assert_eq!(out, vec![0x4000, 0x4080]);
        assert_eq!(pf.stat.replays, 1);
    }

    #[test]
    fn adjacent_misses_share_one_descriptor() {
        let mut pf = RDIPConfig::default().build();
        drive_branch(&mut pf, 0x1000, CALL);
        for line in 0..4u64 {
            drive_miss(&mut pf, 0x4000 + line * 0x40);
        }
        drive_branch(&mut pf, 0x1000, RET);
        drive_branch(&mut pf, 0x2000, CALL);
        drive_branch(&mut pf, 0x2000, RET);

        let out = drive_branch(&mut pf, 0x1000, CALL);
        assert_eq!(out, vec![0x4000, 0x4040, 0x4080, 0x40c0]);
    }

    #[test]
    fn unchanged_signature_emits_nothing() {
        let mut pf = RDIPConfig::default().build();
        drive_branch(&mut pf, 0x1000, CALL);
        drive_miss(&mut pf, 0x4000);

        // CALL, RET, CALL@same-site recurs at exactly distance 2: the
        // front-of-queue test suppresses the replay and the enqueue.
        drive_branch(&mut pf, 0x1000, RET);
        let out = drive_branch(&mut pf, 0x1000, CALL);
        assert!(out.is_empty());
        assert_eq!(pf.stat.suppressed, 1);

        // The queue is unchanged: misses still learn under the RET signature
        let back = pf.history.back();
        drive_miss(&mut pf, 0x8000);
        assert_eq!(pf.history.back(), back);
    }

    #[test]
    fn non_procedural_branches_are_ignored() {
        let mut pf = RDIPConfig::default().build();
        let out = drive_branch(&mut pf, 0x1000, BranchKind::DirectBranch);
        assert!(out.is_empty());
        assert_eq!(pf.stat.branches, 0);
    }

    #[test]
    fn hits_do_not_learn() {
        let mut pf = RDIPConfig::default().build();
        drive_branch(&mut pf, 0x1000, CALL);
        pf.cache_operate(0x4000, true, false, &mut |_addr| {});
        assert_eq!(pf.stat.misses, 0);

        drive_branch(&mut pf, 0x1000, RET);
        drive_branch(&mut pf, 0x2000, CALL);
        drive_branch(&mut pf, 0x2000, RET);
        assert!(drive_branch(&mut pf, 0x1000, CALL).is_empty());
    }
}
