//! A two-range directed prefetcher with a next-line fallback.
//!
//! Two pipelines observe the same call/return stream through separate
//! signature generators and learn the same misses at different look-ahead
//! distances, so a recurring context prefetches both its near and far
//! future. A shared overflow table catches what the per-range tables
//! cannot hold, and a next-k-line engine covers misses no signature
//! predicted, throttling itself while the directed side is productive.
//!
//! Miss addresses are stored compressed: a small dictionary id stands in
//! for the upper address bits of the 2 MiB region containing the line.
//!
//! See the following:
//!  - "D-JOLT: Distant Jolt Prefetcher"
//!  (Nakamura, Koizumi, Degawa, Irie, Sakai and Yoneda, 2020).

use crate::branch::BranchKind;
use crate::history::{ CallFifoSignature, SignatureHistory };
use crate::footprint::MissTableEntry;
use crate::region::{ CompressedLine, RegionTable };
use crate::table::SetAssocLruTable;
use crate::stats::PrefetchStats;
use crate::prefetcher::{ CachePrefetcher, PrefetchSink };

type CompressedEntry = MissTableEntry<CompressedLine>;
type MissTable = SetAssocLruTable<CompressedEntry>;

/// Configuration for building a [`DJOLTPrefetcher`].
#[derive(Clone, Copy, Debug)]
pub struct DJOLTConfig {
    pub log2_block_size: u32,

    /// Call-FIFO depth shared by both signature generators
    pub fifo_depth: usize,

    /// Look-ahead distances in branch events
    pub short_distance: usize,
    pub long_distance: usize,

    /// Miss-table geometries
    pub short_sets: usize,
    pub long_sets: usize,
    pub extra_sets: usize,
    pub ways: usize,

    /// Miss-descriptor slots per table entry
    pub vectors_per_entry: usize,

    /// Successor bits per miss descriptor
    pub vector_size: usize,

    /// Upper-bit dictionary id width
    pub region_ptr_bits: u32,

    /// Mask selecting the upper (dictionary) address bits
    pub region_mask: u64,

    /// Next-line degree after a productive branch event
    pub conservative_degree: usize,

    /// Next-line degree otherwise
    pub aggressive_degree: usize,
}
impl Default for DJOLTConfig {
    fn default() -> Self {
        Self {
            log2_block_size: 6,
            fifo_depth: 1,
            short_distance: 4,
            long_distance: 15,
            short_sets: 128,
            long_sets: 512,
            extra_sets: 128,
            ways: 4,
            vectors_per_entry: 2,
            vector_size: 8,
            region_ptr_bits: 5,
            region_mask: 0xFFFF_FFFF_FFE0_0000,
            conservative_degree: 2,
            aggressive_degree: 5,
        }
    }
}
impl DJOLTConfig {
    pub fn build(self) -> DJOLTPrefetcher {
        DJOLTPrefetcher {
            sig_short: CallFifoSignature::new(self.fifo_depth),
            sig_long: CallFifoSignature::new(self.fifo_depth),
            hist_short: SignatureHistory::new(self.short_distance),
            hist_long: SignatureHistory::new(self.long_distance),
            short_table: SetAssocLruTable::new(
                self.short_sets, self.ways, |sig| sig),
            long_table: SetAssocLruTable::new(
                self.long_sets, self.ways, |sig| sig),
            extra_table: SetAssocLruTable::new(
                self.extra_sets, self.ways, |sig| sig),
            regions: RegionTable::new(
                self.region_ptr_bits, self.region_mask, self.log2_block_size),
            prefetch_issued: false,
            stat: PrefetchStats::new(),
            cfg: self,
        }
    }
}

/// The two-range directed prefetcher front-end.
pub struct DJOLTPrefetcher {
    /// The configuration used to create this object
    pub cfg: DJOLTConfig,

    pub stat: PrefetchStats,

    /// Near-future signature pipeline
    sig_short: CallFifoSignature,
    hist_short: SignatureHistory<u16>,
    short_table: MissTable,

    /// Far-future signature pipeline
    sig_long: CallFifoSignature,
    hist_long: SignatureHistory<u16>,
    long_table: MissTable,

    /// Overflow shared by both pipelines
    extra_table: MissTable,

    /// Upper-bit dictionary
    regions: RegionTable,

    /// Whether the most recent call/return event replayed anything.
    /// Consulted by the next miss to pick a fallback degree.
    prefetch_issued: bool,
}
impl DJOLTPrefetcher {
    /// Replay every line learned under `sig` in `table`. Returns the number
    /// of prefetches issued; the lookup leaves the replacement order
    /// untouched.
    fn replay(
        table: &MissTable,
        sig: u16,
        regions: &RegionTable,
        sink: &mut dyn PrefetchSink,
    ) -> usize {
        let entry = match table.get(sig as u64) {
            Some(entry) => entry,
            None => return 0,
        };
        let mut issued = 0;
        for info in entry.valid_slots() {
            for line in info.addresses() {
                sink.prefetch_code_line(regions.decompress(line));
                issued += 1;
            }
        }
        issued
    }

    /// Record a compressed miss line under `sig`, spilling to the overflow
    /// table when the primary entry refuses. Returns 'false' when the
    /// overflow entry refuses too and the address is dropped.
    fn learn_with_sig(
        table: &mut MissTable,
        extra: &mut MissTable,
        sig: u16,
        addr: CompressedLine,
        n_slots: usize,
        vector_size: usize,
    ) -> bool {
        let key = sig as u64;
        if !table.contains(key) {
            table.insert(key, MissTableEntry::new(n_slots, vector_size));
        } else {
            table.touch(key);
        }
        let entry = table.get_mut(key)
            .expect("miss-table entry resident after insert");

        if entry.insert_first_fit(addr) {
            // Keep a hot overflow entry warm alongside its primary
            if extra.contains(key) {
                extra.touch(key);
            }
            return true;
        }

        if !extra.contains(key) {
            extra.insert(key, MissTableEntry::new(n_slots, vector_size));
        } else {
            extra.touch(key);
        }
        let spill = extra.get_mut(key)
            .expect("overflow entry resident after insert");
        spill.insert_first_fit(addr)
    }

    /// Cover the lines immediately after a miss, reaching further when the
    /// directed side has been quiet.
    fn next_line_fallback(&mut self, addr: u64, sink: &mut dyn PrefetchSink) {
        let degree = if self.prefetch_issued {
            self.cfg.conservative_degree
        } else {
            self.cfg.aggressive_degree
        };
        let line = addr >> self.cfg.log2_block_size;
        for i in 1..=(degree as u64) {
            sink.prefetch_code_line((line + i) << self.cfg.log2_block_size);
        }
        self.stat.fallback += degree;
    }
}

impl CachePrefetcher for DJOLTPrefetcher {
    fn name(&self) -> &'static str { "djolt" }

    fn branch_operate(&mut self,
        ip: u64,
        kind: BranchKind,
        _target: u64,
        sink: &mut dyn PrefetchSink,
    )
    {
        // Both generators advance on every call/return, consulted or not,
        // so each queue's back() stays aligned with the event stream.
        let (sig_1, sig_2) = if kind.is_call() {
            (self.sig_short.on_call(ip), self.sig_long.on_call(ip))
        } else if kind.is_return() {
            (self.sig_short.on_return(), self.sig_long.on_return())
        } else {
            return;
        };
        self.stat.branches += 1;
        self.hist_short.push(sig_1);
        self.hist_long.push(sig_2);

        let mut issued = 0;
        issued += Self::replay(&self.short_table, sig_1, &self.regions, sink);
        issued += Self::replay(&self.extra_table, sig_1, &self.regions, sink);
        issued += Self::replay(&self.long_table, sig_2, &self.regions, sink);
        issued += Self::replay(&self.extra_table, sig_2, &self.regions, sink);

        self.prefetch_issued = (issued > 0);
        self.stat.directed += issued;
        if (issued > 0) {
            self.stat.replays += 1;
        }
    }

    fn cache_operate(&mut self,
        addr: u64,
        cache_hit: bool,
        _prefetch_hit: bool,
        sink: &mut dyn PrefetchSink,
    )
    {
        if cache_hit {
            return;
        }
        self.stat.misses += 1;

        self.next_line_fallback(addr, sink);

        // A line outside the 31 claimable regions is unlearnable
        let line = match self.regions.compress(addr) {
            Some(line) => line,
            None => {
                self.stat.dropped += 1;
                return;
            },
        };

        let sig_1 = self.hist_short.back();
        let sig_2 = self.hist_long.back();
        let short_ok = Self::learn_with_sig(
            &mut self.short_table, &mut self.extra_table,
            sig_1, line,
            self.cfg.vectors_per_entry, self.cfg.vector_size,
        );
        let long_ok = Self::learn_with_sig(
            &mut self.long_table, &mut self.extra_table,
            sig_2, line,
            self.cfg.vectors_per_entry, self.cfg.vector_size,
        );
        if (!short_ok || !long_ok) {
            self.stat.dropped += 1;
        }
    }
}
