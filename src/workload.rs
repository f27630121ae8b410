//! Synthetic instruction streams for exercising prefetchers.
//!
//! A workload is a small static call graph: routines at distinct code
//! regions, each fetching a run of cache lines and calling fixed callees at
//! fixed points in its body. Repeated walks of the graph therefore repeat
//! the same call/return contexts, which is the behaviour a signature-based
//! prefetcher learns from.

use rand::prelude::*;

use crate::branch::*;
use crate::table::SetAssocLruTable;

/// One element of a fetched instruction stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// An instruction fetch touching one cache line
    Fetch { addr: u64 },

    /// A retired control-flow instruction
    Branch(BranchRecord),
}

/// A routine occupying a contiguous run of cache lines.
struct Routine {
    /// First byte address of the routine
    base: u64,

    /// Body length in cache lines
    blocks: usize,

    /// Call sites: (block index within the body, callee routine index)
    calls: Vec<(usize, usize)>,
}

/// A randomly generated, statically shaped call graph.
pub struct CallGraphWorkload {
    routines: Vec<Routine>,
    log2_block_size: u32,
}
impl CallGraphWorkload {
    /// Generate `num_routines` routines with up to `max_blocks` lines and
    /// `max_calls` call sites each. Routine 0 is the entry point; callees
    /// are always higher-numbered routines, so the graph is acyclic.
    pub fn generate(
        num_routines: usize,
        max_blocks: usize,
        max_calls: usize,
        log2_block_size: u32,
        rng: &mut impl Rng,
    ) -> Self {
        assert!(num_routines > 1);
        let mut routines = Vec::with_capacity(num_routines);
        for idx in 0..num_routines {
            let blocks = rng.gen_range(2..=max_blocks);

            // Spread routines across distinct 2 MiB regions now and then so
            // compressed-address schemes see more than one upper region.
            let region = (idx as u64 / 8) * 0x20_0000;
            let base = region + 0x1_0000 + (idx as u64 % 8) * 0x2000;

            let mut calls = Vec::new();
            if (idx + 1 < num_routines) {
                for _ in 0..rng.gen_range(0..=max_calls) {
                    let site = rng.gen_range(0..blocks);
                    let callee = rng.gen_range(idx + 1..num_routines);
                    calls.push((site, callee));
                }
                calls.sort();
                calls.dedup_by_key(|c| c.0);
            }
            routines.push(Routine { base, blocks, calls });
        }
        Self { routines, log2_block_size }
    }

    fn block_size(&self) -> u64 {
        1 << self.log2_block_size
    }

    fn walk(&self, idx: usize, depth: usize, events: &mut Vec<StreamEvent>) {
        let routine = &self.routines[idx];
        let mut call_iter = routine.calls.iter().peekable();
        for blk in 0..routine.blocks {
            let addr = routine.base + blk as u64 * self.block_size();
            events.push(StreamEvent::Fetch { addr });

            let call_here = matches!(call_iter.peek(), Some((site, _)) if *site == blk);
            if call_here && depth > 0 {
                let (_, callee) = *call_iter.next().unwrap();
                let tgt = self.routines[callee].base;
                events.push(StreamEvent::Branch(BranchRecord::new(
                    addr, tgt, BranchKind::DirectCall,
                )));
                self.walk(callee, depth - 1, events);

                let callee_end = tgt
                    + self.routines[callee].blocks as u64 * self.block_size();
                events.push(StreamEvent::Branch(BranchRecord::new(
                    callee_end, addr, BranchKind::Return,
                )));
            } else if call_here {
                call_iter.next();
            }
        }
    }

    /// Emit `iterations` full walks of the graph from the entry routine.
    pub fn emit(&self, iterations: usize, max_depth: usize)
        -> Vec<StreamEvent>
    {
        let mut events = Vec::new();
        for _ in 0..iterations {
            self.walk(0, max_depth, &mut events);
        }
        events
    }
}

/// A minimal set-associative LRU instruction-cache model, used by the
/// evaluation binaries to turn a fetch stream into hits and misses.
pub struct SimpleICache {
    lines: SetAssocLruTable<()>,
    log2_block_size: u32,
}
impl SimpleICache {
    pub fn new(sets: usize, ways: usize, log2_block_size: u32) -> Self {
        Self {
            lines: SetAssocLruTable::new(sets, ways, |line| line),
            log2_block_size,
        }
    }

    /// Demand access. Returns 'true' on hit; a miss fills the line.
    pub fn access(&mut self, addr: u64) -> bool {
        let line = addr >> self.log2_block_size;
        if self.lines.contains(line) {
            self.lines.touch(line);
            true
        } else {
            self.lines.insert(line, ());
            false
        }
    }

    /// Prefetch fill. Refreshes the line if it is already resident.
    pub fn fill(&mut self, addr: u64) {
        let line = addr >> self.log2_block_size;
        if self.lines.contains(line) {
            self.lines.touch(line);
        } else {
            self.lines.insert(line, ());
        }
    }
}
