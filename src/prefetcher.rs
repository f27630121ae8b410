//! Implementations of different instruction prefetchers.

pub mod rdip;
pub mod djolt;

pub use rdip::*;
pub use djolt::*;

use crate::branch::BranchKind;

/// Interface to the host primitive for requesting an L1I prefetch.
///
/// The host may reject or coalesce requests; issue is best-effort and the
/// core never observes the outcome.
pub trait PrefetchSink {
    fn prefetch_code_line(&mut self, addr: u64);
}

impl<F: FnMut(u64)> PrefetchSink for F {
    fn prefetch_code_line(&mut self, addr: u64) {
        self(addr)
    }
}

/// Event-driven interface to an L1I prefetcher.
///
/// The host calls the sinks in the program order of retirement (branches)
/// and fetch-time observation (cache accesses); a prefetcher instance
/// serves a single logical stream and mutates freely between calls.
pub trait CachePrefetcher {
    fn name(&self) -> &'static str;

    /// Observe a retired branch instruction.
    fn branch_operate(&mut self,
        ip: u64,
        kind: BranchKind,
        target: u64,
        sink: &mut dyn PrefetchSink,
    );

    /// Observe an L1I access. `cache_hit` is 'false' on a demand miss.
    fn cache_operate(&mut self,
        addr: u64,
        cache_hit: bool,
        prefetch_hit: bool,
        sink: &mut dyn PrefetchSink,
    );

    /// Observe a line filling into the L1I.
    fn cache_fill(&mut self,
        _addr: u64,
        _set: u32,
        _way: u32,
        _is_prefetch: bool,
        _evicted_addr: u64,
    ) {}

    /// Advance one host cycle.
    fn cycle_operate(&mut self) {}

    /// Host shutdown notification.
    fn final_stats(&self) {}
}
