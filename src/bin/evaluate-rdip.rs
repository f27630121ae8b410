use myelin::*;
use std::env;

const LOG2_BLOCK_SIZE: u32 = 6;

/// Replay a stream against an L1I model with no prefetcher attached.
fn run_baseline(events: &[StreamEvent]) -> usize {
    let mut cache = SimpleICache::new(64, 8, LOG2_BLOCK_SIZE);
    let mut misses = 0;
    for ev in events {
        if let StreamEvent::Fetch { addr } = ev {
            if !cache.access(*addr) {
                misses += 1;
            }
        }
    }
    misses
}

/// Replay a stream with the prefetcher filling the same L1I model.
fn run_prefetched(
    events: &[StreamEvent],
    pf: &mut dyn CachePrefetcher,
) -> (usize, MissProfile)
{
    let mut cache = SimpleICache::new(64, 8, LOG2_BLOCK_SIZE);
    let mut profile = MissProfile::new();
    let mut misses = 0;

    for ev in events {
        match ev {
            StreamEvent::Fetch { addr } => {
                let hit = cache.access(*addr);
                if !hit {
                    misses += 1;
                    profile.record(addr >> LOG2_BLOCK_SIZE);
                }
                pf.cache_operate(*addr, hit, false,
                    &mut |a| cache.fill(a));
            },
            StreamEvent::Branch(rec) => {
                pf.branch_operate(rec.pc, rec.kind, rec.tgt,
                    &mut |a| cache.fill(a));
            },
        }
    }
    (misses, profile)
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let iterations: usize = if args.len() > 1 {
        args[1].parse().expect("iterations must be an integer")
    } else {
        16
    };

    let mut rng = rand::thread_rng();
    let workload = CallGraphWorkload::generate(
        32, 16, 3, LOG2_BLOCK_SIZE, &mut rng,
    );
    let events = workload.emit(iterations, 6);
    println!("[*] rdip: {} events over {} iterations",
        events.len(), iterations);

    let baseline = run_baseline(&events);

    let mut pf = RDIPConfig::default().build();
    let (misses, profile) = run_prefetched(&events, &mut pf);
    pf.final_stats();

    println!();
    println!("baseline misses:   {}", baseline);
    println!("prefetched misses: {}", misses);
    if (baseline > 0) {
        let covered = baseline.saturating_sub(misses);
        println!("coverage:          {:.2}%",
            covered as f64 / baseline as f64 * 100.0);
    }
    println!("branches observed: {}", pf.stat.branches);
    println!("suppressed:        {}", pf.stat.suppressed);
    println!("replays:           {}", pf.stat.replays);
    println!("directed issues:   {}", pf.stat.directed);
    println!("unique miss lines: {}", profile.num_unique_lines());
    println!();
    println!("hottest remaining miss lines:");
    for (line, occ) in profile.top_lines(8) {
        println!("{:016x}: {}", line << LOG2_BLOCK_SIZE, occ);
    }
}
