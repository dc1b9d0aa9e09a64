//! Concurrent synthetic workload: one worker thread per I/O queue.

use std::ops::AddAssign;

use cachetrace_state::Publish;

use super::{SimCache, SimRequest};
use crate::Result;
use crate::topology::CacheTopology;

/// Workload shape.
#[derive(Debug, Clone, Copy)]
pub struct Workload {
    /// I/Os issued per queue.
    pub ios_per_queue: u64,
    /// Request size for reads/writes.
    pub io_bytes: u32,
    /// Probability that a request is a cache hit.
    pub hit_ratio: f64,
    /// Probability that a request is addressed through a file.
    pub file_ratio: f64,
    /// Seed; each queue derives its own stream from it.
    pub seed: u64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            ios_per_queue: 10_000,
            io_bytes: 4096,
            hit_ratio: 0.7,
            file_ratio: 0.0,
            seed: 0x5eed,
        }
    }
}

/// Totals over all queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadStats {
    pub reads: u64,
    pub writes: u64,
    pub flushes: u64,
    pub discards: u64,
    pub fast_path: u64,
    pub completed: u64,
    /// Records the sink actually received.
    pub delivered: u64,
}

impl WorkloadStats {
    pub const fn submitted(&self) -> u64 {
        self.reads + self.writes + self.flushes + self.discards
    }

    fn count(&mut self, outcome: Publish) {
        if outcome == Publish::Delivered {
            self.delivered += 1;
        }
    }
}

impl AddAssign for WorkloadStats {
    fn add_assign(&mut self, rhs: Self) {
        self.reads += rhs.reads;
        self.writes += rhs.writes;
        self.flushes += rhs.flushes;
        self.discards += rhs.discards;
        self.fast_path += rhs.fast_path;
        self.completed += rhs.completed;
        self.delivered += rhs.delivered;
    }
}

/// splitmix64; deterministic per seed.
struct Rng(u64);

impl Rng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n.max(1)
    }

    #[allow(clippy::cast_precision_loss)]
    fn chance(&mut self, p: f64) -> bool {
        ((self.next_u64() >> 11) as f64 / (1u64 << 53) as f64) < p
    }
}

/// Run `workload` on every queue of `cache` concurrently.
///
/// `progress` is called with the number of I/Os a worker just finished.
pub fn run_workload(
    cache: &SimCache,
    workload: &Workload,
    progress: &(dyn Fn(u64) + Sync),
) -> Result<WorkloadStats> {
    let mut cores = Vec::new();
    cache.visit_cores(&mut |core| {
        cores.push(core.id());
        Ok(())
    })?;
    if cores.is_empty() {
        return Err(crate::Error::InvalidArgument("workload needs at least one opened core"));
    }

    let io_queues = cache.trace().io_queues();
    let results: Vec<Result<WorkloadStats>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..io_queues)
            .map(|queue| {
                let cores = &cores;
                s.spawn(move || run_queue(cache, workload, cores, queue, progress))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
            .collect()
    });

    let mut total = WorkloadStats::default();
    for stats in results {
        total += stats?;
    }
    Ok(total)
}

const PROGRESS_STEP: u64 = 256;

fn run_queue(
    cache: &SimCache,
    workload: &Workload,
    cores: &[u16],
    queue: u32,
    progress: &(dyn Fn(u64) + Sync),
) -> Result<WorkloadStats> {
    let mut rng = Rng(workload.seed ^ (u64::from(queue) << 32));
    let mut stats = WorkloadStats::default();
    let sectors = u64::from(workload.io_bytes >> 9).max(1);

    for i in 0..workload.ios_per_queue {
        let core = cores[usize::try_from(rng.below(cores.len() as u64)).unwrap_or(0)];
        let address = rng.below(1 << 30) & !511;
        let roll = rng.below(100);

        let mut req = if roll < 45 {
            SimRequest::read(core, queue, address, workload.io_bytes)
        } else if roll < 80 {
            SimRequest::write(core, queue, address, workload.io_bytes)
        } else if roll < 90 {
            SimRequest::read(core, queue, 0, 0)
        } else {
            SimRequest::discard(core, queue, address, sectors)
        };
        req = req
            .with_hit(rng.chance(workload.hit_ratio))
            .with_io_class(u32::try_from(rng.below(4)).unwrap_or(0));
        if rng.chance(workload.file_ratio) {
            req = req.with_file(rng.below(64), address);
        }

        let io = cache.new_io(req);
        if roll < 80 {
            if rng.chance(0.25) {
                stats.fast_path += 1;
                if let Some(outcome) = cache.submit_fast(&io, true)? {
                    stats.count(outcome);
                }
            } else {
                stats.count(cache.submit(&io)?);
            }
            if roll < 45 {
                stats.reads += 1;
            } else {
                stats.writes += 1;
            }
        } else if roll < 90 {
            stats.count(cache.submit_flush(&io)?);
            stats.flushes += 1;
        } else {
            stats.count(cache.submit_discard(&io)?);
            stats.discards += 1;
        }

        stats.count(cache.complete(io));
        stats.completed += 1;

        if (i + 1) % PROGRESS_STEP == 0 {
            progress(PROGRESS_STEP);
        }
    }
    progress(workload.ios_per_queue % PROGRESS_STEP);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_deterministic() {
        let mut a = Rng(42);
        let mut b = Rng(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_rng_chance_bounds() {
        let mut rng = Rng(1);
        assert!((0..1000).all(|_| !rng.chance(0.0)));
        assert!((0..1000).all(|_| rng.chance(1.0)));
    }
}
