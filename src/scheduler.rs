// SPDX-License-Identifier: Apache-2.0

//! Two-stage work scheduler.
//!
//! Structural jobs build the context of one gate set and run the functional
//! search on it; every structural job that produces candidates enqueues one
//! functional job that verifies them. Both queues sit behind a single lock.
//! Idle workers block on a condition variable that is signalled whenever a
//! job is published or a structural job finishes, so the last structural
//! job also acts as the shutdown signal. A job that panics is logged and
//! skipped; its structural slot is still released.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use crate::architectures::BaseFamily;
use crate::candidates::{BaseCandidate, FunctionalCandidate, StructuralCandidate, VerifiedCandidate};
use crate::config::{Configuration, MultithreadingPriority};
use crate::netlist::{GateId, Netlist};
use crate::pipeline::{self, StageEnv};
use crate::stats::RunStats;
use crate::verify;

/// Verified candidates per base candidate id.
pub type VerifiedMap = BTreeMap<usize, Vec<VerifiedCandidate>>;

struct StructuralJob {
    base: Arc<BaseCandidate>,
    gates: Vec<GateId>,
}

struct FunctionalJob<'nl> {
    structural: StructuralCandidate<'nl>,
    candidates: Vec<FunctionalCandidate>,
}

enum Job<'nl> {
    Structural(StructuralJob),
    Functional(FunctionalJob<'nl>),
}

struct Queues<'nl> {
    structural: VecDeque<StructuralJob>,
    functional: VecDeque<FunctionalJob<'nl>>,
    /// Structural jobs queued or in progress.
    structural_pending: usize,
    verified: VerifiedMap,
    stats: RunStats,
}

struct Shared<'nl> {
    queues: Mutex<Queues<'nl>>,
    wake: Condvar,
}

impl<'nl> Shared<'nl> {
    fn lock(&self) -> MutexGuard<'_, Queues<'nl>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks until a job is available or no more work can appear.
    fn next_job(&self, priority: MultithreadingPriority) -> Option<Job<'nl>> {
        let mut q = self.lock();
        loop {
            let job = match priority {
                MultithreadingPriority::TimePriority => q
                    .structural
                    .pop_front()
                    .map(Job::Structural)
                    .or_else(|| q.functional.pop_front().map(Job::Functional)),
                MultithreadingPriority::MemoryPriority => q
                    .functional
                    .pop_front()
                    .map(Job::Functional)
                    .or_else(|| q.structural.pop_front().map(Job::Structural)),
            };
            if job.is_some() {
                return job;
            }
            if q.structural_pending == 0 {
                return None;
            }
            q = self.wake.wait(q).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Releases one structural slot when dropped, also while unwinding.
struct PendingGuard<'a, 'nl> {
    shared: &'a Shared<'nl>,
}

impl Drop for PendingGuard<'_, '_> {
    fn drop(&mut self) {
        let mut q = self.shared.lock();
        q.structural_pending = q.structural_pending.saturating_sub(1);
        drop(q);
        self.shared.wake.notify_all();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

struct Worker<'a, 'nl> {
    netlist: &'nl Netlist,
    config: &'a Configuration,
    shared: &'a Shared<'nl>,
    verified: VerifiedMap,
    stats: RunStats,
}

impl<'nl> Worker<'_, 'nl> {
    fn run(mut self) {
        while let Some(job) = self.shared.next_job(self.config.multithreading_priority) {
            let (kind, outcome) = match job {
                Job::Structural(job) => (
                    "structural",
                    catch_unwind(AssertUnwindSafe(|| self.structural(job))),
                ),
                Job::Functional(job) => (
                    "functional",
                    catch_unwind(AssertUnwindSafe(|| self.functional(job))),
                ),
            };
            if let Err(payload) = outcome {
                log::error!("{} job panicked and was skipped: {}", kind, panic_message(payload.as_ref()));
            }
        }
        let mut q = self.shared.lock();
        for (base, mut vcs) in std::mem::take(&mut self.verified) {
            q.verified.entry(base).or_default().append(&mut vcs);
        }
        q.stats.merge(&self.stats);
    }

    fn structural(&mut self, job: StructuralJob) {
        let _slot = PendingGuard {
            shared: self.shared,
        };
        let mut sc = StructuralCandidate::new(
            self.netlist,
            job.base,
            job.gates,
            self.config.seed,
            self.config.budget.influence_samples,
        );
        let candidates = pipeline::generate_functional_candidates(&mut sc, self.config, &mut self.stats);
        self.stats.structural_candidates += 1;
        log::trace!(
            "structural candidate of base {} with {} gates: {} functional candidates",
            sc.base.id,
            sc.gates.len(),
            candidates.len()
        );

        if !candidates.is_empty() {
            self.shared.lock().functional.push_back(FunctionalJob {
                structural: sc,
                candidates,
            });
        }
    }

    fn functional(&mut self, job: FunctionalJob<'nl>) {
        let FunctionalJob {
            mut structural,
            candidates,
        } = job;
        let env = StageEnv {
            budget: &self.config.budget,
            registers: &self.config.known_registers,
        };
        let base = Arc::clone(&structural.base);
        for fc in &candidates {
            if let Some(vc) = verify::verify(&mut structural.context, fc, &base, &env, &mut self.stats) {
                self.verified.entry(base.id).or_default().push(vc);
            }
        }
    }
}

/// Runs the structural and functional search of every family on
/// `config.worker_count()` threads. Every base candidate gets an entry in
/// the returned map, possibly empty.
pub fn run(netlist: &Netlist, families: &[BaseFamily], config: &Configuration) -> (VerifiedMap, RunStats) {
    let start = Instant::now();
    let mut structural = VecDeque::new();
    let mut verified = VerifiedMap::new();
    for family in families {
        verified.insert(family.base.id, Vec::new());
        for gates in &family.structural {
            structural.push_back(StructuralJob {
                base: Arc::clone(&family.base),
                gates: gates.clone(),
            });
        }
    }
    let pending = structural.len();
    let shared = Shared {
        queues: Mutex::new(Queues {
            structural,
            functional: VecDeque::new(),
            structural_pending: pending,
            verified,
            stats: RunStats {
                base_candidates: families.len(),
                ..RunStats::default()
            },
        }),
        wake: Condvar::new(),
    };

    let workers = config.worker_count();
    log::info!(
        "scheduling {} structural candidates of {} base candidates on {} threads",
        pending,
        families.len(),
        workers
    );
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let worker = Worker {
                netlist,
                config,
                shared: &shared,
                verified: VerifiedMap::new(),
                stats: RunStats::default(),
            };
            scope.spawn(move || worker.run());
        }
    });

    let q = shared.queues.into_inner().unwrap_or_else(|e| e.into_inner());
    log::info!(
        "verified {} candidates in {:.3}s",
        q.stats.total_verified(),
        start.elapsed().as_secs_f64()
    );
    (q.verified, q.stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::CandidateType;
    use crate::test_utils::build_ice40_ripple_adder;
    use test_case::test_case;

    #[test_case(MultithreadingPriority::TimePriority, 1 ; "time single thread")]
    #[test_case(MultithreadingPriority::MemoryPriority, 3 ; "memory three threads")]
    fn test_adder_is_verified(priority: MultithreadingPriority, threads: usize) {
        let _ = env_logger::builder().is_test(true).try_init();
        let adder = build_ice40_ripple_adder(4);
        let family = BaseFamily {
            base: Arc::new(BaseCandidate {
                id: 7,
                gates: adder.carries.clone(),
            }),
            structural: vec![adder.gates(), adder.carries.clone()],
        };
        let config = Configuration {
            multithreading_priority: priority,
            max_thread_count: threads,
            ..Configuration::default()
        }
        .with_types(&[CandidateType::Adder]);
        let (verified, stats) = run(&adder.netlist, &[family], &config);
        assert_eq!(stats.structural_candidates, 2);
        assert_eq!(stats.base_candidates, 1);
        let found = &verified[&7];
        assert!(found
            .iter()
            .any(|vc| vc.primary_type() == CandidateType::Adder && vc.output_nets == adder.sum));
    }

    #[test]
    fn test_panicking_job_releases_its_slot() {
        let shared = Shared {
            queues: Mutex::new(Queues {
                structural: VecDeque::new(),
                functional: VecDeque::new(),
                structural_pending: 1,
                verified: VerifiedMap::new(),
                stats: RunStats::default(),
            }),
            wake: Condvar::new(),
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _slot = PendingGuard { shared: &shared };
            panic!("context construction failed");
        }));
        let payload = outcome.unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "context construction failed");
        assert_eq!(shared.lock().structural_pending, 0);
        assert!(shared.next_job(MultithreadingPriority::TimePriority).is_none());
    }

    #[test]
    fn test_empty_run_terminates() {
        let adder = build_ice40_ripple_adder(2);
        let (verified, stats) = run(&adder.netlist, &[], &Configuration::default());
        assert!(verified.is_empty());
        assert_eq!(stats.structural_candidates, 0);
    }
}
