// SPDX-License-Identifier: Apache-2.0

//! Per candidate type run statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::candidates::CandidateType;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeStats {
    pub creation_time: Duration,
    pub created: usize,
    pub probe_time: Duration,
    pub probe_rejected: usize,
    pub solver_time: Duration,
    pub solver_queries: usize,
    pub verified: usize,
}

impl TypeStats {
    fn merge(&mut self, other: &TypeStats) {
        self.creation_time += other.creation_time;
        self.created += other.created;
        self.probe_time += other.probe_time;
        self.probe_rejected += other.probe_rejected;
        self.solver_time += other.solver_time;
        self.solver_queries += other.solver_queries;
        self.verified += other.verified;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub base_candidates: usize,
    pub structural_candidates: usize,
    pub per_type: BTreeMap<CandidateType, TypeStats>,
}

impl RunStats {
    pub fn entry(&mut self, ty: CandidateType) -> &mut TypeStats {
        self.per_type.entry(ty).or_default()
    }

    pub fn merge(&mut self, other: &RunStats) {
        self.base_candidates += other.base_candidates;
        self.structural_candidates += other.structural_candidates;
        for (ty, s) in &other.per_type {
            self.entry(*ty).merge(s);
        }
    }

    pub fn total_verified(&self) -> usize {
        self.per_type.values().map(|s| s.verified).sum()
    }

    pub fn log_summary(&self) {
        log::info!(
            "{} base candidates, {} structural candidates",
            self.base_candidates,
            self.structural_candidates
        );
        for (ty, s) in &self.per_type {
            log::info!(
                "{:<24} created {:>6} in {:>8.3}s, probe rejected {:>6} in {:>8.3}s, {:>5} solver queries in {:>8.3}s, verified {}",
                ty.name(),
                s.created,
                s.creation_time.as_secs_f64(),
                s.probe_rejected,
                s.probe_time.as_secs_f64(),
                s.solver_queries,
                s.solver_time.as_secs_f64(),
                s.verified
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_counters() {
        let mut a = RunStats::default();
        a.entry(CandidateType::Adder).created = 3;
        let mut b = RunStats::default();
        b.entry(CandidateType::Adder).created = 4;
        b.entry(CandidateType::Counter).verified = 1;
        b.structural_candidates = 2;
        a.merge(&b);
        assert_eq!(a.per_type[&CandidateType::Adder].created, 7);
        assert_eq!(a.total_verified(), 1);
        assert_eq!(a.structural_candidates, 2);
    }
}
