//! The divisive clustering sequence
//!
//! Round r hands the engine every sweep not yet assigned; the engine's
//! members join the assignment for that round and their whole sweep
//! directories leave the candidate pool. The loop is guaranteed to halt:
//! each non-terminal round grows the excluded set, and a round that
//! assigns one sweep or fewer is terminal by definition.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bragg_core::Result;

use crate::engine::ClusteringEngine;
use crate::sweep::{directory_map, Sweep};

/// Members assigned by one successful round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub round: usize,
    pub member_identifiers: Vec<String>,
    pub n_clusters: usize,
}

/// What one round produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcome {
    Clustered(ClusterAssignment),
    EngineFailed { round: usize, reason: String },
}

impl RoundOutcome {
    pub fn members(&self) -> &[String] {
        match self {
            Self::Clustered(assignment) => &assignment.member_identifiers,
            Self::EngineFailed { .. } => &[],
        }
    }
}

/// Why the sequence stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No input sweeps at all; zero rounds were run
    NoSweeps,
    /// The last round assigned one sweep or fewer
    NoClustersFound,
    /// Every sweep (bar at most one) has been assigned
    FullyAssigned,
}

/// The finished sequence: every round in order plus the leftovers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceReport {
    pub identifier: String,
    pub rounds: Vec<RoundOutcome>,
    pub termination: Termination,
    pub unassigned: Vec<String>,
}

impl SequenceReport {
    /// Rounds that actually assigned members
    pub fn assignments(&self) -> impl Iterator<Item = &ClusterAssignment> {
        self.rounds.iter().filter_map(|r| match r {
            RoundOutcome::Clustered(a) => Some(a),
            RoundOutcome::EngineFailed { .. } => None,
        })
    }

    /// Every input sweep appears exactly once: in one round's members or
    /// among the unassigned leftovers.
    pub fn partition_check(&self, sweeps: &[Sweep]) -> bool {
        let mut seen = HashSet::new();
        for identifier in self
            .rounds
            .iter()
            .flat_map(|r| r.members().iter())
            .chain(self.unassigned.iter())
        {
            if !seen.insert(identifier.as_str()) {
                return false;
            }
        }
        sweeps.len() == seen.len() && sweeps.iter().all(|s| seen.contains(s.identifier.as_str()))
    }
}

/// Drives a clustering engine to a full partition of the input sweeps
pub struct ClusterSequence<E> {
    identifier: String,
    sweeps: Vec<Sweep>,
    engine: E,
    workdir: PathBuf,
}

impl<E: ClusteringEngine> ClusterSequence<E> {
    pub fn new(
        identifier: impl Into<String>,
        sweeps: Vec<Sweep>,
        engine: E,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            sweeps,
            engine,
            workdir: workdir.into(),
        }
    }

    pub fn sweeps(&self) -> &[Sweep] {
        &self.sweeps
    }

    fn round_workdir(&self, round: usize) -> PathBuf {
        self.workdir.join(format!("cluster_{round}"))
    }

    pub fn run(&self) -> Result<SequenceReport> {
        if self.sweeps.is_empty() {
            return Ok(SequenceReport {
                identifier: self.identifier.clone(),
                rounds: Vec::new(),
                termination: Termination::NoSweeps,
                unassigned: Vec::new(),
            });
        }

        let directories = directory_map(&self.sweeps);
        let mut excluded_dirs: HashSet<&Path> = HashSet::new();
        let mut assigned: HashSet<&str> = HashSet::new();
        let mut rounds = Vec::new();

        let termination = loop {
            let round = rounds.len() + 1;
            let candidates: Vec<Sweep> = self
                .sweeps
                .iter()
                .filter(|s| !excluded_dirs.contains(s.directory.as_path()))
                .cloned()
                .collect();
            info!(
                sequence = %self.identifier,
                round,
                candidates = candidates.len(),
                "starting clustering round"
            );

            let outcome = match self
                .engine
                .cluster(&candidates, &self.round_workdir(round))
            {
                Ok(clustering) => RoundOutcome::Clustered(ClusterAssignment {
                    round,
                    member_identifiers: clustering.member_identifiers,
                    n_clusters: clustering.n_clusters,
                }),
                Err(e) => {
                    warn!(sequence = %self.identifier, round, error = %e, "engine failed");
                    RoundOutcome::EngineFailed {
                        round,
                        reason: e.to_string(),
                    }
                }
            };

            // Members leave the pool one whole sweep directory at a time
            let n_members = outcome.members().len();
            for member in outcome.members() {
                if let Some(&dir) = directories.get(member.as_str()) {
                    excluded_dirs.insert(dir);
                }
            }
            for sweep in &self.sweeps {
                if excluded_dirs.contains(sweep.directory.as_path()) {
                    assigned.insert(sweep.identifier.as_str());
                }
            }
            rounds.push(outcome);

            if n_members <= 1 {
                break Termination::NoClustersFound;
            }
            if assigned.len() >= self.sweeps.len().saturating_sub(1) {
                break Termination::FullyAssigned;
            }
        };

        let unassigned: Vec<String> = {
            let in_rounds: HashSet<&str> = rounds
                .iter()
                .flat_map(|r| r.members().iter())
                .map(String::as_str)
                .collect();
            self.sweeps
                .iter()
                .filter(|s| !in_rounds.contains(s.identifier.as_str()))
                .map(|s| s.identifier.clone())
                .collect()
        };
        info!(
            sequence = %self.identifier,
            rounds = rounds.len(),
            ?termination,
            unassigned = unassigned.len(),
            "sequence finished"
        );
        Ok(SequenceReport {
            identifier: self.identifier.clone(),
            rounds,
            termination,
            unassigned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineClustering, MockClusteringEngine};
    use bragg_core::Error;

    fn sweeps(n: usize) -> Vec<Sweep> {
        (0..n)
            .map(|i| Sweep::new(format!("sweep_{i}"), format!("/data/sweep_{i}")))
            .collect()
    }

    fn clustering(members: &[&str], n_clusters: usize) -> EngineClustering {
        EngineClustering {
            member_identifiers: members.iter().map(|m| m.to_string()).collect(),
            n_clusters,
        }
    }

    #[test]
    fn zero_sweeps_terminate_without_calling_the_engine() {
        let engine = MockClusteringEngine::new();
        let sequence = ClusterSequence::new("seq", vec![], engine, "/work");
        let report = sequence.run().unwrap();
        assert_eq!(report.termination, Termination::NoSweeps);
        assert!(report.rounds.is_empty());
        assert!(report.partition_check(&[]));
    }

    #[test]
    fn one_round_assigning_everything_is_fully_assigned() {
        let input = sweeps(4);
        let mut engine = MockClusteringEngine::new();
        engine.expect_cluster().times(1).returning(|candidates, _| {
            let members: Vec<&str> = candidates.iter().map(|s| s.identifier.as_str()).collect();
            Ok(clustering(&members, 1))
        });

        let sequence = ClusterSequence::new("seq", input.clone(), engine, "/work");
        let report = sequence.run().unwrap();

        assert_eq!(report.termination, Termination::FullyAssigned);
        assert_eq!(report.rounds.len(), 1);
        assert!(report.unassigned.is_empty());
        assert!(report.partition_check(&input));
    }

    #[test]
    fn single_member_round_means_no_clusters_found() {
        let input = sweeps(3);
        let mut engine = MockClusteringEngine::new();
        engine
            .expect_cluster()
            .times(1)
            .returning(|_, _| Ok(clustering(&["sweep_0"], 1)));

        let sequence = ClusterSequence::new("seq", input.clone(), engine, "/work");
        let report = sequence.run().unwrap();

        assert_eq!(report.termination, Termination::NoClustersFound);
        assert_eq!(report.unassigned.len(), 2);
        assert!(report.partition_check(&input));
    }

    #[test]
    fn excluded_sweeps_never_reach_later_rounds() {
        let input = sweeps(5);
        let mut engine = MockClusteringEngine::new();
        let mut round = 0;
        engine.expect_cluster().returning(move |candidates, _| {
            round += 1;
            match round {
                1 => {
                    assert_eq!(candidates.len(), 5);
                    Ok(clustering(&["sweep_0", "sweep_1"], 1))
                }
                2 => {
                    let ids: Vec<&str> =
                        candidates.iter().map(|s| s.identifier.as_str()).collect();
                    assert_eq!(ids, ["sweep_2", "sweep_3", "sweep_4"]);
                    Ok(clustering(&["sweep_2", "sweep_3"], 1))
                }
                _ => panic!("sequence should have terminated"),
            }
        });

        let sequence = ClusterSequence::new("seq", input.clone(), engine, "/work");
        let report = sequence.run().unwrap();

        // Four of five assigned leaves at most one candidate
        assert_eq!(report.termination, Termination::FullyAssigned);
        assert_eq!(report.rounds.len(), 2);
        assert_eq!(report.unassigned, vec!["sweep_4".to_string()]);
        assert!(report.partition_check(&input));
    }

    #[test]
    fn engine_failure_is_a_contained_terminal_round() {
        let input = sweeps(4);
        let mut engine = MockClusteringEngine::new();
        engine
            .expect_cluster()
            .times(1)
            .returning(|_, _| Err(Error::engine("cosym crashed")));

        let sequence = ClusterSequence::new("seq", input.clone(), engine, "/work");
        let report = sequence.run().unwrap();

        assert_eq!(report.termination, Termination::NoClustersFound);
        assert!(matches!(
            report.rounds[0],
            RoundOutcome::EngineFailed { round: 1, .. }
        ));
        assert_eq!(report.unassigned.len(), 4);
        assert!(report.partition_check(&input));
    }

    #[test]
    fn sequence_halts_within_one_round_per_sweep() {
        // An adversarial engine assigning two sweeps per round still
        // terminates: excluded only grows
        let input = sweeps(10);
        let mut engine = MockClusteringEngine::new();
        engine.expect_cluster().returning(|candidates, _| {
            let members: Vec<&str> = candidates
                .iter()
                .take(2)
                .map(|s| s.identifier.as_str())
                .collect();
            Ok(clustering(&members, 1))
        });

        let sequence = ClusterSequence::new("seq", input.clone(), engine, "/work");
        let report = sequence.run().unwrap();
        assert!(report.rounds.len() <= input.len());
        assert!(report.partition_check(&input));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Deterministic engine that assigns a scripted number of
        /// candidates each round and fails on a scripted count of 0
        struct ScriptedEngine {
            per_round: Vec<usize>,
            round: std::cell::Cell<usize>,
        }

        impl ClusteringEngine for ScriptedEngine {
            fn cluster(
                &self,
                candidates: &[Sweep],
                _workdir: &std::path::Path,
            ) -> bragg_core::Result<EngineClustering> {
                let round = self.round.get();
                self.round.set(round + 1);
                let take = self.per_round.get(round).copied().unwrap_or(1);
                if take == 0 {
                    return Err(Error::engine("scripted failure"));
                }
                Ok(EngineClustering {
                    member_identifiers: candidates
                        .iter()
                        .take(take)
                        .map(|s| s.identifier.clone())
                        .collect(),
                    n_clusters: 1,
                })
            }
        }

        proptest! {
            #[test]
            fn any_engine_script_halts_and_partitions(
                n_sweeps in 0usize..12,
                per_round in proptest::collection::vec(0usize..6, 0..16),
            ) {
                let input = sweeps(n_sweeps);
                let engine = ScriptedEngine {
                    per_round,
                    round: std::cell::Cell::new(0),
                };
                let sequence = ClusterSequence::new("seq", input.clone(), engine, "/work");
                let report = sequence.run().unwrap();

                prop_assert!(report.rounds.len() <= n_sweeps.max(1));
                prop_assert!(report.partition_check(&input));
                if n_sweeps == 0 {
                    prop_assert_eq!(report.termination, Termination::NoSweeps);
                }
            }
        }
    }
}
