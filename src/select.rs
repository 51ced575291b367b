//! Greedy forward feature selection.
//!
//! Starting from the most important feature, each round tries every
//! remaining candidate appended to the current set, scores all trials
//! against the same snapshot, and keeps the best one. Trials of one round
//! are scored in parallel; the winner is picked afterwards by a sequential
//! scan in pool order, so ties go to the earlier candidate.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{FitError, SelectError};

/// Features ordered by importance, most important first.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRanking {
    entries: Vec<(String, f64)>,
}

impl FeatureRanking {
    /// Sorts `names` by `importances` descending and keeps the top `top_n`.
    /// The sort is stable: equal importances keep column order.
    pub fn from_importances(names: &[String], importances: &[f64], top_n: usize) -> Self {
        let mut entries: Vec<(String, f64)> = names.iter().cloned().zip(importances.iter().copied()).collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries.truncate(top_n);
        FeatureRanking { entries }
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    /// Candidate pool in ranking order.
    pub fn pool(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Scores a feature set, higher is better.
pub trait CandidateScorer: Sync {
    fn score(&self, features: &[String]) -> Result<f64, FitError>;
}

impl<F> CandidateScorer for F
where
    F: Fn(&[String]) -> Result<f64, FitError> + Sync,
{
    fn score(&self, features: &[String]) -> Result<f64, FitError> {
        self(features)
    }
}

/// How the search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The target feature count was reached.
    Complete,
    /// Every pool feature was chosen before reaching the target.
    PoolExhausted,
    /// No candidate of this round scored above zero; the search stopped early.
    Stalled { round: usize },
}

/// One search round: every trial's score, in pool order, and the winner.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    pub round: usize,
    pub candidates: Vec<(String, f64)>,
    pub winner: Option<String>,
    pub best_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub chosen: Vec<String>,
    pub outcome: SelectionOutcome,
    pub rounds: Vec<RoundRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedySelector {
    /// Number of features the search tries to end up with.
    pub target: usize,
}

impl GreedySelector {
    pub fn new(target: usize) -> Self {
        GreedySelector { target }
    }

    /// Runs the search over `pool` (ranking order).
    ///
    /// # Returns
    /// The chosen features in the order they were accepted, the terminal
    /// outcome and a record of every round. A scorer error aborts the search.
    pub fn run(&self, pool: &[String], scorer: &dyn CandidateScorer) -> Result<Selection, SelectError> {
        let first = pool.first().ok_or(SelectError::EmptyPool)?;
        let mut chosen = vec![first.clone()];
        let mut rounds = Vec::new();

        let outcome = loop {
            if chosen.len() >= self.target {
                break SelectionOutcome::Complete;
            }
            let candidates: Vec<&String> = pool.iter().filter(|f| !chosen.contains(*f)).collect();
            if candidates.is_empty() {
                break SelectionOutcome::PoolExhausted;
            }
            let round = rounds.len() + 1;
            debug!("[SELECT] Round {}: current set {:?}, {} candidate(s)", round, chosen, candidates.len());

            let scores = candidates
                .par_iter()
                .map(|&candidate| {
                    let mut trial = chosen.clone();
                    trial.push(candidate.clone());
                    scorer
                        .score(&trial)
                        .map_err(|source| SelectError::Scoring { features: trial, source })
                })
                .collect::<Result<Vec<f64>, _>>()?;

            let mut best_score = 0.0;
            let mut winner: Option<&String> = None;
            for (&candidate, &score) in candidates.iter().zip(&scores) {
                if score > best_score {
                    best_score = score;
                    winner = Some(candidate);
                }
            }

            rounds.push(RoundRecord {
                round,
                candidates: candidates.iter().map(|c| (*c).clone()).zip(scores).collect(),
                winner: winner.cloned(),
                best_score,
            });

            match winner {
                Some(feature) => {
                    info!("[SELECT] Round {}: added '{}' (score {:.4})", round, feature, best_score);
                    chosen.push(feature.clone());
                }
                None => {
                    warn!("[SELECT] Round {}: no candidate scored above 0, stopping early", round);
                    break SelectionOutcome::Stalled { round };
                }
            }
        };

        info!("[SELECT] Final feature set ({:?}): {:?}", outcome, chosen);
        Ok(Selection { chosen, outcome, rounds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Score = sum of per-feature weights.
    fn additive(weights: &'static [(&'static str, f64)]) -> impl Fn(&[String]) -> Result<f64, FitError> + Sync {
        move |features: &[String]| -> Result<f64, FitError> {
            Ok(features
                .iter()
                .map(|f| weights.iter().find(|(n, _)| *n == f.as_str()).map_or(0.0, |(_, w)| *w))
                .sum())
        }
    }

    #[test]
    fn test_ranking_is_stable() {
        let ranking = FeatureRanking::from_importances(&names(&["a", "b", "c", "d"]), &[0.1, 0.4, 0.4, 0.1], 3);
        assert_eq!(ranking.pool(), names(&["b", "c", "a"]));
    }

    #[test]
    fn test_chosen_set_grows_by_one_per_round() {
        let scorer = additive(&[("a", 1.0), ("b", 0.5), ("c", 2.0), ("d", 0.1)]);
        let selection = GreedySelector::new(3).run(&names(&["a", "b", "c", "d"]), &scorer).unwrap();
        assert_eq!(selection.chosen, names(&["a", "c", "b"]));
        assert_eq!(selection.outcome, SelectionOutcome::Complete);
        assert_eq!(selection.rounds.len(), 2);
        for (i, round) in selection.rounds.iter().enumerate() {
            assert_eq!(round.round, i + 1);
            assert_eq!(round.candidates.len(), 3 - i);
        }
    }

    #[test]
    fn test_tie_goes_to_earlier_candidate() {
        let scorer = |features: &[String]| -> Result<f64, FitError> { Ok(features.len() as f64) };
        let selection = GreedySelector::new(2).run(&names(&["a", "b", "c"]), &scorer).unwrap();
        assert_eq!(selection.chosen, names(&["a", "b"]));
    }

    #[test]
    fn test_stall_is_reported() {
        let scorer = |_: &[String]| -> Result<f64, FitError> { Ok(0.0) };
        let selection = GreedySelector::new(3).run(&names(&["a", "b", "c"]), &scorer).unwrap();
        assert_eq!(selection.outcome, SelectionOutcome::Stalled { round: 1 });
        assert_eq!(selection.chosen, names(&["a"]));
        assert_eq!(selection.rounds[0].winner, None);
    }

    #[test]
    fn test_pool_exhausted() {
        let scorer = |features: &[String]| -> Result<f64, FitError> { Ok(features.len() as f64) };
        let selection = GreedySelector::new(10).run(&names(&["a", "b"]), &scorer).unwrap();
        assert_eq!(selection.outcome, SelectionOutcome::PoolExhausted);
        assert_eq!(selection.chosen.len(), 2);
    }

    #[test]
    fn test_scorer_error_aborts() {
        let scorer = |features: &[String]| -> Result<f64, FitError> {
            if features.len() > 1 {
                Err(FitError::EmptyTrainingSet)
            } else {
                Ok(1.0)
            }
        };
        let err = GreedySelector::new(2).run(&names(&["a", "b"]), &scorer).unwrap_err();
        assert!(matches!(err, SelectError::Scoring { ref features, .. } if features.len() == 2));
        assert!(matches!(GreedySelector::new(2).run(&[], &scorer), Err(SelectError::EmptyPool)));
    }
}
