//! The search loop: selection, expansion (roll-out), and backprop.
//!
//! One iteration samples an open frontier node (softmax over stored
//! mean scores), takes a deep uniform random walk gated by soft
//! validation, then scores and writes back every node on the rolled-out
//! path in a single transaction. Roll-outs are uniform rather than
//! oracle-greedy on purpose: the oracle is noisy and expensive, so it
//! is consulted once per node at backprop time, never during expansion.
//!
//! The admin operations the CLI exposes (`candidates`, `check`,
//! `prune`) live at the bottom; they share the same primitives but
//! never touch the PRNG.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::fragment::{parent_of, prefixes, tokenize, Fragment};
use crate::oracle::Oracle;
use crate::puzzle::Puzzle;
use crate::store::{NodeRecord, NodeStatus, SearchTree};
use crate::validator::{Outcome, Validator};

/// Stand-in mean for nodes that have never been rolled out, once any
/// scored node exists. Optimistically bad: unexplored frontiers keep a
/// real (if small) chance against well-scored ones.
pub const EXPLORATION_SCORE: f64 = -40.0;

/// Consecutive oracle failures tolerated before the process gives up.
const MAX_ORACLE_FAILURES: u32 = 3;

#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// PRNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Sharpness of selection: weights are `softmax(temperature * mean)`.
    pub temperature: f64,
    pub max_iterations: Option<u64>,
    pub max_time: Option<Duration>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            seed: None,
            temperature: 0.1,
            max_iterations: None,
            max_time: None,
        }
    }
}

/// Why `solve` returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// A hard-validated sentence was found and recorded.
    Solved(String),
    /// No open node has an unexplored child left.
    Exhausted,
    /// An iteration or time budget ran out, or cancellation was
    /// requested.
    Stopped,
}

enum TerminalKind {
    /// The bank is spent; hard validation decides.
    EmptyBank,
    /// Letters remain but nothing is playable.
    DeadEnd,
    /// The last placed token failed soft validation.
    SoftInvalid,
}

pub struct Solver {
    puzzle: Puzzle,
    tree: SearchTree,
    oracle: Box<dyn Oracle>,
    rng: StdRng,
    config: SolverConfig,
    cancel: Arc<AtomicBool>,
}

impl Solver {
    pub fn new(
        puzzle: Puzzle,
        tree: SearchTree,
        oracle: Box<dyn Oracle>,
        config: SolverConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Solver {
            puzzle,
            tree,
            oracle,
            rng,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between iterations; set it from anywhere to stop
    /// the loop cooperatively.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    /// Runs iterations from the puzzle root until a solution is
    /// recorded, the frontier is exhausted, or a budget runs out.
    pub fn solve(&mut self) -> Result<SolveOutcome> {
        let root = self.puzzle.root.clone();
        self.solve_from(&root)
    }

    /// Like [`solve`](Solver::solve) but explores only `root` and its
    /// descendants.
    pub fn solve_from(&mut self, root: &str) -> Result<SolveOutcome> {
        self.bootstrap(root)?;

        let started = Instant::now();
        let mut iterations = 0u64;
        let mut oracle_failures = 0u32;

        loop {
            if let Some(max) = self.config.max_iterations {
                if iterations >= max {
                    info!(
                        "performed {max} iterations ({:.1}/s), stopping",
                        max as f64 / started.elapsed().as_secs_f64().max(1e-9)
                    );
                    return Ok(SolveOutcome::Stopped);
                }
            }
            if let Some(max) = self.config.max_time {
                if started.elapsed() > max {
                    info!("timeout after {}s, stopping", max.as_secs());
                    return Ok(SolveOutcome::Stopped);
                }
            }
            if self.cancel.load(Ordering::Relaxed) {
                info!("cancelled, stopping");
                return Ok(SolveOutcome::Stopped);
            }

            let selected = match self.select(root)? {
                Some(sentence) => sentence,
                None => {
                    info!("no expandable open nodes under {root:?}, search exhausted");
                    return Ok(SolveOutcome::Exhausted);
                }
            };
            trace!("selected {selected:?}");

            let (terminal, kind) = self.rollout(&selected);
            match self.assess(&terminal, &kind) {
                Ok(records) => {
                    oracle_failures = 0;
                    let winner = records
                        .iter()
                        .find(|r| r.score == Some(f64::INFINITY))
                        .map(|r| r.sentence.clone());
                    self.tree.put_all(&records)?;
                    for record in &records {
                        debug!(
                            "recorded ({:.2}, {}): {}",
                            record.score.unwrap_or(f64::NAN),
                            record.status.code(),
                            record.sentence
                        );
                    }
                    if let Some(sentence) = winner {
                        info!("WINNER: {sentence}");
                        return Ok(SolveOutcome::Solved(sentence));
                    }
                }
                Err(Error::Oracle(e)) => {
                    oracle_failures += 1;
                    warn!("oracle failed ({oracle_failures}/{MAX_ORACLE_FAILURES}): {e}");
                    if oracle_failures >= MAX_ORACLE_FAILURES {
                        return Err(Error::Oracle(e));
                    }
                }
                Err(e) => return Err(e),
            }
            iterations += 1;
        }
    }

    /// First-run setup: make sure the root exists so selection has a
    /// frontier to start from.
    fn bootstrap(&mut self, root: &str) -> Result<()> {
        if self.tree.get(root)?.is_none() {
            self.tree
                .put(&NodeRecord::open(root, &parent_of(root)))?;
            debug!("bootstrapped root {root:?}");
        }
        Ok(())
    }

    /// Samples an open node with at least one potential unexplored
    /// child, weighting by `softmax(temperature * mean)`. Falls back to
    /// uniform sampling while no node has a mean yet.
    fn select(&mut self, root: &str) -> Result<Option<String>> {
        let mut pool: Vec<NodeRecord> = self
            .tree
            .open_nodes()?
            .into_iter()
            .filter(|node| under_root(&node.sentence, root))
            .collect();
        let child_counts = self.tree.child_counts()?;

        while !pool.is_empty() {
            let weights = selection_weights(
                &pool.iter().map(|n| n.mean_descendant).collect::<Vec<_>>(),
                self.config.temperature,
            );
            let idx = match WeightedIndex::new(&weights) {
                Ok(dist) => dist.sample(&mut self.rng),
                Err(_) => self.rng.gen_range(0..pool.len()),
            };
            let node = pool.swap_remove(idx);

            let fragment = Fragment::new(&node.sentence);
            let bank = match self.puzzle.remaining(&fragment) {
                Some(bank) => bank,
                None => {
                    warn!("stored node exceeds the bank, skipping: {}", node.sentence);
                    continue;
                }
            };
            let children = child_counts.get(&node.sentence).copied().unwrap_or(0);
            if self.puzzle.vocabulary.playable_count(&bank) > children as usize {
                return Ok(Some(node.sentence));
            }
        }
        Ok(None)
    }

    /// Uniform random descent from `start` until the bank empties, the
    /// vocabulary runs dry, or soft validation rejects a placement.
    fn rollout(&mut self, start: &str) -> (Fragment, TerminalKind) {
        let mut fragment = Fragment::new(start);
        loop {
            let bank = match self.puzzle.remaining(&fragment) {
                Some(bank) => bank,
                None => return (fragment, TerminalKind::SoftInvalid),
            };
            if bank.is_empty() {
                return (fragment, TerminalKind::EmptyBank);
            }
            let playable: Vec<&str> = self.puzzle.vocabulary.playable(&bank).collect();
            if playable.is_empty() {
                return (fragment, TerminalKind::DeadEnd);
            }
            let token = playable[self.rng.gen_range(0..playable.len())];
            let next = Fragment::new(&fragment.extended(token));
            let verdict = Validator::new(&self.puzzle).soft(&next);
            if !verdict.is_valid() {
                trace!("soft-invalid ({}): {}", verdict.reason, next.sentence);
                return (next, TerminalKind::SoftInvalid);
            }
            fragment = next;
        }
    }

    /// Scores the rolled-out path and builds the records to write:
    /// oracle scores for new nodes, cumulative sums along the path, a
    /// visit each, and the terminal's normalised cumulative folded into
    /// every ancestor's running mean.
    fn assess(&mut self, terminal: &Fragment, kind: &TerminalKind) -> Result<Vec<NodeRecord>> {
        let win = matches!(*kind, TerminalKind::EmptyBank)
            && Validator::new(&self.puzzle).hard(terminal).outcome == Outcome::Terminal;

        let chain = prefixes(&terminal.sentence);
        let include_empty_root = self.puzzle.root.is_empty();
        if chain.is_empty() && !include_empty_root {
            return Ok(Vec::new());
        }

        // first pass: resolve each node's score and cumulative sum
        let mut existing = Vec::with_capacity(chain.len());
        let mut scores = Vec::with_capacity(chain.len());
        let mut cumulative = Vec::with_capacity(chain.len());
        let mut running = 0.0f64;
        for (idx, sentence) in chain.iter().enumerate() {
            let stored = self.tree.get(sentence)?;
            let is_terminal = idx == chain.len() - 1;
            let score = if is_terminal && win {
                f64::INFINITY
            } else if is_terminal {
                f64::NEG_INFINITY
            } else {
                match stored.as_ref().and_then(|r| r.score) {
                    Some(score) if score.is_finite() => score,
                    _ => self.oracle.score(sentence)?,
                }
            };
            running += score;
            existing.push(stored);
            scores.push(score);
            cumulative.push(running);
        }

        // the value folded into means: the deepest finite cumulative,
        // normalised per token so constant oracles yield constant means
        let value = chain
            .iter()
            .zip(&cumulative)
            .rev()
            .find(|(_, cum)| cum.is_finite())
            .map(|(sentence, cum)| cum / tokenize(sentence).len() as f64);

        // second pass: assemble the records
        let mut records = Vec::with_capacity(chain.len() + 1);
        if include_empty_root {
            let record = self
                .tree
                .get("")?
                .unwrap_or_else(|| NodeRecord::open("", ""));
            let status = record.status;
            records.push(fold_visit(record, Some(0.0), Some(0.0), value, status));
        }
        for (idx, sentence) in chain.iter().enumerate() {
            let is_terminal = idx == chain.len() - 1;
            let record = existing[idx]
                .clone()
                .unwrap_or_else(|| NodeRecord::open(sentence, &parent_of(sentence)));
            let status = if is_terminal {
                if win {
                    NodeStatus::Open
                } else {
                    NodeStatus::Invalid
                }
            } else {
                // a manual exclusion on an ancestor survives the visit
                record.status
            };
            let folded = if is_terminal && !win {
                // invalid terminals are pinned, not averaged
                let mut r = fold_visit(record, Some(scores[idx]), Some(cumulative[idx]), None, status);
                r.mean_descendant = Some(f64::NEG_INFINITY);
                r
            } else {
                fold_visit(record, Some(scores[idx]), Some(cumulative[idx]), value, status)
            };
            records.push(folded);
        }
        Ok(records)
    }
}

/// One visit's worth of bookkeeping on a record.
fn fold_visit(
    mut record: NodeRecord,
    score: Option<f64>,
    cumulative: Option<f64>,
    value: Option<f64>,
    status: NodeStatus,
) -> NodeRecord {
    record.score = score;
    record.cumulative = cumulative;
    record.visits += 1;
    record.status = status;
    if let Some(v) = value {
        record.mean_descendant = Some(match record.mean_descendant {
            Some(mean) if mean.is_finite() => mean + (v - mean) / record.visits as f64,
            _ => v,
        });
    }
    record
}

/// Softmax of `temperature * mean` with the usual max-subtraction for
/// stability. Unexplored nodes stand in at [`EXPLORATION_SCORE`]; if
/// nothing has a mean yet, the weights are uniform.
fn selection_weights(means: &[Option<f64>], temperature: f64) -> Vec<f64> {
    if !means.iter().any(|m| m.map_or(false, f64::is_finite)) {
        return vec![1.0; means.len()];
    }
    let scaled: Vec<f64> = means
        .iter()
        .map(|m| {
            let mean = match m {
                Some(mean) if mean.is_finite() => *mean,
                _ => EXPLORATION_SCORE,
            };
            temperature * mean
        })
        .collect();
    let max = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    scaled.iter().map(|s| (s - max).exp()).collect()
}

/// True iff `sentence` is `root` or one of its descendants.
fn under_root(sentence: &str, root: &str) -> bool {
    root.is_empty() || sentence == root || sentence.starts_with(&format!("{root} "))
}

// ─── Query / admin operations (C7) ───────────────────────────────────────────

/// What `candidates <prefix>` prints: stored statistics for the node,
/// child demographics (with a synthetic `U` bucket for playable but
/// unexplored tokens), and the best children and descendants.
#[derive(Debug)]
pub struct CandidatesReport {
    pub node: Option<NodeRecord>,
    pub demographics: BTreeMap<String, u64>,
    pub top_children: Vec<NodeRecord>,
    pub top_descendants: Vec<NodeRecord>,
}

pub fn candidates_report(
    puzzle: &Puzzle,
    tree: &SearchTree,
    prefix: &str,
    limit: usize,
) -> Result<CandidatesReport> {
    let fragment = Fragment::new(prefix);
    let sentence = fragment.sentence.clone();

    let mut demographics: BTreeMap<String, u64> = tree
        .children_demographics(&sentence)?
        .into_iter()
        .map(|(status, count)| (status.to_string(), count))
        .collect();
    let stored: u64 = demographics.values().sum();
    if let Some(bank) = puzzle.remaining(&fragment) {
        let playable = puzzle.vocabulary.playable_count(&bank) as u64;
        demographics.insert("U".to_string(), playable.saturating_sub(stored));
    }

    Ok(CandidatesReport {
        node: tree.get(&sentence)?,
        demographics,
        top_children: tree.top_children(&sentence, limit)?,
        top_descendants: tree.top_descendants(&sentence, limit)?,
    })
}

/// One row of `check` output.
#[derive(Debug)]
pub struct CheckRow {
    pub sentence: String,
    pub flags: [bool; 4],
    pub score: f64,
    pub status: i64,
}

/// Validates and scores each prefix of `sentence` (or only the whole
/// sentence as a completion candidate). Works against the puzzle alone;
/// the store is not consulted.
pub fn check_sentence(
    puzzle: &Puzzle,
    oracle: &dyn Oracle,
    sentence: &str,
    candidate_only: bool,
) -> Result<Vec<CheckRow>> {
    let validator = Validator::new(puzzle);
    let targets = if candidate_only {
        vec![Fragment::new(sentence).sentence]
    } else {
        prefixes(sentence)
    };

    let mut rows = Vec::with_capacity(targets.len());
    for target in targets {
        let fragment = Fragment::new(&target);
        let verdict = if candidate_only {
            validator.hard(&fragment)
        } else {
            validator.classify(&fragment)
        };
        let score = if verdict.is_valid() {
            oracle.score(&fragment.sentence)?
        } else {
            f64::NEG_INFINITY
        };
        rows.push(CheckRow {
            sentence: fragment.sentence,
            flags: verdict.flags,
            score,
            status: verdict.status_code(),
        });
    }
    Ok(rows)
}

/// Excludes every stored open sentence containing `word`: each is
/// truncated at the word's first occurrence, that prefix is marked
/// status 7, and its descendants are deleted.
pub fn prune_word(tree: &mut SearchTree, word: &str) -> Result<(i64, i64)> {
    let mut total_modified = 0i64;
    let mut total_deleted = 0i64;
    loop {
        let target = tree
            .containing_word(word)?
            .into_iter()
            .find(|r| r.status == NodeStatus::Open);
        let row = match target {
            Some(row) => row,
            None => return Ok((total_modified, total_deleted)),
        };
        let words = tokenize(&row.sentence);
        let cut = words.iter().position(|w| w == word).ok_or_else(|| {
            Error::Invariant(format!("{:?} matched {word:?} without the token", row.sentence))
        })?;
        let truncated = words[..=cut].join(" ");
        let (modified, deleted) = tree.trim(&truncated, Some(NodeStatus::Excluded))?;
        total_modified += modified.max(0);
        total_deleted += deleted.max(0);
    }
}
