//! Persistent guided tree search for anacryptogram puzzles.
//!
//! A sentence is searched for whose character multiset equals a given
//! letter bank, by Monte-Carlo-style exploration of a tree of partial
//! sentences: selection over stored statistics, uniform random
//! roll-outs gated by soft validation, and oracle-scored backprop into
//! a SQLite-backed tree that survives between runs.

pub mod bank;
pub mod error;
pub mod fragment;
pub mod oracle;
pub mod puzzle;
pub mod solver;
pub mod store;
pub mod validator;
pub mod vocab;

pub use bank::LetterBank;
pub use error::{Error, Result};
pub use fragment::Fragment;
pub use oracle::{ConstantOracle, FrequencyOracle, Oracle, WordLengthOracle};
pub use puzzle::{Constraints, Puzzle};
pub use solver::{
    candidates_report, check_sentence, prune_word, CandidatesReport, CheckRow, SolveOutcome,
    Solver, SolverConfig,
};
pub use store::{NodeRecord, NodeStatus, SearchTree};
pub use validator::{Outcome, Validator, Verdict};
pub use vocab::Vocabulary;
