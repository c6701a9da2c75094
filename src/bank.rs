//! Letter-bank arithmetic.
//!
//! A [`LetterBank`] is a multiset of characters: the letters (and
//! punctuation) still available for placement. Whitespace is never part
//! of a bank. Banks are compared and displayed in code-point order, so
//! every operation here is deterministic.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Multiset of characters with O(log alphabet) per-character access.
///
/// The spelling of a sentence never depends on iteration order, but
/// selection sampling and test assertions do, which is why this is a
/// `BTreeMap` rather than a hash map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LetterBank {
    counts: BTreeMap<char, u32>,
    total: u32,
}

impl LetterBank {
    /// Builds a bank by counting every non-whitespace character of `s`.
    /// Case-sensitive; punctuation counts verbatim.
    pub fn from_str(s: &str) -> Self {
        let mut bank = LetterBank::default();
        for ch in s.chars().filter(|c| !c.is_whitespace()) {
            *bank.counts.entry(ch).or_insert(0) += 1;
            bank.total += 1;
        }
        bank
    }

    /// Number of copies of `ch` still available.
    pub fn count(&self, ch: char) -> u32 {
        self.counts.get(&ch).copied().unwrap_or(0)
    }

    /// Total number of characters in the bank.
    pub fn size(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// True iff every character count of `word` is covered by this bank.
    pub fn contains(&self, word: &str) -> bool {
        self.contains_bank(&LetterBank::from_str(word))
    }

    /// Multiset inclusion against a precomputed signature. This is the
    /// hot path of `Vocabulary::playable`.
    pub fn contains_bank(&self, other: &LetterBank) -> bool {
        if other.total > self.total {
            return false;
        }
        other.counts.iter().all(|(&ch, &n)| self.count(ch) >= n)
    }

    /// Removes the characters of `word`, or `None` if they are not all
    /// present.
    pub fn checked_subtract(&self, word: &str) -> Option<LetterBank> {
        self.checked_subtract_bank(&LetterBank::from_str(word))
    }

    pub fn checked_subtract_bank(&self, other: &LetterBank) -> Option<LetterBank> {
        if !self.contains_bank(other) {
            return None;
        }
        let mut counts = self.counts.clone();
        for (&ch, &n) in &other.counts {
            match counts.get_mut(&ch) {
                Some(c) if *c > n => *c -= n,
                Some(_) => {
                    counts.remove(&ch);
                }
                None => unreachable!("containment checked above"),
            }
        }
        Some(LetterBank {
            counts,
            total: self.total - other.total,
        })
    }

    /// Like [`checked_subtract`], but treats a missing character as the
    /// invariant violation it is. Callers must have established
    /// containment first.
    ///
    /// [`checked_subtract`]: LetterBank::checked_subtract
    pub fn subtract(&self, word: &str) -> Result<LetterBank> {
        self.checked_subtract(word).ok_or_else(|| {
            Error::Invariant(format!("subtracting {word:?} from a bank lacking its letters"))
        })
    }

    /// Inverse of [`subtract`](LetterBank::subtract); used by the store
    /// audit and property tests.
    pub fn add(&self, word: &str) -> LetterBank {
        let mut counts = self.counts.clone();
        let mut total = self.total;
        for ch in word.chars().filter(|c| !c.is_whitespace()) {
            *counts.entry(ch).or_insert(0) += 1;
            total += 1;
        }
        LetterBank { counts, total }
    }

    /// The bank with punctuation zeroed: only alphabetic characters and
    /// apostrophes (which live inside words) remain. The validator's
    /// vowel floor works on this residue.
    pub fn letters_only(&self) -> LetterBank {
        let mut bank = LetterBank::default();
        for (&ch, &n) in &self.counts {
            if ch.is_alphabetic() || ch == '\'' {
                bank.counts.insert(ch, n);
                bank.total += n;
            }
        }
        bank
    }

    /// True iff the bank holds at least one vowel (y included, either
    /// case).
    pub fn has_vowel(&self) -> bool {
        "aeiouyAEIOUY".chars().any(|v| self.count(v) > 0)
    }

    /// Distinct characters present, in code-point order.
    pub fn distinct(&self) -> impl Iterator<Item = char> + '_ {
        self.counts.keys().copied()
    }
}

impl fmt::Display for LetterBank {
    /// Every character repeated to its count, code-point order:
    /// `{a:2, b:1}` displays as `"aab"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (&ch, &n) in &self.counts {
            for _ in 0..n {
                write!(f, "{ch}")?;
            }
        }
        Ok(())
    }
}
