//! The fixed vocabulary and its playability index.
//!
//! Loaded once at startup and immutable afterwards. Every token carries a
//! precomputed character signature; a per-character bucket index lets
//! `playable` rule out most of the vocabulary for a depleted bank without
//! touching each token's counts.

use std::fs;
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::bank::LetterBank;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Token {
    text: String,
    signature: LetterBank,
}

/// An immutable set of playable tokens.
///
/// Iteration order is load order after deduplication, so `playable` is
/// deterministic for identical inputs — the solver's reproducibility
/// guarantee leans on this.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<Token>,
    /// For each character, the indices of tokens that need at least one
    /// copy of it.
    buckets: FxHashMap<char, Vec<usize>>,
    present: FxHashSet<String>,
    /// False once any alphabetic token without a vowel is inserted; the
    /// validator's vowel floor is only sound while this holds.
    requires_vowels: bool,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary {
            tokens: Vec::new(),
            buckets: FxHashMap::default(),
            present: FxHashSet::default(),
            requires_vowels: true,
        }
    }
}

impl Vocabulary {
    /// Builds a vocabulary from tokens in order, dropping empty strings
    /// and duplicates.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Vocabulary::default();
        for word in words {
            vocab.insert(word.as_ref());
        }
        vocab
    }

    /// Reads a newline-separated word list. Blank lines and `#` comments
    /// are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read vocabulary {}: {e}", path.display()))
        })?;
        let vocab = Self::from_words(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        );
        if vocab.is_empty() {
            return Err(Error::Config(format!(
                "vocabulary {} contains no words",
                path.display()
            )));
        }
        Ok(vocab)
    }

    /// Appends a token unless it is empty or already present.
    pub fn insert(&mut self, word: &str) {
        if word.is_empty() || self.present.contains(word) {
            return;
        }
        let idx = self.tokens.len();
        let signature = LetterBank::from_str(word);
        for ch in signature.distinct() {
            self.buckets.entry(ch).or_default().push(idx);
        }
        if word.chars().any(char::is_alphabetic) && !signature.has_vowel() {
            self.requires_vowels = false;
        }
        self.present.insert(word.to_string());
        self.tokens.push(Token {
            text: word.to_string(),
            signature,
        });
    }

    /// True while every alphabetic token contains a vowel, which makes
    /// an all-consonant remainder provably unfinishable.
    pub fn requires_vowels(&self) -> bool {
        self.requires_vowels
    }

    /// Drops every token in `banned`, preserving the order of the rest.
    /// Used by puzzle profiles to remove forbidden words.
    pub fn without(&self, banned: &[&str]) -> Vocabulary {
        let banned: FxHashSet<&str> = banned.iter().copied().collect();
        Self::from_words(
            self.tokens
                .iter()
                .map(|t| t.text.as_str())
                .filter(|t| !banned.contains(t)),
        )
    }

    pub fn contains(&self, token: &str) -> bool {
        self.present.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// All tokens in deterministic order.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.text.as_str())
    }

    /// Lazily yields every token whose multiset fits inside `bank`, in
    /// vocabulary order.
    ///
    /// Tokens requiring a character the bank has run out of are excluded
    /// up front via the bucket index; survivors are confirmed count by
    /// count against their signature.
    pub fn playable<'a>(&'a self, bank: &'a LetterBank) -> impl Iterator<Item = &'a str> + 'a {
        let mut excluded = vec![false; self.tokens.len()];
        for (&ch, bucket) in &self.buckets {
            if bank.count(ch) == 0 {
                for &idx in bucket {
                    excluded[idx] = true;
                }
            }
        }
        self.tokens
            .iter()
            .enumerate()
            .filter(move |(idx, token)| !excluded[*idx] && bank.contains_bank(&token.signature))
            .map(|(_, token)| token.text.as_str())
    }

    /// Number of tokens playable from `bank`. The solver compares this
    /// against a node's stored child count to find unexplored frontiers.
    pub fn playable_count(&self, bank: &LetterBank) -> usize {
        self.playable(bank).count()
    }

    pub fn has_playable(&self, bank: &LetterBank) -> bool {
        self.playable(bank).next().is_some()
    }
}
