//! Sentence tokenization and canonical form.
//!
//! A sentence is an ordered sequence of tokens: dictionary words (which
//! may contain ASCII apostrophes) and single punctuation characters.
//! The canonical string form — tokens joined by single spaces — is the
//! primary key of the search tree, so everything that touches the store
//! goes through [`Fragment`] first.

use crate::bank::LetterBank;

/// A (possibly partial) sentence together with its letter multiset.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Canonical string form: `tokens.join(" ")`.
    pub sentence: String,
    /// The tokens, in order.
    pub words: Vec<String>,
    /// Multiset of every non-space character in the sentence.
    pub letters: LetterBank,
}

impl Fragment {
    pub fn new(candidate: &str) -> Self {
        let words = tokenize(candidate);
        let sentence = words.join(" ");
        let letters = LetterBank::from_str(&sentence);
        Fragment {
            sentence,
            words,
            letters,
        }
    }

    /// The canonical form of this sentence with one more token placed.
    pub fn extended(&self, token: &str) -> String {
        if self.sentence.is_empty() {
            token.to_string()
        } else {
            format!("{} {}", self.sentence, token)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Splits a candidate string into tokens. Letters and apostrophes
/// accumulate into the current word, whitespace separates words, and any
/// other character is a token by itself.
pub fn tokenize(candidate: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    for ch in candidate.chars() {
        if ch.is_alphabetic() || ch == '\'' {
            current.push(ch);
        } else if ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            words.push(ch.to_string());
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// The canonical sentence obtained by dropping the last token. The empty
/// sentence is its own parent.
pub fn parent_of(sentence: &str) -> String {
    match sentence.rfind(' ') {
        Some(idx) => sentence[..idx].to_string(),
        None => String::new(),
    }
}

/// Every non-empty token-prefix of `sentence` in root-to-leaf order,
/// ending with the sentence itself.
pub fn prefixes(sentence: &str) -> Vec<String> {
    let words = tokenize(sentence);
    let mut out = Vec::with_capacity(words.len());
    let mut acc = String::new();
    for w in &words {
        if !acc.is_empty() {
            acc.push(' ');
        }
        acc.push_str(w);
        out.push(acc.clone());
    }
    out
}
