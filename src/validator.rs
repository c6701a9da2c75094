//! Soft and hard validation of candidate sentences.
//!
//! Soft validation gates every roll-out step: it rejects only prefixes
//! that no extension could turn into a solution, so it never produces a
//! false negative but will happily pass doomed candidates it cannot see
//! far enough ahead to condemn. Hard validation runs on empty-bank
//! terminals only and checks the full puzzle predicate.

use crate::bank::LetterBank;
use crate::fragment::Fragment;
use crate::puzzle::Puzzle;

/// How a sentence stands with respect to the puzzle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Valid so far; more tokens may be placed.
    Open,
    /// A winning candidate: the bank is empty and every predicate holds.
    Terminal,
    /// No extension of this sentence can win.
    Invalid,
}

/// Validation result plus the per-constraint-group flags the `check`
/// command reports: letters, words, anchors, feasibility.
#[derive(Debug, Clone, Copy)]
pub struct Verdict {
    pub outcome: Outcome,
    pub reason: &'static str,
    pub flags: [bool; 4],
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.outcome != Outcome::Invalid
    }

    /// The node status this verdict maps to: 0 open, 1 invalid.
    pub fn status_code(&self) -> i64 {
        match self.outcome {
            Outcome::Invalid => 1,
            _ => 0,
        }
    }
}

pub struct Validator<'a> {
    puzzle: &'a Puzzle,
}

impl<'a> Validator<'a> {
    pub fn new(puzzle: &'a Puzzle) -> Self {
        Validator { puzzle }
    }

    /// Soft validation, then hard validation when the bank is spent.
    pub fn classify(&self, fragment: &Fragment) -> Verdict {
        let soft = self.soft(fragment);
        if !soft.is_valid() {
            return soft;
        }
        match self.puzzle.remaining(fragment) {
            Some(rest) if rest.is_empty() => self.hard(fragment),
            _ => soft,
        }
    }

    /// The cheap one-step-lookahead check applied during roll-outs.
    pub fn soft(&self, fragment: &Fragment) -> Verdict {
        let mut flags = [true; 4];
        let mut reason = "";

        let remaining = self.puzzle.remaining(fragment);
        if remaining.is_none() {
            flags[0] = false;
            reason = "letters not in bank";
        }

        if !self.words_in_vocabulary(fragment) {
            flags[1] = false;
            if reason.is_empty() {
                reason = "word not in vocabulary";
            }
        }

        if let Some(why) = self.anchor_violation(fragment, false) {
            flags[2] = false;
            if reason.is_empty() {
                reason = why;
            }
        }

        match &remaining {
            Some(rest) => {
                if let Some(why) = self.infeasible(fragment, rest) {
                    flags[3] = false;
                    if reason.is_empty() {
                        reason = why;
                    }
                }
            }
            // Feasibility is unknowable without a well-defined remainder.
            None => flags[3] = false,
        }

        let outcome = if flags.iter().all(|f| *f) {
            Outcome::Open
        } else {
            Outcome::Invalid
        };
        Verdict {
            outcome,
            reason,
            flags,
        }
    }

    /// The full predicate, only meaningful for empty-bank candidates.
    pub fn hard(&self, fragment: &Fragment) -> Verdict {
        let mut flags = [true; 4];
        let mut reason = "";

        if fragment.letters != self.puzzle.bank {
            flags[0] = false;
            reason = "bank not exactly consumed";
        }

        if !self.words_in_vocabulary(fragment) {
            flags[1] = false;
            if reason.is_empty() {
                reason = "word not in vocabulary";
            }
        }

        if let Some(why) = self.anchor_violation(fragment, true) {
            flags[2] = false;
            if reason.is_empty() {
                reason = why;
            }
        }

        let outcome = if flags.iter().all(|f| *f) {
            Outcome::Terminal
        } else {
            Outcome::Invalid
        };
        Verdict {
            outcome,
            reason,
            flags,
        }
    }

    fn words_in_vocabulary(&self, fragment: &Fragment) -> bool {
        fragment
            .words
            .iter()
            .all(|w| self.puzzle.vocabulary.contains(w))
    }

    /// Checks the committed-prefix constraints: first token, punctuation
    /// order, word-length structure, and (in hard mode) the suffix.
    fn anchor_violation(&self, fragment: &Fragment, terminal: bool) -> Option<&'static str> {
        let constraints = &self.puzzle.constraints;

        if let Some(first) = &constraints.first_token {
            if let Some(word) = fragment.words.first() {
                if word != first {
                    return Some("first token");
                }
            }
        }

        if !constraints.punctuation.is_empty() {
            let placed: Vec<char> = fragment
                .words
                .iter()
                .filter_map(|w| single_punctuation(w))
                .collect();
            if terminal {
                if placed != constraints.punctuation {
                    return Some("punctuation order");
                }
            } else if placed.len() > constraints.punctuation.len()
                || placed
                    .iter()
                    .zip(&constraints.punctuation)
                    .any(|(a, b)| a != b)
            {
                return Some("punctuation order");
            }
        }

        if let Some(why) = self.word_length_violation(fragment) {
            return Some(why);
        }

        if terminal {
            if let Some(suffix) = &constraints.suffix {
                let squeezed: String =
                    fragment.sentence.chars().filter(|c| *c != ' ').collect();
                if !squeezed.ends_with(suffix.as_str()) {
                    return Some("suffix");
                }
            }
        }

        None
    }

    /// Longest/second-longest structure over the words placed so far.
    /// A longest word in final position is always exempt from the
    /// adjacency requirement; the check is one-sided and never demands
    /// that the longest word appear at all.
    fn word_length_violation(&self, fragment: &Fragment) -> Option<&'static str> {
        let constraints = &self.puzzle.constraints;
        let (longest, second) = match (constraints.longest_word, constraints.second_longest) {
            (Some(l), Some(s)) => (l, s),
            (Some(l), None) => {
                let too_long = fragment.words.iter().any(|w| w.chars().count() > l);
                return too_long.then_some("word lengths");
            }
            _ => return None,
        };

        let lengths: Vec<usize> = fragment.words.iter().map(|w| w.chars().count()).collect();
        for (pos, &len) in lengths.iter().enumerate() {
            if len <= second {
                continue;
            }
            if len != longest {
                return Some("word lengths");
            }
            if !constraints.adjacent_longest {
                continue;
            }
            if pos == lengths.len() - 1 {
                continue; // the neighbour may be the very next placement
            }
            // the second-longest word flanks the longest
            let before = pos > 0 && lengths[pos - 1] == second;
            let after = pos + 1 < lengths.len() && lengths[pos + 1] == second;
            if before || after {
                continue;
            }
            return Some("longest words not adjacent");
        }

        None
    }

    /// Checks that some arrangement of `rest` could still complete the
    /// sentence. `rest` is the remainder after placing `fragment`.
    fn infeasible(&self, fragment: &Fragment, rest: &LetterBank) -> Option<&'static str> {
        if rest.is_empty() {
            return None;
        }

        // an all-consonant remainder is a dead end only while every
        // word in the vocabulary needs a vowel
        if self.puzzle.vocabulary.requires_vowels() {
            let letters = rest.letters_only();
            if !letters.is_empty() && !letters.has_vowel() {
                return Some("no vowels remain");
            }
        }

        if !self.puzzle.vocabulary.has_playable(rest) {
            return Some("no playable word");
        }

        if let Some(longest) = self.puzzle.constraints.longest_word {
            let placed = fragment.words.iter().any(|w| w.chars().count() >= longest);
            if !placed
                && !self
                    .puzzle
                    .vocabulary
                    .playable(rest)
                    .any(|w| w.chars().count() >= longest)
            {
                return Some("no long word remains");
            }
        }

        if let Some(suffix) = &self.puzzle.constraints.suffix {
            if let Some(why) = self.suffix_infeasible(fragment, rest, suffix) {
                return Some(why);
            }
        }

        None
    }

    /// The staged suffix-anchor check. With `"w!!"`: the bank must keep
    /// a `w` and both `!` until the end, a word ending in `w` must stay
    /// playable, and once only the punctuation tail is left the sentence
    /// must already end with the letter part.
    fn suffix_infeasible(
        &self,
        fragment: &Fragment,
        rest: &LetterBank,
        suffix: &str,
    ) -> Option<&'static str> {
        let tail_chars = suffix
            .chars()
            .rev()
            .take_while(|c| !c.is_alphabetic())
            .count();
        let split = if tail_chars == 0 {
            suffix.len()
        } else {
            suffix
                .char_indices()
                .rev()
                .nth(tail_chars - 1)
                .map(|(i, _)| i)
                .unwrap_or(0)
        };
        let (letter_part, tail) = suffix.split_at(split);
        let tail_len = tail.chars().count() as u32;
        let full_len = suffix.chars().count() as u32;

        if rest.size() == tail_len {
            let squeezed: String = fragment.sentence.chars().filter(|c| *c != ' ').collect();
            if !squeezed.ends_with(letter_part) || *rest != LetterBank::from_str(tail) {
                return Some("suffix unreachable");
            }
            return None;
        }

        if rest.size() > full_len && !rest.contains(suffix) {
            return Some("suffix unreachable");
        }

        if rest.size() > tail_len {
            if let Some(final_char) = letter_part.chars().last() {
                let ends_right = self
                    .puzzle
                    .vocabulary
                    .playable(rest)
                    .any(|w| w.ends_with(final_char));
                if !ends_right {
                    return Some("suffix unreachable");
                }
            }
        }

        None
    }
}

/// `Some(ch)` iff the token is a single punctuation character.
fn single_punctuation(token: &str) -> Option<char> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if !ch.is_alphabetic() && ch != '\'' => Some(ch),
        _ => None,
    }
}
