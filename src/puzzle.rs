//! Puzzle configuration: the letter bank, the vocabulary in play, and
//! the declarative constraints a solution must satisfy.
//!
//! The `c1663` profile encodes the published hints for Dinosaur Comics
//! #1663 ("The Qwantzle"). Everything else is a plain bank with no
//! constraints.

use crate::bank::LetterBank;
use crate::fragment::Fragment;
use crate::vocab::Vocabulary;

/// The canonical c1663 letter bank: 97 letters plus `:,!!`.
pub const C1663_BANK: &str =
    "ttttttttttttooooooooeeeeeeeeaaaaaaallllllnnnnnnuuuuuuiiiiisssssdddddhhhhhyyyyyIIrrrfmmggggbbwwckv:,!!";

/// Words the solution is known not to contain: the sentence does not
/// refer to the puzzle, to anagrams, or to the prize.
const C1663_FORBIDDEN: &[&str] = &[
    "anagram",
    "anagrams",
    "anagramist",
    "puzzle",
    "puzzles",
    "shirt",
    "shirts",
    "tshirt",
];

/// Declarative constraints on valid solutions. Every field is optional;
/// a default `Constraints` accepts any exact-bank sentence.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// The sentence must open with this token.
    pub first_token: Option<String>,
    /// Punctuation tokens must appear in exactly this order.
    pub punctuation: Vec<char>,
    /// Length of the longest word of the solution.
    pub longest_word: Option<usize>,
    /// Length of the second-longest word.
    pub second_longest: Option<usize>,
    /// Whether the longest and second-longest words are adjacent.
    pub adjacent_longest: bool,
    /// Final characters of the solution, compared with spaces ignored
    /// (e.g. `"w!!"`).
    pub suffix: Option<String>,
}

/// A puzzle instance: bank + vocabulary + constraints.
#[derive(Debug, Clone)]
pub struct Puzzle {
    pub bank: LetterBank,
    pub vocabulary: Vocabulary,
    pub constraints: Constraints,
    /// The sentence prefix search starts from (`""` unless the profile
    /// pins the first token).
    pub root: String,
}

impl Puzzle {
    /// A bank with no constraints beyond exact letter use.
    pub fn unconstrained(letters: &str, vocabulary: Vocabulary) -> Self {
        let bank = LetterBank::from_str(letters);
        let vocabulary = with_punctuation_tokens(vocabulary, &bank);
        Puzzle {
            bank,
            vocabulary,
            constraints: Constraints::default(),
            root: String::new(),
        }
    }

    /// The comic 1663 profile, with the canonical bank and published
    /// hints. Forbidden words are removed from the vocabulary here.
    pub fn c1663(vocabulary: Vocabulary) -> Self {
        let bank = LetterBank::from_str(C1663_BANK);
        let vocabulary = with_punctuation_tokens(vocabulary.without(C1663_FORBIDDEN), &bank);
        Puzzle {
            bank,
            vocabulary,
            constraints: Constraints {
                first_token: Some("I".to_string()),
                punctuation: vec![':', ',', '!', '!'],
                longest_word: Some(11),
                second_longest: Some(8),
                adjacent_longest: true,
                suffix: Some("w!!".to_string()),
            },
            root: "I".to_string(),
        }
    }

    /// The bank left after placing `fragment`, or `None` if the fragment
    /// uses characters the bank does not hold.
    pub fn remaining(&self, fragment: &Fragment) -> Option<LetterBank> {
        self.bank.checked_subtract_bank(&fragment.letters)
    }
}

/// Word lists rarely carry punctuation, but punctuation characters in
/// the bank must be placeable as tokens. Append each one once.
fn with_punctuation_tokens(mut vocabulary: Vocabulary, bank: &LetterBank) -> Vocabulary {
    for ch in bank.distinct() {
        if !ch.is_alphabetic() && ch != '\'' {
            vocabulary.insert(&ch.to_string());
        }
    }
    vocabulary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_bank_has_101_characters() {
        let bank = LetterBank::from_str(C1663_BANK);
        assert_eq!(bank.size(), 101);
        assert_eq!(bank.count('t'), 12);
        assert_eq!(bank.count('I'), 2);
        assert_eq!(bank.count('!'), 2);
        assert_eq!(bank.count(':'), 1);
        assert_eq!(bank.count(','), 1);
    }

    #[test]
    fn c1663_profile_roots_at_i() {
        let puzzle = Puzzle::c1663(Vocabulary::from_words(["I", "cannot"]));
        assert_eq!(puzzle.root, "I");
        assert_eq!(puzzle.constraints.first_token.as_deref(), Some("I"));
        assert_eq!(puzzle.constraints.punctuation, vec![':', ',', '!', '!']);
    }

    #[test]
    fn c1663_removes_forbidden_words_and_adds_punctuation() {
        let puzzle = Puzzle::c1663(Vocabulary::from_words(["I", "anagram", "win"]));
        assert!(!puzzle.vocabulary.contains("anagram"));
        assert!(puzzle.vocabulary.contains("win"));
        assert!(puzzle.vocabulary.contains(":"));
        assert!(puzzle.vocabulary.contains("!"));
    }

    #[test]
    fn remaining_subtracts_placed_letters() {
        let puzzle = Puzzle::unconstrained("I am", Vocabulary::from_words(["I", "am"]));
        let frag = Fragment::new("I");
        let rest = puzzle.remaining(&frag).unwrap();
        assert_eq!(rest, LetterBank::from_str("am"));
        assert!(puzzle.remaining(&Fragment::new("I ox")).is_none());
    }

    #[test]
    fn unconstrained_profile_has_empty_root() {
        let puzzle = Puzzle::unconstrained("ab", Vocabulary::from_words(["a", "b"]));
        assert_eq!(puzzle.root, "");
        assert!(puzzle.constraints.first_token.is_none());
    }
}
