// ============================================================
// Layer 3 — Character Vocabulary
// ============================================================
// The closed character set the CRNN predicts over.
//
//   index 0      → blank ('-'), reserved for CTC
//   index 1..=n  → every character seen in the label corpus,
//                  in sorted order
//
// Built once from the labels of every rendered image and never
// mutated afterwards.

use anyhow::{bail, Result};
use std::collections::{BTreeSet, HashMap};

/// The reserved CTC blank character (always index 0)
pub const BLANK: char = '-';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    idx2char: Vec<char>,
    char2idx: HashMap<char, usize>,
}

impl Vocabulary {
    /// Build the vocabulary from every label string in the corpus.
    ///
    /// Characters are de-duplicated and sorted, then the blank is
    /// prepended. A label containing the blank itself is rejected.
    pub fn from_labels<'a, I>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut letters = BTreeSet::new();
        for label in labels {
            for c in label.chars() {
                if c == BLANK {
                    bail!("label '{label}' contains the reserved blank character '{BLANK}'");
                }
                letters.insert(c);
            }
        }

        let idx2char: Vec<char> = std::iter::once(BLANK).chain(letters).collect();
        let char2idx = idx2char
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i))
            .collect();

        tracing::debug!("Vocabulary: {:?}", idx2char);
        Ok(Self { idx2char, char2idx })
    }

    /// Number of classes, blank included
    pub fn len(&self) -> usize {
        self.idx2char.len()
    }

    /// A vocabulary always holds at least the blank
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn blank(&self) -> char {
        BLANK
    }

    pub fn index_of(&self, c: char) -> Option<usize> {
        self.char2idx.get(&c).copied()
    }

    pub fn char_at(&self, idx: usize) -> Option<char> {
        self.idx2char.get(idx).copied()
    }

    /// Characters in index order, blank first
    pub fn chars(&self) -> &[char] {
        &self.idx2char
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_is_index_zero() {
        let v = Vocabulary::from_labels(["37", "no"]).unwrap();
        assert_eq!(v.char_at(0), Some(BLANK));
        assert_eq!(v.index_of(BLANK), Some(0));
    }

    #[test]
    fn test_sorted_unique_letters() {
        let v = Vocabulary::from_labels(["no", "37", "73", "no"]).unwrap();
        assert_eq!(v.chars(), &['-', '3', '7', 'n', 'o']);
        assert_eq!(v.len(), 5);
    }

    #[test]
    fn test_mapping_is_a_bijection() {
        let labels = ["no", "12", "45", "90", "no"];
        let v = Vocabulary::from_labels(labels).unwrap();
        for label in labels {
            for c in label.chars() {
                let idx = v.index_of(c).unwrap();
                assert!(idx > 0);
                assert_eq!(v.char_at(idx), Some(c));
            }
        }
        for idx in 0..v.len() {
            let c = v.char_at(idx).unwrap();
            assert_eq!(v.index_of(c), Some(idx));
        }
    }

    #[test]
    fn test_empty_corpus_has_only_blank() {
        let v = Vocabulary::from_labels(std::iter::empty::<&str>()).unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v.char_at(1), None);
    }

    #[test]
    fn test_rejects_blank_in_label() {
        assert!(Vocabulary::from_labels(["a-b"]).is_err());
    }

    #[test]
    fn test_unknown_char_has_no_index() {
        let v = Vocabulary::from_labels(["12"]).unwrap();
        assert_eq!(v.index_of('z'), None);
    }
}
