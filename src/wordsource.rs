// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Translation oracle (spec.md §1: "out of scope... specified only by
//! interface"). [`WordSource`] is the interface; [`BuiltinWordSource`] is a
//! small bundled reference implementation so the crate runs end to end
//! without an external dictionary service.

use rand::seq::SliceRandom;
use std::collections::HashSet;

/// One challenge word plus every translation the scorer will accept.
pub type WordEntry = (String, HashSet<String>);

pub trait WordSource: Send + Sync {
    /// Produce `n` distinct source words, each with its accepted-translation
    /// set. Panics if `n` exceeds the number of distinct words available —
    /// callers size `n` (spec.md's `matchWords`) well below any reasonable
    /// dictionary.
    fn next_batch(&self, n: usize) -> Vec<WordEntry>;
}

/// Bundled Italian -> English word list, sampled without replacement.
pub struct BuiltinWordSource {
    entries: Vec<(&'static str, &'static [&'static str])>,
}

impl BuiltinWordSource {
    pub fn new() -> Self {
        Self {
            entries: vec![
                ("casa", &["house", "home"]),
                ("cane", &["dog"]),
                ("gatto", &["cat"]),
                ("libro", &["book"]),
                ("tavolo", &["table"]),
                ("sedia", &["chair"]),
                ("acqua", &["water"]),
                ("pane", &["bread"]),
                ("vino", &["wine"]),
                ("sole", &["sun"]),
                ("luna", &["moon"]),
                ("mare", &["sea"]),
                ("monte", &["mountain"]),
                ("fiume", &["river"]),
                ("strada", &["road", "street"]),
                ("porta", &["door"]),
                ("finestra", &["window"]),
                ("albero", &["tree"]),
                ("fiore", &["flower"]),
                ("uccello", &["bird"]),
                ("pesce", &["fish"]),
                ("mela", &["apple"]),
                ("pera", &["pear"]),
                ("latte", &["milk"]),
                ("formaggio", &["cheese"]),
                ("citta", &["city", "town"]),
                ("paese", &["country", "village"]),
                ("tempo", &["time", "weather"]),
                ("amico", &["friend"]),
                ("famiglia", &["family"]),
                ("scuola", &["school"]),
                ("lavoro", &["work", "job"]),
            ],
        }
    }
}

impl Default for BuiltinWordSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WordSource for BuiltinWordSource {
    fn next_batch(&self, n: usize) -> Vec<WordEntry> {
        assert!(
            n <= self.entries.len(),
            "requested {n} words but the bundled dictionary only has {}",
            self.entries.len()
        );
        let mut rng = rand::thread_rng();
        let mut picks: Vec<_> = self.entries.clone();
        picks.shuffle(&mut rng);
        picks
            .into_iter()
            .take(n)
            .map(|(word, translations)| {
                (
                    word.to_string(),
                    translations.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_is_distinct_and_sized() {
        let source = BuiltinWordSource::new();
        let batch = source.next_batch(5);
        assert_eq!(batch.len(), 5);
        let unique: HashSet<_> = batch.iter().map(|(w, _)| w.clone()).collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn every_entry_has_at_least_one_translation() {
        let source = BuiltinWordSource::new();
        for (_, translations) in source.next_batch(10) {
            assert!(!translations.is_empty());
        }
    }
}
