// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Duel scoring (spec.md §4.7 Phase 4, §8 invariant 3).
//!
//! Kept free of any socket or store dependency so the scoring rule itself —
//! the part of this system with the tightest, most testable invariant — can
//! be exercised without a single byte of I/O.

use std::collections::HashSet;

/// Per-word outcome for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Correct,
    Wrong,
    Blank,
}

/// Score a peer's per-word answers against the accepted-translation sets.
/// `+2` correct, `0` blank, `-1` otherwise (spec.md §4.7 Phase 4).
pub fn classify(answer: &str, accepted: &HashSet<String>) -> Answer {
    if answer.is_empty() {
        Answer::Blank
    } else if accepted.contains(answer) {
        Answer::Correct
    } else {
        Answer::Wrong
    }
}

pub fn raw_score(answers: &[Answer]) -> i64 {
    answers
        .iter()
        .map(|a| match a {
            Answer::Correct => 2,
            Answer::Blank => 0,
            Answer::Wrong => -1,
        })
        .sum()
}

/// Final per-peer scores including the +3 winner bonus. A strictly higher
/// raw score wins the bonus; a tie awards no bonus, even when both raw
/// scores are negative (spec.md §9 winner-bonus edge case).
pub fn finalize(challenger_raw: i64, challenged_raw: i64) -> (i64, i64) {
    match challenger_raw.cmp(&challenged_raw) {
        std::cmp::Ordering::Greater => (challenger_raw + 3, challenged_raw),
        std::cmp::Ordering::Less => (challenger_raw, challenged_raw + 3),
        std::cmp::Ordering::Equal => (challenger_raw, challenged_raw),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost,
    Drew,
}

pub fn outcome_for(mine: i64, theirs: i64) -> Outcome {
    match mine.cmp(&theirs) {
        std::cmp::Ordering::Greater => Outcome::Won,
        std::cmp::Ordering::Less => Outcome::Lost,
        std::cmp::Ordering::Equal => Outcome::Drew,
    }
}

impl Outcome {
    pub fn as_word(self) -> &'static str {
        match self {
            Outcome::Won => "won",
            Outcome::Lost => "lost",
            Outcome::Drew => "drew",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classify_correct_wrong_blank() {
        let accepted = set(&["house", "home"]);
        assert_eq!(classify("house", &accepted), Answer::Correct);
        assert_eq!(classify("castle", &accepted), Answer::Wrong);
        assert_eq!(classify("", &accepted), Answer::Blank);
    }

    #[test]
    fn raw_score_matches_formula() {
        let answers = vec![Answer::Correct, Answer::Correct, Answer::Wrong, Answer::Blank];
        // 2*2 - 1 = 3
        assert_eq!(raw_score(&answers), 3);
    }

    #[test]
    fn s4_full_duel_scenario() {
        // spec.md S4: alice answers house,dog -> 4; bob answers house,cat -> 1
        let alice = raw_score(&[Answer::Correct, Answer::Correct]);
        let bob = raw_score(&[Answer::Correct, Answer::Wrong]);
        assert_eq!(alice, 4);
        assert_eq!(bob, 1);
        let (alice_final, bob_final) = finalize(alice, bob);
        assert_eq!(alice_final, 7);
        assert_eq!(bob_final, 1);
        assert_eq!(outcome_for(alice_final, bob_final), Outcome::Won);
        assert_eq!(outcome_for(bob_final, alice_final), Outcome::Lost);
    }

    #[test]
    fn tie_awards_no_bonus() {
        let (a, b) = finalize(4, 4);
        assert_eq!((a, b), (4, 4));
        assert_eq!(outcome_for(a, b), Outcome::Drew);
    }

    #[test]
    fn negative_scores_still_award_bonus_to_higher() {
        // spec.md §9: both negative but unequal, winner still gets +3.
        let (a, b) = finalize(-2, -5);
        assert_eq!((a, b), (1, -5));
        assert_eq!(outcome_for(a, b), Outcome::Won);
    }

    #[test]
    fn crash_mid_duel_blanks_remaining() {
        // spec.md S6: bob crashes before answering anything.
        let bob_raw = raw_score(&[Answer::Blank, Answer::Blank]);
        assert_eq!(bob_raw, 0);
    }
}
