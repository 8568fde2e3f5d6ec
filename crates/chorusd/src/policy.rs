//! Selection policy: when to skip the judge, and the heuristic pick.

use crate::config::PolicyConfig;
use chorus_common::{Candidate, Mode};

/// True when fast mode may return the heuristic pick without judging.
///
/// `candidates` must be sorted ascending by latency.
pub fn should_shortcut(mode: Mode, candidates: &[Candidate], policy: &PolicyConfig) -> bool {
    if mode != Mode::Fast {
        return false;
    }
    match candidates {
        [first, second, ..] => {
            let a = first.text.chars().count();
            let b = second.text.chars().count();
            a.abs_diff(b) < policy.length_gap_threshold
        }
        _ => true,
    }
}

/// Fastest candidate, unless a slower one is clearly more structured
/// (more than `newline_margin` extra newlines over the current pick).
pub fn heuristic_pick<'a>(candidates: &'a [Candidate], policy: &PolicyConfig) -> Option<&'a Candidate> {
    let (first, rest) = candidates.split_first()?;
    let mut best = first;
    let mut best_newlines = newlines(&first.text);

    for candidate in rest {
        let count = newlines(&candidate.text);
        if count > best_newlines + policy.newline_margin {
            best = candidate;
            best_newlines = count;
        }
    }
    Some(best)
}

fn newlines(text: &str) -> usize {
    text.matches('\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(provider: &str, text: &str, latency_ms: u64) -> Candidate {
        Candidate {
            provider: provider.to_string(),
            text: text.to_string(),
            latency_ms,
        }
    }

    #[test]
    fn test_shortcut_on_similar_lengths() {
        let policy = PolicyConfig::default();
        let cands = vec![
            candidate("a", &"x".repeat(200), 10),
            candidate("b", &"y".repeat(230), 20),
        ];
        assert!(should_shortcut(Mode::Fast, &cands, &policy));
        assert!(!should_shortcut(Mode::Quality, &cands, &policy));
    }

    #[test]
    fn test_no_shortcut_on_large_gap() {
        let policy = PolicyConfig::default();
        let cands = vec![
            candidate("a", &"x".repeat(100), 10),
            candidate("b", &"y".repeat(600), 20),
        ];
        assert!(!should_shortcut(Mode::Fast, &cands, &policy));
    }

    #[test]
    fn test_shortcut_counts_characters_not_bytes() {
        let policy = PolicyConfig {
            length_gap_threshold: 5,
            ..PolicyConfig::default()
        };
        let cands = vec![
            candidate("a", "\u{e9}\u{e9}\u{e9}\u{e9}", 10),
            candidate("b", "abcd", 20),
        ];
        assert!(should_shortcut(Mode::Fast, &cands, &policy));
    }

    #[test]
    fn test_single_candidate_shortcuts_in_fast_only() {
        let policy = PolicyConfig::default();
        let cands = vec![candidate("a", "only", 10)];
        assert!(should_shortcut(Mode::Fast, &cands, &policy));
        assert!(!should_shortcut(Mode::Quality, &cands, &policy));
    }

    #[test]
    fn test_heuristic_prefers_fastest() {
        let policy = PolicyConfig::default();
        let cands = vec![
            candidate("a", "one\ntwo", 10),
            candidate("b", "one\ntwo\nthree", 20),
        ];
        // One extra newline is not enough
        assert_eq!(heuristic_pick(&cands, &policy).unwrap().provider, "a");
    }

    #[test]
    fn test_heuristic_switches_on_structure() {
        let policy = PolicyConfig::default();
        let cands = vec![
            candidate("a", "flat", 10),
            candidate("b", "1\n2\n3", 20),
            candidate("c", "1\n2\n3\n4", 30),
        ];
        assert_eq!(heuristic_pick(&cands, &policy).unwrap().provider, "b");
        assert!(heuristic_pick(&[], &policy).is_none());
    }
}
