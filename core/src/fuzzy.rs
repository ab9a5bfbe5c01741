//! Edit-distance based string similarity.

use serde::Serialize;

/// Default acceptance threshold for [`best_fuzzy`].
pub const DEFAULT_THRESHOLD: f64 = 0.7;
/// Looser threshold used for verb/object guessing, route and class-name matching.
pub const LOOSE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FuzzyMatch<'a> {
    pub candidate: &'a str,
    pub score: f64,
}

/// Classic Levenshtein distance, compared case-insensitively.
pub fn levenshtein(a: &str, b: &str) -> usize {
    strsim::levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// `1 - levenshtein / max(len)`, in `[0, 1]`. Zero when either side is empty.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    1.0 - strsim::levenshtein(&a, &b) as f64 / longest as f64
}

/// Best-scoring candidate at or above `threshold`.
///
/// Ties keep the first candidate that reached the top score; vocabularies are
/// curated, so equal scores are rare and scan order is an acceptable tie-break.
pub fn best_fuzzy<'a, I>(word: &str, candidates: I, threshold: f64) -> Option<FuzzyMatch<'a>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<FuzzyMatch<'a>> = None;
    for candidate in candidates {
        let score = similarity(word, candidate);
        if best.is_none_or(|current| score > current.score) {
            best = Some(FuzzyMatch { candidate, score });
        }
    }
    best.filter(|m| m.score >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings() {
        assert_eq!(levenshtein("exams", "exams"), 0);
        assert_eq!(similarity("exams", "exams"), 1.0);
        assert_eq!(similarity("Exams", "eXAMS"), 1.0);
    }

    #[test]
    fn empty_strings_score_zero() {
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("open", ""), 0.0);
        assert_eq!(similarity("", "open"), 0.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("opn", "open"),
            ("teachers", "teacher"),
            ("publsh", "publish"),
            ("fees", "finance dashboard"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn known_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("opn", "open"), 1);
        assert!((similarity("opn", "open") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn best_fuzzy_finds_close_word() {
        let hit = best_fuzzy("opn", ["open", "close"], 0.6).expect("match");
        assert_eq!(hit.candidate, "open");
    }

    #[test]
    fn best_fuzzy_rejects_distant_word() {
        assert!(best_fuzzy("xyz", ["open", "close"], 0.6).is_none());
    }

    #[test]
    fn best_fuzzy_tie_keeps_first_candidate() {
        // "cat" is one edit away from both.
        let hit = best_fuzzy("cat", ["bat", "hat"], 0.5).expect("match");
        assert_eq!(hit.candidate, "bat");
    }

    #[test]
    fn default_threshold_is_stricter() {
        assert!(best_fuzzy("stdnts", ["students"], DEFAULT_THRESHOLD).is_some());
        assert!(best_fuzzy("stds", ["students"], DEFAULT_THRESHOLD).is_none());
    }
}
