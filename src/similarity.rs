// Lexical overlap scoring between submissions to the same assignment.
//
// Each text is reduced to its set of lower-cased, whitespace-separated words.
// A submission's score is the highest Jaccard similarity between its word set
// and the word set of any other submission, scaled to a 0-100 percentage:
//
//   |A ∩ B| / |A ∪ B|
//
// Punctuation is part of the token, so "fox" and "fox." do not match.

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{SimilarityResult, TextSubmission};

/// Lower-case the text and split it on any run of whitespace.
///
/// The ASCII information separators (U+001C..=U+001F) also count as
/// whitespace here.
pub fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(is_separator)
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Jaccard similarity of two token sets, 0.0 when both are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Score `target` against a pre-filtered candidate pool.
///
/// Candidates with no usable text are ignored rather than counted as zero.
/// No filtering by assignment or id happens here; see [`candidates_for`].
pub fn assess(target: &TextSubmission, candidates: &[TextSubmission]) -> SimilarityResult {
    let target_words = target.text.as_deref().map(token_set).unwrap_or_default();
    if target_words.is_empty() {
        return SimilarityResult::default();
    }

    let mut best: Option<(f64, Uuid)> = None;
    for candidate in candidates {
        let Some(text) = candidate.text.as_deref() else {
            continue;
        };
        let words = token_set(text);
        if words.is_empty() {
            continue;
        }

        let similarity = jaccard(&target_words, &words);
        best = match best {
            Some((max, id))
                if max > similarity || (max == similarity && id <= candidate.id) =>
            {
                Some((max, id))
            }
            _ => Some((similarity, candidate.id)),
        };
    }

    match best {
        Some((max, id)) => SimilarityResult {
            score: round_percent(max),
            closest: Some(id),
        },
        None => SimilarityResult::default(),
    }
}

/// Plagiarism-likelihood percentage for `target`, in `[0, 100]`.
pub fn score(target: &TextSubmission, candidates: &[TextSubmission]) -> f64 {
    assess(target, candidates).score
}

/// Other submissions to the same assignment as `target`.
pub fn candidates_for(target: &TextSubmission, pool: &[TextSubmission]) -> Vec<TextSubmission> {
    pool.iter()
        .filter(|s| s.assignment_id == target.assignment_id && s.id != target.id)
        .cloned()
        .collect()
}

/// Rescore every submission in `pool` against its own candidates.
pub fn score_pool(pool: &[TextSubmission]) -> Vec<(Uuid, SimilarityResult)> {
    pool.iter()
        .map(|target| {
            let candidates = candidates_for(target, pool);
            (target.id, assess(target, &candidates))
        })
        .collect()
}

pub fn is_flagged(score: f64, threshold: f64) -> bool {
    score > threshold
}

fn round_percent(fraction: f64) -> f64 {
    round2((fraction * 100.0).clamp(0.0, 100.0))
}

/// Round to two decimals from the exact binary value, ties to even.
///
/// `3.125` becomes `3.12` and `9.375` becomes `9.38`.
pub fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(text: Option<&str>) -> TextSubmission {
        TextSubmission {
            id: Uuid::new_v4(),
            assignment_id: Uuid::nil(),
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn tokens_collapse_case_and_duplicates() {
        let words = token_set("The the  THE\tquick\nfox");
        assert_eq!(words.len(), 3);
        assert!(words.contains("the"));
        assert!(words.contains("quick"));
        assert!(words.contains("fox"));
    }

    #[test]
    fn information_separators_split_words() {
        let words = token_set("alpha\u{1c}beta\u{1f}gamma\u{85}delta");
        assert_eq!(words.len(), 4);
        assert!(words.contains("beta"));
    }

    #[test]
    fn exact_ties_round_to_even() {
        assert_eq!(round2(3.125), 3.12);
        assert_eq!(round2(9.375), 9.38);
        assert_eq!(round2(15.625), 15.62);
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(200.0 / 3.0), 66.67);
    }

    #[test]
    fn one_in_thirty_two_scores_three_twelve() {
        let filler: Vec<String> = (1..=31).map(|i| format!("w{i}")).collect();
        let target = submission(Some("a"));
        let other = submission(Some(&format!("a {}", filler.join(" "))));
        assert_eq!(score(&target, &[other]), 3.12);
    }

    #[test]
    fn three_in_thirty_two_scores_nine_thirty_eight() {
        let filler: Vec<String> = (1..=29).map(|i| format!("w{i}")).collect();
        let target = submission(Some("a b c"));
        let other = submission(Some(&format!("a b c {}", filler.join(" "))));
        assert_eq!(score(&target, &[other]), 9.38);
    }

    #[test]
    fn punctuation_stays_attached() {
        let a = token_set("fox");
        let b = token_set("fox.");
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn jaccard_of_empty_sets_is_zero() {
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 0.0);
    }

    #[test]
    fn partial_overlap_scores_sixty() {
        let target = submission(Some("the quick brown fox"));
        let other = submission(Some("the quick brown dog"));
        let result = assess(&target, &[other.clone()]);
        assert_eq!(result.score, 60.0);
        assert_eq!(result.closest, Some(other.id));
    }

    #[test]
    fn empty_target_scores_zero() {
        let target = submission(Some(""));
        let others = vec![submission(Some("hello world"))];
        assert_eq!(score(&target, &others), 0.0);
        assert_eq!(score(&submission(None), &others), 0.0);
    }

    #[test]
    fn whitespace_only_candidates_are_skipped() {
        let target = submission(Some("hello world"));
        let result = assess(&target, &[submission(Some("   \n")), submission(None)]);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.closest, None);
    }

    #[test]
    fn ties_pick_the_smallest_id() {
        let target = submission(Some("alpha beta"));
        let mut a = submission(Some("alpha beta"));
        let mut b = submission(Some("beta alpha"));
        a.id = Uuid::from_u128(2);
        b.id = Uuid::from_u128(1);

        let forward = assess(&target, &[a.clone(), b.clone()]);
        let backward = assess(&target, &[b.clone(), a]);
        assert_eq!(forward.closest, Some(b.id));
        assert_eq!(backward.closest, Some(b.id));
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        // 1 shared word out of 3 distinct words
        let target = submission(Some("a b"));
        let other = submission(Some("b c"));
        assert_eq!(score(&target, &[other]), 33.33);
    }

    #[test]
    fn pool_excludes_self_and_other_assignments() {
        let mut own = submission(Some("shared words here"));
        let twin_elsewhere = TextSubmission {
            id: Uuid::new_v4(),
            assignment_id: Uuid::new_v4(),
            text: Some("shared words here".to_string()),
        };
        let partial = submission(Some("shared words"));
        own.assignment_id = partial.assignment_id;

        let results = score_pool(&[own.clone(), twin_elsewhere.clone(), partial.clone()]);
        let own_result = &results.iter().find(|(id, _)| *id == own.id).unwrap().1;
        assert_eq!(own_result.score, 66.67);
        assert_eq!(own_result.closest, Some(partial.id));

        let lone = &results
            .iter()
            .find(|(id, _)| *id == twin_elsewhere.id)
            .unwrap()
            .1;
        assert_eq!(lone.score, 0.0);
    }

    #[test]
    fn flagging_is_strictly_above_threshold() {
        assert!(!is_flagged(50.0, 50.0));
        assert!(is_flagged(50.01, 50.0));
    }
}
