//! Answer confidence from retrieval quality.

use gitsleuth_memory::Confidence;

/// Mean distance below which an answer is rated high.
pub const HIGH_MAX_DISTANCE: f32 = 0.25;
/// Mean distance below which an answer is rated medium.
pub const MEDIUM_MAX_DISTANCE: f32 = 0.5;

/// Label from the mean of `distances`; nothing retrieved is always low.
#[must_use]
pub fn from_distances(distances: &[f32], retrieved_count: usize) -> Confidence {
    if retrieved_count == 0 || distances.is_empty() {
        return Confidence::Low;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = distances.iter().sum::<f32>() / distances.len() as f32;
    if mean < HIGH_MAX_DISTANCE {
        Confidence::High
    } else if mean < MEDIUM_MAX_DISTANCE {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Confidence of an answer. A `[CONFIDENCE: …]` marker in the answer wins
/// over the distance-based label, except that an answer with nothing
/// retrieved is always low.
#[must_use]
pub fn estimate(answer: &str, distances: &[f32], retrieved_count: usize) -> Confidence {
    let computed = from_distances(distances, retrieved_count);
    let marker = Confidence::from_marker(answer);
    if retrieved_count == 0 {
        if let Some(marked) = marker
            && marked != Confidence::Low
        {
            tracing::warn!(marked = %marked, "ignoring confidence marker on an answer without context");
        }
        return Confidence::Low;
    }
    match marker {
        Some(marked) => {
            if marked != computed {
                tracing::warn!(
                    marked = %marked,
                    computed = %computed,
                    "answer confidence marker disagrees with retrieval"
                );
            }
            marked
        }
        None => computed,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn thresholds() {
        assert_eq!(from_distances(&[0.1, 0.2], 2), Confidence::High);
        assert_eq!(from_distances(&[0.25], 1), Confidence::Medium);
        assert_eq!(from_distances(&[0.3, 0.6], 2), Confidence::Medium);
        assert_eq!(from_distances(&[0.5], 1), Confidence::Low);
    }

    #[test]
    fn nothing_retrieved_is_low() {
        assert_eq!(from_distances(&[], 0), Confidence::Low);
        assert_eq!(from_distances(&[0.0], 0), Confidence::Low);
        assert_eq!(estimate("no context", &[], 0), Confidence::Low);
    }

    #[test]
    fn marker_cannot_raise_empty_retrieval() {
        assert_eq!(
            estimate("It is the parser. [CONFIDENCE: high]", &[], 0),
            Confidence::Low
        );
        assert_eq!(
            estimate("[CONFIDENCE: medium] maybe", &[0.1], 0),
            Confidence::Low
        );
    }

    #[test]
    fn marker_overrides() {
        assert_eq!(
            estimate("It parses TOML. [CONFIDENCE: low]", &[0.05], 1),
            Confidence::Low
        );
        assert_eq!(
            estimate("[confidence: HIGH] sure", &[0.9], 1),
            Confidence::High
        );
        assert_eq!(estimate("plain answer", &[0.3], 1), Confidence::Medium);
    }

    proptest! {
        #[test]
        fn monotonic_in_mean_distance(a in 0.0f32..1.5, b in 0.0f32..1.5, n in 1usize..6) {
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            let near = from_distances(&vec![near; n], n);
            let far = from_distances(&vec![far; n], n);
            prop_assert!(near >= far);
        }
    }
}
