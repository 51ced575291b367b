//! Small numeric helpers shared by prediction, compilation and reporting:
//! vote aggregation, the majority threshold of the emitted tally, and
//! summary statistics.

/// Class with the most votes; the lowest class index wins ties, so a split
/// keep/discard vote comes out as discard (class 0). An empty slice is 0.
pub fn majority_class(votes: &[u32]) -> usize {
    votes
        .iter()
        .enumerate()
        .fold((0, 0), |(best, best_votes), (class, &count)| {
            if count > best_votes {
                (class, count)
            } else {
                (best, best_votes)
            }
        })
        .0
}

/// Votes the emitted tally function needs before it answers "keep":
/// `ceil(member_count / 2)`. For four members two votes suffice.
pub fn majority_threshold(member_count: usize) -> usize {
    member_count.div_ceil(2)
}

/// Population mean and standard deviation. `(0.0, 0.0)` for an empty slice.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_majority() {
        assert_eq!(majority_class(&[1, 5]), 1);
        assert_eq!(majority_class(&[5, 5]), 0); // Tie: lower index wins
        assert_eq!(majority_class(&[]), 0);
        assert_eq!(majority_class(&[0, 1]), 1);
        assert_eq!(majority_class(&[3, 9, 9]), 1);
    }

    #[test]
    fn test_majority_threshold_is_ceiling_of_half() {
        let expected = [(1, 1), (2, 1), (3, 2), (4, 2), (5, 3)];
        for (n, threshold) in expected {
            assert_eq!(majority_threshold(n), threshold, "n = {}", n);
        }
    }

    #[test]
    fn test_mean_std() {
        let (mean, std) = mean_std(&[0.9, 1.0, 1.1, 1.0]);
        assert!((mean - 1.0).abs() < 1e-9);
        assert!((std - 0.070710678).abs() < 1e-9);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
        assert_eq!(mean_std(&[5.0]), (5.0, 0.0));
    }
}
