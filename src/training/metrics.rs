use serde::{Deserialize, Serialize};

/// Point estimates of classifier quality on a held-out set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    /// `None` when the held-out set contains a single class.
    pub auc: Option<f64>,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub n_samples: usize,
    pub n_positive: usize,
}

/// Score `scores` against `labels`, predicting positive at `scores >= cutoff`.
///
/// Returns `None` for an empty set.
pub fn evaluate(labels: &[bool], scores: &[f64], cutoff: f64) -> Option<Metrics> {
    if labels.is_empty() || labels.len() != scores.len() {
        return None;
    }

    let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    for (&label, &score) in labels.iter().zip(scores) {
        match (label, score >= cutoff) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    Some(Metrics {
        accuracy: ratio(tp + tn, labels.len()),
        auc: auc(labels, scores),
        precision,
        recall,
        f1,
        n_samples: labels.len(),
        n_positive: tp + fn_,
    })
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
pub fn auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = labels.iter().filter(|l| **l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie group
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(label, _)| **label)
        .map(|(_, rank)| *rank)
        .sum();
    let n_pos = n_pos as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_separation() {
        let labels = [true, true, false, false];
        let scores = [0.9, 0.8, 0.2, 0.1];
        let m = evaluate(&labels, &scores, 0.5).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.auc, Some(1.0));
        assert_eq!(m.f1, 1.0);
        assert_eq!(m.n_positive, 2);
    }

    #[test]
    fn test_auc_with_ties() {
        let labels = [true, false];
        assert_eq!(auc(&labels, &[0.5, 0.5]), Some(0.5));
        assert_eq!(auc(&[true, true], &[0.1, 0.2]), None);
    }

    #[test]
    fn test_no_predicted_positives() {
        let labels = [true, false, false];
        let m = evaluate(&labels, &[0.1, 0.2, 0.3], 0.5).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert!((m.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.auc, Some(0.0));
    }

    #[test]
    fn test_empty_set() {
        assert!(evaluate(&[], &[], 0.5).is_none());
    }
}
