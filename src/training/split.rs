use std::collections::HashSet;

use crate::dataset::SnapshotKey;
use crate::training::summary::TrainingSummary;

/// Ids added to a summary by one call to [`assign`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// Newly trainable ids in assignment order, warm-up items twice.
    pub train_add: Vec<SnapshotKey>,
    /// Ids that entered the held-out set.
    pub test_add: Vec<SnapshotKey>,
}

impl Assignment {
    pub fn is_empty(&self) -> bool {
        self.train_add.is_empty() && self.test_add.is_empty()
    }
}

/// Place new resolved snapshot ids into the train/test split of `summary`.
///
/// `candidates` must be in resolution order. The held-out set is filled to
/// `min_test_size` first, then training grows to nine times that size with
/// each item appended twice. From then on every new item enters the held-out
/// set and the oldest held-out items move to training whenever the held-out
/// set exceeds a tenth of the total, so the train/test ratio stays near 9.
pub fn assign(
    summary: &mut TrainingSummary,
    candidates: &[SnapshotKey],
    min_test_size: usize,
) -> Assignment {
    let mut seen: HashSet<SnapshotKey> = summary
        .issues_train
        .iter()
        .chain(&summary.issues_test)
        .cloned()
        .collect();
    let mut assignment = Assignment::default();

    for key in candidates {
        if !seen.insert(key.clone()) {
            continue;
        }

        if summary.issues_test.len() < min_test_size {
            summary.issues_test.push(key.clone());
            assignment.test_add.push(key.clone());
        } else if summary.issues_train.len() < 9 * min_test_size {
            for _ in 0..2 {
                summary.issues_train.push(key.clone());
                assignment.train_add.push(key.clone());
            }
        } else {
            summary.issues_test.push(key.clone());
            assignment.test_add.push(key.clone());
            loop {
                let total = summary.issues_train.len() + summary.issues_test.len();
                if summary.issues_test.len() <= min_test_size.max(total / 10) {
                    break;
                }
                let oldest = summary.issues_test.remove(0);
                summary.issues_train.push(oldest.clone());
                assignment.train_add.push(oldest);
            }
        }
    }
    assignment
}
