use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Content similarity in `[0, 1]`
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Jaccard index over lowercased word tokens
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenJaccardScorer;

impl SimilarityScorer for TokenJaccardScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        let left = tokens(a);
        let right = tokens(b);
        if left.is_empty() && right.is_empty() {
            return 1.0;
        }
        let shared = left.intersection(&right).count();
        let total = left.union(&right).count();
        if total == 0 {
            0.0
        } else {
            shared as f64 / total as f64
        }
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// Cluster a sequence into runs of neighbours.
///
/// An item joins the run being built when `similar` holds for it and any
/// member already in the run; otherwise it starts a new run. Runs are never
/// revisited, so grouping is transitive within a run only.
pub fn group_by_similarity<T>(items: &[T], mut similar: impl FnMut(&[&T], &T) -> bool) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    for (idx, item) in items.iter().enumerate() {
        if current.is_empty() {
            current.push(idx);
            continue;
        }
        let members: Vec<&T> = current.iter().map(|&i| &items[i]).collect();
        if similar(&members, item) {
            current.push(idx);
        } else {
            groups.push(std::mem::take(&mut current));
            current.push(idx);
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
