use indexmap::IndexMap;

use crate::types::CategoryId;

/// Aggregate balance metrics over per-category group sizes.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupSkew {
    pub total: usize,
    pub groups: usize,
    pub empty_groups: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    /// Largest group's share of `total`.
    pub max_share: f64,
    /// `max / min`, infinite when some group is empty.
    pub ratio: f64,
}

/// Compute skew metrics from per-category counts.
/// Groups overlap, so `total` may exceed the number of distinct records.
pub fn group_skew(counts: &IndexMap<CategoryId, usize>) -> Option<GroupSkew> {
    if counts.is_empty() {
        return None;
    }
    let total: usize = counts.values().sum();
    let groups = counts.len();
    let min = counts.values().copied().min()?;
    let max = counts.values().copied().max()?;
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    Some(GroupSkew {
        total,
        groups,
        empty_groups: counts.values().filter(|count| **count == 0).count(),
        min,
        max,
        mean: total as f64 / groups as f64,
        max_share: if total == 0 {
            0.0
        } else {
            max as f64 / total as f64
        },
        ratio,
    })
}
