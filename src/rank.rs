//! Rank-group selection over scored matches.
//!
//! Scores follow the bm25() convention used throughout the crate: lower
//! (more negative) is more relevant. A rank group is the set of matches
//! sharing the same score, and `ranks` selects the union of the top N
//! distinct groups, however many ties each group holds.

/// Relative tolerance for treating two scores as the same rank group.
///
/// Exact float equality is an accident of the scoring backend, not a
/// contract; identical matches must land in one group even if their
/// scores differ in the last few bits.
pub const SCORE_EPSILON: f32 = 1e-5;

fn same_group(a: f32, b: f32) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= SCORE_EPSILON * scale
}

/// Keep the top `ranks` rank groups of `matches`, best group first.
///
/// `matches` need not be sorted. `ranks == 0` yields an empty result and
/// a `ranks` beyond the number of distinct groups yields every match.
/// Ordering within the result is by score ascending (best first) with the
/// incoming order preserved among ties.
pub fn select_rank_groups<T>(
    mut matches: Vec<(T, f32)>,
    ranks: usize,
) -> Vec<(T, f32)> {
    if ranks == 0 || matches.is_empty() {
        return Vec::new();
    }

    matches.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut kept = 0;
    let mut group_head = matches[0].1;
    let mut groups_seen = 1;
    for (i, (_, score)) in matches.iter().enumerate() {
        if !same_group(group_head, *score) {
            groups_seen += 1;
            if groups_seen > ranks {
                break;
            }
            group_head = *score;
        }
        kept = i + 1;
    }

    matches.truncate(kept);
    matches
}
