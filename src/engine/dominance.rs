//! The dominance decision (spec.md §4.4).
//!
//! Kept apart from the rest of the engine so the algorithm can be unit
//! tested against fixed neighbor-table snapshots without any timer or
//! radio plumbing, the way `mac/core.rs`'s CSMA logic is isolated from
//! `base.rs`'s radio state handling in the teacher crate.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::mac::Mac;
use crate::neighbor::NeighborTable;

/// Decide this node's `is_dominant` flag from a snapshot of its neighbor
/// table. `current` is the flag's present value, used only in the `n = 0`
/// case where the decision is undefined and the node keeps whatever it had.
///
/// Deterministic given a fixed `(self_mac, table, current)` (P5): neighbor
/// MACs are visited in sorted order, so the branch that a given topology
/// takes does not depend on `HashMap` iteration order.
pub fn decide(self_mac: &Mac, table: &NeighborTable, current: bool) -> bool {
    let mut neighbors: Vec<Mac> = table.snapshot().map(|(mac, _)| *mac).collect();
    neighbors.sort();

    match neighbors.len() {
        0 => current,
        1 => decide_single_neighbor(table, neighbors[0]),
        _ => decide_multi_neighbor(self_mac, table, &neighbors),
    }
}

fn view_of(table: &NeighborTable, mac: Mac) -> Option<&HashMap<Mac, i16>> {
    table.get(&mac).and_then(|r| r.two_hop_view.as_ref())
}

/// n = 1: a single neighbor `m`. Dominant iff `m` is not already dominant
/// and `m`'s view contains only itself and this node (an edge node whose
/// neighbor has other neighbors stays non-dominant).
fn decide_single_neighbor(table: &NeighborTable, m: Mac) -> bool {
    let record = match table.get(&m) {
        Some(r) => r,
        None => return false,
    };

    if record.is_dominant {
        return false;
    }

    matches!(&record.two_hop_view, Some(view) if view.len() == 2)
}

/// n >= 2: search ordered pairs of neighbors for one that does not see
/// each other directly; the node is bridging them. Absent a bridging pair,
/// fall through to the clique check and, absent an existing dominator
/// there, the RSSI-sum tie-break over a complete neighborhood.
fn decide_multi_neighbor(self_mac: &Mac, table: &NeighborTable, neighbors: &[Mac]) -> bool {
    let n = neighbors.len();

    for &a in neighbors {
        for &b in neighbors {
            if a == b {
                continue;
            }

            let connected = view_of(table, b)
                .map(|v| v.contains_key(&a))
                .unwrap_or(false);
            if connected {
                continue;
            }

            return decide_bridging_pair(self_mac, table, neighbors, a, b);
        }
    }

    decide_clique(self_mac, table, neighbors, n)
}

/// `a` and `b` do not see each other; this node bridges them. Find the
/// first (sorted) third neighbor `c` whose view contains both, and compare
/// this node's closed neighborhood against `c`'s view.
fn decide_bridging_pair(self_mac: &Mac, table: &NeighborTable, neighbors: &[Mac], a: Mac, b: Mac) -> bool {
    let bridge_via = neighbors.iter().copied().find(|&c| {
        c != a
            && c != b
            && view_of(table, c)
                .map(|v| v.contains_key(&a) && v.contains_key(&b))
                .unwrap_or(false)
    });

    let c = match bridge_via {
        None => return true, // only bridge between a and b
        Some(c) => c,
    };

    let view_c = view_of(table, c).expect("bridge candidate has a two-hop view");

    let s_keys: HashSet<Mac> = neighbors
        .iter()
        .copied()
        .chain(std::iter::once(*self_mac))
        .collect();
    let vc_keys: HashSet<Mac> = view_c.keys().copied().collect();

    if s_keys.is_superset(&vc_keys) && s_keys.len() > vc_keys.len() {
        true
    } else if vc_keys.is_superset(&s_keys) && vc_keys.len() > s_keys.len() {
        false
    } else if s_keys == vc_keys {
        let own_sum: f32 = neighbors
            .iter()
            .filter_map(|m| table.get(m))
            .map(|r| r.smoothed_rssi)
            .sum();
        let c_sum: f32 = view_c.values().map(|&rssi| rssi as f32).sum();
        own_sum > c_sum
    } else {
        // Incomparable: each side has a neighbor the other lacks.
        true
    }
}

/// Every pair of neighbors sees each other (a clique). Not dominant if any
/// neighbor is a cut vertex (sees someone outside the clique) or is
/// already dominant itself.
fn decide_clique(self_mac: &Mac, table: &NeighborTable, neighbors: &[Mac], n: usize) -> bool {
    for &m in neighbors {
        let record = match table.get(&m) {
            Some(r) => r,
            None => continue,
        };
        let view_len = record.two_hop_view.as_ref().map(|v| v.len()).unwrap_or(0);
        if view_len > n + 1 || record.is_dominant {
            return false;
        }
    }

    decide_complete_graph_tiebreak(self_mac, table, neighbors)
}

/// Complete graph, no existing dominator among the neighbors: the node
/// with the largest RSSI sum over its neighborhood wins.
fn decide_complete_graph_tiebreak(_self_mac: &Mac, table: &NeighborTable, neighbors: &[Mac]) -> bool {
    let own_sum: f32 = neighbors
        .iter()
        .filter_map(|m| table.get(m))
        .map(|r| r.smoothed_rssi)
        .sum();

    for &m in neighbors {
        if let Some(view) = view_of(table, m) {
            let their_sum: f32 = view.values().map(|&rssi| rssi as f32).sum();
            if own_sum < their_sum {
                return false;
            }
        }
    }

    true
}
