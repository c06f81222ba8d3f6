// SPDX-License-Identifier: Apache-2.0

//! Small combinatorial helpers shared by the candidate pipeline and the
//! verifier.

use std::collections::BTreeSet;

use crate::netlist::connectivity;
use crate::netlist::{GateId, NetId, Netlist};

/// Rearranges `v` into the next lexicographically greater permutation.
/// Returns false (leaving `v` sorted ascending) once the last permutation
/// has been passed.
pub fn next_permutation<T: Ord>(v: &mut [T]) -> bool {
    if v.len() < 2 {
        return false;
    }
    let mut i = v.len() - 1;
    while i > 0 && v[i - 1] >= v[i] {
        i -= 1;
    }
    if i == 0 {
        v.reverse();
        return false;
    }
    let mut j = v.len() - 1;
    while v[j] <= v[i - 1] {
        j -= 1;
    }
    v.swap(i - 1, j);
    v[i..].reverse();
    true
}

/// All distinct orderings of `items`, starting from the sorted one.
pub fn permutations<T: Ord + Clone>(items: &[T]) -> Vec<Vec<T>> {
    let mut current = items.to_vec();
    current.sort();
    let mut result = vec![current.clone()];
    while next_permutation(&mut current) {
        result.push(current.clone());
    }
    result
}

/// All `k`-element subsets of `items`, preserving relative order, in the
/// order that favors picking earlier elements first.
pub fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    let mut result = Vec::new();
    if k > items.len() {
        return result;
    }
    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        result.push(indices.iter().map(|i| items[*i].clone()).collect());
        // Advance the rightmost index that still has room.
        let mut pos = k;
        loop {
            if pos == 0 {
                return result;
            }
            pos -= 1;
            if indices[pos] < items.len() - k + pos {
                break;
            }
            if pos == 0 {
                return result;
            }
        }
        indices[pos] += 1;
        for next in pos + 1..k {
            indices[next] = indices[next - 1] + 1;
        }
    }
}

/// All length-`k` sequences over `values` (with repetition, order matters).
pub fn combinations_with_repetition<T: Clone>(values: &[T], k: usize) -> Vec<Vec<T>> {
    let mut result: Vec<Vec<T>> = vec![Vec::new()];
    for _ in 0..k {
        let mut next = Vec::with_capacity(result.len() * values.len());
        for prefix in &result {
            for v in values {
                let mut seq = prefix.clone();
                seq.push(v.clone());
                next.push(seq);
            }
        }
        result = next;
    }
    result
}

/// Reorders the bits of commutative operands so that, bit position by bit
/// position, each operand keeps drawing from the same register groups.
/// Positions below `permute_start` keep their original assignment.
pub fn reorder_commutative_operands(
    netlist: &Netlist,
    operands: &[Vec<NetId>],
    registers: &[Vec<GateId>],
    permute_start: usize,
) -> Vec<Vec<NetId>> {
    if operands.is_empty() {
        return Vec::new();
    }
    if operands.len() > 6 {
        log::warn!(
            "reordering {} commutative operands, this might take some time",
            operands.len()
        );
    }
    let width = operands.iter().map(|o| o.len()).min().unwrap_or(0);
    let identity: Vec<usize> = (0..operands.len()).collect();
    let all_permutations = permutations(&identity);

    let mut seen_regs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); operands.len()];
    let mut corrected: Vec<Vec<NetId>> = vec![Vec::with_capacity(width); operands.len()];
    for bit in 0..width {
        let bit_regs: Vec<BTreeSet<usize>> = operands
            .iter()
            .map(|op| connectivity::neighboring_registers(netlist, op[bit], registers))
            .collect();
        let best = if bit < permute_start {
            identity.clone()
        } else {
            let score = |perm: &Vec<usize>| -> usize {
                perm.iter()
                    .enumerate()
                    .map(|(op_idx, src)| bit_regs[*src].difference(&seen_regs[op_idx]).count())
                    .sum()
            };
            all_permutations
                .iter()
                .min_by_key(|p| score(p))
                .cloned()
                .unwrap_or_else(|| identity.clone())
        };
        for (op_idx, src) in best.iter().enumerate() {
            corrected[op_idx].push(operands[*src][bit]);
            seen_regs[op_idx].extend(bit_regs[*src].iter().copied());
        }
    }
    // Bits beyond the shortest operand stay where they were.
    for (op_idx, op) in operands.iter().enumerate() {
        corrected[op_idx].extend(op[width..].iter().copied());
    }
    corrected
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_permutations_are_lexicographic() {
        let got = permutations(&[2, 1, 3]);
        assert_eq!(
            got,
            vec![
                vec![1, 2, 3],
                vec![1, 3, 2],
                vec![2, 1, 3],
                vec![2, 3, 1],
                vec![3, 1, 2],
                vec![3, 2, 1],
            ]
        );
    }

    #[test]
    fn test_permutations_skip_duplicates() {
        assert_eq!(permutations(&[1, 1, 2]).len(), 3);
    }

    #[test]
    fn test_combinations() {
        assert_eq!(
            combinations(&['a', 'b', 'c'], 2),
            vec![vec!['a', 'b'], vec!['a', 'c'], vec!['b', 'c']]
        );
        assert_eq!(combinations(&['a', 'b'], 0), vec![Vec::<char>::new()]);
        assert!(combinations(&['a'], 2).is_empty());
    }

    #[test]
    fn test_combinations_with_repetition_counts() {
        assert_eq!(combinations_with_repetition(&[0, 1, 2], 2).len(), 9);
        assert_eq!(combinations_with_repetition(&[0, 1], 0), vec![Vec::<i32>::new()]);
    }
}
