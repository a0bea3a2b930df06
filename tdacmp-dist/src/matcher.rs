//! Diagram matcher
//!
//! Aligns two sorted pair sequences of one pair type, sets aside the common
//! pairs and prices what is left. Since both inputs are sorted, the longest
//! common subsequence of their tokens is their sorted multiset intersection,
//! so a single merge pass produces the edit script.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::ops::Range;
use tdacmp_formats::{dist_to_empty, Pair, PairType};

/// Edit script operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// One run of the edit script, as ranges into both inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub a: Range<usize>,
    pub b: Range<usize>,
}

/// Edit script between two sorted pair sequences
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    opcodes: Vec<Opcode>,
    matched: usize,
    len_a: usize,
    len_b: usize,
}

impl Alignment {
    /// Merge-align two sorted sequences
    pub fn align(a: &[Pair], b: &[Pair]) -> Alignment {
        let mut opcodes = Vec::new();
        let mut matched = 0;
        let (mut i, mut j) = (0, 0);

        while i < a.len() || j < b.len() {
            let (change_a, change_b) = (i, j);
            loop {
                match (a.get(i), b.get(j)) {
                    (Some(x), Some(y)) => match x.cmp(y) {
                        Ordering::Less => i += 1,
                        Ordering::Greater => j += 1,
                        Ordering::Equal => break,
                    },
                    (Some(_), None) => i += 1,
                    (None, Some(_)) => j += 1,
                    (None, None) => break,
                }
            }
            let tag = match (i > change_a, j > change_b) {
                (true, true) => Some(OpTag::Replace),
                (true, false) => Some(OpTag::Delete),
                (false, true) => Some(OpTag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                opcodes.push(Opcode {
                    tag,
                    a: change_a..i,
                    b: change_b..j,
                });
            }

            let (equal_a, equal_b) = (i, j);
            while i < a.len() && j < b.len() && a[i] == b[j] {
                i += 1;
                j += 1;
            }
            if i > equal_a {
                matched += i - equal_a;
                opcodes.push(Opcode {
                    tag: OpTag::Equal,
                    a: equal_a..i,
                    b: equal_b..j,
                });
            }
        }

        Alignment {
            opcodes,
            matched,
            len_a: a.len(),
            len_b: b.len(),
        }
    }

    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    /// Number of matched pairs
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Similarity `2M / (|A| + |B|)`; two empty inputs are identical
    pub fn ratio(&self) -> f64 {
        let total = self.len_a + self.len_b;
        if total == 0 {
            1.0
        } else {
            2.0 * self.matched as f64 / total as f64
        }
    }

    pub fn is_identical(&self) -> bool {
        self.ratio() == 1.0
    }

    /// Pairs outside every equal run, from A then from B
    pub fn unmatched(&self, a: &[Pair], b: &[Pair]) -> (Vec<Pair>, Vec<Pair>) {
        let mut rest_a = Vec::new();
        let mut rest_b = Vec::new();
        for op in &self.opcodes {
            match op.tag {
                OpTag::Equal => {}
                OpTag::Replace => {
                    rest_a.extend_from_slice(&a[op.a.clone()]);
                    rest_b.extend_from_slice(&b[op.b.clone()]);
                }
                OpTag::Delete => rest_a.extend_from_slice(&a[op.a.clone()]),
                OpTag::Insert => rest_b.extend_from_slice(&b[op.b.clone()]),
            }
        }
        (rest_a, rest_b)
    }

    /// Unified-diff style listing with `context` lines around each change
    pub fn render_diff(&self, a: &[Pair], b: &[Pair], context: usize) -> String {
        let mut out = String::new();
        for group in self.grouped(context) {
            let (first, last) = match (group.first(), group.last()) {
                (Some(f), Some(l)) => (f, l),
                _ => continue,
            };
            let _ = writeln!(
                out,
                "@@ -{} +{} @@",
                hunk_range(first.a.start, last.a.end),
                hunk_range(first.b.start, last.b.end)
            );
            for op in &group {
                if op.tag == OpTag::Equal {
                    for p in &a[op.a.clone()] {
                        let _ = writeln!(out, " {}", p);
                    }
                    continue;
                }
                if matches!(op.tag, OpTag::Replace | OpTag::Delete) {
                    for p in &a[op.a.clone()] {
                        let _ = writeln!(out, "-{}", p);
                    }
                }
                if matches!(op.tag, OpTag::Replace | OpTag::Insert) {
                    for p in &b[op.b.clone()] {
                        let _ = writeln!(out, "+{}", p);
                    }
                }
            }
        }
        out
    }

    /// Split the script into hunks, keeping `context` equal pairs on each side
    fn grouped(&self, context: usize) -> Vec<Vec<Opcode>> {
        if self.opcodes.iter().all(|op| op.tag == OpTag::Equal) {
            return Vec::new();
        }
        let mut codes = self.opcodes.clone();
        if let Some(first) = codes.first_mut() {
            if first.tag == OpTag::Equal {
                let skip = first.a.len().saturating_sub(context);
                first.a.start += skip;
                first.b.start += skip;
            }
        }
        if let Some(last) = codes.last_mut() {
            if last.tag == OpTag::Equal {
                let keep = last.a.len().min(context);
                last.a.end = last.a.start + keep;
                last.b.end = last.b.start + keep;
            }
        }

        let mut groups = Vec::new();
        let mut group = Vec::new();
        for op in codes {
            if op.tag == OpTag::Equal && op.a.len() > 2 * context {
                group.push(Opcode {
                    tag: OpTag::Equal,
                    a: op.a.start..op.a.start + context,
                    b: op.b.start..op.b.start + context,
                });
                groups.push(std::mem::take(&mut group));
                group.push(Opcode {
                    tag: OpTag::Equal,
                    a: op.a.end - context..op.a.end,
                    b: op.b.end - context..op.b.end,
                });
            } else {
                group.push(op);
            }
        }
        if !(group.len() == 1 && group[0].tag == OpTag::Equal) && !group.is_empty() {
            groups.push(group);
        }
        groups.retain(|g| g.iter().any(|op| op.tag != OpTag::Equal));
        groups
    }
}

fn hunk_range(start: usize, end: usize) -> String {
    format!("{},{}", start + 1, end - start)
}

/// How a per-pair-type distance was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Exactness {
    /// Both sides identical, distance 0
    Identical,
    /// Only one side has unmatched pairs, priced against the diagonal
    Approximate,
    /// Both sides have unmatched pairs, waiting for the external solver
    Delegated,
    /// Priced by the external solver
    Solved,
    /// The external solver failed
    Unavailable,
}

/// Outcome of matching one pair type
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub pair_type: PairType,
    /// Bucket the pairs came from
    pub bucket: usize,
    pub unmatched_a: Vec<Pair>,
    pub unmatched_b: Vec<Pair>,
    pub distance: Option<f64>,
    /// Distance of the whole A bucket to the empty diagram
    pub reference_distance: f64,
    /// `distance / reference_distance`; `None` when the reference is zero
    pub relative: Option<f64>,
    pub exactness: Exactness,
}

impl MatchResult {
    /// Record a final distance
    pub fn resolve(&mut self, distance: f64, exactness: Exactness) {
        self.distance = Some(distance);
        self.relative = relative(distance, self.reference_distance);
        self.exactness = exactness;
    }

    /// Solver failed for this bucket
    pub fn mark_unavailable(&mut self) {
        self.distance = None;
        self.relative = None;
        self.exactness = Exactness::Unavailable;
    }

    pub fn needs_solver(&self) -> bool {
        self.exactness == Exactness::Delegated
    }
}

fn relative(distance: f64, reference: f64) -> Option<f64> {
    if reference == 0.0 {
        None
    } else {
        Some(distance / reference)
    }
}

/// Match one pair type of diagram A against the same pair type of B
pub fn match_pairs(pair_type: PairType, bucket: usize, a: &[Pair], b: &[Pair]) -> MatchResult {
    let alignment = Alignment::align(a, b);
    match_with_alignment(pair_type, bucket, a, b, &alignment)
}

/// Same as [`match_pairs`] with a precomputed alignment
pub fn match_with_alignment(
    pair_type: PairType,
    bucket: usize,
    a: &[Pair],
    b: &[Pair],
    alignment: &Alignment,
) -> MatchResult {
    let reference_distance = dist_to_empty(a);
    let mut result = MatchResult {
        pair_type,
        bucket,
        unmatched_a: Vec::new(),
        unmatched_b: Vec::new(),
        distance: None,
        reference_distance,
        relative: None,
        exactness: Exactness::Delegated,
    };

    if alignment.is_identical() {
        result.resolve(0.0, Exactness::Identical);
        return result;
    }

    let (rest_a, rest_b) = alignment.unmatched(a, b);
    match (rest_a.is_empty(), rest_b.is_empty()) {
        (false, true) => result.resolve(dist_to_empty(&rest_a), Exactness::Approximate),
        (true, false) => result.resolve(dist_to_empty(&rest_b), Exactness::Approximate),
        // both empty cannot happen once the identical case is excluded
        _ => {}
    }
    result.unmatched_a = rest_a;
    result.unmatched_b = rest_b;
    result
}
