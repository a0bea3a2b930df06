//! Canonical persistence diagram
//!
//! A [`Diagram`] holds three buckets of `(birth, death)` pairs, indexed by the
//! pair-type tag the source format declared (0, 1 or 2). Buckets are always
//! sorted by `(birth, death)` under IEEE total ordering; the matcher relies on
//! this.
//!
//! Tags are kept as the source format wrote them. Backends disagree on whether
//! the tag is the homological dimension or the dimension of the birth cell, so
//! no attempt is made to reconcile conventions across formats. Which buckets
//! are populated is classified after decoding by [`DiagramShape`].

use crate::error::{FormatError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Number of pair-type buckets
pub const BUCKET_COUNT: usize = 3;

/// Pair classification by the dimension of the birth cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PairType {
    #[serde(rename = "min-sad")]
    MinSaddle,
    #[serde(rename = "sad-sad")]
    SaddleSaddle,
    #[serde(rename = "sad-max")]
    SaddleMax,
}

impl PairType {
    pub const ALL: [PairType; BUCKET_COUNT] =
        [PairType::MinSaddle, PairType::SaddleSaddle, PairType::SaddleMax];

    /// Pair type for a bucket tag (0, 1, 2)
    pub fn from_tag(tag: i64) -> Option<PairType> {
        match tag {
            0 => Some(PairType::MinSaddle),
            1 => Some(PairType::SaddleSaddle),
            2 => Some(PairType::SaddleMax),
            _ => None,
        }
    }

    /// Short report key
    pub fn key(&self) -> &'static str {
        match self {
            PairType::MinSaddle => "min-sad",
            PairType::SaddleSaddle => "sad-sad",
            PairType::SaddleMax => "sad-max",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            PairType::MinSaddle => "min-saddle",
            PairType::SaddleSaddle => "saddle-saddle",
            PairType::SaddleMax => "saddle-max",
        }
    }
}

impl fmt::Display for PairType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One `(birth, death)` coordinate
///
/// Equality and ordering use `f64::total_cmp`, so two pairs compare equal
/// exactly when their printed forms are identical.
#[derive(Debug, Clone, Copy)]
pub struct Pair {
    pub birth: f64,
    pub death: f64,
}

impl Pair {
    pub fn new(birth: f64, death: f64) -> Self {
        Self { birth, death }
    }

    /// Lifetime `death - birth`
    pub fn persistence(&self) -> f64 {
        self.death - self.birth
    }

    /// Both coordinates finite
    pub fn is_finite(&self) -> bool {
        self.birth.is_finite() && self.death.is_finite()
    }

    /// On the diagonal (`birth == death`)
    pub fn is_diagonal(&self) -> bool {
        self.birth == self.death
    }
}

impl PartialEq for Pair {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pair {}

impl PartialOrd for Pair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pair {
    fn cmp(&self, other: &Self) -> Ordering {
        self.birth
            .total_cmp(&other.birth)
            .then_with(|| self.death.total_cmp(&other.death))
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.birth, self.death)
    }
}

impl From<(f64, f64)> for Pair {
    fn from((birth, death): (f64, f64)) -> Self {
        Pair::new(birth, death)
    }
}

/// A pair together with its bucket tag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistencePair {
    /// Bucket tag, 0..=2
    pub dimension: usize,
    pub birth: f64,
    pub death: f64,
}

impl PersistencePair {
    pub fn new(dimension: usize, birth: f64, death: f64) -> Self {
        Self { dimension, birth, death }
    }

    pub fn pair(&self) -> Pair {
        Pair::new(self.birth, self.death)
    }
}

/// L2 distance of a pair set to the empty diagram
///
/// Each pair is matched with its own diagonal projection, costing
/// `(death - birth) / sqrt(2)`; the result is `sqrt(sum((d - b)^2) / 2)`.
pub fn dist_to_empty(pairs: &[Pair]) -> f64 {
    let sum: f64 = pairs.iter().map(|p| p.persistence().powi(2)).sum();
    (sum / 2.0).sqrt()
}

/// Which buckets a decoded diagram populates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagramShape {
    /// Curve dataset: only min-max pairs (bucket 0)
    SingleBucket,
    /// Surface dataset: bucket 0 min-saddle, bucket 1 saddle-max
    TwoBucket,
    /// Volume dataset, or tags declared explicitly: buckets 0/1/2
    ThreeBucket,
}

impl DiagramShape {
    /// Classify by which buckets are empty
    pub fn classify(diagram: &Diagram) -> DiagramShape {
        let empty = |i: usize| diagram.buckets[i].is_empty();
        if empty(1) && empty(2) {
            DiagramShape::SingleBucket
        } else if empty(2) {
            DiagramShape::TwoBucket
        } else {
            DiagramShape::ThreeBucket
        }
    }

    /// (bucket index, reported pair type) for each meaningful bucket
    pub fn pair_types(&self) -> &'static [(usize, PairType)] {
        match self {
            DiagramShape::SingleBucket => &[(0, PairType::MinSaddle)],
            DiagramShape::TwoBucket => &[(0, PairType::MinSaddle), (1, PairType::SaddleMax)],
            DiagramShape::ThreeBucket => &[
                (0, PairType::MinSaddle),
                (1, PairType::SaddleSaddle),
                (2, PairType::SaddleMax),
            ],
        }
    }

    /// Display name for a bucket under this shape
    pub fn bucket_label(&self, bucket: usize) -> &'static str {
        match (self, bucket) {
            (DiagramShape::SingleBucket, 0) => "min-max",
            (DiagramShape::TwoBucket, 1) => PairType::SaddleMax.label(),
            (_, b) => PairType::from_tag(b as i64).map(|t| t.label()).unwrap_or("unknown"),
        }
    }
}

/// Canonical persistence diagram
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagram {
    buckets: [Vec<Pair>; BUCKET_COUNT],
    diagonal: Vec<Pair>,
}

impl Diagram {
    /// Empty diagram
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from three buckets, sorting each
    pub fn from_buckets(buckets: [Vec<Pair>; BUCKET_COUNT]) -> Self {
        let mut diagram = Self {
            buckets,
            diagonal: Vec::new(),
        };
        diagram.sort();
        diagram
    }

    /// Build from tagged pairs; tags must be 0..=2
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = PersistencePair>,
    {
        let mut diagram = Diagram::new();
        for (record, p) in pairs.into_iter().enumerate() {
            if p.dimension >= BUCKET_COUNT {
                return Err(FormatError::InvalidPairType {
                    record,
                    tag: p.dimension as i64,
                });
            }
            diagram.buckets[p.dimension].push(p.pair());
        }
        diagram.sort();
        Ok(diagram)
    }

    pub(crate) fn push(&mut self, bucket: usize, pair: Pair) {
        self.buckets[bucket].push(pair);
    }

    pub(crate) fn push_diagonal(&mut self, pair: Pair) {
        self.diagonal.push(pair);
    }

    /// Stable sort of every bucket by (birth, death)
    pub(crate) fn sort(&mut self) {
        for bucket in &mut self.buckets {
            bucket.sort();
        }
    }

    /// Pairs with the given tag
    pub fn bucket(&self, index: usize) -> &[Pair] {
        self.buckets.get(index).map(|b| b.as_slice()).unwrap_or(&[])
    }

    pub fn buckets(&self) -> &[Vec<Pair>; BUCKET_COUNT] {
        &self.buckets
    }

    /// Diagonal bookkeeping records, when retained at decode time
    pub fn diagonal(&self) -> &[Pair] {
        &self.diagonal
    }

    /// Pair count over all buckets (diagonal records excluded)
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> DiagramShape {
        DiagramShape::classify(self)
    }

    /// Drop pairs with a non-finite coordinate
    pub fn retain_finite(&mut self) {
        for bucket in &mut self.buckets {
            bucket.retain(Pair::is_finite);
        }
    }

    /// All pairs with their tags, bucket by bucket
    pub fn persistence_pairs(&self) -> impl Iterator<Item = PersistencePair> + '_ {
        self.buckets.iter().enumerate().flat_map(|(dim, bucket)| {
            bucket
                .iter()
                .map(move |p| PersistencePair::new(dim, p.birth, p.death))
        })
    }

    /// Pair counts per pair type, labelled by shape
    pub fn summary(&self) -> DiagramSummary {
        let shape = self.shape();
        let counts = shape
            .pair_types()
            .iter()
            .map(|&(bucket, pair_type)| (pair_type, self.buckets[bucket].len()))
            .collect();
        DiagramSummary {
            shape,
            counts,
            total: self.len(),
        }
    }
}

/// Pair counts of a diagram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramSummary {
    pub shape: DiagramShape,
    pub counts: BTreeMap<PairType, usize>,
    pub total: usize,
}

impl fmt::Display for DiagramSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pair_type, count) in &self.counts {
            writeln!(f, "#{}: {}", pair_type.label(), count)?;
        }
        write!(f, "#total pairs: {}", self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(v: &[(f64, f64)]) -> Vec<Pair> {
        v.iter().copied().map(Pair::from).collect()
    }

    #[test]
    fn test_buckets_sorted_with_death_tiebreak() {
        let d = Diagram::from_buckets([
            pairs(&[(1.0, 3.0), (0.0, 5.0), (1.0, 2.0)]),
            vec![],
            vec![],
        ]);
        assert_eq!(d.bucket(0), pairs(&[(0.0, 5.0), (1.0, 2.0), (1.0, 3.0)]).as_slice());
    }

    #[test]
    fn test_shape_classification() {
        let one = Diagram::from_buckets([pairs(&[(0.0, 1.0)]), vec![], vec![]]);
        assert_eq!(one.shape(), DiagramShape::SingleBucket);
        assert_eq!(one.shape().bucket_label(0), "min-max");

        let two = Diagram::from_buckets([pairs(&[(0.0, 1.0)]), pairs(&[(2.0, 3.0)]), vec![]]);
        assert_eq!(two.shape(), DiagramShape::TwoBucket);
        assert_eq!(
            two.shape().pair_types(),
            &[(0, PairType::MinSaddle), (1, PairType::SaddleMax)]
        );

        let three = Diagram::from_buckets([pairs(&[(0.0, 1.0)]), vec![], pairs(&[(1.0, 9.0)])]);
        assert_eq!(three.shape(), DiagramShape::ThreeBucket);

        assert_eq!(Diagram::new().shape(), DiagramShape::SingleBucket);
    }

    #[test]
    fn test_dist_to_empty() {
        assert_eq!(dist_to_empty(&[]), 0.0);
        assert_eq!(dist_to_empty(&pairs(&[(3.0, 3.0), (1.0, 1.0)])), 0.0);
        let d = dist_to_empty(&pairs(&[(0.0, 2.0)]));
        assert!((d - 2f64.sqrt()).abs() < 1e-12);
        assert!(dist_to_empty(&pairs(&[(0.0, f64::INFINITY)])).is_infinite());
    }

    #[test]
    fn test_pair_equality_is_bitwise() {
        assert_eq!(Pair::new(0.0, 1.0), Pair::new(0.0, 1.0));
        assert_ne!(Pair::new(-0.0, 1.0), Pair::new(0.0, 1.0));
        assert_eq!(Pair::new(f64::NAN, 1.0), Pair::new(f64::NAN, 1.0));
        assert_eq!(Pair::new(0.5, 1e-7).to_string(), "0.5 0.0000001");
    }

    #[test]
    fn test_from_pairs_rejects_bad_tag() {
        let err = Diagram::from_pairs(vec![
            PersistencePair::new(0, 0.0, 1.0),
            PersistencePair::new(3, 0.0, 1.0),
        ])
        .unwrap_err();
        assert!(matches!(err, FormatError::InvalidPairType { record: 1, tag: 3 }));
    }

    #[test]
    fn test_summary_counts_by_shape() {
        let d = Diagram::from_buckets([
            pairs(&[(0.0, 1.0), (0.0, 2.0)]),
            pairs(&[(1.0, 4.0)]),
            vec![],
        ]);
        let summary = d.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.counts[&PairType::MinSaddle], 2);
        assert_eq!(summary.counts[&PairType::SaddleMax], 1);
        assert!(!summary.counts.contains_key(&PairType::SaddleSaddle));
    }

    #[test]
    fn test_retain_finite() {
        let mut d = Diagram::from_buckets([
            pairs(&[(0.0, f64::INFINITY), (0.0, 1.0)]),
            vec![],
            vec![],
        ]);
        d.retain_finite();
        assert_eq!(d.bucket(0), pairs(&[(0.0, 1.0)]).as_slice());
    }
}
