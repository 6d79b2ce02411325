//! Brute-force nearest-neighbour identification.
//!
//! Every query is compared against every stored embedding, O(N·128). The
//! linear scan is the known scalability limit of this crate; it keeps the
//! reported distance exact and reproducible.

use crate::embedding::{check_dim, Embedding, EMBEDDING_DIM};
use crate::error::{Error, Result};
use crate::storage::FaceRecord;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Label reported when nothing is close enough.
pub const UNKNOWN_LABEL: &str = "unknown";
/// Distance reported for an empty gallery.
///
/// A genuine distance can also be 1.0; check [`Gallery::is_empty`] when the
/// two cases must be told apart.
pub const EMPTY_GALLERY_DISTANCE: f32 = 1.0;
pub const DEFAULT_TAU: f32 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub label: String,
    pub distance: f32,
}

impl MatchResult {
    fn unknown(distance: f32) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            distance,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

/// Every enrolled embedding, one row per record, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Gallery {
    labels: Vec<String>,
    embeddings: Array2<f32>,
}

impl Gallery {
    /// `embeddings` must be `labels.len()` x [`EMBEDDING_DIM`].
    pub fn new(labels: Vec<String>, embeddings: Array2<f32>) -> Result<Self> {
        check_dim(embeddings.ncols())?;
        if embeddings.nrows() != labels.len() {
            return Err(Error::Dimension {
                expected: labels.len(),
                actual: embeddings.nrows(),
            });
        }
        Ok(Self { labels, embeddings })
    }

    /// Zero rows, still [`EMBEDDING_DIM`] columns.
    pub fn empty() -> Self {
        Self {
            labels: Vec::new(),
            embeddings: Array2::zeros((0, EMBEDDING_DIM)),
        }
    }

    pub fn from_records(records: &[FaceRecord]) -> Result<Self> {
        let mut labels = Vec::with_capacity(records.len());
        let mut flat = Vec::with_capacity(records.len() * EMBEDDING_DIM);
        for record in records {
            check_dim(record.embedding.len())?;
            labels.push(record.label.clone());
            flat.extend_from_slice(&record.embedding);
        }
        let embeddings = Array2::from_shape_vec((records.len(), EMBEDDING_DIM), flat).map_err(|_| {
            Error::Dimension {
                expected: records.len() * EMBEDDING_DIM,
                actual: records.iter().map(|r| r.embedding.len()).sum(),
            }
        })?;
        Ok(Self { labels, embeddings })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn embeddings(&self) -> ArrayView2<'_, f32> {
        self.embeddings.view()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn find_match(&self, query: &Embedding, tau: f32) -> Result<MatchResult> {
        find_match(query.view(), &self.labels, self.embeddings.view(), tau)
    }
}

pub fn euclidean_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Nearest stored embedding to `query`, accepted when its distance is at
/// most `tau`.
///
/// Ties go to the lowest row index, i.e. the earliest enrolled record. The
/// distance is reported even when the label is [`UNKNOWN_LABEL`].
pub fn find_match(
    query: ArrayView1<f32>,
    labels: &[String],
    embeddings: ArrayView2<f32>,
    tau: f32,
) -> Result<MatchResult> {
    check_dim(query.len())?;
    if embeddings.nrows() == 0 {
        return Ok(MatchResult::unknown(EMPTY_GALLERY_DISTANCE));
    }
    check_dim(embeddings.ncols())?;
    if labels.len() != embeddings.nrows() {
        return Err(Error::Dimension {
            expected: embeddings.nrows(),
            actual: labels.len(),
        });
    }

    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, row) in embeddings.outer_iter().enumerate() {
        let dist = euclidean_distance(query, row);
        if i == 0 || dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }

    if best_dist <= tau {
        Ok(MatchResult {
            label: labels[best].clone(),
            distance: best_dist,
        })
    } else {
        Ok(MatchResult::unknown(best_dist))
    }
}
