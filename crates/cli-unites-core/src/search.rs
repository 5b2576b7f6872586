//! Semantic-similarity ranking.
//!
//! [`rank_candidates`] is the one implementation of the ranking contract used
//! by every backend: the SQLite store and the hosted store both hand their
//! candidates to this function rather than ranking on the database side.
//!
//! # Algorithm
//!
//! 1. Reject a query whose length is not `dims` (or that holds NaN/inf).
//! 2. Drop candidates with no vector, the wrong length, or non-finite values.
//! 3. Score the rest with cosine similarity (`0.0` for zero-magnitude vectors).
//! 4. Keep scores strictly above `threshold`.
//! 5. Stable sort by score, descending, so ties keep input order.
//! 6. Truncate to `limit`.

use serde::Serialize;
use thiserror::Error;

/// Default minimum similarity a result must exceed.
pub const DEFAULT_THRESHOLD: f64 = 0.5;
/// Default maximum number of ranked results.
pub const DEFAULT_LIMIT: usize = 10;

/// The query vector cannot be ranked against.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidVectorError {
    #[error("invalid query vector: expected {expected} dimensions, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("invalid query vector: component {index} is not a finite number")]
    NonFinite { index: usize },
}

/// Ranking tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankParams {
    /// Results must score strictly above this value.
    pub threshold: f64,
    /// Maximum results to return.
    pub limit: usize,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// A record paired with its stored vector, if one has been computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<T> {
    pub record: T,
    pub vector: Option<Vec<f32>>,
}

impl<T> Candidate<T> {
    pub fn new(record: T, vector: Option<Vec<f32>>) -> Self {
        Self { record, vector }
    }
}

/// A ranked result borrowing its record from the candidate list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked<'a, T> {
    pub record: &'a T,
    pub similarity: f64,
}

/// Rank `candidates` by cosine similarity to `query`.
///
/// Fails only when the query itself is malformed; malformed candidates are
/// skipped.
pub fn rank_candidates<'a, T>(
    query: &[f32],
    dims: usize,
    candidates: &'a [Candidate<T>],
    params: &RankParams,
) -> Result<Vec<Ranked<'a, T>>, InvalidVectorError> {
    if query.len() != dims {
        return Err(InvalidVectorError::Dimension {
            expected: dims,
            actual: query.len(),
        });
    }
    if let Some(index) = query.iter().position(|x| !x.is_finite()) {
        return Err(InvalidVectorError::NonFinite { index });
    }

    let query_norm_sq = norm_sq(query);

    let mut ranked: Vec<Ranked<'a, T>> = candidates
        .iter()
        .filter_map(|c| {
            let vector = c.vector.as_deref()?;
            if vector.len() != dims || vector.iter().any(|x| !x.is_finite()) {
                return None;
            }
            let similarity = cosine(query, query_norm_sq, vector);
            (similarity > params.threshold).then_some(Ranked {
                record: &c.record,
                similarity,
            })
        })
        .collect();

    // `sort_by` is stable, which keeps first-seen order among equal scores.
    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    ranked.truncate(params.limit);

    Ok(ranked)
}

fn norm_sq(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x) * f64::from(x)).sum()
}

fn cosine(query: &[f32], query_norm_sq: f64, v: &[f32]) -> f64 {
    let v_norm_sq = norm_sq(v);
    if query_norm_sq == 0.0 || v_norm_sq == 0.0 {
        return 0.0;
    }
    let dot: f64 = query
        .iter()
        .zip(v)
        .map(|(&a, &b)| f64::from(a) * f64::from(b))
        .sum();
    dot / (query_norm_sq * v_norm_sq).sqrt()
}
