use rand::Rng;
use thiserror::Error;

use crate::classify::ScoredLabel;

/// Amount trimmed off the top of a bucket before sampling.
///
/// When the trim would drop below the lower bound (`"0-2"`) the bucket collapses to its minimum.
pub const UPPER_BOUND_NARROWING: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReduceError {
    #[error("Classifier returned no predictions")]
    EmptyResponse,

    #[error("Unrecognized label: {0:?}")]
    UnrecognizedLabel(String),

    #[error("Label {0:?} has its bounds reversed")]
    InvalidRange(String),
}

/// Highest-scoring entry, first one wins on ties.
pub fn select_top(predictions: &[ScoredLabel]) -> Option<&ScoredLabel> {
    predictions
        .iter()
        .fold((None, f64::NEG_INFINITY), |(best, best_score), prediction| {
            if best.is_none() || prediction.score > best_score {
                (Some(prediction), prediction.score)
            } else {
                (best, best_score)
            }
        })
        .0
}

/// Split `"<min>-<max>"` into its bounds.
pub fn parse_bounds(label: &str) -> Result<(u32, u32), ReduceError> {
    let unrecognized = || ReduceError::UnrecognizedLabel(label.to_string());

    let (min, max) = label.split_once('-').ok_or_else(unrecognized)?;
    let min: u32 = min.trim().parse().map_err(|_| unrecognized())?;
    let max: u32 = max.trim().parse().map_err(|_| unrecognized())?;

    if min > max {
        return Err(ReduceError::InvalidRange(label.to_string()));
    }
    Ok((min, max))
}

/// Sample an age uniformly from `[min, max - 5]`.
///
/// Buckets narrower than the trim (`"0-2"`) collapse to their lower bound.
pub fn derive_age<R: Rng + ?Sized>(label: &str, rng: &mut R) -> Result<u32, ReduceError> {
    let (min, max) = parse_bounds(label)?;
    let upper = max.saturating_sub(UPPER_BOUND_NARROWING).max(min);
    Ok(rng.random_range(min..=upper))
}

/// Top selection followed by age derivation.
pub fn estimate_age(predictions: &[ScoredLabel]) -> Result<u32, ReduceError> {
    let top = select_top(predictions).ok_or(ReduceError::EmptyResponse)?;
    tracing::debug!("Top prediction {} ({:.3})", top.label, top.score);
    derive_age(&top.label, &mut rand::rng())
}
