//! Octave-aware candidate scoring.
//!
//! Beat detectors commonly lock onto half (sometimes double) the perceived
//! tempo. Every raw estimate is expanded with its octave neighbours and each
//! candidate is scored on plausibility plus agreement with all raw estimates.

use crate::audio::features::{round_to, TEMPO_RANGE};

/// Raw estimates at or below this are never halved.
pub const HALVING_THRESHOLD: f64 = 80.0;
/// Relative tolerance for agreement between a candidate and a raw estimate.
pub const AGREEMENT_TOLERANCE: f64 = 0.05;
/// Ties on score go to the candidate nearest this tempo.
pub const REFERENCE_BPM: f64 = 120.0;

const IMPLAUSIBLE_SCORE: i32 = -100;
const SWEET_SPOT_SCORE: i32 = 10;
const NEAR_SWEET_SPOT_SCORE: i32 = 5;
const EXACT_MATCH_BONUS: i32 = 3;
const OCTAVE_MATCH_BONUS: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoCandidate {
    pub bpm: f64,
    pub score: i32,
}

/// Each raw estimate, its double, and its half when above 80 BPM.
pub fn expand(raw: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(raw.len() * 3);
    for &r in raw {
        out.push(r);
        out.push(r * 2.0);
        if r > HALVING_THRESHOLD {
            out.push(r / 2.0);
        }
    }
    out
}

/// Plausibility of a tempo for popular music.
pub fn base_score(bpm: f64) -> i32 {
    if !(40.0..=250.0).contains(&bpm) {
        IMPLAUSIBLE_SCORE
    } else if (80.0..=170.0).contains(&bpm) {
        SWEET_SPOT_SCORE
    } else if (70.0..=180.0).contains(&bpm) {
        NEAR_SWEET_SPOT_SCORE
    } else {
        0
    }
}

/// Bonus for agreeing with the raw estimates, exactly or at an octave.
pub fn agreement_bonus(bpm: f64, raw: &[f64]) -> i32 {
    let scale = bpm.max(1.0);
    let close = |target: f64| (bpm - target).abs() / scale < AGREEMENT_TOLERANCE;

    raw.iter()
        .map(|&r| {
            if close(r) {
                EXACT_MATCH_BONUS
            } else if close(r * 2.0) || close(r / 2.0) {
                OCTAVE_MATCH_BONUS
            } else {
                0
            }
        })
        .sum()
}

pub fn score_candidates(raw: &[f64]) -> Vec<TempoCandidate> {
    expand(raw)
        .into_iter()
        .map(|bpm| TempoCandidate {
            bpm,
            score: base_score(bpm) + agreement_bonus(bpm, raw),
        })
        .collect()
}

/// Highest score wins; ties go to the tempo nearest 120 BPM. The winner is
/// rounded to 0.1 BPM and clipped to the tempo range.
pub fn select(candidates: &[TempoCandidate]) -> Option<f64> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            (a.bpm - REFERENCE_BPM)
                .abs()
                .total_cmp(&(b.bpm - REFERENCE_BPM).abs())
        })
    });

    ranked
        .first()
        .map(|best| TEMPO_RANGE.clamp(round_to(best.bpm, 1)))
}
