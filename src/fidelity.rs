//! Closed-form fidelity algebra.
//!
//! Two places in the stack combine a pair of fidelities into one:
//! purification (two failed pairs into a purified pair) and entanglement
//! swapping (two adjacent hops into a virtual pair). Both go through
//! [`PurificationScheme::combine`], so the formula used for each is a
//! configuration choice rather than a hard-coded one.

use serde::{Deserialize, Serialize};

/// Minimum fidelity for a heralded pair to enter its channel.
pub const HERALDING_THRESHOLD: f64 = 0.8;

/// A purified pair must exceed this fidelity to be kept.
pub const PURIFICATION_THRESHOLD: f64 = 0.8;

/// Purification must succeed with more than this probability to be attempted.
pub const PURIFICATION_MIN_PROBABILITY: f64 = 0.5;

/// Formula used to combine two fidelities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PurificationScheme {
    /// `f1·f2 / (f1·f2 + (1−f1)(1−f2))`
    #[default]
    Symmetric,
    /// BBPSSW recurrence with Werner-state error terms.
    Bbpssw,
    /// DEJMPS recurrence.
    Dejmps,
}

impl PurificationScheme {
    /// Map the numeric scheme code (1, 2, 3). Unknown codes fall back to
    /// [`PurificationScheme::Symmetric`].
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => PurificationScheme::Bbpssw,
            3 => PurificationScheme::Dejmps,
            _ => PurificationScheme::Symmetric,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PurificationScheme::Symmetric => 1,
            PurificationScheme::Bbpssw => 2,
            PurificationScheme::Dejmps => 3,
        }
    }

    pub fn combine(self, f1: f64, f2: f64) -> f64 {
        let f1f2 = f1 * f2;
        match self {
            PurificationScheme::Symmetric => f1f2 / (f1f2 + (1.0 - f1) * (1.0 - f2)),
            PurificationScheme::Bbpssw => {
                let e1 = (1.0 - f1) / 3.0;
                let e2 = (1.0 - f2) / 3.0;
                (f1f2 + e1 * e2) / (f1f2 + f1 * e2 + f2 * e1 + 5.0 * e1 * e2)
            }
            PurificationScheme::Dejmps => {
                (2.0 * f1f2 + 1.0 - f1 - f2) / (0.25 * (f1 + f2 - f1f2) + 0.75)
            }
        }
    }
}

/// Probability that two pairs of fidelities `f1` and `f2` agree, used as the
/// success probability of both purification and swapping.
pub fn agreement_probability(f1: f64, f2: f64) -> f64 {
    f1 * f2 + (1.0 - f1) * (1.0 - f2)
}

/// Fidelity of a qubit teleported over a route of mean pair fidelity
/// `f_route`, consuming a source qubit `f_src` and a destination qubit `f_dst`.
pub fn teleported_fidelity(f_src: f64, f_dst: f64, f_route: f64) -> f64 {
    f_src * f_dst * f_route + (1.0 - f_src) * (1.0 - f_dst) * (1.0 - f_route)
}

/// Arithmetic mean; `None` for an empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
