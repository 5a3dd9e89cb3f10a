use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Fixed-point scale applied to lengths before any integer arithmetic.
/// One decimal place is enough for millimetre inputs.
pub const SCALE: f64 = 10.0;

/// Round a length into the scaled integer domain.
pub fn scaled(length: f64) -> i64 {
    (length * SCALE).round() as i64
}

/// One required piece type: a label, its length and how many are needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PieceDef {
    pub name: String,
    pub length: f64,
    pub demand: u64,
}

/// Complete description of a cutting job: the stock bar geometry, the
/// piece catalog, and the packaging/solve parameters for Phase 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuttingSpec {
    /// Stock bar length.
    pub stock_length: f64,
    /// Material lost to the blade on every cut.
    pub blade_width: f64,
    /// Head/tail allowance that must stay uncut on each bar.
    pub trim_allowance: f64,
    pub pieces: Vec<PieceDef>,
    /// Allowed bundle multipliers. Factor 1 is the manual-cut unit and is
    /// always treated as present.
    pub bundle_factors: Vec<u32>,
    /// Cap on the total number of factor-1 bundles across all patterns.
    pub manual_cut_cap: u64,
    /// How far production of any piece may exceed its demand.
    pub max_surplus: u64,
    /// Wall-clock budget for the Phase 2 solve.
    pub time_budget_secs: u64,
}

impl CuttingSpec {
    /// Rejects malformed input before any solver runs.
    pub fn validate(&self) -> Result<()> {
        if !self.stock_length.is_finite() || self.stock_length <= 0.0 {
            return Err(Error::InvalidSpecification(format!(
                "stock length must be positive, got {}",
                self.stock_length
            )));
        }
        if self.blade_width < 0.0 || self.trim_allowance < 0.0 {
            return Err(Error::InvalidSpecification(
                "blade width and trim allowance must be non-negative".to_string(),
            ));
        }
        if self.pieces.is_empty() {
            return Err(Error::InvalidSpecification(
                "at least one piece type is required".to_string(),
            ));
        }
        let usable = self.stock_length - self.blade_width - self.trim_allowance;
        for piece in &self.pieces {
            if !piece.length.is_finite() || piece.length <= 0.0 {
                return Err(Error::InvalidSpecification(format!(
                    "piece '{}' must have a positive length, got {}",
                    piece.name, piece.length
                )));
            }
            if piece.length >= usable {
                return Err(Error::InvalidSpecification(format!(
                    "piece '{}' ({}) does not fit in stock {} after blade {} and trim {}",
                    piece.name,
                    piece.length,
                    self.stock_length,
                    self.blade_width,
                    self.trim_allowance
                )));
            }
            if piece.demand == 0 {
                return Err(Error::InvalidSpecification(format!(
                    "piece '{}' must have a demand of at least 1",
                    piece.name
                )));
            }
        }
        Ok(())
    }

    /// Positive bundle factors, deduplicated and sorted descending, with the
    /// manual-cut factor 1 always present.
    pub fn positive_factors(&self) -> Vec<u32> {
        let mut factors: Vec<u32> = self
            .bundle_factors
            .iter()
            .copied()
            .filter(|&f| f > 0)
            .collect();
        if !factors.contains(&1) {
            factors.push(1);
        }
        factors.sort_unstable_by(|a, b| b.cmp(a));
        factors.dedup();
        factors
    }

    pub fn demands(&self) -> Vec<u64> {
        self.pieces.iter().map(|p| p.demand).collect()
    }
}

/// One feasible way to cut a single stock bar. `counts[i]` is how many of
/// piece type `i` the bar yields; `used_length` includes the blade kerf of
/// every cut. Identity is the count vector alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub counts: Vec<u32>,
    pub used_length: f64,
}

impl Pattern {
    pub fn waste(&self, stock_length: f64) -> f64 {
        stock_length - self.used_length
    }

    /// Number of piece types this pattern actually uses.
    pub fn distinct_pieces(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    pub fn total_pieces(&self) -> u32 {
        self.counts.iter().sum()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.counts == other.counts
    }
}

impl Eq for Pattern {}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.counts.hash(state);
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.counts.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ")")
    }
}

/// Whether Phase 2 proved its answer optimal or only found a feasible plan
/// before the cutoff. The bundled backend proves optimality whenever it
/// returns a solution, so plans coming out of the engine are always
/// `Optimal`; `Feasible` is reserved for backends that can stop at the
/// budget with an incumbent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveQuality {
    Optimal,
    Feasible,
}

/// A non-zero bundle decision: `bundles` bundles of `factor` bars each, all
/// cut under pattern `pattern` (an index into the retained pattern set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleAllocation {
    pub pattern: usize,
    pub factor: u32,
    pub bundles: u64,
}

/// The Phase 2 result: how many bundles of each factor to cut per pattern,
/// plus the derived bar counts, per-piece production and objective totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionPlan {
    pub allocations: Vec<BundleAllocation>,
    /// Bars cut under each pattern, indexed like the pattern set.
    pub bars_per_pattern: Vec<u64>,
    /// Pieces produced per type, indexed like the spec's piece list.
    pub produced: Vec<u64>,
    pub total_waste: f64,
    pub total_bundles: u64,
    pub quality: SolveQuality,
}

impl DistributionPlan {
    pub fn total_bars(&self) -> u64 {
        self.bars_per_pattern.iter().sum()
    }

    /// Total factor-1 bundles, the quantity bounded by the manual-cut cap.
    pub fn manual_bundles(&self) -> u64 {
        self.allocations
            .iter()
            .filter(|a| a.factor == 1)
            .map(|a| a.bundles)
            .sum()
    }
}

/// Accepts JSON numbers like `3.0` for integer quantities, which some HTTP
/// clients send.
pub fn deserialize_u64_from_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(serde::de::Error::custom(format!(
            "expected a non-negative integer, got {value}"
        )));
    }
    Ok(value as u64)
}
