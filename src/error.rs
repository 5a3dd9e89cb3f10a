use thiserror::Error;

/// Fatal failures of the optimization engine. Cache-layer problems are
/// absorbed internally and never show up here.
#[derive(Debug, Error)]
pub enum Error {
    /// The input was rejected before any solver ran.
    #[error("invalid cutting specification: {0}")]
    InvalidSpecification(String),

    /// Phase 1 found no single-bar combination inside the utilisation
    /// window. Nothing can be allocated without patterns.
    #[error(
        "no feasible cutting pattern: nothing fills stock length {stock_length} \
         to within {tolerance_pct}% of capacity"
    )]
    NoFeasiblePattern {
        stock_length: f64,
        tolerance_pct: f64,
    },

    /// Phase 2 found no bundle plan satisfying demand and surplus bounds
    /// within the time budget.
    #[error(
        "no feasible distribution over {patterns} patterns within {budget_secs}s; \
         consider a larger surplus, more bundle factors or a bigger time budget"
    )]
    NoFeasibleDistribution { patterns: usize, budget_secs: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
