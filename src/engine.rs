use std::collections::HashSet;
use std::sync::Arc;

use crate::allocate;
use crate::cache::{PatternCache, fingerprint};
use crate::error::Result;
use crate::pattern::{self, no_feasible_pattern};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::types::{CuttingSpec, DistributionPlan, Pattern};

/// Cached sets this small are the residue of an incomplete earlier run;
/// discard them and regenerate.
const MIN_CACHED_PATTERNS: usize = 10;

/// Cap on Phase 1 enumeration.
const MAX_SOLUTIONS: usize = 100_000;

/// Two-phase cutting-stock optimizer: discover single-bar patterns
/// (cached by geometry fingerprint), then allocate bundles per pattern.
pub struct Optimizer {
    spec: CuttingSpec,
    cache: PatternCache,
    sink: Arc<dyn ProgressSink>,
}

/// Result of a full run: the retained pattern set and the bundle plan.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub patterns: Vec<Pattern>,
    pub plan: DistributionPlan,
}

impl Optimizer {
    /// Validates the spec up front; nothing solves on malformed input.
    pub fn new(
        spec: CuttingSpec,
        cache: PatternCache,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec, cache, sink })
    }

    pub fn run(&self) -> Result<Outcome> {
        match self.run_inner() {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.sink.emit(ProgressEvent::Failed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn run_inner(&self) -> Result<Outcome> {
        self.sink.emit(ProgressEvent::Started {
            pieces: self.spec.pieces.len(),
            stock_length: self.spec.stock_length,
        });

        let patterns = self.discover_patterns()?;
        self.sink.emit(ProgressEvent::PhaseOneComplete {
            patterns: patterns.len(),
        });

        let plan = allocate::allocate(&self.spec, &patterns, Arc::clone(&self.sink))?;
        self.sink.emit(ProgressEvent::PhaseTwoComplete {
            quality: plan.quality,
            total_bars: plan.total_bars(),
        });

        Ok(Outcome { patterns, plan })
    }

    /// Phase 1 with caching: reuse an adequate cached set for this
    /// geometry, otherwise enumerate afresh and persist the result.
    pub fn discover_patterns(&self) -> Result<Vec<Pattern>> {
        let key = fingerprint(&self.spec);

        let mut patterns = self.cache.load(&key).unwrap_or_default();
        if !patterns.is_empty() {
            self.sink.emit(ProgressEvent::CacheHit {
                patterns: patterns.len(),
            });
        }
        if (1..MIN_CACHED_PATTERNS).contains(&patterns.len()) {
            self.sink.emit(ProgressEvent::CacheInadequate {
                patterns: patterns.len(),
            });
            patterns.clear();
        }

        if patterns.is_empty() {
            self.sink.emit(ProgressEvent::GenerationStarted {
                max_solutions: MAX_SOLUTIONS,
            });
            let generated =
                pattern::generate(&self.spec, &HashSet::new(), MAX_SOLUTIONS, self.sink.as_ref())?;
            let before = generated.len();
            patterns = pattern::filter_patterns(generated, self.spec.pieces.len());
            if patterns.len() != before {
                self.sink.emit(ProgressEvent::PatternsFiltered {
                    before,
                    after: patterns.len(),
                });
            }
            if patterns.is_empty() {
                return Err(no_feasible_pattern(&self.spec));
            }
            // Persistence is best effort; a failed write never fails the run.
            if let Err(err) = self.cache.store(&key, &patterns) {
                tracing::warn!(%err, "failed to persist pattern cache");
            }
        } else {
            patterns = pattern::filter_patterns(patterns, self.spec.pieces.len());
        }

        // Head/tail trim comes out of the same bar, so patterns filling
        // past `stock - trim` cannot be cut as-is.
        if self.spec.trim_allowance > 0.0 {
            patterns
                .retain(|p| p.used_length + self.spec.trim_allowance <= self.spec.stock_length);
        }
        if patterns.is_empty() {
            return Err(no_feasible_pattern(&self.spec));
        }
        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemorySink;
    use crate::types::PieceDef;
    use tempfile::TempDir;

    fn spec(pieces: Vec<(&str, f64, u64)>, stock: f64, blade: f64) -> CuttingSpec {
        CuttingSpec {
            stock_length: stock,
            blade_width: blade,
            trim_allowance: 0.0,
            pieces: pieces
                .into_iter()
                .map(|(name, length, demand)| PieceDef {
                    name: name.to_string(),
                    length,
                    demand,
                })
                .collect(),
            bundle_factors: vec![1, 2, 3, 4, 5],
            manual_cut_cap: 1000,
            max_surplus: 2,
            time_budget_secs: 10,
        }
    }

    /// Rich catalog: plenty of window patterns, so the cache is adequate.
    fn rich_spec() -> CuttingSpec {
        spec(
            vec![
                ("A", 500.0, 20),
                ("B", 600.0, 10),
                ("C", 750.0, 8),
                ("D", 1000.0, 6),
            ],
            6000.0,
            0.0,
        )
    }

    fn optimizer(spec: CuttingSpec, dir: &TempDir) -> (Optimizer, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let opt = Optimizer::new(spec, PatternCache::new(dir.path()), sink.clone()).unwrap();
        (opt, sink)
    }

    fn generation_ran(sink: &MemorySink) -> bool {
        sink.events()
            .iter()
            .any(|e| matches!(e, ProgressEvent::GenerationStarted { .. }))
    }

    #[test]
    fn test_invalid_spec_rejected_before_solving() {
        let dir = tempfile::tempdir().unwrap();
        let bad = spec(vec![("A", 5998.0, 3)], 6000.0, 4.0);
        let result = Optimizer::new(
            bad,
            PatternCache::new(dir.path()),
            Arc::new(MemorySink::default()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_adequate_cache_short_circuits_generation() {
        let dir = tempfile::tempdir().unwrap();

        let (first, first_sink) = optimizer(rich_spec(), &dir);
        let generated = first.discover_patterns().unwrap();
        assert!(generated.len() >= MIN_CACHED_PATTERNS);
        assert!(generation_ran(&first_sink));

        let (second, second_sink) = optimizer(rich_spec(), &dir);
        let cached = second.discover_patterns().unwrap();
        assert_eq!(cached, generated);
        assert!(!generation_ran(&second_sink), "cache hit must not regenerate");
        assert!(
            second_sink
                .events()
                .iter()
                .any(|e| matches!(e, ProgressEvent::CacheHit { .. }))
        );
    }

    #[test]
    fn test_small_cached_set_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let spec = rich_spec();
        let key = fingerprint(&spec);
        let cache = PatternCache::new(dir.path());
        cache
            .store(&key, &[Pattern {
                counts: vec![12, 0, 0, 0],
                used_length: 6000.0,
            }])
            .unwrap();

        let (opt, sink) = optimizer(spec, &dir);
        let patterns = opt.discover_patterns().unwrap();
        assert!(patterns.len() >= MIN_CACHED_PATTERNS);
        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, ProgressEvent::CacheInadequate { patterns: 1 }))
        );
        assert!(generation_ran(&sink));
    }

    #[test]
    fn test_corrupt_cache_degrades_to_regeneration() {
        let dir = tempfile::tempdir().unwrap();
        let spec = rich_spec();
        let key = fingerprint(&spec);
        let cache = PatternCache::new(dir.path());
        cache.store(&key, &[]).unwrap();
        std::fs::write(
            dir.path().join(format!("patterns_{key}.json")),
            b"\x00garbage",
        )
        .unwrap();

        let (opt, sink) = optimizer(spec, &dir);
        assert!(opt.discover_patterns().is_ok());
        assert!(generation_ran(&sink));
    }

    #[test]
    fn test_trim_allowance_drops_overfull_patterns() {
        let dir = tempfile::tempdir().unwrap();
        // Only pattern is 2x500 = 1000, flush with the bar.
        let mut tight = spec(vec![("A", 500.0, 10)], 1000.0, 0.0);
        tight.trim_allowance = 5.0;
        let (opt, _) = optimizer(tight, &dir);
        assert!(matches!(
            opt.discover_patterns(),
            Err(crate::error::Error::NoFeasiblePattern { .. })
        ));
    }

    #[test]
    fn test_full_run_produces_valid_plan() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(
            vec![("A", 1196.0, 10), ("B", 1796.0, 5), ("C", 2396.0, 3)],
            6000.0,
            4.0,
        );
        let (opt, sink) = optimizer(spec.clone(), &dir);
        let outcome = opt.run().unwrap();

        for (i, piece) in spec.pieces.iter().enumerate() {
            assert!(outcome.plan.produced[i] >= piece.demand);
            assert!(outcome.plan.produced[i] <= piece.demand + spec.max_surplus);
        }
        for p in &outcome.patterns {
            assert!(p.used_length <= spec.stock_length);
            assert!(p.waste(spec.stock_length) >= 0.0);
        }

        let events = sink.events();
        assert!(matches!(events.first(), Some(ProgressEvent::Started { .. })));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProgressEvent::PhaseOneComplete { .. }))
        );
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProgressEvent::PhaseTwoComplete { .. }))
        );
    }

    #[test]
    fn test_failed_run_emits_terminal_event() {
        let dir = tempfile::tempdir().unwrap();
        // Factor-1 only with a zero manual cap cannot cut anything.
        let mut impossible = spec(vec![("A", 500.0, 10)], 1000.0, 0.0);
        impossible.bundle_factors = vec![1];
        impossible.manual_cut_cap = 0;
        let (opt, sink) = optimizer(impossible, &dir);
        assert!(opt.run().is_err());
        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, ProgressEvent::Failed { .. }))
        );
    }
}
