use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::types::{CuttingSpec, Pattern, SCALE, scaled};

/// Upper bound on repetitions of one piece within a single bar. Large
/// enough that it never binds for realistic piece lengths.
pub const MAX_REPEAT: u32 = 30;

/// A pattern must use at least `(1 - FILL_TOLERANCE)` of the bar and can
/// never exceed it.
pub const FILL_TOLERANCE: f64 = 0.01;

/// Emit a discovery progress event every this many accepted patterns.
pub const PROGRESS_BATCH: usize = 100;

/// Patterns mixing more distinct piece sizes than this are impractical to
/// cut and blow up the allocation search space.
pub const MAX_DISTINCT_PIECES: usize = 5;

/// Private accumulating state of one `generate` call: dedup set, accepted
/// patterns and batched progress reporting.
struct Collector<'a> {
    seen: HashSet<Vec<u32>>,
    exclude: &'a HashSet<Vec<u32>>,
    accepted: Vec<Pattern>,
    max_solutions: usize,
    sink: &'a dyn ProgressSink,
    stock_length: f64,
}

impl Collector<'_> {
    fn done(&self) -> bool {
        self.accepted.len() >= self.max_solutions
    }

    fn accept(&mut self, counts: &[u32], used_scaled: i64) {
        if self.seen.contains(counts) || self.exclude.contains(counts) {
            return;
        }
        self.seen.insert(counts.to_vec());
        let used_length = used_scaled as f64 / SCALE;
        self.accepted.push(Pattern {
            counts: counts.to_vec(),
            used_length,
        });
        if self.accepted.len() % PROGRESS_BATCH == 0 {
            self.sink.emit(ProgressEvent::PatternsFound {
                count: self.accepted.len(),
                latest_waste: self.stock_length - used_length,
            });
        }
    }
}

/// Exhaustively enumerates near-full-length single-bar patterns.
///
/// The search runs over an integer-scaled domain (tenths) so the window
/// check is exact. A single sequential depth-first worker walks piece
/// counts in index order, which makes discovery order, deduplication and
/// progress batching reproducible across runs. `exclude` holds count
/// vectors already known from an earlier run; enumeration stops once
/// `max_solutions` vectors have been accepted.
pub fn generate(
    spec: &CuttingSpec,
    exclude: &HashSet<Vec<u32>>,
    max_solutions: usize,
    sink: &dyn ProgressSink,
) -> Result<Vec<Pattern>> {
    let blade_scaled = scaled(spec.blade_width);
    // Every piece costs its own length plus one blade kerf.
    let unit_costs: Vec<i64> = spec
        .pieces
        .iter()
        .map(|p| scaled(p.length) + blade_scaled)
        .collect();
    let upper = scaled(spec.stock_length);
    let lower = (upper as f64 * (1.0 - FILL_TOLERANCE)).round() as i64;

    let mut collector = Collector {
        seen: HashSet::new(),
        exclude,
        accepted: Vec::new(),
        max_solutions,
        sink,
        stock_length: spec.stock_length,
    };
    let mut counts = vec![0u32; unit_costs.len()];
    search(&unit_costs, lower, upper, 0, 0, &mut counts, &mut collector);

    if collector.accepted.is_empty() {
        return Err(no_feasible_pattern(spec));
    }

    let mut patterns = collector.accepted;
    // Highest utilisation first; the count vector breaks ties so the final
    // ordering is reproducible too.
    patterns.sort_by(|a, b| {
        b.used_length
            .total_cmp(&a.used_length)
            .then_with(|| a.counts.cmp(&b.counts))
    });
    Ok(patterns)
}

pub(crate) fn no_feasible_pattern(spec: &CuttingSpec) -> Error {
    Error::NoFeasiblePattern {
        stock_length: spec.stock_length,
        tolerance_pct: FILL_TOLERANCE * 100.0,
    }
}

fn search(
    units: &[i64],
    lower: i64,
    upper: i64,
    idx: usize,
    used: i64,
    counts: &mut Vec<u32>,
    collector: &mut Collector<'_>,
) {
    if collector.done() {
        return;
    }
    if idx == units.len() {
        if used >= lower {
            collector.accept(counts, used);
        }
        return;
    }
    let unit = units[idx];
    let cap = if unit <= 0 {
        0
    } else {
        ((upper - used) / unit).min(MAX_REPEAT as i64) as u32
    };
    for x in 0..=cap {
        counts[idx] = x;
        search(
            units,
            lower,
            upper,
            idx + 1,
            used + unit * x as i64,
            counts,
            collector,
        );
        if collector.done() {
            break;
        }
    }
    counts[idx] = 0;
}

/// Drops patterns using more than [`MAX_DISTINCT_PIECES`] piece types, but
/// only once the catalog itself exceeds that size. Applied identically to
/// cached and freshly generated sets.
pub fn filter_patterns(patterns: Vec<Pattern>, piece_types: usize) -> Vec<Pattern> {
    if piece_types <= MAX_DISTINCT_PIECES {
        return patterns;
    }
    patterns
        .into_iter()
        .filter(|p| p.distinct_pieces() <= MAX_DISTINCT_PIECES)
        .collect()
}
