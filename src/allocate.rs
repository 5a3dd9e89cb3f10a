use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use good_lp::{Expression, Solution, SolverModel, Variable, default_solver, variable, variables};

use crate::error::{Error, Result};
use crate::progress::{ProgressSink, SolveTicker};
use crate::types::{
    BundleAllocation, CuttingSpec, DistributionPlan, Pattern, SCALE, SolveQuality, scaled,
};

/// Plain-data form of the integer program, detached from the spec so it can
/// move onto the solver thread.
#[derive(Clone)]
struct AllocationJob {
    /// `counts[j][i]`: pieces of type `i` yielded per bar of pattern `j`.
    counts: Vec<Vec<u32>>,
    /// Scaled waste per bar of each pattern.
    waste_scaled: Vec<i64>,
    demands: Vec<u64>,
    max_surplus: u64,
    manual_cut_cap: u64,
    /// Positive factors, descending, factor 1 present.
    factors: Vec<u32>,
    /// Upper bound for each bundle variable, from the tightest piece-type
    /// capacity the pattern touches. Tightens the search space without
    /// excluding any feasible solution.
    bundle_caps: Vec<Vec<u64>>,
}

impl AllocationJob {
    fn build(spec: &CuttingSpec, patterns: &[Pattern]) -> Self {
        let factors = spec.positive_factors();
        let demands = spec.demands();
        let stock_scaled = scaled(spec.stock_length);

        let mut bar_caps = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let cap = pattern
                .counts
                .iter()
                .zip(&demands)
                .filter(|&(&count, _)| count > 0)
                .map(|(&count, &demand)| (demand + spec.max_surplus).div_ceil(count as u64))
                .min()
                .unwrap_or(0);
            bar_caps.push(cap);
        }

        let bundle_caps = bar_caps
            .iter()
            .map(|&cap| {
                factors
                    .iter()
                    .map(|&f| if cap > 0 { cap.div_ceil(f as u64) } else { 0 })
                    .collect()
            })
            .collect();

        Self {
            counts: patterns.iter().map(|p| p.counts.clone()).collect(),
            waste_scaled: patterns
                .iter()
                .map(|p| stock_scaled - scaled(p.used_length))
                .collect(),
            demands,
            max_surplus: spec.max_surplus,
            manual_cut_cap: spec.manual_cut_cap,
            factors,
            bundle_caps,
        }
    }
}

struct SolvedAllocation {
    /// `bundles[j][r]`: bundles of factor `factors[r]` for pattern `j`.
    bundles: Vec<Vec<u64>>,
    quality: SolveQuality,
}

/// Decides how many bundles of each factor to cut per pattern so that every
/// demand is met within the surplus bound, waste is minimized and, among
/// equal-waste plans, so is the bundle count.
///
/// The solve runs on a dedicated thread; the caller waits at most the
/// spec's time budget. A ticker broadcasts elapsed time once a second for
/// the duration of the call and is stopped on every exit path.
pub fn allocate(
    spec: &CuttingSpec,
    patterns: &[Pattern],
    sink: Arc<dyn ProgressSink>,
) -> Result<DistributionPlan> {
    let infeasible = || Error::NoFeasibleDistribution {
        patterns: patterns.len(),
        budget_secs: spec.time_budget_secs,
    };
    if patterns.is_empty() {
        return Err(infeasible());
    }

    let budget = Duration::from_secs(spec.time_budget_secs);
    let job = AllocationJob::build(spec, patterns);

    let _ticker = SolveTicker::start(sink, budget);

    let (tx, rx) = mpsc::channel();
    let abandoned = Arc::new(AtomicBool::new(false));
    let solver_job = job.clone();
    let solver_flag = Arc::clone(&abandoned);
    thread::Builder::new()
        .name("allocation-solver".into())
        .spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| solve_model(&solver_job, &solver_flag)));
            let _ = tx.send(outcome.unwrap_or(None));
        })
        .expect("spawn allocation-solver");

    match rx.recv_timeout(budget) {
        Ok(Some(solved)) => Ok(build_plan(&job, &solved)),
        Ok(None) => Err(infeasible()),
        Err(_) => {
            // The backend has no cancellation: a solve already underway runs
            // to completion on the detached thread. Flagging it here bounds
            // the stray work to that one solve call.
            abandoned.store(true, Ordering::Relaxed);
            Err(infeasible())
        }
    }
}

fn solve_model(job: &AllocationJob, abandoned: &AtomicBool) -> Option<SolvedAllocation> {
    let n = job.counts.len();
    let m = job.demands.len();

    let mut vars = variables!();
    let b: Vec<Vec<Variable>> = (0..n)
        .map(|j| {
            job.factors
                .iter()
                .enumerate()
                .map(|(r, f)| {
                    vars.add(
                        variable()
                            .integer()
                            .min(0)
                            .max(job.bundle_caps[j][r] as f64)
                            .name(format!("b_{j}_{f}")),
                    )
                })
                .collect()
        })
        .collect();

    // Waste strictly dominates bundle count: weight it above the largest
    // achievable bundle total so the two objectives never trade off.
    let max_bundles: u64 = job.bundle_caps.iter().flatten().sum();
    let w1 = (max_bundles + 1) as f64;

    let objective = (0..n).fold(Expression::from(0.0), |acc, j| {
        job.factors.iter().enumerate().fold(acc, |acc, (r, &f)| {
            let coeff = job.waste_scaled[j] as f64 * f as f64 * w1 + 1.0;
            acc + coeff * b[j][r]
        })
    });

    let mut prob = vars.minimise(objective).using(default_solver);

    for i in 0..m {
        let produced = (0..n).fold(Expression::from(0.0), |acc, j| {
            let yield_per_bar = job.counts[j][i];
            if yield_per_bar == 0 {
                return acc;
            }
            job.factors.iter().enumerate().fold(acc, |acc, (r, &f)| {
                acc + (yield_per_bar as f64 * f as f64) * b[j][r]
            })
        });
        prob.add_constraint(produced.clone().geq(job.demands[i] as f64));
        prob.add_constraint(produced.leq((job.demands[i] + job.max_surplus) as f64));
    }

    if let Some(r1) = job.factors.iter().position(|&f| f == 1) {
        let manual = (0..n).fold(Expression::from(0.0), |acc, j| acc + b[j][r1]);
        prob.add_constraint(manual.leq(job.manual_cut_cap as f64));
    }

    // The caller may have given up while the model was being built.
    if abandoned.load(Ordering::Relaxed) {
        return None;
    }

    let solution = prob.solve().ok()?;

    let bundles = b
        .iter()
        .map(|row| {
            row.iter()
                .map(|&var| solution.value(var).round().max(0.0) as u64)
                .collect()
        })
        .collect();
    Some(SolvedAllocation {
        bundles,
        // The backend proves optimality whenever it returns a solution.
        quality: SolveQuality::Optimal,
    })
}

fn build_plan(job: &AllocationJob, solved: &SolvedAllocation) -> DistributionPlan {
    let n = job.counts.len();
    let m = job.demands.len();

    let mut allocations = Vec::new();
    let mut bars_per_pattern = vec![0u64; n];
    let mut total_bundles = 0u64;
    for j in 0..n {
        for (r, &factor) in job.factors.iter().enumerate() {
            let bundles = solved.bundles[j][r];
            if bundles == 0 {
                continue;
            }
            allocations.push(BundleAllocation {
                pattern: j,
                factor,
                bundles,
            });
            bars_per_pattern[j] += factor as u64 * bundles;
            total_bundles += bundles;
        }
    }

    let mut produced = vec![0u64; m];
    for j in 0..n {
        for i in 0..m {
            produced[i] += job.counts[j][i] as u64 * bars_per_pattern[j];
        }
    }

    let total_waste = (0..n)
        .map(|j| job.waste_scaled[j] as f64 / SCALE * bars_per_pattern[j] as f64)
        .sum();

    DistributionPlan {
        allocations,
        bars_per_pattern,
        produced,
        total_waste,
        total_bundles,
        quality: solved.quality,
    }
}
