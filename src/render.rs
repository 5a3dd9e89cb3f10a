use std::fmt::Write;

use crate::types::{CuttingSpec, DistributionPlan, Pattern, SolveQuality};

/// Human-readable composition of a pattern, e.g. `2xA + 2xB`.
pub fn describe_pattern(spec: &CuttingSpec, pattern: &Pattern) -> String {
    let mut parts = Vec::new();
    for (count, piece) in pattern.counts.iter().zip(&spec.pieces) {
        if *count > 0 {
            parts.push(format!("{count}x{}", piece.name));
        }
    }
    parts.join(" + ")
}

/// Plain-text summary of a distribution plan: one line per cut pattern,
/// then production and objective totals.
pub fn render_plan(spec: &CuttingSpec, patterns: &[Pattern], plan: &DistributionPlan) -> String {
    let mut out = String::new();

    writeln!(
        out,
        "{:<40} {:>10} {:>8} {:>6}  Bundles",
        "Pattern", "Used", "Waste", "Bars"
    )
    .unwrap();
    for (j, &bars) in plan.bars_per_pattern.iter().enumerate() {
        if bars == 0 {
            continue;
        }
        let pattern = &patterns[j];
        let bundles: Vec<String> = plan
            .allocations
            .iter()
            .filter(|a| a.pattern == j)
            .map(|a| format!("{}x(f{})", a.bundles, a.factor))
            .collect();
        writeln!(
            out,
            "{:<40} {:>10.1} {:>8.1} {:>6}  {}",
            describe_pattern(spec, pattern),
            pattern.used_length,
            pattern.waste(spec.stock_length),
            bars,
            bundles.join(" ")
        )
        .unwrap();
    }

    writeln!(out).unwrap();
    for (i, piece) in spec.pieces.iter().enumerate() {
        let surplus = plan.produced[i] - piece.demand;
        writeln!(
            out,
            "{:<10} demanded {:>6}, produced {:>6} (+{})",
            piece.name, piece.demand, plan.produced[i], surplus
        )
        .unwrap();
    }

    let quality = match plan.quality {
        SolveQuality::Optimal => "optimal",
        SolveQuality::Feasible => "feasible",
    };
    writeln!(
        out,
        "\nTotals: {} bars, {} bundles, waste {:.1} ({quality})",
        plan.total_bars(),
        plan.total_bundles,
        plan.total_waste
    )
    .unwrap();

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BundleAllocation, PieceDef};

    fn sample() -> (CuttingSpec, Vec<Pattern>, DistributionPlan) {
        let spec = CuttingSpec {
            stock_length: 6000.0,
            blade_width: 4.0,
            trim_allowance: 0.0,
            pieces: vec![
                PieceDef {
                    name: "A".to_string(),
                    length: 1196.0,
                    demand: 10,
                },
                PieceDef {
                    name: "B".to_string(),
                    length: 1796.0,
                    demand: 5,
                },
            ],
            bundle_factors: vec![1, 2, 3],
            manual_cut_cap: 10,
            max_surplus: 2,
            time_budget_secs: 30,
        };
        let patterns = vec![
            Pattern {
                counts: vec![2, 2],
                used_length: 6000.0,
            },
            Pattern {
                counts: vec![5, 0],
                used_length: 6000.0,
            },
        ];
        let plan = DistributionPlan {
            allocations: vec![
                BundleAllocation {
                    pattern: 0,
                    factor: 3,
                    bundles: 1,
                },
                BundleAllocation {
                    pattern: 1,
                    factor: 2,
                    bundles: 1,
                },
            ],
            bars_per_pattern: vec![3, 2],
            produced: vec![16, 6],
            total_waste: 0.0,
            total_bundles: 2,
            quality: SolveQuality::Optimal,
        };
        (spec, patterns, plan)
    }

    #[test]
    fn test_describe_pattern_skips_zero_counts() {
        let (spec, patterns, _) = sample();
        assert_eq!(describe_pattern(&spec, &patterns[0]), "2xA + 2xB");
        assert_eq!(describe_pattern(&spec, &patterns[1]), "5xA");
    }

    #[test]
    fn test_render_plan_lists_patterns_and_totals() {
        let (spec, patterns, plan) = sample();
        let text = render_plan(&spec, &patterns, &plan);
        assert!(text.contains("2xA + 2xB"));
        assert!(text.contains("1x(f3)"));
        assert!(text.contains("5 bars"));
        assert!(text.contains("2 bundles"));
        assert!(text.contains("optimal"));
    }

    #[test]
    fn test_render_plan_marks_feasible_results() {
        let (spec, patterns, mut plan) = sample();
        plan.quality = SolveQuality::Feasible;
        let text = render_plan(&spec, &patterns, &plan);
        assert!(text.contains("feasible"));
    }
}
