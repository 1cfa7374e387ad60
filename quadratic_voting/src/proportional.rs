use std::collections::HashMap;

use log::{debug, info};

use crate::config::*;

/// Splits the resource pool between the options, in proportion of their aggregated votes.
///
/// When a minimum allocation is configured, every option that received votes gets at least
/// this floor. If the floors push the total above the pool, all the allocations are scaled
/// down by the same factor. With a large floor and many options receiving votes, this can
/// end up in an almost uniform distribution of small amounts. This is the expected outcome.
///
/// Arguments:
/// * `config` the distribution rules of the event
/// * `tally` the aggregated votes. Options missing from the tally have zero votes.
/// * `options` the options of the event, in display order
pub fn resolve_proportional_distribution(
    config: &ProportionalDistributionConfig,
    tally: &HashMap<String, f64>,
    options: &[VoteOption],
) -> ProportionalResults {
    let pool = config.total_pool_amount;
    let mut distributions: Vec<Distribution> = options
        .iter()
        .map(|opt| Distribution {
            option_id: opt.id.clone(),
            title: opt.title.clone(),
            votes: tally.get(&opt.id).cloned().unwrap_or(0.0),
            allocation_amount: 0.0,
            allocation_percentage: 0.0,
        })
        .collect();

    let total_votes: f64 = distributions.iter().map(|d| d.votes).sum();
    if total_votes <= 0.0 {
        info!("resolve_proportional_distribution: no votes, nothing to distribute");
        return ProportionalResults {
            resource_name: config.resource_name.clone(),
            resource_symbol: config.resource_symbol.clone(),
            total_pool: pool,
            distributions,
            total_allocated: 0.0,
            gini_coefficient: 0.0,
            decimal_places: config.decimal_places,
        };
    }

    for d in distributions.iter_mut() {
        let share = d.votes / total_votes;
        d.allocation_amount = share * pool;
        d.allocation_percentage = share * 100.0;
    }

    if let Some(min_pct) = config.minimum_allocation_percentage {
        let min_allocation = min_pct / 100.0 * pool;
        for d in distributions.iter_mut() {
            if d.votes > 0.0 && d.allocation_amount < min_allocation {
                debug!(
                    "resolve_proportional_distribution: raising {:?} from {} to the minimum {}",
                    d.option_id, d.allocation_amount, min_allocation
                );
                d.allocation_amount = min_allocation;
            }
        }

        let floored_total: f64 = distributions.iter().map(|d| d.allocation_amount).sum();
        if floored_total > pool {
            let factor = pool / floored_total;
            debug!(
                "resolve_proportional_distribution: total {} exceeds the pool {}, scaling by {}",
                floored_total, pool, factor
            );
            for d in distributions.iter_mut() {
                d.allocation_amount *= factor;
            }
        }
        for d in distributions.iter_mut() {
            d.allocation_percentage = d.allocation_amount / pool * 100.0;
        }
    }

    // Stable sort: options with the same amount stay in display order.
    distributions.sort_by(|d1, d2| d2.allocation_amount.total_cmp(&d1.allocation_amount));

    let amounts: Vec<f64> = distributions.iter().map(|d| d.allocation_amount).collect();
    let total_allocated: f64 = amounts.iter().sum();
    let gini_coefficient = gini(&amounts);
    info!(
        "resolve_proportional_distribution: allocated {} of {} {}, gini coefficient: {}",
        total_allocated, pool, config.resource_name, gini_coefficient
    );

    ProportionalResults {
        resource_name: config.resource_name.clone(),
        resource_symbol: config.resource_symbol.clone(),
        total_pool: pool,
        distributions,
        total_allocated,
        gini_coefficient,
        decimal_places: config.decimal_places,
    }
}

/// The Gini coefficient of a set of non-negative values.
///
/// 0 means a perfectly equal distribution. A single non-zero value among n gives (n-1)/n.
/// Empty or all-zero sets have a coefficient of 0.
pub fn gini(values: &[f64]) -> f64 {
    let n = values.len();
    let total: f64 = values.iter().sum();
    if n == 0 || total <= 0.0 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(idx, v)| (idx + 1) as f64 * v)
        .sum();
    let nf = n as f64;
    let g = (2.0 * weighted) / (nf * total) - (nf + 1.0) / nf;
    g.max(0.0)
}

impl ProportionalResults {
    /// A copy of these results with the amounts and percentages rounded to the configured
    /// number of decimal places, for display.
    pub fn rounded(&self) -> ProportionalResults {
        let places = self.decimal_places;
        ProportionalResults {
            distributions: self
                .distributions
                .iter()
                .map(|d| Distribution {
                    allocation_amount: round_to(d.allocation_amount, places),
                    allocation_percentage: round_to(d.allocation_percentage, places),
                    ..d.clone()
                })
                .collect(),
            total_allocated: round_to(self.total_allocated, places),
            ..self.clone()
        }
    }
}

/// Rounds half away from zero.
///
/// Values are returned unchanged beyond `MAX_DECIMAL_PLACES`, where there is nothing left to round.
pub fn round_to(value: f64, places: u32) -> f64 {
    if places > ProportionalDistributionConfig::MAX_DECIMAL_PLACES {
        return value;
    }
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn opts(ids: &[&str]) -> Vec<VoteOption> {
        ids.iter()
            .enumerate()
            .map(|(idx, id)| VoteOption {
                id: id.to_string(),
                title: id.to_string(),
                position: idx as u32,
                created_at: None,
            })
            .collect()
    }

    fn tally(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn cfg(pool: f64, minimum: Option<f64>) -> ProportionalDistributionConfig {
        ProportionalDistributionConfig {
            resource_name: "Budget".to_string(),
            resource_symbol: "$".to_string(),
            total_pool_amount: pool,
            minimum_allocation_percentage: minimum,
            decimal_places: 2,
        }
    }

    fn amount(res: &ProportionalResults, id: &str) -> f64 {
        res.distributions
            .iter()
            .find(|d| d.option_id == id)
            .map(|d| d.allocation_amount)
            .unwrap()
    }

    #[test]
    fn even_split() {
        let res = resolve_proportional_distribution(
            &cfg(1000.0, None),
            &tally(&[("A", 10.0), ("B", 10.0)]),
            &opts(&["A", "B"]),
        );
        for d in res.distributions.iter() {
            assert!((d.allocation_amount - 500.0).abs() < EPS);
            assert!((d.allocation_percentage - 50.0).abs() < EPS);
        }
        assert!((res.total_allocated - 1000.0).abs() < EPS);
        assert!(res.gini_coefficient.abs() < EPS);
        assert_eq!(res.resource_name, "Budget");
        assert_eq!(res.total_pool, 1000.0);
    }

    #[test]
    fn proportional_split_is_sorted() {
        let res = resolve_proportional_distribution(
            &cfg(900.0, None),
            &tally(&[("A", 1.0), ("B", 2.0)]),
            &opts(&["A", "B", "C"]),
        );
        let order: Vec<&str> = res
            .distributions
            .iter()
            .map(|d| d.option_id.as_str())
            .collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        assert!((amount(&res, "B") - 600.0).abs() < EPS);
        assert!((amount(&res, "A") - 300.0).abs() < EPS);
        assert_eq!(amount(&res, "C"), 0.0);
    }

    #[test]
    fn zero_votes() {
        let res = resolve_proportional_distribution(
            &cfg(1000.0, Some(10.0)),
            &tally(&[]),
            &opts(&["A", "B", "C"]),
        );
        assert_eq!(res.distributions.len(), 3);
        for d in res.distributions.iter() {
            assert_eq!(d.votes, 0.0);
            assert_eq!(d.allocation_amount, 0.0);
            assert_eq!(d.allocation_percentage, 0.0);
        }
        assert_eq!(res.total_allocated, 0.0);
        assert_eq!(res.gini_coefficient, 0.0);
    }

    #[test]
    fn minimum_floor_then_renormalize() {
        // Without the floor: A = 950, B = 50. The floor raises B to 100,
        // then everything is scaled by 1000 / 1050.
        let res = resolve_proportional_distribution(
            &cfg(1000.0, Some(10.0)),
            &tally(&[("A", 19.0), ("B", 1.0)]),
            &opts(&["A", "B", "C"]),
        );
        let factor = 1000.0 / 1050.0;
        assert!((amount(&res, "A") - 950.0 * factor).abs() < EPS);
        assert!((amount(&res, "B") - 100.0 * factor).abs() < EPS);
        // No votes, no floor.
        assert_eq!(amount(&res, "C"), 0.0);
        assert!(res.total_allocated <= 1000.0 + EPS);
        let pct_sum: f64 = res.distributions.iter().map(|d| d.allocation_percentage).sum();
        assert!((pct_sum - 100.0).abs() < 1e-6);
    }

    #[test]
    fn floor_not_needed() {
        let res = resolve_proportional_distribution(
            &cfg(1000.0, Some(10.0)),
            &tally(&[("A", 6.0), ("B", 4.0)]),
            &opts(&["A", "B"]),
        );
        assert!((amount(&res, "A") - 600.0).abs() < EPS);
        assert!((amount(&res, "B") - 400.0).abs() < EPS);
    }

    #[test]
    fn pathological_floor_stays_within_pool() {
        // 5 options with votes and a 40% floor: B to E are raised to 400 each,
        // which is far above the pool before scaling.
        let options = opts(&["A", "B", "C", "D", "E"]);
        let t = tally(&[("A", 100.0), ("B", 1.0), ("C", 1.0), ("D", 1.0), ("E", 1.0)]);
        let res = resolve_proportional_distribution(&cfg(1000.0, Some(40.0)), &t, &options);
        assert!((res.total_allocated - 1000.0).abs() < 1e-6);
        let a = 100.0 / 104.0 * 1000.0;
        let factor = 1000.0 / (a + 4.0 * 400.0);
        assert!((amount(&res, "A") - a * factor).abs() < 1e-6);
        for id in ["B", "C", "D", "E"] {
            assert!((amount(&res, id) - 400.0 * factor).abs() < 1e-6);
        }
        assert_eq!(res.distributions[0].option_id, "A");
    }

    #[test]
    fn sum_within_pool_for_various_floors() {
        let options = opts(&["A", "B", "C", "D"]);
        let t = tally(&[("A", 30.0), ("B", 3.0), ("C", 1.0), ("D", 0.5)]);
        for floor in [1.0, 5.0, 10.0, 25.0, 50.0, 100.0] {
            let res = resolve_proportional_distribution(&cfg(777.0, Some(floor)), &t, &options);
            assert!(res.total_allocated <= 777.0 + 1e-6, "floor {}", floor);
            assert!(res.gini_coefficient >= 0.0 && res.gini_coefficient <= 1.0);
        }
    }

    #[test]
    fn gini_bounds() {
        assert_eq!(gini(&[]), 0.0);
        assert_eq!(gini(&[0.0, 0.0]), 0.0);
        assert!(gini(&[5.0, 5.0, 5.0]).abs() < EPS);
        assert!((gini(&[0.0, 0.0, 0.0, 100.0]) - 0.75).abs() < EPS);
        assert!((gini(&[100.0, 0.0]) - 0.5).abs() < EPS);
        let g = gini(&[1.0, 2.0, 3.0, 10.0]);
        assert!(g > 0.0 && g < 1.0);
        // G = 2 * (1 + 4 + 9 + 40) / (4 * 16) - 5 / 4
        assert!((g - (108.0 / 64.0 - 1.25)).abs() < EPS);
    }

    #[test]
    fn single_winner_gini() {
        let res = resolve_proportional_distribution(
            &cfg(1000.0, None),
            &tally(&[("A", 7.0)]),
            &opts(&["A", "B", "C"]),
        );
        assert!((amount(&res, "A") - 1000.0).abs() < EPS);
        assert!((res.gini_coefficient - 2.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn rounding() {
        let res = resolve_proportional_distribution(
            &cfg(1000.0, None),
            &tally(&[("A", 1.0), ("B", 1.0), ("C", 1.0)]),
            &opts(&["A", "B", "C"]),
        )
        .rounded();
        for d in res.distributions.iter() {
            assert_eq!(d.allocation_amount, 333.33);
            assert_eq!(d.allocation_percentage, 33.33);
        }
        assert_eq!(res.total_allocated, 1000.0);
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(1.23456, 3), 1.235);
    }

    #[test]
    fn rounding_never_produces_nan() {
        assert_eq!(round_to(500.0, 15), 500.0);
        assert_eq!(round_to(500.0, 400), 500.0);
        assert_eq!(round_to(500.0, u32::MAX), 500.0);
        assert!(round_to(1.0 / 3.0, 15).is_finite());
    }
}
