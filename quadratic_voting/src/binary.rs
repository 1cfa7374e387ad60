use std::cmp::Ordering;
use std::collections::HashMap;

use log::debug;

use crate::config::*;

// Relative tolerance when comparing vote totals with a computed cutoff. Totals are sums of
// square roots, so a mean or a percentage of equal totals can land a few ulps above them.
const CUTOFF_TOLERANCE: f64 = 1e-9;

/// Ranks the options by aggregated votes and splits them into selected and
/// not selected options.
///
/// Arguments:
/// * `config` the binary selection rules of the event
/// * `tally` the aggregated votes. Options missing from the tally have zero votes.
/// * `options` the options of the event, in display order
pub fn resolve_binary_selection(
    config: &BinaryDecisionConfig,
    tally: &HashMap<String, f64>,
    options: &[VoteOption],
) -> BinaryResults {
    let sorted = rank_options(tally, options, config.tiebreak);
    let totals: Vec<f64> = sorted.iter().map(|(_, votes)| *votes).collect();

    let selected_flags: Vec<bool> = match config.threshold {
        ThresholdMode::TopN(n) => (0..totals.len()).map(|idx| idx < n as usize).collect(),
        ThresholdMode::Percentage(pct) => {
            let max_votes = totals.iter().cloned().fold(0.0, f64::max);
            let cutoff = pct / 100.0 * max_votes;
            debug!(
                "resolve_binary_selection: percentage cutoff: {} ({}% of {})",
                cutoff, pct, max_votes
            );
            totals.iter().map(|v| meets_cutoff(*v, cutoff)).collect()
        }
        ThresholdMode::AbsoluteVotes(cutoff) => {
            totals.iter().map(|v| meets_cutoff(*v, cutoff)).collect()
        }
        ThresholdMode::AboveAverage => {
            let mean = if totals.is_empty() {
                0.0
            } else {
                totals.iter().sum::<f64>() / totals.len() as f64
            };
            debug!("resolve_binary_selection: average cutoff: {}", mean);
            totals.iter().map(|v| meets_cutoff(*v, mean)).collect()
        }
    };

    let mut selected_options: Vec<RankedOption> = Vec::new();
    let mut not_selected_options: Vec<RankedOption> = Vec::new();
    for (idx, ((opt, votes), selected)) in sorted.iter().zip(selected_flags).enumerate() {
        let ro = RankedOption {
            option_id: opt.id.clone(),
            title: opt.title.clone(),
            votes: *votes,
            rank: (idx + 1) as u32,
            selected,
        };
        if selected {
            selected_options.push(ro);
        } else {
            not_selected_options.push(ro);
        }
    }

    let selection_margin = match (
        config.threshold,
        selected_options.last(),
        not_selected_options.first(),
    ) {
        (ThresholdMode::TopN(_), Some(last_in), Some(first_out)) => {
            Some(last_in.votes - first_out.votes)
        }
        _ => None,
    };

    BinaryResults {
        threshold_mode: config.threshold,
        selected_count: selected_options.len(),
        selected_options,
        not_selected_options,
        selection_margin,
    }
}

fn meets_cutoff(votes: f64, cutoff: f64) -> bool {
    votes >= cutoff - CUTOFF_TOLERANCE * cutoff.abs().max(1.0)
}

/// Sorts the options by decreasing vote total. Ties are resolved with the tiebreak mode.
fn rank_options<'a>(
    tally: &HashMap<String, f64>,
    options: &'a [VoteOption],
    tiebreak: TieBreakMode,
) -> Vec<(&'a VoteOption, f64)> {
    let mut res: Vec<(&VoteOption, f64)> = options
        .iter()
        .map(|opt| (opt, tally.get(&opt.id).cloned().unwrap_or(0.0)))
        .collect();

    // Only computed for the random mode.
    let permutation_keys: HashMap<&str, String> = match tiebreak {
        TieBreakMode::Random(seed) => options
            .iter()
            .map(|opt| (opt.id.as_str(), permutation_key(seed, &opt.id)))
            .collect(),
        _ => HashMap::new(),
    };

    res.sort_by(|(o1, v1), (o2, v2)| {
        v2.total_cmp(v1).then_with(|| match tiebreak {
            TieBreakMode::Alphabetical => o1.title.cmp(&o2.title).then_with(|| o1.id.cmp(&o2.id)),
            TieBreakMode::Timestamp => creation_order(o1, o2),
            TieBreakMode::Random(_) => permutation_keys
                .get(o1.id.as_str())
                .cmp(&permutation_keys.get(o2.id.as_str()))
                .then_with(|| o1.id.cmp(&o2.id)),
        })
    });
    debug!(
        "rank_options: {:?}",
        res.iter()
            .map(|(o, v)| (o.id.as_str(), *v))
            .collect::<Vec<(&str, f64)>>()
    );
    res
}

// Options with a creation time come first, oldest first.
fn creation_order(o1: &VoteOption, o2: &VoteOption) -> Ordering {
    let by_time = match (o1.created_at, o2.created_at) {
        (Some(t1), Some(t2)) => t1.cmp(&t2),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_time
        .then_with(|| o1.position.cmp(&o2.position))
        .then_with(|| o1.id.cmp(&o2.id))
}

/// Generates a "random" sort key for an option. Random in this context means hard to guess in advance,
/// but always the same for a given seed.
fn permutation_key(seed: u32, option_id: &str) -> String {
    sha256::digest(format!("{:08}{}", seed, option_id))
}
