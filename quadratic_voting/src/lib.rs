mod binary;
mod config;
pub mod manual;
mod proportional;
mod store;
mod validation;

use log::{debug, info};

use std::collections::HashMap;
use std::convert::TryFrom;

use chrono::{DateTime, Utc};

pub use crate::binary::resolve_binary_selection;
pub use crate::config::*;
pub use crate::proportional::{gini, resolve_proportional_distribution, round_to};
pub use crate::store::{anonymous_identity, EventStore, MemoryStore};
pub use crate::validation::validate_allocation;
use crate::validation::check_option_ids;

/// Converts the credits of one allocation into votes: each option receives the
/// square root of the credits spent on it.
///
/// Options with zero credits are left out.
pub fn quadratic_votes(allocation: &Allocation) -> HashMap<String, f64> {
    allocation
        .iter()
        .filter(|(_, credits)| **credits > 0)
        .map(|(option_id, credits)| (option_id.clone(), (*credits as f64).sqrt()))
        .collect()
}

/// Sums the quadratic votes of all the voters, per option.
///
/// Options without any vote are absent from the tally.
pub fn aggregate_votes(votes: &[Vote]) -> HashMap<String, f64> {
    let mut tally: HashMap<String, f64> = HashMap::new();
    for v in votes.iter() {
        for (option_id, weight) in quadratic_votes(&v.allocations) {
            *tally.entry(option_id).or_insert(0.0) += weight;
        }
    }
    debug!("aggregate_votes: {} votes, tally: {:?}", votes.len(), tally);
    tally
}

/// Computes the results of an event from its configuration, options and votes.
///
/// Arguments:
/// * `event` the event, including its decision framework
/// * `options` the options of the event, in display order
/// * `votes` the live votes of the event
/// * `now` the instant of the computation, used to tell if the results are final
pub fn compute_results(
    event: &Event,
    options: &[VoteOption],
    votes: &[Vote],
    now: DateTime<Utc>,
) -> Result<EventResults, VotingErrors> {
    info!(
        "compute_results: event {:?}: {} options, {} votes",
        event.id,
        options.len(),
        votes.len()
    );
    let framework = DecisionFramework::try_from(&event.decision_framework)?;
    check_option_ids(&event.id, options)?;
    let tally = aggregate_votes(votes);

    let results = match framework {
        DecisionFramework::BinarySelection(ref c) => {
            FrameworkResults::BinarySelection(resolve_binary_selection(c, &tally, options))
        }
        DecisionFramework::ProportionalDistribution(ref c) => {
            FrameworkResults::ProportionalDistribution(resolve_proportional_distribution(
                c, &tally, options,
            ))
        }
    };

    let voter_count = votes.len();
    let total_credits_allocated: u64 = votes
        .iter()
        .try_fold(0u64, |acc, v| acc.checked_add(v.total_credits_used))
        .unwrap_or(u64::MAX);
    let distributed_credits = voter_count as f64 * event.credits_per_voter as f64;
    let credit_utilization = if distributed_credits > 0.0 {
        total_credits_allocated as f64 / distributed_credits
    } else {
        0.0
    };

    let participation = Participation {
        voter_count,
        total_credits_allocated,
        credits_per_voter: event.credits_per_voter,
        credit_utilization,
        start_time: event.start_time,
        end_time: event.end_time,
        is_final: now > event.end_time,
    };
    info!(
        "compute_results: event {:?}: {} voters, {} credits allocated, final: {}",
        event.id, voter_count, total_credits_allocated, participation.is_final
    );

    Ok(EventResults {
        event_id: event.id.clone(),
        results,
        participation,
    })
}

/// Loads an event from the store and computes its results.
///
/// This does not modify the store: calling it again without new votes returns the same results.
pub fn compute_event_results<S: EventStore>(
    store: &S,
    event_id: &str,
    now: DateTime<Utc>,
) -> Result<EventResults, VotingErrors> {
    let event = store.event(event_id)?;
    let options = store.options(event_id)?;
    let votes = store.votes(event_id)?;
    compute_results(&event, &options, &votes, now)
}
