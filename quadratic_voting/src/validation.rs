use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::debug;
use snafu::prelude::*;

use crate::config::*;

/// Checks a submitted allocation against an event before it is stored.
///
/// The checks run in this order: voting window, option membership, credit values,
/// and finally the credit budget. The returned allocation holds the same values as
/// integers and can be stored and aggregated as is.
///
/// Arguments:
/// * `event` the event the vote is submitted to
/// * `options` the options of this event
/// * `allocation` the raw allocation, straight from the voter
/// * `submitted_at` the instant the vote was submitted
pub fn validate_allocation(
    event: &Event,
    options: &[VoteOption],
    allocation: &RawAllocation,
    submitted_at: DateTime<Utc>,
) -> Result<Allocation, VotingErrors> {
    ensure!(
        event.is_open_at(submitted_at),
        VotingClosedSnafu {
            event_id: event.id.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            at: submitted_at,
        }
    );

    let valid_ids: HashSet<&str> = options.iter().map(|o| o.id.as_str()).collect();

    let mut res = Allocation::new();
    for (option_id, &value) in allocation.iter() {
        ensure!(
            valid_ids.contains(option_id.as_str()),
            InvalidOptionSnafu {
                event_id: event.id.clone(),
                option_id: option_id.clone(),
            }
        );
        ensure!(
            value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64,
            InvalidCreditValueSnafu {
                option_id: option_id.clone(),
                value,
            }
        );
        res.insert(option_id.clone(), value as u64);
    }

    let used = res
        .values()
        .try_fold(0u64, |acc, c| acc.checked_add(*c))
        .unwrap_or(u64::MAX);
    ensure!(
        used <= event.credits_per_voter,
        CreditLimitExceededSnafu {
            used,
            budget: event.credits_per_voter,
        }
    );

    debug!(
        "validate_allocation: event {:?}: accepted allocation using {} of {} credits",
        event.id, used, event.credits_per_voter
    );
    Ok(res)
}

/// Checks that the option ids of an event are unique.
pub(crate) fn check_option_ids(event_id: &str, options: &[VoteOption]) -> Result<(), VotingErrors> {
    let mut seen: HashSet<&str> = HashSet::new();
    for opt in options.iter() {
        ensure!(
            seen.insert(opt.id.as_str()),
            ConfigSnafu {
                message: format!("option {:?} appears twice in event {:?}", opt.id, event_id)
            }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> Event {
        Event {
            id: "e1".to_string(),
            title: "Test event".to_string(),
            start_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap(),
            credits_per_voter: 100,
            decision_framework: FrameworkSettings {
                framework_type: "binary_selection".to_string(),
                config: FrameworkConfigSettings {
                    threshold_mode: Some("above_average".to_string()),
                    ..Default::default()
                },
            },
        }
    }

    fn options() -> Vec<VoteOption> {
        ["opt1", "opt2"]
            .iter()
            .enumerate()
            .map(|(idx, id)| VoteOption {
                id: id.to_string(),
                title: id.to_string(),
                position: idx as u32,
                created_at: None,
            })
            .collect()
    }

    fn during() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn alloc(entries: &[(&str, f64)]) -> RawAllocation {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn accepts_valid_allocation() {
        let res = validate_allocation(
            &event(),
            &options(),
            &alloc(&[("opt1", 64.0), ("opt2", 36.0)]),
            during(),
        );
        let expected: Allocation = [("opt1".to_string(), 64), ("opt2".to_string(), 36)]
            .into_iter()
            .collect();
        assert_eq!(res, Ok(expected));
    }

    #[test]
    fn accepts_empty_and_zero_allocations() {
        assert_eq!(
            validate_allocation(&event(), &options(), &alloc(&[]), during()),
            Ok(Allocation::new())
        );
        let res = validate_allocation(&event(), &options(), &alloc(&[("opt1", 0.0)]), during());
        assert_eq!(res.map(|a| a.get("opt1").cloned()), Ok(Some(0)));
    }

    #[test]
    fn rejects_unknown_option() {
        let res = validate_allocation(&event(), &options(), &alloc(&[("optionX", 5.0)]), during());
        assert_eq!(
            res,
            Err(VotingErrors::InvalidOption {
                event_id: "e1".to_string(),
                option_id: "optionX".to_string()
            })
        );
    }

    #[test]
    fn rejects_negative_or_fractional_credits() {
        let res = validate_allocation(&event(), &options(), &alloc(&[("opt1", -1.0)]), during());
        assert!(matches!(res, Err(VotingErrors::InvalidCreditValue { .. })));
        let res = validate_allocation(&event(), &options(), &alloc(&[("opt1", 2.5)]), during());
        assert!(matches!(res, Err(VotingErrors::InvalidCreditValue { .. })));
        let res = validate_allocation(
            &event(),
            &options(),
            &alloc(&[("opt1", f64::NAN)]),
            during(),
        );
        assert!(matches!(res, Err(VotingErrors::InvalidCreditValue { .. })));
    }

    #[test]
    fn rejects_over_budget() {
        let res = validate_allocation(
            &event(),
            &options(),
            &alloc(&[("opt1", 100.0), ("opt2", 50.0)]),
            during(),
        );
        assert_eq!(
            res,
            Err(VotingErrors::CreditLimitExceeded {
                used: 150,
                budget: 100
            })
        );
    }

    #[test]
    fn budget_is_inclusive() {
        let res = validate_allocation(&event(), &options(), &alloc(&[("opt1", 100.0)]), during());
        assert!(res.is_ok());
    }

    #[test]
    fn rejects_outside_window() {
        let before = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 1).unwrap();
        for at in [before, after] {
            let res = validate_allocation(&event(), &options(), &alloc(&[("opt1", 1.0)]), at);
            assert!(matches!(res, Err(VotingErrors::VotingClosed { .. })));
        }
        // The window check comes first, even for invalid allocations.
        let res = validate_allocation(&event(), &options(), &alloc(&[("optionX", -3.0)]), after);
        assert!(matches!(res, Err(VotingErrors::VotingClosed { .. })));
    }
}
