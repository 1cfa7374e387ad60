use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;

use chrono::{DateTime, Utc};
use log::{debug, info};
use snafu::prelude::*;

use crate::config::*;
use crate::validation::{check_option_ids, validate_allocation};

/// Supplies the data needed to compute the results of an event.
///
/// Implementations are read-only from the point of view of the results computation.
pub trait EventStore {
    fn event(&self, event_id: &str) -> Result<Event, VotingErrors>;
    /// The options of the event, in display order.
    fn options(&self, event_id: &str) -> Result<Vec<VoteOption>, VotingErrors>;
    /// The live votes of the event: at most one per identity.
    fn votes(&self, event_id: &str) -> Result<Vec<Vote>, VotingErrors>;
}

struct StoredEvent {
    event: Event,
    options: Vec<VoteOption>,
    // Keyed by identity: a new submission replaces the previous one.
    votes: BTreeMap<String, Vote>,
}

/// An in-memory event store.
///
/// ```
/// use quadratic_voting::*;
/// # use chrono::{TimeZone, Utc};
/// # let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
/// # let end = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
/// let mut store = MemoryStore::new();
/// let event = Event {
///     id: "budget".to_string(),
///     title: "Budget 2026".to_string(),
///     start_time: start,
///     end_time: end,
///     credits_per_voter: 100,
///     decision_framework: FrameworkSettings {
///         framework_type: "binary_selection".to_string(),
///         config: FrameworkConfigSettings {
///             threshold_mode: Some("above_average".to_string()),
///             ..Default::default()
///         },
///     },
/// };
/// let options = vec![VoteOption {
///     id: "park".to_string(),
///     title: "New park".to_string(),
///     position: 0,
///     created_at: None,
/// }];
/// store.add_event(event, options)?;
///
/// let allocation: RawAllocation = [("park".to_string(), 49.0)].into_iter().collect();
/// store.submit_vote("budget", "invite-1", &allocation, start)?;
///
/// let results = compute_event_results(&store, "budget", end)?;
/// assert_eq!(results.participation.voter_count, 1);
/// # Ok::<(), VotingErrors>(())
/// ```
#[derive(Default)]
pub struct MemoryStore {
    events: HashMap<String, StoredEvent>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            events: HashMap::new(),
        }
    }

    /// Registers an event with its options. The decision framework and the uniqueness of
    /// the option ids are checked here, so that a misconfigured event is never accepted.
    ///
    /// Registering an event with an existing id replaces it, and drops its votes.
    pub fn add_event(&mut self, event: Event, options: Vec<VoteOption>) -> Result<(), VotingErrors> {
        let framework = DecisionFramework::try_from(&event.decision_framework)?;
        check_option_ids(&event.id, &options)?;
        info!(
            "add_event: {:?} ({} options, framework: {:?})",
            event.id,
            options.len(),
            framework
        );
        self.events.insert(
            event.id.clone(),
            StoredEvent {
                event,
                options,
                votes: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Validates an allocation and stores it as the vote of this identity,
    /// replacing any previous vote.
    ///
    /// If the validation fails, the previous vote is left untouched.
    pub fn submit_vote(
        &mut self,
        event_id: &str,
        identity: &str,
        allocation: &RawAllocation,
        submitted_at: DateTime<Utc>,
    ) -> Result<Vote, VotingErrors> {
        let stored = self
            .events
            .get_mut(event_id)
            .context(EventNotFoundSnafu { event_id })?;
        let checked = validate_allocation(&stored.event, &stored.options, allocation, submitted_at)?;
        let vote = Vote::new(identity, checked);
        let previous = stored.votes.insert(identity.to_string(), vote.clone());
        debug!(
            "submit_vote: event {:?} identity {:?}: {} credits (replaced previous vote: {})",
            event_id,
            identity,
            vote.total_credits_used,
            previous.is_some()
        );
        Ok(vote)
    }
}

impl EventStore for MemoryStore {
    fn event(&self, event_id: &str) -> Result<Event, VotingErrors> {
        self.events
            .get(event_id)
            .map(|s| s.event.clone())
            .context(EventNotFoundSnafu { event_id })
    }

    fn options(&self, event_id: &str) -> Result<Vec<VoteOption>, VotingErrors> {
        self.events
            .get(event_id)
            .map(|s| s.options.clone())
            .context(EventNotFoundSnafu { event_id })
    }

    fn votes(&self, event_id: &str) -> Result<Vec<Vote>, VotingErrors> {
        self.events
            .get(event_id)
            .map(|s| s.votes.values().cloned().collect())
            .context(EventNotFoundSnafu { event_id })
    }
}

/// A stable voter identity for public events, where voters do not have an invite code.
///
/// The fingerprint is whatever the caller uses to recognize a returning voter.
pub fn anonymous_identity(event_id: &str, fingerprint: &str) -> String {
    let digest = sha256::digest(format!("{}:{}", event_id, fingerprint));
    format!("anon-{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> Event {
        Event {
            id: "e1".to_string(),
            title: "".to_string(),
            start_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap(),
            credits_per_voter: 100,
            decision_framework: FrameworkSettings {
                framework_type: "binary_selection".to_string(),
                config: FrameworkConfigSettings {
                    threshold_mode: Some("top_n".to_string()),
                    top_n_count: Some(1.0),
                    ..Default::default()
                },
            },
        }
    }

    fn options() -> Vec<VoteOption> {
        vec![VoteOption {
            id: "A".to_string(),
            title: "A".to_string(),
            position: 0,
            created_at: None,
        }]
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap()
    }

    fn alloc(credits: f64) -> RawAllocation {
        [("A".to_string(), credits)].into_iter().collect()
    }

    #[test]
    fn resubmission_replaces() {
        let mut store = MemoryStore::new();
        store.add_event(event(), options()).unwrap();
        store.submit_vote("e1", "code1", &alloc(10.0), at()).unwrap();
        store.submit_vote("e1", "code1", &alloc(25.0), at()).unwrap();
        let votes = store.votes("e1").unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].total_credits_used, 25);
    }

    #[test]
    fn rejected_submission_keeps_previous_vote() {
        let mut store = MemoryStore::new();
        store.add_event(event(), options()).unwrap();
        store.submit_vote("e1", "code1", &alloc(10.0), at()).unwrap();
        let res = store.submit_vote("e1", "code1", &alloc(150.0), at());
        assert!(matches!(res, Err(VotingErrors::CreditLimitExceeded { .. })));
        let votes = store.votes("e1").unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].allocations.get("A"), Some(&10));
    }

    #[test]
    fn misconfigured_event_is_rejected() {
        let mut store = MemoryStore::new();
        let mut e = event();
        e.decision_framework.config.top_n_count = None;
        assert!(matches!(
            store.add_event(e, options()),
            Err(VotingErrors::Config { .. })
        ));
        assert!(matches!(
            store.event("e1"),
            Err(VotingErrors::EventNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_option_ids_are_rejected() {
        let mut store = MemoryStore::new();
        let mut opts = options();
        opts.push(opts[0].clone());
        assert!(matches!(
            store.add_event(event(), opts),
            Err(VotingErrors::Config { .. })
        ));
        assert!(store.event("e1").is_err());
    }

    #[test]
    fn unknown_event() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.submit_vote("nope", "code1", &alloc(1.0), at()),
            Err(VotingErrors::EventNotFound {
                event_id: "nope".to_string()
            })
        );
        assert!(store.options("nope").is_err());
        assert!(store.votes("nope").is_err());
    }

    #[test]
    fn anonymous_identities_are_stable() {
        let a1 = anonymous_identity("e1", "device-1");
        assert_eq!(a1, anonymous_identity("e1", "device-1"));
        assert_ne!(a1, anonymous_identity("e2", "device-1"));
        assert_ne!(a1, anonymous_identity("e1", "device-2"));
        assert!(a1.starts_with("anon-"));
        assert_eq!(a1.len(), 21);
    }
}
