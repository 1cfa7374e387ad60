// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::convert::TryFrom;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// A voter's validated allocation: option id to number of credits.
///
/// Produced by [crate::validate_allocation]. The raw, unvalidated form is
/// [RawAllocation].
pub type Allocation = BTreeMap<String, u64>;

/// An allocation as submitted, before validation. Values may be negative or fractional
/// at this stage, and the keys may not refer to options of the event.
pub type RawAllocation = BTreeMap<String, f64>;

/// An event, as supplied by the event store.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub credits_per_voter: u64,
    pub decision_framework: FrameworkSettings,
}

impl Event {
    /// True if votes are accepted at the given instant (both bounds included).
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at <= self.end_time
    }
}

/// An option that voters can allocate credits to.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOption {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The live vote of one identity (invite code or anonymous identifier) for an event.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Vote {
    pub identity: String,
    pub allocations: Allocation,
    pub total_credits_used: u64,
}

impl Vote {
    pub fn new(identity: &str, allocations: Allocation) -> Vote {
        let total_credits_used = allocations
            .values()
            .try_fold(0u64, |acc, c| acc.checked_add(*c))
            .unwrap_or(u64::MAX);
        Vote {
            identity: identity.to_string(),
            allocations,
            total_credits_used,
        }
    }
}

// ********* Configuration **********

// The decision framework, as it is stored next to an event.
// The shape is kept loose on purpose so that it can be read from any JSON
// producer. It is turned into a DecisionFramework before any computation.

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkSettings {
    pub framework_type: String,
    #[serde(default)]
    pub config: FrameworkConfigSettings,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkConfigSettings {
    // binary_selection
    pub threshold_mode: Option<String>,
    pub top_n_count: Option<f64>,
    pub percentage_threshold: Option<f64>,
    pub absolute_vote_threshold: Option<f64>,
    pub tiebreaker: Option<String>,
    pub random_seed: Option<u32>,
    // proportional_distribution
    pub resource_name: Option<String>,
    pub resource_symbol: Option<String>,
    pub total_pool_amount: Option<f64>,
    pub minimum_allocation_enabled: Option<bool>,
    pub minimum_allocation_percentage: Option<f64>,
    pub decimal_places: Option<u32>,
}

/// How the selected set is determined in a binary selection.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ThresholdMode {
    /// The first n options in rank order.
    TopN(u32),
    /// Options with at least this percentage of the highest vote total.
    Percentage(f64),
    /// Options with at least this many (quadratic) votes.
    AbsoluteVotes(f64),
    /// Options at or above the mean vote total.
    AboveAverage,
}

impl ThresholdMode {
    pub fn name(&self) -> &'static str {
        match self {
            ThresholdMode::TopN(_) => "top_n",
            ThresholdMode::Percentage(_) => "percentage",
            ThresholdMode::AbsoluteVotes(_) => "absolute_votes",
            ThresholdMode::AboveAverage => "above_average",
        }
    }
}

/// Secondary ordering of options with the same vote total.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieBreakMode {
    /// Earliest created option first.
    Timestamp,
    /// By title, then by id.
    Alphabetical,
    // The random mode is a seeded permutation: it uses a cryptographic hash of the
    // option ids, so that the same seed always yields the same order.
    Random(u32),
}

#[derive(PartialEq, Debug, Clone)]
pub struct BinaryDecisionConfig {
    pub threshold: ThresholdMode,
    pub tiebreak: TieBreakMode,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ProportionalDistributionConfig {
    pub resource_name: String,
    pub resource_symbol: String,
    pub total_pool_amount: f64,
    /// The floor, as a percentage of the pool, for options that received votes.
    pub minimum_allocation_percentage: Option<f64>,
    pub decimal_places: u32,
}

impl ProportionalDistributionConfig {
    pub const DEFAULT_DECIMAL_PLACES: u32 = 2;
    /// Beyond this, a f64 has no more significant digits to show.
    pub const MAX_DECIMAL_PLACES: u32 = 15;
}

#[derive(PartialEq, Debug, Clone)]
pub enum DecisionFramework {
    BinarySelection(BinaryDecisionConfig),
    ProportionalDistribution(ProportionalDistributionConfig),
}

impl DecisionFramework {
    pub fn framework_type(&self) -> &'static str {
        match self {
            DecisionFramework::BinarySelection(_) => "binary_selection",
            DecisionFramework::ProportionalDistribution(_) => "proportional_distribution",
        }
    }
}

impl TryFrom<&FrameworkSettings> for DecisionFramework {
    type Error = VotingErrors;

    fn try_from(settings: &FrameworkSettings) -> Result<DecisionFramework, VotingErrors> {
        let c = &settings.config;
        match settings.framework_type.as_str() {
            "binary_selection" => {
                let threshold = match c.threshold_mode.as_deref() {
                    Some("top_n") => {
                        let n = required(c.top_n_count, "top_n_count", "top_n")?;
                        ensure!(
                            n.fract() == 0.0 && n >= 1.0 && n <= u32::MAX as f64,
                            ConfigSnafu {
                                message: format!("top_n_count must be a positive integer, got {}", n)
                            }
                        );
                        ThresholdMode::TopN(n as u32)
                    }
                    Some("percentage") => {
                        let p = required(c.percentage_threshold, "percentage_threshold", "percentage")?;
                        ensure!(
                            p > 0.0 && p <= 100.0,
                            ConfigSnafu {
                                message: format!("percentage_threshold must be in (0, 100], got {}", p)
                            }
                        );
                        ThresholdMode::Percentage(p)
                    }
                    Some("absolute_votes") => {
                        let v = required(
                            c.absolute_vote_threshold,
                            "absolute_vote_threshold",
                            "absolute_votes",
                        )?;
                        ensure!(
                            v > 0.0,
                            ConfigSnafu {
                                message: format!("absolute_vote_threshold must be positive, got {}", v)
                            }
                        );
                        ThresholdMode::AbsoluteVotes(v)
                    }
                    Some("above_average") => ThresholdMode::AboveAverage,
                    Some(x) => return UnknownThresholdModeSnafu { mode: x }.fail(),
                    None => {
                        return ConfigSnafu {
                            message: "threshold_mode is required for binary_selection",
                        }
                        .fail()
                    }
                };
                let tiebreak = match c.tiebreaker.as_deref() {
                    None | Some("timestamp") => TieBreakMode::Timestamp,
                    Some("alphabetical") => TieBreakMode::Alphabetical,
                    Some("random") => TieBreakMode::Random(c.random_seed.unwrap_or(0)),
                    Some(x) => return UnknownTieBreakModeSnafu { mode: x }.fail(),
                };
                Ok(DecisionFramework::BinarySelection(BinaryDecisionConfig {
                    threshold,
                    tiebreak,
                }))
            }
            "proportional_distribution" => {
                let resource_name = match c.resource_name.as_deref() {
                    Some(name) if !name.trim().is_empty() => name.to_string(),
                    _ => {
                        return ConfigSnafu {
                            message: "resource_name is required for proportional_distribution",
                        }
                        .fail()
                    }
                };
                let pool = required(
                    c.total_pool_amount,
                    "total_pool_amount",
                    "proportional_distribution",
                )?;
                ensure!(
                    pool > 0.0 && pool.is_finite(),
                    ConfigSnafu {
                        message: format!("total_pool_amount must be positive, got {}", pool)
                    }
                );
                let minimum_allocation_percentage = if c.minimum_allocation_enabled.unwrap_or(false)
                {
                    let m = required(
                        c.minimum_allocation_percentage,
                        "minimum_allocation_percentage",
                        "minimum_allocation_enabled",
                    )?;
                    ensure!(
                        m > 0.0 && m <= 100.0,
                        ConfigSnafu {
                            message: format!(
                                "minimum_allocation_percentage must be in (0, 100], got {}",
                                m
                            )
                        }
                    );
                    Some(m)
                } else {
                    None
                };
                let decimal_places = c
                    .decimal_places
                    .unwrap_or(ProportionalDistributionConfig::DEFAULT_DECIMAL_PLACES);
                ensure!(
                    decimal_places <= ProportionalDistributionConfig::MAX_DECIMAL_PLACES,
                    ConfigSnafu {
                        message: format!(
                            "decimal_places must be at most {}, got {}",
                            ProportionalDistributionConfig::MAX_DECIMAL_PLACES,
                            decimal_places
                        )
                    }
                );
                Ok(DecisionFramework::ProportionalDistribution(
                    ProportionalDistributionConfig {
                        resource_name,
                        resource_symbol: c.resource_symbol.clone().unwrap_or_default(),
                        total_pool_amount: pool,
                        minimum_allocation_percentage,
                        decimal_places,
                    },
                ))
            }
            x => UnknownFrameworkTypeSnafu { framework_type: x }.fail(),
        }
    }
}

fn required(value: Option<f64>, field: &str, mode: &str) -> Result<f64, VotingErrors> {
    value.context(ConfigSnafu {
        message: format!("{} is required by {}", field, mode),
    })
}

// ******** Output data structures *********

/// An option with its aggregated votes and its place in the ranking.
#[derive(PartialEq, Debug, Clone)]
pub struct RankedOption {
    pub option_id: String,
    pub title: String,
    pub votes: f64,
    /// 1-based position in the ranking.
    pub rank: u32,
    pub selected: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct BinaryResults {
    pub threshold_mode: ThresholdMode,
    pub selected_options: Vec<RankedOption>,
    pub not_selected_options: Vec<RankedOption>,
    pub selected_count: usize,
    /// Only for top_n, when there is both a last selected and a first
    /// non-selected option.
    pub selection_margin: Option<f64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Distribution {
    pub option_id: String,
    pub title: String,
    pub votes: f64,
    pub allocation_amount: f64,
    /// In percent (0 to 100) of the pool.
    pub allocation_percentage: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ProportionalResults {
    pub resource_name: String,
    pub resource_symbol: String,
    pub total_pool: f64,
    pub distributions: Vec<Distribution>,
    pub total_allocated: f64,
    pub gini_coefficient: f64,
    pub decimal_places: u32,
}

#[derive(PartialEq, Debug, Clone)]
pub enum FrameworkResults {
    BinarySelection(BinaryResults),
    ProportionalDistribution(ProportionalResults),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Participation {
    pub voter_count: usize,
    pub total_credits_allocated: u64,
    pub credits_per_voter: u64,
    /// Share of the distributed credits that were actually spent, between 0 and 1.
    pub credit_utilization: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_final: bool,
}

/// The computed results of an event. They are derived data and are
/// recomputed on each request.
#[derive(PartialEq, Debug, Clone)]
pub struct EventResults {
    pub event_id: String,
    pub results: FrameworkResults,
    pub participation: Participation,
}

/// Errors that prevent a vote from being accepted or results from being computed.
#[derive(PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum VotingErrors {
    #[snafu(display("Option {option_id:?} does not belong to event {event_id:?}"))]
    InvalidOption { event_id: String, option_id: String },

    #[snafu(display(
        "Invalid credit value {value} for option {option_id:?}: credits must be non-negative integers"
    ))]
    InvalidCreditValue { option_id: String, value: f64 },

    #[snafu(display("Allocation uses {used} credits but the budget is {budget}"))]
    CreditLimitExceeded { used: u64, budget: u64 },

    #[snafu(display(
        "Voting for event {event_id:?} is open from {start_time} to {end_time}, vote submitted at {at}"
    ))]
    VotingClosed {
        event_id: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    #[snafu(display("Invalid decision framework configuration: {message}"))]
    Config { message: String },

    #[snafu(display("Unknown threshold mode {mode:?}"))]
    UnknownThresholdMode { mode: String },

    #[snafu(display("Unknown tiebreaker {mode:?}"))]
    UnknownTieBreakMode { mode: String },

    #[snafu(display("Unknown framework type {framework_type:?}"))]
    UnknownFrameworkType { framework_type: String },

    #[snafu(display("Event {event_id:?} not found"))]
    EventNotFound { event_id: String },
}
