use log::{debug, info, warn};

use quadratic_voting::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::qv::config_reader::*;
use crate::qv::io_csv::read_csv_votes;

mod config_reader;
mod io_common;
mod io_csv;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QvError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error formatting the summary"))]
    FormattingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Could not read credits {value:?} (line {lineno}, option {option_id:?})"))]
    CsvCredits {
        value: String,
        lineno: usize,
        option_id: String,
    },
    #[snafu(display("Option {option_id:?} appears in several columns of {path}"))]
    CsvDuplicateOption { option_id: String, path: String },
    #[snafu(display("Invalid timestamp {value:?}, expected RFC 3339 (e.g. 2026-03-01T00:00:00Z)"))]
    InvalidTimestamp {
        source: chrono::ParseError,
        value: String,
    },
    #[snafu(display("Missing parent directory for {path}"))]
    MissingParentDir { path: String },
    #[snafu(display("Vote provider {provider:?} is not supported"))]
    UnknownProvider { provider: String },
    #[snafu(display("{source}"))]
    Voting { source: VotingErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type QvResult<T> = Result<T, QvError>;

// Display precision for vote totals and ratios in the summary.
// Allocations use the decimal places of the event.
const RATIO_DECIMALS: u32 = 6;

/// A vote, as parsed by the readers.
/// This is before validation against the event.
#[derive(PartialEq, Debug, Clone)]
pub struct ParsedVote {
    pub identity: String,
    pub allocations: RawAllocation,
    pub submitted_at: Option<DateTime<Utc>>,
}

pub fn parse_instant(value: &str) -> QvResult<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(value).context(InvalidTimestampSnafu { value })?;
    Ok(dt.with_timezone(&Utc))
}

fn format_instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn ranked_options_to_json(l: &[RankedOption]) -> Vec<JSValue> {
    l.iter()
        .map(|ro| {
            json!({
                "option_id": ro.option_id,
                "title": ro.title,
                "votes": round_to(ro.votes, RATIO_DECIMALS),
                "rank": ro.rank,
                "selected": ro.selected,
            })
        })
        .collect()
}

fn results_to_json(rs: &FrameworkResults) -> JSValue {
    match rs {
        FrameworkResults::BinarySelection(br) => json!({
            "threshold_mode": br.threshold_mode.name(),
            "selected_options": ranked_options_to_json(&br.selected_options),
            "not_selected_options": ranked_options_to_json(&br.not_selected_options),
            "selected_count": br.selected_count,
            "selection_margin": br.selection_margin.map(|m| round_to(m, RATIO_DECIMALS)),
        }),
        FrameworkResults::ProportionalDistribution(pr) => {
            let rounded = pr.rounded();
            let distributions: Vec<JSValue> = rounded
                .distributions
                .iter()
                .map(|d| {
                    json!({
                        "option_id": d.option_id,
                        "title": d.title,
                        "votes": round_to(d.votes, RATIO_DECIMALS),
                        "allocation_amount": d.allocation_amount,
                        "allocation_percentage": d.allocation_percentage,
                    })
                })
                .collect();
            json!({
                "resource_name": rounded.resource_name,
                "resource_symbol": rounded.resource_symbol,
                "total_pool": rounded.total_pool,
                "distributions": distributions,
                "total_allocated": rounded.total_allocated,
                "gini_coefficient": round_to(rounded.gini_coefficient, RATIO_DECIMALS),
            })
        }
    }
}

fn participation_to_json(p: &Participation) -> JSValue {
    json!({
        "voter_count": p.voter_count,
        "total_credits_allocated": p.total_credits_allocated,
        "credits_per_voter": p.credits_per_voter,
        "credit_utilization": round_to(p.credit_utilization, RATIO_DECIMALS),
        "start_time": format_instant(&p.start_time),
        "end_time": format_instant(&p.end_time),
        "is_final": p.is_final,
    })
}

fn build_summary_js(config: &EventFile, rejected_votes: usize, er: &EventResults) -> JSValue {
    json!({
        "config": {
            "event": er.event_id,
            "title": config.event.title,
            "frameworkType": config.event.decision_framework.framework_type,
            "rejectedVotes": rejected_votes,
        },
        "results": results_to_json(&er.results),
        "participation": participation_to_json(&er.participation),
    })
}

fn read_vote_data(
    root_path: &Path,
    config: &EventFile,
    input: &Option<String>,
) -> QvResult<Vec<ParsedVote>> {
    let event_id = config.event.id.as_str();
    let mut res: Vec<ParsedVote> = config
        .votes
        .iter()
        .enumerate()
        .map(|(idx, v)| ParsedVote {
            identity: match &v.invite_code {
                Some(code) if !code.is_empty() => code.clone(),
                _ => anonymous_identity(event_id, &format!("inline-{:08}", idx + 1)),
            },
            allocations: v.allocations.clone(),
            submitted_at: v.submitted_at,
        })
        .collect();

    if let Some(input_path) = input {
        // The command line overrides the sources of the configuration.
        info!("Reading votes from {:?}", input_path);
        res.extend(read_csv_votes(input_path, event_id)?);
        return Ok(res);
    }

    for source in config.vote_sources.iter() {
        let p = root_path.join(&source.file_path);
        let p2 = p.as_path().display().to_string();
        info!("Attempting to read vote file {:?}", p2);
        match source.provider.as_str() {
            "csv" => res.extend(read_csv_votes(&p2, event_id)?),
            x => return UnknownProviderSnafu { provider: x }.fail(),
        }
    }
    Ok(res)
}

/// Loads an event description, registers all its votes and tabulates the results.
///
/// Returns the JSON summary of the results.
pub fn run_event(
    config_path: &str,
    input: Option<String>,
    out: Option<String>,
    check_summary_path: Option<String>,
    now: DateTime<Utc>,
) -> QvResult<JSValue> {
    let config = read_event_file(config_path)?;
    info!(
        "config: event {:?} with {} options",
        config.event.id,
        config.options.len()
    );
    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu { path: config_path })?;

    let mut store = MemoryStore::new();
    store
        .add_event(config.event.clone(), config.options.clone())
        .context(VotingSnafu {})?;

    let data = read_vote_data(root_p, &config, &input)?;
    debug!("data: {:?}", data);

    let mut rejected_votes: usize = 0;
    for pv in data.iter() {
        let submitted_at = pv.submitted_at.unwrap_or(config.event.start_time);
        if let Err(e) = store.submit_vote(&config.event.id, &pv.identity, &pv.allocations, submitted_at)
        {
            warn!("Rejected vote from {:?}: {}", pv.identity, e);
            rejected_votes += 1;
        }
    }
    info!(
        "Registered {} votes, rejected {}",
        data.len() - rejected_votes,
        rejected_votes
    );

    let result = compute_event_results(&store, &config.event.id, now).context(VotingSnafu {})?;
    info!("res {:?}", result);

    // Assemble the final json
    let result_js = build_summary_js(&config, rejected_votes, &result);
    let pretty_js_stats =
        serde_json::to_string_pretty(&result_js).context(FormattingJsonSnafu {})?;
    match out.as_deref() {
        Some(path) if path != "stdout" => {
            fs::write(path, &pretty_js_stats).context(WritingFileSnafu { path })?;
            info!("Summary written to {:?}", path);
        }
        _ => println!("{}", pretty_js_stats),
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(FormattingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary {:?}", summary_p);
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(result_js)
}

#[cfg(test)]
fn run_event_test(test_name: &str, config_lpath: &str, summary_lpath: &str, now: &str) {
    let test_dir = option_env!("QV_TEST_DIR")
        .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata"));
    info!("Running test {}", test_name);
    let res = parse_instant(now).and_then(|now| {
        run_event(
            format!("{}/{}/{}", test_dir, test_name, config_lpath).as_str(),
            None,
            None,
            Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
            now,
        )
    });
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        panic!("Test {} failed: {}", test_name, e);
    }
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str, now: &str) {
    run_event_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
        now,
    )
}
