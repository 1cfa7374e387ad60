use crate::qv::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

/// The description of an event, as read from the configuration file.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct EventFile {
    pub event: Event,
    pub options: Vec<VoteOption>,
    #[serde(default)]
    pub votes: Vec<VoteEntry>,
    #[serde(rename = "voteSources", default)]
    pub vote_sources: Vec<VoteSource>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VoteEntry {
    #[serde(rename = "inviteCode")]
    pub invite_code: Option<String>,
    pub allocations: RawAllocation,
    #[serde(rename = "submittedAt")]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VoteSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

pub fn read_event_file(path: &str) -> QvResult<EventFile> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read content: {:?}", contents);
    let config: EventFile = serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    Ok(config)
}

pub fn read_summary(path: &str) -> QvResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read summary: {:?}", js);
    Ok(js)
}
