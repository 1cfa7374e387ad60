// Primitives for reading CSV files.

use std::collections::HashSet;

use crate::qv::{io_common::make_default_id, *};

/// Reads votes from a CSV file.
///
/// The first column holds the invite code, and the header names the option of each
/// other column. Empty cells count as zero credits.
pub fn read_csv_votes(path: &str, event_id: &str) -> QvResult<Vec<ParsedVote>> {
    let default_id = make_default_id(path);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let header = rdr.headers().context(CsvLineParseSnafu { lineno: 1usize })?.clone();
    let option_ids: Vec<String> = header.iter().skip(1).map(|s| s.to_string()).collect();
    debug!("read_csv_votes: options in header: {:?}", option_ids);
    let mut seen: HashSet<&str> = HashSet::new();
    for option_id in option_ids.iter() {
        ensure!(
            seen.insert(option_id.as_str()),
            CsvDuplicateOptionSnafu {
                option_id: option_id.as_str(),
                path,
            }
        );
    }

    let mut res: Vec<ParsedVote> = Vec::new();
    for (idx, line_r) in rdr.records().enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let identity = match line.get(0) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => anonymous_identity(event_id, &default_id(lineno)),
        };

        let mut allocations = RawAllocation::new();
        for (option_id, cell) in option_ids.iter().zip(line.iter().skip(1)) {
            if cell.is_empty() {
                continue;
            }
            let credits = cell.parse::<f64>().ok().context(CsvCreditsSnafu {
                value: cell,
                lineno,
                option_id: option_id.as_str(),
            })?;
            allocations.insert(option_id.clone(), credits);
        }
        debug!(
            "read_csv_votes: lineno: {:?} identity: {:?} allocations: {:?}",
            lineno, identity, allocations
        );
        res.push(ParsedVote {
            identity,
            allocations,
            submitted_at: None,
        });
    }
    Ok(res)
}
