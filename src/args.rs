use clap::Parser;

/// This is a quadratic voting tabulation program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file containing the event description, its options and optionally its votes.
    /// Only JSON event descriptions are supported. For more information about the file format,
    /// read the documentation of the quadratic_voting crate.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference file containing the results of an event in JSON format. If provided,
    /// qvtally will check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the event will be written in JSON
    /// format to the given location. Otherwise it is printed to the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) A CSV file of votes. Setting this option overrides the vote sources that
    /// may be specified in the event description.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (RFC 3339 timestamp, default: the current time) The instant at which the results are computed.
    /// Results computed after the end of the event are final.
    #[clap(long, value_parser)]
    pub now: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
