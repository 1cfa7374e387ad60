mod args;
mod qv;

use clap::Parser;
use log::{debug, LevelFilter};
use snafu::prelude::*;

use chrono::Utc;
use std::error::Error;

use crate::args::Args;
use crate::qv::{QvError, QvResult};

fn run(args: &Args) -> QvResult<()> {
    let config_path = match args.config.as_deref() {
        Some(path) => path,
        None => whatever!("Missing --config: an event description is required"),
    };
    let now = match args.now.as_deref() {
        Some(s) => qv::parse_instant(s)?,
        None => Utc::now(),
    };
    debug!("run: config {:?} at {:?}", config_path, now);

    qv::run_event(
        config_path,
        args.input.clone(),
        args.out.clone(),
        args.reference.clone(),
        now,
    )?;
    Ok(())
}

fn report(e: &QvError) {
    eprintln!("An error occured: {}", e);
    let mut source = e.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}

fn main() {
    let args = Args::parse();

    if args.verbose {
        env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    debug!("args: {:?}", args);

    if let Err(e) = run(&args) {
        report(&e);
        std::process::exit(1);
    }
}
