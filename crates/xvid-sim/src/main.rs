#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use xvid_sim::Scenario;

#[derive(Parser, Debug)]
#[command(
    name = "xvid-sim",
    about = "Run an HDMI RX / video PHY scenario against the hardware models and print a JSON report."
)]
struct Args {
    /// Scenario file (JSON)
    #[arg(long, env = "XVID_SCENARIO", value_name = "PATH")]
    scenario: PathBuf,

    /// Log filter, e.g. `info` or `xvid_hdmirx=debug,xvid_vphy=trace`
    #[arg(long, env = "XVID_LOG", default_value = "info")]
    log_level: String,

    /// Pretty-print the report
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level)
        .with_context(|| format!("invalid log filter `{}`", args.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let scenario = Scenario::load(&args.scenario)?;
    let report = scenario
        .run()
        .with_context(|| format!("scenario {} failed", args.scenario.display()))?;

    let mut out = io::stdout().lock();
    if args.pretty {
        serde_json::to_writer_pretty(&mut out, &report)?;
    } else {
        serde_json::to_writer(&mut out, &report)?;
    }
    writeln!(out)?;
    Ok(())
}
