use anyhow::Result;
use clap::Parser;
use clickup_sync::cli::{Cli, commands};
use clickup_sync::logging::init_logging;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;
    Ok(commands::execute(cli)?)
}
