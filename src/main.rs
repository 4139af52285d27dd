use std::{error::Error, process::ExitCode};

use clap::Parser;
use grammarfetch::{
    cli::args::{CliArgs, Command},
    config::GrammarfetchConfig,
    GrammarFetch,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = CliArgs::parse();
    let config = GrammarfetchConfig::load()?;

    let mut builder = GrammarFetch::builder()
        .manifest_file_name(&cli_args.manifest)
        .layout_file_name(&cli_args.layout)
        .verify(cli_args.verify || config.verify.unwrap_or(false));
    if let Some(vendor_dir) = cli_args.vendor_dir.map(Into::into).or(config.vendor_dir) {
        builder = builder.vendor_directory(vendor_dir);
    }
    if let Some(output_dir) = cli_args.output_dir.map(Into::into).or(config.output_dir) {
        builder = builder.output_directory(output_dir);
    }
    if let Some(jobs) = cli_args.jobs.or(config.jobs) {
        builder = builder.jobs(jobs);
    }
    let grammarfetch = builder.try_build()?;

    match cli_args.cmd.unwrap_or(Command::Build { force: false }) {
        Command::Build { force } => {
            grammarfetch.build(force)?;
            Ok(())
        }
        Command::Fetch => {
            grammarfetch.fetch()?;
            Ok(())
        }
        Command::Clean => grammarfetch.clean(),
    }
}
