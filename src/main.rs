mod cli;
mod commands;
mod config;
mod engine;
mod handlers;
mod paths;
mod progress;
mod runner;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::FrecklesConfig;
use declarative::ErrorCategory;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: FrecklesConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let category = category(&err);
            report(&err, category);
            let code = category.map_or(1, |c| c.exit_code());
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "freckles", &mut io::stdout());
        return Ok(());
    }

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: FrecklesConfig::load()?,
    };
    log::debug!("Running with verbosity {}", ctx.verbose);

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, &args.sources.sources, args.details),
        Command::PrintConfig(args) => {
            commands::print_config::run(&ctx, &args.sources.sources, args.raw, args.format)
        }
        Command::Debug(args) => commands::debug::run(&ctx, &args.handler, &args.sources.sources),
        Command::Completions { .. } => Ok(()),
    }
}

/// Category of the first library error in the chain, if any.
fn category(err: &anyhow::Error) -> Option<ErrorCategory> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<declarative::Error>() {
            return Some(e.category());
        }
        cause
            .downcast_ref::<frkl::Error>()
            .map(|e| e.category().into())
    })
}

/// Offending key and value of a configuration error, if any.
fn config_context(err: &anyhow::Error) -> Option<(Option<&str>, Option<&str>)> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<declarative::Error>() {
            return e.context();
        }
        match cause.downcast_ref::<frkl::Error>() {
            Some(frkl::Error::Config { key, value, .. }) => {
                Some((key.as_deref(), value.as_deref()))
            }
            _ => None,
        }
    })
}

fn report(err: &anyhow::Error, category: Option<ErrorCategory>) {
    match category {
        Some(category) => ui::error(&format!("{category}: {err}")),
        None => ui::error(&format!("{err}")),
    }
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
    if let Some((key, value)) = config_context(err) {
        if let Some(key) = key {
            eprintln!("  key: {key}");
        }
        if let Some(value) = value {
            eprintln!("  value: {value}");
        }
    }
    if let Some(category) = category
        && category != ErrorCategory::Execution
    {
        eprintln!("  {}", category.advice());
    }
}
