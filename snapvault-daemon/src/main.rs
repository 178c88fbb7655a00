//! snapvault CLI binary.
//!
//! Entry point for the `snapvault` command-line tool.

use std::process::ExitCode;

use clap::Parser;
use snapvault_clock::SystemClock;
use snapvault_daemon::exit::{codes, exit_code};
use snapvault_daemon::{
    execute_list, execute_prune, execute_run, execute_schedules, Cli, Command, CommandError,
    Config, CopyRunner, Level, ListArgs, Logger, PruneArgs, RetentionConfig, RunArgs,
    ShutdownFlag, StderrLogger,
};
use snapvault_fs::RealFilesystem;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = StderrLogger::new(Level::from_flag_count(cli.verbose));

    let result = match cli.command {
        Command::Run(args) => run_run(args, logger).await,
        Command::Prune(args) => run_prune(args, &logger),
        Command::List(args) => run_list(args, &logger),
        Command::Schedules => execute_schedules(&mut std::io::stdout()),
    };

    match result {
        Ok(()) => ExitCode::from(codes::SUCCESS as u8),
        Err(e) => {
            logger.warn(&format!("error: {}", e));
            ExitCode::from(exit_code(&e) as u8)
        }
    }
}

/// Run the snapshot loop.
async fn run_run(args: RunArgs, logger: StderrLogger) -> Result<(), CommandError> {
    let config = Config::from_args(&args)?;
    // Signal listeners must be in place before the first copy starts.
    let shutdown = ShutdownFlag::install()?;

    logger.info(&format!(
        "snapshotting {} into {}",
        config.origin.display(),
        config.retention.repository.display()
    ));
    let summary = execute_run(
        &config,
        &RealFilesystem,
        &SystemClock,
        &logger,
        &shutdown,
        CopyRunner::new(logger),
        std::process::id(),
    )
    .await?;

    logger.info(&format!(
        "stopped after {} cycles: {} completed, {} deferred",
        summary.cycles, summary.completed, summary.deferred
    ));
    Ok(())
}

/// Run one retention pass.
fn run_prune(args: PruneArgs, logger: &StderrLogger) -> Result<(), CommandError> {
    let config = RetentionConfig::from_args(&args.retention)?;
    execute_prune(&config, &RealFilesystem, &SystemClock, logger, std::process::id())?;
    Ok(())
}

/// Print the repository contents.
fn run_list(args: ListArgs, logger: &StderrLogger) -> Result<(), CommandError> {
    execute_list(&args, &RealFilesystem, &SystemClock, logger, &mut std::io::stdout())?;
    Ok(())
}
