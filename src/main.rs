use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use rust_archiver::cipher::cipher_for;
use rust_archiver::cli::Args;
use rust_archiver::cloud::S3Uploader;
use rust_archiver::codec::TarCompressor;
use rust_archiver::config::{NotificationSettings, RunConfig};
use rust_archiver::notify::{dispatch, GpgMailNotifier};
use rust_archiver::pipeline::{dry_run, ArchivalRun};
use rust_archiver::preflight::check_tools;
use rust_archiver::report::RunReport;
use rust_archiver::security::safe_error_message;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version print to stdout and are not failures
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    if let Err(e) = initialize_logging(args.verbose) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", safe_error_message("Archive run failed", &format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(log_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .context("Failed to initialize logger")?;
    Ok(())
}

/// Resolve configuration and perform a dry run or a real run.
/// Returns whether the run succeeded.
fn run(args: &Args) -> Result<bool> {
    let config = RunConfig::resolve(args)?;

    if config.preflight {
        check_tools(&config)?;
    }

    if config.dry_run {
        info!("Dry run for {}", config.base_dir.display());
        let exclude = config.staging_root.exists().then(|| config.staging_root.as_path());
        let summary = dry_run(&config.base_dir, exclude);
        if let Some(settings) = &config.notification {
            notify(&config, settings, &summary.to_report());
        }
        return Ok(true);
    }

    info!(
        "Archiving {} to s3://{} ({} compression, {} encryption, {} storage)",
        config.base_dir.display(),
        config.remote.bucket,
        config.compression,
        config.encryption,
        config.storage_class
    );

    let uploader = S3Uploader::new(
        &config.remote.bucket,
        config.region.as_deref(),
        Some(&config.aws_profile),
        &config.storage_class,
        config.upload_timeout,
    )?;
    let compressor = TarCompressor::new();
    let cipher = cipher_for(
        config.encryption,
        config.gpg_key.as_deref(),
        config.aes_passphrase.as_ref().map(|p| p.expose()),
    );

    let report = ArchivalRun::new(&config, &compressor, cipher.as_ref(), &uploader).execute();

    if let Some(settings) = &config.notification {
        notify(&config, settings, &report);
    }

    Ok(report.is_success())
}

fn notify(config: &RunConfig, settings: &NotificationSettings, report: &RunReport) {
    let secrets = config.aes_passphrase.iter().map(|p| p.expose().to_string());
    let notifier = GpgMailNotifier::new(&settings.recipient, &settings.gpg_key).redacting(secrets);
    dispatch(&notifier, settings.notify_on, report);
}
