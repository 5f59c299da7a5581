//! PathSafe development binary.
//!
//! A thin driver over the library for local, single-file scan/anonymize/
//! verify invocations. Not a supported product surface: batch orchestration,
//! report rendering, and collection walking belong to surrounding tooling.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pathsafe::config::{AppConfig, Cli, Command};
use pathsafe::{anonymize_file, HandlerRegistry, PipelineOptions};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match AppConfig::from_cli(cli) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load pattern configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match config.command {
        Command::Scan { path, json } => run_scan(&path, &config.patterns, json),
        Command::Anonymize {
            path,
            out,
            no_verify,
            no_verify_integrity,
            no_reset_timestamps,
            dry_run,
            json,
        } => run_anonymize(
            &path,
            out.as_deref(),
            &config.patterns,
            PipelineOptions {
                verify: !no_verify,
                verify_integrity: !no_verify_integrity,
                reset_timestamps: !no_reset_timestamps,
                dry_run,
            },
            json,
        ),
        Command::Info { path } => run_info(&path, &config.patterns),
    }
}

fn run_scan(path: &std::path::Path, patterns: &pathsafe::PatternConfig, json: bool) -> ExitCode {
    let registry = HandlerRegistry::new(patterns.clone());
    let Some(handler) = registry.select(path) else {
        error!("no format handler recognizes {}", path.display());
        return ExitCode::FAILURE;
    };

    info!(format = handler.format_name(), path = %path.display(), "scanning");
    let result = handler.scan(path);

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                error!("failed to serialize scan result: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("format: {}", result.format);
        println!("clean: {}", result.is_clean);
        println!("findings: {}", result.findings.len());
        for finding in &result.findings {
            println!(
                "  [{:?}] {} @ {} ({})",
                finding.source,
                finding.tag_name,
                finding.offset,
                finding.masked_preview()
            );
        }
        if let Some(err) = &result.error {
            warn!("scan error: {err}");
        }
    }

    if result.is_clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_anonymize(
    path: &std::path::Path,
    out: Option<&std::path::Path>,
    patterns: &pathsafe::PatternConfig,
    options: PipelineOptions,
    json: bool,
) -> ExitCode {
    let registry = HandlerRegistry::new(patterns.clone());
    let result = anonymize_file(&registry, path, out, options);

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                error!("failed to serialize anonymization result: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("source: {}", result.source_path.display());
        println!("output: {}", result.output_path.display());
        println!("mode: {:?}", result.mode);
        println!("findings cleared: {}", result.findings_cleared);
        println!("verified: {}", result.verified);
        println!("image integrity: {:?}", result.image_integrity);
        println!("filename has PHI: {}", result.filename_has_phi);
        if let Some(hash) = &result.output_sha256 {
            println!("output sha256: {hash}");
        }
        if let Some(err) = &result.error {
            warn!("anonymize error: {err}");
        }
    }

    if result.error.is_some() || !result.verified {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_info(path: &std::path::Path, patterns: &pathsafe::PatternConfig) -> ExitCode {
    let registry = HandlerRegistry::new(patterns.clone());
    let Some(handler) = registry.select(path) else {
        error!("no format handler recognizes {}", path.display());
        return ExitCode::FAILURE;
    };

    match handler.get_info(path) {
        Ok(info) => {
            println!("format: {}", info.format_name);
            println!("bigtiff: {}", info.is_bigtiff);
            println!("byte order: {}", info.byte_order);
            println!("ifd count: {}", info.ifd_count);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("failed to read structure: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pathsafe=debug"
    } else {
        "pathsafe=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
