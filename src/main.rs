mod cli;

use clap::Parser;
use pcapdiag::analysis::{self, AnalysisError, Analyzer};
use pcapdiag::config::{self, Config};
use pcapdiag::display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    let args = cli::Cli::parse();

    // Initialize tracing/logging
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    // Set up Ctrl-C handler
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        cancel_clone.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupt received, stopping analysis...");
    }) {
        tracing::warn!(error = %err, "failed to set Ctrl-C handler");
    }

    if let Err(e) = run(&args, &config, cancel) {
        eprintln!("error: {}", e);
        std::process::exit(exit_code(e.as_ref()));
    }
}

/// 128 + SIGINT, as shells report an interrupted command.
const EXIT_CANCELLED: i32 = 130;

fn exit_code(err: &(dyn std::error::Error + 'static)) -> i32 {
    match err.downcast_ref::<AnalysisError>() {
        Some(AnalysisError::Cancelled) => EXIT_CANCELLED,
        _ => 1,
    }
}

fn run(
    args: &cli::Cli,
    config: &Config,
    cancel: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(&args.file)
        .map_err(|e| format!("cannot read {}: {}", args.file.display(), e))?;
    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.file.display().to_string());

    let job = analysis::spawn(Analyzer::new(config), file_name, data, cancel)?;
    let result = job.wait()?;

    display::print_report(&result, &config.report, &config.output);

    if let Some(path) = &config.output.export_json {
        let json = result
            .export_document(chrono::Utc::now().to_rfc3339())
            .to_json_pretty()?;
        std::fs::write(path, json)
            .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
        if !config.output.quiet {
            println!();
            println!("Exported findings to {}", path.display());
        }
    }
    Ok(())
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(args: &cli::Cli) -> Result<Config, config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(path) = &args.export_json {
        config.output.export_json = Some(path.clone());
    }
    if let Some(value) = args.packets {
        config.output.packets = value;
    }
    if args.quiet {
        config.output.quiet = true;
    }
    if args.hex_dump {
        config.output.hex_dump = true;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcapdiag::capture::CaptureError;

    #[test]
    fn cancelled_run_exits_130() {
        let err: Box<dyn std::error::Error> = AnalysisError::Cancelled.into();
        assert_eq!(exit_code(err.as_ref()), 130);
    }

    #[test]
    fn other_failures_exit_1() {
        let capture: Box<dyn std::error::Error> =
            AnalysisError::Capture(CaptureError::UnknownFormat(None)).into();
        assert_eq!(exit_code(capture.as_ref()), 1);

        let io: Box<dyn std::error::Error> = "cannot read missing.pcap".into();
        assert_eq!(exit_code(io.as_ref()), 1);
    }
}
