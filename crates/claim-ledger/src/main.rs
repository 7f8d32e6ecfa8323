mod bootstrap;
mod console;

use std::process::ExitCode;

use anyhow::Result;
use chrono::Local;
use ledger_core::error::ClaimsError;
use ledger_core::settings::Settings;
use ledger_runtime::orchestrator::ProcessingOrchestrator;

/// Exit status of a run that found no claims.
const EXIT_NO_DATA: u8 = 2;

/// Exit status after Ctrl+C.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let settings = Settings::load_with_last_used();

    let app_dir = bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Claim Ledger v{} starting", env!("CARGO_PKG_VERSION"));

    if settings.inputs.is_empty() {
        if settings.clear {
            println!("Saved configuration cleared.");
            return Ok(ExitCode::SUCCESS);
        }
        anyhow::bail!("no input files or directories given");
    }

    let config = settings.engine_config()?;
    tracing::info!(
        "Grouping: {}, policy year source: {}, date filter: {}",
        config.grouping.as_str(),
        config.policy_year_source.as_str(),
        config.date_filter
    );

    let output = settings
        .output
        .clone()
        .unwrap_or_else(|| bootstrap::default_output_path(&app_dir, Local::now().naive_local()));

    let orchestrator = ProcessingOrchestrator::new(settings.inputs.clone(), output, config)
        .with_seed_report(settings.seed_report.clone());
    let (mut rx, handle) = orchestrator.start();

    // Ctrl+C stops the run at the next file or period boundary.
    let cancel = handle.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received; cancelling run");
            cancel.cancel();
        }
    });

    while let Some(event) = rx.recv().await {
        eprintln!("{}", console::render_progress(&event));
    }

    let run = match handle.join().await {
        Ok(run) => run,
        Err(ClaimsError::Cancelled) => {
            eprintln!("Processing cancelled; no report written.");
            return Ok(ExitCode::from(EXIT_CANCELLED));
        }
        Err(e) => return Err(e.into()),
    };

    print!("{}", console::render_run_report(&run.result.report));

    match run.result.ensure_data() {
        Err(e @ ClaimsError::NoData) => {
            println!("{e}; no report written.");
            Ok(ExitCode::from(EXIT_NO_DATA))
        }
        Err(e) => Err(e.into()),
        Ok(()) => {
            println!();
            print!("{}", console::render_summaries(&run.result.summaries));
            if let Some(path) = run.report_path {
                println!();
                println!("Report written to {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
