//! Report rendering: console summary, JSON, per-endpoint output files.

use std::io::{self, Write};
use std::path::Path;

use tracing::info;

use fleetrun_core::BatchReport;

/// Print a human-readable summary to stdout.
pub fn print_summary(report: &BatchReport) {
    let elapsed = report.duration().num_milliseconds() as f64 / 1000.0;
    println!(
        "batch {}: {} endpoints, {} succeeded, {} failed in {:.2}s",
        report.batch_id,
        report.total(),
        report.succeeded.len(),
        report.failed.len(),
        elapsed
    );

    for (id, outcomes) in &report.succeeded {
        let results: Vec<String> = outcomes
            .iter()
            .map(|o| format!("{}={}", o.command, o.output))
            .collect();
        println!("  ok   {}: {}", id, results.join(" "));
    }

    for (id, failure) in &report.failed {
        println!(
            "  fail {}: {} (after {} attempts)",
            id, failure.kind, failure.attempts
        );
    }
}

/// Serialize the full report as pretty JSON.
pub fn to_json(report: &BatchReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Write one output file per succeeded endpoint into `dir`.
pub fn write_outputs(report: &BatchReport, dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;

    for (id, outcomes) in &report.succeeded {
        let path = dir.join(format!("{}.txt", id));
        let mut file = std::fs::File::create(&path)?;

        writeln!(file, "Endpoint: {}", id)?;
        writeln!(file, "Batch: {}", report.batch_id)?;
        writeln!(file, "Time: {}", report.started_at.to_rfc3339())?;
        writeln!(file, "{}", "=".repeat(50))?;
        for outcome in outcomes {
            writeln!(file, "\nCommand: {}", outcome.command)?;
            writeln!(file, "{}", "-".repeat(30))?;
            writeln!(file, "{}", outcome.output)?;
        }

        info!(endpoint = %id, path = %path.display(), "wrote output file");
    }

    Ok(())
}
