//! Output formatting for the run report

use anyhow::Result;
use std::time::Duration;
use voluspa_orchestrator::RunReport;

/// Print the run report in the specified format
pub fn print_report(report: &RunReport, format: &str) -> Result<()> {
    match format.trim().to_lowercase().as_str() {
        "json" | "j" => println!("{}", serde_json::to_string_pretty(report)?),
        _ => print!("{}", render_text(report)),
    }
    Ok(())
}

fn render_text(report: &RunReport) -> String {
    let elapsed = (report.finished_at - report.started_at)
        .to_std()
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str(&format!("\n{:-<60}\n", ""));
    out.push_str(&format!("Run {}\n", report.run_id));
    out.push_str(&format!("{:-<60}\n", ""));
    out.push_str(&format!("  Members:            {}\n", report.total));
    out.push_str(&format!("  Completed:          {}\n", report.completed));
    out.push_str(&format!("  Successful:         {}\n", report.successful));
    out.push_str(&format!("  Not successful:     {}\n", report.non_success));
    out.push_str(&format!("  Triumph hashes:     {}\n", report.triumph_hashes));
    out.push_str(&format!("  Collectible hashes: {}\n", report.collectible_hashes));
    out.push_str(&format!("  Parallel programs:  {}\n", report.parallel_programs));
    out.push_str(&format!("  Duration:           {}\n", format_duration(elapsed)));
    if let Some(path) = &report.job_results_path {
        out.push_str(&format!("  Job results:        {}\n", path.display()));
    }
    if let Some(id) = report.scrape_id {
        out.push_str(&format!("  Scrape id:          {id}\n"));
    }
    for failure in &report.failures {
        out.push_str(&format!("  ! {failure}\n"));
    }
    out
}

/// Format duration in a human-readable way
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}.{:03}s", total_secs, millis)
        } else {
            format!("{}s", total_secs)
        }
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        format!("{}h {}m", total_secs / 3600, (total_secs % 3600) / 60)
    }
}
