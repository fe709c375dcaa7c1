//! Console formatting for the guardian CLI.

use colored::{ColoredString, Colorize};
use guardian::{Incident, IncidentStatistics, Severity, TriageOutcome};

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
    println!("{}", "─".repeat(50).bright_black());
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

pub fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Low => severity.as_str().bright_black(),
        Severity::Medium => severity.as_str().yellow(),
        Severity::High => severity.as_str().red(),
        Severity::Critical => severity.as_str().red().bold(),
    }
}

pub fn print_incident(incident: &Incident) {
    let reviewed = if incident.reviewed {
        "reviewed".green()
    } else {
        "new".yellow()
    };
    println!(
        "{} [{}] {} {} ({:.0}%)",
        incident.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().bright_black(),
        severity_label(incident.severity),
        incident.id.bold(),
        reviewed,
        incident.confidence * 100.0
    );
    println!("   {} ({})", incident.description, incident.device_name);
}

pub fn print_statistics(stats: &IncidentStatistics) {
    print_section("Incident statistics");
    println!("   Total:       {}", stats.total_incidents);
    println!("   Last 24h:    {}", stats.last_24h);
    println!("   Last 7 days: {}", stats.last_7d);
    println!("   Unreviewed:  {}", stats.unreviewed);
    println!("   Avg. confidence: {:.0}%", stats.average_confidence * 100.0);

    if !stats.by_severity.is_empty() {
        println!();
        for (severity, count) in stats.by_severity.iter().rev() {
            println!("   {:<10} {count}", severity_label(*severity));
        }
    }

    if !stats.top_terms.is_empty() {
        println!();
        println!("   Top terms:");
        for term in &stats.top_terms {
            println!("     {} ({})", term.term, term.count);
        }
    }
}

pub fn print_outcome(outcome: &TriageOutcome) {
    let Some(incident) = &outcome.incident else {
        println!(
            "{} not suspicious ({:.0}%)",
            "·".bright_black(),
            outcome.analysis.confidence * 100.0
        );
        return;
    };

    let decision = outcome
        .decision
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    let decision = if outcome.alerted() {
        decision.green()
    } else {
        decision.bright_black()
    };

    println!(
        "{} [{}] {} {}",
        "!".red().bold(),
        severity_label(incident.severity),
        incident.description,
        decision
    );
}
