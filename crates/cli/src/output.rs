//! Report rendering for the terminal

use anyhow::Result;
use balancer_lib::{ActionOutcome, NodeClass, RunReport};
use clap::ValueEnum;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for the run report
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Row of the node classification table
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Class")]
    class: String,
}

/// Row of the migration plan table
#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "VMID")]
    vmid: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Src After")]
    source_after: String,
    #[tabled(rename = "Dst After")]
    destination_after: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

/// Render the run report in the requested format
pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => print_tables(report),
    }
    Ok(())
}

fn print_tables(report: &RunReport) {
    println!(
        "Balancing pass started {}",
        report
            .started_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );

    let node_rows: Vec<NodeRow> = report
        .nodes
        .iter()
        .map(|entry| NodeRow {
            node: entry.node.clone(),
            score: format_score(entry.score),
            class: color_class(entry.class),
        })
        .collect();

    if !node_rows.is_empty() {
        let table = Table::new(node_rows).with(Style::rounded()).to_string();
        println!("{table}");
    }
    println!(
        "Mean score: {} (tolerance ±{})",
        format_score(report.mean_score),
        format_score(report.tolerance)
    );

    if report.plan.is_empty() {
        if report.balanced {
            print_success("Cluster is balanced; no migrations needed");
        } else {
            print_warning("Cluster is imbalanced but no actionable migration was found");
        }
        return;
    }

    let action_rows: Vec<ActionRow> = report
        .results
        .iter()
        .map(|result| ActionRow {
            vmid: result.action.vmid,
            name: result.action.workload_name.clone(),
            kind: result.action.kind.to_string(),
            source: result.action.source.clone(),
            destination: result.action.destination.clone(),
            source_after: format_score(result.action.source_score_after),
            destination_after: format_score(result.action.destination_score_after),
            outcome: color_outcome(&result.outcome),
        })
        .collect();

    let table = Table::new(action_rows).with(Style::rounded()).to_string();
    println!("{table}");

    if report.dry_run {
        print_warning(&format!(
            "Dry run; {} migration(s) planned, none started",
            report.plan.len()
        ));
    } else if report.failed() > 0 {
        print_warning(&format!(
            "{} migration request(s) accepted, {} failed",
            report.accepted(),
            report.failed()
        ));
    } else {
        print_success(&format!(
            "{} migration request(s) accepted",
            report.accepted()
        ));
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format a load score for display
fn format_score(score: f64) -> String {
    format!("{score:.3}")
}

fn color_class(class: NodeClass) -> String {
    match class {
        NodeClass::Surplus => "surplus".red().to_string(),
        NodeClass::Deficit => "deficit".blue().to_string(),
        NodeClass::Balanced => "balanced".green().to_string(),
    }
}

fn color_outcome(outcome: &ActionOutcome) -> String {
    match outcome {
        ActionOutcome::Accepted { .. } => "accepted".green().to_string(),
        ActionOutcome::Rejected { reason } => format!("{}: {}", "rejected".red(), reason),
        ActionOutcome::Skipped => "planned".yellow().to_string(),
    }
}
