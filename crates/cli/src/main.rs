//! PVE workload balancer CLI
//!
//! Performs one balancing pass per invocation, meant to be driven by a
//! systemd timer or cron. Loads layered configuration (defaults < YAML file
//! < PVELB_* environment < flags), runs the pass, renders the report, and
//! exits non-zero on fatal errors (1) or partial dispatch failure (2).

mod output;
mod settings;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Central scheduling workload balancer for Proxmox VE
#[derive(Debug, Parser)]
#[command(name = "pvelb", author, version, about, long_about = None)]
pub struct Cli {
    /// YAML configuration file (default: /etc/pvelb.yml)
    #[arg(short, long, value_name = "FILE")]
    pub config_file: Option<String>,

    /// Increase verbosity
    #[arg(short, long)]
    pub verbose: bool,

    /// Only output errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable ANSI color in output
    #[arg(long)]
    pub no_color: bool,

    /// Analyze and report only; start no migration
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Cluster API connection method (https, ssh, local)
    #[arg(long, value_name = "SCHEME")]
    pub scheme: Option<String>,

    /// Cluster API host
    #[arg(long, value_name = "HOST")]
    pub api_host: Option<String>,

    /// Cluster API port
    #[arg(long, value_name = "PORT")]
    pub api_port: Option<u16>,

    /// API token id (e.g. balancer@pve!scheduler)
    #[arg(long, value_name = "ID")]
    pub api_token_id: Option<String>,

    /// API token secret
    #[arg(
        long,
        value_name = "SECRET",
        env = "PVELB_API_TOKEN_SECRET",
        hide_env_values = true
    )]
    pub api_token_secret: Option<String>,

    /// Accept an invalid TLS certificate from the cluster API
    #[arg(long)]
    pub api_insecure_tls: bool,

    /// Max workload disparity tolerance
    #[arg(long, value_name = "FRACTION")]
    pub tolerance: Option<f64>,

    /// Percent priority of the CPU rule (must sum to 1.0 with --percent-mem)
    #[arg(long, value_name = "FRACTION")]
    pub percent_cpu: Option<f64>,

    /// Percent priority of the MEM rule (must sum to 1.0 with --percent-cpu)
    #[arg(long, value_name = "FRACTION")]
    pub percent_mem: Option<f64>,

    /// Max simultaneous migrations to start
    #[arg(long, value_name = "NUM")]
    pub max_migrations: Option<usize>,

    /// Exclude a node (can be given multiple times)
    #[arg(long = "exclude-node", value_name = "NODE")]
    pub exclude_nodes: Vec<String>,

    /// Exclude a VMID (can be given multiple times)
    #[arg(long = "exclude-vmid", value_name = "VMID")]
    pub exclude_vmids: Vec<u32>,

    /// Exclude a workload type ('lxc' or 'qemu'; can be given multiple times)
    #[arg(long = "exclude-type", value_name = "TYPE")]
    pub exclude_types: Vec<String>,

    /// Re-admit a previously excluded node (can be given multiple times)
    #[arg(long = "include-node", value_name = "NODE")]
    pub include_nodes: Vec<String>,

    /// Re-admit a previously excluded VMID (can be given multiple times)
    #[arg(long = "include-vmid", value_name = "VMID")]
    pub include_vmids: Vec<u32>,

    /// Re-admit a previously excluded workload type (can be given multiple times)
    #[arg(long = "include-type", value_name = "TYPE")]
    pub include_types: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_ansi(!cli.no_color)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = settings::load(&cli)?;
    tracing::debug!(
        scheme = %settings.api.scheme,
        host = %settings.api.host,
        port = settings.api.port,
        dry_run = settings.balancer.dry_run,
        "Configuration resolved"
    );

    let api = balancer_lib::connect(&settings.api).context("cannot set up cluster API client")?;
    let report = balancer_lib::run_once(api, &settings.balancer)
        .await
        .context("balancing pass failed")?;

    output::print_report(&report, cli.format)?;

    if report.failed() > 0 {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
