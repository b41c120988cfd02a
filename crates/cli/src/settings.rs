//! Layered configuration loading
//!
//! Precedence, lowest to highest: built-in defaults, YAML config file,
//! PVELB_* environment variables, CLI flags. Include lists subtract from the
//! merged exclude lists, so a flag can re-admit a node or guest the file or
//! environment excluded.

use std::collections::BTreeSet;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use balancer_lib::{ApiConfig, BalancerConfig, ConnectionScheme, FilterRules, WorkloadKind};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::Cli;

/// Configuration file consulted when --config-file is not given
pub const DEFAULT_CONFIG_FILE: &str = "/etc/pvelb.yml";

/// Fully resolved configuration for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiConfig,
    pub balancer: BalancerConfig,
}

/// Raw values as the file and environment layers provide them
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    scheme: Option<String>,
    api_host: Option<String>,
    api_port: Option<u16>,
    api_token_id: Option<String>,
    api_token_secret: Option<String>,
    api_insecure_tls: Option<bool>,
    request_timeout_secs: Option<u64>,
    tolerance: Option<f64>,
    percent_cpu: Option<f64>,
    percent_mem: Option<f64>,
    max_migrations: Option<usize>,
    dry_run: Option<bool>,
    exclude_nodes: Option<Vec<String>>,
    exclude_vmids: Option<Vec<u32>>,
    exclude_types: Option<Vec<String>>,
    include_nodes: Option<Vec<String>>,
    include_vmids: Option<Vec<u32>>,
    include_types: Option<Vec<String>>,
}

/// Load and resolve configuration for this invocation
pub fn load(cli: &Cli) -> Result<Settings> {
    // An explicitly named file must exist; the default path is optional.
    let (path, required) = match &cli.config_file {
        Some(p) => (p.clone(), true),
        None => (DEFAULT_CONFIG_FILE.to_string(), false),
    };

    let raw: RawSettings = Config::builder()
        .add_source(File::new(&path, FileFormat::Yaml).required(required))
        .add_source(env_source())
        .build()
        .with_context(|| format!("cannot load configuration from {path}"))?
        .try_deserialize()
        .context("cannot parse configuration")?;

    resolve(raw, cli)
}

fn env_source() -> Environment {
    Environment::with_prefix("PVELB")
        .try_parsing(true)
        .list_separator(" ")
        .with_list_parse_key("exclude_nodes")
        .with_list_parse_key("exclude_vmids")
        .with_list_parse_key("exclude_types")
        .with_list_parse_key("include_nodes")
        .with_list_parse_key("include_vmids")
        .with_list_parse_key("include_types")
}

/// Apply CLI overrides on top of the merged file/environment layer
fn resolve(raw: RawSettings, cli: &Cli) -> Result<Settings> {
    let mut api = ApiConfig::default();
    if let Some(scheme) = cli.scheme.clone().or(raw.scheme.clone()) {
        api.scheme = ConnectionScheme::from_str(&scheme).map_err(|e| anyhow!(e))?;
    }
    if let Some(host) = cli.api_host.clone().or(raw.api_host.clone()) {
        api.host = host;
    }
    if let Some(port) = cli.api_port.or(raw.api_port) {
        api.port = port;
    }
    if let Some(token_id) = cli.api_token_id.clone().or(raw.api_token_id.clone()) {
        api.token_id = token_id;
    }
    if let Some(token_secret) = cli.api_token_secret.clone().or(raw.api_token_secret.clone()) {
        api.token_secret = token_secret;
    }
    api.insecure_tls = cli.api_insecure_tls || raw.api_insecure_tls.unwrap_or(false);
    if let Some(timeout) = raw.request_timeout_secs {
        api.request_timeout_secs = timeout;
    }

    let mut balancer = BalancerConfig::default();
    if let Some(tolerance) = cli.tolerance.or(raw.tolerance) {
        balancer.tolerance = tolerance;
    }
    if let Some(percent_cpu) = cli.percent_cpu.or(raw.percent_cpu) {
        balancer.percent_cpu = percent_cpu;
    }
    if let Some(percent_mem) = cli.percent_mem.or(raw.percent_mem) {
        balancer.percent_mem = percent_mem;
    }
    if let Some(max_migrations) = cli.max_migrations.or(raw.max_migrations) {
        balancer.max_migrations = max_migrations;
    }
    balancer.dry_run = cli.dry_run || raw.dry_run.unwrap_or(false);
    balancer.rules = resolve_rules(&raw, cli)?;

    Ok(Settings { api, balancer })
}

fn resolve_rules(raw: &RawSettings, cli: &Cli) -> Result<FilterRules> {
    let mut rules = FilterRules {
        exclude_nodes: merged(&raw.exclude_nodes, &cli.exclude_nodes),
        include_nodes: merged(&raw.include_nodes, &cli.include_nodes),
        exclude_vmids: merged(&raw.exclude_vmids, &cli.exclude_vmids),
        include_vmids: merged(&raw.include_vmids, &cli.include_vmids),
        exclude_kinds: parse_kinds(&raw.exclude_types, &cli.exclude_types)?,
        include_kinds: parse_kinds(&raw.include_types, &cli.include_types)?,
    };

    // An include re-admits what any other layer excluded.
    for node in &rules.include_nodes {
        rules.exclude_nodes.remove(node);
    }
    for vmid in &rules.include_vmids {
        rules.exclude_vmids.remove(vmid);
    }
    for kind in &rules.include_kinds {
        rules.exclude_kinds.remove(kind);
    }

    Ok(rules)
}

fn merged<T: Ord + Clone>(file: &Option<Vec<T>>, cli: &[T]) -> BTreeSet<T> {
    file.iter()
        .flatten()
        .chain(cli.iter())
        .cloned()
        .collect()
}

fn parse_kinds(file: &Option<Vec<String>>, cli: &[String]) -> Result<BTreeSet<WorkloadKind>> {
    file.iter()
        .flatten()
        .chain(cli.iter())
        .map(|s| WorkloadKind::from_str(s).map_err(|e| anyhow!(e)))
        .collect()
}
