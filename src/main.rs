//! `tracelink` - standalone instrumentation agent for the runtime hub
//!
//! This binary connects to a hub, registers under an application name
//! and serves hub commands until interrupted. It also exposes the
//! sandbox as a local one-shot runner for trying snippets offline.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use tracelink_core::config::AgentConfig;
use tracelink_core::introspect::{ModuleCatalog, ModuleOrigin};
use tracelink_core::protocol::{NodeConnection, WorkflowNode};
use tracelink_core::sandbox::Sandbox;
use tracelink_core::Agent;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log)
        .with_context(|| format!("invalid log filter '{}'", cli.log))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Run { name, hub_url } => {
            let config = load_config(&cli, name.clone(), hub_url.clone())?;
            run_agent(config).await
        }
        Commands::Exec {
            code,
            file,
            timeout,
        } => {
            let config = load_config(&cli, None, None)?;
            let source = match (code, file) {
                (Some(code), None) => code.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                _ => anyhow::bail!("provide a snippet inline or with --file"),
            };
            exec_snippet(&config, &source, *timeout).await
        }
        Commands::Config => {
            let config = load_config(&cli, None, None)?;
            println!("app_name: {}", config.app_name);
            println!("hub_url: {}", config.hub_url);
            println!("register_timeout_secs: {}", config.register_timeout_secs);
            println!("capture.max_items: {}", config.capture.max_items);
            println!("capture.max_repr: {}", config.capture.max_repr);
            println!("capture.max_depth: {}", config.capture.max_depth);
            println!(
                "sandbox.default_timeout_secs: {}",
                config.sandbox.default_timeout_secs
            );
            Ok(())
        }
    }
}

fn load_config(cli: &Cli, name: Option<String>, hub_url: Option<String>) -> Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AgentConfig::load_or_default("tracelink"),
    };
    if let Some(name) = name {
        config.app_name = name;
    }
    if let Some(url) = hub_url {
        config.hub_url = url;
    }
    Ok(config)
}

async fn run_agent(config: AgentConfig) -> Result<()> {
    let agent = Agent::new(config)?;

    // Expose this binary's own surface so hub-side imports have
    // something to look at beyond the builtin catalogs.
    agent.register_module(
        ModuleCatalog::new("tracelink")
            .doc("Standalone instrumentation agent")
            .origin(ModuleOrigin::File("src/main.rs".to_string()))
            .function("run", &["config"])
            .attribute("version", env!("CARGO_PKG_VERSION")),
    );

    agent
        .connect()
        .await
        .context("failed to connect to the hub")?;
    info!(app_id = ?agent.app_id(), "agent registered");

    agent.define_workflow_nodes(capability_nodes(), capability_connections());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    agent.disconnect().await;
    Ok(())
}

async fn exec_snippet(config: &AgentConfig, source: &str, timeout: Option<u64>) -> Result<()> {
    let sandbox = Sandbox::new(config.sandbox.default_timeout_secs);
    let timeout = timeout.map(std::time::Duration::from_secs);
    let outcome = sandbox.execute(source, timeout).await;

    print!("{}", outcome.output);
    if !outcome.variables.is_empty() {
        println!("--- variables ---");
        for (name, value) in &outcome.variables {
            println!("{name} = {value}");
        }
    }
    if let Some(error) = &outcome.error {
        eprintln!("error: {error}");
    }
    if !outcome.success {
        std::process::exit(outcome.exit_code);
    }
    Ok(())
}

fn capability_nodes() -> Vec<WorkflowNode> {
    vec![
        WorkflowNode {
            id: "agent".to_string(),
            name: "tracelink agent".to_string(),
            node_type: "agent".to_string(),
            x: 100.0,
            y: 100.0,
        },
        WorkflowNode {
            id: "sandbox".to_string(),
            name: "Sandboxed execution".to_string(),
            node_type: "executor".to_string(),
            x: 300.0,
            y: 40.0,
        },
        WorkflowNode {
            id: "modules".to_string(),
            name: "Module introspection".to_string(),
            node_type: "introspector".to_string(),
            x: 300.0,
            y: 160.0,
        },
    ]
}

fn capability_connections() -> Vec<NodeConnection> {
    vec![
        NodeConnection {
            source: "agent".to_string(),
            target: "sandbox".to_string(),
        },
        NodeConnection {
            source: "agent".to_string(),
            target: "modules".to_string(),
        },
    ]
}
