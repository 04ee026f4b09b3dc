//! Gatekeeper command-line entry point.
//!
//! # Purpose
//! Loads a role manifest into a catalog and either reports the synchronization result or
//! answers a single authorization question against it.
//!
//! # Notes
//! `run` returns the rendered output instead of printing so the commands stay testable.
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use gatekeeper::config::GatekeeperConfig;
use gatekeeper::gate::{GateDecision, Session};
use gatekeeper::manifest::Manifest;
use gatekeeper::observability;
use gatekeeper::service::PolicyService;
use serde_json::{Map, Value};
use std::path::PathBuf;
use warden_authz::{Action, Principal};

#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(about = "Synchronize role manifests and check authorization decisions")]
struct Cli {
    /// Print Prometheus metrics after the command completes
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a manifest into the catalog and print the synchronization report
    Sync {
        /// Manifest path (defaults to WARDEN_MANIFEST)
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Evaluate one authorization request against a manifest
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Manifest path (defaults to WARDEN_MANIFEST)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Principal id
    #[arg(long)]
    principal: String,

    /// Role held by the principal (repeatable)
    #[arg(long = "role")]
    roles: Vec<String>,

    /// Action: create, read, update, delete or manage
    #[arg(long)]
    action: String,

    /// Subject type name
    #[arg(long)]
    subject: String,

    /// Resource instance as a JSON object
    #[arg(long)]
    resource: Option<String>,

    /// Principal attributes as a JSON object
    #[arg(long)]
    attributes: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = GatekeeperConfig::from_env_or_yaml().context("load gatekeeper config")?;
    let metrics_handle = observability::init_observability("gatekeeper", config.log_format);
    let output = run(cli.command, &config).await?;
    println!("{output}");
    if cli.print_metrics {
        println!("{}", metrics_handle.render());
    }
    Ok(())
}

async fn run(command: Command, config: &GatekeeperConfig) -> Result<String> {
    let service = PolicyService::in_memory(config);
    match command {
        Command::Sync { manifest } => {
            let manifest = load_manifest(manifest, config)?;
            let report = service
                .synchronize(&manifest)
                .await
                .context("synchronize catalog")?;
            Ok(format!(
                "backend={} {report}",
                service.catalog().backend_name()
            ))
        }
        Command::Check(args) => {
            let manifest = load_manifest(args.manifest.clone(), config)?;
            service
                .synchronize(&manifest)
                .await
                .context("synchronize catalog")?;
            let action: Action = args
                .action
                .parse()
                .with_context(|| format!("parse action {:?}", args.action))?;
            let mut principal = Principal::new(args.principal.clone());
            if let Some(raw) = &args.attributes {
                principal.attributes = parse_object(raw, "attributes")?;
            }
            let resource = args
                .resource
                .as_deref()
                .map(|raw| parse_object(raw, "resource").map(Value::Object))
                .transpose()?;
            let session = Session::new(principal, args.roles.iter().map(String::as_str));
            let outcome = service
                .evaluate(Some(&session), action, &args.subject, resource.as_ref())
                .await;
            Ok(match outcome.decision {
                GateDecision::Authorized => {
                    format!("decision=allow fields={}", outcome.allowed_fields)
                }
                GateDecision::Denied(err) => format!("decision=deny error=\"{err}\""),
            })
        }
    }
}

fn load_manifest(path: Option<PathBuf>, config: &GatekeeperConfig) -> Result<Manifest> {
    let Some(path) = path.or_else(|| config.manifest.clone()) else {
        bail!("no manifest given (pass --manifest or set WARDEN_MANIFEST)");
    };
    Manifest::load(&path)
}

fn parse_object(raw: &str, what: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw).with_context(|| format!("parse {what} json"))? {
        Value::Object(map) => Ok(map),
        _ => bail!("{what} must be a JSON object"),
    }
}
