//! listener-priority - rule priorities for shared ELBv2 listeners
//!
//! ## Usage
//!
//! ```bash
//! # Priority for a hostname (existing rule, or the lowest stable free one)
//! listener-priority allocate --listener-arn arn:aws:elasticloadbalancing:... --hostname svc.example.com
//!
//! # Existing priority only, no allocation
//! listener-priority lookup --listener-arn arn:... --hostname svc.example.com
//!
//! # Next free priority on several listeners at once
//! listener-priority next-free --listener-arn arn:...a --listener-arn arn:...b
//!
//! # CloudFormation custom resource (event on stdin, response PUT to ResponseURL)
//! listener-priority custom-resource < event.json
//! ```

use clap::{Parser, Subcommand};
use listener_priority::{
    create_rule_store, AllocatorConfig, CallbackResponder, CustomResourceEvent, DirectRequest,
    PriorityService,
};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Listener Priority: collision-free ELBv2 rule priorities
#[derive(Parser)]
#[command(name = "listener-priority")]
#[command(about = "Allocate collision-free rule priorities on shared ELBv2 listeners", long_about = None)]
struct Cli {
    /// AWS region (default: provider chain)
    #[arg(long, global = true)]
    region: Option<String>,

    /// JSON config file (flags below override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Quiet interval between stabilization reads (seconds)
    #[arg(long, global = true)]
    interval_secs: Option<u64>,

    /// Give up on an allocation after this many seconds (default: never)
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// DescribeRules page size (1-400)
    #[arg(long, global = true)]
    page_size: Option<i32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Return the priority for a hostname, allocating the lowest free one if needed
    Allocate {
        /// Listener ARN
        #[arg(long)]
        listener_arn: String,

        /// Hostname routed by the rule
        #[arg(long)]
        hostname: String,

        /// Upper bound for a new priority (default: 50000)
        #[arg(long)]
        max_priority: Option<u32>,
    },

    /// Print the priority of the rule already routing a hostname
    Lookup {
        /// Listener ARN
        #[arg(long)]
        listener_arn: String,

        /// Hostname routed by the rule
        #[arg(long)]
        hostname: String,
    },

    /// Print the stabilized next free priority of each listener
    NextFree {
        /// Listener ARNs (repeatable)
        #[arg(long = "listener-arn", required = true)]
        listener_arns: Vec<String>,
    },

    /// Handle a CloudFormation custom-resource event
    CustomResource {
        /// Event file (default: stdin)
        #[arg(long)]
        event: Option<PathBuf>,

        /// Print the response instead of delivering it to ResponseURL
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "listener_priority=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let store = create_rule_store(&config).await;
    let service = PriorityService::new(store, &config);

    match cli.command {
        Commands::Allocate {
            listener_arn,
            hostname,
            max_priority,
        } => {
            let mut request = DirectRequest::new(listener_arn, hostname);
            request.max_priority = max_priority;

            let response = service.handle_direct(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if !response.is_success() {
                anyhow::bail!("allocation failed with status {}", response.status_code);
            }
            Ok(())
        }

        Commands::Lookup {
            listener_arn,
            hostname,
        } => match service.allocator().lookup(&listener_arn, &hostname).await? {
            Some(priority) => {
                println!("{}", priority);
                Ok(())
            }
            None => anyhow::bail!("no rule routes {} on {}", hostname, listener_arn),
        },

        Commands::NextFree { listener_arns } => next_free(&service, &listener_arns).await,

        Commands::CustomResource { event, dry_run } => {
            handle_custom_resource(&service, event, dry_run).await
        }
    }
}

/// Merge the config file (if any) with CLI overrides
fn build_config(cli: &Cli) -> anyhow::Result<AllocatorConfig> {
    let mut config = match &cli.config {
        Some(path) => AllocatorConfig::from_file(path)?,
        None => AllocatorConfig::default(),
    };

    if let Some(region) = &cli.region {
        config = config.with_region(region.clone());
    }
    if let Some(secs) = cli.interval_secs {
        config = config.with_interval_secs(secs);
    }
    if cli.deadline_secs.is_some() {
        config = config.with_deadline_secs(cli.deadline_secs);
    }
    if cli.page_size.is_some() {
        config = config.with_page_size(cli.page_size);
    }

    config.validate()?;
    Ok(config)
}

/// Stabilize every listener concurrently; each one has its own priority space
async fn next_free<S: listener_priority::RuleStore>(
    service: &PriorityService<S>,
    listener_arns: &[String],
) -> anyhow::Result<()> {
    info!(listeners = listener_arns.len(), "Computing next free priorities");

    let results = futures::future::join_all(listener_arns.iter().map(|arn| async move {
        (arn, service.allocator().next_free(arn).await)
    }))
    .await;

    let mut failures = 0;
    for (arn, result) in results {
        match result {
            Ok(priority) => println!("{}\t{}", arn, priority),
            Err(e) => {
                error!(listener = %arn, error = %e, "Failed to compute next free priority");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} listeners failed", failures, listener_arns.len());
    }
    Ok(())
}

/// Read, handle and answer one custom-resource event
async fn handle_custom_resource<S: listener_priority::RuleStore>(
    service: &PriorityService<S>,
    event_path: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let raw = match event_path {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            raw
        }
    };

    let event = CustomResourceEvent::from_json(&raw)?;
    let response = service.handle_custom_resource(&event).await;

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    info!(response_url = %event.response_url, "Sending response to CloudFormation");
    let responder = CallbackResponder::new()?;
    responder.deliver(&event.response_url, &response).await?;

    Ok(())
}
