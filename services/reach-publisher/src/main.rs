//! Reach publisher service.
//!
//! Runs one pipeline stage per invocation, driven by an object-created
//! notification, and prints the run response as JSON.

mod event;
mod handler;
mod secrets;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pipeline::{PipelineConfig, RunContext};
use publisher::MemoryFeatureHost;
use storage::Buckets;

use event::ObjectEvent;
use handler::Trigger;
use secrets::SecretBackend;

#[derive(Parser, Debug)]
#[command(name = "reach-publisher")]
#[command(about = "Publishes reach-model output as river-line feature layers")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Secret parameter source
    #[arg(long, global = true, value_enum, env = "SECRET_SOURCE", default_value = "ssm")]
    secrets: SecretBackend,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a model output file and publish the joined layers
    Stage1 {
        /// Event document path, `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,
    },
    /// Reduce the threshold summary and publish the final layer
    Stage2 {
        /// Event document path; only logged
        #[arg(long)]
        event: Option<String>,

        /// Keep run containers in the scratch directory
        #[arg(long)]
        retain_scratch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting reach publisher");

    let mut config = PipelineConfig::from_env()?;
    let trigger = match &args.command {
        Command::Stage1 { event } => {
            let raw = handler::read_event(event).await?;
            let event = ObjectEvent::parse(&raw)?;
            info!(bucket = %event.bucket, key = %event.key, "Received object event");
            Trigger::StageOne(event)
        }
        Command::Stage2 {
            event,
            retain_scratch,
        } => {
            if let Some(path) = event {
                let raw = handler::read_event(path).await?;
                info!(event = %raw.trim(), "Received stage 2 event");
            }
            config.retain_scratch |= *retain_scratch;
            Trigger::StageTwo
        }
    };

    let secrets = secrets::source(args.secrets).await;
    let credentials = secrets::resolve_credentials(&config, secrets.as_ref()).await?;

    let buckets = Buckets::s3(config.storage.clone());
    let ctx = RunContext::new(config, buckets, Arc::new(MemoryFeatureHost::new()), credentials);

    let response = handler::handle(&ctx, trigger).await;
    println!("{}", serde_json::to_string(&response)?);

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
