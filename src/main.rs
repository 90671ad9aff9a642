//! WolfTopo - MariaDB Replication Topology Manager
//!
//! Command line front end for inspecting and rearranging replication trees.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolftopo::config::WolfTopoConfig;
use wolftopo::discovery::replication_tree;
use wolftopo::error::{Error, Result};
use wolftopo::executor::{Connector, MariaDbConnector};
use wolftopo::instance::Instance;
use wolftopo::replication::{MoveReport, Replication, ReplicationOptions};
use wolftopo::status::{GtidMode, ReplicationThread};

/// WolfTopo - MariaDB Replication Topology Manager
#[derive(Parser)]
#[command(name = "wolftopo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolftopo.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print machine readable JSON where supported
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show replication status of one or more instances
    Status {
        /// Instances (host[:port])
        #[arg(required = true)]
        instances: Vec<String>,
    },

    /// List the replicas connected to an instance
    Replicas {
        instance: String,
    },

    /// Print the replication tree below an instance
    Tree {
        instance: String,

        /// Maximum depth (defaults to topology.max_tree_depth)
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Show how one instance relates to another
    Relationship {
        instance: String,
        other: String,
    },

    /// Start replication threads
    Start {
        instance: String,

        /// Only start this thread (io, sql)
        #[arg(long)]
        thread: Option<ReplicationThread>,
    },

    /// Stop replication threads
    Stop {
        instance: String,

        /// Only stop this thread (io, sql)
        #[arg(long)]
        thread: Option<ReplicationThread>,
    },

    /// Change the GTID mode of a replica
    Gtid {
        instance: String,

        /// no, slave_pos or current_pos
        mode: GtidMode,
    },

    /// Make a replica replicate from a new master
    Move {
        replica: String,
        new_master: String,

        /// Start both threads afterwards even if they were stopped
        #[arg(long)]
        start_if_stopped: bool,

        /// Override topology.timeout_ms, in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolftopo.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            run_init(output)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            run_validate(&cli.config)
        }
        command => {
            let config = WolfTopoConfig::from_file(&cli.config)?;
            init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level));
            let ctx = Context::new(config);
            run_command(&ctx, command, cli.json).await
        }
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Everything needed to open handles to instances
struct Context {
    config: WolfTopoConfig,
    connector: Arc<dyn Connector>,
}

impl Context {
    fn new(config: WolfTopoConfig) -> Self {
        let connector = Arc::new(MariaDbConnector::new(
            config.connection.clone(),
            config.replication.clone(),
        ));
        Self { config, connector }
    }

    fn options(&self) -> ReplicationOptions {
        ReplicationOptions::from_config(&self.config.topology, self.config.replication.ssl)
    }

    fn instance(&self, address: &str) -> Result<Instance> {
        Instance::parse(address, self.config.connection.default_port)
    }

    async fn open(&self, address: &str, options: ReplicationOptions) -> Result<Replication> {
        let instance = self.instance(address)?;
        Replication::connect(&instance, Arc::clone(&self.connector), options).await
    }
}

async fn run_command(ctx: &Context, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Status { instances } => run_status(ctx, &instances, json).await,
        Commands::Replicas { instance } => run_replicas(ctx, &instance, json).await,
        Commands::Tree { instance, max_depth } => run_tree(ctx, &instance, max_depth, json).await,
        Commands::Relationship { instance, other } => run_relationship(ctx, &instance, &other, json).await,
        Commands::Start { instance, thread } => {
            let replication = ctx.open(&instance, ctx.options()).await?;
            let status = replication.start_slave(thread, None).await?;
            println!("{}> {}", replication.instance().name(), status);
            Ok(())
        }
        Commands::Stop { instance, thread } => {
            let replication = ctx.open(&instance, ctx.options()).await?;
            let status = replication.stop_slave(thread).await?;
            println!("{}> {}", replication.instance().name(), status);
            Ok(())
        }
        Commands::Gtid { instance, mode } => {
            let replication = ctx.open(&instance, ctx.options()).await?;
            replication.set_gtid_mode(mode).await?;
            println!("{}", replication.describe().await);
            Ok(())
        }
        Commands::Move {
            replica,
            new_master,
            start_if_stopped,
            timeout,
        } => run_move(ctx, &replica, &new_master, start_if_stopped, timeout, json).await,
        Commands::Init { .. } | Commands::Validate => Ok(()),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize output: {}", e)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", to_json(value)?);
    Ok(())
}

/// Show replication status
async fn run_status(ctx: &Context, instances: &[String], json: bool) -> Result<()> {
    let mut statuses = Vec::new();
    for address in instances {
        let replication = ctx.open(address, ctx.options()).await?;
        if json {
            statuses.push(serde_json::json!({
                "instance": replication.instance(),
                "slave_status": replication.slave_status().await?,
                "master_status": replication.master_status().await?,
            }));
        } else {
            println!("{}", replication.describe().await);
        }
    }

    if json {
        print_json(&statuses)?;
    }
    Ok(())
}

/// List replicas
async fn run_replicas(ctx: &Context, address: &str, json: bool) -> Result<()> {
    let replication = ctx.open(address, ctx.options()).await?;
    let replicas = replication.replicas().await;

    if json {
        let instances: Vec<&Instance> = replicas.iter().map(|r| r.instance()).collect();
        return print_json(&instances);
    }
    for replica in &replicas {
        println!("{}", replica.instance());
    }
    Ok(())
}

/// Print the replication tree
async fn run_tree(ctx: &Context, address: &str, max_depth: Option<usize>, json: bool) -> Result<()> {
    let replication = ctx.open(address, ctx.options()).await?;
    let depth = max_depth.unwrap_or(ctx.config.topology.max_tree_depth);
    let tree = replication_tree(&replication, depth).await;

    if json {
        return print_json(&tree);
    }
    print!("{}", tree);
    Ok(())
}

/// Show the relationship between two instances
async fn run_relationship(ctx: &Context, address: &str, other: &str, json: bool) -> Result<()> {
    let a = ctx.open(address, ctx.options()).await?;
    let b = ctx.open(other, ctx.options()).await?;
    let relationship = a.relationship_to(&b).await;

    if json {
        return print_json(&serde_json::json!({
            "instance": a.instance(),
            "other": b.instance(),
            "relationship": relationship,
        }));
    }
    println!("{} is {} {}", a.instance().name(), relationship, b.instance().name());
    Ok(())
}

/// Move a replica under a new master
async fn run_move(
    ctx: &Context,
    replica: &str,
    new_master: &str,
    start_if_stopped: bool,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut options = ctx.options();
    if let Some(secs) = timeout {
        options.timeout = Duration::from_secs(secs);
    }

    let source = ctx.open(replica, options.clone()).await?;
    let target = ctx.open(new_master, options).await?;

    // JSON mode prints the report alone
    if !json {
        println!("Before:");
        println!("  {}", source.describe().await);
        println!("  {}", target.describe().await);
    }

    let report = source.move_to(&target, start_if_stopped).await?;

    let after = if json {
        Vec::new()
    } else {
        vec![source.describe().await, target.describe().await]
    };
    print!("{}", move_summary(&report, &after, json)?);
    Ok(())
}

/// Output once a move finished
fn move_summary(report: &MoveReport, after: &[String], json: bool) -> Result<String> {
    if json {
        return Ok(format!("{}\n", to_json(report)?));
    }

    let mut out = format!(
        "Moved using {} in {} ms\nAfter:\n",
        report.strategy,
        (report.finished_at - report.started_at).num_milliseconds()
    );
    for line in after {
        out.push_str(&format!("  {}\n", line));
    }
    Ok(out)
}

/// Initialize a new configuration file
fn run_init(output: PathBuf) -> Result<()> {
    if output.exists() {
        return Err(Error::Config(format!("{} already exists", output.display())));
    }
    std::fs::write(&output, WolfTopoConfig::sample())?;
    println!("✓ Configuration written to {}", output.display());
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: &Path) -> Result<()> {
    match WolfTopoConfig::from_file(config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Connection: {}@(port {})", config.connection.user, config.connection.default_port);
            println!("  Replication user: {} (ssl: {})", config.replication.user, config.replication.ssl);
            println!("  Timeout: {} ms", config.topology.timeout_ms);
            println!("  Parallel connections: {}", config.topology.max_parallel_connections);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}
