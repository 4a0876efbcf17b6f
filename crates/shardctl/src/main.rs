//! shardctl - inspect shard routing and ids of a sharded cluster
//!
//! Builds the cluster topology from a YAML configuration (and command line
//! overrides) without connecting to any server, then answers routing
//! questions about it.

mod server;

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use sharding::{Cluster, ClusterConfig, IdGen, PartialClusterConfig};

use crate::server::NamedServer;

/// shardctl command line
#[derive(Parser, Debug)]
#[command(name = "shardctl")]
#[command(about = "Inspect shard routing and ids of a sharded cluster")]
struct Args {
    /// Configuration file path (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of logical shards
    #[arg(short, long)]
    shard_count: Option<usize>,

    /// Servers in placement order, comma separated (may repeat)
    #[arg(long, value_delimiter = ',')]
    servers: Vec<String>,

    /// Shards of one server processed concurrently
    #[arg(long)]
    shard_concurrency: Option<usize>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode an id into time, shard and sequence and locate its shard
    SplitId {
        #[arg(allow_hyphen_values = true)]
        id: i64,
    },
    /// Mint the id for a time, shard and sequence
    NextId {
        /// RFC 3339 time, defaults to now
        #[arg(long, value_parser = parse_time)]
        time: Option<DateTime<Utc>>,
        #[arg(long)]
        shard: i64,
        #[arg(long, default_value = "0")]
        seq: i64,
    },
    /// Smallest and largest id of a millisecond
    IdRange {
        /// RFC 3339 time, defaults to now
        #[arg(long, value_parser = parse_time)]
        time: Option<DateTime<Utc>>,
    },
    /// Map a number to its shard and server
    Locate {
        #[arg(allow_hyphen_values = true)]
        number: i64,
    },
    /// List the shards of a sub-cluster window
    SubCluster {
        #[arg(allow_hyphen_values = true)]
        number: i64,
        size: usize,
    },
    /// List every server with the shards it hosts
    Topology,
}

impl Args {
    /// Config fields given on the command line
    fn overrides(&self) -> PartialClusterConfig {
        let mut overlay = PartialClusterConfig::default();
        overlay.shard_count = self.shard_count;
        overlay.servers = (!self.servers.is_empty()).then(|| self.servers.clone());
        overlay.fan_out.shard_concurrency = self.shard_concurrency;
        overlay.log.level = self.log_level.clone();
        overlay
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration from file if specified, otherwise use defaults
    let mut config = match &args.config {
        Some(path) => ClusterConfig::from_file(path)?,
        None => ClusterConfig::default(),
    };

    // Override config with command line arguments
    config.merge(args.overrides());

    // Initialize logging
    let level = match config.log.level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let cluster = Cluster::from_config(server::handles(&config.servers), &config)?;
    run(&cluster, &config, args.command).await?;
    cluster.close().await?;

    Ok(())
}

async fn run(
    cluster: &Cluster<NamedServer>,
    config: &ClusterConfig,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    let id_gen: IdGen = *cluster.id_gen();

    match command {
        Command::SplitId { id } => {
            let split = id_gen.split_id(id)?;
            let shard = cluster.split_shard(id)?;
            println!("time:   {}", split.time.to_rfc3339());
            println!("shard:  {}", split.shard);
            println!("seq:    {}", split.seq);
            println!("routed: {} on {}", shard, shard.server().name);
        }
        Command::NextId { time, shard, seq } => {
            let tm = time.unwrap_or_else(Utc::now);
            println!("{}", id_gen.next_id(tm, shard, seq)?);
        }
        Command::IdRange { time } => {
            let tm = time.unwrap_or_else(Utc::now);
            println!("min: {}", id_gen.min_id(tm)?);
            println!("max: {}", id_gen.max_id(tm)?);
        }
        Command::Locate { number } => {
            let shard = cluster.shard(number);
            println!("shard:  {}", shard);
            println!("server: {}", cluster.db(number).name);
        }
        Command::SubCluster { number, size } => {
            let sub = cluster.sub_cluster(number, size);
            for (local, shard) in sub.shards().iter().enumerate() {
                println!("{:>4} {} on {}", local, shard, shard.server().name);
            }
        }
        Command::Topology => {
            let placed = Arc::new(Mutex::new(Vec::new()));
            let placed_c = placed.clone();
            cluster
                .for_each_n_shards(config.fan_out.shard_concurrency, move |shard| {
                    let placed = placed_c.clone();
                    async move {
                        debug!("Visiting {}", shard);
                        placed.lock().push((shard.server().name.clone(), shard.id()));
                        Ok::<(), Infallible>(())
                    }
                })
                .await?;

            let mut placed = placed.lock().clone();
            placed.sort();
            for server in cluster.distinct_servers() {
                let shards: Vec<String> = placed
                    .iter()
                    .filter(|(name, _)| *name == server.name)
                    .map(|(_, id)| id.to_string())
                    .collect();
                println!("{}: {} shards [{}]", server.name, shards.len(), shards.join(", "));
            }
        }
    }

    Ok(())
}
