//! Logical sharding over physical database servers
//!
//! Provides routing and fan-out for a cluster of many logical shards spread
//! evenly over a few physical servers:
//! - Number / id to shard and server mapping
//! - Fixed-size sub-cluster windows
//! - Concurrent per-server and per-shard fan-out with a single error result
//! - 64-bit ids embedding time, shard and sequence

pub mod cluster;
pub mod config;
pub mod error;
mod fanout;
pub mod idgen;
pub mod server;
pub mod shard;
pub mod subcluster;

// Re-export commonly used types
pub use cluster::Cluster;
pub use config::{ClusterConfig, ConfigError, PartialClusterConfig};
pub use error::{ShardingError, TopologyError};
pub use idgen::{IdError, IdGen, SplitId};
pub use server::Server;
pub use shard::{Shard, ShardParams};
pub use subcluster::SubCluster;
