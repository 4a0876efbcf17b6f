//! Error types for cluster construction and routing

use thiserror::Error;

use crate::config::ConfigError;
use crate::idgen::IdError;

/// Topology invariant violations found while building a cluster
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("At least one server is required")]
    NoServers,
    #[error("At least one shard is required")]
    NoShards,
    #[error("Too many shards: {shard_count} shards on {server_count} servers, id layout allows {max}")]
    TooManyShards {
        shard_count: usize,
        server_count: usize,
        max: usize,
    },
    #[error("Number of shards ({shard_count}) must be greater or equal number of servers ({server_count})")]
    FewerShardsThanServers {
        shard_count: usize,
        server_count: usize,
    },
    #[error("Number of shards ({shard_count}) must be divisible by number of servers ({server_count})")]
    UnevenDistribution {
        shard_count: usize,
        server_count: usize,
    },
}

/// Errors returned by the sharding library
#[derive(Debug, Error)]
pub enum ShardingError {
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Id error: {0}")]
    Id(#[from] IdError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
