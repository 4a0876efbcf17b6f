//! Cluster topology
//!
//! Maps many logical shards onto far fewer physical servers:
//! - Number to server and number to shard lookups
//! - Id to shard lookups through the cluster's [`IdGen`]
//! - Fan-out of an operation over every server or every shard
//!
//! The topology is fixed at construction. Shard `i` lives on
//! `servers[i % servers.len()]` for the lifetime of the cluster.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::error::{ShardingError, TopologyError};
use crate::fanout;
use crate::idgen::{IdError, IdGen};
use crate::server::Server;
use crate::shard::Shard;
use crate::subcluster::SubCluster;

struct ClusterInner<S> {
    id_gen: IdGen,
    /// Placement list as given, may repeat servers
    placement: Vec<Arc<S>>,
    /// Distinct servers in first-seen order
    servers: Vec<Arc<S>>,
    shards: Vec<Shard<S>>,
}

/// Logical shards over a fixed set of physical servers
///
/// Cheap to clone; clones share the same topology.
pub struct Cluster<S> {
    inner: Arc<ClusterInner<S>>,
}

impl<S> Clone for Cluster<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> fmt::Debug for Cluster<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("id_gen", &self.inner.id_gen)
            .field("shards", &self.inner.shards.len())
            .field("placement", &self.inner.placement.len())
            .field("servers", &self.inner.servers.len())
            .finish()
    }
}

impl<S> Cluster<S> {
    /// Create a cluster of `shard_count` shards over `servers` using the default id layout
    pub fn new(servers: Vec<Arc<S>>, shard_count: usize) -> Result<Self, TopologyError> {
        Self::with_id_gen(servers, shard_count, IdGen::default())
    }

    /// Create a cluster with a custom id layout
    ///
    /// Fails if there are no servers or shards, if either count exceeds
    /// [`IdGen::num_shards`], or if shards cannot be spread evenly over the
    /// servers.
    pub fn with_id_gen(
        servers: Vec<Arc<S>>,
        shard_count: usize,
        id_gen: IdGen,
    ) -> Result<Self, TopologyError> {
        validate(servers.len(), shard_count, &id_gen)?;

        let mut seen = HashSet::new();
        let distinct: Vec<Arc<S>> = servers
            .iter()
            .filter(|s| seen.insert(Arc::as_ptr(*s)))
            .cloned()
            .collect();

        let shards = (0..shard_count)
            .map(|i| Shard::new(i as i64, servers[i % servers.len()].clone(), id_gen.epoch_ms()))
            .collect();

        info!(
            "Cluster created: {} shards, {} placement slots, {} distinct servers",
            shard_count,
            servers.len(),
            distinct.len()
        );

        Ok(Self {
            inner: Arc::new(ClusterInner {
                id_gen,
                placement: servers,
                servers: distinct,
                shards,
            }),
        })
    }

    /// Create a cluster using shard count and id layout from configuration
    pub fn from_config(servers: Vec<Arc<S>>, config: &ClusterConfig) -> Result<Self, ShardingError> {
        let id_gen = IdGen::from_config(&config.id_gen)?;
        Ok(Self::with_id_gen(servers, config.shard_count, id_gen)?)
    }

    pub fn id_gen(&self) -> &IdGen {
        &self.inner.id_gen
    }

    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// Servers in placement order, duplicates included
    pub fn servers(&self) -> &[Arc<S>] {
        &self.inner.placement
    }

    /// Distinct servers in the order they first appear in the placement list
    pub fn distinct_servers(&self) -> &[Arc<S>] {
        &self.inner.servers
    }

    /// Map a number to the server hosting shard `number mod shard_count`
    pub fn db(&self, number: i64) -> &Arc<S> {
        // number -> shard -> server, the same path shard placement takes
        let number = number.rem_euclid(self.shard_count() as i64);
        let number = number.rem_euclid(self.inner.placement.len() as i64);
        &self.inner.placement[number as usize]
    }

    /// Shards hosted on `server`, or all shards if `server` is `None`, in index order
    pub fn shards(&self, server: Option<&Arc<S>>) -> Vec<Shard<S>> {
        match server {
            None => self.inner.shards.clone(),
            Some(server) => self
                .inner
                .shards
                .iter()
                .filter(|s| s.is_on(server))
                .cloned()
                .collect(),
        }
    }

    /// Map a number to its shard
    ///
    /// Negative numbers use the euclidean remainder, so `shard(-1)` is the
    /// last shard.
    pub fn shard(&self, number: i64) -> &Shard<S> {
        let number = number.rem_euclid(self.shard_count() as i64);
        &self.inner.shards[number as usize]
    }

    /// Decode `id` and return the shard it was minted on
    pub fn split_shard(&self, id: i64) -> Result<&Shard<S>, IdError> {
        let split = self.inner.id_gen.split_id(id)?;
        Ok(self.shard(split.shard))
    }

    /// Window of `size` consecutive shards selected by `number`
    ///
    /// `size` is clamped to `1..=shard_count`. There are
    /// `shard_count / size` windows and `number` picks one cyclically. When
    /// `size` does not divide the shard count, the trailing
    /// `shard_count % size` shards belong to no window.
    pub fn sub_cluster(&self, number: i64, size: usize) -> SubCluster<S> {
        let count = self.shard_count();
        let size = size.clamp(1, count);
        let step = (count / size) as i64;
        let offset = number.rem_euclid(step) as usize * size;

        debug!(
            "Sub-cluster {}: shards [{}, {}) of {}",
            number,
            offset,
            offset + size,
            count
        );
        SubCluster::new(self.clone(), self.inner.shards[offset..offset + size].to_vec())
    }
}

impl<S> Cluster<S>
where
    S: Send + Sync + 'static,
{
    /// Call `f` concurrently on each distinct server
    ///
    /// Waits for every call to finish and returns the first error reported.
    pub async fn for_each_db<F, Fut, E>(&self, f: F) -> Result<(), E>
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        fanout::for_each_server(&self.inner.servers, f).await
    }

    /// Call `f` on each shard, one shard per server at a time
    ///
    /// Same as `for_each_n_shards(1, f)`: each server's shards run in
    /// ascending index order, servers run in parallel.
    pub async fn for_each_shard<F, Fut, E>(&self, f: F) -> Result<(), E>
    where
        F: Fn(Shard<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        self.for_each_n_shards(1, f).await
    }

    /// Call `f` on each shard with at most `n` shards per server in flight
    pub async fn for_each_n_shards<F, Fut, E>(&self, n: usize, f: F) -> Result<(), E>
    where
        F: Fn(Shard<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        fanout::for_each_shard_group(&self.inner.servers, &self.inner.shards, n, f).await
    }
}

impl<S: Server> Cluster<S> {
    /// Close every distinct server once
    ///
    /// All servers are closed even if some fail; the first failure is returned.
    pub async fn close(&self) -> Result<(), S::Error> {
        let mut first_err = None;
        for (i, server) in self.inner.servers.iter().enumerate() {
            if let Err(e) = server.close().await {
                warn!("Failed to close server {}: {}", i, e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        info!("Cluster closed: {} servers", self.inner.servers.len());
        first_err.map_or(Ok(()), Err)
    }
}

fn validate(server_count: usize, shard_count: usize, id_gen: &IdGen) -> Result<(), TopologyError> {
    if server_count == 0 {
        return Err(TopologyError::NoServers);
    }
    if shard_count == 0 {
        return Err(TopologyError::NoShards);
    }
    let max = id_gen.num_shards();
    if server_count > max || shard_count > max {
        return Err(TopologyError::TooManyShards {
            shard_count,
            server_count,
            max,
        });
    }
    if shard_count < server_count {
        return Err(TopologyError::FewerShardsThanServers {
            shard_count,
            server_count,
        });
    }
    if shard_count % server_count != 0 {
        return Err(TopologyError::UnevenDistribution {
            shard_count,
            server_count,
        });
    }
    Ok(())
}
