//! Fixed-size windows over a cluster's shards
//!
//! A sub-cluster narrows which shards an operation touches, not which
//! servers take part: fan-out still goes through every server of the parent
//! cluster, and servers without a shard in the window simply do nothing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::cluster::Cluster;
use crate::fanout;
use crate::idgen::IdError;
use crate::shard::Shard;

/// Contiguous window of shards, renumbered from 0
pub struct SubCluster<S> {
    cluster: Cluster<S>,
    shards: Vec<Shard<S>>,
}

impl<S> SubCluster<S> {
    pub(crate) fn new(cluster: Cluster<S>, shards: Vec<Shard<S>>) -> Self {
        Self { cluster, shards }
    }

    /// Parent cluster
    pub fn cluster(&self) -> &Cluster<S> {
        &self.cluster
    }

    /// Shards in the window, in index order
    pub fn shards(&self) -> &[Shard<S>] {
        &self.shards
    }

    /// Map a number to a shard of the window
    pub fn shard(&self, number: i64) -> &Shard<S> {
        let number = number.rem_euclid(self.shards.len() as i64);
        &self.shards[number as usize]
    }

    /// Decode `id` and map its shard number into the window
    pub fn split_shard(&self, id: i64) -> Result<&Shard<S>, IdError> {
        let split = self.cluster.id_gen().split_id(id)?;
        Ok(self.shard(split.shard))
    }
}

impl<S> SubCluster<S>
where
    S: Send + Sync + 'static,
{
    /// Call `f` concurrently on each distinct server of the parent cluster
    pub async fn for_each_db<F, Fut, E>(&self, f: F) -> Result<(), E>
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        self.cluster.for_each_db(f).await
    }

    /// Call `f` on each shard of the window, one shard per server at a time
    pub async fn for_each_shard<F, Fut, E>(&self, f: F) -> Result<(), E>
    where
        F: Fn(Shard<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        self.for_each_n_shards(1, f).await
    }

    /// Call `f` on each shard of the window with at most `n` per server in flight
    pub async fn for_each_n_shards<F, Fut, E>(&self, n: usize, f: F) -> Result<(), E>
    where
        F: Fn(Shard<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        fanout::for_each_shard_group(self.cluster.distinct_servers(), &self.shards, n, f).await
    }
}

impl<S> Clone for SubCluster<S> {
    fn clone(&self) -> Self {
        Self {
            cluster: self.cluster.clone(),
            shards: self.shards.clone(),
        }
    }
}

impl<S> fmt::Debug for SubCluster<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubCluster")
            .field("shards", &self.shards.iter().map(Shard::id).collect::<Vec<_>>())
            .finish()
    }
}
