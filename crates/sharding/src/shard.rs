//! Logical shard handles
//!
//! Defines the per-shard parameter context and the shard handle bound to
//! its physical server.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Name of the logical shard with index `id`
pub fn shard_name(id: i64) -> String {
    format!("shard{}", id)
}

/// Parameters a shard passes down to query execution
///
/// The execution layer uses them to reach the right partition on the
/// server, typically a schema named after the shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardParams {
    /// Shard index
    pub shard_id: i64,
    /// Shard name (`shard<index>`)
    pub shard: String,
    /// Id epoch in unix milliseconds
    pub epoch_ms: i64,
}

impl ShardParams {
    pub fn new(shard_id: i64, epoch_ms: i64) -> Self {
        Self {
            shard_id,
            shard: shard_name(shard_id),
            epoch_ms,
        }
    }

    /// Substitute `?shard_id`, `?shard` and `?epoch` in `query`
    ///
    /// Placeholders are matched longest first so `?shard_id` is never read as
    /// `?shard` followed by `_id`.
    pub fn render(&self, query: &str) -> String {
        let shard_id = self.shard_id.to_string();
        let epoch = self.epoch_ms.to_string();
        let placeholders: [(&str, &str); 3] = [
            ("?shard_id", shard_id.as_str()),
            ("?shard", self.shard.as_str()),
            ("?epoch", epoch.as_str()),
        ];

        let mut out = String::with_capacity(query.len());
        let mut rest = query;
        'scan: while let Some(pos) = rest.find('?') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos..];
            for (name, value) in placeholders {
                if rest.starts_with(name) {
                    out.push_str(value);
                    rest = &rest[name.len()..];
                    continue 'scan;
                }
            }
            out.push('?');
            rest = &rest[1..];
        }
        out.push_str(rest);
        out
    }
}

/// Logical shard bound to one physical server
///
/// Created once when the cluster is built and never rebound.
pub struct Shard<S> {
    params: ShardParams,
    server: Arc<S>,
}

impl<S> Shard<S> {
    pub(crate) fn new(id: i64, server: Arc<S>, epoch_ms: i64) -> Self {
        Self {
            params: ShardParams::new(id, epoch_ms),
            server,
        }
    }

    /// Shard index within the cluster
    pub fn id(&self) -> i64 {
        self.params.shard_id
    }

    pub fn name(&self) -> &str {
        &self.params.shard
    }

    pub fn params(&self) -> &ShardParams {
        &self.params
    }

    /// Server hosting this shard
    pub fn server(&self) -> &Arc<S> {
        &self.server
    }

    /// Whether this shard lives on `server` (identity comparison)
    pub fn is_on(&self, server: &Arc<S>) -> bool {
        Arc::ptr_eq(&self.server, server)
    }
}

// Manual impls: a shard is cloneable and comparable whatever the server type is.
impl<S> Clone for Shard<S> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            server: self.server.clone(),
        }
    }
}

impl<S> PartialEq for Shard<S> {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params && Arc::ptr_eq(&self.server, &other.server)
    }
}

impl<S> Eq for Shard<S> {}

impl<S> fmt::Debug for Shard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.params.shard_id)
            .field("name", &self.params.shard)
            .field("server", &Arc::as_ptr(&self.server))
            .finish()
    }
}

impl<S> fmt::Display for Shard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.params.shard)
    }
}
