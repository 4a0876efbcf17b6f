//! Physical server handle contract

use async_trait::async_trait;

/// A physical database server (or connection pool) hosting shards
///
/// Implemented by the query execution layer. A cluster holds servers as
/// `Arc<S>` and treats two handles as the same server only when they point to
/// the same allocation; equal connection parameters do not make two handles
/// equal.
#[async_trait]
pub trait Server: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Release the server's connections
    ///
    /// Called at most once per distinct server by [`Cluster::close`](crate::Cluster::close).
    async fn close(&self) -> Result<(), Self::Error>;
}
