//! Concurrent fan-out over servers and shards
//!
//! Every fan-out call spawns its work on the tokio runtime, waits for all of
//! it, and reports at most one error: the first one delivered by any task.
//! Tasks are never cancelled because a sibling failed.
//!
//! Shard fan-out is grouped by server: each distinct server gets one task
//! which runs that server's shards with at most `n` in flight, so the load on
//! any single server is bounded while servers proceed in parallel.

use std::future::Future;
use std::panic;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::shard::Shard;

/// Call-scoped slot that keeps the first reported error
struct FirstError<E> {
    tx: mpsc::Sender<E>,
    rx: mpsc::Receiver<E>,
}

impl<E> FirstError<E> {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx }
    }

    fn reporter(&self) -> ErrorReporter<E> {
        ErrorReporter(self.tx.clone())
    }

    fn into_result(mut self) -> Result<(), E> {
        drop(self.tx);
        match self.rx.try_recv() {
            Ok(err) => Err(err),
            Err(_) => Ok(()),
        }
    }
}

/// Write side of [`FirstError`]; never blocks
struct ErrorReporter<E>(mpsc::Sender<E>);

impl<E> ErrorReporter<E> {
    fn report(&self, err: E) {
        if self.0.try_send(err).is_err() {
            debug!("Fan-out error dropped, an earlier error is already recorded");
        }
    }
}

/// Wait for every task; re-raise the first panic once all have finished
async fn join_all(mut tasks: JoinSet<()>) {
    let mut panicked = None;
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            if e.is_panic() && panicked.is_none() {
                panicked = Some(e.into_panic());
            }
        }
    }
    if let Some(payload) = panicked {
        panic::resume_unwind(payload);
    }
}

/// Run `f` once per server, all servers in parallel
pub(crate) async fn for_each_server<S, F, Fut, E>(servers: &[Arc<S>], f: F) -> Result<(), E>
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
{
    let f = Arc::new(f);
    let errors = FirstError::new();
    let mut tasks = JoinSet::new();

    for server in servers {
        let f = f.clone();
        let server = server.clone();
        let reporter = errors.reporter();
        tasks.spawn(async move {
            if let Err(e) = f(server).await {
                reporter.report(e);
            }
        });
    }
    trace!("Fan-out started on {} servers", servers.len());

    join_all(tasks).await;
    errors.into_result()
}

/// Run `f` once per shard in `shards`, grouped by the server in `servers`
/// that hosts it, with at most `n` shards per server in flight
///
/// `n == 0` is treated as 1. Servers without any shard in `shards` still get
/// a task, which finishes immediately.
pub(crate) async fn for_each_shard_group<S, F, Fut, E>(
    servers: &[Arc<S>],
    shards: &[Shard<S>],
    n: usize,
    f: F,
) -> Result<(), E>
where
    S: Send + Sync + 'static,
    F: Fn(Shard<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
{
    let n = n.max(1);
    let f = Arc::new(f);
    let errors = FirstError::new();
    let mut tasks = JoinSet::new();

    for server in servers {
        let group: Vec<Shard<S>> = shards.iter().filter(|s| s.is_on(server)).cloned().collect();
        let f = f.clone();
        let reporter = errors.reporter();
        tasks.spawn(async move {
            let res = if n == 1 {
                run_sequential(group, f).await
            } else {
                run_bounded(group, n, f).await
            };
            if let Err(e) = res {
                reporter.report(e);
            }
        });
    }
    trace!(
        "Shard fan-out started: {} shards on {} servers, {} per server",
        shards.len(),
        servers.len(),
        n
    );

    join_all(tasks).await;
    errors.into_result()
}

/// One shard at a time in ascending index order; keeps the first error
async fn run_sequential<S, F, Fut, E>(group: Vec<Shard<S>>, f: Arc<F>) -> Result<(), E>
where
    F: Fn(Shard<S>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut first_err = None;
    for shard in group {
        if let Err(e) = f(shard).await {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Up to `n` shards in flight; a permit is taken before each spawn
async fn run_bounded<S, F, Fut, E>(group: Vec<Shard<S>>, n: usize, f: Arc<F>) -> Result<(), E>
where
    S: Send + Sync + 'static,
    F: Fn(Shard<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
{
    run_limited(group, Arc::new(Semaphore::new(n)), f).await
}

/// Spawn each shard once a permit of `limit` is free
///
/// A closed semaphore lifts the limit; shards are never skipped.
async fn run_limited<S, F, Fut, E>(
    group: Vec<Shard<S>>,
    limit: Arc<Semaphore>,
    f: Arc<F>,
) -> Result<(), E>
where
    S: Send + Sync + 'static,
    F: Fn(Shard<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
{
    let errors = FirstError::new();
    let mut tasks = JoinSet::new();

    for shard in group {
        let permit = limit.clone().acquire_owned().await.ok();
        let f = f.clone();
        let reporter = errors.reporter();
        tasks.spawn(async move {
            let _permit = permit;
            if let Err(e) = f(shard).await {
                reporter.report(e);
            }
        });
    }

    join_all(tasks).await;
    errors.into_result()
}
