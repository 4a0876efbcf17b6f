mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sharding::{Cluster, Shard};

use common::{MockError, MockServer};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Placement `[a, a, b, b]` over 8 shards
fn duplicated_cluster() -> (Cluster<MockServer>, Arc<MockServer>, Arc<MockServer>) {
    let a = MockServer::new("a");
    let b = MockServer::new("b");
    let placement = vec![a.clone(), a.clone(), b.clone(), b.clone()];
    (Cluster::new(placement, 8).unwrap(), a, b)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_for_each_db_once_per_distinct_server() {
    init_logging();
    let a = MockServer::new("a");
    let b = MockServer::new("b");
    let cluster = Cluster::new(vec![a.clone(), a.clone(), b.clone(), b.clone()], 4).unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let calls_c = calls.clone();
    let res: Result<(), MockError> = cluster
        .for_each_db(move |server| {
            let calls = calls_c.clone();
            async move {
                calls.lock().push(server.name.clone());
                Ok(())
            }
        })
        .await;

    assert!(res.is_ok());
    let mut names = calls.lock().clone();
    names.sort();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_for_each_shard_ascending_per_server() {
    init_logging();
    let (cluster, a, b) = duplicated_cluster();

    let seen: Arc<Mutex<HashMap<String, Vec<i64>>>> = Arc::new(Mutex::new(HashMap::new()));
    let seen_c = seen.clone();
    let res: Result<(), MockError> = cluster
        .for_each_shard(move |shard: Shard<MockServer>| {
            let seen = seen_c.clone();
            async move {
                // Yield so a concurrent sibling on the same server would interleave
                tokio::time::sleep(Duration::from_millis(2)).await;
                seen.lock()
                    .entry(shard.server().name.clone())
                    .or_default()
                    .push(shard.id());
                Ok(())
            }
        })
        .await;

    assert!(res.is_ok());
    let seen = seen.lock();
    assert_eq!(seen[&a.name], vec![0, 1, 4, 5]);
    assert_eq!(seen[&b.name], vec![2, 3, 6, 7]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_for_each_shard_matches_n_equals_one() {
    let (cluster, _a, _b) = duplicated_cluster();

    async fn collect(cluster: &Cluster<MockServer>, n: Option<usize>) -> (Vec<i64>, Option<String>) {
        let ids = Arc::new(Mutex::new(Vec::new()));
        let ids_c = ids.clone();
        let f = move |shard: Shard<MockServer>| {
            let ids = ids_c.clone();
            async move {
                ids.lock().push(shard.id());
                if shard.id() == 5 {
                    return Err(MockError(shard.name().to_string()));
                }
                Ok(())
            }
        };
        let res = match n {
            Some(n) => cluster.for_each_n_shards(n, f).await,
            None => cluster.for_each_shard(f).await,
        };
        let mut ids = ids.lock().clone();
        ids.sort();
        (ids, res.err().map(|e| e.0))
    }

    assert_eq!(collect(&cluster, None).await, collect(&cluster, Some(1)).await);
    assert_eq!(
        collect(&cluster, None).await,
        ((0..8).collect::<Vec<i64>>(), Some("shard5".to_string()))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_for_each_n_shards_bounded_per_server() {
    init_logging();
    let a = MockServer::new("a");
    let b = MockServer::new("b");
    let cluster = Cluster::new(vec![a.clone(), b.clone()], 16).unwrap();

    let in_flight: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
    let peak: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let (in_flight_c, peak_c, calls_c) = (in_flight.clone(), peak.clone(), calls.clone());
    let res: Result<(), MockError> = cluster
        .for_each_n_shards(2, move |shard| {
            let (in_flight, peak, calls) = (in_flight_c.clone(), peak_c.clone(), calls_c.clone());
            async move {
                let name = shard.server().name.clone();
                {
                    let mut in_flight = in_flight.lock();
                    let now = in_flight.entry(name.clone()).or_default();
                    *now += 1;
                    let mut peak = peak.lock();
                    let max = peak.entry(name.clone()).or_default();
                    *max = (*max).max(*now);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                *in_flight.lock().get_mut(&name).unwrap() -= 1;
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

    assert!(res.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 16);
    for max in peak.lock().values() {
        assert!(*max <= 2, "per-server concurrency exceeded: {}", max);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_error_returned_all_tasks_run() {
    init_logging();
    let (cluster, _a, _b) = duplicated_cluster();
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_c = calls.clone();
    let res = cluster
        .for_each_n_shards(3, move |shard| {
            let calls = calls_c.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(MockError(shard.name().to_string()))
            }
        })
        .await;

    let err = res.unwrap_err();
    assert!(err.0.starts_with("shard"));
    assert_eq!(calls.load(Ordering::SeqCst), 8);

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_c = calls.clone();
    let res = cluster
        .for_each_db(move |server| {
            let calls = calls_c.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(MockError(server.name.clone()))
            }
        })
        .await;

    let err = res.unwrap_err();
    assert!(err.0 == "a" || err.0 == "b");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_error_on_one_server_does_not_stop_others() {
    let (cluster, a, _b) = duplicated_cluster();
    let calls = Arc::new(AtomicUsize::new(0));

    let failing = a.clone();
    let calls_c = calls.clone();
    let res = cluster
        .for_each_shard(move |shard| {
            let calls = calls_c.clone();
            let fail = shard.is_on(&failing);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if fail {
                    return Err(MockError(shard.name().to_string()));
                }
                Ok(())
            }
        })
        .await;

    // First error of server a's sequential run
    assert_eq!(res.unwrap_err().0, "shard0");
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sub_cluster_fan_out_only_touches_window() {
    init_logging();
    let a = MockServer::new("a");
    let b = MockServer::new("b");
    let cluster = Cluster::new(vec![a.clone(), b.clone()], 8).unwrap();
    // step = 4, window [2, 4)
    let sub = cluster.sub_cluster(1, 2);

    let ids = Arc::new(Mutex::new(Vec::new()));
    let ids_c = ids.clone();
    let res: Result<(), MockError> = sub
        .for_each_n_shards(4, move |shard| {
            let ids = ids_c.clone();
            async move {
                ids.lock().push(shard.id());
                Ok(())
            }
        })
        .await;
    assert!(res.is_ok());
    let mut ids = ids.lock().clone();
    ids.sort();
    assert_eq!(ids, vec![2, 3]);

    let servers = Arc::new(AtomicUsize::new(0));
    let servers_c = servers.clone();
    let res: Result<(), MockError> = sub
        .for_each_db(move |_server| {
            let servers = servers_c.clone();
            async move {
                servers.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
    assert!(res.is_ok());
    assert_eq!(servers.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sub_cluster_window_on_single_server() {
    let a = MockServer::new("a");
    let b = MockServer::new("b");
    let cluster = Cluster::new(vec![a.clone(), b.clone()], 8).unwrap();
    // Window of one shard: only one server gets work
    let sub = cluster.sub_cluster(3, 1);

    let touched = Arc::new(Mutex::new(Vec::new()));
    let touched_c = touched.clone();
    let res: Result<(), MockError> = sub
        .for_each_shard(move |shard| {
            let touched = touched_c.clone();
            async move {
                touched.lock().push((shard.id(), shard.server().name.clone()));
                Ok(())
            }
        })
        .await;

    assert!(res.is_ok());
    assert_eq!(*touched.lock(), vec![(3, "b".to_string())]);
}
