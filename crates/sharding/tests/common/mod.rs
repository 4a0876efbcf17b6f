#![allow(dead_code)]

//! Shared helpers for cluster integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sharding::Server;

#[derive(Debug, thiserror::Error)]
#[error("mock server {0} failed")]
pub struct MockError(pub String);

/// In-memory server that counts close calls
#[derive(Debug)]
pub struct MockServer {
    pub name: String,
    pub fail_close: bool,
    closes: AtomicUsize,
}

impl MockServer {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail_close: false,
            closes: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail_close: true,
            closes: AtomicUsize::new(0),
        })
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Server for MockServer {
    type Error = MockError;

    async fn close(&self) -> Result<(), MockError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(MockError(self.name.clone()));
        }
        Ok(())
    }
}
