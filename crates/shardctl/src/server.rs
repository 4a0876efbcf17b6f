//! Placeholder server handles for offline inspection

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use sharding::Server;
use tracing::debug;

/// Server known only by its configured name
///
/// `shardctl` answers routing questions without connecting anywhere, so a
/// handle is just the name from the placement list. Repeated names in the
/// configuration map to the same handle, so they count as one server.
#[derive(Debug)]
pub struct NamedServer {
    pub name: String,
}

#[async_trait]
impl Server for NamedServer {
    type Error = Infallible;

    async fn close(&self) -> Result<(), Infallible> {
        debug!("Closing server {}", self.name);
        Ok(())
    }
}

/// Build handles for a placement list, sharing one handle per distinct name
pub fn handles(names: &[String]) -> Vec<Arc<NamedServer>> {
    let mut opened: Vec<Arc<NamedServer>> = Vec::new();
    names
        .iter()
        .map(|name| {
            if let Some(existing) = opened.iter().find(|s| s.name == *name) {
                return existing.clone();
            }
            let server = Arc::new(NamedServer { name: name.clone() });
            opened.push(server.clone());
            server
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_names_share_handle() {
        let names: Vec<String> = ["a", "b", "a"].iter().map(|s| s.to_string()).collect();
        let list = handles(&names);
        assert_eq!(list.len(), 3);
        assert!(Arc::ptr_eq(&list[0], &list[2]));
        assert!(!Arc::ptr_eq(&list[0], &list[1]));
    }
}
