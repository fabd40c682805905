//! The service registry: method name → provider endpoint, last-writer-wins.
//!
//! Grounded on `betelbot`'s `master.py` `handleRegister`/`handleLocate`:
//! registration is an unconditional overwrite, locate is a plain map
//! lookup that fails closed.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub host: String,
    pub port: u16,
    /// Identity of the session that registered this record, so a closing
    /// session can evict only the record it still owns rather than one a
    /// later registrant has since overwritten.
    pub owner: u64,
}

/// Map from method name to the most recently registered provider address.
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceRecord>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        ServiceRegistry {
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Overwrites any existing record for `method` unconditionally.
    pub fn register(&self, method: &str, host: &str, port: u16, owner: u64) {
        self.services.write().unwrap().insert(
            method.to_owned(),
            ServiceRecord {
                host: host.to_owned(),
                port,
                owner,
            },
        );
    }

    pub fn locate(&self, method: &str) -> Option<ServiceRecord> {
        self.services.read().unwrap().get(method).cloned()
    }

    /// Evict every record still owned by `owner`. Used on session close
    /// (DESIGN.md open question 2: a disconnected provider's records are
    /// removed, not left stale) — a record a later registration has
    /// already overwritten keeps its new owner and survives.
    pub fn remove_owned_by(&self, owner: u64) {
        self.services.write().unwrap().retain(|_, record| record.owner != owner);
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        ServiceRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_locate_round_trips() {
        let registry = ServiceRegistry::new();
        registry.register("search", "h", 7000, 1);
        assert_eq!(
            registry.locate("search"),
            Some(ServiceRecord {
                host: "h".to_owned(),
                port: 7000,
                owner: 1,
            })
        );
    }

    #[test]
    fn locate_miss_returns_none() {
        let registry = ServiceRegistry::new();
        assert_eq!(registry.locate("search"), None);
    }

    #[test]
    fn last_writer_wins() {
        let registry = ServiceRegistry::new();
        registry.register("search", "h1", 7000, 1);
        registry.register("search", "h2", 7100, 2);
        assert_eq!(
            registry.locate("search"),
            Some(ServiceRecord {
                host: "h2".to_owned(),
                port: 7100,
                owner: 2,
            })
        );
    }

    #[test]
    fn disconnect_removes_only_records_it_still_owns() {
        let registry = ServiceRegistry::new();
        registry.register("search", "h1", 7000, 1);
        registry.register("search", "h2", 7100, 2);
        registry.register("ping", "h1", 8000, 1);

        registry.remove_owned_by(1);

        assert_eq!(registry.locate("ping"), None);
        assert_eq!(
            registry.locate("search"),
            Some(ServiceRecord {
                host: "h2".to_owned(),
                port: 7100,
                owner: 2,
            }),
            "search was overwritten by owner 2 before owner 1 disconnected"
        );
    }
}
