//! Endpoints and their registry.
//!
//! Endpoint names follow the media server convention
//! `<namespace><number>[@<domain>]`, e.g. `mobicents/bridge/3@127.0.0.1:2427`.
//! A request addressed to `<namespace>$` asks for a fresh endpoint in that
//! namespace.

use crate::connection::Connection;
use crate::types::{CallId, ConnectionId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Wildcard asking for any available endpoint
pub const WILDCARD_ANY: char = '$';
/// Wildcard addressing all endpoints
pub const WILDCARD_ALL: char = '*';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Unknown endpoint {0}")]
    Unknown(String),

    #[error("No endpoint namespace matches {0}")]
    NamespaceNotAvailable(String),

    #[error("Wildcard in {0} cannot be resolved")]
    WildcardTooComplicated(String),
}

/// Split `local@domain` into its parts
pub fn split_endpoint_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once('@') {
        Some((local, domain)) => (local, Some(domain)),
        None => (name, None),
    }
}

/// One requested event from an RQNT, e.g. `AU/oc(N)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedEvent {
    pub package: String,
    pub event: String,
    pub action: String,
}

/// The notification request currently armed on an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationRequest {
    pub request_id: String,
    pub notified_entity: Option<String>,
    pub events: Vec<RequestedEvent>,
    pub signals: Vec<String>,
}

/// A named endpoint holding connections
#[derive(Debug)]
pub struct Endpoint {
    name: String,
    dynamic: bool,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    notification: Mutex<Option<NotificationRequest>>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, dynamic: bool) -> Self {
        Endpoint {
            name: name.into(),
            dynamic,
            connections: DashMap::new(),
            notification: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Created through `$` and removed once its last connection goes
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn add_connection(&self, connection: Arc<Connection>) {
        debug!("Endpoint {}: adding connection {}", self.name, connection.hex_identifier());
        self.connections.insert(connection.identifier(), connection);
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub fn remove_connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(&id).map(|(_, connection)| connection)
    }

    /// Remove and return every connection belonging to `call_id`
    pub fn remove_call(&self, call_id: CallId) -> Vec<Arc<Connection>> {
        let ids: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.value().call_id() == call_id)
            .map(|entry| *entry.key())
            .collect();
        ids.into_iter().filter_map(|id| self.remove_connection(id)).collect()
    }

    pub fn remove_all(&self) -> Vec<Arc<Connection>> {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove_connection(id)).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn set_notification_request(&self, request: NotificationRequest) {
        info!(
            "Endpoint {}: armed request {} with {} event(s)",
            self.name,
            request.request_id,
            request.events.len()
        );
        *self.notification.lock() = Some(request);
    }

    pub fn notification_request(&self) -> Option<NotificationRequest> {
        self.notification.lock().clone()
    }
}

/// Registry of endpoints by local name
#[derive(Debug)]
pub struct EndpointManager {
    namespaces: Vec<String>,
    endpoints: DashMap<String, Arc<Endpoint>>,
    counters: DashMap<String, AtomicU32>,
}

impl EndpointManager {
    pub fn new(namespaces: Vec<String>) -> Self {
        EndpointManager {
            namespaces,
            endpoints: DashMap::new(),
            counters: DashMap::new(),
        }
    }

    /// Register a fixed endpoint
    pub fn register(&self, name: &str) -> Arc<Endpoint> {
        let (local, _) = split_endpoint_name(name);
        self.endpoints
            .entry(local.to_string())
            .or_insert_with(|| Arc::new(Endpoint::new(local, false)))
            .clone()
    }

    pub fn find(&self, name: &str) -> Option<Arc<Endpoint>> {
        let (local, _) = split_endpoint_name(name);
        self.endpoints.get(local).map(|entry| entry.value().clone())
    }

    /// Resolve a request target. `$` registers a new endpoint in its namespace;
    /// the flag tells whether that happened.
    pub fn resolve(&self, name: &str) -> Result<(Arc<Endpoint>, bool), EndpointError> {
        let (local, _) = split_endpoint_name(name);
        if local.contains(WILDCARD_ALL) {
            return Err(EndpointError::WildcardTooComplicated(name.to_string()));
        }

        match local.strip_suffix(WILDCARD_ANY) {
            Some(namespace) => {
                if namespace.contains(WILDCARD_ANY) {
                    return Err(EndpointError::WildcardTooComplicated(name.to_string()));
                }
                if !self.namespaces.iter().any(|ns| ns == namespace) {
                    return Err(EndpointError::NamespaceNotAvailable(name.to_string()));
                }
                Ok((self.register_dynamic(namespace), true))
            }
            None if local.contains(WILDCARD_ANY) => Err(EndpointError::WildcardTooComplicated(name.to_string())),
            None => self
                .find(local)
                .map(|endpoint| (endpoint, false))
                .ok_or_else(|| EndpointError::Unknown(name.to_string())),
        }
    }

    fn register_dynamic(&self, namespace: &str) -> Arc<Endpoint> {
        loop {
            let next = self
                .counters
                .entry(namespace.to_string())
                .or_insert_with(|| AtomicU32::new(1))
                .fetch_add(1, Ordering::Relaxed);
            let name = format!("{}{}", namespace, next);
            if self.endpoints.contains_key(&name) {
                continue;
            }
            let endpoint = Arc::new(Endpoint::new(name.clone(), true));
            self.endpoints.insert(name.clone(), endpoint.clone());
            info!("Registered endpoint {}", name);
            return endpoint;
        }
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<Endpoint>> {
        let (local, _) = split_endpoint_name(name);
        let removed = self.endpoints.remove(local).map(|(_, endpoint)| endpoint);
        if removed.is_some() {
            info!("Unregistered endpoint {}", local);
        }
        removed
    }

    /// Drop a dynamic endpoint once it has no connections left
    pub fn release_if_idle(&self, endpoint: &Endpoint) -> bool {
        if endpoint.is_dynamic() && endpoint.is_empty() {
            return self.unregister(endpoint.name()).is_some();
        }
        false
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> EndpointManager {
        EndpointManager::new(vec!["mobicents/bridge/".into(), "mobicents/ivr/".into()])
    }

    #[test]
    fn dollar_creates_numbered_endpoints() {
        let manager = manager();
        let (first, created) = manager.resolve("mobicents/bridge/$@127.0.0.1:2427").unwrap();
        let (second, _) = manager.resolve("mobicents/bridge/$").unwrap();

        assert!(created);
        assert_eq!(first.name(), "mobicents/bridge/1");
        assert_eq!(second.name(), "mobicents/bridge/2");
        assert!(first.is_dynamic());
        assert_eq!(
            manager.resolve("mobicents/bridge/1@127.0.0.1:2427").unwrap().0.name(),
            "mobicents/bridge/1"
        );
    }

    #[test]
    fn resolution_errors() {
        let manager = manager();
        assert_eq!(
            manager.resolve("mobicents/cnf/$").unwrap_err(),
            EndpointError::NamespaceNotAvailable("mobicents/cnf/$".into())
        );
        assert_eq!(
            manager.resolve("mobicents/ivr/*").unwrap_err(),
            EndpointError::WildcardTooComplicated("mobicents/ivr/*".into())
        );
        assert_eq!(
            manager.resolve("mobicents/ivr/9").unwrap_err(),
            EndpointError::Unknown("mobicents/ivr/9".into())
        );
    }

    #[test]
    fn idle_dynamic_endpoints_are_released() {
        let manager = manager();
        let fixed = manager.register("mobicents/ivr/1");
        let (dynamic, _) = manager.resolve("mobicents/bridge/$").unwrap();

        assert!(!manager.release_if_idle(&fixed));
        assert!(manager.release_if_idle(&dynamic));
        assert_eq!(manager.endpoint_count(), 1);
    }
}
