//! Client registry
//!
//! Sole owner of every tracked [`Client`], keyed by startup id.

use std::collections::BTreeMap;

use tracing::debug;

use super::client::{generate_startup_id, Client};
use super::phase::SessionPhase;
use crate::config::MatchPolicy;

/// Identity fields used to look a client up. Empty strings count as absent.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientQuery<'a> {
    /// Startup id
    pub startup_id: Option<&'a str>,
    /// Exported object path
    pub object_path: Option<&'a str>,
    /// Application id
    pub app_id: Option<&'a str>,
    /// Bus name of the peer
    pub dbus_name: Option<&'a str>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl<'a> ClientQuery<'a> {
    /// Query by startup id only.
    pub fn startup_id(id: &'a str) -> Self {
        Self {
            startup_id: Some(id),
            ..Self::default()
        }
    }

    /// Query by object path only.
    pub fn object_path(path: &'a str) -> Self {
        Self {
            object_path: Some(path),
            ..Self::default()
        }
    }

    /// Query by application id only.
    pub fn app_id(app_id: &'a str) -> Self {
        Self {
            app_id: Some(app_id),
            ..Self::default()
        }
    }

    /// Query by bus name only.
    pub fn dbus_name(name: &'a str) -> Self {
        Self {
            dbus_name: Some(name),
            ..Self::default()
        }
    }

    fn normalized(self) -> Self {
        Self {
            startup_id: present(self.startup_id),
            object_path: present(self.object_path),
            app_id: present(self.app_id),
            dbus_name: present(self.dbus_name),
        }
    }

    fn is_empty(&self) -> bool {
        self.startup_id.is_none()
            && self.object_path.is_none()
            && self.app_id.is_none()
            && self.dbus_name.is_none()
    }
}

/// Mapping from startup id to [`Client`].
#[derive(Debug)]
pub struct ClientRegistry {
    clients: BTreeMap<String, Client>,
    policy: MatchPolicy,
}

impl ClientRegistry {
    /// Create an empty registry using the given identity matching policy.
    pub fn new(policy: MatchPolicy) -> Self {
        Self {
            clients: BTreeMap::new(),
            policy,
        }
    }

    /// Look a client up by any of the supplied identity fields.
    ///
    /// Fields are tried in priority order: startup id, object path, app id,
    /// bus name. Under [`MatchPolicy::Strict`] a supplied startup id is
    /// authoritative and app id / bus name are only consulted without one.
    /// A query with no fields never matches.
    pub fn find(&self, query: ClientQuery<'_>) -> Option<&Client> {
        let query = query.normalized();
        if query.is_empty() {
            return None;
        }

        if let Some(id) = query.startup_id {
            if let Some(client) = self.clients.get(id) {
                return Some(client);
            }
        }
        if let Some(path) = query.object_path {
            if let Some(client) = self.scan(|c| c.object_path() == Some(path)) {
                return Some(client);
            }
        }
        if self.policy == MatchPolicy::Strict && query.startup_id.is_some() {
            return None;
        }
        if let Some(app_id) = query.app_id {
            if let Some(client) = self.scan(|c| c.app_id() == Some(app_id)) {
                return Some(client);
            }
        }
        if let Some(name) = query.dbus_name {
            if let Some(client) = self.scan(|c| c.dbus_name() == Some(name)) {
                return Some(client);
            }
        }
        None
    }

    fn scan(&self, pred: impl Fn(&Client) -> bool) -> Option<&Client> {
        self.clients.values().find(|c| pred(c))
    }

    /// Startup id of the client matching `query`.
    pub fn find_id(&self, query: ClientQuery<'_>) -> Option<String> {
        self.find(query).map(|c| c.startup_id.clone())
    }

    /// Find or create a client. Returns its startup id and whether it was created.
    ///
    /// New clients take the supplied startup id (or a generated one) and are
    /// tagged with `phase`.
    pub fn add(&mut self, query: ClientQuery<'_>, phase: SessionPhase) -> (String, bool) {
        if let Some(id) = self.find_id(query) {
            return (id, false);
        }

        let startup_id = match present(query.startup_id) {
            Some(id) => id.to_string(),
            None => loop {
                let id = generate_startup_id();
                if !self.clients.contains_key(&id) {
                    break id;
                }
            },
        };

        debug!("Tracking new client {} in phase {}", startup_id, phase);
        self.clients
            .insert(startup_id.clone(), Client::new(startup_id.clone(), phase));
        (startup_id, true)
    }

    /// Drop a client from the mapping.
    pub fn remove(&mut self, startup_id: &str) -> Option<Client> {
        self.clients.remove(startup_id)
    }

    /// Client by startup id.
    pub fn get(&self, startup_id: &str) -> Option<&Client> {
        self.clients.get(startup_id)
    }

    pub(crate) fn get_mut(&mut self, startup_id: &str) -> Option<&mut Client> {
        self.clients.get_mut(startup_id)
    }

    /// Iterate over all clients in startup-id order.
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    /// Startup ids of all registered clients.
    pub fn registered_ids(&self) -> Vec<String> {
        self.clients
            .values()
            .filter(|c| c.is_registered())
            .map(|c| c.startup_id.clone())
            .collect()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no clients are tracked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Every remaining client tagged with `phase` is registered or has given up.
    ///
    /// Clients that already left the registry are not inspected, so they
    /// satisfy the check vacuously.
    pub fn phase_satisfied(&self, phase: SessionPhase) -> bool {
        self.clients
            .values()
            .filter(|c| c.phase == phase)
            .all(|c| c.is_registered() || c.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::client::{client_object_path, Registration, WatchId};

    fn register(registry: &mut ClientRegistry, id: &str, app_id: &str, name: &str) {
        let client = registry.get_mut(id).unwrap();
        client.registration = Some(Registration {
            object_path: client_object_path(id),
            app_id: Some(app_id.to_string()),
            dbus_name: name.to_string(),
            bus_watch: WatchId(1),
        });
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let mut registry = ClientRegistry::new(MatchPolicy::Loose);
        registry.add(ClientQuery::default(), SessionPhase::Running);
        assert!(registry.find(ClientQuery::default()).is_none());

        let blank = ClientQuery {
            startup_id: Some(""),
            app_id: Some(""),
            ..ClientQuery::default()
        };
        assert!(registry.find(blank).is_none());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut registry = ClientRegistry::new(MatchPolicy::Loose);
        let (id, created) = registry.add(ClientQuery::startup_id("0abc"), SessionPhase::Panel);
        assert!(created);
        assert_eq!(id, "0abc");

        let (again, created) = registry.add(ClientQuery::startup_id("0abc"), SessionPhase::Running);
        assert!(!created);
        assert_eq!(again, "0abc");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("0abc").unwrap().phase(), SessionPhase::Panel);
    }

    #[test]
    fn test_add_without_identity_always_creates() {
        let mut registry = ClientRegistry::new(MatchPolicy::Loose);
        let (a, _) = registry.add(ClientQuery::default(), SessionPhase::Running);
        let (b, _) = registry.add(ClientQuery::default(), SessionPhase::Running);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&a).is_some());
        assert!(registry.remove(&a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_find_by_app_id_alone() {
        let mut registry = ClientRegistry::new(MatchPolicy::Loose);
        let (id, _) = registry.add(ClientQuery::default(), SessionPhase::Running);
        register(&mut registry, &id, "org.example.Foo", ":1.7");

        let found = registry.find(ClientQuery::app_id("org.example.Foo")).unwrap();
        assert_eq!(found.startup_id(), id);
        assert!(registry.find(ClientQuery::app_id("org.example.Bar")).is_none());
        assert_eq!(
            registry.find_id(ClientQuery::dbus_name(":1.7")).as_deref(),
            Some(id.as_str())
        );
        assert_eq!(
            registry
                .find_id(ClientQuery::object_path(&client_object_path(&id)))
                .as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn test_loose_match_falls_back_to_app_id() {
        let mut registry = ClientRegistry::new(MatchPolicy::Loose);
        let (id, _) = registry.add(ClientQuery::default(), SessionPhase::Running);
        register(&mut registry, &id, "org.example.Foo", ":1.7");

        let query = ClientQuery {
            startup_id: Some("0unknown"),
            app_id: Some("org.example.Foo"),
            ..ClientQuery::default()
        };
        assert_eq!(registry.find_id(query).as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_strict_match_trusts_startup_id() {
        let mut registry = ClientRegistry::new(MatchPolicy::Strict);
        let (id, _) = registry.add(ClientQuery::default(), SessionPhase::Running);
        register(&mut registry, &id, "org.example.Foo", ":1.7");

        let query = ClientQuery {
            startup_id: Some("0unknown"),
            app_id: Some("org.example.Foo"),
            ..ClientQuery::default()
        };
        assert!(registry.find(query).is_none());

        let without_id = ClientQuery {
            app_id: Some("org.example.Foo"),
            ..ClientQuery::default()
        };
        assert_eq!(registry.find_id(without_id).as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_phase_satisfied() {
        let mut registry = ClientRegistry::new(MatchPolicy::Loose);
        let (a, _) = registry.add(ClientQuery::default(), SessionPhase::Panel);
        let (b, _) = registry.add(ClientQuery::default(), SessionPhase::Panel);
        registry.add(ClientQuery::default(), SessionPhase::Desktop);

        assert!(!registry.phase_satisfied(SessionPhase::Panel));
        register(&mut registry, &a, "a", ":1.1");
        assert!(!registry.phase_satisfied(SessionPhase::Panel));
        registry.get_mut(&b).unwrap().failed = true;
        assert!(registry.phase_satisfied(SessionPhase::Panel));
        assert!(registry.phase_satisfied(SessionPhase::WindowManager));
        assert!(!registry.phase_satisfied(SessionPhase::Desktop));
    }
}
