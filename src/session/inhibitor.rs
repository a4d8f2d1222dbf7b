//! Inhibitor registry
//!
//! Tracks outstanding "do not log out / suspend / go idle" holds. Each
//! inhibitor refers to its owning client by startup id only.

use std::collections::BTreeMap;

use enumflags2::{bitflags, BitFlags};

/// Actions an inhibitor can block, using the `org.gnome.SessionManager` bit values.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InhibitFlag {
    /// Logging out, and therefore shutting down or rebooting
    Logout = 1,
    /// Switching users
    SwitchUser = 2,
    /// Suspending
    Suspend = 4,
    /// Marking the session idle
    Idle = 8,
    /// Automounting media
    Automount = 16,
}

/// One outstanding inhibition.
#[derive(Debug, Clone)]
pub struct Inhibitor {
    pub(crate) cookie: u32,
    pub(crate) client_id: Option<String>,
    pub(crate) app_id: String,
    pub(crate) reason: String,
    pub(crate) flags: u32,
    pub(crate) toplevel_xid: u32,
}

impl Inhibitor {
    /// Cookie handed to the caller.
    pub fn cookie(&self) -> u32 {
        self.cookie
    }

    /// Startup id of the owning client.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Application id given by the caller.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Human readable reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Raw flag bits as received, unknown bits included.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Known actions blocked by this inhibitor.
    pub fn actions(&self) -> BitFlags<InhibitFlag> {
        BitFlags::from_bits_truncate(self.flags)
    }

    /// Caller's toplevel window id.
    pub fn toplevel_xid(&self) -> u32 {
        self.toplevel_xid
    }
}

/// Mapping from cookie to [`Inhibitor`].
#[derive(Debug)]
pub struct InhibitorRegistry {
    inhibitors: BTreeMap<u32, Inhibitor>,
    next_cookie: u32,
}

impl Default for InhibitorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InhibitorRegistry {
    /// Create an empty registry. The first cookie issued is 1.
    pub fn new() -> Self {
        Self {
            inhibitors: BTreeMap::new(),
            next_cookie: 1,
        }
    }

    /// Consume the next cookie. A cookie still held is never handed out again.
    pub(crate) fn allocate_cookie(&mut self) -> u32 {
        loop {
            let cookie = self.next_cookie;
            // 0 means "no cookie" on the wire, skip it on wrap-around.
            self.next_cookie = self.next_cookie.checked_add(1).unwrap_or(1);
            if !self.inhibitors.contains_key(&cookie) {
                return cookie;
            }
        }
    }

    pub(crate) fn insert(&mut self, inhibitor: Inhibitor) {
        self.inhibitors.insert(inhibitor.cookie, inhibitor);
    }

    /// Remove an inhibitor, `None` for unknown cookies.
    pub fn remove(&mut self, cookie: u32) -> Option<Inhibitor> {
        self.inhibitors.remove(&cookie)
    }

    /// Inhibitor by cookie.
    pub fn get(&self, cookie: u32) -> Option<&Inhibitor> {
        self.inhibitors.get(&cookie)
    }

    /// Cookies of every inhibitor owned by a client.
    pub fn owned_by(&self, startup_id: &str) -> Vec<u32> {
        self.inhibitors
            .values()
            .filter(|i| i.client_id.as_deref() == Some(startup_id))
            .map(|i| i.cookie)
            .collect()
    }

    /// Union of all actions currently inhibited.
    pub fn inhibited_actions(&self) -> BitFlags<InhibitFlag> {
        self.inhibitors
            .values()
            .fold(BitFlags::empty(), |acc, i| acc | i.actions())
    }

    /// True if any inhibitor shares a bit with `flags`.
    pub fn is_inhibited(&self, flags: u32) -> bool {
        self.inhibitors.values().any(|i| i.flags & flags != 0)
    }

    /// Iterate in cookie order.
    pub fn iter(&self) -> impl Iterator<Item = &Inhibitor> {
        self.inhibitors.values()
    }

    /// Number of active inhibitors.
    pub fn len(&self) -> usize {
        self.inhibitors.len()
    }

    /// True when nothing is inhibited.
    pub fn is_empty(&self) -> bool {
        self.inhibitors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn inhibitor(cookie: u32, owner: &str, flags: u32) -> Inhibitor {
        Inhibitor {
            cookie,
            client_id: Some(owner.to_string()),
            app_id: "org.example.Player".to_string(),
            reason: "Playing music".to_string(),
            flags,
            toplevel_xid: 0,
        }
    }

    #[test]
    fn test_cookies_start_at_one() {
        let mut registry = InhibitorRegistry::new();
        assert_eq!(registry.allocate_cookie(), 1);
        assert_eq!(registry.allocate_cookie(), 2);
    }

    #[test]
    fn test_wrapped_counter_skips_held_cookies() {
        let mut registry = InhibitorRegistry::new();
        let first = registry.allocate_cookie();
        registry.insert(inhibitor(first, "a", InhibitFlag::Logout as u32));
        registry.next_cookie = u32::MAX;

        assert_eq!(registry.allocate_cookie(), u32::MAX);
        assert_eq!(registry.allocate_cookie(), 2);
        assert_eq!(registry.get(1).unwrap().flags(), InhibitFlag::Logout as u32);
    }

    #[test]
    fn test_owned_by_and_flags() {
        let mut registry = InhibitorRegistry::new();
        registry.insert(inhibitor(1, "a", InhibitFlag::Logout as u32));
        registry.insert(inhibitor(
            2,
            "a",
            (InhibitFlag::Idle | InhibitFlag::Suspend).bits(),
        ));
        registry.insert(inhibitor(3, "b", InhibitFlag::SwitchUser as u32));

        assert_eq!(registry.owned_by("a"), vec![1, 2]);
        assert_eq!(registry.owned_by("c"), Vec::<u32>::new());
        assert!(registry.is_inhibited(InhibitFlag::Suspend as u32));
        assert!(!registry.is_inhibited(InhibitFlag::Automount as u32));
        assert_eq!(
            registry.inhibited_actions(),
            InhibitFlag::Logout | InhibitFlag::Idle | InhibitFlag::Suspend | InhibitFlag::SwitchUser
        );

        registry.remove(1);
        assert!(!registry.is_inhibited(InhibitFlag::Logout as u32));
        assert!(registry.remove(1).is_none());
    }

    #[test]
    fn test_unknown_flag_bits_are_kept() {
        let i = inhibitor(1, "a", 1 | 64);
        assert_eq!(i.flags(), 65);
        assert_eq!(i.actions(), BitFlags::from(InhibitFlag::Logout));
    }

    proptest! {
        #[test]
        fn prop_cookies_never_repeat(removals in proptest::collection::vec(any::<bool>(), 1..64)) {
            let mut registry = InhibitorRegistry::new();
            let mut seen = std::collections::HashSet::new();
            for remove in removals {
                let cookie = registry.allocate_cookie();
                prop_assert!(cookie != 0);
                prop_assert!(seen.insert(cookie));
                registry.insert(inhibitor(cookie, "a", 1));
                if remove {
                    registry.remove(cookie);
                }
            }
        }
    }
}
