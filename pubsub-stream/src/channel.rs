//! Subscribed channel and channel group entries.
//!
//! An entry is identified by its name. Presence is tracked per entry: when
//! enabled, the entry is also subscribed under its `-pnpres` name.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Suffix of the companion channel carrying presence events.
pub const PRESENCE_SUFFIX: &str = "-pnpres";

/// The presence companion name of `name`.
pub fn presence_name(name: &str) -> String {
    format!("{name}{PRESENCE_SUFFIX}")
}

pub fn is_presence_name(name: &str) -> bool {
    name.ends_with(PRESENCE_SUFFIX)
}

/// `name` without its presence suffix, if it has one.
pub fn trim_presence_suffix(name: &str) -> &str {
    name.strip_suffix(PRESENCE_SUFFIX).unwrap_or(name)
}

/// One subscribed channel or channel group.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    pub with_presence: bool,
    /// Presence state this client reports for the entry
    pub state: Option<Value>,
}

impl Channel {
    pub fn new(id: impl Into<String>, with_presence: bool, state: Option<Value>) -> Self {
        Self {
            id: id.into(),
            with_presence,
            state,
        }
    }

    pub fn presence_id(&self) -> String {
        presence_name(&self.id)
    }

    /// Names this entry is subscribed under.
    pub fn subscribed_names(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.id.clone()).chain(self.with_presence.then(|| self.presence_id()))
    }
}

/// Name-keyed set of entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSet {
    entries: BTreeMap<String, Channel>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `channel`, merging into an existing entry of the same name.
    ///
    /// An existing entry gains the presence flag if `channel` has it and
    /// takes over `channel`'s state when one is given. Returns `true` when
    /// the entry is new or newly gained presence.
    pub fn insert(&mut self, channel: Channel) -> bool {
        match self.entries.get_mut(&channel.id) {
            None => {
                self.entries.insert(channel.id.clone(), channel);
                true
            }
            Some(existing) => {
                let gained_presence = channel.with_presence && !existing.with_presence;
                existing.with_presence |= channel.with_presence;
                if channel.state.is_some() {
                    existing.state = channel.state;
                }
                gained_presence
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Channel> {
        self.entries.remove(id)
    }

    /// Drop presence from the entry named `id`, keeping the entry itself.
    ///
    /// Returns the entry as it was before demotion, or `None` when there is
    /// no such entry or it had no presence.
    pub fn unsubscribe_presence(&mut self, id: &str) -> Option<Channel> {
        let entry = self.entries.get_mut(id).filter(|entry| entry.with_presence)?;
        let before = entry.clone();
        entry.with_presence = false;
        entry.state = None;
        Some(before)
    }

    /// Replace the stored state of the entry named `id`.
    pub fn update_state(&mut self, id: &str, state: Value) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.state = Some(state);
                true
            }
            None => false,
        }
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> Vec<Channel> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.entries.values()
    }

    /// Entry names, without presence companions.
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Every name to subscribe under, presence companions included.
    pub fn subscribed_names(&self) -> Vec<String> {
        self.entries
            .values()
            .flat_map(Channel::subscribed_names)
            .collect()
    }

    /// Stored presence state keyed by entry name.
    pub fn states(&self) -> Map<String, Value> {
        self.entries
            .values()
            .filter_map(|entry| entry.state.clone().map(|state| (entry.id.clone(), state)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_presence_names() {
        assert_eq!(presence_name("lobby"), "lobby-pnpres");
        assert!(is_presence_name("lobby-pnpres"));
        assert!(!is_presence_name("lobby"));
        assert_eq!(trim_presence_suffix("lobby-pnpres"), "lobby");
        assert_eq!(trim_presence_suffix("lobby"), "lobby");
    }

    #[test]
    fn test_insert_merges_existing_entry() {
        let mut set = ChannelSet::new();
        assert!(set.insert(Channel::new("a", false, None)));
        assert!(!set.insert(Channel::new("a", false, None)));

        assert!(set.insert(Channel::new("a", true, Some(json!({"mood": "ok"})))));
        assert!(!set.insert(Channel::new("a", false, None)));

        let entry = set.get("a").unwrap();
        assert!(entry.with_presence);
        assert_eq!(entry.state, Some(json!({"mood": "ok"})));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_subscribed_names_include_presence() {
        let mut set = ChannelSet::new();
        set.insert(Channel::new("b", true, None));
        set.insert(Channel::new("a", false, None));

        assert_eq!(set.ids(), vec!["a", "b"]);
        assert_eq!(set.subscribed_names(), vec!["a", "b", "b-pnpres"]);
    }

    #[test]
    fn test_unsubscribe_presence_demotes() {
        let mut set = ChannelSet::new();
        set.insert(Channel::new("a", true, Some(json!(1))));
        set.insert(Channel::new("b", false, None));

        let demoted = set.unsubscribe_presence("a").unwrap();
        assert!(demoted.with_presence);
        assert_eq!(set.get("a"), Some(&Channel::new("a", false, None)));

        assert!(set.unsubscribe_presence("a").is_none());
        assert!(set.unsubscribe_presence("b").is_none());
        assert!(set.unsubscribe_presence("missing").is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_states_and_update() {
        let mut set = ChannelSet::new();
        set.insert(Channel::new("a", false, None));
        set.insert(Channel::new("b", false, Some(json!({"x": 1}))));

        assert!(set.update_state("a", json!({"y": 2})));
        assert!(!set.update_state("missing", json!(null)));

        let states = set.states();
        assert_eq!(states.get("a"), Some(&json!({"y": 2})));
        assert_eq!(states.get("b"), Some(&json!({"x": 1})));
    }

    proptest! {
        #[test]
        fn prop_one_entry_per_name(names in proptest::collection::vec("[a-d]", 0..20)) {
            let mut set = ChannelSet::new();
            for name in &names {
                set.insert(Channel::new(name.clone(), false, None));
            }
            let distinct: std::collections::BTreeSet<_> = names.iter().collect();
            prop_assert_eq!(set.len(), distinct.len());
        }
    }
}
