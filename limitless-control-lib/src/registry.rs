//! Lookup of groups by name across several bridges.

use std::collections::HashMap;

use log::warn;

use crate::bridge::Bridge;
use crate::group::Group;

/// Every group of every registered bridge, by name.
#[derive(Debug, Default)]
pub struct LimitlessLed {
    bridges: Vec<Bridge>,
    groups: HashMap<String, Group>,
}

impl LimitlessLed {
    pub fn new() -> Self {
        LimitlessLed::default()
    }

    /// Register a bridge and the groups it has so far. A name seen on an
    /// earlier bridge is replaced.
    pub fn add_bridge(&mut self, bridge: &Bridge) {
        for group in bridge.groups() {
            if self.groups.contains_key(group.name()) {
                warn!("Group name {} registered twice, keeping the newest", group.name());
            }
            self.groups.insert(group.name().to_string(), group);
        }
        self.bridges.push(bridge.clone());
    }

    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}
