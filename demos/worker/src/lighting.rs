use std::collections::BTreeMap;
use std::future::ready;
use std::sync::{Arc, Mutex, PoisonError};

use hearth::envelope::Envelope;

use hearth_worker::{Error, ProviderBinding, Reply, Result};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tracing::info;

#[derive(Debug, Clone, Serialize)]
struct Group {
    id: String,
    name: String,
    on: bool,
    brightness: u8,
}

#[derive(Deserialize)]
struct NewGroup {
    name: String,
}

#[derive(Deserialize)]
struct GroupChange {
    id: String,
    on: Option<bool>,
    brightness: Option<u8>,
}

#[derive(Deserialize)]
struct GroupId {
    id: String,
}

// In-memory stand-in for a lighting bridge.
#[derive(Clone, Default)]
struct Bridge {
    groups: Arc<Mutex<BTreeMap<String, Group>>>,
}

impl Bridge {
    fn with_groups(names: &[&str]) -> Self {
        let bridge = Self::default();
        for name in names {
            let _ = bridge.create(name);
        }
        bridge
    }

    fn groups(&self) -> Result<String> {
        let groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        encode(&groups.values().collect::<Vec<_>>())
    }

    fn create(&self, name: &str) -> Group {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let id = (groups.len() + 1).to_string();
        let group = Group {
            id: id.clone(),
            name: name.into(),
            on: false,
            brightness: 100,
        };
        let _ = groups.insert(id, group.clone());
        group
    }

    fn update(&self, change: GroupChange) -> Result<Group> {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let group = groups
            .get_mut(&change.id)
            .ok_or_else(|| Error::handler("group not found"))?;

        if let Some(on) = change.on {
            group.on = on;
        }
        if let Some(brightness) = change.brightness {
            group.brightness = brightness.min(100);
        }
        Ok(group.clone())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::handler("group not found"))
    }
}

fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T> {
    serde_json::from_str(&envelope.payload)
        .map_err(|e| Error::handler(format!("Invalid `{}` payload: {e}", envelope.action)))
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::handler(e.to_string()))
}

/// A simulated lighting bridge, listing, creating, updating and deleting
/// light groups.
pub(crate) fn provider() -> ProviderBinding {
    let bridge = Bridge::with_groups(&["Living room", "Kitchen"]);

    let list = bridge.clone();
    let create = bridge.clone();
    let update = bridge.clone();
    let delete = bridge.clone();

    ProviderBinding::new()
        .executor("groups", move |_| {
            ready(list.groups().map(|groups| Reply::new("groups", groups)))
        })
        .executor("create", move |envelope: Envelope| {
            let group = decode::<NewGroup>(&envelope).map(|new| create.create(&new.name));
            if let Ok(group) = &group {
                info!("Created group `{}`", group.name);
            }
            ready(group.and_then(|group| Ok(Reply::new("group", encode(&group)?))))
        })
        .executor("update", move |envelope: Envelope| {
            let group = decode::<GroupChange>(&envelope).and_then(|change| update.update(change));
            ready(group.and_then(|group| Ok(Reply::new("group", encode(&group)?))))
        })
        .executor("delete", move |envelope: Envelope| {
            let groups = decode::<GroupId>(&envelope)
                .and_then(|group| delete.delete(&group.id))
                .and_then(|()| delete.groups());
            ready(groups.map(|groups| Reply::new("groups", groups)))
        })
        .snapshot(move || {
            let groups = bridge.groups();
            ready(vec![groups.map(|groups| Reply::new("groups", groups))])
        })
}
