use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    #[serde(default)]
    pub on: bool,
    #[serde(default)]
    pub bri: Option<u8>,
    #[serde(default)]
    pub hue: Option<u16>,
    #[serde(default)]
    pub sat: Option<u8>,
    #[serde(default)]
    pub ct: Option<u16>,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub reachable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Light {
    /// Bridge-assigned id; the bridge keys its listings by it rather than
    /// repeating it in the body.
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub state: LightState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    #[serde(default)]
    pub all_on: bool,
    #[serde(default)]
    pub any_on: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub lights: Vec<String>,
    #[serde(default)]
    pub action: LightState,
    #[serde(default)]
    pub state: GroupState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub lights: Vec<String>,
}

/// Resources that carry their id outside of their JSON body.
pub trait Identified {
    fn set_id(&mut self, id: String);
}

impl Identified for Light {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Identified for Group {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Identified for Scene {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Flattens an id-keyed listing into a vector ordered by id.
///
/// Numeric ids sort numerically (`"2"` before `"10"`); anything else sorts
/// after them, lexically.
#[must_use]
pub fn collect_listing<T: Identified>(listing: HashMap<String, T>) -> Vec<T> {
    let mut entries: Vec<(String, T)> = listing.into_iter().collect();
    entries.sort_by(|(a, _), (b, _)| id_order_key(a).cmp(&id_order_key(b)));
    entries
        .into_iter()
        .map(|(id, mut item)| {
            item.set_id(id);
            item
        })
        .collect()
}

fn id_order_key(id: &str) -> (u64, &str) {
    (id.parse::<u64>().unwrap_or(u64::MAX), id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_sorts_numeric_ids() {
        let raw = json!({
            "10": { "name": "Porch", "state": { "on": false } },
            "2": { "name": "Desk", "state": { "on": true, "bri": 200, "reachable": true } },
            "1": { "name": "Lamp", "type": "Extended color light", "state": { "on": true } }
        });
        let listing: HashMap<String, Light> = serde_json::from_value(raw).unwrap();
        let lights = collect_listing(listing);

        let ids: Vec<_> = lights.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "10"]);
        assert_eq!(lights[0].name, "Lamp");
        assert_eq!(lights[1].state.bri, Some(200));
    }

    #[test]
    fn scene_ids_sort_after_numeric() {
        let raw = json!({
            "abc": { "name": "Relax", "group": "1" },
            "3": { "name": "Read" }
        });
        let listing: HashMap<String, Scene> = serde_json::from_value(raw).unwrap();
        let scenes = collect_listing(listing);
        assert_eq!(scenes[0].id, "3");
        assert_eq!(scenes[1].id, "abc");
        assert_eq!(scenes[1].group.as_deref(), Some("1"));
    }

    #[test]
    fn group_defaults_missing_fields() {
        let group: Group = serde_json::from_value(json!({ "name": "Kitchen" })).unwrap();
        assert!(group.lights.is_empty());
        assert!(!group.state.any_on);
    }
}
