use core::fmt::Write as _;

use hue_client::{Group, Light, LightState, Scene, is_resource_id};

use crate::{commands::CommandSpec, session::ResourceKind};

pub const RESOURCES: [&str; 3] = ["lights", "groups", "scenes"];

const INSTANCE_COLUMNS: usize = 2;
const COMMAND_COLUMNS: usize = 4;
const LIGHT_VALUE_COLUMNS: usize = 4;
const GROUP_VALUE_COLUMNS: usize = 3;

/// Rows of quick-reply buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<String>>,
}

impl Keyboard {
    fn chunked<I, S>(buttons: I, columns: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buttons: Vec<String> = buttons.into_iter().map(Into::into).collect();
        Self {
            rows: buttons.chunks(columns.max(1)).map(<[String]>::to_vec).collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.buttons().any(|b| b == label)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }
}

#[must_use]
pub fn resources_keyboard() -> Keyboard {
    Keyboard {
        rows: vec![RESOURCES.iter().map(|r| (*r).to_owned()).collect()],
    }
}

fn instance_label(id: &str, name: &str) -> String {
    format!("{id} - {name}")
}

/// Recovers the id from an instance button label. A bare id is accepted too.
#[must_use]
pub fn parse_instance_id(label: &str) -> Option<&str> {
    let id = label
        .split_once(" - ")
        .map_or(label, |(id, _)| id)
        .trim();
    is_resource_id(id).then_some(id)
}

#[must_use]
pub fn lights_keyboard(lights: &[Light]) -> Keyboard {
    Keyboard::chunked(
        lights.iter().map(|l| instance_label(&l.id, &l.name)),
        INSTANCE_COLUMNS,
    )
}

#[must_use]
pub fn groups_keyboard(groups: &[Group]) -> Keyboard {
    Keyboard::chunked(
        groups.iter().map(|g| instance_label(&g.id, &g.name)),
        INSTANCE_COLUMNS,
    )
}

#[must_use]
pub fn scenes_keyboard(scenes: &[Scene]) -> Keyboard {
    Keyboard::chunked(
        scenes.iter().map(|s| instance_label(&s.id, &s.name)),
        INSTANCE_COLUMNS,
    )
}

#[must_use]
pub fn commands_keyboard(commands: &[CommandSpec]) -> Keyboard {
    Keyboard::chunked(commands.iter().map(|c| c.name.clone()), COMMAND_COLUMNS)
}

/// Lights get a denser value grid than groups.
#[must_use]
pub fn values_keyboard(kind: ResourceKind, spec: &CommandSpec) -> Keyboard {
    let columns = match kind {
        ResourceKind::Light => LIGHT_VALUE_COLUMNS,
        ResourceKind::Group => GROUP_VALUE_COLUMNS,
    };
    Keyboard::chunked(spec.values.iter().cloned(), columns)
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn write_levels(out: &mut String, state: &LightState) {
    if let Some(bri) = state.bri {
        let percent = u32::from(bri) * 100 / 254;
        let _ = write!(out, "\nBrightness: {percent}%");
    }
    if let Some(hue) = state.hue {
        let _ = write!(out, "\nHue: {hue}");
    }
    if let Some(sat) = state.sat {
        let _ = write!(out, "\nSaturation: {sat}");
    }
    if let Some(ct) = state.ct {
        let _ = write!(out, "\nColour temperature: {ct}");
    }
    if let Some(effect) = state.effect.as_deref().filter(|e| *e != "none") {
        let _ = write!(out, "\nEffect: {effect}");
    }
}

#[must_use]
pub fn light_status(light: &Light) -> String {
    let mut out = format!("**{}** (light {})", light.name, light.id);
    if let Some(kind) = &light.kind {
        let _ = write!(out, "\nType: {kind}");
    }
    let _ = write!(out, "\nOn: {}", yes_no(light.state.on));
    write_levels(&mut out, &light.state);
    if let Some(reachable) = light.state.reachable {
        let _ = write!(out, "\nReachable: {}", yes_no(reachable));
    }
    out
}

#[must_use]
pub fn group_status(group: &Group) -> String {
    let mut out = format!("**{}** (group {})", group.name, group.id);
    if let Some(kind) = &group.kind {
        let _ = write!(out, "\nType: {kind}");
    }
    let _ = write!(
        out,
        "\nLights: {}\nAll on: {}\nAny on: {}",
        group.lights.len(),
        yes_no(group.state.all_on),
        yes_no(group.state.any_on)
    );
    write_levels(&mut out, &group.action);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(id: &str, name: &str) -> Light {
        Light {
            id: id.to_owned(),
            name: name.to_owned(),
            ..Light::default()
        }
    }

    #[test]
    fn instance_buttons_round_trip_ids() {
        let kb = lights_keyboard(&[light("1", "Lamp"), light("2", "Desk"), light("3", "Porch")]);
        assert_eq!(kb.rows.len(), 2);
        assert!(kb.contains("1 - Lamp"));
        assert_eq!(parse_instance_id("3 - Porch"), Some("3"));
        assert_eq!(parse_instance_id(" 7 "), Some("7"));
        assert_eq!(parse_instance_id("Living room"), None);
        assert_eq!(parse_instance_id(""), None);
        assert_eq!(parse_instance_id("../config"), None);
        assert_eq!(parse_instance_id("1/state?x"), None);
        assert_eq!(parse_instance_id("1?x=y# - Lamp"), None);
    }

    #[test]
    fn value_grid_differs_per_kind() {
        let spec = CommandSpec {
            name: "bri".to_owned(),
            values: ["1", "64", "127", "191", "254"].map(str::to_owned).to_vec(),
        };
        let lights = values_keyboard(ResourceKind::Light, &spec);
        let groups = values_keyboard(ResourceKind::Group, &spec);
        assert_eq!(lights.rows[0].len(), 4);
        assert_eq!(groups.rows[0].len(), 3);
        assert_eq!(lights.buttons().count(), groups.buttons().count());
    }

    #[test]
    fn light_status_lists_state() {
        let mut lamp = light("1", "Lamp");
        lamp.state.on = true;
        lamp.state.bri = Some(254);
        lamp.state.reachable = Some(false);
        let text = light_status(&lamp);
        assert!(text.starts_with("**Lamp** (light 1)"));
        assert!(text.contains("On: yes"));
        assert!(text.contains("Brightness: 100%"));
        assert!(text.contains("Reachable: no"));
    }

    #[test]
    fn group_status_counts_lights() {
        let group = Group {
            id: "2".to_owned(),
            name: "Kitchen".to_owned(),
            lights: vec!["1".to_owned(), "4".to_owned()],
            ..Group::default()
        };
        let text = group_status(&group);
        assert!(text.starts_with("**Kitchen** (group 2)"));
        assert!(text.contains("Lights: 2"));
        assert!(text.contains("Any on: no"));
    }
}
