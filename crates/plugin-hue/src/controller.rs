//! Guided resource → instance → command → value dialogue.
//!
//! Every path ends either back at the resource menu or with no session at
//! all; nothing here returns an error to the caller. Bridge failures and
//! invalid selections are reported to the user and logged.

use std::sync::Arc;

use hue_client::{BridgeError, Command, LightingBridge};
use tracing::{error, info, warn};

use crate::{
    commands::CommandTable,
    keyboard::{
        Keyboard, commands_keyboard, group_status, groups_keyboard, light_status, lights_keyboard,
        parse_instance_id, resources_keyboard, scenes_keyboard, values_keyboard,
    },
    sender::{MessageSender, Reply},
    session::{FlowState, ResourceKind, Session, SessionStore},
};

pub const GENERIC_FAILURE: &str = "Something went wrong!";
pub const RESOURCE_PROMPT: &str = "Please choose a light, group or scene";
pub const CANCEL: &str = "cancel";
/// Scenes are recalled on the bridge's implicit all-lights group.
const ALL_LIGHTS_GROUP: &str = "0";

/// What a successful listing leaves behind: the next step and its keyboard.
struct Listing {
    state: FlowState,
    resource: Option<ResourceKind>,
    noun: &'static str,
    keyboard: Keyboard,
    ids: Vec<String>,
}

pub struct Controller {
    bridge: Arc<dyn LightingBridge>,
    commands: Arc<CommandTable>,
    sessions: SessionStore,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("commands", &self.commands)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl Controller {
    #[must_use]
    pub fn new(bridge: Arc<dyn LightingBridge>, commands: Arc<CommandTable>) -> Self {
        Self {
            bridge,
            commands,
            sessions: SessionStore::new(),
        }
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn has_session(&self, user: &str) -> bool {
        self.sessions.contains(user)
    }

    /// Binds the controller to one user and the channel their replies go to.
    #[must_use]
    pub fn conversation<'a>(
        &'a self,
        user: &'a str,
        sender: &'a dyn MessageSender,
    ) -> Conversation<'a> {
        Conversation {
            controller: self,
            user,
            sender,
        }
    }
}

#[derive(Clone, Copy)]
pub struct Conversation<'a> {
    controller: &'a Controller,
    user: &'a str,
    sender: &'a dyn MessageSender,
}

impl core::fmt::Debug for Conversation<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Conversation")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl Conversation<'_> {
    fn sessions(&self) -> &SessionStore {
        &self.controller.sessions
    }

    fn bridge(&self) -> &dyn LightingBridge {
        self.controller.bridge.as_ref()
    }

    async fn deliver(&self, reply: Reply) {
        if let Err(e) = self.sender.send(reply).await {
            warn!(user = %self.user, error = %e, "Failed to deliver reply");
        }
    }

    /// Starts a fresh flow. `args` may already name the resource type, as
    /// in `!hue lights`.
    pub async fn start(&self, args: &str) {
        let _guard = self.sessions().lock(self.user).await;
        self.clear_cache();
        let args = args.trim();
        if args.is_empty() {
            self.prompt_resource_type().await;
        } else {
            self.prompt_resource_instance(args).await;
        }
    }

    /// Routes a selection according to the user's current step. Returns
    /// `false` when the user has no flow in progress.
    pub async fn handle_input(&self, text: &str) -> bool {
        let _guard = self.sessions().lock(self.user).await;
        let Some(session) = self.sessions().get(self.user) else {
            return false;
        };
        let text = text.trim();
        if text.eq_ignore_ascii_case(CANCEL) {
            self.clear_cache();
            self.deliver(Reply::text("Cancelled")).await;
            return true;
        }

        match session.state {
            FlowState::Resource => self.prompt_resource_instance(text).await,
            FlowState::Light => {
                self.select_instance(&session, ResourceKind::Light, text)
                    .await;
            }
            FlowState::Group => {
                self.select_instance(&session, ResourceKind::Group, text)
                    .await;
            }
            FlowState::Scene => match offered_id(&session, text) {
                Some(id) => {
                    let command = format!("scene {id}");
                    self.apply_command(ResourceKind::Group, ALL_LIGHTS_GROUP, &command)
                        .await;
                }
                None => self.reject(format!("Invalid scene `{text}`")).await,
            },
            FlowState::Command => self.select_command(&session, text).await,
            FlowState::Value => self.select_value(&session, text).await,
        }
        true
    }

    pub fn clear_cache(&self) {
        info!(user = %self.user, "Clearing hue session");
        self.sessions().clear(self.user);
    }

    pub async fn prompt_resource_type(&self) {
        self.sessions().set_state(self.user, FlowState::Resource);
        self.deliver(Reply::text(RESOURCE_PROMPT).with_keyboard(resources_keyboard()))
            .await;
    }

    pub async fn prompt_resource_instance(&self, resource_type: &str) {
        let resource_type = resource_type.trim();
        let listing = match resource_type.to_ascii_lowercase().as_str() {
            "lights" => self.bridge().lights().await.map(|lights| Listing {
                state: FlowState::Light,
                resource: Some(ResourceKind::Light),
                noun: "light",
                keyboard: lights_keyboard(&lights),
                ids: lights.into_iter().map(|l| l.id).collect(),
            }),
            "groups" => self.bridge().groups().await.map(|groups| Listing {
                state: FlowState::Group,
                resource: Some(ResourceKind::Group),
                noun: "group",
                keyboard: groups_keyboard(&groups),
                ids: groups.into_iter().map(|g| g.id).collect(),
            }),
            "scenes" => self.bridge().scenes().await.map(|scenes| Listing {
                state: FlowState::Scene,
                resource: None,
                noun: "scene",
                keyboard: scenes_keyboard(&scenes),
                ids: scenes.into_iter().map(|s| s.id).collect(),
            }),
            _ => {
                return self
                    .reject(format!("Invalid resource `{resource_type}`"))
                    .await;
            }
        };

        match listing {
            Ok(listing) => {
                self.sessions().update(self.user, listing.state, |s| {
                    s.resource = listing.resource;
                    s.offered = listing.ids;
                });
                let prompt = format!("Please choose a {}", listing.noun);
                self.deliver(Reply::text(prompt).with_keyboard(listing.keyboard))
                    .await;
            }
            // A failed listing leaves no session behind.
            Err(e) => self.fail(&e, false).await,
        }
    }

    pub async fn prompt_resource_commands(&self, kind: ResourceKind, instance_id: &str) {
        let status = match kind {
            ResourceKind::Light => self
                .bridge()
                .light_status(instance_id)
                .await
                .map(|light| light_status(&light)),
            ResourceKind::Group => self
                .bridge()
                .group_status(instance_id)
                .await
                .map(|group| group_status(&group)),
        };

        match status {
            Ok(status) => {
                self.sessions().update(self.user, FlowState::Command, |s| {
                    s.resource = Some(kind);
                    s.resource_id = Some(instance_id.to_owned());
                    s.command = None;
                    s.offered.clear();
                });
                let keyboard = commands_keyboard(self.controller.commands.commands(kind));
                self.deliver(
                    Reply::text(format!("{status}\n\nPlease choose a command"))
                        .with_keyboard(keyboard),
                )
                .await;
            }
            Err(e) => self.fail(&e, true).await,
        }
    }

    /// Offers the values for `command`. Fails closed when the session has no
    /// resource type or the table has no such command.
    pub async fn prompt_command_values(&self, command: &str) {
        let resource = self.sessions().get(self.user).and_then(|s| s.resource);
        let entry = resource.and_then(|kind| {
            self.controller
                .commands
                .lookup(kind, command)
                .map(|spec| (kind, spec))
        });
        let Some((kind, spec)) = entry else {
            return self
                .reject(format!("Unknown command `{}`", command.trim()))
                .await;
        };

        self.sessions().update(self.user, FlowState::Value, |s| {
            s.command = Some(spec.name.clone());
        });
        self.deliver(
            Reply::text(format!("Please choose a `{}` value", spec.name))
                .with_keyboard(values_keyboard(kind, spec)),
        )
        .await;
    }

    pub async fn apply_command(&self, kind: ResourceKind, instance_id: &str, command: &str) {
        let result = match Command::parse(command) {
            Ok(parsed) => match kind {
                ResourceKind::Light => self.bridge().set_light(instance_id, &parsed).await,
                ResourceKind::Group => self.bridge().set_group(instance_id, &parsed).await,
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(confirmation) => {
                info!(
                    user = %self.user,
                    resource = %kind,
                    id = instance_id,
                    command,
                    "Command applied"
                );
                self.clear_cache();
                self.deliver(Reply::text(confirmation)).await;
                self.prompt_resource_type().await;
            }
            Err(e) => self.fail(&e, true).await,
        }
    }

    async fn select_instance(&self, session: &Session, kind: ResourceKind, text: &str) {
        match offered_id(session, text) {
            Some(id) => self.prompt_resource_commands(kind, id).await,
            None => self.reject(format!("Invalid {kind} `{text}`")).await,
        }
    }

    async fn select_command(&self, session: &Session, text: &str) {
        let (Some(kind), Some(id)) = (session.resource, session.resource_id.as_deref()) else {
            return self.reject(format!("Unknown command `{text}`")).await;
        };
        match self.controller.commands.lookup(kind, text) {
            Some(spec) if spec.values.is_empty() => {
                self.apply_command(kind, id, &spec.line(None)).await;
            }
            Some(_) | None => self.prompt_command_values(text).await,
        }
    }

    async fn select_value(&self, session: &Session, text: &str) {
        let chosen = match (
            session.resource,
            session.resource_id.as_deref(),
            session.command.as_deref(),
        ) {
            (Some(kind), Some(id), Some(command)) => self
                .controller
                .commands
                .lookup(kind, command)
                .and_then(|spec| spec.value(text).map(|value| (kind, id, spec.line(Some(value))))),
            _ => None,
        };
        match chosen {
            Some((kind, id, line)) => self.apply_command(kind, id, &line).await,
            None => self.reject(format!("Invalid value `{text}`")).await,
        }
    }

    /// Invalid selection: tell the user what was wrong and start over.
    async fn reject(&self, message: String) {
        self.clear_cache();
        warn!(user = %self.user, reason = %message, "Rejected selection");
        self.deliver(Reply::error(message)).await;
        self.prompt_resource_type().await;
    }

    async fn fail(&self, e: &BridgeError, reprompt: bool) {
        self.clear_cache();
        error!(user = %self.user, error = %e, "Bridge call failed");
        self.deliver(Reply::error(GENERIC_FAILURE)).await;
        if reprompt {
            self.prompt_resource_type().await;
        }
    }
}

/// The id behind a selection, if it was on the keyboard the user was shown.
fn offered_id<'t>(session: &Session, text: &'t str) -> Option<&'t str> {
    parse_instance_id(text).filter(|id| session.offers(id))
}
