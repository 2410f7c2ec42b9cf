mod command;
mod error;
mod model;

pub use command::Command;
pub use error::BridgeError;
pub use model::{Group, GroupState, Identified, Light, LightState, Scene, collect_listing};

use core::time::Duration;
use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// The lighting bridge as seen by the conversation flow.
///
/// Listing calls return resources ordered by id; command calls return a
/// confirmation suitable for showing to the user.
#[async_trait]
pub trait LightingBridge: Send + Sync {
    async fn lights(&self) -> Result<Vec<Light>, BridgeError>;
    async fn groups(&self) -> Result<Vec<Group>, BridgeError>;
    async fn scenes(&self) -> Result<Vec<Scene>, BridgeError>;
    async fn light_status(&self, id: &str) -> Result<Light, BridgeError>;
    async fn group_status(&self, id: &str) -> Result<Group, BridgeError>;
    async fn set_light(&self, id: &str, command: &Command) -> Result<String, BridgeError>;
    async fn set_group(&self, id: &str, command: &Command) -> Result<String, BridgeError>;
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Hue v1 REST client (`http://<host>/api/<user>/...`).
#[derive(Debug, Clone)]
pub struct HueBridge {
    client: reqwest::Client,
    base: String,
}

impl HueBridge {
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be built.
    pub fn new(host: &str, user: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: api_base(host, user),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BridgeError> {
        let url = format!("{}/{path}", self.base);
        debug!(path, "Bridge GET");
        let value: Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_errors(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    async fn put(&self, path: &str, body: &Value) -> Result<(), BridgeError> {
        let url = format!("{}/{path}", self.base);
        debug!(path, body = %body, "Bridge PUT");
        let value: Value = self
            .client
            .put(&url)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_errors(&value)
    }

    async fn get_one<T: DeserializeOwned + Identified>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<T, BridgeError> {
        let mut item: T = self.get(&format!("{collection}/{}", checked_id(id)?)).await?;
        item.set_id(id.to_owned());
        Ok(item)
    }

    async fn get_all<T: DeserializeOwned + Identified>(
        &self,
        collection: &str,
    ) -> Result<Vec<T>, BridgeError> {
        let listing: HashMap<String, T> = self.get(collection).await?;
        Ok(collect_listing(listing))
    }
}

#[async_trait]
impl LightingBridge for HueBridge {
    async fn lights(&self) -> Result<Vec<Light>, BridgeError> {
        self.get_all("lights").await
    }

    async fn groups(&self) -> Result<Vec<Group>, BridgeError> {
        self.get_all("groups").await
    }

    async fn scenes(&self) -> Result<Vec<Scene>, BridgeError> {
        self.get_all("scenes").await
    }

    async fn light_status(&self, id: &str) -> Result<Light, BridgeError> {
        self.get_one("lights", id).await
    }

    async fn group_status(&self, id: &str) -> Result<Group, BridgeError> {
        self.get_one("groups", id).await
    }

    async fn set_light(&self, id: &str, command: &Command) -> Result<String, BridgeError> {
        if matches!(command, Command::Scene(_)) {
            return Err(BridgeError::InvalidCommand(format!("scene {command}")));
        }
        let id = checked_id(id)?;
        self.put(&format!("lights/{id}/state"), &command.to_body())
            .await?;
        Ok(command.describe(&format!("Light {id}")))
    }

    async fn set_group(&self, id: &str, command: &Command) -> Result<String, BridgeError> {
        let id = checked_id(id)?;
        self.put(&format!("groups/{id}/action"), &command.to_body())
            .await?;
        Ok(command.describe(&format!("Group {id}")))
    }
}

/// Bridge ids are short alphanumeric tokens (`"3"`, `"bwVk4Zr-2L7HSuF"`).
/// Anything else must never reach a URL path.
#[must_use]
pub fn is_resource_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn checked_id(id: &str) -> Result<&str, BridgeError> {
    if is_resource_id(id) {
        Ok(id)
    } else {
        Err(BridgeError::InvalidId(id.to_owned()))
    }
}

fn api_base(host: &str, user: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}/api/{user}")
    } else {
        format!("http://{host}/api/{user}")
    }
}

/// The bridge answers `200 OK` even for failures, with a body like
/// `[{"error": {"type": 3, "address": "/lights/9", "description": "..."}}]`.
fn check_errors(value: &Value) -> Result<(), BridgeError> {
    let Some(items) = value.as_array() else {
        return Ok(());
    };
    for item in items {
        if let Some(err) = item.get("error") {
            let field = |key: &str| {
                err.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned()
            };
            return Err(BridgeError::Api {
                address: field("address"),
                description: field("description"),
            });
        }
    }
    Ok(())
}
