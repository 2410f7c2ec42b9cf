mod logging;
mod plugins;

use core::time::Duration;
use std::{
    collections::HashSet,
    fs,
    io::IsTerminal as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use matrix_sdk::{
    Client, SessionMeta,
    authentication::{SessionTokens, matrix::MatrixSession},
    config::SyncSettings,
    room::Room,
    ruma::events::room::{
        member::{MembershipState, StrippedRoomMemberEvent},
        message::{MessageType, OriginalSyncRoomMessageEvent},
    },
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::logging::init_tracing;
use plugin_core::{PluginContext, PluginRegistry, PluginSpec, RoomMessageMeta, truncate};

#[derive(Parser, Debug)]
#[command(
    name = "hue-chat-bot",
    version,
    about = "Matrix bot for browsing and switching Hue lights, groups and scenes"
)]
struct Args {
    /// Homeserver base URL, e.g. `https://matrix-client.matrix.org`.
    #[arg(long, env = "MATRIX_HOMESERVER")]
    homeserver: String,

    /// Username (localpart or full user ID)
    #[arg(long, env = "MATRIX_USERNAME")]
    username: String,

    /// Password (if omitted, will prompt if needed)
    #[arg(long, env = "MATRIX_PASSWORD")]
    password: Option<String>,

    /// Directory for persistent state (encryption keys, sync cache)
    #[arg(long, env = "MATRIX_STORE", default_value = "./bot-store")]
    store: PathBuf,

    /// JSON session file for access token/device info
    #[arg(long, env = "MATRIX_SESSION_FILE", default_value = "./session.json")]
    session_file: PathBuf,

    /// Device display name
    #[arg(long, env = "MATRIX_DEVICE_NAME", default_value = "hue-chat-bot")]
    device_name: String,

    /// Path to the YAML config listing plugins and their settings
    #[arg(long, env = "MATRIX_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    /// Directory holding per-plugin `<id>/config.yaml` overrides
    #[arg(long, env = "PLUGINS_DIR", default_value = "./plugins")]
    plugins_dir: PathBuf,

    /// Disable auto-joining rooms when invited
    #[arg(long)]
    no_autojoin: bool,

    /// Sync timeout in milliseconds
    #[arg(long, env = "MATRIX_SYNC_TIMEOUT_MS", default_value_t = 30000)]
    sync_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user_id: String,
    device_id: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct BotConfig {
    #[serde(default)]
    pub(crate) plugins: Option<Vec<PluginSpec>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load .env if present so clap can pick up env vars.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    fs::create_dir_all(&args.store)
        .with_context(|| format!("creating store directory at {}", args.store.display()))?;

    // SQLite store keeps E2EE state across restarts
    let client = Client::builder()
        .homeserver_url(&args.homeserver)
        .handle_refresh_tokens()
        .sqlite_store(&args.store, None)
        .build()
        .await
        .context("building matrix client")?;

    if let Some(session) = load_session(&args.session_file)? {
        info!("Restoring session for {}", session.user_id);
        let matrix_session = MatrixSession {
            meta: SessionMeta {
                user_id: session.user_id.parse().context("invalid stored user_id")?,
                device_id: session.device_id.into(),
            },
            tokens: SessionTokens {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            },
        };
        client
            .restore_session(matrix_session)
            .await
            .context("restoring session")?;
    } else {
        login(&client, &args).await?;
    }

    let config = load_config(&args.config)?;
    let registry = plugins::build_registry(&config, &args.plugins_dir).await;
    info!(commands = ?registry.commands().await, "Registered plugin triggers");

    if !args.no_autojoin {
        client.add_event_handler(
            async move |ev: StrippedRoomMemberEvent, room: Room, client: Client| {
                if ev.content.membership != MembershipState::Invite {
                    return;
                }
                let Some(own_id) = client.user_id() else {
                    return;
                };
                if ev.state_key != own_id.as_str() {
                    return;
                }
                info!(room_id = %room.room_id(), "Auto-joining invited room");
                if let Err(e) = room.join().await {
                    warn!(error = %e, "Failed to accept invite");
                }
            },
        );
    }

    client.add_event_handler(
        async move |ev: OriginalSyncRoomMessageEvent, room: Room, client: Client| {
            let Some(own_id) = client.user_id() else {
                return;
            };
            // Our own notices must never feed back into a flow.
            if ev.sender == own_id {
                return;
            }
            dispatch_message(&ev, room, Arc::clone(&registry)).await;
        },
    );

    info!(
        timeout_ms = args.sync_timeout_ms,
        "Starting sync… Press Ctrl+C to stop."
    );
    let settings = SyncSettings::new().timeout(Duration::from_millis(args.sync_timeout_ms));
    client
        .sync(settings)
        .await
        .map_err(|e| anyhow!("sync terminated: {e}"))
}

async fn login(client: &Client, args: &Args) -> Result<()> {
    // Treat empty env/arg as missing; avoid prompting in non-interactive (Docker) mode.
    let password = if let Some(p) = args
        .password
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        p.to_owned()
    } else {
        if !std::io::stdin().is_terminal() {
            return Err(anyhow!(
                "No MATRIX_PASSWORD provided and no stored session. In non-interactive mode, \
                 set MATRIX_PASSWORD or mount an existing session at {}",
                args.session_file.display()
            ));
        }
        warn!("No password provided via --password or MATRIX_PASSWORD. Prompting...");
        prompt_password()?
    };

    info!("Logging in as {}", args.username);
    let response = client
        .matrix_auth()
        .login_username(&args.username, &password)
        .initial_device_display_name(&args.device_name)
        .request_refresh_token()
        .send()
        .await
        .context("login failed")?;

    let session = SavedSession {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token.clone(),
        user_id: response.user_id.to_string(),
        device_id: response.device_id.to_string(),
    };
    save_session(&args.session_file, &session)?;
    info!(
        "Logged in: user={} device={}",
        session.user_id, session.device_id
    );
    Ok(())
}

#[cfg(feature = "rpassword")]
fn prompt_password() -> Result<String> {
    rpassword::prompt_password("Matrix password:")
        .map_err(|e| anyhow!("Failed to read password: {e}"))
}

#[cfg(not(feature = "rpassword"))]
fn prompt_password() -> Result<String> {
    Err(anyhow!(
        "rpassword feature is not enabled. Cannot prompt for password."
    ))
}

/// Runs the `!command` plugin for this message (if any), then every passive
/// plugin that watches room messages.
async fn dispatch_message(
    ev: &OriginalSyncRoomMessageEvent,
    room: Room,
    registry: Arc<PluginRegistry>,
) {
    let body_opt = match &ev.content.msgtype {
        MessageType::Text(t) => Some(t.body.as_str()),
        MessageType::Notice(n) => Some(n.body.as_str()),
        MessageType::Audio(_)
        | MessageType::Emote(_)
        | MessageType::File(_)
        | MessageType::Image(_)
        | MessageType::Location(_)
        | MessageType::ServerNotice(_)
        | MessageType::Video(_)
        | MessageType::VerificationRequest(_)
        | _ => None,
    };
    debug!(
        room_id = %room.room_id(),
        sender = %ev.sender,
        body = ?body_opt.map(|b| truncate(b, 200)),
        "Incoming message"
    );

    let ctx = PluginContext {
        room,
        sender: ev.sender.clone(),
        event_id: ev.event_id.clone(),
    };
    let mut triggered_plugins: HashSet<String> = HashSet::new();

    if let Some((cmd, args)) = body_opt.and_then(parse_command)
        && let Some(entry) = registry.entry_by_command(cmd).await
    {
        let plugin_id = entry.spec.id.clone();
        if registry.is_enabled(&plugin_id).await {
            info!(plugin = %plugin_id, cmd, args, sender = %ev.sender, "Running plugin command");
            if let Err(e) = entry.plugin.run(&ctx, args, &entry.spec).await {
                warn!(error = %e, plugin = %plugin_id, "Plugin failed");
            } else {
                triggered_plugins.insert(plugin_id);
            }
        } else {
            info!(plugin = %plugin_id, "Plugin disabled");
        }
    }

    let meta = RoomMessageMeta {
        body: body_opt.map(str::trim),
        triggered_plugins: &triggered_plugins,
    };
    for (plugin_id, entry) in registry.entries().await {
        if !entry.plugin.handles_room_messages() || !entry.spec.enabled {
            continue;
        }
        if let Err(e) = entry
            .plugin
            .on_room_message(&ctx, ev, &entry.spec, &meta)
            .await
        {
            warn!(error = %e, plugin = %plugin_id, "Plugin on_room_message failed");
        }
    }
}

/// Splits `"!cmd rest of line"` into `("!cmd", "rest of line")`.
fn parse_command(body: &str) -> Option<(&str, &str)> {
    let body = body.trim();
    if !body.starts_with('!') {
        return None;
    }
    let (cmd, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    (cmd.len() > 1).then(|| (cmd, args.trim()))
}

fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found; using plugin defaults");
        return Ok(BotConfig::default());
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BotConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    Ok(cfg)
}

fn load_session(path: &Path) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading session file at {}", path.display()))?;
    let session: SavedSession = serde_json::from_str(&data).context("parsing session JSON")?;
    Ok(Some(session))
}

fn save_session(path: &Path, session: &SavedSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(session)?;
    fs::write(path, data).with_context(|| format!("writing session file at {}", path.display()))?;
    Ok(())
}
