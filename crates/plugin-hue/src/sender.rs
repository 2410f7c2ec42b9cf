use core::fmt::Write as _;

use anyhow::Result;
use async_trait::async_trait;
use matrix_sdk::{
    room::Room,
    ruma::{
        OwnedEventId, OwnedUserId,
        events::{
            Mentions,
            relation::InReplyTo,
            room::message::{Relation, RoomMessageEventContent},
        },
    },
};

use crate::keyboard::Keyboard;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    Text(String),
    /// Rendered as a warning rather than a normal reply.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub body: ReplyBody,
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            body: ReplyBody::Text(text.into()),
            keyboard: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            body: ReplyBody::Error(text.into()),
            keyboard: None,
        }
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// Markdown rendering shared by chat transports.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = match &self.body {
            ReplyBody::Text(text) => text.clone(),
            ReplyBody::Error(text) => format!("⚠️ {text}"),
        };
        if let Some(keyboard) = self.keyboard.as_ref().filter(|k| !k.is_empty()) {
            out.push('\n');
            for row in &keyboard.rows {
                let line = row
                    .iter()
                    .map(|button| format!("`{button}`"))
                    .collect::<Vec<_>>()
                    .join(" · ");
                let _ = write!(out, "\n{line}");
            }
        }
        out
    }
}

/// Delivers controller replies to the user.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, reply: Reply) -> Result<()>;
}

/// Sends replies into a Matrix room as quiet notices, threaded onto the
/// user's message and mentioning only that user.
#[derive(Debug, Clone)]
pub struct MatrixSender {
    room: Room,
    reply_to: OwnedEventId,
    user: OwnedUserId,
}

impl MatrixSender {
    #[must_use]
    pub const fn new(room: Room, reply_to: OwnedEventId, user: OwnedUserId) -> Self {
        Self {
            room,
            reply_to,
            user,
        }
    }

    fn content(&self, reply: &Reply) -> RoomMessageEventContent {
        let mut content = RoomMessageEventContent::notice_markdown(reply.to_markdown());
        content.relates_to = Some(Relation::Reply {
            in_reply_to: InReplyTo::new(self.reply_to.clone()),
        });
        content.mentions = Some(Mentions::with_user_ids([self.user.clone()]));
        content
    }
}

#[async_trait]
impl MessageSender for MatrixSender {
    async fn send(&self, reply: Reply) -> Result<()> {
        self.room.send(self.content(&reply)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::resources_keyboard;

    #[test]
    fn text_with_keyboard_renders_rows() {
        let reply = Reply::text("Please choose a light, group or scene")
            .with_keyboard(resources_keyboard());
        assert_eq!(
            reply.to_markdown(),
            "Please choose a light, group or scene\n\n`lights` · `groups` · `scenes`"
        );
    }

    #[test]
    fn errors_render_as_warnings() {
        assert_eq!(
            Reply::error("Something went wrong!").to_markdown(),
            "⚠️ Something went wrong!"
        );
    }

    #[test]
    fn empty_keyboard_is_omitted() {
        let reply = Reply::text("Please choose a scene").with_keyboard(Keyboard::default());
        assert_eq!(reply.to_markdown(), "Please choose a scene");
    }
}
