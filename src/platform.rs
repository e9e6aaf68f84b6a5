//! Interface to the chat platform and the plain data exchanged with it.
//!
//! The ticket core never talks to Discord directly. It describes outgoing
//! messages as data and calls a [`ChatPlatform`]; `crate::discord` provides
//! the serenity-backed implementation.

use crate::error::PlatformError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type PlatformResult<T> = Result<T, PlatformError>;

// ============================================================================
// Outgoing messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

/// Interactive button; `custom_id` holds an encoded action token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub emoji: Option<String>,
    pub style: ButtonStyle,
    pub custom_id: String,
}

impl Button {
    pub fn new(label: impl Into<String>, style: ButtonStyle, custom_id: impl Into<String>) -> Self {
        Button {
            label: label.into(),
            emoji: None,
            style,
            custom_id: custom_id.into(),
        }
    }

    pub fn emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Embed {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// A message the core wants delivered, to a channel, a DM, or as a reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    pub buttons: Vec<Button>,
    pub attachment: Option<FileAttachment>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        OutgoingMessage {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        OutgoingMessage {
            embed: Some(embed),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }

    pub fn with_attachment(mut self, filename: impl Into<String>, data: Vec<u8>) -> Self {
        self.attachment = Some(FileAttachment {
            filename: filename.into(),
            data,
        });
        self
    }
}

// ============================================================================
// Channels and history
// ============================================================================

/// Who is granted read/write access on a private channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessGrant {
    Member(u64),
    Role(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateChannelRequest {
    pub guild_id: u64,
    pub name: String,
    pub parent_group_id: Option<u64>,
    pub grants: Vec<AccessGrant>,
    pub reason: Option<String>,
}

/// One message read back from a channel's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub content: String,
    pub embed_titles: Vec<String>,
    pub attachment_names: Vec<String>,
}

/// Operations the ticket core needs from the chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Create a grouping container (a Discord category) and return its id
    async fn create_group(&self, guild_id: u64, name: &str) -> PlatformResult<u64>;

    /// Create a channel hidden from everyone except the grants and the bot
    async fn create_private_channel(&self, request: PrivateChannelRequest) -> PlatformResult<u64>;

    async fn delete_channel(&self, channel_id: u64) -> PlatformResult<()>;

    async fn rename_channel(&self, channel_id: u64, name: &str) -> PlatformResult<()>;

    /// Current channel name, `None` if the channel no longer exists
    async fn channel_name(&self, channel_id: u64) -> PlatformResult<Option<String>>;

    /// Post a message and return its id
    async fn send_message(&self, channel_id: u64, message: OutgoingMessage) -> PlatformResult<u64>;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> PlatformResult<()>;

    /// Full channel history, oldest message first
    async fn fetch_history(&self, channel_id: u64) -> PlatformResult<Vec<HistoryMessage>>;

    async fn send_direct_message(&self, user_id: u64, message: OutgoingMessage) -> PlatformResult<u64>;
}

// ============================================================================
// Inbound events
// ============================================================================

/// A plain message posted by a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub content: String,
    pub role_mentions: Vec<u64>,
    pub channel_mentions: Vec<u64>,
}

/// A button press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentPress {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub custom_id: String,
    /// Whether the presser may manage channels where the press happened
    pub can_manage_channels: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(InboundMessage),
    Component(ComponentPress),
}

impl InboundEvent {
    pub fn author_id(&self) -> u64 {
        match self {
            InboundEvent::Message(m) => m.author_id,
            InboundEvent::Component(c) => c.user_id,
        }
    }

    pub fn channel_id(&self) -> u64 {
        match self {
            InboundEvent::Message(m) => m.channel_id,
            InboundEvent::Component(c) => c.channel_id,
        }
    }

    pub fn as_message(&self) -> Option<&InboundMessage> {
        match self {
            InboundEvent::Message(m) => Some(m),
            InboundEvent::Component(_) => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentPress> {
        match self {
            InboundEvent::Component(c) => Some(c),
            InboundEvent::Message(_) => None,
        }
    }
}

/// Reply to the actor who triggered a command or press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: OutgoingMessage,
    /// Only visible to the actor
    pub ephemeral: bool,
}

impl Reply {
    pub fn private(content: impl Into<String>) -> Self {
        Reply {
            message: OutgoingMessage::text(content),
            ephemeral: true,
        }
    }

    pub fn public(message: OutgoingMessage) -> Self {
        Reply {
            message,
            ephemeral: false,
        }
    }

    pub fn private_message(message: OutgoingMessage) -> Self {
        Reply {
            message,
            ephemeral: true,
        }
    }

    pub fn content(&self) -> &str {
        self.message.content.as_deref().unwrap_or_default()
    }
}
