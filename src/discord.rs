//! # Feature: Discord Platform
//!
//! Serenity-backed [`ChatPlatform`] plus the conversions between serenity
//! events and the ticket core's plain data.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: History paging for transcripts
//! - 1.0.0: Channels, messages and DMs over the REST client

use crate::error::PlatformError;
use crate::platform::{
    AccessGrant, Button, ButtonStyle, ChatPlatform, ComponentPress, Embed, HistoryMessage,
    InboundMessage, OutgoingMessage, PlatformResult, PrivateChannelRequest, Reply,
};
use crate::router::CommandInvocation;
use async_trait::async_trait;
use chrono::DateTime;
use futures::StreamExt;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serenity::builder::{
    CreateComponents, CreateEmbed, CreateInteractionResponseFollowup, CreateMessage,
};
use serenity::http::{Http, HttpError};
use serenity::model::application::component::ButtonStyle as SerenityButtonStyle;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::application::interaction::message_component::MessageComponentInteraction;
use serenity::model::application::interaction::InteractionResponseType;
use serenity::model::channel::{
    AttachmentType, ChannelType, Message, PermissionOverwrite, PermissionOverwriteType, ReactionType,
};
use serenity::model::guild::Member;
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId, UserId};
use serenity::model::permissions::Permissions;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

static CHANNEL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<#(\d+)>").expect("Invalid regex"));

/// Discord allows at most five buttons per action row
const BUTTONS_PER_ROW: usize = 5;

/// [`ChatPlatform`] over the serenity REST client
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
    bot_user_id: u64,
}

impl SerenityPlatform {
    /// `bot_user_id` is granted access to every private channel it creates
    pub fn new(http: Arc<Http>, bot_user_id: u64) -> Self {
        SerenityPlatform { http, bot_user_id }
    }

    pub fn http(&self) -> &Http {
        &self.http
    }
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn create_group(&self, guild_id: u64, name: &str) -> PlatformResult<u64> {
        let group = GuildId(guild_id)
            .create_channel(self.http(), |c| c.name(name).kind(ChannelType::Category))
            .await
            .map_err(|e| map_error(&format!("category '{name}'"), e))?;
        info!("Created category '{}' ({}) in guild {}", name, group.id, guild_id);
        Ok(group.id.0)
    }

    async fn create_private_channel(&self, request: PrivateChannelRequest) -> PlatformResult<u64> {
        let overwrites = private_overwrites(request.guild_id, self.bot_user_id, &request.grants);
        if let Some(ref reason) = request.reason {
            debug!("Creating channel '{}': {}", request.name, reason);
        }

        let channel = GuildId(request.guild_id)
            .create_channel(self.http(), |c| {
                c.name(&request.name)
                    .kind(ChannelType::Text)
                    .permissions(overwrites);
                if let Some(parent) = request.parent_group_id {
                    c.category(ChannelId(parent));
                }
                c
            })
            .await
            .map_err(|e| map_error(&format!("channel '{}'", request.name), e))?;
        Ok(channel.id.0)
    }

    async fn delete_channel(&self, channel_id: u64) -> PlatformResult<()> {
        ChannelId(channel_id)
            .delete(self.http())
            .await
            .map_err(|e| map_error(&format!("channel {channel_id}"), e))?;
        Ok(())
    }

    async fn rename_channel(&self, channel_id: u64, name: &str) -> PlatformResult<()> {
        ChannelId(channel_id)
            .edit(self.http(), |c| c.name(name))
            .await
            .map_err(|e| map_error(&format!("channel {channel_id}"), e))?;
        Ok(())
    }

    async fn channel_name(&self, channel_id: u64) -> PlatformResult<Option<String>> {
        match self.http.get_channel(channel_id).await {
            Ok(channel) => Ok(Some(channel.guild().map(|c| c.name).unwrap_or_default())),
            Err(e) => match map_error(&format!("channel {channel_id}"), e) {
                PlatformError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn send_message(&self, channel_id: u64, message: OutgoingMessage) -> PlatformResult<u64> {
        let sent = ChannelId(channel_id)
            .send_message(self.http(), |m| fill_message(m, message))
            .await
            .map_err(|e| map_error(&format!("channel {channel_id}"), e))?;
        Ok(sent.id.0)
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> PlatformResult<()> {
        ChannelId(channel_id)
            .delete_message(self.http(), MessageId(message_id))
            .await
            .map_err(|e| map_error(&format!("message {message_id}"), e))
    }

    async fn fetch_history(&self, channel_id: u64) -> PlatformResult<Vec<HistoryMessage>> {
        let mut history = Vec::new();
        let mut messages = Box::pin(ChannelId(channel_id).messages_iter(self.http()));
        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| map_error(&format!("channel {channel_id}"), e))?;
            history.push(history_message(&message));
        }
        // Pages arrive newest first
        history.reverse();
        Ok(history)
    }

    async fn send_direct_message(&self, user_id: u64, message: OutgoingMessage) -> PlatformResult<u64> {
        let dm = UserId(user_id)
            .create_dm_channel(self.http())
            .await
            .map_err(|e| map_error(&format!("DM channel of user {user_id}"), e))?;
        let sent = dm
            .send_message(self.http(), |m| fill_message(m, message))
            .await
            .map_err(|e| map_error(&format!("DM to user {user_id}"), e))?;
        Ok(sent.id.0)
    }
}

fn map_error(what: &str, err: serenity::Error) -> PlatformError {
    if let serenity::Error::Http(ref http) = err {
        if let HttpError::UnsuccessfulRequest(ref response) = **http {
            match response.status_code.as_u16() {
                403 => return PlatformError::Forbidden(what.to_string()),
                404 => return PlatformError::NotFound(what.to_string()),
                _ => {}
            }
        }
    }
    PlatformError::Other(format!("{what}: {err}"))
}

/// Deny @everyone, allow each grant and the bot itself
fn private_overwrites(guild_id: u64, bot_user_id: u64, grants: &[AccessGrant]) -> Vec<PermissionOverwrite> {
    let access = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY;

    // The @everyone role shares the guild's id
    let mut overwrites = vec![
        PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL,
            kind: PermissionOverwriteType::Role(RoleId(guild_id)),
        },
        PermissionOverwrite {
            allow: access | Permissions::MANAGE_CHANNELS,
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Member(UserId(bot_user_id)),
        },
    ];

    overwrites.extend(grants.iter().map(|grant| PermissionOverwrite {
        allow: access,
        deny: Permissions::empty(),
        kind: match *grant {
            AccessGrant::Member(id) => PermissionOverwriteType::Member(UserId(id)),
            AccessGrant::Role(id) => PermissionOverwriteType::Role(RoleId(id)),
        },
    }));
    overwrites
}

// ============================================================================
// Builders
// ============================================================================

fn fill_embed<'a>(e: &'a mut CreateEmbed, embed: &Embed) -> &'a mut CreateEmbed {
    e.title(&embed.title);
    if let Some(ref description) = embed.description {
        e.description(description);
    }
    if let Some(color) = embed.color {
        e.color(color);
    }
    for field in &embed.fields {
        e.field(&field.name, &field.value, field.inline);
    }
    if let Some(ref footer) = embed.footer {
        e.footer(|f| f.text(footer));
    }
    e
}

fn fill_components<'a>(c: &'a mut CreateComponents, buttons: &[Button]) -> &'a mut CreateComponents {
    for row in buttons.chunks(BUTTONS_PER_ROW) {
        c.create_action_row(|r| {
            for button in row {
                r.create_button(|b| {
                    b.label(&button.label)
                        .style(button_style(button.style))
                        .custom_id(&button.custom_id);
                    if let Some(ref emoji) = button.emoji {
                        b.emoji(ReactionType::Unicode(emoji.clone()));
                    }
                    b
                });
            }
            r
        });
    }
    c
}

fn button_style(style: ButtonStyle) -> SerenityButtonStyle {
    match style {
        ButtonStyle::Primary => SerenityButtonStyle::Primary,
        ButtonStyle::Secondary => SerenityButtonStyle::Secondary,
        ButtonStyle::Success => SerenityButtonStyle::Success,
        ButtonStyle::Danger => SerenityButtonStyle::Danger,
    }
}

fn fill_message<'a, 'b>(m: &'b mut CreateMessage<'a>, message: OutgoingMessage) -> &'b mut CreateMessage<'a> {
    if let Some(ref content) = message.content {
        m.content(content);
    }
    if let Some(ref embed) = message.embed {
        m.embed(|e| fill_embed(e, embed));
    }
    if !message.buttons.is_empty() {
        m.components(|c| fill_components(c, &message.buttons));
    }
    if let Some(file) = message.attachment {
        m.add_file(AttachmentType::Bytes {
            data: Cow::Owned(file.data),
            filename: file.filename,
        });
    }
    m
}

fn fill_followup<'a, 'b>(
    f: &'b mut CreateInteractionResponseFollowup<'a>,
    reply: &Reply,
) -> &'b mut CreateInteractionResponseFollowup<'a> {
    f.ephemeral(reply.ephemeral);
    if let Some(ref content) = reply.message.content {
        f.content(content);
    }
    if let Some(ref embed) = reply.message.embed {
        f.embed(|e| fill_embed(e, embed));
    }
    if !reply.message.buttons.is_empty() {
        f.components(|c| fill_components(c, &reply.message.buttons));
    }
    f
}

// ============================================================================
// Inbound conversions
// ============================================================================

fn history_message(message: &Message) -> HistoryMessage {
    HistoryMessage {
        timestamp: DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0).unwrap_or_default(),
        author: message.author.name.clone(),
        content: message.content.clone(),
        embed_titles: message.embeds.iter().filter_map(|e| e.title.clone()).collect(),
        attachment_names: message.attachments.iter().map(|a| a.filename.clone()).collect(),
    }
}

/// Channel ids mentioned as `<#id>` in message text
pub fn channel_mentions(content: &str) -> Vec<u64> {
    CHANNEL_MENTION
        .captures_iter(content)
        .filter_map(|cap| cap[1].parse().ok())
        .collect()
}

pub fn inbound_message(message: &Message) -> InboundMessage {
    InboundMessage {
        guild_id: message.guild_id.map(|g| g.0),
        channel_id: message.channel_id.0,
        message_id: message.id.0,
        author_id: message.author.id.0,
        content: message.content.clone(),
        role_mentions: message.mention_roles.iter().map(|r| r.0).collect(),
        channel_mentions: channel_mentions(&message.content),
    }
}

fn can_manage(member: Option<&Member>) -> bool {
    member
        .and_then(|m| m.permissions)
        .map(|p| p.manage_channels() || p.administrator())
        .unwrap_or(false)
}

pub fn component_press(component: &MessageComponentInteraction) -> ComponentPress {
    ComponentPress {
        guild_id: component.guild_id.map(|g| g.0),
        channel_id: component.channel_id.0,
        user_id: component.user.id.0,
        user_name: component.user.name.clone(),
        custom_id: component.data.custom_id.clone(),
        can_manage_channels: can_manage(component.member.as_ref()),
    }
}

pub fn command_invocation(command: &ApplicationCommandInteraction) -> CommandInvocation {
    let options: BTreeMap<String, String> = command
        .data
        .options
        .iter()
        .filter_map(|option| {
            let value = option.value.as_ref()?;
            let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            Some((option.name.clone(), value))
        })
        .collect();

    CommandInvocation {
        name: command.data.name.clone(),
        guild_id: command.guild_id.map(|g| g.0),
        channel_id: command.channel_id.0,
        user_id: command.user.id.0,
        user_name: command.user.name.clone(),
        can_manage: can_manage(command.member.as_ref()),
        options,
    }
}

// ============================================================================
// Interaction responses
// ============================================================================

/// Acknowledge a button press without changing the message it sits on
pub async fn acknowledge_component(http: &Http, component: &MessageComponentInteraction) -> serenity::Result<()> {
    component
        .create_interaction_response(http, |r| r.kind(InteractionResponseType::DeferredUpdateMessage))
        .await
}

pub async fn send_component_reply(
    http: &Http,
    component: &MessageComponentInteraction,
    reply: &Reply,
) -> serenity::Result<()> {
    component
        .create_followup_message(http, |f| fill_followup(f, reply))
        .await?;
    Ok(())
}

/// Defer a slash command; the deferral fixes whether the reply is ephemeral
pub async fn defer_command(
    http: &Http,
    command: &ApplicationCommandInteraction,
    ephemeral: bool,
) -> serenity::Result<()> {
    command
        .create_interaction_response(http, |r| {
            r.kind(InteractionResponseType::DeferredChannelMessageWithSource)
                .interaction_response_data(|d| d.ephemeral(ephemeral))
        })
        .await
}

pub async fn send_command_reply(
    http: &Http,
    command: &ApplicationCommandInteraction,
    reply: &Reply,
) -> serenity::Result<()> {
    command
        .create_followup_message(http, |f| fill_followup(f, reply))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_mentions() {
        assert_eq!(channel_mentions("logs go to <#123> and <#456>"), vec![123, 456]);
        assert!(channel_mentions("no mention, just #general").is_empty());
    }

    #[test]
    fn test_private_overwrites_hide_channel_from_everyone() {
        let overwrites = private_overwrites(1, 2, &[AccessGrant::Member(3), AccessGrant::Role(4)]);
        assert_eq!(overwrites.len(), 4);

        let everyone = &overwrites[0];
        assert_eq!(everyone.kind, PermissionOverwriteType::Role(RoleId(1)));
        assert!(everyone.deny.view_channel());

        let bot = &overwrites[1];
        assert_eq!(bot.kind, PermissionOverwriteType::Member(UserId(2)));
        assert!(bot.allow.view_channel());

        assert!(overwrites[2..].iter().all(|o| o.allow.send_messages() && o.deny.is_empty()));
        assert_eq!(overwrites[3].kind, PermissionOverwriteType::Role(RoleId(4)));
    }

    #[test]
    fn test_button_styles_map_one_to_one() {
        assert_eq!(button_style(ButtonStyle::Danger), SerenityButtonStyle::Danger);
        assert_eq!(button_style(ButtonStyle::Success), SerenityButtonStyle::Success);
    }
}
