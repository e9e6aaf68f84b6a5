//! # Feature: Panel Administration
//!
//! Listing, editing and deleting ticket panels, the log channel and the
//! staff priority overview.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Edit sessions restricted to the admin who opened the editor
//! - 1.1.0: Priority overview
//! - 1.0.0: List, edit and delete panels; log channel settings

use crate::action::ActionToken;
use crate::catalog::{CategoryCatalog, Priority, TicketCategory};
use crate::config::TimeoutConfig;
use crate::error::TicketError;
use crate::lifecycle::TicketLifecycle;
use crate::platform::{Button, ButtonStyle, ChatPlatform, Embed, OutgoingMessage};
use crate::registry::ConfigurationRegistry;
use crate::stats::TicketStats;
use crate::store::{PanelConfig, TicketStore};
use crate::waiter::{self, ConversationKey, CorrelationWaiter};
use dashmap::DashMap;
use log::{info, warn};
use std::sync::Arc;

const COLOR_INFO: u32 = 0x3498db;
const COLOR_SUCCESS: u32 = 0x2ecc71;
const COLOR_DANGER: u32 = 0xe74c3c;
const UNSET_EMBLEM: &str = "⚪";

#[derive(Clone)]
pub struct PanelAdmin {
    platform: Arc<dyn ChatPlatform>,
    store: TicketStore,
    registry: ConfigurationRegistry,
    lifecycle: TicketLifecycle,
    waiter: CorrelationWaiter,
    timeouts: TimeoutConfig,
    catalog: CategoryCatalog,
    /// Panel id -> admin who opened its editor
    edit_sessions: Arc<DashMap<String, u64>>,
}

impl PanelAdmin {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        store: TicketStore,
        registry: ConfigurationRegistry,
        lifecycle: TicketLifecycle,
        waiter: CorrelationWaiter,
        timeouts: TimeoutConfig,
    ) -> Self {
        PanelAdmin {
            platform,
            store,
            registry,
            lifecycle,
            waiter,
            timeouts,
            catalog: CategoryCatalog::new(),
            edit_sessions: Arc::new(DashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    pub async fn list_panels(&self) -> OutgoingMessage {
        let panels = self.registry.panels().await;
        if panels.is_empty() {
            return OutgoingMessage::text("❌ No ticket configuration exists.");
        }

        let mut embed = Embed::new("📋 Ticket Configurations")
            .description("Every configured ticket panel")
            .color(COLOR_INFO);
        for (panel_id, panel) in &panels {
            embed = embed.field(
                format!("📬 Panel in {}", channel_mention(panel_id)),
                format!(
                    "**Support role:** {}\n**Categories:**\n{}\n**ID:** `{panel_id}`",
                    role_mention(panel),
                    self.category_lines(panel).join("\n")
                ),
                false,
            );
        }

        let stats = self.store.read(|doc| doc.stats.clone()).await;
        if stats.total() > 0 {
            embed = embed.field("📊 Global Statistics", self.category_stats(&stats), false);
        }
        OutgoingMessage::embed(embed)
    }

    pub async fn stats_summary(&self) -> OutgoingMessage {
        let stats = self.store.read(|doc| doc.stats.clone()).await;
        OutgoingMessage::embed(
            Embed::new("📊 Ticket Statistics")
                .color(COLOR_INFO)
                .field("By category", self.category_stats(&stats), false)
                .field("By priority", priority_stats(&stats), false),
        )
    }

    /// Live tickets by priority plus priority usage counters
    pub async fn priority_overview(&self) -> OutgoingMessage {
        let mut embed = Embed::new("📊 Tickets by Priority").color(COLOR_INFO);
        for (priority, channels) in self.lifecycle.tickets_by_priority().await {
            let (emblem, label) = match priority {
                Some(p) => (p.emblem(), capitalize(p.label())),
                None => (UNSET_EMBLEM, "Unset".to_string()),
            };
            embed = embed.field(
                format!("{emblem} {label} priority ({})", channels.len()),
                channels
                    .iter()
                    .map(|id| format!("• <#{id}>"))
                    .collect::<Vec<_>>()
                    .join("\n"),
                false,
            );
        }

        let stats = self.store.read(|doc| doc.stats.clone()).await;
        OutgoingMessage::embed(embed.field("📈 Global Statistics", priority_stats(&stats), false))
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Open the editor for `panel_id`; its controls answer only `admin_id`
    pub async fn edit_overview(&self, panel_id: &str, admin_id: u64) -> Result<OutgoingMessage, TicketError> {
        let panel = self.existing_panel(panel_id).await?;
        self.edit_sessions.insert(panel_id.to_string(), admin_id);

        let mut embed = Embed::new("🔧 Edit Configuration")
            .description(format!(
                "Current configuration for {}:\n\n**Support role:** {}\n\n**Categories:**",
                channel_mention(panel_id),
                role_mention(&panel)
            ))
            .color(COLOR_INFO);
        let mut message = OutgoingMessage::default().with_button(
            Button::new(
                "Edit support role",
                ButtonStyle::Primary,
                ActionToken::EditRole { panel_id: panel_id.to_string() }.encode(),
            )
            .emoji("👥"),
        );

        for (category_id, config) in &panel.categories {
            let Some(category) = self.catalog.get(category_id) else {
                continue;
            };
            embed = embed.field(
                format!("{} {}", category.emblem, category.label),
                format!(
                    "Group: {}\nMessage: ```{}```",
                    group_mention(config.destination_group_id),
                    config.welcome_template
                ),
                false,
            );
            message = message.with_button(
                Button::new(
                    format!("Edit {}", category.label),
                    ButtonStyle::Secondary,
                    ActionToken::EditCategory {
                        panel_id: panel_id.to_string(),
                        category_id: category_id.clone(),
                    }
                    .encode(),
                )
                .emoji(category.emblem),
            );
        }

        message.embed = Some(embed);
        Ok(message)
    }

    /// Whether `user_id` opened the editor of `panel_id`
    pub fn owns_edit_session(&self, panel_id: &str, user_id: u64) -> bool {
        self.edit_sessions
            .get(panel_id)
            .is_some_and(|admin| *admin == user_id)
    }

    pub async fn edit_role(&self, panel_id: &str, user_id: u64, channel_id: u64) -> Result<String, TicketError> {
        self.existing_panel(panel_id).await?;
        self.say(channel_id, "📝 Mention the new support role.").await?;

        let event = self
            .waiter
            .wait_for(
                ConversationKey::new(user_id, channel_id),
                self.timeouts.edit(),
                waiter::role_mention_from(user_id, channel_id),
            )
            .await?;
        let role_id = event
            .as_message()
            .and_then(|m| m.role_mentions.first().copied())
            .ok_or(TicketError::TimedOut)?;

        self.registry.set_support_role(panel_id, role_id).await?;
        info!("Support role of panel {panel_id} set to {role_id}");
        Ok(format!("✅ Support role updated: <@&{role_id}>"))
    }

    pub async fn edit_category(&self, panel_id: &str, category_id: &str) -> Result<OutgoingMessage, TicketError> {
        self.existing_category(panel_id, category_id).await?;
        let category = self.known_category(category_id)?;

        Ok(OutgoingMessage::embed(
            Embed::new(format!("🔧 Edit {}", category.label))
                .description("What do you want to change?")
                .color(category.color),
        )
        .with_button(
            Button::new(
                "Change ticket group",
                ButtonStyle::Primary,
                ActionToken::EditCategoryGroup {
                    panel_id: panel_id.to_string(),
                    category_id: category_id.to_string(),
                }
                .encode(),
            )
            .emoji("📁"),
        )
        .with_button(
            Button::new(
                "Change message",
                ButtonStyle::Primary,
                ActionToken::EditCategoryMessage {
                    panel_id: panel_id.to_string(),
                    category_id: category_id.to_string(),
                }
                .encode(),
            )
            .emoji("✏️"),
        ))
    }

    /// Ask for a name and move the category's tickets to a new group of that name
    pub async fn edit_category_group(
        &self,
        guild_id: u64,
        panel_id: &str,
        category_id: &str,
        user_id: u64,
        channel_id: u64,
    ) -> Result<String, TicketError> {
        self.existing_category(panel_id, category_id).await?;
        self.say(channel_id, "📝 Enter the name of the new ticket group:").await?;

        let event = self
            .waiter
            .wait_for(
                ConversationKey::new(user_id, channel_id),
                self.timeouts.edit(),
                waiter::message_from(user_id, channel_id),
            )
            .await?;
        let name = event
            .as_message()
            .map(|m| m.content.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or(TicketError::TimedOut)?;

        let group_id = self.platform.create_group(guild_id, &name).await?;
        self.registry
            .set_category_group(panel_id, category_id, group_id)
            .await?;
        info!("Category {category_id} of panel {panel_id} moved to group {group_id}");
        Ok(format!("✅ Ticket group updated: {name}"))
    }

    pub async fn edit_category_message(
        &self,
        panel_id: &str,
        category_id: &str,
    ) -> Result<OutgoingMessage, TicketError> {
        self.existing_category(panel_id, category_id).await?;
        let category = self.known_category(category_id)?;

        Ok(OutgoingMessage::embed(
            Embed::new(format!("✏️ Edit message - {}", category.label))
                .description("Choose an option:")
                .color(category.color),
        )
        .with_button(
            Button::new(
                "Default message",
                ButtonStyle::Success,
                ActionToken::UseDefaultMessage {
                    panel_id: panel_id.to_string(),
                    category_id: category_id.to_string(),
                }
                .encode(),
            )
            .emoji("✅"),
        )
        .with_button(
            Button::new(
                "Custom message",
                ButtonStyle::Primary,
                ActionToken::CustomMessage {
                    panel_id: panel_id.to_string(),
                    category_id: category_id.to_string(),
                }
                .encode(),
            )
            .emoji("✏️"),
        ))
    }

    pub async fn use_default_message(&self, panel_id: &str, category_id: &str) -> Result<String, TicketError> {
        let category = self.known_category(category_id)?;
        self.registry
            .set_category_template(panel_id, category_id, category.default_template)
            .await?;
        Ok("✅ Default message restored!".to_string())
    }

    pub async fn custom_message(
        &self,
        panel_id: &str,
        category_id: &str,
        user_id: u64,
        channel_id: u64,
    ) -> Result<String, TicketError> {
        self.existing_category(panel_id, category_id).await?;
        self.say(
            channel_id,
            "📝 Write your custom message. Use {user} to mention the member.",
        )
        .await?;

        let event = self
            .waiter
            .wait_for(
                ConversationKey::new(user_id, channel_id),
                self.timeouts.custom_text(),
                waiter::message_from(user_id, channel_id),
            )
            .await?;
        let text = event
            .as_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        self.registry
            .set_category_template(panel_id, category_id, &text)
            .await?;
        Ok("✅ Custom message saved!".to_string())
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    pub async fn delete_prompt(&self, panel_id: &str) -> Result<OutgoingMessage, TicketError> {
        let panel = self.existing_panel(panel_id).await?;

        Ok(OutgoingMessage::embed(
            Embed::new("⚠️ Confirm Deletion")
                .description(format!(
                    "Do you really want to delete the ticket configuration in {}?\n\n**Categories:**\n{}\n**Support role:** {}",
                    channel_mention(panel_id),
                    self.category_lines(&panel).join("\n"),
                    role_mention(&panel)
                ))
                .color(COLOR_DANGER),
        )
        .with_button(Button::new(
            "Confirm",
            ButtonStyle::Danger,
            ActionToken::ConfirmDelete { panel_id: panel_id.to_string() }.encode(),
        ))
        .with_button(Button::new(
            "Cancel",
            ButtonStyle::Secondary,
            ActionToken::CancelDelete { panel_id: panel_id.to_string() }.encode(),
        )))
    }

    /// Remove the configuration, then the published panel if it can be found
    pub async fn confirm_delete(&self, panel_id: &str) -> Result<String, TicketError> {
        let removed = self.registry.remove_panel(panel_id).await?;
        self.edit_sessions.remove(panel_id);

        if let (Ok(channel_id), Some(message_id)) = (panel_id.parse::<u64>(), removed.panel_message_id) {
            if let Err(e) = self.platform.delete_message(channel_id, message_id).await {
                warn!("Could not remove published panel {message_id} in {channel_id}: {e}");
            }
        }
        Ok("✅ Ticket configuration deleted.".to_string())
    }

    // ------------------------------------------------------------------
    // Log channel
    // ------------------------------------------------------------------

    pub async fn show_logs(&self) -> OutgoingMessage {
        match self.registry.log_channel().await {
            Some(channel_id) => OutgoingMessage::embed(
                Embed::new("📋 Log Channel")
                    .description(format!("The current log channel is <#{channel_id}>"))
                    .color(COLOR_INFO),
            )
            .with_button(
                Button::new("Change", ButtonStyle::Danger, ActionToken::EditLogs.encode()).emoji("✏️"),
            ),
            None => OutgoingMessage::text(
                "❌ No log channel is configured.\nUse `/ticket_logs channel:#channel` to set one.",
            ),
        }
    }

    pub async fn set_logs(&self, channel_id: u64) -> Result<OutgoingMessage, TicketError> {
        self.registry.set_log_channel(channel_id).await?;
        Ok(OutgoingMessage::embed(
            Embed::new("✅ Log Channel")
                .description(format!("The log channel is now <#{channel_id}>"))
                .color(COLOR_SUCCESS),
        ))
    }

    pub async fn edit_logs(&self, user_id: u64, channel_id: u64) -> Result<OutgoingMessage, TicketError> {
        self.say(channel_id, "📝 Mention the new log channel.").await?;

        let event = self
            .waiter
            .wait_for(
                ConversationKey::new(user_id, channel_id),
                self.timeouts.edit(),
                waiter::channel_mention_from(user_id, channel_id),
            )
            .await?;
        let log_channel_id = event
            .as_message()
            .and_then(|m| m.channel_mentions.first().copied())
            .ok_or(TicketError::TimedOut)?;

        self.set_logs(log_channel_id).await
    }

    // ------------------------------------------------------------------

    async fn say(&self, channel_id: u64, text: &str) -> Result<(), TicketError> {
        self.platform
            .send_message(channel_id, OutgoingMessage::text(text))
            .await?;
        Ok(())
    }

    async fn existing_panel(&self, panel_id: &str) -> Result<PanelConfig, TicketError> {
        self.registry
            .panel(panel_id)
            .await
            .ok_or_else(|| TicketError::NotFound("This ticket configuration".to_string()))
    }

    async fn existing_category(&self, panel_id: &str, category_id: &str) -> Result<(), TicketError> {
        let panel = self.existing_panel(panel_id).await?;
        if panel.categories.contains_key(category_id) {
            Ok(())
        } else {
            Err(TicketError::NotFound("This ticket category".to_string()))
        }
    }

    fn known_category(&self, category_id: &str) -> Result<&'static TicketCategory, TicketError> {
        self.catalog
            .get(category_id)
            .ok_or_else(|| TicketError::NotFound("This ticket category".to_string()))
    }

    fn category_lines(&self, panel: &PanelConfig) -> Vec<String> {
        panel
            .categories
            .iter()
            .filter_map(|(id, config)| {
                let category = self.catalog.get(id)?;
                Some(format!(
                    "• {} {} ({})",
                    category.emblem,
                    category.label,
                    group_mention(config.destination_group_id)
                ))
            })
            .collect()
    }

    fn category_stats(&self, stats: &TicketStats) -> String {
        let mut lines = vec![format!("**Total tickets:** {}", stats.total())];
        lines.extend(self.catalog.all().iter().map(|c| {
            format!("{} **{}:** {} tickets", c.emblem, c.label, stats.by_category(c.id))
        }));
        lines.join("\n")
    }
}

fn priority_stats(stats: &TicketStats) -> String {
    Priority::ALL
        .iter()
        .map(|p| format!("{} **{}:** {} tickets", p.emblem(), capitalize(p.label()), stats.by_priority(*p)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn channel_mention(panel_id: &str) -> String {
    match panel_id.parse::<u64>() {
        Ok(id) => format!("<#{id}>"),
        Err(_) => format!("`{panel_id}`"),
    }
}

fn role_mention(panel: &PanelConfig) -> String {
    panel
        .support_role_id
        .map(|id| format!("<@&{id}>"))
        .unwrap_or_else(|| "Not configured".to_string())
}

fn group_mention(group_id: Option<u64>) -> String {
    group_id
        .map(|id| format!("<#{id}>"))
        .unwrap_or_else(|| "not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("urgent"), "Urgent");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_mentions() {
        assert_eq!(channel_mention("123"), "<#123>");
        assert_eq!(channel_mention("default"), "`default`");
        assert_eq!(group_mention(None), "not found");
    }

    #[test]
    fn test_priority_stats_lists_every_priority() {
        let text = priority_stats(&TicketStats::default());
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("🟢 **Low:** 0 tickets"));
    }
}
