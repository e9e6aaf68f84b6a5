//! # Feature: Ticket Lifecycle
//!
//! Opening, triaging and closing tickets.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Per-user creation lock, per-channel rename lock, retriable close
//! - 1.1.0: Priorities with channel name emblems
//! - 1.0.0: Private ticket channels with transcripts on close

use crate::action::ActionToken;
use crate::catalog::{render_welcome, CategoryCatalog, Priority};
use crate::error::{PlatformError, TicketError};
use crate::platform::{
    AccessGrant, Button, ButtonStyle, ChatPlatform, Embed, OutgoingMessage, PrivateChannelRequest,
};
use crate::registry::ConfigurationRegistry;
use crate::store::{ActiveTicket, TicketStore};
use crate::transcript::{render_transcript, transcript_filename};
use chrono::Utc;
use dashmap::DashMap;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_CHANNEL_NAME: usize = 100;
const COLOR_CLOSING: u32 = 0xe67e22;
const COLOR_INFO: u32 = 0x3498db;

/// A category button press on an intake panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub guild_id: u64,
    pub panel_id: String,
    pub category_id: String,
    pub user_id: u64,
    pub user_name: String,
}

/// What happened while closing a ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReport {
    pub owner_id: u64,
    pub transcript_lines: usize,
    pub delivered_to_owner: bool,
    pub logged: bool,
}

type LockMap = DashMap<u64, Arc<Mutex<()>>>;

#[derive(Clone)]
pub struct TicketLifecycle {
    platform: Arc<dyn ChatPlatform>,
    store: TicketStore,
    registry: ConfigurationRegistry,
    catalog: CategoryCatalog,
    user_locks: Arc<LockMap>,
    channel_locks: Arc<LockMap>,
}

impl TicketLifecycle {
    pub fn new(platform: Arc<dyn ChatPlatform>, store: TicketStore, registry: ConfigurationRegistry) -> Self {
        TicketLifecycle {
            platform,
            store,
            registry,
            catalog: CategoryCatalog::new(),
            user_locks: Arc::new(DashMap::new()),
            channel_locks: Arc::new(DashMap::new()),
        }
    }

    /// Open a ticket for `request.user_id` and return its channel id.
    ///
    /// A user owning a live ticket gets `AlreadyOpen` with that ticket's
    /// channel instead of a second one.
    pub async fn create(&self, request: CreateRequest) -> Result<u64, TicketError> {
        let lock = lock_for(&self.user_locks, request.user_id);
        let result = {
            let _guard = lock.lock().await;
            self.create_exclusive(&request).await
        };
        drop(lock);
        release(&self.user_locks, request.user_id);
        result
    }

    async fn create_exclusive(&self, request: &CreateRequest) -> Result<u64, TicketError> {
        let existing = self
            .store
            .read(|doc| doc.active_tickets.get(&request.user_id).map(|t| t.ticket_channel_id))
            .await;
        if let Some(channel_id) = existing {
            match self.platform.channel_name(channel_id).await {
                Ok(None) => {
                    warn!(
                        "Dropping stale ticket of user {}: channel {channel_id} no longer exists",
                        request.user_id
                    );
                    self.forget(request.user_id, channel_id).await?;
                }
                // Unknown is treated as still open
                Ok(Some(_)) | Err(_) => return Err(TicketError::AlreadyOpen { channel_id }),
            }
        }

        let panel = self
            .registry
            .panel(&request.panel_id)
            .await
            .ok_or_else(|| TicketError::NotFound("This ticket configuration".to_string()))?;
        let category = self
            .catalog
            .get(CategoryCatalog::canonical_id(&request.category_id))
            .ok_or_else(|| TicketError::NotFound("This ticket category".to_string()))?;
        let category_config = panel.categories.get(category.id);

        let mut grants = vec![AccessGrant::Member(request.user_id)];
        if let Some(role_id) = panel.support_role_id {
            grants.push(AccessGrant::Role(role_id));
        }

        let channel_id = self
            .platform
            .create_private_channel(PrivateChannelRequest {
                guild_id: request.guild_id,
                name: ticket_channel_name(&request.user_name, request.user_id),
                parent_group_id: category_config.and_then(|c| c.destination_group_id),
                grants,
                reason: Some(format!("Ticket opened by {}", request.user_name)),
            })
            .await?;

        let template = category_config
            .map(|c| c.welcome_template.as_str())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(category.default_template);
        let mut mentions = format!("<@{}>", request.user_id);
        if let Some(role_id) = panel.support_role_id {
            mentions.push_str(&format!(" <@&{role_id}>"));
        }
        let welcome = OutgoingMessage::embed(
            Embed::new(format!("{} New Ticket - {}", category.emblem, category.label))
                .description(render_welcome(template, &format!("<@{}>", request.user_id)))
                .color(category.color)
                .footer(format!("Ticket ID: {channel_id}")),
        )
        .with_content(mentions)
        .with_button(
            Button::new(
                "Close ticket",
                ButtonStyle::Danger,
                ActionToken::CloseTicket { ticket_id: channel_id }.encode(),
            )
            .emoji("🔒"),
        );

        let welcome_message_id = match self.platform.send_message(channel_id, welcome).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = self.platform.delete_channel(channel_id).await {
                    warn!("Could not remove half-created ticket channel {channel_id}: {cleanup}");
                }
                return Err(e.into());
            }
        };

        self.store
            .mutate(|doc| {
                doc.active_tickets.insert(
                    request.user_id,
                    ActiveTicket {
                        ticket_channel_id: channel_id,
                        category_id: category.id.to_string(),
                        welcome_message_id: Some(welcome_message_id),
                        created_at: Utc::now(),
                        priority: None,
                    },
                );
                doc.stats.record_created(category.id);
                Ok(())
            })
            .await?;

        info!(
            "Opened {} ticket {channel_id} for user {} from panel {}",
            category.id, request.user_id, request.panel_id
        );
        Ok(channel_id)
    }

    /// Tag the ticket in `channel_id` and rename the channel accordingly
    pub async fn set_priority(&self, channel_id: u64, label: &str) -> Result<Priority, TicketError> {
        let priority: Priority = label
            .parse()
            .map_err(|_| TicketError::InvalidPriority(label.to_string()))?;

        let lock = lock_for(&self.channel_locks, channel_id);
        let result = {
            let _guard = lock.lock().await;
            self.set_priority_exclusive(channel_id, priority).await
        };
        drop(lock);
        release(&self.channel_locks, channel_id);
        result
    }

    async fn set_priority_exclusive(&self, channel_id: u64, priority: Priority) -> Result<Priority, TicketError> {
        self.ticket_owner(channel_id).await?;

        let current_name = self
            .platform
            .channel_name(channel_id)
            .await?
            .ok_or_else(|| TicketError::NotFound("This ticket channel".to_string()))?;
        self.platform
            .rename_channel(channel_id, &apply_priority_emblem(&current_name, priority))
            .await?;

        self.store
            .mutate(|doc| {
                let ticket = doc
                    .ticket_in_channel_mut(channel_id)
                    .ok_or_else(|| TicketError::NotFound("This ticket".to_string()))?;
                ticket.priority = Some(priority);
                doc.stats.record_priority(priority);
                Ok(())
            })
            .await?;

        info!("Ticket {channel_id} tagged {priority}");
        Ok(priority)
    }

    /// Confirmation prompt for closing, if `actor_id` may close the ticket
    pub async fn request_close(
        &self,
        channel_id: u64,
        actor_id: u64,
        can_manage: bool,
    ) -> Result<OutgoingMessage, TicketError> {
        let owner_id = self.ticket_owner(channel_id).await?;
        if owner_id != actor_id && !can_manage {
            return Err(TicketError::Forbidden(format!("close ticket {channel_id}")));
        }

        Ok(OutgoingMessage::embed(
            Embed::new("🔒 Close Ticket")
                .description("Are you sure you want to close this ticket?\nA transcript will be generated before closing.")
                .color(COLOR_CLOSING),
        )
        .with_button(
            Button::new(
                "Confirm",
                ButtonStyle::Danger,
                ActionToken::ConfirmClose { ticket_id: channel_id }.encode(),
            )
            .emoji("✅"),
        )
        .with_button(
            Button::new(
                "Cancel",
                ButtonStyle::Secondary,
                ActionToken::CancelClose { ticket_id: channel_id }.encode(),
            )
            .emoji("❌"),
        ))
    }

    /// Close the ticket: transcript to the owner and the log channel, then
    /// remove the record and delete the channel, in that order.
    pub async fn confirm_close(
        &self,
        channel_id: u64,
        actor_id: u64,
        can_manage: bool,
    ) -> Result<CloseReport, TicketError> {
        let lock = lock_for(&self.channel_locks, channel_id);
        let result = {
            let _guard = lock.lock().await;
            self.confirm_close_exclusive(channel_id, actor_id, can_manage).await
        };
        drop(lock);
        release(&self.channel_locks, channel_id);
        result
    }

    async fn confirm_close_exclusive(
        &self,
        channel_id: u64,
        actor_id: u64,
        can_manage: bool,
    ) -> Result<CloseReport, TicketError> {
        let (owner_id, ticket) = self
            .store
            .read(|doc| doc.ticket_in_channel(channel_id).map(|(u, t)| (u, t.clone())))
            .await
            .ok_or_else(|| TicketError::NotFound("This ticket".to_string()))?;
        if owner_id != actor_id && !can_manage {
            return Err(TicketError::Forbidden(format!("close ticket {channel_id}")));
        }

        let Some(channel_name) = self.platform.channel_name(channel_id).await? else {
            warn!("Ticket channel {channel_id} is gone, dropping its record");
            self.forget(owner_id, channel_id).await?;
            return Err(TicketError::NotFound("This ticket".to_string()));
        };

        let history = self.platform.fetch_history(channel_id).await?;
        let transcript = render_transcript(&history);
        let filename = transcript_filename(&channel_name);

        let direct = OutgoingMessage::embed(
            Embed::new("📝 Ticket Transcript")
                .description(format!("Here is the transcript of your ticket #{channel_name}."))
                .color(COLOR_INFO),
        )
        .with_attachment(filename.clone(), transcript.clone().into_bytes());
        let delivered_to_owner = match self.platform.send_direct_message(owner_id, direct).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Could not DM transcript of ticket {channel_id} to user {owner_id}: {e}");
                false
            }
        };

        let mut logged = false;
        if let Some(log_channel_id) = self.registry.log_channel().await {
            let entry = OutgoingMessage::embed(
                Embed::new("📝 Ticket Closed")
                    .field("Ticket", channel_name.clone(), true)
                    .field("Opened by", format!("<@{owner_id}>"), true)
                    .field("Closed by", format!("<@{actor_id}>"), true)
                    .field("Category", ticket.category_id.clone(), true)
                    .color(COLOR_CLOSING)
                    .footer(Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            )
            .with_attachment(filename, transcript.into_bytes());
            match self.platform.send_message(log_channel_id, entry).await {
                Ok(_) => logged = true,
                Err(PlatformError::NotFound(_)) => {
                    warn!("Log channel {log_channel_id} no longer exists, transcript of {channel_id} not logged");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.forget(owner_id, channel_id).await?;
        if let Err(e) = self.platform.delete_channel(channel_id).await {
            warn!("Could not delete ticket channel {channel_id}, restoring its record: {e}");
            self.store
                .mutate(|doc| {
                    doc.active_tickets.entry(owner_id).or_insert(ticket);
                    Ok(())
                })
                .await?;
            return Err(e.into());
        }

        info!("Closed ticket {channel_id} of user {owner_id} (closed by {actor_id})");
        Ok(CloseReport {
            owner_id,
            transcript_lines: history.len(),
            delivered_to_owner,
            logged,
        })
    }

    /// Live tickets grouped by priority, most pressing first, untagged last
    pub async fn tickets_by_priority(&self) -> Vec<(Option<Priority>, Vec<u64>)> {
        self.store
            .read(|doc| {
                Priority::descending()
                    .map(Some)
                    .chain(std::iter::once(None))
                    .map(|priority| {
                        let channels = doc
                            .active_tickets
                            .values()
                            .filter(|t| t.priority == priority)
                            .map(|t| t.ticket_channel_id)
                            .collect::<Vec<_>>();
                        (priority, channels)
                    })
                    .filter(|(_, channels)| !channels.is_empty())
                    .collect()
            })
            .await
    }

    async fn ticket_owner(&self, channel_id: u64) -> Result<u64, TicketError> {
        self.store
            .read(|doc| doc.ticket_in_channel(channel_id).map(|(owner, _)| owner))
            .await
            .ok_or_else(|| TicketError::NotFound("This ticket".to_string()))
    }

    /// Remove the record of `user_id` if it still points at `channel_id`
    async fn forget(&self, user_id: u64, channel_id: u64) -> Result<(), TicketError> {
        self.store
            .mutate(|doc| {
                if doc
                    .active_tickets
                    .get(&user_id)
                    .is_some_and(|t| t.ticket_channel_id == channel_id)
                {
                    doc.active_tickets.remove(&user_id);
                }
                Ok(())
            })
            .await
    }
}

fn lock_for(locks: &LockMap, key: u64) -> Arc<Mutex<()>> {
    locks.entry(key).or_default().clone()
}

/// Drop the lock entry once nobody else holds or waits on it
fn release(locks: &LockMap, key: u64) {
    locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
}

/// `ticket-<username>`, reduced to characters Discord keeps in channel names
pub fn ticket_channel_name(user_name: &str, user_id: u64) -> String {
    let cleaned: String = user_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches('-');
    let name = if cleaned.is_empty() {
        format!("ticket-{user_id}")
    } else {
        format!("ticket-{cleaned}")
    };
    name.chars().take(MAX_CHANNEL_NAME).collect()
}

/// Replace any priority emblems at the front of `name` with `priority`'s
pub fn apply_priority_emblem(name: &str, priority: Priority) -> String {
    let mut bare = name;
    while let Some(previous) = Priority::ALL.iter().find(|p| bare.starts_with(p.emblem())) {
        bare = &bare[previous.emblem().len()..];
    }
    format!("{}{}", priority.emblem(), bare)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_emblem_is_replaced_not_stacked() {
        let first = apply_priority_emblem("ticket-alice", Priority::Low);
        assert_eq!(first, "🟢ticket-alice");
        let second = apply_priority_emblem(&first, Priority::Urgent);
        assert_eq!(second, "🔴ticket-alice");
        // A name that somehow collected several emblems is repaired
        assert_eq!(
            apply_priority_emblem("🟡🟠ticket-bob", Priority::High),
            "🟠ticket-bob"
        );
    }

    #[test]
    fn test_ticket_channel_name() {
        assert_eq!(ticket_channel_name("Alice", 1), "ticket-alice");
        assert_eq!(ticket_channel_name("john.doe", 1), "ticket-john-doe");
        assert_eq!(ticket_channel_name("***", 42), "ticket-42");
        assert!(ticket_channel_name(&"x".repeat(300), 1).chars().count() <= MAX_CHANNEL_NAME);
    }

    #[test]
    fn test_lock_entries_are_released() {
        let locks = LockMap::new();
        let lock = lock_for(&locks, 7);
        release(&locks, 7);
        assert!(locks.contains_key(&7));
        drop(lock);
        release(&locks, 7);
        assert!(!locks.contains_key(&7));
    }
}
