//! # Feature: Interaction Router
//!
//! Single entry point for inbound platform events: messages, button presses
//! and slash commands. Pending conversations get first pick of every event;
//! what they leave is decoded and dispatched to the ticket handlers.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Typed action tokens and waiter-first dispatch
//! - 1.0.0: Prefix-matched custom ids

use crate::action::ActionToken;
use crate::admin::PanelAdmin;
use crate::catalog::Priority;
use crate::commands::names;
use crate::config::TimeoutConfig;
use crate::error::TicketError;
use crate::lifecycle::{CreateRequest, TicketLifecycle};
use crate::platform::{ChatPlatform, ComponentPress, Embed, InboundEvent, InboundMessage, OutgoingMessage, Reply};
use crate::registry::ConfigurationRegistry;
use crate::setup::{SetupRequest, SetupRunner};
use crate::store::TicketStore;
use crate::waiter::CorrelationWaiter;
use log::{debug, error, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

const NOT_THE_AUTHOR: &str = "❌ Only the command author can use these buttons!";

/// A slash command as the router sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub name: String,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub user_id: u64,
    pub user_name: String,
    /// Whether the invoker may manage channels here
    pub can_manage: bool,
    /// Option values by name; channel options hold the channel id
    pub options: BTreeMap<String, String>,
}

impl CommandInvocation {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn channel_option(&self, name: &str) -> Option<u64> {
        self.option(name).and_then(|v| v.parse().ok())
    }
}

/// The assembled ticket desk and its event entry points
#[derive(Clone)]
pub struct InteractionRouter {
    platform: Arc<dyn ChatPlatform>,
    store: TicketStore,
    registry: ConfigurationRegistry,
    waiter: CorrelationWaiter,
    lifecycle: TicketLifecycle,
    setup: SetupRunner,
    admin: PanelAdmin,
}

impl InteractionRouter {
    pub fn new(platform: Arc<dyn ChatPlatform>, store: TicketStore, timeouts: TimeoutConfig) -> Self {
        let registry = ConfigurationRegistry::new(store.clone());
        let waiter = CorrelationWaiter::new();
        let lifecycle = TicketLifecycle::new(platform.clone(), store.clone(), registry.clone());
        let setup = SetupRunner::new(platform.clone(), waiter.clone(), registry.clone(), timeouts.clone());
        let admin = PanelAdmin::new(
            platform.clone(),
            store.clone(),
            registry.clone(),
            lifecycle.clone(),
            waiter.clone(),
            timeouts,
        );

        InteractionRouter {
            platform,
            store,
            registry,
            waiter,
            lifecycle,
            setup,
            admin,
        }
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    pub fn registry(&self) -> &ConfigurationRegistry {
        &self.registry
    }

    pub fn waiter(&self) -> &CorrelationWaiter {
        &self.waiter
    }

    pub fn lifecycle(&self) -> &TicketLifecycle {
        &self.lifecycle
    }

    pub fn setup(&self) -> &SetupRunner {
        &self.setup
    }

    pub fn admin(&self) -> &PanelAdmin {
        &self.admin
    }

    /// Offer a plain message to pending conversations. Returns whether one
    /// of them consumed it.
    pub fn handle_message(&self, message: InboundMessage) -> bool {
        self.waiter.offer(InboundEvent::Message(message)).is_none()
    }

    /// Handle a button press. `None` means nothing needs to be said back.
    pub async fn handle_component(&self, press: ComponentPress) -> Option<Reply> {
        let press = match self.waiter.offer(InboundEvent::Component(press)) {
            None => return None,
            Some(InboundEvent::Component(press)) => press,
            Some(InboundEvent::Message(_)) => return None,
        };

        let Some(token) = ActionToken::decode(&press.custom_id) else {
            debug!("Ignoring unknown action token '{}'", press.custom_id);
            return None;
        };

        match self.dispatch(token, &press).await {
            Ok(reply) => reply,
            Err(e) => Some(failure_reply(&press.custom_id, e)),
        }
    }

    async fn dispatch(&self, token: ActionToken, press: &ComponentPress) -> Result<Option<Reply>, TicketError> {
        let reply = match token {
            ActionToken::CreateTicket { panel_id, category_id } => {
                let Some(guild_id) = press.guild_id else {
                    return Ok(None);
                };
                let channel_id = self
                    .lifecycle
                    .create(CreateRequest {
                        guild_id,
                        panel_id,
                        category_id,
                        user_id: press.user_id,
                        user_name: press.user_name.clone(),
                    })
                    .await?;
                Reply::private(format!("✅ Your ticket has been created: <#{channel_id}>"))
            }
            ActionToken::CloseTicket { ticket_id } => Reply::private_message(
                self.lifecycle
                    .request_close(ticket_id, press.user_id, press.can_manage_channels)
                    .await?,
            ),
            ActionToken::ConfirmClose { ticket_id } => {
                self.lifecycle
                    .confirm_close(ticket_id, press.user_id, press.can_manage_channels)
                    .await?;
                Reply::private("✅ The ticket was closed and the transcript was sent.")
            }
            ActionToken::CancelClose { .. } => Reply::private("❌ Ticket closing cancelled."),

            // Only meaningful while their setup conversation is waiting for them
            ActionToken::ReplaceConfig { .. }
            | ActionToken::CancelConfig { .. }
            | ActionToken::WizardDefault { .. }
            | ActionToken::WizardCustom { .. } => Reply::private(NOT_THE_AUTHOR),

            ActionToken::EditRole { panel_id } => {
                if !self.admin.owns_edit_session(&panel_id, press.user_id) {
                    return Ok(Some(Reply::private(NOT_THE_AUTHOR)));
                }
                Reply::private(
                    self.admin
                        .edit_role(&panel_id, press.user_id, press.channel_id)
                        .await?,
                )
            }
            ActionToken::EditCategory { panel_id, category_id } => {
                if !self.admin.owns_edit_session(&panel_id, press.user_id) {
                    return Ok(Some(Reply::private(NOT_THE_AUTHOR)));
                }
                Reply::private_message(self.admin.edit_category(&panel_id, &category_id).await?)
            }
            ActionToken::EditCategoryGroup { panel_id, category_id } => {
                if !self.admin.owns_edit_session(&panel_id, press.user_id) {
                    return Ok(Some(Reply::private(NOT_THE_AUTHOR)));
                }
                let Some(guild_id) = press.guild_id else {
                    return Ok(None);
                };
                Reply::private(
                    self.admin
                        .edit_category_group(guild_id, &panel_id, &category_id, press.user_id, press.channel_id)
                        .await?,
                )
            }
            ActionToken::EditCategoryMessage { panel_id, category_id } => {
                if !self.admin.owns_edit_session(&panel_id, press.user_id) {
                    return Ok(Some(Reply::private(NOT_THE_AUTHOR)));
                }
                Reply::private_message(self.admin.edit_category_message(&panel_id, &category_id).await?)
            }
            ActionToken::UseDefaultMessage { panel_id, category_id } => {
                if !self.admin.owns_edit_session(&panel_id, press.user_id) {
                    return Ok(Some(Reply::private(NOT_THE_AUTHOR)));
                }
                Reply::private(self.admin.use_default_message(&panel_id, &category_id).await?)
            }
            ActionToken::CustomMessage { panel_id, category_id } => {
                if !self.admin.owns_edit_session(&panel_id, press.user_id) {
                    return Ok(Some(Reply::private(NOT_THE_AUTHOR)));
                }
                Reply::private(
                    self.admin
                        .custom_message(&panel_id, &category_id, press.user_id, press.channel_id)
                        .await?,
                )
            }

            ActionToken::EditLogs => {
                require_manager(press.can_manage_channels, "edit the log channel")?;
                Reply::private_message(self.admin.edit_logs(press.user_id, press.channel_id).await?)
            }
            ActionToken::ConfirmDelete { panel_id } => {
                require_manager(press.can_manage_channels, "delete a ticket configuration")?;
                Reply::private(self.admin.confirm_delete(&panel_id).await?)
            }
            ActionToken::CancelDelete { .. } => Reply::private("❌ Deletion cancelled."),
        };
        Ok(Some(reply))
    }

    /// Handle a slash command; always produces a reply
    pub async fn handle_command(&self, invocation: CommandInvocation) -> Reply {
        match self.run_command(&invocation).await {
            Ok(reply) => reply,
            Err(e) => failure_reply(&invocation.name, e),
        }
    }

    async fn run_command(&self, invocation: &CommandInvocation) -> Result<Reply, TicketError> {
        if invocation.name != names::CLOSE {
            require_manager(invocation.can_manage, &invocation.name)?;
        }

        let reply = match invocation.name.as_str() {
            names::TICKET_SETUP => {
                let guild_id = invocation
                    .guild_id
                    .ok_or_else(|| TicketError::NotFound("This server".to_string()))?;
                let panel_channel_id = invocation
                    .channel_option("channel")
                    .unwrap_or(invocation.channel_id);
                self.spawn_setup(SetupRequest {
                    guild_id,
                    admin_id: invocation.user_id,
                    conversation_channel_id: invocation.channel_id,
                    panel_channel_id,
                });
                Reply::private("🔧 Ticket setup started, answer the prompts in this channel.")
            }
            names::TICKET_LIST => Reply::private_message(self.admin.list_panels().await),
            names::TICKET_EDIT => Reply::private_message(
                self.admin
                    .edit_overview(&panel_target(invocation), invocation.user_id)
                    .await?,
            ),
            names::TICKET_DELETE => {
                Reply::private_message(self.admin.delete_prompt(&panel_target(invocation)).await?)
            }
            names::TICKET_LOGS => match invocation.channel_option("channel") {
                Some(channel_id) => Reply::private_message(self.admin.set_logs(channel_id).await?),
                None => Reply::private_message(self.admin.show_logs().await),
            },
            names::SET_PRIORITY => {
                let label = invocation.option("priority").unwrap_or_default();
                let priority = self
                    .lifecycle
                    .set_priority(invocation.channel_id, label)
                    .await?;
                Reply::public(priority_updated(priority))
            }
            names::TICKETS_PRIORITY => Reply::private_message(self.admin.priority_overview().await),
            names::CLOSE => Reply::private_message(
                self.lifecycle
                    .request_close(invocation.channel_id, invocation.user_id, invocation.can_manage)
                    .await?,
            ),
            names::TICKET_STATS => Reply::private_message(self.admin.stats_summary().await),
            other => {
                warn!("Unknown command: {other}");
                Reply::private("Unknown command")
            }
        };
        Ok(reply)
    }

    fn spawn_setup(&self, request: SetupRequest) {
        let setup = self.setup.clone();
        let platform = self.platform.clone();
        tokio::spawn(async move {
            let channel_id = request.conversation_channel_id;
            if let Err(e) = setup.run(request).await {
                error!("Ticket setup in channel {channel_id} failed: {e}");
                if let Err(why) = platform
                    .send_message(channel_id, OutgoingMessage::text(e.user_message()))
                    .await
                {
                    error!("Failed to report setup failure: {why}");
                }
            }
        });
    }
}

fn require_manager(can_manage: bool, what: &str) -> Result<(), TicketError> {
    if can_manage {
        Ok(())
    } else {
        Err(TicketError::Forbidden(what.to_string()))
    }
}

/// Panel chosen by the `channel` or `panel` option, else the current channel
fn panel_target(invocation: &CommandInvocation) -> String {
    invocation
        .channel_option("channel")
        .map(|id| id.to_string())
        .or_else(|| invocation.option("panel").map(str::to_string))
        .unwrap_or_else(|| invocation.channel_id.to_string())
}

fn priority_updated(priority: Priority) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new("🎯 Priority Updated")
            .description(format!(
                "Ticket priority set to **{}** {}",
                priority.label(),
                priority.emblem()
            ))
            .color(priority.color()),
    )
}

fn failure_reply(context: &str, e: TicketError) -> Reply {
    match &e {
        TicketError::Io(_) | TicketError::Platform(_) => error!("Error handling '{context}': {e}"),
        TicketError::Forbidden(_) => warn!("Denied '{context}': {e}"),
        _ => debug!("'{context}' rejected: {e}"),
    }
    Reply::private(e.user_message())
}
