//! Drives a [`SetupWizard`] conversation and publishes the resulting panel.

use crate::action::ActionToken;
use crate::catalog::{CategoryCatalog, TicketCategory};
use crate::config::TimeoutConfig;
use crate::error::TicketError;
use crate::platform::{Button, ButtonStyle, ChatPlatform, Embed, InboundEvent, OutgoingMessage};
use crate::registry::ConfigurationRegistry;
use crate::store::{CategoryConfig, PanelConfig};
use crate::waiter::{self, ConversationKey, CorrelationWaiter};
use crate::wizard::{AbortReason, PanelDraft, SetupWizard, WizardInput, WizardStep};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const COLOR_INFO: u32 = 0x3498db;
const COLOR_SUCCESS: u32 = 0x2ecc71;
const COLOR_WARNING: u32 = 0xe67e22;

/// Who started setup, and for which panel channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupRequest {
    pub guild_id: u64,
    pub admin_id: u64,
    /// Where the admin talks to the wizard
    pub conversation_channel_id: u64,
    /// Where the intake panel is published
    pub panel_channel_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    Published { panel_id: String, panel_message_id: u64 },
    Aborted(AbortReason),
}

#[derive(Clone)]
pub struct SetupRunner {
    platform: Arc<dyn ChatPlatform>,
    waiter: CorrelationWaiter,
    registry: ConfigurationRegistry,
    timeouts: TimeoutConfig,
}

impl SetupRunner {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        waiter: CorrelationWaiter,
        registry: ConfigurationRegistry,
        timeouts: TimeoutConfig,
    ) -> Self {
        SetupRunner {
            platform,
            waiter,
            registry,
            timeouts,
        }
    }

    /// Run the whole conversation. Nothing is persisted unless the wizard
    /// reaches `Publish`.
    pub async fn run(&self, request: SetupRequest) -> Result<SetupOutcome, TicketError> {
        let panel_id = request.panel_channel_id.to_string();
        let panel_exists = self.registry.contains(&panel_id).await;
        let has_log_channel = self.registry.log_channel().await.is_some();
        let mut wizard = SetupWizard::new(panel_id, request.admin_id, panel_exists, has_log_channel);
        let conversation = ConversationKey::new(request.admin_id, request.conversation_channel_id);

        info!(
            "Setup started by {} for panel channel {}",
            request.admin_id, request.panel_channel_id
        );

        while !wizard.is_finished() {
            let step = wizard.step();
            self.prompt(&wizard, &request).await?;

            let input = match self
                .waiter
                .wait_for(conversation, self.timeout_for(step), predicate_for(&wizard, conversation))
                .await
            {
                Ok(event) => input_from(step, &event),
                Err(TicketError::TimedOut) => WizardInput::TimedOut,
                Err(e) => return Err(e),
            };

            if input == WizardInput::TimedOut {
                self.notify_timeout(&wizard, &request).await?;
            } else if let WizardInput::Text(_) = input {
                if let Some(category) = wizard.current_category() {
                    self.say(
                        request.conversation_channel_id,
                        format!("✅ Custom message saved for {}", category.label),
                    )
                    .await?;
                }
            }
            wizard.advance(input);
        }

        match wizard.step() {
            WizardStep::Aborted(reason) => {
                let text = match reason {
                    AbortReason::TimedOut => "❌ Setup cancelled: time's up.",
                    AbortReason::Cancelled => "❌ Setup cancelled, the existing configuration was kept.",
                };
                self.say(request.conversation_channel_id, text).await?;
                info!("Setup for panel {} aborted ({reason:?})", wizard.panel_id());
                Ok(SetupOutcome::Aborted(reason))
            }
            _ => {
                let draft = wizard
                    .draft()
                    .ok_or_else(|| TicketError::NotFound("setup draft".to_string()))?;
                self.publish(draft, &request).await
            }
        }
    }

    fn timeout_for(&self, step: WizardStep) -> Duration {
        match step {
            WizardStep::ConfirmReplace => self.timeouts.confirm(),
            WizardStep::AwaitRole => self.timeouts.role(),
            WizardStep::AwaitCategoryChoice { .. } => self.timeouts.category_choice(),
            WizardStep::AwaitCustomText { .. } => self.timeouts.custom_text(),
            WizardStep::AwaitLogChannel => self.timeouts.log_channel(),
            WizardStep::Publish | WizardStep::Aborted(_) => Duration::ZERO,
        }
    }

    async fn say(&self, channel_id: u64, text: impl Into<String>) -> Result<(), TicketError> {
        self.platform
            .send_message(channel_id, OutgoingMessage::text(text))
            .await?;
        Ok(())
    }

    async fn prompt(&self, wizard: &SetupWizard, request: &SetupRequest) -> Result<(), TicketError> {
        let panel_id = wizard.panel_id().to_string();
        let message = match wizard.step() {
            WizardStep::ConfirmReplace => OutgoingMessage::embed(
                Embed::new("⚠️ Existing configuration")
                    .description("This channel already has a ticket configuration.\nDo you want to replace it?")
                    .color(COLOR_WARNING),
            )
            .with_button(Button::new(
                "Replace",
                ButtonStyle::Danger,
                ActionToken::ReplaceConfig { panel_id: panel_id.clone() }.encode(),
            ))
            .with_button(Button::new(
                "Cancel",
                ButtonStyle::Secondary,
                ActionToken::CancelConfig { panel_id }.encode(),
            )),
            WizardStep::AwaitRole => OutgoingMessage::embed(
                Embed::new("🔧 Ticket Setup (1/3)")
                    .description("Mention the role that will have access to every ticket\nFor example: @Support or @Staff")
                    .color(COLOR_INFO),
            ),
            WizardStep::AwaitCategoryChoice { index } => {
                let Some(category) = wizard.current_category() else {
                    return Ok(());
                };
                let mut message = category_choice_prompt(&panel_id, category);
                if index == 0 {
                    message = message.with_content(
                        "🔧 **Ticket Setup (2/3)**\nConfigure the welcome message of each category. \
                         Use {user} to mention the member who opened the ticket.",
                    );
                }
                message
            }
            WizardStep::AwaitCustomText { .. } => OutgoingMessage::text(
                "📝 Write your custom message. Use {user} to mention the member.",
            ),
            WizardStep::AwaitLogChannel => OutgoingMessage::embed(
                Embed::new("🔧 Ticket Setup (3/3)")
                    .description("Mention the channel where ticket transcripts will be logged\nFor example: #ticket-logs")
                    .color(COLOR_INFO),
            ),
            WizardStep::Publish | WizardStep::Aborted(_) => return Ok(()),
        };

        self.platform
            .send_message(request.conversation_channel_id, message)
            .await?;
        Ok(())
    }

    async fn notify_timeout(&self, wizard: &SetupWizard, request: &SetupRequest) -> Result<(), TicketError> {
        if let Some(category) = wizard.current_category() {
            warn!(
                "Setup for panel {}: no answer for {}, keeping the default message",
                wizard.panel_id(),
                category.id
            );
            self.say(
                request.conversation_channel_id,
                format!("⏳ Time's up, using the default message for {}", category.label),
            )
            .await?;
        }
        Ok(())
    }

    /// Allocate one grouping container per category, post the intake panel
    /// and persist the configuration.
    async fn publish(&self, draft: PanelDraft, request: &SetupRequest) -> Result<SetupOutcome, TicketError> {
        let mut categories = BTreeMap::new();
        let mut group_ids = Vec::new();
        for (category, template) in &draft.templates {
            let group_id = match self
                .platform
                .create_group(request.guild_id, &format!("Tickets - {}", category.label))
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    self.discard_groups(&group_ids).await;
                    return Err(e.into());
                }
            };
            group_ids.push(group_id);
            categories.insert(
                category.id.to_string(),
                CategoryConfig {
                    welcome_template: template.clone(),
                    destination_group_id: Some(group_id),
                },
            );
        }

        let panel_message_id = match self
            .platform
            .send_message(request.panel_channel_id, intake_panel(&draft.panel_id))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.discard_groups(&group_ids).await;
                return Err(e.into());
            }
        };

        self.registry
            .upsert_panel(
                &draft.panel_id,
                PanelConfig {
                    support_role_id: Some(draft.support_role_id),
                    categories,
                    panel_message_id: Some(panel_message_id),
                },
            )
            .await?;
        if let Some(log_channel_id) = draft.log_channel_id {
            self.registry.set_log_channel(log_channel_id).await?;
        }

        self.platform
            .send_message(
                request.conversation_channel_id,
                OutgoingMessage::embed(
                    Embed::new("✅ Setup complete")
                        .description(format!(
                            "The ticket system is configured in <#{}>.\nSupport role: <@&{}>",
                            request.panel_channel_id, draft.support_role_id
                        ))
                        .color(COLOR_SUCCESS),
                ),
            )
            .await?;

        info!(
            "Published ticket panel {} (message {panel_message_id})",
            draft.panel_id
        );
        Ok(SetupOutcome::Published {
            panel_id: draft.panel_id,
            panel_message_id,
        })
    }

    /// Remove grouping containers of a panel that was never published.
    async fn discard_groups(&self, group_ids: &[u64]) {
        for group_id in group_ids {
            if let Err(e) = self.platform.delete_channel(*group_id).await {
                warn!("Could not remove unused ticket group {group_id}: {e}");
            }
        }
    }
}

fn category_choice_prompt(panel_id: &str, category: &TicketCategory) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new(format!("Message for {} {}", category.label, category.emblem))
            .description(format!(
                "Default message:\n```{}```\nChoose an option below:",
                category.default_template
            ))
            .color(category.color),
    )
    .with_button(
        Button::new(
            "Use default",
            ButtonStyle::Success,
            ActionToken::WizardDefault {
                panel_id: panel_id.to_string(),
                category_id: category.id.to_string(),
            }
            .encode(),
        )
        .emoji("✅"),
    )
    .with_button(
        Button::new(
            "Custom message",
            ButtonStyle::Primary,
            ActionToken::WizardCustom {
                panel_id: panel_id.to_string(),
                category_id: category.id.to_string(),
            }
            .encode(),
        )
        .emoji("✏️"),
    )
}

/// The public panel: one button per catalog category
pub fn intake_panel(panel_id: &str) -> OutgoingMessage {
    let catalog = CategoryCatalog::new();
    let mut embed = Embed::new("🎫 Open a Ticket")
        .description("Click the button matching your request to open a ticket.")
        .color(COLOR_INFO);
    for category in catalog.all() {
        embed = embed.field(
            format!("{} {}", category.emblem, category.label),
            category.description,
            false,
        );
    }

    catalog
        .all()
        .iter()
        .fold(OutgoingMessage::embed(embed), |message, category| {
            message.with_button(
                Button::new(
                    category.label,
                    ButtonStyle::Secondary,
                    ActionToken::CreateTicket {
                        panel_id: panel_id.to_string(),
                        category_id: category.id.to_string(),
                    }
                    .encode(),
                )
                .emoji(category.emblem),
            )
        })
}

/// Which inbound events answer the wizard's current step
fn predicate_for(
    wizard: &SetupWizard,
    conversation: ConversationKey,
) -> Box<dyn Fn(&InboundEvent) -> bool + Send + Sync> {
    let ConversationKey { user_id, channel_id } = conversation;
    let panel_id = wizard.panel_id().to_string();

    match wizard.step() {
        WizardStep::ConfirmReplace => Box::new(waiter::press_by(
            user_id,
            vec![
                ActionToken::ReplaceConfig { panel_id: panel_id.clone() }.encode(),
                ActionToken::CancelConfig { panel_id }.encode(),
            ],
        )),
        WizardStep::AwaitRole => Box::new(waiter::role_mention_from(user_id, channel_id)),
        WizardStep::AwaitCategoryChoice { .. } => {
            let category_id = wizard
                .current_category()
                .map(|c| c.id.to_string())
                .unwrap_or_default();
            Box::new(waiter::press_by(
                user_id,
                vec![
                    ActionToken::WizardDefault {
                        panel_id: panel_id.clone(),
                        category_id: category_id.clone(),
                    }
                    .encode(),
                    ActionToken::WizardCustom { panel_id, category_id }.encode(),
                ],
            ))
        }
        WizardStep::AwaitCustomText { .. } => Box::new(waiter::message_from(user_id, channel_id)),
        WizardStep::AwaitLogChannel => Box::new(waiter::channel_mention_from(user_id, channel_id)),
        WizardStep::Publish | WizardStep::Aborted(_) => Box::new(|_| false),
    }
}

/// Translate the event that answered `step` into a wizard input
fn input_from(step: WizardStep, event: &InboundEvent) -> WizardInput {
    match event {
        InboundEvent::Component(press) => match ActionToken::decode(&press.custom_id) {
            Some(ActionToken::ReplaceConfig { .. }) => WizardInput::Replace,
            Some(ActionToken::CancelConfig { .. }) => WizardInput::Cancel,
            Some(ActionToken::WizardDefault { .. }) => WizardInput::UseDefault,
            Some(ActionToken::WizardCustom { .. }) => WizardInput::WriteCustom,
            _ => WizardInput::TimedOut,
        },
        InboundEvent::Message(message) => match step {
            WizardStep::AwaitRole => message
                .role_mentions
                .first()
                .map(|id| WizardInput::RoleDesignated(*id))
                .unwrap_or(WizardInput::TimedOut),
            WizardStep::AwaitLogChannel => message
                .channel_mentions
                .first()
                .map(|id| WizardInput::ChannelDesignated(*id))
                .unwrap_or(WizardInput::TimedOut),
            _ => WizardInput::Text(message.content.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ComponentPress, InboundMessage};

    #[test]
    fn test_intake_panel_has_one_button_per_category() {
        let panel = intake_panel("42");
        let ids: Vec<_> = panel.buttons.iter().map(|b| b.custom_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "create_ticket:42:support",
                "create_ticket:42:bug",
                "create_ticket:42:order",
                "create_ticket:42:other"
            ]
        );
        assert_eq!(panel.embed.map(|e| e.fields.len()), Some(4));
    }

    #[test]
    fn test_inputs_from_events() {
        let press = InboundEvent::Component(ComponentPress {
            guild_id: Some(1),
            channel_id: 2,
            user_id: 3,
            user_name: "admin".into(),
            custom_id: "wizard_custom:42:bug".into(),
            can_manage_channels: true,
        });
        assert_eq!(
            input_from(WizardStep::AwaitCategoryChoice { index: 1 }, &press),
            WizardInput::WriteCustom
        );

        let message = InboundEvent::Message(InboundMessage {
            guild_id: Some(1),
            channel_id: 2,
            message_id: 5,
            author_id: 3,
            content: "<@&77> <#88>".into(),
            role_mentions: vec![77],
            channel_mentions: vec![88],
        });
        assert_eq!(input_from(WizardStep::AwaitRole, &message), WizardInput::RoleDesignated(77));
        assert_eq!(
            input_from(WizardStep::AwaitLogChannel, &message),
            WizardInput::ChannelDesignated(88)
        );
        assert_eq!(
            input_from(WizardStep::AwaitCustomText { index: 0 }, &message),
            WizardInput::Text("<@&77> <#88>".into())
        );
    }
}
