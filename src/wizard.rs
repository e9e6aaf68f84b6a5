//! # Feature: Setup Wizard
//!
//! Conversation state machine that configures one ticket panel. The machine
//! itself performs no I/O: [`crate::setup::SetupRunner`] renders each step,
//! waits for the admin's answer and feeds it back through
//! [`SetupWizard::advance`].
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Explicit state machine with per-step timeout policy
//! - 1.0.0: Role, welcome messages and log channel prompts

use crate::catalog::{CategoryCatalog, TicketCategory};

/// Where the wizard currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    /// The panel is already configured; waiting for replace or cancel
    ConfirmReplace,
    AwaitRole,
    /// Default or custom welcome text for catalog entry `index`
    AwaitCategoryChoice { index: usize },
    AwaitCustomText { index: usize },
    AwaitLogChannel,
    /// Finished; the draft is ready to publish
    Publish,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Cancelled,
    TimedOut,
}

/// An admin answer, or the absence of one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardInput {
    Replace,
    Cancel,
    RoleDesignated(u64),
    UseDefault,
    WriteCustom,
    Text(String),
    ChannelDesignated(u64),
    TimedOut,
}

/// Result of a completed wizard, before any platform resource exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelDraft {
    pub panel_id: String,
    pub support_role_id: u64,
    /// Welcome template per category, in catalog order
    pub templates: Vec<(&'static TicketCategory, String)>,
    /// Log channel picked during the wizard, if one had to be asked for
    pub log_channel_id: Option<u64>,
}

pub struct SetupWizard {
    panel_id: String,
    admin_id: u64,
    needs_log_channel: bool,
    categories: &'static [TicketCategory],
    step: WizardStep,
    support_role_id: Option<u64>,
    templates: Vec<(&'static TicketCategory, String)>,
    log_channel_id: Option<u64>,
}

impl SetupWizard {
    /// `panel_exists` adds the replace confirmation in front; `has_log_channel`
    /// skips the log channel question.
    pub fn new(panel_id: impl Into<String>, admin_id: u64, panel_exists: bool, has_log_channel: bool) -> Self {
        SetupWizard {
            panel_id: panel_id.into(),
            admin_id,
            needs_log_channel: !has_log_channel,
            categories: CategoryCatalog::new().all(),
            step: if panel_exists {
                WizardStep::ConfirmReplace
            } else {
                WizardStep::AwaitRole
            },
            support_role_id: None,
            templates: Vec::new(),
            log_channel_id: None,
        }
    }

    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    pub fn admin_id(&self) -> u64 {
        self.admin_id
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.step, WizardStep::Publish | WizardStep::Aborted(_))
    }

    /// Category the current step is about, if any
    pub fn current_category(&self) -> Option<&'static TicketCategory> {
        match self.step {
            WizardStep::AwaitCategoryChoice { index } | WizardStep::AwaitCustomText { index } => {
                self.categories.get(index)
            }
            _ => None,
        }
    }

    /// Feed one input and return the new step. Inputs that make no sense for
    /// the current step leave it unchanged.
    pub fn advance(&mut self, input: WizardInput) -> WizardStep {
        self.step = match (self.step, input) {
            (WizardStep::Publish | WizardStep::Aborted(_), _) => self.step,
            (_, WizardInput::Cancel) => WizardStep::Aborted(AbortReason::Cancelled),

            (WizardStep::ConfirmReplace, WizardInput::Replace) => WizardStep::AwaitRole,
            (WizardStep::ConfirmReplace, WizardInput::TimedOut) => WizardStep::Aborted(AbortReason::TimedOut),

            (WizardStep::AwaitRole, WizardInput::RoleDesignated(role_id)) => {
                self.support_role_id = Some(role_id);
                self.first_category()
            }
            (WizardStep::AwaitRole, WizardInput::TimedOut) => WizardStep::Aborted(AbortReason::TimedOut),

            (WizardStep::AwaitCategoryChoice { index }, WizardInput::UseDefault | WizardInput::TimedOut) => {
                self.keep_default(index);
                self.after_category(index)
            }
            (WizardStep::AwaitCategoryChoice { index }, WizardInput::WriteCustom) => {
                WizardStep::AwaitCustomText { index }
            }

            (WizardStep::AwaitCustomText { index }, WizardInput::Text(text)) => {
                if text.trim().is_empty() {
                    self.keep_default(index);
                } else {
                    let categories = self.categories;
                    self.templates.push((&categories[index], text));
                }
                self.after_category(index)
            }
            (WizardStep::AwaitCustomText { index }, WizardInput::TimedOut) => {
                self.keep_default(index);
                self.after_category(index)
            }

            (WizardStep::AwaitLogChannel, WizardInput::ChannelDesignated(channel_id)) => {
                self.log_channel_id = Some(channel_id);
                WizardStep::Publish
            }
            (WizardStep::AwaitLogChannel, WizardInput::TimedOut) => WizardStep::Aborted(AbortReason::TimedOut),

            (step, _) => step,
        };
        self.step
    }

    /// The finished configuration, once the wizard reached `Publish`
    pub fn draft(&self) -> Option<PanelDraft> {
        if self.step != WizardStep::Publish {
            return None;
        }
        Some(PanelDraft {
            panel_id: self.panel_id.clone(),
            support_role_id: self.support_role_id?,
            templates: self.templates.clone(),
            log_channel_id: self.log_channel_id,
        })
    }

    fn keep_default(&mut self, index: usize) {
        let categories = self.categories;
        let category = &categories[index];
        self.templates
            .push((category, category.default_template.to_string()));
    }

    fn first_category(&self) -> WizardStep {
        if self.categories.is_empty() {
            self.after_categories()
        } else {
            WizardStep::AwaitCategoryChoice { index: 0 }
        }
    }

    fn after_category(&self, index: usize) -> WizardStep {
        if index + 1 < self.categories.len() {
            WizardStep::AwaitCategoryChoice { index: index + 1 }
        } else {
            self.after_categories()
        }
    }

    fn after_categories(&self) -> WizardStep {
        if self.needs_log_channel {
            WizardStep::AwaitLogChannel
        } else {
            WizardStep::Publish
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults_for_all(wizard: &mut SetupWizard) {
        for _ in 0..CategoryCatalog::new().all().len() {
            wizard.advance(WizardInput::UseDefault);
        }
    }

    #[test]
    fn test_fresh_panel_with_defaults() {
        let mut wizard = SetupWizard::new("100", 7, false, false);
        assert_eq!(wizard.step(), WizardStep::AwaitRole);

        assert_eq!(
            wizard.advance(WizardInput::RoleDesignated(55)),
            WizardStep::AwaitCategoryChoice { index: 0 }
        );
        assert_eq!(wizard.current_category().map(|c| c.id), Some("support"));
        defaults_for_all(&mut wizard);
        assert_eq!(wizard.step(), WizardStep::AwaitLogChannel);
        assert_eq!(wizard.advance(WizardInput::ChannelDesignated(9)), WizardStep::Publish);

        let draft = wizard.draft().unwrap();
        assert_eq!(draft.support_role_id, 55);
        assert_eq!(draft.log_channel_id, Some(9));
        let ids: Vec<_> = draft.templates.iter().map(|(c, _)| c.id).collect();
        assert_eq!(ids, vec!["support", "bug", "order", "other"]);
        assert!(draft
            .templates
            .iter()
            .all(|(c, t)| t == c.default_template));
    }

    #[test]
    fn test_log_channel_step_skipped_when_configured() {
        let mut wizard = SetupWizard::new("100", 7, false, true);
        wizard.advance(WizardInput::RoleDesignated(55));
        defaults_for_all(&mut wizard);
        assert_eq!(wizard.step(), WizardStep::Publish);
        assert_eq!(wizard.draft().unwrap().log_channel_id, None);
    }

    #[test]
    fn test_custom_text_and_its_fallbacks() {
        let mut wizard = SetupWizard::new("100", 7, false, true);
        wizard.advance(WizardInput::RoleDesignated(55));

        // support: custom text
        wizard.advance(WizardInput::WriteCustom);
        assert_eq!(wizard.step(), WizardStep::AwaitCustomText { index: 0 });
        wizard.advance(WizardInput::Text("Hi {user}, tell us more".into()));
        // bug: custom text times out
        wizard.advance(WizardInput::WriteCustom);
        assert_eq!(
            wizard.advance(WizardInput::TimedOut),
            WizardStep::AwaitCategoryChoice { index: 2 }
        );
        // order: blank text
        wizard.advance(WizardInput::WriteCustom);
        wizard.advance(WizardInput::Text("   ".into()));
        // other: the choice itself times out
        wizard.advance(WizardInput::TimedOut);

        let draft = wizard.draft().unwrap();
        assert_eq!(draft.templates[0].1, "Hi {user}, tell us more");
        for (category, template) in &draft.templates[1..] {
            assert_eq!(template, category.default_template);
        }
    }

    #[test]
    fn test_structural_steps_abort_on_timeout() {
        let mut wizard = SetupWizard::new("100", 7, false, false);
        assert_eq!(
            wizard.advance(WizardInput::TimedOut),
            WizardStep::Aborted(AbortReason::TimedOut)
        );
        assert!(wizard.draft().is_none());

        let mut wizard = SetupWizard::new("100", 7, false, false);
        wizard.advance(WizardInput::RoleDesignated(1));
        defaults_for_all(&mut wizard);
        assert_eq!(
            wizard.advance(WizardInput::TimedOut),
            WizardStep::Aborted(AbortReason::TimedOut)
        );
        assert!(wizard.is_finished());
    }

    #[test]
    fn test_existing_panel_requires_replace() {
        let mut wizard = SetupWizard::new("100", 7, true, true);
        assert_eq!(wizard.step(), WizardStep::ConfirmReplace);
        // A role mention is not an answer here
        assert_eq!(wizard.advance(WizardInput::RoleDesignated(1)), WizardStep::ConfirmReplace);
        assert_eq!(wizard.advance(WizardInput::Replace), WizardStep::AwaitRole);

        let mut cancelled = SetupWizard::new("100", 7, true, true);
        assert_eq!(
            cancelled.advance(WizardInput::Cancel),
            WizardStep::Aborted(AbortReason::Cancelled)
        );
        assert_eq!(cancelled.advance(WizardInput::Replace), WizardStep::Aborted(AbortReason::Cancelled));
    }
}
