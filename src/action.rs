//! Action tokens carried in the `custom_id` of interactive controls.
//!
//! Every control the bot emits encodes one [`ActionToken`], and the router
//! decodes presses back into the same type. Wire format:
//! `action:param1:param2:...`.

use std::fmt;

const DELIMITER: char = ':';

/// A decoded control press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionToken {
    CreateTicket { panel_id: String, category_id: String },
    CloseTicket { ticket_id: u64 },
    ConfirmClose { ticket_id: u64 },
    CancelClose { ticket_id: u64 },
    ReplaceConfig { panel_id: String },
    CancelConfig { panel_id: String },
    WizardDefault { panel_id: String, category_id: String },
    WizardCustom { panel_id: String, category_id: String },
    EditRole { panel_id: String },
    EditCategory { panel_id: String, category_id: String },
    EditCategoryGroup { panel_id: String, category_id: String },
    EditCategoryMessage { panel_id: String, category_id: String },
    UseDefaultMessage { panel_id: String, category_id: String },
    CustomMessage { panel_id: String, category_id: String },
    EditLogs,
    ConfirmDelete { panel_id: String },
    CancelDelete { panel_id: String },
}

impl ActionToken {
    /// Action name, the first segment of the wire form
    pub fn action(&self) -> &'static str {
        match self {
            ActionToken::CreateTicket { .. } => "create_ticket",
            ActionToken::CloseTicket { .. } => "close_ticket",
            ActionToken::ConfirmClose { .. } => "confirm_close",
            ActionToken::CancelClose { .. } => "cancel_close",
            ActionToken::ReplaceConfig { .. } => "replace_config",
            ActionToken::CancelConfig { .. } => "cancel_config",
            ActionToken::WizardDefault { .. } => "wizard_default",
            ActionToken::WizardCustom { .. } => "wizard_custom",
            ActionToken::EditRole { .. } => "edit_role",
            ActionToken::EditCategory { .. } => "edit_category",
            ActionToken::EditCategoryGroup { .. } => "edit_cat_group",
            ActionToken::EditCategoryMessage { .. } => "edit_cat_message",
            ActionToken::UseDefaultMessage { .. } => "use_default_message",
            ActionToken::CustomMessage { .. } => "custom_message",
            ActionToken::EditLogs => "edit_logs",
            ActionToken::ConfirmDelete { .. } => "confirm_delete",
            ActionToken::CancelDelete { .. } => "cancel_delete",
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse a `custom_id`. Unknown actions, a wrong parameter count, empty
    /// parameters or a non-numeric ticket id all yield `None`.
    pub fn decode(raw: &str) -> Option<ActionToken> {
        let mut parts = raw.split(DELIMITER);
        let action = parts.next()?;
        let params: Vec<&str> = parts.collect();
        if params.iter().any(|p| p.is_empty()) {
            return None;
        }

        let token = match (action, params.as_slice()) {
            ("create_ticket", [panel, category]) => ActionToken::CreateTicket {
                panel_id: panel.to_string(),
                category_id: category.to_string(),
            },
            ("close_ticket", [ticket]) => ActionToken::CloseTicket {
                ticket_id: ticket.parse().ok()?,
            },
            ("confirm_close", [ticket]) => ActionToken::ConfirmClose {
                ticket_id: ticket.parse().ok()?,
            },
            ("cancel_close", [ticket]) => ActionToken::CancelClose {
                ticket_id: ticket.parse().ok()?,
            },
            ("replace_config", [panel]) => ActionToken::ReplaceConfig {
                panel_id: panel.to_string(),
            },
            ("cancel_config", [panel]) => ActionToken::CancelConfig {
                panel_id: panel.to_string(),
            },
            ("wizard_default", [panel, category]) => ActionToken::WizardDefault {
                panel_id: panel.to_string(),
                category_id: category.to_string(),
            },
            ("wizard_custom", [panel, category]) => ActionToken::WizardCustom {
                panel_id: panel.to_string(),
                category_id: category.to_string(),
            },
            ("edit_role", [panel]) => ActionToken::EditRole {
                panel_id: panel.to_string(),
            },
            ("edit_category", [panel, category]) => ActionToken::EditCategory {
                panel_id: panel.to_string(),
                category_id: category.to_string(),
            },
            ("edit_cat_group", [panel, category]) => ActionToken::EditCategoryGroup {
                panel_id: panel.to_string(),
                category_id: category.to_string(),
            },
            ("edit_cat_message", [panel, category]) => ActionToken::EditCategoryMessage {
                panel_id: panel.to_string(),
                category_id: category.to_string(),
            },
            ("use_default_message", [panel, category]) => ActionToken::UseDefaultMessage {
                panel_id: panel.to_string(),
                category_id: category.to_string(),
            },
            ("custom_message", [panel, category]) => ActionToken::CustomMessage {
                panel_id: panel.to_string(),
                category_id: category.to_string(),
            },
            ("edit_logs", []) => ActionToken::EditLogs,
            ("confirm_delete", [panel]) => ActionToken::ConfirmDelete {
                panel_id: panel.to_string(),
            },
            ("cancel_delete", [panel]) => ActionToken::CancelDelete {
                panel_id: panel.to_string(),
            },
            _ => return None,
        };
        Some(token)
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())?;
        match self {
            ActionToken::CloseTicket { ticket_id }
            | ActionToken::ConfirmClose { ticket_id }
            | ActionToken::CancelClose { ticket_id } => write!(f, "{DELIMITER}{ticket_id}"),
            ActionToken::ReplaceConfig { panel_id }
            | ActionToken::CancelConfig { panel_id }
            | ActionToken::EditRole { panel_id }
            | ActionToken::ConfirmDelete { panel_id }
            | ActionToken::CancelDelete { panel_id } => write!(f, "{DELIMITER}{panel_id}"),
            ActionToken::CreateTicket { panel_id, category_id }
            | ActionToken::WizardDefault { panel_id, category_id }
            | ActionToken::WizardCustom { panel_id, category_id }
            | ActionToken::EditCategory { panel_id, category_id }
            | ActionToken::EditCategoryGroup { panel_id, category_id }
            | ActionToken::EditCategoryMessage { panel_id, category_id }
            | ActionToken::UseDefaultMessage { panel_id, category_id }
            | ActionToken::CustomMessage { panel_id, category_id } => {
                write!(f, "{DELIMITER}{panel_id}{DELIMITER}{category_id}")
            }
            ActionToken::EditLogs => Ok(()),
        }
    }
}
