//! Slash command definitions and registration

pub mod slash;

use log::info;
use serenity::builder::CreateApplicationCommand;
use serenity::http::Http;
use serenity::model::application::command::Command;
use serenity::model::id::GuildId;

/// Command names as registered with Discord
pub mod names {
    pub const TICKET_SETUP: &str = "ticket_setup";
    pub const TICKET_LIST: &str = "ticket_list";
    pub const TICKET_EDIT: &str = "ticket_edit";
    pub const TICKET_DELETE: &str = "ticket_delete";
    pub const TICKET_LOGS: &str = "ticket_logs";
    pub const TICKET_STATS: &str = "ticket_stats";
    pub const TICKETS_PRIORITY: &str = "tickets_priority";
    pub const SET_PRIORITY: &str = "set_priority";
    pub const CLOSE: &str = "close";
}

/// Commands whose reply is posted in the channel rather than to the invoker
pub fn replies_publicly(name: &str) -> bool {
    name == names::SET_PRIORITY
}

/// Every slash command the ticket desk answers
pub fn create_commands() -> Vec<CreateApplicationCommand> {
    let mut commands = slash::admin::create_commands();
    commands.extend(slash::tickets::create_commands());
    commands
}

/// Register commands on a single guild (instant, used in dev mode)
pub async fn register_guild_commands(http: &Http, guild_id: u64) -> serenity::Result<usize> {
    let registered = GuildId(guild_id)
        .set_application_commands(http, |cmds| {
            for command in create_commands() {
                cmds.add_application_command(command);
            }
            cmds
        })
        .await?;
    info!("Registered {} commands on guild {}", registered.len(), guild_id);
    Ok(registered.len())
}

/// Register commands globally (may take up to an hour to propagate)
pub async fn register_global_commands(http: &Http) -> serenity::Result<usize> {
    let registered = Command::set_global_application_commands(http, |cmds| {
        for command in create_commands() {
            cmds.add_application_command(command);
        }
        cmds
    })
    .await?;
    info!("Registered {} global commands", registered.len());
    Ok(registered.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_command_is_defined_once() {
        let commands = create_commands();
        let mut defined: Vec<String> = commands
            .iter()
            .filter_map(|c| c.0.get("name").and_then(|v| v.as_str()).map(str::to_string))
            .collect();
        defined.sort();

        let mut expected = vec![
            names::TICKET_SETUP,
            names::TICKET_LIST,
            names::TICKET_EDIT,
            names::TICKET_DELETE,
            names::TICKET_LOGS,
            names::TICKET_STATS,
            names::TICKETS_PRIORITY,
            names::SET_PRIORITY,
            names::CLOSE,
        ];
        expected.sort();
        assert_eq!(defined, expected);
    }

    #[test]
    fn test_only_priority_replies_publicly() {
        assert!(replies_publicly(names::SET_PRIORITY));
        assert!(!replies_publicly(names::CLOSE));
        assert!(!replies_publicly(names::TICKET_LIST));
    }
}
