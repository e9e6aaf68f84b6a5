//! Ticket channel slash commands: /close, /set_priority

use crate::commands::names;
use crate::catalog::Priority;
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;
use serenity::model::permissions::Permissions;

/// Creates ticket channel commands
pub fn create_commands() -> Vec<CreateApplicationCommand> {
    vec![create_close_command(), create_set_priority_command()]
}

/// Creates the close command - asks for confirmation before closing
fn create_close_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name(names::CLOSE)
        .description("Close the current ticket")
        .dm_permission(false)
        .to_owned()
}

/// Creates the set_priority command (staff)
fn create_set_priority_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name(names::SET_PRIORITY)
        .description("Set the priority of the current ticket")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .dm_permission(false)
        .create_option(|option| {
            option
                .name("priority")
                .description("The new priority")
                .kind(CommandOptionType::String)
                .required(true);
            for priority in Priority::ALL {
                option.add_string_choice(priority.label(), priority.label());
            }
            option
        })
        .to_owned()
}
