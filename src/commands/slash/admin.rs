//! Admin slash commands: /ticket_setup, /ticket_list, /ticket_edit, /ticket_delete, /ticket_logs, /ticket_stats, /tickets_priority

use crate::commands::names;
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;
use serenity::model::channel::ChannelType;
use serenity::model::permissions::Permissions;

/// Creates admin commands
pub fn create_commands() -> Vec<CreateApplicationCommand> {
    vec![
        create_setup_command(),
        create_list_command(),
        create_edit_command(),
        create_delete_command(),
        create_logs_command(),
        create_stats_command(),
        create_tickets_priority_command(),
    ]
}

/// Creates the ticket_setup command (admin) - starts the setup wizard
fn create_setup_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name(names::TICKET_SETUP)
        .description("Configure the ticket panel for a channel (Admin)")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .dm_permission(false)
        .create_option(|option| {
            option
                .name("channel")
                .description("Where to publish the panel (defaults to current channel)")
                .kind(CommandOptionType::Channel)
                .channel_types(&[ChannelType::Text])
                .required(false)
        })
        .to_owned()
}

/// Creates the ticket_list command (admin)
fn create_list_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name(names::TICKET_LIST)
        .description("List configured ticket panels (Admin)")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .dm_permission(false)
        .to_owned()
}

/// Creates the ticket_edit command (admin)
fn create_edit_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name(names::TICKET_EDIT)
        .description("Edit a ticket panel's role, groups or welcome messages (Admin)")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .dm_permission(false)
        .create_option(panel_channel_option)
        .to_owned()
}

/// Creates the ticket_delete command (admin)
fn create_delete_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name(names::TICKET_DELETE)
        .description("Delete a ticket panel configuration (Admin)")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .dm_permission(false)
        .create_option(panel_channel_option)
        .to_owned()
}

/// Creates the ticket_logs command (admin) - shows or sets the transcript channel
fn create_logs_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name(names::TICKET_LOGS)
        .description("Show or set the channel receiving ticket transcripts (Admin)")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .dm_permission(false)
        .create_option(|option| {
            option
                .name("channel")
                .description("New transcript channel (omit to view the current one)")
                .kind(CommandOptionType::Channel)
                .channel_types(&[ChannelType::Text])
                .required(false)
        })
        .to_owned()
}

/// Creates the ticket_stats command (admin)
fn create_stats_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name(names::TICKET_STATS)
        .description("Show ticket statistics (Admin)")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .dm_permission(false)
        .to_owned()
}

/// Creates the tickets_priority command (admin) - open tickets grouped by priority
fn create_tickets_priority_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name(names::TICKETS_PRIORITY)
        .description("List open tickets by priority (Admin)")
        .default_member_permissions(Permissions::MANAGE_CHANNELS)
        .dm_permission(false)
        .to_owned()
}

fn panel_channel_option(
    option: &mut serenity::builder::CreateApplicationCommandOption,
) -> &mut serenity::builder::CreateApplicationCommandOption {
    option
        .name("channel")
        .description("Channel holding the panel (defaults to current channel)")
        .kind(CommandOptionType::Channel)
        .channel_types(&[ChannelType::Text])
        .required(false)
}
