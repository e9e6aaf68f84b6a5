//! Ticket desk Discord gateway entry point
//!
//! Configuration can come from:
//! - config.yaml (or the file named by CONFIG_FILE)
//! - Environment variables

use anyhow::Result;
use dotenvy::dotenv;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::application::interaction::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ticketdesk::commands::{register_global_commands, register_guild_commands, replies_publicly};
use ticketdesk::discord::{self, SerenityPlatform};
use ticketdesk::{Config, InteractionRouter, TicketStore};

/// Handler for the bot's Discord events
struct Handler {
    router: InteractionRouter,
    guild_id: Option<u64>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if self.router.handle_message(discord::inbound_message(&msg)) {
            debug!("Message {} answered a pending conversation", msg.id);
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected and ready!", ready.user.name);
        info!("Connected to {} guilds", ready.guilds.len());

        // Log shard information
        if let Some(shard) = ready.shard {
            info!("Shard: {}/{}", shard[0] + 1, shard[1]);
        }

        // Register slash commands
        if let Some(guild_id) = self.guild_id {
            info!("Development mode: Registering commands for guild {guild_id}");
            if let Err(e) = register_guild_commands(&ctx.http, guild_id).await {
                error!("Failed to register guild slash commands: {e}");
            }
        } else {
            info!("Production mode: Registering commands globally");
            if let Err(e) = register_global_commands(&ctx.http).await {
                error!("Failed to register global slash commands: {e}");
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::ApplicationCommand(command) => {
                let ephemeral = !replies_publicly(&command.data.name);
                if let Err(e) = discord::defer_command(&ctx.http, &command, ephemeral).await {
                    error!("Failed to defer slash command '{}': {}", command.data.name, e);
                    return;
                }

                let reply = self
                    .router
                    .handle_command(discord::command_invocation(&command))
                    .await;

                if let Err(e) = discord::send_command_reply(&ctx.http, &command, &reply).await {
                    error!("Failed to reply to slash command '{}': {}", command.data.name, e);
                }
            }
            Interaction::MessageComponent(component) => {
                if let Err(e) = discord::acknowledge_component(&ctx.http, &component).await {
                    error!(
                        "Failed to acknowledge component interaction '{}': {}",
                        component.data.custom_id, e
                    );
                    return;
                }

                let Some(reply) = self
                    .router
                    .handle_component(discord::component_press(&component))
                    .await
                else {
                    return;
                };

                if let Err(e) = discord::send_component_reply(&ctx.http, &component, &reply).await {
                    error!(
                        "Failed to reply to component interaction '{}': {}",
                        component.data.custom_id, e
                    );
                }
            }
            Interaction::Ping(_) => {
                info!("Ping interaction received");
            }
            _ => {}
        }
    }
}

/// Run the bot with retry logic
async fn run_bot(config: &Config, router: InteractionRouter) -> Result<()> {
    let max_retries = 5;
    let mut retry_count = 0;

    loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown requested, not reconnecting");
            break;
        }

        info!("Starting bot (attempt {}/{})", retry_count + 1, max_retries);

        match run_bot_inner(config, router.clone()).await {
            Ok(()) => {
                info!("Bot exited normally");
                break;
            }
            Err(e) => {
                retry_count += 1;
                if retry_count >= max_retries {
                    error!("Bot failed after {} retries: {}", max_retries, e);
                    return Err(e);
                }

                let delay = Duration::from_secs(5 * retry_count as u64);
                warn!("Bot failed: {}. Retrying in {:?}...", e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Ok(())
}

/// Inner bot run function (single attempt)
async fn run_bot_inner(config: &Config, router: InteractionRouter) -> Result<()> {
    let handler = Handler {
        router,
        guild_id: config.guild_id(),
    };

    // Configure gateway intents
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Build Discord client
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    let shard_manager = client.shard_manager.clone();
    let shutdown_watch = tokio::spawn(async move {
        while !SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        shard_manager.lock().await.shutdown_all().await;
    });

    info!("Connecting to Discord gateway...");

    // Start the bot (blocks until disconnect)
    let result = client.start().await;
    shutdown_watch.abort();
    result.map_err(|e| {
        error!("Gateway connection failed: {e}");
        anyhow::anyhow!("Gateway connection failed: {}", e)
    })?;

    Ok(())
}

/// Graceful shutdown flag
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Auto-load configuration (YAML file or env vars)
    let config = Config::auto_load()?;

    // Set up logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.log_level),
    )
    .init();

    info!("Starting ticket desk...");

    // The bot's own user must be granted access to the private channels it creates
    let http = Arc::new(Http::new(&config.discord_token));
    let bot_user = http
        .get_current_user()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to fetch the bot user: {}", e))?;
    info!("Bot ID: {}", bot_user.id);

    let store = TicketStore::open(&config.data_path);
    let platform = Arc::new(SerenityPlatform::new(http, bot_user.id.0));
    let router = InteractionRouter::new(platform, store.clone(), config.timeouts.clone());

    let sweeper = router.waiter().spawn_sweeper(config.waiter_sweep_interval());

    let bot_config = config.clone();
    let bot_handle = tokio::spawn(async move { run_bot(&bot_config, router).await });

    // Set up Ctrl+C handler for graceful shutdown
    let shutdown_handle = tokio::spawn(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
                SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });

    let results = join_all(vec![bot_handle]).await;

    shutdown_handle.abort();
    sweeper.abort();

    if let Err(e) = store.flush().await {
        error!("Failed to flush ticket store on shutdown: {e}");
    }

    // Report results
    let mut all_ok = true;
    for result in results {
        match result {
            Ok(Ok(())) => info!("Bot exited successfully"),
            Ok(Err(e)) => {
                error!("Bot failed: {}", e);
                all_ok = false;
            }
            Err(e) => {
                error!("Bot task panicked: {}", e);
                all_ok = false;
            }
        }
    }

    if all_ok {
        info!("Ticket desk shut down successfully");
        Ok(())
    } else {
        Err(anyhow::anyhow!("Ticket desk failed"))
    }
}
