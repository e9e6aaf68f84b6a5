// Core layer - shared types and configuration
pub mod config;
pub mod error;
pub mod platform;

// Ticket domain
pub mod action;
pub mod catalog;
pub mod stats;
pub mod store;
pub mod registry;
pub mod transcript;

// Conversations and workflows
pub mod waiter;
pub mod wizard;
pub mod setup;
pub mod lifecycle;
pub mod admin;

// Application layer
pub mod commands;
pub mod discord;
pub mod router;

pub use config::Config;
pub use error::{PlatformError, StoreError, TicketError};
pub use platform::ChatPlatform;
pub use router::{CommandInvocation, InteractionRouter};
pub use store::TicketStore;
