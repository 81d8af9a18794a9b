pub mod peek;
pub mod sync;

use clap::{Parser, Subcommand};

use crate::{
    api::home_assistant,
    cli::{peek::PeekArgs, sync::SyncArgs},
    prelude::*,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: synchronize the configured meters into the statistics store.
    #[clap(name = "sync")]
    Sync(Box<SyncArgs>),

    /// Inspection tools: query the gateway and the store without importing anything.
    #[clap(name = "peek")]
    Peek(Box<PeekArgs>),
}

#[derive(Parser)]
pub struct HomeAssistantArgs {
    /// WebSocket API endpoint. The default works inside an add-on container.
    #[clap(
        long = "home-assistant-url",
        env = "HOME_ASSISTANT_WEBSOCKET_URL",
        default_value = home_assistant::DEFAULT_URL
    )]
    pub url: String,

    /// Supervisor token, or a long-lived access token for a standalone install.
    #[clap(long = "home-assistant-token", env = "SUPERVISOR_TOKEN", hide_env_values = true)]
    pub token: String,
}

impl HomeAssistantArgs {
    pub async fn connect(&self) -> Result<home_assistant::Client> {
        home_assistant::Client::connect(&self.url, &self.token).await
    }
}
