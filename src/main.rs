use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use serde::Deserialize;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageEntity, MessageEntityKind, MessageId};

mod broadcast;
mod callback_handlers;
mod conversation;
mod display;
mod helpers;
mod menu;
mod message_handlers;
mod model;
mod store;
mod transport;

#[cfg(test)]
mod tests;

use callback_handlers::*;
use conversation::*;
use helpers::*;
use menu::*;
use message_handlers::*;
use model::*;
use model::User;
use store::{StateStore, Store};
use transport::*;

const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Clone)]
struct Config {
    token: String,
    admin_id: i64,
    store: StoreConfig,
    features: Features,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreConfig {
    Memory,
    Sqlite { path: PathBuf },
    D1(D1Config),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct D1Config {
    account_id: String,
    database_id: String,
    api_token: String,
    api_base: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
struct Features {
    services: bool,
    submenus: bool,
    broadcast: bool,
    grouped_social_buttons: bool,
    broadcast_delay_ms: u64,
    seed_defaults: bool,
}

impl Default for Features {
    fn default() -> Self {
        Features {
            services: true,
            submenus: true,
            broadcast: true,
            grouped_social_buttons: false,
            broadcast_delay_ms: 50,
            seed_defaults: true,
        }
    }
}

impl Features {
    fn submenus_enabled(&self) -> bool {
        self.services && self.submenus
    }

    fn broadcast_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_delay_ms)
    }
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    config: PathBuf,
}

struct AppState {
    config: Config,
    store: Arc<dyn Store>,
    states: Arc<dyn StateStore>,
    transport: Arc<dyn Transport>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    let stores = store::open(&config).await.context("open store")?;

    let bot = Bot::new(config.token.clone());
    let state = Arc::new(AppState {
        transport: Arc::new(TelegramTransport::new(bot.clone())),
        store: stores.content,
        states: stores.states,
        config,
    });
    info!(
        "menubot starting (primary admin {})",
        state.config.admin_id
    );

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
