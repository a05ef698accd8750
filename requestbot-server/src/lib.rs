pub mod command;
pub mod config;
pub mod telegram;
pub mod webhook;

use std::sync::Arc;

use requestbot_core::{ChatTransport, TicketEngine};

pub use telegram::TelegramClient;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(8).collect()
}

pub fn get_bot_version() -> String {
    // Hash injected by the packaging build wins over the one `built` found
    if let Some(git_hash) = option_env!("BOT_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        short_hash(git_hash)
    } else {
        "unknown".to_string()
    }
}

pub struct AppState {
    pub engine: Arc<TicketEngine>,
    /// Used for replies to requesters and for callbacks the engine never sees.
    pub transport: Arc<dyn ChatTransport>,
    pub webhook_secret: String,
    /// Commands addressed to `@<other bot>` are ignored.
    pub bot_username: String,
}
