use anyhow::{Context, Result};
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use requestbot_core::{EngineConfig, TicketEngine, UserId};
use requestbot_server::config::Config;
use requestbot_server::webhook::webhook_router;
use requestbot_server::{AppState, TelegramClient};

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "requestbot"
    })))
}

async fn help_handler() -> Json<serde_json::Value> {
    let version = requestbot_server::get_bot_version();
    Json(json!({
        "service": "requestbot",
        "version": version,
        "description": "Telegram bot that turns user requests into tickets reviewed in a group chat",
        "endpoints": [
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint",
                "authentication": "None",
                "response_format": "application/json"
            },
            {
                "path": "/webhook",
                "method": "POST",
                "description": "Telegram webhook receiver for bot updates",
                "authentication": "Webhook secret (X-Telegram-Bot-Api-Secret-Token)",
                "response_format": "application/json"
            },
            {
                "path": "/help",
                "method": "GET",
                "description": "API documentation and service information",
                "authentication": "None",
                "response_format": "application/json"
            }
        ],
        "commands": [
            "/request <text>: submit a request for review",
            "/start, /help: usage"
        ],
        "configuration": {
            "required_env_vars": [
                "TELEGRAM_BOT_TOKEN",
                "TELEGRAM_WEBHOOK_SECRET",
                "REVIEW_CHAT_ID",
                "OPERATOR_USER_ID"
            ],
            "optional_env_vars": [
                "REVIEWER_USER_IDS (default: anyone in the review chat)",
                "TELEGRAM_API_BASE (default: https://api.telegram.org)",
                "PORT (default: 3000)"
            ]
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!(
        "Starting request bot (version {})",
        requestbot_server::get_bot_version()
    );

    let config = Config::from_env().context("Failed to load configuration")?;

    let telegram = Arc::new(TelegramClient::new(
        config.telegram_api_base.clone(),
        config.telegram_bot_token.clone(),
    )?);

    let me = telegram
        .get_me()
        .await
        .context("Failed to fetch the bot's identity with getMe")?;
    let bot_username = me.username.unwrap_or_default();
    info!("Running as @{} ({})", bot_username, me.id);

    if config.reviewer_user_ids.is_empty() {
        info!("No reviewer allow-list; anyone in the review chat may resolve tickets");
    } else {
        info!(
            "{} reviewer(s) allowed to resolve tickets",
            config.reviewer_user_ids.len()
        );
    }

    let engine = TicketEngine::new(
        EngineConfig {
            review_chat: config.review_chat_id,
            operator_id: config.operator_user_id,
            bot_id: UserId(me.id),
            reviewers: config.reviewer_user_ids.clone(),
        },
        telegram.clone(),
    );

    let app_state = Arc::new(AppState {
        engine: Arc::new(engine),
        transport: telegram,
        webhook_secret: config.telegram_webhook_secret,
        bot_username,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/help", get(help_handler))
        .merge(webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
