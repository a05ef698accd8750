use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use requestbot_core::{token, Activation, ChatId, SurfaceRef, UserId, SUBMITTED_REPLY};

use crate::command::{self, BotCommand, ParseResult};
use crate::telegram::CALLBACK_DATA_LIMIT;
use crate::AppState;

pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

pub const USAGE_TEXT: &str = "👋 Send me a request and a reviewer will look into it.\n\n\
    Commands:\n\
    /request <text> : submit a request, e.g. /request Movie X 2020\n\
    /help : show this message\n\n\
    You will get a message here once a reviewer has acted on your request.";

const MISSING_TEXT_REPLY: &str =
    "✏️ Please tell me what you are requesting, e.g. /request Movie X 2020";

const UNSUPPORTED_CALLBACK_REPLY: &str = "This button is no longer supported.";

#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

#[derive(Debug, Deserialize, Clone)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Chat {
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// Absent when the originating message is too old or was sent inline.
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

/// Compare digests so the comparison time does not depend on the secret.
fn secret_matches(expected: &str, provided: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(provided.as_bytes())
}

async fn verify_secret_token(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let authorized = request
        .headers()
        .get(SECRET_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|provided| secret_matches(&state.webhook_secret, provided));

    if !authorized {
        warn!("Rejected webhook call with missing or invalid secret token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    request
        .extensions_mut()
        .insert(CorrelationId(Uuid::new_v4().to_string()));

    Ok(next.run(request).await)
}

pub async fn telegram_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let update: Update = serde_json::from_slice(&bytes).map_err(|e| {
        warn!("Could not parse update: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let span = info_span!(
        "update",
        correlation_id = %correlation_id,
        update_id = update.update_id
    );
    tokio::spawn(handle_update(state, update).instrument(span));

    Ok(Json(WebhookResponse {
        message: "Update accepted".to_string(),
    }))
}

pub async fn handle_update(state: Arc<AppState>, update: Update) {
    if let Some(query) = update.callback_query {
        handle_callback(&state, query).await;
    } else if let Some(message) = update.message {
        handle_message(&state, message).await;
    } else {
        info!("Ignoring update {} of an unhandled kind", update.update_id);
    }
}

async fn handle_message(state: &AppState, message: Message) {
    let Some(text) = message.text.as_deref() else {
        return;
    };
    let chat = ChatId(message.chat.id);

    match command::parse_message(text, &state.bot_username) {
        ParseResult::NoCommand | ParseResult::OtherBot => {}
        ParseResult::UnrecognizedCommand {
            attempted,
            addressed,
        } => {
            // In groups a bare /command may be meant for another bot
            if addressed || message.chat.is_private() {
                info!("Unrecognized command '{}' in chat {}", attempted, chat);
                reply(state, chat, &unknown_command_reply(&attempted)).await;
            }
        }
        ParseResult::Command(BotCommand::Start | BotCommand::Help) => {
            reply(state, chat, USAGE_TEXT).await;
        }
        ParseResult::Command(BotCommand::Request { text }) => {
            let Some(from) = message.from.as_ref().filter(|user| !user.is_bot) else {
                info!("Ignoring request without a human sender in chat {}", chat);
                return;
            };
            submit_request(state, chat, UserId(from.id), &text).await;
        }
    }
}

async fn submit_request(state: &AppState, chat: ChatId, requester: UserId, text: &str) {
    if text.is_empty() {
        reply(state, chat, MISSING_TEXT_REPLY).await;
        return;
    }

    if token::encoded_len(requester, text) > CALLBACK_DATA_LIMIT {
        info!("Request from {} is too long to encode", requester);
        reply(state, chat, &too_long_reply(max_request_len(requester))).await;
        return;
    }

    let reply_text = match state.engine.submit_request(requester, text).await {
        Ok(ticket) => {
            info!(
                "Request from {} posted as {}",
                requester,
                ticket.surface_ref()
            );
            SUBMITTED_REPLY
        }
        Err(e) => {
            warn!("Request from {} was not posted: {}", requester, e);
            e.requester_reply()
        }
    };

    reply(state, chat, reply_text).await;
}

async fn handle_callback(state: &AppState, query: CallbackQuery) {
    let Some(message) = query.message else {
        info!("Callback {} has no originating message", query.id);
        if let Err(e) = state
            .transport
            .acknowledge(&query.id, Some(UNSUPPORTED_CALLBACK_REPLY), true)
            .await
        {
            warn!("Failed to acknowledge callback {}: {}", query.id, e);
        }
        return;
    };

    let activation = Activation {
        activation_id: query.id,
        surface: SurfaceRef::new(message.chat.id, message.message_id),
        activator_id: UserId(query.from.id),
        token: query.data.unwrap_or_default(),
    };

    // Rejections are acknowledged to the reviewer by the engine
    match state.engine.on_activation(&activation).await {
        Ok(outcome) => info!(
            "Ticket {} resolved as {} by {}",
            activation.surface, outcome.status, activation.activator_id
        ),
        Err(e) => info!(
            "Activation on {} by {} not applied: {}",
            activation.surface, activation.activator_id, e
        ),
    }
}

async fn reply(state: &AppState, chat: ChatId, text: &str) {
    if let Err(e) = state.transport.post_message(chat, text, &[]).await {
        warn!("Failed to reply in chat {}: {}", chat, e);
    }
}

fn unknown_command_reply(attempted: &str) -> String {
    if attempted.is_empty() {
        "❓ Unknown command. Send /help to see what I can do.".to_string()
    } else {
        format!(
            "❓ Unknown command /{}. Send /help to see what I can do.",
            attempted
        )
    }
}

/// Longest plain-text request that still fits in a button's callback data.
fn max_request_len(requester: UserId) -> usize {
    CALLBACK_DATA_LIMIT.saturating_sub(token::encoded_len(requester, ""))
}

fn too_long_reply(max: usize) -> String {
    format!(
        "⚠️ That request is too long. Please keep it to {} characters or fewer \
        (symbols and non-Latin letters count extra).",
        max
    )
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(telegram_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_secret_token,
        ))
}
