use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::http;
use reqwest::{Client, Request, Response};
use reqwest_middleware::{ClientWithMiddleware, Middleware, Next};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use requestbot_core::{
    ChatId, ChatTransport, Control, MemberRole, MessageId, SurfaceRef, TransportError, UserId,
};

/// Maximum size of an inline button's callback data, in bytes.
pub const CALLBACK_DATA_LIMIT: usize = 64;

/// Controls per keyboard row.
const BUTTONS_PER_ROW: usize = 2;

#[derive(Clone)]
pub struct TelegramClient {
    client: ClientWithMiddleware,
    api_base: String,
    bot_token: String,
}

/// The bot's own account, from `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct EditMessageTextRequest<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    reply_markup: InlineKeyboardMarkup,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryRequest<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    show_alert: bool,
}

#[derive(Debug, Serialize)]
struct GetChatMemberRequest {
    chat_id: i64,
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct EmptyRequest {}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: SentMessageChat,
}

#[derive(Debug, Deserialize)]
struct SentMessageChat {
    id: i64,
}

/// `ChatMember` as returned by `getChatMember`, discriminated by `status`.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ChatMember {
    Creator {},
    Administrator {
        can_post_messages: Option<bool>,
    },
    Member {},
    Restricted {},
    Left {},
    Kicked {},
}

impl From<ChatMember> for MemberRole {
    fn from(member: ChatMember) -> Self {
        match member {
            ChatMember::Creator {} => MemberRole::Creator,
            ChatMember::Administrator { can_post_messages } => {
                MemberRole::Administrator { can_post_messages }
            }
            ChatMember::Member {} => MemberRole::Member,
            ChatMember::Restricted {} => MemberRole::Restricted,
            ChatMember::Left {} => MemberRole::Left,
            ChatMember::Kicked {} => MemberRole::Banned,
        }
    }
}

/// Lay controls out as an inline keyboard, two buttons per row.
pub fn inline_keyboard(controls: &[Control]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: controls
            .chunks(BUTTONS_PER_ROW)
            .map(|row| {
                row.iter()
                    .map(|control| InlineKeyboardButton {
                        text: control.label.clone(),
                        callback_data: control.token.clone(),
                    })
                    .collect()
            })
            .collect(),
    }
}

/// Decode the Bot API response envelope.
///
/// The API answers errors with the same envelope and a non-2xx status, so
/// the HTTP status is only used when the envelope carries no error code.
fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, TransportError> {
    let envelope: ApiResponse<T> = serde_json::from_str(body)
        .map_err(|e| TransportError::Decode(format!("HTTP {}: {}", status, e)))?;

    if !envelope.ok {
        return Err(TransportError::Rejected {
            code: envelope.error_code.unwrap_or(i64::from(status)),
            description: envelope
                .description
                .unwrap_or_else(|| "no description".to_string()),
        });
    }

    envelope
        .result
        .ok_or_else(|| TransportError::Decode(format!("HTTP {}: ok without result", status)))
}

/// Name of the Bot API method from a request path (`/bot<token>/<method>`).
fn api_method(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl TelegramClient {
    pub fn new(api_base: impl Into<String>, bot_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: create_telegram_client()?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    /// Scrub the bot token from an error description.
    fn redact(&self, text: &str) -> String {
        if self.bot_token.is_empty() {
            return text.to_string();
        }
        text.replace(&self.bot_token, "[REDACTED]")
    }

    fn request_error(&self, e: reqwest_middleware::Error) -> TransportError {
        let description = match e {
            reqwest_middleware::Error::Reqwest(e) => e.without_url().to_string(),
            other => other.to_string(),
        };
        TransportError::Request(self.redact(&description))
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);
        let payload =
            serde_json::to_string(body).map_err(|e| TransportError::Decode(e.to_string()))?;

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            TransportError::Request(self.redact(&e.without_url().to_string()))
        })?;

        let result = parse_envelope(status, &text);
        if let Err(e) = &result {
            error!("Telegram API error in {}: {}", method, e);
        }
        result
    }

    pub async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        self.call("getMe", &EmptyRequest {}).await
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn post_message(
        &self,
        chat: ChatId,
        text: &str,
        controls: &[Control],
    ) -> Result<SurfaceRef, TransportError> {
        let request = SendMessageRequest {
            chat_id: chat.0,
            text,
            reply_markup: (!controls.is_empty()).then(|| inline_keyboard(controls)),
        };

        let sent: SentMessage = self.call("sendMessage", &request).await?;
        info!("Sent message {} to chat {}", sent.message_id, sent.chat.id);
        Ok(SurfaceRef {
            chat_id: ChatId(sent.chat.id),
            message_id: MessageId(sent.message_id),
        })
    }

    async fn edit_message(
        &self,
        surface: &SurfaceRef,
        text: &str,
        controls: Option<&[Control]>,
    ) -> Result<(), TransportError> {
        // An explicitly empty keyboard removes the buttons
        let request = EditMessageTextRequest {
            chat_id: surface.chat_id.0,
            message_id: surface.message_id.0,
            text,
            reply_markup: inline_keyboard(controls.unwrap_or_default()),
        };

        // Returns the edited Message, or `true` for inline messages
        let _: serde_json::Value = self.call("editMessageText", &request).await?;
        Ok(())
    }

    async fn send_direct(&self, user: UserId, text: &str) -> Result<(), TransportError> {
        // A private chat's id is the user's id
        let request = SendMessageRequest {
            chat_id: user.0,
            text,
            reply_markup: None,
        };
        let _: SentMessage = self.call("sendMessage", &request).await?;
        Ok(())
    }

    async fn get_membership(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<MemberRole, TransportError> {
        let request = GetChatMemberRequest {
            chat_id: chat.0,
            user_id: user.0,
        };
        let member: ChatMember = self.call("getChatMember", &request).await?;
        Ok(member.into())
    }

    async fn acknowledge(
        &self,
        activation_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), TransportError> {
        let request = AnswerCallbackQueryRequest {
            callback_query_id: activation_id,
            text,
            show_alert: alert,
        };
        let _: bool = self.call("answerCallbackQuery", &request).await?;
        Ok(())
    }
}

/// Traces every Bot API call. Only the method name is logged: the URL
/// carries the bot token.
pub struct ApiLogMiddleware;

#[async_trait]
impl Middleware for ApiLogMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = api_method(req.url().path()).to_string();
        let started = Instant::now();

        let result = next.run(req, extensions).await;

        let elapsed_ms = started.elapsed().as_millis();
        match &result {
            Ok(response) => info!(
                "Telegram {} -> {} in {}ms",
                method,
                response.status(),
                elapsed_ms
            ),
            Err(_) => warn!("Telegram {} failed after {}ms", method, elapsed_ms),
        }
        result
    }
}

pub fn create_telegram_client() -> Result<ClientWithMiddleware> {
    use reqwest_middleware::ClientBuilder;

    let client = Client::builder()
        .user_agent(concat!("requestbot/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;

    Ok(ClientBuilder::new(client).with(ApiLogMiddleware).build())
}
