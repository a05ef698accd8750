use anyhow::{Context, Result};
use std::collections::HashSet;
use std::env;

use requestbot_core::{ChatId, UserId};

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    /// Expected value of the `X-Telegram-Bot-Api-Secret-Token` header,
    /// as registered with `setWebhook`.
    pub telegram_webhook_secret: String,
    pub telegram_api_base: String,
    pub review_chat_id: ChatId,
    pub operator_user_id: UserId,
    /// Users allowed to resolve tickets. Empty means anyone in the review chat.
    pub reviewer_user_ids: HashSet<UserId>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .context("TELEGRAM_BOT_TOKEN environment variable is required")?;

        let telegram_webhook_secret = env::var("TELEGRAM_WEBHOOK_SECRET")
            .context("TELEGRAM_WEBHOOK_SECRET environment variable is required")?;

        let telegram_api_base = env::var("TELEGRAM_API_BASE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string());

        let review_chat_id = env::var("REVIEW_CHAT_ID")
            .context("REVIEW_CHAT_ID environment variable is required")?
            .trim()
            .parse::<i64>()
            .context("REVIEW_CHAT_ID must be a valid chat id")?;

        let operator_user_id = env::var("OPERATOR_USER_ID")
            .context("OPERATOR_USER_ID environment variable is required")?
            .trim()
            .parse::<i64>()
            .context("OPERATOR_USER_ID must be a valid user id")?;

        let reviewer_user_ids = parse_user_id_list(env::var("REVIEWER_USER_IDS").ok())
            .context("REVIEWER_USER_IDS must be a comma-separated list of user ids")?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        Ok(Config {
            telegram_bot_token,
            telegram_webhook_secret,
            telegram_api_base,
            review_chat_id: ChatId(review_chat_id),
            operator_user_id: UserId(operator_user_id),
            reviewer_user_ids,
            port,
        })
    }
}

/// Parse a comma-separated user id list.
///
/// A missing or blank value yields an empty set. Empty entries (such as a
/// trailing comma) are skipped; anything else that is not an integer is an
/// error rather than being silently dropped from the allow-list.
pub fn parse_user_id_list(value: Option<String>) -> Result<HashSet<UserId>> {
    let Some(value) = value else {
        return Ok(HashSet::new());
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<i64>()
                .map(UserId)
                .with_context(|| format!("invalid user id {:?}", entry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_id_list_none() {
        assert!(parse_user_id_list(None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_user_id_list_blank() {
        assert!(parse_user_id_list(Some("   ".to_string())).unwrap().is_empty());
    }

    #[test]
    fn test_parse_user_id_list_values() {
        let ids = parse_user_id_list(Some("12, 34,56,".to_string())).unwrap();
        assert_eq!(ids, HashSet::from([UserId(12), UserId(34), UserId(56)]));
    }

    #[test]
    fn test_parse_user_id_list_negative_ids() {
        let ids = parse_user_id_list(Some("-5".to_string())).unwrap();
        assert!(ids.contains(&UserId(-5)));
    }

    #[test]
    fn test_parse_user_id_list_rejects_garbage() {
        // A typo must not silently shrink the allow-list
        let err = parse_user_id_list(Some("12,alice".to_string())).unwrap_err();
        assert!(err.to_string().contains("alice"));
    }
}
