//! Ticket token codec.
//!
//! A token is the payload of one control on a review message:
//!
//! ```text
//! t1:upl|12345|Movie X 2020
//! ^^ ^^^ ^^^^^ ^^^^^^^^^^^^
//! |  |   |     request text, with '%' and '|' percent-escaped
//! |  |   requester id
//! |  action code
//! version
//! ```
//!
//! Escaping guarantees the text never contains the delimiter, so a token
//! produced by [`encode`] always splits into exactly three fields.

use crate::ticket::{TicketAction, UserId};

/// Field delimiter.
pub const TOKEN_DELIMITER: char = '|';

const TOKEN_VERSION: &str = "t1";

/// A decoded token: the transition to apply and the ticket it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketToken {
    pub action: TicketAction,
    pub requester_id: UserId,
    pub request_text: String,
}

/// Why a token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedToken {
    #[error("expected 3 fields, found {found}")]
    FieldCount { found: usize },
    #[error("unsupported token version in {field:?}")]
    UnsupportedVersion { field: String },
    #[error("unknown action code {code:?}")]
    UnknownAction { code: String },
    #[error("invalid requester id {raw:?}")]
    InvalidRequester { raw: String },
    #[error("invalid escape sequence at byte {offset}")]
    InvalidEscape { offset: usize },
}

/// Encode a transition and ticket identity into a token.
pub fn encode(action: TicketAction, requester_id: UserId, request_text: &str) -> String {
    format!(
        "{}:{}{}{}{}{}",
        TOKEN_VERSION,
        action.code(),
        TOKEN_DELIMITER,
        requester_id.0,
        TOKEN_DELIMITER,
        escape(request_text)
    )
}

/// Length in bytes of the token [`encode`] would produce.
///
/// Action codes share one length, so the result does not depend on which
/// action is encoded.
pub fn encoded_len(requester_id: UserId, request_text: &str) -> usize {
    encode(TicketAction::Received, requester_id, request_text).len()
}

/// Decode a token into its transition and ticket identity.
pub fn decode(token: &str) -> Result<TicketToken, MalformedToken> {
    let fields: Vec<&str> = token.split(TOKEN_DELIMITER).collect();
    let [action_field, requester_field, text_field] = fields[..] else {
        return Err(MalformedToken::FieldCount {
            found: fields.len(),
        });
    };

    let code = action_field
        .strip_prefix(TOKEN_VERSION)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| MalformedToken::UnsupportedVersion {
            field: action_field.to_string(),
        })?;

    let action = TicketAction::from_code(code).ok_or_else(|| MalformedToken::UnknownAction {
        code: code.to_string(),
    })?;

    // Only the form `encode` writes is accepted, so one ticket has one token
    let requester_id = requester_field
        .parse::<i64>()
        .ok()
        .filter(|id| id.to_string() == requester_field)
        .map(UserId)
        .ok_or_else(|| MalformedToken::InvalidRequester {
            raw: requester_field.to_string(),
        })?;

    let request_text = unescape(text_field)?;

    Ok(TicketToken {
        action,
        requester_id,
        request_text,
    })
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            TOKEN_DELIMITER => escaped.push_str("%7C"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape(field: &str) -> Result<String, MalformedToken> {
    let mut text = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(pos) = rest.find('%') {
        text.push_str(&rest[..pos]);
        let offset = field.len() - rest.len() + pos;
        match rest.get(pos + 1..pos + 3) {
            Some("25") => text.push('%'),
            Some("7C") => text.push(TOKEN_DELIMITER),
            _ => return Err(MalformedToken::InvalidEscape { offset }),
        }
        rest = &rest[pos + 3..];
    }
    text.push_str(rest);
    Ok(text)
}
