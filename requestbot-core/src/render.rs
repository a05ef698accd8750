//! Message texts.
//!
//! The ticket body must be reproducible from the token fields alone: a
//! transition re-renders it from the decoded token rather than reading the
//! old message back.

use crate::ticket::{TicketAction, TicketStatus, UserId};

/// Body of a ticket as posted to the review chat.
pub fn ticket_text(requester_id: UserId, request_text: &str) -> String {
    format!(
        "🎫 New request\n\n\
        From: {}\n\
        Request: {}",
        requester_id, request_text
    )
}

/// Ticket body with the resolution status line appended.
pub fn resolved_ticket_text(
    requester_id: UserId,
    request_text: &str,
    status: TicketStatus,
) -> String {
    format!(
        "{}\n\nStatus: {}",
        ticket_text(requester_id, request_text),
        status
    )
}

/// Message sent to the requester once a reviewer acts.
pub fn outcome_message(action: TicketAction, request_text: &str) -> String {
    match action {
        TicketAction::Received => format!(
            "📥 Your request \"{}\" has been received and is being looked into.",
            request_text
        ),
        TicketAction::Uploaded => format!(
            "📤 Your request \"{}\" has been uploaded.",
            request_text
        ),
        TicketAction::Available => format!(
            "✅ Your request \"{}\" is already available.",
            request_text
        ),
        TicketAction::Rejected => format!(
            "❌ Your request \"{}\" has been rejected.",
            request_text
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_ticket_text() {
        assert_snapshot!(ticket_text(UserId(42), "Movie X 2020"), @r"
        🎫 New request

        From: 42
        Request: Movie X 2020
        ");
    }

    #[test]
    fn test_resolved_ticket_text_extends_ticket_text() {
        let resolved = resolved_ticket_text(UserId(42), "Movie X 2020", TicketStatus::Uploaded);
        assert!(resolved.starts_with(&ticket_text(UserId(42), "Movie X 2020")));
        assert!(resolved.ends_with("Status: Uploaded"));
    }

    #[test]
    fn test_outcome_messages_quote_the_request() {
        for action in TicketAction::ALL {
            let message = outcome_message(action, "Some show S01");
            assert!(message.contains("\"Some show S01\""), "{}", message);
        }
        assert!(outcome_message(TicketAction::Rejected, "x").contains("rejected"));
    }
}
