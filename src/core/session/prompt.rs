//! System-instruction construction.
//!
//! The instruction is built once from resolved context, before the live
//! session opens; it cannot change afterwards.

use crate::core::session::Direction;
use crate::store::{AttendeeIdentity, EventContext};

/// Build the direction-specific system instruction from resolved context.
///
/// Falls back to generic wording when the event or attendee could not be
/// resolved, so a degraded lookup still yields a usable conversation.
pub fn build_system_instruction(
    direction: Direction,
    event: Option<&EventContext>,
    attendee: Option<&AttendeeIdentity>,
) -> String {
    let event_name = event.map(|e| e.name.as_str()).unwrap_or("the event");

    match direction {
        Direction::Outbound => {
            let attendee_name = attendee.map(|a| a.name.as_str()).unwrap_or("the attendee");
            let mut details = format!("- Name: {event_name}\n");
            if let Some(date) = event.and_then(|e| e.date.as_deref()) {
                details.push_str(&format!("- Date: {date}\n"));
            }
            if let Some(location) = event.and_then(|e| e.location.as_deref()) {
                details.push_str(&format!("- Location: {location}\n"));
            }

            format!(
                "You are calling {attendee_name} on behalf of an event organizer to confirm \
                 attendance.\n\n\
                 Event Details:\n{details}\n\
                 Your task:\n\
                 1. Greet {attendee_name} warmly by name\n\
                 2. Ask if they are still planning to attend \"{event_name}\"\n\
                 3. If they confirm, thank them and use the update_attendee_status function to \
                 mark them as CONFIRMED\n\
                 4. If they want to cancel, acknowledge politely and use the \
                 update_attendee_status function to mark them as CANCELLED\n\
                 5. Keep the conversation brief and natural (under 30 seconds)\n\n\
                 Be conversational, warm, and respectful of their time."
            )
        }
        Direction::Inbound => format!(
            "You are a helpful AI assistant for the event \"{event_name}\".\n\n\
             Your role is to answer questions about the event. You have access to event content \
             and can look up specific information.\n\n\
             When someone asks a question:\n\
             1. Use the lookup_event_content function to search for relevant information\n\
             2. Provide a clear, spoken answer based on what you find\n\
             3. If you can't find specific information, say so politely\n\n\
             Be conversational, friendly, and concise. Remember you're speaking, not writing, \
             so use natural speech patterns."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AttendeeStatus;

    fn event() -> EventContext {
        EventContext {
            id: "event-7".to_string(),
            name: "Rust Meetup".to_string(),
            date: Some("2026-09-01".to_string()),
            location: Some("Berlin".to_string()),
            description: None,
        }
    }

    fn attendee() -> AttendeeIdentity {
        AttendeeIdentity {
            id: "attendee-42".to_string(),
            name: "Sam".to_string(),
            phone: Some("+15550100".to_string()),
            status: AttendeeStatus::Pending,
        }
    }

    #[test]
    fn test_outbound_prompt_mentions_attendee_and_tool() {
        let prompt =
            build_system_instruction(Direction::Outbound, Some(&event()), Some(&attendee()));
        assert!(prompt.contains("Sam"));
        assert!(prompt.contains("Rust Meetup"));
        assert!(prompt.contains("2026-09-01"));
        assert!(prompt.contains("update_attendee_status"));
        assert!(prompt.contains("CANCELLED"));
    }

    #[test]
    fn test_inbound_prompt_mentions_lookup_tool() {
        let prompt = build_system_instruction(Direction::Inbound, Some(&event()), None);
        assert!(prompt.contains("Rust Meetup"));
        assert!(prompt.contains("lookup_event_content"));
    }

    #[test]
    fn test_degraded_context_falls_back_to_generic_wording() {
        let prompt = build_system_instruction(Direction::Outbound, None, None);
        assert!(prompt.contains("the event"));
        assert!(prompt.contains("the attendee"));
    }
}
