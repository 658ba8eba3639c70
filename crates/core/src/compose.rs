use crate::commands::ResponseValue;
use crate::events::{NormalizedEvent, ResponseMode};

/// One outbound call for the transport collaborator to perform. The
/// engine treats the transport's results opaquely.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundSend {
    Message {
        channel: String,
        text: String,
        blocks: Option<Vec<serde_json::Value>>,
        thread_id: Option<String>,
    },
    Ephemeral {
        channel: String,
        user: String,
        text: String,
        blocks: Option<Vec<serde_json::Value>>,
    },
}

/// Turns a dispatch outcome into a single outbound send.
/// `None` responses send nothing. Slash invocations without thread
/// context answer the sender privately; everything else goes to the
/// channel, threaded when the event carried a thread id.
pub fn compose(response: Option<ResponseValue>, event: &NormalizedEvent) -> Option<OutboundSend> {
    let (text, blocks) = match response? {
        ResponseValue::Text(text) => (substitute_template(&text, event), None),
        ResponseValue::Blocks(blocks) => (String::new(), Some(blocks)),
    };

    if let NormalizedEvent::SlashCommand(slash) = event {
        if slash.response_mode == ResponseMode::Ephemeral {
            return Some(OutboundSend::Ephemeral {
                channel: slash.channel_id.clone(),
                user: slash.sender_id.clone(),
                text,
                blocks,
            });
        }
    }

    let Some(channel) = event.channel_id() else {
        tracing::warn!(
            event_name = "compose.no_channel",
            kind = event.kind_name(),
            "response has nowhere to go"
        );
        return None;
    };
    Some(OutboundSend::Message {
        channel: channel.to_owned(),
        text,
        blocks,
        thread_id: event.thread_id().map(str::to_owned),
    })
}

/// `{attr}` substitution from the event's attributes, all or nothing:
/// an unknown key, a stray brace or an unterminated placeholder leaves
/// the text unchanged, so responses that merely contain braces survive.
fn substitute_template(text: &str, event: &NormalizedEvent) -> String {
    try_substitute(text, event).unwrap_or_else(|| text.to_owned())
}

fn try_substitute(text: &str, event: &NormalizedEvent) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return None,
                        Some(inner) => key.push(inner),
                    }
                }
                out.push_str(&event.attribute(&key)?);
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return None;
                }
            }
            other => out.push(other),
        }
    }
    Some(out)
}
