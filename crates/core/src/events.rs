use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Delivery identity for message-class events: the full composite
/// `{channel_id}_{event_ts}` key, never a truncated digest. Deterministic
/// over channel and timestamp so redeliveries of the same event always
/// collide while a verbatim text repeat at a new timestamp does not.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn from_parts(channel_id: &str, event_ts: &str) -> Self {
        Self(format!("{channel_id}_{event_ts}"))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the reply to a slash invocation is delivered. Fixed at
/// normalization time: invocations without thread context answer the
/// sender privately instead of broadcasting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMode {
    Ephemeral,
    InChannel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub identity: EventId,
    /// Trigger-stripped text with the original casing, whitespace-trimmed.
    pub raw_text: String,
    /// Trigger-stripped, lower-cased text; what pattern matching runs on.
    pub cleaned_text: String,
    pub sender_id: String,
    pub channel_id: String,
    pub thread_id: Option<String>,
    pub subtype: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashCommandEvent {
    /// The invocation verb as delivered, e.g. `/shelp`.
    pub command_name: String,
    pub raw_text: String,
    pub cleaned_text: String,
    pub sender_id: String,
    pub channel_id: String,
    pub thread_id: Option<String>,
    pub response_mode: ResponseMode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub action_id: String,
    pub sender_id: String,
    pub channel_id: Option<String>,
    /// Value carried by the interactive element, when the element has one.
    pub value: Option<String>,
    /// Opaque extras from the callback, kept as delivered.
    pub payload: BTreeMap<String, String>,
    /// Leading `AF-{token}-{owner}` portion of the action id, when the id
    /// carries one. Attribution to an open form still goes through the
    /// tracker's own prefix matching.
    pub form_identity: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizedEvent {
    Message(MessageEvent),
    SlashCommand(SlashCommandEvent),
    Action(ActionEvent),
}

impl NormalizedEvent {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::SlashCommand(_) => "slash_command",
            Self::Action(_) => "block_action",
        }
    }

    pub fn sender_id(&self) -> &str {
        match self {
            Self::Message(ev) => &ev.sender_id,
            Self::SlashCommand(ev) => &ev.sender_id,
            Self::Action(ev) => &ev.sender_id,
        }
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::Message(ev) => Some(&ev.channel_id),
            Self::SlashCommand(ev) => Some(&ev.channel_id),
            Self::Action(ev) => ev.channel_id.as_deref(),
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Self::Message(ev) => ev.thread_id.as_deref(),
            Self::SlashCommand(ev) => ev.thread_id.as_deref(),
            Self::Action(_) => None,
        }
    }

    /// Text that pattern matching operates on. Actions carry no free text.
    pub fn cleaned_text(&self) -> Option<&str> {
        match self {
            Self::Message(ev) => Some(&ev.cleaned_text),
            Self::SlashCommand(ev) => Some(&ev.cleaned_text),
            Self::Action(_) => None,
        }
    }

    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Message(ev) => Some(&ev.raw_text),
            Self::SlashCommand(ev) => Some(&ev.raw_text),
            Self::Action(_) => None,
        }
    }

    /// Named attribute lookup backing bound-argument and template
    /// substitution. Names follow the normalized field names; unknown
    /// names resolve to `None` so callers can fall back to the literal.
    pub fn attribute(&self, name: &str) -> Option<String> {
        match self {
            Self::Message(ev) => match name {
                "raw_text" => Some(ev.raw_text.clone()),
                "cleaned_text" => Some(ev.cleaned_text.clone()),
                "sender_id" => Some(ev.sender_id.clone()),
                "channel_id" => Some(ev.channel_id.clone()),
                "thread_id" => ev.thread_id.clone(),
                "identity" => Some(ev.identity.0.clone()),
                "subtype" => ev.subtype.clone(),
                _ => None,
            },
            Self::SlashCommand(ev) => match name {
                "command_name" => Some(ev.command_name.clone()),
                "raw_text" => Some(ev.raw_text.clone()),
                "cleaned_text" => Some(ev.cleaned_text.clone()),
                "sender_id" => Some(ev.sender_id.clone()),
                "channel_id" => Some(ev.channel_id.clone()),
                "thread_id" => ev.thread_id.clone(),
                _ => None,
            },
            Self::Action(ev) => match name {
                "action_id" => Some(ev.action_id.clone()),
                "sender_id" => Some(ev.sender_id.clone()),
                "channel_id" => ev.channel_id.clone(),
                "value" => ev.value.clone(),
                "form_identity" => ev.form_identity.clone(),
                other => ev.payload.get(other).cloned(),
            },
        }
    }
}
