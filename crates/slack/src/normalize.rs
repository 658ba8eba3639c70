//! Converts raw platform payloads into the engine's uniform event type.
//! Deliveries that are well-formed but not addressed to the bot come back
//! as `Ignored` with the reason; malformed deliveries fail with the field
//! that was missing.

use std::collections::BTreeMap;

use herald_core::events::{ActionEvent, MessageEvent, SlashCommandEvent};
use herald_core::{EventId, MalformedEventError, NormalizedEvent, ResponseMode};
use serde_json::Value;

use crate::trigger::TriggerSet;
use crate::wire::{self, ActionCallback, MessageCallback, SlashCallback};

/// Which webhook surface delivered the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    Message,
    SlashCommand,
    BlockAction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Well-formed message that is not addressed to the bot.
    NoTrigger,
    /// Subtyped delivery: edits, deletions, join noise, bot chatter.
    IgnoredSubtype,
    /// Event callback that is not a message at all.
    NotAMessage,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NormalizedInput {
    Command(NormalizedEvent),
    Ignored(IgnoreReason),
}

/// Thread replies keep flowing; every other subtype is dropped.
const REPLIED_SUBTYPE: &str = "message_replied";

pub fn normalize(
    kind: PayloadKind,
    raw: &Value,
    triggers: &TriggerSet,
) -> Result<NormalizedInput, MalformedEventError> {
    match kind {
        PayloadKind::Message => normalize_message(raw, triggers),
        PayloadKind::SlashCommand => normalize_slash(raw),
        PayloadKind::BlockAction => normalize_action(raw),
    }
}

fn normalize_message(
    raw: &Value,
    triggers: &TriggerSet,
) -> Result<NormalizedInput, MalformedEventError> {
    let callback = MessageCallback::parse(raw)?;

    if callback.event_type != wire::KIND_MESSAGE {
        return Ok(NormalizedInput::Ignored(IgnoreReason::NotAMessage));
    }
    if callback.subtype.as_deref().is_some_and(|subtype| subtype != REPLIED_SUBTYPE) {
        return Ok(NormalizedInput::Ignored(IgnoreReason::IgnoredSubtype));
    }

    let text = callback
        .text
        .as_deref()
        .ok_or_else(|| MalformedEventError::missing(wire::KIND_MESSAGE, "text"))?;
    let sender_id = callback
        .user
        .clone()
        .ok_or_else(|| MalformedEventError::missing(wire::KIND_MESSAGE, "user"))?;

    let Some((raw_text, cleaned_text)) = triggers.strip(text) else {
        return Ok(NormalizedInput::Ignored(IgnoreReason::NoTrigger));
    };

    let identity = EventId::from_parts(&callback.channel, callback.identity_ts());
    Ok(NormalizedInput::Command(NormalizedEvent::Message(MessageEvent {
        identity,
        raw_text,
        cleaned_text,
        sender_id,
        channel_id: callback.channel,
        thread_id: callback.thread_ts,
        subtype: callback.subtype,
    })))
}

fn normalize_slash(raw: &Value) -> Result<NormalizedInput, MalformedEventError> {
    let callback = SlashCallback::parse(raw)?;

    // `/make-sticker Dancing Cat` dispatches as `make sticker dancing cat`:
    // the slash goes, dashes become spaces, the argument text follows.
    let mut invocation = callback.command.replace('/', "").replace('-', " ");
    if !callback.text.is_empty() {
        invocation.push(' ');
        invocation.push_str(&callback.text);
    }
    let cleaned_text = invocation.to_lowercase();

    let response_mode = if callback.thread_ts.is_some() {
        ResponseMode::InChannel
    } else {
        ResponseMode::Ephemeral
    };

    Ok(NormalizedInput::Command(NormalizedEvent::SlashCommand(SlashCommandEvent {
        command_name: callback.command,
        raw_text: callback.text,
        cleaned_text,
        sender_id: callback.user_id,
        channel_id: callback.channel_id,
        thread_id: callback.thread_ts,
        response_mode,
    })))
}

fn normalize_action(raw: &Value) -> Result<NormalizedInput, MalformedEventError> {
    let callback = ActionCallback::parse(raw)?;

    let mut payload = BTreeMap::new();
    if let Some(trigger_id) = &callback.trigger_id {
        payload.insert("trigger_id".to_owned(), trigger_id.clone());
    }
    if let Some(message_ts) = &callback.message_ts {
        payload.insert("message_ts".to_owned(), message_ts.clone());
    }
    if let Some(response_url) = &callback.response_url {
        payload.insert("response_url".to_owned(), response_url.clone());
    }

    let form_identity = form_identity(&callback.action_id);

    Ok(NormalizedInput::Command(NormalizedEvent::Action(ActionEvent {
        action_id: callback.action_id,
        sender_id: callback.user_id,
        channel_id: callback.channel_id,
        value: callback.value,
        payload,
        form_identity,
    })))
}

/// Leading `AF-{token}-{owner}` portion of a form-element action id, when
/// the id carries one. Attribution still goes through the form tracker's
/// own prefix matching.
fn form_identity(action_id: &str) -> Option<String> {
    let mut parts = action_id.split('-');
    if parts.next() != Some("AF") {
        return None;
    }
    let token = parts.next()?;
    let owner = parts.next()?;
    // At least one element segment must follow the prefix.
    parts.next()?;
    Some(format!("AF-{token}-{owner}"))
}
