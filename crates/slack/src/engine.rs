//! The assembled bot: trigger set, delivery ledger, dispatcher, form
//! tracker and transport wired together by explicit composition, with
//! one `process_*` entry per webhook surface.

use std::sync::Arc;

use herald_core::{
    compose, DeliveryLedger, Dispatcher, FormIngest, FormTracker, InteractionForm,
    MalformedEventError, NormalizedEvent, OutboundSend,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::normalize::{normalize, NormalizedInput, PayloadKind};
use crate::transport::{ChatTransport, MessageRef, TransportError};
use crate::trigger::TriggerSet;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Malformed(#[from] MalformedEventError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What processing one delivery amounted to.
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessOutcome {
    /// A reply went out through the transport.
    Sent(MessageRef),
    /// Dispatched, but nothing needed sending.
    NoReply,
    /// The delivery ledger had already admitted this identity.
    Duplicate,
    /// Not addressed to the bot, or an action matching no open form.
    Ignored,
    /// An open form absorbed the action.
    FormUpdated,
    /// The terminal action closed a form; ownership returns to the caller.
    FormCompleted(InteractionForm),
}

pub struct BotEngine {
    triggers: TriggerSet,
    ledger: DeliveryLedger,
    dispatcher: Dispatcher,
    forms: FormTracker,
    transport: Arc<dyn ChatTransport>,
}

impl BotEngine {
    pub fn new(
        triggers: TriggerSet,
        dispatcher: Dispatcher,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            triggers,
            ledger: DeliveryLedger::new(),
            dispatcher,
            forms: FormTracker::new(),
            transport,
        }
    }

    pub fn with_ledger(mut self, ledger: DeliveryLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_form_tracker(mut self, forms: FormTracker) -> Self {
        self.forms = forms;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn forms(&self) -> &FormTracker {
        &self.forms
    }

    pub fn triggers(&self) -> &TriggerSet {
        &self.triggers
    }

    /// Handles one `message` event callback. Redeliveries of an admitted
    /// identity stop here; nothing downstream of the ledger runs twice.
    pub async fn process_message(&self, raw: &Value) -> Result<ProcessOutcome, EngineError> {
        let input = normalize(PayloadKind::Message, raw, &self.triggers)?;
        let event = match input {
            NormalizedInput::Ignored(reason) => {
                debug!(
                    event_name = "ingress.message_ignored",
                    reason = ?reason,
                    "dropped inbound message"
                );
                return Ok(ProcessOutcome::Ignored);
            }
            NormalizedInput::Command(event) => event,
        };

        if let NormalizedEvent::Message(message) = &event {
            if !self.ledger.admit(&message.identity) {
                info!(
                    event_name = "ingress.duplicate_delivery",
                    identity = %message.identity,
                    "redelivered event suppressed"
                );
                return Ok(ProcessOutcome::Duplicate);
            }
        }

        self.respond(&event).await
    }

    /// Handles one slash-command form payload. Slash invocations are
    /// always addressed to the bot; there is no trigger or ledger step.
    pub async fn process_slash(&self, raw: &Value) -> Result<ProcessOutcome, EngineError> {
        let input = normalize(PayloadKind::SlashCommand, raw, &self.triggers)?;
        let NormalizedInput::Command(event) = input else {
            return Ok(ProcessOutcome::Ignored);
        };
        self.respond(&event).await
    }

    /// Handles one interactivity callback. Actions belonging to an open
    /// form accumulate into it; late, duplicate and foreign actions are
    /// tolerated silently.
    pub async fn process_action(&self, raw: &Value) -> Result<ProcessOutcome, EngineError> {
        let input = normalize(PayloadKind::BlockAction, raw, &self.triggers)?;
        let NormalizedInput::Command(NormalizedEvent::Action(action)) = input else {
            return Ok(ProcessOutcome::Ignored);
        };

        match self.forms.ingest_action(&action) {
            Some(FormIngest::Accumulated { form_id }) => {
                debug!(
                    event_name = "forms.field_recorded",
                    form_id = %form_id,
                    action_id = %action.action_id,
                    "open form absorbed an action"
                );
                Ok(ProcessOutcome::FormUpdated)
            }
            Some(FormIngest::Completed { form }) => {
                info!(
                    event_name = "forms.completed",
                    form_id = %form.form_id,
                    owner = %form.owner_user_id,
                    fields = form.collected_fields.len(),
                    "form completed"
                );
                Ok(ProcessOutcome::FormCompleted(form))
            }
            None => {
                debug!(
                    event_name = "forms.unattributed_action",
                    action_id = %action.action_id,
                    "action matched no open form"
                );
                Ok(ProcessOutcome::Ignored)
            }
        }
    }

    async fn respond(&self, event: &NormalizedEvent) -> Result<ProcessOutcome, EngineError> {
        let response = self.dispatcher.dispatch(event);
        let Some(send) = compose(response, event) else {
            return Ok(ProcessOutcome::NoReply);
        };
        let reference = self.deliver(send).await?;
        Ok(ProcessOutcome::Sent(reference))
    }

    async fn deliver(&self, send: OutboundSend) -> Result<MessageRef, EngineError> {
        let result = match &send {
            OutboundSend::Message { channel, text, blocks, thread_id } => {
                self.transport
                    .send_message(channel, text, blocks.as_deref(), thread_id.as_deref())
                    .await
            }
            OutboundSend::Ephemeral { channel, user, text, blocks } => {
                self.transport.send_ephemeral(channel, user, text, blocks.as_deref()).await
            }
        };

        match result {
            Ok(reference) => {
                info!(
                    event_name = "egress.message_sent",
                    channel = %reference.channel,
                    "reply delivered"
                );
                Ok(reference)
            }
            Err(error) => {
                warn!(event_name = "egress.send_failed", error = %error, "transport send failed");
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use herald_core::{
        CommandSpec, CommandTable, Dispatcher, HandlerRegistry, OutboundSend, ResponseSource,
        ResponseValue,
    };
    use serde_json::{json, Value};

    use super::{BotEngine, EngineError, ProcessOutcome};
    use crate::transport::{ChatTransport, MessageRef, RecordingTransport, TransportError};
    use crate::trigger::TriggerSet;

    fn spec(pattern: &str, response: ResponseSource) -> CommandSpec {
        CommandSpec {
            pattern: pattern.to_owned(),
            group: "general".to_owned(),
            title: None,
            tags: Vec::new(),
            description: String::new(),
            flags: Vec::new(),
            examples: Vec::new(),
            response,
        }
    }

    fn engine_with(transport: Arc<dyn ChatTransport>) -> BotEngine {
        let triggers = TriggerSet::new("UBOT123", &[]).expect("trigger set");
        let dispatcher = Dispatcher::new(Vec::new(), triggers.display_tokens());

        let mut registry = HandlerRegistry::new();
        registry.register("echo_raw", |args: &[String]| {
            Ok(Some(ResponseValue::Text(args.join(" "))))
        });

        let table = CommandTable::build(
            &[spec(
                "^echo",
                ResponseSource::Call {
                    handler: "echo_raw".to_owned(),
                    args: vec!["raw_text".to_owned()],
                },
            )],
            &registry,
        )
        .expect("table builds");
        dispatcher.update_commands(table);

        BotEngine::new(triggers, dispatcher, transport)
    }

    fn message_payload(text: &str, ts: &str) -> Value {
        json!({
            "type": "message",
            "text": text,
            "user": "U42",
            "channel": "C100",
            "ts": ts,
            "event_ts": ts
        })
    }

    #[tokio::test]
    async fn duplicate_deliveries_dispatch_once() {
        let transport = Arc::new(RecordingTransport::new());
        let engine = engine_with(transport.clone());
        let payload = message_payload("<@UBOT123> echo hello", "1730000000.000100");

        let first = engine.process_message(&payload).await.expect("first delivery");
        assert!(matches!(first, ProcessOutcome::Sent(_)));

        let second = engine.process_message(&payload).await.expect("second delivery");
        assert_eq!(second, ProcessOutcome::Duplicate);

        assert_eq!(transport.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn stripped_mention_round_trips_into_the_reply() {
        let transport = Arc::new(RecordingTransport::new());
        let engine = engine_with(transport.clone());
        let payload = message_payload("<@UBOT123> Echo HELLO", "1730000000.000200");

        engine.process_message(&payload).await.expect("delivery");

        let sent = transport.sent().await;
        let OutboundSend::Message { text, channel, .. } = &sent[0] else {
            panic!("expected a channel message");
        };
        assert_eq!(text, "Echo HELLO");
        assert_eq!(channel, "C100");
    }

    #[tokio::test]
    async fn untriggered_chatter_is_ignored_without_sending() {
        let transport = Arc::new(RecordingTransport::new());
        let engine = engine_with(transport.clone());
        let payload = message_payload("free lunch in the kitchen", "1730000000.000300");

        let outcome = engine.process_message(&payload).await.expect("delivery");
        assert_eq!(outcome, ProcessOutcome::Ignored);
        assert!(transport.sent().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error() {
        let engine = engine_with(Arc::new(RecordingTransport::new()));
        let payload = json!({ "type": "message", "ts": "1730000000.000400" });

        let err = engine.process_message(&payload).await.expect_err("channel is required");
        assert!(matches!(err, EngineError::Malformed(_)));
    }

    #[tokio::test]
    async fn form_actions_accumulate_and_complete_exactly_once() {
        let engine = engine_with(Arc::new(RecordingTransport::new()));
        let form = engine.forms().open_form("U7");
        let mut blocks = vec![json!({ "action_id": "color" }), json!({ "action_id": "submit" })];
        assert!(engine.forms().register_elements(&form.action_id_prefix, &mut blocks));

        let color_id = blocks[0]["action_id"].as_str().expect("rewritten id").to_owned();
        let submit_id = blocks[1]["action_id"].as_str().expect("rewritten id").to_owned();

        let color_action = json!({
            "user": { "id": "U7" },
            "actions": [{ "action_id": color_id, "value": "blue" }]
        });
        let outcome = engine.process_action(&color_action).await.expect("action");
        assert_eq!(outcome, ProcessOutcome::FormUpdated);

        let submit_action = json!({
            "user": { "id": "U7" },
            "actions": [{ "action_id": submit_id, "value": "go" }]
        });
        let outcome = engine.process_action(&submit_action).await.expect("action");
        let ProcessOutcome::FormCompleted(completed) = outcome else {
            panic!("terminal action must complete the form");
        };
        assert_eq!(completed.collected_fields.get("color").map(String::as_str), Some("blue"));
        assert!(completed.is_complete);

        // Resubmission after completion matches no open form.
        let outcome = engine.process_action(&submit_action).await.expect("action");
        assert_eq!(outcome, ProcessOutcome::Ignored);
    }

    struct FailingTransport;

    #[async_trait]
    impl ChatTransport for FailingTransport {
        async fn send_message(
            &self,
            _channel: &str,
            _text: &str,
            _blocks: Option<&[Value]>,
            _thread_id: Option<&str>,
        ) -> Result<MessageRef, TransportError> {
            Err(TransportError::Send("wire unplugged".to_owned()))
        }

        async fn send_ephemeral(
            &self,
            _channel: &str,
            _user: &str,
            _text: &str,
            _blocks: Option<&[Value]>,
        ) -> Result<MessageRef, TransportError> {
            Err(TransportError::Send("wire unplugged".to_owned()))
        }
    }

    #[tokio::test]
    async fn transport_failures_surface_to_the_caller() {
        let engine = engine_with(Arc::new(FailingTransport));
        let payload = message_payload("<@UBOT123> echo hello", "1730000000.000500");

        let err = engine.process_message(&payload).await.expect_err("send must fail");
        assert!(matches!(err, EngineError::Transport(TransportError::Send(_))));
    }
}
