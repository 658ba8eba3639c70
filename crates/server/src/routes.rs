//! Webhook intake routes for the chat platform.
//!
//! Endpoints:
//! - `POST /slack/events`   - events API: `url_verification` challenge
//!   echo and `event_callback` message deliveries (JSON body)
//! - `POST /slack/commands` - slash-command invocations (form body)
//! - `POST /slack/actions`  - interactivity callbacks (form body whose
//!   `payload` field holds the JSON callback)

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Form, Json, Router};
use herald_slack::engine::{BotEngine, EngineError, ProcessOutcome};
use herald_slack::wire::{ActionRequest, EventEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SlackState {
    engine: Arc<BotEngine>,
}

/// Form body of a slash-command invocation, as the platform posts it.
#[derive(Debug, Deserialize)]
pub struct SlashForm {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AckResponse {
    pub ok: bool,
    pub outcome: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventAck {
    Challenge { challenge: String },
    Ack(AckResponse),
}

pub fn router(engine: Arc<BotEngine>) -> Router {
    Router::new()
        .route("/slack/events", post(receive_event))
        .route("/slack/commands", post(receive_slash))
        .route("/slack/actions", post(receive_action))
        .with_state(SlackState { engine })
}

async fn receive_event(
    State(state): State<SlackState>,
    Json(envelope): Json<EventEnvelope>,
) -> (StatusCode, Json<EventAck>) {
    match envelope.kind.as_str() {
        "url_verification" => {
            info!(
                event_name = "http.events.url_verification",
                "echoing endpoint verification challenge"
            );
            let challenge = envelope.challenge.unwrap_or_default();
            (StatusCode::OK, Json(EventAck::Challenge { challenge }))
        }
        "event_callback" => {
            let Some(event) = envelope.event.as_ref() else {
                warn!(
                    event_name = "http.events.empty_callback",
                    event_id = envelope.event_id.as_deref().unwrap_or("unknown"),
                    "event_callback without an inner event"
                );
                let ack = AckResponse { ok: false, outcome: "malformed" };
                return (StatusCode::BAD_REQUEST, Json(EventAck::Ack(ack)));
            };
            let (status, ack) = ack_parts(state.engine.process_message(event).await);
            (status, Json(EventAck::Ack(ack)))
        }
        other => {
            debug!(
                event_name = "http.events.unhandled_kind",
                kind = %other,
                "acknowledging unhandled envelope kind"
            );
            let ack = AckResponse { ok: true, outcome: "ignored" };
            (StatusCode::OK, Json(EventAck::Ack(ack)))
        }
    }
}

async fn receive_slash(
    State(state): State<SlackState>,
    Form(form): Form<SlashForm>,
) -> (StatusCode, Json<AckResponse>) {
    let payload = json!({
        "command": form.command,
        "text": form.text,
        "user_id": form.user_id,
        "channel_id": form.channel_id,
        "thread_ts": form.thread_ts,
    });
    let (status, ack) = ack_parts(state.engine.process_slash(&payload).await);
    (status, Json(ack))
}

async fn receive_action(
    State(state): State<SlackState>,
    Form(request): Form<ActionRequest>,
) -> (StatusCode, Json<AckResponse>) {
    let payload: Value = match serde_json::from_str(&request.payload) {
        Ok(value) => value,
        Err(error) => {
            warn!(
                event_name = "http.actions.undecodable_payload",
                error = %error,
                "interactivity payload field is not JSON"
            );
            return (StatusCode::BAD_REQUEST, Json(AckResponse { ok: false, outcome: "malformed" }));
        }
    };
    let (status, ack) = ack_parts(state.engine.process_action(&payload).await);
    (status, Json(ack))
}

/// Maps an engine result onto the webhook contract: malformed deliveries
/// answer 400, everything else answers 200. Send failures are logged,
/// not surfaced; redeliveries of an admitted identity stop at the ledger.
fn ack_parts(result: Result<ProcessOutcome, EngineError>) -> (StatusCode, AckResponse) {
    match result {
        Ok(outcome) => {
            (StatusCode::OK, AckResponse { ok: true, outcome: outcome_name(&outcome) })
        }
        Err(EngineError::Malformed(error)) => {
            warn!(
                event_name = "http.malformed_payload",
                error = %error,
                "rejecting malformed delivery"
            );
            (StatusCode::BAD_REQUEST, AckResponse { ok: false, outcome: "malformed" })
        }
        Err(EngineError::Transport(error)) => {
            warn!(event_name = "http.send_failed", error = %error, "reply did not go out");
            (StatusCode::OK, AckResponse { ok: false, outcome: "send_failed" })
        }
    }
}

fn outcome_name(outcome: &ProcessOutcome) -> &'static str {
    match outcome {
        ProcessOutcome::Sent(_) => "sent",
        ProcessOutcome::NoReply => "no_reply",
        ProcessOutcome::Duplicate => "duplicate",
        ProcessOutcome::Ignored => "ignored",
        ProcessOutcome::FormUpdated => "form_updated",
        ProcessOutcome::FormCompleted(_) => "form_completed",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::{Form, Json};
    use herald_core::{CommandSpec, CommandTable, Dispatcher, HandlerRegistry, OutboundSend};
    use herald_slack::engine::BotEngine;
    use herald_slack::transport::RecordingTransport;
    use herald_slack::trigger::TriggerSet;
    use herald_slack::wire::{ActionRequest, EventEnvelope};
    use serde_json::json;

    use super::{receive_action, receive_event, receive_slash, AckResponse, EventAck, SlackState, SlashForm};

    fn test_engine() -> (Arc<BotEngine>, Arc<RecordingTransport>) {
        let triggers = TriggerSet::new("UBOT123", &[]).expect("trigger set");
        let dispatcher = Dispatcher::new(Vec::new(), triggers.display_tokens());
        let specs: Vec<CommandSpec> = serde_json::from_value(json!([
            {
                "pattern": "^ping",
                "group": "main",
                "description": "Liveness check",
                "response": { "text": "pong, {sender_id}" }
            }
        ]))
        .expect("specs deserialize");
        let table = CommandTable::build(&specs, &HandlerRegistry::new()).expect("table builds");
        dispatcher.update_commands(table);

        let transport = Arc::new(RecordingTransport::new());
        (Arc::new(BotEngine::new(triggers, dispatcher, transport.clone())), transport)
    }

    fn state(engine: Arc<BotEngine>) -> State<SlackState> {
        State(SlackState { engine })
    }

    fn envelope(value: serde_json::Value) -> Json<EventEnvelope> {
        Json(serde_json::from_value(value).expect("envelope deserializes"))
    }

    #[tokio::test]
    async fn url_verification_echoes_the_challenge() {
        let (engine, _) = test_engine();

        let (status, Json(body)) = receive_event(
            state(engine),
            envelope(json!({ "type": "url_verification", "challenge": "c0ffee" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, EventAck::Challenge { challenge: "c0ffee".to_owned() });
    }

    #[tokio::test]
    async fn event_callbacks_flow_through_the_engine() {
        let (engine, transport) = test_engine();

        let (status, Json(body)) = receive_event(
            state(engine),
            envelope(json!({
                "type": "event_callback",
                "event_id": "Ev1",
                "event": {
                    "type": "message",
                    "text": "<@UBOT123> ping",
                    "user": "U42",
                    "channel": "C100",
                    "ts": "1730000000.000100"
                }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, EventAck::Ack(AckResponse { ok: true, outcome: "sent" }));
        let sent = transport.sent().await;
        let OutboundSend::Message { text, .. } = &sent[0] else {
            panic!("ping must answer in the channel");
        };
        assert_eq!(text, "pong, U42");
    }

    #[tokio::test]
    async fn malformed_event_payloads_answer_bad_request() {
        let (engine, _) = test_engine();

        let (status, Json(body)) = receive_event(
            state(engine),
            envelope(json!({
                "type": "event_callback",
                "event": { "type": "message", "ts": "1730000000.000100" }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, EventAck::Ack(AckResponse { ok: false, outcome: "malformed" }));
    }

    #[tokio::test]
    async fn unhandled_envelope_kinds_are_acknowledged() {
        let (engine, _) = test_engine();

        let (status, Json(body)) =
            receive_event(state(engine), envelope(json!({ "type": "app_rate_limited" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, EventAck::Ack(AckResponse { ok: true, outcome: "ignored" }));
    }

    #[tokio::test]
    async fn slash_forms_answer_the_sender_privately() {
        let (engine, transport) = test_engine();

        let (status, Json(ack)) = receive_slash(
            state(engine),
            Form(SlashForm {
                command: "/ping".to_owned(),
                text: String::new(),
                user_id: "U1".to_owned(),
                channel_id: "C9".to_owned(),
                thread_ts: None,
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, AckResponse { ok: true, outcome: "sent" });
        let sent = transport.sent().await;
        assert!(matches!(&sent[0], OutboundSend::Ephemeral { user, .. } if user == "U1"));
    }

    #[tokio::test]
    async fn action_payload_field_carries_the_json_callback() {
        let (engine, _) = test_engine();
        let form = engine.forms().open_form("U7");
        let mut blocks = vec![json!({ "action_id": "color" })];
        assert!(engine.forms().register_elements(&form.action_id_prefix, &mut blocks));
        let action_id = blocks[0]["action_id"].as_str().expect("rewritten id").to_owned();

        let callback = json!({
            "user": { "id": "U7" },
            "actions": [{ "action_id": action_id, "value": "blue" }]
        });
        let (status, Json(ack)) = receive_action(
            state(engine),
            Form(ActionRequest { payload: callback.to_string() }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, AckResponse { ok: true, outcome: "form_updated" });
    }

    #[tokio::test]
    async fn undecodable_action_payload_answers_bad_request() {
        let (engine, _) = test_engine();

        let (status, Json(ack)) = receive_action(
            state(engine),
            Form(ActionRequest { payload: "not json".to_owned() }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(ack, AckResponse { ok: false, outcome: "malformed" });
    }
}
