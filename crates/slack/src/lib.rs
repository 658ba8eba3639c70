//! Slack Integration - webhook event intake for herald
//!
//! This crate adapts the platform's webhook surfaces to the engine in
//! `herald-core`:
//! - **Wire** (`wire`) - inbound payload shapes and HTTP envelopes
//! - **Triggers** (`trigger`) - bot-mention and custom-trigger stripping
//! - **Normalization** (`normalize`) - raw payloads to `NormalizedEvent`
//! - **Transport** (`transport`) - outbound send boundary (`ChatTransport`)
//! - **Engine** (`engine`) - the assembled bot (`BotEngine`)
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Subscribe to `message.channels` events; add slash-command and
//!    interactivity request URLs
//! 3. Set env vars: `HERALD_SLACK_BOT_USER_ID`, `HERALD_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Webhook POST → normalize → DeliveryLedger → Dispatcher → compose
//!                                 ↓                 ↓
//!                           FormTracker       ChatTransport → Slack
//! ```
//!
//! # Key Types
//!
//! - `BotEngine` - one `process_*` entry per webhook surface
//! - `TriggerSet` - leading-mention and custom-trigger matching
//! - `ChatTransport` - outbound boundary trait with a noop stand-in
//! - `ProcessOutcome` - what one delivery amounted to

pub mod engine;
pub mod normalize;
pub mod transport;
pub mod trigger;
pub mod wire;
