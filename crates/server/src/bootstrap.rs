use std::sync::Arc;

use chrono::Duration;
use herald_core::commands::ResponseSource;
use herald_core::config::{AppConfig, ConfigError, LoadOptions};
use herald_core::{
    render_filtered_help, render_help, CommandSpec, CommandTable, CommandTableError,
    DeliveryLedger, Dispatcher, FormTracker, HandlerRegistry, ParsedCommand, ResponseValue,
    SystemClock,
};
use herald_slack::engine::BotEngine;
use herald_slack::transport::NoopTransport;
use herald_slack::trigger::TriggerSet;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub engine: Arc<BotEngine>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("trigger pattern failed to compile: {0}")]
    Trigger(#[source] regex::Error),
    #[error(transparent)]
    CommandTable(#[from] CommandTableError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let triggers = TriggerSet::new(&config.slack.bot_user_id, &config.bot.triggers)
        .map_err(BootstrapError::Trigger)?;

    let specs = demo_command_specs();
    let registry = demo_handler_registry(&specs, triggers.display_tokens());
    let table = CommandTable::build(&specs, &registry)?;
    info!(
        event_name = "system.bootstrap.command_table_built",
        commands = table.len(),
        "command table compiled"
    );

    let dispatcher = Dispatcher::new(config.bot.admin_user_ids.clone(), triggers.display_tokens())
        .with_verbose_errors(config.bot.verbose_errors);
    dispatcher.update_commands(table);

    let mut engine = BotEngine::new(triggers, dispatcher, Arc::new(NoopTransport));
    if let Some(secs) = config.bot.dedupe_ttl_secs {
        engine = engine
            .with_ledger(DeliveryLedger::with_ttl(ttl_duration(secs), Arc::new(SystemClock)));
    }
    if let Some(secs) = config.bot.form_ttl_secs {
        engine = engine
            .with_form_tracker(FormTracker::with_ttl(ttl_duration(secs), Arc::new(SystemClock)));
    }

    info!(
        event_name = "system.bootstrap.engine_ready",
        bot_user_id = %config.slack.bot_user_id,
        "bot engine assembled"
    );

    Ok(Application { config, engine: Arc::new(engine) })
}

// chrono durations are milliseconds-backed; clamp to the representable range.
fn ttl_duration(secs: u64) -> Duration {
    Duration::seconds(secs.min(i64::MAX as u64 / 1_000) as i64)
}

/// Built-in table exercising the full pipeline; a deployment wires its
/// own specs and registry in place of this.
fn demo_command_specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            pattern: "^(help|shelp)".to_owned(),
            group: "main".to_owned(),
            title: Some("help".to_owned()),
            tags: vec!["main".to_owned()],
            description: "Show every command I answer to".to_owned(),
            flags: vec!["-g <group>".to_owned(), "-t <tag>".to_owned()],
            examples: vec!["help".to_owned(), "shelp -g main".to_owned()],
            response: ResponseSource::Call {
                handler: "help".to_owned(),
                args: vec!["cleaned_text".to_owned()],
            },
        },
        CommandSpec {
            pattern: "^about".to_owned(),
            group: "main".to_owned(),
            title: Some("about".to_owned()),
            tags: vec!["main".to_owned()],
            description: "What this bot is".to_owned(),
            flags: Vec::new(),
            examples: vec!["about".to_owned()],
            response: ResponseSource::Text(
                "I route chat commands to registered handlers. Ask me for `help` to see them."
                    .to_owned(),
            ),
        },
        CommandSpec {
            pattern: "^ping".to_owned(),
            group: "main".to_owned(),
            title: Some("ping".to_owned()),
            tags: vec!["main".to_owned()],
            description: "Liveness check".to_owned(),
            flags: Vec::new(),
            examples: vec!["ping".to_owned()],
            response: ResponseSource::Text("pong, <@{sender_id}>".to_owned()),
        },
    ]
}

fn demo_handler_registry(specs: &[CommandSpec], display_triggers: Vec<String>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    let help_specs = specs.to_vec();
    registry.register("help", move |args: &[String]| {
        let parsed = ParsedCommand::parse(args.first().map(String::as_str).unwrap_or_default());
        let group = parsed.flag_among(&["g", "group"]);
        let tag = parsed.flag_among(&["t", "tag"]);
        let rendered = if group.is_some() || tag.is_some() {
            render_filtered_help(&help_specs, group, tag)
        } else {
            render_help(&help_specs, &display_triggers)
        };
        Ok(Some(ResponseValue::Text(rendered)))
    });

    registry
}
