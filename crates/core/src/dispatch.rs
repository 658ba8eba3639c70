//! First-match-wins command dispatch. The table snapshot is swapped
//! wholesale on update; no lock is held while a handler runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use rand::Rng;

use crate::commands::{
    CommandDescriptor, CommandTable, HandlerFn, ResponseSpec, ResponseValue,
};
use crate::errors::HandlerError;
use crate::events::NormalizedEvent;

pub const DEFAULT_ACCESS_DENIED_REPLY: &str =
    ":ah-ah-ah: You don't have access to that command.";
pub const HANDLER_FAILURE_REPLY: &str = "An error occurred while handling that command.";

struct FallbackHandler {
    handler: HandlerFn,
    args: Vec<String>,
}

/// Routes normalized events against the command table: ordered
/// first-match-wins pattern selection, the admin permission gate,
/// bound-argument substitution and handler-failure containment.
pub struct Dispatcher {
    table: RwLock<Arc<CommandTable>>,
    admin_user_ids: Vec<String>,
    /// Trigger tokens as users type them, for the unrecognized-command hint.
    display_triggers: Vec<String>,
    access_denied_reply: String,
    verbose_errors: bool,
    fallback_handlers: Vec<FallbackHandler>,
    muted_senders: Mutex<HashSet<String>>,
}

impl Dispatcher {
    pub fn new(admin_user_ids: Vec<String>, display_triggers: Vec<String>) -> Self {
        Self {
            table: RwLock::new(Arc::new(CommandTable::empty())),
            admin_user_ids,
            display_triggers,
            access_denied_reply: DEFAULT_ACCESS_DENIED_REPLY.to_owned(),
            verbose_errors: false,
            fallback_handlers: Vec::new(),
            muted_senders: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_access_denied_reply(mut self, reply: impl Into<String>) -> Self {
        self.access_denied_reply = reply.into();
        self
    }

    /// Append handler failure detail to the generic error reply.
    pub fn with_verbose_errors(mut self, verbose: bool) -> Self {
        self.verbose_errors = verbose;
        self
    }

    /// Adds a handler to the pool answering unmatched input. When the
    /// pool is non-empty, one member is chosen uniformly instead of the
    /// unrecognized-command hint, and the raw text is appended to its
    /// arguments.
    pub fn with_fallback_handler<F>(mut self, args: Vec<String>, handler: F) -> Self
    where
        F: Fn(&[String]) -> Result<Option<ResponseValue>, HandlerError> + Send + Sync + 'static,
    {
        self.fallback_handlers.push(FallbackHandler { handler: Arc::new(handler), args });
        self
    }

    /// Replaces the whole command table. In-flight dispatches keep the
    /// snapshot they started with.
    pub fn update_commands(&self, table: CommandTable) {
        let table = Arc::new(table);
        match self.table.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    pub fn command_table(&self) -> Arc<CommandTable> {
        match self.table.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Silences every request from `user_id` until unmuted.
    pub fn mute(&self, user_id: impl Into<String>) {
        self.lock_muted().insert(user_id.into());
    }

    pub fn unmute(&self, user_id: &str) {
        self.lock_muted().remove(user_id);
    }

    pub fn is_muted(&self, user_id: &str) -> bool {
        self.lock_muted().contains(user_id)
    }

    /// Resolves one normalized event to a response value. `None` means
    /// nothing gets sent: muted sender, non-text event, deliberately
    /// empty response, or a silent handler abort.
    pub fn dispatch(&self, event: &NormalizedEvent) -> Option<ResponseValue> {
        let sender = event.sender_id();
        if self.is_muted(sender) {
            tracing::info!(
                event_name = "dispatch.muted_sender",
                user = %sender,
                "ignoring request from muted sender"
            );
            return None;
        }
        let cleaned = event.cleaned_text()?;
        let table = self.command_table();
        tracing::debug!(
            event_name = "dispatch.incoming",
            kind = event.kind_name(),
            user = %sender,
            text = %cleaned,
            "dispatching cleaned text"
        );

        if let Some(descriptor) = table.first_match(cleaned) {
            tracing::debug!(
                event_name = "dispatch.matched",
                pattern = %descriptor.pattern_source(),
                group = %descriptor.group,
                "matched command pattern"
            );
            if descriptor.is_admin() && !self.is_admin(sender) {
                tracing::info!(
                    event_name = "dispatch.permission_denied",
                    user = %sender,
                    pattern = %descriptor.pattern_source(),
                    "blocked sender from privileged command"
                );
                return Some(ResponseValue::Text(self.access_denied_reply.clone()));
            }
            return self.evaluate(descriptor, event);
        }

        if cleaned.is_empty() {
            return None;
        }
        self.unmatched_response(event, cleaned)
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.iter().any(|admin| admin == user_id)
    }

    fn evaluate(
        &self,
        descriptor: &CommandDescriptor,
        event: &NormalizedEvent,
    ) -> Option<ResponseValue> {
        match &descriptor.response {
            ResponseSpec::StaticText(text) => Some(ResponseValue::Text(text.clone())),
            ResponseSpec::StructuredPayload(blocks) => {
                Some(ResponseValue::Blocks(blocks.clone()))
            }
            ResponseSpec::Empty => {
                // Deliberate no-op, distinct from "no pattern matched".
                tracing::debug!(
                    event_name = "dispatch.empty_response",
                    pattern = %descriptor.pattern_source(),
                    "descriptor carries an empty response"
                );
                None
            }
            ResponseSpec::BoundCall { handler, args } => {
                let resolved = substitute_args(args, event, descriptor.pattern_source());
                self.invoke(handler, &resolved, descriptor.pattern_source())
            }
        }
    }

    fn invoke(&self, handler: &HandlerFn, args: &[String], pattern: &str) -> Option<ResponseValue> {
        match handler(args) {
            Ok(response) => response,
            Err(HandlerError::Abort) => {
                tracing::debug!(
                    event_name = "dispatch.handler_abort",
                    pattern = %pattern,
                    "handler returned early"
                );
                None
            }
            Err(HandlerError::Failed { reason }) => {
                tracing::warn!(
                    event_name = "dispatch.handler_failed",
                    pattern = %pattern,
                    error = %reason,
                    "command handler failed"
                );
                let mut reply = HANDLER_FAILURE_REPLY.to_owned();
                if self.verbose_errors {
                    reply.push_str(&format!("\n```{reason}```"));
                }
                Some(ResponseValue::Text(reply))
            }
        }
    }

    fn unmatched_response(&self, event: &NormalizedEvent, cleaned: &str) -> Option<ResponseValue> {
        if !self.fallback_handlers.is_empty() {
            let index = rand::thread_rng().gen_range(0..self.fallback_handlers.len());
            let fallback = &self.fallback_handlers[index];
            let mut args = fallback.args.clone();
            args.push(event.raw_text().unwrap_or(cleaned).to_owned());
            tracing::debug!(
                event_name = "dispatch.fallback",
                index,
                "answering unmatched input with a fallback handler"
            );
            return self.invoke(&fallback.handler, &args, "<fallback>");
        }

        let hints: Vec<String> =
            self.display_triggers.iter().map(|trigger| format!("`{trigger} help`")).collect();
        Some(ResponseValue::Text(format!(
            "I didn't understand this: *`{cleaned}`*\nUse {} to get a list of my commands.",
            hints.join(" or ")
        )))
    }

    fn lock_muted(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.muted_senders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Replaces each bound argument naming a live event attribute with its
/// value; everything else passes through literally. `match_pattern`
/// resolves to the pattern that selected the command.
pub fn substitute_args(args: &[String], event: &NormalizedEvent, pattern: &str) -> Vec<String> {
    args.iter()
        .map(|arg| {
            if arg == "match_pattern" {
                return pattern.to_owned();
            }
            event.attribute(arg).unwrap_or_else(|| arg.clone())
        })
        .collect()
}
