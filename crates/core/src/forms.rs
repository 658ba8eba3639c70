//! Multi-step interactive form tracking. A form's UI elements are tagged
//! with a per-form action-id prefix before the UI goes out; each
//! independent callback delivery is attributed back by that prefix and
//! accumulated until the terminal element arrives.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::events::ActionEvent;

/// Action ids ending in this marker complete their form.
pub const TERMINAL_SUFFIX: &str = "-submit";

/// One in-flight multi-step interaction. Lifecycle: created, accumulating
/// field deliveries in any order, complete exactly once, removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionForm {
    pub form_id: String,
    pub owner_user_id: String,
    /// Every UI element belonging to this form carries this prefix.
    pub action_id_prefix: String,
    /// Rewritten action id back to the original element id.
    pub element_ids: BTreeMap<String, String>,
    /// Field values keyed by the original (unprefixed) element id.
    pub collected_fields: BTreeMap<String, String>,
    pub opened_at: DateTime<Utc>,
    pub is_complete: bool,
}

impl InteractionForm {
    fn record_action(&mut self, action_id: &str, value: Option<&str>) {
        if let Some(stripped) = action_id.strip_prefix(self.action_id_prefix.as_str()) {
            let field_id = stripped.strip_prefix('-').unwrap_or(stripped);
            self.collected_fields.insert(field_id.to_owned(), value.unwrap_or_default().to_owned());
        }
        self.is_complete = action_id.ends_with(TERMINAL_SUFFIX);
    }
}

/// Outcome of attributing one action delivery to an open form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormIngest {
    Accumulated { form_id: String },
    /// The terminal element arrived; the tracker has already dropped the
    /// form and hands ownership back to the caller.
    Completed { form: InteractionForm },
}

/// Process-lifetime map of open forms keyed by action-id prefix, guarded
/// for concurrent callback deliveries. Retention is indefinite unless an
/// abandonment TTL is configured.
pub struct FormTracker {
    clock: Arc<dyn Clock>,
    ttl: Option<Duration>,
    forms: Mutex<HashMap<String, InteractionForm>>,
}

impl FormTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock, ttl: None, forms: Mutex::new(HashMap::new()) }
    }

    /// Drops forms that stay incomplete longer than `ttl`.
    pub fn with_ttl(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ttl: Some(ttl), forms: Mutex::new(HashMap::new()) }
    }

    /// Allocates and tracks a fresh form for `owner_user_id`. The caller
    /// tags the form's UI through [`FormTracker::register_elements`]
    /// before sending it out.
    pub fn open_form(&self, owner_user_id: impl Into<String>) -> InteractionForm {
        let owner_user_id = owner_user_id.into();
        let token = Uuid::new_v4().simple().to_string();
        let form_id = format!("{token}-{owner_user_id}");
        let form = InteractionForm {
            action_id_prefix: format!("AF-{form_id}"),
            form_id,
            owner_user_id,
            element_ids: BTreeMap::new(),
            collected_fields: BTreeMap::new(),
            opened_at: self.clock.now(),
            is_complete: false,
        };

        let mut forms = self.lock_forms();
        self.purge_abandoned(&mut forms);
        forms.insert(form.action_id_prefix.clone(), form.clone());
        tracing::debug!(
            event_name = "forms.opened",
            form_id = %form.form_id,
            owner = %form.owner_user_id,
            "opened interaction form"
        );
        form
    }

    /// Rewrites every `action_id` found in `elements` (at any nesting
    /// depth) to `{prefix}-{original}` and records the mapping so later
    /// callbacks can be attributed. False when no open form has that
    /// prefix.
    pub fn register_elements(
        &self,
        action_id_prefix: &str,
        elements: &mut [serde_json::Value],
    ) -> bool {
        let mut forms = self.lock_forms();
        let Some(form) = forms.get_mut(action_id_prefix) else {
            tracing::warn!(
                event_name = "forms.register_unknown_prefix",
                prefix = %action_id_prefix,
                "no open form for element registration"
            );
            return false;
        };
        for element in elements {
            rewrite_action_ids(element, action_id_prefix, &mut form.element_ids);
        }
        true
    }

    /// Attributes one callback delivery to its open form. `None` for ids
    /// matching no open form: late, duplicate and foreign callbacks are
    /// expected under at-least-once delivery and tolerated silently.
    pub fn ingest_action(&self, event: &ActionEvent) -> Option<FormIngest> {
        let mut forms = self.lock_forms();
        self.purge_abandoned(&mut forms);

        let matched_prefix = forms
            .keys()
            .find(|prefix| event.action_id.starts_with(prefix.as_str()))
            .cloned();
        let Some(prefix) = matched_prefix else {
            tracing::debug!(
                event_name = "forms.unmatched_action",
                action_id = %event.action_id,
                "action matches no open form"
            );
            return None;
        };

        let form = forms.get_mut(&prefix)?;
        form.record_action(&event.action_id, event.value.as_deref());
        if form.is_complete {
            // Removed in the same locked step: a resubmission must see
            // "no open form", never a second completion.
            let form = forms.remove(&prefix)?;
            tracing::debug!(
                event_name = "forms.completed",
                form_id = %form.form_id,
                fields = form.collected_fields.len(),
                "interaction form completed"
            );
            Some(FormIngest::Completed { form })
        } else {
            Some(FormIngest::Accumulated { form_id: form.form_id.clone() })
        }
    }

    pub fn open_count(&self) -> usize {
        self.lock_forms().len()
    }

    fn lock_forms(&self) -> std::sync::MutexGuard<'_, HashMap<String, InteractionForm>> {
        match self.forms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn purge_abandoned(&self, forms: &mut HashMap<String, InteractionForm>) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let now = self.clock.now();
        forms.retain(|_, form| now - form.opened_at < ttl);
    }
}

impl Default for FormTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn rewrite_action_ids(
    node: &mut serde_json::Value,
    prefix: &str,
    element_ids: &mut BTreeMap<String, String>,
) {
    match node {
        serde_json::Value::Object(object) => {
            if let Some(serde_json::Value::String(action_id)) = object.get_mut("action_id") {
                let original = action_id.clone();
                *action_id = format!("{prefix}-{original}");
                element_ids.insert(action_id.clone(), original);
            }
            for value in object.values_mut() {
                rewrite_action_ids(value, prefix, element_ids);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                rewrite_action_ids(item, prefix, element_ids);
            }
        }
        _ => {}
    }
}
