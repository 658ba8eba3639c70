use regex::{Regex, RegexBuilder};

/// The bot mention plus any custom text triggers, compiled into one
/// case-insensitive leading-match pattern.
#[derive(Clone, Debug)]
pub struct TriggerSet {
    bot_user_id: String,
    custom_triggers: Vec<String>,
    pattern: Regex,
}

impl TriggerSet {
    pub fn new(
        bot_user_id: impl Into<String>,
        custom_triggers: &[String],
    ) -> Result<Self, regex::Error> {
        let bot_user_id = bot_user_id.into();
        let custom_triggers: Vec<String> = custom_triggers
            .iter()
            .filter(|trigger| !trigger.trim().is_empty())
            .cloned()
            .collect();

        let mention = format!("<@{bot_user_id}>");
        let mut alternatives = vec![regex::escape(&mention)];
        alternatives.extend(custom_triggers.iter().map(|trigger| regex::escape(trigger)));

        let source = format!(r"^({})([\s\S]*)", alternatives.join("|"));
        let pattern = RegexBuilder::new(&source).case_insensitive(true).build()?;

        Ok(Self { bot_user_id, custom_triggers, pattern })
    }

    /// Splits a leading trigger from the remainder of the text. Returns
    /// the remainder trimmed with its original casing and the lower-cased
    /// copy that pattern matching runs on, or `None` when the text does
    /// not start with a trigger.
    pub fn strip(&self, text: &str) -> Option<(String, String)> {
        let captures = self.pattern.captures(text)?;
        let remainder = captures.get(2).map_or("", |m| m.as_str()).trim().to_owned();
        let cleaned = remainder.to_lowercase();
        Some((remainder, cleaned))
    }

    pub fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    /// Trigger tokens as users type them, mention first. Feeds the
    /// unrecognized-command hint.
    pub fn display_tokens(&self) -> Vec<String> {
        let mut tokens = vec![format!("<@{}>", self.bot_user_id)];
        tokens.extend(self.custom_triggers.iter().cloned());
        tokens
    }
}
