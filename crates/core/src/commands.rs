use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{CommandTableError, HandlerError};

/// Value produced by a matched command: display text, an opaque block
/// list, or nothing (`Option<ResponseValue>` at the call sites).
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseValue {
    Text(String),
    Blocks(Vec<serde_json::Value>),
}

/// A bound command handler. Receives the positional arguments after
/// event-attribute substitution; may legitimately produce no response.
pub type HandlerFn =
    Arc<dyn Fn(&[String]) -> Result<Option<ResponseValue>, HandlerError> + Send + Sync>;

/// Name-to-closure table consulted once, while a command table is built.
/// Replaces call-time reflection: a spec referencing a name not present
/// here fails the whole build.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[String]) -> Result<Option<ResponseValue>, HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<HandlerFn> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

/// Loader-facing command entry. The loading mechanism is the caller's
/// business; the engine consumes these already built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub pattern: String,
    pub group: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    pub response: ResponseSource,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Text(String),
    Blocks(Vec<serde_json::Value>),
    Call {
        handler: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Empty,
}

/// Compiled response plan with the handler reference resolved.
#[derive(Clone)]
pub enum ResponseSpec {
    StaticText(String),
    StructuredPayload(Vec<serde_json::Value>),
    BoundCall { handler: HandlerFn, args: Vec<String> },
    Empty,
}

impl fmt::Debug for ResponseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaticText(text) => f.debug_tuple("StaticText").field(text).finish(),
            Self::StructuredPayload(blocks) => {
                f.debug_tuple("StructuredPayload").field(&blocks.len()).finish()
            }
            Self::BoundCall { args, .. } => {
                f.debug_struct("BoundCall").field("args", args).finish_non_exhaustive()
            }
            Self::Empty => f.write_str("Empty"),
        }
    }
}

/// One command-table entry, immutable once built. Tables are rebuilt
/// wholesale on update, never mutated in place.
#[derive(Clone, Debug)]
pub struct CommandDescriptor {
    pattern: Regex,
    pattern_source: String,
    pub title: String,
    pub group: String,
    pub tags: BTreeSet<String>,
    pub description: String,
    pub flags: Vec<String>,
    pub examples: Vec<String>,
    pub response: ResponseSpec,
}

impl CommandDescriptor {
    /// Whether the pattern matches at the start of the cleaned text.
    /// Deliberately prefix-anchored rather than full-string: multi-word
    /// commands rely on trailing free text being allowed through.
    pub fn matches(&self, cleaned_text: &str) -> bool {
        self.pattern.find(cleaned_text).is_some_and(|m| m.start() == 0)
    }

    pub fn pattern_source(&self) -> &str {
        &self.pattern_source
    }

    pub fn is_admin(&self) -> bool {
        self.group == ADMIN_GROUP
    }
}

/// Group name gating commands behind the sender allow-list.
pub const ADMIN_GROUP: &str = "admin";

/// Ordered command table. Order is the precedence contract: the first
/// descriptor whose pattern matches wins, so callers place specific
/// patterns before general catch-alls.
#[derive(Clone, Debug, Default)]
pub struct CommandTable {
    commands: Vec<CommandDescriptor>,
}

impl CommandTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compiles every spec and resolves every handler reference, in spec
    /// order. The first bad pattern or unknown handler name fails the
    /// whole build; a table is never partially usable.
    pub fn build(
        specs: &[CommandSpec],
        registry: &HandlerRegistry,
    ) -> Result<Self, CommandTableError> {
        let mut commands = Vec::with_capacity(specs.len());
        for (position, spec) in specs.iter().enumerate() {
            let pattern = Regex::new(&spec.pattern).map_err(|err| {
                CommandTableError::InvalidPattern {
                    position,
                    pattern: spec.pattern.clone(),
                    reason: err.to_string(),
                }
            })?;
            let response = match &spec.response {
                ResponseSource::Text(text) => ResponseSpec::StaticText(text.clone()),
                ResponseSource::Blocks(blocks) => ResponseSpec::StructuredPayload(blocks.clone()),
                ResponseSource::Call { handler, args } => {
                    let resolved = registry.get(handler).ok_or_else(|| {
                        CommandTableError::UnknownHandler {
                            position,
                            pattern: spec.pattern.clone(),
                            handler: handler.clone(),
                        }
                    })?;
                    ResponseSpec::BoundCall { handler: resolved, args: args.clone() }
                }
                ResponseSource::Empty => ResponseSpec::Empty,
            };
            commands.push(CommandDescriptor {
                pattern,
                pattern_source: spec.pattern.clone(),
                title: spec.title.clone().unwrap_or_else(|| spec.pattern.clone()),
                group: spec.group.clone(),
                tags: spec.tags.iter().cloned().collect(),
                description: spec.description.clone(),
                flags: spec.flags.clone(),
                examples: spec.examples.clone(),
                response,
            });
        }
        Ok(Self { commands })
    }

    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// First descriptor whose pattern matches at the start of the text.
    pub fn first_match(&self, cleaned_text: &str) -> Option<&CommandDescriptor> {
        self.commands.iter().find(|descriptor| descriptor.matches(cleaned_text))
    }
}

/// Plain-text command index: every command under its group, with pattern,
/// flags and examples. Block-kit rendering is the caller's concern.
pub fn render_help(specs: &[CommandSpec], display_triggers: &[String]) -> String {
    let mut groups: BTreeMap<&str, Vec<&CommandSpec>> = BTreeMap::new();
    for spec in specs {
        groups.entry(spec.group.as_str()).or_default().push(spec);
    }

    let mut out = String::from("*Commands*\n");
    if let Some(trigger) = display_triggers.first() {
        out.push_str(&format!(
            "Tell me `{trigger} shelp -g <group>` or `{trigger} shelp -t <tag>` to filter.\n"
        ));
    }
    for (group, members) in &groups {
        out.push_str(&format!("\n*Group: {group}*\n"));
        for spec in members {
            out.push_str(&render_command_entry(spec));
        }
    }
    out
}

/// Help text filtered by group or tag, in that precedence. No filter at
/// all answers with usage guidance instead of the full wall of text.
pub fn render_filtered_help(
    specs: &[CommandSpec],
    group: Option<&str>,
    tag: Option<&str>,
) -> String {
    let (selected, filtered_by): (Vec<&CommandSpec>, String) = if let Some(group) = group {
        (specs.iter().filter(|spec| spec.group == group).collect(), format!("group: {group}"))
    } else if let Some(tag) = tag {
        (
            specs.iter().filter(|spec| spec.tags.iter().any(|t| t == tag)).collect(),
            format!("tag: {tag}"),
        )
    } else {
        return "Unable to filter commands without a tag or group. Include `-t <tag-name>` \
                or `-g <group-name>`."
            .to_owned();
    };

    let mut out =
        format!("*`{}/{}`* commands filtered by {filtered_by}\n", selected.len(), specs.len());
    for spec in selected {
        out.push_str(&render_command_entry(spec));
    }
    out
}

fn render_command_entry(spec: &CommandSpec) -> String {
    let title = spec.title.as_deref().unwrap_or(&spec.pattern);
    let mut entry = format!("*{title}*\n_{}_\nMatches on: *`{}`*\n", spec.description, spec.pattern);
    if !spec.flags.is_empty() {
        entry.push_str("Optional flags:\n");
        for flag in &spec.flags {
            entry.push_str(&format!("  -> *`{flag}`*\n"));
        }
    }
    if !spec.examples.is_empty() {
        entry.push_str("Examples:\n");
        for example in &spec.examples {
            entry.push_str(&format!("  -> *`{example}`*\n"));
        }
    }
    entry
}

#[cfg(test)]
mod tests {
    use crate::commands::{
        render_filtered_help, render_help, CommandSpec, CommandTable, HandlerRegistry,
        ResponseSource, ResponseValue,
    };
    use crate::errors::CommandTableError;

    fn spec(pattern: &str, group: &str, response: ResponseSource) -> CommandSpec {
        CommandSpec {
            pattern: pattern.to_owned(),
            group: group.to_owned(),
            title: None,
            tags: Vec::new(),
            description: String::new(),
            flags: Vec::new(),
            examples: Vec::new(),
            response,
        }
    }

    #[test]
    fn build_resolves_handlers_once() {
        let mut registry = HandlerRegistry::new();
        registry.register("echo_back", |args: &[String]| {
            Ok(Some(ResponseValue::Text(args.join(" "))))
        });

        let table = CommandTable::build(
            &[spec(
                "^echo",
                "main",
                ResponseSource::Call { handler: "echo_back".to_owned(), args: Vec::new() },
            )],
            &registry,
        )
        .expect("table builds");

        assert_eq!(table.len(), 1);
        assert!(table.first_match("echo hello").is_some());
    }

    #[test]
    fn build_rejects_unknown_handler_names() {
        let err = CommandTable::build(
            &[spec(
                "^echo",
                "main",
                ResponseSource::Call { handler: "nope".to_owned(), args: Vec::new() },
            )],
            &HandlerRegistry::new(),
        )
        .expect_err("unknown handler must fail the build");

        assert!(matches!(
            err,
            CommandTableError::UnknownHandler { position: 0, ref handler, .. } if handler == "nope"
        ));
    }

    #[test]
    fn build_rejects_invalid_patterns_with_position() {
        let err = CommandTable::build(
            &[
                spec("^fine", "main", ResponseSource::Empty),
                spec("^bro(ken", "main", ResponseSource::Empty),
            ],
            &HandlerRegistry::new(),
        )
        .expect_err("invalid pattern must fail the build");

        assert!(matches!(err, CommandTableError::InvalidPattern { position: 1, .. }));
    }

    #[test]
    fn matching_is_prefix_anchored_not_full_string() {
        let table = CommandTable::build(
            &[spec("^make sticker", "main", ResponseSource::Empty)],
            &HandlerRegistry::new(),
        )
        .expect("table builds");

        // Trailing free text is allowed through.
        assert!(table.first_match("make sticker out of this text").is_some());
        // A mid-string hit is not a match.
        assert!(table.first_match("please make sticker").is_none());
    }

    #[test]
    fn unanchored_patterns_still_match_only_at_the_start() {
        let table = CommandTable::build(
            &[spec("status", "main", ResponseSource::Empty)],
            &HandlerRegistry::new(),
        )
        .expect("table builds");

        assert!(table.first_match("status please").is_some());
        assert!(table.first_match("show status").is_none());
    }

    #[test]
    fn spec_deserializes_with_sparse_fields() {
        let spec: CommandSpec = serde_json::from_value(serde_json::json!({
            "pattern": "^ping",
            "group": "main",
            "response": { "text": "pong" },
        }))
        .expect("sparse spec deserializes");

        assert_eq!(spec.response, ResponseSource::Text("pong".to_owned()));
        assert!(spec.tags.is_empty());
        assert!(spec.title.is_none());
    }

    #[test]
    fn help_lists_commands_under_their_groups() {
        let specs = vec![
            CommandSpec {
                pattern: "^(help|shelp)".to_owned(),
                group: "main".to_owned(),
                title: Some("help".to_owned()),
                tags: vec!["main".to_owned()],
                description: "Show the command menu".to_owned(),
                flags: vec!["-g <group>".to_owned()],
                examples: vec!["shelp -g admin".to_owned()],
                response: ResponseSource::Empty,
            },
            spec("^mute", "admin", ResponseSource::Empty),
        ];

        let help = render_help(&specs, &["<@BOT123>".to_owned()]);
        assert!(help.contains("*Group: main*"));
        assert!(help.contains("*Group: admin*"));
        assert!(help.contains("Matches on: *`^(help|shelp)`*"));
        assert!(help.contains("shelp -g admin"));

        let filtered = render_filtered_help(&specs, Some("admin"), None);
        assert!(filtered.contains("`1/2`"));
        assert!(!filtered.contains("^(help|shelp)"));

        let unfiltered = render_filtered_help(&specs, None, None);
        assert!(unfiltered.contains("without a tag or group"));
    }
}
