//! Free-text input parsing: `-f`/`--flag` extraction and user-mention
//! tags. Standalone capability held by callers that need it, not blanket
//! behavior on every event.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn flag_regex() -> &'static Regex {
    static FLAG: OnceLock<Regex> = OnceLock::new();
    FLAG.get_or_init(|| Regex::new(r"^-+(\w+)").expect("valid flag pattern"))
}

fn flag_split_regex() -> &'static Regex {
    static SPLIT: OnceLock<Regex> = OnceLock::new();
    SPLIT.get_or_init(|| Regex::new(r"-+\w+").expect("valid flag split pattern"))
}

fn user_tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"^<@(.*)>").expect("valid user tag pattern"))
}

/// A command message split into the leading verb text and its flags.
///
/// `"process this -l -u this that --p 1 2"` parses to command
/// `"process this"`, flag `l` empty, flag `u` `"this that"`, flag `p`
/// `"1 2"`. A flag's value runs until the next flag token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: String,
    pub flags: BTreeMap<String, String>,
}

impl ParsedCommand {
    pub fn parse(message: &str) -> Self {
        let command = flag_split_regex()
            .split(message)
            .next()
            .unwrap_or_default()
            .trim()
            .to_owned();

        let parts: Vec<&str> = message.split(' ').collect();
        let mut flags = BTreeMap::new();
        for (i, part) in parts.iter().enumerate() {
            let Some(captures) = flag_regex().captures(part) else {
                continue;
            };
            let values: Vec<&str> = parts[i + 1..]
                .iter()
                .take_while(|candidate| !flag_regex().is_match(candidate))
                .copied()
                .collect();
            flags.insert(captures[1].to_owned(), values.join(" "));
        }

        Self { command, flags }
    }

    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).map(String::as_str)
    }

    /// First flag present out of several spellings, e.g. `["g", "group"]`.
    pub fn flag_among(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.flag(name))
    }
}

/// Extracts the user id from a leading `<@ID>` mention, uppercased to
/// match how the platform stores ids. `None` when the text does not open
/// with a mention.
pub fn parse_user_tag(text: &str) -> Option<String> {
    user_tag_regex().captures(text).map(|captures| captures[1].to_uppercase())
}
