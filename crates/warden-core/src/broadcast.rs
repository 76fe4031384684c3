//! Broadcast classification.
//!
//! Game servers push unsolicited lines (logins, chat, admin actions) over the
//! RCON connection. Classification turns one raw line into a typed
//! [`BroadcastEvent`] by matching it against a set of named patterns.
//!
//! Classification is a pure function: the same line and pattern set always
//! produce the same result, and a line that matches nothing is simply `None`.
//! Unrecognized server chatter is normal and never an error.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================================================
// Broadcast Kind
// ============================================================================

/// Type tag of a classified broadcast.
///
/// The derived ordering doubles as evaluation priority: `Join` is tried
/// first, then `Quit`, `Chat`, `ModeratorAction`, and finally any other
/// named pattern in lexical order of its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum BroadcastKind {
    /// A player connected
    Join,
    /// A player disconnected
    Quit,
    /// A player wrote in chat
    Chat,
    /// A server-side moderation action (kick, ban, mute)
    ModeratorAction,
    /// A pattern name this daemon has no special handling for
    Other(String),
}

impl BroadcastKind {
    /// Parses a configured pattern name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "join" => Self::Join,
            "quit" => Self::Quit,
            "chat" => Self::Chat,
            "moderator-action" | "moderator_action" => Self::ModeratorAction,
            other => Self::Other(other.to_string()),
        }
    }

    /// Canonical name, as used in configuration.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Join => "join",
            Self::Quit => "quit",
            Self::Chat => "chat",
            Self::ModeratorAction => "moderator-action",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for BroadcastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for BroadcastKind {
    fn from(s: String) -> Self {
        Self::from_name(&s)
    }
}

impl From<&str> for BroadcastKind {
    fn from(s: &str) -> Self {
        Self::from_name(s)
    }
}

impl From<BroadcastKind> for String {
    fn from(kind: BroadcastKind) -> Self {
        kind.as_str().to_string()
    }
}

// ============================================================================
// Broadcast Event
// ============================================================================

/// A classified broadcast line.
///
/// Transient: produced and consumed within one dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    /// Which pattern matched
    pub kind: BroadcastKind,

    /// Named capture group -> captured text
    pub fields: BTreeMap<String, String>,
}

impl BroadcastEvent {
    /// Returns a captured field by group name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

// ============================================================================
// Pattern Set
// ============================================================================

/// Named broadcast patterns, iterated in priority order.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: BTreeMap<BroadcastKind, Regex>,
}

impl PatternSet {
    /// Creates an empty pattern set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a compiled pattern, replacing any previous pattern of that kind.
    pub fn insert(&mut self, kind: BroadcastKind, pattern: Regex) -> Option<Regex> {
        self.patterns.insert(kind, pattern)
    }

    /// Compiles and adds a pattern (builder style).
    pub fn with(mut self, kind: impl Into<BroadcastKind>, pattern: &str) -> Result<Self, regex::Error> {
        self.patterns.insert(kind.into(), Regex::new(pattern)?);
        Ok(self)
    }

    /// Returns the pattern for a kind.
    pub fn get(&self, kind: &BroadcastKind) -> Option<&Regex> {
        self.patterns.get(kind)
    }

    /// Iterates patterns in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (&BroadcastKind, &Regex)> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Classifies one raw broadcast line.
///
/// Tries each pattern in priority order; the first match wins. Fields are
/// built from the matching pattern's named capture groups. Unnamed groups and
/// named groups that did not participate in the match are left out.
pub fn classify(line: &str, patterns: &PatternSet) -> Option<BroadcastEvent> {
    patterns.iter().find_map(|(kind, regex)| {
        let captures = regex.captures(line)?;
        let fields = regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();

        Some(BroadcastEvent {
            kind: kind.clone(),
            fields,
        })
    })
}

// ============================================================================
// Ignore List
// ============================================================================

/// Patterns for known-noise lines (keep-alive chatter and the like).
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    patterns: Vec<Regex>,
}

impl IgnoreList {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// Returns true if the line should be dropped before classification.
    pub fn is_ignored(&self, line: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(line))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_LINE: &str = "Login: 2021.01.01-00.00.00: Test (52DAB212C79F5EC) logged in";
    const JOIN: &str =
        r"^Login: (?P<date>[0-9\.-]+): (?P<name>.+) \((?P<playfabid>[0-9A-F]+)\) logged in$";
    const QUIT: &str =
        r"^Login: (?P<date>[0-9\.-]+): (?P<name>.+) \((?P<playfabid>[0-9A-F]+)\) logged out$";

    fn join_quit() -> PatternSet {
        PatternSet::new()
            .with("join", JOIN)
            .unwrap()
            .with("quit", QUIT)
            .unwrap()
    }

    #[test]
    fn test_login_line_classifies_as_join() {
        let event = classify(LOGIN_LINE, &join_quit()).expect("should match join");

        assert_eq!(event.kind, BroadcastKind::Join);
        assert_eq!(event.field("date"), Some("2021.01.01-00.00.00"));
        assert_eq!(event.field("name"), Some("Test"));
        assert_eq!(event.field("playfabid"), Some("52DAB212C79F5EC"));
        assert_eq!(event.fields.len(), 3);
    }

    #[test]
    fn test_login_line_against_quit_only_is_no_match() {
        let patterns = PatternSet::new().with("quit", QUIT).unwrap();
        assert!(classify(LOGIN_LINE, &patterns).is_none());
    }

    #[test]
    fn test_classification_is_pure() {
        let patterns = join_quit();
        let first = classify(LOGIN_LINE, &patterns);
        let second = classify(LOGIN_LINE, &patterns);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_pattern_set_never_matches() {
        assert!(classify(LOGIN_LINE, &PatternSet::new()).is_none());
        assert!(classify("", &PatternSet::new()).is_none());
    }

    #[test]
    fn test_unnamed_groups_are_ignored() {
        let patterns = PatternSet::new()
            .with("chat", r"^Chat: (\d+), (?P<name>\w+): (?P<message>.*)$")
            .unwrap();
        let event = classify("Chat: 12, Bob: hello there", &patterns).unwrap();

        assert_eq!(event.kind, BroadcastKind::Chat);
        assert_eq!(event.fields.len(), 2);
        assert_eq!(event.field("message"), Some("hello there"));
    }

    #[test]
    fn test_optional_group_that_did_not_match_is_omitted() {
        let patterns = PatternSet::new()
            .with("moderator-action", r"^Kick: (?P<target>\w+)(?: \((?P<reason>.*)\))?$")
            .unwrap();
        let event = classify("Kick: Bob", &patterns).unwrap();

        assert_eq!(event.kind, BroadcastKind::ModeratorAction);
        assert_eq!(event.field("target"), Some("Bob"));
        assert_eq!(event.field("reason"), None);
    }

    #[test]
    fn test_priority_order_join_before_others() {
        // Both patterns match every line; the fixed priority picks join.
        let patterns = PatternSet::new()
            .with("zzz-custom", r"(?P<all>.*)")
            .unwrap()
            .with("chat", r"(?P<all>.*)")
            .unwrap()
            .with("join", r"(?P<all>.*)")
            .unwrap();

        let event = classify("anything", &patterns).unwrap();
        assert_eq!(event.kind, BroadcastKind::Join);

        let kinds: Vec<&str> = patterns.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(kinds, vec!["join", "chat", "zzz-custom"]);
    }

    #[test]
    fn test_other_patterns_ordered_lexically() {
        let patterns = PatternSet::new()
            .with("vote", r"(?P<a>x)")
            .unwrap()
            .with("match-end", r"(?P<a>x)")
            .unwrap();

        let event = classify("x", &patterns).unwrap();
        assert_eq!(event.kind, BroadcastKind::Other("match-end".to_string()));
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for name in ["join", "quit", "chat", "moderator-action", "custom"] {
            assert_eq!(BroadcastKind::from_name(name).as_str(), name);
        }
        assert_eq!(
            BroadcastKind::from_name("moderator_action"),
            BroadcastKind::ModeratorAction
        );
    }

    #[test]
    fn test_ignore_list() {
        let ignore = IgnoreList::new(vec![Regex::new(r"^Keeping client alive").unwrap()]);

        assert!(ignore.is_ignored("Keeping client alive for another 30 seconds"));
        assert!(!ignore.is_ignored(LOGIN_LINE));
        assert!(!IgnoreList::default().is_ignored("anything"));
    }

    #[test]
    fn test_event_serializes_kind_as_string() {
        let event = classify(LOGIN_LINE, &join_quit()).unwrap();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"join\""));
        assert!(json.contains("\"playfabid\":\"52DAB212C79F5EC\""));
    }
}
