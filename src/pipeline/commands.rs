//! Operator command interpreter.
//!
//! Only the configured operator may issue commands. Recognized forms
//! (case-insensitive, optional leading `/`, Hebrew aliases accepted):
//!
//! - `pause <number>`  / `השהה`, `עצור`
//! - `resume <number>` / `המשך`, `חדש`
//! - `status`          / `סטטוס`, `מצב`
//!
//! Anything else yields `None` and is handled as an ordinary message.

use std::sync::LazyLock;

use regex::Regex;

use crate::conversation::SenderId;

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*/?(?P<verb>\S+)(?:\s+(?P<target>\S.*?))?\s*$").expect("valid command regex")
});

/// Characters allowed in a command target (phone number with formatting or a chat id).
static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9][0-9 \-]*(@c\.us|@s\.whatsapp\.net)?$").expect("valid target regex")
});

/// A recognized operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pause(SenderId),
    Resume(SenderId),
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Pause,
    Resume,
    Status,
}

fn verb(word: &str) -> Option<Verb> {
    match word.to_lowercase().as_str() {
        "pause" | "stop" | "השהה" | "עצור" => Some(Verb::Pause),
        "resume" | "start" | "המשך" | "חדש" => Some(Verb::Resume),
        "status" | "סטטוס" | "מצב" => Some(Verb::Status),
        _ => None,
    }
}

fn target(raw: &str) -> Option<SenderId> {
    let raw = raw.trim();
    if !TARGET_RE.is_match(raw) {
        return None;
    }
    SenderId::parse(raw)
}

/// Interpret a message as an operator command.
///
/// Returns `None` when the sender is not the operator, no operator is
/// configured, or the text is not a well-formed command.
pub fn interpret(sender: &SenderId, text: &str, operator: Option<&SenderId>) -> Option<Command> {
    if operator != Some(sender) {
        return None;
    }

    let caps = COMMAND_RE.captures(text)?;
    let verb = verb(caps.name("verb")?.as_str())?;
    let target_text = caps.name("target").map(|m| m.as_str());

    match (verb, target_text) {
        (Verb::Status, None) => Some(Command::Status),
        (Verb::Pause, Some(t)) => target(t).map(Command::Pause),
        (Verb::Resume, Some(t)) => target(t).map(Command::Resume),
        _ => None,
    }
}
