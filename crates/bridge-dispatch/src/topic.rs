//! Parses MQTT topics under the configured prefix into `{area, action,
//! identifier}` triples the dispatcher can route on.
//!
//! Grammar: `P/area/.../action[/identifier]`, where `P` is the
//! configured prefix. The area is always the first segment after the
//! prefix; everything else is handler-specific, so this parser only
//! peels the prefix and area off and hands the remainder to the
//! component as raw segments.

/// A topic split into its routing-relevant pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic<'a> {
    /// First segment after the prefix (`d`, `a`, `console`, `datastore`,
    /// `mailbox`, `file`, `shell`, `system`, …).
    pub area: &'a str,
    /// Every remaining segment, in order, for the component to interpret.
    pub rest: Vec<&'a str>,
}

/// Split `topic` on `/` and strip `prefix`, returning `None` if `topic`
/// doesn't start with `prefix` or has no segments beyond it.
#[must_use]
pub fn parse<'a>(prefix: &str, topic: &'a str) -> Option<ParsedTopic<'a>> {
    let remainder = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    if remainder.is_empty() {
        return None;
    }
    let mut segments = remainder.split('/');
    let area = segments.next()?;
    if area.is_empty() {
        return None;
    }
    let rest: Vec<&str> = segments.filter(|segment| !segment.is_empty()).collect();
    Some(ParsedTopic { area, rest })
}
