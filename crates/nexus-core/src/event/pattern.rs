use std::fmt;

use crate::event::error::EventSystemError;

/// Topic pattern used by subscriptions.
///
/// `audio.voice.changed` matches only that topic, `audio.*` matches every
/// topic below `audio.` (but not `audio` itself) and a lone `*` matches
/// everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicPattern {
    Exact(String),
    Prefix(String),
    Any,
}

impl TopicPattern {
    /// Parse a pattern string
    pub fn parse(pattern: &str) -> Result<Self, EventSystemError> {
        let invalid = |reason: &str| EventSystemError::InvalidTopicPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if pattern == "*" {
            return Ok(TopicPattern::Any);
        }
        if let Some(prefix) = pattern.strip_suffix(".*") {
            if prefix.is_empty() || prefix.contains('*') {
                return Err(invalid("wildcard is only allowed as the final segment"));
            }
            // Keep the trailing dot so `audio.*` never matches `audiobook.x`
            return Ok(TopicPattern::Prefix(format!("{}.", prefix)));
        }
        if pattern.contains('*') {
            return Err(invalid("wildcard is only allowed as the final segment"));
        }
        Ok(TopicPattern::Exact(pattern.to_string()))
    }

    /// Check whether a concrete topic matches
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Exact(exact) => exact == topic,
            TopicPattern::Prefix(prefix) => topic.len() > prefix.len() && topic.starts_with(prefix.as_str()),
            TopicPattern::Any => true,
        }
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicPattern::Exact(exact) => write!(f, "{}", exact),
            TopicPattern::Prefix(prefix) => write!(f, "{}*", prefix),
            TopicPattern::Any => write!(f, "*"),
        }
    }
}

impl std::str::FromStr for TopicPattern {
    type Err = EventSystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TopicPattern::parse(s)
    }
}

/// Validate a concrete topic used for publishing
pub fn validate_topic(topic: &str) -> Result<(), EventSystemError> {
    let reason = if topic.is_empty() {
        "topic is empty"
    } else if topic.contains('*') {
        "wildcards are only valid in subscription patterns"
    } else if topic.starts_with('.') || topic.ends_with('.') {
        "topic must not start or end with '.'"
    } else {
        return Ok(());
    };
    Err(EventSystemError::InvalidTopic {
        topic: topic.to_string(),
        reason: reason.to_string(),
    })
}
