use crate::event::pattern::{validate_topic, TopicPattern};
use crate::event::EventSystemError;

#[test]
fn test_exact_pattern() {
    let pattern = TopicPattern::parse("audio.voice.changed").unwrap();
    assert_eq!(pattern, TopicPattern::Exact("audio.voice.changed".to_string()));
    assert!(pattern.matches("audio.voice.changed"));
    assert!(!pattern.matches("audio.voice"));
    assert!(!pattern.matches("audio.voice.changed.now"));
}

#[test]
fn test_prefix_wildcard() {
    let pattern: TopicPattern = "audio.*".parse().unwrap();
    assert!(pattern.matches("audio.voice.changed"));
    assert!(pattern.matches("audio.x"));
    assert!(!pattern.matches("audio"));
    assert!(!pattern.matches("audio."));
    assert!(!pattern.matches("audiobook.opened"));
    assert_eq!(pattern.to_string(), "audio.*");
}

#[test]
fn test_match_everything() {
    let pattern = TopicPattern::parse("*").unwrap();
    assert_eq!(pattern, TopicPattern::Any);
    assert!(pattern.matches("anything"));
    assert!(pattern.matches("a.b.c"));
}

#[test]
fn test_invalid_patterns() {
    for raw in ["", ".*", "a.*.b", "a*", "*.a", "a.b*"] {
        let err = TopicPattern::parse(raw).unwrap_err();
        assert!(
            matches!(err, EventSystemError::InvalidTopicPattern { .. }),
            "{:?} should be rejected",
            raw
        );
    }
}

#[test]
fn test_validate_topic() {
    assert!(validate_topic("plugin.loaded").is_ok());
    assert!(validate_topic("single").is_ok());
    assert!(validate_topic("").is_err());
    assert!(validate_topic("a.*").is_err());
    assert!(validate_topic(".a").is_err());
    assert!(validate_topic("a.").is_err());
}
