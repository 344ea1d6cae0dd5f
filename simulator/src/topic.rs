use crate::model::FrameKind;
use clap::ValueEnum;

pub const TOPIC_PREFIX: &str = "/v2.0/devices/";

/// Matches every device sub-topic published with [`TopicLayout::PerFrame`].
pub const OBSERVE_FILTER: &str = "/v2.0/devices/+/+";

pub const CONTROL_TOPIC: &str = "enable";
pub const CONTROL_PAYLOAD: &str = "ON";

/// Where a device's frames are published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TopicLayout {
    /// All frame kinds on `/v2.0/devices/{device_id}`.
    #[default]
    Single,
    /// One sub-topic per frame kind, `/v2.0/devices/{device_id}/{kind}`.
    PerFrame,
}

impl TopicLayout {
    pub fn topic(&self, device_id: &str, kind: FrameKind) -> String {
        match self {
            TopicLayout::Single => format!("{}{}", TOPIC_PREFIX, device_id),
            TopicLayout::PerFrame => format!("{}{}/{}", TOPIC_PREFIX, device_id, kind.as_str()),
        }
    }
}

/// MQTT topic filter matching: `+` matches one level, `#` the rest.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_layout() {
        let topic = TopicLayout::Single.topic("a16c41bc003e", FrameKind::Status);
        assert_eq!(topic, "/v2.0/devices/a16c41bc003e");
    }

    #[test]
    fn test_per_frame_layout() {
        let layout = TopicLayout::PerFrame;
        assert_eq!(
            layout.topic("a16c41bc003e", FrameKind::Measurements),
            "/v2.0/devices/a16c41bc003e/measurements"
        );
        assert_eq!(
            layout.topic("a16c41bc003e", FrameKind::Info),
            "/v2.0/devices/a16c41bc003e/info"
        );
    }

    #[test]
    fn test_observe_filter_matches_per_frame_topics_only() {
        for kind in FrameKind::all() {
            let topic = TopicLayout::PerFrame.topic("dev-1", *kind);
            assert!(topic_matches(OBSERVE_FILTER, &topic), "{}", topic);
        }
        let single = TopicLayout::Single.topic("dev-1", FrameKind::Info);
        assert!(!topic_matches(OBSERVE_FILTER, &single));
    }

    #[test]
    fn test_wildcards() {
        assert!(topic_matches("/v2.0/devices/#", "/v2.0/devices/dev-1"));
        assert!(topic_matches("/v2.0/devices/#", "/v2.0/devices/dev-1/info"));
        assert!(topic_matches("/v2.0/devices/+", "/v2.0/devices/dev-1"));
        assert!(!topic_matches("/v2.0/devices/+", "/v2.0/devices/dev-1/info"));
        assert!(topic_matches("enable", "enable"));
        assert!(!topic_matches("enable", "enabled"));
    }
}
