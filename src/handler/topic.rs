use std::fmt;

/// Wildcard filter the handler subscribes to for downlink commands.
pub const TX_TOPIC: &str = "application/+/node/+/tx";

const APPLICATION: &str = "application";
const NODE: &str = "node";
const TX: &str = "tx";

/// The kind of outbound document, which selects the last topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Data,
    Join,
    Ack,
    Error,
}

impl TopicKind {
    pub fn suffix(self) -> &'static str {
        match self {
            TopicKind::Data => "rx",
            TopicKind::Join => "join",
            TopicKind::Ack => "ack",
            TopicKind::Error => "error",
        }
    }
}

/// Identity pair addressed by a topic: `application/{app_eui}/node/{dev_eui}/...`.
///
/// Built per call and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAddress {
    pub app_eui: String,
    pub dev_eui: String,
}

impl TopicAddress {
    pub fn new(app_eui: impl fmt::Display, dev_eui: impl fmt::Display) -> Self {
        Self {
            app_eui: app_eui.to_string(),
            dev_eui: dev_eui.to_string(),
        }
    }

    /// Topic an outbound document of `kind` is published on.
    pub fn topic(&self, kind: TopicKind) -> String {
        format!(
            "{APPLICATION}/{}/{NODE}/{}/{}",
            self.app_eui,
            self.dev_eui,
            kind.suffix()
        )
    }

    /// Parse a downlink command topic `application/{app}/node/{dev}/tx`.
    ///
    /// Identity segments must be non-empty runs of ASCII word characters
    /// (`[A-Za-z0-9_]`). Returns `None` for anything else.
    pub fn parse_tx(topic: &str) -> Option<Self> {
        let mut segments = topic.split('/');
        let (Some(APPLICATION), Some(app), Some(NODE), Some(dev), Some(TX), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return None;
        };

        if !is_word(app) || !is_word(dev) {
            return None;
        }

        Some(Self::new(app, dev))
    }
}

fn is_word(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
