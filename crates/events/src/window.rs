//! Events delivered to application windows.

use crate::ChannelChangedEvent;
use serde::{Deserialize, Serialize};
use switchboard_context::Identity;

/// Global event types a window may listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// Any window in the system changed channel.
    ChannelChanged,
}

/// Events scoped to a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelEventType {
    /// A window joined the channel.
    WindowAdded,
    /// A window left the channel.
    WindowRemoved,
}

/// Payload sent to a window's event listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WindowEvent {
    ChannelChanged(ChannelChangedEvent),
    WindowAdded {
        identity: Identity,
        channel: String,
        previous_channel: Option<String>,
    },
    WindowRemoved {
        identity: Identity,
        channel: String,
        /// `None` when the window disconnected rather than moved.
        next_channel: Option<String>,
    },
}

impl WindowEvent {
    /// The channel this event is scoped to, if it is a channel event.
    pub fn channel_scope(&self) -> Option<(&str, ChannelEventType)> {
        match self {
            WindowEvent::ChannelChanged(_) => None,
            WindowEvent::WindowAdded { channel, .. } => {
                Some((channel.as_str(), ChannelEventType::WindowAdded))
            }
            WindowEvent::WindowRemoved { channel, .. } => {
                Some((channel.as_str(), ChannelEventType::WindowRemoved))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            serde_json::to_string(&EventType::ChannelChanged).unwrap(),
            r#""channel-changed""#
        );
        assert_eq!(
            serde_json::to_string(&ChannelEventType::WindowRemoved).unwrap(),
            r#""window-removed""#
        );
    }

    #[test]
    fn test_window_event_tagging() {
        let event = WindowEvent::WindowAdded {
            identity: Identity::new("a", "w").unwrap(),
            channel: "red".to_string(),
            previous_channel: Some("default".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "window-added");
        assert_eq!(json["channel"], "red");
        assert_eq!(
            event.channel_scope(),
            Some(("red", ChannelEventType::WindowAdded))
        );
    }
}
