//! Context channels.
//!
//! Join and broadcast mutate channel state synchronously and return the
//! deliveries they imply as [`Effect`]s; the broker sends those after the
//! state lock is released. Keeping the state machine free of I/O is what
//! makes a join or broadcast atomic with respect to every other one.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use switchboard_context::{Context, Identity};
use switchboard_events::{ChannelChangedEvent, ChannelEventType, EventType, WindowEvent};

use crate::config::SystemChannelConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::provider::ContextScope;
use crate::registry::{Connection, Registry};

/// Id of the channel every window starts on.
pub const DEFAULT_CHANNEL_ID: &str = "default";

/// What kind of channel this is, and the data only that kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelKind {
    Default,
    System {
        name: String,
        color: String,
        glyph: Option<String>,
    },
    App,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub kind: ChannelKind,
    pub members: BTreeSet<Identity>,
    pub cached_context: Option<Context>,
}

impl Channel {
    fn new(id: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            id: id.into(),
            kind,
            members: BTreeSet::new(),
            cached_context: None,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self.kind, ChannelKind::Default)
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id.clone(),
            kind: self.kind.clone(),
        }
    }

    fn remove_member(&mut self, identity: &Identity) -> bool {
        let removed = self.members.remove(identity);
        if removed && self.members.is_empty() && !self.is_default() {
            self.cached_context = None;
        }
        removed
    }
}

/// Serializable description of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(flatten)]
    pub kind: ChannelKind,
}

/// A delivery to a window implied by a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Context {
        to: Identity,
        scope: ContextScope,
        context: Context,
    },
    Event {
        to: Identity,
        event: WindowEvent,
    },
}

/// Result of a join or a disconnect.
#[derive(Debug, Default)]
pub struct Transition {
    /// `None` when the join was a no-op.
    pub changed: Option<ChannelChangedEvent>,
    pub effects: Vec<Effect>,
}

/// Result of a broadcast.
#[derive(Debug)]
pub struct BroadcastOutcome {
    pub channel: String,
    pub cached: bool,
    pub effects: Vec<Effect>,
}

#[derive(Debug)]
pub struct ChannelEngine {
    channels: BTreeMap<String, Channel>,
    system_order: Vec<String>,
}

impl ChannelEngine {
    pub fn new(system_channels: &[SystemChannelConfig]) -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(
            DEFAULT_CHANNEL_ID.to_string(),
            Channel::new(DEFAULT_CHANNEL_ID, ChannelKind::Default),
        );

        let mut system_order = Vec::with_capacity(system_channels.len());
        for config in system_channels {
            let kind = ChannelKind::System {
                name: config.name.clone(),
                color: config.color.clone(),
                glyph: config.glyph.clone(),
            };
            channels.insert(config.id.clone(), Channel::new(config.id.clone(), kind));
            system_order.push(config.id.clone());
        }

        Self {
            channels,
            system_order,
        }
    }

    pub fn get(&self, id: &str) -> BrokerResult<&Channel> {
        self.channels
            .get(id)
            .ok_or_else(|| BrokerError::ChannelNotFound(id.to_string()))
    }

    fn get_mut(&mut self, id: &str) -> BrokerResult<&mut Channel> {
        self.channels
            .get_mut(id)
            .ok_or_else(|| BrokerError::ChannelNotFound(id.to_string()))
    }

    pub fn system_channels(&self) -> Vec<ChannelInfo> {
        self.system_order
            .iter()
            .filter_map(|id| self.channels.get(id))
            .map(Channel::info)
            .collect()
    }

    /// Fetch an app channel by name, creating it on first use.
    pub fn get_or_create_app_channel(&mut self, name: &str) -> BrokerResult<ChannelInfo> {
        if name.trim().is_empty() {
            return Err(BrokerError::invalid("channel name", "must not be empty"));
        }

        if let Some(existing) = self.channels.get(name) {
            return match existing.kind {
                ChannelKind::App => Ok(existing.info()),
                _ => Err(BrokerError::invalid(
                    "channel name",
                    format!("'{name}' is reserved for a system channel"),
                )),
            };
        }

        tracing::debug!(channel = name, "Creating app channel");
        let channel = Channel::new(name, ChannelKind::App);
        let info = channel.info();
        self.channels.insert(name.to_string(), channel);
        Ok(info)
    }

    pub fn members(&self, id: &str) -> BrokerResult<Vec<Identity>> {
        Ok(self.get(id)?.members.iter().cloned().collect())
    }

    pub fn current_context(&self, id: &str) -> BrokerResult<Option<Context>> {
        Ok(self.get(id)?.cached_context.clone())
    }

    /// Place a freshly registered connection on its initial channel.
    pub fn on_connect(&mut self, registry: &Registry, identity: &Identity) -> BrokerResult<Transition> {
        let channel_id = registry.get(identity)?.channel.clone();
        self.get_mut(&channel_id)?.members.insert(identity.clone());

        let changed = ChannelChangedEvent {
            identity: identity.clone(),
            channel: Some(channel_id.clone()),
            previous_channel: None,
        };
        let mut effects = membership_events(
            registry,
            &channel_id,
            ChannelEventType::WindowAdded,
            WindowEvent::WindowAdded {
                identity: identity.clone(),
                channel: channel_id.clone(),
                previous_channel: None,
            },
        );
        effects.extend(channel_changed_events(registry, &changed));

        Ok(Transition {
            changed: Some(changed),
            effects,
        })
    }

    /// Move a connection to `target`.
    pub fn join(
        &mut self,
        registry: &mut Registry,
        identity: &Identity,
        target: &str,
    ) -> BrokerResult<Transition> {
        let previous = registry.get(identity)?.channel.clone();
        if self.get(target)?.members.contains(identity) {
            return Ok(Transition::default());
        }

        // Leave the previous channel.
        if let Ok(old) = self.get_mut(&previous) {
            old.remove_member(identity);
        }
        let mut effects = membership_events(
            registry,
            &previous,
            ChannelEventType::WindowRemoved,
            WindowEvent::WindowRemoved {
                identity: identity.clone(),
                channel: previous.clone(),
                next_channel: Some(target.to_string()),
            },
        );

        // Enter the new one.
        let channel = self.get_mut(target)?;
        channel.members.insert(identity.clone());
        let cached = channel.cached_context.clone();
        let connection = registry.get_mut(identity)?;
        connection.channel = target.to_string();
        let replay = connection.flat_listener;

        effects.extend(membership_events(
            registry,
            target,
            ChannelEventType::WindowAdded,
            WindowEvent::WindowAdded {
                identity: identity.clone(),
                channel: target.to_string(),
                previous_channel: Some(previous.clone()),
            },
        ));

        let changed = ChannelChangedEvent {
            identity: identity.clone(),
            channel: Some(target.to_string()),
            previous_channel: Some(previous.clone()),
        };
        effects.extend(channel_changed_events(registry, &changed));

        if let (true, Some(context)) = (replay, cached) {
            effects.push(Effect::Context {
                to: identity.clone(),
                scope: ContextScope::Flat,
                context,
            });
        }

        tracing::debug!(
            window = %identity,
            from = %previous,
            to = target,
            "Window changed channel"
        );
        Ok(Transition {
            changed: Some(changed),
            effects,
        })
    }

    /// Remove a departed connection from its channel. The connection must
    /// already be gone from the registry so it receives nothing.
    pub fn on_disconnect(&mut self, registry: &Registry, connection: &Connection) -> Transition {
        let channel_id = connection.channel.clone();
        for channel in self.channels.values_mut() {
            channel.remove_member(&connection.identity);
        }

        let changed = ChannelChangedEvent {
            identity: connection.identity.clone(),
            channel: None,
            previous_channel: Some(channel_id.clone()),
        };
        let mut effects = membership_events(
            registry,
            &channel_id,
            ChannelEventType::WindowRemoved,
            WindowEvent::WindowRemoved {
                identity: connection.identity.clone(),
                channel: channel_id.clone(),
                next_channel: None,
            },
        );
        effects.extend(channel_changed_events(registry, &changed));

        Transition {
            changed: Some(changed),
            effects,
        }
    }

    /// Broadcast `context` from `from` on `channel_id`, or on the sender's
    /// current channel when `None`.
    pub fn broadcast(
        &mut self,
        registry: &Registry,
        from: &Identity,
        channel_id: Option<&str>,
        context: &Context,
    ) -> BrokerResult<BroadcastOutcome> {
        let sender = registry.get(from)?;
        let channel_id = channel_id.unwrap_or(sender.channel.as_str());
        let channel = self.get_mut(channel_id)?;

        let mut effects = Vec::new();
        for member in channel.members.iter().filter(|m| *m != from) {
            let Ok(connection) = registry.get(member) else {
                continue;
            };
            if connection.channel_listeners.contains(channel_id) {
                effects.push(Effect::Context {
                    to: member.clone(),
                    scope: ContextScope::Channel(channel_id.to_string()),
                    context: context.clone(),
                });
            }
            if connection.flat_listener && connection.channel == channel_id {
                effects.push(Effect::Context {
                    to: member.clone(),
                    scope: ContextScope::Flat,
                    context: context.clone(),
                });
            }
        }

        let cached = !channel.is_default() && !channel.members.is_empty();
        if cached {
            channel.cached_context = Some(context.clone());
        }

        Ok(BroadcastOutcome {
            channel: channel_id.to_string(),
            cached,
            effects,
        })
    }
}

fn membership_events(
    registry: &Registry,
    channel: &str,
    kind: ChannelEventType,
    event: WindowEvent,
) -> Vec<Effect> {
    registry
        .channel_event_listeners(channel, kind)
        .into_iter()
        .map(|to| Effect::Event {
            to,
            event: event.clone(),
        })
        .collect()
}

fn channel_changed_events(registry: &Registry, changed: &ChannelChangedEvent) -> Vec<Effect> {
    registry
        .event_listeners(EventType::ChannelChanged)
        .into_iter()
        .map(|to| Effect::Event {
            to,
            event: WindowEvent::ChannelChanged(changed.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn id(uuid: &str) -> Identity {
        Identity::new(uuid, "w").unwrap()
    }

    fn setup(windows: &[&str]) -> (Registry, ChannelEngine) {
        let mut registry = Registry::new(Duration::from_secs(5));
        let mut engine = ChannelEngine::new(&BrokerConfig::default().system_channels);
        for w in windows {
            registry.connect(id(w), None, Instant::now());
            engine.on_connect(&registry, &id(w)).unwrap();
        }
        (registry, engine)
    }

    fn ctx(ty: &str) -> Context {
        Context::new(json!({"type": ty, "name": "n"})).unwrap()
    }

    #[test]
    fn test_default_channel_holds_new_connections() {
        let (_, engine) = setup(&["a", "b"]);
        assert_eq!(engine.members(DEFAULT_CHANNEL_ID).unwrap(), vec![id("a"), id("b")]);
    }

    #[test]
    fn test_join_same_channel_twice_is_noop() {
        let (mut registry, mut engine) = setup(&["a", "b"]);
        registry
            .add_event_listener(&id("b"), EventType::ChannelChanged)
            .unwrap();

        let first = engine.join(&mut registry, &id("a"), "red").unwrap();
        assert!(first.changed.is_some());
        assert_eq!(first.effects.len(), 1, "one channel-changed to b");

        let second = engine.join(&mut registry, &id("a"), "red").unwrap();
        assert!(second.changed.is_none());
        assert!(second.effects.is_empty());
        assert_eq!(engine.members("red").unwrap(), vec![id("a")]);
    }

    #[test]
    fn test_default_never_caches() {
        let (registry, mut engine) = setup(&["a", "b"]);
        let outcome = engine
            .broadcast(&registry, &id("a"), Some(DEFAULT_CHANNEL_ID), &ctx("x"))
            .unwrap();
        assert!(!outcome.cached);
        assert!(engine.current_context(DEFAULT_CHANNEL_ID).unwrap().is_none());
    }

    #[test]
    fn test_cache_cleared_when_last_member_leaves() {
        let (mut registry, mut engine) = setup(&["a"]);
        engine.join(&mut registry, &id("a"), "red").unwrap();
        engine.broadcast(&registry, &id("a"), Some("red"), &ctx("x")).unwrap();
        assert_eq!(engine.current_context("red").unwrap(), Some(ctx("x")));

        engine
            .join(&mut registry, &id("a"), DEFAULT_CHANNEL_ID)
            .unwrap();
        assert!(engine.current_context("red").unwrap().is_none());
    }

    #[test]
    fn test_broadcast_skips_sender_and_honours_listener_kinds() {
        let (mut registry, mut engine) = setup(&["a", "b", "c"]);
        for w in ["a", "b", "c"] {
            engine.join(&mut registry, &id(w), "red").unwrap();
        }
        registry.set_flat_listener(&id("a"), true).unwrap();
        registry.add_channel_listener(&id("a"), "red").unwrap();
        registry.set_flat_listener(&id("b"), true).unwrap();
        registry.add_channel_listener(&id("c"), "red").unwrap();

        let outcome = engine.broadcast(&registry, &id("a"), Some("red"), &ctx("x")).unwrap();
        let targets: Vec<(String, ContextScope)> = outcome
            .effects
            .iter()
            .map(|e| match e {
                Effect::Context { to, scope, .. } => (to.uuid.clone(), scope.clone()),
                other => panic!("unexpected effect {other:?}"),
            })
            .collect();
        assert_eq!(
            targets,
            vec![
                ("b".to_string(), ContextScope::Flat),
                ("c".to_string(), ContextScope::Channel("red".to_string())),
            ]
        );
    }

    #[test]
    fn test_broadcast_without_channel_uses_senders_current_one() {
        let (mut registry, mut engine) = setup(&["a", "b"]);
        engine.join(&mut registry, &id("a"), "red").unwrap();
        engine.join(&mut registry, &id("b"), "red").unwrap();
        engine.join(&mut registry, &id("a"), "blue").unwrap();

        let outcome = engine.broadcast(&registry, &id("a"), None, &ctx("x")).unwrap();
        assert_eq!(outcome.channel, "blue");
        assert!(outcome.effects.is_empty());
        assert_eq!(engine.current_context("blue").unwrap(), Some(ctx("x")));
        assert!(engine.current_context("red").unwrap().is_none());

        assert!(matches!(
            engine.broadcast(&registry, &id("ghost"), None, &ctx("x")),
            Err(BrokerError::ConnectionNotFound(_))
        ));
    }

    #[test]
    fn test_join_replays_cache_to_flat_listener_only() {
        let (mut registry, mut engine) = setup(&["a", "b"]);
        engine.join(&mut registry, &id("a"), "red").unwrap();
        engine.broadcast(&registry, &id("a"), Some("red"), &ctx("x")).unwrap();

        registry.set_flat_listener(&id("b"), true).unwrap();
        registry.add_channel_listener(&id("b"), "red").unwrap();
        let transition = engine.join(&mut registry, &id("b"), "red").unwrap();

        assert_eq!(
            transition.effects,
            vec![Effect::Context {
                to: id("b"),
                scope: ContextScope::Flat,
                context: ctx("x"),
            }]
        );
    }

    #[test]
    fn test_membership_events() {
        let (mut registry, mut engine) = setup(&["a", "watcher"]);
        registry
            .add_channel_event_listener(&id("watcher"), "red", ChannelEventType::WindowAdded)
            .unwrap();
        registry
            .add_channel_event_listener(&id("watcher"), "red", ChannelEventType::WindowRemoved)
            .unwrap();

        let joined = engine.join(&mut registry, &id("a"), "red").unwrap();
        assert!(matches!(
            joined.effects.as_slice(),
            [Effect::Event { event: WindowEvent::WindowAdded { .. }, .. }]
        ));

        let left = engine.join(&mut registry, &id("a"), "blue").unwrap();
        assert!(matches!(
            left.effects.as_slice(),
            [Effect::Event { event: WindowEvent::WindowRemoved { .. }, .. }]
        ));
    }

    #[test]
    fn test_app_channels() {
        let (_, mut engine) = setup(&[]);
        let info = engine.get_or_create_app_channel("trades").unwrap();
        assert_eq!(info.kind, ChannelKind::App);
        assert_eq!(engine.get_or_create_app_channel("trades").unwrap(), info);

        assert!(engine.get_or_create_app_channel("red").is_err());
        assert!(engine.get_or_create_app_channel(DEFAULT_CHANNEL_ID).is_err());
        assert!(engine.get_or_create_app_channel("").is_err());
        assert_eq!(engine.system_channels().len(), 6);
    }

    #[test]
    fn test_unknown_channel() {
        let (mut registry, mut engine) = setup(&["a"]);
        assert!(matches!(
            engine.join(&mut registry, &id("a"), "nope"),
            Err(BrokerError::ChannelNotFound(_))
        ));
        assert_eq!(registry.get(&id("a")).unwrap().channel, DEFAULT_CHANNEL_ID);
    }
}
