//! Connected windows and the apps they belong to.
//!
//! The registry owns every per-window listener registration. Nothing else in
//! the broker keeps listener state, so dropping a [`Connection`] drops all
//! of its registrations at once.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;
use switchboard_context::Identity;
use switchboard_directory::Application;
use switchboard_events::{ChannelEventType, EventType};
use tokio::time::Instant;

use crate::channels::DEFAULT_CHANNEL_ID;
use crate::error::{BrokerError, BrokerResult};

/// One connected window.
#[derive(Debug, Clone)]
pub struct Connection {
    pub identity: Identity,
    /// Directory app id, or the launch uuid for ad-hoc apps.
    pub app_id: String,
    pub app_info: Option<Application>,
    pub connected_at: Instant,
    /// Current channel id.
    pub channel: String,
    /// Top-level context listener present.
    pub flat_listener: bool,
    /// Channels with a channel-scoped context listener.
    pub channel_listeners: BTreeSet<String>,
    pub intent_listeners: BTreeSet<String>,
    pub event_listeners: BTreeSet<EventType>,
    pub channel_event_listeners: BTreeSet<(String, ChannelEventType)>,
}

impl Connection {
    fn new(identity: Identity, app_info: Option<Application>, now: Instant) -> Self {
        let app_id = app_info
            .as_ref()
            .map(|app| app.app_id.clone())
            .unwrap_or_else(|| identity.uuid.clone());
        Self {
            identity,
            app_id,
            app_info,
            connected_at: now,
            channel: DEFAULT_CHANNEL_ID.to_string(),
            flat_listener: false,
            channel_listeners: BTreeSet::new(),
            intent_listeners: BTreeSet::new(),
            event_listeners: BTreeSet::new(),
            channel_event_listeners: BTreeSet::new(),
        }
    }

    pub fn has_intent_listener(&self, intent: &str) -> bool {
        self.intent_listeners.contains(intent)
    }

    /// Mature once strictly more than `maturity` has passed since connect.
    pub fn is_mature(&self, maturity: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.connected_at) > maturity
    }
}

/// Connections sharing an app id.
#[derive(Debug, Clone, Serialize)]
pub struct AppRecord {
    pub app_id: String,
    pub application: Option<Application>,
    pub connections: BTreeSet<Identity>,
}

impl AppRecord {
    pub fn is_ad_hoc(&self) -> bool {
        self.application.is_none()
    }

    /// Display name: directory name, or the app id for ad-hoc apps.
    pub fn name(&self) -> &str {
        self.application
            .as_ref()
            .map(|app| app.name.as_str())
            .unwrap_or(&self.app_id)
    }
}

#[derive(Debug)]
pub struct Registry {
    connections: BTreeMap<Identity, Connection>,
    apps: BTreeMap<String, AppRecord>,
    maturity: Duration,
}

impl Registry {
    pub fn new(maturity: Duration) -> Self {
        Self {
            connections: BTreeMap::new(),
            apps: BTreeMap::new(),
            maturity,
        }
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.connections.contains_key(identity)
    }

    /// Register a new window on the default channel. The identity must not
    /// be connected already.
    pub fn connect(
        &mut self,
        identity: Identity,
        app_info: Option<Application>,
        now: Instant,
    ) -> &Connection {
        let connection = Connection::new(identity.clone(), app_info, now);
        let record = self
            .apps
            .entry(connection.app_id.clone())
            .or_insert_with(|| AppRecord {
                app_id: connection.app_id.clone(),
                application: connection.app_info.clone(),
                connections: BTreeSet::new(),
            });
        if record.application.is_none() {
            record.application = connection.app_info.clone();
        }
        record.connections.insert(identity.clone());

        self.connections.entry(identity).or_insert(connection)
    }

    /// Remove a window, dropping its app when it was the last one.
    pub fn disconnect(&mut self, identity: &Identity) -> BrokerResult<Connection> {
        let connection = self
            .connections
            .remove(identity)
            .ok_or_else(|| BrokerError::ConnectionNotFound(identity.clone()))?;

        if let Some(record) = self.apps.get_mut(&connection.app_id) {
            record.connections.remove(identity);
            if record.connections.is_empty() {
                self.apps.remove(&connection.app_id);
            }
        }
        Ok(connection)
    }

    pub fn get(&self, identity: &Identity) -> BrokerResult<&Connection> {
        self.connections
            .get(identity)
            .ok_or_else(|| BrokerError::ConnectionNotFound(identity.clone()))
    }

    pub(crate) fn get_mut(&mut self, identity: &Identity) -> BrokerResult<&mut Connection> {
        self.connections
            .get_mut(identity)
            .ok_or_else(|| BrokerError::ConnectionNotFound(identity.clone()))
    }

    pub fn get_app(&self, app_id: &str) -> Option<&AppRecord> {
        self.apps.get(app_id)
    }

    pub fn apps(&self) -> impl Iterator<Item = &AppRecord> {
        self.apps.values()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Connections of one app, in identity order.
    pub fn app_connections<'a>(&'a self, app_id: &str) -> Vec<&'a Connection> {
        self.apps
            .get(app_id)
            .map(|record| {
                record
                    .connections
                    .iter()
                    .filter_map(|id| self.connections.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Connections with a live listener for `intent`. Directory declarations
    /// are not considered.
    pub fn connections_for_intent(&self, intent: &str) -> Vec<&Connection> {
        self.connections
            .values()
            .filter(|c| c.has_intent_listener(intent))
            .collect()
    }

    pub fn app_has_intent_listener(&self, app_id: &str, intent: &str) -> bool {
        self.app_connections(app_id)
            .iter()
            .any(|c| c.has_intent_listener(intent))
    }

    pub fn app_has_flat_listener(&self, app_id: &str) -> bool {
        self.app_connections(app_id).iter().any(|c| c.flat_listener)
    }

    pub fn is_mature(&self, identity: &Identity, now: Instant) -> BrokerResult<bool> {
        Ok(self.get(identity)?.is_mature(self.maturity, now))
    }

    /// When the app's earliest connection matures. `None` when the app has
    /// no connections.
    pub fn app_matures_at(&self, app_id: &str) -> Option<Instant> {
        self.app_connections(app_id)
            .iter()
            .map(|c| c.connected_at)
            .min()
            .map(|first| first + self.maturity)
    }

    pub fn is_app_mature(&self, app_id: &str, now: Instant) -> bool {
        self.app_matures_at(app_id)
            .map(|at| now > at)
            .unwrap_or(false)
    }

    pub fn maturity(&self) -> Duration {
        self.maturity
    }

    // --- Listener registrations ---

    /// Returns whether the slot changed.
    pub fn set_flat_listener(&mut self, identity: &Identity, present: bool) -> BrokerResult<bool> {
        let connection = self.get_mut(identity)?;
        let changed = connection.flat_listener != present;
        connection.flat_listener = present;
        Ok(changed)
    }

    pub fn add_channel_listener(&mut self, identity: &Identity, channel: &str) -> BrokerResult<bool> {
        Ok(self
            .get_mut(identity)?
            .channel_listeners
            .insert(channel.to_string()))
    }

    pub fn remove_channel_listener(
        &mut self,
        identity: &Identity,
        channel: &str,
    ) -> BrokerResult<bool> {
        Ok(self.get_mut(identity)?.channel_listeners.remove(channel))
    }

    pub fn add_intent_listener(&mut self, identity: &Identity, intent: &str) -> BrokerResult<bool> {
        Ok(self
            .get_mut(identity)?
            .intent_listeners
            .insert(intent.to_string()))
    }

    pub fn remove_intent_listener(&mut self, identity: &Identity, intent: &str) -> BrokerResult<bool> {
        Ok(self.get_mut(identity)?.intent_listeners.remove(intent))
    }

    pub fn add_event_listener(&mut self, identity: &Identity, event: EventType) -> BrokerResult<bool> {
        Ok(self.get_mut(identity)?.event_listeners.insert(event))
    }

    pub fn remove_event_listener(
        &mut self,
        identity: &Identity,
        event: EventType,
    ) -> BrokerResult<bool> {
        Ok(self.get_mut(identity)?.event_listeners.remove(&event))
    }

    pub fn add_channel_event_listener(
        &mut self,
        identity: &Identity,
        channel: &str,
        event: ChannelEventType,
    ) -> BrokerResult<bool> {
        Ok(self
            .get_mut(identity)?
            .channel_event_listeners
            .insert((channel.to_string(), event)))
    }

    pub fn remove_channel_event_listener(
        &mut self,
        identity: &Identity,
        channel: &str,
        event: ChannelEventType,
    ) -> BrokerResult<bool> {
        Ok(self
            .get_mut(identity)?
            .channel_event_listeners
            .remove(&(channel.to_string(), event)))
    }

    /// Windows listening for a global event.
    pub fn event_listeners(&self, event: EventType) -> Vec<Identity> {
        self.connections
            .values()
            .filter(|c| c.event_listeners.contains(&event))
            .map(|c| c.identity.clone())
            .collect()
    }

    /// Windows listening for a channel event on `channel`.
    pub fn channel_event_listeners(&self, channel: &str, event: ChannelEventType) -> Vec<Identity> {
        let key = (channel.to_string(), event);
        self.connections
            .values()
            .filter(|c| c.channel_event_listeners.contains(&key))
            .map(|c| c.identity.clone())
            .collect()
    }
}
