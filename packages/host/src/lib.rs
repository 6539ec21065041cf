#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Host UI runtime seams.
//!
//! The extraction client and the presenter run inside a host web client
//! that provides notifications, a navigation/action dispatcher, dialogs,
//! a publish/subscribe bus keyed by channel name, object-URL management,
//! and widget/action registries. These traits decouple the client from
//! any specific host; in-memory implementations are provided for tests
//! and for hosts that keep everything local.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationLevel {
    /// Informational toast.
    Info,
    /// Warning toast.
    Warning,
    /// Danger (error) toast.
    Danger,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity level.
    pub level: NotificationLevel,
    /// Message shown to the user.
    pub message: String,
    /// `true` when the toast stays until dismissed.
    pub sticky: bool,
}

impl Notification {
    /// An informational notification.
    #[must_use]
    pub fn info(message: &str) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.to_owned(),
            sticky: false,
        }
    }

    /// A warning notification.
    #[must_use]
    pub fn warning(message: &str) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.to_owned(),
            sticky: false,
        }
    }

    /// A danger notification.
    #[must_use]
    pub fn danger(message: &str) -> Self {
        Self {
            level: NotificationLevel::Danger,
            message: message.to_owned(),
            sticky: false,
        }
    }
}

/// The host's notification channel.
pub trait Notifier: Send + Sync {
    /// Shows a notification to the user.
    fn notify(&self, notification: Notification);
}

/// The host's navigation/action dispatcher. The payload is an opaque
/// navigation descriptor understood by the host.
pub trait ActionDispatcher: Send + Sync {
    /// Dispatches a navigation action.
    fn do_action(&self, action: Value);
}

/// The host's dialog service.
pub trait DialogService: Send + Sync {
    /// Opens a detail view for a record in a new dialog.
    fn open_record_dialog(&self, model: &str, res_id: i64);
}

/// Callback invoked with the payload of a bus event.
pub type BusCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identity of one bus subscription, used for exact unsubscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// The push bus: channels keyed by name (a job's UUID), events delivered
/// to subscribed callbacks when the channel is open.
pub trait PushBus: Send + Sync {
    /// Opens a channel. Opening an already open channel is a no-op.
    fn add_channel(&self, channel: &str);

    /// Closes a channel. Closing an unknown channel is a no-op.
    fn delete_channel(&self, channel: &str);

    /// Registers a callback for an event and returns its identity.
    fn subscribe(&self, event: &str, callback: BusCallback) -> SubscriptionId;

    /// Removes exactly the callback registered under `id`.
    fn unsubscribe(&self, event: &str, id: SubscriptionId);
}

/// The bytes and MIME type behind an object URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    /// Raw file contents.
    pub bytes: Vec<u8>,
    /// Declared MIME type.
    pub mime: String,
}

/// Object-URL management: hosts hand uploaded files around as URLs whose
/// backing bytes stay owned by the store until revoked.
pub trait ObjectUrlStore: Send + Sync {
    /// Stores a blob and returns its object URL.
    fn create(&self, blob: FileBlob) -> String;

    /// Fetches the blob behind a URL, if it has not been revoked.
    fn resolve(&self, url: &str) -> Option<Arc<FileBlob>>;

    /// Releases the blob. Returns `false` when the URL was already
    /// revoked (or never existed), so callers can assert single release.
    fn revoke(&self, url: &str) -> bool;
}

/// In-memory [`PushBus`] with a publish side for hosts and tests.
#[derive(Default)]
pub struct MemoryBus {
    channels: Mutex<BTreeSet<String>>,
    subscriptions: Mutex<BTreeMap<u64, (String, BusCallback)>>,
    next_id: AtomicU64,
}

impl MemoryBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an event on a channel: every callback subscribed to the
    /// event fires, provided the channel is open.
    pub fn publish(&self, channel: &str, event: &str, payload: &Value) {
        let open = self
            .channels
            .lock()
            .is_ok_and(|channels| channels.contains(channel));
        if !open {
            log::debug!("dropping '{event}' on closed channel '{channel}'");
            return;
        }

        let callbacks: Vec<BusCallback> = match self.subscriptions.lock() {
            Ok(subscriptions) => subscriptions
                .values()
                .filter(|(name, _)| name == event)
                .map(|(_, callback)| Arc::clone(callback))
                .collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(payload);
        }
    }

    /// Number of currently open channels.
    #[must_use]
    pub fn open_channels(&self) -> usize {
        self.channels.lock().map_or(0, |channels| channels.len())
    }

    /// Number of registered callbacks across all events.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().map_or(0, |subs| subs.len())
    }
}

impl PushBus for MemoryBus {
    fn add_channel(&self, channel: &str) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.insert(channel.to_owned());
        }
    }

    fn delete_channel(&self, channel: &str) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.remove(channel);
        }
    }

    fn subscribe(&self, event: &str, callback: BusCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.insert(id, (event.to_owned(), callback));
        }
        SubscriptionId(id)
    }

    fn unsubscribe(&self, event: &str, id: SubscriptionId) {
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            match subscriptions.remove(&id.0) {
                Some((registered, _)) if registered != event => {
                    log::warn!(
                        "unsubscribed id {} from '{event}' but it was registered for '{registered}'",
                        id.0
                    );
                }
                Some(_) => {}
                None => log::debug!("unsubscribe for unknown subscription id {}", id.0),
            }
        }
    }
}

/// In-memory [`ObjectUrlStore`].
#[derive(Default)]
pub struct MemoryObjectUrlStore {
    blobs: Mutex<BTreeMap<String, Arc<FileBlob>>>,
}

impl MemoryObjectUrlStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unrevoked) object URLs.
    #[must_use]
    pub fn live_urls(&self) -> usize {
        self.blobs.lock().map_or(0, |blobs| blobs.len())
    }
}

impl ObjectUrlStore for MemoryObjectUrlStore {
    fn create(&self, blob: FileBlob) -> String {
        let url = format!("blob:{}", uuid::Uuid::new_v4());
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(url.clone(), Arc::new(blob));
        }
        url
    }

    fn resolve(&self, url: &str) -> Option<Arc<FileBlob>> {
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.get(url).map(Arc::clone))
    }

    fn revoke(&self, url: &str) -> bool {
        self.blobs
            .lock()
            .is_ok_and(|mut blobs| blobs.remove(url).is_some())
    }
}

/// A registry keyed by `(category, name)`, mirroring the host's widget
/// and client-action registries.
pub struct Registry<T> {
    items: RwLock<BTreeMap<(String, String), T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Clone> Registry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an item. Re-registering a `(category, name)` pair
    /// replaces the previous item with a warning.
    pub fn add(&self, category: &str, name: &str, item: T) {
        if let Ok(mut items) = self.items.write() {
            let previous = items.insert((category.to_owned(), name.to_owned()), item);
            if previous.is_some() {
                log::warn!("registry entry '{category}/{name}' was replaced");
            }
        }
    }

    /// Looks up an item by category and name.
    #[must_use]
    pub fn get(&self, category: &str, name: &str) -> Option<T> {
        self.items
            .read()
            .ok()
            .and_then(|items| items.get(&(category.to_owned(), name.to_owned())).cloned())
    }

    /// Returns all names registered under a category.
    #[must_use]
    pub fn names(&self, category: &str) -> Vec<String> {
        self.items.read().map_or_else(
            |_| Vec::new(),
            |items| {
                items
                    .keys()
                    .filter(|(cat, _)| cat == category)
                    .map(|(_, name)| name.clone())
                    .collect()
            },
        )
    }
}
