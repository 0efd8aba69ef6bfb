//! # Browser backends — `localStorage` slot and `BroadcastChannel` bus
//!
//! [`LocalStorageSlot`] is the [`DurableSlot`] used on the **web platform**. It
//! reads and writes `window.localStorage`, which is synchronous, per-origin,
//! shared by every tab, and capped at a few megabytes.
//!
//! [`BroadcastBus`] is the matching [`ChangeChannel`]. Each tab opens a
//! `BroadcastChannel` under the configured name; a message posted by one tab
//! reaches every other tab's instance but not its own.
//!
//! ## Error handling
//!
//! | Browser failure | Mapped to |
//! |-----------------|-----------|
//! | no `window` / storage disabled (private mode, sandboxed iframe) | [`StoreError::Unavailable`] |
//! | `QuotaExceededError` on `setItem` | [`StoreError::Capacity`] |
//! | message that is not a JSON `{key, newValue}` string | [`StoreError::MalformedNotification`], logged and dropped |

use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{BroadcastChannel, DomException, MessageEvent, Storage};

use crate::error::StoreError;
use crate::notify::{ChangeChannel, ChangeNotice, Listener, Subscription};
use crate::slot::DurableSlot;

const QUOTA_EXCEEDED: &str = "QuotaExceededError";

/// `window.localStorage`-backed DurableSlot for the web platform.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalStorageSlot;

impl LocalStorageSlot {
    pub fn new() -> Self {
        Self
    }

    fn storage(&self) -> Result<Storage, StoreError> {
        let window =
            web_sys::window().ok_or_else(|| StoreError::Unavailable("no window".to_string()))?;
        window
            .local_storage()
            .map_err(|e| StoreError::Unavailable(format!("{e:?}")))?
            .ok_or_else(|| StoreError::Unavailable("localStorage disabled".to_string()))
    }
}

impl DurableSlot for LocalStorageSlot {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage()?
            .get_item(key)
            .map_err(|e| StoreError::Unavailable(format!("{e:?}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage()?.set_item(key, value).map_err(|e| {
            let quota = e
                .dyn_ref::<DomException>()
                .is_some_and(|ex| ex.name() == QUOTA_EXCEEDED);
            if quota {
                StoreError::Capacity {
                    key: key.to_string(),
                    needed: key.len() + value.len(),
                    available: 0,
                }
            } else {
                StoreError::Unavailable(format!("{e:?}"))
            }
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.storage()?
            .remove_item(key)
            .map_err(|e| StoreError::Unavailable(format!("{e:?}")))
    }
}

/// `BroadcastChannel`-backed ChangeChannel for the web platform.
#[derive(Clone, Debug)]
pub struct BroadcastBus {
    channel: BroadcastChannel,
}

impl BroadcastBus {
    /// Join the channel `name` (see [`crate::config::SyncConfig::channel_name`]).
    pub fn open(name: &str) -> Result<Self, StoreError> {
        let channel =
            BroadcastChannel::new(name).map_err(|e| StoreError::Unavailable(format!("{e:?}")))?;
        Ok(Self { channel })
    }
}

impl ChangeChannel for BroadcastBus {
    fn publish(&self, notice: &ChangeNotice) {
        let payload = match serde_json::to_string(notice) {
            Ok(payload) => payload,
            Err(source) => {
                let error = StoreError::serialization(&notice.key, source);
                tracing::warn!(%error, "failed to encode change notice");
                return;
            }
        };
        if let Err(e) = self.channel.post_message(&JsValue::from_str(&payload)) {
            tracing::warn!(key = %notice.key, error = ?e, "failed to broadcast change notice");
        }
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let Some(text) = event.data().as_string() else {
                tracing::warn!("ignoring non-text change notice");
                return;
            };
            match serde_json::from_str::<ChangeNotice>(&text) {
                Ok(notice) => listener(&notice),
                Err(e) => {
                    let error = StoreError::malformed("<unknown>", e);
                    tracing::warn!(%error, "ignoring change notice");
                }
            }
        });

        if let Err(e) = self
            .channel
            .add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())
        {
            tracing::warn!(error = ?e, "failed to listen for change notices");
        }

        let channel = self.channel.clone();
        Subscription::new(move || {
            let _ = channel
                .remove_event_listener_with_callback("message", on_message.as_ref().unchecked_ref());
        })
    }
}
