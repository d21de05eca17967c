//! Processed-state store shared by the consumers and the API

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Snapshot of the last message seen in each category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedState {
    #[serde(rename = "lastMessageReceived")]
    pub last_received: Option<Message>,
    #[serde(rename = "lastMessageDeadLetter")]
    pub last_dead_lettered: Option<Message>,
}

/// Thread-safe holder of the [`ProcessedState`].
///
/// Every setter overwrites its field inside a single write-lock section, so
/// readers always observe a whole snapshot.
#[derive(Debug, Default)]
pub struct ProcessedStateStore {
    state: RwLock<ProcessedState>,
}

impl ProcessedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of the current state
    pub fn get(&self) -> ProcessedState {
        self.state.read().clone()
    }

    pub fn set_last_received(&self, message: Message) {
        self.state.write().last_received = Some(message);
    }

    pub fn set_last_dead_lettered(&self, message: Message) {
        self.state.write().last_dead_lettered = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use std::thread;

    fn message_at(offset_secs: i64, to_dead_letter: bool) -> Message {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Message::new(base + Duration::seconds(offset_secs), to_dead_letter)
    }

    #[test]
    fn test_starts_empty() {
        let store = ProcessedStateStore::new();
        assert_eq!(store.get(), ProcessedState::default());
    }

    #[test]
    fn test_setters_are_independent() {
        let store = ProcessedStateStore::new();

        store.set_last_received(message_at(1, false));
        store.set_last_dead_lettered(message_at(2, true));
        store.set_last_received(message_at(3, false));

        let state = store.get();
        assert_eq!(state.last_received, Some(message_at(3, false)));
        assert_eq!(state.last_dead_lettered, Some(message_at(2, true)));
    }

    #[test]
    fn test_repeated_update_is_idempotent() {
        let store = ProcessedStateStore::new();
        let message = message_at(7, false);

        store.set_last_received(message.clone());
        let once = store.get();
        store.set_last_received(message);

        assert_eq!(store.get(), once);
    }

    #[test]
    fn test_concurrent_setters_and_readers() {
        const WRITES: i64 = 2_000;

        let store = Arc::new(ProcessedStateStore::new());

        let received = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..WRITES {
                    store.set_last_received(message_at(i, false));
                }
            })
        };
        let dead_lettered = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..WRITES {
                    store.set_last_dead_lettered(message_at(i, true));
                }
            })
        };
        let reader = {
            let store = store.clone();
            thread::spawn(move || {
                let mut last_seen = (-1, -1);
                for _ in 0..WRITES {
                    let state = store.get();
                    // Each field only moves forward and keeps its category.
                    if let Some(m) = &state.last_received {
                        assert!(!m.to_dead_letter);
                        let secs = m.published_at.timestamp();
                        assert!(secs >= last_seen.0);
                        last_seen.0 = secs;
                    }
                    if let Some(m) = &state.last_dead_lettered {
                        assert!(m.to_dead_letter);
                        let secs = m.published_at.timestamp();
                        assert!(secs >= last_seen.1);
                        last_seen.1 = secs;
                    }
                }
            })
        };

        received.join().unwrap();
        dead_lettered.join().unwrap();
        reader.join().unwrap();

        let state = store.get();
        assert_eq!(state.last_received, Some(message_at(WRITES - 1, false)));
        assert_eq!(state.last_dead_lettered, Some(message_at(WRITES - 1, true)));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let store = ProcessedStateStore::new();
        store.set_last_received(message_at(0, false));

        let json = serde_json::to_value(store.get()).unwrap();
        assert_eq!(json["lastMessageReceived"]["toDeadLetter"], false);
        assert!(json["lastMessageDeadLetter"].is_null());
    }
}
