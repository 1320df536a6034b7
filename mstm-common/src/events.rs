//! Event types exchanged between MSTM services over the message broker
//!
//! Events are serialized as flat JSON objects. Consumers (recommendation,
//! analytics) bind their own queues to the fanout exchange and decode the
//! same shape.

use serde::{Deserialize, Serialize};

/// Exchange that playback events are published to
pub const SONG_EVENTS_EXCHANGE: &str = "song_events";

/// Queue bound to [`SONG_EVENTS_EXCHANGE`] by the publisher
pub const SONG_EVENTS_QUEUE: &str = "song_events_queue";

/// A listener has consumed a qualifying fraction of a track
///
/// Wire form: `{"user_id": 7, "song_id": 42}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    /// Authenticated listener
    pub user_id: u64,

    /// Track that was played
    #[serde(rename = "song_id")]
    pub media_id: u64,
}

impl PlaybackEvent {
    pub fn new(user_id: u64, media_id: u64) -> Self {
        Self { user_id, media_id }
    }

    /// Serialize to the JSON body published to the broker
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
