//! Extraction of echo events from sync responses.

use std::collections::HashMap;

use serde::Deserialize;

use crate::types::{Echo, Latency, Participant, Timestamp};

const MESSAGE_EVENT: &str = "m.room.message";

/// The parts of a `/sync` response the listeners look at.
#[derive(Debug, Default, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    rooms: Rooms,
}

#[derive(Debug, Default, Deserialize)]
struct Rooms {
    #[serde(default)]
    join: HashMap<String, JoinedRoom>,
}

#[derive(Debug, Default, Deserialize)]
struct JoinedRoom {
    #[serde(default)]
    timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
struct Timeline {
    #[serde(default)]
    events: Vec<RoomEvent>,
}

#[derive(Debug, Deserialize)]
struct RoomEvent {
    #[serde(rename = "type")]
    kind: String,
    sender: String,
    event_id: String,
    origin_server_ts: i64,
    #[serde(default)]
    unsigned: Unsigned,
}

#[derive(Debug, Default, Deserialize)]
struct Unsigned {
    /// Milliseconds; servers omit it for some events.
    age: Option<i64>,
}

/// Picks the messages `sender` posted to `room_id` out of one sync batch.
///
/// `received_at` should be taken as soon as the response arrived, so the time
/// spent queueing for the driver does not count as network latency.
pub fn extract_echoes(
    sync: &SyncResponse,
    room_id: &str,
    sender: &str,
    receiver: Participant,
    received_at: Timestamp,
) -> Vec<Echo> {
    let Some(room) = sync.rooms.join.get(room_id) else {
        return Vec::new();
    };

    room.timeline
        .events
        .iter()
        .filter(|event| event.kind == MESSAGE_EVENT && event.sender == sender)
        .map(|event| Echo {
            receiver,
            event_id: event.event_id.clone(),
            received_at,
            origin_ts: Timestamp::from_unix_millis(event.origin_server_ts),
            age: Latency::from_millis(event.unsigned.age.unwrap_or(0)),
        })
        .collect()
}
