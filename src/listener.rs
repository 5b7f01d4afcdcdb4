//! Per-participant sync loops feeding the driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::extract::extract_echoes;
use crate::matrix::Timeline;
use crate::types::{Echo, Participant, Timestamp};

/// Long-polls `receiver`'s sync endpoint forever and forwards every message
/// `sender_id` posts to `room_id`.
///
/// # Arguments
/// * `receiver` - account whose timeline is watched
/// * `participant` - which side `receiver` is, stamped on every echo
/// * `sender_id` - the counterpart; other senders are ignored
/// * `retry_interval` - fixed pause after a failed sync, retried forever
/// * `echoes` - the driver's channel; the loop ends once it is closed
pub async fn listen<T: Timeline>(
    receiver: Arc<T>,
    participant: Participant,
    sender_id: String,
    room_id: String,
    retry_interval: Duration,
    echoes: mpsc::UnboundedSender<Echo>,
) {
    let mut since: Option<String> = None;

    loop {
        match receiver.sync(since.as_deref()).await {
            Ok(sync) => {
                let received_at = Timestamp::now();
                let batch = extract_echoes(&sync, &room_id, &sender_id, participant, received_at);
                debug!(
                    user = receiver.user_id(),
                    next_batch = %sync.next_batch,
                    messages = batch.len(),
                    "synced"
                );
                for echo in batch {
                    if echoes.send(echo).is_err() {
                        return;
                    }
                }
                since = Some(sync.next_batch);
            }
            Err(error) => {
                warn!(user = receiver.user_id(), %error, "unable to sync");
                tokio::time::sleep(retry_interval).await;
            }
        }
    }
}
