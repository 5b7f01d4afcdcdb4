//! Ping-pong exchange between the two participants.
//!
//! The driver task is the only consumer of both listeners' channels and the
//! only owner of the pending sends and the validity latch, so none of that
//! state is shared. Exactly one probe is in flight at any time: whoever
//! receives the current probe sends the next one after the configured delay.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::correlate::Correlator;
use crate::matrix::Transport;
use crate::types::{Echo, LatencyUpdate, Participant, Timestamp};

/// Settings of one exchange.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub room_id: String,
    pub message_text: String,
    /// Pause between receiving a probe and answering it.
    pub interval: Duration,
    /// Pause before retrying a failed send.
    pub retry_interval: Duration,
}

/// Where the exchange stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    AwaitingEcho { sender: Participant, event_id: String },
}

/// Owns the exchange: who sends next, what is in flight, and where results go.
pub struct Driver<T> {
    one: Arc<T>,
    two: Arc<T>,
    config: DriverConfig,
    correlator: Correlator,
    state: ExchangeState,
    /// `None` when no dashboard is running.
    updates: Option<mpsc::UnboundedSender<LatencyUpdate>>,
}

impl<T: Transport> Driver<T> {
    /// A driver in the [`ExchangeState::Idle`] state. Nothing is sent until
    /// [`Driver::run`] or [`Driver::ping`] is called.
    pub fn new(
        one: Arc<T>,
        two: Arc<T>,
        config: DriverConfig,
        updates: Option<mpsc::UnboundedSender<LatencyUpdate>>,
    ) -> Self {
        Self {
            one,
            two,
            config,
            correlator: Correlator::new(),
            state: ExchangeState::Idle,
            updates,
        }
    }

    fn transport(&self, participant: Participant) -> &T {
        match participant {
            Participant::One => &self.one,
            Participant::Two => &self.two,
        }
    }

    /// Sends the first probe from participant one, then processes echoes until
    /// both listener channels are closed.
    pub async fn run(
        mut self,
        mut one_echoes: mpsc::UnboundedReceiver<Echo>,
        mut two_echoes: mpsc::UnboundedReceiver<Echo>,
    ) {
        self.ping(Participant::One).await;

        loop {
            let echo = tokio::select! {
                Some(echo) = one_echoes.recv() => echo,
                Some(echo) = two_echoes.recv() => echo,
                else => break,
            };
            self.process(echo).await;
        }
    }

    /// Sends one probe, retrying until the transport accepts it.
    pub async fn ping(&mut self, sender: Participant) {
        if let ExchangeState::AwaitingEcho { sender, event_id } = &self.state {
            warn!(?sender, %event_id, "probe still in flight, not sending another");
            return;
        }

        loop {
            let transport = self.transport(sender);
            // Taken before the request so the upload counts towards the total.
            let sent_at = Timestamp::now();
            match transport
                .send_text(&self.config.room_id, &self.config.message_text)
                .await
            {
                Ok(event_id) => {
                    info!(user = transport.user_id(), %event_id, "sent message");
                    self.correlator.record_send(event_id.as_str(), sent_at);
                    debug!(pending = self.correlator.pending_len(), "awaiting echo");
                    self.state = ExchangeState::AwaitingEcho { sender, event_id };
                    return;
                }
                Err(error) => {
                    warn!(user = transport.user_id(), %error, "unable to send message");
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }

    /// Handles one echo; orphans are dropped without touching any state.
    pub async fn process(&mut self, echo: Echo) {
        let Some(record) = self.correlator.record_receive(
            &echo.event_id,
            echo.received_at,
            echo.origin_ts,
            echo.age,
        ) else {
            return;
        };

        self.state = ExchangeState::Idle;

        let breakdown_valid = self.correlator.breakdown_valid();
        info!(
            user = self.transport(echo.receiver).user_id(),
            event_id = %echo.event_id,
            total = %record.total,
            client_server = %record.client_server,
            server_server = %record.server_server,
            server_client = %record.server_client,
            "received message{}",
            if breakdown_valid { "" } else { " (BREAKDOWN INVALID)" },
        );

        if let Some(updates) = &self.updates {
            // The dashboard may already be gone during shutdown.
            let _ = updates.send(LatencyUpdate {
                direction: echo.receiver.inbound(),
                record,
                breakdown_valid,
            });
        }

        tokio::time::sleep(self.config.interval).await;

        self.ping(echo.receiver).await;
    }
}
