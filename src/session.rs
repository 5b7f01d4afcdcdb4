//! Setup, monitoring and teardown of one ping-pong run.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::{Cli, Credentials};
use crate::driver::{Driver, DriverConfig};
use crate::listener::listen;
use crate::matrix::{Account, Connector, Transport};
use crate::types::{LatencyUpdate, Participant};

/// What has been set up so far, so teardown undoes exactly that.
struct Session<A> {
    one: Option<Arc<A>>,
    two: Option<Arc<A>>,
    room_id: Option<String>,
    one_joined: bool,
    two_joined: bool,
    tasks: Vec<JoinHandle<()>>,
}

/// Runs the exchange until `quit` resolves, then leaves the room and logs
/// both users out.
///
/// # Arguments
/// * `connector` - logs both users in
/// * `updates` - the dashboard's channel, `None` in debug mode
/// * `quit` - resolves when the user asks to stop
///
/// # Returns
/// The setup error if there was one, even if teardown failed too; otherwise
/// the first teardown error.
pub async fn run<C: Connector>(
    connector: &C,
    cli: &Cli,
    updates: Option<mpsc::UnboundedSender<LatencyUpdate>>,
    quit: BoxFuture<'static, ()>,
) -> Result<()> {
    let mut session = Session::new();
    let outcome = session.monitor(connector, cli, updates, quit).await;
    let teardown = session.teardown().await;

    match outcome {
        Err(error) => {
            if let Err(teardown_error) = teardown {
                warn!("teardown after failed run: {teardown_error:#}");
            }
            Err(error)
        }
        Ok(()) => teardown,
    }
}

async fn login<C: Connector>(connector: &C, credentials: &Credentials) -> Result<Arc<C::Client>> {
    let client = connector
        .login(credentials)
        .await
        .with_context(|| format!("[{}] unable to log in", credentials.user_id()))?;
    info!(user = client.user_id(), "logged in");
    Ok(Arc::new(client))
}

impl<A: Account> Session<A> {
    fn new() -> Self {
        Self {
            one: None,
            two: None,
            room_id: None,
            one_joined: false,
            two_joined: false,
            tasks: Vec::new(),
        }
    }

    /// Logs in, creates and joins the room, then runs the listeners and the
    /// driver until `quit` resolves.
    async fn monitor<C: Connector<Client = A>>(
        &mut self,
        connector: &C,
        cli: &Cli,
        updates: Option<mpsc::UnboundedSender<LatencyUpdate>>,
        quit: BoxFuture<'static, ()>,
    ) -> Result<()> {
        let one = login(connector, &cli.user_one).await?;
        self.one = Some(one.clone());
        let two = login(connector, &cli.user_two).await?;
        self.two = Some(two.clone());

        let room_id = one
            .create_room()
            .await
            .with_context(|| format!("[{}] unable to create room", one.user_id()))?;
        info!(user = one.user_id(), %room_id, "created room");
        self.room_id = Some(room_id.clone());
        self.one_joined = true;

        two.join_room(&room_id)
            .await
            .with_context(|| format!("[{}] unable to join room {room_id}", two.user_id()))?;
        info!(user = two.user_id(), %room_id, "joined room");
        self.two_joined = true;

        let (one_tx, one_rx) = mpsc::unbounded_channel();
        let (two_tx, two_rx) = mpsc::unbounded_channel();
        self.tasks.push(tokio::spawn(listen(
            one.clone(),
            Participant::One,
            two.user_id().to_string(),
            room_id.clone(),
            cli.retry_interval,
            one_tx,
        )));
        self.tasks.push(tokio::spawn(listen(
            two.clone(),
            Participant::Two,
            one.user_id().to_string(),
            room_id.clone(),
            cli.retry_interval,
            two_tx,
        )));

        let config = DriverConfig {
            room_id,
            message_text: cli.message_text.clone(),
            interval: cli.interval,
            retry_interval: cli.retry_interval,
        };
        let driver = Driver::new(one, two, config, updates);
        self.tasks.push(tokio::spawn(driver.run(one_rx, two_rx)));

        quit.await;
        Ok(())
    }

    /// Stops the background tasks, then leaves and logs out in reverse order
    /// of setup. The first failure aborts the remaining steps.
    async fn teardown(&mut self) -> Result<()> {
        for task in self.tasks.drain(..) {
            task.abort();
        }

        if let Some(room_id) = &self.room_id {
            for (joined, client) in [(self.two_joined, &self.two), (self.one_joined, &self.one)] {
                let Some(client) = client.as_ref().filter(|_| joined) else {
                    continue;
                };
                client.leave_room(room_id).await.with_context(|| {
                    format!("[{}] unable to leave room {room_id}", client.user_id())
                })?;
                info!(user = client.user_id(), %room_id, "left room");
            }
        }
        self.one_joined = false;
        self.two_joined = false;

        for client in [self.two.take(), self.one.take()].into_iter().flatten() {
            client
                .logout()
                .await
                .with_context(|| format!("[{}] unable to log out", client.user_id()))?;
            info!(user = client.user_id(), "logged out");
        }

        Ok(())
    }
}
