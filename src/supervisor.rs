//! Idle-timeout supervision for sessions.
//!
//! [`TimeoutSupervisor`] wraps a [`Session`] and closes it when the peer goes
//! silent. It sits between the session and the application's
//! [`SessionEvents`], so it sees every routed request and confirmation
//! without the session knowing about it:
//!
//! - `connection_opened` starts the timer
//! - `connection_closed` stops it
//! - every inbound call resets it, including ones answered `NotSupported`,
//!   and so does every reply to our own calls
//!
//! When the timer elapses the session is closed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::Result;
use crate::protocol::ParseError;
use crate::session::{Session, SessionControl, SessionEvents, WeakSession};
use crate::transport::TransportLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerCommand {
    Start,
    Stop,
    Reset,
}

/// A session that is closed after `timeout` without inbound traffic.
pub struct TimeoutSupervisor {
    session: Session,
    timeout: Duration,
}

impl TimeoutSupervisor {
    /// Wrap `session`.
    pub fn new(session: Session, timeout: Duration) -> Self {
        Self { session, timeout }
    }

    /// Idle interval.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl SessionControl for TimeoutSupervisor {
    fn session(&self) -> &Session {
        &self.session
    }

    fn open(&self, link: TransportLink, events: Arc<dyn SessionEvents>) -> Result<()> {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let watch = Arc::new(IdleWatch {
            timer: timer_tx,
            inner: events,
        });

        self.session.open(link, watch)?;
        tokio::spawn(idle_timer(timer_rx, self.timeout, self.session.downgrade()));
        Ok(())
    }

    fn close(&self) {
        self.session.close();
    }
}

/// Wrap `session` in a [`TimeoutSupervisor`] when an idle timeout is set.
pub fn supervise(session: Session, idle_timeout: Option<Duration>) -> Arc<dyn SessionControl> {
    match idle_timeout {
        Some(timeout) => Arc::new(TimeoutSupervisor::new(session, timeout)),
        None => Arc::new(session),
    }
}

/// Session events seen on the way to the application.
struct IdleWatch {
    timer: mpsc::UnboundedSender<TimerCommand>,
    inner: Arc<dyn SessionEvents>,
}

impl IdleWatch {
    fn command(&self, command: TimerCommand) {
        // The timer is gone once it closed the session.
        let _ = self.timer.send(command);
    }
}

impl SessionEvents for IdleWatch {
    fn connection_opened(&self) {
        self.command(TimerCommand::Start);
        self.inner.connection_opened();
    }

    fn connection_closed(&self) {
        self.command(TimerCommand::Stop);
        self.inner.connection_closed();
    }

    fn request_handled(&self, action: &str) {
        self.command(TimerCommand::Reset);
        self.inner.request_handled(action);
    }

    fn confirmation_handled(&self, action: &str) {
        self.command(TimerCommand::Reset);
        self.inner.confirmation_handled(action);
    }

    fn protocol_error(&self, error: &ParseError) {
        self.inner.protocol_error(error);
    }

    fn session_closed(&self) {
        self.inner.session_closed();
    }
}

/// Runs until the session drops its events or the timer fires.
async fn idle_timer(
    mut commands: mpsc::UnboundedReceiver<TimerCommand>,
    timeout: Duration,
    session: WeakSession,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                command = commands.recv() => command,
                _ = tokio::time::sleep_until(at) => {
                    if let Some(session) = session.upgrade() {
                        tracing::warn!(
                            session = %session.id(),
                            timeout_ms = timeout.as_millis() as u64,
                            "peer silent, closing session"
                        );
                        session.close();
                    }
                    return;
                }
            },
            None => commands.recv().await,
        };

        match command {
            None => return,
            Some(TimerCommand::Start) => deadline = Some(Instant::now() + timeout),
            Some(TimerCommand::Reset) => {
                if deadline.is_some() {
                    deadline = Some(Instant::now() + timeout);
                }
            }
            Some(TimerCommand::Stop) => deadline = None,
        }
    }
}
