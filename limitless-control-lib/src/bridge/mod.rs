//! Connection to one physical bridge.
//!
//! A [`Bridge`] owns a single UDP socket through a serializer task: every
//! command from every group funnels through one FIFO queue, so frames never
//! interleave and the bridge's notion of the selected zone stays consistent.
//! Version 6 bridges additionally get a keep-alive task that pings the
//! session and drives reconnects.

mod keep_alive;
pub mod observer;
pub(crate) mod session;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use derivative::Derivative;
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::group::Group;
use crate::protocol::{legacy, v6, Command, CommandSet, Generation, LedType, Selection};

pub use observer::{LogObserver, Observer};
use session::{Queued, Request, Session};

/// Timing and addressing of a bridge. Durations deserialize from
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub version: u8,
    /// `None` picks the default port of `version`.
    pub port: Option<u16>,
    /// How many times each command is sent.
    pub reps: u32,
    /// Pause after each repetition of a command.
    #[serde(deserialize_with = "deserialize_duration_millis")]
    pub min_wait: Duration,
    /// Pause after a zone selection frame.
    #[serde(deserialize_with = "deserialize_duration_millis")]
    pub select_wait: Duration,
    /// Per command overhead assumed when planning transitions.
    #[serde(deserialize_with = "deserialize_duration_millis")]
    pub transition_wait: Duration,
    #[serde(deserialize_with = "deserialize_duration_millis")]
    pub keep_alive_interval: Duration,
    #[serde(deserialize_with = "deserialize_duration_millis")]
    pub response_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration_millis")]
    pub handshake_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration_millis")]
    pub reconnect_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            version: 6,
            port: None,
            reps: 3,
            min_wait: Duration::from_millis(100),
            select_wait: Duration::from_millis(25),
            transition_wait: Duration::from_millis(25),
            keep_alive_interval: Duration::from_secs(1),
            response_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(3),
        }
    }
}

impl BridgeConfig {
    pub fn for_version(version: u8) -> Self {
        BridgeConfig {
            version,
            ..Default::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.version {
            6 => v6::PORT,
            version => legacy::port(version),
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_reps(mut self, reps: u32) -> Self {
        self.reps = reps;
        self
    }

    pub fn with_min_wait(mut self, wait: Duration) -> Self {
        self.min_wait = wait;
        self
    }

    pub fn with_select_wait(mut self, wait: Duration) -> Self {
        self.select_wait = wait;
        self
    }

    pub fn with_transition_wait(mut self, wait: Duration) -> Self {
        self.transition_wait = wait;
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Rate used by setters that don't ask for anything specific.
    pub fn default_rate(&self) -> Rate {
        Rate {
            wait: self.min_wait,
            reps: self.reps,
        }
    }
}

fn deserialize_duration_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis: u64 = Deserialize::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Pacing of one command: sent `reps` times with `wait` after each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub wait: Duration,
    pub reps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Handshaking,
    Ready,
    /// The transport failed or the bridge stopped answering. Frames are
    /// dropped until the session recovers.
    Degraded,
    Reconnecting,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Handshaking => "handshaking",
            SessionState::Ready => "ready",
            SessionState::Degraded => "degraded",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Snapshot published by the serializer after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub state: SessionState,
    /// Zone the bridge currently treats as selected.
    pub selected: Option<Selection>,
    /// Sequence byte the next v6 frame will carry.
    pub sequence: u8,
}

impl Default for BridgeStatus {
    fn default() -> Self {
        BridgeStatus {
            state: SessionState::Disconnected,
            selected: None,
            sequence: 0,
        }
    }
}

/// The producer side of a bridge, shared with its groups.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct Link {
    label: String,
    config: BridgeConfig,
    requests: mpsc::UnboundedSender<Request>,
    status: watch::Receiver<BridgeStatus>,
    active: AtomicUsize,
    shutdown: CancellationToken,
    #[derivative(Debug = "ignore")]
    observer: Arc<dyn Observer>,
}

impl Link {
    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub(crate) fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }

    pub(crate) fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Count a running pipeline for as long as the guard lives.
    pub(crate) fn activate(self: &Arc<Self>) -> ActiveGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard(Arc::clone(self))
    }

    /// Queue a command, then hold the caller back long enough for the
    /// serializer to keep up with every active group.
    pub(crate) async fn send(&self, command: Command, rate: Rate) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Closed);
        }
        let reselect = command.requires_selection()
            && self.status.borrow().selected != Some(command.target());
        self.requests
            .send(Request::Transmit(Queued { command, rate }))
            .map_err(|_| Error::Closed)?;

        let mut pause = rate.wait * rate.reps * self.active() as u32;
        if reselect {
            pause += self.config.select_wait;
        }
        if pause.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = self.shutdown.cancelled() => Err(Error::Closed),
            () = tokio::time::sleep(pause) => Ok(()),
        }
    }

    /// Resolves once everything queued before it has been handled.
    pub(crate) async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::Barrier(tx))
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }
}

pub(crate) struct ActiveGuard(Arc<Link>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle to a connected bridge. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

#[derive(Debug)]
struct BridgeInner {
    link: Arc<Link>,
    groups: Mutex<Vec<Group>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        self.link.shutdown.cancel();
    }
}

impl Bridge {
    /// Connect to the bridge at `host`, logging through [`LogObserver`].
    pub async fn connect(host: &str, config: BridgeConfig) -> Result<Bridge> {
        Self::connect_with_observer(host, config, Arc::new(LogObserver)).await
    }

    /// Connect to the bridge at `host`.
    ///
    /// Version 6 bridges get one handshake attempt here. If it fails the
    /// bridge still comes up, in the degraded state, and the keep-alive task
    /// keeps retrying in the background.
    pub async fn connect_with_observer(
        host: &str,
        config: BridgeConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Bridge> {
        let generation = Generation::of(config.version)?;
        let addr = tokio::net::lookup_host((host, config.port()))
            .await?
            .next()
            .ok_or_else(|| Error::InvalidArgument(format!("cannot resolve {host}")))?;
        let socket = session::open_socket(addr).await?;
        let label = addr.to_string();
        info!("Connecting to {} bridge v{} at {}", label, config.version, addr);

        let shutdown = CancellationToken::new();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(BridgeStatus::default());

        let mut session = Session::new(
            label.clone(),
            addr,
            socket,
            config.clone(),
            generation,
            status_tx,
            Arc::clone(&observer),
            shutdown.clone(),
        );
        session.start().await;

        let mut tasks = vec![tokio::spawn(session.run(requests_rx, control_rx))];
        if generation.has_session() {
            tasks.push(tokio::spawn(keep_alive::run(
                label.clone(),
                config.keep_alive_interval,
                control_tx,
                shutdown.clone(),
            )));
        }

        let link = Arc::new(Link {
            label,
            config,
            requests: requests_tx,
            status: status_rx,
            active: AtomicUsize::new(0),
            shutdown,
            observer,
        });
        Ok(Bridge {
            inner: Arc::new(BridgeInner {
                link,
                groups: Mutex::new(Vec::new()),
                tasks: Mutex::new(tasks),
            }),
        })
    }

    /// Address the bridge was connected to.
    pub fn label(&self) -> &str {
        self.inner.link.label()
    }

    pub fn config(&self) -> &BridgeConfig {
        self.inner.link.config()
    }

    pub fn version(&self) -> u8 {
        self.inner.link.config.version
    }

    pub fn status(&self) -> BridgeStatus {
        self.inner.link.status.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.link.status.borrow().state
    }

    /// Follow status changes as they are published.
    pub fn subscribe(&self) -> watch::Receiver<BridgeStatus> {
        self.inner.link.status.clone()
    }

    /// Number of groups currently running a pipeline.
    pub fn active(&self) -> usize {
        self.inner.link.active()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.link.shutdown.is_cancelled()
    }

    /// Add a group on zone `number` of this bridge.
    ///
    /// Fails if the bridge has no command set for `led_type` or the zone is
    /// out of range for it.
    pub fn add_group(&self, number: u8, name: &str, led_type: LedType) -> Result<Group> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let commands = CommandSet::new(self.version(), led_type, number)?;
        let (group, worker) = Group::spawn(name, commands, Arc::clone(&self.inner.link));
        debug!("Added {} group {} on zone {}", led_type, name, number);
        self.inner.groups.lock().push(group.clone());
        self.inner.tasks.lock().push(worker);
        Ok(group)
    }

    pub fn groups(&self) -> Vec<Group> {
        self.inner.groups.lock().clone()
    }

    pub fn group(&self, name: &str) -> Option<Group> {
        self.inner
            .groups
            .lock()
            .iter()
            .find(|g| g.name() == name)
            .cloned()
    }

    /// Resolves once every frame queued so far has been transmitted (or
    /// dropped, if the session is down).
    pub async fn flush(&self) -> Result<()> {
        self.inner.link.flush().await
    }

    /// Wait for every group to go idle and every frame to go out, then close.
    pub async fn finish(&self) -> Result<()> {
        for group in self.groups() {
            group.wait_idle().await?;
        }
        self.flush().await?;
        self.close().await;
        Ok(())
    }

    /// Stop every task of this bridge. Queued frames and running pipelines
    /// are abandoned. Calling it again is a no-op.
    pub async fn close(&self) {
        self.inner.link.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(BridgeConfig::default().port(), 5987);
        assert_eq!(BridgeConfig::for_version(5).port(), 8899);
        assert_eq!(BridgeConfig::for_version(3).port(), 8899);
        assert_eq!(BridgeConfig::for_version(2).port(), 50000);
        assert_eq!(BridgeConfig::for_version(6).with_port(1234).port(), 1234);
    }

    #[test]
    fn test_config_from_json() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"version": 5, "reps": 1, "min_wait": 40}"#).unwrap();
        assert_eq!(config.version, 5);
        assert_eq!(config.reps, 1);
        assert_eq!(config.min_wait, Duration::from_millis(40));
        assert_eq!(config.select_wait, Duration::from_millis(25));
        assert_eq!(config.port(), 8899);
    }

    #[test]
    fn test_default_rate() {
        let rate = BridgeConfig::default().default_rate();
        assert_eq!(rate.reps, 3);
        assert_eq!(rate.wait, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_version() {
        let err = Bridge::connect("127.0.0.1", BridgeConfig::for_version(9))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(9)));
    }

    #[tokio::test]
    async fn test_closed_bridge_rejects_groups() {
        let config = BridgeConfig::for_version(5).with_port(9);
        let bridge = Bridge::connect("127.0.0.1", config).await.unwrap();
        assert_eq!(bridge.state(), SessionState::Ready);
        bridge.close().await;
        bridge.close().await;
        assert!(bridge.is_closed());
        assert!(matches!(
            bridge.add_group(1, "kitchen", LedType::Rgbw),
            Err(Error::Closed)
        ));
    }
}
