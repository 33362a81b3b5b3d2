//! The serializer task: sole owner of the bridge socket.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{BridgeConfig, BridgeStatus, Observer, Rate, SessionState};
use crate::error::{Error, Result};
use crate::protocol::{v6, Command, FrameContext, Generation, SessionId};

pub(crate) struct Queued {
    pub(crate) command: Command,
    pub(crate) rate: Rate,
}

pub(crate) enum Request {
    Transmit(Queued),
    Barrier(oneshot::Sender<()>),
}

/// Sent by the keep-alive task.
pub(crate) enum Control {
    /// Ping the bridge; answers whether it replied in time.
    Ping(oneshot::Sender<bool>),
    /// Re-establish the session; answered once the bridge is ready again.
    Reconnect(oneshot::Sender<()>),
}

/// Sequence byte carried by v6 frames, wrapping at 256.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SequenceNumber(u8);

impl SequenceNumber {
    pub(crate) fn current(&self) -> u8 {
        self.0
    }

    pub(crate) fn advance(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

pub(crate) async fn open_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let local: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

/// Open a v6 session and return the bridge's session bytes.
pub(crate) async fn handshake(socket: &UdpSocket, timeout: Duration) -> Result<SessionId> {
    socket.send(&v6::SESSION_REQUEST).await?;
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 64];
    loop {
        let len = match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
            Ok(received) => received?,
            Err(_) => return Err(Error::SessionTimeout(timeout)),
        };
        match v6::parse_session_response(&buf[..len]) {
            Some(session_id) => return Ok(session_id),
            None => trace!("Ignoring {} during handshake", hex::encode(&buf[..len])),
        }
    }
}

enum Event {
    Shutdown,
    Control(Control),
    Received(io::Result<usize>),
    PingExpired,
    Retry,
    Request(Request),
}

pub(crate) struct Session {
    label: String,
    addr: SocketAddr,
    socket: UdpSocket,
    config: BridgeConfig,
    generation: Generation,
    status: watch::Sender<BridgeStatus>,
    observer: Arc<dyn Observer>,
    shutdown: CancellationToken,
    session_id: SessionId,
    sequence: SequenceNumber,
    pending_ping: Option<(Instant, oneshot::Sender<bool>)>,
    retry_at: Option<Instant>,
    reconnect_waiters: Vec<oneshot::Sender<()>>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        label: String,
        addr: SocketAddr,
        socket: UdpSocket,
        config: BridgeConfig,
        generation: Generation,
        status: watch::Sender<BridgeStatus>,
        observer: Arc<dyn Observer>,
        shutdown: CancellationToken,
    ) -> Self {
        Session {
            label,
            addr,
            socket,
            config,
            generation,
            status,
            observer,
            shutdown,
            session_id: SessionId::default(),
            sequence: SequenceNumber::default(),
            pending_ping: None,
            retry_at: None,
            reconnect_waiters: Vec::new(),
        }
    }

    fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    fn set_state(&self, state: SessionState) {
        let changed = self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            status.state = state;
            if state != SessionState::Ready {
                status.selected = None;
            }
            true
        });
        if changed {
            self.observer.state_changed(&self.label, state);
        }
    }

    /// Bring the session up for the first time.
    pub(crate) async fn start(&mut self) {
        if !self.generation.has_session() {
            self.set_state(SessionState::Ready);
            return;
        }
        self.set_state(SessionState::Handshaking);
        match handshake(&self.socket, self.config.handshake_timeout).await {
            Ok(session_id) => {
                debug!("Session with {} opened: {:?}", self.label, session_id);
                self.session_id = session_id;
                self.set_state(SessionState::Ready);
            }
            Err(err) => {
                warn!("Handshake with {} failed: {}", self.label, err);
                self.set_state(SessionState::Degraded);
            }
        }
    }

    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) {
        let mut buf = [0u8; 64];
        loop {
            let ping_deadline = self.pending_ping.as_ref().map(|(deadline, _)| *deadline);
            let event = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => Event::Shutdown,
                Some(message) = control.recv() => Event::Control(message),
                received = self.socket.recv(&mut buf) => Event::Received(received),
                () = expiry(ping_deadline) => Event::PingExpired,
                () = expiry(self.retry_at) => Event::Retry,
                request = requests.recv() => match request {
                    Some(request) => Event::Request(request),
                    None => Event::Shutdown,
                },
            };

            match event {
                Event::Shutdown => break,
                Event::Control(Control::Ping(reply)) => self.ping(reply).await,
                Event::Control(Control::Reconnect(reply)) => {
                    self.reconnect_waiters.push(reply);
                    if self.state() == SessionState::Ready {
                        self.resolve_reconnect();
                    } else if self.state() != SessionState::Reconnecting {
                        self.set_state(SessionState::Reconnecting);
                        self.retry().await;
                    }
                }
                Event::Received(Ok(len)) => self.receive(&buf[..len]),
                Event::Received(Err(err)) => {
                    // Connected UDP sockets report ICMP errors here; the
                    // keep-alive notices a dead bridge on its own.
                    trace!("Receive from {} failed: {}", self.label, err);
                }
                Event::PingExpired => {
                    if let Some((_, reply)) = self.pending_ping.take() {
                        warn!(
                            "Bridge {} did not answer keep-alive: {}",
                            self.label,
                            Error::SessionTimeout(self.config.response_timeout)
                        );
                        self.set_state(SessionState::Degraded);
                        let _ = reply.send(false);
                    }
                }
                Event::Retry => self.retry().await,
                Event::Request(Request::Transmit(queued)) => self.transmit(queued).await,
                Event::Request(Request::Barrier(reply)) => {
                    let _ = reply.send(());
                }
            }
        }
        self.set_state(SessionState::Closed);
        debug!("Serializer for {} stopped", self.label);
    }

    async fn transmit(&mut self, queued: Queued) {
        let Queued { command, rate } = queued;
        if self.state() != SessionState::Ready {
            debug!(
                "Dropping command for zone {}, bridge {} is {}",
                command.zone(),
                self.label,
                self.state()
            );
            return;
        }

        let target = command.target();
        if let Some(select) = command.selection() {
            if self.status.borrow().selected != Some(target) {
                if self.send_frame(select).await.is_err() {
                    return;
                }
                if !self.pause(self.config.select_wait).await {
                    return;
                }
            }
        }
        for _ in 0..rate.reps {
            if self.send_frame(&command).await.is_err() {
                return;
            }
            if !self.pause(rate.wait).await {
                return;
            }
        }
        self.status.send_modify(|status| status.selected = Some(target));
    }

    async fn send_frame(&mut self, command: &Command) -> Result<()> {
        let ctx = FrameContext {
            version: self.config.version,
            session_id: self.session_id,
            sequence: self.sequence.current(),
        };
        let frame = command.to_bytes(&ctx);
        match self.socket.send(&frame).await {
            Ok(_) => {
                self.observer.frame_sent(&self.label, &frame);
                self.sequence.advance();
                let sequence = self.sequence.current();
                self.status.send_modify(|status| status.sequence = sequence);
                Ok(())
            }
            Err(err) => {
                warn!("Sending to {} failed: {}", self.label, err);
                self.degrade();
                Err(err.into())
            }
        }
    }

    /// Mark the transport as failed. Legacy bridges have no keep-alive, so
    /// they schedule their own recovery.
    fn degrade(&mut self) {
        self.set_state(SessionState::Degraded);
        if !self.generation.has_session() && self.retry_at.is_none() {
            self.retry_at = Some(Instant::now() + self.config.reconnect_interval);
        }
    }

    /// Sleep unless shut down first. Returns false on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.shutdown.is_cancelled();
        }
        tokio::select! {
            () = self.shutdown.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    async fn ping(&mut self, reply: oneshot::Sender<bool>) {
        if self.state() != SessionState::Ready {
            let _ = reply.send(false);
            return;
        }
        let frame = v6::keep_alive_frame(self.session_id);
        match self.socket.send(&frame).await {
            Ok(_) => {
                trace!("Keep-alive to {}", self.label);
                let deadline = Instant::now() + self.config.response_timeout;
                self.pending_ping = Some((deadline, reply));
            }
            Err(err) => {
                warn!("Keep-alive to {} failed: {}", self.label, err);
                self.degrade();
                let _ = reply.send(false);
            }
        }
    }

    fn receive(&mut self, data: &[u8]) {
        if !self.generation.has_session() {
            return;
        }
        if v6::is_keep_alive_response(data) {
            if let Some((_, reply)) = self.pending_ping.take() {
                let _ = reply.send(true);
            }
        } else if self.state() == SessionState::Reconnecting {
            if let Some(session_id) = v6::parse_session_response(data) {
                debug!("Session with {} reopened: {:?}", self.label, session_id);
                self.session_id = session_id;
                self.retry_at = None;
                self.set_state(SessionState::Ready);
                self.resolve_reconnect();
            }
        } else {
            trace!("Ignoring {} from {}", hex::encode(data), self.label);
        }
    }

    /// One recovery attempt: fresh socket, and for v6 a new handshake request
    /// whose answer arrives through the receive path.
    async fn retry(&mut self) {
        self.retry_at = Some(Instant::now() + self.config.reconnect_interval);
        self.pending_ping = None;
        match open_socket(self.addr).await {
            Ok(socket) => self.socket = socket,
            Err(err) => {
                warn!("Reopening socket to {} failed: {}", self.label, err);
                return;
            }
        }
        if !self.generation.has_session() {
            self.retry_at = None;
            self.set_state(SessionState::Ready);
            return;
        }
        debug!("Requesting new session from {}", self.label);
        if let Err(err) = self.socket.send(&v6::SESSION_REQUEST).await {
            warn!("Handshake with {} failed: {}", self.label, err);
        }
    }

    fn resolve_reconnect(&mut self) {
        for waiter in self.reconnect_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
