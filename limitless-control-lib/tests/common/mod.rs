use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use limitless_control_lib::bridge::{Bridge, BridgeConfig, Observer, SessionState};
use limitless_control_lib::protocol::{v6, SessionId};
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[allow(dead_code)]
pub const SESSION: SessionId = SessionId(0xAB, 0xCD);

/// A bridge on the loopback interface. Session requests and keep-alives are
/// answered (while the matching switch is on); everything else is handed to
/// the test.
pub struct FakeBridge {
    port: u16,
    answer_handshake: Arc<AtomicBool>,
    answer_pings: Arc<AtomicBool>,
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    task: JoinHandle<()>,
}

impl FakeBridge {
    pub async fn start() -> FakeBridge {
        let _ = env_logger::builder().is_test(true).try_init();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let answer_handshake = Arc::new(AtomicBool::new(true));
        let answer_pings = Arc::new(AtomicBool::new(true));
        let (tx, frames) = mpsc::unbounded_channel();

        let handshake = Arc::clone(&answer_handshake);
        let pings = Arc::clone(&answer_pings);
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 128];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    continue;
                };
                let data = &buf[..len];
                if data == v6::SESSION_REQUEST.as_slice() {
                    if handshake.load(Ordering::SeqCst) {
                        reply(&socket, peer, &session_response()).await;
                    }
                } else if data.starts_with(&[0xD0, 0x00, 0x00, 0x00, 0x02]) {
                    if pings.load(Ordering::SeqCst) {
                        let pong = [0xD8, 0x00, 0x00, 0x00, 0x07, SESSION.0, SESSION.1, 0x00];
                        reply(&socket, peer, &pong).await;
                    }
                } else if tx.send(data.to_vec()).is_err() {
                    break;
                }
            }
        });

        FakeBridge {
            port,
            answer_handshake,
            answer_pings,
            frames,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    #[allow(dead_code)]
    pub fn answer_handshake(&self, answer: bool) {
        self.answer_handshake.store(answer, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn answer_pings(&self, answer: bool) {
        self.answer_pings.store(answer, Ordering::SeqCst);
    }

    /// Every command frame that arrives before the line goes quiet for
    /// `quiet`.
    pub async fn frames(&mut self, quiet: Duration) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = tokio::time::timeout(quiet, self.frames.recv()).await {
            frames.push(frame);
        }
        frames
    }
}

impl Drop for FakeBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn reply(socket: &UdpSocket, peer: SocketAddr, data: &[u8]) {
    let _ = socket.send_to(data, peer).await;
}

fn session_response() -> [u8; v6::SESSION_RESPONSE_LEN] {
    let mut response = [0u8; v6::SESSION_RESPONSE_LEN];
    response[0] = 0x28;
    response[4] = 0x11;
    response[19] = SESSION.0;
    response[20] = SESSION.1;
    response
}

/// Short timings so the tests don't sit around.
pub fn fast_config(version: u8, port: u16) -> BridgeConfig {
    BridgeConfig::for_version(version)
        .with_port(port)
        .with_reps(1)
        .with_min_wait(Duration::from_millis(1))
        .with_select_wait(Duration::from_millis(1))
        .with_transition_wait(Duration::from_millis(1))
        .with_keep_alive_interval(Duration::from_secs(3600))
        .with_response_timeout(Duration::from_millis(50))
        .with_handshake_timeout(Duration::from_millis(100))
        .with_reconnect_interval(Duration::from_millis(50))
}

#[allow(dead_code)]
pub async fn wait_for_state(bridge: &Bridge, state: SessionState, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if bridge.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bridge.state() == state
}

/// Remembers every state a bridge went through.
#[allow(dead_code)]
#[derive(Default)]
pub struct StateRecorder {
    states: Mutex<Vec<SessionState>>,
}

impl StateRecorder {
    #[allow(dead_code)]
    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().clone()
    }
}

impl Observer for StateRecorder {
    fn state_changed(&self, _bridge: &str, state: SessionState) {
        self.states.lock().push(state);
    }
}
