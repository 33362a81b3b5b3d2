use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::session::Control;

/// Ping the session every `interval`. A missed answer asks the serializer to
/// reconnect and waits until the session is back before pinging again.
pub(crate) async fn run(
    label: String,
    interval: Duration,
    control: mpsc::UnboundedSender<Control>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }

        let (tx, rx) = oneshot::channel();
        if control.send(Control::Ping(tx)).is_err() {
            break;
        }
        let alive = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            alive = rx => alive.unwrap_or(false),
        };
        if alive {
            continue;
        }

        warn!("Lost session with {}, reconnecting", label);
        let (tx, rx) = oneshot::channel();
        if control.send(Control::Reconnect(tx)).is_err() {
            break;
        }
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            reconnected = rx => {
                if reconnected.is_err() {
                    break;
                }
                info!("Session with {} restored", label);
            }
        }
    }
    debug!("Keep-alive for {} stopped", label);
}
