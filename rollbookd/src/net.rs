use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEvent {
    Online,
    Offline,
}

/// Spawn a task that probes TCP reachability of the remote API host and
/// emits an event on every transition. The shared flag carries the last
/// known state for triggers that only need a point-in-time answer.
pub fn start_probe_watcher(
    host: String,
    port: u16,
    interval: Duration,
) -> (
    Arc<AtomicBool>,
    mpsc::UnboundedReceiver<NetEvent>,
    JoinHandle<()>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let online = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&online);

    let handle = tokio::spawn(async move {
        let mut known: Option<bool> = None;
        loop {
            let up = probe(&host, port).await;
            if known != Some(up) {
                flag.store(up, Ordering::SeqCst);
                if let Some(event) = known.and_then(|last| transition(last, up)) {
                    let _ = tx.send(event);
                }
                known = Some(up);
            }
            tokio::time::sleep(interval).await;
        }
    });

    (online, rx, handle)
}

pub async fn probe(host: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

fn transition(last: bool, up: bool) -> Option<NetEvent> {
    match (last, up) {
        (false, true) => Some(NetEvent::Online),
        (true, false) => Some(NetEvent::Offline),
        _ => None,
    }
}
