//! Background trap receiver.
//!
//! A dedicated task long-polls `/msgbus/trap` for the session's
//! lifetime and fans pushed event envelopes out to registered
//! listeners. The loop never exits on a poll failure; transport and
//! decoding errors are logged and the next cycle starts immediately.
//! Only the explicit stop signal terminates it.

use crate::error::Result;
use crate::models::Message;
use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, COOKIE};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Callback invoked for every pushed trap, in arrival order.
///
/// Listeners run synchronously on the receiver task; a slow listener
/// delays the next poll.
pub type TrapListener = Arc<dyn Fn(&Message) + Send + Sync>;

/// Handle to the background long-poll task.
pub(crate) struct TrapReceiver {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TrapReceiver {
    /// Spawn the receiver loop bound to the session's cookie cell.
    pub(crate) fn spawn(
        http: reqwest::Client,
        trap_url: String,
        cookie: Arc<Mutex<Option<String>>>,
        listeners: Arc<RwLock<Vec<TrapListener>>>,
        poll_timeout: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            debug!("[LINK_TRAP] receiver started, polling {}", trap_url);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    polled = poll_once(&http, &trap_url, &cookie, poll_timeout) => {
                        match polled {
                            Ok(events) => dispatch(&listeners, &events),
                            // A failed cycle must not kill the loop; the next
                            // poll is the retry.
                            Err(e) => debug!("[LINK_TRAP] poll failed, retrying: {}", e),
                        }
                    }
                }
            }
            debug!("[LINK_TRAP] receiver stopped");
        });

        Self { stop_tx, handle }
    }

    /// Signal the loop to stop and join it within `grace`; abort on expiry.
    pub(crate) async fn shutdown(self, grace: Duration) {
        let _ = self.stop_tx.send(true);
        let mut handle = self.handle;
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            warn!("[LINK_TRAP] receiver did not stop within {:?}, aborting", grace);
            handle.abort();
        }
    }
}

/// One long-poll cycle: empty array or socket timeout means no events.
async fn poll_once(
    http: &reqwest::Client,
    trap_url: &str,
    cookie: &Mutex<Option<String>>,
    poll_timeout: Duration,
) -> Result<Vec<Message>> {
    let mut request = http
        .get(trap_url)
        .header(CONTENT_TYPE, "text/json")
        .timeout(poll_timeout);

    let current = cookie.lock().unwrap_or_else(|e| e.into_inner()).clone();
    if let Some(value) = current {
        request = request.header(COOKIE, value);
    }

    let response = request.send().await?;
    let body: JsonValue = response.json().await?;

    let items = body.as_array().cloned().unwrap_or_default();
    let mut events = Vec::with_capacity(items.len());
    for item in items {
        events.push(Message::parse(item)?);
    }
    Ok(events)
}

/// Deliver events in order to every listener before the next poll.
fn dispatch(listeners: &RwLock<Vec<TrapListener>>, events: &[Message]) {
    if events.is_empty() {
        return;
    }
    debug!("[LINK_TRAP] dispatching {} event(s)", events.len());
    let listeners = listeners.read().unwrap_or_else(|e| e.into_inner());
    for event in events {
        for listener in listeners.iter() {
            listener(event);
        }
    }
}
