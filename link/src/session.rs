//! Authenticated msgbus session.
//!
//! Owns the RPC transport, the session-affinity cookie, and the
//! background [`TrapReceiver`](crate::trap::TrapReceiver). RPCs and the
//! long poll travel over distinct requests so control calls are never
//! queued behind a pending poll.

use crate::error::{LogDbError, Result};
use crate::models::Message;
use crate::timeouts::SessionTimeouts;
use crate::trap::{TrapListener, TrapReceiver};
use log::debug;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use serde_json::{json, Value as JsonValue};
use sha1::{Digest, Sha1};
use std::sync::{Arc, Mutex, RwLock};

const HELLO_METHOD: &str = "org.krakenapps.dom.msgbus.LoginPlugin.hello";
const LOGIN_METHOD: &str = "org.krakenapps.dom.msgbus.LoginPlugin.login";
const LOGOUT_METHOD: &str = "org.krakenapps.dom.msgbus.LoginPlugin.logout";
const SUBSCRIBE_METHOD: &str = "org.krakenapps.msgbus.PushPlugin.subscribe";
const UNSUBSCRIBE_METHOD: &str = "org.krakenapps.msgbus.PushPlugin.unsubscribe";

/// Authenticated connection to a msgbus server.
pub struct RpcSession {
    base_url: String,
    http: reqwest::Client,
    /// Session-affinity cookie; any `Set-Cookie` response rotates it.
    cookie: Arc<Mutex<Option<String>>>,
    listeners: Arc<RwLock<Vec<TrapListener>>>,
    trap: Mutex<Option<TrapReceiver>>,
    timeouts: SessionTimeouts,
}

impl RpcSession {
    /// Connect and authenticate against `host` (host or host:port).
    ///
    /// Resolves the host, performs the hello/login challenge handshake,
    /// and starts the trap receiver bound to the session cookie.
    pub async fn connect(
        host: &str,
        nick: &str,
        password: &str,
        force: bool,
        timeouts: SessionTimeouts,
    ) -> Result<Self> {
        let lookup_target = if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:80", host)
        };
        let mut addrs = tokio::net::lookup_host(&lookup_target)
            .await
            .map_err(|e| LogDbError::ConnectError(format!("cannot resolve {}: {}", host, e)))?;
        if addrs.next().is_none() {
            return Err(LogDbError::ConnectError(format!("no address for {}", host)));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .map_err(|e| LogDbError::ConfigurationError(e.to_string()))?;

        let session = Self {
            base_url: format!("http://{}", host),
            http,
            cookie: Arc::new(Mutex::new(None)),
            listeners: Arc::new(RwLock::new(Vec::new())),
            trap: Mutex::new(None),
            timeouts,
        };

        let hello = session.rpc(HELLO_METHOD, json!({})).await?;
        let nonce = hello
            .params
            .get("nonce")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LogDbError::ProtocolError("hello response missing nonce".to_string()))?;
        let hash = hash_password(password, nonce);

        let login = session
            .rpc(
                LOGIN_METHOD,
                json!({ "nick": nick, "hash": hash, "force": force }),
            )
            .await;
        match login {
            Ok(_) => {}
            Err(LogDbError::RemoteError { code, message }) => {
                let detail = if message.is_empty() {
                    code
                } else {
                    format!("{}: {}", code, message)
                };
                return Err(LogDbError::AuthenticationError(detail));
            }
            Err(e) => return Err(e),
        }
        debug!("[LINK_SESSION] logged in to {} as {}", host, nick);

        let receiver = TrapReceiver::spawn(
            session.http.clone(),
            format!("{}/msgbus/trap", session.base_url),
            Arc::clone(&session.cookie),
            Arc::clone(&session.listeners),
            timeouts.trap_poll,
        );
        *session.trap.lock().unwrap_or_else(|e| e.into_inner()) = Some(receiver);

        Ok(session)
    }

    /// Issue one RPC and parse the response envelope.
    ///
    /// Any `Set-Cookie` header on the response replaces the stored
    /// session cookie. Error envelopes become [`LogDbError::RemoteError`].
    pub async fn rpc(&self, method: &str, params: JsonValue) -> Result<Message> {
        let body = Message::request_body(method, &params)?;

        let mut request = self
            .http
            .post(format!("{}/msgbus/request", self.base_url))
            .header(CONTENT_TYPE, "text/json")
            .body(body);
        let current = self.cookie.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(value) = current {
            request = request.header(COOKIE, value);
        }

        debug!("[LINK_SESSION] rpc {}", method);
        let response = request.send().await?;

        if let Some(set_cookie) = response.headers().get(SET_COOKIE) {
            if let Ok(raw) = set_cookie.to_str() {
                // Keep only the name=value pair, not the attributes.
                if let Some(pair) = raw.split(';').next() {
                    *self.cookie.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(pair.to_string());
                }
            }
        }

        let body: JsonValue = response.json().await?;
        Message::parse(body)?.into_result()
    }

    /// Subscribe to a named trap topic.
    pub async fn register_trap(&self, callback: &str) -> Result<()> {
        self.rpc(SUBSCRIBE_METHOD, json!({ "callback": callback }))
            .await?;
        Ok(())
    }

    /// Unsubscribe from a named trap topic.
    pub async fn unregister_trap(&self, callback: &str) -> Result<()> {
        self.rpc(UNSUBSCRIBE_METHOD, json!({ "callback": callback }))
            .await?;
        Ok(())
    }

    /// End the server-side login session.
    pub async fn logout(&self) -> Result<()> {
        self.rpc(LOGOUT_METHOD, json!({})).await?;
        Ok(())
    }

    /// Register a listener invoked for every pushed trap.
    pub fn add_trap_listener(&self, listener: TrapListener) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Stop the trap receiver (bounded join) and release the connection.
    ///
    /// Any waiter still blocked on a query at close time is left
    /// unresolved.
    pub async fn close(&self) {
        let receiver = self.trap.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(receiver) = receiver {
            receiver.shutdown(self.timeouts.shutdown_grace).await;
        }
    }
}

/// Challenge-response login hash: `sha1(hex(sha1(password)) + nonce)`.
pub(crate) fn hash_password(password: &str, nonce: &str) -> String {
    let password_digest = hex::encode(Sha1::digest(password.as_bytes()));
    let mut hasher = Sha1::new();
    hasher.update(password_digest.as_bytes());
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}
