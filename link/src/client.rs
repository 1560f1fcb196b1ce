//! Log-database client: query lifecycle orchestration.
//!
//! Ties the RPC session, the trap receiver, and the per-query state
//! machines together. The registry of live queries is owned here and
//! mutated only through client methods and the trap listener.

use crate::cursor::QueryCursor;
use crate::error::{LogDbError, Result};
use crate::models::{Message, QueryStatus, ResultPage, TrapEvent};
use crate::query::{LogQuery, QueryInfo, WaitOutcome};
use crate::session::RpcSession;
use crate::timeouts::SessionTimeouts;
use log::debug;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const CREATE_QUERY_METHOD: &str = "org.krakenapps.logdb.msgbus.LogQueryPlugin.createQuery";
const START_QUERY_METHOD: &str = "org.krakenapps.logdb.msgbus.LogQueryPlugin.startQuery";
const STOP_QUERY_METHOD: &str = "org.krakenapps.logdb.msgbus.LogQueryPlugin.stopQuery";
const REMOVE_QUERY_METHOD: &str = "org.krakenapps.logdb.msgbus.LogQueryPlugin.removeQuery";
const GET_RESULT_METHOD: &str = "org.krakenapps.logdb.msgbus.LogQueryPlugin.getResult";

const MAIN_TOPIC_PREFIX: &str = "logstorage-query";
const TIMELINE_TOPIC_PREFIX: &str = "logstorage-query-timeline";

/// Default page/timeline sizes passed to `startQuery`.
const DEFAULT_PAGE_SIZE: u64 = 10;
const DEFAULT_TIMELINE_SIZE: u64 = 10;

type QueryRegistry = Mutex<HashMap<u64, LogQuery>>;

fn lock_registry(registry: &QueryRegistry) -> MutexGuard<'_, HashMap<u64, LogQuery>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Client for a remote log database reached over the msgbus protocol.
///
/// Cheap to clone; clones share the session and query registry.
///
/// # Examples
///
/// ```rust,no_run
/// use logdb_link::LogDbClient;
///
/// # async fn example() -> logdb_link::Result<()> {
/// let client = LogDbClient::connect("logdb.example.com", "admin", "secret").await?;
///
/// let mut cursor = client.query("table events").await?;
/// while let Some(row) = cursor.next().await {
///     println!("{}", row?);
/// }
///
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LogDbClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for LogDbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogDbClient").finish_non_exhaustive()
    }
}

struct ClientInner {
    session: RpcSession,
    queries: Arc<QueryRegistry>,
}

impl LogDbClient {
    /// Create a builder for configuring the connection.
    pub fn builder() -> LogDbClientBuilder {
        LogDbClientBuilder::new()
    }

    /// Connect with default options (forced login, default timeouts).
    pub async fn connect(host: &str, nick: &str, password: &str) -> Result<Self> {
        Self::builder()
            .host(host)
            .nick(nick)
            .password(password)
            .connect()
            .await
    }

    async fn connect_with(
        host: &str,
        nick: &str,
        password: &str,
        force: bool,
        timeouts: SessionTimeouts,
    ) -> Result<Self> {
        let session = RpcSession::connect(host, nick, password, force, timeouts).await?;

        let queries: Arc<QueryRegistry> = Arc::new(Mutex::new(HashMap::new()));
        let registry = Arc::clone(&queries);
        session.add_trap_listener(Arc::new(move |trap| dispatch_trap(&registry, trap)));

        Ok(Self {
            inner: Arc::new(ClientInner { session, queries }),
        })
    }

    /// Register a query on the server and subscribe to its trap topics.
    ///
    /// Returns the server-assigned query id.
    pub async fn create_query(&self, query_string: &str) -> Result<u64> {
        let response = self
            .inner
            .session
            .rpc(CREATE_QUERY_METHOD, json!({ "query": query_string }))
            .await?;
        let id = response
            .params
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                LogDbError::ProtocolError("createQuery response missing id".to_string())
            })?;

        self.inner
            .session
            .register_trap(&format!("{}-{}", MAIN_TOPIC_PREFIX, id))
            .await?;
        self.inner
            .session
            .register_trap(&format!("{}-{}", TIMELINE_TOPIC_PREFIX, id))
            .await?;

        lock_registry(&self.inner.queries).insert(id, LogQuery::new(id, query_string));
        debug!("[LINK_CLIENT] created query {} [{}]", id, query_string);
        Ok(id)
    }

    /// Start a created or stopped query with default page sizes.
    pub async fn start_query(&self, id: u64) -> Result<()> {
        self.start_query_with(id, DEFAULT_PAGE_SIZE, DEFAULT_TIMELINE_SIZE)
            .await
    }

    /// Start a query with explicit first-page and timeline sizes.
    pub async fn start_query_with(
        &self,
        id: u64,
        page_size: u64,
        timeline_size: u64,
    ) -> Result<()> {
        self.ensure_registered(id)?;
        self.inner
            .session
            .rpc(
                START_QUERY_METHOD,
                json!({
                    "id": id,
                    "offset": 0,
                    "limit": page_size,
                    "timeline_limit": timeline_size
                }),
            )
            .await?;
        if let Some(query) = lock_registry(&self.inner.queries).get_mut(&id) {
            query.set_status(QueryStatus::Running);
        }
        Ok(())
    }

    /// Stop a running query; it can be started again.
    pub async fn stop_query(&self, id: u64) -> Result<()> {
        self.ensure_registered(id)?;
        self.inner
            .session
            .rpc(STOP_QUERY_METHOD, json!({ "id": id }))
            .await?;
        if let Some(query) = lock_registry(&self.inner.queries).get_mut(&id) {
            query.set_status(QueryStatus::Stopped);
        }
        Ok(())
    }

    /// Unsubscribe the query's trap topics, remove it on the server and
    /// drop it from the registry.
    pub async fn remove_query(&self, id: u64) -> Result<()> {
        self.ensure_registered(id)?;
        self.inner
            .session
            .unregister_trap(&format!("{}-{}", MAIN_TOPIC_PREFIX, id))
            .await?;
        self.inner
            .session
            .unregister_trap(&format!("{}-{}", TIMELINE_TOPIC_PREFIX, id))
            .await?;
        self.inner
            .session
            .rpc(REMOVE_QUERY_METHOD, json!({ "id": id }))
            .await?;
        lock_registry(&self.inner.queries).remove(&id);
        debug!("[LINK_CLIENT] removed query {}", id);
        Ok(())
    }

    /// Fetch one page of results synchronously.
    ///
    /// Partial results can be fetched before the query has ended.
    pub async fn get_result(&self, id: u64, offset: u64, limit: u64) -> Result<ResultPage> {
        self.ensure_registered(id)?;
        let response = self
            .inner
            .session
            .rpc(
                GET_RESULT_METHOD,
                json!({ "id": id, "offset": offset, "limit": limit }),
            )
            .await?;
        ResultPage::from_params(id, offset, limit, response.params)
    }

    /// Block until `threshold` rows are loaded, or until the query ends
    /// when `threshold` is `None`. Returns the loaded count at wake.
    ///
    /// There is no internal bound on the wait; a query that never ends
    /// blocks forever. Use [`wait_until_timeout`](Self::wait_until_timeout)
    /// for a bounded variant.
    pub async fn wait_until(&self, id: u64, threshold: Option<u64>) -> Result<u64> {
        let outcome = {
            let mut registry = lock_registry(&self.inner.queries);
            let query = registry.get_mut(&id).ok_or(LogDbError::QueryNotFound(id))?;
            query.register_waiter(threshold)
        };
        match outcome {
            WaitOutcome::Ready(count) => Ok(count),
            WaitOutcome::Pending(rx) => {
                // The sender is dropped when the query is removed while
                // we are still blocked.
                rx.await.map_err(|_| LogDbError::QueryNotFound(id))
            }
        }
    }

    /// [`wait_until`](Self::wait_until) with an explicit upper bound.
    pub async fn wait_until_timeout(
        &self,
        id: u64,
        threshold: Option<u64>,
        timeout: Duration,
    ) -> Result<u64> {
        match tokio::time::timeout(timeout, self.wait_until(id, threshold)).await {
            Ok(result) => result,
            Err(_) => Err(LogDbError::TimeoutError(format!(
                "query {} did not reach the wait condition within {:?}",
                id, timeout
            ))),
        }
    }

    /// Open a lazy, forward-only cursor over `[offset, offset + limit)`.
    ///
    /// With `autoclose` set, the query is removed exactly once when the
    /// cursor is exhausted or abandoned.
    pub fn open_cursor(
        &self,
        id: u64,
        offset: u64,
        limit: u64,
        autoclose: bool,
    ) -> Result<QueryCursor> {
        self.ensure_registered(id)?;
        Ok(QueryCursor::new(self.clone(), id, offset, limit, autoclose))
    }

    /// Create, start and wait out a query, then return an autoclosing
    /// cursor over its full result set.
    pub async fn query(&self, query_string: &str) -> Result<QueryCursor> {
        let id = self.create_query(query_string).await?;
        self.start_query(id).await?;
        let total = self.wait_until(id, None).await?;
        self.open_cursor(id, 0, total, true)
    }

    /// Snapshot of every query registered in this session.
    pub fn queries(&self) -> Vec<QueryInfo> {
        let registry = lock_registry(&self.inner.queries);
        let mut infos: Vec<QueryInfo> = registry.values().map(|q| q.info()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Snapshot of one registered query.
    pub fn query_info(&self, id: u64) -> Result<QueryInfo> {
        lock_registry(&self.inner.queries)
            .get(&id)
            .map(|q| q.info())
            .ok_or(LogDbError::QueryNotFound(id))
    }

    /// End the server-side login session.
    pub async fn logout(&self) -> Result<()> {
        self.inner.session.logout().await
    }

    /// Stop the trap receiver and release the session.
    ///
    /// Waiters still blocked at close time are left unresolved.
    pub async fn close(&self) {
        self.inner.session.close().await;
    }

    /// Client-local guard: fail before any RPC when the id is unknown.
    fn ensure_registered(&self, id: u64) -> Result<()> {
        if lock_registry(&self.inner.queries).contains_key(&id) {
            Ok(())
        } else {
            Err(LogDbError::QueryNotFound(id))
        }
    }
}

/// Route one pushed trap into the query registry.
///
/// Runs on the trap receiver task. Events for ids no longer registered
/// are ignored; so are events on queries that already ended.
fn dispatch_trap(registry: &QueryRegistry, trap: &Message) {
    let event: TrapEvent = match serde_json::from_value(trap.params.clone()) {
        Ok(event) => event,
        Err(e) => {
            debug!("[LINK_CLIENT] ignoring malformed trap on {}: {}", trap.method, e);
            return;
        }
    };

    let mut queries = lock_registry(registry);
    let Some(query) = queries.get_mut(&event.id) else {
        debug!("[LINK_CLIENT] trap for unknown query {}, ignoring", event.id);
        return;
    };

    // The timeline prefix contains the main prefix, so check it first.
    if trap.method.contains(TIMELINE_TOPIC_PREFIX) {
        if let Some(count) = event.count {
            query.update_count(count);
        }
        if event.is_eof() {
            let total = event.count.unwrap_or(query.loaded_count());
            query.finalize(total);
        }
    } else if trap.method.contains(MAIN_TOPIC_PREFIX) {
        if event.is_eof() {
            let total = event.total_count.unwrap_or(query.loaded_count());
            query.finalize(total);
        }
    }
}

/// Builder for [`LogDbClient`] connections.
pub struct LogDbClientBuilder {
    host: Option<String>,
    nick: Option<String>,
    password: String,
    force: bool,
    timeouts: SessionTimeouts,
}

impl LogDbClientBuilder {
    fn new() -> Self {
        Self {
            host: None,
            nick: None,
            password: String::new(),
            force: true,
            timeouts: SessionTimeouts::default(),
        }
    }

    /// Server host or host:port.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Login name.
    pub fn nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = Some(nick.into());
        self
    }

    /// Login password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Whether to evict an existing session for the same user (default true).
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Transport timeouts.
    pub fn timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Resolve, authenticate and start the trap receiver.
    pub async fn connect(self) -> Result<LogDbClient> {
        let host = self
            .host
            .ok_or_else(|| LogDbError::ConfigurationError("host is required".to_string()))?;
        let nick = self
            .nick
            .ok_or_else(|| LogDbError::ConfigurationError("nick is required".to_string()))?;
        LogDbClient::connect_with(&host, &nick, &self.password, self.force, self.timeouts).await
    }
}
