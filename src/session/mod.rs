// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! # Wallet Session Manager
//!
//! Owns the lifecycle of a connection to a remote wallet-signing service
//! reachable through one of several interchangeable relay endpoints, and
//! exposes the signing/payment/balance/invoice surface with:
//!
//! - **Relay fallback**: every operation retries across relays on
//!   transport-class failures, bounded by the retry cap and the relay
//!   count. Application-class rejections surface immediately.
//! - **Reconnection**: losing the connection (detected by an operation or
//!   the liveness probe) schedules a single background reconnection loop
//!   with exponential backoff.
//! - **Queuing**: payments (and the balance/info reads a UI issues
//!   unprompted) invoked while disconnected are parked and replayed in
//!   FIFO order once connectivity returns.
//!
//! The session is an explicitly constructed object injected into the
//! application shell; there is no process-wide instance.

mod queue;
mod relay;

pub use queue::OperationKind;
pub use relay::RelayEndpoint;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{capability, ClientError, WalletClient, WalletConnector};
use crate::config::SessionConfig;
use crate::credentials::{extract_alias, ParsedCredentials};
use crate::error::SessionError;
use crate::models::{
    ConnectionState, CreatedInvoice, NodeRegistration, PaymentResult, TransactionEntry, UserType,
    WalletInfo, WalletUser,
};
use crate::network::{NetworkConfig, NetworkName};
use crate::probe::LivenessProbe;
use crate::storage::SessionStore;

use queue::{OperationQueue, QueuedOutput, QueuedRequest};
use relay::RelayPool;

/// Message signed at connect time to prove the client is truly usable.
const CONNECT_CHALLENGE: &str = "taphub-connect-check";

type Listener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

struct ListenerEntry {
    id: u64,
    callback: Listener,
}

/// Mutable session state. Mutations are atomic between await points; an
/// operation must tolerate the relay index moving underneath it.
struct SessionState {
    credentials: Option<String>,
    relays: Option<RelayPool>,
    client: Option<Arc<dyn WalletClient>>,
    permissions: HashSet<String>,
    user: Option<WalletUser>,
    queue: OperationQueue,
    reconnect_attempt: u32,
    /// Ever connected successfully (or restorable); gates every operation.
    initialized: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            credentials: None,
            relays: None,
            client: None,
            permissions: HashSet::new(),
            user: None,
            queue: OperationQueue::new(),
            reconnect_attempt: 0,
            initialized: false,
        }
    }
}

struct SessionInner {
    connector: Arc<dyn WalletConnector>,
    store: SessionStore,
    config: SessionConfig,
    state: Mutex<SessionState>,
    /// Serializes connect/restore so concurrent callers share one in-flight
    /// initialization.
    init_gate: Mutex<()>,
    conn_state: StdMutex<ConnectionState>,
    listeners: StdMutex<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
    /// Re-entrancy guard: at most one reconnection loop.
    reconnecting: AtomicBool,
    probe_running: AtomicBool,
    /// Cancelled (and replaced) on logout; stops probe and reconnect tasks.
    shutdown: StdMutex<CancellationToken>,
    network: StdMutex<NetworkName>,
}

/// Handle for a registered connection-state listener. Dropping it (or
/// calling [`Subscription::unsubscribe`]) detaches the listener.
pub struct Subscription {
    id: u64,
    inner: Weak<SessionInner>,
}

impl Subscription {
    /// Detach the listener.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut listeners) = inner.listeners.lock() {
                listeners.retain(|entry| entry.id != self.id);
            }
        }
    }
}

/// The wallet session manager.
#[derive(Clone)]
pub struct WalletSession {
    inner: Arc<SessionInner>,
}

impl WalletSession {
    /// Create a session over a wallet connector and a persistence store.
    pub fn new(
        connector: Arc<dyn WalletConnector>,
        store: SessionStore,
        config: SessionConfig,
    ) -> Self {
        let network = store.load_network();
        Self {
            inner: Arc::new(SessionInner {
                connector,
                store,
                config,
                state: Mutex::new(SessionState::new()),
                init_gate: Mutex::new(()),
                conn_state: StdMutex::new(ConnectionState::Disconnected),
                listeners: StdMutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                reconnecting: AtomicBool::new(false),
                probe_running: AtomicBool::new(false),
                shutdown: StdMutex::new(CancellationToken::new()),
                network: StdMutex::new(network),
            }),
        }
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ========== Connection lifecycle ==========

    /// Connect with an NWC-style connection string.
    ///
    /// Tries every relay named by the credentials in order (falling back to
    /// the default relay when none is named), validates the winner with an
    /// identity probe and a signing challenge, adopts the signer's granted
    /// capability set, and persists the session for later restoration.
    pub async fn connect(&self, credentials: &str) -> Result<WalletUser, SessionError> {
        let _gate = self.inner.init_gate.lock().await;
        self.connect_locked(credentials).await
    }

    /// Drop the session: clears in-memory state and client handles, stops
    /// the probe and any reconnection loop, rejects every queued operation
    /// with a cancellation error, and erases the persisted credentials.
    pub async fn logout(&self) {
        info!("Logging out wallet session");

        {
            // Stop background tasks; a fresh token arms the next connect.
            if let Ok(mut token) = self.inner.shutdown.lock() {
                token.cancel();
                *token = CancellationToken::new();
            }
        }
        self.inner.reconnecting.store(false, Ordering::SeqCst);
        self.inner.probe_running.store(false, Ordering::SeqCst);

        {
            let mut state = self.inner.state.lock().await;
            state.client = None;
            state.user = None;
            state.credentials = None;
            state.relays = None;
            state.permissions.clear();
            state.reconnect_attempt = 0;
            state.initialized = false;
            if !state.queue.is_empty() {
                warn!(pending = state.queue.len(), "Rejecting queued operations on logout");
            }
            state.queue.reject_all();
        }

        if let Err(e) = self.inner.store.clear_session() {
            warn!(error = %e, "Failed to erase persisted session");
        }

        self.set_connection_state(ConnectionState::Disconnected);
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner
            .conn_state
            .lock()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Register a listener for connection-state transitions. Listeners are
    /// invoked synchronously on every transition. The returned handle
    /// detaches the listener when dropped.
    pub fn on_connection_state_change(
        &self,
        listener: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.push(ListenerEntry {
                id,
                callback: Arc::new(listener),
            });
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ========== Identity ==========

    /// Last-known user, read through to the store on first access.
    pub async fn current_user(&self) -> Option<WalletUser> {
        let mut state = self.inner.state.lock().await;
        if state.user.is_none() {
            state.user = self.inner.store.load_user();
        }
        state.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current_user().await.is_some()
    }

    pub async fn is_node_runner(&self) -> bool {
        self.current_user()
            .await
            .map(|u| u.is_node_runner)
            .unwrap_or(false)
    }

    /// Upgrade the session user to a marketplace node runner.
    pub async fn register_as_node(
        &self,
        registration: NodeRegistration,
    ) -> Result<WalletUser, SessionError> {
        let user = {
            let mut state = self.inner.state.lock().await;
            if !state.initialized {
                return Err(SessionError::NotInitialized);
            }
            let user = WalletUser {
                user_type: UserType::Node,
                pubkey: registration.pubkey,
                alias: Some(registration.alias),
                email: state.user.as_ref().and_then(|u| u.email.clone()),
                is_node_runner: true,
                description: registration.description,
            };
            state.user = Some(user.clone());
            user
        };
        self.inner.store.save_user(&user)?;
        Ok(user)
    }

    // ========== Permissions ==========

    /// Capability names granted by the remote signer, sorted.
    pub async fn permissions(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut methods: Vec<String> = state.permissions.iter().cloned().collect();
        methods.sort();
        methods
    }

    pub async fn has_permission(&self, method: &str) -> bool {
        self.inner.state.lock().await.permissions.contains(method)
    }

    // ========== Network selection ==========

    pub fn current_network(&self) -> NetworkConfig {
        let name = self
            .inner
            .network
            .lock()
            .map(|n| *n)
            .unwrap_or(NetworkName::Regtest);
        NetworkConfig::for_network(name)
    }

    pub fn set_network(&self, name: NetworkName) {
        if let Ok(mut network) = self.inner.network.lock() {
            *network = name;
        }
        if let Err(e) = self.inner.store.save_network(name) {
            warn!(error = %e, "Failed to persist network selection");
        }
    }

    pub fn available_networks() -> Vec<NetworkConfig> {
        NetworkConfig::all()
    }

    // ========== Relay inspection ==========

    /// Snapshot of the relay endpoints, in credential order.
    pub async fn relay_endpoints(&self) -> Vec<RelayEndpoint> {
        let state = self.inner.state.lock().await;
        state
            .relays
            .as_ref()
            .map(|pool| pool.endpoints().to_vec())
            .unwrap_or_default()
    }

    /// Index of the relay the next attempt will use.
    pub async fn current_relay_index(&self) -> Option<usize> {
        let state = self.inner.state.lock().await;
        state.relays.as_ref().map(|pool| pool.current_index())
    }

    // ========== Operation surface ==========

    /// Sign an arbitrary text message. Fails fast while disconnected.
    pub async fn sign_message(&self, message: &str) -> Result<String, SessionError> {
        self.ready_for(capability::SIGN_MESSAGE).await?;
        let message = message.to_string();
        self.run_with_fallback("sign_message", move |client| {
            let message = message.clone();
            async move { client.sign_message(&message).await }
        })
        .await
    }

    /// Current balance in millisatoshis. Queued while disconnected.
    pub async fn get_balance(&self) -> Result<u64, SessionError> {
        self.ensure_initialized().await?;
        self.require_permission(capability::GET_BALANCE).await?;

        if self.connection_state() == ConnectionState::Disconnected {
            return match self.enqueue(QueuedRequest::Balance).await? {
                QueuedOutput::Balance(balance) => Ok(balance),
                _ => Err(mismatched_output()),
            };
        }

        self.run_with_fallback("get_balance", |client| async move {
            client.get_balance().await
        })
        .await
    }

    /// Identity and capability report. Queued while disconnected.
    pub async fn get_wallet_info(&self) -> Result<WalletInfo, SessionError> {
        self.ensure_initialized().await?;
        self.require_permission(capability::GET_INFO).await?;

        if self.connection_state() == ConnectionState::Disconnected {
            return match self.enqueue(QueuedRequest::Info).await? {
                QueuedOutput::Info(info) => Ok(info),
                _ => Err(mismatched_output()),
            };
        }

        self.run_with_fallback("get_info", |client| async move { client.get_info().await })
            .await
    }

    /// Pay a bolt11 invoice. Never dropped: queued while disconnected and
    /// replayed once connectivity returns, or rejected on logout.
    pub async fn make_payment(&self, invoice: &str) -> Result<PaymentResult, SessionError> {
        self.ensure_initialized().await?;
        self.require_permission(capability::PAY_INVOICE).await?;

        if self.connection_state() == ConnectionState::Disconnected {
            return match self
                .enqueue(QueuedRequest::Payment {
                    invoice: invoice.to_string(),
                })
                .await?
            {
                QueuedOutput::Payment(result) => Ok(result),
                _ => Err(mismatched_output()),
            };
        }

        let invoice = invoice.to_string();
        self.run_with_fallback("pay_invoice", move |client| {
            let invoice = invoice.clone();
            async move { client.pay_invoice(&invoice).await }
        })
        .await
    }

    /// Create an invoice. Fails fast while disconnected: a deferred
    /// invoice would be stale by the time the payer sees it.
    pub async fn make_invoice(
        &self,
        amount_sats: u64,
        description: Option<&str>,
        expiry_secs: Option<u64>,
    ) -> Result<CreatedInvoice, SessionError> {
        self.ready_for(capability::MAKE_INVOICE).await?;
        let description = description.map(str::to_string);
        self.run_with_fallback("make_invoice", move |client| {
            let description = description.clone();
            async move {
                client
                    .make_invoice(amount_sats, description.as_deref(), expiry_secs)
                    .await
            }
        })
        .await
    }

    /// Wallet transaction history. Fails fast while disconnected.
    pub async fn list_transactions(&self) -> Result<Vec<TransactionEntry>, SessionError> {
        self.ready_for(capability::LIST_TRANSACTIONS).await?;
        self.run_with_fallback("list_transactions", |client| async move {
            client.list_transactions().await
        })
        .await
    }

    // ========== Internals ==========

    /// Preconditions for fail-fast operations: initialized, permitted,
    /// and not disconnected.
    async fn ready_for(&self, cap: &str) -> Result<(), SessionError> {
        self.ensure_initialized().await?;
        self.require_permission(cap).await?;
        if self.connection_state() == ConnectionState::Disconnected {
            return Err(SessionError::Connection(
                "wallet session is disconnected".to_string(),
            ));
        }
        Ok(())
    }

    /// Park a request and await its completion.
    async fn enqueue(&self, request: QueuedRequest) -> Result<QueuedOutput, SessionError> {
        let rx = {
            let mut state = self.inner.state.lock().await;
            state.queue.push(request)
        };
        match rx.await {
            Ok(result) => result,
            // Sender dropped without answering; treated as cancellation.
            Err(_) => Err(SessionError::Cancelled),
        }
    }

    /// Wait for (or perform) initialization. Concurrent callers share the
    /// same in-flight restore through the init gate.
    async fn ensure_initialized(&self) -> Result<(), SessionError> {
        if self.inner.state.lock().await.initialized {
            return Ok(());
        }
        let _gate = self.inner.init_gate.lock().await;
        if self.inner.state.lock().await.initialized {
            return Ok(());
        }
        let Some(credentials) = self.inner.store.load_credentials() else {
            return Err(SessionError::NotInitialized);
        };
        info!("Restoring wallet session from persisted credentials");
        self.connect_locked(&credentials).await.map(|_| ())
    }

    async fn require_permission(&self, cap: &str) -> Result<(), SessionError> {
        if self.inner.state.lock().await.permissions.contains(cap) {
            Ok(())
        } else {
            Err(SessionError::MissingPermission(cap.to_string()))
        }
    }

    /// Connect against the given credentials. Caller holds the init gate.
    async fn connect_locked(&self, credentials: &str) -> Result<WalletUser, SessionError> {
        self.set_connection_state(ConnectionState::Connecting);

        let parsed = match ParsedCredentials::parse(credentials, &self.inner.config.default_relay)
        {
            Ok(parsed) => parsed,
            Err(e) => {
                self.set_connection_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let mut pool = RelayPool::new(parsed.relays.clone());
        let budget = pool.attempt_budget(self.inner.config.max_relay_retries);
        let mut last_err = SessionError::Connection("no relays attempted".to_string());

        for attempt in 0..budget {
            let url = pool.current_url().to_string();
            debug!(relay = %url, attempt, "Trying relay");

            match self.try_relay(credentials, &url).await {
                Ok((client, wallet_info)) => {
                    pool.mark_connected();
                    let relay_index = pool.current_index();
                    let user = self.build_user(&parsed, credentials, &wallet_info).await;

                    {
                        let mut state = self.inner.state.lock().await;
                        state.credentials = Some(credentials.to_string());
                        state.relays = Some(pool);
                        state.client = Some(client);
                        state.permissions = wallet_info.methods.iter().cloned().collect();
                        state.user = Some(user.clone());
                        state.initialized = true;
                        state.reconnect_attempt = 0;
                    }

                    if let Err(e) = self.persist_session(credentials, &user) {
                        warn!(error = %e, "Failed to persist session");
                    }

                    self.set_connection_state(ConnectionState::Connected);
                    self.ensure_probe();
                    info!(
                        relay_index,
                        pubkey = %user.pubkey,
                        methods = wallet_info.methods.len(),
                        "Wallet session connected"
                    );

                    self.drain_queue().await;
                    return Ok(user);
                }
                Err(e) if e.is_connection_class() => {
                    warn!(relay = %url, error = %e, "Relay attempt failed");
                    pool.mark_failed();
                    last_err = e;
                    if attempt + 1 < budget {
                        tokio::time::sleep(self.inner.config.relay_retry_delay).await;
                    }
                }
                Err(e) => {
                    // The signer answered and refused; other relays would
                    // refuse the same way.
                    self.set_connection_state(ConnectionState::Disconnected);
                    return Err(e);
                }
            }
        }

        self.set_connection_state(ConnectionState::Disconnected);
        Err(last_err)
    }

    /// One bounded connect attempt against a single relay: build the
    /// client, probe identity, and validate with a signing challenge.
    async fn try_relay(
        &self,
        credentials: &str,
        url: &str,
    ) -> Result<(Arc<dyn WalletClient>, WalletInfo), SessionError> {
        let timeout = self.inner.config.attempt_timeout;

        let client = tokio::time::timeout(timeout, self.inner.connector.connect(credentials, url))
            .await
            .map_err(|_| SessionError::Connection(format!("connecting to {url} timed out")))?
            .map_err(map_client_err)?;

        let wallet_info = tokio::time::timeout(timeout, client.get_info())
            .await
            .map_err(|_| SessionError::Connection(format!("identity probe on {url} timed out")))?
            .map_err(map_client_err)?;

        let signature = tokio::time::timeout(timeout, client.sign_message(CONNECT_CHALLENGE))
            .await
            .map_err(|_| {
                SessionError::Connection(format!("signing challenge on {url} timed out"))
            })?
            .map_err(map_client_err)?;
        if signature.is_empty() {
            return Err(SessionError::Connection(
                "signing challenge returned an empty signature".to_string(),
            ));
        }

        Ok((client, wallet_info))
    }

    /// Prefer the stored identity when it matches the wallet pubkey, so a
    /// node registration survives re-login.
    async fn build_user(
        &self,
        parsed: &ParsedCredentials,
        credentials: &str,
        wallet_info: &WalletInfo,
    ) -> WalletUser {
        if let Some(stored) = self.inner.store.load_user() {
            if stored.pubkey == parsed.pubkey {
                return stored;
            }
        }
        WalletUser {
            user_type: UserType::User,
            pubkey: parsed.pubkey.clone(),
            alias: wallet_info
                .alias
                .clone()
                .or_else(|| extract_alias(credentials)),
            email: None,
            is_node_runner: false,
            description: None,
        }
    }

    fn persist_session(
        &self,
        credentials: &str,
        user: &WalletUser,
    ) -> Result<(), crate::storage::StorageError> {
        self.inner.store.save_credentials(credentials)?;
        self.inner.store.save_user(user)?;
        self.inner.store.save_network(self.current_network().name)?;
        Ok(())
    }

    /// Execute a client call under relay-fallback retry.
    async fn run_with_fallback<T, F, Fut>(&self, op: &str, call: F) -> Result<T, SessionError>
    where
        F: Fn(Arc<dyn WalletClient>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let budget = {
            let state = self.inner.state.lock().await;
            match state.relays.as_ref() {
                Some(pool) => pool.attempt_budget(self.inner.config.max_relay_retries),
                None => return Err(SessionError::NotInitialized),
            }
        };

        let mut last_err = SessionError::Connection(format!("{op}: no relay attempts made"));

        for attempt in 0..budget {
            let client = match self.client_for_current_relay().await {
                Ok(client) => client,
                Err(e) if e.is_connection_class() => {
                    self.note_relay_failure().await;
                    last_err = e;
                    if attempt + 1 < budget {
                        tokio::time::sleep(self.inner.config.relay_retry_delay).await;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            match tokio::time::timeout(self.inner.config.attempt_timeout, call(client)).await {
                Ok(Ok(value)) => {
                    let mut state = self.inner.state.lock().await;
                    if let Some(pool) = state.relays.as_mut() {
                        pool.mark_connected();
                    }
                    return Ok(value);
                }
                Ok(Err(e)) if !e.is_transport() => {
                    debug!(op, error = %e, "Wallet rejected request");
                    return Err(SessionError::Rejected(e.message));
                }
                Ok(Err(e)) => {
                    warn!(op, attempt, error = %e, "Transport failure; advancing relay");
                    last_err = SessionError::Connection(e.message);
                    self.note_relay_failure().await;
                }
                Err(_) => {
                    warn!(op, attempt, "Attempt timed out; advancing relay");
                    last_err = SessionError::Connection(format!("{op} timed out"));
                    self.note_relay_failure().await;
                }
            }

            if attempt + 1 < budget {
                tokio::time::sleep(self.inner.config.relay_retry_delay).await;
            }
        }

        if last_err.is_connection_class() {
            self.handle_disconnection(&last_err.to_string()).await;
        }
        Err(last_err)
    }

    /// Reuse the live client, or rebuild one against the current relay.
    async fn client_for_current_relay(&self) -> Result<Arc<dyn WalletClient>, SessionError> {
        let (existing, url, credentials) = {
            let state = self.inner.state.lock().await;
            let pool = state.relays.as_ref().ok_or(SessionError::NotInitialized)?;
            let credentials = state
                .credentials
                .clone()
                .ok_or(SessionError::NotInitialized)?;
            (state.client.clone(), pool.current_url().to_string(), credentials)
        };

        if let Some(client) = existing {
            return Ok(client);
        }

        debug!(relay = %url, "Rebuilding wallet client");
        let client = tokio::time::timeout(
            self.inner.config.attempt_timeout,
            self.inner.connector.connect(&credentials, &url),
        )
        .await
        .map_err(|_| SessionError::Connection(format!("connecting to {url} timed out")))?
        .map_err(map_client_err)?;

        let mut state = self.inner.state.lock().await;
        state.client = Some(client.clone());
        Ok(client)
    }

    /// Mark the current relay failed and drop the client so the next
    /// attempt rebuilds against the next relay.
    async fn note_relay_failure(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(pool) = state.relays.as_mut() {
            pool.mark_failed();
        }
        state.client = None;
    }

    /// Enter the disconnected state and schedule the reconnection loop.
    /// The atomic guard makes concurrent failures collapse into exactly
    /// one transition and one loop.
    pub(crate) async fn handle_disconnection(&self, reason: &str) {
        if self
            .inner
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        warn!(reason, "Wallet connection lost; scheduling reconnection");
        {
            let mut state = self.inner.state.lock().await;
            state.client = None;
        }
        self.set_connection_state(ConnectionState::Disconnected);

        let token = self
            .inner
            .shutdown
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();
        let session = self.clone();
        tokio::spawn(async move { session.run_reconnect(token).await });
    }

    /// Reconnection loop: exponential backoff, re-parsing relays from the
    /// persisted credentials on every attempt. Exactly one instance runs
    /// at a time.
    fn run_reconnect(
        self,
        token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
        let max = self.inner.config.max_reconnect_attempts;

        for attempt in 1..=max {
            let delay = self.inner.config.reconnect_delay(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = token.cancelled() => {
                    info!("Reconnection loop cancelled");
                    self.inner.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
            }

            let Some(credentials) = self.inner.store.load_credentials() else {
                info!("No persisted credentials; abandoning reconnection");
                break;
            };

            {
                let mut state = self.inner.state.lock().await;
                state.reconnect_attempt = attempt;
            }

            info!(attempt, max_attempts = max, "Attempting wallet reconnection");
            let result = {
                let _gate = self.inner.init_gate.lock().await;
                if token.is_cancelled() {
                    info!("Reconnection loop cancelled");
                    self.inner.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                if self.connection_state() == ConnectionState::Connected {
                    // Someone reconnected manually while we were waiting.
                    Ok(())
                } else {
                    self.connect_locked(&credentials).await.map(|_| ())
                }
            };

            match result {
                Ok(()) => {
                    self.inner.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                Err(e) => warn!(attempt, error = %e, "Reconnection attempt failed"),
            }
        }

        warn!("Reconnection attempts exhausted; staying disconnected");
        self.inner.reconnecting.store(false, Ordering::SeqCst);
        })
    }

    /// Replay queued operations in insertion order against the live client.
    async fn drain_queue(&self) {
        let ops = {
            let mut state = self.inner.state.lock().await;
            state.queue.drain()
        };
        if ops.is_empty() {
            return;
        }

        info!(count = ops.len(), "Draining queued operations");
        for op in ops {
            debug!(id = %op.id, kind = ?op.request.kind(), "Draining queued operation");
            let result = match &op.request {
                QueuedRequest::Payment { invoice } => {
                    let invoice = invoice.clone();
                    self.run_with_fallback("pay_invoice", move |client| {
                        let invoice = invoice.clone();
                        async move { client.pay_invoice(&invoice).await }
                    })
                    .await
                    .map(QueuedOutput::Payment)
                }
                QueuedRequest::Balance => self
                    .run_with_fallback("get_balance", |client| async move {
                        client.get_balance().await
                    })
                    .await
                    .map(QueuedOutput::Balance),
                QueuedRequest::Info => self
                    .run_with_fallback("get_info", |client| async move {
                        client.get_info().await
                    })
                    .await
                    .map(QueuedOutput::Info),
            };

            let _ = op.completion.send(result);
        }
    }

    /// One liveness check; called by the background probe.
    pub(crate) async fn probe_once(&self) {
        if self.connection_state() != ConnectionState::Connected {
            return;
        }
        let client = {
            let state = self.inner.state.lock().await;
            state.client.clone()
        };
        let Some(client) = client else { return };

        match tokio::time::timeout(self.inner.config.attempt_timeout, client.get_info()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if !e.is_transport() => {
                debug!(error = %e, "Liveness probe rejected by signer");
            }
            Ok(Err(e)) => {
                self.handle_disconnection(&format!("liveness probe failed: {e}"))
                    .await;
            }
            Err(_) => self.handle_disconnection("liveness probe timed out").await,
        }
    }

    fn ensure_probe(&self) {
        if self
            .inner
            .probe_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let token = self
            .inner
            .shutdown
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();
        let session = self.clone();
        tokio::spawn(async move {
            LivenessProbe::new(session.clone()).run(token).await;
            session.inner.probe_running.store(false, Ordering::SeqCst);
        });
    }

    /// Transition the connection state, notifying listeners synchronously
    /// on every change.
    fn set_connection_state(&self, next: ConnectionState) {
        let changed = {
            match self.inner.conn_state.lock() {
                Ok(mut current) => {
                    if *current != next {
                        *current = next;
                        true
                    } else {
                        false
                    }
                }
                Err(_) => false,
            }
        };

        if changed {
            info!(state = %next, "Connection state changed");
            let listeners: Vec<Listener> = self
                .inner
                .listeners
                .lock()
                .map(|entries| entries.iter().map(|e| e.callback.clone()).collect())
                .unwrap_or_default();
            for listener in listeners {
                listener(next);
            }
        }
    }
}

fn map_client_err(e: ClientError) -> SessionError {
    if e.is_transport() {
        SessionError::Connection(e.message)
    } else {
        SessionError::Rejected(e.message)
    }
}

fn mismatched_output() -> SessionError {
    SessionError::Connection("queued operation resolved with a mismatched output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{HashMap, HashSet as StdHashSet};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::client::ClientResult;

    // ---- scriptable wallet double ----

    #[derive(Default)]
    struct MockShared {
        /// Relays that refuse every call with a transport error.
        failing: StdMutex<StdHashSet<String>>,
        /// Relays that never answer.
        hanging: StdMutex<StdHashSet<String>>,
        /// Capability set advertised by get_info.
        methods: StdMutex<Vec<String>>,
        balance_msat: AtomicU64,
        connect_counts: StdMutex<HashMap<String, u32>>,
        pay_count: AtomicU32,
    }

    impl MockShared {
        fn all_methods() -> Vec<String> {
            [
                capability::GET_INFO,
                capability::GET_BALANCE,
                capability::PAY_INVOICE,
                capability::MAKE_INVOICE,
                capability::LIST_TRANSACTIONS,
                capability::SIGN_MESSAGE,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect()
        }

        fn new() -> Arc<Self> {
            let shared = Self::default();
            *shared.methods.lock().unwrap() = Self::all_methods();
            shared.balance_msat.store(50_000_000, Ordering::SeqCst);
            Arc::new(shared)
        }

        fn fail_relay(&self, url: &str) {
            self.failing.lock().unwrap().insert(url.to_string());
        }

        fn heal_relay(&self, url: &str) {
            self.failing.lock().unwrap().remove(url);
        }

        fn hang_relay(&self, url: &str) {
            self.hanging.lock().unwrap().insert(url.to_string());
        }

        fn set_methods(&self, methods: &[&str]) {
            *self.methods.lock().unwrap() = methods.iter().map(|s| s.to_string()).collect();
        }

        fn connect_count(&self, url: &str) -> u32 {
            *self.connect_counts.lock().unwrap().get(url).unwrap_or(&0)
        }

        fn is_failing(&self, url: &str) -> bool {
            self.failing.lock().unwrap().contains(url)
        }

        fn is_hanging(&self, url: &str) -> bool {
            self.hanging.lock().unwrap().contains(url)
        }
    }

    struct MockClient {
        url: String,
        shared: Arc<MockShared>,
    }

    impl MockClient {
        fn check_relay(&self) -> ClientResult<()> {
            if self.shared.is_failing(&self.url) {
                return Err(ClientError::transport(format!(
                    "relay {} connection refused",
                    self.url
                )));
            }
            Ok(())
        }

        async fn hang_if_scripted(&self) {
            if self.shared.is_hanging(&self.url) {
                std::future::pending::<()>().await;
            }
        }
    }

    #[async_trait]
    impl WalletClient for MockClient {
        async fn get_info(&self) -> ClientResult<WalletInfo> {
            self.hang_if_scripted().await;
            self.check_relay()?;
            Ok(WalletInfo {
                alias: Some("mock-signer".to_string()),
                pubkey: Some("02mock".to_string()),
                network: Some("regtest".to_string()),
                methods: self.shared.methods.lock().unwrap().clone(),
            })
        }

        async fn sign_message(&self, message: &str) -> ClientResult<String> {
            self.hang_if_scripted().await;
            self.check_relay()?;
            Ok(format!("sig:{message}"))
        }

        async fn get_balance(&self) -> ClientResult<u64> {
            self.hang_if_scripted().await;
            self.check_relay()?;
            Ok(self.shared.balance_msat.load(Ordering::SeqCst))
        }

        async fn make_invoice(
            &self,
            amount_sats: u64,
            description: Option<&str>,
            _expiry_secs: Option<u64>,
        ) -> ClientResult<CreatedInvoice> {
            self.hang_if_scripted().await;
            self.check_relay()?;
            Ok(CreatedInvoice {
                invoice: format!("lnbcrt{amount_sats}u1mock{}", description.unwrap_or("")),
                payment_hash: "hash".to_string(),
            })
        }

        async fn list_transactions(&self) -> ClientResult<Vec<TransactionEntry>> {
            self.hang_if_scripted().await;
            self.check_relay()?;
            Ok(vec![TransactionEntry {
                direction: crate::models::TxDirection::Outgoing,
                amount_msat: 1_000_000,
                description: Some("asset purchase".to_string()),
                settled_at: chrono::DateTime::from_timestamp(1_700_000_000, 0),
            }])
        }

        async fn pay_invoice(&self, invoice: &str) -> ClientResult<PaymentResult> {
            self.hang_if_scripted().await;
            self.check_relay()?;
            if invoice.contains("reject") {
                return Err(ClientError::rejected("insufficient balance"));
            }
            self.shared.pay_count.fetch_add(1, Ordering::SeqCst);
            Ok(PaymentResult {
                payment_hash: Some("hash".to_string()),
                preimage: Some("preimage".to_string()),
                fees_paid_msat: Some(1_000),
            })
        }
    }

    struct MockConnector {
        shared: Arc<MockShared>,
    }

    #[async_trait]
    impl WalletConnector for MockConnector {
        async fn connect(
            &self,
            _credentials: &str,
            relay_url: &str,
        ) -> ClientResult<Arc<dyn WalletClient>> {
            *self
                .shared
                .connect_counts
                .lock()
                .unwrap()
                .entry(relay_url.to_string())
                .or_insert(0) += 1;

            if self.shared.is_hanging(relay_url) {
                std::future::pending::<()>().await;
            }
            if self.shared.is_failing(relay_url) {
                return Err(ClientError::transport(format!(
                    "relay {relay_url} connection refused"
                )));
            }
            Ok(Arc::new(MockClient {
                url: relay_url.to_string(),
                shared: self.shared.clone(),
            }))
        }
    }

    // ---- harness ----

    fn fast_config() -> SessionConfig {
        SessionConfig {
            max_relay_retries: 3,
            attempt_timeout: Duration::from_millis(100),
            relay_retry_delay: Duration::from_millis(5),
            max_reconnect_attempts: 3,
            reconnect_base_delay: Duration::from_millis(20),
            reconnect_max_delay: Duration::from_millis(80),
            probe_interval: Duration::from_millis(25),
            ..SessionConfig::default()
        }
    }

    struct Harness {
        session: WalletSession,
        shared: Arc<MockShared>,
        _dir: tempfile::TempDir,
    }

    fn harness_with(config: SessionConfig) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::open(dir.path()).expect("store");
        let shared = MockShared::new();
        let connector = Arc::new(MockConnector {
            shared: shared.clone(),
        });
        let session = WalletSession::new(connector, store, config);
        Harness {
            session,
            shared,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with(fast_config())
    }

    fn creds(relays: &[&str]) -> String {
        let query: Vec<String> = relays.iter().map(|r| format!("relay={r}")).collect();
        format!(
            "nostr+walletconnect://b889ff5b?{}&secret=71a8c14c",
            query.join("&")
        )
    }

    /// Record every state transition for later assertions.
    fn record_states(session: &WalletSession) -> (Subscription, Arc<StdMutex<Vec<ConnectionState>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = session.on_connection_state_change(move |state| {
            sink.lock().unwrap().push(state);
        });
        (sub, seen)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // ---- connect ----

    #[tokio::test]
    async fn connect_transitions_and_builds_user() {
        let h = harness();
        let (_sub, seen) = record_states(&h.session);

        let user = h
            .session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        assert_eq!(user.pubkey, "b889ff5b");
        assert_eq!(user.alias.as_deref(), Some("mock-signer"));
        assert!(h.session.is_authenticated().await);
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }

    #[tokio::test]
    async fn connect_lands_on_first_working_relay() {
        let h = harness();
        h.shared.fail_relay("wss://one.example");
        h.shared.fail_relay("wss://two.example");

        h.session
            .connect(&creds(&[
                "wss://one.example",
                "wss://two.example",
                "wss://three.example",
            ]))
            .await
            .expect("third relay works");

        // K = 2 relays failed first, so the index parked on relay 3.
        assert_eq!(h.session.current_relay_index().await, Some(2));
        let endpoints = h.session.relay_endpoints().await;
        assert_eq!(endpoints[0].failure_count, 1);
        assert_eq!(endpoints[1].failure_count, 1);
        assert!(endpoints[2].is_active);
        assert!(endpoints[2].last_connected_at.is_some());
    }

    #[tokio::test]
    async fn connect_fails_when_all_relays_refuse() {
        let h = harness();
        h.shared.fail_relay("wss://one.example");
        h.shared.fail_relay("wss://two.example");

        let err = h
            .session
            .connect(&creds(&["wss://one.example", "wss://two.example"]))
            .await
            .expect_err("no relay works");
        assert!(err.is_connection_class());
        assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);

        // No partial state: the failed connect persisted nothing, so the
        // session is still uninitialized.
        let err = h.session.get_balance().await.expect_err("not initialized");
        assert!(matches!(err, SessionError::NotInitialized));
    }

    #[tokio::test]
    async fn connect_times_out_hanging_relay_and_falls_back() {
        let h = harness();
        h.shared.hang_relay("wss://one.example");

        h.session
            .connect(&creds(&["wss://one.example", "wss://two.example"]))
            .await
            .expect("second relay answers");

        assert_eq!(h.session.current_relay_index().await, Some(1));
        assert_eq!(h.shared.connect_count("wss://one.example"), 1);
    }

    #[tokio::test]
    async fn operations_before_connect_fail_not_initialized() {
        let h = harness();
        for err in [
            h.session.get_balance().await.expect_err("balance"),
            h.session.sign_message("hello").await.expect_err("sign"),
            h.session.make_payment("lnbc1x").await.expect_err("pay"),
        ] {
            assert!(matches!(err, SessionError::NotInitialized));
        }
    }

    // ---- permissions ----

    #[tokio::test]
    async fn missing_permission_names_the_capability() {
        let h = harness();
        h.shared
            .set_methods(&[capability::GET_INFO, capability::SIGN_MESSAGE]);
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        let err = h.session.make_payment("lnbc1x").await.expect_err("no perm");
        match err {
            SessionError::MissingPermission(cap) => assert_eq!(cap, "pay_invoice"),
            other => panic!("expected MissingPermission, got {other:?}"),
        }

        assert!(h.session.has_permission(capability::SIGN_MESSAGE).await);
        assert!(!h.session.has_permission(capability::PAY_INVOICE).await);
        assert_eq!(
            h.session.permissions().await,
            vec!["get_info".to_string(), "sign_message".to_string()]
        );
    }

    // ---- operation fallback ----

    #[tokio::test]
    async fn rejection_surfaces_without_relay_fallback() {
        let h = harness();
        let (_sub, seen) = record_states(&h.session);
        h.session
            .connect(&creds(&["wss://one.example", "wss://two.example"]))
            .await
            .expect("connect");

        let err = h
            .session
            .make_payment("lnbc1rejectme")
            .await
            .expect_err("rejected");
        assert!(matches!(err, SessionError::Rejected(_)));

        // The second relay was never contacted and the session stayed up.
        assert_eq!(h.shared.connect_count("wss://two.example"), 0);
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
        assert!(!seen.lock().unwrap().contains(&ConnectionState::Disconnected));
    }

    #[tokio::test]
    async fn operation_fails_over_to_next_relay() {
        let h = harness();
        h.session
            .connect(&creds(&["wss://one.example", "wss://two.example"]))
            .await
            .expect("connect");

        h.shared.fail_relay("wss://one.example");
        let balance = h.session.get_balance().await.expect("failover succeeds");
        assert_eq!(balance, 50_000_000);

        assert_eq!(h.session.current_relay_index().await, Some(1));
        let endpoints = h.session.relay_endpoints().await;
        assert_eq!(endpoints[0].failure_count, 1);
        assert!(!endpoints[0].is_active);
        assert!(endpoints[1].is_active);
    }

    #[tokio::test]
    async fn three_relay_failover_reaches_the_survivor() {
        let h = harness();
        h.session
            .connect(&creds(&[
                "wss://one.example",
                "wss://two.example",
                "wss://three.example",
            ]))
            .await
            .expect("connect");

        h.shared.fail_relay("wss://one.example");
        h.shared.fail_relay("wss://two.example");

        let balance = h.session.get_balance().await.expect("relay three answers");
        assert_eq!(balance, 50_000_000);

        let endpoints = h.session.relay_endpoints().await;
        assert!(endpoints[0].failure_count >= 1);
        assert!(endpoints[1].failure_count >= 1);
        assert!(endpoints[2].is_active);
    }

    // ---- disconnection and reconnection ----

    #[tokio::test]
    async fn exhaustion_causes_one_disconnect_and_one_reconnect_loop() {
        let h = harness();
        let (_sub, seen) = record_states(&h.session);
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        h.shared.fail_relay("wss://one.example");

        // Two operations fail concurrently.
        let s1 = h.session.clone();
        let s2 = h.session.clone();
        let (r1, r2) = tokio::join!(s1.get_balance(), s2.sign_message("x"));
        assert!(r1.expect_err("fails").is_connection_class());
        assert!(r2.expect_err("fails").is_connection_class());

        // Exactly one transition to disconnected was broadcast.
        let disconnects = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == ConnectionState::Disconnected)
            .count();
        assert_eq!(disconnects, 1);
        assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);

        // Heal the relay; the single reconnect loop brings the session back.
        h.shared.heal_relay("wss://one.example");
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn reconnect_gives_up_after_max_attempts() {
        let h = harness();
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        h.shared.fail_relay("wss://one.example");
        let _ = h.session.get_balance().await;

        // Backoff sum: 20 + 40 + 80 ms, plus per-attempt work; wait it out.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);

        // No further automatic attempts after exhaustion.
        let attempts_after_exhaustion = h.shared.connect_count("wss://one.example");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            h.shared.connect_count("wss://one.example"),
            attempts_after_exhaustion
        );
    }

    // ---- queuing ----

    #[tokio::test]
    async fn payment_queues_while_disconnected_and_drains_on_reconnect() {
        let h = harness();
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        h.shared.fail_relay("wss://one.example");
        let _ = h.session.get_balance().await; // drive into disconnected

        // The payment parks instead of failing.
        let session = h.session.clone();
        let payment = tokio::spawn(async move { session.make_payment("lnbc1drained").await });
        settle().await;
        assert!(!payment.is_finished(), "payment must not resolve while down");
        assert_eq!(h.shared.pay_count.load(Ordering::SeqCst), 0);

        // Reconnect drains the queue in order.
        h.shared.heal_relay("wss://one.example");
        let result = tokio::time::timeout(Duration::from_millis(500), payment)
            .await
            .expect("resolves after reconnect")
            .expect("join");
        let result = result.expect("payment succeeded");
        assert_eq!(result.preimage.as_deref(), Some("preimage"));
        assert_eq!(h.shared.pay_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn balance_read_queues_while_disconnected() {
        let h = harness();
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        h.shared.fail_relay("wss://one.example");
        let _ = h.session.get_balance().await;

        let session = h.session.clone();
        let read = tokio::spawn(async move { session.get_balance().await });
        settle().await;
        assert!(!read.is_finished());

        h.shared.heal_relay("wss://one.example");
        let balance = tokio::time::timeout(Duration::from_millis(500), read)
            .await
            .expect("resolves")
            .expect("join")
            .expect("balance");
        assert_eq!(balance, 50_000_000);
    }

    #[tokio::test]
    async fn interactive_calls_fail_fast_while_disconnected() {
        let h = harness();
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        h.shared.fail_relay("wss://one.example");
        let _ = h.session.get_balance().await;

        let err = h
            .session
            .make_invoice(1_000, Some("listing"), None)
            .await
            .expect_err("fails fast");
        assert!(err.is_connection_class());

        let err = h.session.sign_message("x").await.expect_err("fails fast");
        assert!(err.is_connection_class());
    }

    // ---- logout ----

    #[tokio::test]
    async fn logout_rejects_queued_operations_and_erases_state() {
        let h = harness();
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        h.shared.fail_relay("wss://one.example");
        let _ = h.session.get_balance().await;

        let session = h.session.clone();
        let payment = tokio::spawn(async move { session.make_payment("lnbc1parked").await });
        settle().await;
        assert!(!payment.is_finished());

        h.session.logout().await;

        let err = tokio::time::timeout(Duration::from_millis(200), payment)
            .await
            .expect("rejected promptly")
            .expect("join")
            .expect_err("cancelled");
        assert!(matches!(err, SessionError::Cancelled));

        assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
        assert!(!h.session.is_authenticated().await);
        assert!(h.session.permissions().await.is_empty());
        assert!(matches!(
            h.session.get_balance().await.expect_err("gone"),
            SessionError::NotInitialized
        ));
    }

    // ---- restoration ----

    #[tokio::test]
    async fn session_restores_from_persisted_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shared = MockShared::new();

        {
            let store = SessionStore::open(dir.path()).expect("store");
            let session = WalletSession::new(
                Arc::new(MockConnector {
                    shared: shared.clone(),
                }),
                store,
                fast_config(),
            );
            session
                .connect(&creds(&["wss://one.example"]))
                .await
                .expect("first connect");
        }

        // A fresh session over the same store initializes lazily on the
        // first operation, without an explicit connect call.
        let store = SessionStore::open(dir.path()).expect("store");
        let session = WalletSession::new(
            Arc::new(MockConnector {
                shared: shared.clone(),
            }),
            store,
            fast_config(),
        );

        let balance = session.get_balance().await.expect("restored");
        assert_eq!(balance, 50_000_000);
        assert_eq!(session.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_initialization() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shared = MockShared::new();

        {
            let store = SessionStore::open(dir.path()).expect("store");
            let session = WalletSession::new(
                Arc::new(MockConnector {
                    shared: shared.clone(),
                }),
                store,
                fast_config(),
            );
            session
                .connect(&creds(&["wss://one.example"]))
                .await
                .expect("seed credentials");
        }
        let connects_before = shared.connect_count("wss://one.example");

        let store = SessionStore::open(dir.path()).expect("store");
        let session = WalletSession::new(
            Arc::new(MockConnector {
                shared: shared.clone(),
            }),
            store,
            fast_config(),
        );

        let (a, b, c) = tokio::join!(
            session.get_balance(),
            session.get_balance(),
            session.sign_message("hello")
        );
        a.expect("balance a");
        b.expect("balance b");
        c.expect("signature");

        // One shared restore, not one per caller.
        assert_eq!(
            shared.connect_count("wss://one.example"),
            connects_before + 1
        );
    }

    // ---- probe ----

    #[tokio::test]
    async fn liveness_probe_detects_dead_relay() {
        let h = harness();
        let (_sub, seen) = record_states(&h.session);
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        // No operation runs; only the probe can notice the failure.
        h.shared.fail_relay("wss://one.example");
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(seen
            .lock()
            .unwrap()
            .contains(&ConnectionState::Disconnected));
    }

    // ---- node registration ----

    #[tokio::test]
    async fn node_registration_upgrades_and_persists_the_user() {
        let h = harness();
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");

        let node = h
            .session
            .register_as_node(NodeRegistration {
                pubkey: "b889ff5b".to_string(),
                alias: "tap-node".to_string(),
                description: Some("regtest asset node".to_string()),
            })
            .await
            .expect("registered");

        assert_eq!(node.user_type, UserType::Node);
        assert!(h.session.is_node_runner().await);

        // Survives reconnect: build_user prefers the stored identity.
        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("reconnect");
        assert!(h.session.is_node_runner().await);
    }

    #[tokio::test]
    async fn node_registration_requires_a_session() {
        let h = harness();
        let err = h
            .session
            .register_as_node(NodeRegistration {
                pubkey: "ab".to_string(),
                alias: "x".to_string(),
                description: None,
            })
            .await
            .expect_err("no session");
        assert!(matches!(err, SessionError::NotInitialized));
    }

    // ---- listeners ----

    #[tokio::test]
    async fn dropped_subscription_stops_receiving() {
        let h = harness();
        let (sub, seen) = record_states(&h.session);

        h.session
            .connect(&creds(&["wss://one.example"]))
            .await
            .expect("connect");
        let count_before = seen.lock().unwrap().len();
        assert_eq!(count_before, 2);

        sub.unsubscribe();
        h.session.logout().await;
        assert_eq!(seen.lock().unwrap().len(), count_before);
    }
}
