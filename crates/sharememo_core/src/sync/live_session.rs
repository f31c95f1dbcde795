//! Debounced live editing session for one shared memo.
//!
//! # Responsibility
//! - Keep the local copy of memo content in step with store snapshots.
//! - Coalesce bursts of local edits into one content write per idle period.
//! - Flush pending edits when the session closes.
//!
//! # Invariants
//! - A session owns at most one listener and at most one armed timer.
//! - A timer fire or close whose content equals the last committed content
//!   issues no write.
//! - A snapshot carrying the committed content never overwrites pending
//!   local edits.
//! - Committed content advances only when the store acknowledges a write
//!   or delivers a snapshot.
//! - At most one content write is in flight; `close()` waits for it.
//! - Aborting the timer never cancels a write that already started.
//! - After `close()` or drop no further `on_remote` callbacks are delivered.

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::memo::{content_update_fields, MemoId};
use crate::store::{
    Document, DocumentStore, SnapshotCallback, StoreResult, SubscriptionHandle, MEMOS,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

const CONTENT_FIELD: &str = "content";

/// Receives memo content applied from a store snapshot.
pub type RemoteContentCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Subscribed,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Subscribed => "subscribed",
            Self::Closed => "closed",
        }
    }
}

/// Factory for memo sessions sharing one store and debounce delay.
#[derive(Clone)]
pub struct LiveSyncEngine {
    store: Arc<dyn DocumentStore>,
    debounce: Duration,
}

impl LiveSyncEngine {
    pub fn new(store: Arc<dyn DocumentStore>, debounce: Duration) -> Self {
        Self { store, debounce }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &CoreConfig) -> Self {
        Self::new(store, config.debounce())
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Creates an idle session; call `MemoSession::open` to start syncing.
    pub fn session(&self, memo_id: impl Into<MemoId>) -> MemoSession {
        MemoSession {
            shared: Arc::new(SessionShared {
                memo_id: memo_id.into(),
                store: Arc::clone(&self.store),
                content: Mutex::new(ContentState::default()),
                write_gate: tokio::sync::Mutex::new(()),
            }),
            debounce: self.debounce,
            state: SessionState::Idle,
            runtime: None,
            subscription: None,
            timer: None,
        }
    }

    pub async fn open_session(
        &self,
        memo_id: impl Into<MemoId>,
        on_remote: impl Fn(&str) + Send + Sync + 'static,
    ) -> CoreResult<MemoSession> {
        let mut session = self.session(memo_id);
        session.open(on_remote).await?;
        Ok(session)
    }
}

#[derive(Debug, Default)]
struct ContentState {
    local: String,
    /// Content the store has acknowledged or delivered.
    committed: String,
    /// Content of the write currently awaiting the store.
    in_flight: Option<String>,
}

impl ContentState {
    fn is_dirty(&self) -> bool {
        self.local != self.committed
    }

    /// Whether `incoming` is content this session already wrote or saw.
    fn is_known(&self, incoming: &str) -> bool {
        incoming == self.committed || self.in_flight.as_deref() == Some(incoming)
    }
}

/// State reachable from the listener and timer tasks.
struct SessionShared {
    memo_id: MemoId,
    store: Arc<dyn DocumentStore>,
    content: Mutex<ContentState>,
    /// Held for the whole duration of a content write.
    write_gate: tokio::sync::Mutex<()>,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, ContentState> {
        self.content.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the content to hand to `on_remote`, if the snapshot applies.
    fn apply_snapshot(&self, document: &Document) -> Option<String> {
        let incoming = document
            .fields
            .get(CONTENT_FIELD)
            .and_then(|value| value.as_str())
            .unwrap_or_default();

        let mut content = self.lock();
        if content.is_dirty() && content.local != incoming && content.is_known(incoming) {
            debug!(
                "event=sync_snapshot module=sync status=stale_echo memo_id={}",
                self.memo_id
            );
            return None;
        }
        content.local = incoming.to_string();
        content.committed = incoming.to_string();
        Some(incoming.to_string())
    }

    /// Hands out local content for writing unless the store already has it.
    fn take_write(&self) -> Option<String> {
        let mut content = self.lock();
        if !content.is_dirty() {
            debug!(
                "event=sync_write module=sync status=skipped reason=unchanged memo_id={}",
                self.memo_id
            );
            return None;
        }
        let local = content.local.clone();
        content.in_flight = Some(local.clone());
        Some(local)
    }

    /// Writes the latest local content once earlier writes have settled.
    ///
    /// Committed content only advances when the store acknowledges the write,
    /// so a failed write leaves the session dirty.
    async fn flush(&self) -> CoreResult<bool> {
        let _gate = self.write_gate.lock().await;
        let Some(local) = self.take_write() else {
            return Ok(false);
        };

        let content_len = local.len();
        let fields = content_update_fields(&local, Utc::now());
        let result = self.store.update(MEMOS, &self.memo_id, fields).await;

        let mut content = self.lock();
        content.in_flight = None;
        match result {
            Ok(()) => {
                content.committed = local;
                drop(content);
                info!(
                    "event=sync_write module=sync status=ok memo_id={} content_len={content_len}",
                    self.memo_id
                );
                Ok(true)
            }
            Err(err) => {
                drop(content);
                let err = CoreError::from(err);
                warn!(
                    "event=sync_write module=sync status=error memo_id={} error_code={}",
                    self.memo_id,
                    err.code()
                );
                Err(err)
            }
        }
    }
}

/// One open memo: listener, debounce timer and local/committed content.
pub struct MemoSession {
    shared: Arc<SessionShared>,
    debounce: Duration,
    state: SessionState,
    runtime: Option<Handle>,
    subscription: Option<SubscriptionHandle>,
    timer: Option<JoinHandle<()>>,
}

impl MemoSession {
    pub fn memo_id(&self) -> &str {
        &self.shared.memo_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn local_content(&self) -> String {
        self.shared.lock().local.clone()
    }

    pub fn committed_content(&self) -> String {
        self.shared.lock().committed.clone()
    }

    /// Whether local content differs from the last acknowledged content.
    pub fn is_dirty(&self) -> bool {
        self.shared.lock().is_dirty()
    }

    /// Registers the single document listener.
    ///
    /// The current snapshot is applied before this returns.
    ///
    /// # Errors
    /// - `InvalidSessionState` unless the session is idle.
    /// - `ValidationFailed` outside a tokio runtime.
    /// - `NotFound` when the memo does not exist; the session stays idle.
    /// - Store failures while subscribing.
    pub async fn open(
        &mut self,
        on_remote: impl Fn(&str) + Send + Sync + 'static,
    ) -> CoreResult<()> {
        self.expect_state(SessionState::Idle)?;
        let runtime = Handle::try_current().map_err(|err| {
            CoreError::ValidationFailed(format!("live sync needs a tokio runtime: {err}"))
        })?;

        if self.shared.store.get(MEMOS, &self.shared.memo_id).await?.is_none() {
            return Err(CoreError::NotFound(format!(
                "{MEMOS}/{}",
                self.shared.memo_id
            )));
        }

        let on_remote: RemoteContentCallback = Arc::new(on_remote);
        let shared = Arc::clone(&self.shared);
        let on_change: SnapshotCallback = Arc::new(move |snapshot: StoreResult<Document>| {
            match snapshot {
                Ok(document) => {
                    if let Some(content) = shared.apply_snapshot(&document) {
                        on_remote(&content);
                    }
                }
                Err(err) => warn!(
                    "event=sync_snapshot module=sync status=error memo_id={} error_code={}",
                    shared.memo_id,
                    CoreError::from(err).code()
                ),
            }
        });

        let subscription = self
            .shared
            .store
            .subscribe(MEMOS, &self.shared.memo_id, on_change)
            .await?;
        self.subscription = Some(subscription);
        self.runtime = Some(runtime);
        self.state = SessionState::Subscribed;
        info!(
            "event=sync_open module=sync status=ok memo_id={}",
            self.shared.memo_id
        );
        Ok(())
    }

    /// Replaces local content and re-arms the debounce timer.
    ///
    /// # Errors
    /// - `InvalidSessionState` unless the session is subscribed.
    pub fn edit(&mut self, text: impl Into<String>) -> CoreResult<()> {
        self.expect_state(SessionState::Subscribed)?;
        let Some(runtime) = self.runtime.clone() else {
            return Err(CoreError::InvalidSessionState {
                expected: SessionState::Subscribed.as_str(),
                found: self.state.as_str(),
            });
        };

        self.shared.lock().local = text.into();
        self.cancel_timer();

        let shared = Arc::clone(&self.shared);
        let delay = self.debounce;
        let writer = runtime.clone();
        self.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if shared.lock().is_dirty() {
                // Outlives the timer task: aborting the timer leaves it running.
                writer.spawn(async move {
                    let _ = shared.flush().await;
                });
            }
        }));
        Ok(())
    }

    /// Stops listening and writes pending edits once.
    ///
    /// Closing an already closed session is a no-op.
    ///
    /// # Errors
    /// - Store failure of the final write. The session is closed regardless.
    pub async fn close(&mut self) -> CoreResult<()> {
        match self.state {
            SessionState::Closed => return Ok(()),
            SessionState::Idle => {
                self.state = SessionState::Closed;
                return Ok(());
            }
            SessionState::Subscribed => {}
        }

        self.release_listener();
        self.cancel_timer();
        self.state = SessionState::Closed;

        // Waits for a debounced write still in flight before deciding.
        let flushed = self.shared.flush().await?;
        info!(
            "event=sync_close module=sync status=ok memo_id={} flushed={flushed}",
            self.shared.memo_id
        );
        Ok(())
    }

    fn expect_state(&self, expected: SessionState) -> CoreResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidSessionState {
                expected: expected.as_str(),
                found: self.state.as_str(),
            })
        }
    }

    fn release_listener(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.shared.store.unsubscribe(subscription);
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for MemoSession {
    fn drop(&mut self) {
        if self.state != SessionState::Subscribed {
            return;
        }
        self.release_listener();
        self.cancel_timer();
        self.state = SessionState::Closed;

        if !self.shared.lock().is_dirty() {
            return;
        }
        match &self.runtime {
            Some(runtime) => {
                warn!(
                    "event=sync_drop module=sync status=flushing memo_id={}",
                    self.shared.memo_id
                );
                let shared = Arc::clone(&self.shared);
                runtime.spawn(async move {
                    let _ = shared.flush().await;
                });
            }
            None => warn!(
                "event=sync_drop module=sync status=lost_edits memo_id={}",
                self.shared.memo_id
            ),
        }
    }
}
