//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Own the process-wide core context: runtime, store, session and open memos.
//! - Flatten `CoreError` into `{ok, error_code, message}` envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - The core context is created once per process; later configuration is rejected.
//! - At most one live session exists per memo id.

use log::{info, warn};
use once_cell::sync::OnceCell;
use sharememo_core::{
    core_version as core_version_inner, init_logging as init_logging_inner,
    init_logging_from_config, ping as ping_inner, CoreConfig, CoreError, CoreResult,
    DetailHydrator, DocumentStore, HydratedRecord, Identity, IdentityProvider, LiveSyncEngine,
    MemoResolver, MemoSession, Profile, ProfileService, RelationshipService, SessionIdentityProvider,
    SharedDocument, SqliteDocumentStore,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::{Builder, Runtime};

const RUNTIME_WORKER_THREADS: usize = 2;

static CONTEXT: OnceCell<FfiContext> = OnceCell::new();

struct OpenMemo {
    session: MemoSession,
    revision: Arc<AtomicU64>,
}

struct FfiContext {
    runtime: Runtime,
    identity: Arc<SessionIdentityProvider>,
    profiles: ProfileService,
    relationships: RelationshipService,
    memos: MemoResolver,
    hydrator: DetailHydrator,
    sync: LiveSyncEngine,
    open_memos: Mutex<HashMap<String, OpenMemo>>,
}

impl FfiContext {
    fn build(config: CoreConfig) -> Result<Self, String> {
        init_logging_from_config(&config).map_err(|err| format!("logging init failed: {err}"))?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(RUNTIME_WORKER_THREADS)
            .thread_name("sharememo-core")
            .enable_all()
            .build()
            .map_err(|err| format!("runtime start failed: {err}"))?;
        let store = match &config.db_path {
            Some(path) => SqliteDocumentStore::open(path),
            None => SqliteDocumentStore::open_in_memory(),
        }
        .map_err(|err| format!("store open failed: {err}"))?;

        let store: Arc<dyn DocumentStore> = Arc::new(store);
        let identity = Arc::new(SessionIdentityProvider::new());
        let provider: Arc<dyn IdentityProvider> = identity.clone();
        let profiles = ProfileService::new(Arc::clone(&store));
        info!(
            "event=ffi_context_init module=ffi status=ok persistent={} debounce_ms={}",
            config.db_path.is_some(),
            config.debounce_ms
        );
        Ok(Self {
            runtime,
            identity,
            relationships: RelationshipService::new(Arc::clone(&store), Arc::clone(&provider)),
            memos: MemoResolver::new(Arc::clone(&store), provider),
            hydrator: DetailHydrator::new(profiles.clone()),
            profiles,
            sync: LiveSyncEngine::from_config(store, &config),
            open_memos: Mutex::new(HashMap::new()),
        })
    }

    fn open_memos(&self) -> MutexGuard<'_, HashMap<String, OpenMemo>> {
        self.open_memos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn context() -> Result<&'static FfiContext, Failure> {
    CONTEXT
        .get_or_try_init(|| {
            let config = CoreConfig::from_env().map_err(|err| err.to_string())?;
            FfiContext::build(config)
        })
        .map_err(Failure::context)
}

/// Failure flattened for envelopes.
struct Failure {
    code: &'static str,
    message: String,
}

impl Failure {
    fn core(operation: &str, err: CoreError) -> Self {
        warn!(
            "event=ffi_call module=ffi status=error op={operation} error_code={}",
            err.code()
        );
        Self {
            code: err.code(),
            message: format!("{operation} failed: {err}"),
        }
    }

    fn context(message: String) -> Self {
        Self {
            code: "context_unavailable",
            message,
        }
    }
}

fn with_context<T>(
    operation: &str,
    call: impl FnOnce(&'static FfiContext) -> CoreResult<T>,
) -> Result<T, Failure> {
    let ctx = context()?;
    call(ctx).map_err(|err| Failure::core(operation, err))
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Stable error code; empty on success.
    pub error_code: String,
    /// Id of the created or affected record, when there is one.
    pub id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>, id: Option<String>) -> Self {
        Self {
            ok: true,
            error_code: String::new(),
            id,
            message: message.into(),
        }
    }

    fn from_result(result: Result<Option<String>, Failure>, message: &str) -> Self {
        match result {
            Ok(id) => Self::success(message, id),
            Err(failure) => Self {
                ok: false,
                error_code: failure.code.to_string(),
                id: None,
                message: failure.message,
            },
        }
    }
}

/// Profile projection shown in friend and memo lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileItem {
    pub identity: String,
    pub display_name: String,
    pub email: String,
    pub profile_image_url: String,
}

impl From<Profile> for ProfileItem {
    fn from(profile: Profile) -> Self {
        Self {
            identity: profile.identity.to_string(),
            display_name: profile.display_name,
            email: profile.email,
            profile_image_url: profile.profile_image_url,
        }
    }
}

/// Response envelope for profile lookups and friend requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileResponse {
    pub ok: bool,
    pub error_code: String,
    pub profile: Option<ProfileItem>,
    pub message: String,
}

/// Response envelope for the hydrated friend list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendListResponse {
    pub ok: bool,
    pub error_code: String,
    pub items: Vec<ProfileItem>,
    pub message: String,
}

/// Memo list row paired with the peer's profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoItem {
    pub memo_id: String,
    pub title: String,
    pub peer: ProfileItem,
    /// Last modification in epoch milliseconds.
    pub last_modified_at_ms: i64,
}

impl From<HydratedRecord<SharedDocument>> for MemoItem {
    fn from(item: HydratedRecord<SharedDocument>) -> Self {
        Self {
            memo_id: item.record.id,
            title: item.record.title,
            peer: item.profile.into(),
            last_modified_at_ms: item.record.last_modified_at.timestamp_millis(),
        }
    }
}

/// Response envelope for the memo list, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoListResponse {
    pub ok: bool,
    pub error_code: String,
    pub items: Vec<MemoItem>,
    pub message: String,
}

/// Current state of one open memo session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoContentResponse {
    pub ok: bool,
    pub error_code: String,
    pub memo_id: String,
    /// Local content, including unsaved edits.
    pub content: String,
    /// Incremented whenever a store snapshot replaced the content.
    pub revision: u64,
    /// Whether local edits are not yet committed.
    pub dirty: bool,
    pub message: String,
}

impl MemoContentResponse {
    fn from_result(memo_id: String, result: Result<(String, u64, bool), Failure>) -> Self {
        match result {
            Ok((content, revision, dirty)) => Self {
                ok: true,
                error_code: String::new(),
                memo_id,
                content,
                revision,
                dirty,
                message: String::new(),
            },
            Err(failure) => Self {
                ok: false,
                error_code: failure.code.to_string(),
                memo_id,
                content: String::new(),
                revision: 0,
                dirty: false,
                message: failure.message,
            },
        }
    }
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Creates the core context with an explicit database file.
///
/// Environment configuration (`SHAREMEMO_*`) still applies to every other
/// setting. Fails once the context exists, including the implicit one
/// created by the first call of any other API.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_core(db_path: Option<String>) -> ActionResponse {
    let result = (|| {
        if CONTEXT.get().is_some() {
            return Err(Failure::context("core already configured".to_string()));
        }
        let mut config = CoreConfig::from_env().map_err(|err| Failure::context(err.to_string()))?;
        if let Some(path) = db_path.map(|raw| raw.trim().to_string()) {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }
        let ctx = FfiContext::build(config).map_err(Failure::context)?;
        CONTEXT
            .set(ctx)
            .map_err(|_| Failure::context("core already configured".to_string()))?;
        Ok(None)
    })();
    ActionResponse::from_result(result, "Core configured.")
}

/// Records the signed-in identity issued by the auth provider.
#[flutter_rust_bridge::frb(sync)]
pub fn sign_in(identity: String) -> ActionResponse {
    let result = with_context("sign_in", |ctx| {
        let identity = Identity::new(identity)?;
        ctx.identity.sign_in(identity.clone());
        Ok(Some(identity.to_string()))
    });
    ActionResponse::from_result(result, "Signed in.")
}

/// Clears the session; open memos are released and flushed in background.
#[flutter_rust_bridge::frb(sync)]
pub fn sign_out() -> ActionResponse {
    let result = with_context("sign_out", |ctx| {
        let released: Vec<OpenMemo> = ctx.open_memos().drain().map(|(_, memo)| memo).collect();
        drop(released);
        ctx.identity.sign_out();
        Ok(None)
    });
    ActionResponse::from_result(result, "Signed out.")
}

/// Creates or replaces the signed-in user's profile.
#[flutter_rust_bridge::frb(sync)]
pub fn save_profile(email: String, display_name: String) -> ActionResponse {
    let result = with_context("save_profile", |ctx| {
        let me = ctx.identity.require_identity()?;
        let mut profile = Profile::new(me.clone(), email.trim());
        profile.display_name = display_name.trim().to_string();
        ctx.runtime.block_on(ctx.profiles.save_profile(&profile))?;
        Ok(Some(me.to_string()))
    });
    ActionResponse::from_result(result, "Profile saved.")
}

/// Validates and creates a mutual friendship with `candidate`.
#[flutter_rust_bridge::frb(sync)]
pub fn add_friend(candidate: String) -> ProfileResponse {
    let result = with_context("add_friend", |ctx| {
        let candidate = Identity::new(candidate)?;
        ctx.runtime.block_on(ctx.relationships.add_friend(&candidate))
    });
    match result {
        Ok(profile) => ProfileResponse {
            ok: true,
            error_code: String::new(),
            profile: Some(profile.into()),
            message: "Friend added.".to_string(),
        },
        Err(failure) => ProfileResponse {
            ok: false,
            error_code: failure.code.to_string(),
            profile: None,
            message: failure.message,
        },
    }
}

/// Lists friends of the signed-in user with their profiles.
#[flutter_rust_bridge::frb(sync)]
pub fn list_friends() -> FriendListResponse {
    let result = with_context("list_friends", |ctx| {
        let me = ctx.identity.require_identity()?;
        ctx.runtime.block_on(async {
            let relationships = ctx.relationships.list_relationships(&me).await?;
            ctx.hydrator.hydrate_relationships(relationships).await
        })
    });
    match result {
        Ok(items) => FriendListResponse {
            ok: true,
            error_code: String::new(),
            message: format!("Found {} friend(s).", items.len()),
            items: items.into_iter().map(|item| item.profile.into()).collect(),
        },
        Err(failure) => FriendListResponse {
            ok: false,
            error_code: failure.code.to_string(),
            items: Vec::new(),
            message: failure.message,
        },
    }
}

/// Creates the memo shared by the signed-in user and `peer`.
#[flutter_rust_bridge::frb(sync)]
pub fn create_memo(peer: String, title: String) -> ActionResponse {
    let result = with_context("create_memo", |ctx| {
        let me = ctx.identity.require_identity()?;
        let peer = Identity::new(peer)?;
        let memo = ctx.runtime.block_on(
            ctx.memos
                .create_shared_document_if_absent(&me, &peer, title.trim()),
        )?;
        Ok(Some(memo.id))
    });
    ActionResponse::from_result(result, "Memo created.")
}

/// Lists the signed-in user's memos, newest first, with peer profiles.
#[flutter_rust_bridge::frb(sync)]
pub fn list_memos() -> MemoListResponse {
    let result = with_context("list_memos", |ctx| {
        let me = ctx.identity.require_identity()?;
        ctx.runtime.block_on(async {
            let memos = ctx.memos.latest_documents_for(&me).await?;
            ctx.hydrator.hydrate_memo_peers(memos, &me).await
        })
    });
    match result {
        Ok(items) => MemoListResponse {
            ok: true,
            error_code: String::new(),
            message: format!("Found {} memo(s).", items.len()),
            items: items.into_iter().map(MemoItem::from).collect(),
        },
        Err(failure) => MemoListResponse {
            ok: false,
            error_code: failure.code.to_string(),
            items: Vec::new(),
            message: failure.message,
        },
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn rename_memo(memo_id: String, title: String) -> ActionResponse {
    let result = with_context("rename_memo", |ctx| {
        ctx.runtime
            .block_on(ctx.memos.rename_shared_document(&memo_id, title.trim()))?;
        Ok(Some(memo_id.clone()))
    });
    ActionResponse::from_result(result, "Memo renamed.")
}

/// Opens a live session; reopening an already open memo returns its state.
#[flutter_rust_bridge::frb(sync)]
pub fn open_memo(memo_id: String) -> MemoContentResponse {
    let result = with_context("open_memo", |ctx| {
        ctx.identity.require_identity()?;
        if let Some(open) = ctx.open_memos().get(&memo_id) {
            return Ok(snapshot(open));
        }

        let revision = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&revision);
        let session = ctx.runtime.block_on(async {
            ctx.memos.get_shared_document(&memo_id).await?;
            ctx.sync
                .open_session(memo_id.clone(), move |_content: &str| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await
        })?;
        let open = OpenMemo { session, revision };
        let state = snapshot(&open);
        ctx.open_memos().insert(memo_id.clone(), open);
        Ok(state)
    });
    MemoContentResponse::from_result(memo_id, result)
}

/// Applies a local edit; the write follows after the debounce delay.
#[flutter_rust_bridge::frb(sync)]
pub fn edit_memo(memo_id: String, content: String) -> ActionResponse {
    let result = with_context("edit_memo", |ctx| {
        let mut open_memos = ctx.open_memos();
        let open = open_memos
            .get_mut(&memo_id)
            .ok_or_else(|| CoreError::NotFound(format!("open memo `{memo_id}`")))?;
        open.session.edit(content)?;
        Ok(Some(memo_id.clone()))
    });
    ActionResponse::from_result(result, "Edit queued.")
}

/// Reads the current state of an open memo.
#[flutter_rust_bridge::frb(sync)]
pub fn memo_content(memo_id: String) -> MemoContentResponse {
    let result = with_context("memo_content", |ctx| {
        ctx.open_memos()
            .get(&memo_id)
            .map(snapshot)
            .ok_or_else(|| CoreError::NotFound(format!("open memo `{memo_id}`")))
    });
    MemoContentResponse::from_result(memo_id, result)
}

/// Closes a session, writing pending edits before returning.
#[flutter_rust_bridge::frb(sync)]
pub fn close_memo(memo_id: String) -> ActionResponse {
    let result = with_context("close_memo", |ctx| {
        let open = ctx.open_memos().remove(&memo_id);
        let Some(mut open) = open else {
            return Ok(None);
        };
        ctx.runtime.block_on(open.session.close())?;
        Ok(Some(memo_id.clone()))
    });
    ActionResponse::from_result(result, "Memo closed.")
}

fn snapshot(open: &OpenMemo) -> (String, u64, bool) {
    (
        open.session.local_content(),
        open.revision.load(Ordering::SeqCst),
        open.session.is_dirty(),
    )
}
