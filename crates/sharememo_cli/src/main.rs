//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `sharememo_core` linkage.
//! - Walk one pairing + shared memo + live edit flow against a local store.
//! - Keep output deterministic for quick local sanity checks.

use sharememo_core::{
    init_logging_from_config, CoreConfig, CoreResult, DocumentStore, Identity, LiveSyncEngine,
    MemoResolver, Profile, ProfileService, RelationshipService, SessionIdentityProvider,
    SqliteDocumentStore,
};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    println!("sharememo_core ping={}", sharememo_core::ping());
    println!("sharememo_core version={}", sharememo_core::core_version());

    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_logging_from_config(&config) {
        eprintln!("logging error: {err}");
        return ExitCode::FAILURE;
    }

    match run_demo(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("demo failed: code={} {err}", err.code());
            ExitCode::FAILURE
        }
    }
}

async fn run_demo(config: &CoreConfig) -> CoreResult<()> {
    let store: Arc<dyn DocumentStore> = Arc::new(match &config.db_path {
        Some(path) => SqliteDocumentStore::open(path)?,
        None => SqliteDocumentStore::open_in_memory()?,
    });
    let alice = Identity::new("demo-alice")?;
    let bob = Identity::new("demo-bob")?;
    let session = Arc::new(SessionIdentityProvider::signed_in(alice.clone()));

    let profiles = ProfileService::new(Arc::clone(&store));
    for (identity, name) in [(&alice, "alice"), (&bob, "bob")] {
        let mut profile = Profile::new(identity.clone(), format!("{name}@example.com"));
        profile.display_name = name.to_string();
        profiles.save_profile(&profile).await?;
    }

    let relationships = RelationshipService::new(Arc::clone(&store), session.clone());
    if !relationships.is_already_friend(&alice, &bob).await? {
        relationships.add_friend(&bob).await?;
    }
    println!(
        "friends alice={} bob={}",
        relationships.list_relationships(&alice).await?.len(),
        relationships.list_relationships(&bob).await?.len()
    );

    let memos = MemoResolver::new(Arc::clone(&store), session);
    let memo = match memos.find_shared_document(&alice, &bob).await? {
        Some(memo) => memo,
        None => {
            memos
                .create_shared_document_if_absent(&alice, &bob, "demo")
                .await?
        }
    };
    println!("memo id={} title={}", memo.id, memo.title);

    let engine = LiveSyncEngine::from_config(Arc::clone(&store), config);
    let mut live = engine
        .open_session(memo.id.clone(), |content: &str| {
            println!("remote content_len={}", content.len());
        })
        .await?;
    live.edit("milk")?;
    live.edit("milk, eggs")?;
    live.close().await?;

    let stored = memos.get_shared_document(&memo.id).await?;
    println!("memo content_len={} saved", stored.content.len());
    Ok(())
}
