mod mock_repo;

use std::sync::Arc;

use mock_repo::MockRepo;
use store::kv::{KvStore, PutOptions};
use store::{MemoryKv, keys};

use profile::model::SESSION_TTL_MS;
use profile::preferences::{Preferences, TradingFocus};
use profile::vault::{CredentialVault, VenueCredential};
use profile::ProfileManager;

async fn mk_manager(repo: MockRepo, kv: Arc<MemoryKv>) -> ProfileManager<MockRepo> {
    ProfileManager::new(Arc::new(repo), CredentialVault::new("kms://test"), kv)
        .await
        .expect("manager init")
}

#[tokio::test]
async fn first_contact_creates_profile_and_session() {
    let repo = MockRepo::new();
    let manager = mk_manager(repo.clone(), Arc::new(MemoryKv::new())).await;

    let profile = manager.on_first_contact(42, 1_000).await.unwrap();
    assert_eq!(profile.external_chat_id, 42);
    assert!(manager.has_active_session(&profile.user_id, 2_000).await);

    // Second contact reuses the same profile.
    let again = manager.on_first_contact(42, 3_000).await.unwrap();
    assert_eq!(again.user_id, profile.user_id);
    assert_eq!(repo.profiles.lock().await.len(), 1);
}

#[tokio::test]
async fn session_slides_only_when_touched() {
    let manager = mk_manager(MockRepo::new(), Arc::new(MemoryKv::new())).await;
    let profile = manager.on_first_contact(7, 0).await.unwrap();

    // Touch near the end of the window extends it.
    assert!(manager.touch_session(7, SESSION_TTL_MS - 10).await.unwrap());
    assert!(
        manager
            .has_active_session(&profile.user_id, SESSION_TTL_MS + 10)
            .await
    );

    // A dead session cannot be touched back to life.
    let expired = manager.expire_idle_sessions(3 * SESSION_TTL_MS).await;
    assert_eq!(expired, 1);
    assert!(!manager.touch_session(7, 3 * SESSION_TTL_MS + 1).await.unwrap());
}

#[tokio::test]
async fn terminate_removes_live_session() {
    let manager = mk_manager(MockRepo::new(), Arc::new(MemoryKv::new())).await;
    let profile = manager.on_first_contact(9, 0).await.unwrap();

    manager.terminate_session(9).await.unwrap();
    assert!(!manager.has_active_session(&profile.user_id, 1).await);
}

#[tokio::test]
async fn preference_update_is_visible_in_cache() {
    let manager = mk_manager(MockRepo::new(), Arc::new(MemoryKv::new())).await;
    let profile = manager.on_first_contact(5, 0).await.unwrap();

    let prefs = Preferences {
        trading_focus: TradingFocus::Technical,
        ..Preferences::default()
    };
    manager
        .update_preferences(&profile.user_id, prefs, 10)
        .await
        .unwrap();

    let reread = manager.find_by_id(&profile.user_id).await.unwrap().unwrap();
    assert_eq!(reread.preferences.trading_focus, TradingFocus::Technical);
    assert_eq!(reread.updated_at_ms, 10);
}

#[tokio::test]
async fn credential_update_round_trips_and_purges_cache() {
    let kv = Arc::new(MemoryKv::new());
    let manager = mk_manager(MockRepo::new(), Arc::clone(&kv)).await;
    let profile = manager.on_first_contact(11, 0).await.unwrap();

    // Simulate a cached adapter entry for the old key.
    let cache_key = keys::cred_cache(&profile.user_id, "bybit");
    kv.put(&cache_key, "stale-adapter", PutOptions::default(), 0)
        .await
        .unwrap();

    let cred = VenueCredential {
        api_key: "k".into(),
        api_secret: "s".into(),
        passphrase: None,
    };
    manager
        .store_venue_credential(&profile.user_id, "bybit", cred.clone(), 1)
        .await
        .unwrap();

    assert_eq!(kv.get(&cache_key, 2).await.unwrap(), None, "cache purged");

    let loaded = manager
        .load_venue_credential(&profile.user_id, "bybit")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, cred);
}

#[tokio::test]
async fn archived_profile_is_invisible_by_chat_id() {
    let manager = mk_manager(MockRepo::new(), Arc::new(MemoryKv::new())).await;
    let profile = manager.on_first_contact(13, 0).await.unwrap();

    manager.archive(&profile.user_id, 5).await.unwrap();
    assert!(manager.find_by_chat_id(13).await.unwrap().is_none());
}
