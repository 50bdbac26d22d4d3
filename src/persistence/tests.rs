#[cfg(test)]
mod lock_store_tests {
    use std::sync::Arc;
    use std::thread::sleep;
    use std::time::Duration;

    use tempfile::{TempDir, tempdir};

    use crate::config::{LockBackend, LockSettings};
    use crate::persistence::{LockStore, RedisLockStore, SledLockStore, open_lock_store};

    fn create_test_store() -> (SledLockStore, TempDir) {
        let dir = tempdir().unwrap();
        let store = SledLockStore::open(dir.path().to_str().unwrap()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_set_if_absent_once() {
        let (store, _dir) = create_test_store();
        let ttl = Duration::from_secs(5);

        assert!(store.set_if_absent("k1", ttl).await.unwrap());
        assert!(!store.set_if_absent("k1", ttl).await.unwrap());
        assert!(store.set_if_absent("k2", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_can_be_taken_over() {
        let (store, _dir) = create_test_store();
        let ttl = Duration::from_millis(50);

        assert!(store.set_if_absent("k", ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.set_if_absent("k", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let (store, _dir) = create_test_store();
        let sibling = store.clone();
        let ttl = Duration::from_secs(5);

        assert!(store.set_if_absent("shared", ttl).await.unwrap());
        assert!(!sibling.set_if_absent("shared", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_acquirers_have_one_winner() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);

        let attempts: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .set_if_absent("contended", Duration::from_secs(5))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let results = futures::future::join_all(attempts).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, _dir) = create_test_store();

        store
            .set_if_absent("short", Duration::from_millis(10))
            .await
            .unwrap();
        store
            .set_if_absent("long", Duration::from_secs(60))
            .await
            .unwrap();
        sleep(Duration::from_millis(30));

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);

        // the live entry survived the purge
        assert!(
            !store
                .set_if_absent("long", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert!(
            store
                .set_if_absent("short", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_purge_empty_store() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[test]
    fn test_second_open_of_same_path_fails() {
        let (_store, dir) = create_test_store();
        assert!(SledLockStore::open(dir.path().to_str().unwrap()).is_err());
    }

    fn lock_settings(backend: LockBackend, path: &str, redis_url: &str) -> LockSettings {
        LockSettings {
            backend,
            redis_url: redis_url.to_string(),
            path: path.to_string(),
            purge_interval_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_open_lock_store_sled() {
        let dir = tempdir().unwrap();
        let settings = lock_settings(
            LockBackend::Sled,
            dir.path().to_str().unwrap(),
            "redis://127.0.0.1:1",
        );

        let store = open_lock_store(&settings).await.unwrap();
        assert!(store.set_if_absent("k", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_if_absent("k", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_lock_store_redis_unreachable() {
        let settings = lock_settings(LockBackend::Redis, "unused", "redis://127.0.0.1:1");
        assert!(open_lock_store(&settings).await.is_err());
    }

    #[tokio::test]
    async fn test_redis_store_rejects_bad_url() {
        assert!(RedisLockStore::connect("not a url").await.is_err());
    }
}
