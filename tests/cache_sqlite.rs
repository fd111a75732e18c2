use std::sync::Arc;

use serde_json::json;
use sportsync_engine::cache::{CachedResult, ResultCacheKey, SqliteResultCache};
use sportsync_engine::{
    AnswerValue, Answers, Catalog, EngineConfig, Lang, RecommendRequest, RecommendationEngine, ResultCache,
};
use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct ExportRow {
    key_hash: String,
    lang: String,
    user_id: String,
    catalog_version: String,
    backend: String,
    path: String,
    payload: serde_json::Value,
    hit_count: i64,
}

fn answers(text: &str) -> Answers {
    [("q1".to_string(), AnswerValue::text(text))].into_iter().collect()
}

fn value(version: &str) -> CachedResult {
    CachedResult {
        catalog_version: version.to_string(),
        backend: "none".to_string(),
        path: "fallback".to_string(),
        payload: json!({ "cards": ["a", "b", "c"] }),
    }
}

#[tokio::test]
async fn sqlite_cache_put_get_and_export_increments_hit_count() {
    let dir = tempdir().unwrap();
    let cache = SqliteResultCache::new(dir.path().join("cache.sqlite")).unwrap();

    let key = ResultCacheKey::new(Lang::En, Some("user-1"), &answers("quiet mornings"));
    cache.put(&key, &value("2025.1")).await.unwrap();

    let hit = cache.get(&key).await.unwrap().unwrap();
    assert_eq!(hit, value("2025.1"));
    let _ = cache.get(&key).await.unwrap().unwrap();
    assert_eq!(cache.hit_count(&key).await.unwrap(), Some(2));

    let other = ResultCacheKey::new(Lang::Ar, Some("user-1"), &answers("quiet mornings"));
    assert!(cache.get(&other).await.unwrap().is_none());

    let export_path = dir.path().join("export.jsonl");
    let written = cache.export_jsonl(&export_path).await.unwrap();
    assert_eq!(written, 1);

    let raw = std::fs::read_to_string(&export_path).unwrap();
    let rows: Vec<ExportRow> = raw.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    let row = rows.into_iter().find(|r| r.key_hash == key.key_hash).unwrap();
    assert_eq!(row.hit_count, 2);
    assert_eq!(row.lang, "en");
    assert_eq!(row.user_id, "user-1");
    assert_eq!(row.catalog_version, "2025.1");
    assert_eq!(row.backend, "none");
    assert_eq!(row.path, "fallback");
    assert_eq!(row.payload["cards"][2], "c");
}

#[tokio::test]
async fn sqlite_cache_put_overwrites_existing_entry() {
    let dir = tempdir().unwrap();
    let cache = SqliteResultCache::new(dir.path().join("cache.sqlite")).unwrap();
    let key = ResultCacheKey::new(Lang::En, None, &answers("calm water"));

    cache.put(&key, &value("v1")).await.unwrap();
    cache.put(&key, &value("v2")).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap().unwrap().catalog_version, "v2");
}

#[tokio::test]
async fn sqlite_cache_prune_max_rows_keeps_most_recent() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.sqlite");
    let cache = SqliteResultCache::new(&db_path).unwrap();

    let old_key = ResultCacheKey::new(Lang::En, None, &answers("old answers"));
    let new_key = ResultCacheKey::new(Lang::En, None, &answers("new answers"));
    cache.put(&old_key, &value("v1")).await.unwrap();
    cache.put(&new_key, &value("v1")).await.unwrap();

    // Make the "old" row deterministically older so prune ordering is stable.
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute(
        "UPDATE result_cache SET updated_at = 0 WHERE key_hash = ?1",
        rusqlite::params![old_key.key_hash],
    )
    .unwrap();

    let stats = cache.prune(None, Some(1)).await.unwrap();
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.remaining, 1);
    assert!(cache.get(&old_key).await.unwrap().is_none());
    assert!(cache.get(&new_key).await.unwrap().is_some());
}

#[tokio::test]
async fn sqlite_cache_prune_by_age_drops_stale_rows() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.sqlite");
    let cache = SqliteResultCache::new(&db_path).unwrap();

    let stale = ResultCacheKey::new(Lang::En, None, &answers("stale"));
    let fresh = ResultCacheKey::new(Lang::En, None, &answers("fresh"));
    cache.put(&stale, &value("v1")).await.unwrap();
    cache.put(&fresh, &value("v1")).await.unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute(
        "UPDATE result_cache SET updated_at = 0 WHERE key_hash = ?1",
        rusqlite::params![stale.key_hash],
    )
    .unwrap();

    let stats = cache.prune(Some(30), None).await.unwrap();
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.remaining, 1);
}

#[test]
fn sqlite_cache_lock_does_not_truncate_lockfile() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.sqlite");
    let cache = SqliteResultCache::new(&db_path).unwrap();

    let mut lock_path = db_path.clone();
    lock_path.set_extension("lock");
    std::fs::write(&lock_path, "keep").unwrap();

    let lock = cache.lock_exclusive().unwrap();
    drop(lock);

    assert_eq!(std::fs::read_to_string(&lock_path).unwrap(), "keep");
}

#[tokio::test]
async fn engine_serves_second_request_from_sqlite_cache() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(SqliteResultCache::new(dir.path().join("cache.sqlite")).unwrap());
    let engine = RecommendationEngine::new(Catalog::builtin().unwrap(), EngineConfig::default())
        .unwrap()
        .with_cache(cache.clone());

    let request = RecommendRequest::new(answers("I like calm water and slow breathing"), Lang::En).user("u-7");
    let first = engine.recommend(request.clone()).await.unwrap().into_recommendations().unwrap();
    let second = engine.recommend(request.clone()).await.unwrap().into_recommendations().unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.cards, second.cards);

    let key = ResultCacheKey::new(Lang::En, Some("u-7"), &request.answers);
    assert_eq!(cache.hit_count(&key).await.unwrap(), Some(1));
}
