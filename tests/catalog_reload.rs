use std::sync::Arc;

use sportsync_engine::catalog::{CatalogFile, CatalogItem};
use sportsync_engine::{
    AnswerValue, Answers, Catalog, EngineConfig, InMemoryResultCache, Lang, RecommendRequest, RecommendationEngine,
};
use tempfile::tempdir;

fn small_catalog(version: &str) -> CatalogFile {
    CatalogFile {
        version: version.to_string(),
        items: vec![
            CatalogItem::new("tide_reading", "Tide Reader", 0.4)
                .with_weight("calm_regulation", 0.6)
                .with_weight("prefers_solo", 0.3),
            CatalogItem::new("ridge_walking", "Ridge Walker", 0.3)
                .with_weight("sustained_attention", 0.5)
                .with_weight("sensory_intensity", 0.2),
            CatalogItem::new("lane_sprinting", "Lane Sprinter", 0.2)
                .with_weight("needs_quick_wins", 0.6)
                .with_weight("sensation_seeking", 0.3),
            CatalogItem::new("board_puzzles", "Puzzle Board", 0.1)
                .with_weight("likes_puzzles", 0.8)
                .with_weight("tactical_mindset", 0.4),
        ],
        guards: None,
        intent_keywords: Default::default(),
    }
}

fn answers() -> Answers {
    [("q1".to_string(), AnswerValue::text("calm evenings and a slow breath"))]
        .into_iter()
        .collect()
}

#[test]
fn catalog_json_round_trip_keeps_ranking_order() {
    let catalog = Catalog::from_file(small_catalog("rt-1")).unwrap();
    let reloaded = Catalog::from_json(&catalog.to_json().unwrap()).unwrap();
    assert_eq!(reloaded.version(), "rt-1");
    assert_eq!(reloaded.guards().len(), catalog.guards().len());

    let a = RecommendationEngine::new(catalog, EngineConfig::default()).unwrap();
    let b = RecommendationEngine::new(reloaded, EngineConfig::default()).unwrap();
    assert_eq!(a.rank(&answers(), Lang::En), b.rank(&answers(), Lang::En));
}

#[tokio::test]
async fn reload_swaps_catalog_and_invalidates_cached_results() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, serde_json::to_string_pretty(&small_catalog("test-2")).unwrap()).unwrap();

    let engine = RecommendationEngine::new(Catalog::builtin().unwrap(), EngineConfig::default())
        .unwrap()
        .with_cache(Arc::new(InMemoryResultCache::new(8)));
    let request = RecommendRequest::new(answers(), Lang::En);

    let before = engine.recommend(request.clone()).await.unwrap().into_recommendations().unwrap();
    assert_eq!(before.catalog_version, "2025.1");

    engine.reload_catalog(&path).unwrap();
    assert_eq!(engine.catalog().snapshot().version(), "test-2");

    let after = engine.recommend(request).await.unwrap().into_recommendations().unwrap();
    assert!(!after.cached);
    assert_eq!(after.catalog_version, "test-2");
    let ids = ["tide_reading", "ridge_walking", "lane_sprinting", "board_puzzles"];
    for card in &after.cards {
        assert!(ids.contains(&card.item_id.as_deref().unwrap()));
    }
}

#[test]
fn bad_reload_keeps_the_current_snapshot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, r#"{"version": "x", "items": []}"#).unwrap();

    let engine = RecommendationEngine::new(Catalog::builtin().unwrap(), EngineConfig::default()).unwrap();
    let err = engine.reload_catalog(&path).unwrap_err();
    assert_eq!(err.code(), "catalog");
    assert_eq!(engine.catalog().snapshot().version(), "2025.1");

    let missing = engine.reload_catalog(dir.path().join("missing.json")).unwrap_err();
    assert_eq!(missing.code(), "catalog");
    assert_eq!(engine.catalog().snapshot().len(), Catalog::builtin().unwrap().len());
}
