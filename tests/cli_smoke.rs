use std::process::Command;

use tempfile::tempdir;

fn write_answers(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("answers.json");
    let answers = serde_json::json!({
        "q1": "I prefer training alone, somewhere quiet",
        "q2": ["calm", "deep focus"],
        "q3": { "answer": "a steady aim", "question": "What do you enjoy most?" }
    });
    std::fs::write(&path, serde_json::to_string_pretty(&answers).unwrap()).unwrap();
    path
}

fn sportsync() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sportsync"));
    cmd.env_remove("OPENROUTER_API_KEY")
        .env_remove("SPORTSYNC_MODEL")
        .env_remove("SPORTSYNC_CACHE_PATH")
        .env_remove("SPORTSYNC_CATALOG_PATH");
    cmd
}

#[test]
fn cli_validate_catalog_smoke() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    let catalog = serde_json::json!({
        "version": "smoke-1",
        "items": [
            { "id": "a_item", "label": "Alpha Pace", "prior": 0.3 },
            { "id": "b_item", "label": "Bravo Line", "prior": 0.2 }
        ]
    });
    std::fs::write(&path, catalog.to_string()).unwrap();

    let out = sportsync().args(["validate-catalog", "--catalog"]).arg(&path).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("ok:"));
    assert!(stdout.contains("version smoke-1"));
    assert!(stdout.contains("2 items"));

    std::fs::write(&path, r#"{"items": []}"#).unwrap();
    let status = sportsync().args(["validate-catalog", "--catalog"]).arg(&path).status().unwrap();
    assert!(!status.success());
}

#[test]
fn cli_validate_catalog_accepts_glob_patterns() {
    let dir = tempdir().unwrap();
    for name in ["one.json", "two.json"] {
        let catalog = serde_json::json!({ "items": [{ "id": "x_item", "label": "X Ray", "prior": 0.1 }] });
        std::fs::write(dir.path().join(name), catalog.to_string()).unwrap();
    }
    let pattern = dir.path().join("*.json");

    let out = sportsync()
        .args(["validate-catalog", "--catalog", pattern.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8(out.stdout).unwrap().lines().count(), 2);

    let none = dir.path().join("*.toml");
    let status = sportsync()
        .args(["validate-catalog", "--catalog", none.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn cli_rank_lists_every_catalog_item() {
    let dir = tempdir().unwrap();
    let answers = write_answers(dir.path());

    let out = sportsync().args(["rank", "--answers"]).arg(&answers).output().unwrap();
    assert!(out.status.success());
    let ranked: Vec<serde_json::Value> = serde_json::from_slice(&out.stdout).unwrap();
    assert!(ranked.len() >= 16);
    assert!(ranked.iter().all(|c| c["item_id"].is_string()));
}

#[test]
fn cli_recommend_json_smoke_and_determinism() {
    let dir = tempdir().unwrap();
    let answers = write_answers(dir.path());
    let telemetry = dir.path().join("events.jsonl");

    let run = |extra: &[&str]| -> serde_json::Value {
        let out = sportsync()
            .args(["recommend", "--json", "--answers"])
            .arg(&answers)
            .args(extra)
            .output()
            .unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        serde_json::from_slice(&out.stdout).unwrap()
    };

    let a = run(&["--telemetry", telemetry.to_str().unwrap()]);
    let b = run(&[]);

    assert_eq!(a["status"], "recommendations");
    assert_eq!(a["path"], "fallback");
    assert_eq!(a["cards"].as_array().unwrap().len(), 3);
    assert_eq!(a["cards"], b["cards"]);
    assert_eq!(a["consensus"], b["consensus"]);

    let events = std::fs::read_to_string(&telemetry).unwrap();
    assert!(events.lines().any(|l| l.contains("recommendation.completed")));
}

#[test]
fn cli_recommend_text_output_uses_headings() {
    let dir = tempdir().unwrap();
    let answers = write_answers(dir.path());

    let out = sportsync().args(["recommend", "--answers"]).arg(&answers).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("1. "));
    assert!(stdout.contains("Why you"));
    assert!(stdout.contains("Approx level"));
}

#[test]
fn cli_cache_prune_requires_a_limit() {
    let dir = tempdir().unwrap();
    let status = sportsync()
        .args(["cache-prune", "--db"])
        .arg(dir.path().join("cache.sqlite"))
        .status()
        .unwrap();
    assert!(!status.success());
}
