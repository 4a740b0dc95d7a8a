use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use squares_bench::config::BenchmarkConfig;
use squares_bench::runner::{BenchmarkRunner, RunSummary};
use tempfile::tempdir;

fn load_config(output_dir: &Path) -> BenchmarkConfig {
    let yaml = format!(
        r#"
run_id: "test_smoke"
games:
  seed: 4242
  count: 2
agents:
  - name: "rules"
    kind: "heuristic"
  - name: "search"
    kind: "monte_carlo"
    params:
      deterministic_rounds: 2
      seed: 17
outputs:
  jsonl: "{jsonl}"
  summary_md: "{summary}"
metrics:
  baseline: "rules"
logging:
  enable_structured: false
"#,
        jsonl = output_dir.join("games.jsonl").display(),
        summary = output_dir.join("summary.md").display(),
    );

    let mut cfg: BenchmarkConfig = serde_yaml::from_str(&yaml).expect("valid yaml");
    cfg.validate().expect("config validates");
    cfg
}

fn run_once() -> (RunSummary, String, tempfile::TempDir) {
    let dir = tempdir().expect("temp dir");
    let config = load_config(dir.path());
    let outputs = config.resolved_outputs();
    let runner = BenchmarkRunner::new(config, outputs).expect("runner created");
    let summary = runner.run().expect("benchmark completes");
    let jsonl = fs::read_to_string(&summary.jsonl_path).expect("jsonl readable");
    (summary, jsonl, dir)
}

/// Hash of the rows with wall-clock fields zeroed.
fn normalized_hash(jsonl: &str) -> String {
    let mut normalized = String::new();
    for line in jsonl.lines() {
        let mut value: serde_json::Value = serde_json::from_str(line).expect("row decodes to JSON");
        if let Some(obj) = value.as_object_mut() {
            for key in ["ms_per_decision", "total_ms"] {
                if let Some(field) = obj.get_mut(key) {
                    *field = serde_json::Value::from(0.0);
                }
            }
        }
        normalized.push_str(&serde_json::to_string(&value).expect("re-serialize normalized row"));
        normalized.push('\n');
    }

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[test]
fn benchmark_smoke_test_produces_stable_jsonl_hash() {
    let (summary, first, _first_dir) = run_once();
    let (_, second, _second_dir) = run_once();

    assert_eq!(summary.games_played, 2);
    assert_eq!(summary.agents, 2);
    assert_eq!(summary.rows_written, 4);
    assert_eq!(
        normalized_hash(&first),
        normalized_hash(&second),
        "JSONL output differs between identical runs"
    );

    for line in first.lines() {
        let row: serde_json::Value = serde_json::from_str(line).expect("row");
        assert_eq!(row["decisions"], 25);
        assert_eq!(row["hands"].as_array().map(Vec::len), Some(10));
        assert_eq!(row["over_budget"], false);
        assert!(row["score"].as_i64().is_some_and(|score| score >= 0));
    }

    let markdown = fs::read_to_string(&summary.summary_path).expect("summary markdown");
    assert!(markdown.contains("| rules | Heuristic | 2 |"));
    assert!(markdown.contains("| search | MonteCarlo | 2 |"));
    assert!(summary.telemetry_path.is_none());
}

#[test]
fn both_agents_see_the_same_deal() {
    let (_, jsonl, _dir) = run_once();
    let rows: Vec<serde_json::Value> = jsonl
        .lines()
        .map(|line| serde_json::from_str(line).expect("row"))
        .collect();
    for pair in rows.chunks(2) {
        assert_eq!(pair[0]["game_seed"], pair[1]["game_seed"]);
        assert_eq!(pair[0]["deal"], pair[1]["deal"]);
        assert_eq!(pair[0]["agent"], "rules");
        assert_eq!(pair[1]["agent"], "search");
    }
}
