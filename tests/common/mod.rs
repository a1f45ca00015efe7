// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pkgrecap::{Config, JsonLinesSink, Session};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Package record as found in an engine state document
pub fn pkg(name: &str, version: &str, release: &str, arch: &str) -> Value {
    json!({
        "name": name,
        "version": version,
        "release": release,
        "arch": arch,
        "summary": format!("The {} package", name),
    })
}

/// Write an engine state document and a configuration pointing at it.
///
/// Returns (TempDir, Config) - keep the TempDir alive to prevent cleanup.
pub fn setup_state(state: Value) -> (TempDir, Config) {
    let temp_dir = tempfile::tempdir().unwrap();
    let state_path = temp_dir.path().join("state.json");
    std::fs::write(&state_path, serde_json::to_string_pretty(&state).unwrap()).unwrap();

    let mut config = Config::default();
    config.engine.state = state_path;
    config.lock.path = temp_dir.path().join("pkgrecap.pid");
    config.lock.proc_root = temp_dir.path().join("proc");
    config.packages.module_prefix = "sm-".to_string();
    config.packages.native_arch = "x86_64".to_string();
    config.privileges.require_root = false;

    (temp_dir, config)
}

/// A small system: two packages and a module installed, updates and new
/// packages available.
pub fn setup_system() -> (TempDir, Config) {
    let mut hidden = pkg("sm-base", "1.0", "1", "noarch");
    hidden["hidden"] = json!(true);

    setup_state(json!({
        "installed": [
            pkg("foo", "1.0", "1", "x86_64"),
            pkg("bar", "2.0", "1", "noarch"),
            pkg("sm-firewall", "1.0", "1", "noarch"),
            hidden,
        ],
        "available": [
            pkg("foo", "1.0", "2", "x86_64"),
            pkg("foo", "1.0", "2", "i686"),
            pkg("baz", "3.0", "1", "x86_64"),
            pkg("baz", "3.0", "1", "i686"),
            pkg("sm-webfilter", "0.9", "1", "noarch"),
        ],
    }))
}

/// Run one command against the engine described by `config` and collect
/// every JSON line it writes.
pub fn run<F>(config: Config, command: F) -> (pkgrecap::Result<()>, Vec<Value>)
where
    F: FnOnce(&mut Session<'_>) -> pkgrecap::Result<()>,
{
    let sink = JsonLinesSink::new(Vec::new());
    let result = {
        let mut session = Session::open(config, &sink).unwrap();
        command(&mut session)
    };

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let records = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (result, records)
}

/// Re-read the engine state document
pub fn read_state(config: &Config) -> Value {
    let content = std::fs::read_to_string(&config.engine.state).unwrap();
    serde_json::from_str(&content).unwrap()
}

/// Names of the installed packages in the state document, sorted
pub fn installed_nevras(config: &Config) -> Vec<String> {
    let state = read_state(config);
    let mut names: Vec<String> = state["installed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            format!(
                "{}-{}-{}.{}",
                p["name"].as_str().unwrap(),
                p["version"].as_str().unwrap(),
                p["release"].as_str().unwrap(),
                p["arch"].as_str().unwrap()
            )
        })
        .collect();
    names.sort();
    names
}
