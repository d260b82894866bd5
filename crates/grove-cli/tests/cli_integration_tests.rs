//! CLI integration tests
//!
//! Each test writes a config and a model schema into a scratch directory
//! and drives the `grove` binary against it.

use grove_core::GroveConfig;
use grove_engine::StoreRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const CATALOG: &str = r#"
name: Catalog
entities:
  - name: Item
    attributes:
      - { name: name, kind: string }
      - { name: price, kind: integer, optional: true }
"#;

fn setup(temp_dir: &TempDir) -> PathBuf {
    let data_dir = temp_dir.path().join("data");
    let bundle_dir = temp_dir.path().join("bundle");
    fs::create_dir_all(&bundle_dir).unwrap();
    fs::write(bundle_dir.join("Catalog.model.yaml"), CATALOG).unwrap();

    let config_path = temp_dir.path().join("grove.toml");
    fs::write(
        &config_path,
        format!(
            "data_dir = {:?}\nbundle_dir = {:?}\nlog_profile = \"test\"\n",
            data_dir.display().to_string(),
            bundle_dir.display().to_string()
        ),
    )
    .unwrap();
    config_path
}

fn populate(config_path: &Path, items: &[(&str, i64)]) {
    let config = GroveConfig::load(config_path).unwrap();
    let registry = StoreRegistry::from_config(&config);
    let context = registry
        .shared_for_model("Catalog")
        .unwrap()
        .new_context()
        .unwrap();
    for (name, price) in items {
        let item = context.insert("Item").unwrap();
        item.set("name", *name).unwrap();
        item.set("price", *price).unwrap();
    }
    context.save().unwrap();
}

fn grove(temp_dir: &TempDir, config_path: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_grove"))
        .current_dir(temp_dir.path())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "CLI command should succeed. Stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_status_reports_missing_store_without_creating_it() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir);

    let stdout = stdout_of(&grove(&temp_dir, &config_path, &["status", "--model", "Catalog"]));

    assert!(stdout.contains("model: Catalog (version 1)"));
    assert!(stdout.contains("exists: false"));
    assert!(!temp_dir.path().join("data").join("Catalog.sqlite").exists());
}

#[test]
fn test_fetch_prints_sorted_json_lines() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir);
    populate(&config_path, &[("Lamp", 40), ("Chair", 25), ("Rug", 90)]);

    let stdout = stdout_of(&grove(
        &temp_dir,
        &config_path,
        &[
            "fetch", "--model", "Catalog", "--entity", "Item", "--where", "price < 50", "--sort",
            "price:desc",
        ],
    ));

    let names: Vec<String> = stdout
        .lines()
        .map(|line| {
            let row: serde_json::Value = serde_json::from_str(line).unwrap();
            row["attributes"]["name"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(names, vec!["Lamp", "Chair"]);
}

#[test]
fn test_count_and_status_after_save() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir);
    populate(&config_path, &[("Lamp", 40), ("Chair", 25), ("Rug", 90)]);

    let stdout = stdout_of(&grove(
        &temp_dir,
        &config_path,
        &["count", "--model", "Catalog", "--entity", "Item", "--where", "price >= 40"],
    ));
    assert_eq!(stdout.trim(), "2");

    let stdout = stdout_of(&grove(&temp_dir, &config_path, &["status", "--model", "Catalog"]));
    assert!(stdout.contains("exists: true"));
    assert!(stdout.contains("Item: 3"));
}

#[test]
fn test_errors_exit_with_code_one() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir);

    let output = grove(
        &temp_dir,
        &config_path,
        &["seed", "--model", "Catalog", "--from", "missing.sqlite"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERR_SEED_SOURCE_MISSING"));

    let output = grove(
        &temp_dir,
        &config_path,
        &["fetch", "--model", "Catalog", "--entity", "Item", "--where", "colour == 'red'"],
    );
    assert_eq!(output.status.code(), Some(1));
}
