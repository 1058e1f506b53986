use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

#[test]
fn test_cli_simulate_writes_snapshot() {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let snapshot_path =
        std::env::temp_dir().join(format!("allhigh-simulate-snapshot-{}.json", nonce));
    let _ = std::fs::remove_file(&snapshot_path);

    let output = Command::new(env!("CARGO_BIN_EXE_allhigh"))
        .args([
            "simulate",
            "--resets",
            "2",
            "--snapshot",
            snapshot_path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute allhigh");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("GPIOA  configured=0x9fff high=0x9fff"));
    assert!(stdout.contains("deterministic=true"));

    let snapshot_content = std::fs::read_to_string(&snapshot_path).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&snapshot_content).unwrap();
    assert_eq!(snapshot["state"], "idle");
    assert_eq!(snapshot["boots"], 3);
    assert_eq!(snapshot["sysclk_source"], "hsi");

    let banks = snapshot["banks"].as_array().unwrap();
    assert_eq!(banks.len(), 5);
    assert_eq!(banks[1]["driven_high"], 0xFFFF);
    assert_eq!(banks[0]["pins"][13]["mode"], "alternate");

    let _ = std::fs::remove_file(&snapshot_path);
}

#[test]
fn test_cli_plan_json() {
    let output = Command::new(env!("CARGO_BIN_EXE_allhigh"))
        .args(["plan", "--json"])
        .output()
        .expect("Failed to execute allhigh");

    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["sysclk_hz"], 16_000_000);
    assert_eq!(plan["banks"][0]["port"], "GPIOA");
    assert_eq!(plan["banks"][0]["mask"], 0x9FFF);
    assert_eq!(plan["banks"][0]["reserved"], 0x6000);
    assert_eq!(plan["banks"][4]["mode"], "output");
}

#[test]
fn test_cli_plan_table_lists_excluded_pins() {
    let output = Command::new(env!("CARGO_BIN_EXE_allhigh"))
        .arg("plan")
        .output()
        .expect("Failed to execute allhigh");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PA13,PA14"));
}

#[test]
fn test_cli_simulate_resets_guard() {
    let output = Command::new(env!("CARGO_BIN_EXE_allhigh"))
        .args(["simulate", "--resets", "4000000000"])
        .output()
        .expect("Failed to execute allhigh");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2)); // EXIT_CONFIG_ERROR
}
