//! Integration tests driving the `scribe` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const PASSPHRASE: &str = "cli integration passphrase";

/// A ledger directory with keys generated by `scribe keygen`.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let output = bare_command()
            .args(["keygen", "--passphrase", PASSPHRASE, "--out-dir"])
            .arg(dir.path())
            .output()
            .expect("failed to execute scribe");
        assert!(output.status.success(), "keygen failed: {}", stderr(&output));
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn db_path(&self) -> PathBuf {
        self.path().join("ledger.db")
    }

    fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path().display())
    }

    /// `scribe` configured through the environment with signing keys.
    fn scribe(&self) -> Command {
        let mut cmd = self.reader();
        cmd.env("SCRIBE_PRIVATE_KEY_FILE", self.path().join("scribe.key"))
            .env("SCRIBE_PRIVATE_KEY_PASSPHRASE", PASSPHRASE);
        cmd
    }

    /// `scribe` configured with the public key only.
    fn reader(&self) -> Command {
        let mut cmd = bare_command();
        cmd.env("SCRIBE_DATABASE_URL", self.database_url())
            .env("SCRIBE_PUBLIC_KEY_FILE", self.path().join("scribe.pub"));
        cmd
    }

    fn run(&self, cmd: &mut Command) -> Output {
        cmd.current_dir(self.path())
            .output()
            .expect("failed to execute scribe")
    }

    fn append(&self, data: &str) -> Output {
        self.run(self.scribe().args(["append", data]))
    }
}

fn bare_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_scribe"));
    for key in [
        "SCRIBE_CONFIG",
        "SCRIBE_DATABASE_URL",
        "SCRIBE_SYSTEM_ID",
        "SCRIBE_PUBLIC_KEY",
        "SCRIBE_PUBLIC_KEY_FILE",
        "SCRIBE_PRIVATE_KEY",
        "SCRIBE_PRIVATE_KEY_FILE",
        "SCRIBE_PRIVATE_KEY_PASSPHRASE",
        "SCRIBE_REQUEST_TIMEOUT_MS",
    ] {
        cmd.env_remove(key);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_keygen_prints_keys_without_out_dir() {
    let output = bare_command()
        .args(["keygen", "--passphrase", PASSPHRASE])
        .output()
        .expect("failed to execute scribe");

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Generated Ed25519 Keypair"));
    assert!(stdout.contains("BEGIN ENCRYPTED PRIVATE KEY"));
    assert!(stdout.contains("BEGIN PUBLIC KEY"));
    assert!(stdout.contains("Fingerprint"));
}

#[test]
fn test_init_is_idempotent() {
    let ws = Workspace::new();

    let first = ws.run(ws.scribe().arg("init"));
    assert!(first.status.success(), "init failed: {}", stderr(&first));
    assert!(stdout(&first).contains("Created genesis block"));

    let second = ws.run(ws.scribe().arg("init"));
    assert!(second.status.success());
    assert!(stdout(&second).contains("already initialized"));
}

#[test]
fn test_append_then_validate() {
    let ws = Workspace::new();

    let output = ws.append(r#"{"table": "user", "from": {"user_id": "123"}, "to": {"user_id": "1234"}}"#);
    assert!(output.status.success(), "append failed: {}", stderr(&output));
    assert!(stdout(&output).contains("(seq 1)"));

    let output = ws.append(r#"{"table": "user", "action": "delete"}"#);
    assert!(stdout(&output).contains("(seq 2)"));

    let output = ws.run(ws.reader().arg("validate"));
    assert!(output.status.success(), "validate failed: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("3 blocks verified"));
    assert!(stdout.contains("VALID"));
}

#[test]
fn test_append_json_output() {
    let ws = Workspace::new();

    let output = ws.run(ws.scribe().args([
        "append",
        r#"{"table": "orders"}"#,
        "--system-id",
        "billing",
        "--tag",
        "finance",
        "--tag",
        "eu",
        "--json",
    ]));
    assert!(output.status.success(), "append failed: {}", stderr(&output));

    let block: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(block["seq_id"], 1);
    assert_eq!(block["system_id"], "billing");
    assert_eq!(block["payload"]["system_id"], "billing");
    assert_eq!(block["payload"]["table"], "orders");
    assert!(block["tags"].as_str().unwrap().contains("finance"));
}

#[test]
fn test_append_from_file() {
    let ws = Workspace::new();
    let entry = ws.path().join("entry.json");
    std::fs::write(&entry, r#"{"table": "invoices", "rows": 7}"#).unwrap();

    let output = ws.run(ws.scribe().arg("append").arg("--file").arg(&entry));
    assert!(output.status.success(), "append failed: {}", stderr(&output));
    assert!(stdout(&output).contains("(seq 1)"));
}

#[test]
fn test_append_rejects_non_object_payload() {
    let ws = Workspace::new();

    let output = ws.append("[1, 2, 3]");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("JSON object"));
}

#[test]
fn test_append_requires_private_key() {
    let ws = Workspace::new();

    let output = ws.run(ws.reader().args(["append", r#"{"table": "user"}"#]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("SCRIBE_PRIVATE_KEY"));
}

#[test]
fn test_log_json_lists_blocks_in_order() {
    let ws = Workspace::new();
    for n in 0..3 {
        let output = ws.append(&format!(r#"{{"row": {n}}}"#));
        assert!(output.status.success());
    }

    let output = ws.run(ws.reader().args(["log", "--json"]));
    assert!(output.status.success(), "log failed: {}", stderr(&output));
    let blocks: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(blocks.len(), 4);
    for (idx, block) in blocks.iter().enumerate() {
        assert_eq!(block["seq_id"], idx as u64);
    }
    assert_eq!(blocks[1]["last_block_hash"], blocks[0]["hash"]);

    let output = ws.run(ws.reader().args(["log", "--start", "1", "--end", "3", "--json"]));
    let window: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(window[0]["seq_id"], 1);
}

#[test]
fn test_log_rejects_inverted_range() {
    let ws = Workspace::new();
    ws.append(r#"{"table": "user"}"#);

    let output = ws.run(ws.reader().args(["log", "--start", "5", "--end", "2"]));
    assert!(!output.status.success());
    assert!(!stdout(&output).contains("Ledger is empty"));
    assert!(stderr(&output).contains("end 2 is before start 5"));
}

#[test]
fn test_log_human_output() {
    let ws = Workspace::new();
    ws.append(r#"{"table": "user"}"#);

    let output = ws.run(ws.reader().arg("log"));
    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Audit Ledger"));
    assert!(stdout.contains("Block 0"));
    assert!(stdout.contains("Block 1"));
    assert!(stdout.contains("Previous"));
}

#[test]
fn test_validate_rejects_inverted_range() {
    let ws = Workspace::new();
    ws.append(r#"{"table": "user"}"#);

    let output = ws.run(ws.reader().args(["validate", "--start", "3", "--end", "1"]));
    assert!(!output.status.success());
    assert!(stdout(&output).contains("INVALID"));
}

#[tokio::test]
async fn test_validate_detects_tampering() {
    let ws = Workspace::new();
    ws.append(r#"{"table": "user", "to": {"user_id": "1234"}}"#);
    ws.append(r#"{"table": "user", "to": {"user_id": "5678"}}"#);

    let pool = sqlx::SqlitePool::connect(&ws.database_url()).await.unwrap();
    sqlx::query("UPDATE blocks SET payload_raw = REPLACE(payload_raw, '1234', '666') WHERE seq_id = 1")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let output = ws.run(ws.reader().arg("validate"));
    assert!(!output.status.success());
    assert!(stdout(&output).contains("INVALID"));
    assert!(stderr(&output).contains("validation failed"));

    // The untouched prefix still validates.
    let output = ws.run(ws.reader().args(["validate", "--end", "1"]));
    assert!(output.status.success(), "prefix failed: {}", stderr(&output));
}

#[test]
fn test_missing_public_key_is_reported() {
    let ws = Workspace::new();

    let output = ws.run(
        bare_command()
            .env("SCRIBE_DATABASE_URL", ws.database_url())
            .arg("validate"),
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("SCRIBE_PUBLIC_KEY"));
}
