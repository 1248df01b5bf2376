use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::json;
use tempfile::TempDir;

/// A throwaway host: config file, consumer, entitlement and product directories.
///
/// The configured server is a closed local port, so any remote call fails
/// with a transport error.
pub struct Host {
    pub dir: TempDir,
}

impl Host {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let config = format!(
            r#"
[server]
hostname = "127.0.0.1"
port = 9
timeout_secs = 2

[paths]
consumer_dir = {consumer:?}
entitlement_dir = {entitlement:?}
product_dir = {product:?}

[certd]
lock_file = {lock:?}
update_file = {update:?}
"#,
            consumer = root.join("consumer").display().to_string(),
            entitlement = root.join("entitlement").display().to_string(),
            product = root.join("product").display().to_string(),
            lock = root.join("certd.lock").display().to_string(),
            update = root.join("run").join("update").display().to_string(),
        );
        std::fs::write(root.join("subman.toml"), config).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("subman.toml")
    }

    /// Write an identity so the host counts as registered.
    pub fn register(&self) {
        let dir = self.path().join("consumer");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("identity.json"),
            json!({"uuid": "c0ffee", "name": "admin", "user": "alice"}).to_string(),
        )
        .unwrap();
    }

    pub fn install_product(&self, id: &str, name: &str) {
        let dir = self.path().join("product");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{id}.json")),
            json!({"id": id, "name": name}).to_string(),
        )
        .unwrap();
    }

    pub fn subman(&self, args: &[&str]) -> Output {
        self.command(env!("CARGO_BIN_EXE_subman"), args)
    }

    #[allow(dead_code)]
    pub fn certd(&self, args: &[&str]) -> Output {
        self.command(env!("CARGO_BIN_EXE_subman-certd"), args)
    }

    fn command(&self, bin: &str, args: &[&str]) -> Output {
        Command::new(bin)
            .args(args)
            .env("SUBMAN_CONFIG", self.config_path())
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to run binary")
    }
}

/// Assert the exit code and return (stdout, stderr).
pub fn expect_exit(out: &Output, expected: i32) -> (String, String) {
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert_eq!(
        out.status.code(),
        Some(expected),
        "exit mismatch\nstdout: {stdout}\nstderr: {stderr}"
    );
    (stdout, stderr)
}
