//! Shared test utilities for incidex-cli integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Command for the incidex binary with a clean environment: no inherited
/// `INCIDEX_*` overrides and a throwaway home directory.
#[allow(deprecated)]
pub fn incidex_cmd(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("incidex").expect("incidex binary should exist");
    for var in [
        "INCIDEX_CONFIG",
        "INCIDEX_DATASET",
        "INCIDEX_INDEX_PATH",
        "INCIDEX_DEVICE",
        "INCIDEX_VERBOSE",
        "INCIDEX_COLOR",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("HOME", home).env("NO_COLOR", "1");
    cmd
}

/// A temp directory holding a config file, a dataset location and an index
/// location, all on the simple backend.
pub struct Workspace {
    pub temp: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let ws = Self {
            temp: TempDir::new().expect("create temp dir"),
        };
        ws.write_config("");
        ws
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.temp.path().join("data").join("incidents.csv")
    }

    pub fn index_path(&self) -> PathBuf {
        self.temp.path().join("index")
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp.path().join("config.yaml")
    }

    /// Write the config file; `extra` is appended verbatim.
    pub fn write_config(&self, extra: &str) {
        let yaml = format!(
            "datasetPath: '{}'\nindexPath: '{}'\nbackend: simple\n{}",
            self.dataset_path().display(),
            self.index_path().display(),
            extra
        );
        fs::write(self.config_path(), yaml).expect("write config");
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, content).expect("write file");
        path
    }

    /// `incidex --config <this workspace's config>`.
    pub fn cmd(&self) -> Command {
        let mut cmd = incidex_cmd(self.temp.path());
        cmd.arg("--config").arg(self.config_path());
        cmd
    }

    /// Run with the given arguments, expecting failure, and return the JSON
    /// error object printed on stdout.
    pub fn json_error(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().args(args).output().expect("run incidex");
        assert!(!output.status.success(), "expected failure for {:?}", args);
        let body: serde_json::Value =
            serde_json::from_slice(&output.stdout).expect("stdout is JSON");
        body["error"].clone()
    }

    /// Run with the given arguments, expecting success, and parse stdout.
    pub fn json_ok(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().args(args).output().expect("run incidex");
        assert!(
            output.status.success(),
            "command {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is JSON")
    }
}
