//! Baseline artifact generation.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::domain::CommandSequence;
use crate::error::{Result, ToolsyncError};
use crate::index::{Verification, ZERO_CRC};
use crate::timestamp::now_ts;

use super::capture::Capturer;
use super::normalize::{crc32_hex, normalize};

/// How the capture finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineStatus {
    Clean,
    /// Nonzero exit, but the output was usable
    SoftExit(i32),
}

/// One freshly written baseline
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineResult {
    pub sequence: CommandSequence,
    pub status: BaselineStatus,
    pub crc: String,
    pub timestamp: f64,
    /// Relative to the definitions root
    pub baseline_file: String,
    /// Relative to the definitions root
    pub json_definition_file: String,
}

impl BaselineResult {
    pub fn verification(&self) -> Verification {
        Verification {
            crc: self.crc.clone(),
            timestamp: self.timestamp,
            baseline_file: Some(self.baseline_file.clone()),
            json_definition_file: Some(self.json_definition_file.clone()),
        }
    }
}

/// Captures, normalizes and checksums tool output into the definitions root.
#[derive(Debug, Clone)]
pub struct BaselineGenerator {
    root: PathBuf,
    capturer: Capturer,
    overrides: BTreeMap<String, PathBuf>,
}

impl BaselineGenerator {
    pub fn new(root: impl AsRef<Path>, capturer: Capturer) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            capturer,
            overrides: BTreeMap::new(),
        }
    }

    /// Raw scripts to run instead of specific tools.
    pub fn with_overrides(mut self, overrides: BTreeMap<String, PathBuf>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<tool>/<tool_id>.txt`
    pub fn baseline_file(seq: &CommandSequence) -> String {
        format!("{}/{}.txt", seq.tool(), seq.tool_id())
    }

    /// `<tool>/<tool_id>.json`
    pub fn definition_file(seq: &CommandSequence) -> String {
        format!("{}/{}.json", seq.tool(), seq.tool_id())
    }

    /// Capture `seq`, rewrite its baseline artifact and make sure a skeleton
    /// definition exists.
    ///
    /// The artifact is rewritten on every call; deciding whether the checksum
    /// changed is up to the caller.
    pub async fn generate_or_verify(&self, seq: &CommandSequence) -> Result<BaselineResult> {
        let executable_override = self.overrides.get(seq.tool()).map(PathBuf::as_path);
        let output = self.capturer.capture(seq, executable_override).await?;

        let Some(raw) = output.stdout else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut reason = format!("exit code {} with empty output", output.exit_code);
            if !stderr.trim().is_empty() {
                reason.push_str(&format!(": {}", stderr.trim()));
            }
            return Err(ToolsyncError::Capture {
                sequence: seq.clone(),
                reason,
            });
        };

        let normalized = normalize(&raw);
        if normalized.is_empty() {
            return Err(ToolsyncError::Capture {
                sequence: seq.clone(),
                reason: "no output left after normalization".to_string(),
            });
        }

        let crc = crc32_hex(&normalized);
        let timestamp = now_ts();
        let baseline_file = Self::baseline_file(seq);
        let json_definition_file = Self::definition_file(seq);

        let baseline_path = self.root.join(&baseline_file);
        if let Some(parent) = baseline_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&baseline_path, &normalized)?;

        if ensure_skeleton(&self.root.join(&json_definition_file), seq)? {
            log::info!("Created skeleton definition {}", json_definition_file);
        }

        let status = match output.exit_code {
            0 => BaselineStatus::Clean,
            code => {
                log::warn!("'{}' exited with {} but produced output; keeping it", seq, code);
                BaselineStatus::SoftExit(code)
            }
        };

        Ok(BaselineResult {
            sequence: seq.clone(),
            status,
            crc,
            timestamp,
            baseline_file,
            json_definition_file,
        })
    }
}

/// Write the skeleton definition unless one exists. Returns true if created.
pub fn ensure_skeleton(path: &Path, seq: &CommandSequence) -> Result<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let skeleton = json!({
        "command_sequence": seq.parts(),
        "description": "",
        "usage": "",
        "options": [],
        "arguments": [],
        "subcommands": [],
        "metadata": {
            "ground_truth_crc": ZERO_CRC,
        },
    });
    let mut content = serde_json::to_string_pretty(&skeleton)?;
    content.push('\n');
    file.write_all(content.as_bytes())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn seq(parts: &[&str]) -> CommandSequence {
        CommandSequence::from_parts(parts).unwrap()
    }

    fn script_capturer(script: &str) -> Capturer {
        Capturer::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string(), "sh".to_string()],
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_artifact_paths() {
        let s = seq(&["ruff", "check"]);
        assert_eq!(BaselineGenerator::baseline_file(&s), "ruff/ruff_check.txt");
        assert_eq!(BaselineGenerator::definition_file(&s), "ruff/ruff_check.json");
        assert_eq!(BaselineGenerator::baseline_file(&seq(&["ruff"])), "ruff/ruff.txt");
    }

    #[tokio::test]
    async fn test_generate_writes_artifacts() {
        let temp = TempDir::new().unwrap();
        let generator = BaselineGenerator::new(temp.path(), script_capturer("printf 'usage: tool\\r\\n  -h  \\r\\n'"));

        let result = generator.generate_or_verify(&seq(&["tool"])).await.unwrap();
        assert_eq!(result.status, BaselineStatus::Clean);
        assert_eq!(result.crc, crc32_hex(b"usage: tool\n  -h\n"));

        let baseline = fs::read(temp.path().join("tool/tool.txt")).unwrap();
        assert_eq!(baseline, b"usage: tool\n  -h\n");

        let skeleton: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("tool/tool.json")).unwrap()).unwrap();
        assert_eq!(skeleton["command_sequence"], json!(["tool"]));
        assert_eq!(skeleton["metadata"]["ground_truth_crc"], json!("0x00000000"));
        for key in ["description", "usage", "options", "arguments", "subcommands"] {
            assert!(skeleton.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_skeleton_never_overwritten() {
        let temp = TempDir::new().unwrap();
        let definition = temp.path().join("tool/tool.json");
        fs::create_dir_all(definition.parent().unwrap()).unwrap();
        fs::write(&definition, "{\"enriched\": true}\n").unwrap();

        let generator = BaselineGenerator::new(temp.path(), script_capturer("echo usage"));
        generator.generate_or_verify(&seq(&["tool"])).await.unwrap();

        assert_eq!(fs::read_to_string(&definition).unwrap(), "{\"enriched\": true}\n");
    }

    #[tokio::test]
    async fn test_baseline_always_rewritten() {
        let temp = TempDir::new().unwrap();
        let baseline = temp.path().join("tool/tool.txt");
        fs::create_dir_all(baseline.parent().unwrap()).unwrap();
        fs::write(&baseline, "stale\n").unwrap();

        let generator = BaselineGenerator::new(temp.path(), script_capturer("echo fresh"));
        generator.generate_or_verify(&seq(&["tool"])).await.unwrap();
        assert_eq!(fs::read_to_string(&baseline).unwrap(), "fresh\n");
    }

    #[tokio::test]
    async fn test_repeated_runs_same_crc() {
        let temp = TempDir::new().unwrap();
        let generator = BaselineGenerator::new(temp.path(), script_capturer("echo 'usage: tool'"));
        let first = generator.generate_or_verify(&seq(&["tool"])).await.unwrap();
        let second = generator.generate_or_verify(&seq(&["tool"])).await.unwrap();
        assert_eq!(first.crc, second.crc);
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn test_soft_exit_kept() {
        let temp = TempDir::new().unwrap();
        let generator = BaselineGenerator::new(temp.path(), script_capturer("echo usage; exit 2"));
        let result = generator.generate_or_verify(&seq(&["tool", "sub"])).await.unwrap();
        assert_eq!(result.status, BaselineStatus::SoftExit(2));
        assert!(temp.path().join("tool/tool_sub.txt").exists());
    }

    #[tokio::test]
    async fn test_hard_failure_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let generator = BaselineGenerator::new(temp.path(), script_capturer("echo broken >&2; exit 1"));
        let err = generator.generate_or_verify(&seq(&["tool"])).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert!(!temp.path().join("tool").exists());
    }

    #[tokio::test]
    async fn test_only_log_lines_is_failure() {
        let temp = TempDir::new().unwrap();
        let generator = BaselineGenerator::new(temp.path(), script_capturer("echo '2024-01-01 00:00:00 INFO hi'"));
        assert!(generator.generate_or_verify(&seq(&["tool"])).await.is_err());
    }

    #[tokio::test]
    async fn test_override_runs_script() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("fake.sh");
        fs::write(&script, "#!/bin/sh\necho \"override $*\"\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let overrides = BTreeMap::from([("tool".to_string(), script)]);
        let generator = BaselineGenerator::new(temp.path(), Capturer::new(vec![], Duration::from_secs(5)))
            .with_overrides(overrides);
        generator.generate_or_verify(&seq(&["tool", "sub"])).await.unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("tool/tool_sub.txt")).unwrap(),
            "override sub\n"
        );
    }
}
