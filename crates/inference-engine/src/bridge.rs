//! Process Supervisor for the External Estimator

use crate::output::Inference;
use crate::InferenceError;
use feature_engine::{FeatureProfile, FeatureSchema, FeatureVector, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Estimator process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Executable to run
    pub program: String,
    /// Arguments placed before the feature payload
    pub args: Vec<String>,
    /// Wall-clock budget per run (ms)
    pub timeout_ms: u64,
    /// Profile the estimator was trained on
    pub profile: FeatureProfile,
    /// Payload layout version the estimator understands
    pub schema_version: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["ml-engine/explain_soh.py".to_string()],
            timeout_ms: 30_000,
            profile: FeatureProfile::Extended,
            schema_version: SCHEMA_VERSION,
        }
    }
}

impl BridgeConfig {
    /// Schema of the payload the estimator expects
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema {
            profile: self.profile,
            version: self.schema_version,
        }
    }
}

/// Everything a finished estimator process produced
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

/// Spawns one estimator process per request. No pooling, no retries.
#[derive(Debug, Clone)]
pub struct InferenceBridge {
    config: BridgeConfig,
}

impl InferenceBridge {
    /// Create a new bridge
    pub fn new(config: BridgeConfig) -> Self {
        info!(
            "Creating inference bridge: program={} timeout={}ms schema={}",
            config.program,
            config.timeout_ms,
            config.schema()
        );
        Self { config }
    }

    /// Run the estimator and validate its output
    pub async fn invoke(&self, features: &FeatureVector) -> Result<Inference, InferenceError> {
        let output = self.run(features).await?;
        Inference::from_output(output)
    }

    /// Run the estimator to completion, capturing both streams.
    ///
    /// The child is killed when the budget runs out, and also when this
    /// future is dropped before completion.
    pub async fn run(&self, features: &FeatureVector) -> Result<ProcessOutput, InferenceError> {
        if features.schema != self.config.schema() {
            return Err(InferenceError::Encode(format!(
                "features use schema {}, estimator expects {}",
                features.schema,
                self.config.schema()
            )));
        }

        let payload = features
            .to_payload()
            .map_err(|e| InferenceError::Encode(e.to_string()))?;

        let start = Instant::now();
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(&payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InferenceError::Spawn(format!("{}: {}", self.config.program, e)))?;

        debug!("Spawned estimator pid={:?} payload={}", child.id(), payload);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let budget = Duration::from_millis(self.config.timeout_ms);

        let collected = timeout(budget, async {
            let (status, out, err) =
                tokio::join!(child.wait(), read_all(stdout), read_all(stderr));
            Ok::<_, std::io::Error>((status?, out?, err?))
        })
        .await;

        match collected {
            Ok(Ok((status, stdout, stderr))) => {
                let elapsed = start.elapsed();
                debug!("Estimator finished with {} in {}ms", status, elapsed.as_millis());
                Ok(ProcessOutput {
                    status,
                    stdout,
                    stderr,
                    elapsed,
                })
            }
            Ok(Err(e)) => {
                terminate(&mut child).await;
                Err(InferenceError::Io(e.to_string()))
            }
            Err(_) => {
                warn!(
                    "Estimator exceeded {}ms budget, terminating pid={:?}",
                    self.config.timeout_ms,
                    child.id()
                );
                terminate(&mut child).await;
                Err(InferenceError::Timeout(self.config.timeout_ms))
            }
        }
    }

    /// Get configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

/// Kill and reap
async fn terminate(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to terminate estimator: {}", e);
    }
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::Utc;
    use feature_engine::ReadingSnapshot;

    fn features() -> FeatureVector {
        FeatureVector {
            schema: FeatureSchema::current(FeatureProfile::Extended),
            values: vec![Some(24.0), Some(0.05), None],
            snapshot: ReadingSnapshot {
                voltage: Some(3.7),
                temperature: Some(24.0),
                cycles: 42,
            },
            captured_at: Utc::now(),
        }
    }

    /// `sh -c <script> <payload>`: the payload lands in `$0`
    fn shell(script: &str, timeout_ms: u64) -> InferenceBridge {
        InferenceBridge::new(BridgeConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_ms,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_successful_prediction() {
        let bridge = shell(r#"echo '{"prediction": 82.5}'"#, 5_000);
        let inference = bridge.invoke(&features()).await.unwrap();
        assert_eq!(inference.soh, 82.5);
    }

    #[tokio::test]
    async fn test_payload_passed_as_single_argument() {
        let script = r#"
            case "$0" in *'"Re":0.05'*) ;; *) exit 3 ;; esac
            case "$0" in *'"Rct":null'*) ;; *) exit 4 ;; esac
            echo '{"prediction": 91.0}'"#;
        let inference = shell(script, 5_000).invoke(&features()).await.unwrap();
        assert_eq!(inference.soh, 91.0);
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let bridge = shell("echo 'model missing' >&2; exit 1", 5_000);
        match bridge.invoke(&features()).await {
            Err(InferenceError::ProcessExit { code, stderr }) => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "model missing");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_with_zero_exit() {
        let bridge = shell(r#"echo '{"prediction": 70}'; echo 'deprecated' >&2"#, 5_000);
        let err = bridge.invoke(&features()).await.unwrap_err();
        assert!(matches!(err, InferenceError::ProcessStderr(_)));
    }

    #[tokio::test]
    async fn test_garbage_output() {
        let bridge = shell("echo not-json", 5_000);
        let err = bridge.invoke(&features()).await.unwrap_err();
        assert!(matches!(err, InferenceError::OutputParse(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_hung_process_times_out() {
        let pid_file = std::env::temp_dir().join(format!("soh-bridge-pid-{}", std::process::id()));
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
        let bridge = shell(&script, 300);
        let start = Instant::now();

        let err = bridge.invoke(&features()).await.unwrap_err();

        assert!(matches!(err, InferenceError::Timeout(300)));
        assert!(err.is_transient());
        assert!(start.elapsed() < Duration::from_secs(10));

        // Killed and reaped before the error is returned
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let _ = std::fs::remove_file(&pid_file);
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success();
        assert!(!alive, "estimator {} still running", pid.trim());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let bridge = InferenceBridge::new(BridgeConfig {
            program: "/nonexistent/estimator".to_string(),
            args: vec![],
            ..Default::default()
        });
        let err = bridge.invoke(&features()).await.unwrap_err();
        assert_eq!(err.kind(), "process_spawn");
    }

    #[tokio::test]
    async fn test_schema_mismatch_rejected_before_spawn() {
        let bridge = InferenceBridge::new(BridgeConfig {
            program: "/nonexistent/estimator".to_string(),
            profile: FeatureProfile::Basic,
            ..Default::default()
        });
        let err = bridge.invoke(&features()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Encode(_)));
    }
}
