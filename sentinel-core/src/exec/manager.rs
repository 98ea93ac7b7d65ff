//! Execution manager: runtime mode detection and command preparation

use std::path::PathBuf;
use std::time::Instant;

use bollard::Docker;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::planner::FinalCommand;
use crate::{Error, Result};

/// How commands are executed on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// Tools container is reachable; commands run inside it
    Container,
    /// Host execution with a working privilege escalation path
    Native,
    /// Host execution; privilege-requiring commands are refused
    NativeRestricted,
}

/// A command normalized for the current runtime, ready for the runner.
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    pub tool_id: String,
    pub binary: String,
    pub argv: Vec<String>,
    pub target: String,
    /// Scratch root for this invocation's session logs
    pub temp_dir: PathBuf,
    /// Wrapped in a privilege-escalation prompt; the runner keeps at most
    /// one such invocation outstanding
    pub privileged: bool,
}

/// Selects the runtime (container vs native), wraps privilege escalation,
/// and allocates temp paths. The probe result is cached with a TTL so
/// repeated invocations do not hammer the container runtime.
pub struct ExecutionManager {
    config: RuntimeConfig,
    cached_mode: Mutex<Option<(RuntimeMode, Instant)>>,
    forced_mode: Option<RuntimeMode>,
}

impl ExecutionManager {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            cached_mode: Mutex::new(None),
            forced_mode: None,
        }
    }

    /// Pin the runtime mode, skipping the probe. Used by deployments that
    /// know their topology, and by tests.
    pub fn with_forced_mode(config: RuntimeConfig, mode: RuntimeMode) -> Self {
        Self {
            config,
            cached_mode: Mutex::new(None),
            forced_mode: Some(mode),
        }
    }

    /// Current runtime mode, probing at most once per TTL window.
    pub async fn mode(&self) -> RuntimeMode {
        if let Some(forced) = self.forced_mode {
            return forced;
        }

        let mut cached = self.cached_mode.lock().await;
        if let Some((mode, at)) = *cached {
            if at.elapsed().as_secs() < self.config.probe_ttl_secs {
                return mode;
            }
        }

        let mode = self.probe().await;
        debug!("runtime probe: {:?}", mode);
        *cached = Some((mode, Instant::now()));
        mode
    }

    /// Probe order: tools container first, then native privilege support.
    async fn probe(&self) -> RuntimeMode {
        if self.container_reachable().await {
            return RuntimeMode::Container;
        }
        if cfg!(target_os = "linux") && which::which("pkexec").is_ok() {
            return RuntimeMode::Native;
        }
        RuntimeMode::NativeRestricted
    }

    async fn container_reachable(&self) -> bool {
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return false;
        };
        if docker.ping().await.is_err() {
            return false;
        }
        match docker
            .inspect_container(
                &self.config.container_name,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
        {
            Ok(info) => {
                let running = info.state.and_then(|s| s.running).unwrap_or(false);
                if running {
                    info!("tools container '{}' is running", self.config.container_name);
                }
                running
            }
            Err(_) => false,
        }
    }

    /// Normalize a validated command for the current runtime.
    ///
    /// Container mode rewrites the argv to address the tools container;
    /// native mode wraps privilege-requiring commands in pkexec. In
    /// restricted mode privilege-requiring commands are refused.
    pub async fn prepare(&self, command: &FinalCommand) -> Result<PreparedCommand> {
        let mode = self.mode().await;

        let (binary, argv, temp_root, privileged) = match mode {
            RuntimeMode::Container => {
                // Root inside the container, no host prompt involved
                let mut argv = vec![
                    "exec".to_string(),
                    self.config.container_name.clone(),
                    command.binary.clone(),
                ];
                argv.extend(command.argv.iter().cloned());
                (
                    "docker".to_string(),
                    argv,
                    self.config.container_output_dir.clone(),
                    false,
                )
            }
            RuntimeMode::Native if command.requires_root => {
                let mut argv = vec![command.binary.clone()];
                argv.extend(command.argv.iter().cloned());
                (
                    "pkexec".to_string(),
                    argv,
                    self.config.temp_root.clone(),
                    true,
                )
            }
            RuntimeMode::Native => (
                command.binary.clone(),
                command.argv.clone(),
                self.config.temp_root.clone(),
                false,
            ),
            RuntimeMode::NativeRestricted => {
                if command.requires_root {
                    return Err(Error::PrivilegeUnavailable);
                }
                (
                    command.binary.clone(),
                    command.argv.clone(),
                    self.config.temp_root.clone(),
                    false,
                )
            }
        };

        Ok(PreparedCommand {
            tool_id: command.tool_id.clone(),
            binary,
            argv,
            target: command.target.clone(),
            temp_dir: temp_root,
            privileged,
        })
    }

    /// Collision-free scratch file path under the native temp root.
    pub fn temp_path(&self, filename: &str) -> PathBuf {
        let hex = Uuid::new_v4().simple().to_string();
        let unique = &hex[..8];
        self.config
            .temp_root
            .join(format!("sentinel_{unique}_{filename}"))
    }
}
