//! Shell hook runner
//!
//! OS-level effects are delegated to operator-configured commands. A hook is
//! run through `sh -c`, extra arguments become `$1`, `$2`, ...

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::errors::AgentError;

/// Upper bound for a single hook
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// Run `hook` if configured. An unset hook succeeds without doing anything.
pub async fn run_hook(name: &str, hook: Option<&str>, args: &[&str]) -> Result<(), AgentError> {
    let Some(script) = hook.filter(|s| !s.trim().is_empty()) else {
        debug!("Hook {} not configured, skipping", name);
        return Ok(());
    };

    debug!("Running hook {}: {}", name, script);

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(script)
        .arg(name)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| AgentError::CapabilityError(format!("{}: failed to spawn: {}", name, e)))?;

    let output = tokio::time::timeout(HOOK_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| AgentError::CapabilityError(format!("{}: timed out after {:?}", name, HOOK_TIMEOUT)))?
        .map_err(|e| AgentError::CapabilityError(format!("{}: {}", name, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AgentError::CapabilityError(format!(
            "{}: exited with {}: {}",
            name,
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}
