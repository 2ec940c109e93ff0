//! Mock command runner for testing.
//!
//! Records every command instead of executing it, keeps a tiny model of
//! `systemctl` unit state so start/stop/is-active behave consistently, and
//! can be configured to fail selected commands.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{CommandOutput, CommandRunner, CommandSpec, ProcessResult};

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<CommandSpec>,
    active_units: HashSet<String>,
    failing: Vec<String>,
}

/// Mock command runner for testing.
///
/// # Examples
///
/// ```ignore
/// use smbshare::process::mock::MockRunner;
///
/// let runner = MockRunner::new().with_active_unit("smbd").fail_on("smbpasswd");
/// // ... drive code that shells out ...
/// assert!(runner.command_lines().contains(&"smbcontrol smbd reload-config".to_string()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
}

impl MockRunner {
    /// Create a runner where every command succeeds and no unit is active.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a systemd unit as already running.
    pub fn with_active_unit(self, unit: impl Into<String>) -> Self {
        self.state().active_units.insert(unit.into());
        self
    }

    /// Fail every command whose command line starts with `prefix`.
    pub fn fail_on(self, prefix: impl Into<String>) -> Self {
        self.state().failing.push(prefix.into());
        self
    }

    /// All commands run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.state().calls.clone()
    }

    /// Command lines of all commands run so far, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .map(CommandSpec::command_line)
            .collect()
    }

    /// Forget recorded calls, keeping unit state.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Whether the simulated unit is running.
    pub fn is_unit_active(&self, unit: &str) -> bool {
        self.state().active_units.contains(unit)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn output(&self, command: &CommandSpec) -> ProcessResult<CommandOutput> {
        let mut state = self.state();
        state.calls.push(command.clone());

        let line = command.command_line();
        if state.failing.iter().any(|prefix| line.starts_with(prefix)) {
            return Ok(CommandOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: "simulated failure".to_string(),
            });
        }

        let mut success = true;
        if command.program == "systemctl" {
            let unit = command.args.last().cloned().unwrap_or_default();
            match command.args.first().map(String::as_str) {
                Some("start") => {
                    state.active_units.insert(unit);
                }
                Some("stop") => {
                    state.active_units.remove(&unit);
                }
                Some("is-active") => success = state.active_units.contains(&unit),
                _ => {}
            }
        }

        Ok(CommandOutput {
            success,
            code: Some(if success { 0 } else { 3 }),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}
