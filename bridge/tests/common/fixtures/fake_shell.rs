//! Scripted stand-in for the appliance shell

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use unas_bridge::errors::SessionError;
use unas_bridge::ssh::{CommandOutput, RemoteShell};

/// Answers commands by substring match; the most recently added rule wins.
/// Unmatched commands succeed with empty output.
pub struct FakeShell {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    commands: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, String, bool)>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    closes: AtomicUsize,
}

impl FakeShell {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            delay: Mutex::new(None),
            closes: AtomicUsize::new(0),
        }
    }

    /// Deployed scripts, both services running, no backup tasks
    pub fn healthy() -> Self {
        let shell = Self::new();
        shell.respond("echo 'yes' || echo 'no'", "yes\n");
        shell.respond("systemctl is-active", "active\n");
        shell.respond("remote-backup/tasks", "{\"data\":[]}");
        shell
    }

    pub fn respond(&self, pattern: &str, stdout: &str) {
        self.rules.lock().push((
            pattern.to_string(),
            CommandOutput {
                stdout: stdout.to_string(),
                ..Default::default()
            },
        ));
    }

    pub fn fail(&self, pattern: &str, exit_status: u32, stderr: &str) {
        self.rules.lock().push((
            pattern.to_string(),
            CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_status,
            },
        ));
    }

    /// Report the MQTT client library as missing
    pub fn without_mqtt_library(&self) {
        self.respond("echo 'yes' || echo 'no'", "no\n");
    }

    pub fn with_backup_tasks(&self, tasks: serde_json::Value) {
        self.respond(
            "remote-backup/tasks",
            &serde_json::json!({ "data": tasks }).to_string(),
        );
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|command| command.contains(pattern))
            .count()
    }

    pub fn uploaded_paths(&self) -> Vec<String> {
        self.uploads.lock().iter().map(|(path, _, _)| path.clone()).collect()
    }

    pub fn uploaded(&self, path: &str) -> Option<String> {
        self.uploads
            .lock()
            .iter()
            .rev()
            .find(|(p, _, _)| p == path)
            .map(|(_, content, _)| content.clone())
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn offline_error(&self) -> SessionError {
        SessionError::CommandFailed {
            host: "fake".to_string(),
            reason: "connection reset".to_string(),
        }
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn execute(&self, command: &str) -> Result<CommandOutput, SessionError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(self.offline_error());
        }
        self.commands.lock().push(command.to_string());
        let output = self
            .rules
            .lock()
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }

    async fn upload(&self, path: &str, content: &str, executable: bool) -> Result<(), SessionError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(self.offline_error());
        }
        self.uploads
            .lock()
            .push((path.to_string(), content.to_string(), executable));
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
