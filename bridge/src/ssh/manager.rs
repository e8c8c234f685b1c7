use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{quote, CommandOutput, Connector, RemoteShell, Session};
use crate::constants::ssh;
use crate::errors::SessionError;

/// Upload payloads are split so no single command line gets near the
/// kernel's per-argument limit.
const UPLOAD_CHUNK_BYTES: usize = 32 * 1024;

type SessionSlot = Option<Box<dyn Session>>;

/// Owns the single reusable session to one appliance.
///
/// Every session-affecting step (probe, reconnect, execute, upload) runs while
/// holding `session`, so a liveness probe can never interleave with a real
/// command.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    session: Mutex<SessionSlot>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            session: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &str {
        self.connector.host()
    }

    /// Establish a session, or confirm the cached one is still alive
    pub async fn connect(&self) -> Result<(), SessionError> {
        let mut slot = self.session.lock().await;
        self.ensure_live(&mut slot).await
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn ensure_live(&self, slot: &mut MutexGuard<'_, SessionSlot>) -> Result<(), SessionError> {
        if let Some(session) = slot.as_mut() {
            match timeout(ssh::PROBE_TIMEOUT, session.execute(ssh::PROBE_COMMAND)).await {
                Ok(Ok(_)) => {
                    debug!("SSH session to {} reused", self.host());
                    return Ok(());
                }
                Ok(Err(e)) => debug!("SSH session to {} stale, reconnecting: {}", self.host(), e),
                Err(_) => debug!("SSH probe to {} timed out, reconnecting", self.host()),
            }
            if let Some(stale) = slot.take() {
                stale.close().await;
            }
        }

        let session = timeout(ssh::CONNECT_TIMEOUT, self.connector.connect())
            .await
            .map_err(|_| SessionError::ConnectTimeout {
                host: self.host().to_string(),
                seconds: ssh::CONNECT_TIMEOUT.as_secs(),
            })??;

        **slot = Some(session);
        Ok(())
    }

    async fn run_locked(
        &self,
        slot: &mut MutexGuard<'_, SessionSlot>,
        command: &str,
    ) -> Result<CommandOutput, SessionError> {
        self.ensure_live(slot).await?;

        let result = match slot.as_mut() {
            Some(session) => session.execute(command).await,
            None => Err(SessionError::CommandFailed {
                host: self.host().to_string(),
                reason: "session not established".to_string(),
            }),
        };

        if result.is_err() {
            // Next caller reconnects instead of probing a broken channel
            if let Some(broken) = slot.take() {
                broken.close().await;
            }
        }
        result
    }
}

/// Commands that write `content` to `path` in bounded chunks
pub(crate) fn upload_commands(path: &str, content: &str) -> Vec<String> {
    let target = quote(path);
    if content.is_empty() {
        return vec![format!(": > {}", target)];
    }

    let mut commands = Vec::new();
    let mut rest = content;
    while !rest.is_empty() {
        let mut cut = rest.len().min(UPLOAD_CHUNK_BYTES);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (chunk, tail) = rest.split_at(cut);
        let redirect = if commands.is_empty() { ">" } else { ">>" };
        commands.push(format!("printf '%s' {} {} {}", quote(chunk), redirect, target));
        rest = tail;
    }
    commands
}

#[async_trait]
impl RemoteShell for SessionManager {
    async fn execute(&self, command: &str) -> Result<CommandOutput, SessionError> {
        let mut slot = self.session.lock().await;
        self.run_locked(&mut slot, command).await
    }

    async fn upload(
        &self,
        path: &str,
        content: &str,
        executable: bool,
    ) -> Result<(), SessionError> {
        let mut commands = upload_commands(path, content);
        if executable {
            commands.push(format!("chmod +x {}", quote(path)));
        }

        let mut slot = self.session.lock().await;
        for command in commands {
            let output = self.run_locked(&mut slot, &command).await?;
            if !output.success() {
                warn!("Upload of {} to {} failed: {}", path, self.host(), output.stderr.trim());
                return Err(SessionError::CommandFailed {
                    host: self.host().to_string(),
                    reason: format!(
                        "writing {} exited with {}: {}",
                        path,
                        output.exit_status,
                        output.stderr.trim()
                    ),
                });
            }
        }
        debug!("Uploaded {} ({} bytes) to {}", path, content.len(), self.host());
        Ok(())
    }

    async fn close(&self) {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.take() {
            session.close().await;
            debug!("SSH session to {} closed", self.host());
        }
    }
}
