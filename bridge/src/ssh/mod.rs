pub mod backup_api;
pub mod manager;
pub mod operations;

pub use backup_api::{BackupApi, BackupTask};
pub use manager::SessionManager;

use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

use crate::config::ApplianceConfig;
use crate::constants::ssh;
use crate::errors::SessionError;

/// Result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: u32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Serialized access to a shell on the appliance.
///
/// Implemented by [`SessionManager`]; everything above the session layer is
/// written against this trait so it can run against a scripted fake.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn execute(&self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Write `content` to `path`, marking it executable when asked
    async fn upload(&self, path: &str, content: &str, executable: bool)
        -> Result<(), SessionError>;

    /// Drop the cached session, if any
    async fn close(&self);
}

/// One established session handle
#[async_trait]
pub trait Session: Send {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, SessionError>;
    async fn close(self: Box<Self>);
}

/// Opens new sessions for a [`SessionManager`]
#[async_trait]
pub trait Connector: Send + Sync {
    fn host(&self) -> &str;
    async fn connect(&self) -> Result<Box<dyn Session>, SessionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(String),
    KeyFile(PathBuf),
}

/// Pick the authentication method for an appliance.
///
/// A configured password wins, then the first key file that exists among the
/// configured key path and the standard search locations.
pub fn resolve_credentials(appliance: &ApplianceConfig) -> Result<Credentials, SessionError> {
    resolve_credentials_from(appliance, ssh::KEY_SEARCH_PATHS)
}

fn resolve_credentials_from(appliance: &ApplianceConfig, search_paths: &[&str]) -> Result<Credentials, SessionError> {
    if let Some(password) = appliance.password.as_ref().filter(|p| !p.is_empty()) {
        return Ok(Credentials::Password(password.clone()));
    }

    let configured = appliance.ssh_key_path.as_deref().filter(|p| !p.is_empty());
    if let Some(path) = configured {
        if !expand_home(path).exists() {
            warn!("Configured SSH key {} not found, searching default locations", path);
        }
    }

    configured
        .into_iter()
        .chain(search_paths.iter().copied())
        .map(expand_home)
        .find(|path| path.exists())
        .map(Credentials::KeyFile)
        .ok_or_else(|| SessionError::NoCredentials {
            host: appliance.host.clone(),
        })
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Opens real SSH sessions
pub struct SshConnector {
    host: String,
    port: u16,
    username: String,
    credentials: Credentials,
}

impl SshConnector {
    pub fn new(appliance: &ApplianceConfig) -> Result<Self, SessionError> {
        Ok(Self {
            host: appliance.host.clone(),
            port: appliance.port,
            username: appliance.username.clone(),
            credentials: resolve_credentials(appliance)?,
        })
    }

    async fn auth_method(&self) -> Result<AuthMethod, SessionError> {
        match &self.credentials {
            Credentials::Password(password) => Ok(AuthMethod::with_password(password)),
            Credentials::KeyFile(path) => {
                let key_content =
                    fs::read_to_string(path)
                        .await
                        .map_err(|e| SessionError::ConnectFailed {
                            host: self.host.clone(),
                            reason: format!("cannot read key {}: {}", path.display(), e),
                        })?;
                Ok(AuthMethod::with_key(&key_content, None))
            }
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    fn host(&self) -> &str {
        &self.host
    }

    async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        debug!("Establishing SSH connection to {}@{}", self.username, self.host);

        let auth_method = self.auth_method().await?;
        let client = Client::connect(
            (self.host.as_str(), self.port),
            &self.username,
            auth_method,
            ServerCheckMethod::NoCheck,
        )
        .await
        .map_err(|e| match e {
            async_ssh2_tokio::Error::PasswordWrong | async_ssh2_tokio::Error::KeyAuthFailed => {
                SessionError::AuthRejected {
                    host: self.host.clone(),
                }
            }
            other => SessionError::ConnectFailed {
                host: self.host.clone(),
                reason: other.to_string(),
            },
        })?;

        debug!("SSH connection established to {}", self.host);

        Ok(Box::new(SshConnection {
            client,
            host: self.host.clone(),
        }))
    }
}

pub struct SshConnection {
    client: Client,
    host: String,
}

#[async_trait]
impl Session for SshConnection {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        let result = self
            .client
            .execute(command)
            .await
            .map_err(|e| SessionError::CommandFailed {
                host: self.host.clone(),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_status: result.exit_status,
        })
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.client.disconnect().await {
            debug!("Error while closing SSH session to {}: {}", self.host, e);
        }
    }
}

/// Quote a value for interpolation into a POSIX shell command line
pub fn quote(value: &str) -> String {
    shell_words::quote(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceModel;

    fn appliance() -> ApplianceConfig {
        ApplianceConfig {
            host: "nas.local".to_string(),
            port: 22,
            username: "root".to_string(),
            password: None,
            ssh_key_path: None,
            device_model: DeviceModel::UnasPro,
            scan_interval_seconds: 30,
        }
    }

    #[test]
    fn password_takes_precedence_over_key() {
        let mut cfg = appliance();
        cfg.password = Some("hunter2".to_string());
        cfg.ssh_key_path = Some("/keys/id".to_string());
        assert_eq!(
            resolve_credentials(&cfg).unwrap(),
            Credentials::Password("hunter2".to_string())
        );
    }

    #[test]
    fn existing_configured_key_is_used_without_password() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_ed25519");
        std::fs::write(&key, "key").unwrap();
        let fallback = dir.path().join("id_rsa");
        std::fs::write(&fallback, "key").unwrap();

        let mut cfg = appliance();
        cfg.password = Some(String::new());
        cfg.ssh_key_path = Some(key.display().to_string());
        let search = [fallback.to_str().unwrap()];
        assert_eq!(
            resolve_credentials_from(&cfg, &search).unwrap(),
            Credentials::KeyFile(key)
        );
    }

    #[test]
    fn missing_configured_key_falls_back_to_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("id_rsa");
        std::fs::write(&fallback, "key").unwrap();
        let missing = dir.path().join("missing").join("id_ed25519");

        let mut cfg = appliance();
        cfg.ssh_key_path = Some(missing.display().to_string());
        let search = ["/nonexistent/.ssh/id_ed25519", fallback.to_str().unwrap()];
        assert_eq!(
            resolve_credentials_from(&cfg, &search).unwrap(),
            Credentials::KeyFile(fallback)
        );
    }

    #[test]
    fn no_password_and_no_key_file_is_rejected() {
        let mut cfg = appliance();
        cfg.ssh_key_path = Some("/nonexistent/id_ed25519".to_string());
        let search = ["/nonexistent/.ssh/id_rsa"];
        assert!(matches!(
            resolve_credentials_from(&cfg, &search),
            Err(SessionError::NoCredentials { .. })
        ));
    }

    #[test]
    fn quoting_survives_shell_word_splitting() {
        for value in ["plain", "p@ss word", "it's", "a\nb $HOME"] {
            assert_eq!(shell_words::split(&quote(value)).unwrap(), vec![value.to_string()]);
        }
    }
}
