//! Pre-flight checks run before an appliance is installed.

use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::{ApplianceConfig, MqttConfig};
use crate::constants::ssh;
use crate::errors::{SessionError, SetupError};
use crate::messaging::probe_broker;
use crate::ssh::{Connector, RemoteShell, SessionManager, SshConnector};

const CHECK_COMMAND: &str = "echo 'test'";

impl From<SessionError> for SetupError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::ConnectTimeout { .. } => SetupError::Timeout,
            SessionError::AuthRejected { .. } => SetupError::InvalidAuth,
            SessionError::NoCredentials { .. } => SetupError::NoCredentials,
            SessionError::ConnectFailed { .. } => SetupError::CannotConnect,
            SessionError::CommandFailed { reason, .. } => SetupError::Unknown(reason),
        }
    }
}

/// Open a session through `connector` and run a trivial command
pub async fn check_shell(connector: Arc<dyn Connector>) -> Result<(), SetupError> {
    let host = connector.host().to_string();
    let manager = SessionManager::new(connector);

    let result = match timeout(ssh::SETUP_CHECK_TIMEOUT, manager.execute(CHECK_COMMAND)).await {
        Ok(Ok(output)) if output.stdout.trim() == "test" => Ok(()),
        Ok(Ok(output)) => Err(SetupError::Unknown(format!(
            "unexpected check output: {}",
            output.stdout.trim()
        ))),
        Ok(Err(e)) => {
            warn!("SSH check against {} failed: {}", host, e);
            Err(SetupError::from(e))
        }
        Err(_) => Err(SetupError::Timeout),
    };
    manager.close().await;
    result
}

/// Validate SSH access to the appliance and the broker credentials
pub async fn validate(appliance: &ApplianceConfig, mqtt: &MqttConfig) -> Result<(), SetupError> {
    let connector = SshConnector::new(appliance).map_err(SetupError::from)?;
    check_shell(Arc::new(connector)).await?;
    probe_broker(mqtt).await?;
    info!("Setup checks passed for {}", appliance.host);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::{CommandOutput, Session};
    use async_trait::async_trait;

    enum Behaviour {
        Echo,
        Refuse(fn(&str) -> SessionError),
        Hang,
    }

    struct ScriptedConnector(Behaviour);

    struct EchoSession;

    #[async_trait]
    impl Session for EchoSession {
        async fn execute(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
            let stdout = if command == CHECK_COMMAND { "test\n" } else { "" };
            Ok(CommandOutput {
                stdout: stdout.to_string(),
                ..Default::default()
            })
        }

        async fn close(self: Box<Self>) {}
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        fn host(&self) -> &str {
            "nas.local"
        }

        async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
            match &self.0 {
                Behaviour::Echo => Ok(Box::new(EchoSession)),
                Behaviour::Refuse(make) => Err(make("nas.local")),
                Behaviour::Hang => std::future::pending().await,
            }
        }
    }

    fn check(behaviour: Behaviour) -> impl std::future::Future<Output = Result<(), SetupError>> {
        check_shell(Arc::new(ScriptedConnector(behaviour)))
    }

    #[tokio::test]
    async fn echo_round_trip_passes() {
        assert_eq!(check(Behaviour::Echo).await, Ok(()));
    }

    #[tokio::test]
    async fn rejected_credentials_map_to_invalid_auth() {
        let result = check(Behaviour::Refuse(|host| SessionError::AuthRejected {
            host: host.to_string(),
        }))
        .await;
        assert_eq!(result, Err(SetupError::InvalidAuth));

        let result = check(Behaviour::Refuse(|host| SessionError::ConnectFailed {
            host: host.to_string(),
            reason: "connection refused".to_string(),
        }))
        .await;
        assert_eq!(result.unwrap_err().code(), "cannot_connect");
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_host_times_out() {
        assert_eq!(check(Behaviour::Hang).await, Err(SetupError::Timeout));
    }
}
