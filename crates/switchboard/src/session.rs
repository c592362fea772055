// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot session commands: `login`, `logout` and `status`.

use secrecy::SecretString;
use switchboard_config::SwitchboardConfig;
use switchboard_core::{AgentStatus, SwitchboardError};
use tracing::info;

use crate::run::{Console, init_tracing};

/// Environment variable that supplies the password for headless logins.
pub const PASSWORD_ENV_VAR: &str = "SWITCHBOARD_PASSWORD";

/// Password from `SWITCHBOARD_PASSWORD`, or an interactive prompt.
fn read_password() -> Result<SecretString, SwitchboardError> {
    if let Ok(password) = std::env::var(PASSWORD_ENV_VAR)
        && !password.is_empty()
    {
        return Ok(SecretString::from(password));
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        eprint!("Password: ");
        let password = rpassword::read_password()
            .map_err(|e| SwitchboardError::Internal(format!("failed to read password: {e}")))?;
        if password.is_empty() {
            return Err(SwitchboardError::ValidationRejected("empty password".into()));
        }
        return Ok(SecretString::from(password));
    }

    Err(SwitchboardError::ValidationRejected(format!(
        "no password provided, set {PASSWORD_ENV_VAR} or run interactively"
    )))
}

pub async fn login(config: &SwitchboardConfig, email: &str) -> Result<(), SwitchboardError> {
    init_tracing(&config.console.log_level);
    let password = read_password()?;
    let console = Console::from_config(config)?;
    let agent = console.credentials.login(email, password).await?;
    println!("signed in as {} ({})", agent.name, agent.id);
    Ok(())
}

pub async fn logout(config: &SwitchboardConfig) -> Result<(), SwitchboardError> {
    init_tracing(&config.console.log_level);
    let console = Console::from_config(config)?;
    if !console.credentials.restore().await? {
        println!("no stored session");
        return Ok(());
    }
    console.credentials.logout().await;
    println!("signed out");
    Ok(())
}

pub async fn set_status(config: &SwitchboardConfig, status: AgentStatus) -> Result<(), SwitchboardError> {
    init_tracing(&config.console.log_level);
    let console = Console::from_config(config)?;
    if !console.credentials.restore().await? {
        return Err(SwitchboardError::CredentialInvalid(
            "no stored session, run `switchboard login` first".into(),
        ));
    }

    // No push session for a one-shot command.
    console.transport.disconnect();
    console.gateway.set_agent_status(status).await?;
    info!(%status, "agent status updated");
    println!("status set to {status}");
    Ok(())
}
