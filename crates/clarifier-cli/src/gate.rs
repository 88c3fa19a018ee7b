//! Shared-password gate checked once before any session starts.

use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Password};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use clarifier_runtime::{AccessConfig, ApiCredential};

/// Environment variable holding the expected password.
pub const PASSWORD_ENV: &str = "CLARIFIER_PASSWORD";

pub const MAX_ATTEMPTS: usize = 3;

/// The configured password, if any. Config wins over the environment.
pub fn expected_password(access: &AccessConfig) -> Option<ApiCredential> {
    ApiCredential::from_config_or_env(&access.as_json(), "password", PASSWORD_ENV, "Access password")
        .ok()
}

/// Ask for the password until it matches or the attempts run out.
///
/// `read` is called with the 1-based attempt number. The gate is open when
/// no password is configured.
pub fn check(
    expected: Option<&ApiCredential>,
    mut read: impl FnMut(usize) -> Result<SecretString>,
) -> Result<()> {
    let Some(expected) = expected else {
        debug!("No access password configured");
        return Ok(());
    };

    for attempt in 1..=MAX_ATTEMPTS {
        let entered = read(attempt)?;
        let granted = expected.matches(entered.expose_secret());
        drop(entered);

        if granted {
            info!(attempt, source = ?expected.source(), "Access granted");
            return Ok(());
        }
        warn!(attempt, "Wrong access password");
    }

    bail!("Access denied after {} attempts", MAX_ATTEMPTS)
}

/// Hidden terminal prompt for [`check`].
pub fn prompt_password(attempt: usize) -> Result<SecretString> {
    let prompt = if attempt == 1 {
        "Password".to_string()
    } else {
        format!("Password (attempt {} of {})", attempt, MAX_ATTEMPTS)
    };

    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()
        .map(SecretString::from)
        .context("Failed to read password")
}
