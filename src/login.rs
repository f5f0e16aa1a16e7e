//! Optional login step
//!
//! Best-effort form fill: scan inputs for username/password-shaped fields and
//! buttons for a submit-shaped label. Some deployments are pre-authenticated,
//! so an unidentifiable form is a warning, never a fatal error.

use tracing::{error, info, warn};

use crate::browser::{BrowserError, DomHandle, DomQuery};
use crate::Credentials;

/// Outcome of the optional login step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// No credentials were supplied; the page was not inspected.
    Skipped,
    /// The login form could not be identified, or the scan failed.
    NotAttempted,
    /// Credentials were filled in and the form was submitted.
    Submitted,
}

/// Attempt to log in when both credentials are present.
pub async fn attempt_login<D: DomQuery>(
    dom: &D,
    credentials: Option<&Credentials>,
) -> LoginOutcome {
    let Some(credentials) = credentials else {
        info!("No login credentials provided, skipping login");
        return LoginOutcome::Skipped;
    };

    info!("Attempting to log in");
    match attempt_login_inner(dom, credentials).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Login failed: {e}");
            LoginOutcome::NotAttempted
        }
    }
}

async fn attempt_login_inner<D: DomQuery>(
    dom: &D,
    credentials: &Credentials,
) -> Result<LoginOutcome, BrowserError> {
    let mut username_field = None;
    let mut password_field = None;

    // Document-order scan; later matches win, so the fields closest to the
    // submit button tend to be the ones picked.
    for input in dom.find_by_tag("input").await? {
        let input_type = input.attribute("type").await?.unwrap_or_default();
        let placeholder = input
            .attribute("placeholder")
            .await?
            .unwrap_or_default()
            .to_lowercase();

        if input_type == "text"
            || input_type == "email"
            || placeholder.contains("user")
            || placeholder.contains("email")
        {
            username_field = Some(input);
        } else if input_type == "password" || placeholder.contains("password") {
            password_field = Some(input);
        }
    }

    let mut login_button = None;
    for button in dom.find_by_tag("button").await? {
        let text = button.text().await?.to_lowercase();
        if text.contains("login") || text.contains("sign in") || text.contains("submit") {
            login_button = Some(button);
        }
    }

    let (Some(username_field), Some(password_field), Some(login_button)) =
        (username_field, password_field, login_button)
    else {
        warn!("Could not identify login form elements");
        return Ok(LoginOutcome::NotAttempted);
    };

    username_field.type_text(&credentials.username).await?;
    password_field.type_text(&credentials.password).await?;
    login_button.click().await?;

    info!("Login form submitted");
    Ok(LoginOutcome::Submitted)
}
