use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::protocol::{LoginRequest, LoginResponse};
use tracing::{info, warn};

use crate::{
    credentials::Credentials,
    error::AuthError,
    recovery::PendingRedirect,
    transport::{call, ApiRequest},
    PortalClient, Route,
};

pub const LOGIN_PATH: &str = "/api/students/login";
pub const LOGIN_REDIRECT_DELAY: Duration = Duration::from_millis(1500);

impl PortalClient {
    pub async fn login(&self, email: &str, password: &str) -> Result<PendingRedirect, AuthError> {
        self.login_at(email, password, Utc::now()).await
    }

    /// Signs in and stores credentials that expire [`crate::credentials::SESSION_LIFETIME`] after `now`.
    pub async fn login_at(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingRedirect, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            let message = "Please enter your email and password.";
            self.notifier.error(message);
            return Err(AuthError::Validation(message.to_string()));
        }

        let request = ApiRequest::post(LOGIN_PATH)
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .map_err(AuthError::Request)?;
        let response = match call::<LoginResponse>(self.transport.as_ref(), request).await {
            Ok(response) => response,
            Err(source) => {
                warn!(%email, error = %source, "login request failed");
                self.notifier.error("An error occurred");
                return Err(AuthError::Request(source));
            }
        };

        if !response.success {
            info!(%email, reason = ?response.message, "login rejected");
            self.notifier.error("Invalid credentials");
            return Err(AuthError::InvalidCredentials);
        }
        let Some(token) = response.token.filter(|token| !token.is_empty()) else {
            self.notifier.error("An error occurred");
            return Err(AuthError::MissingToken);
        };

        self.credentials
            .set(Credentials::issued(token, response.uniq_token, email, now))
            .await;
        info!(%email, "signed in");
        self.notifier.success("Login Successful");
        Ok(PendingRedirect {
            route: Route::Home,
            delay: LOGIN_REDIRECT_DELAY,
        })
    }

    pub async fn logout(&self) -> Route {
        if let Some(email) = self.credentials.email().await {
            info!(%email, "signed out");
        }
        self.credentials.clear().await;
        Route::Login
    }

    /// Picks the landing route for a restored session, dropping it if it has expired.
    pub async fn restore_session(&self, now: DateTime<Utc>) -> Route {
        if self.credentials.ensure_fresh(now).await {
            Route::Home
        } else {
            Route::Login
        }
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
