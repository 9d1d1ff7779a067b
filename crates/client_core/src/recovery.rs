//! Forgot-password flow: request an OTP, verify it, then set a new password.
//!
//! The session only moves forward. A failed step leaves it where it was, and
//! every client-side check runs before the step's network call.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use shared::protocol::{RequestOtpRequest, ResetPasswordRequest, VerifyOtpRequest};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    transport::{ApiRequest, ApiTransport, TransportError},
    Notifier, Route,
};

pub const REDIRECT_DELAY: Duration = Duration::from_millis(2000);

const REQUEST_OTP_PATH: &str = "/api/forgot-password/request-otp";
const VERIFY_OTP_PATH: &str = "/api/forgot-password/verify-otp";
const RESET_PASSWORD_PATH: &str = "/api/forgot-password/reset-password";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecoveryStep {
    Request,
    Verify,
    Reset,
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("{0}")]
    Validation(String),
    #[error("{message}")]
    Request {
        message: String,
        #[source]
        source: TransportError,
    },
    #[error("{attempted:?} is not accepted while the flow is at {current:?}")]
    OutOfOrder {
        attempted: RecoveryStep,
        /// `None` once the password has been reset.
        current: Option<RecoveryStep>,
    },
}

/// Observable "request in progress" flag for one step.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn raise(&self) -> BusyGuard<'_> {
        self.0.store(true, Ordering::SeqCst);
        BusyGuard(&self.0)
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
struct StepFlags {
    request: BusyFlag,
    verify: BusyFlag,
    reset: BusyFlag,
}

impl StepFlags {
    fn for_step(&self, step: RecoveryStep) -> &BusyFlag {
        match step {
            RecoveryStep::Request => &self.request,
            RecoveryStep::Verify => &self.verify,
            RecoveryStep::Reset => &self.reset,
        }
    }
}

/// Navigation the caller performs once the confirmation toast had time to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRedirect {
    pub route: Route,
    pub delay: Duration,
}

impl PendingRedirect {
    pub async fn wait(self) -> Route {
        tokio::time::sleep(self.delay).await;
        self.route
    }
}

pub struct PasswordRecovery {
    transport: Arc<dyn ApiTransport>,
    notifier: Notifier,
    email: Option<String>,
    step: RecoveryStep,
    completed: bool,
    busy: StepFlags,
}

impl PasswordRecovery {
    pub fn new(transport: Arc<dyn ApiTransport>, notifier: Notifier) -> Self {
        Self {
            transport,
            notifier,
            email: None,
            step: RecoveryStep::Request,
            completed: false,
            busy: StepFlags::default(),
        }
    }

    pub fn step(&self) -> RecoveryStep {
        self.step
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn busy_flag(&self, step: RecoveryStep) -> BusyFlag {
        self.busy.for_step(step).clone()
    }

    pub async fn submit_email(&mut self, email: &str) -> Result<RecoveryStep, RecoveryError> {
        self.expect_step(RecoveryStep::Request)?;
        let email = email.trim();
        if email.is_empty() {
            return Err(self.invalid("Please enter your email!"));
        }

        let body = RequestOtpRequest {
            email: email.to_string(),
        };
        if let Err(source) = self.post(RecoveryStep::Request, REQUEST_OTP_PATH, &body).await {
            let message = source
                .server_message()
                .unwrap_or("Error sending OTP.")
                .to_string();
            return Err(self.rejected(message, source));
        }

        info!(%email, "recovery OTP requested");
        self.email = Some(email.to_string());
        self.step = RecoveryStep::Verify;
        self.notifier.success("OTP sent to your email.");
        Ok(self.step)
    }

    pub async fn submit_otp(&mut self, otp: &str) -> Result<RecoveryStep, RecoveryError> {
        self.expect_step(RecoveryStep::Verify)?;
        let otp = otp.trim();
        if otp.is_empty() {
            return Err(self.invalid("Please enter OTP."));
        }

        let body = VerifyOtpRequest {
            email: self.email.clone().unwrap_or_default(),
            otp: otp.to_string(),
        };
        if let Err(source) = self.post(RecoveryStep::Verify, VERIFY_OTP_PATH, &body).await {
            return Err(self.rejected("Invalid OTP.".to_string(), source));
        }

        self.step = RecoveryStep::Reset;
        self.notifier
            .success("OTP verified. Please enter a new password.");
        Ok(self.step)
    }

    pub async fn submit_new_password(
        &mut self,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<PendingRedirect, RecoveryError> {
        self.expect_step(RecoveryStep::Reset)?;
        if new_password != confirm_password {
            return Err(self.invalid("Passwords do not match."));
        }
        if new_password.is_empty() {
            return Err(self.invalid("Please enter a new password."));
        }

        let body = ResetPasswordRequest {
            email: self.email.clone().unwrap_or_default(),
            new_password: new_password.to_string(),
        };
        if let Err(source) = self.post(RecoveryStep::Reset, RESET_PASSWORD_PATH, &body).await {
            return Err(self.rejected("Error resetting password.".to_string(), source));
        }

        info!(email = self.email.as_deref().unwrap_or_default(), "password reset");
        self.completed = true;
        self.notifier.success("Password reset successfully.");
        Ok(PendingRedirect {
            route: Route::Login,
            delay: REDIRECT_DELAY,
        })
    }

    fn expect_step(&self, attempted: RecoveryStep) -> Result<(), RecoveryError> {
        if self.completed {
            return Err(RecoveryError::OutOfOrder {
                attempted,
                current: None,
            });
        }
        if self.step != attempted {
            return Err(RecoveryError::OutOfOrder {
                attempted,
                current: Some(self.step),
            });
        }
        Ok(())
    }

    async fn post<B: Serialize>(
        &self,
        step: RecoveryStep,
        path: &str,
        body: &B,
    ) -> Result<(), TransportError> {
        let request = ApiRequest::post(path).json(body)?;
        let _busy = self.busy.for_step(step).raise();
        self.transport.execute(request).await.map(|_| ())
    }

    fn invalid(&self, message: &str) -> RecoveryError {
        self.notifier.error(message);
        RecoveryError::Validation(message.to_string())
    }

    fn rejected(&self, message: String, source: TransportError) -> RecoveryError {
        warn!(step = ?self.step, error = %source, "recovery step rejected");
        self.notifier.error(message.clone());
        RecoveryError::Request { message, source }
    }
}

#[cfg(test)]
#[path = "tests/recovery_tests.rs"]
mod tests;
