//! Email composer for a student's mailbox.

use shared::{
    domain::{EmailRecord, StudentId},
    protocol::SendEmailRequest,
};
use tracing::{info, warn};

use crate::{
    error::PortalError,
    transport::{call, ApiRequest},
    PortalClient,
};

const EMAILS_PATH: &str = "/emails";

/// Message being composed. The first line doubles as the subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailDraft {
    pub message: String,
    /// Attachment file names; only the names are sent.
    pub attachments: Vec<String>,
}

impl EmailDraft {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attachments: Vec::new(),
        }
    }

    /// Prefills a reply quoting `email`.
    pub fn reply_to(email: &EmailRecord) -> Self {
        Self::new(format!("Re: {}\n\n{}", email.subject, email.body))
    }

    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.message.trim().is_empty()
    }
}

impl PortalClient {
    pub async fn list_emails(&self, student_id: &StudentId) -> Result<Vec<EmailRecord>, PortalError> {
        let path = format!("{EMAILS_PATH}/{student_id}");
        Ok(call(self.transport.as_ref(), ApiRequest::get(path)).await?)
    }

    /// Sends `draft` and returns the refreshed mailbox. The draft is reset on success.
    pub async fn send_email(
        &self,
        student_id: &StudentId,
        draft: &mut EmailDraft,
    ) -> Result<Vec<EmailRecord>, PortalError> {
        if draft.is_empty() {
            return Err(PortalError::Validation("the message is empty".to_string()));
        }
        let request = ApiRequest::post(EMAILS_PATH).json(&SendEmailRequest {
            student_id: student_id.clone(),
            subject: draft.subject().to_string(),
            body: draft.message.clone(),
            attachments: draft.attachments.clone(),
        })?;
        if let Err(err) = self.transport.execute(request).await {
            warn!(%student_id, error = %err, "failed to send email");
            self.notifier.error("Failed to send email.");
            return Err(err.into());
        }

        info!(%student_id, subject = %draft.subject(), "email sent");
        self.notifier.success("Email sent successfully!");
        *draft = EmailDraft::default();
        self.list_emails(student_id).await
    }
}
