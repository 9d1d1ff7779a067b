use std::{sync::Arc, time::Duration};

use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};

pub mod auth;
pub mod confirm;
pub mod credentials;
pub mod email;
pub mod error;
pub mod profile;
pub mod recovery;
pub mod requests;
pub mod task_list;
pub mod thread;
pub mod transport;

pub use confirm::{Affirmed, AssumeYes, ConfirmationGate, DeleteComment, DeleteTask};
pub use credentials::{CredentialContext, Credentials};
pub use email::EmailDraft;
pub use error::{AuthError, PortalError};
pub use profile::{DocumentUpload, NamedDownload, ProfileForm};
pub use recovery::{PasswordRecovery, PendingRedirect, RecoveryError, RecoveryStep};
pub use task_list::{paginate, DeadlineRange, Page, TaskFilter, TASKS_PER_PAGE};
pub use thread::{InFlightRegistry, Submission, TaskThread, ThreadError};
pub use transport::{ApiRequest, ApiTransport, HttpTransport, Method, TransportError};

pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);
const KEEP_ALIVE_PATH: &str = "/keep-alive";

/// Surfaces a flow lands on once it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Home,
    TaskList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// User-visible toast emitted by a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    events: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Error, message.into());
    }

    fn publish(&self, level: NotificationLevel, message: String) {
        // Nobody listening is fine; the flow result still reaches the caller.
        let _ = self.events.send(Notification { level, message });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry point tying the transport, the credential slot and the flows together.
#[derive(Clone)]
pub struct PortalClient {
    transport: Arc<dyn ApiTransport>,
    credentials: CredentialContext,
    in_flight: InFlightRegistry,
    notifier: Notifier,
}

impl PortalClient {
    pub fn connect(backend_url: &str, credentials: CredentialContext) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(backend_url, credentials.clone())?;
        Ok(Self::with_transport(Arc::new(transport), credentials))
    }

    pub fn with_transport(transport: Arc<dyn ApiTransport>, credentials: CredentialContext) -> Self {
        Self {
            transport,
            credentials,
            in_flight: InFlightRegistry::default(),
            notifier: Notifier::new(),
        }
    }

    pub fn credentials(&self) -> &CredentialContext {
        &self.credentials
    }

    pub fn transport(&self) -> &dyn ApiTransport {
        self.transport.as_ref()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn password_recovery(&self) -> PasswordRecovery {
        PasswordRecovery::new(Arc::clone(&self.transport), self.notifier.clone())
    }

    pub fn task_thread(&self, task_id: shared::domain::TaskId) -> TaskThread {
        TaskThread::new(
            Arc::clone(&self.transport),
            self.in_flight.clone(),
            self.notifier.clone(),
            task_id,
        )
    }

    /// Pings the backend on a fixed cadence until the handle is aborted.
    pub fn spawn_keep_alive(&self, every: Duration) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match transport.execute(ApiRequest::get(KEEP_ALIVE_PATH)).await {
                    Ok(_) => debug!("keep-alive ping ok"),
                    Err(err) => warn!(error = %err, "keep-alive ping failed"),
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
