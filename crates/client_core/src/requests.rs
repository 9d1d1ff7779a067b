use shared::{
    domain::{RequestId, SupportRequest},
    protocol::{CommentRequest, NewSupportRequest},
};
use tracing::info;

use crate::{
    error::PortalError,
    transport::{call, ApiRequest},
    PortalClient,
};

const REQUESTS_PATH: &str = "/api/requests";
const MY_REQUESTS_PATH: &str = "/api/requests/my";

impl PortalClient {
    pub async fn my_requests(&self) -> Result<Vec<SupportRequest>, PortalError> {
        Ok(call(self.transport.as_ref(), ApiRequest::get(MY_REQUESTS_PATH)).await?)
    }

    /// Raises a ticket and returns the refreshed list.
    pub async fn raise_request(
        &self,
        title: &str,
        description: &str,
    ) -> Result<Vec<SupportRequest>, PortalError> {
        let (title, description) = (title.trim(), description.trim());
        if title.is_empty() || description.is_empty() {
            return Err(PortalError::Validation(
                "a ticket needs both a title and a description".to_string(),
            ));
        }
        let request = ApiRequest::post(REQUESTS_PATH).json(&NewSupportRequest {
            title: title.to_string(),
            description: description.to_string(),
        })?;
        self.transport.execute(request).await?;
        info!(%title, "support request raised");
        self.my_requests().await
    }

    /// Comments on a ticket and returns the refreshed list, or `None` for a
    /// blank draft. The draft is cleared on success.
    pub async fn comment_on_request(
        &self,
        request_id: &RequestId,
        draft: &mut String,
    ) -> Result<Option<Vec<SupportRequest>>, PortalError> {
        if draft.trim().is_empty() {
            return Ok(None);
        }
        let request = ApiRequest::post(format!("{REQUESTS_PATH}/{request_id}/comment"))
            .json(&CommentRequest {
                text: draft.clone(),
            })?;
        self.transport.execute(request).await?;
        draft.clear();
        Ok(Some(self.my_requests().await?))
    }
}

#[cfg(test)]
#[path = "tests/requests_tests.rs"]
mod tests;
