//! Callback receiver: the automation webhook posts its late reply here.
//!
//! The session id travels in the callback URL's query string so the workflow does not need to
//! echo it; a `sessionId` body field is accepted as a fallback.

use crate::automation::WorkflowReply;
use crate::error::RelayError;
use crate::pending::PendingReplyStore;

/// Validate a callback body and buffer its reply for the session's next poll.
/// A body that is not JSON is treated as carrying no message.
pub async fn receive(
    store: &dyn PendingReplyStore,
    query_session_id: Option<&str>,
    body: &[u8],
) -> Result<String, RelayError> {
    let payload = WorkflowReply::from_body(body);
    let session_id = query_session_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            payload
                .session_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| RelayError::validation("sessionId and message are required"))?;
    let reply = payload
        .into_pending_reply()
        .ok_or_else(|| RelayError::validation("sessionId and message are required"))?;
    store.put(&session_id, reply).await;
    log::info!("callback reply buffered for session {}", session_id);
    Ok(session_id)
}
