use serde_json::Value;
use thiserror::Error;

use crate::upload::{UploadAck, UploadFailure};

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("response body is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
}

/// A response that parsed as JSON, whatever its status.
///
/// A non-2xx status with a JSON body still lands here: callers that care
/// look at [`UploadReply::status`] or try [`UploadReply::failure`].
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReply {
    pub status: u16,
    pub body: Value,
}

impl UploadReply {
    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn acknowledgment(&self) -> Option<UploadAck> {
        serde_json::from_value(self.body.clone()).ok()
    }

    pub fn failure(&self) -> Option<UploadFailure> {
        serde_json::from_value(self.body.clone()).ok()
    }
}

pub fn decode_reply(status: u16, body: &[u8]) -> Result<UploadReply, ReplyError> {
    let body = serde_json::from_slice::<Value>(body).map_err(ReplyError::InvalidJson)?;
    Ok(UploadReply { status, body })
}

#[cfg(test)]
mod tests {
    use super::decode_reply;
    use crate::upload::UploadErrorCode;
    use serde_json::json;

    #[test]
    fn passes_json_body_through_verbatim() {
        let reply = decode_reply(200, br#"{"ok": true}"#).expect("decode");
        assert_eq!(reply.body, json!({ "ok": true }));
        assert!(reply.is_success_status());
    }

    #[test]
    fn error_status_with_json_body_is_still_a_reply() {
        let reply = decode_reply(400, br#"{"ok": false, "error": "no_files"}"#).expect("decode");
        assert!(!reply.is_success_status());
        let failure = reply.failure().expect("typed failure");
        assert_eq!(failure.error, UploadErrorCode::NoFiles);
        assert!(reply.acknowledgment().is_none());
    }

    #[test]
    fn rejects_non_json_body() {
        assert!(decode_reply(200, b"<html>502 Bad Gateway</html>").is_err());
        assert!(decode_reply(200, b"").is_err());
    }
}
