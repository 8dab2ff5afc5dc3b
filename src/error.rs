use thiserror::Error;

/// Failures the reconciler recovers from by falling back to the local cache.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("stats service unreachable: {0}")]
    RemoteUnavailable(String),

    #[error("stats service rejected request (http {status}): {detail}")]
    RemoteRejected { status: u16, detail: String },

    #[error("no credential in slot `{0}`")]
    MissingCredential(String),

    #[error("cached stats payload is malformed: {0}")]
    MalformedCachePayload(String),
}

impl SyncError {
    /// Short tag used in log lines and on `Reconciled::fallback_reason`.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::RemoteUnavailable(_) => "remote_unavailable",
            SyncError::RemoteRejected { .. } => "remote_rejected",
            SyncError::MissingCredential(_) => "missing_credential",
            SyncError::MalformedCachePayload(_) => "malformed_cache_payload",
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SyncError::RemoteUnavailable(format!("timed out: {err}"));
        }
        if let Some(status) = err.status() {
            return SyncError::RemoteRejected {
                status: status.as_u16(),
                detail: err.to_string(),
            };
        }
        SyncError::RemoteUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            SyncError::RemoteUnavailable("x".into()).kind(),
            "remote_unavailable"
        );
        assert_eq!(
            SyncError::RemoteRejected {
                status: 401,
                detail: "expired".into()
            }
            .kind(),
            "remote_rejected"
        );
        assert_eq!(
            SyncError::MalformedCachePayload("eof".into()).kind(),
            "malformed_cache_payload"
        );
    }

    #[test]
    fn rejected_message_includes_status() {
        let err = SyncError::RemoteRejected {
            status: 503,
            detail: "maintenance".into(),
        };
        assert_eq!(
            err.to_string(),
            "stats service rejected request (http 503): maintenance"
        );
    }
}
