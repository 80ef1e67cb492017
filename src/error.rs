use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The inbound identity credential is missing or was rejected.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// No usable Gmail tokens are stored for the subject.
    #[error("no gmail tokens stored for user {user_id}")]
    CredentialsMissing { user_id: String },

    /// The refresh-token exchange did not yield a new access token.
    #[error("gmail oauth token refresh failed: status={status} body={body}")]
    RefreshFailure { status: u16, body: String },

    /// The Gmail API answered with a non-success status.
    #[error("gmail api request failed: {status} {status_text}")]
    ApiFailure { status: u16, status_text: String },

    #[error("message {message_id} has no {header} header")]
    MissingHeader {
        message_id: String,
        header: &'static str,
    },

    #[error("no sender address in From header {raw:?}")]
    SenderNotFound { raw: String },

    #[error("http transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("credential store: {0}")]
    Store(#[from] DbError),
}

impl ProbeError {
    pub fn decode(context: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { context, source }
    }

    /// Whether a failure while handling one message should be isolated to that
    /// message instead of aborting the batch.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            Self::ApiFailure { .. }
                | Self::MissingHeader { .. }
                | Self::SenderNotFound { .. }
                | Self::Transport(_)
                | Self::Decode { .. }
        )
    }

    /// Full `source()` chain joined with `: `, for diagnostic responses.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let rendered = cause.to_string();
            if !out.ends_with(&rendered) {
                out.push_str(": ");
                out.push_str(&rendered);
            }
            source = cause.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::ProbeError;
    use crate::db::DbError;

    #[test]
    fn item_scope_covers_only_message_level_failures() {
        let api = ProbeError::ApiFailure {
            status: 404,
            status_text: "Not Found".to_string(),
        };
        assert!(api.is_item_scoped());
        assert!(ProbeError::SenderNotFound {
            raw: "Undisclosed".to_string()
        }
        .is_item_scoped());

        let refresh = ProbeError::RefreshFailure {
            status: 400,
            body: "invalid_grant".to_string(),
        };
        assert!(!refresh.is_item_scoped());
        assert!(!ProbeError::Store(DbError::Config("locked".to_string())).is_item_scoped());
        assert!(!ProbeError::AuthFailure("no bearer".to_string()).is_item_scoped());
    }

    #[test]
    fn chain_includes_sources() {
        let source = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        let error = ProbeError::decode("gmail message list", source);
        let chain = error.chain();
        assert!(chain.starts_with("decode gmail message list:"));
        assert!(chain.contains("EOF"));
    }
}
