use gqlws_core::{ConnectionId, ErrorDescription, Location};

/// Reasons a subscription is refused by the registry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Subscription ID is empty")]
    EmptyId,

    #[error("Subscription is not associated with a connection")]
    MissingConnection,

    #[error("Subscription query is empty")]
    EmptyQuery,

    #[error("Subscription has no send_data callback set")]
    MissingSendData,

    #[error("Subscription belongs to connection {subscription}, not {connection}")]
    ConnectionMismatch {
        subscription: ConnectionId,
        connection: ConnectionId,
    },

    #[error("{0}")]
    Parse(String),

    #[error("{message}")]
    Validation {
        message: String,
        locations: Vec<Location>,
    },

    #[error("Cannot register subscription {id} twice on connection {connection}")]
    Duplicate { connection: ConnectionId, id: String },
}

impl SubscriptionError {
    pub fn validation(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::Validation {
            message: message.into(),
            locations: vec![Location { line, column }],
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::EmptyId
            | Self::MissingConnection
            | Self::EmptyQuery
            | Self::MissingSendData
            | Self::ConnectionMismatch { .. } => "structural",
            Self::Parse(_) => "parse",
            Self::Validation { .. } => "validation",
            Self::Duplicate { .. } => "duplicate",
        }
    }
}

impl From<&SubscriptionError> for ErrorDescription {
    fn from(err: &SubscriptionError) -> Self {
        match err {
            SubscriptionError::Validation { message, locations } => ErrorDescription {
                message: message.clone(),
                locations: locations.clone(),
            },
            other => ErrorDescription::new(other.to_string()),
        }
    }
}

/// Convert registry errors into the descriptions relayed to a client.
pub fn describe(errors: &[SubscriptionError]) -> Vec<ErrorDescription> {
    errors.iter().map(ErrorDescription::from).collect()
}
