use thiserror::Error;

/// Errors raised by broker clients.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker cannot be reached.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker refused or failed to store a published message.
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Receiving from a subscription failed.
    #[error("Receive on subscription {subscription} failed: {reason}")]
    Receive {
        subscription: String,
        reason: String,
    },

    /// An ack or nack could not be recorded.
    #[error("Acknowledgement of message {message_id} failed: {reason}")]
    Acknowledge { message_id: String, reason: String },

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
