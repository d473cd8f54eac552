use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] pubsub_stream::ConfigurationError),

    #[error("Transport setup failed: {0}")]
    Transport(#[from] pubsub_error::TransportError),

    #[error("Request failed: {0}")]
    Request(#[from] pubsub_error::PubSubError),
}

pub type Result<T> = std::result::Result<T, SdkError>;
