//! Channel plumbing shared by every stub in a bundle.

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channels must be created from within a Tokio runtime")]
    NoRuntime,
    #[error("invalid gRPC endpoint {uri}")]
    InvalidEndpoint {
        uri: String,
        #[source]
        source: tonic::transport::Error,
    },
}

pub mod direct;
