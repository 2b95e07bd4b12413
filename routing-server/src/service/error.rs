//! Per-request routing errors.

use crate::engine::EngineError;

/// Errors that fail a single request. The worker stays usable.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// Request names neither a link id nor a link code
    #[error("request has no {0} link")]
    MissingLink(&'static str),

    /// Link id is not part of the worker's scenario
    #[error("unknown link {0}")]
    UnknownLink(String),

    /// Link code was never registered from the id store
    #[error("unknown link code {0}")]
    UnknownLinkCode(u32),

    /// Engine produced a leg without a travel time
    #[error("{mode} leg has no travel time")]
    MissingTravelTime { mode: String },

    /// Engine produced a transit route without a boarding time
    #[error("transit route {access} -> {egress} has no boarding time")]
    MissingBoardingTime { access: String, egress: String },

    /// Leg attribute cannot be represented on the wire
    #[error("attribute {key} has unsupported type {type_name}")]
    UnsupportedAttribute {
        key: String,
        type_name: &'static str,
    },

    /// Engine failed to answer
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<RouteError> for tonic::Status {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::MissingLink(_)
            | RouteError::UnknownLink(_)
            | RouteError::UnknownLinkCode(_) => tonic::Status::invalid_argument(err.to_string()),
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RouteError::MissingLink("from");
        assert_eq!(err.to_string(), "request has no from link");

        let err = RouteError::UnsupportedAttribute {
            key: "fare".into(),
            type_name: "coord",
        };
        assert_eq!(err.to_string(), "attribute fare has unsupported type coord");

        let err = RouteError::MissingTravelTime { mode: "pt".into() };
        assert_eq!(err.to_string(), "pt leg has no travel time");
    }

    #[test]
    fn status_codes() {
        let status: tonic::Status = RouteError::UnknownLinkCode(7).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = RouteError::MissingTravelTime { mode: "pt".into() }.into();
        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(status.message().contains("travel time"));
    }
}
