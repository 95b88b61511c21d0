//! Error types shared across StrideLink.

use thiserror::Error;

/// Encoding or decoding a wire/store payload failed.
#[derive(Debug, Error)]
pub enum CodecError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),
}

/// Failures talking to the remote run service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum NetworkError {
    /// No connectivity at all.
    #[error("no internet connection")]
    NoInternet,

    /// The request timed out.
    #[error("request timed out")]
    RequestTimeout,

    /// Credentials were rejected (a token refresh may fix it).
    #[error("unauthorized")]
    Unauthorized,

    /// The remote state conflicts with the request.
    #[error("conflict")]
    Conflict,

    /// The remote asked us to slow down.
    #[error("too many requests")]
    TooManyRequests,

    /// The request body was rejected as too large.
    #[error("payload too large")]
    PayloadTooLarge,

    /// The remote failed internally.
    #[error("server error")]
    ServerError,

    /// The response could not be decoded.
    #[error("serialization error")]
    Serialization,

    /// Anything else.
    #[error("unknown remote error")]
    Unknown,
}

impl NetworkError {
    /// Whether repeating the same request later may succeed.
    ///
    /// Payload, decoding and unclassified errors will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NoInternet
            | Self::RequestTimeout
            | Self::Unauthorized
            | Self::Conflict
            | Self::TooManyRequests
            | Self::ServerError => true,
            Self::PayloadTooLarge | Self::Serialization | Self::Unknown => false,
        }
    }
}

/// Failures sending an action to the paired device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MessagingError {
    /// The link dropped while the action was in flight.
    #[error("connection interrupted")]
    ConnectionInterrupted,

    /// No peer is connected.
    #[error("disconnected")]
    Disconnected,

    /// Anything else.
    #[error("unknown messaging error")]
    Unknown,
}

/// Failures from the companion's exercise tracking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ExerciseError {
    /// The device cannot track this exercise (e.g. no heart-rate sensor).
    #[error("tracking not supported")]
    TrackingNotSupported,

    /// An exercise started by this app is still running.
    #[error("an exercise from this app is already ongoing")]
    OngoingOwnExercise,

    /// An exercise started by another app is running.
    #[error("an exercise from another app is ongoing")]
    OngoingOtherExercise,

    /// The exercise was already ended.
    #[error("exercise already ended")]
    ExerciseAlreadyEnded,

    /// Anything else.
    #[error("unknown exercise error")]
    Unknown,
}

impl ExerciseError {
    /// Notice shown to the user, if any.
    ///
    /// `TrackingNotSupported` is a silent no-op.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::OngoingOwnExercise | Self::OngoingOtherExercise => {
                Some("Another exercise is already in progress.")
            }
            Self::ExerciseAlreadyEnded => Some("This exercise has already ended."),
            Self::Unknown => Some("An unknown error occurred."),
            Self::TrackingNotSupported => None,
        }
    }
}
