//! Actions exchanged between the paired devices.
//!
//! Every action is a plain value: none of them name a device, addressing is
//! left to the transport. Actions travel as MessagePack.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::CodecError;

/// All possible cross-device actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagingAction {
    /// Ask the peer to report its trackable state.
    ConnectionRequest,
    /// The sender is ready to mirror a live session.
    Trackable,
    /// The sender will not mirror a live session.
    Untrackable,
    /// Start a new session or resume a paused one.
    StartOrResume,
    /// Pause the running session.
    Pause,
    /// Finish the session.
    Finish,
    /// One heart-rate sample from the companion, in beats per minute.
    HeartRateUpdate {
        /// Beats per minute
        heart_rate: u32,
    },
    /// Elapsed tracking time on the primary.
    TimeUpdate {
        /// Elapsed time since the session started
        elapsed: Duration,
    },
    /// Cumulative distance on the primary.
    DistanceUpdate {
        /// Total distance in meters
        distance_meters: u32,
    },
}

impl MessagingAction {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(self).map_err(CodecError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        rmp_serde::from_slice(bytes).map_err(CodecError::Deserialization)
    }

    /// True for the session intents that mirror the user's controls.
    pub fn is_intent(&self) -> bool {
        matches!(self, Self::StartOrResume | Self::Pause | Self::Finish)
    }

    /// True for one-directional telemetry relays.
    pub fn is_telemetry(&self) -> bool {
        matches!(
            self,
            Self::HeartRateUpdate { .. } | Self::TimeUpdate { .. } | Self::DistanceUpdate { .. }
        )
    }

    /// The trackable announcement matching a local flag.
    pub fn trackability(trackable: bool) -> Self {
        if trackable {
            Self::Trackable
        } else {
            Self::Untrackable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heart_rate_update_wire_roundtrip() {
        let action = MessagingAction::HeartRateUpdate { heart_rate: 163 };
        let bytes = action.to_bytes().unwrap();
        assert_eq!(MessagingAction::from_bytes(&bytes).unwrap(), action);
    }

    #[test]
    fn time_update_keeps_subsecond_precision() {
        let action = MessagingAction::TimeUpdate {
            elapsed: Duration::from_millis(61_250),
        };
        let restored = MessagingAction::from_bytes(&action.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, action);
    }

    #[test]
    fn json_is_tagged_by_type() {
        let json = serde_json::to_value(MessagingAction::DistanceUpdate {
            distance_meters: 1200,
        })
        .unwrap();
        assert_eq!(json["type"], "DistanceUpdate");
        assert_eq!(json["distance_meters"], 1200);

        let json = serde_json::to_value(MessagingAction::Pause).unwrap();
        assert_eq!(json["type"], "Pause");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            MessagingAction::from_bytes(&[0xff, 0x00]),
            Err(CodecError::Deserialization(_))
        ));
    }

    #[test]
    fn classification() {
        assert!(MessagingAction::Finish.is_intent());
        assert!(!MessagingAction::ConnectionRequest.is_intent());
        assert!(MessagingAction::HeartRateUpdate { heart_rate: 1 }.is_telemetry());
        assert!(!MessagingAction::Trackable.is_telemetry());
        assert_eq!(MessagingAction::trackability(true), MessagingAction::Trackable);
        assert_eq!(MessagingAction::trackability(false), MessagingAction::Untrackable);
    }
}
