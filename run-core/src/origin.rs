//! Who triggered a session intent.
//!
//! A user's start/pause/finish is mirrored to the peer exactly once. Intents
//! that arrived from the peer are applied locally and never sent back.

use run_types::MessagingAction;

/// Where an intent came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The user operated this device.
    Local,
    /// The paired device sent it.
    Peer,
}

/// A session intent shared by both devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Start or resume tracking.
    StartOrResume,
    /// Pause tracking.
    Pause,
    /// Finish the session.
    Finish,
}

impl Command {
    /// The intent carried by an inbound action, if it is one.
    pub fn from_action(action: &MessagingAction) -> Option<Self> {
        match action {
            MessagingAction::StartOrResume => Some(Self::StartOrResume),
            MessagingAction::Pause => Some(Self::Pause),
            MessagingAction::Finish => Some(Self::Finish),
            _ => None,
        }
    }

    /// The action that mirrors this intent on the peer.
    pub fn to_action(self) -> MessagingAction {
        match self {
            Self::StartOrResume => MessagingAction::StartOrResume,
            Self::Pause => MessagingAction::Pause,
            Self::Finish => MessagingAction::Finish,
        }
    }

    /// The toggle intent for a session that is (or isn't) running.
    pub fn toggle(is_running: bool) -> Self {
        if is_running {
            Self::Pause
        } else {
            Self::StartOrResume
        }
    }
}

/// Action to forward for an intent, `None` when it must not be echoed.
pub fn outbound(command: Command, origin: Origin) -> Option<MessagingAction> {
    match origin {
        Origin::Local => Some(command.to_action()),
        Origin::Peer => None,
    }
}
