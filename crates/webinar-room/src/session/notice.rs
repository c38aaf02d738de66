//! User-facing notices emitted by the session

/// Something the embedding UI should react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The server refused entry
    JoinRejected {
        /// Reason given by the server
        message: String,
    },
    /// The host ended the call
    CallEnded,
    /// Leave the room view
    NavigateAway,
    /// Tear everything down and start over (attendee lost its connection)
    ReloadRequired,
    /// Signaling or a media transport went down
    ConnectionLost,
    /// A participant raised a hand
    HandRaised {
        /// Display name of the participant
        name: String,
    },
}
