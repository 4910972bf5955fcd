use thiserror::Error;

/// Errors surfaced by the acoustic link core.
///
/// None of these are fatal to the process; the transmit pipeline is
/// restartable by stopping and starting discovery.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("transmit already in flight")]
    Busy,

    #[error("payload too large: {0} bytes (max {max})", max = crate::utils::consts::MAX_PAYLOAD_BYTES)]
    PayloadTooLarge(usize),

    #[error("frame rejected")]
    FrameRejected,

    #[error("message could not be decrypted")]
    DecryptFailed,

    #[error("malformed datagram: {0}")]
    DatagramMalformed(String),

    #[error("not in a room")]
    NotInRoom,

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
