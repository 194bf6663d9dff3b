use thiserror::Error;

/// A request that was rejected before anything was put on the wire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("command descriptor block is empty")]
    EmptyCdb,
    #[error("opcode {0:#04x} has no known command descriptor block length")]
    UnsupportedOpcode(u8),
    #[error("command descriptor block is {0} bytes, at most 16 fit in a CBW")]
    CdbTooLong(usize),
    #[error("payload is {actual} bytes but the command moves {expected} bytes")]
    PayloadLength { expected: usize, actual: usize },
    #[error("destination buffer holds {actual} bytes but {needed} are requested")]
    BufferTooSmall { needed: usize, actual: usize },
    #[error("transfer of {0} bytes does not fit a 32 bit data transfer length")]
    TransferTooLarge(usize),
}

/// The device answered, but not with something the transport can trust.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("status frame was {0} bytes, expected 13")]
    StatusFrameLength(usize),
    #[error("status frame overflowed a {0} byte buffer")]
    StatusFrameOverflow(usize),
    #[error("data stage sent {sent} of {expected} bytes")]
    ShortWrite { expected: usize, sent: usize },
}

/// Every way a Bulk-Only operation can be aborted.
///
/// Device reported failures (`CommandFailed`, phase errors) are not errors,
/// they come back as an [`Outcome`](crate::Outcome).
#[derive(Error, Debug)]
pub enum BotError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("bulk transfer on endpoint {endpoint:#04x} failed after {attempts} attempt(s)")]
    Transport {
        endpoint: u8,
        attempts: usize,
        #[source]
        source: rusb::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("status tag {actual:#010x} does not answer command tag {expected:#010x}")]
    TagMismatch { expected: u32, actual: u32 },
}

impl BotError {
    /// The whole operation may be issued again without touching the device.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BotError::Transport {
                source: rusb::Error::Timeout | rusb::Error::Pipe | rusb::Error::Interrupted,
                ..
            }
        )
    }

    /// The session can no longer be trusted and the device should be reset.
    pub fn needs_reset(&self) -> bool {
        match self {
            BotError::TagMismatch { .. } | BotError::Protocol(_) => true,
            BotError::Transport { source, .. } => matches!(
                source,
                rusb::Error::NoDevice | rusb::Error::Io | rusb::Error::Overflow
            ),
            BotError::Validation(_) => false,
        }
    }
}

pub type Result<T, E = BotError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors_for_callers() {
        let timeout = BotError::Transport {
            endpoint: 0x81,
            attempts: 1,
            source: rusb::Error::Timeout,
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.needs_reset());

        let mismatch = BotError::TagMismatch {
            expected: 1,
            actual: 2,
        };
        assert!(!mismatch.is_retryable());
        assert!(mismatch.needs_reset());

        let invalid = BotError::from(ValidationError::UnsupportedOpcode(0x60));
        assert!(!invalid.is_retryable());
        assert!(!invalid.needs_reset());
    }
}
