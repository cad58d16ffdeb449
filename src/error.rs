use thiserror::Error;

use crate::format::ts::StreamKind;

/// Broad classification of a [`DemuxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Opening, reading or writing a byte stream failed
    Io,
    /// No consistent packet size/offset was found
    Sync,
    /// Malformed transport packet
    StructuralPacket,
    /// Malformed PAT/PMT section
    Psi,
    /// Malformed PES header
    Pes,
    /// Continuity counter gap on a tracked PID
    Continuity,
    /// An output of the same kind is already registered
    OutputExists,
}

/// Errors raised while demultiplexing a transport stream.
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sync error: {0}")]
    Sync(String),

    #[error("packet error at offset {offset:#010X}: {message}")]
    Packet { offset: u64, message: String },

    #[error("psi error at offset {offset:#010X}: {message}")]
    Psi { offset: u64, message: String },

    #[error("pes error on pid {pid}: {message}")]
    Pes { pid: u16, message: String },

    #[error("continuity error on pid {pid}: expected {expected}, got {actual}")]
    Continuity { pid: u16, expected: u8, actual: u8 },

    #[error("output already exists ({0})")]
    OutputExists(StreamKind),
}

impl DemuxError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DemuxError::Io(_) => ErrorKind::Io,
            DemuxError::Sync(_) => ErrorKind::Sync,
            DemuxError::Packet { .. } => ErrorKind::StructuralPacket,
            DemuxError::Psi { .. } => ErrorKind::Psi,
            DemuxError::Pes { .. } => ErrorKind::Pes,
            DemuxError::Continuity { .. } => ErrorKind::Continuity,
            DemuxError::OutputExists(_) => ErrorKind::OutputExists,
        }
    }
}

pub type Result<T> = std::result::Result<T, DemuxError>;
