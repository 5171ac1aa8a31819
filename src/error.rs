//! Error type shared across the protocol engine.

use std::error::Error;
use std::fmt;
use std::io;

use dpf_tree_lib::DpfError;

/// Everything here is fatal to the computation: the protocol is synchronous
/// and stateful, so there is no retry or resume path.
#[derive(Debug)]
pub enum ProtocolError {
    /// Unreadable or truncated share, query or config file.
    MalformedInput { path: String, detail: String },
    /// Mismatched dimensions handed to a secure operation.
    DimensionMismatch { left: usize, right: usize },
    /// DPF domain does not match the configured item count.
    DomainMismatch { expected: u64, actual: u64 },
    /// DPF parameter or key problem.
    Dpf(DpfError),
    /// Short read/write, reset or EOF on a peer or dealer connection.
    Transport(io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MalformedInput { path, detail } => {
                write!(f, "malformed input {}: {}", path, detail)
            }
            ProtocolError::DimensionMismatch { left, right } => {
                write!(f, "dimension mismatch: {} vs {}", left, right)
            }
            ProtocolError::DomainMismatch { expected, actual } => {
                write!(f, "DPF domain {} does not match item count {}", actual, expected)
            }
            ProtocolError::Dpf(e) => write!(f, "DPF error: {}", e),
            ProtocolError::Transport(e) => write!(f, "transport failure: {}", e),
        }
    }
}

impl Error for ProtocolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProtocolError::Dpf(e) => Some(e),
            ProtocolError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        ProtocolError::Transport(e)
    }
}

impl From<DpfError> for ProtocolError {
    fn from(e: DpfError) -> Self {
        ProtocolError::Dpf(e)
    }
}
