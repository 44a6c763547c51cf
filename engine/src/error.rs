use nix::errno::Errno;
use std::fmt;
use thiserror::Error;

/// The calling thread could not join the real-time domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PromotionError {
    #[error("real-time domain rejected thread registration: {errno}")]
    Rejected { errno: Errno },
    #[error("thread was already refused by the real-time domain")]
    PreviouslyRefused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("unable to initialize {primitive}: {errno}")]
    InitFailed {
        primitive: &'static str,
        errno: Errno,
    },
}

/// Rejected submission. The event is handed back to the caller.
#[derive(Error)]
pub enum SubmitError<E> {
    #[error("event queue is full")]
    Full(E),
    #[error("event queue lock stayed contended for the whole retry budget")]
    Busy(E),
    #[error("event queue is closed")]
    Closed(E),
    #[error("calling thread was refused by the real-time domain and cannot take the event queue lock")]
    Refused(E),
}

impl<E> SubmitError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Full(e) | Self::Busy(e) | Self::Closed(e) | Self::Refused(e) => e,
        }
    }
}

impl<E> fmt::Debug for SubmitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Busy(_) => f.write_str("Busy(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::Refused(_) => f.write_str("Refused(..)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HwError {
    #[error("hardware negotiation failed: {0}")]
    Negotiation(String),
    #[error("unable to start hardware: {0}")]
    Start(String),
    #[error("hardware xrun ({frames} frames lost)")]
    Xrun { frames: u64 },
    #[error("hardware disconnected")]
    Disconnected,
    #[error("hardware io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid driver options: {0}")]
    InvalidOptions(String),
    #[error("hardware setup failed: {0}")]
    Setup(#[from] HwError),
    #[error(transparent)]
    Primitive(#[from] SyncError),
    #[error("driver was already started")]
    AlreadyStarted,
    #[error("driver is not running")]
    NotRunning,
    #[error("unable to spawn real-time thread: {0}")]
    ThreadSpawn(std::io::Error),
    #[error("real-time thread panicked")]
    Panicked,
}
