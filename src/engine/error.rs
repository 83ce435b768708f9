use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    /// Return instant is not strictly after pickup.
    InvalidRange,
    /// Vehicle or booking does not exist.
    NotFound(Ulid),
    /// Vehicle exists but its owner has withdrawn it.
    VehicleUnavailable(Ulid),
    /// An active booking already covers part of the requested range.
    /// Carries the conflicting booking id for diagnostics; not shown to
    /// end users.
    SlotConflict(Ulid),
    /// Actor lacks rights over the target.
    Unauthorized,
    /// Status change not permitted from the current state.
    IllegalTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange => {
                write!(f, "return date must be after pickup date")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::VehicleUnavailable(id) => {
                write!(f, "vehicle not available: {id}")
            }
            EngineError::SlotConflict(id) => {
                write!(f, "already booked for these dates (booking {id})")
            }
            EngineError::Unauthorized => write!(f, "unauthorized"),
            EngineError::IllegalTransition { from, to } => {
                write!(f, "cannot change booking from {} to {}", from.as_str(), to.as_str())
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
