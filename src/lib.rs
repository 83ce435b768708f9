//! Vehicle-rental booking engine: registry, temporal conflict
//! resolution, booking lifecycle, availability queries, and owner
//! reporting, persisted through an append-only WAL. The embedding
//! service owns HTTP, auth, and images; it calls [`Engine`].

pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;

pub use engine::{Engine, EngineError};
pub use model::{
    Actor, Booking, BookingStatus, DashboardData, NewVehicle, Role, Span, Vehicle,
};
