//! Hard bounds on externally supplied data. Everything here surfaces
//! as `EngineError::LimitExceeded` rather than unbounded growth.

use crate::model::Ms;

/// Registry size cap.
pub const MAX_VEHICLES: usize = 100_000;

/// Booking history cap per vehicle (cancelled bookings included — history
/// is never deleted).
pub const MAX_BOOKINGS_PER_VEHICLE: usize = 50_000;

/// Cap on free-text fields of a listing (brand, model, category, ...).
pub const MAX_FIELD_LEN: usize = 256;

/// Cap on location strings and booking pickup locations.
pub const MAX_LOCATION_LEN: usize = 128;

/// Cap on listing descriptions.
pub const MAX_DESCRIPTION_LEN: usize = 4_096;

/// Earliest accepted instant: 2000-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;

/// Latest accepted instant: 3000-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 32_503_680_000_000;

/// Longest single rental: 2 years.
pub const MAX_SPAN_DURATION_MS: Ms = 2 * 366 * 86_400_000;

/// How many bookings the dashboard lists as recent activity.
pub const RECENT_BOOKINGS: usize = 3;
