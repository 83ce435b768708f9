use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Widen calendar dates to a rental span: pickup at start of day,
    /// return at start of the return day. Not validated here — the
    /// engine rejects inverted ranges so callers get an error, not a
    /// panic.
    pub fn from_dates(pickup: NaiveDate, return_date: NaiveDate) -> Self {
        Self {
            start: date_start_ms(pickup),
            end: date_start_ms(return_date),
        }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Midnight UTC of the given calendar date, in unix ms.
pub fn date_start_ms(date: NaiveDate) -> Ms {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Renter,
    Owner,
}

/// Authenticated caller, supplied by the identity provider and trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn renter(id: Ulid) -> Self {
        Self { id, role: Role::Renter }
    }

    pub fn owner(id: Ulid) -> Self {
        Self { id, role: Role::Owner }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings hold their slot; cancelled ones never conflict again.
    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

/// A listed vehicle. Never hard-deleted: delisting clears `owner` and
/// `is_available` but keeps the record so past bookings stay resolvable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Ulid,
    pub owner: Option<Ulid>,
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub category: String,
    /// Free-text city name; matched case-insensitively by queries.
    pub location: String,
    pub transmission: String,
    pub fuel_type: String,
    pub seating_capacity: u8,
    pub price_per_day: Decimal,
    pub description: String,
    /// Opaque URL — the image store lives outside this crate.
    pub image: Option<String>,
    /// Owner toggle, independent of bookings.
    pub is_available: bool,
    pub created_at: Ms,
}

/// Listing data as submitted by an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub category: String,
    pub location: String,
    pub transmission: String,
    pub fuel_type: String,
    pub seating_capacity: u8,
    pub price_per_day: Decimal,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub renter: Ulid,
    /// Vehicle owner at booking time; kept even if the vehicle is later delisted.
    pub owner: Ulid,
    pub vehicle_id: Ulid,
    pub span: Span,
    /// Pickup location as requested, not necessarily the vehicle's registry location.
    pub location: String,
    /// Computed at creation, immutable afterwards.
    pub price: Decimal,
    pub status: BookingStatus,
    pub created_at: Ms,
}

/// A vehicle plus its full booking history, sorted by `span.start`.
/// One of these sits behind each registry lock.
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub vehicle: Vehicle,
    pub bookings: Vec<Booking>,
}

impl VehicleState {
    pub fn new(vehicle: Vehicle) -> Self {
        Self {
            vehicle,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

/// The event types — this is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    VehicleAdded {
        vehicle: Vehicle,
    },
    VehicleAvailabilitySet {
        id: Ulid,
        is_available: bool,
    },
    VehicleDelisted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        vehicle_id: Ulid,
        status: BookingStatus,
    },
}

/// Extract the vehicle id an event applies to.
pub fn event_vehicle_id(event: &Event) -> Ulid {
    match event {
        Event::VehicleAdded { vehicle } => vehicle.id,
        Event::VehicleAvailabilitySet { id, .. } | Event::VehicleDelisted { id } => *id,
        Event::BookingCreated { booking } => booking.vehicle_id,
        Event::BookingStatusChanged { vehicle_id, .. } => *vehicle_id,
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardData {
    pub total_vehicles: usize,
    pub total_bookings: usize,
    pub pending_count: usize,
    pub confirmed_count: usize,
    /// Most recently created first.
    pub recent_bookings: Vec<Booking>,
    /// Confirmed revenue for the current calendar month.
    pub monthly_revenue: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vehicle() -> Vehicle {
        Vehicle {
            id: Ulid::new(),
            owner: Some(Ulid::new()),
            brand: "Toyota".into(),
            model: "Corolla".into(),
            year: 2021,
            category: "sedan".into(),
            location: "Austin".into(),
            transmission: "Automatic".into(),
            fuel_type: "Petrol".into(),
            seating_capacity: 5,
            price_per_day: Decimal::from(100),
            description: String::new(),
            image: None,
            is_available: true,
            created_at: 0,
        }
    }

    fn booking(start: Ms, end: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            renter: Ulid::new(),
            owner: Ulid::new(),
            vehicle_id: Ulid::new(),
            span: Span::new(start, end),
            location: "Austin".into(),
            price: Decimal::from(100),
            status: BookingStatus::Pending,
            created_at: 0,
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_from_dates_is_day_granular() {
        let pickup = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let ret = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let span = Span::from_dates(pickup, ret);
        assert_eq!(span.duration_ms(), 2 * 86_400_000);
        assert_eq!(span.start % 86_400_000, 0); // midnight UTC
    }

    #[test]
    fn span_from_dates_inverted_does_not_panic() {
        let pickup = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let ret = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let span = Span::from_dates(pickup, ret);
        assert!(span.start >= span.end);
    }

    #[test]
    fn status_activity() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
    }

    #[test]
    fn booking_ordering() {
        let mut vs = VehicleState::new(test_vehicle());
        vs.insert_booking(booking(300, 400));
        vs.insert_booking(booking(100, 200));
        vs.insert_booking(booking(200, 300));
        assert_eq!(vs.bookings[0].span.start, 100);
        assert_eq!(vs.bookings[1].span.start, 200);
        assert_eq!(vs.bookings[2].span.start, 300);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut vs = VehicleState::new(test_vehicle());
        vs.insert_booking(booking(100, 200)); // past
        vs.insert_booking(booking(450, 600)); // overlaps query
        vs.insert_booking(booking(1000, 1100)); // starts after query end

        let query = Span::new(500, 800);
        let hits: Vec<_> = vs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // Booking ending exactly at query.start is NOT overlapping (half-open)
        let mut vs = VehicleState::new(test_vehicle());
        vs.insert_booking(booking(100, 200));
        let query = Span::new(200, 300);
        assert_eq!(vs.overlapping(&query).count(), 0);
    }

    #[test]
    fn overlapping_spanning_booking_found() {
        let mut vs = VehicleState::new(test_vehicle());
        vs.insert_booking(booking(0, 10_000));
        let query = Span::new(500, 600);
        assert_eq!(vs.overlapping(&query).count(), 1);
    }

    #[test]
    fn overlapping_empty_state() {
        let vs = VehicleState::new(test_vehicle());
        let query = Span::new(0, 1000);
        assert_eq!(vs.overlapping(&query).count(), 0);
    }

    #[test]
    fn booking_lookup_by_id() {
        let mut vs = VehicleState::new(test_vehicle());
        let b = booking(100, 200);
        let id = b.id;
        vs.insert_booking(b);
        assert!(vs.booking(id).is_some());
        assert!(vs.booking(Ulid::new()).is_none());

        vs.booking_mut(id).unwrap().status = BookingStatus::Confirmed;
        assert_eq!(vs.booking(id).unwrap().status, BookingStatus::Confirmed);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            booking: booking(1000, 2000),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn event_vehicle_id_resolution() {
        let v = test_vehicle();
        let vid = v.id;
        assert_eq!(event_vehicle_id(&Event::VehicleAdded { vehicle: v }), vid);
        assert_eq!(event_vehicle_id(&Event::VehicleDelisted { id: vid }), vid);
    }
}
