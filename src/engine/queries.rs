use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::conflict::{find_conflict, validate_span};
use super::{Engine, EngineError};

impl Engine {
    /// Vehicles in `location` with no active booking overlapping `span`.
    ///
    /// Location is a case-insensitive exact match; vehicles the owner has
    /// withdrawn (`is_available = false`) are excluded even with zero
    /// bookings. An empty result is a valid answer, not an error.
    pub async fn find_available(
        &self,
        location: &str,
        span: Span,
    ) -> Result<Vec<Vehicle>, EngineError> {
        validate_span(&span)?;
        let started = std::time::Instant::now();

        let mut available = Vec::new();
        let candidates: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for vs in candidates {
            let guard = vs.read().await;
            if !guard.vehicle.is_available {
                continue;
            }
            if !guard.vehicle.location.eq_ignore_ascii_case(location) {
                continue;
            }
            if find_conflict(&guard, &span).is_none() {
                available.push(guard.vehicle.clone());
            }
        }

        metrics::histogram!(crate::observability::AVAILABILITY_QUERY_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok(available)
    }

    /// Calendar-date wrapper around [`Engine::find_available`].
    pub async fn find_available_for_dates(
        &self,
        location: &str,
        pickup: NaiveDate,
        return_date: NaiveDate,
    ) -> Result<Vec<Vehicle>, EngineError> {
        self.find_available(location, Span::from_dates(pickup, return_date))
            .await
    }

    /// Public catalogue: every vehicle currently open for booking.
    pub async fn list_vehicles(&self) -> Vec<Vehicle> {
        let candidates: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut vehicles = Vec::new();
        for vs in candidates {
            let guard = vs.read().await;
            if guard.vehicle.is_available {
                vehicles.push(guard.vehicle.clone());
            }
        }
        vehicles
    }

    pub async fn get_vehicle(&self, id: Ulid) -> Option<Vehicle> {
        let vs = self.get_vehicle_state(&id)?;
        let guard = vs.read().await;
        Some(guard.vehicle.clone())
    }

    /// An owner's listings, most recent first.
    pub async fn list_vehicles_for_owner(&self, actor: Actor) -> Vec<Vehicle> {
        let ids = self
            .vehicles_by_owner
            .get(&actor.id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut vehicles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(vs) = self.get_vehicle_state(&id) {
                vehicles.push(vs.read().await.vehicle.clone());
            }
        }
        vehicles.sort_by_key(|v| std::cmp::Reverse(v.created_at));
        vehicles
    }

    /// A renter's bookings, most recently created first.
    pub async fn list_bookings_for_renter(&self, actor: Actor) -> Result<Vec<Booking>, EngineError> {
        let ids = self
            .bookings_by_renter
            .get(&actor.id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        Ok(self.collect_bookings(&ids).await)
    }

    /// Bookings on an owner's vehicles, most recently created first.
    /// Owner role required.
    pub async fn list_bookings_for_owner(&self, actor: Actor) -> Result<Vec<Booking>, EngineError> {
        if actor.role != Role::Owner {
            return Err(EngineError::Unauthorized);
        }
        let ids = self
            .bookings_by_owner
            .get(&actor.id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        Ok(self.collect_bookings(&ids).await)
    }

    /// Resolve booking ids through the reverse index, newest first.
    pub(super) async fn collect_bookings(&self, ids: &[Ulid]) -> Vec<Booking> {
        let mut bookings = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(vehicle_id) = self.vehicle_for_booking(id) else { continue };
            let Some(vs) = self.get_vehicle_state(&vehicle_id) else { continue };
            let guard = vs.read().await;
            if let Some(b) = guard.booking(*id) {
                bookings.push(b.clone());
            }
        }
        bookings.sort_by_key(|b| std::cmp::Reverse((b.created_at, b.id)));
        bookings
    }
}
