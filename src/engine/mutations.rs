use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, rental_price, validate_span};
use super::{Engine, EngineError};

/// Transitions an owner may apply. Everything else is rejected.
fn transition_allowed(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    matches!((from, to), (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled))
}

impl Engine {
    /// List a vehicle. Owner role required; the listing starts available.
    pub async fn add_vehicle(
        &self,
        actor: Actor,
        new: NewVehicle,
    ) -> Result<Vehicle, EngineError> {
        if actor.role != Role::Owner {
            return Err(EngineError::Unauthorized);
        }
        if self.state.len() >= MAX_VEHICLES {
            return Err(EngineError::LimitExceeded("too many vehicles"));
        }
        for field in [&new.brand, &new.model, &new.category, &new.transmission, &new.fuel_type] {
            if field.len() > MAX_FIELD_LEN {
                return Err(EngineError::LimitExceeded("listing field too long"));
            }
        }
        if new.location.len() > MAX_LOCATION_LEN {
            return Err(EngineError::LimitExceeded("location too long"));
        }
        if new.description.len() > MAX_DESCRIPTION_LEN {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        if new.price_per_day <= Decimal::ZERO {
            return Err(EngineError::LimitExceeded("price_per_day must be positive"));
        }

        let vehicle = Vehicle {
            id: Ulid::new(),
            owner: Some(actor.id),
            brand: new.brand,
            model: new.model,
            year: new.year,
            category: new.category,
            location: new.location,
            transmission: new.transmission,
            fuel_type: new.fuel_type,
            seating_capacity: new.seating_capacity,
            price_per_day: new.price_per_day,
            description: new.description,
            image: new.image,
            is_available: true,
            created_at: now_ms(),
        };

        let event = Event::VehicleAdded { vehicle: vehicle.clone() };
        self.wal_append(&event).await?;
        self.index_new_vehicle(vehicle.clone());
        metrics::gauge!(crate::observability::VEHICLES_REGISTERED).set(self.state.len() as f64);
        info!(vehicle = %vehicle.id, owner = %actor.id, "vehicle listed");
        Ok(vehicle)
    }

    /// Set the owner-controlled availability flag. Independent of
    /// bookings: withdrawing a vehicle does not touch existing bookings.
    pub async fn set_vehicle_availability(
        &self,
        actor: Actor,
        vehicle_id: Ulid,
        is_available: bool,
    ) -> Result<(), EngineError> {
        let vs = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(vehicle_id))?;
        let mut guard = vs.write().await;
        if guard.vehicle.owner != Some(actor.id) {
            return Err(EngineError::Unauthorized);
        }
        let event = Event::VehicleAvailabilitySet { id: vehicle_id, is_available };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Flip the availability flag, returning the new value.
    pub async fn toggle_vehicle_availability(
        &self,
        actor: Actor,
        vehicle_id: Ulid,
    ) -> Result<bool, EngineError> {
        let vs = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(vehicle_id))?;
        let mut guard = vs.write().await;
        if guard.vehicle.owner != Some(actor.id) {
            return Err(EngineError::Unauthorized);
        }
        let flipped = !guard.vehicle.is_available;
        let event = Event::VehicleAvailabilitySet { id: vehicle_id, is_available: flipped };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(flipped)
    }

    /// Soft delete: owner cleared, availability off, booking history kept.
    pub async fn delist_vehicle(&self, actor: Actor, vehicle_id: Ulid) -> Result<(), EngineError> {
        let vs = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(vehicle_id))?;
        let mut guard = vs.write().await;
        if guard.vehicle.owner != Some(actor.id) {
            return Err(EngineError::Unauthorized);
        }
        let event = Event::VehicleDelisted { id: vehicle_id };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(vehicle = %vehicle_id, "vehicle delisted");
        Ok(())
    }

    /// Reserve a vehicle for `[span.start, span.end)`.
    ///
    /// The vehicle's write lock is held from the conflict check through
    /// the WAL ack, so two concurrent requests for overlapping ranges on
    /// the same vehicle serialize: the second sees the first's booking
    /// and fails with `SlotConflict`.
    pub async fn create_booking(
        &self,
        actor: Actor,
        vehicle_id: Ulid,
        span: Span,
        location: String,
    ) -> Result<Booking, EngineError> {
        validate_span(&span)?;
        if location.len() > MAX_LOCATION_LEN {
            return Err(EngineError::LimitExceeded("location too long"));
        }
        let vs = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(vehicle_id))?;
        let mut guard = vs.write().await;
        if !guard.vehicle.is_available {
            return Err(EngineError::VehicleUnavailable(vehicle_id));
        }
        // Delisted vehicles are also unavailable; an owner must exist here.
        let owner = guard
            .vehicle
            .owner
            .ok_or(EngineError::VehicleUnavailable(vehicle_id))?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_VEHICLE {
            return Err(EngineError::LimitExceeded("too many bookings on vehicle"));
        }

        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let booking = Booking {
            id: Ulid::new(),
            renter: actor.id,
            owner,
            vehicle_id,
            span,
            location,
            price: rental_price(&span, guard.vehicle.price_per_day),
            status: BookingStatus::Pending,
            created_at: now_ms(),
        };

        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        debug!(booking = %booking.id, vehicle = %vehicle_id, renter = %actor.id, "booking created");
        Ok(booking)
    }

    /// Calendar-date wrapper: pickup at start of day, return at start of
    /// the return day (half-open, so back-to-back rentals meet cleanly).
    pub async fn create_booking_for_dates(
        &self,
        actor: Actor,
        vehicle_id: Ulid,
        pickup: NaiveDate,
        return_date: NaiveDate,
        location: String,
    ) -> Result<Booking, EngineError> {
        self.create_booking(actor, vehicle_id, Span::from_dates(pickup, return_date), location)
            .await
    }

    /// Owner-only status transition. Legal moves: Pending→Confirmed,
    /// Pending→Cancelled, Confirmed→Cancelled. Cancelling releases the
    /// slot for future bookings; nothing leaves Cancelled.
    pub async fn change_booking_status(
        &self,
        actor: Actor,
        booking_id: Ulid,
        new_status: BookingStatus,
    ) -> Result<(), EngineError> {
        if actor.role != Role::Owner {
            return Err(EngineError::Unauthorized);
        }
        let (vehicle_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.owner != actor.id {
            return Err(EngineError::Unauthorized);
        }
        let from = booking.status;
        if !transition_allowed(from, new_status) {
            return Err(EngineError::IllegalTransition { from, to: new_status });
        }

        let event = Event::BookingStatusChanged {
            id: booking_id,
            vehicle_id,
            status: new_status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(
            crate::observability::STATUS_CHANGES_TOTAL,
            "status" => new_status.as_str()
        )
        .increment(1);
        debug!(booking = %booking_id, status = new_status.as_str(), "booking status changed");
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Caller-invoked; never scheduled.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let vehicle_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in vehicle_ids {
            let Some(vs) = self.get_vehicle_state(&id) else { continue };
            let guard = vs.read().await;

            events.push(Event::VehicleAdded { vehicle: guard.vehicle.clone() });
            for booking in &guard.bookings {
                // Re-created bookings replay as Pending; a second event
                // restores the final status.
                let mut as_created = booking.clone();
                as_created.status = BookingStatus::Pending;
                events.push(Event::BookingCreated { booking: as_created });
                if booking.status != BookingStatus::Pending {
                    events.push(Event::BookingStatusChanged {
                        id: booking.id,
                        vehicle_id: booking.vehicle_id,
                        status: booking.status,
                    });
                }
            }
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(super::WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(super::WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
