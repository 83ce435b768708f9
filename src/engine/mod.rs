mod conflict;
mod error;
mod mutations;
mod queries;
mod reports;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedVehicleState = Arc<RwLock<VehicleState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine. One per data directory.
///
/// Each vehicle's record and booking history live behind a single
/// `RwLock`, so a write guard is a per-vehicle critical section: the
/// conflict check and the insert that follows it cannot interleave with
/// another request for the same vehicle.
pub struct Engine {
    pub(super) state: DashMap<Ulid, SharedVehicleState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: booking id → vehicle id.
    pub(super) booking_to_vehicle: DashMap<Ulid, Ulid>,
    /// Owner id → vehicle ids, for owner listings and the dashboard.
    pub(super) vehicles_by_owner: DashMap<Ulid, Vec<Ulid>>,
    /// Renter id → booking ids.
    pub(super) bookings_by_renter: DashMap<Ulid, Vec<Ulid>>,
    /// Owner id → booking ids (owner denormalized at booking time).
    pub(super) bookings_by_owner: DashMap<Ulid, Vec<Ulid>>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            booking_to_vehicle: DashMap::new(),
            vehicles_by_owner: DashMap::new(),
            bookings_by_renter: DashMap::new(),
            bookings_by_owner: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::VehicleAdded { vehicle } => {
                    engine.index_new_vehicle(vehicle.clone());
                }
                other => {
                    let vehicle_id = event_vehicle_id(other);
                    if let Some(entry) = engine.state.get(&vehicle_id) {
                        let vs_arc = entry.value().clone();
                        let mut guard = vs_arc.try_write().expect("replay: uncontended write");
                        engine.apply_to_vehicle(&mut guard, other);
                    }
                }
            }
        }
        if !events.is_empty() {
            tracing::info!("replayed {} events from {}", events.len(), wal_path.display());
        }
        metrics::gauge!(crate::observability::VEHICLES_REGISTERED).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Insert a fresh vehicle into the registry and the owner index.
    pub(super) fn index_new_vehicle(&self, vehicle: Vehicle) {
        let id = vehicle.id;
        let owner = vehicle.owner;
        self.state
            .insert(id, Arc::new(RwLock::new(VehicleState::new(vehicle))));
        if let Some(owner) = owner {
            self.vehicles_by_owner.entry(owner).or_default().push(id);
        }
    }

    /// Apply an event to a VehicleState (no locking — caller holds the lock)
    /// and keep the reverse indexes in step.
    pub(super) fn apply_to_vehicle(&self, vs: &mut VehicleState, event: &Event) {
        match event {
            Event::VehicleAvailabilitySet { is_available, .. } => {
                vs.vehicle.is_available = *is_available;
            }
            Event::VehicleDelisted { id } => {
                if let Some(owner) = vs.vehicle.owner
                    && let Some(mut owned) = self.vehicles_by_owner.get_mut(&owner)
                {
                    owned.retain(|v| v != id);
                }
                vs.vehicle.owner = None;
                vs.vehicle.is_available = false;
            }
            Event::BookingCreated { booking } => {
                self.booking_to_vehicle.insert(booking.id, booking.vehicle_id);
                self.bookings_by_renter
                    .entry(booking.renter)
                    .or_default()
                    .push(booking.id);
                self.bookings_by_owner
                    .entry(booking.owner)
                    .or_default()
                    .push(booking.id);
                vs.insert_booking(booking.clone());
            }
            Event::BookingStatusChanged { id, status, .. } => {
                if let Some(b) = vs.booking_mut(*id) {
                    b.status = *status;
                }
            }
            // VehicleAdded is handled at the registry level, not here
            Event::VehicleAdded { .. } => {}
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn get_vehicle_state(&self, id: &Ulid) -> Option<SharedVehicleState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub(super) fn vehicle_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_vehicle.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call, under the caller's write guard.
    pub(super) async fn persist_and_apply(
        &self,
        vs: &mut VehicleState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_to_vehicle(vs, event);
        Ok(())
    }

    /// Lookup booking → vehicle, get vehicle, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<VehicleState>), EngineError> {
        let vehicle_id = self
            .vehicle_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let vs = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::NotFound(vehicle_id))?;
        let guard = vs.write_owned().await;
        Ok((vehicle_id, guard))
    }
}
