use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::limits::RECENT_BOOKINGS;
use crate::model::*;

use super::conflict::now_ms;
use super::{Engine, EngineError};

/// `[first of month, first of next month)` for the month containing `now`.
fn month_window(now: Ms) -> Span {
    let date = DateTime::<Utc>::from_timestamp_millis(now)
        .expect("timestamp within chrono range")
        .date_naive();
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .expect("first of month is a valid date");
    let next = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
    .expect("first of next month is a valid date");
    Span::new(date_start_ms(first), date_start_ms(next))
}

impl Engine {
    /// Owner dashboard for the current wall-clock month.
    pub async fn owner_dashboard(&self, actor: Actor) -> Result<DashboardData, EngineError> {
        self.dashboard_at(actor, now_ms()).await
    }

    /// Read-side projection over an owner's bookings, recomputed per call.
    /// Monthly revenue counts confirmed bookings *created* within the
    /// calendar month containing `now`.
    pub async fn dashboard_at(&self, actor: Actor, now: Ms) -> Result<DashboardData, EngineError> {
        if actor.role != Role::Owner {
            return Err(EngineError::Unauthorized);
        }

        let total_vehicles = self
            .vehicles_by_owner
            .get(&actor.id)
            .map(|e| e.value().len())
            .unwrap_or(0);

        let ids = self
            .bookings_by_owner
            .get(&actor.id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let bookings = self.collect_bookings(&ids).await;

        let pending_count = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Pending)
            .count();
        let confirmed_count = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed)
            .count();

        let month = month_window(now);
        let monthly_revenue = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed && month.contains_instant(b.created_at))
            .fold(Decimal::ZERO, |acc, b| acc + b.price);

        Ok(DashboardData {
            total_vehicles,
            total_bookings: bookings.len(),
            pending_count,
            confirmed_count,
            recent_bookings: bookings.into_iter().take(RECENT_BOOKINGS).collect(),
            monthly_revenue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_window_midmonth() {
        // 2024-01-15T12:00:00Z
        let now = 1_705_320_000_000;
        let window = month_window(now);
        let jan1 = date_start_ms(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let feb1 = date_start_ms(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(window, Span::new(jan1, feb1));
        assert!(window.contains_instant(jan1));
        assert!(!window.contains_instant(feb1)); // half-open
    }

    #[test]
    fn month_window_december_rolls_year() {
        // 2023-12-31T23:00:00Z
        let now = 1_704_063_600_000;
        let window = month_window(now);
        let dec1 = date_start_ms(NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        let jan1 = date_start_ms(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(window, Span::new(dec1, jan1));
    }

    #[test]
    fn month_window_first_instant_of_month() {
        let jan1 = date_start_ms(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let window = month_window(jan1);
        assert_eq!(window.start, jan1);
    }
}
