use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

const DAY_MS: Ms = 86_400_000;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start >= span.end {
        return Err(EngineError::InvalidRange);
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("rental span too wide"));
    }
    Ok(())
}

/// First active booking whose span intersects `span`, if any.
/// Cancelled bookings never participate — a cancelled slot is free
/// forever. Half-open intervals: a return and a pickup at the same
/// instant do not conflict.
pub(crate) fn find_conflict(vs: &VehicleState, span: &Span) -> Option<Ulid> {
    vs.overlapping(span)
        .find(|b| b.status.is_active())
        .map(|b| b.id)
}

pub(crate) fn check_no_conflict(vs: &VehicleState, span: &Span) -> Result<(), EngineError> {
    match find_conflict(vs, span) {
        Some(id) => Err(EngineError::SlotConflict(id)),
        None => Ok(()),
    }
}

/// Billable days: duration rounded UP to whole days. A 25-hour rental
/// bills as 2 days.
pub(crate) fn rental_days(span: &Span) -> i64 {
    (span.duration_ms() as u64).div_ceil(DAY_MS as u64) as i64
}

pub(crate) fn rental_price(span: &Span, price_per_day: Decimal) -> Decimal {
    Decimal::from(rental_days(span)) * price_per_day
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    #[test]
    fn exactly_24h_bills_one_day() {
        assert_eq!(rental_days(&Span::new(0, 24 * H)), 1);
    }

    #[test]
    fn one_second_over_bills_two_days() {
        assert_eq!(rental_days(&Span::new(0, 24 * H + 1_000)), 2);
    }

    #[test]
    fn partial_day_rounds_up() {
        assert_eq!(rental_days(&Span::new(0, H)), 1);
        assert_eq!(rental_days(&Span::new(0, 25 * H)), 2);
        assert_eq!(rental_days(&Span::new(0, 48 * H)), 2);
    }

    #[test]
    fn price_is_days_times_rate() {
        let rate = Decimal::new(995, 1); // 99.5/day
        assert_eq!(rental_price(&Span::new(0, 48 * H), rate), Decimal::from(199));
        assert_eq!(
            rental_price(&Span::new(0, 49 * H), rate),
            Decimal::new(2985, 1) // 3 days
        );
    }

    #[test]
    fn validate_rejects_inverted_and_empty() {
        assert!(matches!(
            validate_span(&Span { start: 2_000_000_000_000, end: 1_700_000_000_000 }),
            Err(EngineError::InvalidRange)
        ));
        assert!(matches!(
            validate_span(&Span { start: 1_700_000_000_000, end: 1_700_000_000_000 }),
            Err(EngineError::InvalidRange)
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_timestamps() {
        assert!(matches!(
            validate_span(&Span { start: 0, end: 1_700_000_000_000 }),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn validate_rejects_oversized_span() {
        let start = 1_700_000_000_000;
        let end = start + crate::limits::MAX_SPAN_DURATION_MS + 1;
        assert!(matches!(
            validate_span(&Span { start, end }),
            Err(EngineError::LimitExceeded(_))
        ));
    }
}
