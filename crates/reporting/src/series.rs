//! Daily movement time series.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

use stockroom_core::{DomainError, DomainResult};
use stockroom_ledger::{MovementKind, StockMovement};

pub const DEFAULT_MAX_SERIES_DAYS: u32 = 366;

/// Inclusive range of UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesWindow {
    from: NaiveDate,
    to: NaiveDate,
}

impl SeriesWindow {
    pub fn new(from: NaiveDate, to: NaiveDate, max_days: u32) -> DomainResult<Self> {
        if from > to {
            return Err(DomainError::validation("series start is after its end"));
        }
        let days = (to - from).num_days() + 1;
        if days > i64::from(max_days) {
            return Err(DomainError::validation(format!(
                "series window of {days} days exceeds the maximum of {max_days}"
            )));
        }
        Ok(Self { from, to })
    }

    /// The last `days` days ending with `today`.
    pub fn trailing(today: NaiveDate, days: u32) -> DomainResult<Self> {
        let from = today
            .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
            .ok_or_else(|| DomainError::validation("series window out of range"))?;
        Self::new(from, today, days.max(1))
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Half-open instant bounds `[from 00:00, to+1 00:00)` for store queries.
    pub fn bounds(&self) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let start = self.from.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = self
            .to
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc());
        (start, end)
    }

    fn days(&self) -> impl Iterator<Item = NaiveDate> {
        self.from.iter_days().take_while({
            let to = self.to;
            move |d| *d <= to
        })
    }
}

/// Totals for one day. `adjustment` is the signed net of adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    #[serde(rename = "in")]
    pub stock_in: i64,
    #[serde(rename = "out")]
    pub stock_out: i64,
    pub adjustment: i64,
}

impl SeriesPoint {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            stock_in: 0,
            stock_out: 0,
            adjustment: 0,
        }
    }
}

/// One point per day of the window, zero-filled; movements outside the
/// window are ignored.
pub fn movement_series(movements: &[StockMovement], window: SeriesWindow) -> Vec<SeriesPoint> {
    let mut points: BTreeMap<NaiveDate, SeriesPoint> =
        window.days().map(|d| (d, SeriesPoint::empty(d))).collect();

    for m in movements {
        let Some(point) = points.get_mut(&m.created_at.date_naive()) else {
            continue;
        };
        match m.kind {
            MovementKind::StockIn => point.stock_in = point.stock_in.saturating_add(m.quantity),
            MovementKind::StockOut => point.stock_out = point.stock_out.saturating_add(m.quantity),
            MovementKind::Adjustment => {
                point.adjustment = point.adjustment.saturating_add(m.quantity)
            }
        }
    }

    points.into_values().collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use stockroom_catalog::ProductId;
    use stockroom_core::UserId;
    use stockroom_ledger::{MovementId, NewMovement};

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn at(ts: DateTime<Utc>, kind: MovementKind, qty: i64) -> StockMovement {
        StockMovement::record(
            MovementId::new(),
            NewMovement::new(ProductId::new(), kind, qty),
            UserId::new(),
            ts,
            0,
        )
    }

    #[test]
    fn groups_by_utc_day_and_direction() {
        let noon = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).single().unwrap();
        let movements = vec![
            at(noon, MovementKind::StockIn, 50),
            at(noon + Duration::hours(1), MovementKind::StockOut, 20),
            at(noon + Duration::hours(2), MovementKind::Adjustment, -5),
            at(noon + Duration::hours(3), MovementKind::Adjustment, 2),
            // Next day, and one far outside the window.
            at(noon + Duration::hours(13), MovementKind::StockIn, 1),
            at(noon + Duration::days(40), MovementKind::StockIn, 1000),
        ];
        let window = SeriesWindow::new(day(1), day(3), 31).unwrap();
        let series = movement_series(&movements, window);

        assert_eq!(series.len(), 3);
        assert_eq!(series[0], SeriesPoint::empty(day(1)));
        assert_eq!(
            series[1],
            SeriesPoint { date: day(2), stock_in: 50, stock_out: 20, adjustment: -3 }
        );
        assert_eq!(series[2].stock_in, 1);
    }

    #[test]
    fn window_is_bounded() {
        assert!(SeriesWindow::new(day(3), day(1), 31).is_err());
        assert!(SeriesWindow::new(day(1), day(31), 30).is_err());
        assert!(SeriesWindow::new(day(1), day(30), 30).is_ok());
        assert!(SeriesWindow::new(day(5), day(5), 1).is_ok());
    }

    #[test]
    fn trailing_window_ends_today() {
        let w = SeriesWindow::trailing(day(30), 30).unwrap();
        assert_eq!((w.from(), w.to()), (day(1), day(30)));
        let (start, end) = w.bounds();
        assert_eq!(start.date_naive(), day(1));
        assert_eq!(end.unwrap().date_naive(), day(31));
    }

    #[test]
    fn series_serializes_in_out_keys() {
        let json = serde_json::to_value(SeriesPoint::empty(day(1))).unwrap();
        assert_eq!(json["in"], 0);
        assert_eq!(json["out"], 0);
        assert_eq!(json["date"], "2024-03-01");
    }
}
