//! Cursor-based pagination over a product's movement history.
//!
//! Ordering is `(created_at, sequence)` ascending. A cursor names the last
//! entry a caller has seen, so pages stay stable while new movements are
//! appended concurrently.

use chrono::{DateTime, TimeZone, Utc};

use stockroom_core::{DomainError, DomainResult};

use crate::StockMovement;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// Position just after one ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoryCursor {
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

impl HistoryCursor {
    pub fn after(movement: &StockMovement) -> Self {
        Self {
            created_at: movement.created_at,
            sequence: movement.sequence,
        }
    }

    /// Whether `movement` sorts strictly after this cursor.
    pub fn precedes(&self, movement: &StockMovement) -> bool {
        (movement.created_at, movement.sequence) > (self.created_at, self.sequence)
    }
}

/// Opaque text form: `<unix micros>.<sequence>`.
impl core::fmt::Display for HistoryCursor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.created_at.timestamp_micros(), self.sequence)
    }
}

impl core::str::FromStr for HistoryCursor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation("malformed history cursor");
        let (micros, sequence) = s.split_once('.').ok_or_else(invalid)?;
        let micros: i64 = micros.parse().map_err(|_| invalid())?;
        let sequence: u64 = sequence.parse().map_err(|_| invalid())?;
        let created_at = Utc
            .timestamp_micros(micros)
            .single()
            .ok_or_else(invalid)?;
        Ok(Self {
            created_at,
            sequence,
        })
    }
}

/// Half-open time window `[from, to)`; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl HistoryRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> DomainResult<Self> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(DomainError::validation("range start is after its end"));
            }
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|f| at >= f) && self.to.is_none_or(|t| at < t)
    }
}

/// One page request: where to resume and how many entries to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: Option<HistoryCursor>,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(cursor: Option<HistoryCursor>, limit: Option<usize>) -> DomainResult<Self> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(DomainError::validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { cursor, limit })
    }

    pub fn first(limit: usize) -> DomainResult<Self> {
        Self::new(None, Some(limit))
    }

    /// Whether `movement` belongs on this page (ignoring the limit).
    pub fn admits(&self, movement: &StockMovement) -> bool {
        self.cursor.is_none_or(|c| c.precedes(movement))
    }
}

/// A page of history plus the cursor for the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub items: Vec<StockMovement>,
    /// `None` once the history is exhausted.
    pub next_cursor: Option<HistoryCursor>,
}

impl HistoryPage {
    /// Build a page from up to `limit + 1` ordered rows; the extra row only
    /// signals that more remain.
    pub fn from_rows(mut rows: Vec<StockMovement>, limit: usize) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(HistoryCursor::after)
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MovementId, MovementKind, NewMovement};
    use chrono::Duration;
    use stockroom_catalog::ProductId;
    use stockroom_core::UserId;

    fn at(created_at: DateTime<Utc>, sequence: u64) -> StockMovement {
        StockMovement::record(
            MovementId::new(),
            NewMovement::new(ProductId::new(), MovementKind::StockIn, 1),
            UserId::new(),
            created_at,
            sequence,
        )
    }

    #[test]
    fn cursor_text_round_trips() {
        let c = HistoryCursor {
            created_at: Utc.timestamp_micros(1_700_000_000_123_456).single().unwrap(),
            sequence: 42,
        };
        assert_eq!(c.to_string().parse::<HistoryCursor>().unwrap(), c);
        assert!("nonsense".parse::<HistoryCursor>().is_err());
        assert!("12.x".parse::<HistoryCursor>().is_err());
    }

    #[test]
    fn sequence_breaks_timestamp_ties() {
        let t = Utc::now();
        let cursor = HistoryCursor::after(&at(t, 5));
        assert!(cursor.precedes(&at(t, 6)));
        assert!(!cursor.precedes(&at(t, 5)));
        assert!(!cursor.precedes(&at(t, 4)));
        assert!(cursor.precedes(&at(t + Duration::microseconds(1), 0)));
    }

    #[test]
    fn limits_are_bounded() {
        assert!(PageRequest::new(None, Some(0)).is_err());
        assert!(PageRequest::new(None, Some(MAX_PAGE_SIZE + 1)).is_err());
        assert_eq!(PageRequest::new(None, None).unwrap().limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn range_is_half_open_and_ordered() {
        let t = Utc::now();
        let r = HistoryRange::new(Some(t), Some(t + Duration::hours(1))).unwrap();
        assert!(r.contains(t));
        assert!(!r.contains(t + Duration::hours(1)));
        assert!(HistoryRange::new(Some(t), Some(t - Duration::seconds(1))).is_err());
        assert!(HistoryRange::all().contains(t));
    }

    #[test]
    fn page_reports_next_cursor_only_when_more_rows_exist() {
        let t = Utc::now();
        let rows: Vec<_> = (0..3).map(|i| at(t, i)).collect();

        let page = HistoryPage::from_rows(rows.clone(), 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor, Some(HistoryCursor::after(&rows[1])));

        let last = HistoryPage::from_rows(rows, 3);
        assert_eq!(last.items.len(), 3);
        assert_eq!(last.next_cursor, None);
    }
}
