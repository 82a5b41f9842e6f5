use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroom_auth::{Principal, Role};
use stockroom_catalog::{ProductId, SupplierId};
use stockroom_core::{DomainError, DomainResult, UserId};
use stockroom_ledger::{HistoryCursor, HistoryPage, HistoryRange, PageRequest, StockMovement};
use stockroom_purchasing::{OrderFilter, OrderStatus};

pub const DEFAULT_RECENT_LIMIT: usize = 20;

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
    #[serde(default)]
    pub include_disabled: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn into_parts(self) -> DomainResult<(HistoryRange, PageRequest)> {
        let range = HistoryRange::new(self.from, self.to)?;
        let cursor = self
            .cursor
            .as_deref()
            .map(str::parse::<HistoryCursor>)
            .transpose()?;
        Ok((range, PageRequest::new(cursor, self.limit)?))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub supplier_id: Option<String>,
}

impl ListOrdersQuery {
    pub fn into_filter(self) -> DomainResult<OrderFilter> {
        Ok(OrderFilter {
            status: self.status.as_deref().map(str::parse::<OrderStatus>).transpose()?,
            supplier_id: self
                .supplier_id
                .as_deref()
                .map(str::parse::<SupplierId>)
                .transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SeriesQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: Role,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub id: UserId,
    pub role: Option<Role>,
}

impl From<Principal> for WhoAmI {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            role: p.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuantityResponse {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct HistoryPageResponse {
    pub items: Vec<StockMovement>,
    /// Opaque; pass back as `cursor` for the next page.
    pub next_cursor: Option<String>,
}

impl From<HistoryPage> for HistoryPageResponse {
    fn from(page: HistoryPage) -> Self {
        Self {
            items: page.items,
            next_cursor: page.next_cursor.map(|c| c.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleAssigned {
    pub user_id: UserId,
    pub role: Role,
}

pub fn parse_id<T>(raw: &str) -> DomainResult<T>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.parse()
}
