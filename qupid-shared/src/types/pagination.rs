use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult, ErrorCode};

pub const MAX_PAGE_LIMIT: i64 = 100;

/// `?limit=&offset=` query parameters shared by list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 { 20 }

impl PaginationParams {
    pub fn with_limit(limit: i64) -> Self {
        Self { limit, offset: 0 }
    }

    /// Rejects `limit` outside 1..=100 and negative offsets.
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=MAX_PAGE_LIMIT).contains(&self.limit) {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                format!("limit must be between 1 and {MAX_PAGE_LIMIT}"),
            ));
        }
        if self.offset < 0 {
            return Err(AppError::new(ErrorCode::ValidationError, "offset must be >= 0"));
        }
        Ok(())
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { limit: default_limit(), offset: 0 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, params: &PaginationParams) -> Self {
        Self {
            items,
            total,
            limit: params.limit,
            offset: params.offset,
        }
    }
}
