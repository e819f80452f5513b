use crate::config::MarketsConfig;
use thiserror::Error;

/// Input rejected before any cache or upstream work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid market id")]
    InvalidMarketId,

    #[error("Invalid page")]
    InvalidPage,

    #[error("Invalid limit")]
    InvalidLimit,
}

/// Parses a market id from a path segment.
///
/// Accepts base-10 digits only (no sign, no exponent, no hex) in `0..=max_id`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidMarketId`] for anything else.
pub fn parse_market_id(raw: &str, max_id: u64) -> Result<u64, ValidationError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidMarketId);
    }

    match trimmed.parse::<u64>() {
        Ok(id) if id <= max_id => Ok(id),
        _ => Err(ValidationError::InvalidMarketId),
    }
}

/// Normalized pagination for the list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u64,
    pub limit: u64,
}

impl PageQuery {
    /// Half-open id range `[start, end)` this page covers in a collection of `total`.
    #[must_use]
    pub fn id_range(&self, total: u64) -> std::ops::Range<u64> {
        let start = (self.page - 1).saturating_mul(self.limit);
        let end = self.page.saturating_mul(self.limit).min(total);
        start.min(end)..end
    }

    /// Cache key for this page.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("markets:{}:{}", self.page, self.limit)
    }
}

fn parse_positive(raw: Option<&str>) -> Option<Result<u64, ()>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Some(Err(()));
    }
    Some(raw.parse::<u64>().map_err(|_| ()))
}

/// Parses `page` and `limit` query parameters.
///
/// Missing or empty values take the defaults (page 1, configured default limit).
///
/// # Errors
///
/// [`ValidationError::InvalidPage`] unless `page >= 1`; [`ValidationError::InvalidLimit`]
/// unless `1 <= limit <= max_page_limit`.
pub fn parse_page_query(
    page: Option<&str>,
    limit: Option<&str>,
    config: &MarketsConfig,
) -> Result<PageQuery, ValidationError> {
    let page = match parse_positive(page) {
        None => 1,
        Some(Ok(page)) if page >= 1 => page,
        Some(_) => return Err(ValidationError::InvalidPage),
    };

    let max_limit = u64::from(config.max_page_limit);
    let limit = match parse_positive(limit) {
        None => u64::from(config.default_page_limit),
        Some(Ok(limit)) if (1..=max_limit).contains(&limit) => limit,
        Some(_) => return Err(ValidationError::InvalidLimit),
    };

    Ok(PageQuery { page, limit })
}
