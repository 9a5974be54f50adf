//! List parameters and pagination utilities

use crate::core::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest page size a client may request
pub const MAX_LIMIT: usize = 1000;

/// Parameters of a list request
///
/// Deserializes from a URL query string or any serde source. Missing values
/// fall back to the resource configuration.
///
/// ```text
/// ?page=2&limit=10
/// ?filter={"status":"active"}&sort=-created,title
/// ?skip=5&fields=id,title,author{name}
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ListParams {
    /// Page number (starts at 1)
    pub page: Option<usize>,

    /// Number of items per page
    pub limit: Option<usize>,

    /// Items skipped before the page starts
    pub skip: Option<usize>,

    /// Filter as a JSON document
    pub filter: Option<String>,

    /// Comma separated sort keys, `-` prefix for descending
    pub sort: Option<String>,

    /// Field-selection expression
    pub fields: Option<String>,

    /// Ask for the total number of matching items
    pub total: bool,
}

impl ListParams {
    /// Page number, at least 1
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size, falling back to `default` and capped at [`MAX_LIMIT`]
    pub fn limit(&self, default: Option<usize>) -> Option<usize> {
        self.limit.or(default).map(|l| l.min(MAX_LIMIT))
    }

    pub fn skip(&self) -> usize {
        self.skip.unwrap_or(0)
    }

    /// Parsed filter document, `None` when no filter was given
    pub fn filter_value(&self) -> GraphResult<Option<Value>> {
        match self.filter.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => serde_json::from_str(raw).map(Some).map_err(|e| {
                GraphError::query_parse(None, format!("invalid filter JSON: {}", e))
            }),
        }
    }
}

/// Pagination metadata of a list response
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaginationMeta {
    /// Current page number (starts at 1)
    pub page: usize,

    /// Number of items per page, absent when unpaginated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Offset applied by storage
    pub offset: usize,

    /// Total number of items matching the filter, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,

    /// Whether there is a next page (`None` when unknown)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,

    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: usize, limit: Option<usize>, offset: usize, total: Option<usize>) -> Self {
        let total_pages = match (total, limit) {
            (Some(0), _) => Some(0),
            (Some(total), Some(limit)) => Some(total.div_ceil(limit.max(1))),
            (Some(_), None) => Some(1),
            (None, _) => None,
        };
        let has_next = match (total, limit) {
            (Some(total), Some(limit)) => Some(offset.saturating_add(limit) < total),
            (Some(_), None) => Some(false),
            (None, _) => None,
        };

        Self {
            page,
            limit,
            offset,
            total,
            total_pages,
            has_next,
            has_prev: offset > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_list_params_defaults() {
        let params = ListParams::default();
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(None), None);
        assert_eq!(params.limit(Some(20)), Some(20));
        assert_eq!(params.skip(), 0);
        assert!(params.filter_value().unwrap().is_none());
    }

    #[test]
    fn test_list_params_clamps() {
        let params = ListParams {
            page: Some(0),
            limit: Some(50_000),
            ..Default::default()
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(Some(20)), Some(MAX_LIMIT));
    }

    #[test]
    fn test_filter_value_reports_bad_json() {
        let params = ListParams {
            filter: Some("{bad".to_string()),
            ..Default::default()
        };
        assert_eq!(params.filter_value().unwrap_err().kind(), ErrorKind::QueryParse);
    }

    #[test]
    fn test_pagination_meta() {
        let meta = PaginationMeta::new(1, Some(20), 0, Some(145));
        assert_eq!(meta.total_pages, Some(8));
        assert!(!meta.has_prev);
        assert_eq!(meta.has_next, Some(true));

        let meta = PaginationMeta::new(8, Some(20), 140, Some(145));
        assert_eq!(meta.has_next, Some(false));
        assert!(meta.has_prev);
    }

    #[test]
    fn test_pagination_meta_without_total() {
        let meta = PaginationMeta::new(2, Some(10), 10, None);
        assert_eq!(meta.total_pages, None);
        assert_eq!(meta.has_next, None);
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("total").is_none());
    }

    #[test]
    fn test_pagination_meta_past_the_end() {
        let meta = PaginationMeta::new(usize::MAX, Some(10), usize::MAX, Some(3));
        assert_eq!(meta.has_next, Some(false));
        assert!(meta.has_prev);
    }
}
