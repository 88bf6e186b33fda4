use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Normalized pagination parameters as accepted from an API surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageParams {
    pub page: u64,
    pub size: u64,
    pub direction: SortDirection,
    pub sort_by: Option<String>,
}

impl PageParams {
    /// Clamp raw query inputs: page defaults to 1, size defaults to 10 and
    /// is capped at 100. Non-positive values fall back to the defaults.
    pub fn normalized(
        page: Option<i64>,
        size: Option<i64>,
        direction: SortDirection,
        sort_by: Option<String>,
    ) -> Self {
        let page = match page {
            Some(p) if p > 0 => p as u64,
            _ => 1,
        };
        let size = match size {
            Some(s) if s > 0 => (s as u64).min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };
        Self {
            page,
            size,
            direction,
            sort_by,
        }
    }
}

/// One page of results plus the totals a paginated API reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total: u64,
}

/// Slice a result set into one page.
///
/// A missing page defaults to 1; a missing size, or one larger than the
/// result set, defaults to the total number of results.
pub fn paginate<T>(items: Vec<T>, page: Option<u64>, size: Option<u64>) -> Page<T> {
    let total = items.len() as u64;
    let size = match size {
        Some(s) if s <= total || total == 0 => s,
        _ => total,
    };
    let page = page.unwrap_or(1).max(1);

    let start = (page - 1).saturating_mul(size) as usize;
    let items = items
        .into_iter()
        .skip(start)
        .take(size as usize)
        .collect();

    Page {
        items,
        page,
        size,
        total,
    }
}

/// Sort a result set by a key before slicing it into pages.
pub fn sort_items<T, K: Ord>(items: &mut [T], direction: SortDirection, key: impl Fn(&T) -> K) {
    items.sort_by_key(key);
    if direction == SortDirection::Desc {
        items.reverse();
    }
}
