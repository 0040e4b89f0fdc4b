//! Page metadata for paginated reads.

use serde::Serialize;

/// Derived page metadata. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
    /// 1-based index of the first row on this page; `None` when there are no rows.
    pub from: Option<u64>,
    /// 1-based index of the last row on this page; `None` when there are no rows.
    pub to: Option<u64>,
}

impl PageInfo {
    /// Compute metadata for `page` (1-based) of `per_page` rows out of `total`.
    ///
    /// `page` and `per_page` are clamped to at least 1. Row positions saturate
    /// at `u64::MAX` instead of overflowing.
    pub fn new(total: u64, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = offset(page, per_page);
        let (from, to) = if total > 0 {
            (
                Some(offset.saturating_add(1)),
                Some(page.saturating_mul(per_page).min(total)),
            )
        } else {
            (None, None)
        };
        Self {
            total,
            per_page,
            current_page: page,
            last_page: total.div_ceil(per_page),
            from,
            to,
        }
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u64 {
        offset(self.current_page, self.per_page)
    }
}

pub(crate) fn offset(page: u64, per_page: u64) -> u64 {
    (page.max(1) - 1).saturating_mul(per_page.max(1))
}

/// One page of rows plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    #[serde(rename = "data")]
    pub rows: Vec<T>,
    #[serde(rename = "pagination")]
    pub info: PageInfo,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            rows: self.rows.into_iter().map(f).collect(),
            info: self.info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page() {
        let info = PageInfo::new(25, 2, 10);
        assert_eq!(info.total, 25);
        assert_eq!(info.last_page, 3);
        assert_eq!(info.from, Some(11));
        assert_eq!(info.to, Some(20));
        assert_eq!(info.offset(), 10);
    }

    #[test]
    fn last_partial_page() {
        let info = PageInfo::new(25, 3, 10);
        assert_eq!(info.from, Some(21));
        assert_eq!(info.to, Some(25));
    }

    #[test]
    fn empty_result() {
        let info = PageInfo::new(0, 1, 15);
        assert_eq!(info.last_page, 0);
        assert_eq!(info.from, None);
        assert_eq!(info.to, None);
    }

    #[test]
    fn page_past_the_end_keeps_formula() {
        let info = PageInfo::new(5, 3, 10);
        assert_eq!(info.from, Some(21));
        assert_eq!(info.to, Some(5));
    }

    #[test]
    fn huge_pages_saturate() {
        let info = PageInfo::new(25, 1 << 33, 1 << 31);
        let offset = ((1_u64 << 33) - 1) * (1 << 31);
        assert_eq!(info.offset(), offset);
        assert_eq!(info.from, Some(offset + 1));
        assert_eq!(info.to, Some(25));
        assert_eq!(info.last_page, 1);

        let info = PageInfo::new(25, u64::MAX, u64::MAX);
        assert_eq!(info.offset(), u64::MAX);
        assert_eq!(info.from, Some(u64::MAX));
        assert_eq!(info.to, Some(25));
    }

    #[test]
    fn serializes_camel_case() {
        let page = Page {
            rows: vec![1, 2],
            info: PageInfo::new(2, 1, 15),
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["pagination"]["perPage"], 15);
        assert_eq!(json["pagination"]["currentPage"], 1);
        assert_eq!(json["pagination"]["lastPage"], 1);
        assert_eq!(json["pagination"]["to"], 2);
    }
}
