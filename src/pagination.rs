use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every paged listing shows this many rows.
pub const PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("Invalid Page: `{page}`. Pages range from `1` to `{max_page}`")]
    OutOfRange { page: i64, max_page: i64 },
    #[error("Invalid Page: `{page}`. There are no pages of data to display.")]
    NoData { page: i64 },
}

/// One validated page of a listing. `number` is 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: i64,
    pub max_page: i64,
    pub total: i64,
}

impl Page {
    /// Validates `number` against a listing of `total` rows.
    pub fn checked(number: i64, total: i64) -> Result<Self, PaginationError> {
        let max_page = max_page(total);
        if max_page == 0 {
            return Err(PaginationError::NoData { page: number });
        }
        if number < 1 || number > max_page {
            return Err(PaginationError::OutOfRange {
                page: number,
                max_page,
            });
        }
        Ok(Page {
            number,
            max_page,
            total,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * PAGE_SIZE
    }

    pub fn limit(&self) -> i64 {
        PAGE_SIZE
    }

    /// 1-based position of the `index`-th row of this page within the whole listing.
    pub fn position(&self, index: usize) -> i64 {
        self.offset() + index as i64 + 1
    }
}

pub fn max_page(total: i64) -> i64 {
    (total + PAGE_SIZE - 1) / PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_page() {
        assert_eq!(max_page(0), 0);
        assert_eq!(max_page(1), 1);
        assert_eq!(max_page(10), 1);
        assert_eq!(max_page(11), 2);
        assert_eq!(max_page(30), 3);
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(
            Page::checked(0, 25),
            Err(PaginationError::OutOfRange {
                page: 0,
                max_page: 3
            })
        );
        assert_eq!(
            Page::checked(4, 25),
            Err(PaginationError::OutOfRange {
                page: 4,
                max_page: 3
            })
        );
        let last = Page::checked(3, 25).expect("last page is valid");
        assert_eq!(last.offset(), 20);
        assert_eq!(last.position(4), 25);
    }

    #[test]
    fn test_empty_listing() {
        let err = Page::checked(1, 0).expect_err("nothing to show");
        assert_eq!(err, PaginationError::NoData { page: 1 });
        assert_eq!(
            err.to_string(),
            "Invalid Page: `1`. There are no pages of data to display."
        );
    }

    #[test]
    fn test_out_of_range_message() {
        let err = Page::checked(5, 12).expect_err("only two pages");
        assert_eq!(
            err.to_string(),
            "Invalid Page: `5`. Pages range from `1` to `2`"
        );
    }
}
