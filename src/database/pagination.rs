use serde::Serialize;

use crate::{
    constants::MAX_COUNT_PER_PAGE,
    error::{ApiError, FieldErrors},
};

pub type QueryPairs = Vec<(String, String)>;

fn invalid_page() -> ApiError {
    ApiError::NotFound(String::from("Invalid page."))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: i64,
    pub limit: i64,
}

impl PageQuery {
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(default_limit)
                .clamp(1, MAX_COUNT_PER_PAGE),
        }
    }

    /// Reads `page` and `limit` out of raw query pairs, ignoring everything else.
    pub fn from_pairs(pairs: &[(String, String)], default_limit: i64) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let mut read = |key: &str| -> Option<i64> {
            let value = pairs.iter().rev().find(|(k, _)| k == key)?;
            match value.1.parse::<i64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    errors.insert(
                        key.to_owned(),
                        vec![String::from("A valid integer is required.")],
                    );
                    None
                }
            }
        };

        let page = read("page");
        let limit = read("limit");

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        let query = Self::new(page, limit, default_limit);
        if query.checked_offset().is_none() {
            return Err(invalid_page());
        }

        Ok(query)
    }

    fn checked_offset(&self) -> Option<i64> {
        (self.page - 1).checked_mul(self.limit)
    }

    pub fn offset(&self) -> i64 {
        self.checked_offset().unwrap_or(i64::MAX)
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// `extra` carries query pairs (filters) that must survive into the links.
    pub fn from_rows(
        rows: Vec<T>,
        total_rows: i64,
        query: PageQuery,
        path: &str,
        extra: &[(String, String)],
    ) -> Result<Self, ApiError> {
        if rows.is_empty() && query.page > 1 {
            return Err(invalid_page());
        }

        let link = |page: i64| {
            let mut url = format!("{path}?page={page}&limit={}", query.limit);
            for (key, value) in extra {
                url.push_str(&format!("&{key}={value}"));
            }
            url
        };

        let next = if query.offset().saturating_add(query.limit) < total_rows {
            Some(link(query.page.saturating_add(1)))
        } else {
            None
        };
        let previous = if query.page > 1 {
            Some(link(query.page - 1))
        } else {
            None
        };

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        })
    }

    /// Same position in the result set, different items; used once rows become views.
    pub fn with_results<U>(self, results: Vec<U>) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results,
        }
    }
}
