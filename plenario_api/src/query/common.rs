//! Shared query infrastructure: the [`Query`] trait, [`QueryCommon`] fields,
//! and [`SortDirection`].

use std::str::FromStr;

use url::Url;

/// Trait implemented by all query builders. Provides URL serialization and
/// shared builder methods for pagination and date filtering.
pub trait Query {
    /// Appends this query's parameters to the given URL, returning the modified URL.
    fn add_to_url(&self, url: &Url) -> Url;

    /// Returns a mutable reference to the common query fields.
    fn get_common(&mut self) -> &mut QueryCommon;

    /// Sets the page number (1-indexed).
    fn with_page(mut self, page: i64) -> Self
    where
        Self: Sized,
    {
        self.get_common().page = page;
        self
    }

    /// Sets the number of items per page.
    fn with_page_size(mut self, page_size: i64) -> Self
    where
        Self: Sized,
    {
        self.get_common().page_size = Some(page_size);
        self
    }

    /// Restricts results to dates on or after `date` (`YYYY-MM-DD`).
    fn with_date_start(mut self, date: &str) -> Self
    where
        Self: Sized,
    {
        self.get_common().date_start = Some(date.to_string());
        self
    }

    /// Restricts results to dates on or before `date` (`YYYY-MM-DD`).
    fn with_date_end(mut self, date: &str) -> Self
    where
        Self: Sized,
    {
        self.get_common().date_end = Some(date.to_string());
        self
    }

    /// Sets the sort direction (ascending or descending).
    fn with_sort_direction(mut self, sort_direction: SortDirection) -> Self
    where
        Self: Sized,
    {
        self.get_common().sort_direction = sort_direction;
        self
    }
}

/// Sort order for API results.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (oldest/smallest first). This is the API default.
    #[default]
    Asc,
    /// Descending order (newest/largest first).
    Desc,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(()),
        }
    }
}

/// Fields shared by all query types: pagination, date range, sort direction.
#[derive(Clone)]
pub struct QueryCommon {
    /// Page number (1-indexed). Defaults to 1.
    pub page: i64,
    /// Items per page. `None` uses the API default.
    pub page_size: Option<i64>,
    /// Lower bound of the date filter, `YYYY-MM-DD`.
    pub date_start: Option<String>,
    /// Upper bound of the date filter, `YYYY-MM-DD`.
    pub date_end: Option<String>,
    /// Sort direction. Defaults to ascending.
    pub sort_direction: SortDirection,
}

impl Default for QueryCommon {
    fn default() -> QueryCommon {
        QueryCommon {
            page: 1,
            page_size: None,
            date_start: None,
            date_end: None,
            sort_direction: SortDirection::Asc,
        }
    }
}

impl QueryCommon {
    /// Appends the common pagination and date parameters to the URL.
    pub fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("pagina", &self.page.to_string());
        if let Some(page_size) = self.page_size {
            url.query_pairs_mut()
                .append_pair("itens", &page_size.to_string());
        };
        if let Some(date_start) = &self.date_start {
            url.query_pairs_mut()
                .append_pair("dataInicio", date_start.as_str());
        };
        if let Some(date_end) = &self.date_end {
            url.query_pairs_mut()
                .append_pair("dataFim", date_end.as_str());
        };
        url
    }
}
