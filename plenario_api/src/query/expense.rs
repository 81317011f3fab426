use url::Url;

use super::{common::QueryCommon, Query};

/// Query builder for `/deputados/{id}/despesas`.
///
/// The legislator id is a path segment, not a query parameter; this builder
/// carries only the filters.
#[derive(Default)]
pub struct ExpenseQuery {
    pub common: QueryCommon,
    pub years: Vec<i32>,
    pub months: Vec<u32>,
}

impl Query for ExpenseQuery {
    fn get_common(&mut self) -> &mut QueryCommon {
        &mut self.common
    }

    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = self.common.add_to_url(url);
        for year in self.years.iter() {
            url.query_pairs_mut().append_pair("ano", &year.to_string());
        }
        for month in self.months.iter() {
            url.query_pairs_mut().append_pair("mes", &month.to_string());
        }
        url.query_pairs_mut()
            .append_pair("ordem", &self.common.sort_direction.to_string());
        url.query_pairs_mut().append_pair("ordenarPor", "ano");
        url
    }
}

impl ExpenseQuery {
    pub fn with_year(mut self, year: i32) -> Self {
        self.years.push(year);
        self
    }

    pub fn with_month(mut self, month: u32) -> Self {
        self.months.push(month);
        self
    }

    pub fn with_months(mut self, months: &[u32]) -> Self {
        self.months.extend_from_slice(months);
        self
    }
}
