use url::Url;

use super::{common::QueryCommon, Query};

/// Query builder for the Portal da Transparência `/emendas` endpoint.
///
/// The Transparência API paginates with `pagina` only and has no `next`
/// link; a short page signals the end of the result set.
#[derive(Default)]
pub struct AmendmentQuery {
    pub common: QueryCommon,
    pub year: Option<i32>,
    pub author_name: Option<String>,
    pub amendment_code: Option<String>,
}

impl Query for AmendmentQuery {
    fn get_common(&mut self) -> &mut QueryCommon {
        &mut self.common
    }

    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("pagina", &self.common.page.to_string());
        if let Some(year) = self.year {
            url.query_pairs_mut().append_pair("ano", &year.to_string());
        }
        if let Some(author_name) = &self.author_name {
            url.query_pairs_mut()
                .append_pair("nomeAutor", author_name.as_str());
        }
        if let Some(code) = &self.amendment_code {
            url.query_pairs_mut()
                .append_pair("codigoEmenda", code.as_str());
        }
        url
    }
}

impl AmendmentQuery {
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_author_name(mut self, author_name: &str) -> Self {
        self.author_name = Some(author_name.to_string());
        self
    }

    pub fn with_amendment_code(mut self, code: &str) -> Self {
        self.amendment_code = Some(code.to_string());
        self
    }
}
