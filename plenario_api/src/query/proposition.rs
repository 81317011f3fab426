use url::Url;

use super::{common::QueryCommon, Query};

/// Query builder for the `/proposicoes` endpoint.
#[derive(Default)]
pub struct PropositionQuery {
    pub common: QueryCommon,
    pub kinds: Vec<String>,
    pub years: Vec<i32>,
}

impl Query for PropositionQuery {
    fn get_common(&mut self) -> &mut QueryCommon {
        &mut self.common
    }

    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = self.common.add_to_url(url);
        for kind in self.kinds.iter() {
            url.query_pairs_mut()
                .append_pair("siglaTipo", kind.as_str());
        }
        for year in self.years.iter() {
            url.query_pairs_mut().append_pair("ano", &year.to_string());
        }
        url.query_pairs_mut()
            .append_pair("ordem", &self.common.sort_direction.to_string());
        url.query_pairs_mut().append_pair("ordenarPor", "id");
        url
    }
}

impl PropositionQuery {
    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kinds.push(kind.to_string());
        self
    }

    pub fn with_kinds(mut self, kinds: &[&str]) -> Self {
        self.kinds.extend(kinds.iter().map(|k| k.to_string()));
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.years.push(year);
        self
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use crate::query::{PropositionQuery, Query};

    #[test]
    fn proposition_query_url() {
        let url = Url::parse("https://example.com/proposicoes").unwrap();
        let built = PropositionQuery::default()
            .with_kinds(&["PL", "PEC"])
            .with_year(2025)
            .add_to_url(&url)
            .to_string();
        assert_eq!(
            built,
            "https://example.com/proposicoes?pagina=1&siglaTipo=PL&siglaTipo=PEC&ano=2025&ordem=ASC&ordenarPor=id"
        );
    }
}
