use url::Url;

use super::{common::QueryCommon, Query};

/// Query builder for the `/votacoes` endpoint.
#[derive(Default)]
pub struct VoteQuery {
    pub common: QueryCommon,
    pub organs: Vec<String>,
}

impl Query for VoteQuery {
    fn get_common(&mut self) -> &mut QueryCommon {
        &mut self.common
    }

    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = self.common.add_to_url(url);
        for organ in self.organs.iter() {
            url.query_pairs_mut()
                .append_pair("siglaOrgao", organ.as_str());
        }
        url.query_pairs_mut()
            .append_pair("ordem", &self.common.sort_direction.to_string());
        url.query_pairs_mut().append_pair("ordenarPor", "dataHoraRegistro");
        url
    }
}

impl VoteQuery {
    pub fn with_organ(mut self, organ: &str) -> Self {
        self.organs.push(organ.to_string());
        self
    }
}
