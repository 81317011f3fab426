use std::str::FromStr;

use url::Url;

use super::{
    common::{QueryCommon, SortDirection},
    Query,
};

/// Query builder for the `/deputados` endpoint.
#[derive(Default)]
pub struct LegislatorQuery {
    pub common: QueryCommon,
    pub name: Option<String>,
    pub states: Vec<String>,
    pub parties: Vec<String>,
    pub legislatures: Vec<i64>,
    pub sort_by: LegislatorSortBy,
}

impl Query for LegislatorQuery {
    fn get_common(&mut self) -> &mut QueryCommon {
        &mut self.common
    }

    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = self.common.add_to_url(url);
        if let Some(name) = &self.name {
            url.query_pairs_mut().append_pair("nome", name.as_str());
        }
        for state in self.states.iter() {
            url.query_pairs_mut().append_pair("siglaUf", state.as_str());
        }
        for party in self.parties.iter() {
            url.query_pairs_mut()
                .append_pair("siglaPartido", party.as_str());
        }
        for legislature in self.legislatures.iter() {
            url.query_pairs_mut()
                .append_pair("idLegislatura", &legislature.to_string());
        }
        url.query_pairs_mut()
            .append_pair("ordem", &self.common.sort_direction.to_string());
        url.query_pairs_mut()
            .append_pair("ordenarPor", &self.sort_by.to_string());
        url
    }
}

impl LegislatorQuery {
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.states.push(state.to_string());
        self
    }

    pub fn with_party(mut self, party: &str) -> Self {
        self.parties.push(party.to_string());
        self
    }

    pub fn with_legislature(mut self, legislature: i64) -> Self {
        self.legislatures.push(legislature);
        self
    }

    pub fn with_sort_by(mut self, sort_by: LegislatorSortBy) -> Self {
        self.sort_by = sort_by;
        self
    }
}

/// Sort field for legislator listings.
#[derive(Clone, Copy, Default)]
pub enum LegislatorSortBy {
    #[default]
    Name,
    State,
    Party,
    Legislature,
}

impl std::fmt::Display for LegislatorSortBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LegislatorSortBy::Name => "nome",
                LegislatorSortBy::State => "siglaUf",
                LegislatorSortBy::Party => "siglaPartido",
                LegislatorSortBy::Legislature => "idLegislatura",
            }
        )?;
        Ok(())
    }
}

impl FromStr for LegislatorSortBy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nome" => Ok(LegislatorSortBy::Name),
            "siglaUf" => Ok(LegislatorSortBy::State),
            "siglaPartido" => Ok(LegislatorSortBy::Party),
            "idLegislatura" => Ok(LegislatorSortBy::Legislature),
            _ => Err(()),
        }
    }
}
