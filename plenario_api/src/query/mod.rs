mod amendment;
mod common;
mod expense;
mod legislator;
mod proposition;
mod vote;

pub use amendment::AmendmentQuery;
pub use common::{Query, QueryCommon, SortDirection};
pub use expense::ExpenseQuery;
pub use legislator::{LegislatorQuery, LegislatorSortBy};
pub use proposition::PropositionQuery;
pub use vote::VoteQuery;
