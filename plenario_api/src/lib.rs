mod client;
mod errors;
mod query;
pub mod types;
mod user_agent;
pub use self::client::{download_bytes, CamaraClient, TransparenciaClient};
pub use self::errors::Error;
pub use self::query::{
    AmendmentQuery, ExpenseQuery, LegislatorQuery, LegislatorSortBy, PropositionQuery, Query,
    QueryCommon, SortDirection, VoteQuery,
};
