mod amendment;
mod expense;
mod legislator;
mod meta;
mod proposition;
mod vote;

pub use amendment::Amendment;
pub use expense::Expense;
pub use legislator::{Legislator, LegislatorDetail, LegislatorID, MandateStatus};
pub use meta::{ApiPage, ApiResponse, Link};
pub use proposition::{Proposition, PropositionID};
pub use vote::{Vote, VoteID};
