//! Legislative proposition (bill) types.

use serde::{Deserialize, Serialize};

pub type PropositionID = i64;

/// One proposition as it appears in `/proposicoes` and in the yearly bulk
/// JSON dumps.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Proposition {
    pub id: PropositionID,

    uri: Option<String>,

    /// Proposition kind abbreviation ("PL", "PEC", "PLP", ...).
    pub sigla_tipo: Option<String>,

    cod_tipo: Option<i64>,

    pub numero: Option<i64>,

    pub ano: Option<i32>,

    /// One-paragraph summary of the proposition.
    pub ementa: Option<String>,
}
