//! Roll-call vote types returned by `/votacoes`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Vote identifiers are strings like "2265603-43".
pub type VoteID = String;

/// One roll-call vote event.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteID,

    uri: Option<String>,

    /// Vote date.
    pub data: Option<NaiveDate>,

    /// Registration timestamp, ISO format.
    pub data_hora_registro: Option<String>,

    /// Organ where the vote took place ("PLEN" for the floor).
    pub sigla_orgao: Option<String>,

    uri_orgao: Option<String>,

    pub descricao: Option<String>,

    /// Whether the matter was approved (1) or rejected (0).
    pub aprovacao: Option<i64>,
}
