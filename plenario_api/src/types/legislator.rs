//! Legislator (deputado) types returned by the Câmara API.

use serde::{Deserialize, Serialize};

/// Numeric identifier assigned by the Câmara API.
pub type LegislatorID = i64;

/// Summary representation of a legislator, as returned by `/deputados`.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Legislator {
    /// Unique legislator identifier in the Câmara API.
    pub id: LegislatorID,

    uri: Option<String>,

    /// Full parliamentary name.
    pub nome: String,

    /// Party abbreviation (e.g. "PT", "PL").
    pub sigla_partido: Option<String>,

    uri_partido: Option<String>,

    /// Two-letter state code (uppercase).
    pub sigla_uf: Option<String>,

    /// Legislature number the mandate belongs to.
    pub id_legislatura: Option<i64>,

    url_foto: Option<String>,

    pub email: Option<String>,
}

/// Detailed legislator record returned by `/deputados/{id}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegislatorDetail {
    pub id: LegislatorID,

    /// Civil (registry) name, distinct from the parliamentary name.
    pub nome_civil: Option<String>,

    pub cpf: Option<String>,

    sexo: Option<String>,

    data_nascimento: Option<String>,

    uf_nascimento: Option<String>,

    /// Current mandate status, embedding the parliamentary name and party.
    pub ultimo_status: Option<MandateStatus>,
}

/// Mandate snapshot embedded in a legislator detail record.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MandateStatus {
    pub nome: Option<String>,
    pub sigla_partido: Option<String>,
    pub sigla_uf: Option<String>,
    pub situacao: Option<String>,
    pub condicao_eleitoral: Option<String>,
}
