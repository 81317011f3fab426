//! Budget amendment (emenda parlamentar) types from the Portal da
//! Transparência API.
//!
//! Monetary fields arrive as strings in Brazilian format ("1.234,56") and
//! are known to contain malformed cells; they are kept verbatim here and
//! parsed downstream.

use serde::{Deserialize, Serialize};

/// One budget amendment record as returned by `/api-de-dados/emendas`.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Amendment {
    /// Stable amendment code, the natural key across sources.
    pub codigo_emenda: Option<String>,

    pub ano: Option<i32>,

    /// Amendment category ("EMENDA INDIVIDUAL", "EMENDA DE BANCADA", ...).
    pub tipo_emenda: Option<String>,

    /// Free-text author name; may be an individual or a bloc ("BANCADA ...").
    pub autor: Option<String>,

    /// Numeric author code assigned by the budget system, when present.
    pub codigo_autor: Option<String>,

    pub numero_emenda: Option<String>,

    /// Where the money is spent (municipality/state or "Nacional").
    pub localidade_do_gasto: Option<String>,

    /// Budget function label (e.g. "Saúde").
    pub funcao: Option<String>,

    pub subfuncao: Option<String>,

    /// Committed value, Brazilian-formatted string.
    pub valor_empenhado: Option<String>,

    /// Settled value, Brazilian-formatted string.
    pub valor_liquidado: Option<String>,

    /// Paid value, Brazilian-formatted string.
    pub valor_pago: Option<String>,

    valor_resto_inscrito: Option<String>,

    valor_resto_cancelado: Option<String>,

    valor_resto_pago: Option<String>,
}
