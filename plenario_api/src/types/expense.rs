//! Parliamentary expense (CEAP) types returned by `/deputados/{id}/despesas`.

use serde::{Deserialize, Serialize};

/// One reimbursed expense document for a legislator.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Budget year of the document.
    pub ano: i32,

    /// Month (1-12) of the document.
    pub mes: u32,

    /// Expense category label (e.g. "COMBUSTÍVEIS E LUBRIFICANTES").
    pub tipo_despesa: Option<String>,

    cod_documento: Option<i64>,

    pub tipo_documento: Option<String>,

    cod_tipo_documento: Option<i64>,

    /// Document issue date, `YYYY-MM-DD` or full ISO timestamp.
    pub data_documento: Option<String>,

    /// Receipt/invoice number as printed on the document.
    pub num_documento: Option<String>,

    /// Face value of the document.
    pub valor_documento: Option<f64>,

    pub url_documento: Option<String>,

    pub nome_fornecedor: Option<String>,

    /// Supplier CNPJ or CPF, digits only.
    pub cnpj_cpf_fornecedor: Option<String>,

    /// Reimbursed (net) value after glosses.
    pub valor_liquido: Option<f64>,

    /// Disallowed portion of the document value.
    pub valor_glosa: Option<f64>,

    num_ressarcimento: Option<String>,

    cod_lote: Option<i64>,

    parcela: Option<i64>,
}
