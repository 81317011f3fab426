//! Bulk CSV/ZIP ingestion.
//!
//! Government CSV exports arrive in whatever encoding and delimiter the
//! publishing system happened to use, with header spellings that drift
//! between releases ("Valor Empenhado", "Valor_Empenhado", ...). Parsing
//! tries a fixed priority list of encodings crossed with delimiters and
//! takes the first structurally valid combination; headers are normalized
//! and folded through a static alias table to canonical field names.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use regex::Regex;

use crate::error::PipelineError;

/// Encoding labels tried in order. All resolve through `encoding_rs`;
/// decoding errors move to the next candidate.
const ENCODINGS: &[&str] = &["utf-8", "latin1", "windows-1252", "iso-8859-1"];

/// Delimiters tried in order for each encoding.
const DELIMITERS: &[u8] = &[b';', b',', b'\t'];

/// Alias table: canonical field name to the known source spellings, after
/// header normalization. Loaded once; matching is case-insensitive.
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("autor", &["Autor", "Nome_do_Autor", "Nome_do_Autor_da_Emenda"]),
    ("ano", &["Ano", "Ano_da_Emenda", "Ano_Emenda"]),
    (
        "numero_emenda",
        &["Número_Emenda", "Numero_Emenda", "Número_da_emenda"],
    ),
    ("codigo_emenda", &["Código_da_Emenda", "Codigo_da_Emenda"]),
    (
        "codigo_autor_emenda",
        &["Código_do_Autor_da_Emenda", "Codigo_do_Autor_da_Emenda"],
    ),
    ("tipo_emenda", &["Tipo_Emenda", "Tipo_de_Emenda"]),
    ("valor_empenhado", &["Valor_Empenhado"]),
    ("valor_liquidado", &["Valor_Liquidado"]),
    ("valor_pago", &["Valor_Pago"]),
    ("uf", &["UF"]),
    ("funcao", &["Função", "Funcao", "Nome_Função", "Nome_Funcao"]),
    (
        "subfuncao",
        &["Subfunção", "Subfuncao", "Nome_Subfunção", "Nome_Subfuncao"],
    ),
    (
        "localidade",
        &[
            "Localidade_do_Gasto",
            "Localidade_do_gasto",
            "Localidade_de_aplicação_do_recurso",
        ],
    ),
    ("municipio", &["Município", "Municipio"]),
    ("codigo_funcao", &["Código_Função", "Codigo_Funcao"]),
    ("codigo_subfuncao", &["Código_Subfunção", "Codigo_Subfuncao"]),
    ("programa", &["Nome_Programa"]),
    ("acao", &["Nome_Ação", "Nome_Acao"]),
];

/// Candidate names for the year column, checked after aliasing.
const YEAR_COLUMNS: &[&str] = &["ano"];

/// A parsed table: ordered column names plus one map per row. Unmapped
/// columns keep their normalized header verbatim so nothing is lost for
/// auditing; downstream logic only reads canonical names.
#[derive(Debug, Clone)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parser for bulk CSV/ZIP payloads.
#[derive(Debug, Clone, Default)]
pub struct TabularIngestor {
    /// Preferred CSV member name (substring match) when the payload is a
    /// ZIP with several members.
    pub expected_csv_name: Option<String>,
}

impl TabularIngestor {
    pub fn new(expected_csv_name: Option<String>) -> Self {
        Self { expected_csv_name }
    }

    /// Parses a CSV payload, unwrapping a ZIP container first if present.
    /// Fails only if every encoding/delimiter combination fails.
    pub fn parse(&self, bytes: &[u8]) -> Result<Table, PipelineError> {
        let csv_bytes = if is_zip(bytes) {
            self.extract_csv(bytes)?
        } else {
            bytes.to_vec()
        };

        for label in ENCODINGS {
            let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) else {
                continue;
            };
            let (content, _, had_errors) = encoding.decode(&csv_bytes);
            if had_errors {
                continue;
            }
            for &delimiter in DELIMITERS {
                if let Some(table) = try_parse(&content, delimiter) {
                    tracing::debug!(
                        "csv parsed: encoding={}, delimiter={:?}",
                        label,
                        delimiter as char
                    );
                    return Ok(table);
                }
            }
        }

        Err(PipelineError::MalformedSourceData(
            "no encoding/delimiter combination parsed the CSV".to_string(),
        ))
    }

    /// Parses the payload and keeps only rows for `target_year`.
    ///
    /// When no year column can be located the table is returned unfiltered
    /// with a warning; consumers must tolerate an unfiltered result.
    pub fn parse_year_filtered(
        &self,
        bytes: &[u8],
        target_year: i32,
    ) -> Result<Table, PipelineError> {
        let mut table = self.parse(bytes)?;

        let Some(year_col) = YEAR_COLUMNS
            .iter()
            .find(|c| table.columns.iter().any(|col| col == *c))
        else {
            tracing::warn!("no year column found; returning unfiltered table");
            return Ok(table);
        };

        let before = table.rows.len();
        table.rows.retain(|row| {
            row.get(*year_col)
                .and_then(|v| v.trim().parse::<i32>().ok())
                .map(|y| y == target_year)
                .unwrap_or(false)
        });
        tracing::debug!(
            "year filter {}: kept {} of {} rows",
            target_year,
            table.rows.len(),
            before
        );
        Ok(table)
    }

    /// Pulls the CSV member out of a ZIP archive, preferring the configured
    /// name and falling back to the first `.csv` member.
    fn extract_csv(&self, bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| PipelineError::MalformedSourceData(format!("bad zip: {}", e)))?;

        let names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
        tracing::debug!("zip members: {:?}", names);

        let preferred = self.expected_csv_name.as_deref().unwrap_or("");
        let chosen = names
            .iter()
            .find(|n| {
                n.to_lowercase().ends_with(".csv")
                    && !preferred.is_empty()
                    && n.to_lowercase().contains(&preferred.to_lowercase())
            })
            .or_else(|| names.iter().find(|n| n.to_lowercase().ends_with(".csv")))
            .ok_or_else(|| {
                PipelineError::MalformedSourceData("no CSV member in zip".to_string())
            })?
            .clone();

        let mut member = archive
            .by_name(&chosen)
            .map_err(|e| PipelineError::MalformedSourceData(format!("bad zip member: {}", e)))?;
        let mut out = Vec::new();
        member
            .read_to_end(&mut out)
            .map_err(|e| PipelineError::MalformedSourceData(format!("zip read failed: {}", e)))?;
        Ok(out)
    }
}

/// Attempts one encoding/delimiter combination. Returns `None` on any
/// structural problem: fewer than two columns, or ragged rows.
fn try_parse(content: &str, delimiter: u8) -> Option<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .ok()?
        .iter()
        .map(|h| canonical_column(&normalize_header(h)))
        .collect();
    if headers.len() < 2 {
        return None;
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.ok()?;
        let mut row = HashMap::with_capacity(headers.len());
        for (idx, field) in record.iter().enumerate() {
            if let Some(name) = headers.get(idx) {
                row.insert(name.clone(), field.trim().to_string());
            }
        }
        rows.push(row);
    }

    Some(Table {
        columns: headers,
        rows,
    })
}

/// Normalizes a raw header: trims, replaces inner whitespace runs with a
/// single underscore, and strips everything that is not a word character.
pub fn normalize_header(raw: &str) -> String {
    let collapsed = raw.trim().split_whitespace().collect::<Vec<_>>().join("_");
    collapsed
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Maps a normalized header to its canonical field name, or returns it
/// unchanged when no alias is known.
pub fn canonical_column(normalized: &str) -> String {
    let lowered = normalized.to_lowercase();
    for (canonical, variants) in COLUMN_ALIASES {
        if lowered == *canonical
            || variants.iter().any(|v| v.to_lowercase() == lowered)
        {
            return canonical.to_string();
        }
    }
    normalized.to_string()
}

/// Parses a Brazilian-formatted monetary cell ("R$ 1.234,56", "1.234,56",
/// "1234.56") into a decimal value. Unparsable cells yield `0.0`; source
/// data is known to contain malformed values and one bad cell must never
/// abort a batch.
pub fn parse_money(raw: &str) -> f64 {
    let mut s = raw.trim();
    if s.is_empty() {
        return 0.0;
    }
    if let Some(stripped) = s.strip_prefix("R$") {
        s = stripped.trim();
    }

    let cleaned = if s.contains(',') {
        // Brazilian format: dots are thousands separators.
        s.replace('.', "").replace(',', ".")
    } else {
        s.to_string()
    };

    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Extracts the first monetary value from free text ("no valor de R$
/// 150.000,00..."), used when a source only states values in prose.
pub fn extract_monetary_value(text: &str) -> Option<f64> {
    let re = Regex::new(r"R\$\s*([\d.,]+)").ok()?;
    let captured = re.captures(text)?.get(1)?.as_str();
    let value = parse_money(captured);
    if value > 0.0 {
        Some(value)
    } else {
        None
    }
}

fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ingestor() -> TabularIngestor {
        TabularIngestor::new(Some("EmendasParlamentares".to_string()))
    }

    #[test]
    fn header_normalization() {
        assert_eq!(normalize_header("  Valor Empenhado "), "Valor_Empenhado");
        assert_eq!(normalize_header("Valor_Empenhado"), "Valor_Empenhado");
        assert_eq!(
            normalize_header("Localidade do gasto (UF)"),
            "Localidade_do_gasto_UF"
        );
        assert_eq!(normalize_header("Função"), "Função");
    }

    #[test]
    fn alias_variants_collapse_to_canonical() {
        assert_eq!(canonical_column("Valor_Empenhado"), "valor_empenhado");
        assert_eq!(canonical_column("valor_empenhado"), "valor_empenhado");
        assert_eq!(canonical_column("Nome_do_Autor_da_Emenda"), "autor");
        assert_eq!(canonical_column("Função"), "funcao");
        assert_eq!(canonical_column("Ano_da_Emenda"), "ano");
        // Unmapped columns pass through verbatim.
        assert_eq!(canonical_column("Coluna_Exotica"), "Coluna_Exotica");
    }

    #[test]
    fn semicolon_and_comma_files_parse_identically() {
        let semicolon = "Código da Emenda;Nome do Autor da Emenda;Valor Empenhado;Ano\n\
                         A1;FULANO;1.000,50;2025\n";
        let comma = "Código da Emenda,Nome do Autor da Emenda,Valor_Empenhado,Ano\n\
                     A1,FULANO,\"1.000,50\",2025\n";

        let t1 = ingestor().parse(semicolon.as_bytes()).unwrap();
        let t2 = ingestor().parse(comma.as_bytes()).unwrap();

        for t in [&t1, &t2] {
            assert_eq!(t.len(), 1);
            let row = &t.rows[0];
            assert_eq!(row.get("codigo_emenda").unwrap(), "A1");
            assert_eq!(row.get("autor").unwrap(), "FULANO");
            assert_eq!(parse_money(row.get("valor_empenhado").unwrap()), 1000.50);
        }
    }

    #[test]
    fn latin1_bytes_decode() {
        // "Função;Município" in latin-1, undecodable as UTF-8.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"Fun\xe7\xe3o;Munic\xedpio\n");
        bytes.extend_from_slice(b"Sa\xfade;S\xe3o Borja\n");

        let table = ingestor().parse(&bytes).unwrap();
        assert_eq!(table.columns, vec!["funcao", "municipio"]);
        assert_eq!(table.rows[0].get("funcao").unwrap(), "Saúde");
        assert_eq!(table.rows[0].get("municipio").unwrap(), "São Borja");
    }

    #[test]
    fn tab_delimited_parses() {
        let tsv = "Ano\tAutor\n2025\tBELTRANO\n";
        let table = ingestor().parse(tsv.as_bytes()).unwrap();
        assert_eq!(table.rows[0].get("autor").unwrap(), "BELTRANO");
    }

    #[test]
    fn unparsable_input_is_fatal() {
        // A single column defeats every delimiter candidate.
        let garbage = "just-one-header\nvalue\n";
        assert!(matches!(
            ingestor().parse(garbage.as_bytes()),
            Err(PipelineError::MalformedSourceData(_))
        ));
    }

    #[test]
    fn year_filter_keeps_target_year() {
        let csv = "Código da Emenda;Autor;Valor Pago;Ano\n\
                   E1;FULANO;\"1.234,56\";2025\n\
                   E2;SICRANO;\"500,00\";2024\n\
                   E3;BANCADA RS;\"900,00\";2025\n";

        let table = ingestor().parse_year_filtered(csv.as_bytes(), 2025).unwrap();
        assert_eq!(table.len(), 2);
        let codes: Vec<&str> = table
            .rows
            .iter()
            .map(|r| r.get("codigo_emenda").unwrap().as_str())
            .collect();
        assert_eq!(codes, vec!["E1", "E3"]);
    }

    #[test]
    fn missing_year_column_returns_unfiltered() {
        let csv = "Autor;Valor Pago\nFULANO;\"10,00\"\nSICRANO;\"20,00\"\n";
        let table = ingestor().parse_year_filtered(csv.as_bytes(), 2025).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn unmapped_columns_preserved_verbatim() {
        let csv = "Ano;Autor;Campo_Novo_Do_Portal\n2025;FULANO;xyz\n";
        let table = ingestor().parse(csv.as_bytes()).unwrap();
        assert!(table.columns.contains(&"Campo_Novo_Do_Portal".to_string()));
        assert_eq!(table.rows[0].get("Campo_Novo_Do_Portal").unwrap(), "xyz");
    }

    #[test]
    fn zip_payload_unwraps_preferred_member() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("leiame.txt", options).unwrap();
        writer.write_all(b"readme").unwrap();
        writer
            .start_file("EmendasParlamentares.csv", options)
            .unwrap();
        writer
            .write_all("Ano;Autor\n2025;FULANO\n".as_bytes())
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let table = ingestor().parse(&bytes).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].get("autor").unwrap(), "FULANO");
    }

    #[test]
    fn zip_without_csv_is_malformed() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("leiame.txt", options).unwrap();
        writer.write_all(b"nothing here").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(matches!(
            ingestor().parse(&bytes),
            Err(PipelineError::MalformedSourceData(_))
        ));
    }

    #[test]
    fn money_parsing_grid() {
        assert_eq!(parse_money("1.234,56"), 1234.56);
        assert_eq!(parse_money("R$ 1.234,56"), 1234.56);
        assert_eq!(parse_money("R$1.234.567,89"), 1234567.89);
        assert_eq!(parse_money("500,00"), 500.0);
        assert_eq!(parse_money("1234.56"), 1234.56);
        assert_eq!(parse_money("1234"), 1234.0);
        assert_eq!(parse_money(""), 0.0);
        assert_eq!(parse_money("S/I"), 0.0);
        assert_eq!(parse_money("n/a"), 0.0);
    }

    #[test]
    fn monetary_extraction_from_text() {
        assert_eq!(
            extract_monetary_value("repasse no valor de R$ 150.000,00 ao município"),
            Some(150_000.0)
        );
        assert_eq!(extract_monetary_value("sem valor informado"), None);
    }
}
