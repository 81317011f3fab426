//! Table and JSON rendering for command output.

use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use plenario_lib::plenario_api::types::Legislator;
use plenario_lib::CollectionResult;

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Found")]
    found: u64,
    #[tabled(rename = "Saved")]
    saved: u64,
    #[tabled(rename = "Matched")]
    matched: u64,
    #[tabled(rename = "Unmatched")]
    unmatched: u64,
    #[tabled(rename = "Errors")]
    errors: u64,
    #[tabled(rename = "Total value")]
    total_value: String,
    #[tabled(rename = "Duration")]
    duration: String,
}

#[derive(Tabled)]
struct LegislatorRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Party")]
    party: String,
    #[tabled(rename = "State")]
    state: String,
}

fn build_result_rows(results: &[CollectionResult]) -> Vec<ResultRow> {
    results
        .iter()
        .map(|r| ResultRow {
            target: r.target.clone(),
            source: r.source_used.clone().unwrap_or_else(|| "-".to_string()),
            found: r.found,
            saved: r.saved,
            matched: r.with_match,
            unmatched: r.without_match,
            errors: r.errors,
            total_value: format_money(r.total_value),
            duration: r
                .finished_at
                .map(|end| format!("{:.1}s", (end - r.started_at).num_milliseconds() as f64 / 1000.0))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}

pub fn print_results_table(results: &[CollectionResult]) {
    let mut table = Table::new(build_result_rows(results));
    table.with(Style::sharp());
    println!("{}", table);
}

pub fn print_legislators_table(legislators: &[Legislator]) {
    let rows: Vec<LegislatorRow> = legislators
        .iter()
        .map(|l| LegislatorRow {
            id: l.id,
            name: l.nome.clone(),
            party: l.sigla_partido.clone().unwrap_or_default(),
            state: l.sigla_uf.clone().unwrap_or_default(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to serialize output: {}", e),
    }
}

/// Formats a value as Brazilian currency, dot thousands and comma decimals.
pub fn format_money(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    format!(
        "{}R$ {},{:02}",
        if negative { "-" } else { "" },
        grouped,
        frac
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(0.0), "R$ 0,00");
        assert_eq!(format_money(1234.5), "R$ 1.234,50");
        assert_eq!(format_money(1_234_567.89), "R$ 1.234.567,89");
        assert_eq!(format_money(-42.01), "-R$ 42,01");
    }

    #[test]
    fn result_rows_render() {
        let mut result = CollectionResult::start("amendments", 2025);
        result.found = 10;
        result.saved = 8;
        result.with_match = 6;
        result.without_match = 2;
        result.total_value = 1500.0;
        result.source_used = Some("transparencia-csv-download".to_string());
        let result = result.finalize();

        let rows = build_result_rows(&[result]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, "transparencia-csv-download");
        assert_eq!(rows[0].total_value, "R$ 1.500,00");
        assert!(rows[0].duration.ends_with('s'));
    }
}
