use plenario_api::types::{Amendment, ApiPage, Expense, Legislator, Proposition, Vote};

fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
}

#[test]
fn legislators_page_deserializes() {
    let page: ApiPage<Legislator> =
        serde_json::from_str(&load_fixture("legislators.json")).unwrap();
    assert_eq!(page.dados.len(), 2);
    assert_eq!(page.dados[1].nome, "Marcel van Hattem");
    assert_eq!(page.dados[1].sigla_partido.as_deref(), Some("NOVO"));
    assert_eq!(page.dados[1].email, None);
    assert_eq!(
        page.next_link(),
        Some("https://dadosabertos.camara.leg.br/api/v2/deputados?pagina=2&itens=2")
    );
}

#[test]
fn expenses_page_deserializes() {
    let page: ApiPage<Expense> = serde_json::from_str(&load_fixture("expenses.json")).unwrap();
    assert_eq!(page.dados.len(), 2);
    assert_eq!(page.dados[0].mes, 7);
    assert_eq!(page.dados[0].num_documento.as_deref(), Some("158742"));
    assert_eq!(page.dados[1].valor_glosa, Some(100.0));
    assert!(page.next_link().is_none());
}

#[test]
fn amendments_array_deserializes() {
    let amendments: Vec<Amendment> =
        serde_json::from_str(&load_fixture("amendments.json")).unwrap();
    assert_eq!(amendments.len(), 2);
    assert_eq!(amendments[1].autor.as_deref(), Some("BANCADA RS"));
    assert_eq!(amendments[1].codigo_autor.as_deref(), Some("S/I"));
    assert_eq!(
        amendments[0].localidade_do_gasto.as_deref(),
        Some("PORTO ALEGRE - RS")
    );
}

#[test]
fn votes_page_deserializes() {
    let page: ApiPage<Vote> = serde_json::from_str(&load_fixture("votes.json")).unwrap();
    assert_eq!(page.dados[0].sigla_orgao.as_deref(), Some("PLEN"));
    assert_eq!(page.dados[0].aprovacao, Some(1));
}

#[test]
fn propositions_page_deserializes() {
    let page: ApiPage<Proposition> =
        serde_json::from_str(&load_fixture("propositions.json")).unwrap();
    assert_eq!(page.dados.len(), 2);
    assert_eq!(page.dados[0].sigla_tipo.as_deref(), Some("PL"));
    assert_eq!(page.dados[1].ano, Some(2025));
}

#[test]
fn page_without_links_defaults_to_empty() {
    let page: ApiPage<Vote> = serde_json::from_str(r#"{"dados": []}"#).unwrap();
    assert!(page.dados.is_empty());
    assert!(page.links.is_empty());
    assert!(page.next_link().is_none());
}
