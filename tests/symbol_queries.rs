mod common;

use common::{create_test_backend, open_doc};
use tower_lsp::LanguageServer;
use tower_lsp::lsp_types::*;

#[tokio::test]
async fn workspace_symbols_rank_shorter_names_first() {
    let backend = create_test_backend();
    let uri = Url::parse("file:///rank.php").unwrap();
    open_doc(&backend, &uri, "<?php class Foo {} class FooBar {} class Baz {}").await;

    let hits = backend.workspace_symbols("Fo");
    let names: Vec<&str> = hits.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["\\Foo", "\\FooBar"]);
}

#[tokio::test]
async fn workspace_symbol_request_returns_locations() {
    let backend = create_test_backend();
    let uri = Url::parse("file:///loc.php").unwrap();
    open_doc(&backend, &uri, "<?php\nclass Widget {}\n").await;

    let params = WorkspaceSymbolParams {
        query: "Wid".to_string(),
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
    };
    let hits = backend.symbol(params).await.unwrap().expect("one hit");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "Widget");
    assert_eq!(hits[0].kind, SymbolKind::CLASS);
    assert_eq!(hits[0].location.uri, uri);
    assert_eq!(hits[0].location.range.start.line, 1);
}

#[tokio::test]
async fn document_symbols_flatten_members_with_containers() {
    let backend = create_test_backend();
    let uri = Url::parse("file:///doc.php").unwrap();
    let text = concat!(
        "<?php\n",
        "namespace App;\n",
        "class User {\n",
        "    public const ROLE = 'admin';\n",
        "    public string $name;\n",
        "    public function rename(string $to): void {}\n",
        "}\n",
        "function helper(): int {}\n",
    );
    open_doc(&backend, &uri, text).await;

    let params = DocumentSymbolParams {
        text_document: TextDocumentIdentifier { uri: uri.clone() },
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
    };
    let response = backend.document_symbol(params).await.unwrap().expect("symbols");
    let DocumentSymbolResponse::Flat(flat) = response else {
        panic!("expected flat response");
    };

    let find = |name: &str| flat.iter().find(|s| s.name == name).unwrap_or_else(|| panic!("{name} missing"));
    assert_eq!(find("User").kind, SymbolKind::CLASS);
    assert_eq!(find("rename").kind, SymbolKind::METHOD);
    assert_eq!(find("rename").container_name.as_deref(), Some("\\App\\User"));
    assert_eq!(find("name").kind, SymbolKind::PROPERTY);
    assert_eq!(find("ROLE").kind, SymbolKind::CONSTANT);
    assert_eq!(find("helper").kind, SymbolKind::FUNCTION);
    // Parameters stay out of the outline.
    assert!(!flat.iter().any(|s| s.name == "$to"));
}

#[tokio::test]
async fn discover_and_forget_count_symbols() {
    let backend = create_test_backend();
    let uri = "file:///indexed.php";
    let text = "<?php class A { public function m(): int {} } function f() {}";

    let ingested = backend.discover(uri, text);
    assert!(ingested >= 3, "class + method + function, got {ingested}");
    assert_eq!(backend.number_symbols_known(), ingested);

    let removed = backend.forget(uri);
    assert_eq!(removed, ingested);
    assert_eq!(backend.number_symbols_known(), 0);
    assert!(backend.workspace_symbols("A").is_empty());
}

#[tokio::test]
async fn closing_a_document_evicts_its_symbols() {
    let backend = create_test_backend();
    let uri = Url::parse("file:///gone.php").unwrap();
    open_doc(&backend, &uri, "<?php class Gone {}").await;
    assert_eq!(backend.workspace_symbols("Gone").len(), 1);

    backend
        .did_close(DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        })
        .await;

    assert!(backend.workspace_symbols("Gone").is_empty());
    assert_eq!(backend.number_documents_open(), 0);
}

#[tokio::test]
async fn duplicate_open_is_surfaced() {
    let backend = create_test_backend();
    backend
        .open_document("file:///dup.php", "php", 1, "<?php".to_string())
        .unwrap();
    let err = backend
        .open_document("file:///dup.php", "php", 2, "<?php".to_string())
        .unwrap_err();
    assert!(err.to_string().contains("already open"));
}

#[tokio::test]
async fn edits_reindex_symbols() {
    let backend = create_test_backend();
    let uri = "file:///evolve.php";
    backend
        .open_document(uri, "php", 1, "<?php class Before {}".to_string())
        .unwrap();
    assert_eq!(backend.workspace_symbols("Before").len(), 1);

    backend.edit_document(
        uri,
        2,
        &[TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "<?php class After {}".to_string(),
        }],
    );

    assert!(backend.workspace_symbols("Before").is_empty());
    assert_eq!(backend.workspace_symbols("After").len(), 1);
}
