mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::create_test_backend;
use tower_lsp::lsp_types::{DiagnosticSeverity, TextDocumentContentChangeEvent};

#[tokio::test(start_paused = true)]
async fn burst_of_edits_produces_one_debounced_publish() {
    let backend = create_test_backend();
    backend.diagnostics().set_wait(Duration::from_millis(50));

    let fired: Arc<Mutex<Vec<(tokio::time::Instant, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    backend.diagnostics().on_end().subscribe(move |(_, diagnostics)| {
        sink.lock()
            .unwrap()
            .push((tokio::time::Instant::now(), diagnostics.len()));
    });

    let uri = "file:///burst.php";
    // An unterminated statement keeps a parse error present throughout.
    backend
        .open_document(uri, "php", 1, "<?php $".to_string())
        .unwrap();

    let mut last_edit = tokio::time::Instant::now();
    for version in 2..7 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.edit_document(
            uri,
            version,
            &[TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: format!("<?php ${}", version),
            }],
        );
        last_edit = tokio::time::Instant::now();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;

    let fired = fired.lock().unwrap();
    assert_eq!(fired.len(), 1, "five rapid edits must collapse into one run");
    let elapsed = fired[0].0.duration_since(last_edit);
    assert!(
        elapsed >= Duration::from_millis(50) && elapsed <= Duration::from_millis(60),
        "fired {elapsed:?} after the last edit"
    );
}

#[tokio::test(start_paused = true)]
async fn diagnostics_carry_source_severity_and_cap() {
    let backend = create_test_backend();
    backend.diagnostics().set_wait(Duration::from_millis(10));

    let fired: Arc<Mutex<Vec<Vec<tower_lsp::lsp_types::Diagnostic>>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    backend.diagnostics().on_end().subscribe(move |(_, diagnostics)| {
        sink.lock().unwrap().push(diagnostics.clone());
    });

    let uri = "file:///bad.php";
    backend
        .open_document(uri, "php", 1, "<?php class {".to_string())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fired = fired.lock().unwrap();
    assert_eq!(fired.len(), 1);
    let diagnostics = &fired[0];
    assert!(!diagnostics.is_empty(), "malformed source must produce a diagnostic");
    assert!(diagnostics.len() <= 100);
    for diagnostic in diagnostics {
        assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diagnostic.source.as_deref(), Some("intelephense"));
        assert!(!diagnostic.message.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn clean_source_publishes_no_diagnostics() {
    let backend = create_test_backend();
    backend.diagnostics().set_wait(Duration::from_millis(10));

    let fired: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    backend.diagnostics().on_end().subscribe(move |(_, diagnostics)| {
        sink.lock().unwrap().push(diagnostics.len());
    });

    backend
        .open_document("file:///ok.php", "php", 1, "<?php class A {}".to_string())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*fired.lock().unwrap(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn start_event_fires_before_end_event() {
    let backend = create_test_backend();
    backend.diagnostics().set_wait(Duration::from_millis(10));

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let starts = order.clone();
    backend.diagnostics().on_start().subscribe(move |_| {
        starts.lock().unwrap().push("start");
    });
    let ends = order.clone();
    backend.diagnostics().on_end().subscribe(move |_| {
        ends.lock().unwrap().push("end");
    });

    backend
        .open_document("file:///seq.php", "php", 1, "<?php".to_string())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*order.lock().unwrap(), vec!["start", "end"]);
}
