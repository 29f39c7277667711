//! Debounced diagnostics publication.
//!
//! Each URI gets its own [`Debounce`]: a burst of edits produces exactly
//! one re-diagnosis per quiescence window (default 1000 ms).  A run
//! converts the document's cached syntax errors into LSP diagnostics,
//! caps them at `max_items`, caches the list per URI (so one document's
//! change never re-scans the others), fires the start/end events, and
//! publishes through the client when one is attached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tower_lsp::Client;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Range, Url};

use crate::document::{DocumentChange, SharedRegistry};
use crate::event::{Debounce, Event};

pub const DEFAULT_DEBOUNCE_WAIT_MS: u64 = 1000;
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// The diagnostic source name reported to editors.
pub const DIAGNOSTIC_SOURCE: &str = "intelephense";

struct DiagnosticsInner {
    registry: SharedRegistry,
    client: Option<Client>,
    wait: Mutex<Duration>,
    max_items: usize,
    debouncers: Mutex<HashMap<String, Debounce<DocumentChange>>>,
    cache: Mutex<HashMap<String, Vec<Diagnostic>>>,
    on_start: Event<String>,
    on_end: Event<(String, Vec<Diagnostic>)>,
}

#[derive(Clone)]
pub struct DiagnosticsProvider {
    inner: Arc<DiagnosticsInner>,
}

impl DiagnosticsProvider {
    pub fn new(
        registry: SharedRegistry,
        client: Option<Client>,
        wait: Duration,
        max_items: usize,
    ) -> Self {
        Self {
            inner: Arc::new(DiagnosticsInner {
                registry,
                client,
                wait: Mutex::new(wait),
                max_items,
                debouncers: Mutex::new(HashMap::new()),
                cache: Mutex::new(HashMap::new()),
                on_start: Event::new(),
                on_end: Event::new(),
            }),
        }
    }

    /// Fired when a debounced re-diagnosis begins, with the URI.
    pub fn on_start(&self) -> &Event<String> {
        &self.inner.on_start
    }

    /// Fired when a re-diagnosis completes, with the capped list.
    pub fn on_end(&self) -> &Event<(String, Vec<Diagnostic>)> {
        &self.inner.on_end
    }

    /// Change the quiescence window for subsequent re-diagnoses.
    pub fn set_wait(&self, wait: Duration) {
        *self.inner.wait.lock().unwrap_or_else(|e| e.into_inner()) = wait;
        for debounce in self.inner.debouncers.lock().unwrap_or_else(|e| e.into_inner()).values() {
            debounce.set_wait(wait);
        }
    }

    /// Route a change event into the per-URI debouncer, creating it on
    /// first contact.
    pub fn schedule(&self, change: DocumentChange) {
        let wait = *self.inner.wait.lock().unwrap_or_else(|e| e.into_inner());
        let mut debouncers = self.inner.debouncers.lock().unwrap_or_else(|e| e.into_inner());
        let debounce = debouncers.entry(change.uri.clone()).or_insert_with(|| {
            let provider = self.clone();
            Debounce::new(move |change: DocumentChange| provider.run(change), wait)
        });
        debounce.handle(change);
    }

    /// Re-diagnose one document now.  Runs on the debounce timer task.
    fn run(&self, change: DocumentChange) {
        let uri = change.uri;
        self.inner.on_start.trigger(&uri);

        let (diagnostics, version) = {
            let registry = self.inner.registry.lock().unwrap_or_else(|e| e.into_inner());
            match registry.peek(&uri) {
                Some(doc) => {
                    let mut items: Vec<Diagnostic> = doc
                        .syntax_errors
                        .iter()
                        .map(|error| Diagnostic {
                            range: Range {
                                start: doc.position_at(error.offset),
                                end: doc.position_at(error.offset + error.length),
                            },
                            severity: Some(DiagnosticSeverity::ERROR),
                            source: Some(DIAGNOSTIC_SOURCE.to_string()),
                            message: error.message.clone(),
                            ..Diagnostic::default()
                        })
                        .collect();
                    items.truncate(self.inner.max_items);
                    (items, Some(doc.version))
                }
                None => (Vec::new(), None),
            }
        };

        self.inner
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uri.clone(), diagnostics.clone());
        self.inner.on_end.trigger(&(uri.clone(), diagnostics.clone()));
        self.publish(&uri, diagnostics, version);
    }

    /// Drop a closed document's debouncer and cache entry, and retract
    /// anything already published for it.
    pub fn forget(&self, uri: &str) {
        if let Some(debounce) = self
            .inner
            .debouncers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(uri)
        {
            debounce.clear();
        }
        self.inner.cache.lock().unwrap_or_else(|e| e.into_inner()).remove(uri);
        self.publish(uri, Vec::new(), None);
    }

    /// Everything currently diagnosed, concatenated across open
    /// documents in MRU order and truncated to `max_items`.
    pub fn all_cached(&self) -> Vec<Diagnostic> {
        let uris = {
            let registry = self.inner.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.uris()
        };
        let cache = self.inner.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut all = Vec::new();
        for uri in uris {
            if let Some(items) = cache.get(&uri) {
                all.extend(items.iter().cloned());
                if all.len() >= self.inner.max_items {
                    all.truncate(self.inner.max_items);
                    break;
                }
            }
        }
        all
    }

    fn publish(&self, uri: &str, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        let Some(client) = self.inner.client.clone() else {
            return;
        };
        let Ok(url) = Url::parse(uri) else {
            log::error!("PHPilot: cannot publish diagnostics for unparsable URI {uri}");
            return;
        };
        tokio::spawn(async move {
            client.publish_diagnostics(url, diagnostics, version).await;
        });
    }
}
