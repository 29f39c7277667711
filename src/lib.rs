//! PHPilot: a PHP language intelligence server.
//!
//! The crate derives, for any position in any open PHP document, the set
//! of symbols visible there and the inferred types of expressions.  The
//! moving parts:
//!
//! - [`traverse`]: a generic depth-first visitor engine with spine
//!   tracking, halt semantics, and multi-visitor composition.
//! - [`document`]: the open-document registry (MRU ordered) with change
//!   events; parse trees are materialised per analysis in an arena.
//! - [`name_resolver`] + [`symbol_store`]: PHP name resolution against
//!   `use` imports and namespaces, and the workspace-wide symbol index
//!   with inheritance-aware member lookup.
//! - [`variable_table`] + [`type_resolver`] + [`variable_visitor`]:
//!   flow-sensitive local variable typing and expression-level
//!   inference.
//! - [`diagnostics`]: debounced parse-error publication.
//!
//! [`Backend`] ties these together behind the LSP surface implemented in
//! `server`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tower_lsp::Client;
use tower_lsp::lsp_types::MessageType;

pub mod completion;
pub mod diagnostics;
pub mod docblock;
pub mod document;
pub mod error;
pub mod event;
pub mod name_resolver;
pub mod node;
pub mod parser;
pub mod search;
mod server;
pub mod symbol;
pub mod symbol_reader;
pub mod symbol_store;
pub mod traverse;
pub mod type_resolver;
pub mod type_string;
pub(crate) mod util;
pub mod variable_table;
pub mod variable_visitor;

use diagnostics::{DEFAULT_DEBOUNCE_WAIT_MS, DEFAULT_MAX_ITEMS, DiagnosticsProvider};
use document::DocumentRegistry;
use symbol_store::SymbolStore;

pub struct Backend {
    name: String,
    version: String,
    client: Option<Client>,
    pub(crate) registry: Arc<Mutex<DocumentRegistry>>,
    pub(crate) symbols: Arc<Mutex<SymbolStore>>,
    pub(crate) diagnostics: DiagnosticsProvider,
    pub(crate) max_completion_items: usize,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self::build(Some(client))
    }

    /// A backend with no attached client, for tests: log messages and
    /// published diagnostics are dropped, everything else behaves
    /// identically.
    pub fn new_test() -> Self {
        Self::build(None)
    }

    fn build(client: Option<Client>) -> Self {
        let registry = Arc::new(Mutex::new(DocumentRegistry::new()));
        let diagnostics = DiagnosticsProvider::new(
            registry.clone(),
            client.clone(),
            Duration::from_millis(DEFAULT_DEBOUNCE_WAIT_MS),
            DEFAULT_MAX_ITEMS,
        );
        Self {
            name: "PHPilotLSP".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            client,
            registry,
            symbols: Arc::new(Mutex::new(SymbolStore::new())),
            diagnostics,
            max_completion_items: DEFAULT_MAX_ITEMS,
        }
    }

    /// The diagnostics coordinator, exposed so callers can observe the
    /// start/end events or the cached lists.
    pub fn diagnostics(&self) -> &DiagnosticsProvider {
        &self.diagnostics
    }

    pub(crate) async fn log(&self, typ: MessageType, message: String) {
        if let Some(client) = &self.client {
            client.log_message(typ, message).await;
        }
    }

    /// Parse `text` and (re)index its symbols under `uri`.  Returns the
    /// number of symbols ingested.
    pub(crate) fn index_document(&self, uri: &str, text: &str) -> usize {
        let roots = parser::with_parsed_program(text, "symbol indexing", |program, content| {
            symbol_reader::read_symbols(program, content, uri)
        });
        let mut store = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        store.remove_uri(uri);
        roots.into_iter().map(|symbol| store.add(symbol)).sum()
    }
}
