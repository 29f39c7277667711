/// LSP server trait implementation.
///
/// This module contains the `impl LanguageServer for Backend` block,
/// which maps protocol messages (initialize, didOpen, didChange,
/// didClose, completion, documentSymbol, workspace/symbol) onto the
/// service façade.
use tower_lsp::LanguageServer;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;

use crate::Backend;
use crate::symbol::{PhpSymbol, SymbolKind as PhpSymbolKind};

fn lsp_symbol_kind(symbol: &PhpSymbol) -> SymbolKind {
    if symbol.kind.intersects(PhpSymbolKind::NAMESPACE) {
        SymbolKind::NAMESPACE
    } else if symbol.kind.intersects(PhpSymbolKind::CLASS) {
        SymbolKind::CLASS
    } else if symbol.kind.intersects(PhpSymbolKind::INTERFACE) {
        SymbolKind::INTERFACE
    } else if symbol.kind.intersects(PhpSymbolKind::TRAIT) {
        SymbolKind::MODULE
    } else if symbol.kind.intersects(PhpSymbolKind::METHOD) {
        SymbolKind::METHOD
    } else if symbol.kind.intersects(PhpSymbolKind::PROPERTY) {
        SymbolKind::PROPERTY
    } else if symbol.kind.intersects(PhpSymbolKind::CLASS_CONSTANT | PhpSymbolKind::CONSTANT) {
        SymbolKind::CONSTANT
    } else if symbol.kind.intersects(PhpSymbolKind::FUNCTION) {
        SymbolKind::FUNCTION
    } else {
        SymbolKind::VARIABLE
    }
}

impl Backend {
    /// Byte range → LSP range via the (open) document's line index.
    fn lsp_range(&self, uri: &str, range: (u32, u32)) -> Range {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        match registry.peek(uri) {
            Some(doc) => Range {
                start: doc.position_at(range.0),
                end: doc.position_at(range.1),
            },
            None => Range::default(),
        }
    }

    #[allow(deprecated)]
    fn symbol_information(&self, symbol: &PhpSymbol, container: Option<String>) -> Option<SymbolInformation> {
        let url = Url::parse(&symbol.uri).ok()?;
        Some(SymbolInformation {
            name: symbol.short_name().to_string(),
            kind: lsp_symbol_kind(symbol),
            tags: None,
            deprecated: None,
            location: Location {
                uri: url,
                range: self.lsp_range(&symbol.uri, symbol.name_range),
            },
            container_name: container,
        })
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, _: InitializeParams) -> Result<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![
                        "$".to_string(),
                        ">".to_string(),
                        ":".to_string(),
                    ]),
                    all_commit_characters: None,
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: None,
                    },
                    completion_item: None,
                }),
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: self.name.clone(),
                version: Some(self.version.clone()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.log(MessageType::INFO, "PHPilotLSP initialized!".to_string())
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        let uri = doc.uri.to_string();

        match self.open_document(&uri, &doc.language_id, doc.version, doc.text) {
            Ok(ingested) => {
                self.log(
                    MessageType::INFO,
                    format!("Opened file: {uri} ({ingested} symbols)"),
                )
                .await;
            }
            Err(error) => {
                log::error!("PHPilot: {error}");
                self.log(MessageType::WARNING, error.to_string()).await;
            }
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.to_string();
        self.edit_document(&uri, params.text_document.version, &params.content_changes);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri.to_string();
        self.close_document(&uri);
        self.log(MessageType::INFO, format!("Closed file: {uri}")).await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri.to_string();
        let position = params.text_document_position.position;

        let items = self.completions_at(&uri, position);
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri.to_string();
        let flat: Vec<SymbolInformation> = self
            .document_symbols(&uri)
            .into_iter()
            .filter_map(|(symbol, container)| self.symbol_information(&symbol, container))
            .collect();
        if flat.is_empty() {
            return Ok(None);
        }
        Ok(Some(DocumentSymbolResponse::Flat(flat)))
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<Vec<SymbolInformation>>> {
        let hits: Vec<SymbolInformation> = self
            .workspace_symbols(&params.query)
            .into_iter()
            .filter_map(|symbol| self.symbol_information(&symbol, None))
            .collect();
        if hits.is_empty() {
            return Ok(None);
        }
        Ok(Some(hits))
    }
}
