//! Open-document registry with MRU ordering.
//!
//! A [`ParsedDocument`] owns its source text, the line index used for
//! position ↔ byte-offset mapping (binary search over line starts), the
//! syntax errors captured at the last parse, and a change event stream.
//! The parse tree itself is materialised on demand inside an arena scope
//! (`parser::with_parsed_program`), so a traversal is always atomic with
//! respect to the text it was started from.
//!
//! The registry keeps documents most-recently-used first: any lookup
//! that locates a document moves it to the front, and the diagnostics
//! coordinator works front-to-back so the document being edited is
//! always re-diagnosed first.

use std::sync::{Arc, Mutex};

use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent};

use crate::Backend;
use crate::error::ServiceError;
use crate::event::Event;
use crate::parser::{SyntaxErrorInfo, parse_for_errors};
use crate::search::rank_of_offset;

/// Payload of a document change event.
#[derive(Debug, Clone)]
pub struct DocumentChange {
    pub uri: String,
    pub version: i32,
}

pub struct ParsedDocument {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
    pub syntax_errors: Vec<SyntaxErrorInfo>,
    /// Byte offset of each line start, always beginning with 0.
    line_starts: Vec<u32>,
    pub changed: Event<DocumentChange>,
}

impl ParsedDocument {
    pub fn new(uri: &str, language_id: &str, version: i32, text: String) -> Self {
        let mut doc = Self {
            uri: uri.to_string(),
            language_id: language_id.to_string(),
            version,
            text,
            syntax_errors: Vec::new(),
            line_starts: Vec::new(),
            changed: Event::new(),
        };
        doc.reindex();
        doc
    }

    fn reindex(&mut self) {
        self.line_starts.clear();
        self.line_starts.push(0);
        for (idx, byte) in self.text.bytes().enumerate() {
            if byte == b'\n' {
                self.line_starts.push(idx as u32 + 1);
            }
        }
        self.syntax_errors = parse_for_errors(&self.text);
    }

    /// Apply content changes in order (full replaces and range
    /// replaces), reparse, and fire the change event.
    pub fn apply_changes(&mut self, version: i32, changes: &[TextDocumentContentChangeEvent]) {
        for change in changes {
            match change.range {
                Some(range) => {
                    let start = self.offset_at(range.start) as usize;
                    let end = self.offset_at(range.end) as usize;
                    let start = start.min(self.text.len());
                    let end = end.clamp(start, self.text.len());
                    self.text.replace_range(start..end, &change.text);
                    // Offsets shift after every splice; keep the line
                    // index usable for the next change in the batch.
                    self.reindex_lines_only();
                }
                None => {
                    self.text = change.text.clone();
                    self.reindex_lines_only();
                }
            }
        }
        self.version = version;
        self.reindex();
        self.changed.trigger(&DocumentChange { uri: self.uri.clone(), version });
    }

    fn reindex_lines_only(&mut self) {
        self.line_starts.clear();
        self.line_starts.push(0);
        for (idx, byte) in self.text.bytes().enumerate() {
            if byte == b'\n' {
                self.line_starts.push(idx as u32 + 1);
            }
        }
    }

    /// Byte offset of an LSP position, clamped to the document.
    pub fn offset_at(&self, position: Position) -> u32 {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return self.text.len() as u32;
        }
        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|next| next.saturating_sub(1))
            .unwrap_or(self.text.len() as u32);
        (line_start + position.character).min(line_end)
    }

    /// LSP position of a byte offset, via binary search over line starts.
    pub fn position_at(&self, offset: u32) -> Position {
        let offset = offset.min(self.text.len() as u32);
        let line = rank_of_offset(&self.line_starts, offset);
        Position {
            line: line as u32,
            character: offset - self.line_starts[line],
        }
    }
}

#[derive(Default)]
pub struct DocumentRegistry {
    /// Most recently used first.
    docs: Vec<ParsedDocument>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, doc: ParsedDocument) -> Result<(), ServiceError> {
        if self.docs.iter().any(|d| d.uri == doc.uri) {
            return Err(ServiceError::DuplicateDocument { uri: doc.uri });
        }
        self.docs.insert(0, doc);
        Ok(())
    }

    pub fn close(&mut self, uri: &str) -> Option<ParsedDocument> {
        let idx = self.docs.iter().position(|d| d.uri == uri)?;
        Some(self.docs.remove(idx))
    }

    /// Locate a document and promote it to the front.
    pub fn find(&mut self, uri: &str) -> Option<&mut ParsedDocument> {
        let idx = self.docs.iter().position(|d| d.uri == uri)?;
        let doc = self.docs.remove(idx);
        self.docs.insert(0, doc);
        self.docs.first_mut()
    }

    /// Non-promoting read access.
    pub fn peek(&self, uri: &str) -> Option<&ParsedDocument> {
        self.docs.iter().find(|d| d.uri == uri)
    }

    /// URIs in MRU order.
    pub fn uris(&self) -> Vec<String> {
        self.docs.iter().map(|d| d.uri.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

pub type SharedRegistry = Arc<Mutex<DocumentRegistry>>;

impl Backend {
    /// Add a document to the registry, parse it, index its symbols, and
    /// schedule diagnostics.  Returns the number of symbols ingested.
    pub fn open_document(
        &self,
        uri: &str,
        language_id: &str,
        version: i32,
        text: String,
    ) -> Result<usize, ServiceError> {
        let doc = ParsedDocument::new(uri, language_id, version, text.clone());
        let diagnostics = self.diagnostics.clone();
        doc.changed.subscribe(move |change: &DocumentChange| {
            diagnostics.schedule(change.clone());
        });

        {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.open(doc)?;
        }

        let ingested = self.index_document(uri, &text);
        self.diagnostics
            .schedule(DocumentChange { uri: uri.to_string(), version });
        Ok(ingested)
    }

    /// Apply edits to an open document, re-index its symbols, and fire
    /// its change event.  Unknown URIs are ignored.
    pub fn edit_document(
        &self,
        uri: &str,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) {
        let text = {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            let Some(doc) = registry.find(uri) else {
                return;
            };
            doc.apply_changes(version, changes);
            doc.text.clone()
        };
        self.index_document(uri, &text);
    }

    /// Remove a document from the registry and the symbol store, and
    /// retract its published diagnostics.
    pub fn close_document(&self, uri: &str) {
        {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.close(uri);
        }
        self.symbols.lock().unwrap_or_else(|e| e.into_inner()).remove_uri(uri);
        self.diagnostics.forget(uri);
    }

    pub fn number_documents_open(&self) -> usize {
        self.registry.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// URIs currently known, most recently used first.
    pub fn number_documents_known(&self) -> usize {
        // Known = open: the registry is the only document source; symbols
        // for forgotten documents are evicted eagerly.
        self.number_documents_open()
    }
}
