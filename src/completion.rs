//! Completion items from the live analysis state.
//!
//! A completion request re-runs the composed name-resolver +
//! variable-type pass with a halt offset at the cursor, which yields the
//! variable table exactly as it stands there.  The text left of the
//! cursor decides the flavour:
//!
//! - `$subj->…` / `$subj?->…`  — instance members of the subject's type
//! - `Subj::…`                 — constants, static properties, methods
//! - `$par…`                   — variables bound in the current scope
//! - `Par…`                    — workspace symbols by prefix
//!
//! Results are capped at the configured maximum.

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, Position,
};

use crate::Backend;
use crate::docblock;
use crate::name_resolver::NameResolver;
use crate::parser::with_parsed_program;
use crate::symbol::{PhpSymbol, SymbolKind, SymbolModifier};
use crate::symbol_store::SymbolStore;
use crate::variable_table::VariableTable;
use crate::variable_visitor::run_flow_analysis;

#[derive(Debug, PartialEq, Eq)]
enum CompletionContext {
    /// `subject->partial` or `subject::partial`.
    Member {
        subject: String,
        is_static: bool,
        partial: String,
    },
    /// `$partial`.
    Variable { partial: String },
    /// A bare identifier prefix.
    Word { partial: String },
    Nothing,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Classify the text immediately left of the cursor.
fn completion_context(text: &str, offset: usize) -> CompletionContext {
    let bytes = text.as_bytes();
    let cursor = offset.min(bytes.len());

    let mut word_start = cursor;
    while word_start > 0 && is_word_byte(bytes[word_start - 1]) {
        word_start -= 1;
    }
    let has_sigil = word_start > 0 && bytes[word_start - 1] == b'$';
    let partial_start = if has_sigil { word_start - 1 } else { word_start };
    let partial = text[partial_start..cursor].to_string();

    let before = &text[..partial_start];
    if let Some(stripped) = before.strip_suffix("->") {
        // `?->` null-safe access completes the same way as `->`.
        let subject_end = if stripped.ends_with('?') {
            stripped.len() - 1
        } else {
            stripped.len()
        };
        let subject = subject_before(text, subject_end);
        if !subject.is_empty() {
            return CompletionContext::Member { subject, is_static: false, partial };
        }
    }
    if let Some(subject_end) = before.strip_suffix("::").map(|s| s.len()) {
        let subject = subject_before(text, subject_end);
        if !subject.is_empty() {
            return CompletionContext::Member { subject, is_static: true, partial };
        }
    }
    if has_sigil {
        return CompletionContext::Variable { partial };
    }
    if !partial.is_empty() {
        return CompletionContext::Word { partial };
    }
    CompletionContext::Nothing
}

/// The simple subject ending at `end`: a variable, keyword, or
/// (qualified) class name.  Chained subjects are out of reach of a
/// textual scan and resolve to nothing.
fn subject_before(text: &str, end: usize) -> String {
    let bytes = text.as_bytes();
    let mut start = end;
    while start > 0 {
        let b = bytes[start - 1];
        if is_word_byte(b) || b == b'$' || b == b'\\' {
            start -= 1;
        } else {
            break;
        }
    }
    text[start..end].to_string()
}

fn completion_kind(symbol: &PhpSymbol) -> CompletionItemKind {
    if symbol.kind.intersects(SymbolKind::CLASS) {
        CompletionItemKind::CLASS
    } else if symbol.kind.intersects(SymbolKind::INTERFACE) {
        CompletionItemKind::INTERFACE
    } else if symbol.kind.intersects(SymbolKind::TRAIT) {
        CompletionItemKind::MODULE
    } else if symbol.kind.intersects(SymbolKind::METHOD) {
        CompletionItemKind::METHOD
    } else if symbol.kind.intersects(SymbolKind::PROPERTY) {
        CompletionItemKind::PROPERTY
    } else if symbol.kind.intersects(SymbolKind::CLASS_CONSTANT | SymbolKind::CONSTANT) {
        CompletionItemKind::CONSTANT
    } else if symbol.kind.intersects(SymbolKind::FUNCTION) {
        CompletionItemKind::FUNCTION
    } else {
        CompletionItemKind::VALUE
    }
}

fn item_for(symbol: &PhpSymbol, label: String) -> CompletionItem {
    CompletionItem {
        label,
        kind: Some(completion_kind(symbol)),
        detail: if symbol.type_expr.is_empty() {
            None
        } else {
            Some(symbol.type_expr.clone())
        },
        documentation: symbol
            .documentation
            .as_deref()
            .and_then(docblock::summary)
            .map(Documentation::String),
        ..CompletionItem::default()
    }
}

fn member_items(
    store: &SymbolStore,
    resolver: &NameResolver,
    vars: &VariableTable,
    subject: &str,
    is_static: bool,
    partial: &str,
) -> Vec<CompletionItem> {
    let own_context = matches!(subject, "$this" | "self" | "static" | "parent");
    let class_atoms: Vec<String> = if subject.starts_with('$') {
        vars.get_type(subject, resolver.class_name())
            .class_atoms()
            .map(str::to_string)
            .collect()
    } else {
        resolver
            .resolve_class_designator(subject)
            .into_iter()
            .collect()
    };

    let visibility_forbidden = if own_context || subject == "$this" {
        SymbolModifier::NONE
    } else {
        SymbolModifier::PRIVATE | SymbolModifier::PROTECTED
    };
    let needle = partial.trim_start_matches('$').to_lowercase();

    let mut items = Vec::new();
    for class_fqn in &class_atoms {
        let members = if is_static {
            let mut members = store.member_lookup(
                class_fqn,
                None,
                SymbolKind::CLASS_CONSTANT,
                SymbolModifier::NONE,
                visibility_forbidden,
            );
            members.extend(store.member_lookup(
                class_fqn,
                None,
                SymbolKind::PROPERTY,
                SymbolModifier::STATIC,
                visibility_forbidden,
            ));
            // `self::`/`parent::` reach instance methods too; a plain
            // class designator offers only static ones.
            let method_required = if own_context {
                SymbolModifier::NONE
            } else {
                SymbolModifier::STATIC
            };
            members.extend(store.member_lookup(
                class_fqn,
                None,
                SymbolKind::METHOD,
                method_required,
                visibility_forbidden,
            ));
            members
        } else {
            store.member_lookup(
                class_fqn,
                None,
                SymbolKind::METHOD | SymbolKind::PROPERTY,
                SymbolModifier::NONE,
                visibility_forbidden | SymbolModifier::STATIC,
            )
        };

        for member in members {
            if !needle.is_empty() && !member.name.to_lowercase().starts_with(&needle) {
                continue;
            }
            let label = if member.kind.intersects(SymbolKind::PROPERTY)
                && member.modifiers.contains(SymbolModifier::STATIC)
            {
                format!("${}", member.name)
            } else {
                member.name.clone()
            };
            items.push(item_for(&member, label));
        }
    }
    items
}

fn variable_items(vars: &VariableTable, resolver: &NameResolver, partial: &str) -> Vec<CompletionItem> {
    let needle = partial.to_lowercase();
    vars.bound_names()
        .into_iter()
        .filter(|name| name.to_lowercase().starts_with(&needle))
        .map(|name| {
            let type_string = vars.get_type(&name, resolver.class_name());
            CompletionItem {
                label: name,
                kind: Some(CompletionItemKind::VARIABLE),
                detail: if type_string.is_empty() {
                    None
                } else {
                    Some(type_string.to_string())
                },
                ..CompletionItem::default()
            }
        })
        .collect()
}

fn word_items(store: &SymbolStore, partial: &str) -> Vec<CompletionItem> {
    store
        .match_prefix(
            partial,
            SymbolKind::CLASS_LIKE | SymbolKind::FUNCTION | SymbolKind::CONSTANT,
        )
        .into_iter()
        .map(|symbol| {
            let mut item = item_for(symbol, symbol.short_name().to_string());
            item.detail = Some(symbol.name.clone());
            item
        })
        .collect()
}

impl Backend {
    /// Completion candidates at a position, capped at the configured
    /// maximum.
    pub fn completions_at(&self, uri: &str, position: Position) -> Vec<CompletionItem> {
        let Some((text, offset)) = ({
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .find(uri)
                .map(|doc| (doc.text.clone(), doc.offset_at(position)))
        }) else {
            return Vec::new();
        };

        let store = self.symbols.lock().unwrap_or_else(|e| e.into_inner());
        let max_items = self.max_completion_items;

        with_parsed_program(&text, "completion", |program, content| {
            let state = run_flow_analysis(program, content, &store, Some(offset));
            if let Some(error) = &state.violation {
                log::error!("PHPilot: {error}; aborting completion for {uri}");
                return Vec::new();
            }
            let mut items = match completion_context(content, offset as usize) {
                CompletionContext::Member { subject, is_static, partial } => {
                    member_items(&store, &state.resolver, &state.vars, &subject, is_static, &partial)
                }
                CompletionContext::Variable { partial } => {
                    variable_items(&state.vars, &state.resolver, &partial)
                }
                CompletionContext::Word { partial } => word_items(&store, &partial),
                CompletionContext::Nothing => Vec::new(),
            };
            items.truncate(max_items);
            items
        })
    }
}
