//! PHP parsing adapter.
//!
//! The parser itself is external (`mago_syntax`); this module owns the
//! arena-scoping pattern every analysis runs through, the syntax-error
//! extraction used by diagnostics, and hint stringification.
//!
//! The mago parser contains `unreachable!()` and `.expect()` calls that
//! can panic on malformed PHP (partially written heredocs are common
//! while editing), so every parse is wrapped in `catch_unwind`: on panic
//! the analysis is skipped and the caller gets a default value instead of
//! a dead server process.

use std::panic;

use bumpalo::Bump;
use mago_span::HasSpan;
use mago_syntax::ast::{Hint, Program};
use mago_syntax::parser::parse_file_content;

/// A recovered parse error, owned and arena-free so it can be cached on
/// the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxErrorInfo {
    pub offset: u32,
    pub length: u32,
    pub message: String,
}

/// Parse `content` inside a scoped arena and run `f` against the typed
/// program.  The arena (and with it the whole tree) is dropped when `f`
/// returns, so analyses borrow the tree but never store it.
pub fn with_parsed_program<T, F>(content: &str, label: &str, f: F) -> T
where
    T: Default,
    F: FnOnce(&Program<'_>, &str) -> T,
{
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let arena = Bump::new();
        let file_id = mago_database::file::FileId::new(b"input.php");
        let program = parse_file_content(&arena, file_id, content.as_bytes());
        f(&program, content)
    }));

    match result {
        Ok(value) => value,
        Err(_) => {
            log::error!("PHPilot: parser panicked in {label}. Skipping analysis.");
            T::default()
        }
    }
}

/// Collect the parse errors attached to a program as owned records.
///
/// This is the single place that touches the parser's error channel;
/// diagnostics and the document registry consume the owned form.
pub(crate) fn syntax_errors_of(program: &Program<'_>) -> Vec<SyntaxErrorInfo> {
    let mut errors = Vec::new();
    for error in program.errors.iter() {
        let span = error.span();
        errors.push(SyntaxErrorInfo {
            offset: span.start.offset,
            length: span.end.offset.saturating_sub(span.start.offset).max(1),
            message: error.to_string(),
        });
    }
    errors
}

/// Parse `content` and return only its syntax errors.
pub(crate) fn parse_for_errors(content: &str) -> Vec<SyntaxErrorInfo> {
    with_parsed_program(content, "syntax check", |program, _| syntax_errors_of(program))
}

/// Stringify a native type hint from the AST.
///
/// Union and intersection hints fold into `|` / `&` joined strings;
/// nullable hints keep the `?` prefix (the type layer expands it to a
/// `null` union atom).
pub(crate) fn hint_string(hint: &Hint) -> String {
    match hint {
        Hint::Identifier(ident) => crate::util::bstr(ident.value()).to_string(),
        Hint::Nullable(nullable) => format!("?{}", hint_string(nullable.hint)),
        Hint::Union(union) => {
            format!("{}|{}", hint_string(union.left), hint_string(union.right))
        }
        Hint::Intersection(intersection) => {
            format!(
                "{}&{}",
                hint_string(intersection.left),
                hint_string(intersection.right)
            )
        }
        Hint::Void(ident)
        | Hint::Never(ident)
        | Hint::Float(ident)
        | Hint::Bool(ident)
        | Hint::Integer(ident)
        | Hint::String(ident)
        | Hint::Object(ident)
        | Hint::Mixed(ident)
        | Hint::Iterable(ident) => crate::util::bstr(ident.value).to_string(),
        Hint::Null(keyword)
        | Hint::True(keyword)
        | Hint::False(keyword)
        | Hint::Array(keyword)
        | Hint::Callable(keyword)
        | Hint::Static(keyword)
        | Hint::Self_(keyword)
        | Hint::Parent(keyword) => crate::util::bstr(keyword.value).to_string(),
        Hint::Parenthesized(paren) => format!("({})", hint_string(paren.hint)),
    }
}
