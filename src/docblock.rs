//! PHPDoc block parsing.
//!
//! Extracts type information from `/** ... */` comments: `@return`,
//! `@var` (both the property form and the inline statement form with a
//! variable name), `@param`, and the generic iterable shorthands
//! (`T[]`, `list<T>`, `array<K, V>`).  The parser's trivia list is used
//! to locate the docblock immediately preceding an AST node.

use mago_span::HasSpan;
use mago_syntax::ast::{Trivia, TriviaKind};

/// Look up the docblock comment (if any) immediately preceding the given
/// AST node and return its raw text.
///
/// Walks the trivia list backwards from the node start, tolerating
/// whitespace and line comments in the gap, and stops at the first
/// docblock or at any non-whitespace source text.
pub fn docblock_before<'a>(
    trivia: &'a [Trivia<'a>],
    content: &str,
    node: &impl HasSpan,
) -> Option<&'a str> {
    docblock_before_offset(trivia, content, node.span().start.offset)
}

/// As [`docblock_before`], keyed by a raw byte offset.
pub fn docblock_before_offset<'a>(
    trivia: &'a [Trivia<'a>],
    content: &str,
    node_start: u32,
) -> Option<&'a str> {
    let candidate_idx = trivia.partition_point(|t| t.span.start.offset < node_start);
    if candidate_idx == 0 {
        return None;
    }

    let content_bytes = content.as_bytes();
    let mut covered_from = node_start;

    for i in (0..candidate_idx).rev() {
        let t = &trivia[i];
        let t_end = t.span.end.offset;

        // Any non-whitespace source text between this trivia and the node
        // means the comment belongs to something else.
        let gap = content_bytes
            .get(t_end as usize..covered_from as usize)
            .unwrap_or(&[]);
        if !gap.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        match t.kind {
            TriviaKind::DocBlockComment => return Some(crate::util::bstr(t.value)),
            TriviaKind::WhiteSpace
            | TriviaKind::SingleLineComment
            | TriviaKind::MultiLineComment
            | TriviaKind::HashComment => {
                covered_from = t.span.start.offset;
            }
        }
    }
    None
}

/// Extract the type from a `@return` tag.
pub fn return_type(docblock: &str) -> Option<String> {
    tag_type(docblock, "@return").map(|(ty, _)| ty)
}

/// Extract the type from a `@var` tag, together with the annotated
/// variable name when the inline form `@var Type $name` is used.
pub fn var_type(docblock: &str) -> Option<(String, Option<String>)> {
    tag_type(docblock, "@var")
}

/// Extract the `@param` type for a specific parameter (`$name`).
pub fn param_type(docblock: &str, param_name: &str) -> Option<String> {
    for line in docblock.lines() {
        let Some(rest) = tag_rest(line, "@param") else {
            continue;
        };
        let mut words = rest.split_whitespace();
        let Some(ty) = words.next() else { continue };
        if let Some(name) = words.next()
            && name.trim_end_matches(',') == param_name
        {
            return Some(clean_type(ty));
        }
    }
    None
}

/// The first sentence-ish line of the docblock, for completion detail.
pub fn summary(docblock: &str) -> Option<String> {
    for line in docblock.lines() {
        let line = line
            .trim_start_matches([' ', '\t'])
            .trim_start_matches("/**")
            .trim_start_matches('*')
            .trim_end_matches("*/")
            .trim();
        if line.is_empty() || line.starts_with('@') {
            continue;
        }
        return Some(line.to_string());
    }
    None
}

/// The text following `tag` on this line, or `None`.  Matches anywhere
/// in the line (one-line docblocks carry their `/**` prefix) but insists
/// on a word boundary, so `@var` does not match `@variant`.
fn tag_rest<'l>(line: &'l str, tag: &str) -> Option<&'l str> {
    let idx = line.find(tag)?;
    let rest = &line[idx + tag.len()..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some(rest)
}

/// Shared `@tag Type [$name] [description]` extraction.
fn tag_type(docblock: &str, tag: &str) -> Option<(String, Option<String>)> {
    for line in docblock.lines() {
        let Some(rest) = tag_rest(line, tag) else {
            continue;
        };
        let mut words = rest.split_whitespace();
        let Some(ty) = words.next() else { continue };
        let var = words
            .next()
            .filter(|w| w.starts_with('$'))
            .map(|w| w.trim_end_matches(',').to_string());
        return Some((clean_type(ty), var));
    }
    None
}

/// Strip the trailing `*/` that sneaks in on one-line docblocks and any
/// trailing punctuation.
fn clean_type(ty: &str) -> String {
    ty.trim_end_matches("*/").trim().to_string()
}

/// The element (value) type of a generic iterable annotation.
///
/// `User[]` → `User`, `list<User>` → `User`, `array<int, User>` → `User`,
/// `Collection<User>` → `User`.  Returns `None` when the annotation does
/// not carry an element type.
pub fn generic_value_type(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(element) = raw.strip_suffix("[]") {
        return Some(element.to_string());
    }
    let open = raw.find('<')?;
    let close = raw.rfind('>')?;
    if close <= open {
        return None;
    }
    let inner = &raw[open + 1..close];
    let parts = split_generic_args(inner);
    match parts.len() {
        1 => Some(parts[0].clone()),
        2 => Some(parts[1].clone()),
        _ => None,
    }
}

/// The key type of a two-parameter generic annotation
/// (`array<Key, Value>` → `Key`).  One-parameter generics and `T[]`
/// default to `int|string`, PHP's array key domain.
pub fn generic_key_type(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.ends_with("[]") {
        return Some("int|string".to_string());
    }
    let open = raw.find('<')?;
    let close = raw.rfind('>')?;
    if close <= open {
        return None;
    }
    let inner = &raw[open + 1..close];
    let parts = split_generic_args(inner);
    match parts.len() {
        1 => Some("int|string".to_string()),
        2 => Some(parts[0].clone()),
        _ => None,
    }
}

/// Split generic arguments on top-level commas (`array<int, array<string,
/// User>>` has two arguments, not three).
fn split_generic_args(inner: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '<' => {
                depth += 1;
                current.push(ch);
            }
            '>' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_tag_takes_first_word() {
        let doc = "/**\n * Frobs the widget.\n * @return \\App\\User the user\n */";
        assert_eq!(return_type(doc).as_deref(), Some("\\App\\User"));
    }

    #[test]
    fn var_tag_with_and_without_name() {
        assert_eq!(
            var_type("/** @var int[] $xs */"),
            Some(("int[]".to_string(), Some("$xs".to_string())))
        );
        assert_eq!(var_type("/** @var Session */"), Some(("Session".to_string(), None)));
    }

    #[test]
    fn param_tag_matches_by_name() {
        let doc = "/**\n * @param string $name\n * @param User[] $users\n */";
        assert_eq!(param_type(doc, "$users").as_deref(), Some("User[]"));
        assert_eq!(param_type(doc, "$name").as_deref(), Some("string"));
        assert_eq!(param_type(doc, "$other"), None);
    }

    #[test]
    fn generic_value_types() {
        assert_eq!(generic_value_type("User[]").as_deref(), Some("User"));
        assert_eq!(generic_value_type("list<User>").as_deref(), Some("User"));
        assert_eq!(generic_value_type("array<int, User>").as_deref(), Some("User"));
        assert_eq!(generic_value_type("string"), None);
    }

    #[test]
    fn generic_key_types() {
        assert_eq!(generic_key_type("array<Request, Response>").as_deref(), Some("Request"));
        assert_eq!(generic_key_type("User[]").as_deref(), Some("int|string"));
        assert_eq!(generic_key_type("list<User>").as_deref(), Some("int|string"));
    }

    #[test]
    fn summary_skips_tags() {
        let doc = "/**\n * Builds a user from raw rows.\n * @return User\n */";
        assert_eq!(summary(doc).as_deref(), Some("Builds a user from raw rows."));
    }
}
