/// Small helpers shared across the server.
///
/// Name-manipulation utilities for PHP fully-qualified names live here;
/// anything heavier (namespace resolution, member lookup) has its own
/// module.

/// Extract the short (unqualified) name from a potentially
/// fully-qualified name.
///
/// For example, `"\\Illuminate\\Support\\Collection"` → `"Collection"`,
/// and `"Collection"` → `"Collection"`.
pub(crate) fn short_name(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

/// Canonicalise a fully-qualified name to the form used by every index:
/// exactly one leading backslash, no trailing separator.
///
/// `"Foo\\Bar"` → `"\\Foo\\Bar"`, `"\\Foo\\Bar"` unchanged.
pub(crate) fn canonical_fqn(name: &str) -> String {
    let trimmed = name.trim_start_matches('\\');
    format!("\\{}", trimmed)
}

/// View a raw byte slice (as produced by the syntax tree) as a UTF-8
/// string. PHP source identifiers are always valid UTF-8.
pub(crate) fn bstr(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap_or("")
}

/// Join a namespace (no leading separator, possibly empty) and a name
/// into a canonical FQN.
pub(crate) fn join_fqn(namespace: &str, name: &str) -> String {
    let name = name.trim_start_matches('\\');
    if namespace.is_empty() {
        format!("\\{}", name)
    } else {
        format!("\\{}\\{}", namespace, name)
    }
}
