//! Schema name and namespace derivation.
//!
//! Schema names are restricted to the symbol alphabet `[A-Za-z0-9_]` and may not start with a
//! digit. Any other character is replaced by `__` followed by its decimal code point, after
//! `/` has been turned into `_`. A leading digit gets a `_` prefix.
//!
//! The mapping is not injective: `"a/b"` and `"a_b"` both become `a_b`, and a raw `__46` is
//! indistinguishable from an escaped `.`. The builder and record constructors detect the
//! resulting collisions instead of relying on the escape being unique.

use crate::types::NodeId;

/// Namespace of every built-in schema.
pub const BUILT_IN_NAMESPACE: &str = "org.opcfoundation.ua";

/// Escape `raw` into the schema symbol alphabet.
pub fn escape_symbol(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => out.push(ch),
            '/' => out.push('_'),
            other => {
                out.push_str("__");
                out.push_str(&u32::from(other).to_string());
            }
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Derive a dotted schema namespace from a namespace URI.
///
/// Host segments are reversed and path segments appended, so
/// `http://opcfoundation.org/UA/DI/` becomes `org.opcfoundation.UA.DI`. Text without a
/// `scheme://` prefix is split on `/`. The empty URI maps to [`BUILT_IN_NAMESPACE`].
pub fn namespace_from_uri(uri: &str) -> String {
    if uri.is_empty() {
        return BUILT_IN_NAMESPACE.to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    match uri.split_once("://") {
        Some((_scheme, rest)) => {
            let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
            // Drop credentials and port
            let host = authority.rsplit('@').next().unwrap_or(authority);
            let host = host.split(':').next().unwrap_or(host);
            segments.extend(host.split('.').rev());
            segments.extend(path.split('/'));
        }
        None => segments.extend(uri.split('/')),
    }

    let escaped: Vec<String> =
        segments.into_iter().filter(|s| !s.is_empty()).map(escape_symbol).collect();
    if escaped.is_empty() { BUILT_IN_NAMESPACE.to_string() } else { escaped.join(".") }
}

/// Schema name for a type: its escaped browse name, or the escaped identifier when unnamed.
pub fn type_name(type_id: &NodeId, browse_name: &str) -> String {
    if browse_name.is_empty() {
        escape_symbol(&format!("{}_{}", type_id.kind_prefix(), type_id.identifier_text()))
    } else {
        escape_symbol(browse_name)
    }
}
