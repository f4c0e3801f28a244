//! Qualified names and namespace bookkeeping.
//!
//! [`NamespaceTable`] is the bidirectional namespace/prefix association that
//! grows as namespaces are first observed, and records which namespaces a
//! write actually used. [`NamespaceScope`] resolves prefixes while reading.

use std::collections::HashMap;
use std::fmt;

/// Namespace of the `xml:` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Schema-instance namespace carrying `type` and `nil` markers.
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// An element or attribute name with an optional namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    namespace: Option<String>,
    local: String,
}

impl QName {
    /// Creates a name without a namespace.
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    /// Creates a namespaced name. An empty namespace means none.
    pub fn with_namespace(namespace: Option<impl Into<String>>, local: impl Into<String>) -> Self {
        let namespace = namespace.map(Into::into).filter(|ns: &String| !ns.is_empty());
        Self {
            namespace,
            local: local.into(),
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the same local name without a namespace.
    pub fn unqualified(&self) -> QName {
        QName::new(self.local.clone())
    }

    /// Parses Clark notation (`{namespace}local`) or a bare local name.
    pub fn parse(text: &str) -> QName {
        if let Some(rest) = text.strip_prefix('{') {
            if let Some((ns, local)) = rest.split_once('}') {
                return QName::with_namespace(Some(ns), local);
            }
        }
        QName::new(text)
    }
}

impl fmt::Display for QName {
    /// Formats in Clark notation when namespaced.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Splits a raw `prefix:local` name.
pub fn split_prefix(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, raw),
    }
}

/// Yields progressively shorter namespaces by trimming trailing segments.
///
/// `http://acme.org/orders/v2` widens to `http://acme.org/orders`, then
/// `http://acme.org`, `http://acme`, `http`.
pub fn widen(namespace: &str) -> impl Iterator<Item = &str> {
    let mut current = namespace;
    std::iter::from_fn(move || {
        let trimmed = current.trim_end_matches(['/', '.', ':']);
        let cut = trimmed.rfind(['/', '.', ':'])?;
        current = trimmed[..cut].trim_end_matches(['/', '.', ':']);
        if current.is_empty() { None } else { Some(current) }
    })
}

#[derive(Debug, Clone)]
struct NamespaceEntry {
    prefix: String,
    used: bool,
}

/// Bidirectional namespace/prefix associations.
#[derive(Debug, Clone, Default)]
pub struct NamespaceTable {
    by_uri: HashMap<String, NamespaceEntry>,
    by_prefix: HashMap<String, String>,
    generated: usize,
}

impl NamespaceTable {
    pub fn new() -> Self {
        let mut table = Self::default();
        table.declare(XSI_NAMESPACE, Some("xsi"));
        table.declare(XML_NAMESPACE, Some("xml"));
        table
    }

    /// Associates a prefix with `uri` if it has none yet, returning the prefix.
    ///
    /// A taken preferred prefix falls back to a generated `ns{n}` prefix.
    pub fn declare(&mut self, uri: &str, preferred: Option<&str>) -> String {
        if let Some(entry) = self.by_uri.get(uri) {
            return entry.prefix.clone();
        }
        let prefix = match preferred {
            Some(p) if !p.is_empty() && !self.by_prefix.contains_key(p) => p.to_string(),
            _ => loop {
                self.generated += 1;
                let candidate = format!("ns{}", self.generated);
                if !self.by_prefix.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        self.by_prefix.insert(prefix.clone(), uri.to_string());
        self.by_uri.insert(
            uri.to_string(),
            NamespaceEntry {
                prefix: prefix.clone(),
                used: false,
            },
        );
        prefix
    }

    pub fn prefix_of(&self, uri: &str) -> Option<&str> {
        self.by_uri.get(uri).map(|e| e.prefix.as_str())
    }

    pub fn uri_of(&self, prefix: &str) -> Option<&str> {
        self.by_prefix.get(prefix).map(String::as_str)
    }

    pub fn mark_used(&mut self, uri: &str) {
        if let Some(entry) = self.by_uri.get_mut(uri) {
            entry.used = true;
        }
    }

    pub fn is_used(&self, uri: &str) -> bool {
        self.by_uri.get(uri).map(|e| e.used).unwrap_or(false)
    }

    /// Namespaces marked used, sorted.
    pub fn used(&self) -> Vec<&str> {
        let mut used: Vec<&str> = self
            .by_uri
            .iter()
            .filter(|(_, e)| e.used)
            .map(|(uri, _)| uri.as_str())
            .collect();
        used.sort_unstable();
        used
    }

    pub fn len(&self) -> usize {
        self.by_uri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uri.is_empty()
    }
}

#[derive(Debug, Default)]
struct Frame {
    default: Option<Option<String>>,
    prefixes: Vec<(String, String)>,
}

/// Prefix resolution for the element currently being read.
#[derive(Debug, Default)]
pub struct NamespaceScope {
    frames: Vec<Frame>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a frame for an element; declarations are added with [`declare`](Self::declare).
    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Records an `xmlns` (prefix `None`) or `xmlns:prefix` declaration in the innermost frame.
    pub fn declare(&mut self, prefix: Option<&str>, uri: &str) {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        if let Some(frame) = self.frames.last_mut() {
            match prefix {
                None => frame.default = Some(Some(uri.to_string()).filter(|u| !u.is_empty())),
                Some(p) => frame.prefixes.push((p.to_string(), uri.to_string())),
            }
        }
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        let declared = self.frames.iter().rev().find_map(|frame| {
            frame
                .prefixes
                .iter()
                .rev()
                .find(|(p, _)| p == prefix)
                .map(|(_, uri)| uri.as_str())
        });
        // Markers written without a declaration still resolve.
        declared.or_else(|| (prefix == "xsi").then_some(XSI_NAMESPACE))
    }

    fn default_namespace(&self) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.default.as_ref())
            .and_then(|d| d.as_deref())
    }

    /// Expands a raw element name; unprefixed names take the default namespace.
    pub fn resolve_element(&self, raw: &str) -> QName {
        match split_prefix(raw) {
            (Some(prefix), local) => QName::with_namespace(self.lookup(prefix), local),
            (None, local) => QName::with_namespace(self.default_namespace(), local),
        }
    }

    /// Expands a raw attribute name; unprefixed attributes have no namespace.
    pub fn resolve_attribute(&self, raw: &str) -> QName {
        match split_prefix(raw) {
            (Some(prefix), local) => QName::with_namespace(self.lookup(prefix), local),
            (None, local) => QName::new(local),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_display_and_parse() {
        let name = QName::with_namespace(Some("urn:acme"), "Order");
        assert_eq!(name.to_string(), "{urn:acme}Order");
        assert_eq!(QName::parse("{urn:acme}Order"), name);
        assert_eq!(QName::parse("Order"), QName::new("Order"));
        assert_eq!(QName::with_namespace(Some(""), "A"), QName::new("A"));
    }

    #[test]
    fn test_widen() {
        let widened: Vec<&str> = widen("http://acme.org/orders/v2").collect();
        assert_eq!(
            widened,
            vec!["http://acme.org/orders", "http://acme.org", "http://acme", "http"]
        );
        let widened: Vec<&str> = widen("urn:acme:v2").collect();
        assert_eq!(widened, vec!["urn:acme", "urn"]);
        assert_eq!(widen("plain").count(), 0);
    }

    #[test]
    fn test_table_is_bidirectional() {
        let mut table = NamespaceTable::new();
        let p = table.declare("urn:acme", Some("a"));
        assert_eq!(p, "a");
        assert_eq!(table.declare("urn:acme", Some("other")), "a");
        assert_eq!(table.uri_of("a"), Some("urn:acme"));
        assert_eq!(table.prefix_of("urn:acme"), Some("a"));

        // Prefix collision falls back to a generated one.
        let q = table.declare("urn:beta", Some("a"));
        assert_eq!(q, "ns1");
        assert_eq!(table.prefix_of(XSI_NAMESPACE), Some("xsi"));
    }

    #[test]
    fn test_usage_marks() {
        let mut table = NamespaceTable::new();
        table.declare("urn:acme", None);
        assert!(!table.is_used("urn:acme"));
        table.mark_used("urn:acme");
        assert_eq!(table.used(), vec!["urn:acme"]);
    }

    #[test]
    fn test_scope_resolution() {
        let mut scope = NamespaceScope::new();
        scope.push();
        scope.declare(None, "urn:default");
        scope.declare(Some("a"), "urn:a");
        assert_eq!(
            scope.resolve_element("Order"),
            QName::with_namespace(Some("urn:default"), "Order")
        );
        assert_eq!(
            scope.resolve_element("a:Line"),
            QName::with_namespace(Some("urn:a"), "Line")
        );
        assert_eq!(scope.resolve_attribute("Id"), QName::new("Id"));

        scope.push();
        scope.declare(None, "");
        assert_eq!(scope.resolve_element("Inner"), QName::new("Inner"));
        scope.pop();
        assert_eq!(
            scope.resolve_element("Order").namespace(),
            Some("urn:default")
        );
        assert_eq!(
            scope.resolve_attribute("xml:space").namespace(),
            Some(XML_NAMESPACE)
        );
    }
}
