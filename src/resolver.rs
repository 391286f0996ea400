//! Type resolution for iterated collections
//!
//! The classifier never inspects type syntax itself. It asks a
//! [`TypeResolver`] what kind of collection an expression evaluates to and
//! which symbol an expression names. Resolvers must degrade to
//! [`CollectionKind::Other`] / `None` when information is missing.

use crate::syntax::Expr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Classification of an iterated data structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Fixed-size array (`T[]`)
    Array,
    /// Growable list (`List<T>`)
    List,
    /// Anything else, including unresolved types
    #[default]
    Other,
}

impl CollectionKind {
    /// Classify a type name as written in declarations
    ///
    /// `int[]`, `string[][]` and `int[,]` are arrays; `List<T>` with or
    /// without the `System.Collections.Generic` namespace is a list.
    pub fn from_type_name(ty: &str) -> Self {
        let ty = ty.trim().trim_end_matches('?');

        if let Some(open) = ty.rfind('[') {
            let rank = &ty[open + 1..];
            if open > 0 && rank.strip_suffix(']').is_some_and(|r| r.chars().all(|c| c == ',')) {
                return CollectionKind::Array;
            }
        }

        let ty = ty.strip_prefix("global::").unwrap_or(ty);
        let unqualified = ty.strip_prefix("System.Collections.Generic.").unwrap_or(ty);

        if unqualified.starts_with("List<") && unqualified.ends_with('>') {
            return CollectionKind::List;
        }

        CollectionKind::Other
    }

    /// Display name used in rule messages
    pub fn type_label(&self) -> &'static str {
        match self {
            CollectionKind::Array => "Array",
            CollectionKind::List => "List",
            CollectionKind::Other => "other",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_label())
    }
}

/// Identity of a declared variable, field or parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(pub String);

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol(name.to_string())
    }
}

/// Static type information consumed by the classifier
pub trait TypeResolver: Send + Sync {
    /// Collection kind of the value `expr` evaluates to
    fn resolve(&self, expr: &Expr) -> CollectionKind;

    /// Symbol named by `expr`, if any
    fn symbol(&self, expr: &Expr) -> Option<Symbol> {
        expr.as_identifier().map(Symbol::from)
    }
}

/// Closures act as resolvers that only know collection kinds
impl<F> TypeResolver for F
where
    F: Fn(&Expr) -> CollectionKind + Send + Sync,
{
    fn resolve(&self, expr: &Expr) -> CollectionKind {
        self(expr)
    }
}

/// Resolver backed by declared type names
///
/// Identifiers and `this.<field>` accesses resolve through the table.
/// Element access on a jagged array resolves to the element type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolTable {
    types: HashMap<String, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration
    pub fn with_symbol(mut self, name: &str, ty: &str) -> Self {
        self.declare(name, ty);
        self
    }

    pub fn declare(&mut self, name: &str, ty: &str) {
        self.types.insert(name.to_string(), ty.to_string());
    }

    /// Declared type of a name
    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.types.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Declared type name of an expression, when derivable
    fn type_name_of(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Identifier { .. } | Expr::MemberAccess { .. } => {
                let symbol = self.symbol(expr)?;
                self.type_of(&symbol.0).map(String::from)
            }
            Expr::ElementAccess { target, .. } => {
                let outer = self.type_name_of(target)?;
                let outer = outer.trim();
                let open = outer.rfind('[')?;
                outer.ends_with(']').then(|| outer[..open].to_string())
            }
            _ => None,
        }
    }
}

impl From<HashMap<String, String>> for SymbolTable {
    fn from(types: HashMap<String, String>) -> Self {
        Self { types }
    }
}

impl TypeResolver for SymbolTable {
    fn resolve(&self, expr: &Expr) -> CollectionKind {
        self.type_name_of(expr)
            .map(|ty| CollectionKind::from_type_name(&ty))
            .unwrap_or_default()
    }

    fn symbol(&self, expr: &Expr) -> Option<Symbol> {
        let name = match expr {
            Expr::Identifier { name } => name,
            Expr::MemberAccess { target, member } if target.is_identifier("this") => member,
            _ => return None,
        };
        self.types.contains_key(name).then(|| Symbol(name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_type_name() {
        assert_eq!(CollectionKind::from_type_name("int[]"), CollectionKind::Array);
        assert_eq!(CollectionKind::from_type_name("string[][]"), CollectionKind::Array);
        assert_eq!(CollectionKind::from_type_name("double[,]"), CollectionKind::Array);
        assert_eq!(CollectionKind::from_type_name("int[]?"), CollectionKind::Array);
        assert_eq!(CollectionKind::from_type_name("List<int>"), CollectionKind::List);
        assert_eq!(
            CollectionKind::from_type_name("System.Collections.Generic.List<string>"),
            CollectionKind::List
        );
        assert_eq!(
            CollectionKind::from_type_name("global::System.Collections.Generic.List<T>"),
            CollectionKind::List
        );
        assert_eq!(
            CollectionKind::from_type_name("IEnumerable<int>"),
            CollectionKind::Other
        );
        assert_eq!(
            CollectionKind::from_type_name("Dictionary<string, int[]>"),
            CollectionKind::Other
        );
        assert_eq!(CollectionKind::from_type_name("[]"), CollectionKind::Other);
        assert_eq!(CollectionKind::from_type_name("int"), CollectionKind::Other);
    }

    #[test]
    fn test_symbol_table_resolution() {
        let table = SymbolTable::new()
            .with_symbol("arr", "int[]")
            .with_symbol("list", "List<int>")
            .with_symbol("grid", "int[][]")
            .with_symbol("items", "List<string>");

        assert_eq!(table.resolve(&Expr::ident("arr")), CollectionKind::Array);
        assert_eq!(table.resolve(&Expr::ident("list")), CollectionKind::List);
        assert_eq!(table.resolve(&Expr::ident("missing")), CollectionKind::Other);
        assert_eq!(
            table.resolve(&Expr::member(Expr::ident("this"), "items")),
            CollectionKind::List
        );
        assert_eq!(
            table.resolve(&Expr::element(Expr::ident("grid"), Expr::literal("0"))),
            CollectionKind::Array
        );
        assert_eq!(
            table.resolve(&Expr::element(Expr::ident("arr"), Expr::literal("0"))),
            CollectionKind::Other
        );
        assert_eq!(
            table.resolve(&Expr::call(Expr::ident("GetItems"), vec![])),
            CollectionKind::Other
        );
    }

    #[test]
    fn test_symbol_table_symbols() {
        let table = SymbolTable::new().with_symbol("list", "List<int>");

        assert_eq!(table.symbol(&Expr::ident("list")), Some(Symbol::from("list")));
        assert_eq!(
            table.symbol(&Expr::member(Expr::ident("this"), "list")),
            Some(Symbol::from("list"))
        );
        assert_eq!(table.symbol(&Expr::ident("other")), None);
        assert_eq!(
            table.symbol(&Expr::member(Expr::ident("obj"), "list")),
            None
        );
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |expr: &Expr| {
            if expr.is_identifier("xs") {
                CollectionKind::Array
            } else {
                CollectionKind::Other
            }
        };

        assert_eq!(resolver.resolve(&Expr::ident("xs")), CollectionKind::Array);
        assert_eq!(TypeResolver::symbol(&resolver, &Expr::ident("xs")), Some(Symbol::from("xs")));
    }

    #[test]
    fn test_symbol_table_deserialize() {
        let table: SymbolTable =
            serde_json::from_str(r#"{"arr": "int[]", "names": "List<string>"}"#).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.type_of("arr"), Some("int[]"));
    }
}
