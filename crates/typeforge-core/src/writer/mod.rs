//! # Code Writers
//!
//! Pluggable rendering strategies that turn resolved types into source text.
//!
//! The export driver only talks to [`CodeWriter`]; adding an output language
//! means adding one implementation here and touching nothing upstream.
//!
//! - [`RustWriter`]: newtype accessors over the runtime's `Variable`
//! - [`CSharpWriter`]: `UserType`-derived partial classes

pub mod csharp;
pub mod rust;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use csharp::CSharpWriter;
pub use rust::RustWriter;

use crate::error::ExportError;
use crate::model::{EnumType, PrimitiveKind, ResolvedGraph, TypeId, TypeInstance};
use crate::names::NameTable;

/// Everything a writer needs to render one module.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a>
{
    pub graph: &'a ResolvedGraph,
    pub names: &'a NameTable,
    /// Write every reference unqualified and every declaration at the top level
    pub truncate_namespace: bool,
}

impl<'a> RenderContext<'a>
{
    pub fn new(graph: &'a ResolvedGraph, names: &'a NameTable, truncate_namespace: bool) -> Self
    {
        Self {
            graph,
            names,
            truncate_namespace,
        }
    }

    /// Namespace a declaration is emitted in.
    #[must_use]
    pub fn scope_of(&self, id: TypeId) -> &'a [String]
    {
        if self.truncate_namespace {
            return &[];
        }
        self.names.type_name(id).map_or(&[], |name| name.namespace.as_slice())
    }
}

/// Output language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriterStyle
{
    Rust,
    CSharp,
}

impl WriterStyle
{
    /// A writer of this style.
    #[must_use]
    pub fn writer(self) -> Box<dyn CodeWriter>
    {
        match self {
            WriterStyle::Rust => Box::new(RustWriter),
            WriterStyle::CSharp => Box::new(CSharpWriter),
        }
    }
}

impl fmt::Display for WriterStyle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            WriterStyle::Rust => write!(f, "rust"),
            WriterStyle::CSharp => write!(f, "csharp"),
        }
    }
}

impl FromStr for WriterStyle
{
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_ascii_lowercase().as_str() {
            "rust" | "rs" => Ok(WriterStyle::Rust),
            "csharp" | "cs" | "c#" => Ok(WriterStyle::CSharp),
            other => Err(ExportError::InvalidArgument(format!("unknown writer style: {other}"))),
        }
    }
}

/// A rendering strategy for one target language.
pub trait CodeWriter: Send + Sync
{
    fn style(&self) -> WriterStyle;

    /// Extension of generated files, without the dot.
    fn file_extension(&self) -> &'static str;

    /// Words that cannot be used as identifiers.
    fn reserved_words(&self) -> &'static [&'static str];

    /// Type reference as written at a use site in the top-level scope.
    fn render_type(&self, ctx: &RenderContext<'_>, id: TypeId) -> String;

    /// Full declaration of an aggregate, enum, template instance or function
    /// signature. `None` if the type is not emitted.
    fn render_declaration(&self, ctx: &RenderContext<'_>, id: TypeId) -> Option<String>;

    /// Expression reading field `field_index` of `owner` from inside one of
    /// `owner`'s accessors.
    fn render_member_access(&self, ctx: &RenderContext<'_>, owner: TypeId, field_index: usize) -> Option<String>;

    /// Text preceding every declaration of a unit.
    fn render_prologue(&self, ctx: &RenderContext<'_>) -> String;

    /// Spelling of a namespace segment in this language.
    fn namespace_segment(&self, segment: &str) -> String
    {
        segment.to_string()
    }

    /// Line opening a namespace block for an already spelled segment.
    fn open_namespace(&self, segment: &str) -> String;

    /// Line closing a namespace block.
    fn close_namespace(&self) -> String
    {
        "}".to_string()
    }
}

const INDENT: &str = "    ";

#[derive(Debug, Default)]
struct Scope
{
    declarations: Vec<String>,
    children: BTreeMap<String, Scope>,
}

impl Scope
{
    fn insert(&mut self, path: &[String], declaration: String)
    {
        match path.split_first() {
            None => self.declarations.push(declaration),
            Some((first, rest)) => self.children.entry(first.clone()).or_default().insert(rest, declaration),
        }
    }
}

/// Assemble one output unit: the prologue followed by the declarations of
/// `order`, grouped into namespace blocks.
///
/// Within a namespace, declarations keep their relative position in `order`.
/// Namespaces are written in sorted order.
pub fn render_unit(writer: &dyn CodeWriter, ctx: &RenderContext<'_>, order: &[TypeId]) -> String
{
    let mut root = Scope::default();
    for id in order {
        if let Some(declaration) = writer.render_declaration(ctx, *id) {
            let path: Vec<String> = ctx
                .scope_of(*id)
                .iter()
                .map(|segment| writer.namespace_segment(segment))
                .collect();
            root.insert(&path, declaration);
        }
    }

    let mut out = writer.render_prologue(ctx);
    write_scope(writer, &root, 0, &mut out);
    out
}

fn write_scope(writer: &dyn CodeWriter, scope: &Scope, depth: usize, out: &mut String)
{
    let indent = INDENT.repeat(depth);
    for declaration in &scope.declarations {
        out.push('\n');
        for line in declaration.lines() {
            if !line.is_empty() {
                out.push_str(&indent);
                out.push_str(line);
            }
            out.push('\n');
        }
    }
    for (segment, child) in &scope.children {
        out.push('\n');
        for line in writer.open_namespace(segment).lines() {
            out.push_str(&indent);
            out.push_str(line);
            out.push('\n');
        }
        write_scope(writer, child, depth + 1, out);
        out.push_str(&indent);
        out.push_str(&writer.close_namespace());
        out.push('\n');
    }
}

/// Path from `scope` to a declaration living in `target`, joined by `separator`.
///
/// `up` is the token that climbs one namespace (Rust's `super`); languages
/// that resolve names outward on their own pass `None` and get a path from
/// the root instead.
pub(crate) fn relative_path(scope: &[String], target: &[String], identifier: &str, separator: &str, up: Option<&str>) -> String
{
    if scope == target {
        return identifier.to_string();
    }
    let mut parts: Vec<&str> = Vec::new();
    match up {
        Some(up) => {
            let common = scope.iter().zip(target).take_while(|(a, b)| a == b).count();
            parts.extend(std::iter::repeat_n(up, scope.len() - common));
            parts.extend(target[common..].iter().map(String::as_str));
        }
        None => parts.extend(target.iter().map(String::as_str)),
    }
    parts.push(identifier);
    parts.join(separator)
}

/// Whether a value of this type can only be read dynamically, by name.
///
/// True when the type holds something undefined or excluded by value; such
/// a member has no static layout the generated code could rely on.
pub(crate) fn needs_dynamic_access(graph: &ResolvedGraph, id: TypeId) -> bool
{
    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        let instance = graph.get(current);
        if instance.is_undefined() || graph.is_illegal(current) {
            return true;
        }
        stack.extend(instance.value_dependencies());
    }
    false
}

/// Integer type an enum is stored in, limited to 64 bits.
pub(crate) fn enum_storage(graph: &ResolvedGraph, enumeration: &EnumType) -> PrimitiveKind
{
    match graph.get(enumeration.underlying) {
        TypeInstance::Primitive(kind) if kind.is_integer() && kind.size().is_some_and(|size| size <= 8) => *kind,
        _ => PrimitiveKind::signed(enumeration.size)
            .filter(|kind| kind.size().is_some_and(|size| size <= 8))
            .unwrap_or(PrimitiveKind::I32),
    }
}

/// Enumerator value as a literal of `storage`.
///
/// Negative values of unsigned storage wrap to their two's complement.
pub(crate) fn enum_literal(value: i128, storage: PrimitiveKind) -> String
{
    let unsigned = matches!(
        storage,
        PrimitiveKind::U8 | PrimitiveKind::U16 | PrimitiveKind::U32 | PrimitiveKind::U64
    );
    if value < 0 && unsigned {
        let bits = storage.size().unwrap_or(8) * 8;
        let wrapped = value.rem_euclid(1i128 << bits);
        return wrapped.to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_style_parsing()
    {
        assert_eq!("rust".parse::<WriterStyle>().unwrap(), WriterStyle::Rust);
        assert_eq!("CSharp".parse::<WriterStyle>().unwrap(), WriterStyle::CSharp);
        assert_eq!("cs".parse::<WriterStyle>().unwrap(), WriterStyle::CSharp);
        assert!("cobol".parse::<WriterStyle>().is_err());
        assert_eq!(WriterStyle::CSharp.to_string(), "csharp");
        assert_eq!(WriterStyle::Rust.writer().file_extension(), "rs");
    }

    #[test]
    fn test_relative_path()
    {
        let a = vec!["a".to_string()];
        let ab = vec!["a".to_string(), "b".to_string()];
        let c = vec!["c".to_string()];
        assert_eq!(relative_path(&a, &a, "X", "::", Some("super")), "X");
        assert_eq!(relative_path(&[], &ab, "X", "::", Some("super")), "a::b::X");
        assert_eq!(relative_path(&ab, &c, "X", "::", Some("super")), "super::super::c::X");
        assert_eq!(relative_path(&ab, &a, "X", "::", Some("super")), "super::X");
        assert_eq!(relative_path(&ab, &c, "X", ".", None), "c.X");
    }

    #[test]
    fn test_enum_literal_wraps_unsigned()
    {
        assert_eq!(enum_literal(-1, PrimitiveKind::U32), "4294967295");
        assert_eq!(enum_literal(-1, PrimitiveKind::U8), "255");
        assert_eq!(enum_literal(-1, PrimitiveKind::I32), "-1");
        assert_eq!(enum_literal(7, PrimitiveKind::U64), "7");
    }

    #[test]
    fn test_scope_grouping_keeps_order()
    {
        let mut root = Scope::default();
        let ns = vec!["ns".to_string()];
        root.insert(&ns, "second".into());
        root.insert(&[], "top".into());
        root.insert(&ns, "third".into());
        assert_eq!(root.declarations, vec!["top"]);
        assert_eq!(root.children["ns"].declarations, vec!["second", "third"]);
    }
}
