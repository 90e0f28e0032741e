//! Rust output.
//!
//! Every aggregate becomes a newtype over the runtime's dynamic `Variable`
//! with one accessor per field:
//!
//! ```text
//! #[derive(Clone)]
//! pub struct Node {
//!     base: Variable,
//! }
//!
//! impl Node {
//!     pub fn next(&self) -> CodePointer<Node> {
//!         self.base.read_at::<CodePointer<Node>>(8)
//!     }
//! }
//! ```
//!
//! Namespaces become nested `pub mod` blocks with lowercase names, and
//! references across them are written as `super::` relative paths so the
//! generated file can be mounted anywhere in a crate.


use super::{enum_literal, enum_storage, needs_dynamic_access, relative_path, CodeWriter, RenderContext, WriterStyle};
use crate::model::{EnumType, PrimitiveKind, ResolvedGraph, TypeId, TypeInstance, TypeSyntax, UserType};
use crate::names::NameTable;

const PRELUDE: &str = "use typeforge_runtime::prelude::*;";

const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "self", "Self", "static",
    "struct", "super", "trait", "true", "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do",
    "final", "gen", "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield", "union",
    // Runtime prelude and generated helpers
    "Variable", "NativeType", "CodePointer", "CodeArray", "CodeFunction", "CChar", "WChar", "Char16", "Char32",
    "from_variable", "contains",
];

/// Token of a primitive in generated Rust.
#[must_use]
pub fn primitive_token(kind: PrimitiveKind) -> &'static str
{
    match kind {
        PrimitiveKind::Void => "()",
        PrimitiveKind::Bool => "bool",
        PrimitiveKind::Char => "CChar",
        PrimitiveKind::WChar => "WChar",
        PrimitiveKind::Char16 => "Char16",
        PrimitiveKind::Char32 => "Char32",
        PrimitiveKind::I8 => "i8",
        PrimitiveKind::I16 => "i16",
        PrimitiveKind::I32 => "i32",
        PrimitiveKind::I64 => "i64",
        PrimitiveKind::I128 => "i128",
        PrimitiveKind::U8 => "u8",
        PrimitiveKind::U16 => "u16",
        PrimitiveKind::U32 => "u32",
        PrimitiveKind::U64 => "u64",
        PrimitiveKind::U128 => "u128",
        PrimitiveKind::F32 => "f32",
        PrimitiveKind::F64 => "f64",
    }
}

/// Module name for a namespace segment.
fn module_name(segment: &str) -> String
{
    let lowered = segment.to_ascii_lowercase();
    if RESERVED.contains(&lowered.as_str()) {
        format!("{lowered}_")
    } else {
        lowered
    }
}

/// Type names as seen from one module scope.
struct RustSyntax<'a>
{
    names: &'a NameTable,
    scope: Vec<String>,
}

impl<'a> RustSyntax<'a>
{
    fn new(ctx: &RenderContext<'a>, scope: &[String]) -> Self
    {
        Self {
            names: ctx.names,
            scope: scope.iter().map(|segment| module_name(segment)).collect(),
        }
    }

    fn path_to(&self, id: TypeId, truncate_namespace: bool) -> Option<String>
    {
        let name = self.names.type_name(id)?;
        if truncate_namespace {
            return Some(name.identifier.clone());
        }
        let target: Vec<String> = name.namespace.iter().map(|segment| module_name(segment)).collect();
        Some(relative_path(&self.scope, &target, &name.identifier, "::", Some("super")))
    }

    fn inline_function(return_type: &str, parameters: &[String]) -> String
    {
        if return_type == "()" {
            format!("CodeFunction<fn({})>", parameters.join(", "))
        } else {
            format!("CodeFunction<fn({}) -> {return_type}>", parameters.join(", "))
        }
    }
}

impl TypeSyntax for RustSyntax<'_>
{
    fn primitive(&self, kind: PrimitiveKind) -> String
    {
        primitive_token(kind).to_string()
    }

    fn pointer(&self, pointee: &str) -> String
    {
        format!("CodePointer<{pointee}>")
    }

    fn array(&self, element: &str, _length: Option<u64>) -> String
    {
        format!("CodeArray<{element}>")
    }

    fn function(&self, _graph: &ResolvedGraph, id: TypeId, return_type: &str, parameters: &[String]) -> String
    {
        // Declared signatures are referenced by their alias; the alias itself needs the inline form.
        self.path_to(id, false)
            .unwrap_or_else(|| Self::inline_function(return_type, parameters))
    }

    fn named(&self, _graph: &ResolvedGraph, id: TypeId, truncate_namespace: bool) -> Option<String>
    {
        self.path_to(id, truncate_namespace)
    }
}

/// Rust [`CodeWriter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RustWriter;

impl RustWriter
{
    fn render_type_in(ctx: &RenderContext<'_>, scope: &[String], id: TypeId) -> String
    {
        ctx.graph
            .render_type_string(id, &RustSyntax::new(ctx, scope), ctx.truncate_namespace)
    }

    fn native_type_impl(out: &mut String, ctx: &RenderContext<'_>, identifier: &str, type_name: &str, size: u64, body: &str)
    {
        out.push_str(&format!("impl NativeType for {identifier} {{\n"));
        out.push_str(&format!("    const MODULE: &'static str = {:?};\n", ctx.graph.module()));
        out.push_str(&format!("    const TYPE_NAME: &'static str = {type_name:?};\n"));
        out.push_str(&format!("    const SIZE: u64 = {size};\n"));
        out.push('\n');
        out.push_str("    fn from_variable(base: Variable) -> Self {\n");
        out.push_str(&format!("        {body}\n"));
        out.push_str("    }\n}\n");
    }

    fn render_user_type(&self, ctx: &RenderContext<'_>, id: TypeId, user: &UserType, type_name: &str) -> Option<String>
    {
        let identifier = ctx.names.identifier(id)?;
        let scope = ctx.scope_of(id);
        let mut out = String::new();

        out.push_str(&format!("/// `{type_name}` ({} bytes)\n", user.size));
        out.push_str("#[derive(Clone)]\n");
        out.push_str(&format!("pub struct {identifier} {{\n"));
        out.push_str("    base: Variable,\n}\n\n");
        Self::native_type_impl(&mut out, ctx, identifier, type_name, user.size, "Self { base }");

        let mut methods: Vec<String> = Vec::new();
        for (base, accessor) in user.bases.iter().zip(ctx.names.bases(id)) {
            let (return_type, body) = if needs_dynamic_access(ctx.graph, *base) {
                (
                    "Variable".to_string(),
                    format!("self.base.base_class_by_name({:?})", ctx.graph.display_name(*base)),
                )
            } else {
                let base_type = Self::render_type_in(ctx, scope, *base);
                (base_type.clone(), format!("self.base.base_class::<{base_type}>()"))
            };
            methods.push(format!(
                "    pub fn {accessor}(&self) -> {return_type} {{\n        {body}\n    }}\n"
            ));
        }
        for (index, (field, accessor)) in user.fields.iter().zip(ctx.names.members(id)).enumerate() {
            let Some(body) = self.render_member_access(ctx, id, index) else {
                continue;
            };
            let return_type = if needs_dynamic_access(ctx.graph, field.ty) {
                "Variable".to_string()
            } else {
                Self::render_type_in(ctx, scope, field.ty)
            };
            let mut method = String::new();
            if let Some(bits) = field.bit_field {
                method.push_str(&format!(
                    "    /// Bit-field: {} bits from bit {} of byte {}\n",
                    bits.bit_width, bits.bit_offset, field.byte_offset
                ));
            }
            method.push_str(&format!(
                "    pub fn {accessor}(&self) -> {return_type} {{\n        {body}\n    }}\n"
            ));
            methods.push(method);
        }

        if !methods.is_empty() {
            out.push_str(&format!("\nimpl {identifier} {{\n"));
            out.push_str(&methods.join("\n"));
            out.push_str("}\n");
        }
        Some(out)
    }

    fn render_enum(ctx: &RenderContext<'_>, id: TypeId, enumeration: &EnumType) -> Option<String>
    {
        let identifier = ctx.names.identifier(id)?;
        let storage = enum_storage(ctx.graph, enumeration);
        let repr = primitive_token(storage);
        let flags = enumeration.is_flags();
        let mut out = String::new();

        if flags {
            out.push_str(&format!("/// `{}` (flags)\n", enumeration.qualified_name()));
        } else {
            out.push_str(&format!("/// `{}`\n", enumeration.qualified_name()));
        }
        out.push_str("#[repr(transparent)]\n#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]\n");
        out.push_str(&format!("pub struct {identifier}(pub {repr});\n"));
        out.push('\n');

        out.push_str(&format!("impl {identifier} {{\n"));
        for (member, name) in enumeration.members.iter().zip(ctx.names.members(id)) {
            out.push_str(&format!("    pub const {name}: Self = Self({});\n", enum_literal(member.value, storage)));
        }
        if flags {
            out.push('\n');
            out.push_str("    pub const fn contains(self, other: Self) -> bool {\n");
            out.push_str("        self.0 & other.0 == other.0\n    }\n");
        }
        out.push_str("}\n\n");

        if flags {
            out.push_str(&format!("impl core::ops::BitOr for {identifier} {{\n"));
            out.push_str("    type Output = Self;\n\n");
            out.push_str("    fn bitor(self, rhs: Self) -> Self {\n        Self(self.0 | rhs.0)\n    }\n}\n\n");
        }

        let body = format!("Self(base.read_at::<{repr}>(0))");
        Self::native_type_impl(
            &mut out,
            ctx,
            identifier,
            &enumeration.qualified_name(),
            enumeration.size,
            &body,
        );
        Some(out)
    }

    fn render_function(ctx: &RenderContext<'_>, id: TypeId) -> Option<String>
    {
        let identifier = ctx.names.identifier(id)?;
        let TypeInstance::Function(function) = ctx.graph.get(id) else {
            return None;
        };
        let return_type = Self::render_type_in(ctx, &[], function.return_type);
        let parameters: Vec<String> = function
            .parameters
            .iter()
            .map(|parameter| Self::render_type_in(ctx, &[], *parameter))
            .collect();
        Some(format!(
            "/// `{}`\npub type {identifier} = {};\n",
            ctx.graph.display_name(id),
            RustSyntax::inline_function(&return_type, &parameters)
        ))
    }
}

impl CodeWriter for RustWriter
{
    fn style(&self) -> WriterStyle
    {
        WriterStyle::Rust
    }

    fn file_extension(&self) -> &'static str
    {
        "rs"
    }

    fn reserved_words(&self) -> &'static [&'static str]
    {
        RESERVED
    }

    fn render_type(&self, ctx: &RenderContext<'_>, id: TypeId) -> String
    {
        Self::render_type_in(ctx, &[], id)
    }

    fn render_declaration(&self, ctx: &RenderContext<'_>, id: TypeId) -> Option<String>
    {
        if ctx.graph.is_illegal(id) {
            return None;
        }
        match ctx.graph.get(id) {
            TypeInstance::Aggregate(user) => self.render_user_type(ctx, id, user, &user.qualified_name()),
            TypeInstance::TemplateInstance(template) => {
                self.render_user_type(ctx, id, &template.layout, &ctx.graph.display_name(id))
            }
            TypeInstance::Enum(enumeration) => Self::render_enum(ctx, id, enumeration),
            TypeInstance::Function(_) => Self::render_function(ctx, id),
            TypeInstance::Primitive(_)
            | TypeInstance::Pointer { .. }
            | TypeInstance::Array { .. }
            | TypeInstance::Undefined { .. } => None,
        }
    }

    fn render_member_access(&self, ctx: &RenderContext<'_>, owner: TypeId, field_index: usize) -> Option<String>
    {
        let field = ctx.graph.get(owner).user_type()?.fields.get(field_index)?;
        if needs_dynamic_access(ctx.graph, field.ty) {
            return Some(format!("self.base.field({:?})", field.name));
        }
        let ty = Self::render_type_in(ctx, ctx.scope_of(owner), field.ty);
        Some(match field.bit_field {
            Some(bits) => format!(
                "self.base.read_bits::<{ty}>({}, {}, {})",
                field.byte_offset, bits.bit_offset, bits.bit_width
            ),
            None => format!("self.base.read_at::<{ty}>({})", field.byte_offset),
        })
    }

    fn render_prologue(&self, ctx: &RenderContext<'_>) -> String
    {
        format!(
            "// Generated by typeforge from module `{}`. Do not edit.\n\n\
             #![allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]\n\n\
             {PRELUDE}\n",
            ctx.graph.module()
        )
    }

    fn namespace_segment(&self, segment: &str) -> String
    {
        module_name(segment)
    }

    fn open_namespace(&self, segment: &str) -> String
    {
        format!("pub mod {segment} {{\n    {PRELUDE}")
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_primitive_tokens_are_unique()
    {
        let tokens: HashSet<&str> = PrimitiveKind::ALL.iter().map(|kind| primitive_token(*kind)).collect();
        assert_eq!(tokens.len(), PrimitiveKind::ALL.len());
    }

    #[test]
    fn test_module_name()
    {
        assert_eq!(module_name("Outer"), "outer");
        assert_eq!(module_name("Type"), "type_");
        assert_eq!(module_name("std"), "std");
    }

    #[test]
    fn test_inline_function()
    {
        assert_eq!(RustSyntax::inline_function("()", &[]), "CodeFunction<fn()>");
        assert_eq!(
            RustSyntax::inline_function("i32", &["u8".to_string(), "CodePointer<()>".to_string()]),
            "CodeFunction<fn(u8, CodePointer<()>) -> i32>"
        );
    }
}
