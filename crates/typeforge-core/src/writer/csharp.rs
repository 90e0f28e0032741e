//! C# output.
//!
//! Aggregates become partial classes deriving from the runtime's `UserType`,
//! tagged with a `[UserType]` attribute the runtime uses to bind them to the
//! native type. Fields are expression-bodied properties:
//!
//! ```text
//! [UserType(ModuleName = "app", TypeName = "Node", Size = 16)]
//! public partial class Node : UserType
//! {
//!     public Node(Variable variable)
//!         : base(variable)
//!     {
//!     }
//!
//!     public CodePointer<Node> next => ReadAt<CodePointer<Node>>(8);
//! }
//! ```
//!
//! Function signatures are always referenced as `CodeFunction`; a delegate
//! with the exact signature is declared alongside for documentation.


use super::{enum_literal, enum_storage, needs_dynamic_access, relative_path, CodeWriter, RenderContext, WriterStyle};
use crate::model::{EnumType, PrimitiveKind, ResolvedGraph, TypeId, TypeInstance, TypeSyntax, UserType};
use crate::names::NameTable;

const RESERVED: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked", "class", "const", "continue",
    "decimal", "default", "delegate", "do", "double", "else", "enum", "event", "explicit", "extern", "false", "finally",
    "fixed", "float", "for", "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params", "private", "protected",
    "public", "readonly", "ref", "return", "sbyte", "sealed", "short", "sizeof", "stackalloc", "static", "string",
    "struct", "switch", "this", "throw", "true", "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort",
    "using", "virtual", "void", "volatile", "while",
    // Runtime surface
    "Variable", "UserType", "CodePointer", "CodeArray", "CodeFunction", "CChar", "WChar", "Char32", "ReadAt",
    "ReadBits", "GetField", "GetBaseClass",
];

/// Token of a primitive in generated C#.
#[must_use]
pub fn primitive_token(kind: PrimitiveKind) -> &'static str
{
    match kind {
        PrimitiveKind::Void => "void",
        PrimitiveKind::Bool => "bool",
        PrimitiveKind::Char => "CChar",
        PrimitiveKind::WChar => "WChar",
        PrimitiveKind::Char16 => "char",
        PrimitiveKind::Char32 => "Char32",
        PrimitiveKind::I8 => "sbyte",
        PrimitiveKind::I16 => "short",
        PrimitiveKind::I32 => "int",
        PrimitiveKind::I64 => "long",
        PrimitiveKind::I128 => "Int128",
        PrimitiveKind::U8 => "byte",
        PrimitiveKind::U16 => "ushort",
        PrimitiveKind::U32 => "uint",
        PrimitiveKind::U64 => "ulong",
        PrimitiveKind::U128 => "UInt128",
        PrimitiveKind::F32 => "float",
        PrimitiveKind::F64 => "double",
    }
}

/// C# string literal.
fn string_literal(value: &str) -> String
{
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

struct CSharpSyntax<'a>
{
    names: &'a NameTable,
    scope: &'a [String],
}

impl TypeSyntax for CSharpSyntax<'_>
{
    fn primitive(&self, kind: PrimitiveKind) -> String
    {
        primitive_token(kind).to_string()
    }

    fn pointer(&self, pointee: &str) -> String
    {
        if pointee == "void" {
            "CodePointer".to_string()
        } else {
            format!("CodePointer<{pointee}>")
        }
    }

    fn array(&self, element: &str, _length: Option<u64>) -> String
    {
        format!("CodeArray<{element}>")
    }

    fn function(&self, _graph: &ResolvedGraph, _id: TypeId, _return_type: &str, _parameters: &[String]) -> String
    {
        "CodeFunction".to_string()
    }

    fn named(&self, _graph: &ResolvedGraph, id: TypeId, truncate_namespace: bool) -> Option<String>
    {
        let name = self.names.type_name(id)?;
        if truncate_namespace || name.namespace.as_slice() == self.scope {
            return Some(name.identifier.clone());
        }
        Some(format!(
            "global::{}",
            relative_path(&[], &name.namespace, &name.identifier, ".", None)
        ))
    }
}

/// C# [`CodeWriter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CSharpWriter;

impl CSharpWriter
{
    fn render_type_in(ctx: &RenderContext<'_>, scope: &[String], id: TypeId) -> String
    {
        let syntax = CSharpSyntax {
            names: ctx.names,
            scope,
        };
        ctx.graph.render_type_string(id, &syntax, ctx.truncate_namespace)
    }

    fn render_user_type(&self, ctx: &RenderContext<'_>, id: TypeId, user: &UserType, type_name: &str) -> Option<String>
    {
        let identifier = ctx.names.identifier(id)?;
        let scope = ctx.scope_of(id);
        let mut out = String::new();

        out.push_str(&format!(
            "[UserType(ModuleName = {}, TypeName = {}, Size = {})]\n",
            string_literal(ctx.graph.module()),
            string_literal(type_name),
            user.size
        ));
        out.push_str(&format!("public partial class {identifier} : UserType\n{{\n"));
        out.push_str(&format!("    public {identifier}(Variable variable)\n        : base(variable)\n    {{\n    }}\n"));

        let mut properties = Vec::new();
        for (base, accessor) in user.bases.iter().zip(ctx.names.bases(id)) {
            if needs_dynamic_access(ctx.graph, *base) {
                properties.push(format!(
                    "    public Variable {accessor} => GetBaseClass({});",
                    string_literal(&ctx.graph.display_name(*base))
                ));
            } else {
                let base_type = Self::render_type_in(ctx, scope, *base);
                properties.push(format!("    public {base_type} {accessor} => GetBaseClass<{base_type}>();"));
            }
        }
        for (index, (field, accessor)) in user.fields.iter().zip(ctx.names.members(id)).enumerate() {
            let Some(access) = self.render_member_access(ctx, id, index) else {
                continue;
            };
            let property_type = if needs_dynamic_access(ctx.graph, field.ty) {
                "Variable".to_string()
            } else {
                Self::render_type_in(ctx, scope, field.ty)
            };
            properties.push(format!("    public {property_type} {accessor} => {access};"));
        }
        if !properties.is_empty() {
            out.push('\n');
            for property in properties {
                out.push_str(&property);
                out.push('\n');
            }
        }
        out.push_str("}\n");
        Some(out)
    }

    fn render_enum(ctx: &RenderContext<'_>, id: TypeId, enumeration: &EnumType) -> Option<String>
    {
        let identifier = ctx.names.identifier(id)?;
        let storage = enum_storage(ctx.graph, enumeration);
        let mut out = String::new();
        if enumeration.is_flags() {
            out.push_str("[System.Flags]\n");
        }
        out.push_str(&format!("public enum {identifier} : {}\n{{\n", primitive_token(storage)));
        for (member, name) in enumeration.members.iter().zip(ctx.names.members(id)) {
            out.push_str(&format!("    {name} = {},\n", enum_literal(member.value, storage)));
        }
        out.push_str("}\n");
        Some(out)
    }

    fn render_delegate(ctx: &RenderContext<'_>, id: TypeId) -> Option<String>
    {
        let identifier = ctx.names.identifier(id)?;
        let TypeInstance::Function(function) = ctx.graph.get(id) else {
            return None;
        };
        let return_type = Self::render_type_in(ctx, &[], function.return_type);
        let parameters: Vec<String> = function
            .parameters
            .iter()
            .enumerate()
            .map(|(index, parameter)| format!("{} arg{index}", Self::render_type_in(ctx, &[], *parameter)))
            .collect();
        Some(format!(
            "public delegate {return_type} {identifier}({});\n",
            parameters.join(", ")
        ))
    }
}

impl CodeWriter for CSharpWriter
{
    fn style(&self) -> WriterStyle
    {
        WriterStyle::CSharp
    }

    fn file_extension(&self) -> &'static str
    {
        "cs"
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
            TypeInstance::Function(_) => Self::render_delegate(ctx, id),
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
            return Some(format!("GetField({})", string_literal(&field.name)));
        }
        let ty = Self::render_type_in(ctx, ctx.scope_of(owner), field.ty);
        Some(match field.bit_field {
            Some(bits) => format!(
                "ReadBits<{ty}>({}, {}, {})",
                field.byte_offset, bits.bit_offset, bits.bit_width
            ),
            None => format!("ReadAt<{ty}>({})", field.byte_offset),
        })
    }

    fn render_prologue(&self, ctx: &RenderContext<'_>) -> String
    {
        format!(
            "// Generated by typeforge from module `{}`. Do not edit.\n\nusing Typeforge.Runtime;\n",
            ctx.graph.module()
        )
    }

    fn open_namespace(&self, segment: &str) -> String
    {
        format!("namespace {segment}\n{{")
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
    fn test_string_literal()
    {
        assert_eq!(string_literal("ns::Node"), "\"ns::Node\"");
        assert_eq!(string_literal("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }
}
