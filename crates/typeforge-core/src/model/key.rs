//! Canonical keys and provider references.

use std::fmt;

use super::primitive::PrimitiveKind;

/// A reference to a type as understood by the symbol provider.
///
/// This is the "name or offset" half of the provider contract: fields,
/// pointees and base classes point at their types through one of these, and
/// the resolver turns each into a [`TypeId`](super::TypeId) with further
/// queries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeQuery
{
    /// Qualified type name, e.g. `std::vector<int>` or `ns::Node`
    Name(String),
    /// Provider-specific offset of a type record (a DIE offset for DWARF)
    Offset(u64),
    /// A built-in scalar that needs no lookup
    Primitive(PrimitiveKind),
}

impl TypeQuery
{
    /// Build a name query.
    pub fn name(name: impl Into<String>) -> Self
    {
        TypeQuery::Name(name.into())
    }
}

impl fmt::Display for TypeQuery
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            TypeQuery::Name(name) => f.write_str(name),
            TypeQuery::Offset(offset) => write!(f, "@0x{offset:x}"),
            TypeQuery::Primitive(kind) => f.write_str(kind.token()),
        }
    }
}

impl From<PrimitiveKind> for TypeQuery
{
    fn from(kind: PrimitiveKind) -> Self
    {
        TypeQuery::Primitive(kind)
    }
}

impl From<&str> for TypeQuery
{
    fn from(name: &str) -> Self
    {
        TypeQuery::Name(name.to_string())
    }
}

/// Canonical identity of a type within one resolution run.
///
/// At most one [`TypeInstance`](super::TypeInstance) exists per key. Named
/// types are keyed by `(module, qualified name, template arguments)`;
/// pointers, arrays and function signatures are keyed structurally by the
/// keys of their components.
///
/// The derived `Ord` is what every deterministic ordering in the crate sorts
/// by, so output never depends on discovery order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKey
{
    /// Built-in scalar
    Primitive(PrimitiveKind),
    /// Aggregate, enum or template instance
    Named
    {
        /// Module the type lives in
        module: String,
        /// Qualified name, without template arguments
        name: String,
        /// Keys of the template arguments, empty for non-templates
        arguments: Vec<TypeKey>,
    },
    /// Pointer to the inner key
    Pointer(Box<TypeKey>),
    /// Array of the inner key
    Array
    {
        /// Element key
        element: Box<TypeKey>,
        /// Element count, `None` when unknown
        length: Option<u64>,
    },
    /// Function signature
    Function
    {
        /// Return type key
        return_type: Box<TypeKey>,
        /// Parameter keys in order
        parameters: Vec<TypeKey>,
    },
    /// A reference the provider could not name at all
    Opaque
    {
        /// Module the reference was made from
        module: String,
        /// The reference itself
        query: TypeQuery,
    },
    /// A reference chain cut short by the depth limit
    ///
    /// Kept apart from `Named` so a later, shallower request for the same
    /// type still resolves it in full.
    Truncated
    {
        /// Module the reference was made from
        module: String,
        /// The reference that was not followed
        query: TypeQuery,
    },
}

impl TypeKey
{
    /// Key of a named, non-template type.
    pub fn named(module: impl Into<String>, name: impl Into<String>) -> Self
    {
        TypeKey::Named {
            module: module.into(),
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    /// Module component, if the key has one.
    #[must_use]
    pub fn module(&self) -> Option<&str>
    {
        match self {
            TypeKey::Named { module, .. } | TypeKey::Opaque { module, .. } | TypeKey::Truncated { module, .. } => {
                Some(module)
            }
            _ => None,
        }
    }
}

impl fmt::Display for TypeKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            TypeKey::Primitive(kind) => f.write_str(kind.token()),
            TypeKey::Named { module, name, arguments } => {
                write!(f, "{module}!{name}")?;
                if !arguments.is_empty() {
                    f.write_str("<")?;
                    write_list(f, arguments)?;
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeKey::Pointer(inner) => write!(f, "{inner}*"),
            TypeKey::Array { element, length } => match length {
                Some(length) => write!(f, "{element}[{length}]"),
                None => write!(f, "{element}[]"),
            },
            TypeKey::Function {
                return_type,
                parameters,
            } => {
                write!(f, "{return_type}(")?;
                write_list(f, parameters)?;
                f.write_str(")")
            }
            TypeKey::Opaque { module, query } => write!(f, "{module}!?{query}"),
            TypeKey::Truncated { module, query } => write!(f, "{module}!~{query}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, keys: &[TypeKey]) -> fmt::Result
{
    for (index, key) in keys.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{key}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_key_display()
    {
        let node = TypeKey::named("app", "ns::Node");
        assert_eq!(node.to_string(), "app!ns::Node");
        assert_eq!(TypeKey::Pointer(Box::new(node.clone())).to_string(), "app!ns::Node*");

        let vector = TypeKey::Named {
            module: "app".into(),
            name: "std::vector".into(),
            arguments: vec![TypeKey::Primitive(PrimitiveKind::I32)],
        };
        assert_eq!(vector.to_string(), "app!std::vector<i32>");

        let func = TypeKey::Function {
            return_type: Box::new(TypeKey::Primitive(PrimitiveKind::Void)),
            parameters: vec![node, TypeKey::Primitive(PrimitiveKind::U8)],
        };
        assert_eq!(func.to_string(), "void(app!ns::Node, u8)");
    }

    #[test]
    fn test_template_arguments_distinguish_keys()
    {
        let of = |kind| TypeKey::Named {
            module: "app".into(),
            name: "Box".into(),
            arguments: vec![TypeKey::Primitive(kind)],
        };
        assert_ne!(of(PrimitiveKind::I32), of(PrimitiveKind::I64));
        assert_eq!(of(PrimitiveKind::I32), of(PrimitiveKind::I32));
    }

    #[test]
    fn test_truncated_key_is_not_the_named_key()
    {
        let truncated = TypeKey::Truncated {
            module: "app".into(),
            query: TypeQuery::name("Target"),
        };
        assert_ne!(truncated, TypeKey::named("app", "Target"));
        assert_eq!(truncated.module(), Some("app"));
        assert_eq!(truncated.to_string(), "app!~Target");
    }

    #[test]
    fn test_query_display()
    {
        assert_eq!(TypeQuery::Offset(0x2a).to_string(), "@0x2a");
        assert_eq!(TypeQuery::name("Foo").to_string(), "Foo");
        assert_eq!(TypeQuery::from(PrimitiveKind::Bool).to_string(), "bool");
    }
}
