//! The closed set of resolved type shapes.

use std::fmt;

use smallvec::SmallVec;

use super::primitive::PrimitiveKind;

/// Handle to a [`TypeInstance`] inside one run's registry.
///
/// Handles are only meaningful for the registry that issued them and are
/// assigned in discovery order, so they must never be used for ordering
/// output. Sort by [`TypeKey`](super::TypeKey) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

impl TypeId
{
    pub(crate) fn from_index(index: usize) -> Self
    {
        TypeId(u32::try_from(index).unwrap_or(u32::MAX))
    }

    /// Position in the registry.
    #[must_use]
    pub fn index(self) -> usize
    {
        self.0 as usize
    }
}

impl fmt::Display for TypeId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

/// Flavour of a user-defined aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind
{
    Struct,
    Class,
    /// All fields overlap at offset zero (or wherever the provider says)
    Union,
}

/// Bit position of a bit-field within the byte at its field's `byte_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitField
{
    /// Bit index within the byte, `0..8`, least significant first
    pub bit_offset: u8,
    /// Number of bits, at least 1
    pub bit_width: u8,
}

/// A data member of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field
{
    /// Declared name, possibly empty for anonymous members
    pub name: String,
    /// Type of the member, held by value
    pub ty: TypeId,
    /// Offset from the start of the owning aggregate
    pub byte_offset: u64,
    /// Present for bit-fields
    pub bit_field: Option<BitField>,
}

/// An aggregate (struct, class or union) with its layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserType
{
    /// Short name, without namespace or template arguments
    pub name: String,
    /// Enclosing namespaces and classes, outermost first
    pub namespace: Vec<String>,
    pub kind: AggregateKind,
    /// Size in bytes
    pub size: u64,
    /// Base types, held by value at the start of the layout
    pub bases: Vec<TypeId>,
    pub fields: Vec<Field>,
}

impl UserType
{
    /// Placeholder shell registered before fields and bases are known.
    pub(crate) fn shell(name: String, namespace: Vec<String>, kind: AggregateKind, size: u64) -> Self
    {
        Self {
            name,
            namespace,
            kind,
            size,
            bases: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// `ns::inner::Name`
    #[must_use]
    pub fn qualified_name(&self) -> String
    {
        qualify(&self.namespace, &self.name)
    }
}

/// A single enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember
{
    pub name: String,
    pub value: i128,
}

/// An enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType
{
    pub name: String,
    pub namespace: Vec<String>,
    /// Storage type, normally an integer primitive
    pub underlying: TypeId,
    pub size: u64,
    /// Members in declaration order
    pub members: Vec<EnumMember>,
}

impl EnumType
{
    /// `ns::inner::Name`
    #[must_use]
    pub fn qualified_name(&self) -> String
    {
        qualify(&self.namespace, &self.name)
    }

    /// Whether the enum looks like a set of bit flags.
    ///
    /// True when there are at least two members and every non-zero value is a
    /// distinct single bit.
    #[must_use]
    pub fn is_flags(&self) -> bool
    {
        let mut seen: u128 = 0;
        let mut bits = 0;
        for member in &self.members {
            if member.value == 0 {
                continue;
            }
            if member.value < 0 || member.value.count_ones() != 1 {
                return false;
            }
            #[allow(clippy::cast_sign_loss)]
            let bit = member.value as u128;
            if seen & bit != 0 {
                return false;
            }
            seen |= bit;
            bits += 1;
        }
        bits >= 2
    }
}

/// A function signature (the type of a function, not a function symbol).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionType
{
    pub return_type: TypeId,
    pub parameters: SmallVec<[TypeId; 4]>,
}

/// An instantiation of a template aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInstance
{
    /// Arguments in declaration order
    pub type_arguments: Vec<TypeId>,
    /// Layout of this particular instantiation; `layout.name` is the base name
    pub layout: UserType,
}

impl TemplateInstance
{
    /// Template name without arguments.
    #[must_use]
    pub fn base_name(&self) -> &str
    {
        &self.layout.name
    }
}

/// Resolved, canonical description of one native type.
///
/// The enum is closed on purpose: adding a native type kind means adding a
/// variant here and fixing every exhaustive `match` the compiler points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInstance
{
    Primitive(PrimitiveKind),
    /// The only legal way for the graph to refer back to itself
    Pointer
    {
        pointee: TypeId,
    },
    Array
    {
        element: TypeId,
        /// `None` for unknown-length arrays
        length: Option<u64>,
    },
    Enum(EnumType),
    Function(FunctionType),
    Aggregate(UserType),
    TemplateInstance(TemplateInstance),
    /// Stand-in for anything the provider could not fully describe
    Undefined
    {
        /// What was asked for, kept for comments and diagnostics
        name: String,
    },
}

impl TypeInstance
{
    /// Layout of aggregates and template instances.
    #[must_use]
    pub fn user_type(&self) -> Option<&UserType>
    {
        match self {
            TypeInstance::Aggregate(user) => Some(user),
            TypeInstance::TemplateInstance(template) => Some(&template.layout),
            _ => None,
        }
    }

    /// Whether the instance gets a declaration of its own in generated code.
    #[must_use]
    pub fn is_declarable(&self) -> bool
    {
        matches!(
            self,
            TypeInstance::Aggregate(_)
                | TypeInstance::Enum(_)
                | TypeInstance::Function(_)
                | TypeInstance::TemplateInstance(_)
        )
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool
    {
        matches!(self, TypeInstance::Undefined { .. })
    }

    /// Dependencies held by value.
    ///
    /// Pointer targets and function signature components are deliberately
    /// absent: they are reached through indirection.
    #[must_use]
    pub fn value_dependencies(&self) -> SmallVec<[TypeId; 8]>
    {
        match self {
            TypeInstance::Array { element, .. } => SmallVec::from_slice(&[*element]),
            TypeInstance::Enum(enumeration) => SmallVec::from_slice(&[enumeration.underlying]),
            TypeInstance::Aggregate(user) | TypeInstance::TemplateInstance(TemplateInstance { layout: user, .. }) => user
                .bases
                .iter()
                .copied()
                .chain(user.fields.iter().map(|field| field.ty))
                .collect(),
            TypeInstance::Primitive(_)
            | TypeInstance::Pointer { .. }
            | TypeInstance::Function(_)
            | TypeInstance::Undefined { .. } => SmallVec::new(),
        }
    }
}

/// Join namespace segments and a short name with `::`.
pub(crate) fn qualify(namespace: &[String], name: &str) -> String
{
    if namespace.is_empty() {
        return name.to_string();
    }
    let mut qualified = namespace.join("::");
    qualified.push_str("::");
    qualified.push_str(name);
    qualified
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn enumeration(values: &[i128]) -> EnumType
    {
        EnumType {
            name: "E".into(),
            namespace: Vec::new(),
            underlying: TypeId::from_index(0),
            size: 4,
            members: values
                .iter()
                .enumerate()
                .map(|(index, value)| EnumMember {
                    name: format!("M{index}"),
                    value: *value,
                })
                .collect(),
        }
    }

    #[test]
    fn test_flags_detection()
    {
        assert!(enumeration(&[0, 1, 2, 4, 8]).is_flags());
        assert!(enumeration(&[1, 2]).is_flags());
        assert!(!enumeration(&[0, 1, 2, 3]).is_flags());
        assert!(!enumeration(&[1, 1]).is_flags());
        assert!(!enumeration(&[4]).is_flags());
        assert!(!enumeration(&[-1, 2]).is_flags());
    }

    #[test]
    fn test_pointer_has_no_value_dependencies()
    {
        let pointer = TypeInstance::Pointer {
            pointee: TypeId::from_index(3),
        };
        assert!(pointer.value_dependencies().is_empty());

        let array = TypeInstance::Array {
            element: TypeId::from_index(3),
            length: Some(2),
        };
        assert_eq!(array.value_dependencies().as_slice(), &[TypeId::from_index(3)]);
    }

    #[test]
    fn test_qualified_name()
    {
        let user = UserType::shell("Node".into(), vec!["a".into(), "b".into()], AggregateKind::Struct, 8);
        assert_eq!(user.qualified_name(), "a::b::Node");
        let global = UserType::shell("Node".into(), Vec::new(), AggregateKind::Struct, 8);
        assert_eq!(global.qualified_name(), "Node");
    }
}
