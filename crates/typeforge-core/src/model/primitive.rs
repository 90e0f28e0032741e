//! Built-in scalar kinds.

use std::fmt;

/// Built-in scalar type of the debugged process.
///
/// The set is closed: every base type the symbol provider reports is mapped
/// onto one of these, or reported as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveKind
{
    /// No value (`void`)
    Void,
    /// Boolean
    Bool,
    /// Narrow character (`char`)
    Char,
    /// Platform wide character (`wchar_t`)
    WChar,
    /// UTF-16 code unit (`char16_t`)
    Char16,
    /// UTF-32 code point (`char32_t`)
    Char32,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// Signed 128-bit integer
    I128,
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// Unsigned 128-bit integer
    U128,
    /// 32-bit IEEE float
    F32,
    /// 64-bit IEEE float
    F64,
}

impl PrimitiveKind
{
    /// Every kind, in declaration order.
    pub const ALL: [PrimitiveKind; 18] = [
        PrimitiveKind::Void,
        PrimitiveKind::Bool,
        PrimitiveKind::Char,
        PrimitiveKind::WChar,
        PrimitiveKind::Char16,
        PrimitiveKind::Char32,
        PrimitiveKind::I8,
        PrimitiveKind::I16,
        PrimitiveKind::I32,
        PrimitiveKind::I64,
        PrimitiveKind::I128,
        PrimitiveKind::U8,
        PrimitiveKind::U16,
        PrimitiveKind::U32,
        PrimitiveKind::U64,
        PrimitiveKind::U128,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
    ];

    /// Display token used in diagnostics and canonical keys.
    ///
    /// Tokens are unique per kind.
    #[must_use]
    pub const fn token(self) -> &'static str
    {
        match self {
            PrimitiveKind::Void => "void",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Char => "char",
            PrimitiveKind::WChar => "wchar",
            PrimitiveKind::Char16 => "char16",
            PrimitiveKind::Char32 => "char32",
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

    /// Size in bytes, or `None` for kinds whose width is platform dependent.
    #[must_use]
    pub const fn size(self) -> Option<u64>
    {
        match self {
            PrimitiveKind::Void => Some(0),
            PrimitiveKind::Bool | PrimitiveKind::Char | PrimitiveKind::I8 | PrimitiveKind::U8 => Some(1),
            PrimitiveKind::Char16 | PrimitiveKind::I16 | PrimitiveKind::U16 => Some(2),
            PrimitiveKind::Char32 | PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => Some(4),
            PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => Some(8),
            PrimitiveKind::I128 | PrimitiveKind::U128 => Some(16),
            PrimitiveKind::WChar => None,
        }
    }

    /// Signed integer kind of the given width in bytes.
    #[must_use]
    pub const fn signed(size: u64) -> Option<Self>
    {
        match size {
            1 => Some(PrimitiveKind::I8),
            2 => Some(PrimitiveKind::I16),
            4 => Some(PrimitiveKind::I32),
            8 => Some(PrimitiveKind::I64),
            16 => Some(PrimitiveKind::I128),
            _ => None,
        }
    }

    /// Unsigned integer kind of the given width in bytes.
    #[must_use]
    pub const fn unsigned(size: u64) -> Option<Self>
    {
        match size {
            1 => Some(PrimitiveKind::U8),
            2 => Some(PrimitiveKind::U16),
            4 => Some(PrimitiveKind::U32),
            8 => Some(PrimitiveKind::U64),
            16 => Some(PrimitiveKind::U128),
            _ => None,
        }
    }

    /// Whether values of this kind are integers usable as enum storage.
    #[must_use]
    pub const fn is_integer(self) -> bool
    {
        matches!(
            self,
            PrimitiveKind::I8
                | PrimitiveKind::I16
                | PrimitiveKind::I32
                | PrimitiveKind::I64
                | PrimitiveKind::I128
                | PrimitiveKind::U8
                | PrimitiveKind::U16
                | PrimitiveKind::U32
                | PrimitiveKind::U64
                | PrimitiveKind::U128
        )
    }
}

impl fmt::Display for PrimitiveKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_sized_constructors()
    {
        assert_eq!(PrimitiveKind::signed(4), Some(PrimitiveKind::I32));
        assert_eq!(PrimitiveKind::unsigned(8), Some(PrimitiveKind::U64));
        assert_eq!(PrimitiveKind::signed(3), None);
        assert_eq!(PrimitiveKind::unsigned(0), None);
    }

    #[test]
    fn test_sizes_match_constructors()
    {
        for size in [1, 2, 4, 8, 16] {
            assert_eq!(PrimitiveKind::signed(size).and_then(PrimitiveKind::size), Some(size));
            assert_eq!(PrimitiveKind::unsigned(size).and_then(PrimitiveKind::size), Some(size));
        }
    }

    #[test]
    fn test_is_integer()
    {
        assert!(PrimitiveKind::U16.is_integer());
        assert!(!PrimitiveKind::Bool.is_integer());
        assert!(!PrimitiveKind::F64.is_integer());
        assert!(!PrimitiveKind::Char.is_integer());
    }
}
