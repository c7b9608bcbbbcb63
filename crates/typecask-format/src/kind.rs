//! Type record kinds.

/// Kind of a type record, stored in the 5-bit kind field of the info word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Kind {
    /// Placeholder / pad record. Carries no trailing data.
    Unknown = 0,
    Integer = 1,
    Float = 2,
    Pointer = 3,
    Array = 4,
    Function = 5,
    Struct = 6,
    Union = 7,
    Enum = 8,
    /// Forward declaration of a struct, union or enum tag.
    Forward = 9,
    Typedef = 10,
    Volatile = 11,
    Const = 12,
    Restrict = 13,
    /// Bitfield view of an integer type. Not present in the v1 encoding.
    Slice = 14,
}

/// Number of kind discriminants, for per-kind counters.
pub const KIND_COUNT: usize = 15;

impl Kind {
    /// Convert from the raw kind field.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Unknown),
            1 => Some(Self::Integer),
            2 => Some(Self::Float),
            3 => Some(Self::Pointer),
            4 => Some(Self::Array),
            5 => Some(Self::Function),
            6 => Some(Self::Struct),
            7 => Some(Self::Union),
            8 => Some(Self::Enum),
            9 => Some(Self::Forward),
            10 => Some(Self::Typedef),
            11 => Some(Self::Volatile),
            12 => Some(Self::Const),
            13 => Some(Self::Restrict),
            14 => Some(Self::Slice),
            _ => None,
        }
    }

    /// Whether `size_or_type` holds a type-id reference instead of a size.
    ///
    /// True for the simple wrappers and for Function, whose field holds the
    /// return type. Forward is excluded: its field holds a tag kind.
    pub fn references_type(self) -> bool {
        self.is_wrapper() || self == Self::Function
    }

    /// Simple wrappers around another type: no trailing entries.
    pub fn is_wrapper(self) -> bool {
        matches!(
            self,
            Self::Pointer | Self::Typedef | Self::Volatile | Self::Const | Self::Restrict
        )
    }

    /// Whether this is a composite type (Struct, Union).
    pub fn is_composite(self) -> bool {
        matches!(self, Self::Struct | Self::Union)
    }

    /// Kinds that share the "other named" lookup namespace.
    pub fn in_shared_namespace(self) -> bool {
        matches!(
            self,
            Self::Integer
                | Self::Float
                | Self::Function
                | Self::Typedef
                | Self::Pointer
                | Self::Volatile
                | Self::Const
                | Self::Restrict
        )
    }

    /// Whether the kind exists in the v1 encoding.
    pub fn exists_in_v1(self) -> bool {
        self != Self::Slice
    }

    /// Lowercase display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Pointer => "pointer",
            Self::Array => "array",
            Self::Function => "function",
            Self::Struct => "struct",
            Self::Union => "union",
            Self::Enum => "enum",
            Self::Forward => "forward",
            Self::Typedef => "typedef",
            Self::Volatile => "volatile",
            Self::Const => "const",
            Self::Restrict => "restrict",
            Self::Slice => "slice",
        }
    }
}
