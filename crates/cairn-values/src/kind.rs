use std::fmt;

/// Tag byte that starts every encoded value and every encoded type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Kind {
    Bool = 0,
    Number = 1,
    String = 2,
    Blob = 3,
    Value = 4,
    List = 5,
    Map = 6,
    Ref = 7,
    Set = 8,
    Struct = 9,
    Cycle = 10,
    Type = 11,
    Union = 12,
    /// Only appears as a meta-tuple key for entries ordered by hash.
    Hash = 13,
}

impl Kind {
    /// Parse a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Bool,
            1 => Self::Number,
            2 => Self::String,
            3 => Self::Blob,
            4 => Self::Value,
            5 => Self::List,
            6 => Self::Map,
            7 => Self::Ref,
            8 => Self::Set,
            9 => Self::Struct,
            10 => Self::Cycle,
            11 => Self::Type,
            12 => Self::Union,
            13 => Self::Hash,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Kinds whose values are ordered by value rather than by hash.
    pub fn is_primitive(self) -> bool {
        matches!(self, Self::Bool | Self::Number | Self::String)
    }

    /// Kinds backed by a prolly-tree sequence.
    pub fn is_collection(self) -> bool {
        matches!(self, Self::List | Self::Set | Self::Map | Self::Blob)
    }

    /// Collections whose entries are sorted by [`OrderedKey`](crate::OrderedKey).
    pub fn is_ordered_collection(self) -> bool {
        matches!(self, Self::Set | Self::Map)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Number => "Number",
            Self::String => "String",
            Self::Blob => "Blob",
            Self::Value => "Value",
            Self::List => "List",
            Self::Map => "Map",
            Self::Ref => "Ref",
            Self::Set => "Set",
            Self::Struct => "Struct",
            Self::Cycle => "Cycle",
            Self::Type => "Type",
            Self::Union => "Union",
            Self::Hash => "Hash",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
