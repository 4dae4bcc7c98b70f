//! Base type classification by declared type name.
//!
//! The catalog does not tag scalar types structurally, so a symbol is a base type
//! exactly when its declared name appears in the table below. Matching is exact and
//! case-sensitive; everything else is treated as a nested aggregate.
//!
//! | declared name(s)                                               | category |
//! |----------------------------------------------------------------|----------|
//! | `int64`, `int32`, `int16`, `int8`, `int`, `char`               | signed   |
//! | `uint8`, `uint16`, `uint16_t`, `uint32`, `unsigned int`,       | unsigned |
//! | `unsigned`, `uint64`, `unsigned char`                          |          |
//! | `boolean`, `bool`                                              | boolean  |
//! | `float`, `double`                                              | float    |
//! | `_padding*`                                                    | padding  |
//! | `string`                                                       | string   |

/// Prefix of compiler-inserted padding members, e.g. `_padding24`
pub const PADDING_PREFIX: &str = "_padding";

/// Scalar categories recognized by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    /// Two's complement integer (includes `char`)
    SignedInteger,
    /// Unsigned integer
    UnsignedInteger,
    /// Boolean
    Boolean,
    /// IEEE-754 float or double
    Float,
    /// Alignment filler; carries no value
    Padding {
        /// Width parsed from the name suffix, if it is numeric
        bits: Option<u32>,
    },
    /// Character string of catalog-declared width
    String,
}

impl BaseType {
    /// Returns the category name
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseType::SignedInteger => "int",
            BaseType::UnsignedInteger => "uint",
            BaseType::Boolean => "boolean",
            BaseType::Float => "float",
            BaseType::Padding { .. } => "padding",
            BaseType::String => "string",
        }
    }

    /// Returns true for integer-like categories that can be read as a number
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            BaseType::SignedInteger | BaseType::UnsignedInteger | BaseType::Boolean
        )
    }
}

/// Classifies a declared type name. `None` means the name is not a base type.
// FIXME: char signedness and width are not modeled; it is folded into SignedInteger.
pub fn classify_base_type(type_name: &str) -> Option<BaseType> {
    match type_name {
        "int64" | "int32" | "int16" | "int8" | "int" | "char" => Some(BaseType::SignedInteger),
        "uint8" | "uint16" | "uint16_t" | "uint32" | "unsigned int" | "unsigned" | "uint64"
        | "unsigned char" => Some(BaseType::UnsignedInteger),
        "boolean" | "bool" => Some(BaseType::Boolean),
        "float" | "double" => Some(BaseType::Float),
        "string" => Some(BaseType::String),
        _ => type_name
            .strip_prefix(PADDING_PREFIX)
            .map(|suffix| BaseType::Padding {
                bits: suffix.parse().ok(),
            }),
    }
}
