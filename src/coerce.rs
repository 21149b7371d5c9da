//! Scalar coercion between raw document values and typed attribute values.
//!
//! Loading converts a raw [`toml::Value`] into the attribute's declared type;
//! saving converts it back. The rules, in order of precedence:
//!
//! 1. Booleans only go to `bool` (or to text, see 3).
//! 2. Integers and floats widen or narrow to any numeric target with `as`
//!    semantics: floats truncate toward zero when the target is integral, and
//!    integral narrowing keeps the low bits. Numbers stringify for `String`.
//! 3. A `String` target accepts anything through its canonical text form.
//! 4. A `char` target takes the first character of a non-empty string.
//! 5. Enums match their member names case-insensitively.
//! 6. Everything else is a [`CoerceError::Mismatch`].
//!
//! Coercion never panics. The caller reports the error and leaves the
//! attribute as it was.

use thiserror::Error;
use toml::Value;

/// Why a raw value could not become the target type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    #[error("expected {expected}, got {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("expected a single character, got an empty string")]
    EmptyChar,

    #[error("'{value}' is not a member of {enum_name} (expected one of: {})", .members.join(", "))]
    UnknownVariant {
        value: String,
        enum_name: &'static str,
        members: Vec<&'static str>,
    },

    #[error("converter {0} could not read the value")]
    Converter(&'static str),
}

/// Short name of a raw value's type, for messages.
pub fn raw_type_name(raw: &Value) -> &'static str {
    match raw {
        Value::String(_) => "string",
        Value::Integer(_) => "integer",
        Value::Float(_) => "float",
        Value::Boolean(_) => "boolean",
        Value::Datetime(_) => "datetime",
        Value::Array(_) => "list",
        Value::Table(_) => "section",
    }
}

/// A type that maps onto a single document scalar.
pub trait Primitive: Sized + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn coerce(raw: &Value) -> Result<Self, CoerceError>;

    /// The raw form written on save. `None` means "nothing to write".
    ///
    /// TOML integers are `i64`, so unsigned values above `i64::MAX` have no
    /// raw form either: a scalar attribute holding one leaves the document
    /// untouched, and a list element holding one is left out of the list.
    fn to_raw(&self) -> Option<Value>;
}

fn mismatch<T: Primitive>(raw: &Value) -> CoerceError {
    CoerceError::Mismatch {
        expected: T::TYPE_NAME,
        found: raw_type_name(raw),
    }
}

impl Primitive for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn coerce(raw: &Value) -> Result<Self, CoerceError> {
        match raw {
            Value::Boolean(b) => Ok(*b),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn to_raw(&self) -> Option<Value> {
        Some(Value::Boolean(*self))
    }
}

macro_rules! integral {
    ($($ty:ty),* $(,)?) => {$(
        impl Primitive for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn coerce(raw: &Value) -> Result<Self, CoerceError> {
                match raw {
                    Value::Integer(i) => Ok(*i as $ty),
                    Value::Float(f) => Ok(*f as $ty),
                    other => Err(mismatch::<Self>(other)),
                }
            }

            fn to_raw(&self) -> Option<Value> {
                i64::try_from(*self).ok().map(Value::Integer)
            }
        }
    )*};
}

integral!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! floating {
    ($($ty:ty),* $(,)?) => {$(
        impl Primitive for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn coerce(raw: &Value) -> Result<Self, CoerceError> {
                match raw {
                    Value::Integer(i) => Ok(*i as $ty),
                    Value::Float(f) => Ok(*f as $ty),
                    other => Err(mismatch::<Self>(other)),
                }
            }

            fn to_raw(&self) -> Option<Value> {
                Some(Value::Float(f64::from(*self)))
            }
        }
    )*};
}

floating!(f32, f64);

impl Primitive for String {
    const TYPE_NAME: &'static str = "string";

    fn coerce(raw: &Value) -> Result<Self, CoerceError> {
        Ok(match raw {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Datetime(d) => d.to_string(),
            other => other.to_string(),
        })
    }

    fn to_raw(&self) -> Option<Value> {
        Some(Value::String(self.clone()))
    }
}

impl Primitive for char {
    const TYPE_NAME: &'static str = "character";

    fn coerce(raw: &Value) -> Result<Self, CoerceError> {
        match raw {
            Value::String(s) => s.chars().next().ok_or(CoerceError::EmptyChar),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn to_raw(&self) -> Option<Value> {
        Some(Value::String(self.to_string()))
    }
}

impl<P: Primitive> Primitive for Option<P> {
    const TYPE_NAME: &'static str = P::TYPE_NAME;

    fn coerce(raw: &Value) -> Result<Self, CoerceError> {
        P::coerce(raw).map(Some)
    }

    fn to_raw(&self) -> Option<Value> {
        self.as_ref().and_then(P::to_raw)
    }
}

/// A fieldless enum stored in the document by member name.
///
/// Implement it with [`config_enum!`](crate::config_enum).
pub trait ConfigEnum: Sized + Copy + Send + Sync + 'static {
    const TYPE_NAME: &'static str;
    const MEMBERS: &'static [Self];

    fn name(&self) -> &'static str;

    /// Case-insensitive lookup by member name.
    fn from_name(name: &str) -> Option<Self> {
        Self::MEMBERS
            .iter()
            .copied()
            .find(|member| member.name().eq_ignore_ascii_case(name))
    }
}

/// Implement [`ConfigEnum`] for a fieldless enum.
///
/// ```ignore
/// config_enum!(Difficulty { Easy => "EASY", Hard => "HARD" });
/// ```
#[macro_export]
macro_rules! config_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $crate::ConfigEnum for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);
            const MEMBERS: &'static [Self] = &[$($ty::$variant),+];

            fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }
    };
}

pub fn coerce_enum<E: ConfigEnum>(raw: &Value) -> Result<E, CoerceError> {
    match raw {
        Value::String(s) => E::from_name(s).ok_or_else(|| CoerceError::UnknownVariant {
            value: s.clone(),
            enum_name: E::TYPE_NAME,
            members: E::MEMBERS.iter().map(ConfigEnum::name).collect(),
        }),
        other => Err(CoerceError::Mismatch {
            expected: E::TYPE_NAME,
            found: raw_type_name(other),
        }),
    }
}

pub fn encode_enum<E: ConfigEnum>(value: &E) -> Option<Value> {
    Some(Value::String(value.name().to_string()))
}

/// Which coercion family a [`Codec`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Primitive,
    Enum,
}

/// A decode/encode pair for one scalar type, shared by plain attributes,
/// sequence elements and mapping values.
pub struct Codec<F> {
    pub(crate) kind: ScalarKind,
    pub(crate) type_name: &'static str,
    pub(crate) decode: fn(&Value) -> Result<F, CoerceError>,
    pub(crate) encode: fn(&F) -> Option<Value>,
}

impl<F> Clone for Codec<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for Codec<F> {}

impl<F: Primitive> Codec<F> {
    pub fn primitive() -> Self {
        Self {
            kind: ScalarKind::Primitive,
            type_name: F::TYPE_NAME,
            decode: F::coerce,
            encode: F::to_raw,
        }
    }
}

impl<E: ConfigEnum> Codec<E> {
    pub fn enumeration() -> Self {
        Self {
            kind: ScalarKind::Enum,
            type_name: E::TYPE_NAME,
            decode: coerce_enum::<E>,
            encode: encode_enum::<E>,
        }
    }
}

impl<F> Codec<F> {
    pub fn decode(&self, raw: &Value) -> Result<F, CoerceError> {
        (self.decode)(raw)
    }

    pub fn encode(&self, value: &F) -> Option<Value> {
        (self.encode)(value)
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }
}
