//! Typed parameter values.
//!
//! Every event parameter is one of a small set of scalar shapes. Named
//! enumerations from provider code are stored as their underlying integer;
//! readers ask for a concrete integer width and the value is sign- or
//! zero-extended to fit, failing when it cannot.

use crate::error::{EventError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single typed parameter value carried by a [`TraceEvent`](crate::TraceEvent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum EventValue {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f32),
    Double(f64),
    Str(String),
    Guid(Uuid),
}

macro_rules! signed_read {
    ($name:ident, $ty:ty) => {
        /// Reads the value as the named signed width, extending or failing.
        pub fn $name(&self) -> Result<$ty> {
            let wide = self.as_i64()?;
            <$ty>::try_from(wide).map_err(|_| {
                EventError::ValueOutOfRange(format!(
                    "{} does not fit in {}",
                    wide,
                    stringify!($ty)
                ))
            })
        }
    };
}

macro_rules! unsigned_read {
    ($name:ident, $ty:ty) => {
        /// Reads the value as the named unsigned width, extending or failing.
        pub fn $name(&self) -> Result<$ty> {
            let wide = self.as_u64()?;
            <$ty>::try_from(wide).map_err(|_| {
                EventError::ValueOutOfRange(format!(
                    "{} does not fit in {}",
                    wide,
                    stringify!($ty)
                ))
            })
        }
    };
}

impl EventValue {
    /// Widest signed read. Unsigned storage converts when representable.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            EventValue::Signed(v) => Ok(*v),
            EventValue::Unsigned(v) => i64::try_from(*v).map_err(|_| {
                EventError::ValueOutOfRange(format!("{} does not fit in i64", v))
            }),
            other => Err(EventError::InvalidArgument(format!(
                "parameter of type {} is not an integer",
                other.type_name()
            ))),
        }
    }

    /// Widest unsigned read. Negative signed storage is rejected.
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            EventValue::Unsigned(v) => Ok(*v),
            EventValue::Signed(v) => u64::try_from(*v).map_err(|_| {
                EventError::ValueOutOfRange(format!("{} does not fit in u64", v))
            }),
            other => Err(EventError::InvalidArgument(format!(
                "parameter of type {} is not an integer",
                other.type_name()
            ))),
        }
    }

    signed_read!(as_i8, i8);
    signed_read!(as_i16, i16);
    signed_read!(as_i32, i32);
    unsigned_read!(as_u8, u8);
    unsigned_read!(as_u16, u16);
    unsigned_read!(as_u32, u32);

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            EventValue::Bool(v) => Ok(*v),
            other => Err(EventError::InvalidArgument(format!(
                "parameter of type {} is not a boolean",
                other.type_name()
            ))),
        }
    }

    /// Floating-point read; single precision widens losslessly.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            EventValue::Float(v) => Ok(f64::from(*v)),
            EventValue::Double(v) => Ok(*v),
            other => Err(EventError::InvalidArgument(format!(
                "parameter of type {} is not floating point",
                other.type_name()
            ))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            EventValue::Str(v) => Ok(v),
            other => Err(EventError::InvalidArgument(format!(
                "parameter of type {} is not a string",
                other.type_name()
            ))),
        }
    }

    pub fn as_guid(&self) -> Result<Uuid> {
        match self {
            EventValue::Guid(v) => Ok(*v),
            other => Err(EventError::InvalidArgument(format!(
                "parameter of type {} is not a GUID",
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            EventValue::Bool(_) => "bool",
            EventValue::Signed(_) => "signed",
            EventValue::Unsigned(_) => "unsigned",
            EventValue::Float(_) => "float",
            EventValue::Double(_) => "double",
            EventValue::Str(_) => "string",
            EventValue::Guid(_) => "guid",
        }
    }
}

/// Invariant-locale rendering used by the text line format. Strings render
/// raw here; quoting and escaping are the formatter's concern.
impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Bool(true) => write!(f, "True"),
            EventValue::Bool(false) => write!(f, "False"),
            EventValue::Signed(v) => write!(f, "{}", v),
            EventValue::Unsigned(v) => write!(f, "{}", v),
            EventValue::Float(v) => write!(f, "{}", v),
            EventValue::Double(v) => write!(f, "{}", v),
            EventValue::Str(v) => write!(f, "{}", v),
            EventValue::Guid(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for EventValue {
    fn from(v: bool) -> Self {
        EventValue::Bool(v)
    }
}

macro_rules! from_signed {
    ($($ty:ty),*) => {
        $(impl From<$ty> for EventValue {
            fn from(v: $ty) -> Self {
                EventValue::Signed(v as i64)
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($ty:ty),*) => {
        $(impl From<$ty> for EventValue {
            fn from(v: $ty) -> Self {
                EventValue::Unsigned(v as u64)
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64);
from_unsigned!(u8, u16, u32, u64);

impl From<f32> for EventValue {
    fn from(v: f32) -> Self {
        EventValue::Float(v)
    }
}

impl From<f64> for EventValue {
    fn from(v: f64) -> Self {
        EventValue::Double(v)
    }
}

impl From<&str> for EventValue {
    fn from(v: &str) -> Self {
        EventValue::Str(v.to_string())
    }
}

impl From<String> for EventValue {
    fn from(v: String) -> Self {
        EventValue::Str(v)
    }
}

impl From<Uuid> for EventValue {
    fn from(v: Uuid) -> Self {
        EventValue::Guid(v)
    }
}
