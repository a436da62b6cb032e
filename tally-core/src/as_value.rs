use crate::{Error, Result, Value};
use rust_decimal::Decimal;
use std::{any, borrow::Cow};
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

/// Conversion between native Rust types and the dynamically typed [`Value`].
///
/// Anything implementing `AsValue` can be used as a criteria value or as a record
/// column, the `From<T> for Value` blanket implementation makes `.into()` work too.
///
/// ```rust
/// use tally_core::{AsValue, Value};
/// let v = 42i32.as_value();
/// assert_eq!(v, Value::Int64(42));
/// let n: i64 = AsValue::try_from_value(v).unwrap();
/// assert_eq!(n, 42);
/// ```
pub trait AsValue {
    fn as_value(self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
}

fn mismatch<T>(value: &Value) -> Error {
    Error::msg(format!(
        "Cannot convert {:?} into {}",
        value,
        any::type_name::<T>()
    ))
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::Varchar(value.into())
    }
}

macro_rules! impl_as_value_signed {
    ($($ty:ty),+) => {
        $(
            impl AsValue for $ty {
                fn as_value(self) -> Value {
                    Value::Int64(self as i64)
                }
                fn try_from_value(value: Value) -> Result<Self> {
                    value
                        .as_i64()
                        .and_then(|v| <$ty>::try_from(v).ok())
                        .ok_or_else(|| mismatch::<$ty>(&value))
                }
            }
        )+
    };
}
impl_as_value_signed!(i8, i16, i32, i64);

macro_rules! impl_as_value_unsigned {
    ($($ty:ty),+) => {
        $(
            impl AsValue for $ty {
                fn as_value(self) -> Value {
                    Value::UInt64(self as u64)
                }
                fn try_from_value(value: Value) -> Result<Self> {
                    value
                        .as_u64()
                        .and_then(|v| <$ty>::try_from(v).ok())
                        .ok_or_else(|| mismatch::<$ty>(&value))
                }
            }
        )+
    };
}
impl_as_value_unsigned!(u8, u16, u32, u64);

impl AsValue for bool {
    fn as_value(self) -> Value {
        Value::Boolean(self)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(v) => Ok(v),
            Value::Int64(v) => Ok(v != 0),
            Value::UInt64(v) => Ok(v != 0),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for f32 {
    fn as_value(self) -> Value {
        Value::Float64(self as f64)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        f64::try_from_value(value).map(|v| v as f32)
    }
}

impl AsValue for f64 {
    fn as_value(self) -> Value {
        Value::Float64(self)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float64(v) => Ok(v),
            Value::Int64(v) => Ok(v as f64),
            Value::UInt64(v) => Ok(v as f64),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for Decimal {
    fn as_value(self) -> Value {
        Value::Decimal(self)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(v) => Ok(v),
            Value::Int64(v) => Ok(v.into()),
            Value::UInt64(v) => Ok(v.into()),
            Value::Float64(v) => {
                Decimal::try_from(v).map_err(|e| Error::new(e).context(mismatch::<Self>(&value)))
            }
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for String {
    fn as_value(self) -> Value {
        Value::Varchar(self.into())
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varchar(v) => Ok(v.into_owned()),
            Value::Blob(v) => String::from_utf8(v.into_vec())
                .map_err(|e| Error::new(e).context("Cannot convert a Blob into String")),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for Cow<'static, str> {
    fn as_value(self) -> Value {
        Value::Varchar(self)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        String::try_from_value(value).map(Into::into)
    }
}

impl AsValue for Box<[u8]> {
    fn as_value(self) -> Value {
        Value::Blob(self)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(v) => Ok(v),
            Value::Varchar(v) => Ok(v.into_owned().into_bytes().into()),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

macro_rules! impl_as_value_plain {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl AsValue for $ty {
                fn as_value(self) -> Value {
                    Value::$variant(self)
                }
                fn try_from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        _ => Err(mismatch::<Self>(&value)),
                    }
                }
            }
        )+
    };
}
impl_as_value_plain!(
    Date => Date,
    PrimitiveDateTime => Timestamp,
    OffsetDateTime => TimestampWithTimezone,
    Uuid => Uuid,
);

impl<T: AsValue> AsValue for Option<T> {
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => Value::Null,
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::try_from_value(value).map(Some)
        }
    }
}

impl<T: AsValue> AsValue for Vec<T> {
    fn as_value(self) -> Value {
        Value::List(self.into_iter().map(AsValue::as_value).collect())
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(v) => v.into_iter().map(T::try_from_value).collect(),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}
