use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::{
    borrow::Cow,
    fmt::{self, Debug},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

/// Shared, interior mutable value.
///
/// This is the only way a [`Value`] can reference itself, either directly or through
/// one of its children. Writers must be prepared to find cycles inside it.
pub type SharedValue = Arc<Mutex<Value>>;

/// Dynamically typed value used for criteria, records and decoded rows.
#[derive(Default, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Decimal(Decimal),
    Varchar(Cow<'static, str>),
    Blob(Box<[u8]>),
    Date(Date),
    Timestamp(PrimitiveDateTime),
    TimestampWithTimezone(OffsetDateTime),
    Uuid(Uuid),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Ordered record, keys are kept in insertion order.
    Map(Vec<(Cow<'static, str>, Value)>),
    Shared(SharedValue),
}

impl Value {
    pub fn shared(value: Value) -> Self {
        Value::Shared(Arc::new(Mutex::new(value)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric values are compared with `=`, everything else goes through `LIKE` or `IN`.
    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Int64(..) | Value::UInt64(..) | Value::Float64(..) | Value::Decimal(..)
        )
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            Value::Float64(v) if v.fract() == 0.0 => v.to_i64(),
            Value::Decimal(v) if v.fract().is_zero() => v.to_i64(),
            Value::Boolean(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt64(v) => Some(*v),
            _ => self.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(v) => Some(v.as_ref()),
            _ => None,
        }
    }
}

/// Locks a shared value, a poisoned mutex still yields the last written value.
pub(crate) fn lock_shared(value: &SharedValue) -> MutexGuard<'_, Value> {
    value.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::UInt64(l), Self::UInt64(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l), Self::Decimal(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::TimestampWithTimezone(l), Self::TimestampWithTimezone(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            (Self::List(l), Self::List(r)) => l == r,
            (Self::Map(l), Self::Map(r)) => l == r,
            // Identity, comparing the content could recurse forever
            (Self::Shared(l), Self::Shared(r)) => Arc::ptr_eq(l, r),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Boolean(v) => f.debug_tuple("Boolean").field(v).finish(),
            Value::Int64(v) => f.debug_tuple("Int64").field(v).finish(),
            Value::UInt64(v) => f.debug_tuple("UInt64").field(v).finish(),
            Value::Float64(v) => f.debug_tuple("Float64").field(v).finish(),
            Value::Decimal(v) => f.debug_tuple("Decimal").field(v).finish(),
            Value::Varchar(v) => f.debug_tuple("Varchar").field(v).finish(),
            Value::Blob(v) => f.debug_tuple("Blob").field(v).finish(),
            Value::Date(v) => f.debug_tuple("Date").field(v).finish(),
            Value::Timestamp(v) => f.debug_tuple("Timestamp").field(v).finish(),
            Value::TimestampWithTimezone(v) => {
                f.debug_tuple("TimestampWithTimezone").field(v).finish()
            }
            Value::Uuid(v) => f.debug_tuple("Uuid").field(v).finish(),
            Value::List(v) => f.debug_tuple("List").field(v).finish(),
            Value::Map(v) => f.debug_tuple("Map").field(v).finish(),
            // Never print the content, it might contain itself
            Value::Shared(v) => write!(f, "Shared({:p})", Arc::as_ptr(v)),
        }
    }
}
