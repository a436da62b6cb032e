use crate::{DataError, Error, Result, Value};
use std::{borrow::Cow, str::FromStr};

/// Reserved column written by insert operations with the generated identifier.
pub const ID_FIELD: &str = "id";

macro_rules! impl_fields {
    ($name:ident) => {
        impl $name {
            pub fn new() -> Self {
                Self::default()
            }
            /// Builder style [`Self::set`].
            pub fn with(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
                self.set(name, value);
                self
            }
            /// Set the value of a field, an existing field keeps its position.
            pub fn set(&mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> &mut Self {
                let name = name.into();
                let value = value.into();
                match self.fields.iter_mut().find(|(k, _)| *k == name) {
                    Some((_, v)) => *v = value,
                    None => self.fields.push((name, value)),
                }
                self
            }
            pub fn get(&self, name: &str) -> Option<&Value> {
                self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            pub fn len(&self) -> usize {
                self.fields.len()
            }
            pub fn is_empty(&self) -> bool {
                self.fields.is_empty()
            }
            pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &Value)> {
                self.fields.iter().map(|(k, v)| (k.as_ref(), v))
            }
            pub fn names(&self) -> impl ExactSizeIterator<Item = &str> {
                self.fields.iter().map(|(k, _)| k.as_ref())
            }
            pub fn values(&self) -> impl ExactSizeIterator<Item = &Value> {
                self.fields.iter().map(|(_, v)| v)
            }
        }

        impl<K, V> FromIterator<(K, V)> for $name
        where
            K: Into<Cow<'static, str>>,
            V: Into<Value>,
        {
            fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
                let mut result = Self::default();
                for (k, v) in iter {
                    result.set(k, v);
                }
                result
            }
        }

        impl<const N: usize> From<[(&'static str, Value); N]> for $name {
            fn from(value: [(&'static str, Value); N]) -> Self {
                value.into_iter().collect()
            }
        }

        impl<'a> IntoIterator for &'a $name {
            type Item = (&'a str, &'a Value);
            type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a Value)> + 'a>;
            fn into_iter(self) -> Self::IntoIter {
                Box::new(self.iter())
            }
        }
    };
}

/// Ordered field constraints, AND-combined into a WHERE clause in insertion order.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Criteria {
    fields: Vec<(Cow<'static, str>, Value)>,
}
impl_fields!(Criteria);

impl Criteria {
    /// Criteria matching the reserved identifier column.
    pub fn by_id(id: impl Into<Value>) -> Self {
        Self::new().with(ID_FIELD, id)
    }
}

/// Ordered columns of a row to insert or update.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(Cow<'static, str>, Value)>,
}
impl_fields!(Record);

impl Record {
    pub fn id(&self) -> Option<&Value> {
        self.get(ID_FIELD)
    }
    pub fn set_id(&mut self, id: impl Into<Value>) -> &mut Self {
        self.set(ID_FIELD, id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

impl FromStr for Order {
    type Err = Error;
    fn from_str(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("asc") {
            Ok(Order::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Ok(Order::Desc)
        } else {
            Err(DataError::InvalidOrder(value.into()).into())
        }
    }
}

/// Sort order, each entry is a column and its direction.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    fields: Vec<(Cow<'static, str>, Order)>,
}

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }
    /// Build from textual directions, fails on the first one that is neither ASC nor DESC
    /// (case insensitive).
    pub fn parse<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Cow<'static, str>>,
        V: AsRef<str>,
    {
        entries
            .into_iter()
            .try_fold(Self::default(), |result, (name, order)| -> Result<Self> {
                Ok(result.by(name, order.as_ref().parse()?))
            })
    }
    pub fn by(mut self, name: impl Into<Cow<'static, str>>, order: Order) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = order,
            None => self.fields.push((name, order)),
        }
        self
    }
    pub fn asc(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.by(name, Order::Asc)
    }
    pub fn desc(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.by(name, Order::Desc)
    }
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, Order)> {
        self.fields.iter().map(|(k, v)| (k.as_ref(), *v))
    }
}

/// LIMIT and OFFSET, only meaningful together.
///
/// Both are unsigned, a negative limit or offset is rejected by the type instead of being sent
/// to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
}

impl Pagination {
    pub const fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }
    /// Partial pagination (only one of the two) means no pagination.
    pub fn from_parts(limit: Option<u64>, offset: Option<u64>) -> Option<Self> {
        Some(Self::new(limit?, offset?))
    }
}
