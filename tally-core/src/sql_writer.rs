use crate::{Criteria, OrderBy, Pagination, Record, SharedValue, Value, lock_shared, separated_by};
use serde_json::{Map, Number, Value as Json};
use std::{
    fmt::Write,
    sync::{Arc, Mutex},
};
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Nesting level after which structured values are cut when serialized.
pub const MAX_JSON_DEPTH: usize = 128;

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}
macro_rules! write_float {
    ($this:ident, $out:ident, $value:expr) => {{
        let value: f64 = $value;
        if !value.is_finite() {
            $this.write_value_string(
                $out,
                if value.is_nan() {
                    "NaN"
                } else if value.is_sign_negative() {
                    "-Infinity"
                } else {
                    "Infinity"
                },
            );
        } else if value.fract() == 0.0 && value.abs() < 1e15 {
            write_integer!($out, value as i64);
        } else {
            let mut buffer = ryu::Buffer::new();
            $out.push_str(buffer.format_finite(value));
        }
    }};
}

/// Renders statements and literals for a SQL dialect.
///
/// Every method has a default implementation, a driver overrides only what its dialect
/// does differently (usually identifier quoting and string escaping). Nothing here fails:
/// criteria, order and pagination are validated when they are constructed.
pub trait SqlWriter: Send + Sync {
    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', r#""""#);
        out.push('"');
    }

    /// Write a value as a literal that can be embedded verbatim in the statement.
    fn write_value(&self, out: &mut String, value: &Value) {
        match value {
            Value::Null => self.write_value_none(out),
            Value::Boolean(v) => self.write_value_bool(out, *v),
            Value::Int64(v) => write_integer!(out, *v),
            Value::UInt64(v) => write_integer!(out, *v),
            Value::Float64(v) => write_float!(self, out, *v),
            Value::Decimal(v) => drop(write!(out, "{}", v)),
            Value::Varchar(v) => self.write_value_string(out, v),
            Value::Blob(v) => self.write_value_blob(out, v),
            Value::Date(v) => self.write_value_timestamp(out, &v.midnight()),
            Value::Timestamp(v) => self.write_value_timestamp(out, v),
            Value::TimestampWithTimezone(v) => self.write_value_timestamp(out, &as_utc(v)),
            Value::Uuid(v) => self.write_value_string(out, &v.to_string()),
            Value::List(..) | Value::Map(..) | Value::Shared(..) => {
                self.write_value_json(out, value)
            }
        }
    }

    fn write_value_none(&self, out: &mut String) {
        out.push_str("NULL")
    }

    fn write_value_bool(&self, out: &mut String, value: bool) {
        out.push_str(["false", "true"][value as usize])
    }

    fn write_value_string(&self, out: &mut String, value: &str) {
        out.push('\'');
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == '\'' {
                out.push_str(&value[position..i]);
                out.push_str("''");
                position = i + 1;
            } else if c == '\n' {
                out.push_str(&value[position..i]);
                out.push_str("\\n");
                position = i + 1;
            }
        }
        out.push_str(&value[position..]);
        out.push('\'');
    }

    fn write_value_blob(&self, out: &mut String, value: &[u8]) {
        out.push_str("X'");
        out.push_str(&hex::encode_upper(value));
        out.push('\'');
    }

    /// Timestamps are written as `'YYYY-MM-DD HH:mm:ss'`, dates as their midnight.
    fn write_value_timestamp(&self, out: &mut String, value: &PrimitiveDateTime) {
        let mut timestamp = String::with_capacity(19);
        write_timestamp(&mut timestamp, value);
        self.write_value_string(out, &timestamp);
    }

    /// Serialize a structured value into JSON and write it as a string literal.
    fn write_value_json(&self, out: &mut String, value: &Value) {
        self.write_value_string(out, &to_json(value).to_string());
    }

    fn write_where(&self, out: &mut String, criteria: &Criteria) {
        if criteria.is_empty() {
            return;
        }
        out.push_str(" WHERE ");
        separated_by(
            out,
            criteria.iter(),
            |out, (name, value)| {
                self.write_identifier_quoted(out, name);
                if let Value::Shared(shared) = value {
                    // Items are copied out so writing them never locks the list twice
                    let items = match &*lock_shared(shared) {
                        Value::List(items) => Some(items.clone()),
                        _ => None,
                    };
                    if let Some(items) = items {
                        return self.write_in(out, &items);
                    }
                }
                match value {
                    Value::Null => out.push_str(" IS NULL"),
                    Value::List(items) => self.write_in(out, items),
                    _ if value.is_number() => {
                        out.push_str(" = ");
                        self.write_value(out, value);
                    }
                    _ => {
                        out.push_str(" LIKE ");
                        self.write_value(out, value);
                    }
                }
            },
            " AND ",
        );
    }

    fn write_in(&self, out: &mut String, items: &[Value]) {
        out.push_str(" IN (");
        separated_by(out, items, |out, v| self.write_value(out, v), ", ");
        out.push(')');
    }

    fn write_order_by(&self, out: &mut String, order_by: &OrderBy) {
        if order_by.is_empty() {
            return;
        }
        out.push_str(" ORDER BY ");
        separated_by(
            out,
            order_by.iter(),
            |out, (name, order)| {
                self.write_identifier_quoted(out, name);
                out.push(' ');
                out.push_str(order.as_str());
            },
            ", ",
        );
    }

    fn write_pagination(&self, out: &mut String, pagination: Option<Pagination>) {
        if let Some(Pagination { limit, offset }) = pagination {
            out.push_str(" LIMIT ");
            write_integer!(out, limit);
            out.push_str(" OFFSET ");
            write_integer!(out, offset);
        }
    }

    fn write_select(
        &self,
        out: &mut String,
        criteria: &Criteria,
        order_by: &OrderBy,
        pagination: Option<Pagination>,
        table: &str,
    ) {
        out.push_str("SELECT * FROM ");
        self.write_identifier_quoted(out, table);
        self.write_where(out, criteria);
        self.write_order_by(out, order_by);
        self.write_pagination(out, pagination);
    }

    fn write_count(&self, out: &mut String, criteria: &Criteria, table: &str) {
        out.push_str("SELECT COUNT(*) AS count FROM ");
        self.write_identifier_quoted(out, table);
        self.write_where(out, criteria);
    }

    fn write_insert(&self, out: &mut String, record: &Record, table: &str) {
        out.push_str("INSERT INTO ");
        self.write_identifier_quoted(out, table);
        out.push_str(" (");
        separated_by(
            out,
            record.names(),
            |out, v| self.write_identifier_quoted(out, v),
            ", ",
        );
        out.push_str(") VALUES (");
        separated_by(out, record.values(), |out, v| self.write_value(out, v), ", ");
        out.push(')');
    }

    fn write_update(&self, out: &mut String, criteria: &Criteria, record: &Record, table: &str) {
        out.push_str("UPDATE ");
        self.write_identifier_quoted(out, table);
        out.push_str(" SET ");
        separated_by(
            out,
            record.iter(),
            |out, (name, value)| {
                self.write_identifier_quoted(out, name);
                out.push_str(" = ");
                self.write_value(out, value);
            },
            ", ",
        );
        self.write_where(out, criteria);
    }

    fn write_delete(&self, out: &mut String, criteria: &Criteria, table: &str) {
        out.push_str("DELETE FROM ");
        self.write_identifier_quoted(out, table);
        self.write_where(out, criteria);
    }

    fn sanitize(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, value);
        out
    }

    fn escape_identifier(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 2);
        self.write_identifier_quoted(&mut out, name);
        out
    }

    fn build_select(
        &self,
        criteria: &Criteria,
        order_by: &OrderBy,
        pagination: Option<Pagination>,
        table: &str,
    ) -> String {
        let mut out = String::with_capacity(128);
        self.write_select(&mut out, criteria, order_by, pagination, table);
        out
    }

    fn build_count(&self, criteria: &Criteria, table: &str) -> String {
        let mut out = String::with_capacity(128);
        self.write_count(&mut out, criteria, table);
        out
    }

    fn build_insert(&self, record: &Record, table: &str) -> String {
        let mut out = String::with_capacity(128);
        self.write_insert(&mut out, record, table);
        out
    }

    fn build_update(&self, criteria: &Criteria, record: &Record, table: &str) -> String {
        let mut out = String::with_capacity(128);
        self.write_update(&mut out, criteria, record, table);
        out
    }

    fn build_delete(&self, criteria: &Criteria, table: &str) -> String {
        let mut out = String::with_capacity(64);
        self.write_delete(&mut out, criteria, table);
        out
    }
}

fn write_date(out: &mut String, value: &Date) {
    let _ = write!(
        out,
        "{:04}-{:02}-{:02}",
        value.year(),
        value.month() as u8,
        value.day()
    );
}

pub fn write_timestamp(out: &mut String, value: &PrimitiveDateTime) {
    write_date(out, &value.date());
    let _ = write!(
        out,
        " {:02}:{:02}:{:02}",
        value.hour(),
        value.minute(),
        value.second()
    );
}

fn as_utc(value: &OffsetDateTime) -> PrimitiveDateTime {
    let value = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(value.date(), value.time())
}

/// Convert a value into JSON, replacing any reference cycle with a `"[Circular ~path]"`
/// marker. Keys keep their insertion order.
pub fn to_json(value: &Value) -> Json {
    JsonEncoder::default().encode(value)
}

#[derive(Default)]
struct JsonEncoder {
    /// Shared values currently being encoded with the length of `path` where they start.
    ancestors: Vec<(*const Mutex<Value>, usize)>,
    path: Vec<String>,
}

impl JsonEncoder {
    fn encode(&mut self, value: &Value) -> Json {
        match value {
            Value::Null => Json::Null,
            Value::Boolean(v) => Json::Bool(*v),
            Value::Int64(v) => Json::Number((*v).into()),
            Value::UInt64(v) => Json::Number((*v).into()),
            Value::Float64(v) => Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Value::Decimal(v) => Json::String(v.to_string()),
            Value::Varchar(v) => Json::String(v.to_string()),
            Value::Blob(v) => Json::String(hex::encode(v)),
            Value::Date(v) => {
                let mut out = String::with_capacity(19);
                write_timestamp(&mut out, &v.midnight());
                Json::String(out)
            }
            Value::Timestamp(v) => {
                let mut out = String::with_capacity(19);
                write_timestamp(&mut out, v);
                Json::String(out)
            }
            Value::TimestampWithTimezone(v) => {
                let mut out = String::with_capacity(19);
                write_timestamp(&mut out, &as_utc(v));
                Json::String(out)
            }
            Value::Uuid(v) => Json::String(v.to_string()),
            _ if self.path.len() + self.ancestors.len() >= MAX_JSON_DEPTH => Json::String(format!(
                "[Truncated ~{}]",
                self.path.iter().fold(String::new(), |acc, v| acc + "." + v)
            )),
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.nested(i.to_string(), v))
                    .collect(),
            ),
            Value::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let v = self.nested(k.to_string(), v);
                    map.insert(k.to_string(), v);
                }
                Json::Object(map)
            }
            Value::Shared(shared) => self.shared(shared),
        }
    }

    fn nested(&mut self, key: String, value: &Value) -> Json {
        self.path.push(key);
        let result = self.encode(value);
        self.path.pop();
        result
    }

    fn shared(&mut self, shared: &SharedValue) -> Json {
        let pointer: *const Mutex<Value> = Arc::as_ptr(shared);
        if let Some(&(_, depth)) = self.ancestors.iter().find(|(p, _)| *p == pointer) {
            // Already locked up in the stack, locking it again would deadlock
            return Json::String(format!(
                "[Circular ~{}]",
                self.path[..depth]
                    .iter()
                    .fold(String::new(), |acc, v| acc + "." + v)
            ));
        }
        self.ancestors.push((pointer, self.path.len()));
        let result = {
            let value = lock_shared(shared);
            self.encode(&value)
        };
        self.ancestors.pop();
        result
    }
}
