use mysql_async::{
    Column, FromRowError,
    consts::{ColumnFlags, ColumnType},
};
use rust_decimal::Decimal;
use std::str::{self, FromStr};
use tally_core::{RowLabeled, RowNames, Value};
use time::{
    Date, Month, PrimitiveDateTime, Time, format_description::BorrowedFormatItem,
    macros::format_description,
};

/// Collation id of binary strings and blobs.
const BINARY_COLLATION: u16 = 63;

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const TIMESTAMP_SUBSECOND_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]");

pub(crate) struct RowWrap(pub(crate) RowLabeled);

impl mysql_async::prelude::FromRow for RowWrap {
    fn from_row_opt(row: mysql_async::Row) -> Result<Self, FromRowError>
    where
        Self: Sized,
    {
        let columns = row.columns();
        let names: RowNames = columns
            .iter()
            .map(|v| v.name_str().into_owned())
            .collect();
        let values = row
            .unwrap()
            .into_iter()
            .zip(columns.iter())
            .map(|(value, column)| decode(value, column))
            .collect();
        Ok(RowWrap(RowLabeled::new(names, values)))
    }
}

/// Values that cannot be decoded with the column type are kept as text (or bytes).
pub(crate) fn decode(value: mysql_async::Value, column: &Column) -> Value {
    type MySQLValue = mysql_async::Value;
    match value {
        MySQLValue::NULL => Value::Null,
        MySQLValue::Bytes(v) => decode_text(v, column),
        MySQLValue::Int(v) => Value::Int64(v),
        MySQLValue::UInt(v) => Value::UInt64(v),
        MySQLValue::Float(v) => Value::Float64(v as f64),
        MySQLValue::Double(v) => Value::Float64(v),
        MySQLValue::Date(year, month, day, hour, minute, second, micro) => {
            let date = Month::try_from(month)
                .ok()
                .and_then(|month| Date::from_calendar_date(year as _, month, day).ok());
            let time = Time::from_hms_micro(hour, minute, second, micro).ok();
            match (date, time) {
                (Some(date), Some(time)) => Value::Timestamp(PrimitiveDateTime::new(date, time)),
                _ => Value::Null,
            }
        }
        MySQLValue::Time(negative, days, hours, minutes, seconds, micro) => {
            let hours = days * 24 + hours as u32;
            let mut out = format!(
                "{}{:02}:{:02}:{:02}",
                if negative { "-" } else { "" },
                hours,
                minutes,
                seconds
            );
            if micro != 0 {
                out.push_str(&format!(".{:06}", micro));
            }
            Value::Varchar(out.into())
        }
    }
}

fn decode_text(bytes: Vec<u8>, column: &Column) -> Value {
    let unsigned = column.flags().contains(ColumnFlags::UNSIGNED_FLAG);
    let text = || str::from_utf8(&bytes).ok();
    let decoded = match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            if unsigned {
                atoi::atoi::<u64>(&bytes).map(Value::UInt64)
            } else {
                atoi::atoi::<i64>(&bytes).map(Value::Int64)
            }
        }
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            fast_float::parse::<f64, _>(&bytes).ok().map(Value::Float64)
        }
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => text()
            .and_then(|v| Decimal::from_str(v).ok())
            .map(Value::Decimal),
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => text()
            .and_then(|v| Date::parse(v, DATE_FORMAT).ok())
            .map(Value::Date),
        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => text()
            .and_then(|v| {
                PrimitiveDateTime::parse(v, TIMESTAMP_SUBSECOND_FORMAT)
                    .or_else(|_| PrimitiveDateTime::parse(v, TIMESTAMP_FORMAT))
                    .ok()
            })
            .map(Value::Timestamp),
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_BIT
            if column.character_set() == BINARY_COLLATION =>
        {
            return Value::Blob(bytes.into());
        }
        _ => None,
    };
    if let Some(value) = decoded {
        return value;
    }
    match String::from_utf8(bytes) {
        Ok(v) => Value::Varchar(v.into()),
        Err(e) => Value::Blob(e.into_bytes().into()),
    }
}
