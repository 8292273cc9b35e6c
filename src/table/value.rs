use crate::table::column::ColumnType;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;

/// A single typed cell of a [`Table`](crate::table::Table).
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    BigInt(i64),
    Double(f64),
    Varchar(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Time(NaiveTime),
}

impl Value {
    /// Returns the column type this value belongs to, or `None` for null.
    pub fn kind(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::BigInt(_) => Some(ColumnType::BigInt),
            Value::Double(_) => Some(ColumnType::Double),
            Value::Varchar(_) => Some(ColumnType::Varchar),
            Value::Date(_) => Some(ColumnType::Date),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Time(_) => Some(ColumnType::Time),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(value) => Some(value),
            _ => None,
        }
    }

    /// Calendar date of a date or timestamp value.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(date) => Some(*date),
            Value::Timestamp(datetime) => Some(datetime.date()),
            _ => None,
        }
    }

    /// Orders two values of the same column. Null ranks lowest; values of
    /// different kinds compare equal.
    pub fn rank(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::BigInt(a), Value::BigInt(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::BigInt(a), Value::Double(b)) => (*a as f64).total_cmp(b),
            (Value::Double(a), Value::BigInt(b)) => a.total_cmp(&(*b as f64)),
            (Value::Varchar(a), Value::Varchar(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            // Bit pattern equality keeps NaN equal to itself for deduplication
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Varchar(a), Value::Varchar(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => (),
            Value::Boolean(value) => value.hash(state),
            Value::BigInt(value) => value.hash(state),
            Value::Double(value) => value.to_bits().hash(state),
            Value::Varchar(value) => value.hash(state),
            Value::Date(value) => value.hash(state),
            Value::Timestamp(value) => value.hash(state),
            Value::Time(value) => value.hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::BigInt(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Varchar(value) => f.write_str(value),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Time(value) => write!(f, "{}", value.format("%H:%M:%S%.f")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::BigInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Varchar(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Value::Time(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::Value;
    use chrono::NaiveDate;
    use std::cmp::Ordering;
    use std::collections::HashSet;

    #[test]
    fn nan_equals_itself() {
        let mut set = HashSet::new();
        set.insert(Value::Double(f64::NAN));
        set.insert(Value::Double(f64::NAN));
        assert_eq!(set.len(), 1);
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
    }

    #[test]
    fn different_kinds_are_distinct() {
        assert_ne!(Value::BigInt(1), Value::Double(1.0));
        assert_ne!(Value::Varchar("1".into()), Value::BigInt(1));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn null_ranks_lowest() {
        assert_eq!(Value::Null.rank(&Value::BigInt(i64::MIN)), Ordering::Less);
        assert_eq!(Value::BigInt(2).rank(&Value::BigInt(10)), Ordering::Less);
        let early = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let late = Value::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        assert_eq!(late.rank(&early), Ordering::Greater);
    }

    #[test]
    fn display() {
        let date = NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();
        assert_eq!(Value::Date(date).to_string(), "2020-02-29");
        assert_eq!(Value::Timestamp(date.and_hms_opt(8, 5, 0).unwrap()).to_string(), "2020-02-29 08:05:00");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Double(1.5).to_string(), "1.5");
    }
}
