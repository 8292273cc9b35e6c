/// Type of every non-null value in a column. The set matches the DuckDB types
/// the query engine registers tables with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Varchar,
    /// Date and time of day, microsecond precision, no time zone
    Timestamp,
    Date,
    /// Time of day, microsecond precision
    Time,
}

/// A named, typed column of a [`Table`](crate::table::Table).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    /// Unique within its table
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Column {
            name: name.into(),
            kind,
        }
    }
}

impl ColumnType {
    /// DuckDB name of the type, also used in error messages.
    pub const fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::BigInt => "bigint",
            ColumnType::Double => "double",
            ColumnType::Varchar => "varchar",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
        }
    }

    /// Merges the kinds of a column's cells into one column type; `None` marks an
    /// empty cell. Integers widen to doubles, mixed dates and times to timestamps,
    /// anything else mixed, and a column of empty cells, is varchar.
    pub fn detect<I>(types: I) -> ColumnType
    where
        I: IntoIterator<Item = Option<ColumnType>>,
    {
        types
            .into_iter()
            .flatten()
            .reduce(ColumnType::widen)
            .unwrap_or(ColumnType::Varchar)
    }

    /// Narrowest type holding values of both `self` and `other`.
    fn widen(self, other: ColumnType) -> ColumnType {
        if self == other {
            self
        } else if self.is_number() && other.is_number() {
            ColumnType::Double
        } else if self.is_datetime() && other.is_datetime() {
            ColumnType::Timestamp
        } else {
            ColumnType::Varchar
        }
    }

    /// BigInt or Double.
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, ColumnType::BigInt | ColumnType::Double)
    }

    /// Date, Timestamp or Time.
    #[inline]
    pub fn is_datetime(&self) -> bool {
        matches!(self, ColumnType::Timestamp | ColumnType::Date | ColumnType::Time)
    }

    /// Values of this type carry a calendar date.
    #[inline]
    pub fn has_date(&self) -> bool {
        matches!(self, ColumnType::Timestamp | ColumnType::Date)
    }
}

#[cfg(test)]
mod tests {
    use crate::table::column::ColumnType;
    use crate::table::column::ColumnType::*;

    #[test]
    fn detect_empty_is_varchar() {
        assert_eq!(ColumnType::detect(Vec::new()), Varchar);
        assert_eq!(ColumnType::detect(vec![None, None]), Varchar);
    }

    #[test]
    fn detect_widens_numbers() {
        assert_eq!(ColumnType::detect(vec![Some(BigInt), None, Some(BigInt)]), BigInt);
        assert_eq!(ColumnType::detect(vec![Some(BigInt), Some(Double)]), Double);
    }

    #[test]
    fn detect_date_and_time_mix_is_timestamp() {
        assert_eq!(ColumnType::detect(vec![Some(Date), Some(Date)]), Date);
        assert_eq!(ColumnType::detect(vec![Some(Date), Some(Timestamp)]), Timestamp);
        assert_eq!(ColumnType::detect(vec![Some(Time), Some(Date), Some(Date)]), Timestamp);
    }

    #[test]
    fn detect_inconsistent_is_varchar() {
        assert_eq!(ColumnType::detect(vec![Some(BigInt), Some(Date)]), Varchar);
        assert_eq!(ColumnType::detect(vec![Some(Boolean), Some(BigInt)]), Varchar);
        assert_eq!(ColumnType::detect(vec![Some(Varchar), Some(BigInt), Some(Double)]), Varchar);
    }

    #[test]
    fn type_predicates() {
        assert!(BigInt.is_number() && Double.is_number() && !Varchar.is_number());
        assert!(Time.is_datetime() && !Time.has_date());
        assert!(Timestamp.has_date());
    }
}
