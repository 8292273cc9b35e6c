use crate::spreadsheet::reference::index_to_reference;
use crate::table::ColumnType;
use crate::table::Value;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Epoch of the serial numbers a workbook stores dates as.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum DateSystem {
    /// Serial 1 is 1900-01-01
    #[default]
    Excel1900,
    /// Serial 0 is 1904-01-01 (`<workbookPr date1904="1"/>`)
    Excel1904,
}

impl DateSystem {
    pub(crate) fn from_1904_flag(is_1904: bool) -> Self {
        if is_1904 {
            DateSystem::Excel1904
        } else {
            DateSystem::Excel1900
        }
    }

    /// Days since 1970-01-01 of a whole serial day number, `None` on overflow.
    fn unix_days(self, serial: i64) -> Option<i64> {
        match self {
            DateSystem::Excel1904 => serial.checked_sub(24_107),
            // Serial 60 is the nonexistent 1900-02-29 kept for Lotus 1-2-3 compatibility
            DateSystem::Excel1900 if serial >= 60 => serial.checked_sub(25_569),
            DateSystem::Excel1900 => serial.checked_sub(25_568),
        }
    }
}

/// What a date-formatted number displays.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SerialKind {
    Date,
    Time,
    DateTime,
}

/// How the raw text of a cell is to be read.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// `1`/`0` of a `t="b"` workbook cell
    Boolean,
    /// `true`/`false` in any case, from delimited text
    BooleanText,
    Number,
    /// Number shown through a date or time format
    Serial(SerialKind, DateSystem),
    /// ISO 8601 text of a `t="d"` cell
    IsoDateTime,
    InlineString,
    /// Index into the shared string table, resolved while reading
    SharedString,
    /// Error literal such as `#N/A`
    Error,
}

impl CellType {
    /// Date and time formats among the built-in number formats, which workbooks
    /// reference by id without defining them.
    pub(crate) fn builtin_number_format(id: &str, system: DateSystem) -> Option<Self> {
        let kind = match id {
            "14" | "15" | "16" | "17" => SerialKind::Date,
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => SerialKind::Time,
            "22" => SerialKind::DateTime,
            _ => return None,
        };
        Some(CellType::Serial(kind, system))
    }

    /// Classifies a custom format code by its date (`y`, `d`) and time (`h`, `s`)
    /// tokens. Quoted literals, `[...]` sections, escaped characters and the
    /// character after `_` or `*` are not tokens. `m` alone is ambiguous and ignored.
    pub(crate) fn custom_number_format(format: &str, system: DateSystem) -> Self {
        let mut has_date = false;
        let mut has_time = false;
        let mut characters = format.chars();
        while let Some(character) = characters.next() {
            match character {
                '\\' | '_' | '*' => {
                    characters.next();
                }
                '"' => {
                    characters.find(|c| *c == '"');
                }
                '[' => {
                    characters.find(|c| *c == ']');
                }
                'y' | 'Y' | 'd' | 'D' => has_date = true,
                'h' | 'H' | 's' | 'S' => has_time = true,
                _ => (),
            }
        }

        let kind = match (has_date, has_time) {
            (true, true) => SerialKind::DateTime,
            (true, false) => SerialKind::Date,
            (false, true) => SerialKind::Time,
            (false, false) => return CellType::Number,
        };
        CellType::Serial(kind, system)
    }
}

/// One non-empty cell as read from the source, 0-based position.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Cell {
    pub(crate) row: usize,
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    pub(crate) value: String,
}

impl Cell {
    /// A1-style reference of the cell
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// The column type this cell alone would produce.
    pub(crate) fn column_type(&self) -> Option<ColumnType> {
        match self.kind {
            CellType::Empty => None,
            CellType::Boolean | CellType::BooleanText => Some(ColumnType::Boolean),
            CellType::Number if self.integer().is_some() => Some(ColumnType::BigInt),
            CellType::Number => Some(ColumnType::Double),
            CellType::Serial(SerialKind::Date, _) => Some(ColumnType::Date),
            CellType::Serial(SerialKind::Time, _) => Some(ColumnType::Time),
            CellType::Serial(SerialKind::DateTime, _) => Some(ColumnType::Timestamp),
            CellType::IsoDateTime if self.value.contains('T') => Some(ColumnType::Timestamp),
            CellType::IsoDateTime => Some(ColumnType::Date),
            CellType::InlineString | CellType::SharedString | CellType::Error => Some(ColumnType::Varchar),
        }
    }

    /// Converts the cell to a value of its column's type. The column type comes
    /// from [`ColumnType::detect`], so it is either this cell's own type or a
    /// widening of it.
    pub(crate) fn to_value(&self, kind: ColumnType) -> Result<Value, String> {
        let value = match kind {
            ColumnType::Boolean => Value::Boolean(self.boolean()),
            ColumnType::BigInt => Value::BigInt(self.integer().ok_or_else(|| self.invalid("bigint"))?),
            ColumnType::Double => Value::Double(self.number()?),
            ColumnType::Varchar => Value::Varchar(self.to_text()?),
            ColumnType::Date => Value::Date(self.date()?),
            ColumnType::Time => Value::Time(self.time()?),
            ColumnType::Timestamp => Value::Timestamp(self.datetime()?),
        };
        Ok(value)
    }

    /// Renders the cell as text the way the spreadsheet would show it. Text
    /// booleans keep their spelling.
    pub(crate) fn to_text(&self) -> Result<String, String> {
        let text = match self.kind {
            CellType::Boolean => self.boolean().to_string(),
            CellType::Serial(SerialKind::Date, _) => Value::Date(self.date()?).to_string(),
            CellType::Serial(SerialKind::Time, _) => Value::Time(self.time()?).to_string(),
            CellType::Serial(SerialKind::DateTime, _) => Value::Timestamp(self.datetime()?).to_string(),
            CellType::IsoDateTime => self.value.replace('T', " "),
            _ => self.value.to_owned(),
        };
        Ok(text)
    }

    fn boolean(&self) -> bool {
        let text = self.value.trim();
        text == "1" || text.eq_ignore_ascii_case("true")
    }

    /// Whole numbers that fit in an `i64`, including whole-valued doubles such as `3.0`.
    fn integer(&self) -> Option<i64> {
        let text = self.value.trim();
        text.parse::<i64>().ok().or_else(|| {
            text.parse::<f64>()
                .ok()
                .filter(|number| number.fract() == 0.0 && number.abs() < 9.0e15)
                .map(|number| number as i64)
        })
    }

    fn number(&self) -> Result<f64, String> {
        self.value.trim().parse::<f64>().map_err(|_| self.invalid("double"))
    }

    fn date(&self) -> Result<NaiveDate, String> {
        match self.kind {
            CellType::Serial(_, system) => {
                system
                    .unix_days(self.number()?.trunc() as i64)
                    .and_then(epoch_days_to_date)
                    .ok_or_else(|| self.out_of_range())
            }
            CellType::IsoDateTime => {
                let date = self.value.split('T').next().unwrap_or_default();
                NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| self.invalid("date"))
            }
            _ => Err(self.invalid("date")),
        }
    }

    fn time(&self) -> Result<NaiveTime, String> {
        match self.kind {
            CellType::Serial(..) => {
                let micros = (self.number()?.fract() * MICROS_PER_DAY as f64).round() as i64;
                micros_to_time(micros).ok_or_else(|| self.out_of_range())
            }
            CellType::IsoDateTime => Ok(self.datetime()?.time()),
            _ => Err(self.invalid("time")),
        }
    }

    fn datetime(&self) -> Result<NaiveDateTime, String> {
        match self.kind {
            CellType::Serial(..) => {
                let micros = (self.number()?.fract() * MICROS_PER_DAY as f64).round() as i64;
                self.date()?
                    .and_time(NaiveTime::MIN)
                    .checked_add_signed(Duration::microseconds(micros))
                    .ok_or_else(|| self.out_of_range())
            }
            CellType::IsoDateTime if self.value.contains('T') => {
                NaiveDateTime::parse_from_str(self.value.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
                    .map_err(|_| self.invalid("timestamp"))
            }
            CellType::IsoDateTime => Ok(self.date()?.and_time(NaiveTime::MIN)),
            _ => Err(self.invalid("timestamp")),
        }
    }

    fn invalid(&self, kind: &str) -> String {
        format!("cannot read '{}' as {kind}", self.value)
    }

    fn out_of_range(&self) -> String {
        format!("value '{}' at {} is out of range", self.value, self.reference())
    }
}

/// Days since 1970-01-01 to a calendar date.
pub(crate) fn epoch_days_to_date(days: i64) -> Option<NaiveDate> {
    NaiveDate::default().checked_add_signed(Duration::try_days(days)?)
}

/// Microseconds since midnight to a time of day; wraps at 24 hours.
pub(crate) fn micros_to_time(micros: i64) -> Option<NaiveTime> {
    let micros = micros.rem_euclid(MICROS_PER_DAY);
    let seconds = (micros / 1_000_000) as u32;
    let nanos = ((micros % 1_000_000) * 1_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos)
}
