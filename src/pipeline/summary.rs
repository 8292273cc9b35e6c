//! Category counts over one column.

use crate::table::Column;
use crate::table::ColumnType;
use crate::table::SchemaError;
use crate::table::Table;
use crate::table::Value;
use std::collections::HashMap;

/// One row per distinct value of `column` (null included) with its number of
/// occurrences, most frequent first. Ties keep the order of first appearance.
///
/// The count column is named `count`, or `frequency` when the summarised
/// column is itself called `count`.
pub fn value_counts(table: &Table, column: &str) -> Result<Table, SchemaError> {
    let index = table.require_column(column)?;

    let mut counts = Vec::<(&Value, i64)>::new();
    let mut positions = HashMap::<&Value, usize>::new();
    for value in table.values(index) {
        match positions.get(value) {
            Some(position) => counts[*position].1 += 1,
            None => {
                positions.insert(value, counts.len());
                counts.push((value, 1));
            }
        }
    }
    // Stable sort keeps first appearance order among equal counts
    counts.sort_by(|(_, a), (_, b)| b.cmp(a));

    let count_name = if column == "count" { "frequency" } else { "count" };
    let columns = vec![
        table.columns()[index].clone(),
        Column::new(count_name, ColumnType::BigInt),
    ];
    let rows = counts
        .into_iter()
        .map(|(value, count)| vec![value.clone(), Value::BigInt(count)])
        .collect();
    Table::new(columns, rows)
}
