//! Property-based test generators using proptest.

use proptest::prelude::*;
use tandem_store::{ColumnKind, Row, RowId, TableSchema, Value};

/// Strategy for a value of the given column kind.
pub fn value_strategy(kind: ColumnKind) -> BoxedStrategy<Value> {
    match kind {
        ColumnKind::Integer => any::<i64>().prop_map(Value::Integer).boxed(),
        ColumnKind::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ColumnKind::Text => prop::string::string_regex("[a-z]{1,12}")
            .expect("invalid regex")
            .prop_map(Value::Text)
            .boxed(),
        ColumnKind::Bytes => prop::collection::vec(any::<u8>(), 0..32)
            .prop_map(Value::Bytes)
            .boxed(),
    }
}

/// Strategy for a row of the given schema with the given primary key.
///
/// Non-nullable columns always get a value; nullable columns are
/// sometimes null. Reference columns are skipped (callers wire those
/// explicitly so they resolve).
pub fn row_strategy(schema: &TableSchema, id: RowId) -> BoxedStrategy<Row> {
    let mut strategy: BoxedStrategy<Row> = Just(Row::new(id)).boxed();
    for column in &schema.columns {
        if column.references.is_some() {
            continue;
        }
        let name = column.name.clone();
        let value = if column.nullable {
            prop_oneof![
                2 => value_strategy(column.kind),
                1 => Just(Value::Null),
            ]
            .boxed()
        } else {
            value_strategy(column.kind)
        };
        strategy = (strategy, value)
            .prop_map(move |(row, v)| row.with(name.clone(), v))
            .boxed();
    }
    strategy
}

/// Strategy for a set of rows with distinct primary keys in `1..=max_id`.
pub fn rows_strategy(schema: TableSchema, max_id: RowId) -> BoxedStrategy<Vec<Row>> {
    let max = max_id.max(1);
    prop::collection::btree_set(1..=max, 0..(max as usize))
        .prop_flat_map(move |ids| {
            let rows: Vec<BoxedStrategy<Row>> = ids
                .into_iter()
                .map(|id| row_strategy(&schema, id))
                .collect();
            rows
        })
        .boxed()
}
