//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random queue inputs and records.

use crate::fixtures::at;
use proptest::prelude::*;
use serde_json::{json, Value};
use tillsync_engine::SyncConfig;
use tillsync_protocol::{OperationInput, OperationType, Record};

/// Strategy for generating operation types.
pub fn operation_type_strategy() -> impl Strategy<Value = OperationType> {
    prop_oneof![
        Just(OperationType::Create),
        Just(OperationType::Update),
        Just(OperationType::Delete),
    ]
}

/// Strategy for picking one of the default synchronized tables.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(SyncConfig::default_tables())
}

/// Strategy for generating row ids.
pub fn row_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating small row payloads that always carry an `id`.
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    (row_id_strategy(), "[A-Za-z ]{0,16}", 0i64..100_000)
        .prop_map(|(id, name, price)| json!({"id": id, "name": name, "price": price}))
}

/// Strategy for generating operation inputs without dependencies.
pub fn operation_input_strategy() -> impl Strategy<Value = OperationInput> {
    (
        operation_type_strategy(),
        table_name_strategy(),
        payload_strategy(),
        -5i32..5,
    )
        .prop_map(|(op_type, table, data, priority)| {
            OperationInput::new(op_type, table, data).with_priority(priority)
        })
}

/// Strategy for generating records modified within a day of `t0()`.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (row_id_strategy(), 0i64..86_400, "[A-Za-z]{1,12}")
        .prop_map(|(id, seconds, name)| Record::new(id, at(seconds)).with_field("name", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_inputs_target_known_tables(input in operation_input_strategy()) {
            prop_assert!(SyncConfig::default().has_table(&input.table_name));
            prop_assert!(input.data.get("id").is_some());
        }

        #[test]
        fn generated_records_parse_back(record in record_strategy()) {
            let parsed = Record::from_value(record.to_value()).unwrap();
            prop_assert_eq!(parsed, record);
        }
    }
}
