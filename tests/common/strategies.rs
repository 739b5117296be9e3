use proptest::prelude::*;

/// Strategy for generating partition keys from a small alphabet so that groups collide
pub fn partition_key_strategy() -> impl Strategy<Value = String> {
    "[A-E]{1,2}"
}

/// Strategy for generating (partition key, payload) items
pub fn keyed_items_strategy(max_len: usize) -> impl Strategy<Value = Vec<(String, u32)>> {
    prop::collection::vec((partition_key_strategy(), any::<u32>()), 0..max_len)
}

/// Strategy for generating batch sizes, including non-positive values that clamp to 1
pub fn batch_size_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        1 => -5i64..=0,
        4 => 1i64..=120,
    ]
}

/// Strategy for generating filter values containing quotes and spaces
pub fn filter_value_strategy() -> impl Strategy<Value = String> {
    "[a-z' ]{0,12}"
}
