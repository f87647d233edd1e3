use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;

// Tests run in parallel, so each fake device keeps its own value under its own name.
lazy_static! {
    static ref NAMED_VALUES_MAP: Mutex<HashMap<&'static str, u64>> = Mutex::new(HashMap::new());
}

pub fn set_named_value(name: &'static str, value: u64) {
    let mut map = NAMED_VALUES_MAP.lock().unwrap();
    map.insert(name, value);
}

pub fn get_named_value(name: &str) -> u64 {
    let map = NAMED_VALUES_MAP.lock().unwrap();
    *map.get(name).unwrap()
}

pub fn add_to_named_value(name: &str, amount: u64) {
    let mut map = NAMED_VALUES_MAP.lock().unwrap();
    let value = map.get_mut(name).unwrap();
    *value += amount;
}

pub fn get_and_increment_named_value(name: &str) -> u64 {
    let mut map = NAMED_VALUES_MAP.lock().unwrap();
    let value = map.get_mut(name).unwrap();
    *value += 1;
    *value - 1
}
