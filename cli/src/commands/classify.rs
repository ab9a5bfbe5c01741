use shule_core::classify;

use crate::util::{EXIT_OK, print_json};

pub fn run(text: &str) -> i32 {
    print_json(&classify(text));
    EXIT_OK
}
