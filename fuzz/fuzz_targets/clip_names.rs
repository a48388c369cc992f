#![no_main]

use cliploop::naming;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let parsed = naming::parse_file_name(&raw);
    assert!(!parsed.title.is_empty());
    assert!(!parsed.title.chars().any(char::is_control));
});
