#![no_main]

use libfuzzer_sys::fuzz_target;
use esmscope::filter::EventFilter;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Any expression either parses or returns a FilterError, never panics
        let _ = EventFilter::from_expr(input);
    }
});
