#![no_main]

use libfuzzer_sys::fuzz_target;
use esmscope::trace_event::{parse_line, TraceCapture};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    for line in text.lines() {
        let _ = parse_line(line);
        let _ = esmscope::getevent::parse_line(line);
    }
    // Whole-capture path: regression detection and error collection
    let capture = TraceCapture::from_text(&text);
    assert!(capture.events().len() + capture.errors().len() <= capture.lines_read());
});
