#![no_main]

use graft_core::SourceLocation;
use graft_expr::parse_expression;
use libfuzzer_sys::fuzz_target;

// Arbitrary text must either parse or error; it must never panic, and a
// parse error must carry a usable location.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let location = SourceLocation::new(Some("fuzz"), 1, 1);
    if let Err(err) = parse_expression(text, &location) {
        let _ = err.location().to_string();
        let _ = err.to_string();
    }
});
