#![no_main]

use graft_core::SourceLocation;
use graft_expr::Binding;
use libfuzzer_sys::fuzz_target;

// Binding text mixes literals with bracketed expression spans; the
// scanner must survive unterminated spans, nested quotes, and stray
// escapes without panicking.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let location = SourceLocation::new(Some("fuzz"), 1, 1);
    match Binding::parse("prop", text, &location) {
        Ok(binding) => {
            let _ = binding.kind();
            let _ = binding.is_constant();
        }
        Err(err) => {
            let _ = err.to_string();
        }
    }
});
