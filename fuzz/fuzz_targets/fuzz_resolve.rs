#![no_main]
use libfuzzer_sys::fuzz_target;
use subman_core::resolve::{strip_command_tokens, CommandTable};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let mut table = CommandTable::new();
    for name in ["register", "subscribe", "unsubscribe", "list", "list available"] {
        table.insert(name, ());
    }
    if let Some(resolved) = table.resolve(&tokens) {
        assert!(resolved.consumed >= 1);
        let rest = strip_command_tokens(&tokens, resolved.consumed);
        assert!(rest.len() + resolved.consumed == tokens.len());
    }
});
