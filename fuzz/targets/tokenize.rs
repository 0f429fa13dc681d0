#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tabledump::{ImportOptions, Importer, InMemoryStore, TableSchema, Tokenizer};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    data: Vec<u8>,
    window: u8,
}

fuzz_target!(|input: FuzzInput| {
    let window = usize::from(input.window).max(1);
    let bytes = Bytes::from(input.data);

    // Токенизатор не должен паниковать и должен остановиться на ошибке.
    let mut tokenizer = Tokenizer::new(bytes.clone()).with_window(window);
    let mut steps = 0usize;
    while let Ok(Some(_)) = tokenizer.next() {
        steps += 1;
        assert!(steps <= bytes.len() + 1);
    }

    // Импорт произвольных байт завершается ошибкой или успехом, но не паникой.
    let mut store = InMemoryStore::with_tables("fuzz", 1.0, [TableSchema::new("t", "++id")]);
    let _ = Importer::default().import(
        bytes,
        &mut store,
        ImportOptions::default().lenient_schema().window_bytes(window),
    );
});
