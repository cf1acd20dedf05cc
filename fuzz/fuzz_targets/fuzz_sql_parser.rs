// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for the SQL front-end.
// Run with: cargo +nightly fuzz run fuzz_sql_parser
//
// Normalization, statement parsing and hint-comment parsing must reject
// bad input with an error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use planbind_core::hint::parse_hint_comment;
use planbind_core::parser::normalize;
use planbind_core::{DefaultSqlParser, SqlParser};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    // Keep runs short on pathological inputs.
    if input.len() > 4096 {
        return;
    }

    if let Ok(normalized) = normalize(input) {
        assert_eq!(normalized.digest.len(), 64);
    }
    let _ = DefaultSqlParser.parse(input, "utf8mb4", "utf8mb4_bin");
    let _ = parse_hint_comment(input);
});
