//! Output normalization and checksums.

use std::sync::LazyLock;

use regex::bytes::Regex;

/// Lines starting with a timestamp followed by a log level, e.g.
/// `2024-01-01 12:00:00,123 - INFO - starting` or `[2024-01-01T12:00:00Z] WARN x`.
static LOG_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*\[?\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?\]?\s*(?:[-|:]\s*)?\[?(?:TRACE|DEBUG|INFO|WARN|WARNING|ERROR|CRITICAL|FATAL)\b",
    )
    .expect("log prefix pattern is valid")
});

/// Canonical form of captured output.
///
/// Line endings become LF, log-prefixed lines are dropped, trailing
/// whitespace is trimmed from every line and trailing blank lines are
/// removed. Non-empty output ends with exactly one newline.
pub fn normalize(raw: &[u8]) -> Vec<u8> {
    let unified = unify_line_endings(raw);

    let mut lines: Vec<&[u8]> = unified
        .split(|b| *b == b'\n')
        .filter(|line| !LOG_PREFIX.is_match(line))
        .map(<[u8]>::trim_ascii_end)
        .collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return Vec::new();
    }

    let mut out = lines.join(&b'\n');
    out.push(b'\n');
    out
}

fn unify_line_endings(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter().peekable();
    while let Some(&b) = bytes.next() {
        if b == b'\r' {
            if bytes.peek() == Some(&&b'\n') {
                bytes.next();
            }
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    out
}

/// CRC-32 of `bytes` as `0x` plus 8 uppercase hex digits.
pub fn crc32_hex(bytes: &[u8]) -> String {
    format!("0x{:08X}", crc32fast::hash(bytes))
}
