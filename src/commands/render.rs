//! Row Rendering
//!
//! Rows go back to the caller as tuple literals, the format the message
//! router already parses:
//!
//! ```text
//! ('bob',)                          single column keeps the trailing comma
//! ('alice', '2024-01-01', None)     NULL renders as None
//! (3, 1.5, b'\x00\x01')             integers, reals, blobs
//! ```
//!
//! Text is quoted with `'` unless it contains `'` and no `"`, and control
//! characters are escaped, so a rendered value never contains a raw newline
//! or NUL.

use rusqlite::types::ValueRef;
use rusqlite::Row;
use std::fmt::Write;

/// Renders the first `columns` values of `row` as a tuple literal.
pub fn render_row(row: &Row<'_>, columns: usize) -> rusqlite::Result<String> {
    let mut out = String::from("(");

    for i in 0..columns {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&render_value(row.get_ref(i)?));
    }

    if columns == 1 {
        out.push(',');
    }
    out.push(')');
    Ok(out)
}

/// Renders a single SQLite value.
pub fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(n) => n.to_string(),
        ValueRef::Real(f) => render_real(f),
        ValueRef::Text(bytes) => render_text(&String::from_utf8_lossy(bytes)),
        ValueRef::Blob(bytes) => render_blob(bytes),
    }
}

/// Shortest round-trip decimal; exponent form outside `[1e-4, 1e16)`.
fn render_real(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // `{:?}` already switches to exponent form at the same thresholds, but
    // writes `1e16` / `1e-5` where callers expect `1e+16` / `1e-05`.
    let repr = format!("{:?}", f);
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

fn render_text(text: &str) -> String {
    let quote = pick_quote(text.contains('\''), text.contains('"'));
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);

    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if is_printable(c) => out.push(c),
            c => {
                let code = c as u32;
                let _ = match code {
                    0..=0xff => write!(out, "\\x{:02x}", code),
                    0x100..=0xffff => write!(out, "\\u{:04x}", code),
                    _ => write!(out, "\\U{:08x}", code),
                };
            }
        }
    }

    out.push(quote);
    out
}

fn render_blob(bytes: &[u8]) -> String {
    let quote = pick_quote(bytes.contains(&b'\''), bytes.contains(&b'"'));
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push('b');
    out.push(quote);

    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if b as char == quote => {
                out.push('\\');
                out.push(quote);
            }
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", b);
            }
        }
    }

    out.push(quote);
    out
}

fn pick_quote(has_single: bool, has_double: bool) -> char {
    if has_single && !has_double {
        '"'
    } else {
        '\''
    }
}

/// Format (Cf) and private-use (Co) code points, which are escaped like
/// control characters.
const NON_PRINTABLE_RANGES: &[(u32, u32)] = &[
    (0x00AD, 0x00AD),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x0890, 0x0891),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xE000, 0xF8FF),
    (0xFEFF, 0xFEFF),
    (0xFFF9, 0xFFFB),
    (0x110BD, 0x110BD),
    (0x110CD, 0x110CD),
    (0x13430, 0x1343F),
    (0x1BCA0, 0x1BCA3),
    (0x1D173, 0x1D17A),
    (0xE0001, 0xE0001),
    (0xE0020, 0xE007F),
    (0xF0000, 0xFFFFD),
    (0x100000, 0x10FFFD),
];

fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    let code = c as u32;
    !NON_PRINTABLE_RANGES
        .iter()
        .any(|&(start, end)| (start..=end).contains(&code))
}
