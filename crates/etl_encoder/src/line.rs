//! Encode/decode one COPY `text` format line.
//!
//! Tab-separated fields, `\N` for `NULL`, and the four per-field escapes
//! (`\\`, `\t`, `\n`, `\r`). The encoder never buffers more than one line.

use etl_protocol::Value;

/// Convert one coerced value into the field representation `encode_line`
/// expects: `Value::Null` becomes the `NULL` marker, everything else its
/// text rendering.
pub fn value_to_field(value: &Value) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.as_text())
    }
}

/// Encode one row of already-coerced fields. `None` renders as `\N`.
pub fn encode_line(fields: &[Option<String>]) -> Vec<u8> {
    let mut out = Vec::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            out.push(b'\t');
        }
        match field {
            None => out.extend_from_slice(b"\\N"),
            Some(text) => escape_field(text, &mut out),
        }
    }
    out.push(b'\n');
    out
}

fn escape_field(text: &str, out: &mut Vec<u8>) {
    for ch in text.chars() {
        match ch {
            '\\' => out.extend_from_slice(b"\\\\"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            other => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

/// Decode one encoded line back into field values, for round-trip testing.
/// Strips the trailing newline if present.
pub fn decode_line(line: &[u8]) -> Vec<Option<String>> {
    let text = String::from_utf8_lossy(line);
    let text = text.strip_suffix('\n').unwrap_or(&text);

    // `str::split` yields one empty element for an empty string, which is
    // exactly what we want: a single present-but-empty field, not zero
    // fields. A genuinely empty record never reaches this function since
    // `ColumnPlan` construction fails with `NoColumnsMatch` before any line
    // is encoded, so there is no zero-field case to special-case here.
    text.split('\t')
        .map(|raw| {
            if raw == "\\N" {
                None
            } else {
                Some(unescape_field(raw))
            }
        })
        .collect()
}

fn unescape_field(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('t') => out.push('\t'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('N') => out.push_str("\\N"),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_null_as_backslash_n() {
        let line = encode_line(&[Some("a".into()), None, Some("c".into())]);
        assert_eq!(line, b"a\t\\N\tc\n");
    }

    #[test]
    fn escapes_control_characters() {
        let line = encode_line(&[Some("a\tb\nc\\d\re".into())]);
        assert_eq!(line, b"a\\tb\\nc\\\\d\\re\n");
    }

    #[test]
    fn single_empty_field_is_not_confused_with_null() {
        let line = encode_line(&[Some(String::new())]);
        assert_eq!(line, b"\n");
        assert_eq!(decode_line(&line), vec![Some(String::new())]);
    }

    #[test]
    fn roundtrips_through_decode() {
        let fields = vec![Some("hello\tworld".to_string()), None, Some("line\nbreak".to_string())];
        let encoded = encode_line(&fields);
        assert_eq!(decode_line(&encoded), fields);
    }

    proptest::proptest! {
        #[test]
        fn encode_decode_is_bijective(
            values in proptest::collection::vec(proptest::option::of("[ -~]{0,20}"), 1..6)
        ) {
            let encoded = encode_line(&values);
            let decoded = decode_line(&encoded);
            proptest::prop_assert_eq!(decoded, values);
        }
    }
}
