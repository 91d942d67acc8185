use std::time::{SystemTime, UNIX_EPOCH};

const HEX: &[u8; 16] = b"0123456789abcdef";

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

#[inline]
pub(crate) fn format_request_seq_hex(prefix: &str, request_seq: u64) -> String {
    let mut out = String::with_capacity(prefix.len() + 16);
    out.push_str(prefix);
    push_u64_hex_16(&mut out, request_seq);
    out
}

/// Strip the `data: ` prefix from one pushed line.
///
/// Returns `None` for lines without the prefix and for empty payloads.
#[inline]
pub(crate) fn extract_data_payload(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix("data: ")?;
    if payload.is_empty() {
        return None;
    }
    Some(payload)
}

/// Shorten a secret or a long body for log output.
#[must_use]
pub(crate) fn preview(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[inline]
pub(crate) fn push_json_string_escaped(out: &mut String, value: &str) {
    let bytes = value.as_bytes();
    if bytes.iter().all(|&b| b >= 0x20 && b != b'"' && b != b'\\') {
        out.push('"');
        out.push_str(value);
        out.push('"');
        return;
    }

    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if c <= '\u{1f}' => {
                let control = c as u8;
                out.push_str("\\u00");
                out.push(char::from(HEX[(control >> 4) as usize]));
                out.push(char::from(HEX[(control & 0x0f) as usize]));
            }
            _ => out.push(ch),
        }
    }
    out.push('"');
}

#[inline]
pub(crate) fn push_u64_decimal(out: &mut String, mut n: u64) {
    if n == 0 {
        out.push('0');
        return;
    }

    let mut buf = [0u8; 20];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = b'0' + ((n % 10) as u8);
        n /= 10;
    }
    let digits = std::str::from_utf8(&buf[i..]).unwrap_or("0");
    out.push_str(digits);
}

#[inline]
fn push_u64_hex_16(out: &mut String, mut value: u64) {
    let mut buf = [b'0'; 16];
    let mut idx = 16;
    while idx > 0 {
        idx -= 1;
        let nibble = usize::try_from(value & 0x0f).unwrap_or(0);
        buf[idx] = HEX[nibble];
        value >>= 4;
    }
    for byte in buf {
        out.push(char::from(byte));
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_data_payload, format_request_seq_hex, preview, push_json_string_escaped};

    #[test]
    fn format_request_seq_hex_matches_formatter() {
        assert_eq!(
            format_request_seq_hex("chatcmpl-", 0x1234_abcd_u64),
            "chatcmpl-000000001234abcd"
        );
        assert_eq!(format_request_seq_hex("", u64::MAX), "ffffffffffffffff");
    }

    #[test]
    fn push_json_string_escaped_matches_serde_json() {
        let inputs = [
            "",
            "plain ascii",
            "quote \" and slash \\",
            "line\nbreak\r\n",
            "\u{08}\u{0c}\t",
            "control \u{001f} tail",
            "<think>\n\n思考</think>",
        ];

        for input in inputs {
            let mut out = String::new();
            push_json_string_escaped(&mut out, input);
            let expected = serde_json::to_string(input).expect("serialize");
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn push_json_string_escaped_keeps_markup_unescaped() {
        let mut out = String::new();
        push_json_string_escaped(&mut out, "<details type=\"reasoning\">&");
        assert_eq!(out, r#""<details type=\"reasoning\">&""#);
    }

    #[test]
    fn extract_data_payload_requires_prefix_and_payload() {
        assert_eq!(extract_data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(extract_data_payload("data: {}\r"), Some("{}"));
        assert_eq!(extract_data_payload("data: "), None);
        assert_eq!(extract_data_payload("event: ping"), None);
        assert_eq!(extract_data_payload(""), None);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("eyJhbGciOiJIUzI1NiJ9", 10), "eyJhbGciOi");
        assert_eq!(preview("短", 10), "短");
        assert_eq!(preview("思考中的内容", 2), "思考");
    }
}
