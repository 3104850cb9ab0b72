//! Minimal JSON field extractor.
//!
//! The service replies are flat, single-level JSON objects. A structural
//! parser would invite drift in accepted encodings, so this scanner does
//! exactly what the protocol needs: locate `"key"`, skip the colon and at
//! most one leading space, and slice out a numeric run or a quoted string.
//! Nested objects and escaped quotes are not supported.

/// Extract the raw value of `key` from `reply`.
///
/// Numeric values (leading `-` or digit) run to the first comma or closing
/// brace; string values run to the next unescaped quote. Returns `None`
/// when the key is absent or the value opener is neither numeric nor a
/// quote.
pub fn extract<'a>(reply: &'a str, key: &str) -> Option<&'a str> {
    let mut needle = heapless::String::<40>::new();
    needle.push('"').ok()?;
    needle.push_str(key).ok()?;
    needle.push('"').ok()?;

    let at = reply.find(needle.as_str())?;
    let rest = reply[at + needle.len()..].strip_prefix(':')?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest);

    let first = rest.chars().next()?;
    if first == '"' {
        let inner = &rest[1..];
        let end = inner.find('"')?;
        Some(&inner[..end])
    } else if first == '-' || first.is_ascii_digit() {
        let end = rest.find([',', '}']).unwrap_or(rest.len());
        Some(rest[..end].trim_end())
    } else {
        None
    }
}

/// Extract `key` and parse it as a signed integer.
pub fn extract_int(reply: &str, key: &str) -> Option<i64> {
    extract(reply, key)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_integer() {
        assert_eq!(extract(r#"{"rc":1,"vs":12345}"#, "rc"), Some("1"));
        assert_eq!(extract_int(r#"{"rc":1,"vs":12345}"#, "vs"), Some(12345));
    }

    #[test]
    fn extracts_negative_and_last_field() {
        assert_eq!(extract_int(r#"{"D5":-1}"#, "D5"), Some(-1));
    }

    #[test]
    fn extracts_string() {
        assert_eq!(
            extract(r#"{"wi":"Shed,secret99","rc":0}"#, "wi"),
            Some("Shed,secret99")
        );
    }

    #[test]
    fn skips_single_leading_space() {
        assert_eq!(extract(r#"{"mp": 60}"#, "mp"), Some("60"));
    }

    #[test]
    fn missing_key() {
        assert_eq!(extract(r#"{"rc":0}"#, "vs"), None);
    }

    #[test]
    fn rejects_non_scalar_opener() {
        assert_eq!(extract(r#"{"md":{"a":1}}"#, "md"), None);
        assert_eq!(extract(r#"{"md":[1,2]}"#, "md"), None);
    }

    #[test]
    fn dotted_var_key() {
        let reply = r#"{"id":18,"18.AlarmVoltage":600}"#;
        assert_eq!(extract_int(reply, "18.AlarmVoltage"), Some(600));
    }
}
