//! Escaping for the COPY text format and embedded hstore literals.

/// Escape a value for a COPY text-format field.
pub fn escape_copy(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a key or value embedded in a double-quoted hstore record.
///
/// Control characters and double quotes are flattened to a space; the
/// downstream consumers never kept them. A backslash expands to eight
/// backslashes so that one literal backslash survives the COPY layer,
/// the hstore parser and a further quoting round.
pub fn escape_hstore_record(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\\\\\\\\\\\\\"),
            '\n' | '\r' | '\t' | '"' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Render key/value pairs as the body of an hstore COPY field:
/// `"k1"=>"v1", "k2"=>"v2"`. Empty input renders as `None` (a NULL
/// column).
pub fn hstore_body(pairs: &[(String, String)]) -> Option<String> {
    if pairs.is_empty() {
        return None;
    }
    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('"');
        out.push_str(&escape_hstore_record(key));
        out.push_str("\"=>\"");
        out.push_str(&escape_hstore_record(value));
        out.push('"');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_escape_specials() {
        assert_eq!(escape_copy("a\tb"), "a\\tb");
        assert_eq!(escape_copy("a\nb"), "a\\nb");
        assert_eq!(escape_copy("a\rb"), "a\\rb");
        assert_eq!(escape_copy("a\\b"), "a\\\\b");
        assert_eq!(escape_copy("plain"), "plain");
    }

    #[test]
    fn test_hstore_flattens_quotes_and_controls() {
        assert_eq!(escape_hstore_record("say \"hi\"\n"), "say  hi  ");
        assert_eq!(escape_hstore_record("a\tb"), "a b");
    }

    #[test]
    fn test_hstore_backslash_expands_to_eight() {
        let escaped = escape_hstore_record("C:\\temp");
        assert_eq!(escaped, format!("C:{}temp", "\\".repeat(8)));
    }

    #[test]
    fn test_hstore_body_layout() {
        let pairs = vec![
            ("name".to_string(), "Foo".to_string()),
            ("name:de".to_string(), "Bar".to_string()),
        ];
        assert_eq!(
            hstore_body(&pairs).unwrap(),
            "\"name\"=>\"Foo\", \"name:de\"=>\"Bar\""
        );
        assert_eq!(hstore_body(&[]), None);
    }

    #[test]
    fn test_backslash_survives_full_name_pipeline() {
        // A backslash in a name tag must still be a backslash after
        // the COPY layer (\\ -> \), the hstore parser (\\ -> \) and a
        // final unquoting round.
        let pairs = vec![("name".to_string(), "A\\B".to_string())];
        let body = hstore_body(&pairs).unwrap();
        assert!(body.contains(&"\\".repeat(8)));

        let after_copy = body.replace("\\\\", "\\");
        assert!(after_copy.contains(&"\\".repeat(4)));
        let after_hstore = after_copy.replace("\\\\", "\\");
        assert!(after_hstore.contains(&"\\".repeat(2)));
    }
}
