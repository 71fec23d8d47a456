//! Structural brace counting for a single preprocessed line

/// Braces found outside string literals on one line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BraceCount {
    pub opens: u32,
    pub closes: u32,
}

impl BraceCount {
    /// Net change in nesting depth contributed by the line.
    pub fn delta(&self) -> i64 {
        i64::from(self.opens) - i64::from(self.closes)
    }
}

/// Count `{` and `}` that are not inside a single- or double-quoted string.
///
/// String state does not carry over between lines.
pub fn count_braces(line: &str) -> BraceCount {
    let mut count = BraceCount::default();
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some(q) => {
                if ch == '\\' {
                    chars.next();
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '{' => count.opens += 1,
                '}' => count.closes += 1,
                _ => {}
            },
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_plain_braces() {
        let count = count_braces("foo { bar { }; };");
        assert_eq!(count, BraceCount { opens: 2, closes: 2 });
        assert_eq!(count.delta(), 0);
    }

    #[test]
    fn test_ignores_braces_in_strings() {
        let count = count_braces(r#"label = "{not a brace}"; x {"#);
        assert_eq!(count, BraceCount { opens: 1, closes: 0 });
    }

    #[test]
    fn test_escaped_quote_keeps_string_open() {
        let count = count_braces(r#"s = "\"}" ; }"#);
        assert_eq!(count, BraceCount { opens: 0, closes: 1 });
    }

    #[test]
    fn test_single_quotes() {
        assert_eq!(count_braces("c = '}';").closes, 0);
    }

    #[test]
    fn test_close_only_line() {
        assert_eq!(count_braces("};").delta(), -1);
    }
}
