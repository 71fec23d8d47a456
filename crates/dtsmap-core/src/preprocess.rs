//! Comment stripping that keeps string literals and line structure intact
//!
//! Every newline of the input survives, including newlines inside block
//! comments, so line numbers computed on the output match the input.
//! Unterminated comments and strings run to the end of the input.

/// Scanner state while walking the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    LineComment,
    BlockComment,
    InString { quote: char },
}

/// Remove `//` and `/* */` comments outside of quoted strings.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = LexState::Normal;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        state = match state {
            LexState::LineComment => {
                if ch == '\n' {
                    out.push(ch);
                    LexState::Normal
                } else {
                    LexState::LineComment
                }
            }
            LexState::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    LexState::Normal
                } else {
                    if ch == '\n' {
                        out.push(ch);
                    }
                    LexState::BlockComment
                }
            }
            LexState::InString { quote } => {
                out.push(ch);
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                    state
                } else if ch == quote {
                    LexState::Normal
                } else {
                    state
                }
            }
            LexState::Normal => match (ch, chars.peek()) {
                ('"' | '\'', _) => {
                    out.push(ch);
                    LexState::InString { quote: ch }
                }
                ('/', Some('/')) => {
                    chars.next();
                    LexState::LineComment
                }
                ('/', Some('*')) => {
                    chars.next();
                    LexState::BlockComment
                }
                _ => {
                    out.push(ch);
                    LexState::Normal
                }
            },
        };
    }

    out
}
