//! Recognizer for lines that open a node
//!
//! Accepted shape, anchored at the start of the line after leading whitespace:
//!
//! ```text
//! [label ':'] name '{'
//! name := '/' | '&' ref | generic
//! ```
//!
//! Labels and references use word characters plus `-.@`; generic names also
//! allow `,` and `/`. Whitespace may appear around the colon and before the
//! brace. Anything after the brace is ignored, so only the first node opened
//! on a line is seen.

/// The pieces of a matched node opening, borrowed from the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOpening<'a> {
    pub label: Option<&'a str>,
    pub name: &'a str,
}

impl<'a> NodeOpening<'a> {
    /// Text shown for the node: the label when present, otherwise the name.
    pub fn display(&self) -> &'a str {
        self.label.unwrap_or(self.name)
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_label_char(c: char) -> bool {
    is_word(c) || matches!(c, '-' | '.' | '@')
}

fn is_name_char(c: char) -> bool {
    is_label_char(c) || matches!(c, ',' | '/')
}

/// Split off the longest non-empty prefix whose characters satisfy `pred`.
fn take_run(s: &str, pred: impl Fn(char) -> bool) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    (end > 0).then(|| s.split_at(end))
}

/// Succeeds when `rest` is optional whitespace followed by `{`.
fn opens_brace(rest: &str) -> bool {
    rest.trim_start().starts_with('{')
}

/// `label :` with optional whitespace on both sides of the colon.
fn take_label(s: &str) -> Option<(&str, &str)> {
    let (label, rest) = take_run(s, is_label_char)?;
    let rest = rest.trim_start().strip_prefix(':')?;
    Some((label, rest.trim_start()))
}

/// Node name immediately followed (modulo whitespace) by an opening brace.
fn take_name(s: &str) -> Option<&str> {
    if s.starts_with('/') && opens_brace(&s[1..]) {
        return Some(&s[..1]);
    }
    if let Some(reference) = s.strip_prefix('&') {
        if let Some((name, rest)) = take_run(reference, is_label_char) {
            if opens_brace(rest) {
                return Some(&s[..name.len() + 1]);
            }
        }
    }
    let (name, rest) = take_run(s, is_name_char)?;
    opens_brace(rest).then_some(name)
}

/// Match a node opening at the start of `line`.
pub fn match_node_open(line: &str) -> Option<NodeOpening<'_>> {
    let s = line.trim_start();

    if let Some((label, rest)) = take_label(s) {
        if let Some(name) = take_name(rest) {
            return Some(NodeOpening {
                label: Some(label),
                name,
            });
        }
    }

    take_name(s).map(|name| NodeOpening { label: None, name })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opening(line: &str) -> Option<(Option<&str>, &str)> {
        match_node_open(line).map(|m| (m.label, m.name))
    }

    #[test]
    fn test_root_node() {
        assert_eq!(opening("/ {"), Some((None, "/")));
        assert_eq!(opening("/{"), Some((None, "/")));
    }

    #[test]
    fn test_labeled_node() {
        assert_eq!(opening("\tcpu0: cpu@0 {"), Some((Some("cpu0"), "cpu@0")));
        assert_eq!(opening("cpu0 :cpu@0{"), Some((Some("cpu0"), "cpu@0")));
    }

    #[test]
    fn test_generic_name_with_comma_and_slash() {
        assert_eq!(
            opening("  qcom,gcc@100000 {"),
            Some((None, "qcom,gcc@100000"))
        );
        assert_eq!(opening("/soc {"), Some((None, "/soc")));
    }

    #[test]
    fn test_phandle_reference() {
        assert_eq!(opening("&uart5 {"), Some((None, "&uart5")));
        assert_eq!(opening("lbl: &uart5 {"), Some((Some("lbl"), "&uart5")));
    }

    #[test]
    fn test_reference_with_comma_is_not_a_node() {
        assert_eq!(opening("&foo,bar {"), None);
    }

    #[test]
    fn test_properties_do_not_match() {
        assert_eq!(opening("compatible = \"qcom,gcc\";"), None);
        assert_eq!(opening("status = \"okay\";"), None);
        assert_eq!(opening("};"), None);
        assert_eq!(opening(""), None);
    }

    #[test]
    fn test_label_without_name_does_not_match() {
        assert_eq!(opening("foo: {"), None);
    }

    #[test]
    fn test_only_first_opening_counts() {
        assert_eq!(opening("a { b { }; };"), Some((None, "a")));
    }

    #[test]
    fn test_display_prefers_label() {
        let m = match_node_open("gcc: clock-controller@100000 {").unwrap();
        assert_eq!(m.display(), "gcc");
        let m = match_node_open("clock-controller@100000 {").unwrap();
        assert_eq!(m.display(), "clock-controller@100000");
    }
}
