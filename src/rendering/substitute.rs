//! Placeholder token binding for template text.
//!
//! Grammar: `{{` optional spaces, a name matching `[a-z_][a-z0-9_]*`, optional
//! spaces, `}}`. An opening `{{` with no closing `}}` is kept as literal text.

use std::collections::HashMap;

/// Error parsing a placeholder token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Empty placeholder at byte {0}")]
    Empty(usize),

    #[error("Invalid placeholder name '{name}' at byte {offset}")]
    InvalidName { name: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(String),
}

/// Parsed text with `{{name}}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTemplate {
    segments: Vec<Segment>,
}

impl TextTemplate {
    /// Parse template text into literal and token segments
    pub fn parse(source: &str) -> Result<Self, TokenError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            let after_open = &rest[open + 2..];
            let Some(close) = after_open.find("}}") else {
                break;
            };

            literal.push_str(&rest[..open]);
            let name = after_open[..close].trim();
            let token_offset = offset + open;

            if name.is_empty() {
                return Err(TokenError::Empty(token_offset));
            }
            if !is_valid_name(name) {
                return Err(TokenError::InvalidName {
                    name: name.to_string(),
                    offset: token_offset,
                });
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Token(name.to_string()));

            let consumed = open + 2 + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Template that renders the given text verbatim
    pub fn literal(text: &str) -> Self {
        Self {
            segments: vec![Segment::Literal(text.to_string())],
        }
    }

    /// Names of all placeholders in order of appearance
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Token(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_tokens(&self) -> bool {
        self.tokens().next().is_some()
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Replace every placeholder with its value from `data`.
///
/// Missing keys render as the empty string.
pub fn substitute(template: &TextTemplate, data: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for segment in &template.segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Token(name) => {
                if let Some(value) = data.get(name) {
                    out.push_str(value);
                }
            }
        }
    }
    out
}

/// Parse and substitute in one step, rendering unparseable text literally
pub fn substitute_str(source: &str, data: &HashMap<String, String>) -> String {
    match TextTemplate::parse(source) {
        Ok(template) => substitute(&template, data),
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable placeholder text, rendering literally");
            source.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_tokens() {
        let t = TextTemplate::parse("📍 {{address}}").unwrap();
        assert_eq!(
            substitute(&t, &data(&[("address", "Baner, Pune")])),
            "📍 Baner, Pune"
        );
    }

    #[test]
    fn test_substitute_repeated_and_spaced_tokens() {
        let t = TextTemplate::parse("{{ price }} / {{price}}").unwrap();
        assert_eq!(substitute(&t, &data(&[("price", "₹1.25 Cr")])), "₹1.25 Cr / ₹1.25 Cr");
    }

    #[test]
    fn test_missing_token_renders_empty() {
        let t = TextTemplate::parse("Call: {{contact}}!").unwrap();
        assert_eq!(substitute(&t, &HashMap::new()), "Call: !");
    }

    #[test]
    fn test_unterminated_open_is_literal() {
        let t = TextTemplate::parse("{{title}} and {{ oops").unwrap();
        assert_eq!(
            substitute(&t, &data(&[("title", "Villa")])),
            "Villa and {{ oops"
        );
        assert_eq!(t.tokens().collect::<Vec<_>>(), vec!["title"]);
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert_eq!(TextTemplate::parse("{{}}"), Err(TokenError::Empty(0)));
        assert!(matches!(
            TextTemplate::parse("x {{Price}}"),
            Err(TokenError::InvalidName { offset: 2, .. })
        ));
        assert!(TextTemplate::parse("{{9lives}}").is_err());
    }

    #[test]
    fn test_plain_text_has_no_tokens() {
        let t = TextTemplate::parse("FOR SALE").unwrap();
        assert!(!t.has_tokens());
        assert_eq!(substitute(&t, &HashMap::new()), "FOR SALE");
    }

    #[test]
    fn test_substitute_str_falls_back_to_literal() {
        assert_eq!(substitute_str("{{Bad}}", &HashMap::new()), "{{Bad}}");
    }
}
