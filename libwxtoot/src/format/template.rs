//! Single-pass template tokenizer
//!
//! A template is split once into literal text and placeholder references.
//! Rendering maps over the segments, so text that merely looks like a
//! placeholder value can never be rewritten by accident.

/// One piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A `{name}` or `{name:spec}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub spec: Option<String>,
    /// The exact source text, emitted when the record has no such field
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let candidate = &rest[open..];
            match parse_placeholder(candidate) {
                Some((placeholder, consumed)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(placeholder));
                    rest = &candidate[consumed..];
                }
                None => {
                    literal.push('{');
                    rest = &candidate[1..];
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholders in template order, duplicates included
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }
}

/// Parse a placeholder at the start of `s` (which begins with `{`).
/// Returns the placeholder and the number of bytes it spans.
fn parse_placeholder(s: &str) -> Option<(Placeholder, usize)> {
    let body = &s[1..];
    let name_len = body
        .char_indices()
        .find(|(_, c)| !is_name_char(*c))
        .map(|(i, _)| i)?;
    if name_len == 0 {
        return None;
    }
    let name = &body[..name_len];
    let after = &body[name_len..];

    let (spec, inner_len) = if after.starts_with('}') {
        (None, name_len)
    } else if let Some(spec_src) = after.strip_prefix(':') {
        let close = spec_src.find('}')?;
        if close == 0 {
            return None;
        }
        (Some(spec_src[..close].to_string()), name_len + 1 + close)
    } else {
        return None;
    };

    // braces on both sides
    let consumed = inner_len + 2;
    Some((
        Placeholder {
            name: name.to_string(),
            spec,
            raw: s[..consumed].to_string(),
        },
        consumed,
    ))
}
