//! `${name}` substitution for plan strings
//!
//! `$$` renders a literal `$`. A `$` not followed by `{` or `$` is kept as is,
//! so shell-looking text such as `$PATH` inside an argument passes through.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// `${name}` with no value
    Unknown(String),
    /// `${` without a closing `}`, or an empty or malformed name
    Malformed(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "unknown variable '${{{name}}}'"),
            Self::Malformed(text) => write!(f, "malformed variable reference in '{text}'"),
        }
    }
}

enum Piece<'a> {
    Text(&'a str),
    Var(&'a str),
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse(template: &str) -> Result<Vec<Piece<'_>>, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        let (before, after) = rest.split_at(pos);
        if !before.is_empty() {
            pieces.push(Piece::Text(before));
        }
        if let Some(tail) = after.strip_prefix("$$") {
            pieces.push(Piece::Text("$"));
            rest = tail;
        } else if let Some(tail) = after.strip_prefix("${") {
            let end = tail
                .find('}')
                .ok_or_else(|| TemplateError::Malformed(template.to_string()))?;
            let name = &tail[..end];
            if !is_name(name) {
                return Err(TemplateError::Malformed(template.to_string()));
            }
            pieces.push(Piece::Var(name));
            rest = &tail[end + 1..];
        } else {
            pieces.push(Piece::Text("$"));
            rest = &after[1..];
        }
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    Ok(pieces)
}

/// Names referenced by `template`, in order of first appearance.
pub fn variables(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for piece in parse(template)? {
        if let Piece::Var(name) = piece
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Substitute every `${name}` using `lookup`.
pub fn render<'v, F>(template: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<&'v str>,
{
    let mut out = String::with_capacity(template.len());
    for piece in parse(template)? {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Var(name) => {
                let value = lookup(name).ok_or_else(|| TemplateError::Unknown(name.to_string()))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}
