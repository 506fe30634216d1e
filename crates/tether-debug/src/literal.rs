use tether_runtime::{Handle, Primitive};

use crate::error::{DebugError, DebugResult};

/// A value typed at the controller: a literal, a handle (`@12`) or the name
/// of an object registered with the session.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Str(String),
    Primitive(Primitive),
    Handle(Handle),
    Name(String),
}

pub fn parse_literal(text: &str) -> DebugResult<Literal> {
    let text = text.trim();
    let invalid = || DebugError::InvalidLiteral(text.to_string());
    if text.is_empty() {
        return Err(invalid());
    }

    match text {
        "null" => return Ok(Literal::Null),
        "true" => return Ok(Literal::Primitive(Primitive::Boolean(true))),
        "false" => return Ok(Literal::Primitive(Primitive::Boolean(false))),
        _ => {}
    }

    if let Some(body) = text.strip_prefix('"') {
        let body = body.strip_suffix('"').ok_or_else(invalid)?;
        return unescape(body).map(Literal::Str).ok_or_else(invalid);
    }
    if let Some(body) = text.strip_prefix('\'') {
        let body = body.strip_suffix('\'').ok_or_else(invalid)?;
        let unescaped = unescape(body).ok_or_else(invalid)?;
        let mut chars = unescaped.chars();
        return match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Literal::Primitive(Primitive::Char(c))),
            _ => Err(invalid()),
        };
    }
    if let Some(raw) = text.strip_prefix('@') {
        return raw
            .parse::<u64>()
            .map(|raw| Literal::Handle(Handle::from_raw(raw)))
            .map_err(|_| invalid());
    }

    let first = text.chars().next().unwrap_or(' ');
    if first.is_ascii_digit() || first == '-' || first == '.' {
        return parse_number(text).ok_or_else(invalid);
    }
    if text
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    {
        return Ok(Literal::Name(text.to_string()));
    }
    Err(invalid())
}

fn parse_number(text: &str) -> Option<Literal> {
    let primitive = if let Some(digits) = text.strip_suffix(['L', 'l']) {
        Primitive::Long(digits.parse().ok()?)
    } else if let Some(digits) = text.strip_suffix(['f', 'F']) {
        Primitive::Float(digits.parse().ok()?)
    } else if let Some(digits) = text.strip_suffix(['d', 'D']) {
        Primitive::Double(digits.parse().ok()?)
    } else if text.contains(['.', 'e', 'E']) {
        Primitive::Double(text.parse().ok()?)
    } else {
        Primitive::Int(text.parse().ok()?)
    };
    Some(Literal::Primitive(primitive))
}

fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            _ => return None,
        });
    }
    Some(out)
}
