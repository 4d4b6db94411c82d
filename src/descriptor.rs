use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use anyhow::{Context, Result, bail};

/// Semantic type of a single argument or return value, parsed from a JVM
/// type descriptor.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum JavaType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Class or interface type, carrying its internal name (e.g. `java/lang/String`).
    Object(String),
    Array(Box<JavaType>),
}

impl JavaType {
    /// Number of local-variable slots the type occupies.
    pub fn width(&self) -> u16 {
        match self {
            JavaType::Long | JavaType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JavaType::Object(_) | JavaType::Array(_))
    }

    /// Internal name as used by type-operand instructions: the plain internal
    /// name for classes, the full descriptor for arrays.
    pub fn internal_name(&self) -> String {
        match self {
            JavaType::Object(name) => name.clone(),
            JavaType::Array(_) => self.descriptor(),
            other => other.descriptor(),
        }
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.render_to(&mut out);
        out
    }

    fn render_to(&self, out: &mut String) {
        match self {
            JavaType::Boolean => out.push('Z'),
            JavaType::Byte => out.push('B'),
            JavaType::Char => out.push('C'),
            JavaType::Short => out.push('S'),
            JavaType::Int => out.push('I'),
            JavaType::Long => out.push('J'),
            JavaType::Float => out.push('F'),
            JavaType::Double => out.push('D'),
            JavaType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            JavaType::Array(element) => {
                out.push('[');
                element.render_to(out);
            }
        }
    }

    fn parse_from(chars: &mut Peekable<Chars>) -> Result<JavaType> {
        let parsed = match chars.next() {
            Some('Z') => JavaType::Boolean,
            Some('B') => JavaType::Byte,
            Some('C') => JavaType::Char,
            Some('S') => JavaType::Short,
            Some('I') => JavaType::Int,
            Some('J') => JavaType::Long,
            Some('F') => JavaType::Float,
            Some('D') => JavaType::Double,
            Some('L') => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(';') => break,
                        Some(c) => name.push(c),
                        None => bail!("unterminated class type in descriptor"),
                    }
                }
                if name.is_empty() {
                    bail!("empty class name in descriptor");
                }
                JavaType::Object(name)
            }
            Some('[') => JavaType::Array(Box::new(JavaType::parse_from(chars)?)),
            Some(c) => bail!("invalid type descriptor character '{c}'"),
            None => bail!("unexpected end of descriptor"),
        };
        Ok(parsed)
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// Parsed method descriptor: ordered argument types and the return type
/// (`None` for `void`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodType {
    pub args: Vec<JavaType>,
    pub ret: Option<JavaType>,
}

impl MethodType {
    pub fn parse(descriptor: &str) -> Result<MethodType> {
        let mut chars = descriptor.chars().peekable();
        match chars.next() {
            Some('(') => {}
            _ => bail!("method descriptor must start with '(': {descriptor}"),
        }

        let mut args = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => args.push(
                    JavaType::parse_from(&mut chars)
                        .with_context(|| format!("bad argument type in {descriptor}"))?,
                ),
                None => bail!("method descriptor missing ')': {descriptor}"),
            }
        }

        let ret = match chars.peek() {
            Some('V') => {
                chars.next();
                None
            }
            Some(_) => Some(
                JavaType::parse_from(&mut chars)
                    .with_context(|| format!("bad return type in {descriptor}"))?,
            ),
            None => bail!("method descriptor missing return type: {descriptor}"),
        };
        if let Some(leftover) = chars.next() {
            bail!("unexpected trailing '{leftover}' in descriptor: {descriptor}");
        }

        Ok(MethodType { args, ret })
    }
}
