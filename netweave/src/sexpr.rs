//! S-expression documents: model, formatter and parser.
//!
//! The formatter follows the layout KiCad itself writes:
//!
//! - short records (`property`, `pin`, `at`, `xy`, …) and any list without
//!   nested lists stay on a single line;
//! - every other list puts each nested list on its own indented line and
//!   closes on a line of its own;
//! - numbers carry at most four decimals, since KiCad rejects long
//!   floating tails.
//!
//! Formatting a parsed document is idempotent: `format(parse(format(d)))`
//! equals `format(d)`.

use crate::error::SexprError;
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, opt, value},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

/// Records rendered on one line no matter what they contain.
const INLINE_HEADS: &[&str] = &[
    "property", "pin", "node", "at", "xy", "pts", "uuid", "stroke", "effects", "font", "size",
    "lib_id", "reference", "page", "path", "comp", "libsource", "justify", "fill", "color",
    "paper", "version", "generator", "unit", "in_bom", "on_board", "dnp", "instances",
];

const INDENT: &str = "  ";

/// Number of decimals kept when rendering numbers.
pub const MAX_DECIMALS: i32 = 4;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    List(Vec<Sexpr>),
    /// Bare token, e.g. `yes` or `default`.
    Symbol(String),
    /// Quoted string.
    Str(String),
    Number(f64),
}

impl Sexpr {
    /// `(head items...)`
    pub fn list(head: &str, items: Vec<Sexpr>) -> Self {
        let mut all = Vec::with_capacity(items.len() + 1);
        all.push(Sexpr::Symbol(head.to_string()));
        all.extend(items);
        Sexpr::List(all)
    }

    pub fn sym(s: impl Into<String>) -> Self {
        Sexpr::Symbol(s.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Sexpr::Str(s.into())
    }

    pub fn num(v: f64) -> Self {
        Sexpr::Number(v)
    }

    /// `(head "value")`
    pub fn pair_str(head: &str, v: impl Into<String>) -> Self {
        Sexpr::list(head, vec![Sexpr::string(v)])
    }

    /// `(head symbol)`
    pub fn pair_sym(head: &str, v: impl Into<String>) -> Self {
        Sexpr::list(head, vec![Sexpr::sym(v)])
    }

    pub fn head(&self) -> Option<&str> {
        match self {
            Sexpr::List(items) => match items.first() {
                Some(Sexpr::Symbol(s)) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn items(&self) -> &[Sexpr] {
        match self {
            Sexpr::List(items) => items,
            _ => &[],
        }
    }

    /// Child lists whose head is `head`.
    pub fn children<'a>(&'a self, head: &'a str) -> impl Iterator<Item = &'a Sexpr> + 'a {
        self.items().iter().filter(move |c| c.head() == Some(head))
    }

    pub fn child<'a>(&'a self, head: &str) -> Option<&'a Sexpr> {
        self.items().iter().find(|c| c.head() == Some(head))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Sexpr::Str(s) | Sexpr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Sexpr::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// First non-head item of a `(head value ...)` record, as a string.
    pub fn value_str(&self) -> Option<&str> {
        self.items().get(1).and_then(Sexpr::as_str)
    }
}

// ---------------------------------------------------------------------------
// Formatter
// ---------------------------------------------------------------------------

/// Render a number with bounded precision and no trailing zeros.
pub fn format_number(v: f64) -> String {
    if !v.is_finite() {
        return "0".into();
    }
    let scale = 10f64.powi(MAX_DECIMALS);
    let rounded = (v * scale).round() / scale;
    if rounded == 0.0 {
        return "0".into();
    }
    let s = format!("{:.*}", MAX_DECIMALS as usize, rounded);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn is_inline(expr: &Sexpr) -> bool {
    match expr {
        Sexpr::List(items) => {
            expr.head().is_some_and(|h| INLINE_HEADS.contains(&h))
                || !items.iter().any(|i| matches!(i, Sexpr::List(_)))
        }
        _ => true,
    }
}

fn write_inline(out: &mut String, expr: &Sexpr) {
    match expr {
        Sexpr::List(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_inline(out, item);
            }
            out.push(')');
        }
        Sexpr::Symbol(s) => out.push_str(s),
        Sexpr::Str(s) => out.push_str(&escape(s)),
        Sexpr::Number(v) => out.push_str(&format_number(*v)),
    }
}

fn write_expr(out: &mut String, expr: &Sexpr, depth: usize) {
    let Sexpr::List(items) = expr else {
        write_inline(out, expr);
        return;
    };
    if is_inline(expr) {
        write_inline(out, expr);
        return;
    }
    out.push('(');
    // Leading atoms share the opening line.
    let lead = items
        .iter()
        .take_while(|i| !matches!(i, Sexpr::List(_)))
        .count();
    for (i, item) in items[..lead].iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_inline(out, item);
    }
    for item in &items[lead..] {
        out.push('\n');
        for _ in 0..=depth {
            out.push_str(INDENT);
        }
        write_expr(out, item, depth + 1);
    }
    out.push('\n');
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push(')');
}

/// Render a document, terminated by a newline.
pub fn format_sexpr(expr: &Sexpr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, 0);
    out.push('\n');
    out
}

impl std::fmt::Display for Sexpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        write_inline(&mut out, self);
        f.write_str(&out)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

fn quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('"'),
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", tag("\\")),
                    value("\"", tag("\"")),
                    value("\n", tag("n")),
                    value("\t", tag("t")),
                )),
            )),
            char('"'),
        ),
        Option::unwrap_or_default,
    )(input)
}

fn looks_numeric(token: &str) -> bool {
    let rest = token.trim_start_matches(['-', '+']);
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    rest.chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn atom(input: &str) -> IResult<&str, Sexpr> {
    map(
        take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')' && c != '"'),
        |token: &str| match token.parse::<f64>() {
            Ok(v) if looks_numeric(token) => Sexpr::Number(v),
            _ => Sexpr::Symbol(token.to_string()),
        },
    )(input)
}

fn list(input: &str) -> IResult<&str, Sexpr> {
    map(
        delimited(
            char('('),
            many0(preceded(multispace0, expr)),
            preceded(multispace0, char(')')),
        ),
        Sexpr::List,
    )(input)
}

fn expr(input: &str) -> IResult<&str, Sexpr> {
    alt((list, map(quoted, Sexpr::Str), atom))(input)
}

/// Parse a single document.
pub fn parse(input: &str) -> Result<Sexpr, SexprError> {
    match preceded(multispace0, expr)(input) {
        Ok((rest, doc)) => {
            let rest = rest.trim_start();
            if rest.is_empty() {
                Ok(doc)
            } else {
                Err(SexprError::Trailing(rest.chars().take(40).collect()))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(SexprError::Syntax {
            context: e.input.chars().take(40).collect(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(SexprError::Syntax {
            context: String::new(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
