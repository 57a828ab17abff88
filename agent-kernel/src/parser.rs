//! Extraction of tool calls from raw model completions.
//!
//! Two shapes are recognised:
//!
//! * a marker completion, `CALL: name {"arg": value}`, carrying exactly one
//!   call with JSON arguments;
//! * Python-style call statements, `[binding =] name(args)`, one per line
//!   (or separated by `;`), optionally inside fenced code blocks.
//!
//! Everything else is treated as prose and skipped. A call that starts to
//! parse but turns out malformed yields a [`ParseFailure`] in its place and
//! scanning resumes after it, so one bad call never hides the others.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Prefix introducing a single JSON-argument call.
pub const CALL_MARKER: &str = "CALL:";

/// An argument expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A reference to the binding of an earlier call.
    Variable(String),
    /// A list or tuple whose items may reference bindings.
    List(Vec<Expr>),
    /// A dict with string keys whose values may reference bindings.
    Dict(Vec<(String, Expr)>),
}

impl Expr {
    /// Resolves variable references against `scope`.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first undefined variable.
    pub fn evaluate(&self, scope: &HashMap<String, Value>) -> Result<Value, String> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Variable(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| format!("name `{name}` is not defined")),
            Self::List(items) => items
                .iter()
                .map(|item| item.evaluate(scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Dict(entries) => {
                let mut map = Map::new();
                for (key, expr) in entries {
                    map.insert(key.clone(), expr.evaluate(scope)?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

/// A call intent extracted from a completion.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedCall {
    /// Name of the function the model wants to call.
    pub function_name: String,
    /// Positional arguments, bound in parameter declaration order.
    pub positional: Vec<Expr>,
    /// Keyword arguments in the order written.
    pub keyword: Vec<(String, Expr)>,
    /// Variable the result is assigned to, if any.
    pub binding: Option<String>,
}

/// A call that could not be parsed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("parse error: {message}")]
pub struct ParseFailure {
    /// Best-effort function name; empty when none could be recovered.
    pub function_name: String,
    /// What went wrong.
    pub message: String,
}

impl ParseFailure {
    fn new(function_name: &str, message: impl Into<String>) -> Self {
        Self {
            function_name: function_name.to_owned(),
            message: message.into(),
        }
    }
}

/// One parsed call, or the failure standing in for it.
pub type ParsedItem = Result<ParsedCall, ParseFailure>;

/// Extracts calls from `completion` in textual order.
///
/// Returns an empty vector when the completion contains no call.
#[must_use]
pub fn parse_completion(completion: &str) -> Vec<ParsedItem> {
    if let Some(rest) = completion.trim_start().strip_prefix(CALL_MARKER) {
        return vec![parse_marker(rest)];
    }

    let blocks = fenced_blocks(completion);
    if blocks.is_empty() {
        scan_statements(completion, false)
    } else {
        blocks
            .into_iter()
            .flat_map(|block| scan_statements(block, true))
            .collect()
    }
}

fn parse_marker(rest: &str) -> ParsedItem {
    let rest = rest.trim_start();
    let name_len = rest
        .find(|ch: char| !is_identifier_char(ch))
        .unwrap_or(rest.len());
    let (name, args) = rest.split_at(name_len);
    if !is_identifier(name) {
        return Err(ParseFailure::new("", "expected a function name after `CALL:`"));
    }

    // Only the first JSON value counts; trailing prose is ignored.
    let mut values = serde_json::Deserializer::from_str(args).into_iter::<Value>();
    let keyword = match values.next() {
        None => Vec::new(),
        Some(Ok(Value::Object(map))) => map
            .into_iter()
            .map(|(key, value)| (key, Expr::Literal(value)))
            .collect(),
        Some(Ok(_)) => {
            return Err(ParseFailure::new(name, "arguments must be a JSON object"));
        }
        Some(Err(err)) => {
            return Err(ParseFailure::new(name, format!("invalid JSON arguments: {err}")));
        }
    };

    Ok(ParsedCall {
        function_name: name.to_owned(),
        positional: Vec::new(),
        keyword,
        binding: None,
    })
}

/// Returns the bodies of fenced code blocks. An unclosed fence runs to the
/// end of the text.
fn fenced_blocks(text: &str) -> Vec<&str> {
    const FENCE: &str = "```";

    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];
        let first_line = after.find('\n').map_or(after, |end| &after[..end]);
        if let Some(close) = first_line.find(FENCE) {
            blocks.push(&after[..close]);
            rest = &after[close + FENCE.len()..];
            continue;
        }

        let body = &after[first_line.len()..];
        if let Some(close) = body.find(FENCE) {
            blocks.push(&body[..close]);
            rest = &body[close + FENCE.len()..];
        } else {
            blocks.push(body);
            break;
        }
    }
    blocks
}

struct Head<'a> {
    binding: Option<&'a str>,
    name: &'a str,
    args_start: usize,
}

/// Scans `code` for call statements. In `strict` mode (fenced code) text
/// trailing a call on the same line is an error; in prose it just means the
/// line was not a call. Prose lines like `Total(approx 5 USD)` are likewise
/// skipped unless they assign a binding or run off the end of the text.
fn scan_statements(code: &str, strict: bool) -> Vec<ParsedItem> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < code.len() {
        let line_end = next_line(code, pos);
        let Some(head) = statement_head(code, pos) else {
            pos = line_end;
            continue;
        };

        let mut cursor = Cursor::new(code, head.args_start);
        match cursor.arguments() {
            Ok((positional, keyword)) => {
                cursor.skip_inline_ws();
                let tail_end = next_line(code, cursor.pos);
                match cursor.peek() {
                    Some(';') => {
                        cursor.bump();
                        pos = cursor.pos;
                    }
                    None | Some('#' | '\n' | '\r') => pos = tail_end,
                    Some(_) => {
                        if strict {
                            let tail = code[cursor.pos..tail_end].trim();
                            items.push(Err(ParseFailure::new(
                                head.name,
                                format!("unexpected `{tail}` after call"),
                            )));
                        }
                        pos = tail_end;
                        continue;
                    }
                }
                items.push(Ok(ParsedCall {
                    function_name: head.name.to_owned(),
                    positional,
                    keyword,
                    binding: head.binding.map(str::to_owned),
                }));
            }
            Err(SyntaxError::Invalid(_)) if !strict && head.binding.is_none() => {
                pos = line_end;
            }
            Err(err) => {
                items.push(Err(ParseFailure::new(head.name, err.to_string())));
                pos = skip_balanced(code, head.args_start)
                    .map_or(line_end, |end| next_line(code, end));
            }
        }
    }
    items
}

/// Matches `name(` or `binding = name(` at the start of a statement. The
/// parenthesis must follow the name directly, so prose such as
/// "Checking (please wait)" is not mistaken for a call.
fn statement_head(code: &str, pos: usize) -> Option<Head<'_>> {
    let mut cursor = Cursor::new(code, pos);
    cursor.skip_inline_ws();
    let first = cursor.identifier()?;
    if cursor.eat('(') {
        return Some(Head {
            binding: None,
            name: first,
            args_start: cursor.pos,
        });
    }

    cursor.skip_inline_ws();
    if cursor.peek() != Some('=') || cursor.peek_nth(1) == Some('=') {
        return None;
    }
    cursor.bump();
    cursor.skip_inline_ws();
    let name = cursor.identifier()?;
    if !cursor.eat('(') {
        return None;
    }
    Some(Head {
        binding: Some(first),
        name,
        args_start: cursor.pos,
    })
}

fn next_line(code: &str, pos: usize) -> usize {
    code[pos..].find('\n').map_or(code.len(), |offset| pos + offset + 1)
}

/// Finds the end of the bracketed region opened just before `start`,
/// skipping strings and comments.
fn skip_balanced(code: &str, start: usize) -> Option<usize> {
    let mut depth = 1_usize;
    let mut quote: Option<char> = None;
    let mut chars = code[start..].char_indices();
    while let Some((offset, ch)) = chars.next() {
        if let Some(open) = quote {
            match ch {
                '\\' => {
                    chars.next();
                }
                '\n' => quote = None,
                ch if ch == open => quote = None,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '#' => {
                for (_, skipped) in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && chars.all(is_identifier_char)
}

#[derive(Debug, Error)]
enum SyntaxError {
    #[error("unterminated {0}")]
    Unterminated(&'static str),
    #[error("{0}")]
    Invalid(String),
}

type SyntaxResult<T> = Result<T, SyntaxError>;

/// Maximum nesting of lists, tuples and dicts inside one argument.
const MAX_DEPTH: usize = 128;

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos, depth: 0 }
    }

    fn descend(&mut self) -> SyntaxResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(SyntaxError::Invalid("nesting too deep".into()));
        }
        self.depth += 1;
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_inline_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }

    /// Skips whitespace, newlines included, and `#` comments.
    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '#' {
                while !matches!(self.bump(), None | Some('\n')) {}
            } else if ch.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn identifier(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            _ => return None,
        }
        while self.peek().is_some_and(is_identifier_char) {
            self.bump();
        }
        Some(&self.src[start..self.pos])
    }

    /// Parses an argument list up to and including the closing `)`.
    fn arguments(&mut self) -> SyntaxResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut positional = Vec::new();
        let mut keyword = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(SyntaxError::Unterminated("call")),
                Some(')') => {
                    self.bump();
                    return Ok((positional, keyword));
                }
                Some(_) => {}
            }

            if let Some(name) = self.keyword_name() {
                let value = self.expression()?;
                keyword.push((name.to_owned(), value));
            } else if keyword.is_empty() {
                positional.push(self.expression()?);
            } else {
                return Err(SyntaxError::Invalid(
                    "positional argument follows keyword argument".into(),
                ));
            }

            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(')') => return Ok((positional, keyword)),
                None => return Err(SyntaxError::Unterminated("call")),
                Some(other) => {
                    return Err(SyntaxError::Invalid(format!(
                        "expected `,` or `)` but found `{other}`"
                    )));
                }
            }
        }
    }

    /// Consumes `name =` if present.
    fn keyword_name(&mut self) -> Option<&'a str> {
        let start = self.pos;
        if let Some(name) = self.identifier() {
            self.skip_ws();
            if self.peek() == Some('=') && self.peek_nth(1) != Some('=') {
                self.bump();
                return Some(name);
            }
        }
        self.pos = start;
        None
    }

    fn expression(&mut self) -> SyntaxResult<Expr> {
        self.skip_ws();
        let Some(ch) = self.peek() else {
            return Err(SyntaxError::Unterminated("call"));
        };
        match ch {
            '"' | '\'' => Ok(Expr::Literal(Value::String(self.string()?))),
            '[' => {
                self.bump();
                self.descend()?;
                let (items, _) = self.sequence(']', "list")?;
                self.depth -= 1;
                Ok(Expr::List(items))
            }
            '(' => {
                self.bump();
                self.descend()?;
                let (mut items, trailing_comma) = self.sequence(')', "tuple")?;
                self.depth -= 1;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Expr::List(items))
                }
            }
            '{' => {
                self.bump();
                self.descend()?;
                let dict = self.dict()?;
                self.depth -= 1;
                Ok(dict)
            }
            '-' | '+' | '.' | '0'..='9' => Ok(Expr::Literal(self.number()?)),
            ch if ch.is_alphabetic() || ch == '_' => self.name(),
            other => Err(SyntaxError::Invalid(format!(
                "unexpected `{other}` in arguments"
            ))),
        }
    }

    fn name(&mut self) -> SyntaxResult<Expr> {
        let Some(name) = self.identifier() else {
            return Err(SyntaxError::Invalid("expected a name".into()));
        };
        match self.peek() {
            Some('(') => {
                return Err(SyntaxError::Invalid(format!(
                    "nested call to `{name}` is not supported"
                )));
            }
            Some('.') => {
                return Err(SyntaxError::Invalid(format!(
                    "attribute access on `{name}` is not supported"
                )));
            }
            Some('[') => {
                return Err(SyntaxError::Invalid(format!(
                    "subscript on `{name}` is not supported"
                )));
            }
            Some('"' | '\'') => {
                return Err(SyntaxError::Invalid(format!(
                    "string prefix `{name}` is not supported"
                )));
            }
            _ => {}
        }

        Ok(match name {
            "True" | "true" => Expr::Literal(Value::Bool(true)),
            "False" | "false" => Expr::Literal(Value::Bool(false)),
            "None" | "null" => Expr::Literal(Value::Null),
            _ => Expr::Variable(name.to_owned()),
        })
    }

    /// Parses comma-separated expressions up to `close`. Also reports
    /// whether the last item was followed by a comma.
    fn sequence(&mut self, close: char, what: &'static str) -> SyntaxResult<(Vec<Expr>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(SyntaxError::Unterminated(what)),
                Some(ch) if ch == close => {
                    self.bump();
                    return Ok((items, trailing_comma));
                }
                Some(_) => {}
            }

            items.push(self.expression()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => trailing_comma = true,
                Some(ch) if ch == close => return Ok((items, false)),
                None => return Err(SyntaxError::Unterminated(what)),
                Some(other) => {
                    return Err(SyntaxError::Invalid(format!(
                        "expected `,` or `{close}` but found `{other}`"
                    )));
                }
            }
        }
    }

    fn dict(&mut self) -> SyntaxResult<Expr> {
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            let key = match self.peek() {
                None => return Err(SyntaxError::Unterminated("dict")),
                Some('}') => {
                    self.bump();
                    return Ok(Expr::Dict(entries));
                }
                Some('"' | '\'') => self.string()?,
                Some(_) => {
                    return Err(SyntaxError::Invalid("dict keys must be strings".into()));
                }
            };

            self.skip_ws();
            match self.bump() {
                Some(':') => {}
                None => return Err(SyntaxError::Unterminated("dict")),
                Some(other) => {
                    return Err(SyntaxError::Invalid(format!(
                        "expected `:` after dict key but found `{other}`"
                    )));
                }
            }
            entries.push((key, self.expression()?));

            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some('}') => return Ok(Expr::Dict(entries)),
                None => return Err(SyntaxError::Unterminated("dict")),
                Some(other) => {
                    return Err(SyntaxError::Invalid(format!(
                        "expected `,` or `}}` but found `{other}`"
                    )));
                }
            }
        }
    }

    fn string(&mut self) -> SyntaxResult<String> {
        let Some(quote) = self.bump() else {
            return Err(SyntaxError::Unterminated("string"));
        };
        let triple = self.peek() == Some(quote) && self.peek_nth(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut out = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(SyntaxError::Unterminated("string"));
            };
            match ch {
                '\\' => self.escape(&mut out)?,
                ch if ch == quote => {
                    if !triple {
                        return Ok(out);
                    }
                    if self.peek() == Some(quote) && self.peek_nth(1) == Some(quote) {
                        self.bump();
                        self.bump();
                        return Ok(out);
                    }
                    out.push(ch);
                }
                '\n' if !triple => return Err(SyntaxError::Unterminated("string")),
                ch => out.push(ch),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> SyntaxResult<()> {
        let Some(ch) = self.bump() else {
            return Err(SyntaxError::Unterminated("string"));
        };
        match ch {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' | '\'' | '"' | '/' => out.push(ch),
            '\n' => {}
            'x' => out.push(self.code_point(2)?),
            'u' => out.push(self.code_point(4)?),
            'U' => out.push(self.code_point(8)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex(&mut self, digits: usize) -> SyntaxResult<u32> {
        let start = self.pos;
        for _ in 0..digits {
            if !self.bump().is_some_and(|ch| ch.is_ascii_hexdigit()) {
                return Err(SyntaxError::Invalid("invalid escape sequence".into()));
            }
        }
        u32::from_str_radix(&self.src[start..self.pos], 16)
            .map_err(|_| SyntaxError::Invalid("invalid escape sequence".into()))
    }

    /// Decodes a hex escape, joining a `\uXXXX\uXXXX` surrogate pair.
    fn code_point(&mut self, digits: usize) -> SyntaxResult<char> {
        let mut code = self.hex(digits)?;
        if digits == 4
            && (0xD800..0xDC00).contains(&code)
            && self.peek() == Some('\\')
            && self.peek_nth(1) == Some('u')
        {
            self.bump();
            self.bump();
            let low = self.hex(4)?;
            if (0xDC00..0xE000).contains(&low) {
                code = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
            }
        }
        char::from_u32(code).ok_or_else(|| SyntaxError::Invalid("invalid escape sequence".into()))
    }

    fn number(&mut self) -> SyntaxResult<Value> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let mut is_float = false;
        self.digits();
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_digit = match self.peek_nth(1) {
                Some('-' | '+') => self.peek_nth(2),
                other => other,
            };
            if exponent_digit.is_some_and(|ch| ch.is_ascii_digit()) {
                is_float = true;
                self.bump();
                if matches!(self.peek(), Some('-' | '+')) {
                    self.bump();
                }
                self.digits();
            }
        }

        let literal: String = self.src[start..self.pos]
            .chars()
            .filter(|ch| *ch != '_')
            .collect();
        if self.peek().is_some_and(is_identifier_char)
            || !literal.chars().any(|ch| ch.is_ascii_digit())
        {
            return Err(SyntaxError::Invalid(format!(
                "invalid number literal `{}`",
                &self.src[start..self.pos]
            )));
        }

        if is_float {
            literal
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| SyntaxError::Invalid(format!("invalid float literal `{literal}`")))
        } else if let Ok(int) = literal.parse::<i64>() {
            Ok(Value::from(int))
        } else if let Ok(int) = literal.parse::<u64>() {
            Ok(Value::from(int))
        } else {
            Err(SyntaxError::Invalid(format!(
                "integer literal `{literal}` is out of range"
            )))
        }
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|ch| ch.is_ascii_digit() || ch == '_') {
            self.bump();
        }
    }
}
