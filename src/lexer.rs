use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use miette::Diagnostic;
use miette::SourceSpan;
use serde::Serialize;
use thiserror::Error;

use crate::diagnostics::Warning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Config,
    BaseUrl,
    Header,
    Let,
    Test,
    Get,
    Post,
    Put,
    Delete,
    Expect,
    Status,
    Body,
    Contains,

    Ident,
    Str,
    Number,
    VarRef,

    Equals,
    Semicolon,
    LBrace,
    RBrace,
    LParen,
    RParen,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Config => "`config`",
            TokenKind::BaseUrl => "`base_url`",
            TokenKind::Header => "`header`",
            TokenKind::Let => "`let`",
            TokenKind::Test => "`test`",
            TokenKind::Get => "`GET`",
            TokenKind::Post => "`POST`",
            TokenKind::Put => "`PUT`",
            TokenKind::Delete => "`DELETE`",
            TokenKind::Expect => "`expect`",
            TokenKind::Status => "`status`",
            TokenKind::Body => "`body`",
            TokenKind::Contains => "`contains`",
            TokenKind::Ident => "identifier",
            TokenKind::Str => "string",
            TokenKind::Number => "number",
            TokenKind::VarRef => "variable reference",
            TokenKind::Equals => "`=`",
            TokenKind::Semicolon => "`;`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Eof => "end of input",
        };
        f.write_str(s)
    }
}

/// Byte range of a token in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.start.into(), span.end - span.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Keyword or identifier text, the unescaped contents of a string, the
    /// digits of a number, or the name of a `$` reference.
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub span: Span,
}

#[derive(Debug, Error, Diagnostic)]
pub enum LexError {
    #[error("unterminated string literal starting at line {line}, column {column}")]
    #[diagnostic(
        code(testlang::lex::unterminated_string),
        help("close the string with a `\"`")
    )]
    UnterminatedString {
        line: usize,
        column: usize,
        #[label("string starts here")]
        span: SourceSpan,
    },
}

fn keyword(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "config" => TokenKind::Config,
        "base_url" => TokenKind::BaseUrl,
        "header" => TokenKind::Header,
        "let" => TokenKind::Let,
        "test" => TokenKind::Test,
        "GET" => TokenKind::Get,
        "POST" => TokenKind::Post,
        "PUT" => TokenKind::Put,
        "DELETE" => TokenKind::Delete,
        "expect" => TokenKind::Expect,
        "status" => TokenKind::Status,
        "body" => TokenKind::Body,
        "contains" => TokenKind::Contains,
        _ => return None,
    };
    Some(kind)
}

/// Letters, ASCII digits and `_`. Test names end up in generated function
/// names, so other numeric characters such as `²` are not accepted.
pub fn is_ident_char(c: char) -> bool {
    c.is_alphabetic() || c.is_ascii_digit() || c == '_'
}

/// Lazily turns source text into tokens.
///
/// The lexer is an iterator that yields exactly one `Eof` token at the end
/// of the input and then stops. Unknown characters are skipped and recorded
/// as warnings, which can be drained with [`Lexer::take_warnings`].
pub struct Lexer<'src> {
    src: &'src str,
    chars: Peekable<CharIndices<'src>>,
    line: usize,
    column: usize,
    done: bool,
    warnings: Vec<Warning>,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            line: 1,
            column: 1,
            done: false,
            warnings: Vec::new(),
        }
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.src.len(), |&(i, _)| i)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            let start = self.offset();
            let (line, column) = (self.line, self.column);

            let Some(c) = self.peek() else {
                return Ok(self.token(TokenKind::Eof, String::new(), start, line, column));
            };

            let kind = match c {
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '/' if self.peek_second() == Some('/') => {
                    self.eat_while(|c| c != '\n');
                    continue;
                }
                '"' => return self.string(start, line, column),
                '$' => {
                    self.bump();
                    let name = self.eat_while(is_ident_char);
                    if name.is_empty() {
                        let span = Span { start, end: self.offset() };
                        self.warnings.push(Warning::new(
                            format!("`$` without a variable name at line {line}, column {column}"),
                            span,
                        ));
                        continue;
                    }
                    return Ok(self.token(TokenKind::VarRef, name, start, line, column));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let text = self.eat_while(is_ident_char);
                    let kind = keyword(&text).unwrap_or(TokenKind::Ident);
                    return Ok(self.token(kind, text, start, line, column));
                }
                c if c.is_ascii_digit() => {
                    let digits = self.eat_while(|c| c.is_ascii_digit());
                    return Ok(self.token(TokenKind::Number, digits, start, line, column));
                }
                '=' => TokenKind::Equals,
                ';' => TokenKind::Semicolon,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                other => {
                    self.bump();
                    let span = Span { start, end: self.offset() };
                    self.warnings.push(Warning::new(
                        format!("unknown character `{other}` at line {line}, column {column}"),
                        span,
                    ));
                    continue;
                }
            };

            self.bump();
            return Ok(self.token(kind, c.to_string(), start, line, column));
        }
    }

    fn string(&mut self, start: usize, line: usize, column: usize) -> Result<Token, LexError> {
        self.bump();
        let mut value = String::new();

        loop {
            match self.bump() {
                None => {
                    return Err(LexError::UnterminatedString {
                        line,
                        column,
                        span: SourceSpan::new(start.into(), 1),
                    });
                }
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => {
                        return Err(LexError::UnterminatedString {
                            line,
                            column,
                            span: SourceSpan::new(start.into(), 1),
                        });
                    }
                },
                Some(c) => value.push(c),
            }
        }

        Ok(self.token(TokenKind::Str, value, start, line, column))
    }

    fn token(
        &mut self,
        kind: TokenKind,
        text: String,
        start: usize,
        line: usize,
        column: usize,
    ) -> Token {
        let end = self.offset();
        Token {
            kind,
            text,
            line,
            column,
            span: Span { start, end },
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        if matches!(&token, Ok(t) if t.kind == TokenKind::Eof) || token.is_err() {
            self.done = true;
        }
        Some(token)
    }
}
