use miette::Diagnostic;
use miette::SourceSpan;
use thiserror::Error;

use crate::ast::Assertion;
use crate::ast::BaseUrl;
use crate::ast::Config;
use crate::ast::Header;
use crate::ast::Headers;
use crate::ast::Method;
use crate::ast::Request;
use crate::ast::SourceFile;
use crate::ast::Statement;
use crate::ast::Test;
use crate::ast::Variables;
use crate::diagnostics::Warning;
use crate::lexer::LexError;
use crate::lexer::Lexer;
use crate::lexer::Span;
use crate::lexer::Token;
use crate::lexer::TokenKind;

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),

    #[error("expected {expected}, found {found} (`{text}`) at line {line}, column {column}")]
    #[diagnostic(code(testlang::parse::unexpected_token))]
    Unexpected {
        expected: String,
        found: TokenKind,
        text: String,
        line: usize,
        column: usize,
        #[label("unexpected {found}")]
        span: SourceSpan,
    },

    #[error("status code `{text}` at line {line}, column {column} is out of range")]
    #[diagnostic(
        code(testlang::parse::status_out_of_range),
        help("status codes are three digit numbers such as 200 or 404")
    )]
    StatusOutOfRange {
        text: String,
        line: usize,
        column: usize,
        #[label("not a status code")]
        span: SourceSpan,
    },
}

/// A successfully parsed file together with every warning raised on the way.
#[derive(Debug)]
pub struct Parsed {
    pub file: SourceFile,
    pub warnings: Vec<Warning>,
}

/// A parse error together with the warnings raised before it.
#[derive(Debug)]
pub struct ParseFailure {
    pub error: ParseError,
    pub warnings: Vec<Warning>,
}

pub fn parse(src: &str) -> Result<Parsed, ParseFailure> {
    let mut lexer = Lexer::new(src);
    let current = match lexer.next() {
        Some(Ok(token)) => token,
        Some(Err(e)) => {
            return Err(ParseFailure {
                error: e.into(),
                warnings: lexer.take_warnings(),
            });
        }
        None => unreachable!("the lexer always yields an end of input token"),
    };

    let mut parser = Parser::new(lexer, current);
    let result = parser.parse_file();
    let warnings = parser.into_warnings();
    match result {
        Ok(file) => Ok(Parsed { file, warnings }),
        Err(error) => Err(ParseFailure { error, warnings }),
    }
}

/// Recursive-descent parser with a single token of lookahead.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    warnings: Vec<Warning>,
}

impl<'src> Parser<'src> {
    /// `current` is the first token already taken from `lexer`.
    pub fn new(lexer: Lexer<'src>, current: Token) -> Self {
        Self {
            lexer,
            current,
            warnings: Vec::new(),
        }
    }

    pub fn into_warnings(mut self) -> Vec<Warning> {
        let mut warnings = self.lexer.take_warnings();
        warnings.append(&mut self.warnings);
        warnings.sort_by_key(|w| w.span.offset());
        warnings
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        if self.at(TokenKind::Eof) {
            return Ok(self.current.clone());
        }
        let next = match self.lexer.next() {
            Some(token) => token?,
            None => unreachable!("the lexer stops only after end of input"),
        };
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(kind) {
            self.advance()
        } else {
            Err(self.unexpected(kind.to_string()))
        }
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        ParseError::Unexpected {
            expected: expected.into(),
            found: self.current.kind,
            text: self.current.text.clone(),
            line: self.current.line,
            column: self.current.column,
            span: self.current.span.into(),
        }
    }

    pub fn parse_file(&mut self) -> Result<SourceFile, ParseError> {
        let config = if self.at(TokenKind::Config) {
            Some(self.config()?)
        } else {
            None
        };

        let mut variables = Variables::default();
        while self.at(TokenKind::Let) {
            self.variable(&mut variables)?;
        }

        let mut tests = Vec::new();
        while self.at(TokenKind::Test) {
            tests.push(self.test()?);
        }

        if !self.at(TokenKind::Eof) {
            let expected = if tests.is_empty() {
                "`let`, `test` or end of input"
            } else {
                "`test` or end of input"
            };
            return Err(self.unexpected(expected));
        }

        Ok(SourceFile {
            config,
            variables,
            tests,
        })
    }

    fn config(&mut self) -> Result<Config, ParseError> {
        self.expect(TokenKind::Config)?;
        self.expect(TokenKind::LBrace)?;

        let mut config = Config::default();
        loop {
            match self.current.kind {
                TokenKind::BaseUrl => {
                    self.advance()?;
                    self.expect(TokenKind::Equals)?;
                    let url = self.expect(TokenKind::Str)?;
                    self.expect(TokenKind::Semicolon)?;
                    config.base_url = Some(BaseUrl {
                        value: url.text,
                        span: url.span,
                    });
                }
                TokenKind::Header => {
                    let header = self.header_decl()?;
                    config.headers.insert(header);
                }
                TokenKind::RBrace => break,
                _ => return Err(self.unexpected("`base_url`, `header` or `}`")),
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(config)
    }

    fn header_decl(&mut self) -> Result<Header, ParseError> {
        self.expect(TokenKind::Header)?;
        let name = self.expect(TokenKind::Str)?;
        self.expect(TokenKind::Equals)?;
        let value = self.expect(TokenKind::Str)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Header {
            name: name.text,
            value: value.text,
            span: name.span,
        })
    }

    fn variable(&mut self, variables: &mut Variables) -> Result<(), ParseError> {
        self.expect(TokenKind::Let)?;
        let name = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::Equals)?;
        let value = match self.current.kind {
            TokenKind::Str | TokenKind::Number => self.advance()?,
            _ => return Err(self.unexpected("string or number")),
        };
        self.expect(TokenKind::Semicolon)?;
        variables.insert(name.text, value.text);
        Ok(())
    }

    fn test(&mut self) -> Result<Test, ParseError> {
        self.expect(TokenKind::Test)?;
        let name = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::LBrace)?;

        let mut statements = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::RBrace => break,
                TokenKind::Get | TokenKind::Post | TokenKind::Put | TokenKind::Delete => {
                    statements.push(self.statement()?);
                }
                _ => return Err(self.unexpected("HTTP method or `}`")),
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Test {
            name: name.text,
            span: name.span,
            statements,
        })
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let request = self.request()?;

        let mut assertions = Vec::new();
        while self.at(TokenKind::Expect) {
            assertions.push(self.assertion()?);
        }

        if assertions.is_empty() {
            Ok(Statement::Request(request))
        } else {
            Ok(Statement::Checked {
                request,
                assertions,
            })
        }
    }

    fn request(&mut self) -> Result<Request, ParseError> {
        let method = match self.current.kind {
            TokenKind::Get => Method::Get,
            TokenKind::Post => Method::Post,
            TokenKind::Put => Method::Put,
            TokenKind::Delete => Method::Delete,
            _ => return Err(self.unexpected("HTTP method")),
        };
        let method_token = self.advance()?;
        let path = self.expect(TokenKind::Str)?;

        let mut headers = Headers::default();
        let mut body = None;

        if self.at(TokenKind::LBrace) {
            self.advance()?;
            loop {
                match self.current.kind {
                    TokenKind::Header => headers.insert(self.header_decl()?),
                    TokenKind::Body => {
                        let keyword = self.advance()?;
                        self.expect(TokenKind::Equals)?;
                        let value = self.expect(TokenKind::Str)?;
                        self.expect(TokenKind::Semicolon)?;
                        if !method.sends_body() {
                            self.warnings.push(Warning::new(
                                format!(
                                    "body at line {}, column {} is not sent with a {} request",
                                    keyword.line,
                                    keyword.column,
                                    method.as_str()
                                ),
                                keyword.span,
                            ));
                        }
                        body = Some(value.text);
                    }
                    TokenKind::RBrace => break,
                    TokenKind::Eof => return Err(self.unexpected("`}`")),
                    _ => self.skip_block_item()?,
                }
            }
            self.expect(TokenKind::RBrace)?;
        }

        if self.at(TokenKind::Semicolon) {
            self.advance()?;
        }

        Ok(Request {
            method,
            path: path.text,
            headers,
            body,
            span: method_token.span,
        })
    }

    /// Skips an unrecognized item inside a request block, up to and including
    /// its `;`, or up to the closing `}`. Braces opened by the item are
    /// skipped along with it.
    fn skip_block_item(&mut self) -> Result<(), ParseError> {
        let first = self.current.clone();
        let mut end = first.span.end;
        let mut depth = 0usize;

        loop {
            match self.current.kind {
                TokenKind::Eof => return Err(self.unexpected("`}`")),
                TokenKind::Semicolon if depth == 0 => {
                    end = self.advance()?.span.end;
                    break;
                }
                TokenKind::RBrace if depth == 0 => break,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        end = self.advance()?.span.end;
                        if self.at(TokenKind::Semicolon) {
                            end = self.advance()?.span.end;
                        }
                        break;
                    }
                }
                _ => {}
            }
            end = self.advance()?.span.end;
        }

        self.warnings.push(Warning::new(
            format!(
                "skipping unrecognized {} (`{}`) in request block at line {}, column {}",
                first.kind, first.text, first.line, first.column
            ),
            Span {
                start: first.span.start,
                end,
            },
        ));
        Ok(())
    }

    fn assertion(&mut self) -> Result<Assertion, ParseError> {
        self.expect(TokenKind::Expect)?;

        let assertion = match self.current.kind {
            TokenKind::Status => {
                self.advance()?;
                self.expect(TokenKind::Equals)?;
                let number = self.expect(TokenKind::Number)?;
                let code = number
                    .text
                    .parse::<u16>()
                    .map_err(|_| ParseError::StatusOutOfRange {
                        text: number.text.clone(),
                        line: number.line,
                        column: number.column,
                        span: number.span.into(),
                    })?;
                Assertion::Status {
                    code,
                    span: number.span,
                }
            }
            TokenKind::Header => {
                self.advance()?;
                let name = self.expect(TokenKind::Str)?;
                match self.current.kind {
                    TokenKind::Equals => {
                        self.advance()?;
                        let value = self.expect(TokenKind::Str)?;
                        Assertion::HeaderEquals {
                            name: name.text,
                            value: value.text,
                            span: name.span,
                        }
                    }
                    TokenKind::Contains => {
                        self.advance()?;
                        let substring = self.expect(TokenKind::Str)?;
                        Assertion::HeaderContains {
                            name: name.text,
                            substring: substring.text,
                            span: name.span,
                        }
                    }
                    _ => return Err(self.unexpected("`=` or `contains`")),
                }
            }
            TokenKind::Body => {
                self.advance()?;
                self.expect(TokenKind::Contains)?;
                let substring = self.expect(TokenKind::Str)?;
                Assertion::BodyContains {
                    substring: substring.text,
                }
            }
            _ => return Err(self.unexpected("`status`, `header` or `body`")),
        };

        self.expect(TokenKind::Semicolon)?;
        Ok(assertion)
    }
}
