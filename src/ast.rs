use serde::Serialize;

use crate::lexer::Span;

/// Root of a parsed `.test` file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceFile {
    pub config: Option<Config>,
    pub variables: Variables,
    pub tests: Vec<Test>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    pub base_url: Option<BaseUrl>,
    pub headers: Headers,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaseUrl {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
    pub span: Span,
}

/// Header table keyed by name.
///
/// Names compare ASCII case-insensitively, as HTTP header names do. Inserting
/// a name that is already present replaces its value and keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn insert(&mut self, header: Header) {
        match self
            .0
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(&header.name))
        {
            Some(existing) => *existing = header,
            None => self.0.push(header),
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

/// File-global variable table in declaration order.
///
/// A redeclared name overwrites the earlier value in place.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Variables(Vec<Variable>);

impl Variables {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|v| v.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Variable { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Test {
    pub name: String,
    /// Span of the test name.
    pub span: Span,
    pub statements: Vec<Statement>,
}

impl Test {
    pub fn request_count(&self) -> usize {
        self.statements.len()
    }

    pub fn assertion_count(&self) -> usize {
        self.statements.iter().map(|s| s.assertions().len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum Statement {
    Request(Request),
    Checked {
        request: Request,
        assertions: Vec<Assertion>,
    },
}

impl Statement {
    pub fn request(&self) -> &Request {
        match self {
            Statement::Request(request) => request,
            Statement::Checked { request, .. } => request,
        }
    }

    pub fn assertions(&self) -> &[Assertion] {
        match self {
            Statement::Request(_) => &[],
            Statement::Checked { assertions, .. } => assertions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Only POST and PUT carry a request body.
    pub fn sends_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub method: Method,
    /// Path relative to the base URL, or an absolute `http(s)://` URL.
    pub path: String,
    pub headers: Headers,
    pub body: Option<String>,
    /// Span of the method keyword.
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Assertion {
    Status {
        code: u16,
        span: Span,
    },
    HeaderEquals {
        name: String,
        value: String,
        span: Span,
    },
    HeaderContains {
        name: String,
        substring: String,
        span: Span,
    },
    BodyContains {
        substring: String,
    },
}
