use std::collections::HashMap;

use miette::Diagnostic;
use miette::SourceSpan;
use reqwest::StatusCode;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::ast::Assertion;
use crate::ast::Config;
use crate::ast::Header;
use crate::ast::Headers;
use crate::ast::SourceFile;
use crate::ast::Test;
use crate::ast::Variables;
use crate::generator::substitute;

/// Every test needs at least this many assertions across its requests.
pub const MIN_ASSERTIONS: usize = 2;

#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("Test `{test}` must have at least one HTTP request")]
    #[diagnostic(code(testlang::validate::missing_request))]
    MissingRequest {
        test: String,
        #[label("this test sends nothing")]
        span: SourceSpan,
    },

    #[error("Test `{test}` must have at least 2 assertions, found {found}")]
    #[diagnostic(code(testlang::validate::too_few_assertions))]
    TooFewAssertions {
        test: String,
        found: usize,
        #[label("declared here")]
        span: SourceSpan,
    },

    #[error("Test `{test}` is declared more than once")]
    #[diagnostic(code(testlang::validate::duplicate_test), help("each test becomes a function in the generated file"))]
    DuplicateTest {
        test: String,
        #[label("redeclared here")]
        span: SourceSpan,
        #[label("first declared here")]
        first: SourceSpan,
    },

    #[error("Invalid header name `{name}`: {reason}")]
    #[diagnostic(code(testlang::validate::header_name))]
    InvalidHeaderName {
        name: String,
        reason: String,
        #[label("invalid value here")]
        span: SourceSpan,
    },

    #[error("Invalid value for header `{name}`: {reason}")]
    #[diagnostic(
        code(testlang::validate::header_value),
        help("header values can't contain control characters such as newlines")
    )]
    InvalidHeaderValue {
        name: String,
        reason: String,
        #[label("invalid value here")]
        span: SourceSpan,
    },

    #[error("Invalid base URL `{url}`: {reason}")]
    #[diagnostic(code(testlang::validate::base_url))]
    InvalidBaseUrl {
        url: String,
        reason: String,
        #[label("invalid value here")]
        span: SourceSpan,
    },

    #[error("Status code {code} is not between 100 and 999")]
    #[diagnostic(code(testlang::validate::status))]
    StatusOutOfRange {
        code: u16,
        #[label("invalid value here")]
        span: SourceSpan,
    },
}

/// Semantic checks the grammar cannot express.
///
/// Validation stops at the first problem; a file either passes as a whole or
/// nothing is generated for it.
pub struct Validator<'a> {
    file: &'a SourceFile,
}

impl<'a> Validator<'a> {
    pub fn new(file: &'a SourceFile) -> Self {
        Self { file }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(config) = &self.file.config {
            validate_config(config)?;
        }

        let mut seen: HashMap<&str, SourceSpan> = HashMap::new();
        for test in &self.file.tests {
            if let Some(first) = seen.get(test.name.as_str()) {
                return Err(ValidationError::DuplicateTest {
                    test: test.name.clone(),
                    span: test.span.into(),
                    first: *first,
                });
            }
            seen.insert(&test.name, test.span.into());

            validate_test(test, &self.file.variables)?;
        }

        Ok(())
    }
}

fn validate_config(config: &Config) -> Result<(), ValidationError> {
    if let Some(base_url) = &config.base_url {
        let invalid = |reason: String| ValidationError::InvalidBaseUrl {
            url: base_url.value.clone(),
            reason,
            span: base_url.span.into(),
        };

        Url::parse(&base_url.value).map_err(|e| invalid(e.to_string()))?;
    }

    validate_header_names(&config.headers)?;
    for header in config.headers.iter() {
        check_header_value(header, &header.value)?;
    }
    Ok(())
}

/// Checks a single test: it must send at least one request and carry at
/// least [`MIN_ASSERTIONS`] assertions in total. Request header values are
/// checked after `$name` substitution, as they will be sent.
pub fn validate_test(test: &Test, variables: &Variables) -> Result<(), ValidationError> {
    if test.request_count() == 0 {
        return Err(ValidationError::MissingRequest {
            test: test.name.clone(),
            span: test.span.into(),
        });
    }

    let found = test.assertion_count();
    if found < MIN_ASSERTIONS {
        return Err(ValidationError::TooFewAssertions {
            test: test.name.clone(),
            found,
            span: test.span.into(),
        });
    }

    for statement in &test.statements {
        let headers = &statement.request().headers;
        validate_header_names(headers)?;
        for header in headers.iter() {
            check_header_value(header, &substitute(&header.value, variables))?;
        }

        for assertion in statement.assertions() {
            match assertion {
                Assertion::Status { code, span } => {
                    if StatusCode::from_u16(*code).is_err() {
                        return Err(ValidationError::StatusOutOfRange {
                            code: *code,
                            span: (*span).into(),
                        });
                    }
                }
                Assertion::HeaderEquals { name, span, .. }
                | Assertion::HeaderContains { name, span, .. } => {
                    check_header_name(name, (*span).into())?;
                }
                Assertion::BodyContains { .. } => {}
            }
        }
    }

    Ok(())
}

fn validate_header_names(headers: &Headers) -> Result<(), ValidationError> {
    for header in headers.iter() {
        check_header_name(&header.name, header.span.into())?;
    }
    Ok(())
}

fn check_header_name(name: &str, span: SourceSpan) -> Result<(), ValidationError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ValidationError::InvalidHeaderName {
        name: name.to_string(),
        reason: e.to_string(),
        span,
    })?;
    Ok(())
}

fn check_header_value(header: &Header, value: &str) -> Result<(), ValidationError> {
    HeaderValue::from_str(value).map_err(|e| ValidationError::InvalidHeaderValue {
        name: header.name.clone(),
        reason: e.to_string(),
        span: header.span.into(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn validate_src(src: &str) -> Result<(), ValidationError> {
        let parsed = parse(src).unwrap();
        Validator::new(&parsed.file).validate()
    }

    #[test]
    fn accepts_well_formed_test() {
        validate_src(
            r#"test Ok {
                GET "/a";
                expect status = 200;
                GET "/b";
                expect body contains "x";
            }"#,
        )
        .unwrap();
    }

    #[test]
    fn rejects_single_assertion() {
        let err = validate_src("test Thin { GET \"/\"; expect status = 200; }").unwrap_err();
        assert!(matches!(
            &err,
            ValidationError::TooFewAssertions { test, found: 1, .. } if test == "Thin"
        ));
        assert!(err.to_string().contains("Thin"));
    }

    #[test]
    fn rejects_test_without_requests() {
        let err = validate_src("test Empty { }").unwrap_err();
        assert!(matches!(
            &err,
            ValidationError::MissingRequest { test, .. } if test == "Empty"
        ));
        assert_eq!(
            err.to_string(),
            "Test `Empty` must have at least one HTTP request"
        );
    }

    #[test]
    fn assertions_count_across_statements() {
        validate_src(
            r#"test Split {
                GET "/a";
                expect status = 200;
                DELETE "/a"
                expect status = 204;
            }"#,
        )
        .unwrap();
    }

    #[test]
    fn rejects_duplicate_test_names() {
        let err = validate_src(
            r#"test Same { GET "/"; expect status = 200; expect body contains "a"; }
               test Same { GET "/"; expect status = 200; expect body contains "a"; }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateTest { .. }));
    }

    #[test]
    fn rejects_bad_header_name() {
        let err = validate_src(
            r#"test H { GET "/" { header "Bad Header" = "x"; }
                expect status = 200; expect body contains "a"; }"#,
        )
        .unwrap_err();
        assert!(matches!(
            &err,
            ValidationError::InvalidHeaderName { name, .. } if name == "Bad Header"
        ));
    }

    #[test]
    fn accepts_base_url_with_trailing_slash() {
        validate_src(r#"config { base_url = "http://api.local/v1/"; }"#).unwrap();
    }

    #[test]
    fn rejects_config_header_value_with_newline() {
        let err = validate_src(r#"config { header "X" = "a\nb"; }"#).unwrap_err();
        assert!(matches!(
            &err,
            ValidationError::InvalidHeaderValue { name, .. } if name == "X"
        ));
    }

    #[test]
    fn rejects_request_header_value_after_substitution() {
        let err = validate_src(
            r#"let token = "a\rb";
               test H { GET "/" { header "Authorization" = "Bearer $token"; }
                expect status = 200; expect body contains "a"; }"#,
        )
        .unwrap_err();
        assert!(matches!(
            &err,
            ValidationError::InvalidHeaderValue { name, .. } if name == "Authorization"
        ));
    }

    #[test]
    fn rejects_relative_base_url() {
        let err = validate_src(r#"config { base_url = "localhost"; }"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn rejects_impossible_status() {
        let err = validate_src(
            "test S { GET \"/\"; expect status = 42; expect body contains \"a\"; }",
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::StatusOutOfRange { code: 42, .. }));

        let err = validate_src(
            "test S { GET \"/\"; expect status = 1000; expect body contains \"a\"; }",
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::StatusOutOfRange { code: 1000, .. }));
    }

    #[test]
    fn accepts_nonstandard_status() {
        validate_src("test S { GET \"/\"; expect status = 700; expect body contains \"a\"; }")
            .unwrap();
    }
}
