use crate::ast::Assertion;
use crate::generator::literal;

/// Lowers one assertion into a single statement of the generated test.
///
/// The statement reads the `status`, `resp_headers` and `body` bindings that
/// the generator declares after every request. An absent response header
/// compares as the empty string. When `normalize_body` is set, whitespace is
/// stripped from both the body and the expected text before comparing.
pub fn lower(assertion: &Assertion, normalize_body: bool) -> String {
    match assertion {
        Assertion::Status { code, .. } => {
            let message = format!("Status code should be {code}");
            format!(
                "assert_eq!(status, {code}, \"{{}}\", {});",
                literal(&message)
            )
        }
        Assertion::HeaderEquals { name, value, .. } => {
            let message = format!("Header {name} should equal {value}");
            format!(
                "assert_eq!(response_header(&resp_headers, {}), {}, \"{{}}\", {});",
                literal(name),
                literal(value),
                literal(&message)
            )
        }
        Assertion::HeaderContains {
            name, substring, ..
        } => {
            let message = format!("Header {name} should contain {substring}");
            format!(
                "assert!(response_header(&resp_headers, {}).contains({}), \"{{}}\", {});",
                literal(name),
                literal(substring),
                literal(&message)
            )
        }
        Assertion::BodyContains { substring } => {
            let message = format!("Body should contain {substring}");
            if normalize_body {
                format!(
                    "assert!(normalize_ws(&body).contains(&normalize_ws({})), \"{{}}\", {});",
                    literal(substring),
                    literal(&message)
                )
            } else {
                format!(
                    "assert!(body.contains({}), \"{{}}\", {});",
                    literal(substring),
                    literal(&message)
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Span;

    #[test]
    fn lower_status() {
        let assertion = Assertion::Status {
            code: 404,
            span: Span::default(),
        };
        assert_eq!(
            lower(&assertion, false),
            r#"assert_eq!(status, 404, "{}", "Status code should be 404");"#
        );
    }

    #[test]
    fn lower_header_equals() {
        let assertion = Assertion::HeaderEquals {
            name: "Content-Type".into(),
            value: "application/json".into(),
            span: Span::default(),
        };
        assert_eq!(
            lower(&assertion, false),
            r#"assert_eq!(response_header(&resp_headers, "Content-Type"), "application/json", "{}", "Header Content-Type should equal application/json");"#
        );
    }

    #[test]
    fn lower_header_contains() {
        let assertion = Assertion::HeaderContains {
            name: "Content-Type".into(),
            substring: "json".into(),
            span: Span::default(),
        };
        let code = lower(&assertion, false);
        assert!(code.starts_with(
            r#"assert!(response_header(&resp_headers, "Content-Type").contains("json")"#
        ));
    }

    #[test]
    fn lower_body_contains_escapes_literal() {
        let assertion = Assertion::BodyContains {
            substring: "\"id\": 42".into(),
        };
        assert_eq!(
            lower(&assertion, false),
            r#"assert!(body.contains("\"id\": 42"), "{}", "Body should contain \"id\": 42");"#
        );
    }

    #[test]
    fn lower_body_contains_normalized() {
        let assertion = Assertion::BodyContains {
            substring: "a b".into(),
        };
        assert!(
            lower(&assertion, true)
                .starts_with(r#"assert!(normalize_ws(&body).contains(&normalize_ws("a b"))"#)
        );
    }

    #[test]
    fn assertion_literals_are_not_substituted() {
        let assertion = Assertion::BodyContains {
            substring: "$id".into(),
        };
        assert!(lower(&assertion, false).contains(r#"body.contains("$id")"#));
    }
}
