//! Emits a Rust integration test file from a validated [`SourceFile`].
//!
//! The generated file depends on `reqwest` and `tokio` only. Every DSL test
//! becomes one `#[tokio::test]` function, in declaration order. Request URLs,
//! header values and bodies have `$name` references substituted at compile
//! time; assertion literals are emitted as written.

use crate::asserter;
use crate::ast::Request;
use crate::ast::SourceFile;
use crate::ast::Test;
use crate::ast::Variables;
use crate::lexer::is_ident_char;
use crate::settings::GeneratorSettings;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

const INDENT: &str = "    ";

/// Escapes backslash, double quote, newline, carriage return and tab so the
/// text can sit inside a Rust string literal.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Quoted and escaped Rust string literal.
pub fn literal(text: &str) -> String {
    format!("\"{}\"", escape(text))
}

/// Replaces every `$name` with the value of the declared variable `name`.
///
/// The text is scanned once, left to right. A reference takes the longest
/// run of identifier characters after the `$`; undeclared names are left
/// verbatim and substituted values are never scanned again.
pub fn substitute(text: &str, variables: &Variables) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = after
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(after.len());
        let name = &after[..len];

        match variables.get(name) {
            Some(value) if !name.is_empty() => out.push_str(value),
            _ => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    out
}

/// Resolves the URL a request is sent to.
///
/// Absolute `http://` and `https://` paths are used as they are; anything
/// else is appended to the base URL, or to [`DEFAULT_BASE_URL`] when the file
/// sets none.
pub fn resolve_url(base_url: Option<&str>, path: &str, variables: &Variables) -> String {
    let path = substitute(path, variables);
    if path.starts_with("http://") || path.starts_with("https://") {
        path
    } else {
        format!("{}{}", base_url.unwrap_or(DEFAULT_BASE_URL), path)
    }
}

pub struct Generator<'a> {
    file: &'a SourceFile,
    settings: &'a GeneratorSettings,
    out: String,
}

impl<'a> Generator<'a> {
    pub fn new(file: &'a SourceFile, settings: &'a GeneratorSettings) -> Self {
        Self {
            file,
            settings,
            out: String::new(),
        }
    }

    /// Produces the complete test file. `source_name` is only used in the
    /// header comment.
    pub fn generate(mut self, source_name: &str) -> String {
        self.prelude(source_name);
        self.setup();
        self.helpers();

        let file = self.file;
        for test in &file.tests {
            self.test(test);
        }

        self.out
    }

    fn line(&mut self, depth: usize, text: &str) {
        if !text.is_empty() {
            for _ in 0..depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn base_url(&self) -> Option<&'a str> {
        self.file
            .config
            .as_ref()
            .and_then(|c| c.base_url.as_ref())
            .map(|b| b.value.as_str())
    }

    fn normalizes(&self, test: &Test) -> bool {
        self.settings.normalize_body.applies_to(&test.name)
    }

    fn prelude(&mut self, source_name: &str) {
        self.line(0, &format!("// Generated by testlang from `{source_name}`. Do not edit."));
        self.line(0, "//");
        self.line(0, "// Requires the dev-dependencies `reqwest` and `tokio` (features");
        self.line(0, "// `macros` and `rt`).");
        self.line(
            0,
            "#![allow(non_snake_case, unused_mut, unused_variables, dead_code)]",
        );
        self.line(0, "");
        self.line(0, "use std::time::Duration;");
        self.line(0, "");
        self.line(0, "use reqwest::Client;");
        self.line(0, "use reqwest::Method;");
        self.line(0, "use reqwest::header::HeaderMap;");
        self.line(0, "use reqwest::header::HeaderName;");
        self.line(0, "use reqwest::header::HeaderValue;");
        self.line(0, "");
    }

    fn setup(&mut self) {
        let connect = self.settings.connect_timeout_secs;
        let request = self.settings.request_timeout_secs;

        self.line(0, "fn client() -> Client {");
        self.line(1, "Client::builder()");
        self.line(2, &format!(".connect_timeout(Duration::from_secs({connect}))"));
        self.line(2, &format!(".timeout(Duration::from_secs({request}))"));
        self.line(2, ".build()");
        self.line(2, ".expect(\"failed to build HTTP client\")");
        self.line(0, "}");
        self.line(0, "");

        self.line(0, "fn default_headers() -> HeaderMap {");
        self.line(1, "let mut headers = HeaderMap::new();");
        let defaults: Vec<String> = self
            .file
            .config
            .iter()
            .flat_map(|c| c.headers.iter())
            .map(|h| {
                format!(
                    "headers.insert(header_name({}), header_value({}));",
                    literal(&h.name),
                    literal(&h.value)
                )
            })
            .collect();
        for insert in &defaults {
            self.line(1, insert);
        }
        self.line(1, "headers");
        self.line(0, "}");
        self.line(0, "");
    }

    fn helpers(&mut self) {
        self.line(0, "fn header_name(name: &str) -> HeaderName {");
        self.line(
            1,
            "HeaderName::from_bytes(name.as_bytes()).expect(\"invalid header name\")",
        );
        self.line(0, "}");
        self.line(0, "");

        self.line(0, "fn header_value(value: &str) -> HeaderValue {");
        self.line(1, "HeaderValue::from_str(value).expect(\"invalid header value\")");
        self.line(0, "}");
        self.line(0, "");

        self.line(0, "fn response_header(headers: &HeaderMap, name: &str) -> String {");
        self.line(1, "headers");
        self.line(2, ".get(name)");
        self.line(2, ".and_then(|value| value.to_str().ok())");
        self.line(2, ".unwrap_or_default()");
        self.line(2, ".to_string()");
        self.line(0, "}");
        self.line(0, "");

        if self.file.tests.iter().any(|t| self.normalizes(t)) {
            self.line(0, "fn normalize_ws(text: &str) -> String {");
            self.line(1, "text.chars().filter(|c| !c.is_whitespace()).collect()");
            self.line(0, "}");
            self.line(0, "");
        }
    }

    fn test(&mut self, test: &Test) {
        let normalize = self.normalizes(test);

        self.line(0, "#[tokio::test]");
        self.line(0, &format!("async fn test_{}() {{", test.name));
        self.line(1, "let client = client();");

        for statement in &test.statements {
            self.line(0, "");
            self.request(statement.request());
            for assertion in statement.assertions() {
                let lowered = asserter::lower(assertion, normalize);
                self.line(1, &lowered);
            }
        }

        self.line(0, "}");
        self.line(0, "");
    }

    fn request(&mut self, request: &Request) {
        let file = self.file;
        let variables = &file.variables;
        let url = resolve_url(self.base_url(), &request.path, variables);
        let method = request.method.as_str();

        self.line(1, "let mut headers = default_headers();");
        let overrides: Vec<String> = request
            .headers
            .iter()
            .map(|h| {
                format!(
                    "headers.insert(header_name({}), header_value({}));",
                    literal(&h.name),
                    literal(&substitute(&h.value, variables))
                )
            })
            .collect();
        for insert in &overrides {
            self.line(1, insert);
        }

        self.line(1, "let resp = client");
        self.line(2, &format!(".request(Method::{method}, {})", literal(&url)));
        self.line(2, ".headers(headers)");
        if let Some(body) = request.body.as_deref().filter(|_| request.method.sends_body()) {
            let body = substitute(body, variables);
            self.line(2, &format!(".body({})", literal(&body)));
        }
        self.line(2, ".send()");
        self.line(2, ".await");
        self.line(2, &format!(".expect({});", literal(&format!("{method} {url} failed"))));
        self.line(1, "let status = resp.status().as_u16();");
        self.line(1, "let resp_headers = resp.headers().clone();");
        self.line(
            1,
            "let body = resp.text().await.expect(\"failed to read response body\");",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::settings::NormalizeBody;
    use crate::validator::Validator;

    fn compile(src: &str) -> String {
        compile_with(src, &GeneratorSettings::default())
    }

    fn compile_with(src: &str, settings: &GeneratorSettings) -> String {
        let parsed = parse(src).unwrap();
        Validator::new(&parsed.file).validate().unwrap();
        Generator::new(&parsed.file, settings).generate("input.test")
    }

    /// Reads back a Rust string literal the way the compiler would for the
    /// escapes this generator produces.
    fn unescape(literal: &str) -> String {
        let inner = &literal[1..literal.len() - 1];
        let mut out = String::new();
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                other => panic!("unexpected escape {other:?}"),
            }
        }
        out
    }

    fn variables(pairs: &[(&str, &str)]) -> Variables {
        let mut vars = Variables::default();
        for (name, value) in pairs {
            vars.insert(*name, *value);
        }
        vars
    }

    #[test]
    fn escape_reads_back_exactly() {
        for original in [
            "plain",
            "quote \" inside",
            "back\\slash",
            "line\nbreak",
            "tab\tand\rreturn",
            "\\\"\n\t\r mixed \\n",
            "",
        ] {
            let lit = literal(original);
            assert_eq!(unescape(&lit), original);
            assert!(!lit.contains('\n') && !lit.contains('\r') && !lit.contains('\t'));
        }
    }

    #[test]
    fn substitute_replaces_declared_and_keeps_unknown() {
        let vars = variables(&[("id", "42"), ("host", "api")]);
        assert_eq!(substitute("/users/$id", &vars), "/users/42");
        assert_eq!(substitute("$host/$id/$missing", &vars), "api/42/$missing");
        assert_eq!(substitute("cost: $", &vars), "cost: $");
    }

    #[test]
    fn substitute_takes_the_whole_identifier() {
        let vars = variables(&[("id", "42")]);
        assert_eq!(substitute("/$identity", &vars), "/$identity");
        assert_eq!(substitute("/$id-x", &vars), "/42-x");
    }

    #[test]
    fn substitute_does_not_rescan_values() {
        let vars = variables(&[("a", "$b"), ("b", "done")]);
        assert_eq!(substitute("$a $b", &vars), "$b done");

        let vars = variables(&[("b", "done"), ("a", "$b")]);
        assert_eq!(substitute("$a $b", &vars), "$b done");
    }

    #[test]
    fn resolve_url_rules() {
        let vars = variables(&[("id", "7")]);
        assert_eq!(
            resolve_url(None, "/ping", &vars),
            "http://localhost:8080/ping"
        );
        assert_eq!(
            resolve_url(Some("https://api.test"), "/u/$id", &vars),
            "https://api.test/u/7"
        );
        assert_eq!(
            resolve_url(Some("https://api.test"), "https://example.com/hook", &vars),
            "https://example.com/hook"
        );
        assert_eq!(
            resolve_url(None, "http://other/$id", &vars),
            "http://other/7"
        );
    }

    #[test]
    fn generates_substituted_url() {
        let out = compile(
            r#"let x = "42";
            test T { GET "/users/$x"; expect status = 200; expect body contains "ok"; }"#,
        );
        assert!(out.contains(".request(Method::GET, \"http://localhost:8080/users/42\")"));
        assert!(!out.contains("$x"));
    }

    #[test]
    fn request_header_overrides_default() {
        let out = compile(
            r#"config { header "X" = "1"; }
            test T {
                GET "/" { header "X" = "2"; }
                expect status = 200;
                expect body contains "ok";
            }"#,
        );
        let defaults = out.find("headers.insert(header_name(\"X\"), header_value(\"1\"));");
        let override_at = out.find("headers.insert(header_name(\"X\"), header_value(\"2\"));");
        let (defaults, override_at) = (defaults.unwrap(), override_at.unwrap());

        let default_fn = out.find("fn default_headers()").unwrap();
        let test_fn = out.find("async fn test_T()").unwrap();
        assert!(default_fn < defaults && defaults < test_fn);
        assert!(test_fn < override_at);

        let seeded = out.find("let mut headers = default_headers();").unwrap();
        assert!(seeded < override_at);
    }

    #[test]
    fn absolute_url_skips_base() {
        let out = compile(
            r#"config { base_url = "http://api.local"; }
            test Hook {
                POST "https://example.com/hook" { body = "{}"; }
                expect status = 202;
                expect body contains "queued";
            }"#,
        );
        assert!(out.contains(".request(Method::POST, \"https://example.com/hook\")"));
        assert!(!out.contains("http://api.localhttps"));
    }

    #[test]
    fn body_only_for_post_and_put() {
        let out = compile(
            r#"let name = "ann";
            test T {
                PUT "/a" { body = "{\"name\": \"$name\"}"; }
                expect status = 200;
                DELETE "/a" { body = "ignored"; }
                expect status = 204;
            }"#,
        );
        assert!(out.contains(r#".body("{\"name\": \"ann\"}")"#));
        assert!(!out.contains("ignored"));
    }

    #[test]
    fn tests_keep_declaration_order() {
        let out = compile(
            r#"
            test Zeta { GET "/"; expect status = 200; expect body contains "a"; }
            test Alpha { GET "/"; expect status = 200; expect body contains "a"; }
            test Mid { GET "/"; expect status = 200; expect body contains "a"; }
            "#,
        );
        let zeta = out.find("async fn test_Zeta()").unwrap();
        let alpha = out.find("async fn test_Alpha()").unwrap();
        let mid = out.find("async fn test_Mid()").unwrap();
        assert!(zeta < alpha && alpha < mid);
    }

    #[test]
    fn empty_default_headers_without_config() {
        let out = compile(r#"test T { GET "/"; expect status = 200; expect body contains "a"; }"#);
        assert!(out.contains(
            "fn default_headers() -> HeaderMap {\n    let mut headers = HeaderMap::new();\n    headers\n}"
        ));
        assert!(!out.contains("fn normalize_ws"));
    }

    #[test]
    fn normalization_is_per_test() {
        let settings = GeneratorSettings {
            normalize_body: NormalizeBody::Tests(vec!["Loose".into()]),
            ..GeneratorSettings::default()
        };
        let out = compile_with(
            r#"
            test Strict { GET "/"; expect status = 200; expect body contains "a b"; }
            test Loose { GET "/"; expect status = 200; expect body contains "a b"; }
            "#,
            &settings,
        );
        assert!(out.contains("fn normalize_ws(text: &str) -> String"));

        let loose = out.find("async fn test_Loose()").unwrap();
        let (strict_part, loose_part) = out.split_at(loose);
        assert!(strict_part.contains(r#"assert!(body.contains("a b")"#));
        assert!(loose_part.contains(r#"normalize_ws(&body).contains(&normalize_ws("a b"))"#));
    }

    #[test]
    fn timeouts_come_from_settings() {
        let settings = GeneratorSettings {
            connect_timeout_secs: 2,
            request_timeout_secs: 30,
            ..GeneratorSettings::default()
        };
        let out = compile_with(
            r#"test T { GET "/"; expect status = 200; expect body contains "a"; }"#,
            &settings,
        );
        assert!(out.contains(".connect_timeout(Duration::from_secs(2))"));
        assert!(out.contains(".timeout(Duration::from_secs(30))"));
    }
}
