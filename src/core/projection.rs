//! Field-selection expressions
//!
//! # Grammar
//!
//! ```text
//! fields  := entry ("," entry)*
//! entry   := "*" | [alias ":"] name ["(" params ")"] ["{" fields "}"]
//! params  := param ("," param)*
//! param   := name ":" value
//! value   := "quoted" | 'quoted' | {json object} | [json array] | bare
//! ```
//!
//! Bare values are read as JSON numbers, booleans or null when they parse as
//! such, and as strings otherwise.
//!
//! ```text
//! id,title,a:author{name},comments(sort:"-created",limit:5){*,author{name}}
//! ```
//!
//! Parsing only checks syntax. Names are checked against schemas and the
//! resource graph when the projection is planned.

use crate::core::error::{GraphError, GraphResult};
use crate::core::field::ParamValues;
use serde_json::Value;
use std::fmt;

/// One entry of a field selection
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionField {
    /// Source field or sub-resource name; `*` for the wildcard
    pub name: String,
    pub alias: Option<String>,
    pub params: ParamValues,
    pub children: Vec<ProjectionField>,
}

impl ProjectionField {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
            params: ParamValues::new(),
            children: Vec::new(),
        }
    }

    pub fn wildcard() -> Self {
        Self::new("*")
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }

    /// Key under which the value is returned
    pub fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Parse a field-selection expression; an empty expression selects `*`
    pub fn parse(expr: &str) -> GraphResult<Vec<ProjectionField>> {
        let mut parser = Parser {
            src: expr,
            pos: 0,
        };
        parser.skip_ws();
        if parser.at_end() {
            return Ok(vec![ProjectionField::wildcard()]);
        }
        let fields = parser.parse_fields()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("unexpected character"));
        }
        Ok(fields)
    }
}

impl fmt::Display for ProjectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{}:", alias)?;
        }
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect();
            write!(f, "({})", params.join(","))?;
        }
        if !self.children.is_empty() {
            let children: Vec<String> = self.children.iter().map(|c| c.to_string()).collect();
            write!(f, "{{{}}}", children.join(","))?;
        }
        Ok(())
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> GraphError {
        GraphError::query_parse(
            Some("fields"),
            format!("{} at position {}", message, self.pos),
        )
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> GraphResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn name(&mut self) -> GraphResult<String> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            self.bump();
        }
        if start == self.pos {
            return Err(self.error("expected a field name"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_fields(&mut self) -> GraphResult<Vec<ProjectionField>> {
        let mut fields = vec![self.parse_entry()?];
        while self.eat(',') {
            fields.push(self.parse_entry()?);
        }
        Ok(fields)
    }

    fn parse_entry(&mut self) -> GraphResult<ProjectionField> {
        if self.eat('*') {
            return Ok(ProjectionField::wildcard());
        }
        let mut field = ProjectionField::new(&self.name()?);
        if self.eat(':') {
            field.alias = Some(std::mem::take(&mut field.name));
            field.name = self.name()?;
        }
        if self.eat('(') {
            loop {
                let name = self.name()?;
                self.expect(':')?;
                let value = self.value()?;
                if field.params.insert(name.clone(), value).is_some() {
                    return Err(self.error(&format!("duplicate parameter '{}'", name)));
                }
                if !self.eat(',') {
                    break;
                }
            }
            self.expect(')')?;
        }
        if self.eat('{') {
            field.children = self.parse_fields()?;
            self.expect('}')?;
        }
        Ok(field)
    }

    fn value(&mut self) -> GraphResult<Value> {
        self.skip_ws();
        match self.peek() {
            Some(quote @ ('"' | '\'')) => self.quoted(quote).map(Value::String),
            Some('{' | '[') => self.json_literal(),
            Some(_) => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c != ',' && c != ')') {
                    self.bump();
                }
                let raw = self.src[start..self.pos].trim();
                if raw.is_empty() {
                    return Err(self.error("expected a value"));
                }
                Ok(match serde_json::from_str::<Value>(raw) {
                    Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => v,
                    _ => Value::String(raw.to_string()),
                })
            }
            None => Err(self.error("expected a value")),
        }
    }

    fn quoted(&mut self, quote: char) -> GraphResult<String> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => break,
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(self.error("unterminated string"))
    }

    /// Balanced JSON object or array, strings respected
    fn json_literal(&mut self) -> GraphResult<Value> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut in_string = false;
        while let Some(c) = self.bump() {
            match c {
                '\\' if in_string => {
                    self.bump();
                }
                '"' => in_string = !in_string,
                '{' | '[' if !in_string => depth += 1,
                '}' | ']' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        let raw = &self.src[start..self.pos];
                        return serde_json::from_str(raw)
                            .map_err(|e| self.error(&format!("invalid JSON value: {}", e)));
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unterminated JSON value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_flat_list() {
        let fields = ProjectionField::parse("id, title ,body").unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "title", "body"]);
    }

    #[test]
    fn test_empty_expression_is_wildcard() {
        let fields = ProjectionField::parse("  ").unwrap();
        assert_eq!(fields, vec![ProjectionField::wildcard()]);
    }

    #[test]
    fn test_parse_alias_params_children() {
        let fields = ProjectionField::parse(
            r#"t:title(max:10),author{name,email},comments(sort:"-created",limit:5,filter:{"spam":false}){*,u:user{name}}"#,
        )
        .unwrap();
        assert_eq!(fields.len(), 3);

        assert_eq!(fields[0].key(), "t");
        assert_eq!(fields[0].name, "title");
        assert_eq!(fields[0].params["max"], json!(10));

        assert_eq!(fields[1].children.len(), 2);

        let comments = &fields[2];
        assert_eq!(comments.params["sort"], json!("-created"));
        assert_eq!(comments.params["limit"], json!(5));
        assert_eq!(comments.params["filter"], json!({"spam": false}));
        assert!(comments.children[0].is_wildcard());
        assert_eq!(comments.children[1].key(), "u");
        assert_eq!(comments.children[1].children[0].name, "name");
    }

    #[test]
    fn test_bare_values() {
        let fields = ProjectionField::parse("f(a:1.5,b:true,c:null,d:hello world,e:'x,y')").unwrap();
        let p = &fields[0].params;
        assert_eq!(p["a"], json!(1.5));
        assert_eq!(p["b"], json!(true));
        assert_eq!(p["c"], Value::Null);
        assert_eq!(p["d"], json!("hello world"));
        assert_eq!(p["e"], json!("x,y"));
    }

    #[test]
    fn test_json_literal_with_braces_in_strings() {
        let fields = ProjectionField::parse(r#"f(filter:{"name":"a}b"})"#).unwrap();
        assert_eq!(fields[0].params["filter"], json!({"name": "a}b"}));
    }

    #[test]
    fn test_syntax_errors() {
        for expr in [
            "id,",
            "a{b",
            "a(b)",
            "a(b:1",
            "a(b:'x)",
            "a(b:{\"x\":1)",
            "a(b:1,b:2)",
            "a}",
            ":x",
            "a b",
        ] {
            let err = ProjectionField::parse(expr).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::QueryParse, "expression {:?}", expr);
        }
    }

    #[test]
    fn test_display_roundtrip() {
        let expr = "t:title(max:10),author{name,*}";
        let fields = ProjectionField::parse(expr).unwrap();
        let rendered: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        assert_eq!(rendered.join(","), expr);
    }
}
