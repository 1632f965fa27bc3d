//! Just enough GraphQL to route an operation.
//!
//! The parser reads operation and fragment definitions and collects the root
//! field names of the selected operation. Arguments, variable definitions and
//! nested selections are skipped without validation.

use super::InboundRequest;
use crate::project::GraphQlOperationType;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

const MAX_FRAGMENT_DEPTH: usize = 16;
/// Nested inline fragments accepted by the parser.
const MAX_SELECTION_DEPTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphQlParseError {
    #[error("Unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("Unterminated string")]
    UnterminatedString,
    #[error("Unexpected end of document")]
    UnexpectedEnd,
    #[error("Unexpected token {0}")]
    UnexpectedToken(String),
    #[error("Subscriptions are not supported")]
    Subscription,
    #[error("Document contains no operation")]
    NoOperation,
    #[error("Operation '{0}' not found in document")]
    OperationNotFound(String),
    #[error("Document contains several operations; operationName is required")]
    AmbiguousOperation,
    #[error("Selections nested deeper than {0}")]
    TooDeep(usize),
}

/// A GraphQL request as sent over HTTP.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQlRequest {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Value,
}

/// The operation selected from a document.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQlOperation {
    pub kind: GraphQlOperationType,
    pub operation_name: Option<String>,
    /// Root field names in document order, aliases resolved, `__typename` dropped.
    pub root_fields: Vec<String>,
    pub variables: Value,
}

/// Read a GraphQL request from a JSON POST body, an `application/graphql`
/// body, or `query`/`operationName`/`variables` query parameters.
pub fn extract_request(req: &InboundRequest) -> Option<GraphQlRequest> {
    if !req.body.is_empty() {
        let content_type = req.header("content-type").unwrap_or_default();
        if content_type.starts_with("application/graphql") {
            return Some(GraphQlRequest {
                query: req.body_text().into_owned(),
                operation_name: None,
                variables: Value::Null,
            });
        }
        if let Some(body) = req.json_body() {
            // Batched requests route on their first operation.
            let body = match body {
                Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
                other => other,
            };
            if let Some(request) = from_json(body) {
                return Some(request);
            }
        }
    }

    let query = req.query_param("query")?.to_string();
    let variables = req
        .query_param("variables")
        .and_then(|v| serde_json::from_str(v).ok())
        .unwrap_or(Value::Null);
    Some(GraphQlRequest {
        query,
        operation_name: req
            .query_param("operationName")
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        variables,
    })
}

fn from_json(body: Value) -> Option<GraphQlRequest> {
    let Value::Object(mut map) = body else {
        return None;
    };
    let query = match map.remove("query")? {
        Value::String(q) => q,
        _ => return None,
    };
    let operation_name = match map.remove("operationName") {
        Some(Value::String(name)) if !name.is_empty() => Some(name),
        _ => None,
    };
    let variables = match map.remove("variables") {
        // Some clients send variables as an encoded string.
        Some(Value::String(s)) => serde_json::from_str(&s).unwrap_or(Value::Null),
        Some(v) => v,
        None => Value::Null,
    };
    Some(GraphQlRequest {
        query,
        operation_name,
        variables,
    })
}

impl GraphQlRequest {
    pub fn operation(self) -> Result<GraphQlOperation, GraphQlParseError> {
        let document = Parser::new(tokenize(&self.query)?).document()?;
        let op = document.select(self.operation_name.as_deref())?;
        let mut root_fields = Vec::new();
        collect_fields(&op.selections, &document.fragments, 0, &mut root_fields);
        Ok(GraphQlOperation {
            kind: op.kind,
            operation_name: op.name.clone().or(self.operation_name),
            root_fields,
            variables: self.variables,
        })
    }
}

/// Parse `query` and return the selected operation.
pub fn parse_operation(
    query: &str,
    operation_name: Option<&str>,
) -> Result<GraphQlOperation, GraphQlParseError> {
    GraphQlRequest {
        query: query.to_string(),
        operation_name: operation_name.map(str::to_string),
        variables: Value::Null,
    }
    .operation()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Punct(char),
    Spread,
    /// Strings, numbers; their contents never matter for routing.
    Value,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Name(n) => format!("'{n}'"),
            Token::Punct(c) => format!("'{c}'"),
            Token::Spread => "'...'".to_string(),
            Token::Value => "value".to_string(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, GraphQlParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() || c == ',' || c == '\u{feff}' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' && chars[i] != '\r' {
                    i += 1;
                }
            }
            '"' if chars[i..].starts_with(&['"', '"', '"']) => {
                i += 3;
                loop {
                    if i + 2 >= chars.len() {
                        return Err(GraphQlParseError::UnterminatedString);
                    }
                    if chars[i] == '\\' && chars[i + 1..].starts_with(&['"', '"', '"']) {
                        i += 4;
                    } else if chars[i..].starts_with(&['"', '"', '"']) {
                        i += 3;
                        break;
                    } else {
                        i += 1;
                    }
                }
                tokens.push(Token::Value);
            }
            '"' => {
                i += 1;
                loop {
                    match chars.get(i) {
                        None | Some('\n') | Some('\r') => {
                            return Err(GraphQlParseError::UnterminatedString)
                        }
                        Some('\\') => i += 2,
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                tokens.push(Token::Value);
            }
            '.' => {
                if !chars[i..].starts_with(&['.', '.', '.']) {
                    return Err(GraphQlParseError::UnexpectedChar('.'));
                }
                i += 3;
                tokens.push(Token::Spread);
            }
            c if c == '_' || c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i] == '_' || chars[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            c if c == '-' || c.is_ascii_digit() => {
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '+' | '-'))
                {
                    i += 1;
                }
                tokens.push(Token::Value);
            }
            '$' | '!' | ':' | '=' | '@' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '&' => {
                i += 1;
                tokens.push(Token::Punct(c));
            }
            other => return Err(GraphQlParseError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Selection {
    Field(String),
    FragmentSpread(String),
    InlineFragment(Vec<Selection>),
}

#[derive(Debug)]
struct OperationDefinition {
    kind: GraphQlOperationType,
    name: Option<String>,
    selections: Vec<Selection>,
}

#[derive(Debug, Default)]
struct Document {
    operations: Vec<OperationDefinition>,
    fragments: HashMap<String, Vec<Selection>>,
}

impl Document {
    fn select(&self, name: Option<&str>) -> Result<&OperationDefinition, GraphQlParseError> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| GraphQlParseError::OperationNotFound(name.to_string())),
            None => match self.operations.as_slice() {
                [] => Err(GraphQlParseError::NoOperation),
                [only] => Ok(only),
                _ => Err(GraphQlParseError::AmbiguousOperation),
            },
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn expect_punct(&mut self, c: char) -> Result<(), GraphQlParseError> {
        match self.next() {
            Some(Token::Punct(p)) if p == c => Ok(()),
            Some(other) => Err(GraphQlParseError::UnexpectedToken(other.describe())),
            None => Err(GraphQlParseError::UnexpectedEnd),
        }
    }

    fn expect_name(&mut self) -> Result<String, GraphQlParseError> {
        match self.next() {
            Some(Token::Name(n)) => Ok(n),
            Some(other) => Err(GraphQlParseError::UnexpectedToken(other.describe())),
            None => Err(GraphQlParseError::UnexpectedEnd),
        }
    }

    fn skip_balanced(&mut self, open: char, close: char) -> Result<(), GraphQlParseError> {
        self.expect_punct(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.next() {
                Some(Token::Punct(c)) if c == open => depth += 1,
                Some(Token::Punct(c)) if c == close => depth -= 1,
                Some(_) => {}
                None => return Err(GraphQlParseError::UnexpectedEnd),
            }
        }
        Ok(())
    }

    fn skip_directives(&mut self) -> Result<(), GraphQlParseError> {
        while self.peek_punct('@') {
            self.next();
            self.expect_name()?;
            if self.peek_punct('(') {
                self.skip_balanced('(', ')')?;
            }
        }
        Ok(())
    }

    /// Skip variable definitions, type conditions and directives up to the
    /// opening brace of a selection set.
    fn skip_to_selection_set(&mut self) -> Result<(), GraphQlParseError> {
        loop {
            match self.peek() {
                Some(Token::Punct('{')) => return Ok(()),
                Some(Token::Punct('(')) => self.skip_balanced('(', ')')?,
                Some(_) => {
                    self.next();
                }
                None => return Err(GraphQlParseError::UnexpectedEnd),
            }
        }
    }

    fn document(mut self) -> Result<Document, GraphQlParseError> {
        let mut document = Document::default();

        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Punct('{') => {
                    let selections = self.selection_set(0)?;
                    document.operations.push(OperationDefinition {
                        kind: GraphQlOperationType::Query,
                        name: None,
                        selections,
                    });
                }
                Token::Name(keyword) if keyword == "query" || keyword == "mutation" => {
                    self.next();
                    let kind = if keyword == "query" {
                        GraphQlOperationType::Query
                    } else {
                        GraphQlOperationType::Mutation
                    };
                    let name = match self.peek() {
                        Some(Token::Name(n)) => {
                            let n = n.clone();
                            self.next();
                            Some(n)
                        }
                        _ => None,
                    };
                    self.skip_to_selection_set()?;
                    let selections = self.selection_set(0)?;
                    document.operations.push(OperationDefinition {
                        kind,
                        name,
                        selections,
                    });
                }
                Token::Name(keyword) if keyword == "subscription" => {
                    return Err(GraphQlParseError::Subscription);
                }
                Token::Name(keyword) if keyword == "fragment" => {
                    self.next();
                    let name = self.expect_name()?;
                    self.skip_to_selection_set()?;
                    let selections = self.selection_set(0)?;
                    document.fragments.insert(name, selections);
                }
                other => return Err(GraphQlParseError::UnexpectedToken(other.describe())),
            }
        }

        Ok(document)
    }

    fn selection_set(&mut self, depth: usize) -> Result<Vec<Selection>, GraphQlParseError> {
        if depth > MAX_SELECTION_DEPTH {
            return Err(GraphQlParseError::TooDeep(MAX_SELECTION_DEPTH));
        }
        self.expect_punct('{')?;
        let mut selections = Vec::new();

        loop {
            match self.next() {
                Some(Token::Punct('}')) => return Ok(selections),
                Some(Token::Spread) => match self.peek() {
                    Some(Token::Name(n)) if n == "on" => {
                        self.next();
                        self.expect_name()?;
                        self.skip_directives()?;
                        let inner = self.selection_set(depth + 1)?;
                        selections.push(Selection::InlineFragment(inner));
                    }
                    Some(Token::Name(n)) => {
                        let n = n.clone();
                        self.next();
                        self.skip_directives()?;
                        selections.push(Selection::FragmentSpread(n));
                    }
                    Some(_) => {
                        self.skip_directives()?;
                        let inner = self.selection_set(depth + 1)?;
                        selections.push(Selection::InlineFragment(inner));
                    }
                    None => return Err(GraphQlParseError::UnexpectedEnd),
                },
                Some(Token::Name(name)) => {
                    let field = if self.peek_punct(':') {
                        self.next();
                        self.expect_name()?
                    } else {
                        name
                    };
                    if self.peek_punct('(') {
                        self.skip_balanced('(', ')')?;
                    }
                    self.skip_directives()?;
                    if self.peek_punct('{') {
                        self.skip_balanced('{', '}')?;
                    }
                    selections.push(Selection::Field(field));
                }
                Some(other) => return Err(GraphQlParseError::UnexpectedToken(other.describe())),
                None => return Err(GraphQlParseError::UnexpectedEnd),
            }
        }
    }
}

fn collect_fields(
    selections: &[Selection],
    fragments: &HashMap<String, Vec<Selection>>,
    depth: usize,
    out: &mut Vec<String>,
) {
    if depth > MAX_FRAGMENT_DEPTH {
        return;
    }
    for selection in selections {
        match selection {
            Selection::Field(name) if name == "__typename" => {}
            Selection::Field(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Selection::InlineFragment(inner) => collect_fields(inner, fragments, depth + 1, out),
            Selection::FragmentSpread(name) => {
                if let Some(inner) = fragments.get(name) {
                    collect_fields(inner, fragments, depth + 1, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_query_with_variables() {
        let op = parse_operation(
            "query GetUser($id: ID!, $opts: Opts = {deep: true}) { user(id: $id) { id name } }",
            None,
        )
        .unwrap();
        assert_eq!(op.kind, GraphQlOperationType::Query);
        assert_eq!(op.operation_name.as_deref(), Some("GetUser"));
        assert_eq!(op.root_fields, vec!["user"]);
    }

    #[test]
    fn test_shorthand_alias_and_typename() {
        let op = parse_operation(
            "# fetch the current user\n{ __typename me: currentUser { id } }",
            None,
        )
        .unwrap();
        assert_eq!(op.kind, GraphQlOperationType::Query);
        assert_eq!(op.root_fields, vec!["currentUser"]);
    }

    #[test]
    fn test_mutation_with_string_arguments() {
        let op = parse_operation(
            r#"mutation { createUser(name: "a } tricky \" string", bio: """block { }""") { id } }"#,
            None,
        )
        .unwrap();
        assert_eq!(op.kind, GraphQlOperationType::Mutation);
        assert_eq!(op.root_fields, vec!["createUser"]);
    }

    #[test]
    fn test_operation_name_selects_among_several() {
        let doc = "query A { a } mutation B { b }";
        assert_eq!(
            parse_operation(doc, Some("B")).unwrap().root_fields,
            vec!["b"]
        );
        assert_eq!(
            parse_operation(doc, None).unwrap_err(),
            GraphQlParseError::AmbiguousOperation
        );
        assert_eq!(
            parse_operation(doc, Some("C")).unwrap_err(),
            GraphQlParseError::OperationNotFound("C".to_string())
        );
    }

    #[test]
    fn test_fragments_contribute_root_fields() {
        let op = parse_operation(
            "query Q { ...Root ... on Query { extra } } fragment Root on Query { viewer }",
            None,
        )
        .unwrap();
        assert_eq!(op.root_fields, vec!["viewer", "extra"]);
    }

    #[test]
    fn test_subscription_is_rejected() {
        assert_eq!(
            parse_operation("subscription { ticks }", None).unwrap_err(),
            GraphQlParseError::Subscription
        );
    }

    #[test]
    fn test_unbalanced_document() {
        assert_eq!(
            parse_operation("{ user { id }", None).unwrap_err(),
            GraphQlParseError::UnexpectedEnd
        );
    }

    #[test]
    fn test_deeply_nested_inline_fragments_are_rejected() {
        let depth = 100_000;
        let query = format!("{{{}a{}}}", "...{".repeat(depth), "}".repeat(depth));
        assert_eq!(
            parse_operation(&query, None).unwrap_err(),
            GraphQlParseError::TooDeep(MAX_SELECTION_DEPTH)
        );
    }

    #[test]
    fn test_modest_inline_fragment_nesting_is_accepted() {
        let query = format!("{{{}a{}}}", "... on Query {".repeat(4), "}".repeat(4));
        let op = parse_operation(&query, None).unwrap();
        assert_eq!(op.root_fields, vec!["a"]);
    }
}
