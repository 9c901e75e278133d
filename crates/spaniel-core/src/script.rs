//! The script language written by the recorder.
//!
//! A script is a sequence of lines. Each line binds a node to a variable,
//! performs an action, or writes an attribute:
//!
//! ```text
//! # recorded 2026-01-01
//! geditApp = root.application("gedit", recursive=false)
//! findNode = geditApp.childLabelled("Find:")
//! findNode.typeText("needle")
//! geditApp.button("OK").click()
//! findNode.text = "haystack"
//! ```
//!
//! Search steps use the method names produced by
//! [`Predicate::make_script_method_call`], so
//! [`parse_search_path`] inverts [`SearchPath::make_script_method_call`].

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::error::SpanielError;
use crate::i18n::TranslatableString;
use crate::node::{AttrValue, Node};
use crate::predicate::{GenericPredicate, Predicate};
use crate::root::Root;
use crate::search_path::SearchPath;

/// Errors from parsing or running a script.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("parse error at line {line}: {message}")]
    Parse { message: String, line: usize },

    #[error("runtime error at line {line}: {message}")]
    Runtime { message: String, line: usize },

    #[error("line {line} failed: {source}")]
    Failed {
        line: usize,
        #[source]
        source: SpanielError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    /// Process exit code for a script that stopped with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScriptError::Failed { .. } => 1,
            ScriptError::Parse { .. } => 2,
            ScriptError::Runtime { .. } => 3,
            ScriptError::Io(_) => 4,
        }
    }

    /// Script line the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Parse { line, .. }
            | ScriptError::Runtime { line, .. }
            | ScriptError::Failed { line, .. } => Some(*line),
            ScriptError::Io(_) => None,
        }
    }
}

fn parse_error(message: impl Into<String>, line: usize) -> ScriptError {
    ScriptError::Parse {
        message: message.into(),
        line,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    String(String),
    Number(i64),
    LParen,
    RParen,
    Comma,
    Equals,
    Dot,
    Newline,
}

#[derive(Debug, Clone)]
struct Located {
    token: Token,
    line: usize,
}

fn tokenize(source: &str) -> Result<Vec<Located>, ScriptError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;

    while let Some(&ch) = chars.peek() {
        match ch {
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '\n' => {
                chars.next();
                if tokens.last().is_some_and(|t: &Located| t.token != Token::Newline) {
                    tokens.push(Located { token: Token::Newline, line });
                }
                line += 1;
            }
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '(' => { chars.next(); tokens.push(Located { token: Token::LParen, line }); }
            ')' => { chars.next(); tokens.push(Located { token: Token::RParen, line }); }
            ',' => { chars.next(); tokens.push(Located { token: Token::Comma, line }); }
            '=' => { chars.next(); tokens.push(Located { token: Token::Equals, line }); }
            '.' => { chars.next(); tokens.push(Located { token: Token::Dot, line }); }
            '"' | '\'' => {
                let quote = ch;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some('r') => s.push('\r'),
                            Some('\\') => s.push('\\'),
                            Some(c) if c == quote => s.push(c),
                            Some(c) => {
                                s.push('\\');
                                s.push(c);
                            }
                            None => return Err(parse_error("unterminated string", line)),
                        },
                        Some(c) if c == quote => break,
                        Some('\n') => return Err(parse_error("unterminated string", line)),
                        Some(c) => s.push(c),
                        None => return Err(parse_error("unterminated string", line)),
                    }
                }
                tokens.push(Located { token: Token::String(s), line });
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut digits = String::new();
                if c == '-' {
                    digits.push('-');
                    chars.next();
                }
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: i64 = digits
                    .parse()
                    .map_err(|_| parse_error(format!("invalid number: {}", digits), line))?;
                tokens.push(Located { token: Token::Number(n), line });
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Located { token: Token::Ident(ident), line });
            }
            _ => return Err(parse_error(format!("unexpected character: '{}'", ch), line)),
        }
    }

    Ok(tokens)
}

/// A literal call argument or attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Literal {
    fn kind(&self) -> &'static str {
        match self {
            Literal::Str(_) => "string",
            Literal::Int(_) => "number",
            Literal::Bool(_) => "boolean",
        }
    }

    fn into_attr(self) -> AttrValue {
        match self {
            Literal::Str(s) => AttrValue::Text(s),
            Literal::Int(n) => AttrValue::Int(n),
            Literal::Bool(b) => AttrValue::Bool(b),
        }
    }
}

/// One `.method(args)` in a chain, before it is classified.
#[derive(Debug, Clone)]
struct Call {
    method: String,
    positional: Vec<Literal>,
    keywords: Vec<(String, Literal)>,
    line: usize,
}

impl Call {
    fn no_args(&self) -> Result<(), ScriptError> {
        if self.positional.is_empty() && self.keywords.is_empty() {
            Ok(())
        } else {
            Err(parse_error(format!("{}() takes no arguments", self.method), self.line))
        }
    }

    fn one_string(&self) -> Result<String, ScriptError> {
        match (self.positional.as_slice(), self.keywords.is_empty()) {
            ([Literal::Str(s)], true) => Ok(s.clone()),
            _ => Err(parse_error(
                format!("{}() takes one string argument", self.method),
                self.line,
            )),
        }
    }
}

/// The node a statement works on: a variable, then search steps from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub base: String,
    pub path: SearchPath,
}

/// What a statement does to its target.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptAction {
    /// A named accessibility action: `click()`, `doAction("toggle")`, ...
    Named(String),
    TypeText(String),
    RawType(String),
    KeyCombo(String),
    RawClick(u32),
    DoubleClick(u32),
    Select,
    Deselect,
    GrabFocus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name = target`
    Assign { variable: String, target: Target, line: usize },
    /// `target.action(...)`
    Act { target: Target, action: ScriptAction, line: usize },
    /// `target.attribute = literal`
    SetAttribute {
        target: Target,
        attribute: String,
        value: Literal,
        line: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

/// Variable every script starts with: the desktop root.
pub const ROOT_VARIABLE: &str = "root";

const NAMED_ACTIONS: &[&str] = &["click", "press", "release", "activate", "open", "jump"];

fn is_search_method(method: &str) -> bool {
    matches!(
        method,
        "application"
            | "window"
            | "dialog"
            | "menu"
            | "menuItem"
            | "button"
            | "textentry"
            | "tab"
            | "childNamed"
            | "childLabelled"
            | "child"
            | "lambda"
    )
}

/// Converts one search call to a path step.
fn search_step(call: &Call) -> Result<(Predicate, bool), ScriptError> {
    let mut recursive = true;
    let mut fields = Vec::new();
    for (key, value) in &call.keywords {
        match (key.as_str(), value) {
            ("recursive", Literal::Bool(b)) => recursive = *b,
            ("recursive", other) => {
                return Err(parse_error(
                    format!("recursive must be true or false, got a {}", other.kind()),
                    call.line,
                ))
            }
            _ => fields.push((key.as_str(), value)),
        }
    }
    if call.method != "child" && !fields.is_empty() {
        return Err(parse_error(
            format!("{}() does not take {}=", call.method, fields[0].0),
            call.line,
        ));
    }
    let named = || -> Result<TranslatableString, ScriptError> {
        match call.positional.as_slice() {
            [Literal::Str(s)] => Ok(s.as_str().into()),
            _ => Err(parse_error(
                format!("{}() takes one string argument", call.method),
                call.line,
            )),
        }
    };
    let predicate = match call.method.as_str() {
        "application" => Predicate::ApplicationNamed(named()?),
        "window" if call.positional.is_empty() => Predicate::Window,
        "window" => Predicate::WindowNamed(named()?),
        "dialog" => Predicate::DialogNamed(named()?),
        "menu" => Predicate::MenuNamed(named()?),
        "menuItem" => Predicate::MenuItemNamed(named()?),
        "button" => Predicate::ButtonNamed(named()?),
        "textentry" => Predicate::TextEntryNamed(named()?),
        "tab" => Predicate::TabNamed(named()?),
        "childNamed" => Predicate::Named(named()?),
        "childLabelled" => Predicate::LabelledAs(named()?),
        "child" => {
            if !call.positional.is_empty() {
                return Err(parse_error("child() takes keyword arguments only", call.line));
            }
            let mut generic = GenericPredicate::new();
            for (key, value) in fields {
                let Literal::Str(value) = value else {
                    return Err(parse_error(format!("{}= must be a string", key), call.line));
                };
                generic = match key {
                    "name" => generic.name(value.as_str()),
                    "roleName" => generic.role_name(value.as_str()),
                    "description" => generic.description(value.as_str()),
                    "label" => generic.label(value.as_str()),
                    other => {
                        return Err(parse_error(
                            format!("child() does not take {}=", other),
                            call.line,
                        ))
                    }
                };
            }
            let predicate = Predicate::Generic(generic);
            predicate
                .validate()
                .map_err(|e| parse_error(e.to_string(), call.line))?;
            predicate
        }
        "lambda" => {
            return Err(parse_error(
                "closure predicates cannot be replayed from a script",
                call.line,
            ))
        }
        other => return Err(parse_error(format!("unknown search method: {}", other), call.line)),
    };
    Ok((predicate, recursive))
}

fn action_for(call: &Call) -> Result<ScriptAction, ScriptError> {
    let button = |call: &Call| match (call.positional.as_slice(), call.keywords.is_empty()) {
        ([], true) => Ok(1),
        ([Literal::Int(b)], true) => u32::try_from(*b)
            .map_err(|_| parse_error(format!("invalid mouse button {}", b), call.line)),
        _ => Err(parse_error(
            format!("{}() takes an optional button number", call.method),
            call.line,
        )),
    };
    let method = call.method.as_str();
    if NAMED_ACTIONS.contains(&method) {
        call.no_args()?;
        return Ok(ScriptAction::Named(method.to_string()));
    }
    Ok(match method {
        "doAction" => ScriptAction::Named(call.one_string()?),
        "typeText" => ScriptAction::TypeText(call.one_string()?),
        "rawType" => ScriptAction::RawType(call.one_string()?),
        "keyCombo" => ScriptAction::KeyCombo(call.one_string()?),
        "rawClick" => ScriptAction::RawClick(button(call)?),
        "doubleClick" => ScriptAction::DoubleClick(button(call)?),
        "select" => {
            call.no_args()?;
            ScriptAction::Select
        }
        "deselect" => {
            call.no_args()?;
            ScriptAction::Deselect
        }
        "grabFocus" => {
            call.no_args()?;
            ScriptAction::GrabFocus
        }
        other => return Err(parse_error(format!("unknown method: {}", other), call.line)),
    })
}

struct Parser {
    tokens: Vec<Located>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Located>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current_line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|t| t.token.clone());
        self.pos += 1;
        t
    }

    fn at_end_of_statement(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Newline))
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ScriptError> {
        let line = self.current_line();
        match self.advance() {
            Some(t) if &t == expected => Ok(()),
            Some(t) => Err(parse_error(format!("expected {:?}, got {:?}", expected, t), line)),
            None => Err(parse_error(format!("expected {:?}, got end of input", expected), line)),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ScriptError> {
        let line = self.current_line();
        match self.advance() {
            Some(Token::Ident(s)) => Ok(s),
            _ => Err(parse_error(format!("expected {}", what), line)),
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn parse_script(&mut self) -> Result<Script, ScriptError> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while self.pos < self.tokens.len() {
            statements.push(self.parse_statement()?);
            if !self.at_end_of_statement() {
                return Err(parse_error("expected end of line", self.current_line()));
            }
            self.skip_newlines();
        }
        Ok(Script { statements })
    }

    fn parse_literal(&mut self) -> Result<Literal, ScriptError> {
        let line = self.current_line();
        match self.advance() {
            Some(Token::String(s)) => Ok(Literal::Str(s)),
            Some(Token::Number(n)) => Ok(Literal::Int(n)),
            Some(Token::Ident(s)) if s == "true" => Ok(Literal::Bool(true)),
            Some(Token::Ident(s)) if s == "false" => Ok(Literal::Bool(false)),
            Some(t) => Err(parse_error(format!("expected a literal, got {:?}", t), line)),
            None => Err(parse_error("expected a literal, got end of input", line)),
        }
    }

    fn parse_call(&mut self) -> Result<Call, ScriptError> {
        let line = self.current_line();
        let method = self.ident("a method name")?;
        self.expect(&Token::LParen)?;
        let mut call = Call {
            method,
            positional: Vec::new(),
            keywords: Vec::new(),
            line,
        };
        while self.peek() != Some(&Token::RParen) {
            if matches!(self.peek(), Some(Token::Ident(_))) && self.peek_at(1) == Some(&Token::Equals) {
                let key = self.ident("a keyword")?;
                self.expect(&Token::Equals)?;
                call.keywords.push((key, self.parse_literal()?));
            } else if call.keywords.is_empty() {
                call.positional.push(self.parse_literal()?);
            } else {
                return Err(parse_error("positional argument after keyword argument", line));
            }
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else if self.peek() != Some(&Token::RParen) {
                return Err(parse_error("expected ',' or ')'", self.current_line()));
            }
        }
        self.expect(&Token::RParen)?;
        Ok(call)
    }

    /// Parses `.call` links until the chain ends or an attribute name
    /// followed by `=` appears. Returns the calls and that attribute, if any.
    fn parse_links(&mut self, calls: &mut Vec<Call>) -> Result<Option<String>, ScriptError> {
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            if matches!(self.peek(), Some(Token::Ident(_))) && self.peek_at(1) == Some(&Token::Equals) {
                return Ok(Some(self.ident("an attribute name")?));
            }
            calls.push(self.parse_call()?);
        }
        Ok(None)
    }

    fn parse_statement(&mut self) -> Result<Statement, ScriptError> {
        let line = self.current_line();
        if matches!(self.peek(), Some(Token::Ident(_))) && self.peek_at(1) == Some(&Token::Equals) {
            let variable = self.ident("a variable name")?;
            self.expect(&Token::Equals)?;
            let (base, calls) = self.parse_chain_head()?;
            let mut calls = calls;
            if self.parse_links(&mut calls)?.is_some() {
                return Err(parse_error("cannot assign inside an assignment", line));
            }
            let path = search_path(&calls)?;
            return Ok(Statement::Assign {
                variable,
                target: Target { base, path },
                line,
            });
        }

        let (base, mut calls) = self.parse_chain_head()?;
        if let Some(attribute) = self.parse_links(&mut calls)? {
            self.expect(&Token::Equals)?;
            let value = self.parse_literal()?;
            return Ok(Statement::SetAttribute {
                target: Target {
                    base,
                    path: search_path(&calls)?,
                },
                attribute,
                value,
                line,
            });
        }
        let Some(last) = calls.pop() else {
            return Err(parse_error("statement does nothing", line));
        };
        if is_search_method(&last.method) {
            return Err(parse_error(
                format!("statement ends in a search ({}), not an action", last.method),
                last.line,
            ));
        }
        Ok(Statement::Act {
            target: Target {
                base,
                path: search_path(&calls)?,
            },
            action: action_for(&last)?,
            line,
        })
    }

    /// The start of a chain: a variable, or a search call on `root`.
    fn parse_chain_head(&mut self) -> Result<(String, Vec<Call>), ScriptError> {
        if matches!(self.peek(), Some(Token::Ident(_))) && self.peek_at(1) == Some(&Token::LParen) {
            let call = self.parse_call()?;
            return Ok((ROOT_VARIABLE.to_string(), vec![call]));
        }
        Ok((self.ident("a variable or search")?, Vec::new()))
    }
}

fn search_path(calls: &[Call]) -> Result<SearchPath, ScriptError> {
    let mut path = SearchPath::new();
    for call in calls {
        if !is_search_method(&call.method) {
            return Err(parse_error(
                format!("{}() can only end a statement", call.method),
                call.line,
            ));
        }
        let (predicate, recursive) = search_step(call)?;
        path.append(predicate, recursive);
    }
    Ok(path)
}

/// Parses a script.
pub fn parse(source: &str) -> Result<Script, ScriptError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_script()
}

/// Parses a bare method chain such as `.application("gedit").button("OK")`
/// back into a search path.
pub fn parse_search_path(text: &str) -> Result<SearchPath, ScriptError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser::new(tokens);
    parser.skip_newlines();
    let mut calls = Vec::new();
    if parser.peek() != Some(&Token::Dot) && parser.pos < parser.tokens.len() {
        calls.push(parser.parse_call()?);
    }
    if parser.parse_links(&mut calls)?.is_some() {
        return Err(parse_error("unexpected assignment", parser.current_line()));
    }
    parser.skip_newlines();
    if parser.pos < parser.tokens.len() {
        return Err(parse_error("unexpected input after path", parser.current_line()));
    }
    search_path(&calls)
}

/// Runs scripts against a desktop, keeping variables between statements.
#[derive(Debug)]
pub struct ScriptRunner {
    root: Root,
    variables: HashMap<String, Node>,
}

impl ScriptRunner {
    pub fn new(root: Root) -> Self {
        Self {
            root,
            variables: HashMap::new(),
        }
    }

    /// The node bound to `name`.
    pub fn variable(&self, name: &str) -> Option<&Node> {
        if name == ROOT_VARIABLE {
            return Some(self.root.node());
        }
        self.variables.get(name)
    }

    /// Parses and runs `source`.
    pub async fn run_source(&mut self, source: &str) -> Result<(), ScriptError> {
        let script = parse(source)?;
        self.run(&script).await
    }

    /// Runs every statement in order, stopping at the first failure.
    pub async fn run(&mut self, script: &Script) -> Result<(), ScriptError> {
        for statement in &script.statements {
            self.execute(statement).await?;
        }
        Ok(())
    }

    async fn resolve(&self, target: &Target, line: usize) -> Result<Node, ScriptError> {
        let base = self.variable(&target.base).ok_or_else(|| ScriptError::Runtime {
            message: format!("undefined variable: {}", target.base),
            line,
        })?;
        if target.path.is_empty() {
            return Ok(base.clone());
        }
        base.apply_search_path(&target.path)
            .await
            .map_err(|source| ScriptError::Failed { line, source })
    }

    async fn execute(&mut self, statement: &Statement) -> Result<(), ScriptError> {
        match statement {
            Statement::Assign {
                variable,
                target,
                line,
            } => {
                if variable == ROOT_VARIABLE {
                    return Err(ScriptError::Runtime {
                        message: "cannot rebind root".to_string(),
                        line: *line,
                    });
                }
                let node = self.resolve(target, *line).await?;
                debug!(line, variable = %variable, "bound variable");
                self.variables.insert(variable.clone(), node);
                Ok(())
            }
            Statement::Act {
                target,
                action,
                line,
            } => {
                let node = self.resolve(target, *line).await?;
                info!(line, action = ?action, "running statement");
                let result = match action {
                    ScriptAction::Named(name) => node.do_action(name).await,
                    ScriptAction::TypeText(text) => node.type_text(text).await,
                    ScriptAction::RawType(text) => node.raw_type(text).await,
                    ScriptAction::KeyCombo(combo) => node.key_combo(combo).await,
                    ScriptAction::RawClick(button) => node.raw_click(*button).await,
                    ScriptAction::DoubleClick(button) => node.double_click(*button).await,
                    ScriptAction::Select => node.select().await,
                    ScriptAction::Deselect => node.deselect().await,
                    ScriptAction::GrabFocus => node.grab_focus().await,
                };
                result.map_err(|source| ScriptError::Failed {
                    line: *line,
                    source,
                })
            }
            Statement::SetAttribute {
                target,
                attribute,
                value,
                line,
            } => {
                let node = self.resolve(target, *line).await?;
                info!(line, attribute = %attribute, "setting attribute");
                node.set_attribute(attribute, value.clone().into_attr())
                    .await
                    .map_err(|source| ScriptError::Failed {
                        line: *line,
                        source,
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, Gedit};

    #[test]
    fn parses_assignment_and_action() {
        let script = parse(
            "# header\n\
             okButton = root.application(\"gedit\", recursive=false).button(\"OK\")\n\
             \n\
             okButton.click()\n",
        )
        .unwrap();
        assert_eq!(script.statements.len(), 2);
        match &script.statements[0] {
            Statement::Assign { variable, target, line } => {
                assert_eq!(variable, "okButton");
                assert_eq!(target.base, "root");
                assert_eq!(target.path.len(), 2);
                assert_eq!(target.path.is_recursive(0), Some(false));
                assert_eq!(*line, 2);
            }
            other => panic!("expected assignment, got {:?}", other),
        }
        match &script.statements[1] {
            Statement::Act { target, action, line } => {
                assert_eq!(target.base, "okButton");
                assert!(target.path.is_empty());
                assert_eq!(action, &ScriptAction::Named("click".into()));
                assert_eq!(*line, 4);
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn bare_search_starts_at_root() {
        let script = parse("application(\"gedit\").childNamed(\"OK\").rawClick(3)").unwrap();
        match &script.statements[0] {
            Statement::Act { target, action, .. } => {
                assert_eq!(target.base, ROOT_VARIABLE);
                assert_eq!(target.path.len(), 2);
                assert_eq!(action, &ScriptAction::RawClick(3));
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn attribute_writes() {
        let script = parse("entry.text = 'it\\'s'\nslider.value = 3").unwrap();
        assert_eq!(
            script.statements[0],
            Statement::SetAttribute {
                target: Target {
                    base: "entry".into(),
                    path: SearchPath::new(),
                },
                attribute: "text".into(),
                value: Literal::Str("it's".into()),
                line: 1,
            }
        );
        assert!(matches!(
            &script.statements[1],
            Statement::SetAttribute { value: Literal::Int(3), .. }
        ));
    }

    #[test]
    fn generic_child_round_trips() {
        let mut path = SearchPath::new();
        path.append(Predicate::ApplicationNamed("gedit".into()), false);
        path.append(Predicate::Window, false);
        path.append(
            Predicate::Generic(
                GenericPredicate::new()
                    .name("Say \"hi\"")
                    .role_name("push button")
                    .label("Greeting:"),
            ),
            true,
        );
        path.append(Predicate::TextEntryNamed("a\\b".into()), true);
        let text = path.make_script_method_call();
        assert_eq!(parse_search_path(&text).unwrap(), path);
    }

    #[test]
    fn parse_errors_carry_lines() {
        let err = parse("a = root.button(\"x\")\na.frobnicate()").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("unknown method"), "{err}");
        assert_eq!(err.exit_code(), 2);

        let err = parse("root.button(\"x\")").unwrap_err();
        assert!(err.to_string().contains("not an action"));

        let err = parse_search_path(".lambda()").unwrap_err();
        assert!(err.to_string().contains("closure"));

        let err = parse("x = root.child()").unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 1, .. }));

        let err = parse("root.button(\"unterminated)").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[tokio::test]
    async fn absolute_paths_replay_from_scripts() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let root = engine.root().await.unwrap();
        for id in [gedit.ok, gedit.entry, gedit.wrap, gedit.clear] {
            let node = gedit.node(&engine, id);
            let path = node.absolute_search_path().await.unwrap();
            let parsed = parse_search_path(&path.make_script_method_call()).unwrap();
            assert_eq!(parsed, path);
            assert_eq!(root.apply_search_path(&parsed).await.unwrap(), node);
        }
    }

    #[tokio::test]
    async fn runner_executes_statements() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let mut runner = ScriptRunner::new(engine.root().await.unwrap());
        runner
            .run_source(
                "app = root.application(\"gedit\", recursive=false)\n\
                 find = app.childLabelled(\"Find:\")\n\
                 find.text = \"\"\n\
                 find.typeText(\"needle\")\n\
                 app.button(\"OK\").click()\n\
                 app.child(roleName=\"check box\").doAction(\"toggle\")\n",
            )
            .await
            .unwrap();
        assert_eq!(gedit.desktop.text(gedit.entry).as_deref(), Some("needle"));
        assert_eq!(
            gedit.desktop.invocations(),
            vec![(gedit.ok, "click".to_string()), (gedit.wrap, "toggle".to_string())]
        );
        assert_eq!(runner.variable("find"), Some(&gedit.node(&engine, gedit.entry)));
    }

    #[tokio::test]
    async fn runner_reports_failing_line() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let mut runner = ScriptRunner::new(engine.root().await.unwrap());
        let err = runner
            .run_source("app = application(\"gedit\")\napp.button(\"Cancel\").click()")
            .await
            .unwrap_err();
        match &err {
            ScriptError::Failed { line, source } => {
                assert_eq!(*line, 2);
                assert!(matches!(source, SpanielError::NotSensitive { .. }));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(err.exit_code(), 1);

        let err = runner.run_source("ghost.click()").await.unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { line: 1, .. }));

        let err = runner.run_source("app.button(\"Nope\").click()").await.unwrap_err();
        match err {
            ScriptError::Failed { source, .. } => assert!(source.is_search()),
            other => panic!("expected search failure, got {:?}", other),
        }
    }
}
