//! A compact XPath 1.0 subset evaluated over a `scraper` document.
//!
//! Supported: absolute and relative location paths, `//`, the child,
//! descendant, descendant-or-self, self, parent, ancestor, following-sibling,
//! preceding-sibling and attribute axes (`.`, `..`, `@` abbreviations
//! included), name tests, `*`, `text()`, `node()`, unions with `|`,
//! parenthesized filter expressions such as `(//li)[1]`, and predicates
//! built from comparisons, `and`/`or`, `not()`, `position()`,
//! `last()`, `contains()`, `starts-with()`, `normalize-space()`, `string()`
//! and `count()`. Arithmetic and namespaces are not supported.

use ego_tree::{NodeId, NodeRef};
use scraper::{Html, Node};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::ExtractionError;

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    FollowingSibling,
    PrecedingSibling,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }

    fn is_reverse(self) -> bool {
        matches!(self, Axis::Ancestor | Axis::PrecedingSibling | Axis::Parent)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

/// A parenthesized expression with predicates, e.g. `(//li)[1]`. The
/// predicates see the whole node-set in document order.
#[derive(Debug, Clone, PartialEq)]
struct Filter {
    expr: Expr,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
struct Path {
    absolute: bool,
    /// When present, the steps start from the filtered node-set.
    filter: Option<Box<Filter>>,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    Literal(String),
    Number(f64),
    Path(Path),
    Union(Vec<Path>),
    Call(Function, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Contains,
    StartsWith,
    NormalizeSpace,
    Not,
    Position,
    Last,
    String,
    Count,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "contains" => Function::Contains,
            "starts-with" => Function::StartsWith,
            "normalize-space" => Function::NormalizeSpace,
            "not" => Function::Not,
            "position" => Function::Position,
            "last" => Function::Last,
            "string" => Function::String,
            "count" => Function::Count,
            _ => return None,
        })
    }

    fn arity(self) -> std::ops::RangeInclusive<usize> {
        match self {
            Function::Contains | Function::StartsWith => 2..=2,
            Function::NormalizeSpace | Function::String => 0..=1,
            Function::Not | Function::Count => 1..=1,
            Function::Position | Function::Last => 0..=0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    Star,
    ColonColon,
    Op(CmpOp),
    Name(String),
    Literal(String),
    Number(f64),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Slash => write!(f, "/"),
            Token::DoubleSlash => write!(f, "//"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::At => write!(f, "@"),
            Token::Comma => write!(f, ","),
            Token::Pipe => write!(f, "|"),
            Token::Dot => write!(f, "."),
            Token::DotDot => write!(f, ".."),
            Token::Star => write!(f, "*"),
            Token::ColonColon => write!(f, "::"),
            Token::Op(op) => write!(f, "{:?}", op),
            Token::Name(name) => write!(f, "{}", name),
            Token::Literal(lit) => write!(f, "'{}'", lit),
            Token::Number(n) => write!(f, "{}", n),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::ColonColon);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Op(CmpOp::Le));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op(CmpOp::Lt));
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Op(CmpOp::Ge));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(CmpOp::Gt));
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| format!("unterminated string literal at offset {}", i))?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let (number, len) = read_number(&chars[i..]);
                tokens.push(Token::Number(number));
                i += len;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let (number, len) = read_number(&chars[i..]);
                tokens.push(Token::Number(number));
                i += len;
            }
            c if is_name_start(c) => {
                let mut end = i + 1;
                while end < chars.len() && is_name_char(chars[end]) {
                    // `::` belongs to the axis separator, not the name
                    if chars[end] == ':' && chars.get(end + 1) == Some(&':') {
                        break;
                    }
                    end += 1;
                }
                tokens.push(Token::Name(chars[i..end].iter().collect()));
                i = end;
            }
            other => return Err(format!("unexpected character '{}' at offset {}", other, i)),
        }
    }

    Ok(tokens)
}

fn read_number(chars: &[char]) -> (f64, usize) {
    let len = chars
        .iter()
        .position(|c| !(c.is_ascii_digit() || *c == '.'))
        .unwrap_or(chars.len());
    let text: String = chars[..len].iter().collect();
    (text.parse().unwrap_or(f64::NAN), len)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = Result<T, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        match self.advance() {
            Some(ref token) if *token == expected => Ok(()),
            Some(token) => Err(format!("expected '{}', found '{}'", expected, token)),
            None => Err(format!("expected '{}', found end of expression", expected)),
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(name)) if name == keyword)
    }

    fn parse_union(&mut self) -> ParseResult<Vec<Path>> {
        let first = self.parse_path()?;
        self.continue_union(first)
    }

    fn continue_union(&mut self, first: Path) -> ParseResult<Vec<Path>> {
        let mut paths = vec![first];
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            paths.push(self.parse_path()?);
        }
        Ok(paths)
    }

    fn parse_path(&mut self) -> ParseResult<Path> {
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            let expr = self.parse_or()?;
            self.expect(Token::RParen)?;
            return self.parse_filter_path(expr);
        }

        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                // A lone "/" selects the document root.
                if !self.starts_step() {
                    return Ok(Path { absolute: true, filter: None, steps });
                }
                true
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                steps.push(descendant_or_self());
                true
            }
            _ => false,
        };

        steps.push(self.parse_step()?);
        self.parse_trailing_steps(&mut steps)?;

        Ok(Path { absolute, filter: None, steps })
    }

    // `expr` has been read up to its closing parenthesis.
    fn parse_filter_path(&mut self, expr: Expr) -> ParseResult<Path> {
        let predicates = self.parse_predicates()?;
        let mut steps = Vec::new();
        self.parse_trailing_steps(&mut steps)?;

        Ok(Path {
            absolute: false,
            filter: Some(Box::new(Filter { expr, predicates })),
            steps,
        })
    }

    fn parse_trailing_steps(&mut self, steps: &mut Vec<Step>) -> ParseResult<()> {
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.advance();
                }
                Some(Token::DoubleSlash) => {
                    self.advance();
                    steps.push(descendant_or_self());
                }
                _ => return Ok(()),
            }
            steps.push(self.parse_step()?);
        }
    }

    fn parse_predicates(&mut self) -> ParseResult<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.advance();
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_) | Token::Star | Token::At | Token::Dot | Token::DotDot)
        )
    }

    fn parse_step(&mut self) -> ParseResult<Step> {
        match self.peek() {
            Some(Token::Dot) => {
                self.advance();
                return Ok(Step { axis: Axis::SelfAxis, test: NodeTest::Node, predicates: Vec::new() });
            }
            Some(Token::DotDot) => {
                self.advance();
                return Ok(Step { axis: Axis::Parent, test: NodeTest::Node, predicates: Vec::new() });
            }
            _ => {}
        }

        let axis = if self.peek() == Some(&Token::At) {
            self.advance();
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::from_name(name).ok_or_else(|| format!("unsupported axis '{}'", name))?;
            self.advance();
            self.advance();
            axis
        } else {
            Axis::Child
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                self.advance();
                self.expect(Token::RParen)?;
                match name.as_str() {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::Node,
                    other => return Err(format!("unsupported node test '{}()'", other)),
                }
            }
            Some(Token::Name(name)) => NodeTest::Name(name),
            Some(token) => return Err(format!("expected a node test, found '{}'", token)),
            None => return Err("expected a node test, found end of expression".to_string()),
        };

        let predicates = self.parse_predicates()?;
        Ok(Step { axis, test, predicates })
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.at_keyword("or") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.at_keyword("and") {
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_primary()?;
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            self.advance();
            let rhs = self.parse_primary()?;
            return Ok(Expr::Compare(Box::new(lhs), op, Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.peek().cloned() {
            Some(Token::Literal(lit)) => {
                self.advance();
                Ok(Expr::Literal(lit))
            }
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                if !matches!(self.peek(), Some(Token::LBracket | Token::Slash | Token::DoubleSlash)) {
                    return Ok(inner);
                }
                let first = self.parse_filter_path(inner)?;
                let mut paths = self.continue_union(first)?;
                Ok(if paths.len() == 1 {
                    Expr::Path(paths.remove(0))
                } else {
                    Expr::Union(paths)
                })
            }
            Some(Token::Name(name))
                if self.peek_at(1) == Some(&Token::LParen) && name != "text" && name != "node" =>
            {
                let function =
                    Function::from_name(&name).ok_or_else(|| format!("unsupported function '{}()'", name))?;
                self.advance();
                self.advance();
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    args.push(self.parse_or()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.advance();
                        args.push(self.parse_or()?);
                    }
                }
                self.expect(Token::RParen)?;
                if !function.arity().contains(&args.len()) {
                    return Err(format!("wrong number of arguments to '{}()'", name));
                }
                Ok(Expr::Call(function, args))
            }
            Some(_) => {
                let mut paths = self.parse_union()?;
                Ok(if paths.len() == 1 {
                    Expr::Path(paths.remove(0))
                } else {
                    Expr::Union(paths)
                })
            }
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// One selected item: a tree node or an attribute of an element.
#[derive(Clone, Copy)]
enum Item<'a> {
    Node(NodeRef<'a, Node>),
    Attr {
        owner: NodeRef<'a, Node>,
        index: usize,
        value: &'a str,
    },
}

impl<'a> Item<'a> {
    fn key(&self) -> (NodeId, Option<usize>) {
        match self {
            Item::Node(node) => (node.id(), None),
            Item::Attr { owner, index, .. } => (owner.id(), Some(*index)),
        }
    }

    fn string_value(&self) -> String {
        match self {
            Item::Node(node) => match node.value() {
                Node::Text(text) => {
                    let s: &str = &text.text;
                    s.to_string()
                }
                _ => node
                    .descendants()
                    .filter_map(|n| n.value().as_text())
                    .map(|t| {
                        let s: &str = &t.text;
                        s
                    })
                    .collect(),
            },
            Item::Attr { value, .. } => value.to_string(),
        }
    }
}

#[derive(Clone)]
enum Value<'a> {
    Nodes(Vec<Item<'a>>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl<'a> Value<'a> {
    fn to_bool(&self) -> bool {
        match self {
            Value::Nodes(items) => !items.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn to_string_value(&self) -> String {
        match self {
            Value::Nodes(items) => items.first().map(Item::string_value).unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => parse_number(&other.to_string_value()),
        }
    }
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn normalize_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compare_atoms(lhs: &Value<'_>, op: CmpOp, rhs: &Value<'_>) -> bool {
    match op {
        CmpOp::Eq | CmpOp::Ne => {
            let equal = if matches!(lhs, Value::Bool(_)) || matches!(rhs, Value::Bool(_)) {
                lhs.to_bool() == rhs.to_bool()
            } else if matches!(lhs, Value::Num(_)) || matches!(rhs, Value::Num(_)) {
                lhs.to_number() == rhs.to_number()
            } else {
                lhs.to_string_value() == rhs.to_string_value()
            };
            (op == CmpOp::Eq) == equal
        }
        CmpOp::Lt => lhs.to_number() < rhs.to_number(),
        CmpOp::Le => lhs.to_number() <= rhs.to_number(),
        CmpOp::Gt => lhs.to_number() > rhs.to_number(),
        CmpOp::Ge => lhs.to_number() >= rhs.to_number(),
    }
}

// Node-set comparisons are existential over the string values of the set.
fn compare(lhs: &Value<'_>, op: CmpOp, rhs: &Value<'_>) -> bool {
    match (lhs, rhs) {
        (Value::Nodes(items), _) if !matches!(rhs, Value::Bool(_)) => items
            .iter()
            .any(|item| compare(&Value::Str(item.string_value()), op, rhs)),
        (_, Value::Nodes(items)) if !matches!(lhs, Value::Bool(_)) => items
            .iter()
            .any(|item| compare(lhs, op, &Value::Str(item.string_value()))),
        _ => compare_atoms(lhs, op, rhs),
    }
}

struct Context<'a> {
    item: Item<'a>,
    position: usize,
    size: usize,
}

struct Evaluator<'a> {
    document: &'a Html,
    order: HashMap<NodeId, usize>,
}

impl<'a> Evaluator<'a> {
    fn new(document: &'a Html) -> Self {
        let order = document
            .tree
            .root()
            .descendants()
            .enumerate()
            .map(|(index, node)| (node.id(), index))
            .collect();
        Self { document, order }
    }

    fn order_of(&self, item: &Item<'a>) -> (usize, usize) {
        match item {
            Item::Node(node) => (self.order.get(&node.id()).copied().unwrap_or(usize::MAX), 0),
            Item::Attr { owner, index, .. } => {
                (self.order.get(&owner.id()).copied().unwrap_or(usize::MAX), index + 1)
            }
        }
    }

    fn sort_and_dedup(&self, items: Vec<Item<'a>>) -> Vec<Item<'a>> {
        let mut seen = HashSet::new();
        let mut unique: Vec<Item<'a>> = items.into_iter().filter(|item| seen.insert(item.key())).collect();
        unique.sort_by_key(|item| self.order_of(item));
        unique
    }

    fn eval_union(&self, paths: &[Path], ctx: &Context<'a>) -> Vec<Item<'a>> {
        let mut items = Vec::new();
        for path in paths {
            items.extend(self.eval_path(path, ctx));
        }
        self.sort_and_dedup(items)
    }

    fn eval_path(&self, path: &Path, ctx: &Context<'a>) -> Vec<Item<'a>> {
        let mut current = match &path.filter {
            Some(filter) => self.eval_filter(filter, ctx),
            None if path.absolute => vec![Item::Node(self.document.tree.root())],
            None => vec![ctx.item],
        };

        for step in &path.steps {
            let mut next = Vec::new();
            for item in &current {
                next.extend(self.eval_step(step, *item));
            }
            current = self.sort_and_dedup(next);
        }
        current
    }

    // A filter over anything but a node-set selects nothing.
    fn eval_filter(&self, filter: &Filter, ctx: &Context<'a>) -> Vec<Item<'a>> {
        match self.eval_expr(&filter.expr, ctx) {
            Value::Nodes(items) => self.apply_predicates(&filter.predicates, self.sort_and_dedup(items)),
            _ => Vec::new(),
        }
    }

    fn eval_step(&self, step: &Step, context: Item<'a>) -> Vec<Item<'a>> {
        let candidates: Vec<Item<'a>> = self
            .axis_items(step.axis, context)
            .into_iter()
            .filter(|item| node_test(&step.test, step.axis, item))
            .collect();

        let mut candidates = self.apply_predicates(&step.predicates, candidates);
        if step.axis.is_reverse() {
            candidates.reverse();
        }
        candidates
    }

    fn apply_predicates(&self, predicates: &[Expr], mut candidates: Vec<Item<'a>>) -> Vec<Item<'a>> {
        for predicate in predicates {
            let size = candidates.len();
            candidates = candidates
                .into_iter()
                .enumerate()
                .filter(|(index, item)| {
                    let ctx = Context { item: *item, position: index + 1, size };
                    match self.eval_expr(predicate, &ctx) {
                        Value::Num(n) => n == ctx.position as f64,
                        other => other.to_bool(),
                    }
                })
                .map(|(_, item)| item)
                .collect();
        }
        candidates
    }

    /// Items along `axis`, in axis order (reverse axes nearest first).
    fn axis_items(&self, axis: Axis, context: Item<'a>) -> Vec<Item<'a>> {
        let node = match context {
            Item::Node(node) => node,
            Item::Attr { owner, .. } => {
                return match axis {
                    Axis::SelfAxis => vec![context],
                    Axis::Parent => vec![Item::Node(owner)],
                    Axis::Ancestor => std::iter::once(owner).chain(owner.ancestors()).map(Item::Node).collect(),
                    _ => Vec::new(),
                };
            }
        };

        match axis {
            Axis::Child => node.children().map(Item::Node).collect(),
            Axis::Descendant => node.descendants().skip(1).map(Item::Node).collect(),
            Axis::DescendantOrSelf => node.descendants().map(Item::Node).collect(),
            Axis::SelfAxis => vec![Item::Node(node)],
            Axis::Parent => node.parent().map(Item::Node).into_iter().collect(),
            Axis::Ancestor => node.ancestors().map(Item::Node).collect(),
            Axis::FollowingSibling => node.next_siblings().map(Item::Node).collect(),
            Axis::PrecedingSibling => node.prev_siblings().map(Item::Node).collect(),
            Axis::Attribute => match node.value().as_element() {
                Some(element) => element
                    .attrs()
                    .enumerate()
                    .map(|(index, (_, value))| Item::Attr { owner: node, index, value })
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    fn eval_expr(&self, expr: &Expr, ctx: &Context<'a>) -> Value<'a> {
        match expr {
            Expr::Or(lhs, rhs) => {
                Value::Bool(self.eval_expr(lhs, ctx).to_bool() || self.eval_expr(rhs, ctx).to_bool())
            }
            Expr::And(lhs, rhs) => {
                Value::Bool(self.eval_expr(lhs, ctx).to_bool() && self.eval_expr(rhs, ctx).to_bool())
            }
            Expr::Compare(lhs, op, rhs) => {
                let lhs = self.eval_expr(lhs, ctx);
                let rhs = self.eval_expr(rhs, ctx);
                Value::Bool(compare(&lhs, *op, &rhs))
            }
            Expr::Literal(lit) => Value::Str(lit.clone()),
            Expr::Number(n) => Value::Num(*n),
            Expr::Path(path) => Value::Nodes(self.eval_path(path, ctx)),
            Expr::Union(paths) => Value::Nodes(self.eval_union(paths, ctx)),
            Expr::Call(function, args) => self.eval_call(*function, args, ctx),
        }
    }

    fn eval_call(&self, function: Function, args: &[Expr], ctx: &Context<'a>) -> Value<'a> {
        let string_arg = |index: usize| -> String {
            match args.get(index) {
                Some(arg) => self.eval_expr(arg, ctx).to_string_value(),
                None => ctx.item.string_value(),
            }
        };

        match function {
            Function::Contains => Value::Bool(string_arg(0).contains(&string_arg(1))),
            Function::StartsWith => Value::Bool(string_arg(0).starts_with(&string_arg(1))),
            Function::NormalizeSpace => Value::Str(normalize_space(&string_arg(0))),
            Function::String => Value::Str(string_arg(0)),
            Function::Not => Value::Bool(!args.first().is_some_and(|arg| self.eval_expr(arg, ctx).to_bool())),
            Function::Position => Value::Num(ctx.position as f64),
            Function::Last => Value::Num(ctx.size as f64),
            Function::Count => match args.first().map(|arg| self.eval_expr(arg, ctx)) {
                Some(Value::Nodes(items)) => Value::Num(items.len() as f64),
                _ => Value::Num(f64::NAN),
            },
        }
    }
}

fn node_test(test: &NodeTest, axis: Axis, item: &Item<'_>) -> bool {
    match item {
        Item::Attr { owner, index, .. } => {
            if axis != Axis::Attribute && axis != Axis::SelfAxis {
                return false;
            }
            match test {
                NodeTest::Any | NodeTest::Node => true,
                NodeTest::Text => false,
                NodeTest::Name(name) => owner
                    .value()
                    .as_element()
                    .and_then(|element| element.attrs().nth(*index))
                    .is_some_and(|(attr, _)| attr.eq_ignore_ascii_case(name)),
            }
        }
        Item::Node(node) => match test {
            NodeTest::Node => true,
            NodeTest::Text => node.value().is_text(),
            NodeTest::Any => node.value().is_element(),
            NodeTest::Name(name) => node
                .value()
                .as_element()
                .is_some_and(|element| element.name().eq_ignore_ascii_case(name)),
        },
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A compiled location rule.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRule {
    source: String,
    paths: Vec<Path>,
}

impl LocationRule {
    pub fn parse(rule: &str) -> Result<Self, ExtractionError> {
        let invalid = |reason: String| ExtractionError::InvalidRule {
            rule: rule.to_string(),
            reason,
        };

        let tokens = tokenize(rule).map_err(invalid)?;
        if tokens.is_empty() {
            return Err(invalid("empty expression".to_string()));
        }

        let mut parser = Parser { tokens, pos: 0 };
        let paths = parser.parse_union().map_err(invalid)?;
        if let Some(token) = parser.peek() {
            return Err(invalid(format!("unexpected '{}'", token)));
        }

        Ok(Self {
            source: rule.to_string(),
            paths,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// String values of every match, in document order. Relative rules are
    /// resolved against the root element.
    pub fn select_text(&self, document: &Html) -> Vec<String> {
        let evaluator = Evaluator::new(document);
        let context = Context {
            item: Item::Node(*document.root_element()),
            position: 1,
            size: 1,
        };
        evaluator
            .eval_union(&self.paths, &context)
            .iter()
            .map(Item::string_value)
            .collect()
    }
}

impl FromStr for LocationRule {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LocationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
