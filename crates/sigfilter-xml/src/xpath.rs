#![forbid(unsafe_code)]

//! XPath evaluation seam and the `here()` extension function.
//!
//! Transform parameters carry XPath expressions.  Evaluation goes through
//! the [`XPathEvaluator`] trait so a full engine can be plugged in; the
//! built-in [`SubsetEvaluator`] covers the location paths signature
//! filters use in practice:
//!
//! - unions (`|`), absolute and relative paths, `//`, `.`, `..`, `@name`
//! - the `child`, `descendant`, `descendant-or-self`, `self`, `parent`,
//!   `ancestor`, `ancestor-or-self` and `attribute` axes
//! - name tests (`name`, `prefix:name`, `prefix:*`, `*`) and the
//!   `node()`, `text()`, `comment()`, `processing-instruction()` tests
//! - numeric positional predicates
//! - `here()` and `id('...')` as the first step of a path
//!
//! Anything else is rejected with [`Error::XPath`].

use crate::node::{DocNode, DocumentId, NodeRef};
use crate::nodeset::NodeSet;
use roxmltree::{Document, Node, NodeId};
use sigfilter_core::{ns, Error};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::trace;

/// Everything an expression is evaluated against.
pub struct XPathContext<'a, 'input> {
    pub document: &'a Document<'input>,
    pub document_id: DocumentId,
    pub context_node: Node<'a, 'input>,
    /// Prefix → namespace URI bindings in scope for the expression.
    pub namespaces: &'a BTreeMap<String, String>,
    /// The node bearing the expression, for `here()`.
    pub here: Option<DocNode>,
    /// ID value → element, for `id()`.  Without it the document is
    /// scanned for `Id`, `ID` and `id` attributes.
    pub ids: Option<&'a HashMap<String, NodeId>>,
}

impl<'a, 'input> XPathContext<'a, 'input> {
    pub fn new(
        document: &'a Document<'input>,
        document_id: DocumentId,
        context_node: Node<'a, 'input>,
        namespaces: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            document,
            document_id,
            context_node,
            namespaces,
            here: None,
            ids: None,
        }
    }

    pub fn with_here(mut self, owner: DocNode) -> Self {
        self.here = Some(owner);
        self
    }

    pub fn with_ids(mut self, ids: &'a HashMap<String, NodeId>) -> Self {
        self.ids = Some(ids);
        self
    }
}

/// Evaluates an XPath expression to a node-set.
pub trait XPathEvaluator: fmt::Debug + Send + Sync {
    fn evaluate(&self, expr: &str, ctx: &XPathContext<'_, '_>) -> Result<NodeSet, Error>;
}

/// The `here()` function: the node bearing the expression being evaluated.
///
/// An attribute or processing-instruction owner yields itself, a text
/// owner yields its parent element, any other owner yields the empty set.
/// An owner from a different document than the one being evaluated is an
/// error.
pub fn here(ctx: &XPathContext<'_, '_>) -> Result<NodeSet, Error> {
    let owner = ctx
        .here
        .ok_or_else(|| Error::XPath("here() used without an owner node".into()))?;
    if owner.document != ctx.document_id {
        return Err(Error::CrossDocument(
            "here() owner belongs to a different document".into(),
        ));
    }
    let id = match owner.node {
        NodeRef::Attribute { .. } => return Ok(NodeSet::from_refs([owner.node])),
        NodeRef::Node(id) => id,
    };
    let node = ctx
        .document
        .get_node(id)
        .ok_or_else(|| Error::XPath("here() owner is not in the document".into()))?;
    let result = if node.is_pi() {
        Some(NodeRef::of(node))
    } else if node.is_text() {
        node.parent().map(NodeRef::of)
    } else {
        None
    };
    Ok(result.into_iter().collect())
}

/// Built-in evaluator for the location-path subset described in the
/// module docs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubsetEvaluator;

impl XPathEvaluator for SubsetEvaluator {
    fn evaluate(&self, expr: &str, ctx: &XPathContext<'_, '_>) -> Result<NodeSet, Error> {
        let tokens = tokenize(expr)?;
        let paths = Parser::new(&tokens, ctx.namespaces).parse()?;
        let mut result = Vec::new();
        for path in &paths {
            result.extend(eval_path(path, ctx)?);
        }
        let selected = NodeSet::from_refs(result);
        trace!(expr, selected = selected.len(), "evaluated XPath");
        Ok(selected)
    }
}

// ── Tokens ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Pipe,
    Dot,
    DoubleDot,
    At,
    DoubleColon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Star,
    /// An NCName, `prefix:local` or `prefix:*`.
    Name(String),
    Literal(String),
    Number(String),
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn tokenize(expr: &str) -> Result<Vec<Token>, Error> {
    let chars: Vec<char> = expr.chars().collect();
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
            '.' if next == Some('.') => {
                tokens.push(Token::DoubleDot);
                i += 2;
            }
            '.' if !next.is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::DoubleColon);
                i += 2;
            }
            '|' | '@' | '(' | ')' | '[' | ']' | '*' => {
                tokens.push(match c {
                    '|' => Token::Pipe,
                    '@' => Token::At,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => Token::Star,
                });
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| Error::XPath(format!("unterminated literal in '{expr}'")))?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if is_name_start(c) => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                // prefix:local or prefix:*, but not the axis separator.
                if chars.get(i) == Some(&':') && chars.get(i + 1) != Some(&':') {
                    match chars.get(i + 1) {
                        Some('*') => i += 2,
                        Some(&n) if is_name_start(n) => {
                            i += 1;
                            while i < chars.len() && is_name_char(chars[i]) {
                                i += 1;
                            }
                        }
                        _ => return Err(Error::XPath(format!("malformed name in '{expr}'"))),
                    }
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::XPath(format!(
                    "unsupported character '{other}' in '{expr}'"
                )))
            }
        }
    }
    Ok(tokens)
}

// ── Syntax tree ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
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
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    /// `*`
    AnyName,
    /// `prefix:*`
    Namespace(String),
    /// A name; `None` for unprefixed names, which match no namespace.
    Name(Option<String>, String),
    Node,
    Text,
    Comment,
    Pi(Option<String>),
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
    positions: Vec<usize>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            positions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
enum Start {
    Root,
    Context,
    Here,
    Id(String),
}

#[derive(Debug, Clone)]
struct Path {
    start: Start,
    steps: Vec<Step>,
}

// ── Parser ───────────────────────────────────────────────────────────

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    namespaces: &'t BTreeMap<String, String>,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token], namespaces: &'t BTreeMap<String, String>) -> Self {
        Self {
            tokens,
            pos: 0,
            namespaces,
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), Error> {
        match self.bump() {
            Some(t) if *t == expected => Ok(()),
            other => Err(Error::XPath(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn parse(mut self) -> Result<Vec<Path>, Error> {
        let mut paths = vec![self.path()?];
        while self.peek() == Some(&Token::Pipe) {
            self.bump();
            paths.push(self.path()?);
        }
        if let Some(token) = self.peek() {
            return Err(Error::XPath(format!("unexpected {token:?}")));
        }
        Ok(paths)
    }

    fn path(&mut self) -> Result<Path, Error> {
        let (start, mut steps, relative_required) = match self.peek() {
            Some(Token::Slash) => {
                self.bump();
                (Start::Root, Vec::new(), false)
            }
            Some(Token::DoubleSlash) => {
                self.bump();
                (Start::Root, vec![Step::descendant_or_self()], true)
            }
            Some(Token::Name(name))
                if matches!(name.as_str(), "here" | "id")
                    && self.peek_at(1) == Some(&Token::LParen) =>
            {
                let start = self.start_function()?;
                let mut steps = Vec::new();
                match self.peek() {
                    Some(Token::Slash) => {
                        self.bump();
                    }
                    Some(Token::DoubleSlash) => {
                        self.bump();
                        steps.push(Step::descendant_or_self());
                    }
                    _ => return Ok(Path { start, steps }),
                }
                (start, steps, true)
            }
            _ => (Start::Context, Vec::new(), true),
        };

        if relative_required || self.starts_step() {
            self.relative_path(&mut steps)?;
        }
        Ok(Path { start, steps })
    }

    fn start_function(&mut self) -> Result<Start, Error> {
        let Some(Token::Name(name)) = self.bump() else {
            return Err(Error::XPath("expected function name".into()));
        };
        self.expect(Token::LParen)?;
        let start = if name == "here" {
            Start::Here
        } else {
            match self.bump() {
                Some(Token::Literal(value)) => Start::Id(value.clone()),
                other => {
                    return Err(Error::XPath(format!(
                        "id() takes a string literal, found {other:?}"
                    )))
                }
            }
        };
        self.expect(Token::RParen)?;
        Ok(start)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DoubleDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn relative_path(&mut self, steps: &mut Vec<Step>) -> Result<(), Error> {
        steps.push(self.step()?);
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.bump();
                }
                Some(Token::DoubleSlash) => {
                    self.bump();
                    steps.push(Step::descendant_or_self());
                }
                _ => return Ok(()),
            }
            steps.push(self.step()?);
        }
    }

    fn step(&mut self) -> Result<Step, Error> {
        match self.peek() {
            Some(Token::Dot) => {
                self.bump();
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::Node,
                    positions: Vec::new(),
                });
            }
            Some(Token::DoubleDot) => {
                self.bump();
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::Node,
                    positions: Vec::new(),
                });
            }
            _ => {}
        }

        let axis = match (self.peek(), self.peek_at(1)) {
            (Some(Token::At), _) => {
                self.bump();
                Axis::Attribute
            }
            (Some(Token::Name(name)), Some(Token::DoubleColon)) => {
                let axis = Axis::from_name(name)
                    .ok_or_else(|| Error::XPath(format!("unsupported axis '{name}'")))?;
                self.pos += 2;
                axis
            }
            _ => Axis::Child,
        };
        let test = self.node_test()?;

        let mut positions = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.bump();
            let position = match self.bump() {
                Some(Token::Number(n)) => n.parse::<usize>().ok().filter(|p| *p > 0),
                _ => None,
            }
            .ok_or_else(|| Error::XPath("only positive integer predicates are supported".into()))?;
            self.expect(Token::RBracket)?;
            positions.push(position);
        }
        Ok(Step {
            axis,
            test,
            positions,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest, Error> {
        match self.bump() {
            Some(Token::Star) => Ok(NodeTest::AnyName),
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                self.bump();
                let test = match name.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    "processing-instruction" => match self.peek() {
                        Some(Token::Literal(target)) => {
                            self.bump();
                            NodeTest::Pi(Some(target.clone()))
                        }
                        _ => NodeTest::Pi(None),
                    },
                    other => {
                        return Err(Error::XPath(format!("unsupported function '{other}()'")))
                    }
                };
                self.expect(Token::RParen)?;
                Ok(test)
            }
            Some(Token::Name(name)) => match name.split_once(':') {
                Some((prefix, "*")) => Ok(NodeTest::Namespace(self.resolve(prefix)?)),
                Some((prefix, local)) => Ok(NodeTest::Name(
                    Some(self.resolve(prefix)?),
                    local.to_owned(),
                )),
                None => Ok(NodeTest::Name(None, name.clone())),
            },
            other => Err(Error::XPath(format!("expected node test, found {other:?}"))),
        }
    }

    fn resolve(&self, prefix: &str) -> Result<String, Error> {
        if prefix == "xml" {
            return Ok(ns::XML.to_owned());
        }
        self.namespaces
            .get(prefix)
            .cloned()
            .ok_or_else(|| Error::XPath(format!("unbound namespace prefix '{prefix}'")))
    }
}

// ── Evaluation ───────────────────────────────────────────────────────

fn eval_path(path: &Path, ctx: &XPathContext<'_, '_>) -> Result<Vec<NodeRef>, Error> {
    let mut current = match &path.start {
        Start::Root => vec![NodeRef::of(ctx.document.root())],
        Start::Context => vec![NodeRef::of(ctx.context_node)],
        Start::Here => here(ctx)?.in_document_order(),
        Start::Id(values) => lookup_ids(values, ctx),
    };
    for step in &path.steps {
        let mut next = Vec::new();
        for node in &current {
            let mut selected: Vec<NodeRef> = axis_nodes(ctx.document, *node, step.axis)
                .into_iter()
                .filter(|r| matches_test(ctx.document, *r, step))
                .collect();
            for &position in &step.positions {
                selected = selected.into_iter().nth(position - 1).into_iter().collect();
            }
            next.extend(selected);
        }
        next.sort_by_key(|r| r.order_key());
        next.dedup();
        current = next;
    }
    Ok(current)
}

fn lookup_ids(values: &str, ctx: &XPathContext<'_, '_>) -> Vec<NodeRef> {
    let find = |value: &str| -> Option<NodeId> {
        if let Some(ids) = ctx.ids {
            return ids.get(value).copied();
        }
        ctx.document
            .descendants()
            .find(|n| {
                n.is_element()
                    && ["Id", "ID", "id"]
                        .iter()
                        .any(|attr| n.attribute(*attr) == Some(value))
            })
            .map(|n| n.id())
    };
    let mut found: Vec<NodeRef> = values
        .split_whitespace()
        .filter_map(find)
        .map(NodeRef::Node)
        .collect();
    found.sort_by_key(|r| r.order_key());
    found.dedup();
    found
}

fn attribute_refs(node: Node<'_, '_>) -> impl Iterator<Item = NodeRef> {
    let owner = node.id();
    (0..node.attributes().count()).map(move |index| NodeRef::Attribute { owner, index })
}

/// Nodes along `axis` from `from`, in proximity order.
fn axis_nodes(doc: &Document<'_>, from: NodeRef, axis: Axis) -> Vec<NodeRef> {
    let Some(node) = doc.get_node(from.tree_node()) else {
        return Vec::new();
    };
    if from.is_attribute() {
        return match axis {
            Axis::SelfAxis | Axis::DescendantOrSelf => vec![from],
            Axis::Parent => vec![NodeRef::of(node)],
            Axis::Ancestor => node.ancestors().map(NodeRef::of).collect(),
            Axis::AncestorOrSelf => std::iter::once(from)
                .chain(node.ancestors().map(NodeRef::of))
                .collect(),
            Axis::Child | Axis::Descendant | Axis::Attribute => Vec::new(),
        };
    }
    match axis {
        Axis::Child => node.children().map(NodeRef::of).collect(),
        Axis::Descendant => node.descendants().skip(1).map(NodeRef::of).collect(),
        Axis::DescendantOrSelf => node.descendants().map(NodeRef::of).collect(),
        Axis::SelfAxis => vec![from],
        Axis::Parent => node.parent().map(NodeRef::of).into_iter().collect(),
        Axis::Ancestor => node.ancestors().skip(1).map(NodeRef::of).collect(),
        Axis::AncestorOrSelf => node.ancestors().map(NodeRef::of).collect(),
        Axis::Attribute if node.is_element() => attribute_refs(node).collect(),
        Axis::Attribute => Vec::new(),
    }
}

fn matches_test(doc: &Document<'_>, candidate: NodeRef, step: &Step) -> bool {
    let Some(node) = doc.get_node(candidate.tree_node()) else {
        return false;
    };
    let name_matches = |uri: Option<&str>, local: &str| match &step.test {
        NodeTest::AnyName => true,
        NodeTest::Namespace(ns) => uri == Some(ns.as_str()),
        NodeTest::Name(ns, name) => uri == ns.as_deref() && local == name,
        _ => false,
    };
    match (&step.test, candidate) {
        (NodeTest::Node, _) => true,
        (NodeTest::Text, NodeRef::Node(_)) => node.is_text(),
        (NodeTest::Comment, NodeRef::Node(_)) => node.is_comment(),
        (NodeTest::Pi(target), NodeRef::Node(_)) => node
            .pi()
            .is_some_and(|pi| target.as_deref().map_or(true, |t| t == pi.target)),
        (_, NodeRef::Attribute { index, .. }) => {
            step.axis == Axis::Attribute
                && node
                    .attributes()
                    .nth(index)
                    .is_some_and(|a| name_matches(a.namespace(), a.name()))
        }
        (_, NodeRef::Node(_)) => {
            step.axis != Axis::Attribute
                && node.is_element()
                && name_matches(node.tag_name().namespace(), node.tag_name().name())
        }
    }
}
