//! Template syntax tree.
//!
//! Nodes borrow from the source buffer they were parsed from and carry the
//! exact source slice they cover. The tree is immutable once `parse` returns.
//!
//! Invariants:
//! - `loc.source == source[loc.start.offset..loc.end.offset]` for every node.
//! - Sibling locations are monotonically non-overlapping.
//! - No two adjacent `Text` children anywhere in the tree.

use std::borrow::Cow;

/// Position into the source buffer.
///
/// Invariant: `offset` is a 0-based byte offset on a UTF-8 boundary; `line`
/// and `column` are 1-based and `column` counts codepoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn start() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

/// Half-open source range with the literal text it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    pub start: Position,
    pub end: Position,
    pub source: &'a str,
}

/// Namespace of a tag (HTML by default; hooks may return others).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    Html,
    Svg,
    MathMl,
}

/// Lexing mode governing whether tags, entities, or CDATA terminators are
/// recognized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextMode {
    Data,
    RcData,
    RawText,
    Cdata,
    AttributeValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagType {
    Element,
    Component,
    Slot,
    Template,
}

/// Slot reserved for the transform pipeline's generated code. The parser
/// always leaves it empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodegenNode {
    pub content: String,
}

/// Import collected for the output preamble (filled by transforms).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportItem {
    pub exp: String,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RootNode<'a> {
    pub children: Vec<TemplateChildNode<'a>>,
    pub imports: Vec<ImportItem>,
    pub statements: Vec<String>,
    pub hoists: Vec<SimpleExpressionNode<'a>>,
    pub codegen_node: Option<CodegenNode>,
    pub loc: SourceLocation<'a>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TemplateChildNode<'a> {
    Element(ElementNode<'a>),
    Text(TextNode<'a>),
    Interpolation(InterpolationNode<'a>),
    Comment(CommentNode<'a>),
}

impl<'a> TemplateChildNode<'a> {
    pub fn loc(&self) -> &SourceLocation<'a> {
        match self {
            TemplateChildNode::Element(n) => &n.loc,
            TemplateChildNode::Text(n) => &n.loc,
            TemplateChildNode::Interpolation(n) => &n.loc,
            TemplateChildNode::Comment(n) => &n.loc,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElementNode<'a> {
    pub ns: Namespace,
    /// Tag name as written in the source (matching is case-insensitive).
    pub tag: &'a str,
    pub tag_type: TagType,
    pub props: Vec<PropNode<'a>>,
    pub is_self_closing: bool,
    pub children: Vec<TemplateChildNode<'a>>,
    pub codegen_node: Option<CodegenNode>,
    pub loc: SourceLocation<'a>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropNode<'a> {
    Attribute(AttributeNode<'a>),
    Directive(DirectiveNode<'a>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeNode<'a> {
    pub name: &'a str,
    pub value: Option<TextNode<'a>>,
    pub loc: SourceLocation<'a>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectiveNode<'a> {
    /// Canonical directive name, non-empty and lowercase (`bind`, `on`, ...).
    pub name: String,
    pub arg: Option<SimpleExpressionNode<'a>>,
    pub exp: Option<SimpleExpressionNode<'a>>,
    pub modifiers: Vec<&'a str>,
    pub loc: SourceLocation<'a>,
}

/// Text run with character references already decoded. `loc.source` stays
/// raw.
#[derive(Clone, Debug, PartialEq)]
pub struct TextNode<'a> {
    pub content: Cow<'a, str>,
    pub is_empty: bool,
    pub loc: SourceLocation<'a>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterpolationNode<'a> {
    pub content: SimpleExpressionNode<'a>,
    pub loc: SourceLocation<'a>,
}

/// Raw comment body between `<!--` and `-->` (no decoding).
#[derive(Clone, Debug, PartialEq)]
pub struct CommentNode<'a> {
    pub content: &'a str,
    pub loc: SourceLocation<'a>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimpleExpressionNode<'a> {
    pub content: Cow<'a, str>,
    pub is_static: bool,
    pub loc: SourceLocation<'a>,
}
