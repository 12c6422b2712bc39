//! Error-recovering parser for an HTML-superset template language.
//!
//! `parse` consumes raw template text and produces a located syntax tree:
//! elements, attributes, directives (with dynamic arguments), text with
//! character references decoded, interpolations, and comments. Diagnostics
//! mirror the HTML spec's parse error set and are routed through a
//! caller-supplied sink; the parser always produces a tree.
//!
//! The whole template is buffered; parsing is one forward pass over a
//! mutable cursor. Streaming input is out of scope.

pub mod ast;
pub mod cursor;
pub mod errors;
pub mod options;

mod entities;
mod parser;

pub use crate::ast::{
    AttributeNode, CodegenNode, CommentNode, DirectiveNode, ElementNode, ImportItem,
    InterpolationNode, Namespace, Position, PropNode, RootNode, SimpleExpressionNode,
    SourceLocation, TagType, TemplateChildNode, TextMode, TextNode,
};
pub use crate::errors::{ErrorCode, ParseError};
pub use crate::options::{Ancestor, ParseOptions};
pub use crate::parser::{ParseCounters, parse, parse_default, parse_with_counters};
