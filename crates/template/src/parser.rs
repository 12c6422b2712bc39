//! Recursive-descent template parser.
//!
//! The parser buffers the whole template and drives a mutable cursor over
//! it, keyed by the current `TextMode`. It never fails hard: every
//! malformed construct is reported through the configured sink and parsing
//! recovers locally (skip a byte, consume a bogus comment, or fall back to
//! text).
//!
//! Invariants:
//! - Every produced node satisfies
//!   `source[loc.start.offset..loc.end.offset] == loc.source`.
//! - Each loop iteration consumes at least one byte, so parsing is a single
//!   forward pass over the buffer.
//! - Adjacent text runs are merged on push; children lists never hold two
//!   neighboring text nodes.

use std::borrow::Cow;

use memchr::memchr;

use crate::ast::{
    AttributeNode, CommentNode, DirectiveNode, ElementNode, InterpolationNode, Namespace,
    Position, PropNode, RootNode, SimpleExpressionNode, SourceLocation, TagType,
    TemplateChildNode, TextMode, TextNode,
};
use crate::cursor::{Cursor, advance_position, is_template_whitespace};
use crate::entities::{NamedReferences, decode_entities};
use crate::errors::{ErrorCode, ParseError};
use crate::options::{Ancestor, ParseOptions};

/// Counters for one parse run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParseCounters {
    pub nodes: u64,
    pub elements: u64,
    pub errors: u64,
}

/// Parse a template into a located syntax tree.
pub fn parse<'a>(source: &'a str, options: ParseOptions) -> RootNode<'a> {
    parse_with_counters(source, options).0
}

/// Parse with the default options.
pub fn parse_default(source: &str) -> RootNode<'_> {
    parse(source, ParseOptions::default())
}

/// Parse and return instrumentation counters alongside the tree.
pub fn parse_with_counters<'a>(
    source: &'a str,
    options: ParseOptions,
) -> (RootNode<'a>, ParseCounters) {
    let refs = NamedReferences::new(&options.named_character_references);
    let open_delim = options.delimiters.0.clone();
    let close_delim = options.delimiters.1.clone();
    let mut parser = Parser {
        cursor: Cursor::new(source),
        options,
        refs,
        open_delim,
        close_delim,
        counters: ParseCounters::default(),
    };
    let start = parser.cursor.snapshot();
    let mut ancestors = Vec::new();
    let children = parser.parse_children(TextMode::Data, &mut ancestors);
    debug_assert!(ancestors.is_empty(), "element stack must unwind fully");
    let root = RootNode {
        children,
        imports: Vec::new(),
        statements: Vec::new(),
        hoists: Vec::new(),
        codegen_node: None,
        loc: parser.cursor.selection(start),
    };
    (root, parser.counters)
}

/// Open element frame while its children are being parsed.
struct OpenElement<'a> {
    tag: &'a str,
    ns: Namespace,
}

enum TagKind {
    Start,
    End,
}

/// Outcome of dispatching on a `<` head in DATA mode.
enum Angle<'a> {
    Nodes(Vec<TemplateChildNode<'a>>),
    /// Input was consumed but no node produced.
    Skip,
    /// Not tag-like after all; reparse the head as text.
    Text,
}

struct AttrValue<'a> {
    content: Cow<'a, str>,
    is_quoted: bool,
    loc: SourceLocation<'a>,
}

struct Parser<'a> {
    cursor: Cursor<'a>,
    options: ParseOptions,
    refs: NamedReferences,
    open_delim: String,
    close_delim: String,
    counters: ParseCounters,
}

impl<'a> Parser<'a> {
    fn emit_error(&mut self, code: ErrorCode, position: Position) {
        self.counters.errors += 1;
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(
            target: "template.parse",
            "error {} at offset {}",
            code.as_str(),
            position.offset
        );
        (self.options.on_error)(ParseError { code, position });
    }

    /// Report at the current cursor plus `byte_offset` (ASCII contexts only).
    fn error_here(&mut self, code: ErrorCode, byte_offset: usize) {
        let head = &self.cursor.remaining()[..byte_offset];
        let position = advance_position(self.cursor.snapshot(), head);
        self.emit_error(code, position);
    }

    fn decode_text_slice(
        &mut self,
        raw: &'a str,
        at: Position,
        mode: TextMode,
    ) -> Cow<'a, str> {
        if matches!(mode, TextMode::RawText | TextMode::Cdata) {
            return Cow::Borrowed(raw);
        }
        let mut reported: Vec<(ErrorCode, Position)> = Vec::new();
        let decoded = decode_entities(raw, at, mode, &self.refs, &mut |code, pos| {
            reported.push((code, pos));
        });
        for (code, pos) in reported {
            self.emit_error(code, pos);
        }
        decoded
    }

    fn parse_children(
        &mut self,
        mode: TextMode,
        ancestors: &mut Vec<OpenElement<'a>>,
    ) -> Vec<TemplateChildNode<'a>> {
        let mut nodes: Vec<TemplateChildNode<'a>> = Vec::new();
        while !self.is_end(mode, ancestors) {
            let s = self.cursor.remaining();
            let mut produced: Vec<TemplateChildNode<'a>> = Vec::new();
            let mut fall_to_text = true;

            if matches!(mode, TextMode::Data | TextMode::RcData)
                && s.starts_with(self.open_delim.as_str())
            {
                if let Some(node) = self.parse_interpolation(mode) {
                    produced.push(TemplateChildNode::Interpolation(node));
                    fall_to_text = false;
                }
            } else if mode == TextMode::Data && s.starts_with('<') {
                match self.parse_angle(ancestors) {
                    Angle::Nodes(out) => {
                        produced = out;
                        fall_to_text = false;
                    }
                    Angle::Skip => fall_to_text = false,
                    Angle::Text => {}
                }
            }

            if fall_to_text && produced.is_empty() {
                let text = self.parse_text(mode);
                produced.push(TemplateChildNode::Text(text));
            }
            for node in produced {
                self.push_node(&mut nodes, node);
            }
        }
        if self.options.ignore_spaces {
            nodes.retain(|node| !matches!(node, TemplateChildNode::Text(t) if t.is_empty));
        }
        nodes
    }

    /// Push with adjacent-text merging.
    fn push_node(&mut self, nodes: &mut Vec<TemplateChildNode<'a>>, node: TemplateChildNode<'a>) {
        if let TemplateChildNode::Text(new) = &node
            && let Some(TemplateChildNode::Text(prev)) = nodes.last_mut()
            && prev.loc.end.offset == new.loc.start.offset
        {
            prev.content.to_mut().push_str(&new.content);
            prev.loc.end = new.loc.end;
            prev.loc.source =
                &self.cursor.source()[prev.loc.start.offset..new.loc.end.offset];
            prev.is_empty = prev.content.trim().is_empty();
            return;
        }
        self.counters.nodes += 1;
        nodes.push(node);
    }

    fn parse_angle(&mut self, ancestors: &mut Vec<OpenElement<'a>>) -> Angle<'a> {
        let s = self.cursor.remaining();
        let bytes = s.as_bytes();
        debug_assert_eq!(bytes[0], b'<');
        if bytes.len() == 1 {
            self.error_here(ErrorCode::EofBeforeTagName, 1);
            return Angle::Text;
        }
        match bytes[1] {
            b'!' => {
                if s.starts_with("<!--") {
                    Angle::Nodes(vec![TemplateChildNode::Comment(self.parse_comment())])
                } else if s.starts_with("<!DOCTYPE") {
                    // DOCTYPE keeps bogus-comment semantics.
                    Angle::Nodes(vec![TemplateChildNode::Comment(
                        self.parse_bogus_comment(2),
                    )])
                } else if s.starts_with("<![CDATA[") {
                    let ns = ancestors.last().map_or(Namespace::Html, |a| a.ns);
                    if ns != Namespace::Html {
                        Angle::Nodes(self.parse_cdata(ancestors))
                    } else {
                        self.error_here(ErrorCode::CdataInHtmlContent, 0);
                        Angle::Nodes(vec![TemplateChildNode::Comment(
                            self.parse_bogus_comment(2),
                        )])
                    }
                } else {
                    self.error_here(ErrorCode::IncorrectlyOpenedComment, 0);
                    Angle::Nodes(vec![TemplateChildNode::Comment(
                        self.parse_bogus_comment(2),
                    )])
                }
            }
            b'/' => {
                if bytes.len() == 2 {
                    self.error_here(ErrorCode::EofBeforeTagName, 2);
                    return Angle::Text;
                }
                match bytes[2] {
                    b'>' => {
                        self.error_here(ErrorCode::MissingEndTagName, 2);
                        self.cursor.advance(3);
                        Angle::Skip
                    }
                    b if b.is_ascii_alphabetic() => {
                        // Stray end tag: parse it fully, then discard.
                        self.error_here(ErrorCode::XInvalidEndTag, 0);
                        let _ = self.parse_tag(TagKind::End, ancestors.last());
                        Angle::Skip
                    }
                    _ => {
                        self.error_here(ErrorCode::InvalidFirstCharacterOfTagName, 2);
                        Angle::Nodes(vec![TemplateChildNode::Comment(
                            self.parse_bogus_comment(2),
                        )])
                    }
                }
            }
            b'?' => {
                self.error_here(ErrorCode::UnexpectedQuestionMarkInsteadOfTagName, 1);
                Angle::Nodes(vec![TemplateChildNode::Comment(self.parse_bogus_comment(1))])
            }
            b if b.is_ascii_alphabetic() => {
                let element = self.parse_element(ancestors);
                Angle::Nodes(vec![TemplateChildNode::Element(element)])
            }
            _ => {
                self.error_here(ErrorCode::InvalidFirstCharacterOfTagName, 1);
                Angle::Text
            }
        }
    }

    fn parse_comment(&mut self) -> CommentNode<'a> {
        let start = self.cursor.snapshot();
        let s = self.cursor.remaining();
        debug_assert!(s.starts_with("<!--"));
        match find_comment_close(s) {
            None => {
                let content = &s[4.min(s.len())..];
                self.cursor.advance(s.len());
                let position = self.cursor.snapshot();
                self.emit_error(ErrorCode::EofInComment, position);
                CommentNode {
                    content,
                    loc: self.cursor.selection(start),
                }
            }
            Some((close_idx, close_len)) => {
                if close_idx <= 3 {
                    self.error_here(ErrorCode::AbruptClosingOfEmptyComment, 0);
                }
                if close_len == 4 {
                    self.error_here(ErrorCode::IncorrectlyClosedComment, 0);
                }
                let content = if close_idx > 4 { &s[4..close_idx] } else { "" };
                // Nested `<!--` openers draw one diagnostic each, located at
                // the nested opener.
                let scan = &s[..close_idx];
                let mut prev = 1usize;
                while let Some(rel) = scan[prev..].find("<!--") {
                    let nested = prev + rel;
                    self.cursor.advance(nested - prev + 1);
                    if nested + 4 < scan.len() {
                        self.error_here(ErrorCode::NestedComment, 0);
                    }
                    prev = nested + 1;
                }
                self.cursor.advance(close_idx + close_len - prev + 1);
                CommentNode {
                    content,
                    loc: self.cursor.selection(start),
                }
            }
        }
    }

    /// Consume `<` + junk up to `>` (or EOF) as a comment node.
    /// `content_start` skips the construct prefix (`<!`, `<?`, `</`).
    fn parse_bogus_comment(&mut self, content_start: usize) -> CommentNode<'a> {
        let start = self.cursor.snapshot();
        let s = self.cursor.remaining();
        let (content, consumed) = match memchr(b'>', s.as_bytes()) {
            Some(idx) => (&s[content_start.min(idx)..idx], idx + 1),
            None => (&s[content_start.min(s.len())..], s.len()),
        };
        self.cursor.advance(consumed);
        CommentNode {
            content,
            loc: self.cursor.selection(start),
        }
    }

    fn parse_cdata(&mut self, ancestors: &mut Vec<OpenElement<'a>>) -> Vec<TemplateChildNode<'a>> {
        debug_assert!(self.cursor.starts_with("<![CDATA["));
        self.cursor.advance(9);
        let nodes = self.parse_children(TextMode::Cdata, ancestors);
        if self.cursor.is_empty() {
            let position = self.cursor.snapshot();
            self.emit_error(ErrorCode::EofInCdata, position);
        } else {
            debug_assert!(self.cursor.starts_with("]]>"));
            self.cursor.advance(3);
        }
        nodes
    }

    fn parse_element(&mut self, ancestors: &mut Vec<OpenElement<'a>>) -> ElementNode<'a> {
        self.counters.elements += 1;
        let start = self.cursor.snapshot();
        let mut element = self.parse_tag(TagKind::Start, ancestors.last());
        if element.is_self_closing || (self.options.is_void_tag)(element.tag) {
            return element;
        }

        ancestors.push(OpenElement {
            tag: element.tag,
            ns: element.ns,
        });
        let mode = (self.options.get_text_mode)(element.tag, element.ns);
        element.children = self.parse_children(mode, ancestors);
        ancestors.pop();

        if starts_with_end_tag_open(self.cursor.remaining(), element.tag) {
            let _ = self.parse_tag(TagKind::End, ancestors.last());
        } else {
            self.emit_error(ErrorCode::XMissingEndTag, start);
            if self.cursor.is_empty() && element.tag.eq_ignore_ascii_case("script") {
                // `<script><!--` swallowing the rest of the input gets the
                // dedicated comment-like-text diagnostic.
                if let Some(first) = element.children.first()
                    && first.loc().source.starts_with("<!--")
                {
                    self.emit_error(ErrorCode::EofInScriptHtmlCommentLikeText, first.loc().start);
                }
            }
        }
        element.loc = self.cursor.selection(start);
        element
    }

    fn parse_tag(
        &mut self,
        kind: TagKind,
        parent: Option<&OpenElement<'a>>,
    ) -> ElementNode<'a> {
        let start = self.cursor.snapshot();
        let s = self.cursor.remaining();
        let bytes = s.as_bytes();
        debug_assert_eq!(bytes[0], b'<');
        let name_start = match kind {
            TagKind::Start => 1,
            TagKind::End => 2,
        };
        debug_assert!(bytes[name_start].is_ascii_alphabetic());
        let mut name_end = name_start + 1;
        while name_end < bytes.len() && !is_tag_name_stop(bytes[name_end]) {
            name_end += 1;
        }
        let tag = &s[name_start..name_end];
        let ns = (self.options.get_namespace)(
            tag,
            parent.map(|p| Ancestor { tag: p.tag, ns: p.ns }),
        );
        self.cursor.advance(name_end);
        self.cursor.skip_whitespace();

        let props = self.parse_attributes(&kind);

        let mut is_self_closing = false;
        if self.cursor.is_empty() {
            let position = self.cursor.snapshot();
            self.emit_error(ErrorCode::EofInTag, position);
        } else {
            is_self_closing = self.cursor.starts_with("/>");
            if matches!(kind, TagKind::End) && is_self_closing {
                let position = self.cursor.snapshot();
                self.emit_error(ErrorCode::EndTagWithTrailingSolidus, position);
            }
            self.cursor.advance(if is_self_closing { 2 } else { 1 });
        }

        ElementNode {
            ns,
            tag,
            tag_type: tag_type_of(tag),
            props,
            is_self_closing,
            children: Vec::new(),
            codegen_node: None,
            loc: self.cursor.selection(start),
        }
    }

    fn parse_attributes(&mut self, kind: &TagKind) -> Vec<PropNode<'a>> {
        let mut props = Vec::new();
        let mut seen: Vec<&'a str> = Vec::new();
        loop {
            if self.cursor.is_empty()
                || self.cursor.starts_with(">")
                || self.cursor.starts_with("/>")
            {
                break;
            }
            if self.cursor.starts_with("/") {
                let position = self.cursor.snapshot();
                self.emit_error(ErrorCode::UnexpectedSolidusInTag, position);
                self.cursor.advance(1);
                self.cursor.skip_whitespace();
                continue;
            }
            if matches!(kind, TagKind::End) {
                let position = self.cursor.snapshot();
                self.emit_error(ErrorCode::EndTagWithAttributes, position);
            }
            let prop = self.parse_attribute(&mut seen);
            if matches!(kind, TagKind::Start) {
                props.push(prop);
            }
            if let Some(b) = self.cursor.peek_at(0)
                && !matches!(b, b'\t' | b'\r' | b'\n' | b'\x0C' | b' ' | b'/' | b'>')
            {
                let position = self.cursor.snapshot();
                self.emit_error(ErrorCode::MissingWhitespaceBetweenAttributes, position);
            }
            self.cursor.skip_whitespace();
        }
        props
    }

    fn parse_attribute(&mut self, seen: &mut Vec<&'a str>) -> PropNode<'a> {
        let start = self.cursor.snapshot();
        let s = self.cursor.remaining();
        let bytes = s.as_bytes();
        debug_assert!(!bytes.is_empty());
        // First char may be anything but a stop; later chars also stop on `=`.
        let mut name_end = s.chars().next().map_or(1, char::len_utf8);
        while name_end < bytes.len() && !is_attr_name_stop(bytes[name_end]) {
            name_end += 1;
        }
        let name = &s[..name_end];
        if seen.contains(&name) {
            self.emit_error(ErrorCode::DuplicateAttribute, start);
        } else {
            seen.push(name);
        }
        if bytes[0] == b'=' {
            self.emit_error(ErrorCode::UnexpectedEqualsSignBeforeAttributeName, start);
        }
        for (i, b) in name.bytes().enumerate() {
            if matches!(b, b'"' | b'\'' | b'<') {
                self.error_here(ErrorCode::UnexpectedCharacterInAttributeName, i);
            }
        }
        self.cursor.advance(name_end);

        let mut value: Option<AttrValue<'a>> = None;
        let rest = self.cursor.remaining().as_bytes();
        let mut ws = 0;
        while ws < rest.len() && is_template_whitespace(rest[ws]) {
            ws += 1;
        }
        if rest.get(ws) == Some(&b'=') {
            self.cursor.advance(ws + 1);
            self.cursor.skip_whitespace();
            value = self.parse_attribute_value();
            if value.is_none() {
                let position = self.cursor.snapshot();
                self.emit_error(ErrorCode::MissingAttributeValue, position);
            }
        }
        let loc = self.cursor.selection(start);

        if name.starts_with("v-")
            || name.starts_with(':')
            || name.starts_with('@')
            || name.starts_with('#')
        {
            return PropNode::Directive(self.build_directive(name, start, value, loc));
        }
        PropNode::Attribute(AttributeNode {
            name,
            value: value.map(|v| TextNode {
                is_empty: v.content.trim().is_empty(),
                content: v.content,
                loc: v.loc,
            }),
            loc,
        })
    }

    fn parse_attribute_value(&mut self) -> Option<AttrValue<'a>> {
        let start = self.cursor.snapshot();
        let s = self.cursor.remaining();
        let bytes = s.as_bytes();
        let first = *bytes.first()?;
        if first == b'"' || first == b'\'' {
            self.cursor.advance(1);
            let inner_start = self.cursor.snapshot();
            let inner = self.cursor.remaining();
            let content = match memchr(first, inner.as_bytes()) {
                Some(idx) => {
                    let raw = &inner[..idx];
                    let decoded =
                        self.decode_text_slice(raw, inner_start, TextMode::AttributeValue);
                    self.cursor.advance(idx + 1);
                    decoded
                }
                None => {
                    // Unterminated quote: the remainder is the value.
                    let decoded =
                        self.decode_text_slice(inner, inner_start, TextMode::AttributeValue);
                    self.cursor.advance(inner.len());
                    decoded
                }
            };
            return Some(AttrValue {
                content,
                is_quoted: true,
                loc: self.cursor.selection(start),
            });
        }

        let mut end = 0;
        while end < bytes.len() && !matches!(bytes[end], b'\t' | b'\r' | b'\n' | b'\x0C' | b' ' | b'>')
        {
            end += 1;
        }
        if end == 0 {
            return None;
        }
        let raw = &s[..end];
        for (i, b) in raw.bytes().enumerate() {
            if matches!(b, b'"' | b'\'' | b'<' | b'=' | b'`') {
                self.error_here(ErrorCode::UnexpectedCharacterInUnquotedAttributeValue, i);
            }
        }
        let content = self.decode_text_slice(raw, start, TextMode::AttributeValue);
        self.cursor.advance(end);
        Some(AttrValue {
            content,
            is_quoted: false,
            loc: self.cursor.selection(start),
        })
    }

    fn build_directive(
        &mut self,
        name: &'a str,
        start: Position,
        value: Option<AttrValue<'a>>,
        loc: SourceLocation<'a>,
    ) -> DirectiveNode<'a> {
        let bytes = name.as_bytes();
        let is_shorthand = matches!(bytes[0], b':' | b'@' | b'#');
        let mut dir_name = String::new();
        let mut section = 0usize;
        if !is_shorthand {
            debug_assert!(name.starts_with("v-"));
            let body = &name[2..];
            let mut end = 0;
            let body_bytes = body.as_bytes();
            while end < body_bytes.len()
                && (body_bytes[end].is_ascii_alphanumeric() || body_bytes[end] == b'-')
            {
                end += 1;
            }
            if end > 0 {
                dir_name = body[..end].to_ascii_lowercase();
            }
            section = 2 + end;
        }
        if dir_name.is_empty() {
            dir_name = match bytes[0] {
                b':' => "bind",
                b'@' => "on",
                _ => "slot",
            }
            .to_string();
        }

        // Argument section: `:` after a `v-` name, or the shorthand char.
        let mut arg = None;
        let has_arg_marker = if is_shorthand {
            true
        } else {
            bytes.get(section) == Some(&b':')
        };
        if has_arg_marker && section < bytes.len() {
            let arg_start = section + 1;
            let mut arg_end = arg_start;
            while arg_end < bytes.len() && bytes[arg_end] != b'.' {
                arg_end += 1;
            }
            if arg_end > arg_start {
                arg = Some(self.make_directive_arg(name, start, arg_start, arg_end));
            }
            section = arg_end;
        }

        let modifiers: Vec<&'a str> = if section < name.len() {
            name[section..].split('.').filter(|m| !m.is_empty()).collect()
        } else {
            Vec::new()
        };

        let exp = value.map(|v| {
            let mut vloc = v.loc;
            if v.is_quoted {
                // Point past the opening quote and trim both quotes from the
                // covered source.
                let inner = if vloc.source.len() >= 2 {
                    &vloc.source[1..vloc.source.len() - 1]
                } else {
                    ""
                };
                vloc.start = advance_position(vloc.start, &vloc.source[..1]);
                vloc.end = advance_position(vloc.start, inner);
                vloc.source = inner;
            }
            SimpleExpressionNode {
                content: v.content,
                is_static: false,
                loc: vloc,
            }
        });

        debug_assert!(!dir_name.is_empty(), "directive name must be non-empty");
        DirectiveNode {
            name: dir_name,
            arg,
            exp,
            modifiers,
            loc,
        }
    }

    fn make_directive_arg(
        &mut self,
        name: &'a str,
        attr_start: Position,
        arg_start: usize,
        arg_end: usize,
    ) -> SimpleExpressionNode<'a> {
        let raw = &name[arg_start..arg_end];
        let start = advance_position(attr_start, &name[..arg_start]);
        let loc = SourceLocation {
            start,
            end: advance_position(start, raw),
            source: raw,
        };
        if let Some(dynamic) = raw.strip_prefix('[') {
            let content = match dynamic.strip_suffix(']') {
                Some(inner) => inner,
                None => {
                    self.emit_error(ErrorCode::XMissingDynamicDirectiveArgumentEnd, loc.end);
                    dynamic
                }
            };
            SimpleExpressionNode {
                content: Cow::Borrowed(content),
                is_static: false,
                loc,
            }
        } else {
            SimpleExpressionNode {
                content: Cow::Borrowed(raw),
                is_static: true,
                loc,
            }
        }
    }

    fn parse_interpolation(&mut self, mode: TextMode) -> Option<InterpolationNode<'a>> {
        let s = self.cursor.remaining();
        debug_assert!(s.starts_with(self.open_delim.as_str()));
        let open_len = self.open_delim.len();
        let Some(rel) = s[open_len..].find(self.close_delim.as_str()) else {
            let position = self.cursor.snapshot();
            self.emit_error(ErrorCode::XMissingInterpolationEnd, position);
            return None;
        };
        let start = self.cursor.snapshot();
        self.cursor.advance(open_len);
        let raw = &self.cursor.remaining()[..rel];
        let raw_start = self.cursor.snapshot();

        // Trim on the raw slice; the trimmed slice is what gets decoded.
        let lead = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim();
        let inner_start = advance_position(raw_start, &raw[..lead]);
        let inner_end = advance_position(inner_start, trimmed);
        let content = self.decode_text_slice(trimmed, inner_start, mode);

        let close_len = self.close_delim.len();
        self.cursor.advance(rel + close_len);
        Some(InterpolationNode {
            content: SimpleExpressionNode {
                content,
                is_static: false,
                loc: SourceLocation {
                    start: inner_start,
                    end: inner_end,
                    source: trimmed,
                },
            },
            loc: self.cursor.selection(start),
        })
    }

    fn parse_text(&mut self, mode: TextMode) -> TextNode<'a> {
        let s = self.cursor.remaining();
        debug_assert!(!s.is_empty(), "parse_text requires input");
        let mut end = s.len();
        if let Some(i) = find_from(s, "<", 1) {
            end = end.min(i);
        }
        if let Some(i) = find_from(s, self.open_delim.as_str(), 1) {
            end = end.min(i);
        }
        if mode == TextMode::Cdata
            && let Some(i) = find_from(s, "]]>", 1)
        {
            end = end.min(i);
        }
        debug_assert!(end > 0, "text scan must make progress");
        let start = self.cursor.snapshot();
        let raw = &s[..end];
        let content = self.decode_text_slice(raw, start, mode);
        self.cursor.advance(end);
        TextNode {
            is_empty: content.trim().is_empty(),
            content,
            loc: self.cursor.selection(start),
        }
    }

    fn is_end(&self, mode: TextMode, ancestors: &[OpenElement<'a>]) -> bool {
        let s = self.cursor.remaining();
        match mode {
            TextMode::Data => {
                if s.starts_with("</") {
                    for ancestor in ancestors.iter().rev() {
                        if starts_with_end_tag_open(s, ancestor.tag) {
                            return true;
                        }
                    }
                }
            }
            TextMode::RcData | TextMode::RawText => {
                if let Some(parent) = ancestors.last()
                    && starts_with_end_tag_open(s, parent.tag)
                {
                    return true;
                }
            }
            TextMode::Cdata => {
                if s.starts_with("]]>") {
                    return true;
                }
            }
            TextMode::AttributeValue => {}
        }
        s.is_empty()
    }
}

fn is_tag_name_stop(b: u8) -> bool {
    matches!(b, b'\t' | b'\r' | b'\n' | b'\x0C' | b' ' | b'/' | b'>')
}

fn is_attr_name_stop(b: u8) -> bool {
    matches!(b, b'\t' | b'\r' | b'\n' | b'\x0C' | b' ' | b'/' | b'>' | b'=')
}

fn tag_type_of(tag: &str) -> TagType {
    if tag == "slot" {
        TagType::Slot
    } else if tag == "template" {
        TagType::Template
    } else if tag
        .bytes()
        .any(|b| b.is_ascii_uppercase() || b == b'-')
    {
        TagType::Component
    } else {
        TagType::Element
    }
}

/// `</` + case-insensitive `tag` + a tag-name terminator (EOS counts as `>`).
fn starts_with_end_tag_open(s: &str, tag: &str) -> bool {
    let bytes = s.as_bytes();
    if !s.starts_with("</") || bytes.len() < 2 + tag.len() {
        return false;
    }
    if !bytes[2..2 + tag.len()].eq_ignore_ascii_case(tag.as_bytes()) {
        return false;
    }
    match bytes.get(2 + tag.len()) {
        None => true,
        Some(b) => matches!(b, b'\t' | b'\r' | b'\n' | b'\x0C' | b' ' | b'/' | b'>'),
    }
}

/// First `--(!)?>` occurrence: returns (index of `--`, matched length).
fn find_comment_close(s: &str) -> Option<(usize, usize)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while let Some(rel) = memchr(b'-', &bytes[i..]) {
        let at = i + rel;
        if bytes.get(at + 1) == Some(&b'-') {
            match bytes.get(at + 2) {
                Some(b'>') => return Some((at, 3)),
                Some(b'!') if bytes.get(at + 3) == Some(&b'>') => return Some((at, 4)),
                _ => {}
            }
        }
        i = at + 1;
    }
    None
}

/// Forward substring search from a byte floor (clamped to a char boundary).
fn find_from(s: &str, needle: &str, mut from: usize) -> Option<usize> {
    while from < s.len() && !s.is_char_boundary(from) {
        from += 1;
    }
    if from >= s.len() {
        return None;
    }
    s[from..].find(needle).map(|i| from + i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn parse_collect(source: &str) -> (RootNode<'_>, Vec<ParseError>) {
        parse_collect_with(source, ParseOptions::default())
    }

    fn parse_collect_with(
        source: &str,
        mut options: ParseOptions,
    ) -> (RootNode<'_>, Vec<ParseError>) {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        options.on_error = Box::new(move |err| sink.borrow_mut().push(err));
        let root = parse(source, options);
        let collected = errors.borrow().clone();
        (root, collected)
    }

    fn codes(errors: &[ParseError]) -> Vec<ErrorCode> {
        errors.iter().map(|e| e.code).collect()
    }

    fn only_element<'a>(root: &'a RootNode<'a>) -> &'a ElementNode<'a> {
        match root.children.as_slice() {
            [TemplateChildNode::Element(el)] => el,
            other => panic!("expected a single element child, got {other:?}"),
        }
    }

    #[test]
    fn parses_element_with_attribute_and_interpolation() {
        let (root, errors) = parse_collect("<div id=a>{{ msg }}</div>");
        assert!(errors.is_empty(), "expected clean parse, got {errors:?}");
        let el = only_element(&root);
        assert_eq!(el.tag, "div");
        assert_eq!(el.tag_type, TagType::Element);
        match el.props.as_slice() {
            [PropNode::Attribute(attr)] => {
                assert_eq!(attr.name, "id");
                let value = attr.value.as_ref().expect("attribute value");
                assert_eq!(value.content, "a");
                assert!(!value.is_empty);
            }
            other => panic!("expected one plain attribute, got {other:?}"),
        }
        match el.children.as_slice() {
            [TemplateChildNode::Interpolation(interp)] => {
                assert_eq!(interp.content.content, "msg");
                assert!(!interp.content.is_static);
                assert_eq!(interp.content.loc.source, "msg");
                assert_eq!(interp.loc.source, "{{ msg }}");
            }
            other => panic!("expected one interpolation child, got {other:?}"),
        }
    }

    #[test]
    fn every_location_slices_back_to_its_source() {
        let source = "<div id=\"x\" :class=\"c\">a &amp; b<!--note--><br/>{{ v }}</div>";
        let (root, _) = parse_collect(source);
        fn check(source: &str, node: &TemplateChildNode<'_>) {
            let loc = node.loc();
            assert_eq!(&source[loc.start.offset..loc.end.offset], loc.source);
            if let TemplateChildNode::Element(el) = node {
                for prop in &el.props {
                    let loc = match prop {
                        PropNode::Attribute(a) => &a.loc,
                        PropNode::Directive(d) => &d.loc,
                    };
                    assert_eq!(&source[loc.start.offset..loc.end.offset], loc.source);
                }
                for child in &el.children {
                    check(source, child);
                }
            }
        }
        for child in &root.children {
            check(source, child);
        }
        assert_eq!(root.loc.source, source);
    }

    #[test]
    fn merges_adjacent_text_runs() {
        // `<` that opens nothing tag-like splits the scan but not the node.
        let (root, errors) = parse_collect("a < b < c");
        assert_eq!(
            codes(&errors),
            vec![
                ErrorCode::InvalidFirstCharacterOfTagName,
                ErrorCode::InvalidFirstCharacterOfTagName,
            ]
        );
        match root.children.as_slice() {
            [TemplateChildNode::Text(text)] => {
                assert_eq!(text.content, "a < b < c");
                assert_eq!(text.loc.source, "a < b < c");
            }
            other => panic!("expected one merged text node, got {other:?}"),
        }
    }

    #[test]
    fn drops_whitespace_only_text_when_configured() {
        let (root, _) = parse_collect("<div>  \n  <span></span>  </div>");
        let el = only_element(&root);
        assert_eq!(el.children.len(), 1, "expected blanks dropped, got {:?}", el.children);

        let options = ParseOptions {
            ignore_spaces: false,
            ..Default::default()
        };
        let (root, _) = parse_collect_with("<div>  \n  <span></span>  </div>", options);
        let el = only_element(&root);
        assert_eq!(el.children.len(), 3);
    }

    #[test]
    fn decodes_entities_in_text_and_reports_missing_semicolon() {
        let (root, errors) = parse_collect("a &amp; b");
        assert!(errors.is_empty(), "terminated reference is clean, got {errors:?}");
        match root.children.as_slice() {
            [TemplateChildNode::Text(text)] => assert_eq!(text.content, "a & b"),
            other => panic!("expected text node, got {other:?}"),
        }

        let (root, errors) = parse_collect("a &amp b");
        assert_eq!(
            codes(&errors),
            vec![ErrorCode::MissingSemicolonAfterCharacterReference]
        );
        match root.children.as_slice() {
            [TemplateChildNode::Text(text)] => assert_eq!(text.content, "a & b"),
            other => panic!("expected text node, got {other:?}"),
        }
    }

    #[test]
    fn nested_comment_reports_and_keeps_outer_content() {
        let (root, errors) = parse_collect("<!--x<!--y-->");
        assert_eq!(codes(&errors), vec![ErrorCode::NestedComment]);
        match root.children.as_slice() {
            [TemplateChildNode::Comment(comment)] => assert_eq!(comment.content, "x<!--y"),
            other => panic!("expected comment node, got {other:?}"),
        }
        // Diagnostic points at the nested opener.
        assert_eq!(errors[0].position.offset, 5);
    }

    #[test]
    fn comment_edge_forms_report() {
        let (_, errors) = parse_collect("<!-->");
        assert_eq!(codes(&errors), vec![ErrorCode::AbruptClosingOfEmptyComment]);

        let (_, errors) = parse_collect("<!--->");
        assert_eq!(codes(&errors), vec![ErrorCode::AbruptClosingOfEmptyComment]);

        let (root, errors) = parse_collect("<!--a--!>");
        assert_eq!(codes(&errors), vec![ErrorCode::IncorrectlyClosedComment]);
        match root.children.as_slice() {
            [TemplateChildNode::Comment(comment)] => assert_eq!(comment.content, "a"),
            other => panic!("expected comment node, got {other:?}"),
        }

        let (root, errors) = parse_collect("<!--a");
        assert_eq!(codes(&errors), vec![ErrorCode::EofInComment]);
        match root.children.as_slice() {
            [TemplateChildNode::Comment(comment)] => assert_eq!(comment.content, "a"),
            other => panic!("expected comment node, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_interpolation_reports_and_falls_back_to_text() {
        let (root, errors) = parse_collect("{{ foo");
        assert_eq!(codes(&errors), vec![ErrorCode::XMissingInterpolationEnd]);
        match root.children.as_slice() {
            [TemplateChildNode::Text(text)] => assert_eq!(text.content, "{{ foo"),
            other => panic!("expected text fallback, got {other:?}"),
        }
    }

    #[test]
    fn parses_directive_with_dynamic_argument_and_modifier() {
        let (root, errors) = parse_collect("<div v-bind:[key].sync=\"v\"></div>");
        assert!(errors.is_empty(), "expected clean parse, got {errors:?}");
        let el = only_element(&root);
        match el.props.as_slice() {
            [PropNode::Directive(dir)] => {
                assert_eq!(dir.name, "bind");
                let arg = dir.arg.as_ref().expect("directive argument");
                assert_eq!(arg.content, "key");
                assert!(!arg.is_static);
                let exp = dir.exp.as_ref().expect("directive expression");
                assert_eq!(exp.content, "v");
                assert_eq!(exp.loc.source, "v");
                assert_eq!(dir.modifiers, vec!["sync"]);
            }
            other => panic!("expected one directive, got {other:?}"),
        }
    }

    #[test]
    fn directive_shorthands_map_to_canonical_names() {
        let (root, _) = parse_collect("<a :href=\"u\" @click=\"f\" #head></a>");
        let el = only_element(&root);
        let names: Vec<&str> = el
            .props
            .iter()
            .map(|p| match p {
                PropNode::Directive(d) => d.name.as_str(),
                PropNode::Attribute(a) => a.name,
            })
            .collect();
        assert_eq!(names, vec!["bind", "on", "slot"]);
        match &el.props[0] {
            PropNode::Directive(d) => {
                let arg = d.arg.as_ref().expect("shorthand argument");
                assert_eq!(arg.content, "href");
                assert!(arg.is_static);
            }
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_dynamic_argument_reports() {
        let (root, errors) = parse_collect("<div v-on:[event]=\"f\" v-bind:[k=\"v\"></div>");
        assert!(
            codes(&errors).contains(&ErrorCode::XMissingDynamicDirectiveArgumentEnd),
            "expected dynamic-argument diagnostic, got {errors:?}"
        );
        let el = only_element(&root);
        match &el.props[1] {
            PropNode::Directive(d) => {
                let arg = d.arg.as_ref().expect("argument");
                assert!(!arg.is_static);
            }
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_attribute_reports_and_keeps_both() {
        let (root, errors) = parse_collect("<div id=a id=b></div>");
        assert_eq!(codes(&errors), vec![ErrorCode::DuplicateAttribute]);
        let el = only_element(&root);
        assert_eq!(el.props.len(), 2, "both entries stay, got {:?}", el.props);
    }

    #[test]
    fn attribute_name_and_value_character_diagnostics() {
        let (_, errors) = parse_collect("<div a\"b=1></div>");
        assert_eq!(
            codes(&errors),
            vec![ErrorCode::UnexpectedCharacterInAttributeName]
        );

        let (_, errors) = parse_collect("<div a==></div>");
        assert_eq!(
            codes(&errors),
            vec![ErrorCode::UnexpectedCharacterInUnquotedAttributeValue]
        );

        let (_, errors) = parse_collect("<div =a></div>");
        assert_eq!(
            codes(&errors),
            vec![ErrorCode::UnexpectedEqualsSignBeforeAttributeName]
        );

        let (_, errors) = parse_collect("<div a=></div>");
        assert_eq!(codes(&errors), vec![ErrorCode::MissingAttributeValue]);
    }

    #[test]
    fn tag_level_diagnostics() {
        let (_, errors) = parse_collect("<div / id=a></div>");
        assert_eq!(codes(&errors), vec![ErrorCode::UnexpectedSolidusInTag]);

        let (_, errors) = parse_collect("<div id=a id2=b'></div>");
        assert!(codes(&errors).contains(&ErrorCode::UnexpectedCharacterInUnquotedAttributeValue));

        let (_, errors) = parse_collect("<div a=\"1\"b=\"2\"></div>");
        assert_eq!(
            codes(&errors),
            vec![ErrorCode::MissingWhitespaceBetweenAttributes]
        );

        let (_, errors) = parse_collect("<div></div id=x>");
        assert_eq!(codes(&errors), vec![ErrorCode::EndTagWithAttributes]);

        let (_, errors) = parse_collect("<div></div/>");
        assert_eq!(codes(&errors), vec![ErrorCode::EndTagWithTrailingSolidus]);
    }

    #[test]
    fn missing_end_tag_reports_at_element_start() {
        let (root, errors) = parse_collect("<div><span>hi</div>");
        assert_eq!(codes(&errors), vec![ErrorCode::XMissingEndTag]);
        // The span is the unclosed element; its parent div still closes.
        let el = only_element(&root);
        assert_eq!(el.tag, "div");
        assert_eq!(errors[0].position.offset, 5);
    }

    #[test]
    fn stray_end_tag_is_parsed_and_discarded() {
        let (root, errors) = parse_collect("</a>x");
        assert_eq!(codes(&errors), vec![ErrorCode::XInvalidEndTag]);
        match root.children.as_slice() {
            [TemplateChildNode::Text(text)] => assert_eq!(text.content, "x"),
            other => panic!("expected discarded end tag then text, got {other:?}"),
        }
    }

    #[test]
    fn malformed_tag_heads_recover() {
        let (root, errors) = parse_collect("</>x");
        assert_eq!(codes(&errors), vec![ErrorCode::MissingEndTagName]);
        assert_eq!(root.children.len(), 1);

        let (root, errors) = parse_collect("<?xml?>y");
        assert_eq!(
            codes(&errors),
            vec![ErrorCode::UnexpectedQuestionMarkInsteadOfTagName]
        );
        match root.children.as_slice() {
            [TemplateChildNode::Comment(c), TemplateChildNode::Text(t)] => {
                assert_eq!(c.content, "?xml?");
                assert_eq!(t.content, "y");
            }
            other => panic!("expected bogus comment and text, got {other:?}"),
        }

        let (root, errors) = parse_collect("<");
        assert_eq!(codes(&errors), vec![ErrorCode::EofBeforeTagName]);
        match root.children.as_slice() {
            [TemplateChildNode::Text(t)] => assert_eq!(t.content, "<"),
            other => panic!("expected lone `<` as text, got {other:?}"),
        }

        let (_, errors) = parse_collect("<div");
        assert_eq!(
            codes(&errors),
            vec![ErrorCode::EofInTag, ErrorCode::XMissingEndTag]
        );
    }

    #[test]
    fn doctype_is_preserved_as_bogus_comment() {
        let (root, errors) = parse_collect("<!DOCTYPE html><div></div>");
        assert!(errors.is_empty(), "doctype is tolerated, got {errors:?}");
        match root.children.as_slice() {
            [TemplateChildNode::Comment(c), TemplateChildNode::Element(_)] => {
                assert_eq!(c.content, "DOCTYPE html");
            }
            other => panic!("expected bogus comment then element, got {other:?}"),
        }
    }

    #[test]
    fn cdata_in_html_reports_and_becomes_bogus_comment() {
        let (root, errors) = parse_collect("<div><![CDATA[x]]></div>");
        assert_eq!(codes(&errors), vec![ErrorCode::CdataInHtmlContent]);
        let el = only_element(&root);
        match el.children.as_slice() {
            [TemplateChildNode::Comment(c)] => assert_eq!(c.content, "[CDATA[x]]"),
            other => panic!("expected bogus comment, got {other:?}"),
        }
    }

    #[test]
    fn cdata_in_foreign_namespace_yields_children() {
        let options = ParseOptions {
            get_namespace: Box::new(|tag, parent| {
                if tag == "svg" || parent.is_some_and(|p| p.ns == Namespace::Svg) {
                    Namespace::Svg
                } else {
                    Namespace::Html
                }
            }),
            ..Default::default()
        };
        let (root, errors) = parse_collect_with("<svg><![CDATA[a<b]]></svg>", options);
        assert!(errors.is_empty(), "expected clean CDATA parse, got {errors:?}");
        let el = only_element(&root);
        assert_eq!(el.ns, Namespace::Svg);
        match el.children.as_slice() {
            [TemplateChildNode::Text(t)] => assert_eq!(t.content, "a<b"),
            other => panic!("expected raw text child, got {other:?}"),
        }
    }

    #[test]
    fn rawtext_mode_swallows_markup_until_matching_close() {
        let options = ParseOptions {
            get_text_mode: Box::new(|tag, _| {
                if tag == "script" {
                    TextMode::RawText
                } else {
                    TextMode::Data
                }
            }),
            ..Default::default()
        };
        let (root, errors) =
            parse_collect_with("<script>let a = 1 < 2; {{x}} </SCRIPT>", options);
        assert!(errors.is_empty(), "expected clean rawtext parse, got {errors:?}");
        let el = only_element(&root);
        match el.children.as_slice() {
            [TemplateChildNode::Text(t)] => {
                assert_eq!(t.content, "let a = 1 < 2; {{x}} ");
            }
            other => panic!("expected one rawtext child, got {other:?}"),
        }
    }

    #[test]
    fn script_eof_with_comment_like_text_reports() {
        let options = ParseOptions {
            get_text_mode: Box::new(|tag, _| {
                if tag == "script" {
                    TextMode::RawText
                } else {
                    TextMode::Data
                }
            }),
            ..Default::default()
        };
        let (_, errors) = parse_collect_with("<script><!-- abc", options);
        assert_eq!(
            codes(&errors),
            vec![
                ErrorCode::XMissingEndTag,
                ErrorCode::EofInScriptHtmlCommentLikeText
            ]
        );
    }

    #[test]
    fn void_tags_take_no_children() {
        let options = ParseOptions {
            is_void_tag: Box::new(|tag| tag == "br"),
            ..Default::default()
        };
        let (root, errors) = parse_collect_with("<div><br>x</div>", options);
        assert!(errors.is_empty(), "expected clean parse, got {errors:?}");
        let el = only_element(&root);
        match el.children.as_slice() {
            [TemplateChildNode::Element(br), TemplateChildNode::Text(t)] => {
                assert_eq!(br.tag, "br");
                assert!(br.children.is_empty());
                assert_eq!(t.content, "x");
            }
            other => panic!("expected void element then text, got {other:?}"),
        }
    }

    #[test]
    fn tag_types_are_classified() {
        let (root, _) =
            parse_collect("<slot/><template/><my-widget/><MyWidget/><div/>");
        let types: Vec<TagType> = root
            .children
            .iter()
            .map(|n| match n {
                TemplateChildNode::Element(el) => el.tag_type,
                other => panic!("expected element, got {other:?}"),
            })
            .collect();
        assert_eq!(
            types,
            vec![
                TagType::Slot,
                TagType::Template,
                TagType::Component,
                TagType::Component,
                TagType::Element,
            ]
        );
    }

    #[test]
    fn custom_delimiters_parse_interpolation() {
        let options = ParseOptions {
            delimiters: ("[[".to_string(), "]]".to_string()),
            ..Default::default()
        };
        let (root, errors) = parse_collect_with("[[ count ]]", options);
        assert!(errors.is_empty(), "expected clean parse, got {errors:?}");
        match root.children.as_slice() {
            [TemplateChildNode::Interpolation(i)] => assert_eq!(i.content.content, "count"),
            other => panic!("expected interpolation, got {other:?}"),
        }
    }

    #[test]
    fn quoted_directive_value_location_excludes_quotes() {
        let source = "<div :key=\"item.id\"></div>";
        let (root, _) = parse_collect(source);
        let el = only_element(&root);
        match &el.props[0] {
            PropNode::Directive(d) => {
                let exp = d.exp.as_ref().expect("expression");
                assert_eq!(exp.loc.source, "item.id");
                assert_eq!(
                    &source[exp.loc.start.offset..exp.loc.end.offset],
                    "item.id"
                );
            }
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn unquoted_and_unterminated_values_are_tolerated() {
        let (root, errors) = parse_collect("<div a=1 b=\"2></div>");
        // The unterminated quote swallows the rest; the tag then hits EOF.
        assert!(
            codes(&errors).contains(&ErrorCode::EofInTag),
            "expected EOF in tag, got {errors:?}"
        );
        let el = only_element(&root);
        assert_eq!(el.props.len(), 2);
    }

    #[test]
    fn counters_track_nodes_elements_and_errors() {
        let errors_seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors_seen);
        let options = ParseOptions {
            on_error: Box::new(move |err| sink.borrow_mut().push(err)),
            ..Default::default()
        };
        let (_, counters) = parse_with_counters("<div id=a id=b><span>x</span></div>", options);
        assert_eq!(counters.elements, 2);
        assert_eq!(counters.errors, 1);
        assert_eq!(counters.errors as usize, errors_seen.borrow().len());
        assert!(counters.nodes >= 3, "expected node count, got {counters:?}");
    }
}
