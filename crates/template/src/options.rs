//! Parser configuration.

use std::collections::HashMap;

use crate::ast::{Namespace, TextMode};
use crate::entities::default_named_references;
use crate::errors::ParseError;

/// Ancestor view handed to the namespace hook.
#[derive(Clone, Copy, Debug)]
pub struct Ancestor<'a> {
    pub tag: &'a str,
    pub ns: Namespace,
}

/// Knobs for one parse run. Hooks default to the HTML-agnostic behavior;
/// embedders supply real namespace/text-mode/void-tag policies.
pub struct ParseOptions {
    /// Interpolation delimiters.
    pub delimiters: (String, String),
    /// Drop whitespace-only text nodes from children lists.
    pub ignore_spaces: bool,
    pub get_namespace: Box<dyn Fn(&str, Option<Ancestor<'_>>) -> Namespace>,
    pub get_text_mode: Box<dyn Fn(&str, Namespace) -> TextMode>,
    pub is_void_tag: Box<dyn Fn(&str) -> bool>,
    /// Named character references; names keep any trailing `;`.
    pub named_character_references: HashMap<String, String>,
    /// Diagnostic sink. The default logs and drops.
    pub on_error: Box<dyn FnMut(ParseError)>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiters: ("{{".to_string(), "}}".to_string()),
            ignore_spaces: true,
            get_namespace: Box::new(|_, _| Namespace::Html),
            get_text_mode: Box::new(|_, _| TextMode::Data),
            is_void_tag: Box::new(|_| false),
            named_character_references: default_named_references(),
            on_error: Box::new(|err| {
                log::error!(
                    target: "template.parse",
                    "{} at {}:{} (offset {})",
                    err.code.as_str(),
                    err.position.line,
                    err.position.column,
                    err.position.offset
                );
            }),
        }
    }
}
