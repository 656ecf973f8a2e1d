//! Reference extraction: every resource identifier a document names.
//!
//! Two sources of references are combined:
//!
//! 1. values of reference-bearing keys (`entity_id`, `device_id`,
//!    `area_id`, `entities`, `scene`), taken as literal identifiers;
//! 2. template expressions in any string value, scanned with the pattern
//!    library in [`template`].
//!
//! Tag-extension nodes (`!secret`, `!input`, `!env_var`, includes) and
//! aliases never yield references. Extraction never fails.

pub mod template;

use std::collections::HashSet;

use hacheck_registry::ResourceKind;
use serde::Serialize;

use crate::document::{ConfigDocument, Node, NodeKind, ScalarStyle};

pub use template::{TemplateMatch, scan_templates};

/// Where in the document a reference appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextKind {
    /// Under a `trigger`/`triggers` key.
    Trigger,
    /// Under a `condition`/`conditions` key.
    Condition,
    /// Under an `action`/`actions`/`sequence` key.
    Action,
    /// Inside a `target` block.
    Target,
    /// Inside a template expression.
    TemplateExpression,
    /// A member of a scene, group or script `entities` list.
    Membership,
    /// Anywhere else (integration and helper configuration).
    Config,
}

impl ContextKind {
    /// Kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKind::Trigger => "trigger",
            ContextKind::Condition => "condition",
            ContextKind::Action => "action",
            ContextKind::Target => "target",
            ContextKind::TemplateExpression => "template-expression",
            ContextKind::Membership => "membership",
            ContextKind::Config => "config",
        }
    }

    /// The context a key opens for its value, if it opens one.
    fn opened_by(key: &str) -> Option<Self> {
        match key {
            "trigger" | "triggers" => Some(ContextKind::Trigger),
            "condition" | "conditions" => Some(ContextKind::Condition),
            "action" | "actions" | "sequence" => Some(ContextKind::Action),
            "target" => Some(ContextKind::Target),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One occurrence of a resource identifier inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSite {
    /// Referenced identifier, normalized (entity ids lowercased).
    pub identifier: String,
    /// Kind of resource the reference must resolve to.
    pub kind: ResourceKind,
    /// Display path of the document.
    pub file: String,
    /// 1-indexed line.
    pub line: usize,
    /// Surrounding context.
    pub context: ContextKind,
    /// The token as written.
    pub raw: String,
}

/// Keys whose values are direct references.
#[derive(Debug, Clone)]
pub struct ReferenceKeys {
    /// Keys holding entity identifiers.
    pub entity: Vec<String>,
    /// Keys holding device identifiers.
    pub device: Vec<String>,
    /// Keys holding area identifiers.
    pub area: Vec<String>,
    /// Keys holding entity membership lists (list items or mapping keys).
    pub membership: Vec<String>,
    /// Keys whose value is an entity identifier only when it looks like one.
    pub optional_entity: Vec<String>,
}

impl Default for ReferenceKeys {
    fn default() -> Self {
        let owned = |keys: &[&str]| keys.iter().map(|k| k.to_string()).collect();
        Self {
            entity: owned(&["entity_id"]),
            device: owned(&["device_id"]),
            area: owned(&["area_id"]),
            membership: owned(&["entities"]),
            optional_entity: owned(&["scene"]),
        }
    }
}

enum KeyRole {
    Direct(ResourceKind),
    Membership,
    OptionalEntity,
}

impl ReferenceKeys {
    fn role(&self, key: &str) -> Option<KeyRole> {
        let has = |keys: &[String]| keys.iter().any(|k| k == key);
        if has(&self.entity) {
            Some(KeyRole::Direct(ResourceKind::Entity))
        } else if has(&self.device) {
            Some(KeyRole::Direct(ResourceKind::Device))
        } else if has(&self.area) {
            Some(KeyRole::Direct(ResourceKind::Area))
        } else if has(&self.membership) {
            Some(KeyRole::Membership)
        } else if has(&self.optional_entity) {
            Some(KeyRole::OptionalEntity)
        } else {
            None
        }
    }
}

/// Extract every reference in `doc`, in document order, deduplicated on
/// (identifier, line).
pub fn extract(doc: &ConfigDocument, keys: &ReferenceKeys) -> Vec<ReferenceSite> {
    let mut ex = Extractor {
        keys,
        file: &doc.display,
        seen: HashSet::new(),
        out: Vec::new(),
    };
    for node in &doc.nodes {
        ex.walk(node, ContextKind::Config);
    }
    ex.out
}

struct Extractor<'a> {
    keys: &'a ReferenceKeys,
    file: &'a str,
    seen: HashSet<(String, usize)>,
    out: Vec<ReferenceSite>,
}

impl Extractor<'_> {
    fn walk(&mut self, node: &Node, context: ContextKind) {
        match &node.kind {
            NodeKind::Scalar(s) => self.templates(&s.value, s.style, node.line),
            NodeKind::Sequence(items) => {
                for item in items {
                    self.walk(item, context);
                }
            }
            NodeKind::Mapping(entries) => {
                for entry in entries {
                    match self.keys.role(&entry.key) {
                        Some(KeyRole::Direct(kind)) => self.direct(&entry.value, kind, context),
                        Some(KeyRole::Membership) => self.membership(&entry.value),
                        Some(KeyRole::OptionalEntity) => {
                            if let Some(text) = entry.value.as_str()
                                && looks_like_entity(text.trim())
                            {
                                self.literal(text, entry.value.line, ResourceKind::Entity, context);
                            }
                        }
                        None => {}
                    }
                    let inner = ContextKind::opened_by(&entry.key).unwrap_or(context);
                    self.walk(&entry.value, inner);
                }
            }
            NodeKind::Null | NodeKind::Tagged(_) | NodeKind::Alias(_) => {}
        }
    }

    fn direct(&mut self, value: &Node, kind: ResourceKind, context: ContextKind) {
        match &value.kind {
            NodeKind::Scalar(s) => self.literal(&s.value, value.line, kind, context),
            NodeKind::Sequence(items) => {
                for item in items {
                    if let NodeKind::Scalar(s) = &item.kind {
                        self.literal(&s.value, item.line, kind, context);
                    }
                }
            }
            _ => {}
        }
    }

    fn membership(&mut self, value: &Node) {
        match &value.kind {
            NodeKind::Mapping(entries) => {
                for e in entries {
                    self.literal(&e.key, e.key_line, ResourceKind::Entity, ContextKind::Membership);
                }
            }
            _ => self.direct(value, ResourceKind::Entity, ContextKind::Membership),
        }
    }

    /// A literal value: comma-separated identifiers. Templated values are
    /// left to the template scan.
    fn literal(&mut self, text: &str, line: usize, kind: ResourceKind, context: ContextKind) {
        if text.contains("{{") || text.contains("{%") {
            return;
        }
        for token in text.split(',') {
            let raw = token.trim();
            if raw.is_empty() || raw.eq_ignore_ascii_case("all") || raw.eq_ignore_ascii_case("none") {
                continue;
            }
            let identifier = match kind {
                ResourceKind::Entity => raw.to_lowercase(),
                _ => raw.to_string(),
            };
            self.push(identifier, raw, line, kind, context);
        }
    }

    fn templates(&mut self, text: &str, style: ScalarStyle, line: usize) {
        for m in scan_templates(text) {
            // Only literal blocks keep a one-to-one line mapping.
            let line = match style {
                ScalarStyle::Literal => line + text[..m.offset].matches('\n').count(),
                _ => line,
            };
            self.push(
                m.identifier,
                &m.raw,
                line,
                ResourceKind::Entity,
                ContextKind::TemplateExpression,
            );
        }
    }

    fn push(
        &mut self,
        identifier: String,
        raw: &str,
        line: usize,
        kind: ResourceKind,
        context: ContextKind,
    ) {
        if !self.seen.insert((identifier.clone(), line)) {
            return;
        }
        self.out.push(ReferenceSite {
            identifier,
            kind,
            file: self.file.to_string(),
            line,
            context,
            raw: raw.to_string(),
        });
    }
}

fn looks_like_entity(text: &str) -> bool {
    text.split_once('.').is_some_and(|(domain, object)| {
        !domain.is_empty()
            && !object.is_empty()
            && domain.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
            && object.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    })
}
