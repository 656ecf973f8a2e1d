//! Identifiers the configuration declares for itself.
//!
//! Helpers, scripts, groups, scenes and automations defined in YAML are
//! absent from the controller's registry snapshot until the configuration
//! is deployed, so references to them must resolve locally.

use std::collections::BTreeSet;

use crate::document::{ConfigDocument, IncludeMode, Node, NodeKind};

/// Domains whose top-level mapping keys declare `domain.key` entities.
const KEYED_DOMAINS: &[&str] = &[
    "input_boolean",
    "input_number",
    "input_select",
    "input_text",
    "input_datetime",
    "input_button",
    "counter",
    "timer",
    "script",
    "group",
];

/// Domains declared as lists of items named by `alias`/`name`.
const LISTED_DOMAINS: &[&str] = &["automation", "scene"];

/// Entity identifiers declared by a document set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalDeclarations {
    ids: BTreeSet<String>,
}

impl LocalDeclarations {
    /// Collect declarations from `docs`, plus `builtin` identifiers that
    /// every controller provides.
    pub fn collect<'a>(
        docs: impl IntoIterator<Item = &'a ConfigDocument>,
        builtin: &[String],
    ) -> Self {
        let mut decl = Self::default();
        decl.ids.extend(builtin.iter().cloned());
        for doc in docs {
            for root in &doc.nodes {
                match &doc.origin {
                    Some(origin) => {
                        if let Some(key) = origin.key.as_deref() {
                            let stem = doc
                                .path
                                .file_stem()
                                .map(|s| s.to_string_lossy().into_owned());
                            decl.included(key, origin.mode, stem.as_deref(), root);
                        }
                    }
                    None => decl.top_level(root),
                }
            }
        }
        decl
    }

    /// Whether `id` is declared.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Declared identifiers in `domain`, sorted.
    pub fn in_domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.ids
            .iter()
            .map(String::as_str)
            .filter(move |id| id.split_once('.').is_some_and(|(d, _)| d == domain))
    }

    /// Number of declared identifiers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// A file that is not itself included: its top-level keys may declare
    /// inline (`script:` with a mapping body) or nest packages.
    fn top_level(&mut self, root: &Node) {
        let Some(entries) = root.as_mapping() else { return };
        for entry in entries {
            self.body(&entry.key, &entry.value);
            if entry.key == "homeassistant"
                && let Some(packages) = entry.value.get("packages").and_then(Node::as_mapping)
            {
                for package in packages {
                    self.top_level(&package.value);
                }
            }
        }
    }

    /// A file pulled in by an include attached to `key`.
    fn included(&mut self, key: &str, mode: IncludeMode, stem: Option<&str>, root: &Node) {
        match mode {
            IncludeMode::File | IncludeMode::DirMergeNamed | IncludeMode::DirMergeList => {
                self.body(key, root);
            }
            IncludeMode::DirNamed if KEYED_DOMAINS.contains(&key) => {
                if let Some(stem) = stem {
                    self.ids.insert(format!("{key}.{stem}"));
                }
            }
            IncludeMode::DirNamed => {
                // Package directories: each file is a package body.
                if key == "packages" {
                    self.top_level(root);
                }
            }
            IncludeMode::DirList if LISTED_DOMAINS.contains(&key) => self.listed_item(key, root),
            IncludeMode::DirList => {}
        }
    }

    /// The value of a domain key.
    fn body(&mut self, domain: &str, value: &Node) {
        if KEYED_DOMAINS.contains(&domain) {
            if let Some(entries) = value.as_mapping() {
                for entry in entries {
                    self.ids.insert(format!("{domain}.{}", entry.key));
                }
            }
        } else if LISTED_DOMAINS.contains(&domain) {
            match &value.kind {
                NodeKind::Sequence(items) => {
                    for item in items {
                        self.listed_item(domain, item);
                    }
                }
                NodeKind::Mapping(_) => self.listed_item(domain, value),
                _ => {}
            }
        }
    }

    /// One automation or scene definition.
    fn listed_item(&mut self, domain: &str, item: &Node) {
        let name_key = if domain == "scene" { "name" } else { "alias" };
        let mut named = false;
        if let Some(name) = item.get(name_key).and_then(Node::as_str) {
            let slug = slugify(name);
            if !slug.is_empty() {
                self.ids.insert(format!("{domain}.{slug}"));
                named = true;
            }
        }
        if let Some(id) = item.get("id").and_then(Node::as_str) {
            let slug = slugify(id);
            if !slug.is_empty() && (domain == "automation" || !named) {
                self.ids.insert(format!("{domain}.{slug}"));
            }
        }
    }
}

/// Lowercase, with every run of non-alphanumeric characters collapsed to
/// one `_` and no leading or trailing `_`.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut gap = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('_');
            }
            out.push(c);
            gap = false;
        } else {
            gap = true;
        }
    }
    out
}
