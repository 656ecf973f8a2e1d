//! Tagged document model, parser, and include-closure loader.
//!
//! A [`ConfigDocument`] is the parsed form of one configuration file: one
//! [`Node`] tree per YAML document in the stream, every node carrying the
//! 1-indexed source line it starts on. Controller tag extensions
//! (`!include`, `!secret`, `!input`, ...) become [`NodeKind::Tagged`] nodes
//! instead of being expanded, so that included files keep their own
//! locations.

mod loader;
mod parser;

pub use loader::{DocumentSet, Loader};
pub use parser::parse_bytes;

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// The parsed form of one configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    /// Path the file was read from.
    pub path: PathBuf,
    /// Path as shown in diagnostics (relative to the configuration directory
    /// when the file lives below it).
    pub display: String,
    /// Root node of each document in the stream, in source order. Empty for
    /// a file holding only comments or directives.
    pub nodes: Vec<Node>,
    /// How this file entered the document set, if it was included.
    pub origin: Option<IncludeOrigin>,
}

/// The include tag that pulled a document into the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeOrigin {
    /// Mapping key the include tag was the value of (`automation`,
    /// `script`, ...). `None` when the tag was not directly under a key.
    pub key: Option<String>,
    /// Which include tag was used.
    pub mode: IncludeMode,
}

/// A parsed node with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node payload.
    pub kind: NodeKind,
    /// 1-indexed line the node starts on.
    pub line: usize,
}

/// Node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Empty value (`key:` with nothing after it, `~`, `null`).
    Null,
    /// Any scalar, kept as text.
    Scalar(Scalar),
    /// Block or flow sequence.
    Sequence(Vec<Node>),
    /// Block or flow mapping, entries in source order.
    Mapping(Vec<MapEntry>),
    /// A controller tag extension; its target is not expanded.
    Tagged(TagRef),
    /// An alias (`*name`) to an anchored node elsewhere in the document.
    Alias(String),
}

/// A scalar value as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    /// Value after unquoting, escape processing and line folding.
    pub value: String,
    /// How the scalar was written.
    pub style: ScalarStyle,
}

/// Presentation style of a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    /// Unquoted.
    Plain,
    /// `'...'`
    SingleQuoted,
    /// `"..."`
    DoubleQuoted,
    /// `|` block scalar.
    Literal,
    /// `>` block scalar.
    Folded,
}

/// One `key: value` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    /// The key, unquoted.
    pub key: String,
    /// Line the key is written on.
    pub key_line: usize,
    /// The value node.
    pub value: Node,
}

/// A tag-extension marker and its raw argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    /// Which extension.
    pub kind: TagKind,
    /// Raw argument text (file name, secret name, input name).
    pub argument: String,
}

/// Controller tag extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `!include` and the `!include_dir_*` family.
    Include(IncludeMode),
    /// `!secret`: value substituted from the secrets file.
    Secret,
    /// `!input`: blueprint input substituted at instantiation.
    Input,
    /// `!env_var`: value read from the controller's environment.
    EnvVar,
}

/// Include tag variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncludeMode {
    /// `!include file.yaml`
    File,
    /// `!include_dir_list dir`
    DirList,
    /// `!include_dir_named dir`
    DirNamed,
    /// `!include_dir_merge_list dir`
    DirMergeList,
    /// `!include_dir_merge_named dir`
    DirMergeNamed,
}

impl IncludeMode {
    /// Whether the argument names a directory rather than a file.
    pub fn is_dir(self) -> bool {
        !matches!(self, IncludeMode::File)
    }

    /// The tag as written.
    pub fn tag(self) -> &'static str {
        match self {
            IncludeMode::File => "!include",
            IncludeMode::DirList => "!include_dir_list",
            IncludeMode::DirNamed => "!include_dir_named",
            IncludeMode::DirMergeList => "!include_dir_merge_list",
            IncludeMode::DirMergeNamed => "!include_dir_merge_named",
        }
    }
}

impl TagKind {
    /// Map a `!name` tag (without the `!`) to an extension kind.
    pub fn from_tag(name: &str) -> Option<Self> {
        Some(match name {
            "include" => TagKind::Include(IncludeMode::File),
            "include_dir_list" => TagKind::Include(IncludeMode::DirList),
            "include_dir_named" => TagKind::Include(IncludeMode::DirNamed),
            "include_dir_merge_list" => TagKind::Include(IncludeMode::DirMergeList),
            "include_dir_merge_named" => TagKind::Include(IncludeMode::DirMergeNamed),
            "secret" => TagKind::Secret,
            "input" => TagKind::Input,
            "env_var" => TagKind::EnvVar,
            _ => return None,
        })
    }

    /// Whether the real value is unknown until the controller substitutes it.
    pub fn is_opaque(self) -> bool {
        matches!(self, TagKind::Secret | TagKind::Input | TagKind::EnvVar)
    }
}

impl Node {
    pub(crate) fn new(kind: NodeKind, line: usize) -> Self {
        Self { kind, line }
    }

    /// Value for `key` when this node is a mapping.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match &self.kind {
            NodeKind::Mapping(entries) => entries.iter().find(|e| e.key == key).map(|e| &e.value),
            _ => None,
        }
    }

    /// Scalar text, if this node is a scalar.
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Scalar(s) => Some(&s.value),
            _ => None,
        }
    }

    /// Mapping entries, if this node is a mapping.
    pub fn as_mapping(&self) -> Option<&[MapEntry]> {
        match &self.kind {
            NodeKind::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    /// Sequence items, if this node is a sequence.
    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Tag reference, if this node is a tag extension.
    pub fn as_tag(&self) -> Option<&TagRef> {
        match &self.kind {
            NodeKind::Tagged(tag) => Some(tag),
            _ => None,
        }
    }

    /// Visit this node and every descendant in document order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        match &self.kind {
            NodeKind::Sequence(items) => items.iter().for_each(|n| n.walk(f)),
            NodeKind::Mapping(entries) => entries.iter().for_each(|e| e.value.walk(f)),
            _ => {}
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Why a file could not be loaded.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    /// Not valid tagged YAML.
    InvalidSyntax,
    /// An include tag names a path that does not exist.
    MissingInclude,
    /// The bytes are not valid UTF-8.
    EncodingError,
    /// Includes lead back to a file already being included.
    IncludeCycle,
    /// A file in scope could not be read.
    UnreadableFile,
}

impl ParseErrorKind {
    /// Stable diagnostic code for this kind.
    pub fn code(self) -> &'static str {
        use hacheck_diagnostics::codes;
        match self {
            ParseErrorKind::InvalidSyntax => codes::INVALID_SYNTAX,
            ParseErrorKind::MissingInclude => codes::MISSING_INCLUDE,
            ParseErrorKind::EncodingError => codes::ENCODING_ERROR,
            ParseErrorKind::IncludeCycle => codes::INCLUDE_CYCLE,
            ParseErrorKind::UnreadableFile => codes::UNREADABLE_FILE,
        }
    }

    /// Snake-case name (`invalid_syntax`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            ParseErrorKind::InvalidSyntax => "invalid_syntax",
            ParseErrorKind::MissingInclude => "missing_include",
            ParseErrorKind::EncodingError => "encoding_error",
            ParseErrorKind::IncludeCycle => "include_cycle",
            ParseErrorKind::UnreadableFile => "unreadable_file",
        }
    }
}

/// A file-level load failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}:{}: {message}", line.map_or_else(|| "-".to_string(), |l| l.to_string()))]
pub struct ParseError {
    /// Failure category.
    pub kind: ParseErrorKind,
    /// Display path of the file the failure is reported against.
    pub file: String,
    /// 1-indexed line, when known.
    pub line: Option<usize>,
    /// Human-readable description.
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(
        kind: ParseErrorKind,
        file: impl Into<String>,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}
