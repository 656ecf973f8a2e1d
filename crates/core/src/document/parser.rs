//! Tagged YAML to [`Node`] trees, built from `yaml-rust2` parser events.
//!
//! The event stream carries a marker per node, which is what keeps every
//! node on its source line. Controller tag extensions (`!include`,
//! `!secret`, ...) arrive as local tags on scalar events and become
//! [`NodeKind::Tagged`] nodes; any other local tag is a syntax error.

use std::path::Path;

use hacheck_diagnostics::LineIndex;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use super::{
    ConfigDocument, MapEntry, Node, NodeKind, ParseError, ParseErrorKind, Scalar, ScalarStyle,
    TagKind, TagRef,
};

/// Parse one file's bytes into a [`ConfigDocument`].
///
/// `display` is the path used in the returned error, if any. Include tags
/// are recorded, never followed.
pub fn parse_bytes(path: &Path, display: &str, bytes: &[u8]) -> Result<ConfigDocument, ParseError> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let line = LineIndex::from_bytes(bytes).line_number(e.valid_up_to());
            return Err(ParseError::new(
                ParseErrorKind::EncodingError,
                display,
                Some(line),
                format!("invalid UTF-8 byte sequence at offset {}", e.valid_up_to()),
            ));
        }
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let nodes = parse_stream(text).map_err(|e| {
        ParseError::new(ParseErrorKind::InvalidSyntax, display, Some(e.line), e.message)
    })?;
    Ok(ConfigDocument {
        path: path.to_path_buf(),
        display: display.to_string(),
        nodes,
        origin: None,
    })
}

#[derive(Debug)]
struct SyntaxError {
    /// 1-indexed.
    line: usize,
    message: String,
}

/// Every document in `text`, in order.
fn parse_stream(text: &str) -> Result<Vec<Node>, SyntaxError> {
    let mut builder = TreeBuilder::new(text);
    let loaded = Parser::new_from_str(text).load(&mut builder, true);
    if let Err(e) = loaded {
        // An unclosed bracket is only noticed where the input runs out;
        // the bracket that was never closed is the useful location.
        let line = builder.open_flow_line().unwrap_or_else(|| e.marker().line());
        return Err(SyntaxError {
            line,
            message: e.info().to_string(),
        });
    }
    match builder.error {
        Some(e) => Err(e),
        None => Ok(builder.docs),
    }
}

enum Frame {
    Sequence {
        items: Vec<Node>,
        line: usize,
        flow: bool,
    },
    Mapping {
        entries: Vec<MapEntry>,
        key: Option<(String, usize)>,
        line: usize,
        flow: bool,
    },
}

/// Assembles nodes from parser events. The first error sticks; later
/// events are ignored.
struct TreeBuilder<'a> {
    lines: Vec<&'a str>,
    stack: Vec<Frame>,
    docs: Vec<Node>,
    error: Option<SyntaxError>,
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.apply(ev, mark) {
            self.error = Some(e);
        }
    }
}

impl<'a> TreeBuilder<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            stack: Vec::new(),
            docs: Vec::new(),
            error: None,
        }
    }

    fn apply(&mut self, ev: Event, mark: Marker) -> Result<(), SyntaxError> {
        let line = mark.line();
        match ev {
            Event::Scalar(value, style, _, tag) => {
                if let Some(Frame::Mapping { key: key @ None, .. }) = self.stack.last_mut() {
                    *key = Some((value, line));
                    return Ok(());
                }
                let node = scalar_node(value, style, tag, line)?;
                self.push(node)
            }
            Event::SequenceStart(_, tag) => {
                reject_collection_tag(tag.as_ref(), line)?;
                self.stack.push(Frame::Sequence {
                    items: Vec::new(),
                    line,
                    flow: self.opens_flow(&mark),
                });
                Ok(())
            }
            Event::MappingStart(_, tag) => {
                reject_collection_tag(tag.as_ref(), line)?;
                self.stack.push(Frame::Mapping {
                    entries: Vec::new(),
                    key: None,
                    line,
                    flow: self.opens_flow(&mark),
                });
                Ok(())
            }
            Event::SequenceEnd | Event::MappingEnd => match self.stack.pop() {
                Some(Frame::Sequence { items, line, .. }) => {
                    self.push(Node::new(NodeKind::Sequence(items), line))
                }
                Some(Frame::Mapping { entries, line, .. }) => {
                    self.push(Node::new(NodeKind::Mapping(entries), line))
                }
                None => Err(SyntaxError {
                    line,
                    message: "unbalanced end of collection".to_string(),
                }),
            },
            Event::Alias(id) => {
                let name = self.alias_name(&mark).unwrap_or_else(|| id.to_string());
                self.push(Node::new(NodeKind::Alias(name), line))
            }
            _ => Ok(()),
        }
    }

    /// Attach a finished node to its parent, or close a document.
    fn push(&mut self, node: Node) -> Result<(), SyntaxError> {
        match self.stack.last_mut() {
            None => self.docs.push(node),
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping { entries, key, .. }) => match key.take() {
                Some((key, key_line)) => entries.push(MapEntry {
                    key,
                    key_line,
                    value: node,
                }),
                None => {
                    return Err(SyntaxError {
                        line: node.line,
                        message: "mapping keys must be scalars (quote templates that start with `{{`)"
                            .to_string(),
                    });
                }
            },
        }
        Ok(())
    }

    /// Whether the collection starting at `mark` is written with brackets.
    fn opens_flow(&self, mark: &Marker) -> bool {
        self.char_at(mark).is_some_and(|c| c == '[' || c == '{')
    }

    /// Line of the innermost bracketed collection still open.
    fn open_flow_line(&self) -> Option<usize> {
        self.stack.iter().rev().find_map(|frame| match frame {
            Frame::Sequence { flow: true, line, .. } | Frame::Mapping { flow: true, line, .. } => {
                Some(*line)
            }
            _ => None,
        })
    }

    fn alias_name(&self, mark: &Marker) -> Option<String> {
        let rest = self.lines.get(mark.line().checked_sub(1)?)?;
        let name: String = rest
            .chars()
            .skip(mark.col())
            .skip_while(|c| *c == '*')
            .take_while(|c| !c.is_whitespace() && !matches!(c, ',' | '[' | ']' | '{' | '}'))
            .collect();
        (!name.is_empty()).then_some(name)
    }

    fn char_at(&self, mark: &Marker) -> Option<char> {
        let line = self.lines.get(mark.line().checked_sub(1)?)?;
        line.chars().nth(mark.col())
    }
}

fn scalar_node(
    value: String,
    style: TScalarStyle,
    tag: Option<Tag>,
    line: usize,
) -> Result<Node, SyntaxError> {
    if let Some(kind) = local_tag(tag.as_ref(), line)? {
        return Ok(Node::new(
            NodeKind::Tagged(TagRef {
                kind,
                argument: value,
            }),
            line,
        ));
    }
    let style = match style {
        TScalarStyle::SingleQuoted => ScalarStyle::SingleQuoted,
        TScalarStyle::DoubleQuoted => ScalarStyle::DoubleQuoted,
        TScalarStyle::Literal => ScalarStyle::Literal,
        TScalarStyle::Folded => ScalarStyle::Folded,
        _ => ScalarStyle::Plain,
    };
    // Block scalar content starts on the line after its indicator.
    let line = match style {
        ScalarStyle::Literal | ScalarStyle::Folded => line + 1,
        _ => line,
    };
    if style == ScalarStyle::Plain && is_null(&value) {
        return Ok(Node::new(NodeKind::Null, line));
    }
    Ok(Node::new(NodeKind::Scalar(Scalar { value, style }), line))
}

/// The extension named by a `!name` tag. Standard `!!` tags carry no
/// meaning here and are ignored.
fn local_tag(tag: Option<&Tag>, line: usize) -> Result<Option<TagKind>, SyntaxError> {
    let Some(tag) = tag.filter(|t| t.handle == "!") else {
        return Ok(None);
    };
    TagKind::from_tag(&tag.suffix).map(Some).ok_or_else(|| SyntaxError {
        line,
        message: format!("unknown tag `!{}`", tag.suffix),
    })
}

fn reject_collection_tag(tag: Option<&Tag>, line: usize) -> Result<(), SyntaxError> {
    match local_tag(tag, line)? {
        Some(_) => Err(SyntaxError {
            line,
            message: format!(
                "`!{}` takes a scalar argument, not a collection",
                tag.map_or("", |t| t.suffix.as_str())
            ),
        }),
        None => Ok(()),
    }
}

fn is_null(value: &str) -> bool {
    matches!(value, "" | "~" | "null" | "Null" | "NULL")
}
