//! Include-closure discovery over a configuration directory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::parser::parse_bytes;
use super::{
    ConfigDocument, IncludeMode, IncludeOrigin, Node, NodeKind, ParseError, ParseErrorKind,
    TagKind, TagRef,
};

/// Every document reachable from an entry file, plus every load failure.
#[derive(Debug, Default)]
pub struct DocumentSet {
    /// Successfully parsed documents, sorted by display path.
    pub documents: Vec<ConfigDocument>,
    /// Load failures, sorted by file then line.
    pub failures: Vec<ParseError>,
}

impl DocumentSet {
    /// Look a document up by its display path.
    pub fn get(&self, display: &str) -> Option<&ConfigDocument> {
        self.documents.iter().find(|d| d.display == display)
    }
}

/// Reads and parses configuration files below a root directory.
#[derive(Debug, Clone)]
pub struct Loader {
    root: PathBuf,
}

/// An include tag found in a document, or recovered from the text of one
/// that failed to parse.
struct IncludeSite {
    key: Option<String>,
    mode: IncludeMode,
    argument: String,
    line: usize,
}

struct Edge {
    to: PathBuf,
    line: usize,
}

impl Loader {
    /// A loader for the configuration tree rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: normalize(root.as_ref()),
        }
    }

    /// The configuration directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` relative to the root with `/` separators, or in full when it
    /// lies outside the root.
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.display().to_string(),
        }
    }

    /// Read and parse a single file without following its includes.
    pub fn load_file(&self, path: &Path) -> Result<ConfigDocument, ParseError> {
        let shown = self.display(path);
        let bytes = std::fs::read(path).map_err(|e| {
            ParseError::new(
                ParseErrorKind::UnreadableFile,
                &shown,
                None,
                format!("cannot read file: {e}"),
            )
        })?;
        debug!(file = %shown, bytes = bytes.len(), "parsing");
        parse_bytes(path, &shown, &bytes)
    }

    /// Load `entry` and every file reachable from it through include tags.
    ///
    /// Files are discovered breadth-first; each frontier is parsed in
    /// parallel. Failures never stop discovery of the remaining files: the
    /// include tags of a file that does not parse are recovered line by line.
    pub fn load_closure(&self, entry: &Path) -> DocumentSet {
        let entry = normalize(entry);
        let mut set = DocumentSet::default();
        let mut seen: HashSet<PathBuf> = HashSet::from([entry.clone()]);
        let mut origins: HashMap<PathBuf, IncludeOrigin> = HashMap::new();
        let mut edges: HashMap<PathBuf, Vec<Edge>> = HashMap::new();
        let mut frontier = vec![entry.clone()];

        while !frontier.is_empty() {
            frontier.sort();
            let parsed: Vec<_> = frontier
                .par_iter()
                .map(|p| (p, self.load_file(p)))
                .collect();
            let mut next = Vec::new();
            for (path, result) in parsed {
                let (doc, sites) = match result {
                    Ok(doc) => {
                        let mut sites = Vec::new();
                        for node in &doc.nodes {
                            collect_includes(node, None, &mut sites);
                        }
                        (Some(doc), sites)
                    }
                    Err(e) => {
                        let sites = recover_includes(path, &e);
                        set.failures.push(e);
                        (None, sites)
                    }
                };
                let origin = origins.remove(path);
                let shown = self.display(path);
                for site in sites {
                    let targets = match self.resolve(path, &shown, &site) {
                        Ok(targets) => targets,
                        Err(e) => {
                            set.failures.push(e);
                            continue;
                        }
                    };
                    debug!(
                        file = %shown,
                        line = site.line,
                        tag = site.mode.tag(),
                        targets = targets.len(),
                        "resolved include"
                    );
                    for target in targets {
                        if seen.insert(target.clone()) {
                            origins.insert(
                                target.clone(),
                                IncludeOrigin {
                                    key: site.key.clone(),
                                    mode: site.mode,
                                },
                            );
                            next.push(target.clone());
                        }
                        edges.entry(path.clone()).or_default().push(Edge {
                            to: target,
                            line: site.line,
                        });
                    }
                }
                if let Some(mut doc) = doc {
                    doc.origin = origin;
                    set.documents.push(doc);
                }
            }
            frontier = next;
        }

        CycleSearch {
            loader: self,
            edges: &edges,
            active: Vec::new(),
            done: HashSet::new(),
            found: &mut set.failures,
        }
        .visit(&entry);

        set.documents.sort_by(|a, b| a.display.cmp(&b.display));
        set.failures
            .sort_by(|a, b| (&a.file, a.line, &a.message).cmp(&(&b.file, b.line, &b.message)));
        info!(
            documents = set.documents.len(),
            failures = set.failures.len(),
            "loaded configuration tree"
        );
        set
    }

    fn resolve(&self, path: &Path, shown: &str, site: &IncludeSite) -> Result<Vec<PathBuf>, ParseError> {
        let base = path.parent().unwrap_or(&self.root);
        let argument = site.argument.trim();
        let target = base.join(argument);
        let missing = |what: &str| {
            ParseError::new(
                ParseErrorKind::MissingInclude,
                shown,
                Some(site.line),
                format!("{} target {what} `{argument}` does not exist", site.mode.tag()),
            )
        };

        if !site.mode.is_dir() {
            if !target.is_file() {
                return Err(missing("file"));
            }
            return Ok(vec![normalize(&target)]);
        }
        if !target.is_dir() {
            return Err(missing("directory"));
        }
        Ok(WalkDir::new(&target)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| match e {
                Ok(e) => Some(e),
                Err(err) => {
                    debug!(error = %err, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && is_yaml(e.path()))
            .map(|e| normalize(e.path()))
            .collect())
    }
}

fn collect_includes(node: &Node, key: Option<&str>, out: &mut Vec<IncludeSite>) {
    match &node.kind {
        NodeKind::Tagged(TagRef {
            kind: TagKind::Include(mode),
            argument,
        }) => out.push(IncludeSite {
            key: key.map(str::to_string),
            mode: *mode,
            argument: argument.clone(),
            line: node.line,
        }),
        NodeKind::Mapping(entries) => {
            for e in entries {
                collect_includes(&e.value, Some(&e.key), out);
            }
        }
        NodeKind::Sequence(items) => {
            for item in items {
                collect_includes(item, None, out);
            }
        }
        _ => {}
    }
}

static INCLUDE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:-\s+)?(?:([^\s#'"\[\]{}:][^#:]*?)\s*:\s+)?!(include(?:_dir_(?:list|named|merge_list|merge_named))?)\s+("[^"]*"|'[^']*'|[^\s#,\]}]+)"#,
    )
    .expect("valid include line regex")
});

/// Include tags of a file that failed to parse, found one line at a time.
///
/// Only tags that open a line (optionally after a key or sequence dash) are
/// recovered; unreadable files yield nothing.
fn recover_includes(path: &Path, failure: &ParseError) -> Vec<IncludeSite> {
    if failure.kind == ParseErrorKind::UnreadableFile {
        return Vec::new();
    }
    let Ok(bytes) = std::fs::read(path) else {
        return Vec::new();
    };
    let sites = scan_include_lines(&String::from_utf8_lossy(&bytes));
    if !sites.is_empty() {
        warn!(
            file = %failure.file,
            includes = sites.len(),
            "recovered include tags from a file that does not parse"
        );
    }
    sites
}

fn scan_include_lines(text: &str) -> Vec<IncludeSite> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let caps = INCLUDE_LINE.captures(line)?;
            let mode = match TagKind::from_tag(&caps[2])? {
                TagKind::Include(mode) => mode,
                _ => return None,
            };
            let argument = caps[3].trim_matches(['"', '\'']).to_string();
            Some(IncludeSite {
                key: caps.get(1).map(|k| k.as_str().trim().to_string()),
                mode,
                argument,
                line: i + 1,
            })
        })
        .collect()
}

/// Depth-first search over include edges; one failure per back edge,
/// reported at the include that closes the cycle.
struct CycleSearch<'a> {
    loader: &'a Loader,
    edges: &'a HashMap<PathBuf, Vec<Edge>>,
    active: Vec<&'a Path>,
    done: HashSet<&'a Path>,
    found: &'a mut Vec<ParseError>,
}

impl<'a> CycleSearch<'a> {
    fn visit(&mut self, node: &'a Path) {
        let edges = self.edges;
        self.active.push(node);
        for edge in edges.get(node).into_iter().flatten() {
            let to = edge.to.as_path();
            if let Some(at) = self.active.iter().position(|p| *p == to) {
                let chain: Vec<String> = self.active[at..]
                    .iter()
                    .chain(std::iter::once(&to))
                    .map(|p| self.loader.display(p))
                    .collect();
                self.found.push(ParseError::new(
                    ParseErrorKind::IncludeCycle,
                    self.loader.display(node),
                    Some(edge.line),
                    format!("include cycle: {}", chain.join(" -> ")),
                ));
            } else if !self.done.contains(to) {
                self.visit(to);
            }
        }
        self.active.pop();
        self.done.insert(node);
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned(text: &str) -> Vec<(Option<String>, IncludeMode, String, usize)> {
        scan_include_lines(text)
            .into_iter()
            .map(|s| (s.key, s.mode, s.argument, s.line))
            .collect()
    }

    #[test]
    fn include_lines_are_found_without_a_parse() {
        let text = "\
automation: !include automations.yaml
script: !include_dir_merge_named \"scripts\"
  - extra: !include 'more.yaml'  # note
- !include_dir_list lists
broken: [
name: !secret name
# ignored: !include commented.yaml
";
        assert_eq!(
            scanned(text),
            [
                (Some("automation".into()), IncludeMode::File, "automations.yaml".into(), 1),
                (Some("script".into()), IncludeMode::DirMergeNamed, "scripts".into(), 2),
                (Some("extra".into()), IncludeMode::File, "more.yaml".into(), 3),
                (None, IncludeMode::DirList, "lists".into(), 4),
            ]
        );
    }
}
