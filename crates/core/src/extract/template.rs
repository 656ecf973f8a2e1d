//! Resource references inside template expressions.
//!
//! A bounded heuristic, not a template interpreter: a fixed library of
//! patterns for the idioms that name a resource by a literal identifier.
//! Identifiers computed at render time (concatenation, filters, loop
//! variables) match no pattern and are skipped without comment.

use std::sync::LazyLock;

use regex::Regex;

/// One reference found inside a template region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
    /// Referenced entity identifier.
    pub identifier: String,
    /// The identifier as written in the template.
    pub raw: String,
    /// Byte offset of the match within the scanned text.
    pub offset: usize,
    /// Name of the pattern that matched.
    pub pattern: &'static str,
}

struct Pattern {
    name: &'static str,
    regex: Regex,
}

/// Literal entity identifier: `domain.object_id`.
const ID: &str = r"[a-z_][a-z0-9_]*\.[a-z0-9_]+";

/// `{{ expression }}` and `{% statement %}` regions.
static REGIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}").expect("valid region regex"));

static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    // `func('id'` followed by the given delimiter, so that `'light.' ~ x`
    // never matches.
    let call = |name: &'static str, tail: &str| Pattern {
        name,
        regex: Regex::new(&format!(r#"\b{name}\(\s*['"]({ID})['"]\s*{tail}"#))
            .expect("valid template pattern"),
    };
    vec![
        call("states", r"[,)]"),
        call("is_state", ","),
        call("state_attr", ","),
        call("is_state_attr", ","),
        call("has_value", r"\)"),
        call("expand", r"[,)]"),
        Pattern {
            name: "states_accessor",
            regex: Regex::new(r"\bstates\.([a-z_][a-z0-9_]*)\.([a-z0-9_]+)")
                .expect("valid template pattern"),
        },
    ]
});

/// Names of the patterns in the library, in match-priority order.
pub fn pattern_names() -> Vec<&'static str> {
    PATTERNS.iter().map(|p| p.name).collect()
}

/// Find every literal entity reference inside the template regions of
/// `text`, ordered by offset. Text without template markers yields nothing.
pub fn scan_templates(text: &str) -> Vec<TemplateMatch> {
    if !text.contains("{{") && !text.contains("{%") {
        return Vec::new();
    }
    let mut out = Vec::new();
    for region in REGIONS.find_iter(text) {
        for pattern in PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(region.as_str()) {
                let Some(whole) = caps.get(0) else { continue };
                let (identifier, raw) = match (caps.get(1), caps.get(2)) {
                    (Some(domain), Some(object)) => (
                        format!("{}.{}", domain.as_str(), object.as_str()),
                        whole.as_str().to_string(),
                    ),
                    (Some(id), None) => (id.as_str().to_string(), id.as_str().to_string()),
                    _ => continue,
                };
                out.push(TemplateMatch {
                    identifier,
                    raw,
                    offset: region.start() + whole.start(),
                    pattern: pattern.name,
                });
            }
        }
    }
    out.sort_by_key(|m| m.offset);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(text: &str) -> Vec<String> {
        scan_templates(text).into_iter().map(|m| m.identifier).collect()
    }

    #[test]
    fn states_call() {
        let found = scan_templates("{{ states('light.kitchen') }}");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifier, "light.kitchen");
        assert_eq!(found[0].pattern, "states");
        assert_eq!(found[0].offset, 3);
    }

    #[test]
    fn dynamic_identifiers_are_skipped() {
        assert!(ids("{{ 'light.' + area }}").is_empty());
        assert!(ids("{{ states('light.' ~ room) }}").is_empty());
        assert!(ids("{% for s in states.sensor %}{{ s.state }}{% endfor %}").is_empty());
    }

    #[test]
    fn every_idiom() {
        let text = r#"{{ is_state("switch.fan", "on") and state_attr('climate.hall', 'temp') }}
{% if is_state_attr('media_player.tv', 'source', 'HDMI') and has_value('sensor.power') %}
{{ expand('group.lights') | list }} {{ states.sensor.outdoor_temp.state }}{% endif %}"#;
        assert_eq!(
            ids(text),
            [
                "switch.fan",
                "climate.hall",
                "media_player.tv",
                "sensor.power",
                "group.lights",
                "sensor.outdoor_temp"
            ]
        );
    }

    #[test]
    fn text_outside_regions_is_ignored() {
        assert!(ids("states('light.kitchen') without braces").is_empty());
        assert_eq!(ids("prefix {{ states('a.b') }} states('c.d')"), ["a.b"]);
    }

    #[test]
    fn library_names() {
        assert_eq!(pattern_names().len(), 7);
        assert!(pattern_names().contains(&"states_accessor"));
    }
}
