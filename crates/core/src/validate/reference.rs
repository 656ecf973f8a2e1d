//! Stage 2: resolve extracted references against the registry.

use std::collections::BTreeMap;

use hacheck_diagnostics::{Diagnostic, Stage, codes};
use hacheck_registry::{RegistryIndex, ResourceKind, entity_domain};

use super::declarations::LocalDeclarations;
use super::suggest::suggest;
use crate::extract::ReferenceSite;

/// Resolve every site; one diagnostic per unresolved or disabled reference.
///
/// The registry decides first: an entity disabled there is reported even
/// when the configuration also declares it.
pub fn check_references(
    sites: &[ReferenceSite],
    registry: &RegistryIndex,
    locals: &LocalDeclarations,
) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for site in sites {
        let declared = site.kind == ResourceKind::Entity && locals.contains(&site.identifier);
        match registry.resolve(&site.identifier) {
            Some(record) if record.kind == site.kind => {
                if !record.enabled {
                    out.push(
                        Diagnostic::warning(
                            codes::DISABLED_IDENTIFIER,
                            Stage::Reference,
                            format!("{} `{}` is disabled", site.kind, site.identifier),
                        )
                        .at(&site.file, Some(site.line))
                        .with_context(ctx!(
                            "identifier" => site.identifier.as_str(),
                            "context" => site.context.as_str(),
                        )),
                    );
                }
            }
            _ if declared => {}
            found => out.push(unresolved(site, found.map(|r| r.kind), registry, locals)),
        }
    }
    out
}

fn unresolved(
    site: &ReferenceSite,
    other_kind: Option<ResourceKind>,
    registry: &RegistryIndex,
    locals: &LocalDeclarations,
) -> Diagnostic {
    let suggestions = match site.kind {
        ResourceKind::Entity => {
            let domain = entity_domain(&site.identifier);
            suggest(
                &site.identifier,
                registry
                    .in_domain(domain)
                    .map(|r| r.id.as_str())
                    .chain(locals.in_domain(domain)),
            )
        }
        kind => suggest(
            &site.identifier,
            registry.in_domain(kind.as_str()).map(|r| r.id.as_str()),
        ),
    };

    let mut message = match other_kind {
        Some(actual) => format!(
            "`{}` is a{} {actual}, not a{} {}",
            site.identifier,
            article(actual),
            article(site.kind),
            site.kind
        ),
        None => format!("{} `{}` not found in registry", site.kind, site.identifier),
    };
    if !suggestions.is_empty() {
        let quoted: Vec<String> = suggestions.iter().map(|s| format!("`{s}`")).collect();
        message.push_str(&format!(" (did you mean {}?)", quoted.join(", ")));
    }

    Diagnostic::error(codes::UNRESOLVED_IDENTIFIER, Stage::Reference, message)
        .at(&site.file, Some(site.line))
        .with_suggestions(suggestions)
        .with_context(ctx!(
            "identifier" => site.identifier.as_str(),
            "context" => site.context.as_str(),
        ))
}

fn article(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Entity | ResourceKind::Area => "n",
        ResourceKind::Device => "",
    }
}
