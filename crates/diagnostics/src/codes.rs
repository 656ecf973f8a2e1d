//! Diagnostic ID constants.
//!
//! Use these instead of string literals to get compile-time typo detection
//! and IDE autocomplete. The thousands digit names the stage that emits the
//! code: `1xxx` syntax, `2xxx` reference resolution, `3xxx` controller
//! semantics.

// ── Stage 1: syntax ─────────────────────────────────────────────────────

/// The document is not valid tagged YAML.
pub const INVALID_SYNTAX: &str = "HAC1001";
/// An `!include` family tag names a file or directory that does not exist.
pub const MISSING_INCLUDE: &str = "HAC1002";
/// The file could not be decoded as UTF-8 text.
pub const ENCODING_ERROR: &str = "HAC1003";
/// A chain of includes leads back to a file that is already being included.
pub const INCLUDE_CYCLE: &str = "HAC1004";
/// A file in scope could not be read from disk.
pub const UNREADABLE_FILE: &str = "HAC1005";

// ── Stage 2: reference resolution ───────────────────────────────────────

/// A referenced identifier is not declared in the registry or the config.
pub const UNRESOLVED_IDENTIFIER: &str = "HAC2001";
/// A referenced identifier exists but is disabled.
pub const DISABLED_IDENTIFIER: &str = "HAC2002";
/// An automation has no trigger section or no action section.
pub const MISSING_AUTOMATION_PART: &str = "HAC2003";
/// An automation has neither an `id` nor an `alias`.
pub const UNNAMED_AUTOMATION: &str = "HAC2004";
/// An action step names a service that is not of the form `domain.service`.
pub const MALFORMED_SERVICE: &str = "HAC2005";

// ── Stage 3: controller semantics ───────────────────────────────────────

/// A finding reported by the external controller-semantic checker.
pub const SEMANTIC_FINDING: &str = "HAC3001";
/// A device-trigger finding downgraded because the registry knows the device.
pub const DEVICE_TRIGGER_UNCONFIRMED: &str = "HAC3002";
/// The controller-semantic checker did not finish within its time budget.
pub const SEMANTIC_TIMEOUT: &str = "HAC3003";
/// The controller-semantic checker could not be started.
pub const SEMANTIC_UNAVAILABLE: &str = "HAC3004";

/// Every code known to this crate, in numeric order.
pub const ALL: &[&str] = &[
    INVALID_SYNTAX,
    MISSING_INCLUDE,
    ENCODING_ERROR,
    INCLUDE_CYCLE,
    UNREADABLE_FILE,
    UNRESOLVED_IDENTIFIER,
    DISABLED_IDENTIFIER,
    MISSING_AUTOMATION_PART,
    UNNAMED_AUTOMATION,
    MALFORMED_SERVICE,
    SEMANTIC_FINDING,
    DEVICE_TRIGGER_UNCONFIRMED,
    SEMANTIC_TIMEOUT,
    SEMANTIC_UNAVAILABLE,
];

pub(crate) fn explain(id: &str) -> Option<&'static str> {
    match id {
        INVALID_SYNTAX => Some(
            "The file is not valid YAML. Check indentation (spaces only, no tabs), \
             unbalanced quotes or brackets, and `key: value` pairs where the value \
             itself contains `: ` without quoting.",
        ),
        MISSING_INCLUDE => Some(
            "An `!include` (or `!include_dir_*`) tag points at a path that does not \
             exist. Paths are resolved relative to the file containing the tag. \
             Fix the path or restore the missing file.",
        ),
        ENCODING_ERROR => Some(
            "The file contains bytes that are not valid UTF-8. Re-save it as UTF-8 \
             text; binary files do not belong in the configuration tree.",
        ),
        INCLUDE_CYCLE => Some(
            "Following `!include` tags leads back to a file that is already being \
             included, which the controller would expand forever. Break the cycle.",
        ),
        UNREADABLE_FILE => Some(
            "A file in the validation scope could not be read (missing file, \
             permissions, or an I/O failure).",
        ),
        UNRESOLVED_IDENTIFIER => Some(
            "An entity, device, or area identifier referenced by the configuration \
             is not present in the registry snapshot and is not declared by the \
             configuration itself. This is usually a typo or a renamed entity; \
             the suggestions list similarly named identifiers from the same domain.",
        ),
        DISABLED_IDENTIFIER => Some(
            "The referenced identifier exists but is disabled in the registry. \
             The configuration is still deployable; the reference will be inert \
             until the resource is re-enabled.",
        ),
        MISSING_AUTOMATION_PART => Some(
            "Every automation needs a trigger section (`triggers:` or the older \
             `trigger:`) and an action section (`actions:` or `action:`). The \
             controller refuses to load an automation without both.",
        ),
        UNNAMED_AUTOMATION => Some(
            "The automation has neither an `id` nor an `alias`. It still loads, \
             but it cannot be edited from the UI and is hard to find in logs and \
             traces. Add a unique `id` and a descriptive `alias`.",
        ),
        MALFORMED_SERVICE => Some(
            "An action step calls a service that is not written as \
             `domain.service` (for example `light.turn_on`). Templated service \
             names are not checked.",
        ),
        SEMANTIC_FINDING => Some(
            "A finding reported by the controller's own configuration checker \
             (service or platform existence, required keys, structural rules).",
        ),
        DEVICE_TRIGGER_UNCONFIRMED => Some(
            "The controller checker rejected a device trigger, but the device is \
             present in the registry snapshot. This happens when validating \
             locally without the physical device connected, so the finding is \
             reported as a warning instead of an error.",
        ),
        SEMANTIC_TIMEOUT => Some(
            "The controller checker did not finish within the configured timeout. \
             A check that cannot complete cannot certify the configuration, so \
             this blocks deployment. Raise `semantic.timeout_secs` if the checker \
             is merely slow.",
        ),
        SEMANTIC_UNAVAILABLE => Some(
            "The controller checker command could not be started. Verify \
             `semantic.command` in the configuration and that the tool is installed.",
        ),
        _ => None,
    }
}
