//! Source-control derived version strings.
//!
//! Shared between `build.rs`, which writes the generated version module, and
//! the library, so the derivation rules are unit tested like any other code.

/// Version written when no source-control metadata is available.
pub const FALLBACK_VERSION: &str = "0.0.0";

/// Template of the generated module. `{version}` is substituted verbatim.
pub const VERSION_MODULE_TEMPLATE: &str = "pub const VERSION: &str = {version};\n";

/// Parse `git describe --tags --long --dirty` output into a version string.
///
/// - `v1.2.3-0-gabc1234` gives `1.2.3`
/// - `v1.2.3-4-gabc1234` gives `1.2.4.dev4+gabc1234`
/// - `v1.2.3-0-gabc1234-dirty` gives `1.2.4.dev0+gabc1234.d<date>`
///
/// Returns `None` when the text does not look like describe output or the tag
/// carries no version number.
pub fn version_from_describe(describe: &str, date: &str) -> Option<String> {
    let mut rest = describe.trim();
    let dirty = match rest.strip_suffix("-dirty") {
        Some(r) => {
            rest = r;
            true
        }
        None => false,
    };

    let (rest, hash) = rest.rsplit_once('-')?;
    let hash = hash.strip_prefix('g')?;
    if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let (tag, distance) = rest.rsplit_once('-')?;
    let distance: u32 = distance.parse().ok()?;

    let tag = tag.strip_prefix('v').unwrap_or(tag);
    if !tag.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    if distance == 0 && !dirty {
        return Some(tag.to_string());
    }

    let mut version = format!("{}.dev{}+g{}", bump_last_number(tag)?, distance, hash);
    if dirty {
        version.push_str(".d");
        version.push_str(date);
    }
    Some(version)
}

/// The describe-derived version, or [`FALLBACK_VERSION`].
pub fn resolve_version(describe: Option<&str>, date: &str) -> String {
    describe
        .and_then(|d| version_from_describe(d, date))
        .unwrap_or_else(|| FALLBACK_VERSION.to_string())
}

/// Render the generated version module for `version`, escaped as a Rust string literal.
pub fn render_version_module(version: &str) -> String {
    VERSION_MODULE_TEMPLATE.replace("{version}", &format!("{version:?}"))
}

// Increment the trailing run of digits: "1.2.3" -> "1.2.4", "2.0rc1" -> "2.0rc2".
fn bump_last_number(tag: &str) -> Option<String> {
    let split = tag
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    let (head, digits) = tag.split_at(split);
    let n: u64 = digits.parse().ok()?;
    Some(format!("{head}{}", n + 1))
}
