//! Name normalization for exact blocking.
//!
//! `normalize_name` is a total function: any input maps to a canonical
//! string, and empty or all-punctuation input maps to the empty string,
//! which downstream components treat as "do not canonicalize".
//!
//! Canonical ids are derived from normalized names, so any change to these
//! rules silently re-keys previously resolved entities. Bumping
//! [`RULESET_VERSION`] marks such a change as a migration, not a patch.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Version of the normalization ruleset. Bump on any behavior change.
pub const RULESET_VERSION: u32 = 1;

static PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").expect("punctuation pattern"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

const HONORIFICS: [&str; 5] = ["mr", "mrs", "ms", "dr", "prof"];
const LEGAL_SUFFIXES: [&str; 5] = ["inc", "ltd", "corp", "llc", "co"];

/// Which type-specific post-pass applies. Derived from the free-form type
/// string; the normalized key always embeds the raw type string, so two
/// unknown types never collide even though both classify as `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameClass {
    Person,
    Organization,
    Location,
    Generic,
}

impl NameClass {
    #[must_use]
    pub fn from_type(entity_type: &str) -> Self {
        match entity_type.trim().to_lowercase().as_str() {
            "person" | "people" | "author" => Self::Person,
            "org" | "organization" | "company" | "institution" => Self::Organization,
            "location" | "place" | "city" => Self::Location,
            _ => Self::Generic,
        }
    }
}

/// Maps a raw name to its canonical form for exact matching.
///
/// Step order is fixed: compatibility decomposition with diacritic folding,
/// lowercase, trim, then type-aware rewrites that need punctuation still
/// present (comma reorder, `&` expansion), then punctuation stripping and
/// whitespace collapsing, then the token-level type pass.
#[must_use]
pub fn normalize_name(raw: &str, class: NameClass) -> String {
    let folded = fold_ascii(raw);

    let staged = match class {
        NameClass::Person => reorder_last_first(&folded),
        NameClass::Organization => folded.replace('&', " and "),
        NameClass::Location | NameClass::Generic => folded,
    };

    let stripped = collapse(&PUNCT_RE.replace_all(&staged, " "));

    match class {
        NameClass::Person => drop_person_noise(&stripped),
        NameClass::Organization => strip_legal_suffixes(&stripped),
        NameClass::Location => expand_abbreviations(&stripped),
        NameClass::Generic => stripped,
    }
}

/// `type + "|" + normalized` blocking key, or the empty string when the
/// normalized name is empty.
#[must_use]
pub fn normalized_key(entity_type: &str, normalized_name: &str) -> String {
    if normalized_name.is_empty() {
        return String::new();
    }
    format!("{}|{}", entity_type.trim().to_lowercase(), normalized_name)
}

/// NFKD decomposition, diacritics folded away by dropping the combining
/// marks (all non-ASCII), lowercased and trimmed.
fn fold_ascii(raw: &str) -> String {
    raw.nfkd()
        .filter(char::is_ascii)
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

fn collapse(s: &str) -> String {
    WS_RE.replace_all(s, " ").trim().to_string()
}

/// "Last, First" becomes "First Last". Only the unambiguous two-part form
/// is rewritten; anything else passes through.
fn reorder_last_first(s: &str) -> String {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() == 2 && !parts[0].trim().is_empty() && !parts[1].trim().is_empty() {
        format!("{} {}", parts[1].trim(), parts[0].trim())
    } else {
        s.to_string()
    }
}

/// Drops honorific tokens anywhere and single-letter tokens in interior
/// positions (middle initials). First and last tokens survive so mononyms
/// and initial-only surnames keep their shape.
fn drop_person_noise(s: &str) -> String {
    let tokens: Vec<&str> = s
        .split_whitespace()
        .filter(|t| !HONORIFICS.contains(t))
        .collect();
    let last = tokens.len().saturating_sub(1);
    tokens
        .iter()
        .enumerate()
        .filter(|&(i, t)| i == 0 || i == last || t.len() > 1 || !t.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|(_, t)| *t)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips trailing legal-suffix tokens, repeatedly, so "x co inc" reduces
/// to "x".
fn strip_legal_suffixes(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    while let Some(last) = tokens.last() {
        if tokens.len() > 1 && LEGAL_SUFFIXES.contains(last) {
            tokens.pop();
        } else {
            break;
        }
    }
    tokens.join(" ")
}

fn expand_abbreviations(s: &str) -> String {
    s.split_whitespace()
        .map(|t| match t {
            "st" => "street",
            "ave" => "avenue",
            "blvd" => "boulevard",
            "rd" => "road",
            "mt" => "mount",
            "ft" => "fort",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_pass_folds_case_punctuation_and_whitespace() {
        assert_eq!(
            normalize_name("  The   Quick-Brown   FOX! ", NameClass::Generic),
            "the quick brown fox"
        );
    }

    #[test]
    fn generic_pass_folds_diacritics() {
        assert_eq!(normalize_name("Café Müller", NameClass::Generic), "cafe muller");
    }

    #[test]
    fn empty_and_punctuation_only_input_normalizes_to_empty() {
        assert_eq!(normalize_name("", NameClass::Generic), "");
        assert_eq!(normalize_name("  ?!... ", NameClass::Person), "");
    }

    #[test]
    fn person_drops_honorifics_and_middle_initials() {
        assert_eq!(
            normalize_name("  Dr. John A. Smith ", NameClass::Person),
            "john smith"
        );
        assert_eq!(normalize_name("Mrs. Jane Doe", NameClass::Person), "jane doe");
    }

    #[test]
    fn person_is_deterministic() {
        let a = normalize_name("  Dr. John A. Smith ", NameClass::Person);
        let b = normalize_name("  Dr. John A. Smith ", NameClass::Person);
        assert_eq!(a, b);
    }

    #[test]
    fn person_reorders_last_comma_first() {
        assert_eq!(normalize_name("Smith, John", NameClass::Person), "john smith");
        assert_eq!(
            normalize_name("Smith, Dr. John", NameClass::Person),
            "john smith"
        );
    }

    #[test]
    fn person_keeps_leading_and_trailing_single_letters() {
        assert_eq!(normalize_name("X Smith", NameClass::Person), "x smith");
        assert_eq!(normalize_name("Malcolm X", NameClass::Person), "malcolm x");
    }

    #[test]
    fn organization_strips_trailing_legal_suffixes() {
        assert_eq!(normalize_name("Apple Inc.", NameClass::Organization), "apple");
        assert_eq!(normalize_name("apple inc", NameClass::Organization), "apple");
        assert_eq!(normalize_name("Apple", NameClass::Organization), "apple");
        assert_eq!(
            normalize_name("Acme Holdings Co Inc", NameClass::Organization),
            "acme holdings"
        );
    }

    #[test]
    fn organization_does_not_strip_interior_suffix_tokens() {
        assert_eq!(
            normalize_name("Co Op Collective", NameClass::Organization),
            "co op collective"
        );
    }

    #[test]
    fn organization_expands_ampersand_before_stripping() {
        assert_eq!(
            normalize_name("Johnson & Johnson", NameClass::Organization),
            "johnson and johnson"
        );
    }

    #[test]
    fn location_expands_whole_token_abbreviations() {
        assert_eq!(normalize_name("Main St.", NameClass::Location), "main street");
        assert_eq!(normalize_name("5th Ave", NameClass::Location), "5th avenue");
        assert_eq!(normalize_name("Mt Rainier", NameClass::Location), "mount rainier");
        // "station" is not a token match
        assert_eq!(normalize_name("Station Rd", NameClass::Location), "station road");
    }

    #[test]
    fn name_class_from_type_synonyms() {
        assert_eq!(NameClass::from_type("Person"), NameClass::Person);
        assert_eq!(NameClass::from_type("author"), NameClass::Person);
        assert_eq!(NameClass::from_type("ORG"), NameClass::Organization);
        assert_eq!(NameClass::from_type("company"), NameClass::Organization);
        assert_eq!(NameClass::from_type("city"), NameClass::Location);
        assert_eq!(NameClass::from_type("concept"), NameClass::Generic);
    }

    #[test]
    fn key_embeds_raw_type_not_class() {
        assert_eq!(normalized_key("Company", "apple"), "company|apple");
        assert_eq!(normalized_key("org", "apple"), "org|apple");
    }

    #[test]
    fn key_is_empty_for_empty_name() {
        assert_eq!(normalized_key("person", ""), "");
    }
}
