use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// The five canonical theme keys the corpus is partitioned by. Free-text
/// labels from spreadsheets are folded onto these via `lookup_theme`.
pub const CANONICAL_THEMES: [&str; 5] =
    ["institutions", "histoire", "geographie", "valeurs", "droits"];

pub const LEVELS: [&str; 3] = ["facile", "moyen", "difficile"];
pub const DEFAULT_LEVEL: &str = "moyen";

fn variant_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "(Variante 2)", "(variante)", "Variante 3 :", "- Variante 2",
        // with or without the numeral, colon or dash.
        Regex::new(r"(?i)\(\s*variantes?\s*\d*\s*\)|\bvariantes?\s*\d+\s*[:\-]?|\bvariantes?\s*[:\-]")
            .unwrap()
    })
}

/// Removes variant markers ("(Variante 2)", "variante 3 :") from display
/// text without touching case, accents or the rest of the string.
pub fn strip_variant_markers(text: &str) -> String {
    variant_marker_re().replace_all(text, " ").into_owned()
}

/// Canonical comparison key for question and answer text. Deterministic,
/// pure and idempotent: applying it twice yields the same key.
///
/// Steps, in order: variant-marker stripping, NFD decomposition with
/// combining marks dropped, lowercasing, sentence-punctuation removal,
/// whitespace collapsing, trim.
pub fn normalize_text(text: &str) -> String {
    let stripped = strip_variant_markers(text);

    let folded: String = stripped
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let without_punct: String = folded
        .chars()
        .map(|c| {
            if matches!(
                c,
                '.' | ',' | ';' | ':' | '!' | '?' | '(' | ')' | '-' | '\'' | '"' | '’' | '«' | '»'
            ) {
                ' '
            } else {
                c
            }
        })
        .collect();

    without_punct.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Theme-label variant of `normalize_text`: underscores count as word
/// separators before the generic folding kicks in.
pub fn normalize_theme(label: &str) -> String {
    normalize_text(&label.replace('_', " "))
}

/// Best-effort key for a label no lookup table recognizes. Never fails;
/// an empty label slugs to "divers".
pub fn slugify(label: &str) -> String {
    let slug = normalize_theme(label).replace(' ', "_");
    if slug.is_empty() {
        "divers".to_string()
    } else {
        slug
    }
}

/// Maps a free-text theme label onto a canonical theme key. Lookup order:
/// alias table (accent/case-insensitive), then a literal match against the
/// canonical keys, then slugification. Unrecognized labels are kept as
/// best-effort keys rather than rejected.
pub fn lookup_theme(label: &str) -> String {
    let key = normalize_theme(label);

    const ALIASES: [(&str, &str); 18] = [
        ("institutions", "institutions"),
        ("institutions francaises", "institutions"),
        ("institutions et politique", "institutions"),
        ("politique", "institutions"),
        ("histoire", "histoire"),
        ("histoire de france", "histoire"),
        ("history", "histoire"),
        ("geographie", "geographie"),
        ("geographie de la france", "geographie"),
        ("geography", "geographie"),
        ("territoire", "geographie"),
        ("valeurs", "valeurs"),
        ("valeurs de la republique", "valeurs"),
        ("principes et valeurs", "valeurs"),
        ("values", "valeurs"),
        ("droits", "droits"),
        ("droits et devoirs", "droits"),
        ("devoirs", "droits"),
    ];

    for (alias, canonical) in ALIASES {
        if key == alias {
            return canonical.to_string();
        }
    }
    if CANONICAL_THEMES.contains(&key.as_str()) {
        return key;
    }
    slugify(label)
}

/// Maps a free-text level label onto facile/moyen/difficile. Absent or
/// unrecognized labels fall back to the default tier.
pub fn lookup_level(label: &str) -> String {
    let key = normalize_theme(label);
    match key.as_str() {
        "facile" | "easy" | "debutant" | "1" => "facile".to_string(),
        "moyen" | "medium" | "intermediaire" | "2" => "moyen".to_string(),
        "difficile" | "hard" | "avance" | "3" => "difficile".to_string(),
        _ => DEFAULT_LEVEL.to_string(),
    }
}
