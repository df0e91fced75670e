//! Filename heuristics: guess country and stamp type from an image name
//!
//! Wikimedia-style names (`Passport_stamp_Salida_Argentina.jpg`) carry
//! most of what we know about a stamp before any model looks at it.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use stampline_core::Ledger;

const ENTRY_WORDS: &[&str] = &["entry", "arrive", "arrival", "in", "entrance"];
const EXIT_WORDS: &[&str] = &["exit", "depart", "departure", "out", "salida", "saida"];

/// Tokens that never name a country
const NOISE_WORDS: &[&str] = &[
    "stamp", "passport", "immigration", "airport", "arrival", "departure", "entry", "exit",
    "entrance", "arrive", "arr", "dep", "250px", "200px", "lossless", "page1", "jpg", "jpeg",
    "png", "tif", "tiff", "_",
];

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_()]+").expect("invalid separator regex"));
static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[A-Za-z0-9]+$").expect("invalid extension regex"));
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2,4}$").expect("invalid number regex"));
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9 ]").expect("invalid alnum regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampType {
    Entry,
    Exit,
}

impl StampType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StampInfo {
    pub country: Option<String>,
    pub stamp_type: Option<StampType>,
}

impl StampInfo {
    /// Guess from the file name of a ledger identity
    pub fn from_identity(identity: &str) -> Self {
        let name = Path::new(identity)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| identity.to_string());
        let tokens = tokenize(&name);
        let stamp_type = detect_type(&tokens);
        let country = extract_country(&tokens, stamp_type);
        Self {
            country,
            stamp_type,
        }
    }

    /// `country=X; type=Y`, either part optional, empty when nothing was found
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if let Some(country) = &self.country {
            parts.push(format!("country={country}"));
        }
        if let Some(t) = self.stamp_type {
            parts.push(format!("type={}", t.as_str()));
        }
        parts.join("; ")
    }
}

/// Decode `%XX` escapes; malformed escapes are kept literally.
pub fn percent_decode(s: &str) -> String {
    let hex = |b: u8| (b as char).to_digit(16).map(|d| d as u8);
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn tokenize(name: &str) -> Vec<String> {
    let decoded = percent_decode(name);
    let spaced = SEPARATORS.replace_all(&decoded, " ");
    let stem = EXTENSION.replace(&spaced, "");
    stem.split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| !NUMBER.is_match(t))
        .filter(|t| {
            let mut chars = t.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c.is_alphabetic(),
                _ => true,
            }
        })
        .collect()
}

fn detect_type(tokens: &[String]) -> Option<StampType> {
    let has = |words: &[&str]| tokens.iter().any(|t| words.contains(&t.as_str()));
    if has(ENTRY_WORDS) {
        Some(StampType::Entry)
    } else if has(EXIT_WORDS) {
        Some(StampType::Exit)
    } else {
        None
    }
}

fn extract_country(tokens: &[String], stamp_type: Option<StampType>) -> Option<String> {
    let type_word = stamp_type.map(StampType::as_str);
    // first of the longest
    let candidate = tokens
        .iter()
        .filter(|t| !NOISE_WORDS.contains(&t.as_str()))
        .filter(|t| Some(t.as_str()) != type_word)
        .rev()
        .max_by_key(|t| t.chars().count())?;

    let cleaned = NON_ALNUM.replace_all(candidate, " ");
    let words: Vec<String> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 1)
        .map(title_case)
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

/// Upper-case every letter that follows a non-letter
fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev_letter = false;
    for c in word.chars() {
        if c.is_alphabetic() && !prev_letter {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_letter = c.is_alphabetic();
    }
    out
}

/// Outcome of filling the info column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoReport {
    pub written: usize,
    /// Cells that already had a value
    pub kept: usize,
    /// Names that yielded nothing
    pub blank: usize,
}

/// Fill `column` with rendered guesses. Existing values are kept unless `overwrite`.
pub fn fill_info_column(
    ledger: &mut Ledger,
    column: &str,
    overwrite: bool,
) -> Result<InfoReport, stampline_core::LedgerError> {
    ledger.ensure_column(column)?;
    let mut report = InfoReport::default();
    for row in 0..ledger.len() {
        if !overwrite && !ledger.is_blank(row, column) {
            report.kept += 1;
            continue;
        }
        let identity = ledger.identity(row).unwrap_or_default();
        let info = StampInfo::from_identity(identity).render();
        if info.is_empty() {
            report.blank += 1;
        } else {
            report.written += 1;
        }
        ledger.set(row, column, info)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> String {
        StampInfo::from_identity(name).render()
    }

    #[test]
    fn wikimedia_exit_stamp() {
        assert_eq!(
            info("data/stamps/250px-Passport_stamp_Salida_Argentina.jpg"),
            "country=Argentina; type=exit"
        );
    }

    #[test]
    fn entry_wins_over_exit() {
        let parsed = StampInfo::from_identity("Japan_entry_exit.png");
        assert_eq!(parsed.stamp_type, Some(StampType::Entry));
        assert_eq!(parsed.country.as_deref(), Some("Japan"));
    }

    #[test]
    fn years_and_sizes_are_dropped() {
        assert_eq!(info("Entry_stamp_Japan_2019.png"), "country=Japan; type=entry");
        assert_eq!(info("(Germany)_exit-stamp.jpeg"), "country=Germany; type=exit");
    }

    #[test]
    fn percent_escapes_decoded() {
        assert_eq!(info("Chile%20entry.jpg"), "country=Chile; type=entry");
        assert_eq!(percent_decode("Sa%C3%ADda"), "Saída");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz%4"), "%zz%4");
    }

    #[test]
    fn country_only_or_nothing() {
        assert_eq!(info("Brazil.jpg"), "country=Brazil");
        assert_eq!(info("stamp.jpg"), "");
        assert_eq!(info("1234.jpg"), "");
        assert_eq!(StampInfo::default().render(), "");
    }

    #[test]
    fn title_case_follows_non_letters() {
        assert_eq!(title_case("brazil"), "Brazil");
        assert_eq!(title_case("a1b"), "A1B");
    }

    #[test]
    fn fill_keeps_existing_unless_overwrite() {
        let mut ledger = Ledger::new("path");
        ledger.push_row("stamps/Brazil_entry.jpg").unwrap();
        ledger.push_row("stamps/Peru_exit.jpg").unwrap();
        ledger.push_row("stamps/0001.jpg").unwrap();
        ledger.ensure_column("info").unwrap();
        ledger.set(1, "info", "hand-written").unwrap();

        let report = fill_info_column(&mut ledger, "info", false).unwrap();
        assert_eq!(
            report,
            InfoReport {
                written: 1,
                kept: 1,
                blank: 1
            }
        );
        assert_eq!(ledger.get(0, "info"), Some("country=Brazil; type=entry"));
        assert_eq!(ledger.get(1, "info"), Some("hand-written"));

        fill_info_column(&mut ledger, "info", true).unwrap();
        assert_eq!(ledger.get(1, "info"), Some("country=Peru; type=exit"));
    }
}
