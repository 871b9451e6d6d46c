//! Book reference normalization.
//!
//! Resolves the many ways a Bible book is written across textual traditions
//! (three-letter codes, full English names, Latin and Greek spellings,
//! roman-numeral prefixes, lettered sub-books) to one canonical [`BookCode`].
//!
//! The alias table is static. It is folded into a lookup map the first time
//! it is used and never mutated afterwards, so [`normalize_book`] can be
//! called from any number of worker threads without locking.
//!
//! ```
//! use versemap_core::books::normalize_book;
//!
//! assert_eq!(normalize_book("Nahum").unwrap().as_str(), "Nah");
//! assert_eq!(normalize_book("Nam").unwrap().as_str(), "Nah");
//! assert_eq!(normalize_book("II Kings").unwrap().as_str(), "2Ki");
//! assert!(normalize_book("Xyz").is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Serialize, Serializer};

/// Canonical three-character (or grouping) book code, e.g. `Psa`, `1Ki`, `EsG`.
///
/// Only obtainable through [`normalize_book`], so every `BookCode` in the
/// system is known to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BookCode(&'static str);

impl BookCode {
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Full English name for the code (`Psa` → `Psalms`).
    pub fn name(&self) -> &'static str {
        BOOKS
            .iter()
            .find(|b| b.code == self.0)
            .map(|b| b.name)
            .unwrap_or(self.0)
    }

    /// Position of the book in canonical order. Used to sort output.
    pub fn ordinal(&self) -> usize {
        BOOKS
            .iter()
            .position(|b| b.code == self.0)
            .unwrap_or(usize::MAX)
    }
}

impl fmt::Display for BookCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for BookCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

struct BookEntry {
    code: &'static str,
    name: &'static str,
    /// Additional spellings, already folded (lowercase, alphanumeric only).
    aliases: &'static [&'static str],
}

/// Prefixes that take a sub-book letter A–F and collapse onto `EsG`.
const LETTERED_ESTHER_PREFIXES: &[&str] = &[
    "addes",
    "addesth",
    "addesther",
    "additionstoesther",
    "restofesther",
    "esg",
    "esth",
];

#[rustfmt::skip]
static BOOKS: &[BookEntry] = &[
    BookEntry { code: "Gen", name: "Genesis", aliases: &["ge", "gn", "1mos"] },
    BookEntry { code: "Exo", name: "Exodus", aliases: &["ex", "exod", "exd"] },
    BookEntry { code: "Lev", name: "Leviticus", aliases: &["le", "lv"] },
    BookEntry { code: "Num", name: "Numbers", aliases: &["nu", "nm", "nb", "numeri"] },
    BookEntry { code: "Deu", name: "Deuteronomy", aliases: &["dt", "deut", "de", "deuteronomium"] },
    BookEntry { code: "Jos", name: "Joshua", aliases: &["josh", "jsh", "josue"] },
    BookEntry { code: "Jdg", name: "Judges", aliases: &["judg", "jg", "jdgs", "judicum"] },
    BookEntry { code: "Rut", name: "Ruth", aliases: &["ru", "rth"] },
    BookEntry { code: "1Sa", name: "1 Samuel", aliases: &["1sam", "1sm", "1s", "1kingdoms", "1kgdms", "1reigns", "1regum", "1rg"] },
    BookEntry { code: "2Sa", name: "2 Samuel", aliases: &["2sam", "2sm", "2s", "2kingdoms", "2kgdms", "2reigns", "2regum", "2rg"] },
    BookEntry { code: "1Ki", name: "1 Kings", aliases: &["1kgs", "1kin", "1kg", "1k", "3kingdoms", "3kgdms", "3reigns", "3regum", "3rg"] },
    BookEntry { code: "2Ki", name: "2 Kings", aliases: &["2kgs", "2kin", "2kg", "2k", "4kingdoms", "4kgdms", "4reigns", "4regum", "4rg"] },
    BookEntry { code: "1Ch", name: "1 Chronicles", aliases: &["1chr", "1chron", "1paralipomenon", "1par"] },
    BookEntry { code: "2Ch", name: "2 Chronicles", aliases: &["2chr", "2chron", "2paralipomenon", "2par"] },
    BookEntry { code: "Ezr", name: "Ezra", aliases: &["ezra", "esdrasb"] },
    BookEntry { code: "Neh", name: "Nehemiah", aliases: &["ne", "nehemias"] },
    BookEntry { code: "Est", name: "Esther", aliases: &["esth", "ester"] },
    BookEntry { code: "Job", name: "Job", aliases: &["jb"] },
    BookEntry { code: "Psa", name: "Psalms", aliases: &["ps", "pss", "psalm", "psalmi", "psm", "pslm"] },
    BookEntry { code: "Pro", name: "Proverbs", aliases: &["prov", "prv", "pr", "proverbia"] },
    BookEntry { code: "Ecc", name: "Ecclesiastes", aliases: &["eccl", "eccles", "qoh", "qoheleth", "ec"] },
    BookEntry { code: "Sng", name: "Song of Songs", aliases: &["song", "sos", "songofsolomon", "canticles", "canticum", "cant", "sol"] },
    BookEntry { code: "Isa", name: "Isaiah", aliases: &["is", "isaias"] },
    BookEntry { code: "Jer", name: "Jeremiah", aliases: &["je", "jr", "jeremias"] },
    BookEntry { code: "Lam", name: "Lamentations", aliases: &["la", "threni"] },
    BookEntry { code: "Ezk", name: "Ezekiel", aliases: &["eze", "ezek", "ezechiel", "ezk"] },
    BookEntry { code: "Dan", name: "Daniel", aliases: &["dn", "da"] },
    BookEntry { code: "Hos", name: "Hosea", aliases: &["ho", "osee"] },
    BookEntry { code: "Jol", name: "Joel", aliases: &["jl", "joe"] },
    BookEntry { code: "Amo", name: "Amos", aliases: &["am"] },
    BookEntry { code: "Oba", name: "Obadiah", aliases: &["ob", "obad", "abdias"] },
    BookEntry { code: "Jon", name: "Jonah", aliases: &["jnh", "jonas"] },
    BookEntry { code: "Mic", name: "Micah", aliases: &["mc", "micheas"] },
    BookEntry { code: "Nah", name: "Nahum", aliases: &["nam", "na"] },
    BookEntry { code: "Hab", name: "Habakkuk", aliases: &["hb", "habacuc"] },
    BookEntry { code: "Zep", name: "Zephaniah", aliases: &["zeph", "zp", "sophonias"] },
    BookEntry { code: "Hag", name: "Haggai", aliases: &["hg", "aggeus"] },
    BookEntry { code: "Zec", name: "Zechariah", aliases: &["zech", "zc", "zacharias"] },
    BookEntry { code: "Mal", name: "Malachi", aliases: &["ml", "malachias"] },
    BookEntry { code: "Mat", name: "Matthew", aliases: &["matt", "mt"] },
    BookEntry { code: "Mrk", name: "Mark", aliases: &["mar", "mk", "mr", "marcus"] },
    BookEntry { code: "Luk", name: "Luke", aliases: &["lk", "lu", "lucas"] },
    BookEntry { code: "Jhn", name: "John", aliases: &["joh", "jn", "johannes"] },
    BookEntry { code: "Act", name: "Acts", aliases: &["ac", "actsoftheapostles"] },
    BookEntry { code: "Rom", name: "Romans", aliases: &["ro", "rm"] },
    BookEntry { code: "1Co", name: "1 Corinthians", aliases: &["1cor"] },
    BookEntry { code: "2Co", name: "2 Corinthians", aliases: &["2cor"] },
    BookEntry { code: "Gal", name: "Galatians", aliases: &["ga"] },
    BookEntry { code: "Eph", name: "Ephesians", aliases: &["ephes"] },
    BookEntry { code: "Php", name: "Philippians", aliases: &["phil", "phl", "pp"] },
    BookEntry { code: "Col", name: "Colossians", aliases: &["co"] },
    BookEntry { code: "1Th", name: "1 Thessalonians", aliases: &["1thess", "1thes", "1ts"] },
    BookEntry { code: "2Th", name: "2 Thessalonians", aliases: &["2thess", "2thes", "2ts"] },
    BookEntry { code: "1Ti", name: "1 Timothy", aliases: &["1tim", "1tm"] },
    BookEntry { code: "2Ti", name: "2 Timothy", aliases: &["2tim", "2tm"] },
    BookEntry { code: "Tit", name: "Titus", aliases: &["ti"] },
    BookEntry { code: "Phm", name: "Philemon", aliases: &["philem", "phlm", "pm"] },
    BookEntry { code: "Heb", name: "Hebrews", aliases: &["he"] },
    BookEntry { code: "Jas", name: "James", aliases: &["jam", "jm", "jacobus"] },
    BookEntry { code: "1Pe", name: "1 Peter", aliases: &["1pet", "1pt", "1p"] },
    BookEntry { code: "2Pe", name: "2 Peter", aliases: &["2pet", "2pt", "2p"] },
    BookEntry { code: "1Jn", name: "1 John", aliases: &["1jhn", "1joh", "1jo"] },
    BookEntry { code: "2Jn", name: "2 John", aliases: &["2jhn", "2joh", "2jo"] },
    BookEntry { code: "3Jn", name: "3 John", aliases: &["3jhn", "3joh", "3jo"] },
    BookEntry { code: "Jud", name: "Jude", aliases: &["jde", "judas"] },
    BookEntry { code: "Rev", name: "Revelation", aliases: &["re", "rv", "apocalypse", "apoc", "revelations"] },
    // Deuterocanonical and apocryphal books.
    BookEntry { code: "Tob", name: "Tobit", aliases: &["tb", "tobias"] },
    BookEntry { code: "Jdt", name: "Judith", aliases: &["jth", "jdth"] },
    BookEntry { code: "EsG", name: "Esther (Greek)", aliases: &["esthergreek", "greekesther", "addesth", "addesther", "additionstoesther", "restofesther"] },
    BookEntry { code: "Wis", name: "Wisdom of Solomon", aliases: &["wisd", "ws", "wisdom", "sapientia"] },
    BookEntry { code: "Sir", name: "Sirach", aliases: &["ecclus", "ecclesiasticus", "ben sira", "bensira"] },
    BookEntry { code: "Bar", name: "Baruch", aliases: &["ba"] },
    BookEntry { code: "LJe", name: "Letter of Jeremiah", aliases: &["epjer", "letjer", "epistleofjeremiah", "lje"] },
    BookEntry { code: "S3Y", name: "Song of the Three Young Men", aliases: &["prazar", "prayerofazariah", "azariah", "songofthree", "songofthethree", "sgthree"] },
    BookEntry { code: "Sus", name: "Susanna", aliases: &["susanna"] },
    BookEntry { code: "Bel", name: "Bel and the Dragon", aliases: &["belandthedragon"] },
    BookEntry { code: "1Ma", name: "1 Maccabees", aliases: &["1mac", "1macc", "1machabees", "1m"] },
    BookEntry { code: "2Ma", name: "2 Maccabees", aliases: &["2mac", "2macc", "2machabees", "2m"] },
    BookEntry { code: "3Ma", name: "3 Maccabees", aliases: &["3mac", "3macc", "3m"] },
    BookEntry { code: "4Ma", name: "4 Maccabees", aliases: &["4mac", "4macc", "4m"] },
    BookEntry { code: "1Es", name: "1 Esdras", aliases: &["1esd", "1esdras", "3esdras"] },
    BookEntry { code: "2Es", name: "2 Esdras", aliases: &["2esd", "2esdras", "4ezra", "4esdras"] },
    BookEntry { code: "Man", name: "Prayer of Manasseh", aliases: &["prman", "prayerofmanasses", "manasses", "orman"] },
    BookEntry { code: "Ps2", name: "Psalm 151", aliases: &["ps151", "psalm151", "addps"] },
    BookEntry { code: "Ode", name: "Odes", aliases: &["odes", "odae"] },
];

static LOOKUP: LazyLock<HashMap<String, &'static BookEntry>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for entry in BOOKS {
        map.entry(fold(entry.code)).or_insert(entry);
        map.entry(fold(entry.name)).or_insert(entry);
        for alias in entry.aliases {
            map.entry(fold(alias)).or_insert(entry);
        }
    }
    if let Some(esg) = BOOKS.iter().find(|b| b.code == "EsG") {
        for prefix in LETTERED_ESTHER_PREFIXES {
            for letter in 'a'..='f' {
                map.insert(format!("{}{}", prefix, letter), esg);
            }
        }
    }
    map
});

/// Resolve a book name, abbreviation or tradition-specific spelling to its
/// canonical code.
///
/// Returns `None` for unknown input. Callers are expected to log the miss;
/// nothing is ever coerced to a nearby book.
pub fn normalize_book(name_or_code: &str) -> Option<BookCode> {
    let key = fold(name_or_code);
    if key.is_empty() {
        return None;
    }
    LOOKUP.get(&key).map(|entry| BookCode(entry.code))
}

/// All canonical codes in canonical order.
pub fn all_books() -> impl Iterator<Item = BookCode> {
    BOOKS.iter().map(|b| BookCode(b.code))
}

/// Fold a book spelling into its lookup key: lowercase, roman numeral or
/// ordinal prefix turned into a digit, punctuation and whitespace removed.
fn fold(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let normalized = match lower.split_once(|c: char| c.is_whitespace() || c == '.' || c == '_') {
        Some((head, tail)) if !tail.trim().is_empty() => match numeric_prefix(head) {
            Some(digit) => format!("{}{}", digit, tail),
            None => lower.clone(),
        },
        _ => lower.clone(),
    };
    normalized
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn numeric_prefix(head: &str) -> Option<char> {
    match head {
        "i" | "first" | "1st" => Some('1'),
        "ii" | "second" | "2nd" => Some('2'),
        "iii" | "third" | "3rd" => Some('3'),
        "iv" | "fourth" | "4th" => Some('4'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn code(s: &str) -> &'static str {
        normalize_book(s)
            .unwrap_or_else(|| panic!("{} should resolve", s))
            .as_str()
    }

    #[test]
    fn resolves_codes_and_full_names() {
        assert_eq!(code("Gen"), "Gen");
        assert_eq!(code("genesis"), "Gen");
        assert_eq!(code("Psalms"), "Psa");
        assert_eq!(code("PSA"), "Psa");
        assert_eq!(code("Song of Solomon"), "Sng");
        assert_eq!(code("Revelation"), "Rev");
    }

    #[test]
    fn resolves_tradition_variants() {
        assert_eq!(code("Nam"), "Nah");
        assert_eq!(code("Nah"), "Nah");
        assert_eq!(code("Jhn"), "Jhn");
        assert_eq!(code("Joh"), "Jhn");
        assert_eq!(code("Ezechiel"), "Ezk");
        assert_eq!(code("3 Kingdoms"), "1Ki");
        assert_eq!(code("1 Regum"), "1Sa");
        assert_eq!(code("Ecclesiasticus"), "Sir");
        assert_eq!(code("Qoheleth"), "Ecc");
    }

    #[test]
    fn resolves_numeric_prefixes() {
        assert_eq!(code("1 Samuel"), "1Sa");
        assert_eq!(code("I Samuel"), "1Sa");
        assert_eq!(code("II Kings"), "2Ki");
        assert_eq!(code("Second Corinthians"), "2Co");
        assert_eq!(code("iii John"), "3Jn");
        assert_eq!(code("1.Sam"), "1Sa");
        // "Isaiah" must not be read as "I saiah".
        assert_eq!(code("Isaiah"), "Isa");
    }

    #[test]
    fn lettered_esther_additions_group_together() {
        for letter in ["A", "B", "C", "D", "E", "F"] {
            assert_eq!(code(&format!("AddEsth{}", letter)), "EsG");
            assert_eq!(code(&format!("Add Esth {}", letter)), "EsG");
        }
        assert_eq!(code("Additions to Esther"), "EsG");
        assert_eq!(code("Esther"), "Est");
    }

    #[test]
    fn unknown_books_are_not_found() {
        assert!(normalize_book("Xyz").is_none());
        assert!(normalize_book("").is_none());
        assert!(normalize_book("   ").is_none());
        assert!(normalize_book("Genesiss").is_none());
    }

    #[test]
    fn name_round_trips_through_lookup() {
        for book in all_books() {
            assert_eq!(normalize_book(book.name()), Some(book), "{}", book);
            assert_eq!(normalize_book(book.as_str()), Some(book));
        }
    }

    #[test]
    fn no_alias_points_at_two_books() {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for entry in BOOKS {
            let mut keys: HashSet<String> = entry.aliases.iter().map(|a| fold(a)).collect();
            keys.insert(fold(entry.code));
            keys.insert(fold(entry.name));
            for key in keys {
                if let Some(prev) = seen.insert(key.clone(), entry.code) {
                    panic!("alias '{}' maps to both {} and {}", key, prev, entry.code);
                }
            }
        }
    }

    #[test]
    fn ordinal_follows_canonical_order() {
        let gen = normalize_book("Gen").unwrap();
        let rev = normalize_book("Rev").unwrap();
        assert!(gen.ordinal() < rev.ordinal());
    }
}
