//! Construction of geocoding queries from case record fields.

use crate::domain::model::GeocodeQuery;
use regex::Regex;
use std::sync::LazyLock;

/// Two-letter codes of the Brazilian federative units.
pub const SUBDIVISION_CODES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB",
    "PR", "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

/// Full names (accent-folded, uppercase) of the federative units.
const SUBDIVISION_NAMES: [(&str, &str); 27] = [
    ("ACRE", "AC"),
    ("ALAGOAS", "AL"),
    ("AMAPA", "AP"),
    ("AMAZONAS", "AM"),
    ("BAHIA", "BA"),
    ("CEARA", "CE"),
    ("DISTRITO FEDERAL", "DF"),
    ("ESPIRITO SANTO", "ES"),
    ("GOIAS", "GO"),
    ("MARANHAO", "MA"),
    ("MATO GROSSO", "MT"),
    ("MATO GROSSO DO SUL", "MS"),
    ("MINAS GERAIS", "MG"),
    ("PARA", "PA"),
    ("PARAIBA", "PB"),
    ("PARANA", "PR"),
    ("PERNAMBUCO", "PE"),
    ("PIAUI", "PI"),
    ("RIO DE JANEIRO", "RJ"),
    ("RIO GRANDE DO NORTE", "RN"),
    ("RIO GRANDE DO SUL", "RS"),
    ("RONDONIA", "RO"),
    ("RORAIMA", "RR"),
    ("SANTA CATARINA", "SC"),
    ("SAO PAULO", "SP"),
    ("SERGIPE", "SE"),
    ("TOCANTINS", "TO"),
];

/// A trailing `(XX)` code on a locality, e.g. `Manaus (AM)`.
static LOCALITY_CODE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([A-Za-z]{2}\)\s*$").expect("valid regex"));

pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

fn is_code(candidate: &str) -> bool {
    SUBDIVISION_CODES.contains(&candidate)
}

/// Reduces a subdivision field to its two-letter code.
///
/// Full names are looked up in a fixed table first; otherwise the word
/// initials or a leading code are used when they form a known code, and
/// the first two characters are the last resort.
pub fn normalize_subdivision(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= 2 {
        return trimmed.to_uppercase();
    }

    let folded = fold_accents(trimmed).to_uppercase();
    let words: Vec<&str> = folded.split_whitespace().collect();
    let canonical = words.join(" ");

    if let Some((_, code)) = SUBDIVISION_NAMES.iter().find(|(name, _)| *name == canonical) {
        return (*code).to_string();
    }

    if words.len() > 1 {
        let initials: String = words.iter().filter_map(|w| w.chars().next()).collect();
        if is_code(&initials) {
            return initials;
        }
        if is_code(words[0]) {
            return words[0].to_string();
        }
    }

    folded.chars().take(2).collect()
}

/// Drops a trailing `(XX)` code and collapses whitespace.
pub fn clean_locality(raw: &str) -> String {
    let without_code = LOCALITY_CODE_SUFFIX_RE.replace(raw.trim(), "");
    without_code.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"{locality}, {code}, {country}"`.
pub fn place_query(locality: &str, subdivision: &str, country: &str) -> GeocodeQuery {
    let locality = clean_locality(locality);
    let code = normalize_subdivision(subdivision);
    GeocodeQuery::new(&format!("{locality}, {code}, {country}"))
}

/// Free-text region, suffixed with the country unless it already names it.
pub fn region_query(region: &str, country: &str) -> GeocodeQuery {
    let region = region.split_whitespace().collect::<Vec<_>>().join(" ");
    let folded = fold_accents(&region).to_lowercase();
    let country_folded = fold_accents(country).to_lowercase();
    if country.is_empty() || folded.ends_with(&country_folded) {
        GeocodeQuery::new(&region)
    } else {
        GeocodeQuery::new(&format!("{region}, {country}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_pass_through_uppercased() {
        assert_eq!(normalize_subdivision("AM"), "AM");
        assert_eq!(normalize_subdivision(" sp "), "SP");
    }

    #[test]
    fn test_full_names_use_alias_table() {
        assert_eq!(normalize_subdivision("São Paulo"), "SP");
        assert_eq!(normalize_subdivision("Mato Grosso"), "MT");
        assert_eq!(normalize_subdivision("mato grosso do sul"), "MS");
        assert_eq!(normalize_subdivision("Distrito Federal"), "DF");
        assert_eq!(normalize_subdivision("Pará"), "PA");
        assert_eq!(normalize_subdivision("Paraná"), "PR");
        assert_eq!(normalize_subdivision("Rio  Grande do Norte"), "RN");
    }

    #[test]
    fn test_initials_and_leading_code_heuristics() {
        assert_eq!(normalize_subdivision("Rio Janeiro"), "RJ");
        assert_eq!(normalize_subdivision("AM Manicore"), "AM");
    }

    #[test]
    fn test_truncation_fallback() {
        assert_eq!(normalize_subdivision("Amazonia"), "AM");
        assert_eq!(normalize_subdivision("Xyz"), "XY");
    }

    #[test]
    fn test_clean_locality() {
        assert_eq!(clean_locality("Manaus (AM)"), "Manaus");
        assert_eq!(clean_locality("  São   José dos Campos "), "São José dos Campos");
        assert_eq!(clean_locality("Rio (Centro)"), "Rio (Centro)");
    }

    #[test]
    fn test_place_query() {
        let query = place_query("Manicoré", "AM", "Brasil");
        assert_eq!(query.text(), "Manicoré, AM, Brasil");

        let query = place_query("Manicoré (AM)", "Amazonas", "Brasil");
        assert_eq!(query.text(), "Manicoré, AM, Brasil");
    }

    #[test]
    fn test_region_query() {
        assert_eq!(
            region_query("Bacia do Rio Doce", "Brasil").text(),
            "Bacia do Rio Doce, Brasil"
        );
        assert_eq!(
            region_query("Litoral Norte, Brasil", "Brasil").text(),
            "Litoral Norte, Brasil"
        );
    }
}
