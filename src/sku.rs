// SKU heuristics: normalization, validation and splitting of concatenated codes
use once_cell::sync::Lazy;
use regex::Regex;

/// Kohler-style code with a K prefix: `K-75890IN-M-CP`, `K20746T`
static K_SKU: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)K-?\d+[A-Z0-9-]*(?:IN|T)[A-Z0-9-]*").unwrap());

/// Code without the prefix but with the IN marker: `75890INPCP`
static IN_SKU: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\d+IN[A-Z0-9-]*").unwrap());

/// Loose code pattern used when a page has no recognisable table
pub static TEXT_SKU: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z0-9]{4,}[-/]?[A-Z0-9]{2,})\b").unwrap());

/// Canonical key used to match pricebook codes against workbook codes.
///
/// Separators and spaces are dropped, letters upper-cased, and a leading `K`
/// directly followed by a digit is removed (`K-75890IN` and `75890IN` are the
/// same product).
pub fn normalize_sku(raw: &str) -> String {
    let mut sku: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '/'))
        .collect::<String>()
        .to_uppercase();

    let mut chars = sku.chars();
    if chars.next() == Some('K') && chars.next().map_or(false, |c| c.is_ascii_digit()) {
        sku.remove(0);
    }
    sku
}

pub fn is_valid_sku(sku: &str) -> bool {
    if sku.chars().count() < 3 {
        return false;
    }
    if !sku.chars().any(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    // plain numbers are quantities or prices
    !sku.chars().all(|c| c.is_ascii_digit())
}

/// Every SKU in a table cell, in reading order.
///
/// Extraction frequently glues neighbouring codes together
/// (`75890INPCPK75890INMCP`); K-prefixed codes are cut out first and the
/// remaining text is searched for `IN` codes.
pub fn extract_all_skus(cell: &str) -> Vec<String> {
    let value = cell.replace('\n', " ");
    let value = value.trim();
    if value.is_empty() {
        return Vec::new();
    }

    let mut found: Vec<(usize, String)> = Vec::new();
    let mut masked = value.to_string();

    for m in K_SKU.find_iter(value) {
        if is_valid_sku(m.as_str()) {
            found.push((m.start(), m.as_str().to_string()));
        }
        masked.replace_range(m.range(), &" ".repeat(m.len()));
    }

    for m in IN_SKU.find_iter(&masked) {
        let sku = m.as_str();
        if is_valid_sku(sku) && !found.iter().any(|(_, s)| s == sku) {
            found.push((m.start(), sku.to_string()));
        }
    }

    if found.is_empty() {
        return if is_valid_sku(value) {
            vec![value.to_string()]
        } else {
            Vec::new()
        };
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, sku)| sku).collect()
}

/// First header cell containing any of `names` (case-insensitive).
pub fn find_column_index<S: AsRef<str>>(header: &[Option<String>], names: &[S]) -> Option<usize> {
    header.iter().position(|cell| {
        cell.as_deref()
            .map(|text| header_matches(text, names))
            .unwrap_or(false)
    })
}

/// Like [`find_column_index`], but never returns one of the `taken` columns.
pub fn find_free_column_index<S: AsRef<str>>(header: &[Option<String>], names: &[S], taken: &[usize]) -> Option<usize> {
    header.iter().enumerate().position(|(idx, cell)| {
        !taken.contains(&idx)
            && cell
                .as_deref()
                .map(|text| header_matches(text, names))
                .unwrap_or(false)
    })
}

pub fn header_matches<S: AsRef<str>>(text: &str, names: &[S]) -> bool {
    let upper = text.trim().to_uppercase();
    !upper.is_empty()
        && names
            .iter()
            .any(|name| upper.contains(&name.as_ref().to_uppercase()))
}

/// Grey reference/dependency rows ("MUST ORDER ...", "SOLD SEPARATELY") that
/// mention codes of other products.
pub fn is_reference_row<S: AsRef<str>>(row: &[Option<String>], skip_keywords: &[S]) -> bool {
    let text = row
        .iter()
        .flatten()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();

    skip_keywords
        .iter()
        .any(|keyword| text.contains(&keyword.as_ref().to_uppercase()))
}

/// File name for an extracted image: separators become `_`, anything else
/// outside `[A-Za-z0-9_-]` is dropped.
pub fn safe_filename(sku: &str) -> String {
    sku.chars()
        .map(|c| if matches!(c, '/' | '\\' | ' ') { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_drops_separators_and_k_prefix() {
        assert_eq!(normalize_sku(" K-75890IN-M-CP "), "75890INMCP");
        assert_eq!(normalize_sku("75890in_m/cp"), "75890INMCP");
        assert_eq!(normalize_sku("KIT-100"), "KIT100");
        assert_eq!(normalize_sku("K"), "K");
        assert_eq!(normalize_sku(""), "");
    }

    #[test]
    fn validity() {
        assert!(is_valid_sku("K-1234"));
        assert!(is_valid_sku("AB1"));
        assert!(!is_valid_sku("AB"));
        assert!(!is_valid_sku("12345"));
        assert!(!is_valid_sku("---"));
    }

    #[test]
    fn concatenated_codes_are_split() {
        assert_eq!(
            extract_all_skus("75890INPCPK75890INMCP"),
            vec!["75890INPCP", "K75890INMCP"]
        );
    }

    #[test]
    fn multiline_cells_yield_every_code() {
        assert_eq!(
            extract_all_skus("K-20746IN-CP\nK-20747IN-BN"),
            vec!["K-20746IN-CP", "K-20747IN-BN"]
        );
    }

    #[test]
    fn plain_codes_fall_back_to_the_whole_value() {
        assert_eq!(extract_all_skus(" 1234-AB "), vec!["1234-AB"]);
        assert!(extract_all_skus("12").is_empty());
        assert!(extract_all_skus("   ").is_empty());
    }

    #[test]
    fn header_lookup_is_substring_and_case_insensitive() {
        let header = vec![
            Some("Sr".to_string()),
            None,
            Some("Item Code".to_string()),
            Some("M.R.P / MRP".to_string()),
        ];
        assert_eq!(find_column_index(&header, &["CODE", "SKU"]), Some(2));
        assert_eq!(find_column_index(&header, &["MRP"]), Some(3));
        assert_eq!(find_column_index(&header, &["IMAGE"]), None);
    }

    #[test]
    fn reference_rows_are_detected() {
        let row = vec![Some("K-1234IN".to_string()), Some("Must order with valve".to_string())];
        assert!(is_reference_row(&row, &["MUST ORDER"]));
        assert!(!is_reference_row(&row, &["SEE ALSO"]));
    }

    #[test]
    fn filenames_are_sanitised() {
        assert_eq!(safe_filename("K-123/45 CP"), "K-123_45_CP");
        assert_eq!(safe_filename("A.B#C"), "ABC");
    }

    #[test]
    fn text_pattern_finds_codes() {
        let found: Vec<_> = TEXT_SKU
            .find_iter("Basin mixer 75890IN-CP with waste")
            .map(|m| m.as_str())
            .collect();
        assert_eq!(found, vec!["75890IN-CP"]);
    }
}
