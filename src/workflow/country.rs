use once_cell::sync::Lazy;
use std::collections::HashMap;

static COUNTRY_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("united states", "US"),
        ("united states of america", "US"),
        ("usa", "US"),
        ("america", "US"),
        ("canada", "CA"),
        ("mexico", "MX"),
        ("united kingdom", "GB"),
        ("great britain", "GB"),
        ("england", "GB"),
        ("scotland", "GB"),
        ("wales", "GB"),
        ("northern ireland", "GB"),
        ("uk", "GB"),
        ("ireland", "IE"),
        ("australia", "AU"),
        ("new zealand", "NZ"),
        ("germany", "DE"),
        ("france", "FR"),
        ("spain", "ES"),
        ("portugal", "PT"),
        ("italy", "IT"),
        ("netherlands", "NL"),
        ("the netherlands", "NL"),
        ("holland", "NL"),
        ("belgium", "BE"),
        ("luxembourg", "LU"),
        ("switzerland", "CH"),
        ("austria", "AT"),
        ("denmark", "DK"),
        ("sweden", "SE"),
        ("norway", "NO"),
        ("finland", "FI"),
        ("iceland", "IS"),
        ("poland", "PL"),
        ("czech republic", "CZ"),
        ("czechia", "CZ"),
        ("hungary", "HU"),
        ("greece", "GR"),
        ("romania", "RO"),
        ("israel", "IL"),
        ("united arab emirates", "AE"),
        ("uae", "AE"),
        ("saudi arabia", "SA"),
        ("south africa", "ZA"),
        ("japan", "JP"),
        ("south korea", "KR"),
        ("korea", "KR"),
        ("china", "CN"),
        ("hong kong", "HK"),
        ("taiwan", "TW"),
        ("singapore", "SG"),
        ("malaysia", "MY"),
        ("philippines", "PH"),
        ("thailand", "TH"),
        ("vietnam", "VN"),
        ("indonesia", "ID"),
        ("india", "IN"),
        ("brazil", "BR"),
        ("argentina", "AR"),
        ("chile", "CL"),
        ("colombia", "CO"),
        ("peru", "PE"),
        ("puerto rico", "PR"),
    ])
});

/// Two-letter destination code for a free-text country. Unknown names fall
/// back to their first two letters, which is lossy but lets the order go out.
pub fn country_code(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "US".to_string();
    }
    if let Some(code) = COUNTRY_CODES.get(trimmed.to_lowercase().as_str()) {
        return (*code).to_string();
    }
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return trimmed.to_ascii_uppercase();
    }
    trimmed.to_uppercase().chars().take(2).collect()
}
