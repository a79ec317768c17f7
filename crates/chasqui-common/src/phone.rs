//! The single source of truth for phone normalization.
//!
//! Argentina rule, v2: a canonical mobile number carries the extra mobile
//! indicator `9` right after the `54` country code (`549…`). Historical rows
//! and some provider callbacks use the bare `54…` form; both must resolve to
//! the same contact. The provider's send API expects the indicator-stripped
//! form, so every outbound address goes through [`wire_format`].

const COUNTRY_CODE: &str = "54";
const MOBILE_PREFIX: &str = "549";

/// Normalizes a raw phone string into the canonical form: digits only, with
/// the mobile indicator inserted for Argentine numbers that lack it.
pub fn canonicalize(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.starts_with(COUNTRY_CODE) && !digits.starts_with(MOBILE_PREFIX) {
        let rest = &digits[COUNTRY_CODE.len()..];
        return format!("{MOBILE_PREFIX}{rest}");
    }

    digits
}

/// The legacy (pre-indicator) form of a canonical number, used to migrate
/// contacts stored before normalization was introduced. Returns `None` when
/// the number has no distinct legacy form.
pub fn legacy_form(canonical: &str) -> Option<String> {
    canonical
        .strip_prefix(MOBILE_PREFIX)
        .map(|rest| format!("{COUNTRY_CODE}{rest}"))
}

/// The form the provider expects on outbound sends: canonical numbers with
/// the mobile indicator stripped. Non-Argentine numbers pass through.
pub fn wire_format(canonical: &str) -> String {
    match canonical.strip_prefix(MOBILE_PREFIX) {
        Some(rest) => format!("{COUNTRY_CODE}{rest}"),
        None => canonical.to_string(),
    }
}
