//! Email address plausibility check.

/// Syntactic plausibility check for a notification address.
///
/// Deliberately loose: exactly one `@`, a non-empty local part, a dotted
/// domain, no whitespace, and an overall length within the SMTP path limit.
/// Deliverability is proven by the mail transport, not here.
pub fn is_plausible_address(s: &str) -> bool {
    if s.len() > 254 || s.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = s.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    let dotted = domain.split('.').collect::<Vec<_>>();
    dotted.len() >= 2 && dotted.iter().all(|label| !label.is_empty())
}
