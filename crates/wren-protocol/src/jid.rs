//! Helpers for `local@domain/resource` addresses.

/// Splits a JID into its bare part and resource. The resource is empty
/// when the JID has none.
///
/// ```
/// assert_eq!(wren_protocol::split_jid("a@b/phone"), ("a@b", "phone"));
/// assert_eq!(wren_protocol::split_jid("a@b"), ("a@b", ""));
/// ```
pub fn split_jid(jid: &str) -> (&str, &str) {
    jid.split_once('/').unwrap_or((jid, ""))
}

/// Returns the JID without its resource.
pub fn bare_jid(jid: &str) -> &str {
    split_jid(jid).0
}

/// Joins a bare JID and an optional resource.
pub fn full_jid(bare: &str, resource: &str) -> String {
    if resource.is_empty() {
        bare.to_owned()
    } else {
        format!("{bare}/{resource}")
    }
}
