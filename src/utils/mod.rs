/// Expiry timestamps stored as RFC 3339 strings.
pub mod time;
