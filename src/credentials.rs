// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! NWC-style credential parsing.
//!
//! A connection string looks like
//! `nostr+walletconnect://<pubkey>?relay=wss://...&secret=<hex>`. The
//! session only extracts the wallet service pubkey and the relay list;
//! everything else stays opaque and is handed to the wallet client
//! verbatim. Repeated `relay` parameters and numbered `relay1`, `relay2`,
//! ... keys both count as alternates, in the order they appear.

use url::Url;

use crate::error::SessionError;

/// Fields the session needs out of a connection string.
#[derive(Debug, Clone)]
pub struct ParsedCredentials {
    /// Wallet service pubkey (the URI host).
    pub pubkey: String,
    /// Ordered relay URLs; never empty.
    pub relays: Vec<String>,
    /// Whether the string carries a secret parameter.
    pub has_secret: bool,
}

impl ParsedCredentials {
    /// Parse a connection string, falling back to `default_relay` when the
    /// string names no relay at all.
    ///
    /// Yields exactly the relays present, in order, or exactly one default
    /// entry.
    pub fn parse(credentials: &str, default_relay: &str) -> Result<Self, SessionError> {
        let trimmed = credentials.trim();
        if trimmed.is_empty() {
            return Err(SessionError::Credentials(
                "connection string cannot be empty".to_string(),
            ));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| SessionError::Credentials(format!("not a valid URI: {e}")))?;

        let pubkey = url
            .host_str()
            .map(str::to_string)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                SessionError::Credentials("connection string has no wallet pubkey".to_string())
            })?;

        let mut relays = Vec::new();
        let mut has_secret = false;
        for (key, value) in url.query_pairs() {
            if is_relay_key(&key) && !value.is_empty() {
                relays.push(value.into_owned());
            } else if key == "secret" && !value.is_empty() {
                has_secret = true;
            }
        }

        if relays.is_empty() {
            relays.push(default_relay.to_string());
        }

        Ok(Self {
            pubkey,
            relays,
            has_secret,
        })
    }
}

/// `relay` or `relay<N>` for a numbered alternate.
fn is_relay_key(key: &str) -> bool {
    match key.strip_prefix("relay") {
        Some(rest) => rest.is_empty() || rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Best-effort human-readable alias from a credential string.
///
/// Cosmetic only: the text before an `@`, else the URI host. Never treated
/// as a contract.
pub fn extract_alias(credentials: &str) -> Option<String> {
    let trimmed = credentials.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some((name, _)) = trimmed.split_once('@') {
        let name = name.rsplit("://").next().unwrap_or(name);
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    Url::parse(trimmed)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Truncate a display alias to `max_len`, appending `...` when shortened.
pub fn truncate_alias(alias: &str, max_len: usize) -> String {
    if alias.chars().count() <= max_len {
        return alias.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let truncated: String = alias.chars().take(keep).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = "wss://relay.getalby.com/v1";

    #[test]
    fn parses_pubkey_and_repeated_relays_in_order() {
        let creds = "nostr+walletconnect://b889ff5b?relay=wss://one.example&relay=wss://two.example&secret=71a8c14c";
        let parsed = ParsedCredentials::parse(creds, DEFAULT).unwrap();
        assert_eq!(parsed.pubkey, "b889ff5b");
        assert_eq!(parsed.relays, vec!["wss://one.example", "wss://two.example"]);
        assert!(parsed.has_secret);
    }

    #[test]
    fn numbered_alternates_count_as_relays() {
        let creds =
            "nostr+walletconnect://ab?relay=wss://one.example&relay1=wss://two.example&relay2=wss://three.example";
        let parsed = ParsedCredentials::parse(creds, DEFAULT).unwrap();
        assert_eq!(
            parsed.relays,
            vec!["wss://one.example", "wss://two.example", "wss://three.example"]
        );
    }

    #[test]
    fn no_relays_yields_exactly_the_default() {
        let parsed =
            ParsedCredentials::parse("nostr+walletconnect://ab?secret=ff", DEFAULT).unwrap();
        assert_eq!(parsed.relays, vec![DEFAULT.to_string()]);
    }

    #[test]
    fn n_relays_yield_exactly_n_entries() {
        for n in 1..=5usize {
            let query: Vec<String> = (0..n)
                .map(|i| format!("relay=wss://r{i}.example"))
                .collect();
            let creds = format!("nostr+walletconnect://ab?{}", query.join("&"));
            let parsed = ParsedCredentials::parse(&creds, DEFAULT).unwrap();
            assert_eq!(parsed.relays.len(), n);
        }
    }

    #[test]
    fn empty_and_malformed_strings_are_rejected() {
        assert!(matches!(
            ParsedCredentials::parse("", DEFAULT),
            Err(SessionError::Credentials(_))
        ));
        assert!(matches!(
            ParsedCredentials::parse("   ", DEFAULT),
            Err(SessionError::Credentials(_))
        ));
        assert!(matches!(
            ParsedCredentials::parse("not a uri at all", DEFAULT),
            Err(SessionError::Credentials(_))
        ));
    }

    #[test]
    fn alias_prefers_text_before_at() {
        assert_eq!(extract_alias("alice@getalby.com"), Some("alice".to_string()));
        assert_eq!(
            extract_alias("nostr+walletconnect://b889ff5b?relay=wss://r.example"),
            Some("b889ff5b".to_string())
        );
        assert_eq!(extract_alias(""), None);
    }

    #[test]
    fn truncation_keeps_short_aliases_intact() {
        assert_eq!(truncate_alias("short", 20), "short");
        assert_eq!(
            truncate_alias("averyverylongaliasindeed", 10),
            "averyve..."
        );
    }
}
