// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! Offline bolt11 invoice validation.
//!
//! Decodes amount, description, and expiry from the bech32 text encoding
//! without any network call, so the UI can sanity-check an invoice before
//! handing it to the wallet. Signature verification is left to the wallet
//! client at payment time; this module only reads fields.
//!
//! Layout of the data part (5-bit groups): a 35-bit timestamp, tagged
//! fields (`type`, 10-bit length, payload), and a trailing 104-group
//! signature which is skipped here.

use std::time::{SystemTime, UNIX_EPOCH};

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Fe32};

use crate::models::InvoiceInfo;

/// Expiry applied when the invoice carries no `x` field, per the encoding's
/// defaults.
const DEFAULT_EXPIRY_SECS: u64 = 3600;

/// Groups occupied by the trailing signature (520 bits).
const SIGNATURE_GROUPS: usize = 104;

/// Groups occupied by the leading timestamp (35 bits).
const TIMESTAMP_GROUPS: usize = 7;

const TAG_DESCRIPTION: u8 = 13; // 'd'
const TAG_EXPIRY: u8 = 6; // 'x'

/// Validate an invoice against the current wall clock.
pub fn validate_invoice(invoice: &str) -> InvoiceInfo {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    validate_invoice_at(invoice, now)
}

/// Validate an invoice against an explicit unix timestamp.
pub fn validate_invoice_at(invoice: &str, now_unix: u64) -> InvoiceInfo {
    let trimmed = invoice.trim();
    if trimmed.is_empty() {
        return InvoiceInfo {
            valid: false,
            expired: false,
            error_message: Some("Invoice cannot be empty".to_string()),
            ..InvoiceInfo::default()
        };
    }

    match decode_fields(trimmed) {
        Ok(fields) => {
            let expiry = fields.expiry_secs.unwrap_or(DEFAULT_EXPIRY_SECS);
            let expired = fields.timestamp.saturating_add(expiry) < now_unix;
            InvoiceInfo {
                valid: true,
                expired,
                amount_msat: fields.amount_msat,
                description: fields.description,
                error_message: None,
            }
        }
        Err(reason) => InvoiceInfo {
            valid: false,
            expired: false,
            error_message: Some(format!("Failed to decode invoice: {reason}")),
            ..InvoiceInfo::default()
        },
    }
}

struct DecodedFields {
    timestamp: u64,
    amount_msat: Option<u64>,
    description: Option<String>,
    expiry_secs: Option<u64>,
}

fn decode_fields(invoice: &str) -> Result<DecodedFields, String> {
    let checked =
        CheckedHrpstring::new::<Bech32>(invoice).map_err(|e| format!("bad bech32: {e}"))?;

    let hrp = checked.hrp().to_string().to_lowercase();
    let amount_msat = parse_hrp_amount(&hrp)?;

    let data: Vec<u8> = checked
        .fe32_iter::<std::vec::IntoIter<u8>>()
        .map(Fe32::to_u8)
        .collect();
    if data.len() < TIMESTAMP_GROUPS + SIGNATURE_GROUPS {
        return Err("data part too short".to_string());
    }

    let timestamp = data[..TIMESTAMP_GROUPS]
        .iter()
        .fold(0u64, |acc, &g| (acc << 5) | u64::from(g));

    let mut description = None;
    let mut expiry_secs = None;

    let fields_end = data.len() - SIGNATURE_GROUPS;
    let mut i = TIMESTAMP_GROUPS;
    while i + 3 <= fields_end {
        let tag = data[i];
        let size = (usize::from(data[i + 1]) << 5) | usize::from(data[i + 2]);
        let payload_start = i + 3;
        let payload_end = payload_start + size;
        if payload_end > fields_end {
            return Err("tagged field overruns data part".to_string());
        }
        let payload = &data[payload_start..payload_end];

        match tag {
            TAG_DESCRIPTION if description.is_none() => {
                let bytes = groups_to_bytes(payload);
                description = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            TAG_EXPIRY if expiry_secs.is_none() => {
                expiry_secs = Some(
                    payload
                        .iter()
                        .fold(0u64, |acc, &g| (acc << 5) | u64::from(g)),
                );
            }
            _ => {}
        }

        i = payload_end;
    }

    Ok(DecodedFields {
        timestamp,
        amount_msat,
        description,
        expiry_secs,
    })
}

/// Amount from the human-readable part: `ln`, a currency prefix, then an
/// optional integer with a magnitude suffix.
fn parse_hrp_amount(hrp: &str) -> Result<Option<u64>, String> {
    let rest = hrp
        .strip_prefix("ln")
        .ok_or_else(|| "not a lightning invoice".to_string())?;

    // Skip the currency prefix (bc, tb, bcrt, ...): everything up to the
    // first digit is currency.
    let amount_part = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if amount_part.is_empty() {
        return Ok(None);
    }

    let parse = |digits: &str| -> Result<u64, String> {
        digits
            .parse()
            .map_err(|_| format!("bad amount '{amount_part}'"))
    };

    // 1 BTC = 100_000_000_000 msat.
    let msat = if let Some(digits) = amount_part.strip_suffix('m') {
        parse(digits)?.checked_mul(100_000_000)
    } else if let Some(digits) = amount_part.strip_suffix('u') {
        parse(digits)?.checked_mul(100_000)
    } else if let Some(digits) = amount_part.strip_suffix('n') {
        parse(digits)?.checked_mul(100)
    } else if let Some(digits) = amount_part.strip_suffix('p') {
        let base = parse(digits)?;
        if base % 10 != 0 {
            return Err("sub-millisatoshi amount".to_string());
        }
        Some(base / 10)
    } else {
        parse(amount_part)?.checked_mul(100_000_000_000)
    };

    msat.map(Some).ok_or_else(|| "amount overflow".to_string())
}

/// Repack 5-bit groups into bytes, dropping the trailing pad bits.
fn groups_to_bytes(groups: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(groups.len() * 5 / 8);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for &g in groups {
        acc = (acc << 5) | u32::from(g);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            bytes.push((acc >> bits) as u8);
        }
    }
    bytes
}
