// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! Bitcoin network selection.
//!
//! The marketplace runs against regtest during development; the selected
//! network is persisted so the picker survives a restart.

use serde::{Deserialize, Serialize};

/// Networks the wallet session can operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkName {
    Mainnet,
    Testnet4,
    Regtest,
}

impl NetworkName {
    /// Parse a stored network name, falling back to regtest for anything
    /// unrecognized.
    pub fn parse_or_default(name: &str) -> Self {
        match name {
            "mainnet" => NetworkName::Mainnet,
            "testnet4" => NetworkName::Testnet4,
            _ => NetworkName::Regtest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkName::Mainnet => "mainnet",
            NetworkName::Testnet4 => "testnet4",
            NetworkName::Regtest => "regtest",
        }
    }
}

impl std::fmt::Display for NetworkName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display metadata for one selectable network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: NetworkName,
    pub display_name: &'static str,
    pub description: &'static str,
}

impl NetworkConfig {
    /// Metadata for a network name.
    pub fn for_network(name: NetworkName) -> Self {
        match name {
            NetworkName::Mainnet => NetworkConfig {
                name,
                display_name: "Bitcoin Mainnet",
                description: "Production Bitcoin network (Real money!)",
            },
            NetworkName::Testnet4 => NetworkConfig {
                name,
                display_name: "Bitcoin Testnet4",
                description: "Bitcoin test network (testnet4)",
            },
            NetworkName::Regtest => NetworkConfig {
                name,
                display_name: "Regtest",
                description: "Bitcoin Regtest for Lightning Network development",
            },
        }
    }

    /// All selectable networks, development-friendly first.
    pub fn all() -> Vec<NetworkConfig> {
        vec![
            NetworkConfig::for_network(NetworkName::Regtest),
            NetworkConfig::for_network(NetworkName::Testnet4),
            NetworkConfig::for_network(NetworkName::Mainnet),
        ]
    }
}
