// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Firewall configuration.

use crate::api::Ipv4Addr;
use crate::api::PalisadeError;
use crate::engine::rule::RULE_TABLE_LIMIT;
use alloc::string::String;
use serde::Deserialize;
use serde::Serialize;

pub const DEF_INT_IFACE: &str = "enp0s8";
pub const DEF_EXT_IFACE: &str = "enp0s9";
pub const DEF_INT_ADDR: Ipv4Addr = Ipv4Addr::from_const([10, 1, 1, 3]);
pub const DEF_EXT_ADDR: Ipv4Addr = Ipv4Addr::from_const([10, 1, 2, 3]);
pub const DEF_HTTP_PROXY_PORT: u16 = 800;
pub const DEF_FTP_PROXY_PORT: u16 = 210;
pub const DEF_MAX_RULES: usize = 50;
pub const DEF_MAX_CONNS: usize = 8192;

/// The well-known port of flows redirected to the HTTP proxy.
pub const HTTP_PORT: u16 = 80;
/// The well-known port of flows redirected to the FTP proxy.
pub const FTP_PORT: u16 = 21;

/// Static configuration of a [`Firewall`].
///
/// Every key may be omitted from a TOML document, in which case the
/// default applies.
///
/// [`Firewall`]: crate::engine::firewall::Firewall
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FirewallCfg {
    /// The interface facing the protected network.
    pub int_iface: String,
    /// The interface facing the outside world.
    pub ext_iface: String,
    #[serde(with = "ip_str")]
    pub int_addr: Ipv4Addr,
    #[serde(with = "ip_str")]
    pub ext_addr: Ipv4Addr,
    pub http_proxy_port: u16,
    pub ftp_proxy_port: u16,
    pub max_rules: usize,
    pub max_conns: usize,
}

impl Default for FirewallCfg {
    fn default() -> Self {
        Self {
            int_iface: String::from(DEF_INT_IFACE),
            ext_iface: String::from(DEF_EXT_IFACE),
            int_addr: DEF_INT_ADDR,
            ext_addr: DEF_EXT_ADDR,
            http_proxy_port: DEF_HTTP_PROXY_PORT,
            ftp_proxy_port: DEF_FTP_PROXY_PORT,
            max_rules: DEF_MAX_RULES,
            max_conns: DEF_MAX_CONNS,
        }
    }
}

impl FirewallCfg {
    /// Parse and validate a TOML document.
    pub fn from_toml(doc: &str) -> Result<Self, PalisadeError> {
        let cfg: Self = toml::from_str(doc)
            .map_err(|e| PalisadeError::BadConfig(format!("{e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PalisadeError> {
        if self.int_iface == self.ext_iface {
            return Err(PalisadeError::BadConfig(format!(
                "internal and external interface are both {}",
                self.int_iface
            )));
        }

        if self.http_proxy_port == 0 || self.ftp_proxy_port == 0 {
            return Err(PalisadeError::BadConfig(String::from(
                "proxy port must be non-zero",
            )));
        }

        if self.http_proxy_port == self.ftp_proxy_port {
            return Err(PalisadeError::BadConfig(format!(
                "HTTP and FTP proxies share port {}",
                self.http_proxy_port
            )));
        }

        if self.max_rules == 0 || self.max_rules > RULE_TABLE_LIMIT {
            return Err(PalisadeError::BadConfig(format!(
                "max_rules must be in 1..={RULE_TABLE_LIMIT}",
            )));
        }

        Ok(())
    }

    /// Is `ip` one of the firewall's own addresses?
    pub fn is_own_addr(&self, ip: Ipv4Addr) -> bool {
        ip == self.int_addr || ip == self.ext_addr
    }
}

// Addresses are written in dotted-quad form in the config document.
mod ip_str {
    use crate::api::Ipv4Addr;
    use alloc::string::String;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        ip: &Ipv4Addr,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.collect_str(ip)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Ipv4Addr, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
