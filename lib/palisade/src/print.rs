// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Print command responses in human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both administrative tooling and integration tests.

use crate::api::DumpConnsResp;
use crate::api::DumpRulesResp;
use crate::api::port_string;
use std::io::Write;
use tabwriter::TabWriter;

/// Print a [`DumpRulesResp`].
pub fn print_rules(resp: &DumpRulesResp) -> std::io::Result<()> {
    print_rules_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpRulesResp`] into a given writer.
pub fn print_rules_into(
    writer: &mut impl Write,
    resp: &DumpRulesResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    let state = if resp.active { "active" } else { "inactive" };
    writeln!(t, "Rule table ({state}, {} rules)", resp.rules.len())?;
    write_hrb(&mut t)?;
    writeln!(
        t,
        "IDX\tNAME\tDIR\tSRC\tDST\tPROTO\tSPORT\tDPORT\tACK\tACTION"
    )?;
    write_hr(&mut t)?;

    for (idx, rule) in resp.rules.iter().enumerate() {
        writeln!(
            t,
            "{idx}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            rule.name,
            rule.direction,
            rule.src,
            rule.dst,
            rule.protocol,
            port_string(rule.src_port),
            port_string(rule.dst_port),
            rule.ack,
            rule.action,
        )?;
    }

    writeln!(t)?;
    t.flush()
}

/// Print a [`DumpConnsResp`].
pub fn print_conns(resp: &DumpConnsResp) -> std::io::Result<()> {
    print_conns_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpConnsResp`] into a given writer.
pub fn print_conns_into(
    writer: &mut impl Write,
    resp: &DumpConnsResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Connections: {}", resp.conns.len())?;
    write_hrb(&mut t)?;
    writeln!(t, "INTERNAL\tEXTERNAL\tTYPE\tSTATUS\tSTATE\tPROXY PORT")?;
    write_hr(&mut t)?;

    for conn in &resp.conns {
        let proxy_port = match conn.proxy_port {
            Some(port) => format!("{port}"),
            None => String::from("--"),
        };

        writeln!(
            t,
            "{}\t{}\t{}\t{}\t{}\t{proxy_port}",
            conn.internal_id,
            conn.external_id,
            conn.conn_type,
            conn.status,
            conn.public_state,
        )?;
    }

    writeln!(t)?;
    t.flush()
}

/// Output a horizontal rule in bold to the given writer.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Output a horizontal rule to the given writer.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Action;
    use crate::api::ConnDump;
    use crate::api::ConnId;
    use crate::api::ConnType;
    use crate::api::Direction;
    use crate::api::Ipv4Addr;
    use crate::api::PORT_ABOVE_1023;
    use crate::api::PublicState;
    use crate::api::Rule;
    use crate::api::RuleName;
    use crate::api::RuleProto;
    use crate::api::TcpStatus;

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
    {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn rules_table() {
        let rule = Rule::any(
            RuleName::new("http_out").unwrap(),
            Direction::OUT,
            Action::Accept,
        )
        .with_dst(Ipv4Addr::from([93, 184, 216, 34]), 32)
        .with_proto(RuleProto::TCP)
        .with_ports(PORT_ABOVE_1023, 80);
        let resp = DumpRulesResp { active: true, rules: vec![rule] };

        let out = render(|w| print_rules_into(w, &resp));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Rule table (active, 1 rules)");
        assert!(lines[2].starts_with("IDX"));

        let row: Vec<&str> = lines[4].split_whitespace().collect();
        assert_eq!(
            row,
            [
                "0",
                "http_out",
                "out",
                "any",
                "93.184.216.34/32",
                "tcp",
                ">1023",
                "80",
                "any",
                "accept"
            ]
        );
    }

    #[test]
    fn conns_table() {
        let resp = DumpConnsResp {
            conns: vec![ConnDump {
                internal_id: ConnId::new(
                    Ipv4Addr::from([10, 0, 0, 5]),
                    53211,
                ),
                external_id: ConnId::new(
                    Ipv4Addr::from([93, 184, 216, 34]),
                    80,
                ),
                conn_type: ConnType::ProxyHttp,
                status: TcpStatus::Established,
                public_state: PublicState::Proxy,
                proxy_port: Some(40001),
            }],
        };

        let out = render(|w| print_conns_into(w, &resp));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Connections: 1");
        let row: Vec<&str> = lines[4].split_whitespace().collect();
        assert_eq!(
            row,
            [
                "10.0.0.5:53211",
                "93.184.216.34:80",
                "proxy-http",
                "ESTABLISHED",
                "PROXY",
                "40001"
            ]
        );
    }

    #[test]
    fn inactive_and_empty() {
        let resp = DumpRulesResp { active: false, rules: vec![] };
        let out = render(|w| print_rules_into(w, &resp));
        assert!(out.starts_with("Rule table (inactive, 0 rules)"));

        let resp = DumpConnsResp { conns: vec![] };
        let out = render(|w| print_conns_into(w, &resp));
        assert!(out.starts_with("Connections: 0"));
    }
}
