// Copyright 2022-Present Artillery Software Inc. https://www.artillery.io/
// SPDX-License-Identifier: MPL-2.0

//! Best-effort environment probes. Every lookup here either succeeds or is
//! absorbed by the caller with an empty-value fallback; nothing propagates.

pub mod os {
    pub fn real_hostname() -> anyhow::Result<String> {
        Ok(sys_info::hostname()?)
    }

    pub const fn os_name() -> &'static str {
        std::env::consts::OS
    }
}

pub mod net {
    use std::net::{IpAddr, UdpSocket};

    /// Learn the preferred outbound IP of this machine.
    ///
    /// Connects a UDP socket toward a well-known public address and reads
    /// the local endpoint back. No datagram is ever sent, so this works
    /// without any reachable network path as long as a route exists, and it
    /// never blocks: connect on UDP only records the peer address.
    pub fn preferred_outbound_ip() -> anyhow::Result<IpAddr> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(("8.8.8.8", 80))?;
        Ok(socket.local_addr()?.ip())
    }
}
