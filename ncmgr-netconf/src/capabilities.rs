//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

const URI_PREFIX: &str = "urn:ietf:params:netconf:";

// Known capability URIs, without the common prefix.
const CAPABILITY_URIS: [(Capabilities, &str); 9] = [
    (Capabilities::BASE_1_0, "base:1.0"),
    (Capabilities::BASE_1_1, "base:1.1"),
    (Capabilities::CANDIDATE, "capability:candidate:1.0"),
    (Capabilities::WRITABLE_RUNNING, "capability:writable-running:1.0"),
    (Capabilities::ROLLBACK_ON_ERROR, "capability:rollback-on-error:1.0"),
    (Capabilities::CONFIRMED_COMMIT, "capability:confirmed-commit:1.1"),
    (Capabilities::VALIDATE, "capability:validate:1.1"),
    (Capabilities::STARTUP, "capability:startup:1.0"),
    (Capabilities::XPATH, "capability:xpath:1.0"),
];

bitflags! {
    // NETCONF capabilities relevant to the transaction engine.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct Capabilities: u16 {
        const BASE_1_0 = 0x0001;
        const BASE_1_1 = 0x0002;
        const CANDIDATE = 0x0004;
        const WRITABLE_RUNNING = 0x0008;
        const ROLLBACK_ON_ERROR = 0x0010;
        const CONFIRMED_COMMIT = 0x0020;
        const VALIDATE = 0x0040;
        const STARTUP = 0x0080;
        const XPATH = 0x0100;
    }
}

// ===== impl Capabilities =====

impl Capabilities {
    // Parses the capability URIs advertised in a hello message. URIs that
    // don't name a protocol capability (e.g. YANG modules) are ignored.
    pub fn from_uris<I, S>(uris: I) -> Capabilities
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        uris.into_iter()
            .filter_map(|uri| {
                let uri = uri.as_ref();
                let uri = uri.split_once('?').map_or(uri, |(uri, _)| uri);
                let uri = uri.strip_prefix(URI_PREFIX)?;
                CAPABILITY_URIS
                    .iter()
                    .find(|(_, name)| *name == uri)
                    .map(|(capability, _)| *capability)
            })
            .fold(Capabilities::empty(), |caps, cap| caps | cap)
    }

    pub fn to_uris(&self) -> Vec<String> {
        CAPABILITY_URIS
            .iter()
            .filter(|(capability, _)| self.contains(*capability))
            .map(|(_, name)| format!("{}{}", URI_PREFIX, name))
            .collect()
    }
}
