//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//


use std::sync::Arc;
use std::time::Duration;

use ncmgr_netconf::capabilities::Capabilities;
use ncmgr_netconf::config::DeviceConfig;
use ncmgr_netconf::data::{DataNode, DataTree, InstancePath};
use ncmgr_netconf::device::Device;
use ncmgr_netconf::schema::StaticSchema;
use ncmgr_netconf::test::setup;
use ncmgr_netconf::test::stub::StubDevice;

//
// Helper functions.
//

fn schema() -> Arc<StaticSchema> {
    let schema = StaticSchema::builder()
        .container("/a")
        .leaf("/a/x")
        .leaf("/a/y")
        .container("/a/b")
        .leaf("/a/b/c")
        .container("/interfaces")
        .list("/interfaces/interface", &["name"])
        .leaf("/interfaces/interface/name")
        .leaf("/interfaces/interface/mtu")
        .leaf("/interfaces/interface/description")
        .container("/interfaces/interface/ipv4")
        .leaf_list("/interfaces/interface/ipv4/address")
        .build();
    Arc::new(schema)
}

fn path(path: &str) -> InstancePath {
    path.parse().unwrap()
}

fn interface(name: &str) -> DataNode {
    DataNode::container("interface").with_child(DataNode::leaf("name", name))
}

fn config() -> DeviceConfig {
    let mut config = DeviceConfig::default();
    config.reconnect.initial_delay = 10;
    config.reconnect.max_delay = 50;
    config
}

// Starts a simulated device and waits until the session is up.
async fn start(
    capabilities: Capabilities,
    running: DataTree,
    config: DeviceConfig,
) -> (StubDevice, Device) {
    setup();

    let schema = schema();
    let stub = StubDevice::new(schema.clone(), capabilities);
    stub.set_running(running);
    let device = Device::connect("r1", config, stub.connector(), schema, None);
    device.wait_up().await.unwrap();
    (stub, device)
}

// Polls the condition until it holds, for up to one second.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
