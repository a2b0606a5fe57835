use crate::tests::resources::test_client;
use crate::{BondMode, BridgeName, NetworkBond, NetworkBridge, NetworkReconciler};
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn bridge(name: Option<&str>) -> NetworkBridge {
    NetworkBridge {
        node: "pve1".to_string(),
        name: name.map(BridgeName::new_unchecked),
        ports: vec!["eno1".to_string()],
        address: Some("10.0.0.2/24".to_string()),
        gateway: Some("10.0.0.1".to_string()),
        address6: None,
        gateway6: None,
        vlan_aware: true,
        autostart: true,
        comments: None,
    }
}

fn iface_list(names: &[(&str, &str)]) -> serde_json::Value {
    serde_json::json!({
        "data": names
            .iter()
            .map(|(iface, iface_type)| serde_json::json!({
                "iface": iface,
                "type": iface_type,
                "active": 1,
                "autostart": 1
            }))
            .collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn bridge_name_is_auto_allocated_from_existing_set() {
    let server = MockServer::start().await;

    // vmbr0 and vmbr1 taken; the allocator must pick vmbr2.
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(iface_list(&[
            ("eno1", "eth"),
            ("vmbr0", "bridge"),
            ("vmbr1", "bridge"),
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/network"))
        .and(body_string_contains("iface=vmbr2"))
        .and(body_string_contains("type=bridge"))
        .and(body_string_contains("bridge_vlan_aware=1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(iface_list(&[
            ("eno1", "eth"),
            ("vmbr0", "bridge"),
            ("vmbr1", "bridge"),
            ("vmbr2", "bridge"),
        ])))
        .mount(&server)
        .await;

    let reconciler = NetworkReconciler::new(test_client(&server.uri()));
    let name = reconciler.create_bridge(&bridge(None)).await.unwrap();
    assert_eq!(name.as_str(), "vmbr2");
}

#[tokio::test]
async fn explicit_bridge_name_is_used_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/network"))
        .and(body_string_contains("iface=vmbr7"))
        .and(body_string_contains("cidr=10.0.0.2%2F24"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(iface_list(&[("vmbr7", "bridge")])),
        )
        .mount(&server)
        .await;

    let reconciler = NetworkReconciler::new(test_client(&server.uri()));
    let name = reconciler
        .create_bridge(&bridge(Some("vmbr7")))
        .await
        .unwrap();
    assert_eq!(name.as_str(), "vmbr7");
}

#[tokio::test]
async fn bond_create_sends_mode_and_slaves() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(iface_list(&[("eno1", "eth")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/network"))
        .and(body_string_contains("iface=bond0"))
        .and(body_string_contains("type=bond"))
        .and(body_string_contains("bond_mode=active-backup"))
        .and(body_string_contains("slaves=eno1+eno2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(iface_list(&[("bond0", "bond")])),
        )
        .mount(&server)
        .await;

    let bond = NetworkBond {
        node: "pve1".to_string(),
        name: None,
        slaves: vec!["eno1".to_string(), "eno2".to_string()],
        mode: BondMode::ActiveBackup,
        hash_policy: None,
        primary: Some("eno1".to_string()),
        miimon: None,
        address: None,
        gateway: None,
        autostart: true,
        comments: None,
    };
    let reconciler = NetworkReconciler::new(test_client(&server.uri()));
    let name = reconciler.create_bond(&bond).await.unwrap();
    assert_eq!(name.as_str(), "bond0");
}

#[tokio::test]
async fn read_bridge_decodes_live_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "iface": "vmbr0",
                "type": "bridge",
                "active": 1,
                "autostart": 1,
                "bridge_ports": "eno1 eno2",
                "bridge_vlan_aware": 1,
                "cidr": "10.0.0.2/24",
                "gateway": "10.0.0.1"
            }]
        })))
        .mount(&server)
        .await;

    let reconciler = NetworkReconciler::new(test_client(&server.uri()));
    let bridge = reconciler.read_bridge("pve1/vmbr0").await.unwrap();
    assert_eq!(bridge.ports, vec!["eno1", "eno2"]);
    assert!(bridge.vlan_aware);
    assert_eq!(bridge.address.as_deref(), Some("10.0.0.2/24"));
    assert_eq!(bridge.gateway.as_deref(), Some("10.0.0.1"));
}

#[tokio::test]
async fn missing_iface_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let reconciler = NetworkReconciler::new(test_client(&server.uri()));
    let result = reconciler.read_bridge("pve1/vmbr9").await;
    assert!(matches!(result, Err(crate::PveError::NotFound(_))));
}

#[tokio::test]
async fn delete_commits_the_pending_change() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve1/network/vmbr2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = NetworkReconciler::new(test_client(&server.uri()));
    reconciler.delete("pve1", "vmbr2").await.unwrap();
}
