use crate::tests::resources::{non_root_client, test_client};
use crate::{
    CloudInitConfig, CloudInitIp, CreateSource, Disk, DiskInterface, DiskSize, DiskSpeedLimits,
    IpSpec, MacAddress, Nic, NicModel, OperationTimeouts, PveError, VmId, VmReconciler, VmSpec,
};
use crate::core::domain::value_object::BridgeName;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn disk(position: u8, gib: u64, volume: Option<&str>) -> Disk {
    Disk {
        interface: DiskInterface::Scsi,
        position,
        storage: "local-lvm".to_string(),
        volume: volume.map(str::to_string),
        format: None,
        size: DiskSize::from_gib(gib),
        discard: false,
        ssd: false,
        iothread: false,
        speed: DiskSpeedLimits::default(),
    }
}

fn nic0() -> Nic {
    Nic {
        position: 0,
        model: NicModel::Virtio,
        bridge: BridgeName::new_unchecked("vmbr0"),
        mac: Some(MacAddress::new_unchecked("BC:24:11:AA:BB:CC")),
        enabled: true,
        firewall: false,
        vlan: None,
        rate_limit: None,
        mtu: None,
    }
}

fn unlocked_status(server_path: &str, status: &str) -> Mock {
    Mock::given(method("GET"))
        .and(path(server_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "status": status }
        })))
}

#[tokio::test]
async fn clone_lifecycle_converges_and_second_reconcile_is_noop() {
    let server = MockServer::start().await;
    let client = test_client(&server.uri());

    // Clone acknowledgement; the guest is briefly locked, then settles.
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/9000/clone"))
        .and(body_string_contains("newid=100"))
        .and(body_string_contains("full=1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": "UPID:pve1:clone"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    unlocked_status("/api2/json/nodes/pve1/qemu/100/status/current", "stopped")
        .mount(&server)
        .await;

    // First config read: the template baseline the clone produced.
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "name": "tmpl-ubuntu",
                "memory": 2048,
                "cores": 2,
                "scsi0": "local-lvm:vm-100-disk-0,size=10G",
                "net0": "virtio=BC:24:11:AA:BB:CC,bridge=vmbr0"
            }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // Configuration update: renames the guest and grows memory.
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .and(body_string_contains("name=web-1"))
        .and(body_string_contains("memory=4096"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    // One dedicated resize call for the grown disk.
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/qemu/100/resize"))
        .and(body_string_contains("disk=scsi0"))
        .and(body_string_contains("size=20G"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Every later config read observes the converged guest.
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "name": "web-1",
                "memory": 4096,
                "cores": 2,
                "scsi0": "local-lvm:vm-100-disk-0,size=20G",
                "net0": "virtio=BC:24:11:AA:BB:CC,bridge=vmbr0"
            }
        })))
        .mount(&server)
        .await;

    let mut plan = VmSpec::new("pve1", VmId::new_unchecked(100));
    plan.create_source = Some(CreateSource::Clone {
        source: VmId::new_unchecked(9000),
        full: true,
        storage: None,
    });
    plan.name = Some("web-1".to_string());
    plan.memory.dedicated = Some(4096);
    plan.cpu.cores = Some(2);
    plan.disks = vec![disk(0, 20, None)];
    plan.nics = vec![nic0()];

    let reconciler = VmReconciler::new(client);
    let state = reconciler.create(&plan).await.unwrap();
    assert_eq!(state.name.as_deref(), Some("web-1"));

    // Read back: template-derived values visible.
    let read = reconciler
        .read("pve1", VmId::new_unchecked(100))
        .await
        .unwrap();
    assert_eq!(read.config.name.as_deref(), Some("web-1"));
    assert_eq!(read.config.memory.dedicated, Some(4096));
    assert_eq!(read.config.cpu.cores, Some(2));

    // Second reconcile with the same plan is a no-op: the PUT mocks above
    // would over-consume their expected counts otherwise.
    let state2 = reconciler.update(&state, &plan).await.unwrap();
    assert_eq!(state2, state);
}

#[tokio::test]
async fn removed_disk_is_deleted_then_unused_volume_collected() {
    let server = MockServer::start().await;
    let client = test_client(&server.uri());

    unlocked_status("/api2/json/nodes/pve1/qemu/100/status/current", "stopped")
        .mount(&server)
        .await;

    // Live view before the update: both disks attached.
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "scsi0": "local-lvm:vm-100-disk-0,size=10G",
                "scsi1": "local-lvm:vm-100-disk-1,size=10G"
            }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // The detach parks the volume under unused0.
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .and(body_string_contains("delete=scsi1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "scsi0": "local-lvm:vm-100-disk-0,size=10G",
                "unused0": "local-lvm:vm-100-disk-1"
            }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // Follow-up cleanup of the parked volume.
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .and(body_string_contains("delete=unused0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "scsi0": "local-lvm:vm-100-disk-0,size=10G"
            }
        })))
        .mount(&server)
        .await;

    let mut state = VmSpec::new("pve1", VmId::new_unchecked(100));
    state.disks = vec![
        disk(0, 10, Some("vm-100-disk-0")),
        disk(1, 10, Some("vm-100-disk-1")),
    ];
    let mut plan = VmSpec::new("pve1", VmId::new_unchecked(100));
    plan.disks = vec![disk(0, 10, Some("vm-100-disk-0"))];

    let reconciler = VmReconciler::new(client);
    reconciler.update(&state, &plan).await.unwrap();
}

#[tokio::test]
async fn create_without_source_is_rejected() {
    let server = MockServer::start().await;
    let reconciler = VmReconciler::new(test_client(&server.uri()));

    let plan = VmSpec::new("pve1", VmId::new_unchecked(100));
    let result = reconciler.create(&plan).await;
    assert!(matches!(result, Err(PveError::Validation { .. })));
}

#[tokio::test]
async fn iso_create_attaches_cdrom() {
    let server = MockServer::start().await;
    let client = test_client(&server.uri());

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu"))
        .and(body_string_contains("vmid=100"))
        .and(body_string_contains("ide2=local%3Aiso%2Fdebian-12.iso%2Cmedia%3Dcdrom"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": "UPID:pve1:create"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    unlocked_status("/api2/json/nodes/pve1/qemu/100/status/current", "stopped")
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "ide2": "local:iso/debian-12.iso,media=cdrom" }
        })))
        .mount(&server)
        .await;

    let mut plan = VmSpec::new("pve1", VmId::new_unchecked(100));
    plan.create_source = Some(CreateSource::Iso {
        storage: "local".to_string(),
        image: "debian-12.iso".to_string(),
    });

    let reconciler = VmReconciler::new(client);
    reconciler.create(&plan).await.unwrap();
}

#[tokio::test]
async fn delete_stops_a_running_guest_first() {
    let server = MockServer::start().await;
    let client = test_client(&server.uri());

    // Running on the first status poll, stopped afterwards.
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/qemu/100/status/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "status": "running" }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/qemu/100/status/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "status": "stopped" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/100/status/stop"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": "UPID:pve1:stop"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve1/qemu/100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": "UPID:pve1:destroy"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = VmReconciler::new(client);
    reconciler
        .delete("pve1", VmId::new_unchecked(100), &OperationTimeouts::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn import_parses_node_slash_vmid() {
    let server = MockServer::start().await;
    let client = test_client(&server.uri());

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "name": "imported" }
        })))
        .mount(&server)
        .await;
    unlocked_status("/api2/json/nodes/pve1/qemu/100/status/current", "stopped")
        .mount(&server)
        .await;

    let reconciler = VmReconciler::new(client);
    let read = reconciler.import("pve1/100").await.unwrap();
    assert_eq!(read.config.name.as_deref(), Some("imported"));

    assert!(reconciler.import("pve1-100").await.is_err());
    assert!(reconciler.import("pve1/100/extra").await.is_err());
}

#[tokio::test]
async fn non_root_cannot_set_cloud_init_or_architecture() {
    let server = MockServer::start().await;
    let reconciler = VmReconciler::new(non_root_client(&server.uri()));

    let mut plan = VmSpec::new("pve1", VmId::new_unchecked(100));
    plan.create_source = Some(CreateSource::Iso {
        storage: "local".to_string(),
        image: "debian-12.iso".to_string(),
    });
    plan.cloud_init = Some(CloudInitConfig {
        ip_configs: vec![CloudInitIp {
            position: 0,
            v4: Some(IpSpec::Dhcp),
            v6: None,
        }],
        ..Default::default()
    });
    let result = reconciler.create(&plan).await;
    assert!(matches!(result, Err(PveError::Validation { .. })));

    let mut plan = VmSpec::new("pve1", VmId::new_unchecked(100));
    plan.create_source = Some(CreateSource::Iso {
        storage: "local".to_string(),
        image: "debian-12.iso".to_string(),
    });
    plan.cpu.architecture = Some("aarch64".to_string());
    let result = reconciler.create(&plan).await;
    assert!(matches!(result, Err(PveError::Validation { .. })));
}
