use crate::tests::resources::test_client;
use crate::{ContentType, StorageClass, StorageKind, StorageReconciler, StorageRetrySettings};
use std::collections::BTreeSet;
use wiremock::{
    matchers::{body_string_contains, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn zfs_class(nodes: &[&str]) -> StorageClass {
    StorageClass {
        id: "tank-vm".to_string(),
        kind: StorageKind::Zfs {
            pool: "tank".to_string(),
            mount_point: None,
        },
        nodes: nodes.iter().map(|n| n.to_string()).collect(),
        content: BTreeSet::from([ContentType::Images, ContentType::RootDir]),
    }
}

#[tokio::test]
async fn create_sends_kind_specific_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/storage"))
        .and(body_string_contains("storage=tank-vm"))
        .and(body_string_contains("type=zfspool"))
        .and(body_string_contains("pool=tank"))
        .and(body_string_contains("content=images%2Crootdir"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = StorageReconciler::new(test_client(&server.uri()));
    reconciler.create(&zfs_class(&[])).await.unwrap();
}

#[tokio::test]
async fn create_lvmthin_sends_vg_and_thinpool() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/storage"))
        .and(body_string_contains("type=lvmthin"))
        .and(body_string_contains("vgname=pve"))
        .and(body_string_contains("thinpool=data"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let class = StorageClass {
        id: "local-thin".to_string(),
        kind: StorageKind::LvmThin {
            vg_name: "pve".to_string(),
            thinpool: "data".to_string(),
        },
        nodes: BTreeSet::new(),
        content: BTreeSet::from([ContentType::Images]),
    };
    let reconciler = StorageReconciler::new(test_client(&server.uri()));
    reconciler.create(&class).await.unwrap();
}

#[tokio::test]
async fn read_materialises_empty_node_restriction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/storage/tank-vm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "storage": "tank-vm",
                "type": "zfspool",
                "pool": "tank",
                "content": "images,rootdir"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                { "node": "pve1", "status": "online" },
                { "node": "pve2", "status": "online" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = StorageReconciler::new(test_client(&server.uri()));
    let class = reconciler.read("tank-vm").await.unwrap();
    let nodes: Vec<&str> = class.nodes.iter().map(String::as_str).collect();
    assert_eq!(nodes, vec!["pve1", "pve2"]);
    assert!(class.content.contains(&ContentType::Images));
}

#[tokio::test]
async fn read_keeps_explicit_node_restriction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/storage/tank-vm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "storage": "tank-vm",
                "type": "zfspool",
                "pool": "tank",
                "nodes": "pve1",
                "content": "images"
            }
        })))
        .mount(&server)
        .await;

    let reconciler = StorageReconciler::new(test_client(&server.uri()));
    let class = reconciler.read("tank-vm").await.unwrap();
    assert_eq!(class.nodes.len(), 1);
    assert!(class.nodes.contains("pve1"));
}

#[tokio::test]
async fn zfs_pool_create_retries_until_visible() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/disks/zfs"))
        .and(body_string_contains("name=tank"))
        .and(body_string_contains("raidlevel=mirror"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": "UPID:pve1:zfscreate"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    // Absent on the first list, visible on the second.
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/disks/zfs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/disks/zfs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{ "name": "tank", "health": "ONLINE" }]
        })))
        .mount(&server)
        .await;

    let reconciler = StorageReconciler::new(test_client(&server.uri()));
    let pool = reconciler
        .create_zfs_pool(
            "pve1",
            "tank",
            &["/dev/sda".to_string(), "/dev/sdb".to_string()],
            "mirror",
        )
        .await
        .unwrap();
    assert_eq!(pool.name, "tank");
    assert_eq!(pool.health.as_deref(), Some("ONLINE"));
}

#[tokio::test]
async fn missing_pool_exhausts_budget_as_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/disks/lvmthin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": "UPID:pve1:lvmthin"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/disks/lvmthin"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
        )
        .mount(&server)
        .await;

    let reconciler = StorageReconciler::new(test_client(&server.uri())).with_retry_settings(
        StorageRetrySettings {
            lvm_thin_attempts: 1,
            zfs_attempts: 1,
        },
    );
    let result = reconciler.create_lvm_thinpool("pve1", "data", "/dev/sdc").await;
    assert!(matches!(result, Err(crate::PveError::NotFound(_))));
}

#[tokio::test]
async fn delete_disk_pool_passes_cleanup_flag() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve1/disks/zfs/tank"))
        .and(query_param("cleanup-disks", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": "UPID:pve1:zfsremove"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = StorageReconciler::new(test_client(&server.uri()));
    reconciler.delete_disk_pool("pve1", "zfs", "tank").await.unwrap();
}

#[tokio::test]
async fn delete_storage_class() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/storage/tank-vm"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = StorageReconciler::new(test_client(&server.uri()));
    reconciler.delete("tank-vm").await.unwrap();
}
