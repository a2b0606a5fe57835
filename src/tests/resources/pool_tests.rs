use crate::tests::resources::test_client;
use crate::{PoolMember, PoolMemberKind, PoolReconciler, ResourcePool};
use std::collections::BTreeSet;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn member(kind: PoolMemberKind, id: &str) -> PoolMember {
    PoolMember {
        kind,
        id: id.to_string(),
    }
}

#[tokio::test]
async fn create_registers_pool_and_members() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/pools"))
        .and(body_string_contains("poolid=prod"))
        .and(body_string_contains("comment=production"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/pools/prod"))
        .and(body_string_contains("delete=0"))
        .and(body_string_contains("vms=100"))
        .and(body_string_contains("storage=local-lvm"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pool = ResourcePool {
        id: "prod".to_string(),
        comment: Some("production".to_string()),
        members: BTreeSet::from([
            member(PoolMemberKind::Qemu, "100"),
            member(PoolMemberKind::Storage, "local-lvm"),
        ]),
    };
    let reconciler = PoolReconciler::new(test_client(&server.uri()));
    reconciler.create(&pool).await.unwrap();
}

#[tokio::test]
async fn read_decodes_membership() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/pools/prod"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "comment": "production",
                "members": [
                    { "type": "qemu", "vmid": 100, "node": "pve1" },
                    { "type": "qemu", "vmid": 101, "node": "pve1" },
                    { "type": "storage", "storage": "local-lvm", "node": "pve1" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let reconciler = PoolReconciler::new(test_client(&server.uri()));
    let pool = reconciler.read("prod").await.unwrap();
    assert_eq!(pool.comment.as_deref(), Some("production"));
    assert_eq!(pool.vm_members(), vec!["100", "101"]);
    assert_eq!(pool.storage_members(), vec!["local-lvm"]);
}

#[tokio::test]
async fn update_removes_then_adds_with_correct_delete_flags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/pools/prod"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "comment": "production",
                "members": [
                    { "type": "qemu", "vmid": 100, "node": "pve1" }
                ]
            }
        })))
        .mount(&server)
        .await;
    // 100 leaves with delete=1, 200 joins with delete=0.
    Mock::given(method("PUT"))
        .and(path("/api2/json/pools/prod"))
        .and(body_string_contains("delete=1"))
        .and(body_string_contains("vms=100"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/pools/prod"))
        .and(body_string_contains("delete=0"))
        .and(body_string_contains("vms=200"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pool = ResourcePool {
        id: "prod".to_string(),
        comment: Some("production".to_string()),
        members: BTreeSet::from([member(PoolMemberKind::Qemu, "200")]),
    };
    let reconciler = PoolReconciler::new(test_client(&server.uri()));
    reconciler.update(&pool).await.unwrap();
}

#[tokio::test]
async fn delete_detaches_members_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/pools/prod"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "members": [
                    { "type": "qemu", "vmid": 100, "node": "pve1" }
                ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/pools/prod"))
        .and(body_string_contains("delete=1"))
        .and(body_string_contains("vms=100"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/pools/prod"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = PoolReconciler::new(test_client(&server.uri()));
    reconciler.delete("prod").await.unwrap();
}
