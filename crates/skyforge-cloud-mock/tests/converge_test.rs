//! Convergence and teardown against the in-memory cloud

use skyforge_cloud_mock::records::NetworkRecord;
use skyforge_cloud_mock::{Manifest, MockCloud, ResourceKind};
use skyforge_core::{
    ActionType, Backoff, DeletionPlanner, Error, Executor, RenderTarget, TaskKey,
};
use tokio_test::{assert_err, assert_ok};

const CLUSTER: &str = "dev.example.com";

const WEB: &str = r#"
networks:
  - name: vnet1
    cidr: 10.0.0.0/16
    enable_dns_hostnames: true
subnets:
  - name: sub1
    network: vnet1
    cidr: 10.0.1.0/24
    zone: zone-a
key_pairs:
  - name: admin
    public_key: ssh-ed25519 AAAA admin
security_groups:
  - name: web
    network: vnet1
    description: web traffic
    ingress:
      - { protocol: tcp, port: 443, cidr: 0.0.0.0/0 }
      - { protocol: tcp, port: 22, cidr: 10.0.0.0/8 }
instances:
  - name: vm1
    subnet: sub1
    image: img-ubuntu
    instance_type: small
    key_pair: admin
    security_groups: [web]
"#;

fn cloud() -> MockCloud {
    MockCloud::new(CLUSTER).with_backoff(Backoff::immediate(5), Backoff::immediate(5))
}

async fn converge(
    cloud: &MockCloud,
    manifest: &str,
) -> skyforge_core::Result<skyforge_core::ConvergeReport> {
    let graph = Manifest::parse(manifest)
        .and_then(|m| m.into_graph())
        .expect("manifest should be valid");
    Executor::new()
        .run(cloud, &graph, &mut RenderTarget::direct())
        .await
}

fn mutations(cloud: &MockCloud) -> Vec<String> {
    cloud.mutations().iter().map(|c| c.to_string()).collect()
}

#[tokio::test]
async fn test_creates_in_dependency_order() {
    let cloud = cloud();
    let report = assert_ok!(converge(&cloud, WEB).await);

    assert_eq!(report.summary().create, 5);
    let created = mutations(&cloud);
    let position = |call: &str| created.iter().position(|c| c == call).unwrap();
    assert!(position("create Network vnet1") < position("create Subnet sub1"));
    assert!(position("create Subnet sub1") < position("create Instance vm1"));
    assert!(position("create SecurityGroup web") < position("create Instance vm1"));
    assert!(position("create KeyPair admin") < position("create Instance vm1"));
}

#[tokio::test]
async fn test_second_pass_changes_nothing() {
    let cloud = cloud();
    assert_ok!(converge(&cloud, WEB).await);
    cloud.clear_calls();

    let report = assert_ok!(converge(&cloud, WEB).await);

    assert!(!report.has_changes());
    assert_eq!(report.summary().no_change, 5);
    assert!(mutations(&cloud).is_empty());
}

#[tokio::test]
async fn test_mutable_field_is_updated_in_place() {
    let cloud = cloud();
    assert_ok!(converge(&cloud, WEB).await);
    cloud.clear_calls();

    let resized = WEB.replace("instance_type: small", "instance_type: large");
    let report = assert_ok!(converge(&cloud, &resized).await);

    let updates = report.actions_by_type(ActionType::Update);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].task, TaskKey::new("Instance", "vm1"));
    assert_eq!(updates[0].changed_fields, vec!["instance_type"]);
    assert_eq!(mutations(&cloud), vec!["update Instance vm1"]);
}

#[tokio::test]
async fn test_immutable_field_change_is_refused() {
    let cloud = cloud();
    assert_ok!(converge(&cloud, WEB).await);
    cloud.clear_calls();

    let moved = WEB.replace("cidr: 10.0.1.0/24", "cidr: 10.0.2.0/24");
    let err = assert_err!(converge(&cloud, &moved).await);

    assert!(matches!(err, Error::CannotChangeField { field: "cidr", .. }));
    assert!(mutations(&cloud).is_empty());
}

#[tokio::test]
async fn test_missing_required_field() {
    let cloud = cloud();
    let err = assert_err!(converge(&cloud, "networks:\n  - name: vnet1\n").await);

    assert!(matches!(err, Error::RequiredField { field: "cidr", .. }));
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_cloudformation_refuses_security_groups_up_front() {
    let cloud = cloud();
    let graph = Manifest::parse(WEB).unwrap().into_graph().unwrap();

    let err = assert_err!(
        Executor::new()
            .run(&cloud, &graph, &mut RenderTarget::cloudformation())
            .await
    );

    match err {
        Error::UnsupportedTarget { task, .. } => {
            assert_eq!(task, TaskKey::new("SecurityGroup", "web"))
        }
        other => panic!("expected UnsupportedTarget, got {other:?}"),
    }
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_terraform_document_links_resources() {
    let cloud = cloud();
    let graph = Manifest::parse(WEB).unwrap().into_graph().unwrap();
    let mut target = RenderTarget::terraform();

    assert_ok!(Executor::new().run(&cloud, &graph, &mut target).await);

    let doc = target.document().unwrap().to_json().unwrap();
    let resources = &doc["resource"];
    assert_eq!(resources["aws_subnet"]["sub1"]["vpc_id"], "${aws_vpc.vnet1.id}");
    assert_eq!(resources["aws_instance"]["vm1"]["key_name"], "${aws_key_pair.admin.key_name}");
    assert_eq!(
        resources["aws_security_group"]["web"]["ingress"][0]["from_port"],
        22
    );
    assert_eq!(resources["aws_vpc"]["vnet1"]["tags"]["KubernetesCluster"], CLUSTER);
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_existing_network_diverges_with_warning() {
    let cloud = cloud();
    assert_ok!(converge(&cloud, "networks:\n  - name: vnet1\n    cidr: 10.0.0.0/16\n").await);
    cloud.clear_calls();

    let manifest = concat!(
        "networks:\n",
        "  - name: vnet1\n",
        "    cidr: 10.0.0.0/16\n",
        "    enable_dns_hostnames: true\n",
        "    lifecycle: exists_and_warn_if_changes\n",
    );
    let report = assert_ok!(converge(&cloud, manifest).await);

    assert_eq!(report.actions[0].action_type, ActionType::Warned);
    assert_eq!(report.actions[0].changed_fields, vec!["enable_dns_hostnames"]);
    assert!(mutations(&cloud).is_empty());
}

#[tokio::test]
async fn test_existing_network_must_exist() {
    let cloud = cloud();
    let manifest = concat!(
        "networks:\n",
        "  - name: vnet1\n",
        "    cidr: 10.0.0.0/16\n",
        "    lifecycle: exists_and_warn_if_changes\n",
    );

    let err = assert_err!(converge(&cloud, manifest).await);
    assert!(matches!(err, Error::MustExist { .. }));
}

#[tokio::test]
async fn test_denied_access_skips_tolerant_tasks() {
    let cloud = cloud();
    cloud.deny(ResourceKind::KeyPair);

    let manifest = concat!(
        "key_pairs:\n",
        "  - name: admin\n",
        "    public_key: k\n",
        "    lifecycle: warn_if_insufficient_access\n",
    );
    let report = assert_ok!(converge(&cloud, manifest).await);
    assert_eq!(report.actions[0].action_type, ActionType::Skipped);

    let strict = "key_pairs:\n  - name: admin\n    public_key: k\n";
    let err = assert_err!(converge(&cloud, strict).await);
    assert!(err.is_access_denied());
}

#[tokio::test]
async fn test_ignored_tasks_are_never_looked_up() {
    let cloud = cloud();
    let manifest = "networks:\n  - name: vnet1\n    lifecycle: ignore\n";

    let report = assert_ok!(converge(&cloud, manifest).await);
    assert_eq!(report.actions[0].action_type, ActionType::Skipped);
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_throttled_calls_are_retried() {
    let cloud = cloud();
    cloud.throttle(ResourceKind::Network, 3);

    let manifest = "networks:\n  - name: vnet1\n    cidr: 10.0.0.0/16\n";
    let report = assert_ok!(converge(&cloud, manifest).await);
    assert_eq!(report.summary().create, 1);
    assert_eq!(cloud.len(), 1);
}

#[tokio::test]
async fn test_teardown_respects_references_and_shared_resources() {
    let cloud = cloud();
    assert_ok!(converge(&cloud, WEB).await);
    cloud
        .create(NetworkRecord {
            name: "legacy".into(),
            cidr: "192.168.0.0/16".into(),
            ..Default::default()
        })
        .unwrap();

    let report = assert_ok!(
        DeletionPlanner::new()
            .with_backoff(Backoff::immediate(3))
            .teardown(&cloud, CLUSTER)
            .await
    );

    let deleted: Vec<String> = report
        .deleted
        .iter()
        .map(|key| key.resource_type.clone())
        .collect();
    assert_eq!(deleted.len(), 5);
    assert_eq!(deleted[0], "Instance");
    assert_eq!(deleted[4], "Network");
    assert_eq!(report.passes, 3);
    assert_eq!(report.skipped_shared.len(), 1);

    assert_eq!(cloud.len(), 1);
    assert_eq!(
        mutations(&cloud).last().map(String::as_str),
        Some("delete Network vnet1")
    );
}
