//! Credential provisioning over the `influxdb` relation, provider to consumer.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::ServerFixture;
use influxdb_operator::config::OperatorConfig;
use influxdb_operator::credentials::relation_secret_label;
use influxdb_operator::events::{ActionRequest, Event, EventHandler, HandlerOutcome, RelationEvent};
use influxdb_operator::host::{Host, LocalHost, RelationId};
use influxdb_operator::influxdb::{AdminOperation, Privilege};
use influxdb_operator::operator::{InfluxDbClientOperator, InfluxDbOperator, OperatorState};
use influxdb_operator::relation::{ClientState, RelationPhase, CREDS_SECRET_ID_KEY};
use influxdb_operator::scheduler::{BackoffPolicy, EventScheduler};
use influxdb_operator::secrets::{GrantedSecretView, SecretId, SecretLookup, SecretStore};

const PEER_ADDRESS: &str = "10.0.0.7";

fn joined(relation: RelationId) -> Event {
    Event::RelationJoined(RelationEvent {
        relation,
        relation_name: "influxdb".into(),
        remote_app: "grafana".into(),
    })
}

async fn installed_operator(fixture: &ServerFixture) -> InfluxDbOperator {
    fixture.host.set_binding("influxdb-peer", PEER_ADDRESS).await;
    let mut operator = fixture.operator(OperatorState::default());
    assert_eq!(operator.handle(&Event::Install).await, HandlerOutcome::Done);
    operator
}

async fn published_id(host: &LocalHost, relation: RelationId) -> Option<String> {
    host.relation_data(relation, "influxdb")
        .await
        .unwrap()
        .and_then(|d| d.get(CREDS_SECRET_ID_KEY).cloned())
}

#[tokio::test]
async fn test_join_provisions_scoped_user_and_database() {
    let fixture = ServerFixture::new();
    let mut operator = installed_operator(&fixture).await;
    let relation = fixture.host.add_relation("influxdb", "grafana").await;

    assert_eq!(operator.handle(&joined(relation)).await, HandlerOutcome::Done);
    assert_eq!(operator.state().relations.get(&relation), Some(&RelationPhase::Provisioned));

    let raw_id = published_id(&fixture.host, relation).await.expect("reference published");
    let id = SecretId::parse(&raw_id).unwrap();
    assert!(fixture.secrets.is_granted(&id, relation).await);

    let content = fixture.secrets.get(&SecretLookup::from(&id), true).await.unwrap();
    let username = content.get("username").unwrap().expose_secret().to_string();
    let password = content.get("password").unwrap().expose_secret().to_string();
    let database = content.get("database").unwrap().expose_secret().to_string();
    assert_eq!(content.get("host").unwrap().expose_secret(), PEER_ADDRESS);
    assert_eq!(content.get("port").unwrap().expose_secret(), "8086");
    assert_eq!(content.get("policy").unwrap().expose_secret(), "default");

    assert!(fixture.influx.accepts(&username, &password));
    assert!(fixture.influx.has_database(&database));
    assert_eq!(fixture.influx.privilege(&username, &database), Some(Privilege::All));
    let policy = fixture.influx.policy(&database).unwrap();
    assert_eq!(policy.duration, "7d");
    assert!(policy.default);
}

#[tokio::test]
async fn test_join_before_install_is_deferred_until_installed() {
    let fixture = ServerFixture::new();
    fixture.host.set_binding("influxdb-peer", PEER_ADDRESS).await;
    let relation = fixture.host.add_relation("influxdb", "grafana").await;
    let mut operator = fixture.operator(OperatorState::default());
    let mut scheduler = EventScheduler::new(BackoffPolicy::default());
    let now = Utc::now();

    let report = scheduler.dispatch(&mut operator, joined(relation), now).await;
    assert_eq!(report.deferred, 1);
    assert_eq!(operator.state().relations.get(&relation), Some(&RelationPhase::Joined));
    assert!(published_id(&fixture.host, relation).await.is_none());
    assert_eq!(fixture.influx.database_count(), 0);

    scheduler.dispatch(&mut operator, Event::Install, now).await;
    let report = scheduler.run_until_idle(&mut operator, now + Duration::minutes(1)).await;
    assert_eq!(report.handled, 1);
    assert!(published_id(&fixture.host, relation).await.is_some());
    assert_eq!(fixture.influx.database_count(), 1);
}

#[tokio::test]
async fn test_missing_binding_defers_without_server_changes() {
    let fixture = ServerFixture::new();
    let mut operator = installed_operator(&fixture).await;
    fixture.host.remove_binding("influxdb-peer").await;
    let relation = fixture.host.add_relation("influxdb", "grafana").await;

    assert_eq!(operator.handle(&joined(relation)).await, HandlerOutcome::Retry);
    assert_eq!(fixture.influx.user_count(), 1);
    assert_eq!(fixture.influx.database_count(), 0);
    assert!(published_id(&fixture.host, relation).await.is_none());
}

#[tokio::test]
async fn test_provisioning_failure_rolls_back_and_publishes_nothing() {
    let fixture = ServerFixture::new();
    let mut operator = installed_operator(&fixture).await;
    let relation = fixture.host.add_relation("influxdb", "grafana").await;

    fixture.influx.fail_on(AdminOperation::GrantPrivilege);
    assert_eq!(operator.handle(&joined(relation)).await, HandlerOutcome::Retry);

    // Only the admin user remains, and no database.
    assert_eq!(fixture.influx.user_count(), 1);
    assert_eq!(fixture.influx.database_count(), 0);
    assert!(published_id(&fixture.host, relation).await.is_none());
    assert!(fixture.secrets.find_by_label(&relation_secret_label("grafana")).await.unwrap().is_none());

    fixture.influx.clear_failures();
    assert_eq!(operator.handle(&joined(relation)).await, HandlerOutcome::Done);
    assert!(published_id(&fixture.host, relation).await.is_some());
}

#[tokio::test]
async fn test_replayed_join_does_not_provision_twice() {
    let fixture = ServerFixture::new();
    let mut operator = installed_operator(&fixture).await;
    let relation = fixture.host.add_relation("influxdb", "grafana").await;

    operator.handle(&joined(relation)).await;
    let first = published_id(&fixture.host, relation).await;
    operator.handle(&joined(relation)).await;

    assert_eq!(published_id(&fixture.host, relation).await, first);
    assert_eq!(fixture.influx.user_count(), 2);
    assert_eq!(fixture.influx.database_count(), 1);
}

#[tokio::test]
async fn test_non_leader_ignores_join() {
    let fixture = ServerFixture::new();
    let mut operator = installed_operator(&fixture).await;
    let relation = fixture.host.add_relation("influxdb", "grafana").await;
    fixture.host.set_leader(false).await;

    assert_eq!(operator.handle(&joined(relation)).await, HandlerOutcome::Done);
    assert!(operator.state().relations.is_empty());
    assert_eq!(fixture.influx.database_count(), 0);
}

#[tokio::test]
async fn test_other_relation_names_are_ignored() {
    let fixture = ServerFixture::new();
    let mut operator = installed_operator(&fixture).await;
    let relation = fixture.host.add_relation("metrics-endpoint", "prometheus").await;
    let event = Event::RelationJoined(RelationEvent {
        relation,
        relation_name: "metrics-endpoint".into(),
        remote_app: "prometheus".into(),
    });

    assert_eq!(operator.handle(&event).await, HandlerOutcome::Done);
    assert_eq!(fixture.influx.database_count(), 0);
}

#[tokio::test]
async fn test_broken_clears_reference_but_keeps_resources() {
    let fixture = ServerFixture::new();
    let mut operator = installed_operator(&fixture).await;
    let relation = fixture.host.add_relation("influxdb", "grafana").await;
    operator.handle(&joined(relation)).await;

    let broken = Event::RelationBroken(RelationEvent {
        relation,
        relation_name: "influxdb".into(),
        remote_app: "grafana".into(),
    });
    assert_eq!(operator.handle(&broken).await, HandlerOutcome::Done);

    assert!(published_id(&fixture.host, relation).await.is_none());
    assert_eq!(operator.state().relations.get(&relation), Some(&RelationPhase::Broken));
    assert_eq!(fixture.influx.database_count(), 1);
    assert!(fixture.secrets.find_by_label(&relation_secret_label("grafana")).await.unwrap().is_some());
}

/// Provider and consumer units sharing one secret backend.
#[tokio::test]
async fn test_consumer_receives_and_refreshes_credentials() {
    let fixture = ServerFixture::new();
    let mut provider = installed_operator(&fixture).await;
    let relation = fixture.host.add_relation("influxdb", "grafana").await;
    provider.handle(&joined(relation)).await;
    let raw_id = published_id(&fixture.host, relation).await.unwrap();

    // The consumer sees the provider's application data as remote data.
    let consumer_host = LocalHost::new("grafana");
    let consumer_relation = consumer_host.add_relation("influxdb", "influxdb").await;
    consumer_host.set_remote_data(consumer_relation, CREDS_SECRET_ID_KEY, &raw_id).await.unwrap();

    // Relation ids are per model; the grant was recorded under the provider's id.
    let view = GrantedSecretView::new(fixture.secrets.clone(), [relation]);
    let mut consumer = InfluxDbClientOperator::new(
        OperatorConfig::default(),
        Arc::new(consumer_host.clone()),
        Arc::new(view),
        ClientState::default(),
    );

    consumer.handle(&Event::Install).await;
    let changed = Event::RelationChanged(RelationEvent {
        relation: consumer_relation,
        relation_name: "influxdb".into(),
        remote_app: "influxdb".into(),
    });
    assert_eq!(consumer.handle(&changed).await, HandlerOutcome::Done);

    let creds = consumer.run_action(&ActionRequest::new("get-influxdb-creds")).await;
    let username = creds["username"].as_str().unwrap().to_string();
    let password = creds["password"].as_str().unwrap().to_string();
    assert!(fixture.influx.accepts(&username, &password));

    // A provider-side update is visible on the next read.
    let id = SecretId::parse(&raw_id).unwrap();
    let mut content = fixture.secrets.get(&SecretLookup::from(&id), true).await.unwrap();
    content.insert("password", "rotated-password");
    fixture.secrets.set_content(&id, content).await.unwrap();

    let creds = consumer.run_action(&ActionRequest::new("get-influxdb-creds")).await;
    assert_eq!(creds["password"].as_str(), Some("rotated-password"));
}

#[tokio::test]
async fn test_consumer_without_grant_cannot_read() {
    let fixture = ServerFixture::new();
    let mut provider = installed_operator(&fixture).await;
    let relation = fixture.host.add_relation("influxdb", "grafana").await;
    provider.handle(&joined(relation)).await;
    let raw_id = published_id(&fixture.host, relation).await.unwrap();

    let consumer_host = LocalHost::new("telegraf");
    let consumer_relation = consumer_host.add_relation("influxdb", "influxdb").await;
    consumer_host.set_remote_data(consumer_relation, CREDS_SECRET_ID_KEY, &raw_id).await.unwrap();

    let view = GrantedSecretView::new(fixture.secrets.clone(), [RelationId::new(99)]);
    let mut consumer = InfluxDbClientOperator::new(
        OperatorConfig::default(),
        Arc::new(consumer_host),
        Arc::new(view),
        ClientState::default(),
    );
    let changed = Event::RelationChanged(RelationEvent {
        relation: consumer_relation,
        relation_name: "influxdb".into(),
        remote_app: "influxdb".into(),
    });
    consumer.handle(&changed).await;

    let creds = consumer.run_action(&ActionRequest::new("get-influxdb-creds")).await;
    assert!(creds.contains_key("error"));
    assert!(!creds.contains_key("password"));
}
