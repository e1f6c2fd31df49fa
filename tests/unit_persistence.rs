//! State persisted between CLI invocations survives a full provider/consumer exchange.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{FakeInfluxDb, FakeInstaller};
use influxdb_operator::cli::unit::UnitFiles;
use influxdb_operator::config::OperatorConfig;
use influxdb_operator::events::{ActionRequest, Event, RelationEvent};
use influxdb_operator::host::Host;
use influxdb_operator::operator::{InfluxDbClientOperator, InfluxDbOperator};
use influxdb_operator::relation::CREDS_SECRET_ID_KEY;
use influxdb_operator::scheduler::{BackoffPolicy, EventScheduler};
use influxdb_operator::secrets::GrantedSecretView;

#[tokio::test]
async fn test_provider_and_consumer_across_invocations() {
    let root = tempfile::tempdir().unwrap();
    let provider_files = UnitFiles::new(root.path().join("influxdb"));
    let consumer_files = UnitFiles::new(root.path().join("grafana"))
        .with_secrets_file(Some(provider_files.secrets_path()));
    provider_files.ensure_dir().await.unwrap();
    consumer_files.ensure_dir().await.unwrap();

    let config = OperatorConfig::default();
    let influx = FakeInfluxDb::new();
    let installer = Arc::new(FakeInstaller::default());

    // Invocation 1: the provider installs and a consumer relates.
    let relation = {
        let host = provider_files.load_host("influxdb").await.unwrap();
        let secrets = provider_files.load_secrets().await.unwrap();
        let mut state = provider_files.load_state().await.unwrap();
        host.set_binding("influxdb-peer", "10.0.0.7").await;
        host.add_relation("influxdb", "telegraf").await;
        let relation = host.add_relation("influxdb", "grafana").await;

        let mut operator = InfluxDbOperator::new(
            config.clone(),
            Arc::new(host.clone()),
            Arc::new(secrets.clone()),
            Arc::new(influx.clone()),
            installer.clone(),
            state.server.clone(),
        );
        let mut scheduler = EventScheduler::new(BackoffPolicy::default());
        scheduler.dispatch(&mut operator, Event::Install, Utc::now()).await;
        state.server = operator.into_state();
        state.pending = scheduler.pending();

        host.save(&provider_files.host_path()).await.unwrap();
        secrets.save(&provider_files.secrets_path()).await.unwrap();
        provider_files.save_state(&state).await.unwrap();
        relation
    };

    // Invocation 2: a fresh process delivers relation-joined.
    let published = {
        let host = provider_files.load_host("influxdb").await.unwrap();
        let secrets = provider_files.load_secrets().await.unwrap();
        let mut state = provider_files.load_state().await.unwrap();
        assert!(state.server.installed);

        let mut operator = InfluxDbOperator::new(
            config.clone(),
            Arc::new(host.clone()),
            Arc::new(secrets.clone()),
            Arc::new(influx.clone()),
            installer.clone(),
            state.server.clone(),
        );
        let mut scheduler = EventScheduler::from_pending(BackoffPolicy::default(), state.pending);
        let event = Event::RelationJoined(RelationEvent {
            relation,
            relation_name: "influxdb".into(),
            remote_app: "grafana".into(),
        });
        let report = scheduler.dispatch(&mut operator, event, Utc::now()).await;
        assert_eq!(report.handled, 1);
        state.server = operator.into_state();
        state.pending = scheduler.pending();

        host.save(&provider_files.host_path()).await.unwrap();
        secrets.save(&provider_files.secrets_path()).await.unwrap();
        provider_files.save_state(&state).await.unwrap();

        host.relation_data(relation, "influxdb")
            .await
            .unwrap()
            .and_then(|d| d.get(CREDS_SECRET_ID_KEY).cloned())
            .unwrap()
    };

    // Invocation 3: the consumer joins the same relation id and reads the
    // provider's store through the grant on it.
    let host = consumer_files.load_host("grafana").await.unwrap();
    host.add_relation("metrics", "prometheus").await;
    let consumer_relation =
        host.add_relation_with_id(relation, "influxdb", "influxdb").await.unwrap();
    host.set_remote_data(consumer_relation, CREDS_SECRET_ID_KEY, &published).await.unwrap();
    let secrets = consumer_files.load_secrets().await.unwrap();
    let state = consumer_files.load_state().await.unwrap();

    let own_relations = host.relations().await.into_iter().map(|r| r.id);
    let mut consumer = InfluxDbClientOperator::new(
        config.clone(),
        Arc::new(host.clone()),
        Arc::new(GrantedSecretView::new(secrets, own_relations)),
        state.client,
    );
    let mut scheduler = EventScheduler::new(BackoffPolicy::default());
    let changed = Event::RelationChanged(RelationEvent {
        relation: consumer_relation,
        relation_name: "influxdb".into(),
        remote_app: "influxdb".into(),
    });
    scheduler.dispatch(&mut consumer, changed, Utc::now()).await;

    let creds = consumer.run_action(&ActionRequest::new("get-influxdb-creds")).await;
    let username = creds["username"].as_str().unwrap();
    let password = creds["password"].as_str().unwrap();
    assert!(influx.accepts(username, password));
    assert_eq!(creds["host"].as_str(), Some("10.0.0.7"));
}
