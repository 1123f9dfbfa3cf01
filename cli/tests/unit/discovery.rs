//! Reconciliation against scripted `docker ps` output.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};

use dockhand_cli::domain::operation::RefreshScope;
use dockhand_common::{ComposeMeta, ContainerRecord, STATE_RUNNING, STATE_STOPPED, compose_group_key};

use crate::mocks::{Fixture, ScriptedExecutor, fail, host, ok};

const FULL: &str = "4f2a9c1b7d3e0a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f6071829a";
const SHORT: &str = "4f2a9c1b7d3e";

const PS: &str = "\
CONTAINER ID   IMAGE        COMMAND                  CREATED       STATUS          PORTS                NAMES
4f2a9c1b7d3e   nginx:1.27   \"/docker-entrypoint.…\"   2 hours ago   Up 2 hours      0.0.0.0:80->80/tcp   web
";

fn record(id: &str, name: &str) -> ContainerRecord {
    let mut r = ContainerRecord::new("h1", id, name, Utc::now());
    r.state = STATE_RUNNING.into();
    r.started_at = Some(Utc::now());
    r
}

const RECREATED: &str = "9b8a7c6d5e4f00112233445566778899aabbccddeeff00112233445566778899";

fn compose_record(id: &str, name: &str, service: &str) -> ContainerRecord {
    let mut r = record(id, name);
    r.compose = Some(ComposeMeta {
        project: "shop".into(),
        service: service.into(),
        working_dir: Some("/srv/shop".into()),
        config_files: Vec::new(),
        group_key: compose_group_key("h1", "shop"),
    });
    r
}

fn inspect_json(id: &str, name: &str, labels: &str) -> String {
    format!(
        r#"[{{
            "Id": "{id}",
            "Name": "/{name}",
            "Image": "sha256:1111111111111111111111111111111111111111111111111111111111111111",
            "State": {{"Status": "running", "Running": true, "StartedAt": "2024-05-01T10:00:00Z"}},
            "Config": {{"Image": "shop/api:2.1", "Labels": {{{labels}}}}},
            "HostConfig": {{}},
            "NetworkSettings": {{}}
        }}]"#
    )
}

const SHOP_LABELS: &str =
    r#""com.docker.compose.project": "shop", "com.docker.compose.service": "api""#;

#[tokio::test]
async fn discovery_inserts_new_container_from_ps_line() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new().on("docker ps -a", ok(PS)));
    let count = fx
        .services
        .reconciler
        .discover_on_host(&host("h1"))
        .await
        .unwrap();
    assert_eq!(count, 1);
    let rows = fx.repo.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "web");
    assert_eq!(rows[0].state, STATE_RUNNING);
}

#[tokio::test]
async fn rediscovery_keeps_one_row_per_container() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new().on("docker ps -a", ok(PS)));
    fx.repo.seed(record(SHORT, "web"));
    fx.repo.seed(record(SHORT, "web"));
    fx.services
        .reconciler
        .discover_on_host(&host("h1"))
        .await
        .unwrap();
    assert_eq!(fx.repo.rows().len(), 1);
}

#[tokio::test]
async fn absent_container_is_marked_stopped_not_deleted() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new().on("docker ps -a", ok("CONTAINER ID   IMAGE   NAMES\n")),
    );
    fx.repo.seed(record(SHORT, "web"));
    fx.services
        .reconciler
        .discover_on_host(&host("h1"))
        .await
        .unwrap();
    let rows = fx.repo.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, STATE_STOPPED);
    assert!(rows[0].started_at.is_none());
}

#[tokio::test]
async fn failed_ps_reports_error_per_host() {
    let fx = Fixture::new(
        vec![host("h1"), host("h2")],
        ScriptedExecutor::new()
            .on_host("h2", "docker ps -a", crate::mocks::fail("Cannot connect to the Docker daemon"))
            .on("docker ps -a", ok(PS)),
    );
    let results = fx.services.reconciler.discover_all().await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].ok);
    assert!(!results[1].ok);
    assert!(results[1].error.as_deref().unwrap().contains("Docker daemon"));
}

#[tokio::test]
async fn cleanup_keeps_latest_created_and_promotes_full_id() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new());
    let mut old = record(FULL, "web");
    old.created_at = Utc::now() - Duration::hours(2);
    fx.repo.seed(old);
    let newer = fx.repo.seed(record(SHORT, "web"));

    let report = fx
        .services
        .reconciler
        .cleanup_duplicates(Some("h1"))
        .await
        .unwrap();
    assert_eq!(report.deleted, 1);
    let rows = fx.repo.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row_id, newer.row_id);
    assert_eq!(rows[0].container_id, FULL);
}

#[tokio::test]
async fn cleanup_keeps_latest_started_per_name() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new());
    let mut stale = record("aaaaaaaaaaaa", "web");
    stale.started_at = Some(Utc::now() - Duration::days(1));
    fx.repo.seed(stale);
    let live = fx.repo.seed(record("bbbbbbbbbbbb", "web"));

    fx.services
        .reconciler
        .cleanup_duplicates(None)
        .await
        .unwrap();
    let rows = fx.repo.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row_id, live.row_id);
}

#[tokio::test]
async fn purge_removes_only_the_named_host() {
    let fx = Fixture::new(vec![host("h1"), host("h2")], ScriptedExecutor::new());
    fx.repo.seed(record(SHORT, "web"));
    let mut other = record(SHORT, "web");
    other.host_id = "h2".into();
    fx.repo.seed(other);

    let removed = fx.services.reconciler.purge(Some("h1")).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(fx.repo.rows()[0].host_id, "h2");
    assert!(fx.services.reconciler.purge(Some("nope")).await.is_err());
}

#[tokio::test]
async fn refresh_of_absent_compose_project_marks_its_records_stopped() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new().on("compose ls", ok("[]")));
    fx.repo.seed(compose_record("aaaaaaaaaaaa", "shop-api-1", "api"));
    fx.repo.seed(compose_record("bbbbbbbbbbbb", "shop-db-1", "db"));
    fx.repo.seed(record(SHORT, "web"));

    let refreshed = fx
        .services
        .reconciler
        .refresh_status("h1", &RefreshScope::ComposeProject("shop".into()))
        .await
        .unwrap();
    assert_eq!(refreshed, 2);
    for row in fx.repo.rows() {
        if row.compose.is_some() {
            assert_eq!(row.state, STATE_STOPPED, "{}", row.name);
            assert!(row.started_at.is_none());
        } else {
            assert_eq!(row.state, STATE_RUNNING);
        }
    }
    assert_eq!(fx.exec.count("--filter"), 0);
    assert_eq!(fx.exec.count("docker inspect"), 0);
}

#[tokio::test]
async fn refresh_of_exited_compose_project_marks_its_records_stopped() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new().on(
            "compose ls",
            ok(r#"[{"Name":"shop","Status":"exited(2)","ConfigFiles":"/srv/shop/compose.yml"}]"#),
        ),
    );
    fx.repo.seed(compose_record("aaaaaaaaaaaa", "shop-api-1", "api"));

    fx.services
        .reconciler
        .refresh_status("h1", &RefreshScope::ComposeProject("shop".into()))
        .await
        .unwrap();
    assert_eq!(fx.repo.rows()[0].state, STATE_STOPPED);
}

#[tokio::test]
async fn refresh_finds_recreated_compose_containers_by_label_and_name() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new()
            .on(
                "compose ls",
                ok(r#"[{"Name":"shop","Status":"running(1)","ConfigFiles":"/srv/shop/compose.yml"}]"#),
            )
            .on(
                "--filter label=com.docker.compose.project=shop",
                ok(&format!("{RECREATED}\n")),
            )
            .on(
                &format!("docker inspect --type container {RECREATED}"),
                ok(&inspect_json(RECREATED, "shop-api-1", SHOP_LABELS)),
            ),
    );
    let mut stale = compose_record("aaaaaaaaaaaa", "shop-api-1", "api");
    stale.state = STATE_STOPPED.into();
    stale.started_at = None;
    fx.repo.seed(stale);

    let refreshed = fx
        .services
        .reconciler
        .refresh_status("h1", &RefreshScope::ComposeProject("shop".into()))
        .await
        .unwrap();
    assert_eq!(refreshed, 1);
    let rows = fx.repo.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].container_id, RECREATED);
    assert_eq!(rows[0].state, STATE_RUNNING);
    assert!(rows[0].started_at.is_some());
    assert_eq!(rows[0].compose.as_ref().unwrap().project, "shop");
}

#[tokio::test]
async fn refresh_marks_vanished_target_stopped() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new().on("docker inspect", fail("Error: No such object: web")),
    );
    fx.repo.seed(record(SHORT, "web"));

    let refreshed = fx
        .services
        .reconciler
        .refresh_status("h1", &RefreshScope::ContainerIds(vec![SHORT.into()]))
        .await
        .unwrap();
    assert_eq!(refreshed, 1);
    let rows = fx.repo.rows();
    assert_eq!(rows[0].container_id, SHORT);
    assert_eq!(rows[0].state, STATE_STOPPED);
    assert!(rows[0].started_at.is_none());
    // By ID first, then by name.
    let cmds = fx.exec.commands();
    assert_eq!(cmds[0], format!("docker inspect --type container {SHORT}"));
    assert_eq!(cmds[1], "docker inspect --type container web");
}

#[tokio::test]
async fn refresh_of_unknown_references_touches_nothing() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new());
    fx.repo.seed(record(SHORT, "web"));
    let refreshed = fx
        .services
        .reconciler
        .refresh_status("h1", &RefreshScope::ContainerNames(vec!["ghost".into()]))
        .await
        .unwrap();
    assert_eq!(refreshed, 0);
    assert!(fx.exec.commands().is_empty());
}
