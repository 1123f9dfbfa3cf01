//! Update and lifecycle flows against a scripted executor.

#![allow(clippy::unwrap_used)]

use chrono::Utc;

use dockhand_cli::application::ports::{ExecOutput, OperationLogStore};
use dockhand_cli::domain::compose::ComposeOp;
use dockhand_cli::domain::operation::{
    ContainerAction, REASON_BACKUP_FAILED, REASON_MISSING_RUN_COMMAND, REASON_PULL_FAILED,
    REASON_RECREATE_ROLLED_BACK, REASON_UNEXPECTED_ROLLED_BACK, generate_operation_id,
    is_backup_name,
};
use dockhand_common::{
    ComposeMeta, ContainerRecord, OperationStatus, STATE_RUNNING, STATE_STOPPED, compose_group_key,
};

use crate::mocks::{Fixture, ScriptedExecutor, fail, host, ok};

const ID: &str = "4f2a9c1b7d3e";
const RUN: &str = "docker run -d --name web -p 80:80 nginx:1.27";
const NEW_ID: &str = "9b8a7c6d5e4f00112233445566778899aabbccddeeff00112233445566778899";

const NEW_WEB_INSPECT: &str = r#"[{
    "Id": "9b8a7c6d5e4f00112233445566778899aabbccddeeff00112233445566778899",
    "Name": "/web",
    "Image": "sha256:2222222222222222222222222222222222222222222222222222222222222222",
    "State": {"Status": "running", "Running": true, "StartedAt": "2024-05-01T10:00:00Z"},
    "Config": {"Image": "nginx:1.27"},
    "HostConfig": {},
    "NetworkSettings": {}
}]"#;

fn cli_record() -> ContainerRecord {
    let mut r = ContainerRecord::new("h1", ID, "web", Utc::now());
    r.state = STATE_RUNNING.into();
    r.image = "nginx".into();
    r.image_tag = Some("1.27".into());
    r.update_available = true;
    r.run_command = Some(RUN.into());
    r
}

#[tokio::test]
async fn pull_failure_leaves_container_untouched() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new().on("docker pull", fail("manifest unknown")),
    );
    let before = fx.repo.seed(cli_record());

    let outcome = fx.services.lifecycle.update("h1", "web", None).await;
    assert!(!outcome.ok);
    assert_eq!(outcome.reason.as_deref(), Some(REASON_PULL_FAILED));
    assert_eq!(fx.exec.count("docker rename"), 0);
    assert_eq!(fx.exec.count("docker stop"), 0);
    assert_eq!(fx.repo.rows()[0], before);
}

#[tokio::test]
async fn failed_recreate_rolls_back_to_original_name() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new().on(RUN, fail("port is already allocated")),
    );
    fx.repo.seed(cli_record());
    let op_id = generate_operation_id();

    let outcome = fx
        .services
        .lifecycle
        .update("h1", "web", Some(op_id.clone()))
        .await;
    assert_eq!(outcome.reason.as_deref(), Some(REASON_RECREATE_ROLLED_BACK));

    let cmds = fx.exec.commands();
    let run_at = cmds.iter().position(|c| c == RUN).unwrap();
    let after = &cmds[run_at + 1..];
    assert_eq!(after[0], "docker rm -f web");
    assert!(after[1].starts_with("docker rename web_backup_"));
    assert!(after[1].ends_with(" web"));
    assert_eq!(after[2], "docker start web");
    // The backup is renamed back, never removed.
    assert!(!cmds.iter().any(|c| c.starts_with("docker rm -f web_backup_")));

    let log = fx.services.ports.operations.get(&op_id).await.unwrap().unwrap();
    assert_eq!(log.status, OperationStatus::Error);
    assert!(log.entries.iter().any(|e| e.content.contains("rolling back")));
}

#[tokio::test]
async fn successful_update_removes_backup_and_clears_flag() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new());
    fx.repo.seed(cli_record());

    let outcome = fx.services.lifecycle.update("h1", ID, None).await;
    assert!(outcome.ok, "{outcome:?}");

    let cmds = fx.exec.commands();
    let rename = cmds.iter().find(|c| c.starts_with("docker rename web ")).unwrap();
    let backup = rename.rsplit(' ').next().unwrap();
    assert!(is_backup_name(backup));
    assert!(cmds.contains(&format!("docker stop {backup}")));
    assert!(cmds.contains(&format!("docker rm -f {backup}")));
    assert!(!fx.repo.rows()[0].update_available);
}

#[tokio::test]
async fn refresh_after_update_adopts_the_recreated_container_id() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new()
            .on(
                &format!("docker inspect --type container {ID}"),
                fail("Error: No such object: 4f2a9c1b7d3e"),
            )
            .on("docker inspect --type container web", ok(NEW_WEB_INSPECT)),
    );
    fx.repo.seed(cli_record());

    let outcome = fx.services.lifecycle.update("h1", ID, None).await;
    assert!(outcome.ok, "{outcome:?}");

    let rows = fx.repo.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].container_id, NEW_ID);
    assert_eq!(rows[0].name, "web");
    assert_eq!(rows[0].state, STATE_RUNNING);
    assert!(!rows[0].update_available);
}

#[tokio::test]
async fn failed_rename_aborts_before_recreating() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new().on("docker rename", fail("Error response from daemon: name in use")),
    );
    let before = fx.repo.seed(cli_record());

    let outcome = fx.services.lifecycle.update("h1", "web", None).await;
    assert!(!outcome.ok);
    assert_eq!(outcome.reason.as_deref(), Some(REASON_BACKUP_FAILED));
    assert_eq!(fx.exec.count("docker pull"), 1);
    assert_eq!(fx.exec.count("docker run"), 0);
    assert_eq!(fx.exec.count("docker stop"), 0);
    assert_eq!(fx.exec.count("docker rm"), 0);
    assert_eq!(fx.repo.rows()[0], before);
}

#[tokio::test]
async fn lost_connection_during_recreate_rolls_back() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new().on(RUN, ExecOutput::transport_failure("connection reset by peer")),
    );
    fx.repo.seed(cli_record());
    let op_id = generate_operation_id();

    let outcome = fx
        .services
        .lifecycle
        .update("h1", "web", Some(op_id.clone()))
        .await;
    assert!(!outcome.ok);
    assert_eq!(outcome.reason.as_deref(), Some(REASON_UNEXPECTED_ROLLED_BACK));

    let cmds = fx.exec.commands();
    let run_at = cmds.iter().position(|c| c == RUN).unwrap();
    let after = &cmds[run_at + 1..];
    assert_eq!(after[0], "docker rm -f web");
    assert!(after[1].starts_with("docker rename web_backup_"));
    assert!(after[1].ends_with(" web"));
    assert_eq!(after[2], "docker start web");
    assert!(!cmds.iter().any(|c| c.starts_with("docker rm -f web_backup_")));

    let log = fx.services.ports.operations.get(&op_id).await.unwrap().unwrap();
    assert_eq!(log.status, OperationStatus::Error);
    assert!(log.entries.iter().any(|e| e.content.contains("connection reset by peer")));
}

#[tokio::test]
async fn compose_down_runs_in_project_directory_and_refreshes() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new().on("compose ls", ok("[]")));
    let mut r = cli_record();
    r.run_command = None;
    r.compose = Some(ComposeMeta {
        project: "shop".into(),
        service: "web".into(),
        working_dir: Some("/srv/shop".into()),
        config_files: Vec::new(),
        group_key: compose_group_key("h1", "shop"),
    });
    fx.repo.seed(r);
    let op_id = generate_operation_id();

    let outcome = fx
        .services
        .lifecycle
        .compose_operate("h1", "shop", Some("/srv/shop"), ComposeOp::Down, Some(op_id.clone()))
        .await;
    assert!(outcome.ok, "{outcome:?}");

    let cmds = fx.exec.commands();
    assert_eq!(cmds[0], "docker compose -p shop --project-directory /srv/shop down");
    assert!(cmds[1..].iter().any(|c| c.contains("compose ls")));
    // The project is gone, so the follow-up refresh stops its records.
    assert_eq!(fx.repo.rows()[0].state, STATE_STOPPED);

    let log = fx.services.ports.operations.get(&op_id).await.unwrap().unwrap();
    assert_eq!(log.status, OperationStatus::Completed);
}

#[tokio::test]
async fn failed_compose_operation_reports_docker_error() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new().on("restart", fail("no configuration file provided: not found")),
    );

    let outcome = fx
        .services
        .lifecycle
        .compose_operate("h1", "shop", None, ComposeOp::Restart, None)
        .await;
    assert!(!outcome.ok);
    assert!(outcome.reason.unwrap().contains("no configuration file"));
    assert_eq!(fx.exec.commands()[0], "docker compose -p shop restart");
}

#[tokio::test]
async fn missing_run_command_is_refused_before_pulling() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new());
    let mut r = cli_record();
    r.run_command = None;
    fx.repo.seed(r);

    let outcome = fx.services.lifecycle.update("h1", "web", None).await;
    assert_eq!(outcome.reason.as_deref(), Some(REASON_MISSING_RUN_COMMAND));
    assert_eq!(fx.exec.count("docker pull"), 0);
}

#[tokio::test]
async fn compose_update_pulls_and_recreates_one_service() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new());
    let mut r = cli_record();
    r.run_command = None;
    r.compose = Some(ComposeMeta {
        project: "shop".into(),
        service: "web".into(),
        working_dir: Some("/srv/shop".into()),
        config_files: Vec::new(),
        group_key: compose_group_key("h1", "shop"),
    });
    fx.repo.seed(r);

    let outcome = fx.services.lifecycle.update("h1", "web", None).await;
    assert!(outcome.ok, "{outcome:?}");
    let cmds = fx.exec.commands();
    let pull = cmds.iter().position(|c| c.contains("compose") && c.ends_with("pull web")).unwrap();
    let up = cmds
        .iter()
        .position(|c| c.contains("compose") && c.ends_with("up -d --no-deps web"))
        .unwrap();
    assert!(pull < up);
    assert_eq!(fx.exec.count("docker rename"), 0);
}

#[tokio::test]
async fn container_action_reports_docker_error() {
    let fx = Fixture::new(
        vec![host("h1")],
        ScriptedExecutor::new().on("docker stop", fail("Error: No such container: 4f2a9c1b7d3e")),
    );
    fx.repo.seed(cli_record());

    let outcome = fx
        .services
        .lifecycle
        .container_action("h1", "web", ContainerAction::Stop, None)
        .await;
    assert!(!outcome.ok);
    assert!(outcome.reason.unwrap().contains("No such container"));
}

#[tokio::test]
async fn unknown_container_is_a_failed_outcome() {
    let fx = Fixture::new(vec![host("h1")], ScriptedExecutor::new());
    let outcome = fx
        .services
        .lifecycle
        .container_action("h1", "ghost", ContainerAction::Start, None)
        .await;
    assert!(!outcome.ok);
    assert_eq!(fx.exec.commands().len(), 0);
}
