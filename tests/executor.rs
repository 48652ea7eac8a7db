use conveyor::context::RunContext;
use conveyor::executor::{RunVerdict, StageStatus, execute_stages};
use conveyor::manifest::{FailurePolicy, StageSpec};
use conveyor::observability::MetricsCollector;
use tempfile::tempdir;

fn stage(name: &str, policy: FailurePolicy, commands: &[&str]) -> StageSpec {
    StageSpec {
        name: name.to_string(),
        policy,
        commands: commands.iter().map(|c| c.to_string()).collect(),
    }
}

#[test]
fn all_stages_succeed() {
    let temp = tempdir().unwrap();
    let ctx = RunContext::new(temp.path());
    let stages = vec![
        stage("lint", FailurePolicy::Required, &["true"]),
        stage("test", FailurePolicy::Required, &["echo ok"]),
    ];

    let (outcomes, verdict) = execute_stages(&stages, &ctx, &MetricsCollector::new());

    assert_eq!(verdict, RunVerdict::Succeeded);
    assert!(outcomes.iter().all(|o| o.status == StageStatus::Succeeded));
    assert_eq!(outcomes[1].commands[0].stdout.trim(), "ok");
}

#[test]
fn best_effort_failure_never_changes_the_verdict() {
    let temp = tempdir().unwrap();
    let ctx = RunContext::new(temp.path());
    let stages = vec![
        stage("lint", FailurePolicy::BestEffort, &["exit 1"]),
        stage("test", FailurePolicy::Required, &["true"]),
    ];

    let (outcomes, verdict) = execute_stages(&stages, &ctx, &MetricsCollector::new());

    assert_eq!(verdict, RunVerdict::Succeeded);
    assert_eq!(outcomes[0].status, StageStatus::Failed);
    assert_eq!(outcomes[1].status, StageStatus::Succeeded);
}

#[test]
fn required_failure_skips_all_later_stages() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("late_stage_ran");
    let ctx = RunContext::new(temp.path());
    let touch = format!("touch {}", marker.display());
    let stages = vec![
        stage("build", FailurePolicy::Required, &["exit 2"]),
        stage("test", FailurePolicy::Required, &[touch.as_str()]),
        stage("package", FailurePolicy::BestEffort, &["true"]),
    ];

    let (outcomes, verdict) = execute_stages(&stages, &ctx, &MetricsCollector::new());

    assert_eq!(verdict, RunVerdict::Failed);
    assert_eq!(outcomes[0].status, StageStatus::Failed);
    assert_eq!(outcomes[1].status, StageStatus::Skipped);
    assert_eq!(outcomes[2].status, StageStatus::Skipped);
    assert!(!marker.exists(), "skipped stage must not execute");
    assert!(
        outcomes[1]
            .skipped_because
            .as_deref()
            .unwrap()
            .contains("build")
    );
}

#[test]
fn stage_stops_at_first_failing_command() {
    let temp = tempdir().unwrap();
    let ctx = RunContext::new(temp.path());
    let stages = vec![stage(
        "test",
        FailurePolicy::Required,
        &["true", "exit 5", "echo unreachable"],
    )];

    let (outcomes, verdict) = execute_stages(&stages, &ctx, &MetricsCollector::new());

    assert_eq!(verdict, RunVerdict::Failed);
    assert_eq!(outcomes[0].commands.len(), 2);
    let failure = outcomes[0].first_failure().unwrap();
    assert_eq!(failure.exit_code, 5);
}

#[test]
fn stage_timings_reach_the_metrics_collector() {
    let temp = tempdir().unwrap();
    let ctx = RunContext::new(temp.path());
    let metrics = MetricsCollector::new();
    let stages = vec![
        stage("lint", FailurePolicy::Required, &["true", "true"]),
        stage("test", FailurePolicy::Required, &["true"]),
    ];

    execute_stages(&stages, &ctx, &metrics);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.commands_run, 3);
    assert_eq!(snapshot.stages.get("lint").unwrap().commands, 2);
    assert_eq!(snapshot.stages.get("test").unwrap().commands, 1);
    let prom = snapshot.to_prometheus();
    assert!(prom.contains("conveyor_stage_commands_total{stage=\"lint\"} 2"));
    assert!(prom.contains("conveyor_commands_run_total 3"));
}
