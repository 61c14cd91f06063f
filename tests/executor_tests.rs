//! Tests for the single-task executor in local mode: conditions, loops,
//! retries, timeouts, registration inputs and the copy backend.

use convoy::connection::SshPool;
use convoy::error::Error;
use convoy::executor::{execute_task, RunOptions};
use convoy::inventory::Host;
use convoy::playbook::{CopyTask, Task};
use convoy::template::VarMap;
use serde_json::json;

fn local_opts() -> RunOptions {
    RunOptions {
        run_locally: true,
        ..Default::default()
    }
}

async fn run(task: &Task, vars: &VarMap) -> convoy::executor::TaskOutcome {
    let host = Host::new("localhost");
    let pool = SshPool::new();
    execute_task(task, &host, &local_opts(), &pool, vars).await
}

#[tokio::test]
async fn command_output_is_captured() {
    let task = Task::command("say hello", "echo hello");
    let outcome = run(&task, &VarMap::new()).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.result.output, "hello\n");
    assert_eq!(outcome.result.rc, 0);
    assert!(outcome.result.changed);
}

#[tokio::test]
async fn nonzero_exit_fails_with_output_captured() {
    let task = Task::command("doomed", "echo boom; exit 7");
    let outcome = run(&task, &VarMap::new()).await;

    assert!(matches!(
        outcome.error,
        Some(Error::CommandFailed { code: 7, .. })
    ));
    assert!(outcome.result.failed);
    assert_eq!(outcome.result.rc, 7);
    assert_eq!(outcome.result.output, "boom\n");
}

#[tokio::test]
async fn variables_substitute_into_commands() {
    let mut vars = VarMap::new();
    vars.insert("greeting".into(), json!("bonjour"));

    let task = Task::command("greet", "echo {{ .greeting }}");
    let outcome = run(&task, &vars).await;

    assert_eq!(outcome.result.output, "bonjour\n");
}

#[tokio::test]
async fn falsy_when_produces_empty_outcome() {
    let mut vars = VarMap::new();
    vars.insert("enabled".into(), json!("no"));

    let mut task = Task::command("gated", "echo ran");
    task.when = "{{ .enabled }}".into();

    let outcome = run(&task, &vars).await;
    assert!(outcome.error.is_none());
    assert!(outcome.result.output.is_empty());
    assert!(!outcome.result.changed);
    assert!(!outcome.result.failed);
}

#[tokio::test]
async fn malformed_when_is_a_template_error() {
    let mut vars = VarMap::new();
    vars.insert("x".into(), json!("1"));

    let mut task = Task::command("broken", "echo ran");
    task.when = "{{ .x".into();

    let outcome = run(&task, &vars).await;
    assert!(matches!(outcome.error, Some(Error::Template(_))));
    assert!(outcome.result.failed);
}

#[tokio::test]
async fn with_items_accumulates_output_and_changed() {
    let mut task = Task::command("loop", "echo {{ .item }}");
    task.with_items = vec![json!("one"), json!("two"), json!("three")];

    let outcome = run(&task, &VarMap::new()).await;
    assert!(outcome.error.is_none());
    assert_eq!(outcome.result.output, "one\ntwo\nthree\n");
    assert!(outcome.result.changed);
}

#[tokio::test]
async fn with_items_stops_at_first_failure() {
    let dir = tempfile::tempdir().unwrap();
    let marks = dir.path().display().to_string();

    let mut task = Task::command(
        "loop until b",
        format!("touch {}/{{{{ .item }}}} && test {{{{ .item }}}} != b", marks),
    );
    task.with_items = vec![json!("a"), json!("b"), json!("c")];

    let outcome = run(&task, &VarMap::new()).await;
    assert!(outcome.error.is_some());
    assert!(outcome.result.failed);

    assert!(dir.path().join("a").exists());
    assert!(dir.path().join("b").exists());
    // The failing iteration aborts the rest.
    assert!(!dir.path().join("c").exists());
}

#[tokio::test]
async fn with_items_continues_after_ignored_failures() {
    let dir = tempfile::tempdir().unwrap();
    let marks = dir.path().display().to_string();

    let mut task = Task::command(
        "loop ignoring failures",
        format!("touch {}/{{{{ .item }}}} && test {{{{ .item }}}} != b", marks),
    );
    task.with_items = vec![json!("a"), json!("b"), json!("c")];
    task.ignore_errors = true;

    let outcome = run(&task, &VarMap::new()).await;
    // Ignored failures surface in the result, not as an error.
    assert!(outcome.error.is_none());
    assert!(outcome.result.failed);
    assert!(dir.path().join("c").exists());
}

#[tokio::test]
async fn changed_when_overrides_default_changed() {
    let mut task = Task::command("probe", "echo hello");
    task.changed_when = "no".into();
    let outcome = run(&task, &VarMap::new()).await;
    assert!(outcome.error.is_none());
    assert!(!outcome.result.changed);

    // `output` is available inside changed_when.
    let mut task = Task::command("probe", "echo hello");
    task.changed_when = "{{ .output }}".into();
    let outcome = run(&task, &VarMap::new()).await;
    assert!(outcome.result.changed);
}

#[tokio::test]
async fn retry_succeeds_once_state_exists() {
    let dir = tempfile::tempdir().unwrap();
    let flag = dir.path().join("x").display().to_string();

    // First attempt creates the flag and fails; the retry sees it and
    // prints ok.
    let mut task = Task::command(
        "retry until flag",
        format!("if [ -f {f} ]; then echo ok; else touch {f}; exit 1; fi", f = flag),
    );
    task.retries = 2;
    task.delay = "0s".into();

    let outcome = run(&task, &VarMap::new()).await;
    assert!(outcome.error.is_none());
    assert_eq!(outcome.result.output, "ok\n");
}

#[tokio::test]
async fn retry_returns_last_failure_when_exhausted() {
    let mut task = Task::command("always fails", "exit 1");
    task.retries = 2;

    let outcome = run(&task, &VarMap::new()).await;
    assert!(matches!(
        outcome.error,
        Some(Error::CommandFailed { code: 1, .. })
    ));
}

#[tokio::test]
async fn timeout_fails_and_names_the_deadline() {
    let mut task = Task::command("sleeper", "sleep 5");
    task.timeout = "1s".into();

    let outcome = run(&task, &VarMap::new()).await;
    let error = outcome.error.expect("expected a timeout error");
    assert!(error.to_string().contains("1s"));
    assert!(outcome.result.failed);
}

#[tokio::test]
async fn invalid_timeout_fails_without_running() {
    let mut task = Task::command("bad deadline", "echo should-not-run");
    task.timeout = "5 parsecs".into();

    let outcome = run(&task, &VarMap::new()).await;
    assert!(matches!(
        outcome.error,
        Some(Error::InvalidDuration { field: "timeout", .. })
    ));
    assert!(outcome.result.output.is_empty());
}

#[tokio::test]
async fn dry_run_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker").display().to_string();

    let task = Task::command("would touch", format!("touch {}", marker));
    let host = Host::new("localhost");
    let pool = SshPool::new();
    let opts = RunOptions {
        run_locally: true,
        dry_run: true,
        ..Default::default()
    };

    let outcome = execute_task(&task, &host, &opts, &pool, &VarMap::new()).await;
    assert!(outcome.error.is_none());
    assert!(!dir.path().join("marker").exists());
}

#[tokio::test]
async fn local_copy_writes_dest_with_mode_0644() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.conf");
    let dest = dir.path().join("dest.conf");
    std::fs::write(&src, "listen 8080;\n").unwrap();

    let mut task = Task::default();
    task.name = "push config".into();
    task.copy = Some(CopyTask {
        src: src.display().to_string(),
        dest: dest.display().to_string(),
    });

    let outcome = run(&task, &VarMap::new()).await;
    assert!(outcome.error.is_none());
    assert!(outcome.result.changed);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "listen 8080;\n");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}

#[tokio::test]
async fn local_copy_missing_source_fails() {
    let dir = tempfile::tempdir().unwrap();

    let mut task = Task::default();
    task.name = "bad copy".into();
    task.copy = Some(CopyTask {
        src: dir.path().join("absent").display().to_string(),
        dest: dir.path().join("dest").display().to_string(),
    });

    let outcome = run(&task, &VarMap::new()).await;
    assert!(matches!(outcome.error, Some(Error::CopyFailed { .. })));
    assert_eq!(outcome.result.rc, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn script_files_run_through_sh() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("probe.sh");
    std::fs::write(&script, "echo from-script\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

    // The script is run via `sh <path>`, so it needs no execute bit.
    let task = Task::command("run script", script.display().to_string());
    let outcome = run(&task, &VarMap::new()).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.result.output, "from-script\n");
}
