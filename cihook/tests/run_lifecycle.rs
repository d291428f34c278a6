//! Lifecycle tests for `run_hook` against real bare repositories.
//!
//! Each test builds a scratch `origin.git`, pushes a pipeline script to it and
//! drives one or more hook runs, checking both the returned outcome and what
//! was left on disk in the workspace.

use std::fs;

use cihook::error::{CihookError, exit_code_of};
use cihook::io::workspace::WorkspacePaths;
use cihook::run::{RunOutcome, run_hook};
use cihook::test_support::{PIPELINE_FILE, TestRepo};

/// Reports `branch|flags|README|marker seen` and leaves a marker behind, so a
/// later run can tell a reused clone from a fresh one.
const REPORTING_PIPELINE: &str = r#"
return {
  run = function(toolkit, branch, message, flags)
    toolkit:pull()
    local readme = toolkit:exec(nil, "cat README.txt")
    local seen = toolkit:exec(nil, "test -f build.marker && echo yes || echo no")
    toolkit:exec("Building", "touch build.marker")
    return branch .. "|" .. table.concat(flags, ",") .. "|"
      .. (readme:gsub("%s+$", "")) .. "|" .. (seen:gsub("%s+$", ""))
  end,
}
"#;

fn paths_for(repo: &TestRepo, branch: &str) -> WorkspacePaths {
    WorkspacePaths::resolve(&repo.workspace_root(), &repo.locator(), branch)
}

fn completed(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed {
            result: Some(result),
            ..
        } => result,
        other => panic!("expected completed run with result, got {other:?}"),
    }
}

/// Run 1 clones, run 2 reuses the clone, run 3 (`--cleanbranch`) re-clones.
#[test]
fn runs_reuse_workspace_until_cleanbranch() {
    let repo = TestRepo::new("main", Some(REPORTING_PIPELINE)).expect("repo");
    let settings = repo.settings();
    let paths = paths_for(&repo, "main");

    let first = run_hook(&settings, &repo.locator(), "main", "feat: start").expect("run 1");
    assert_eq!(completed(first), "main||seed|no");
    assert!(paths.branch_path.join("build.marker").exists());

    let second = run_hook(&settings, &repo.locator(), "main", "fix: again").expect("run 2");
    assert_eq!(completed(second), "main||seed|yes");

    let third =
        run_hook(&settings, &repo.locator(), "main", "chore: redo --cleanbranch").expect("run 3");
    assert_eq!(completed(third), "main|cleanbranch|seed|no");
}

#[test]
fn new_commits_reach_the_workspace() {
    let repo = TestRepo::new("main", Some(REPORTING_PIPELINE)).expect("repo");
    let settings = repo.settings();

    run_hook(&settings, &repo.locator(), "main", "first").expect("run 1");
    repo.commit_file("main", "README.txt", "second\n")
        .expect("commit");
    let outcome = run_hook(&settings, &repo.locator(), "main", "second").expect("run 2");
    assert_eq!(completed(outcome), "main||second|yes");
}

#[test]
fn nohook_stops_before_touching_the_project() {
    let repo = TestRepo::new("main", Some(REPORTING_PIPELINE)).expect("repo");
    let paths = paths_for(&repo, "main");

    let outcome =
        run_hook(&repo.settings(), &repo.locator(), "main", "wip --NoHook").expect("run");
    assert_eq!(outcome, RunOutcome::Disabled);
    assert!(!paths.project_path.exists());
}

#[test]
fn nohook_still_applies_cleanbranch() {
    let repo = TestRepo::new("main", Some(REPORTING_PIPELINE)).expect("repo");
    let settings = repo.settings();
    let paths = paths_for(&repo, "main");

    run_hook(&settings, &repo.locator(), "main", "build").expect("run");
    assert!(paths.branch_path.exists());

    let outcome = run_hook(&settings, &repo.locator(), "main", "--clean --nohook").expect("run");
    assert_eq!(outcome, RunOutcome::Disabled);
    assert!(!paths.branch_path.exists());
    assert!(paths.project_path.exists());
}

#[test]
fn missing_pipeline_is_not_configured() {
    let repo = TestRepo::new("main", None).expect("repo");
    let paths = paths_for(&repo, "main");

    let outcome = run_hook(&repo.settings(), &repo.locator(), "main", "").expect("run");
    assert_eq!(
        outcome,
        RunOutcome::NotConfigured {
            branch: "main".to_string(),
            file: PIPELINE_FILE.to_string(),
        }
    );
    assert!(outcome.message().contains("not configured"));
    assert!(!paths.branch_path.exists());
}

#[test]
fn pipeline_on_other_branch_is_not_used() {
    let repo = TestRepo::new("main", None).expect("repo");
    repo.commit_file("dev", PIPELINE_FILE, REPORTING_PIPELINE)
        .expect("commit");

    let outcome = run_hook(&repo.settings(), &repo.locator(), "main", "").expect("run");
    assert!(matches!(outcome, RunOutcome::NotConfigured { .. }));

    let outcome = run_hook(&repo.settings(), &repo.locator(), "dev", "").expect("run");
    assert_eq!(completed(outcome), "dev||seed|no");
}

#[test]
fn syntax_error_fails_before_any_clone() {
    let repo = TestRepo::new("main", Some("return { run = function(toolkit end }")).expect("repo");
    let paths = paths_for(&repo, "main");

    let err = run_hook(&repo.settings(), &repo.locator(), "main", "").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CihookError>(),
        Some(CihookError::PipelineParse { .. })
    ));
    assert!(paths.project_path.exists());
    assert!(!paths.branch_path.exists());
}

#[test]
fn script_without_run_is_reported() {
    let repo = TestRepo::new("main", Some("return { build = function() end }")).expect("repo");

    let outcome = run_hook(&repo.settings(), &repo.locator(), "main", "").expect("run");
    assert_eq!(
        outcome,
        RunOutcome::MissingRun {
            branch: "main".to_string(),
            file: PIPELINE_FILE.to_string(),
        }
    );
}

#[test]
fn run_without_result_uses_default_message() {
    let repo = TestRepo::new("main", Some("return { run = function() end }")).expect("repo");

    let outcome = run_hook(&repo.settings(), &repo.locator(), "main", "").expect("run");
    assert_eq!(outcome.message(), "Pipeline finished for branch main.");
}

#[test]
fn failing_command_propagates_exit_code() {
    let pipeline = r#"
return {
  run = function(toolkit)
    toolkit:pull()
    toolkit:exec("Testing", "exit 5")
    return "unreachable"
  end,
}
"#;
    let repo = TestRepo::new("main", Some(pipeline)).expect("repo");

    let err = run_hook(&repo.settings(), &repo.locator(), "main", "").unwrap_err();
    assert_eq!(exit_code_of(&err), Some(5));
    match err.downcast_ref::<CihookError>() {
        Some(CihookError::PipelineFailed { message, exit_code }) => {
            assert_eq!(*exit_code, Some(5));
            assert!(message.contains("exit 5"), "{message}");
        }
        other => panic!("expected pipeline failure, got {other:?}"),
    }
}

#[test]
fn script_error_has_no_exit_code() {
    let repo =
        TestRepo::new("main", Some("return { run = function() error('boom') end }")).expect("repo");

    let err = run_hook(&repo.settings(), &repo.locator(), "main", "").unwrap_err();
    assert_eq!(exit_code_of(&err), None);
    assert!(format!("{err:#}").contains("boom"));
}

#[test]
fn cleanproject_removes_sibling_branches() {
    let repo = TestRepo::new("main", Some(REPORTING_PIPELINE)).expect("repo");
    repo.commit_file("dev", "DEV.txt", "dev\n").expect("commit");
    let settings = repo.settings();
    let main_paths = paths_for(&repo, "main");
    let dev_paths = paths_for(&repo, "dev");

    run_hook(&settings, &repo.locator(), "main", "").expect("main run");
    assert!(main_paths.branch_path.exists());

    let outcome =
        run_hook(&settings, &repo.locator(), "dev", "reset --cleanproject").expect("dev run");
    assert_eq!(completed(outcome), "dev|cleanproject|seed|no");
    assert!(!main_paths.branch_path.exists());
    assert!(dev_paths.branch_path.join("DEV.txt").exists());
}

#[test]
fn lock_files_live_outside_project_dirs() {
    let repo = TestRepo::new("main", Some(REPORTING_PIPELINE)).expect("repo");
    let paths = paths_for(&repo, "main");

    run_hook(&repo.settings(), &repo.locator(), "main", "--cleanproject").expect("run");
    assert!(paths.lock_path().exists());
    assert!(!paths.lock_path().starts_with(&paths.project_path));
    let entries: Vec<_> = fs::read_dir(&paths.project_path)
        .expect("read project dir")
        .collect();
    assert_eq!(entries.len(), 1);
}
