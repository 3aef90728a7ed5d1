//! Integration tests for pipewright
//!
//! These drive the compiled binary end to end: full runs against a
//! temporary repository, the suspend/resume cycle, and checkpoint
//! inspection through the CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a pipewright Command with a clean environment.
fn pipewright() -> Command {
    let mut cmd = cargo_bin_cmd!("pipewright");
    cmd.env_remove("PLATFORM_API_URL");
    cmd.env_remove("PLATFORM_API_KEY");
    cmd
}

/// Helper to create a temporary project directory.
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Helper to create a small analyzable repository.
fn create_sample_repo(dir: &TempDir) -> std::path::PathBuf {
    let repo = dir.path().join("repo");
    fs::create_dir_all(repo.join("src")).unwrap();
    fs::write(
        repo.join("Cargo.toml"),
        "[package]\nname = \"sample\"\n[dependencies]\nserde = \"1\"\n",
    )
    .unwrap();
    fs::write(repo.join("src/main.rs"), "fn main() {}\n").unwrap();
    fs::write(repo.join("Dockerfile"), "FROM rust:1\n").unwrap();
    repo
}

/// Workflow ids checkpointed under a project's state directory.
fn workflow_ids(project_dir: &Path) -> Vec<String> {
    let state_dir = project_dir.join(".pipewright");
    if !state_dir.exists() {
        return Vec::new();
    }
    let mut ids: Vec<String> = fs::read_dir(state_dir)
        .unwrap()
        .filter_map(|entry| {
            let path = entry.unwrap().path();
            (path.extension()? == "json")
                .then(|| path.file_stem().unwrap().to_string_lossy().into_owned())
        })
        .collect();
    ids.sort();
    ids
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        pipewright().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        pipewright().arg("--version").assert().success();
    }

    #[test]
    fn test_orchestrate_requires_org_and_project() {
        let project = create_temp_project();
        pipewright()
            .current_dir(project.path())
            .args(["orchestrate", "/some/repo"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--org"));
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        pipewright().arg("deploy").assert().failure();
    }

    #[test]
    fn test_list_empty_state_dir() {
        let project = create_temp_project();
        pipewright()
            .current_dir(project.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No workflows found"));
    }
}

// =============================================================================
// Full run without approval
// =============================================================================

mod no_approval_run {
    use super::*;

    #[test]
    fn test_run_completes_and_checkpoints() {
        let project = create_temp_project();
        let repo = create_sample_repo(&project);

        pipewright()
            .current_dir(project.path())
            .args([
                "orchestrate",
                repo.to_str().unwrap(),
                "--org",
                "org-1",
                "--project",
                "proj-1",
                "--no-approval",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Orchestration complete"));

        let ids = workflow_ids(project.path());
        assert_eq!(ids.len(), 1);

        // The terminal checkpoint is a self-describing JSON document
        let snapshot_path = project
            .path()
            .join(".pipewright")
            .join(format!("{}.json", ids[0]));
        let snapshot: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(snapshot_path).unwrap()).unwrap();
        assert_eq!(snapshot["current_phase"], "complete");
        assert_eq!(snapshot["org_id"], "org-1");
        assert!(snapshot["total_duration_seconds"].is_number());
        assert!(
            snapshot["generated_templates"]["pipeline_yaml"]
                .as_str()
                .unwrap()
                .contains("pipeline")
        );
    }

    #[test]
    fn test_status_after_completion() {
        let project = create_temp_project();
        let repo = create_sample_repo(&project);

        pipewright()
            .current_dir(project.path())
            .args([
                "orchestrate",
                repo.to_str().unwrap(),
                "--org",
                "org-1",
                "--project",
                "proj-1",
                "--no-approval",
            ])
            .assert()
            .success();

        let ids = workflow_ids(project.path());
        pipewright()
            .current_dir(project.path())
            .args(["status", &ids[0]])
            .assert()
            .success()
            .stdout(predicate::str::contains("complete"))
            .stdout(predicate::str::contains("org-1/proj-1"));

        pipewright()
            .current_dir(project.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains(&ids[0]));
    }
}

// =============================================================================
// Suspend / resume cycle
// =============================================================================

mod suspend_resume {
    use super::*;

    fn start_suspended(project: &TempDir) -> String {
        let repo = create_sample_repo(project);
        pipewright()
            .current_dir(project.path())
            .args([
                "orchestrate",
                repo.to_str().unwrap(),
                "--org",
                "org-1",
                "--project",
                "proj-1",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("paused for human approval"));

        let ids = workflow_ids(project.path());
        assert_eq!(ids.len(), 1);
        ids.into_iter().next().unwrap()
    }

    #[test]
    fn test_suspends_at_approval() {
        let project = create_temp_project();
        let id = start_suspended(&project);

        pipewright()
            .current_dir(project.path())
            .args(["status", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("approval"))
            .stdout(predicate::str::contains("required=true approved=false"));
    }

    #[test]
    fn test_resume_approve_completes() {
        let project = create_temp_project();
        let id = start_suspended(&project);

        pipewright()
            .current_dir(project.path())
            .args(["resume", &id, "--approve"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Orchestration complete"));

        pipewright()
            .current_dir(project.path())
            .args(["status", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("complete"));

        // A finished workflow cannot be resumed again
        pipewright()
            .current_dir(project.path())
            .args(["resume", &id, "--approve"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already finished"));
    }

    #[test]
    fn test_resume_reject_fails_the_run() {
        let project = create_temp_project();
        let id = start_suspended(&project);

        pipewright()
            .current_dir(project.path())
            .args(["resume", &id, "--reject", "--feedback", "wrong cluster"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("error phase"));

        pipewright()
            .current_dir(project.path())
            .args(["status", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("Approval rejected: wrong cluster"));
    }

    #[test]
    fn test_resume_unknown_workflow() {
        let project = create_temp_project();
        pipewright()
            .current_dir(project.path())
            .args(["resume", "no-such-id", "--approve"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No checkpoint found"));
    }
}

// =============================================================================
// Validation failures
// =============================================================================

mod validation {
    use super::*;

    #[test]
    fn test_empty_org_fails_at_init() {
        let project = create_temp_project();
        let repo = create_sample_repo(&project);

        pipewright()
            .current_dir(project.path())
            .args([
                "orchestrate",
                repo.to_str().unwrap(),
                "--org",
                "",
                "--project",
                "proj-1",
            ])
            .assert()
            .failure()
            .stdout(predicate::str::contains("org_id is required"));
    }

    #[test]
    fn test_missing_repo_fails_in_analysis() {
        let project = create_temp_project();

        pipewright()
            .current_dir(project.path())
            .args([
                "orchestrate",
                project.path().join("absent").to_str().unwrap(),
                "--org",
                "org-1",
                "--project",
                "proj-1",
                "--no-approval",
            ])
            .assert()
            .failure()
            .stdout(predicate::str::contains("not a directory"));

        // The failed run still left a complete, inspectable checkpoint
        let ids = workflow_ids(project.path());
        assert_eq!(ids.len(), 1);
        pipewright()
            .current_dir(project.path())
            .args(["status", &ids[0]])
            .assert()
            .success()
            .stdout(predicate::str::contains("error"));
    }
}
