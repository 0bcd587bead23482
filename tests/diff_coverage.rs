use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use deltacov::model::{CiMetadata, CoverageFormat, Range, RepoConfig, RepoType};
use deltacov::repo::RepoCache;
use deltacov::service::diff_coverage;
use deltacov::store::{IngestInput, SqliteStore, Store};

fn git(args: &[&str], cwd: &Path) {
    let status = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_AUTHOR_NAME", "test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .expect("git must be on PATH to run this test");
    assert!(status.success(), "git {args:?} failed in {cwd:?}");
}

fn git_output(args: &[&str], cwd: &Path) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("git must be on PATH to run this test");
    assert!(out.status.success(), "git {args:?} failed in {cwd:?}");
    String::from_utf8(out.stdout).unwrap().trim().to_string()
}

fn range(sl: i64, sc: i64, el: i64, ec: i64, statements: i64, hit: i64) -> Range {
    Range {
        start_line: sl,
        start_col: sc,
        end_line: el,
        end_col: ec,
        statements,
        hit,
    }
}

/// Builds a throwaway bare repo with a `master` branch and a `feature`
/// branch that adds lines 10-12 to `pkg/a.go`, and returns
/// `(origin_path, base_sha, target_sha)`.
fn build_origin_repo(root: &Path) -> (std::path::PathBuf, String, String) {
    let origin = root.join("origin.git");
    std::fs::create_dir_all(&origin).unwrap();
    git(&["init", "--bare", "-q"], &origin);

    let work = root.join("work");
    git(&["clone", "-q", origin.to_str().unwrap(), work.to_str().unwrap()], root);

    let base_lines: Vec<String> = (1..=9).map(|n| format!("line {n}")).collect();
    std::fs::create_dir_all(work.join("pkg")).unwrap();
    std::fs::write(work.join("pkg/a.go"), base_lines.join("\n") + "\n").unwrap();
    git(&["add", "-A"], &work);
    git(&["commit", "-q", "-m", "base"], &work);
    git(&["branch", "-M", "master"], &work);
    git(&["push", "-q", "origin", "master"], &work);
    let base_sha = git_output(&["rev-parse", "HEAD"], &work);

    let mut all_lines = base_lines;
    all_lines.push("line 10".to_string());
    all_lines.push("line 11".to_string());
    all_lines.push("line 12".to_string());
    std::fs::write(work.join("pkg/a.go"), all_lines.join("\n") + "\n").unwrap();
    git(&["checkout", "-q", "-b", "feature"], &work);
    git(&["add", "-A"], &work);
    git(&["commit", "-q", "-m", "feature"], &work);
    git(&["push", "-q", "origin", "feature"], &work);
    let target_sha = git_output(&["rev-parse", "HEAD"], &work);

    (origin, base_sha, target_sha)
}

#[tokio::test]
async fn diff_coverage_matches_scenario_five() {
    let root = tempfile::TempDir::new().unwrap();
    let (origin, base_sha, target_sha) = build_origin_repo(root.path());

    let store = SqliteStore::open_in_memory().unwrap();
    let repo_url = origin.to_str().unwrap().to_string();

    store
        .upsert_config(&RepoConfig {
            repo_id: "42".to_string(),
            repo_name: "o/r".to_string(),
            repo_url: repo_url.clone(),
            repo_type: RepoType::Go,
            base_branch: "master".to_string(),
            exclude_dirs: vec![],
            exclude_files: vec![],
            created_at: 0,
            updated_at: 0,
        })
        .unwrap();

    let mut blocks = HashMap::new();
    blocks.insert(
        "pkg/a.go".to_string(),
        vec![range(10, 1, 11, 9, 2, 5), range(12, 1, 12, 9, 1, 0)],
    );
    let report = store
        .ingest(IngestInput {
            repo_id: "42",
            repo_name: "o/r",
            branch: "main",
            commit: &target_sha,
            ci: CiMetadata::default(),
            format: CoverageFormat::Goc,
            raw_trace: "mode: set",
            blocks,
            default_base_branch: "master",
            now_ms: 1_000,
        })
        .unwrap();

    let cache = RepoCache::new(root.path().join("cache"));

    let result = diff_coverage(&store, &cache, report.id, None).await.unwrap();

    assert_eq!(result.base_commit, base_sha);
    assert_eq!(result.files.len(), 1);
    let file = &result.files[0];
    assert_eq!(file.path, "pkg/a.go");
    assert_eq!(file.lines.len(), 3);

    let by_line: HashMap<i64, _> = file.lines.iter().map(|l| (l.line, *l)).collect();
    assert_eq!(by_line[&10].hit, 5);
    assert_eq!(by_line[&11].hit, 5);
    assert_eq!(by_line[&12].hit, 0);

    assert_eq!(result.summary.new_covered, 2);
    assert_eq!(result.summary.new_uncovered, 1);
    assert!((result.summary.rate() - 66.66666666666667).abs() < 1e-9);
}
