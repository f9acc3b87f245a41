//! Runs the `ridx` binary against a temporary configuration.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ridx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ridx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();

    fs::write(
        files_dir.join("cv.docx"),
        docx(&[
            "Curriculum Vitae",
            "Email: jane.doe@example.com",
            "Backend engineer specialising in Rust and PostgreSQL.",
        ]),
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/ridx.sqlite"

[storage]
root = "{root}/data/blobs"

[retrieval]
default_limit = 3
default_min_score = 0.1
"#,
        root = root.display()
    );
    let config_path = config_dir.join("ridx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored),
        )
        .unwrap();
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{body}</w:body></w:document>"
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn run_ridx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ridx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ridx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Pull the document id out of `Submitted <id>`.
fn submitted_id(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("Submitted "))
        .unwrap_or_else(|| panic!("no document id in: {stdout}"))
        .trim()
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_ridx(&config, &["init"]);
    assert!(success, "init failed: {stderr}");
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/ridx.sqlite").exists());

    // Idempotent.
    let (_, stderr, success) = run_ridx(&config, &["init"]);
    assert!(success, "second init failed: {stderr}");
}

#[test]
fn test_submit_search_download_delete() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("files/cv.docx");
    let file = file.to_str().unwrap();

    let (stdout, stderr, success) = run_ridx(&config, &["submit", file, "--owner", "alice"]);
    assert!(success, "submit failed: {stderr}");
    assert!(stdout.contains("status: indexed"), "{stdout}");
    let id = submitted_id(&stdout);

    let (stdout, _, success) = run_ridx(&config, &["status", &id]);
    assert!(success);
    assert_eq!(stdout.trim(), "indexed");

    let (stdout, _, success) = run_ridx(&config, &["list", "--owner", "alice"]);
    assert!(success);
    assert!(stdout.contains(&id));
    assert!(stdout.contains("cv.docx"));

    let (stdout, stderr, success) = run_ridx(
        &config,
        &["search", "rust backend engineer", "--owner", "alice"],
    );
    assert!(success, "search failed: {stderr}");
    assert!(stdout.contains("cv.docx"), "{stdout}");
    assert!(!stdout.contains("jane.doe@example.com"));

    let (stdout, _, success) = run_ridx(
        &config,
        &["search", "rust backend engineer", "--owner", "bob"],
    );
    assert!(success);
    assert!(stdout.contains("No results."));

    let out = tmp.path().join("downloaded.docx");
    let (_, stderr, success) = run_ridx(
        &config,
        &["download", &id, "--owner", "alice", "--out", out.to_str().unwrap()],
    );
    assert!(success, "download failed: {stderr}");
    assert_eq!(
        fs::read(&out).unwrap(),
        fs::read(tmp.path().join("files/cv.docx")).unwrap()
    );

    let (_, _, success) = run_ridx(&config, &["delete", &id, "--owner", "bob"]);
    assert!(!success, "another owner must not delete");

    let (stdout, _, success) = run_ridx(&config, &["delete", &id, "--owner", "alice"]);
    assert!(success);
    assert!(stdout.contains(&format!("Deleted {id}")));

    let (stdout, _, success) = run_ridx(&config, &["status", &id]);
    assert!(success);
    assert_eq!(stdout.trim(), "deleted");
}

#[test]
fn test_submit_rejects_unknown_extension() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("files/notes.txt");
    fs::write(&file, "plain text").unwrap();

    let (_, stderr, success) = run_ridx(
        &config,
        &["submit", file.to_str().unwrap(), "--owner", "alice"],
    );
    assert!(!success);
    assert!(stderr.contains("--content-type"), "{stderr}");
}

#[test]
fn test_search_rejects_out_of_range_score() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_ridx(
        &config,
        &["search", "rust", "--owner", "alice", "--min-score", "2.0"],
    );
    assert!(!success);
    assert!(stderr.contains("min_score"), "{stderr}");
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_ridx(Path::new("/nonexistent/ridx.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "{stderr}");
}

#[test]
fn test_no_wait_submission_finishes_on_next_run() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("files/cv.docx");

    let (stdout, stderr, success) = run_ridx(
        &config,
        &["submit", file.to_str().unwrap(), "--owner", "alice", "--no-wait"],
    );
    assert!(success, "submit failed: {stderr}");
    assert!(stdout.contains("status: validated"), "{stdout}");
    let id = submitted_id(&stdout);

    let (stdout, stderr, success) = run_ridx(&config, &["status", &id]);
    assert!(success, "status failed: {stderr}");
    assert_eq!(stdout.trim(), "indexed");

    let (stdout, _, success) = run_ridx(
        &config,
        &["search", "rust backend engineer", "--owner", "alice"],
    );
    assert!(success);
    assert!(stdout.contains("cv.docx"), "{stdout}");
}

#[test]
fn test_stats_reports_owner_totals() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("files/cv.docx");
    let (_, stderr, success) = run_ridx(
        &config,
        &["submit", file.to_str().unwrap(), "--owner", "alice"],
    );
    assert!(success, "submit failed: {stderr}");

    let (stdout, stderr, success) = run_ridx(&config, &["stats", "--owner", "alice"]);
    assert!(success, "stats failed: {stderr}");
    assert!(stdout.starts_with("Documents for alice"), "{stdout}");
    assert!(stdout.contains("  Documents:   1"), "{stdout}");
    assert!(stdout.contains("  Pending:     0"), "{stdout}");
    assert!(stdout.contains("indexed"), "{stdout}");
    assert!(stdout.contains("cv"), "{stdout}");

    let (stdout, _, success) = run_ridx(&config, &["stats", "--owner", "bob"]);
    assert!(success);
    assert!(stdout.contains("  Documents:   0"), "{stdout}");
    assert!(stdout.contains("  Last upload: never"), "{stdout}");
}
