use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn repo_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("expected crates/<name> layout")
        .to_path_buf()
}

fn lazyblock() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("lazyblock"));
    cmd.current_dir(repo_root());
    cmd
}

/// Writes the `block` part of a fixture to `dir` and returns its path.
fn block_file(dir: &Path, fixture: &str) -> PathBuf {
    let path = repo_root().join("fixtures").join("blocks").join(fixture);
    assert!(path.exists(), "fixture missing: {}", path.display());
    let raw = fs::read_to_string(&path).expect("read fixture");
    let doc: Value = serde_json::from_str(&raw).expect("fixture json");
    let out = dir.join(fixture);
    fs::write(&out, doc["block"].to_string()).expect("write block");
    out
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

fn stdout_text(output: &std::process::Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("utf-8 stdout")
}

#[test]
fn render_prints_the_encoded_instance() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let block = block_file(tmp.path(), "youtube-embed.json");

    let assert = lazyblock()
        .args(["render", block.to_string_lossy().as_ref()])
        .assert()
        .success();
    let out = stdout_json(assert.get_output());

    assert_eq!(out["outcome"], "instance");
    assert_eq!(out["instance"]["instanceId"], "llb-1");
    assert_eq!(out["instance"]["scriptsAllowed"], false);
    assert_eq!(out["instance"]["iframeConfig"]["aspectRatio"], "16/9");
    let markup = out["markup"].as_str().expect("markup");
    assert!(markup.contains(r#"data-loaded="false""#));
    assert!(!markup.contains("<iframe"));
}

#[test]
fn render_uses_the_requested_instance_id() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let block = block_file(tmp.path(), "youtube-embed.json");

    let assert = lazyblock()
        .args(["render", "--markup", "--id", "hero", block.to_string_lossy().as_ref()])
        .assert()
        .success();
    let markup = stdout_text(assert.get_output());
    assert!(markup.contains(r#"id="hero""#));
    assert!(markup.contains("#hero .llb-content iframe"));
}

#[test]
fn unprivileged_script_is_refused_with_status_3() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let block = block_file(tmp.path(), "unprivileged-script.json");

    let assert = lazyblock()
        .args(["render", block.to_string_lossy().as_ref()])
        .assert()
        .code(3);
    let out = stdout_json(assert.get_output());
    assert_eq!(out["outcome"], "blocked");
    assert_eq!(out["reason"]["kind"], "unsafe_content");
    assert_eq!(out["warnings"][0], "script_tag");
    assert_eq!(out["markup"], "<!-- lazyblock: content blocked -->");
}

#[test]
fn privileged_flag_keeps_scripts() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let block = block_file(tmp.path(), "privileged-script.json");

    let assert = lazyblock()
        .args(["render", "--privileged", block.to_string_lossy().as_ref()])
        .assert()
        .success();
    let out = stdout_json(assert.get_output());
    assert_eq!(out["outcome"], "instance");
    assert_eq!(out["instance"]["scriptsAllowed"], true);
    let warnings = out["warnings"].as_array().expect("warnings");
    assert!(warnings.contains(&Value::from("script_tag")));
    assert!(warnings.contains(&Value::from("inline_event_handler")));
}

#[test]
fn settings_file_bounds_content_size() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let block = block_file(tmp.path(), "youtube-embed.json");
    let settings = tmp.path().join("settings.yaml");
    fs::write(&settings, "maxContentBytes: 8\n").expect("write settings");

    let assert = lazyblock()
        .args([
            "render",
            "--settings",
            settings.to_string_lossy().as_ref(),
            block.to_string_lossy().as_ref(),
        ])
        .assert()
        .code(3);
    let out = stdout_json(assert.get_output());
    assert_eq!(out["reason"]["kind"], "oversize");
    assert_eq!(out["reason"]["max"], 8);
}

#[test]
fn unreadable_settings_fail_with_status_1() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let block = block_file(tmp.path(), "youtube-embed.json");
    let settings = tmp.path().join("settings.toml");
    fs::write(&settings, "maxContentBytes = 8\n").expect("write settings");

    let assert = lazyblock()
        .args([
            "render",
            "--settings",
            settings.to_string_lossy().as_ref(),
            block.to_string_lossy().as_ref(),
        ])
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("unsupported settings format"), "{stderr}");
}

#[test]
fn scan_verdict_depends_on_privilege() {
    let html = r#"<a href="javascript:alert(1)">x</a>"#;

    let assert = lazyblock().arg("scan").write_stdin(html).assert().success();
    let out = stdout_json(assert.get_output());
    assert_eq!(out["verdict"], "unsafe");
    assert_eq!(out["warnings"][0], "javascript_url");
    assert_eq!(out["reasons"][0], "javascript: URL detected");

    let assert = lazyblock()
        .args(["scan", "--privileged"])
        .write_stdin(html)
        .assert()
        .success();
    assert_eq!(stdout_json(assert.get_output())["verdict"], "warned");
}

#[test]
fn sanitize_drops_handlers_and_scripts() {
    let assert = lazyblock()
        .arg("sanitize")
        .write_stdin(r#"<p onclick="x()">hi</p><script>alert(1)</script>"#)
        .assert()
        .success();
    assert_eq!(stdout_text(assert.get_output()), "<p>hi</p>\n");
}

#[test]
fn encode_and_decode_use_the_strict_alphabet() {
    let assert = lazyblock()
        .arg("encode")
        .write_stdin("<p>hi</p>")
        .assert()
        .success();
    assert_eq!(stdout_text(assert.get_output()), "PHA+aGk8L3A+\n");

    let assert = lazyblock()
        .arg("decode")
        .write_stdin("PHA+aGk8L3A+\n")
        .assert()
        .success();
    assert_eq!(stdout_text(assert.get_output()), "<p>hi</p>\n");

    let assert = lazyblock()
        .arg("decode")
        .write_stdin("PHA+aGk8L3A")
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("Malformed payload"), "{stderr}");
}

#[test]
fn activate_loads_rendered_markup() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let block = block_file(tmp.path(), "youtube-embed.json");

    let assert = lazyblock()
        .args(["render", "--markup", block.to_string_lossy().as_ref()])
        .assert()
        .success();
    let page = tmp.path().join("page.html");
    fs::write(&page, &assert.get_output().stdout).expect("write page");

    let assert = lazyblock()
        .args(["activate", "--id", "llb-1", page.to_string_lossy().as_ref()])
        .assert()
        .success();
    let out = stdout_json(assert.get_output());
    assert_eq!(out["instances"][0]["id"], "llb-1");
    assert_eq!(out["instances"][0]["state"], "loaded");
    let content = out["instances"][0]["content"].as_str().expect("content");
    assert!(content.contains("https://www.youtube.com/embed/dQw4w9WgXcQ"));
    assert_eq!(out["events"][0]["name"], "llb:loaded");

    lazyblock()
        .args(["activate", "--id", "llb-404", page.to_string_lossy().as_ref()])
        .assert()
        .code(1);
}

#[test]
fn activate_reports_malformed_payloads_as_events() {
    let page = r#"<div id="llb-1" class="wp-block-lazy-load-block llb-mode-button" data-content="!!!!" data-loaded="false" data-allow-scripts="false"><div class="llb-placeholder"><button type="button" class="llb-trigger llb-trigger-button">Load content</button></div><div class="llb-content" style="display: none;"></div></div>"#;

    let assert = lazyblock()
        .arg("activate")
        .write_stdin(page)
        .assert()
        .success();
    let out = stdout_json(assert.get_output());
    assert_eq!(out["instances"][0]["state"], "error");
    assert_eq!(out["events"][0]["name"], "llb:error");
    assert!(out["events"][0]["detail"].is_string());
}

#[test]
fn help_prints_usage() {
    let assert = lazyblock().arg("--help").assert().code(2);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("USAGE:"));
    assert!(stderr.contains("lazyblock activate"));
}
