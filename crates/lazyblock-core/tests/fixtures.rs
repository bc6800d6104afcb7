use lazyblock_core::{Author, BlockConfiguration, Rendered, Renderer, Settings, payload};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

fn fixtures_root() -> PathBuf {
    workspace_root().join("fixtures").join("blocks")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fixture {
    author: Author,
    #[serde(default)]
    settings: Settings,
    block: BlockConfiguration,
    expect: Expect,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Expect {
    outcome: String,
    decoded: Option<String>,
    decoded_contains: Vec<String>,
    decoded_excludes: Vec<String>,
    markup_contains: Vec<String>,
    markup_excludes: Vec<String>,
}

fn list_fixture_files(root: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|e| e == "json"))
                .collect()
        })
        .unwrap_or_default();
    out.sort();
    out
}

fn outcome_name(rendered: &Rendered) -> &'static str {
    match rendered {
        Rendered::Empty => "empty",
        Rendered::Blocked(_) => "blocked",
        Rendered::Instance { .. } => "instance",
    }
}

#[test]
fn block_fixtures_render_as_expected() {
    let fixtures = list_fixture_files(&fixtures_root());
    assert!(
        !fixtures.is_empty(),
        "no fixtures found under {}",
        fixtures_root().display()
    );

    for path in fixtures {
        let text = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        let fixture: Fixture = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("invalid fixture {}: {e}", path.display()));

        let rendered = Renderer::new(fixture.settings)
            .render(&fixture.block, &fixture.author)
            .unwrap_or_else(|e| panic!("render failed for {}: {e}", path.display()));
        let expect = &fixture.expect;
        assert_eq!(
            outcome_name(&rendered),
            expect.outcome,
            "outcome mismatch for {}",
            path.display()
        );

        let markup = rendered.markup();
        for needle in &expect.markup_contains {
            assert!(
                markup.contains(needle.as_str()),
                "{}: markup is missing {needle:?}\n{markup}",
                path.display()
            );
        }
        for needle in &expect.markup_excludes {
            assert!(
                !markup.contains(needle.as_str()),
                "{}: markup unexpectedly contains {needle:?}\n{markup}",
                path.display()
            );
        }

        let Some(instance) = rendered.instance() else {
            continue;
        };
        let decoded = payload::decode(&instance.encoded_content)
            .unwrap_or_else(|e| panic!("{}: payload does not decode: {e}", path.display()));
        if let Some(want) = &expect.decoded {
            assert_eq!(&decoded, want, "decoded payload mismatch for {}", path.display());
        }
        for needle in &expect.decoded_contains {
            assert!(
                decoded.contains(needle.as_str()),
                "{}: payload is missing {needle:?}\n{decoded}",
                path.display()
            );
        }
        for needle in &expect.decoded_excludes {
            assert!(
                !decoded.contains(needle.as_str()),
                "{}: payload unexpectedly contains {needle:?}\n{decoded}",
                path.display()
            );
        }
    }
}

#[test]
fn fixtures_never_leak_author_html_outside_the_payload() {
    for path in list_fixture_files(&fixtures_root()) {
        let text = std::fs::read_to_string(&path).unwrap();
        let fixture: Fixture = serde_json::from_str(&text).unwrap();
        let rendered = Renderer::new(fixture.settings)
            .render(&fixture.block, &fixture.author)
            .unwrap();
        let markup = rendered.markup();
        for tag in ["<iframe", "<script", "onerror=", "onclick="] {
            assert!(
                !markup.to_ascii_lowercase().contains(tag),
                "{}: {tag} appears in rendered markup",
                path.display()
            );
        }
    }
}
