use crate::*;
use lazyblock_core::{Author, BlockConfiguration, BlockReason, Rendered, Renderer, Settings};
use std::cell::RefCell;
use std::rc::Rc;

fn page_markup(blocks: &[(BlockConfiguration, Author)]) -> String {
    let mut renderer = Renderer::default();
    let mut out = String::from("<main>");
    for (block, author) in blocks {
        out.push_str(renderer.render(block, author).unwrap().markup());
        out.push_str("<p>between blocks</p>");
    }
    out.push_str("</main>");
    out
}

fn iframe_block() -> BlockConfiguration {
    BlockConfiguration::with_html(r#"<iframe src="https://e.com/v"></iframe>"#)
}

fn auto_block() -> BlockConfiguration {
    BlockConfiguration {
        auto_load_on_visible: true,
        ..BlockConfiguration::with_html("<p>auto</p>")
    }
}

fn controller(html: &str) -> (ActivationController<HeadlessHost>, Rc<RefCell<Vec<LifecycleEvent>>>) {
    let mut controller = ActivationController::from_markup(html, HeadlessHost::default()).unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    controller.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    (controller, events)
}

fn in_view() -> ViewportGeometry {
    ViewportGeometry::new(100.0, 400.0, 800.0)
}

#[test]
fn click_loads_after_the_injection_delay() {
    let html = page_markup(&[(iframe_block(), Author::contributor())]);
    let (mut c, events) = controller(&html);
    assert_eq!(c.init(), 1);

    assert_eq!(c.dispatch(TriggerEvent::click("llb-1")), Dispatch::Started);
    let node = c.page().instance("llb-1").unwrap();
    assert_eq!(node.state(), ActivationState::Loading);
    assert!(!node.placeholder_visible());
    assert!(node.loader_visible());

    assert_eq!(c.advance(INJECT_DELAY_MS - 1), 0);
    assert_eq!(c.state("llb-1"), Some(ActivationState::Loading));
    assert_eq!(c.advance(1), 1);
    assert_eq!(c.now(), INJECT_DELAY_MS);

    let node = c.page().instance("llb-1").unwrap();
    assert_eq!(node.state(), ActivationState::Loaded);
    assert!(node.data_loaded());
    assert_eq!(node.data_content(), None);
    assert!(!node.loader_visible());
    assert!(node.content_visible());
    assert!(node.content().contains(r#"src="https://e.com/v""#));
    assert!(node.content().contains(r#"loading="lazy""#));

    assert_eq!(c.host().injected.len(), 1);
    assert_eq!(
        *events.borrow(),
        vec![LifecycleEvent::Loaded {
            instance_id: "llb-1".to_string()
        }]
    );
}

#[test]
fn both_triggers_in_succession_activate_once() {
    let html = page_markup(&[(auto_block(), Author::contributor())]);
    let (mut c, events) = controller(&html);
    c.init();

    assert_eq!(c.dispatch(TriggerEvent::click("llb-1")), Dispatch::Started);
    assert_eq!(
        c.dispatch(TriggerEvent::viewport("llb-1", in_view())),
        Dispatch::Ignored
    );
    assert_eq!(c.dispatch(TriggerEvent::key("llb-1", Key::Enter)), Dispatch::Ignored);
    assert_eq!(c.load("llb-1"), Dispatch::Ignored);

    assert_eq!(c.run_until_idle(), 1);
    assert_eq!(c.host().injected.len(), 1);
    assert_eq!(events.borrow().len(), 1);

    assert_eq!(c.dispatch(TriggerEvent::click("llb-1")), Dispatch::Ignored);
    assert!(c.is_idle());
}

#[test]
fn viewport_watcher_fires_within_margin_then_detaches() {
    let html = page_markup(&[(auto_block(), Author::contributor())]);
    let (mut c, _) = controller(&html);
    c.init();

    let far = ViewportGeometry::new(1000.0, 1300.0, 800.0);
    assert_eq!(c.dispatch(TriggerEvent::viewport("llb-1", far)), Dispatch::Ignored);
    let near = ViewportGeometry::new(850.0, 1150.0, 800.0);
    assert_eq!(c.dispatch(TriggerEvent::viewport("llb-1", near)), Dispatch::Started);
    c.run_until_idle();
    assert_eq!(c.state("llb-1"), Some(ActivationState::Loaded));
}

#[test]
fn viewport_events_are_ignored_without_auto_load() {
    let html = page_markup(&[(iframe_block(), Author::contributor())]);
    let (mut c, _) = controller(&html);
    c.init();
    assert_eq!(
        c.dispatch(TriggerEvent::viewport("llb-1", in_view())),
        Dispatch::Ignored
    );
    assert_eq!(c.state("llb-1"), Some(ActivationState::Pending));
}

#[test]
fn keyboard_activation_uses_enter_and_space_only() {
    let html = page_markup(&[
        (iframe_block(), Author::contributor()),
        (iframe_block(), Author::contributor()),
    ]);
    let (mut c, _) = controller(&html);
    c.init();
    assert_eq!(c.dispatch(TriggerEvent::key("llb-1", Key::Other)), Dispatch::Ignored);
    assert_eq!(c.dispatch(TriggerEvent::key("llb-1", Key::Enter)), Dispatch::Started);
    assert_eq!(
        c.dispatch(TriggerEvent::key("llb-2", Key::from_dom_key(" "))),
        Dispatch::Started
    );
}

#[test]
fn triggers_need_init_but_programmatic_load_does_not() {
    let html = page_markup(&[
        (iframe_block(), Author::contributor()),
        (iframe_block(), Author::contributor()),
    ]);
    let (mut c, _) = controller(&html);
    assert_eq!(c.dispatch(TriggerEvent::click("llb-1")), Dispatch::Ignored);
    assert_eq!(c.load("llb-2"), Dispatch::Started);
    assert_eq!(c.load("llb-404"), Dispatch::Ignored);
}

#[test]
fn init_is_idempotent_and_picks_up_inserted_instances() {
    let html = page_markup(&[
        (iframe_block(), Author::contributor()),
        (auto_block(), Author::contributor()),
    ]);
    let (mut c, _) = controller(&html);
    assert_eq!(c.init(), 2);
    assert_eq!(c.init(), 0);

    c.load("llb-1");
    c.run_until_idle();

    let mut later = Renderer::default().with_id_source(lazyblock_core::IdSource::Sequential { next: 3 });
    let swapped = later
        .render(&iframe_block(), &Author::contributor())
        .unwrap()
        .markup()
        .to_string();
    assert_eq!(c.insert_markup(&swapped).unwrap(), vec!["llb-3"]);
    assert_eq!(c.init(), 1);
    assert!(c.page().instance("llb-3").unwrap().is_wired());
    assert_eq!(c.state("llb-1"), Some(ActivationState::Loaded));
}

#[test]
fn load_all_queries_pending_instances_at_call_time() {
    let html = page_markup(&[
        (iframe_block(), Author::contributor()),
        (iframe_block(), Author::contributor()),
        (iframe_block(), Author::contributor()),
    ]);
    let (mut c, events) = controller(&html);
    c.load("llb-2");
    assert!(c.remove_instance("llb-3"));

    assert_eq!(c.load_all(), 1);
    assert_eq!(c.run_until_idle(), 2);
    assert_eq!(c.state("llb-1"), Some(ActivationState::Loaded));
    assert_eq!(c.state("llb-2"), Some(ActivationState::Loaded));
    assert_eq!(events.borrow().len(), 2);
}

#[test]
fn instance_removed_before_injection_is_dropped_quietly() {
    let html = page_markup(&[(iframe_block(), Author::contributor())]);
    let (mut c, events) = controller(&html);
    c.load("llb-1");
    c.remove_instance("llb-1");
    assert_eq!(c.run_until_idle(), 1);
    assert!(c.host().injected.is_empty());
    assert!(events.borrow().is_empty());
}

#[test]
fn privileged_script_is_rematerialized_and_run() {
    let block = BlockConfiguration {
        allow_scripts: true,
        ..BlockConfiguration::with_html("<script>alert(1)</script><p>hi</p>")
    };
    let html = page_markup(&[(block, Author::administrator())]);
    let (mut c, _) = controller(&html);
    assert!(c.page().instance("llb-1").unwrap().allow_scripts());

    c.init();
    c.dispatch(TriggerEvent::click("llb-1"));
    c.run_until_idle();

    let host = c.host();
    assert_eq!(host.executed.len(), 1);
    assert_eq!(host.executed[0].0, "llb-1");
    assert_eq!(host.executed[0].1.text, "alert(1)");
    assert!(host.executed[0].1.is_inline());
    let content = c.page().instance("llb-1").unwrap().content();
    assert!(content.contains("<script>alert(1)</script>"));
    assert!(content.contains("<p>hi</p>"));
}

#[test]
fn options_follow_settings() {
    let settings = Settings {
        max_content_bytes: 64,
        ..Default::default()
    };
    let options = ControllerOptions::from_settings(&settings);
    assert_eq!(options.max_content_bytes, 64);
    assert_eq!(options.inject_delay_ms, INJECT_DELAY_MS);
}

#[test]
fn publish_and_activation_share_the_size_bound() {
    let block = iframe_block();
    let raw = block.html_content.len();
    let hardened = lazyblock_core::sanitize(&block.html_content, false)
        .with_hardened_iframes()
        .len();
    assert!(hardened > raw);

    // Raw content fits, hardened content does not: refuse at publish time.
    let tight = Settings {
        max_content_bytes: raw + 1,
        ..Default::default()
    };
    let out = Renderer::new(tight.clone())
        .render(&block, &Author::contributor())
        .unwrap();
    assert_eq!(
        out,
        Rendered::Blocked(BlockReason::Oversize {
            len: hardened,
            max: tight.max_content_bytes,
        })
    );

    // Whatever publishes at a given bound also loads at that bound.
    let exact = Settings {
        max_content_bytes: hardened,
        ..Default::default()
    };
    let markup = Renderer::new(exact.clone())
        .render(&block, &Author::contributor())
        .unwrap()
        .markup()
        .to_string();
    let mut c = ActivationController::from_markup(&markup, HeadlessHost::default())
        .unwrap()
        .with_options(ControllerOptions::from_settings(&exact));
    assert_eq!(c.load("llb-1"), Dispatch::Started);
    c.run_until_idle();
    assert_eq!(c.state("llb-1"), Some(ActivationState::Loaded));
}
