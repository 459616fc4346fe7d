//! End-to-end navigation through the engine against an in-memory document,
//! history and a scripted transport.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use common::{page, settings, MockTransport};
use pronto::{
    CommandReply, Dispatch, Document, Form, FormSubmit, History, InitError, LifecycleEvent,
    LifecycleKind, LinkEvent, MemoryHistory, Method, Modifiers, Mutation, NavError, NavEvent,
    NavState, PageCommand, PageResponse, Pronto, RequestKind, ScriptRunner, Settings,
    TransferState, VirtualDocument,
};

type Engine = Pronto<VirtualDocument, MemoryHistory>;

const START: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Page One</title>
<link rel="stylesheet" href="/css/a.css">
<script src="/js/a.js"></script>
</head>
<body class="page one">
<aside id="sidebar"><p>Links</p></aside>
<div id="content"><p>One</p>
<form id="search" action="/search"><input name="q" value="rust lang"></form>
<form id="comment" method="post" action="/comment"><input name="q" value="test"></form>
</div>
<span id="counter"></span>
</body>
</html>"#;

fn engine_with(settings: Settings, transport: &Arc<MockTransport>) -> Engine {
    Pronto::new(
        settings,
        transport.clone(),
        VirtualDocument::parse(START),
        MemoryHistory::new("/page1"),
    )
    .unwrap()
}

fn engine(transport: &Arc<MockTransport>) -> Engine {
    engine_with(settings(), transport)
}

fn drain(rx: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn kinds(events: &[LifecycleEvent]) -> Vec<LifecycleKind> {
    events.iter().map(|e| e.kind).collect()
}

fn click(pronto: &mut Engine, href: &str) -> Dispatch {
    pronto.dispatch(NavEvent::Click(LinkEvent::new(href)))
}

// ─── Link clicks ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn click_swaps_content_and_pushes_history() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);
    let mut rx = pronto.subscribe();

    assert_eq!(click(&mut pronto, "/page2"), Dispatch::Handled);
    assert_eq!(pronto.state(), NavState::RequestPending);
    pronto.settle().await;

    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
    assert_eq!(pronto.document().title().as_deref(), Some("Page Two"));
    assert_eq!(pronto.current_url(), "/page2");
    assert_eq!(pronto.history().len(), 2);
    assert_eq!(pronto.history().location(), "/page2");
    assert_eq!(pronto.history().entries()[1].title, "state-/page2");
    assert_eq!(transport.urls(), ["/page2"]);
    assert_eq!(pronto.session().pass, 1);
    assert_eq!(pronto.state(), NavState::Idle);

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        [
            LifecycleKind::Request,
            LifecycleKind::BeforeLoad,
            LifecycleKind::Load,
            LifecycleKind::Render
        ]
    );
    assert!(events.iter().all(|e| e.url == "/page2" && e.error.is_none()));
}

#[tokio::test]
async fn revisiting_a_page_uses_the_cache() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    click(&mut pronto, "/page2");
    pronto.settle().await;
    click(&mut pronto, "/page3");
    pronto.settle().await;

    // Served synchronously from the cache, no settle needed
    assert_eq!(click(&mut pronto, "/page2"), Dispatch::Handled);
    assert!(pronto.is_settled());
    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
    assert_eq!(transport.count("/page2"), 1);
    assert_eq!(pronto.history().len(), 4);
}

#[tokio::test]
async fn hash_only_click_does_not_fetch() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    assert_eq!(click(&mut pronto, "/page1#comments"), Dispatch::Default);
    assert!(pronto.is_settled());
    assert!(transport.calls().is_empty());
    assert_eq!(pronto.current_url(), "/page1#comments");
    assert_eq!(pronto.history().len(), 1);
}

#[tokio::test]
async fn bare_hash_link_is_left_to_the_host() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    assert_eq!(click(&mut pronto, "/page2#"), Dispatch::Default);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn relative_links_resolve_against_an_absolute_location() {
    let two = page("Page Two", "Two", "");
    let transport = Arc::new(MockTransport::new().page("https://site.test/page2", &two));
    let mut pronto = Pronto::new(
        settings(),
        transport.clone(),
        VirtualDocument::parse(START),
        MemoryHistory::new("https://site.test/page1"),
    )
    .unwrap();

    assert_eq!(click(&mut pronto, "/page1#comments"), Dispatch::Default);
    assert!(transport.calls().is_empty());
    assert_eq!(pronto.current_url(), "https://site.test/page1#comments");

    assert_eq!(click(&mut pronto, "page2"), Dispatch::Handled);
    pronto.settle().await;
    assert_eq!(transport.urls(), ["https://site.test/page2"]);
    assert_eq!(pronto.current_url(), "https://site.test/page2");
    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
}

#[tokio::test]
async fn exotic_links_are_ignored() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    let links = [
        LinkEvent::new("/page2").with_attr("class", "no-ajaxy"),
        LinkEvent::new("/page2").with_attr("target", "_blank"),
        LinkEvent::new("/page2").with_button(2),
        LinkEvent::new("/page2").with_modifiers(Modifiers {
            ctrl: true,
            ..Modifiers::default()
        }),
        LinkEvent::new("/wp-admin/edit.php"),
        LinkEvent::new("https://elsewhere.test/page2"),
    ];
    for link in links {
        assert_eq!(pronto.dispatch(NavEvent::Click(link)), Dispatch::Ignored);
    }
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn clicking_the_current_page_only_refreshes_when_asked() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    assert_eq!(click(&mut pronto, "/page1"), Dispatch::Handled);
    assert!(transport.calls().is_empty());

    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine_with(
        Settings {
            refresh: true,
            ..settings()
        },
        &transport,
    );
    click(&mut pronto, "/page1");
    pronto.settle().await;
    assert_eq!(transport.urls(), ["/page1"]);
    assert_eq!(pronto.history().len(), 1);
}

// ─── Forms ───────────────────────────────────────────────────────────────────

fn form(id: &str) -> Form {
    Form::parse_all(START, &format!("form#{id}"))
        .unwrap()
        .remove(0)
}

#[tokio::test]
async fn startup_takes_over_forms() {
    let transport = Arc::new(MockTransport::site());
    let pronto = engine(&transport);

    let actions: Vec<_> = pronto
        .session()
        .forms
        .iter()
        .map(|f| f.action.as_str())
        .collect();
    assert_eq!(actions, ["/search", "/comment"]);
}

#[tokio::test]
async fn post_form_sends_serialized_fields() {
    let transport = Arc::new(
        MockTransport::site().page("/comment", &page("Thanks", "Comment saved", "")),
    );
    let mut pronto = engine(&transport);
    let mut rx = pronto.subscribe();

    let dispatch = pronto.dispatch(NavEvent::Submit(FormSubmit::new(form("comment"))));
    assert_eq!(dispatch, Dispatch::Handled);
    pronto.settle().await;

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, Method::Post);
    assert_eq!(calls[0].url, "/comment");
    assert_eq!(calls[0].body.as_deref(), Some("q=test"));
    assert_eq!(
        pronto.document().element_html("content"),
        Some("<p>Comment saved</p>")
    );
    assert_eq!(pronto.current_url(), "/comment");
    assert_eq!(kinds(&drain(&mut rx))[..2], [LifecycleKind::Submit, LifecycleKind::Request]);
}

#[tokio::test]
async fn get_form_navigates_to_query_url() {
    let transport = Arc::new(
        MockTransport::site().page("/search?q=rust+lang", &page("Results", "2 hits", "")),
    );
    let mut pronto = engine(&transport);

    let submit = FormSubmit::new(form("search"));
    pronto.dispatch(NavEvent::Submit(submit));
    pronto.settle().await;

    assert_eq!(transport.calls()[0].method, Method::Get);
    assert_eq!(pronto.current_url(), "/search?q=rust+lang");
    assert_eq!(pronto.document().element_html("content"), Some("<p>2 hits</p>"));
}

#[tokio::test]
async fn excluded_forms_are_ignored() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    let mut form = form("comment");
    form.attrs.push(("class".into(), "no-ajaxy".into()));
    assert_eq!(
        pronto.dispatch(NavEvent::Submit(FormSubmit::new(form))),
        Dispatch::Ignored
    );

    let mut external = self::form("comment");
    external.action = "https://elsewhere.test/comment".into();
    assert_eq!(
        pronto.dispatch(NavEvent::Submit(FormSubmit::new(external))),
        Dispatch::Ignored
    );
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn forms_swapped_out_are_no_longer_submitted() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    click(&mut pronto, "/page2");
    pronto.settle().await;
    assert!(pronto.session().forms.is_empty());

    assert_eq!(
        pronto.dispatch(NavEvent::Submit(FormSubmit::new(form("comment")))),
        Dispatch::Ignored
    );
    assert_eq!(transport.urls(), ["/page2"]);
}

#[tokio::test]
async fn forms_swapped_in_are_taken_over() {
    let contact = r#"<html><head><title>Contact</title></head><body>
<div id="content"><form id="contact" method="post" action="/contact"><input name="msg" value="hi"></form></div>
</body></html>"#;
    let transport = Arc::new(
        MockTransport::site()
            .page("/contact-us", contact)
            .page("/contact", &page("Sent", "Message sent", "")),
    );
    let mut pronto = engine(&transport);

    click(&mut pronto, "/contact-us");
    pronto.settle().await;
    let forms = &pronto.session().forms;
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0].action, "/contact");

    let form = Form::parse_all(contact, "form#contact").unwrap().remove(0);
    assert_eq!(
        pronto.dispatch(NavEvent::Submit(FormSubmit::new(form))),
        Dispatch::Handled
    );
    pronto.settle().await;

    let calls = transport.calls();
    assert_eq!(calls[1].method, Method::Post);
    assert_eq!(calls[1].body.as_deref(), Some("msg=hi"));
    assert_eq!(
        pronto.document().element_html("content"),
        Some("<p>Message sent</p>")
    );
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn back_button_restores_page_and_scroll() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    pronto.document_mut().scroll_to(300);
    click(&mut pronto, "/page2");
    pronto.settle().await;
    assert_eq!(pronto.document().scroll_top(), 0);

    let state = pronto.history_mut().back().unwrap();
    assert_eq!(state.url, "/page1");
    let dispatch = pronto.dispatch(NavEvent::PopState {
        url: Some(state.url),
    });
    assert_eq!(dispatch, Dispatch::Handled);
    pronto.settle().await;

    assert_eq!(pronto.document().element_html("content"), Some("<p>One</p>"));
    assert_eq!(pronto.current_url(), "/page1");
    assert_eq!(pronto.document().scroll_top(), 300);
    // Replaced, not pushed: forward is still possible
    assert_eq!(pronto.history().len(), 2);
    assert_eq!(pronto.history_mut().forward().map(|s| s.url).as_deref(), Some("/page2"));
}

#[tokio::test]
async fn popstate_without_state_is_ignored() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    assert_eq!(pronto.dispatch(NavEvent::PopState { url: None }), Dispatch::Ignored);
    assert_eq!(
        pronto.dispatch(NavEvent::PopState {
            url: Some("/page1".into())
        }),
        Dispatch::Ignored
    );
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn navigate_replaces_the_entry() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    assert_eq!(pronto.dispatch(NavEvent::Navigate("/page3".into())), Dispatch::Handled);
    pronto.settle().await;

    assert_eq!(pronto.history().len(), 1);
    assert_eq!(pronto.history().location(), "/page3");
    assert_eq!(pronto.dispatch(NavEvent::Navigate("page3".into())), Dispatch::Ignored);
}

#[tokio::test]
async fn canonical_link_names_the_history_entry() {
    let head = r#"<link rel="canonical" href="/articles/two">"#;
    let transport = Arc::new(MockTransport::new().page("/page2", &page("Two", "Two", head)));
    let mut pronto = engine_with(
        Settings {
            canonical: true,
            ..settings()
        },
        &transport,
    );

    click(&mut pronto, "/page2");
    pronto.settle().await;
    assert_eq!(pronto.current_url(), "/articles/two");
    assert_eq!(pronto.document().page_views(), ["/articles/two"]);
}

// ─── Prefetch and admission ──────────────────────────────────────────────────

#[tokio::test]
async fn hover_prefetch_serves_the_following_click() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    let hover = pronto.dispatch(NavEvent::Hover(LinkEvent::new("/page2")));
    assert_eq!(hover, Dispatch::Default);
    assert_eq!(
        pronto.command(PageCommand::GetState),
        CommandReply::State(TransferState::Busy(RequestKind::Prefetch))
    );
    pronto.settle().await;
    // Nothing rendered by the prefetch itself
    assert_eq!(pronto.document().element_html("content").map(|h| h.contains("One")), Some(true));

    click(&mut pronto, "/page2");
    assert!(pronto.is_settled());
    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
    assert_eq!(transport.count("/page2"), 1);
}

#[tokio::test]
async fn prefetch_is_rejected_while_a_request_is_in_flight() {
    let transport = Arc::new(MockTransport::site().hold("/page2"));
    let mut pronto = engine(&transport);

    click(&mut pronto, "/page2");
    assert_eq!(
        pronto.dispatch(NavEvent::Touch(LinkEvent::new("/page3"))),
        Dispatch::Rejected
    );
    let CommandReply::Xhr(Some(xhr)) = pronto.command(PageCommand::GetXhr) else {
        panic!("expected a current transfer");
    };
    assert_eq!((xhr.kind, xhr.url.as_str()), (RequestKind::Normal, "/page2"));
}

#[tokio::test]
async fn new_click_aborts_the_pending_request() {
    let transport = Arc::new(MockTransport::site().hold("/page2"));
    let mut pronto = engine(&transport);
    let mut rx = pronto.subscribe();

    click(&mut pronto, "/page2");
    assert!(timeout(Duration::from_millis(20), pronto.settle()).await.is_err());
    assert_eq!(transport.urls(), ["/page2"]);

    click(&mut pronto, "/page3");
    pronto.settle().await;

    assert_eq!(transport.urls(), ["/page2", "/page3"]);
    assert_eq!(pronto.document().element_html("content"), Some("<p>Three</p>"));
    assert_eq!(pronto.current_url(), "/page3");
    let renders: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| e.kind == LifecycleKind::Render)
        .map(|e| e.url)
        .collect();
    assert_eq!(renders, ["/page3"]);
}

/// Click `/page2`, feed `event` before the response arrives, then settle.
async fn interrupt_page2(event: NavEvent, expected: Dispatch) -> Engine {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    assert_eq!(click(&mut pronto, "/page2"), Dispatch::Handled);
    assert_eq!(pronto.dispatch(event), expected);
    pronto.settle().await;
    pronto
}

fn assert_on_page2(pronto: &Engine) {
    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
    assert_eq!(pronto.current_url(), "/page2");
    assert_eq!(pronto.history().location(), "/page2");
    assert_eq!(pronto.history().len(), 2);
}

#[tokio::test]
async fn modified_click_keeps_the_pending_request() {
    let ctrl = LinkEvent::new("/page3").with_modifiers(Modifiers {
        ctrl: true,
        ..Modifiers::default()
    });
    let pronto = interrupt_page2(NavEvent::Click(ctrl), Dispatch::Ignored).await;
    assert_on_page2(&pronto);
}

#[tokio::test]
async fn external_click_keeps_the_pending_request() {
    let external = LinkEvent::new("https://elsewhere.test/x");
    let pronto = interrupt_page2(NavEvent::Click(external), Dispatch::Ignored).await;
    assert_on_page2(&pronto);
    assert_eq!(pronto.document().title().as_deref(), Some("Page Two"));
}

#[tokio::test]
async fn hash_click_keeps_the_pending_request() {
    let hash = LinkEvent::new("/page1#top");
    let pronto = interrupt_page2(NavEvent::Click(hash), Dispatch::Default).await;
    assert_on_page2(&pronto);
}

#[tokio::test]
async fn popstate_to_the_current_page_keeps_the_pending_request() {
    let pop = NavEvent::PopState {
        url: Some("/page1".into()),
    };
    let pronto = interrupt_page2(pop, Dispatch::Ignored).await;
    assert_on_page2(&pronto);
}

#[tokio::test]
async fn clicking_the_current_page_drops_the_pending_request() {
    let current = NavEvent::Click(LinkEvent::new("/page1"));
    let pronto = interrupt_page2(current, Dispatch::Handled).await;

    assert_eq!(pronto.document().element_html("content").map(|h| h.contains("One")), Some(true));
    assert_eq!(pronto.current_url(), "/page1");
    assert_eq!(pronto.history().len(), 1);
    assert_eq!(pronto.session().pass, 0);
}

#[tokio::test]
async fn racing_prefetches_both_reach_the_cache() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    assert_eq!(
        pronto.dispatch(NavEvent::Hover(LinkEvent::new("/page2"))),
        Dispatch::Default
    );
    assert_eq!(
        pronto.dispatch(NavEvent::Touch(LinkEvent::new("/page3"))),
        Dispatch::Default
    );
    let CommandReply::Xhr(Some(xhr)) = pronto.command(PageCommand::GetXhr) else {
        panic!("expected a current transfer");
    };
    assert_eq!((xhr.kind, xhr.url.as_str()), (RequestKind::Prefetch, "/page3"));

    pronto.settle().await;
    assert_eq!(transport.count("/page2"), 1);
    assert_eq!(transport.count("/page3"), 1);
    assert_eq!(pronto.session().pass, 0);

    click(&mut pronto, "/page2");
    assert!(pronto.is_settled());
    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
    click(&mut pronto, "/page3");
    assert!(pronto.is_settled());
    assert_eq!(pronto.document().element_html("content"), Some("<p>Three</p>"));
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test]
async fn prefetch_can_be_switched_off() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine_with(
        Settings {
            prefetchoff: pronto::Toggle::Flag(true),
            ..settings()
        },
        &transport,
    );

    assert_eq!(
        pronto.dispatch(NavEvent::Hover(LinkEvent::new("/page2"))),
        Dispatch::Ignored
    );
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn preview_renders_prefetched_links_inside_containers() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine_with(
        Settings {
            previewoff: pronto::Toggle::Flag(false),
            ..settings()
        },
        &transport,
    );

    pronto.dispatch(NavEvent::Hover(LinkEvent::new("/page2").inside("content")));
    pronto.settle().await;

    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
    // Previews never push
    assert_eq!(pronto.history().len(), 1);
    assert_eq!(pronto.current_url(), "/page2");
}

// ─── Render delay ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn render_waits_for_the_request_delay() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine_with(
        Settings {
            request_delay: 200,
            ..settings()
        },
        &transport,
    );

    click(&mut pronto, "/page2");
    tokio::select! {
        () = pronto.settle() => panic!("rendered before the delay elapsed"),
        () = tokio::time::sleep(Duration::from_millis(100)) => {}
    }
    assert_eq!(pronto.state(), NavState::Rendering);
    assert!(pronto.document().element_html("content").is_some_and(|h| h.contains("One")));
    assert_eq!(
        pronto.dispatch(NavEvent::Hover(LinkEvent::new("/page3"))),
        Dispatch::Rejected
    );

    pronto.settle().await;
    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
    assert_eq!(pronto.state(), NavState::Idle);
}

#[tokio::test(start_paused = true)]
async fn abort_cancels_a_scheduled_render() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine_with(
        Settings {
            request_delay: 200,
            ..settings()
        },
        &transport,
    );

    click(&mut pronto, "/page2");
    tokio::select! {
        () = pronto.settle() => panic!("rendered before the delay elapsed"),
        () = tokio::time::sleep(Duration::from_millis(50)) => {}
    }
    assert_eq!(pronto.command(PageCommand::Abort), CommandReply::Aborted);
    assert!(pronto.is_settled());
    assert!(pronto.document().element_html("content").is_some_and(|h| h.contains("One")));
}

// ─── Document updates ────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_container_becomes_placeholder() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine_with(
        Settings {
            containers: vec!["content".into(), "sidebar".into()],
            ..settings()
        },
        &transport,
    );

    click(&mut pronto, "/page2");
    pronto.settle().await;

    assert_eq!(pronto.document().element_html("sidebar"), Some(""));
    assert_eq!(pronto.document().element("sidebar").unwrap().tag, "aside");
    assert!(pronto
        .document()
        .mutations()
        .contains(&Mutation::Placeholder("sidebar".into())));
}

#[tokio::test]
async fn only_new_resources_are_inserted() {
    let head = r#"<link rel="stylesheet" href="/css/a.css">
<link rel="stylesheet" href="/css/b.css">
<script src="/js/a.js"></script>
<script src="/js/c.js"></script>
<style>p { color: red }</style>"#;
    let transport = Arc::new(MockTransport::new().page("/page2", &page("Two", "Two", head)));
    let mut pronto = engine(&transport);

    click(&mut pronto, "/page2");
    pronto.settle().await;

    let doc = pronto.document();
    let appended: Vec<_> = doc
        .mutations()
        .iter()
        .filter(|m| matches!(m, Mutation::AppendScript(_) | Mutation::AppendStylesheet(_)))
        .cloned()
        .collect();
    assert_eq!(
        appended,
        [
            Mutation::AppendStylesheet("/css/b.css".into()),
            Mutation::AppendScript("/js/c.js".into())
        ]
    );
    assert_eq!(doc.styles(), ["p { color: red }"]);
    assert_eq!(doc.script_sources(), ["/js/a.js", "/js/c.js"]);
}

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<String>>>);

impl ScriptRunner for Recorder {
    fn run(&mut self, source: &str) -> anyhow::Result<()> {
        self.0.borrow_mut().push(source.to_string());
        Ok(())
    }

    fn enter_page(&mut self, href: &str) {
        self.0.borrow_mut().push(format!("enter {href}"));
    }
}

#[tokio::test]
async fn inline_scripts_run_once_per_swap() {
    let html = r#"<html><head><title>Two</title></head><body>
<div id="content"><p>Two</p><script>window.counter = 2;</script></div>
<script>jQuery('#x').ajaxify({});</script>
</body></html>"#;
    let transport = Arc::new(MockTransport::new().page("/page2", html));
    let recorder = Recorder::default();
    let mut pronto = engine_with(
        Settings {
            inlineappend: false,
            ..settings()
        },
        &transport,
    )
    .with_script_runner(recorder.clone());

    click(&mut pronto, "/page2");
    pronto.settle().await;

    assert_eq!(
        *recorder.0.borrow(),
        ["enter /page2", "window.counter = 2;"]
    );
    // The swapped container never carries the script itself
    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
}

#[tokio::test]
async fn appended_inline_scripts_are_replaced_each_pass() {
    let html = r#"<html><head><title>Two</title></head><body>
<div id="content"><p>Two</p><script>window.counter = 2;</script></div>
</body></html>"#;
    let transport = Arc::new(MockTransport::site().page("/page2", html));
    let mut pronto = engine(&transport);

    click(&mut pronto, "/page2");
    pronto.settle().await;
    assert_eq!(pronto.document().inline_scripts().len(), 1);
    assert!(pronto.document().inline_scripts()[0].has_class("ajy-inline"));

    click(&mut pronto, "/page3");
    pronto.settle().await;
    assert!(pronto.document().inline_scripts().is_empty());
}

#[tokio::test]
async fn pass_counter_and_body_classes() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine_with(
        Settings {
            pass_count: Some("counter".into()),
            body_classes: true,
            ..settings()
        },
        &transport,
    );

    click(&mut pronto, "/page2");
    pronto.settle().await;
    assert_eq!(pronto.document().element_html("counter"), Some("Pass: 1"));
    assert_eq!(pronto.document().body_classes().as_deref(), Some("page two"));

    click(&mut pronto, "/page3");
    pronto.settle().await;
    assert_eq!(pronto.document().element_html("counter"), Some("Pass: 2"));
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn error_status_still_renders_and_reports() {
    let not_found = PageResponse {
        status: 404,
        ..PageResponse::html(&page("Not Found", "Gone", ""))
    };
    let transport = Arc::new(MockTransport::new().respond("/gone", not_found));
    let mut pronto = engine(&transport);
    let mut rx = pronto.subscribe();

    let seen: Rc<RefCell<Vec<Option<NavError>>>> = Rc::default();
    let sink = Rc::clone(&seen);
    pronto.on_complete(move |error| sink.borrow_mut().push(error.cloned()));

    click(&mut pronto, "/gone");
    pronto.settle().await;

    let expected = NavError::Status {
        url: "/gone".into(),
        status: 404,
    };
    assert_eq!(*seen.borrow(), [Some(expected.clone())]);
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| e.kind == LifecycleKind::Error && e.error.as_ref() == Some(&expected)));
    assert_eq!(pronto.document().element_html("content"), Some("<p>Gone</p>"));
}

#[tokio::test]
async fn transport_failure_renders_empty_page() {
    let transport = Arc::new(MockTransport::new());
    let mut pronto = engine(&transport);
    let mut rx = pronto.subscribe();

    click(&mut pronto, "/nowhere");
    pronto.settle().await;

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| e.kind == LifecycleKind::Error));
    assert!(matches!(
        pronto.session().last_error,
        Some(NavError::Transport(_))
    ));
    // Placeholder for the container the empty page lacks
    assert_eq!(pronto.document().element_html("content"), Some(""));
}

#[tokio::test]
async fn non_html_response_falls_back_to_full_load() {
    let pdf = PageResponse {
        status: 200,
        content_type: Some("application/pdf".into()),
        body: "%PDF-1.7".into(),
    };
    let transport = Arc::new(MockTransport::site().respond("/report.pdf", pdf));
    let mut pronto = engine(&transport);

    click(&mut pronto, "/report.pdf");
    pronto.settle().await;

    assert_eq!(pronto.history().assigned(), ["/report.pdf"]);
    assert_eq!(pronto.current_url(), "/page1");
    assert_eq!(pronto.session().pass, 0);
}

// ─── Page commands ───────────────────────────────────────────────────────────

#[tokio::test]
async fn page_commands_drive_the_cache_directly() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    let CommandReply::Started(id) = pronto.command(PageCommand::FetchByUrl("/page2".into())) else {
        panic!("expected a network request");
    };
    let CommandReply::Xhr(Some(xhr)) = pronto.command(PageCommand::GetXhr) else {
        panic!("expected a current transfer");
    };
    assert_eq!((xhr.id, xhr.url.as_str()), (id, "/page2"));

    pronto.settle().await;
    // Fetching alone never renders
    assert_eq!(pronto.session().pass, 0);
    assert_eq!(
        pronto.command(PageCommand::GetState),
        CommandReply::State(TransferState::Idle)
    );
    assert_eq!(
        pronto.command(PageCommand::FetchByUrl("/page2#top".into())),
        CommandReply::Cached
    );
    assert_eq!(
        pronto.command(PageCommand::LoadIntoDom),
        CommandReply::Canonical(None)
    );
    assert_eq!(pronto.document().element_html("content"), Some("<p>Two</p>"));
    assert_eq!(transport.count("/page2"), 1);
}

#[tokio::test]
async fn duplicate_prefetch_command_is_skipped() {
    let transport = Arc::new(MockTransport::site().hold("/page2"));
    let mut pronto = engine(&transport);

    assert!(matches!(
        pronto.command(PageCommand::Prefetch("/page2".into())),
        CommandReply::Started(_)
    ));
    assert_eq!(
        pronto.command(PageCommand::Prefetch("/page2#reviews".into())),
        CommandReply::Skipped
    );
    assert_eq!(
        pronto.command(PageCommand::GetState),
        CommandReply::State(TransferState::Busy(RequestKind::Prefetch))
    );
}

#[tokio::test]
async fn run_processes_events_until_input_closes() {
    let transport = Arc::new(MockTransport::site());
    let mut pronto = engine(&transport);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tx.send(NavEvent::Click(LinkEvent::new("/page2"))).unwrap();
    tx.send(NavEvent::Click(LinkEvent::new("/page3"))).unwrap();
    drop(tx);
    pronto.run(rx).await;

    assert_eq!(pronto.current_url(), "/page3");
    assert!(pronto.is_settled());
}

// ─── Startup ─────────────────────────────────────────────────────────────────

#[test]
fn startup_failures() {
    let transport: Arc<MockTransport> = Arc::new(MockTransport::site());
    let doc = || VirtualDocument::parse(START);

    let disabled = Settings {
        pluginon: false,
        ..settings()
    };
    assert!(matches!(
        Pronto::new(disabled, transport.clone(), doc(), MemoryHistory::new("/")),
        Err(InitError::Disabled)
    ));

    assert!(matches!(
        Pronto::new(
            settings(),
            transport.clone(),
            doc(),
            MemoryHistory::unsupported("/")
        ),
        Err(InitError::NoHistory)
    ));

    let broken = Settings {
        selector: "a[".into(),
        ..settings()
    };
    assert!(matches!(
        Pronto::new(broken, transport, doc(), MemoryHistory::new("/")),
        Err(InitError::InvalidSelector(s)) if s == "a["
    ));
}

#[test]
fn startup_registers_loaded_resources() {
    let transport = Arc::new(MockTransport::site());
    let pronto = engine_with(
        Settings {
            root_url: Some("https://site.test/".into()),
            ..settings()
        },
        &transport,
    );

    let registry = pronto.session().delta.registry();
    assert_eq!(registry.stylesheets(), ["/css/a.css"]);
    assert_eq!(registry.scripts(), ["/js/a.js"]);
    assert_eq!(pronto.root(), "https://site.test/");
    assert_eq!(pronto.history().entries()[0].title, "state-/page1");
}
