//! Screens evaluated, rendered and driven end to end.

use compose_ide::action;
use compose_ide::evaluator::Interpreter;
use compose_ide::parser::Span;
use compose_ide::render::HostNode;
use compose_ide::value::{RuntimeError, Value};
use compose_ide::vnode::VNode;
use compose_ide::{BuilderApi, Preview, RecordingHost, RenderError, RenderMode, Surface, evaluate};
use serde_json::json;
use std::rc::Rc;

const COUNTER: &str = r#"
const title = 'Clicks: ' + state.counter
render(() => Column(add => {
  add(Text(title))
  add(Button(() => execute('counter = counter + 1'), 'Increment'))
}))
"#;

fn badge(_: &mut Interpreter<'_>, arguments: &[Value], _: Span) -> Result<Value, RuntimeError> {
    let label = arguments.first().map(Value::to_string).unwrap_or_default();
    Ok(Value::Node(Rc::new(VNode::new("span").with_text(label))))
}

#[test]
fn same_source_and_state_give_same_tree() {
    let api = BuilderApi::standard();
    let state = json!({ "counter": 4 });
    let first = evaluate(COUNTER, &api, &state, &mut RecordingHost::default()).unwrap();
    let second = evaluate(COUNTER, &api, &state, &mut RecordingHost::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.text_content(), "Clicks: 4Increment");
}

#[test]
fn custom_builders_join_the_vocabulary() {
    let api = BuilderApi::standard().with_builder("Badge", badge);
    assert!(api.names().any(|name| name == "Badge"));
    let root = evaluate(
        "render(() => Row(add => add(Badge(state.count))))",
        &api,
        &json!({ "count": 3 }),
        &mut RecordingHost::default(),
    )
    .unwrap();
    assert_eq!(root.text_content(), "3");

    let error = evaluate(
        "render(() => Badge(1))",
        &BuilderApi::standard(),
        &json!({}),
        &mut RecordingHost::default(),
    )
    .unwrap_err();
    assert!(error.to_string().contains("Badge"), "{error}");
}

#[test]
fn failing_list_item_does_not_break_siblings() {
    let mut host = RecordingHost::default();
    let root = evaluate(
        "render(() => LazyColumn([1, 2, 3], item => item === 2 ? null.boom : Text('#' + item)))",
        &BuilderApi::standard(),
        &json!({}),
        &mut host,
    )
    .unwrap();
    assert_eq!(root.children.len(), 3);
    assert_eq!(root.text_content(), "#1Error rendering item 1#3");
    assert_eq!(host.logs.len(), 1);
}

#[test]
fn action_statements_apply_independently() {
    let outcome = action::execute("counter = counter + 1", &json!({ "counter": 0 }));
    assert_eq!(outcome.state, json!({ "counter": 1 }));

    let outcome = action::execute("user.profile.name = 'Ann'", &json!({}));
    assert_eq!(outcome.state, json!({ "user": { "profile": { "name": "Ann" } } }));

    let outcome = action::execute("a = 1; b = ; c = a + 2", &json!({}));
    assert!(outcome.changed);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.state, json!({ "a": 1, "c": 3 }));
}

#[tokio::test]
async fn click_through_builtin_preview() {
    let mut preview = Preview::new(RenderMode::Builtin);
    let mut surface = Surface::new("preview");
    let mut host = RecordingHost::default();
    let mut state = json!({ "counter": 0 });

    for expected in 0..3 {
        preview.refresh(COUNTER, &state, &mut surface, &mut host).await.unwrap();
        assert_eq!(surface.text_content(), format!("Clicks: {expected}Increment"));
        surface.trigger(0, "click", &mut host).unwrap();
        for action in host.actions.drain(..) {
            state = action::execute(&action, &state).state;
        }
    }
    assert_eq!(state["counter"], json!(3));
}

#[tokio::test]
async fn runtime_error_replaces_output_with_error_box() {
    let mut preview = Preview::new(RenderMode::Builtin);
    let mut surface = Surface::new("preview");
    let mut host = RecordingHost::default();
    preview
        .refresh(COUNTER, &json!({ "counter": 1 }), &mut surface, &mut host)
        .await
        .unwrap();

    let result = preview
        .refresh("render(() => Text(missing))", &json!({}), &mut surface, &mut host)
        .await;
    assert!(matches!(result, Err(RenderError::Eval(_))));
    assert!(surface.text_content().starts_with("DSL Runtime Error:"));
    assert!(matches!(surface.nodes(), [HostNode::Element(element)] if element.tag == "pre"));
}

#[tokio::test]
async fn external_mode_without_renderer_keeps_previous_output() {
    let mut preview = Preview::new(RenderMode::Builtin);
    let mut surface = Surface::new("preview");
    let mut host = RecordingHost::default();
    let state = json!({ "counter": 2 });
    preview.refresh(COUNTER, &state, &mut surface, &mut host).await.unwrap();

    preview.set_mode(RenderMode::External);
    assert!(!preview.has_renderer());
    let result = preview.refresh(COUNTER, &state, &mut surface, &mut host).await;
    assert!(matches!(result, Err(RenderError::RendererUnavailable)));
    assert_eq!(surface.text_content(), "Clicks: 2Increment");
}
