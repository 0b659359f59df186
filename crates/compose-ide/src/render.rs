//! Render adapter: turns node trees into host elements on a render surface.
//!
//! Two paths fill a surface. The builtin path evaluates the screen source and
//! materializes the resulting tree. The external path hands the serialized
//! state and the surface id to an `ExternalRenderer` and shows the markup it
//! returns.

use crate::error::{EvalError, InteractionError, RenderError};
use crate::evaluator::{self, BuilderApi, Host};
use crate::value::format_number;
use crate::vnode::{Child, Handler, Prop, VNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RENDERER_TIMEOUT: Duration = Duration::from_millis(5000);

pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

#[derive(Debug, Clone, PartialEq)]
pub enum HostNode {
    Text(String),
    Element(HostElement),
    /// Markup written by an external renderer, kept verbatim.
    Markup(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostElement {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// CSS property name to value.
    pub style: BTreeMap<String, String>,
    /// Event name to handler.
    pub listeners: Vec<(String, Handler)>,
    pub children: Vec<HostNode>,
}

impl HostElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            style: BTreeMap::new(),
            listeners: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn listener(&self, event: &str) -> Option<&Handler> {
        self.listeners
            .iter()
            .find(|(name, _)| name == event)
            .map(|(_, handler)| handler)
    }
}

/// Recursively convert a node tree into host nodes.
pub fn materialize(vnode: &VNode) -> HostNode {
    let mut element = HostElement::new(vnode.tag.as_str());
    for (name, prop) in &vnode.props {
        match prop {
            Prop::Handler(handler) if name.len() > 2 && name.starts_with("on") => {
                element
                    .listeners
                    .push((name[2..].to_lowercase(), handler.clone()));
            }
            Prop::Handler(_) => log::debug!("Ignoring handler in non-event prop `{name}`"),
            Prop::Data(serde_json::Value::Object(style)) if name == "style" => {
                for (property, value) in style {
                    if let Some(value) = css_value(value) {
                        element.style.insert(css_property(property), value);
                    }
                }
            }
            Prop::Data(value) => {
                if let Some(value) = attribute_value(value) {
                    let name = if name == "className" { "class" } else { name.as_str() };
                    element.attributes.insert(name.to_string(), value);
                }
            }
        }
    }
    element.children = vnode
        .children
        .iter()
        .map(|child| match child {
            Child::Text(text) => HostNode::Text(text.clone()),
            Child::Node(node) => materialize(node),
        })
        .collect();
    HostNode::Element(element)
}

/// `maxWidth` -> `max-width`
fn css_property(name: &str) -> String {
    let mut property = String::with_capacity(name.len() + 4);
    for character in name.chars() {
        if character.is_ascii_uppercase() {
            property.push('-');
            property.push(character.to_ascii_lowercase());
        } else {
            property.push(character);
        }
    }
    property
}

fn css_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(number) => {
            Some(format!("{}px", format_number(number.as_f64().unwrap_or(0.0))))
        }
        other => attribute_value(other),
    }
}

fn attribute_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(format_number(number.as_f64().unwrap_or(0.0))),
        other => Some(other.to_string()),
    }
}

fn error_box(error: &EvalError) -> HostNode {
    let mut element = HostElement::new("pre");
    element
        .attributes
        .insert("class".to_string(), "dsl-error".to_string());
    element.children.push(HostNode::Text(format!(
        "DSL Runtime Error:\n{error}\n\n{}",
        error.stack()
    )));
    HostNode::Element(element)
}

/// Render target identified by `id`.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    pub id: String,
    nodes: Vec<HostNode>,
}

impl Surface {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn append(&mut self, node: HostNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[HostNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Listener-bearing elements in document order.
    pub fn interactive(&self) -> Vec<&HostElement> {
        fn walk<'a>(node: &'a HostNode, found: &mut Vec<&'a HostElement>) {
            if let HostNode::Element(element) = node {
                if !element.listeners.is_empty() {
                    found.push(element);
                }
                for child in &element.children {
                    walk(child, found);
                }
            }
        }
        let mut found = Vec::new();
        for node in &self.nodes {
            walk(node, &mut found);
        }
        found
    }

    /// Fire `event` on the interactive element at `index`.
    ///
    /// Handler failures are logged to the host as `Action error: <message>`.
    pub fn trigger(
        &self,
        index: usize,
        event: &str,
        host: &mut dyn Host,
    ) -> Result<(), InteractionError> {
        let interactive = self.interactive();
        let element = interactive
            .get(index)
            .ok_or(InteractionError::NoSuchElement(index))?;
        let handler = element
            .listener(event)
            .ok_or_else(|| InteractionError::NoListener {
                index,
                event: event.to_string(),
            })?;
        match handler.invoke(host) {
            Ok(()) => Ok(()),
            Err(error) => {
                log::warn!("Action error: {error}");
                host.log(&format!("Action error: {error}"));
                Err(InteractionError::Handler(error))
            }
        }
    }

    pub fn text_content(&self) -> String {
        fn walk(node: &HostNode, text: &mut String) {
            match node {
                HostNode::Text(content) => text.push_str(content),
                HostNode::Element(element) => {
                    for child in &element.children {
                        walk(child, text);
                    }
                }
                HostNode::Markup(_) => {}
            }
        }
        let mut text = String::new();
        for node in &self.nodes {
            walk(node, &mut text);
        }
        text
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for node in &self.nodes {
            write_html(node, &mut html);
        }
        html
    }
}

fn write_html(node: &HostNode, html: &mut String) {
    match node {
        HostNode::Text(text) => html.push_str(&escape(text)),
        HostNode::Markup(markup) => html.push_str(markup),
        HostNode::Element(element) => {
            html.push('<');
            html.push_str(&element.tag);
            for (name, value) in &element.attributes {
                html.push_str(&format!(" {name}=\"{}\"", escape(value)));
            }
            if !element.style.is_empty() {
                let style = element
                    .style
                    .iter()
                    .map(|(property, value)| format!("{property}: {value}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                html.push_str(&format!(" style=\"{}\"", escape(&style)));
            }
            html.push('>');
            if is_void(&element.tag) {
                return;
            }
            for child in &element.children {
                write_html(child, html);
            }
            html.push_str(&format!("</{}>", element.tag));
        }
    }
}

fn is_void(tag: &str) -> bool {
    matches!(tag, "img" | "br" | "hr" | "input" | "meta" | "link")
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Builtin,
    External,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => write!(f, "builtin"),
            Self::External => write!(f, "external"),
        }
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "builtin" => Ok(Self::Builtin),
            "external" => Ok(Self::External),
            other => Err(format!(
                "unknown render mode `{other}`, expected `builtin` or `external`"
            )),
        }
    }
}

/// A renderer loaded from outside the crate.
///
/// It receives the state document serialized as JSON and the id of the
/// target surface, and resolves to the markup shown on that surface.
pub trait ExternalRenderer {
    fn render_into<'a>(
        &'a mut self,
        serialized_state: &'a str,
        target_id: &'a str,
    ) -> LocalBoxFuture<'a, Result<String, String>>;
}

/// Render pipeline of one preview surface.
pub struct Preview {
    mode: RenderMode,
    api: BuilderApi,
    renderer: Option<Box<dyn ExternalRenderer>>,
    timeout: Duration,
}

impl Preview {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            api: BuilderApi::standard(),
            renderer: None,
            timeout: DEFAULT_RENDERER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api(mut self, api: BuilderApi) -> Self {
        self.api = api;
        self
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        log::info!("Render mode set to {mode}");
        self.mode = mode;
    }

    pub fn load_renderer(&mut self, renderer: Box<dyn ExternalRenderer>) {
        self.renderer = Some(renderer);
    }

    pub fn unload_renderer(&mut self) {
        self.renderer = None;
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Re-render `surface` with the current mode.
    ///
    /// Actions the DSL dispatches while rendering reach `host`, applying them
    /// is up to the caller.
    pub async fn refresh(
        &mut self,
        source: &str,
        state: &serde_json::Value,
        surface: &mut Surface,
        host: &mut dyn Host,
    ) -> Result<(), RenderError> {
        match self.mode {
            RenderMode::Builtin => self.render_builtin(source, state, surface, host),
            RenderMode::External => self.render_external(state, surface).await,
        }
    }

    fn render_builtin(
        &self,
        source: &str,
        state: &serde_json::Value,
        surface: &mut Surface,
        host: &mut dyn Host,
    ) -> Result<(), RenderError> {
        let result = evaluator::evaluate(source, &self.api, state, host);
        surface.clear();
        match result {
            Ok(root) => {
                surface.append(materialize(&root));
                log::debug!("Builtin render of `{}` complete", surface.id);
                Ok(())
            }
            Err(error) => {
                log::warn!("DSL Runtime Error: {error}");
                host.log(&format!("DSL Runtime Error: {error}"));
                surface.append(error_box(&error));
                Err(RenderError::Eval(error))
            }
        }
    }

    async fn render_external(
        &mut self,
        state: &serde_json::Value,
        surface: &mut Surface,
    ) -> Result<(), RenderError> {
        let Some(renderer) = self.renderer.as_mut() else {
            log::warn!("External render requested but no renderer is loaded");
            return Err(RenderError::RendererUnavailable);
        };
        let serialized_state =
            serde_json::to_string(state).map_err(|error| RenderError::RendererFailed(error.to_string()))?;

        surface.clear();
        let outcome = tokio::time::timeout(
            self.timeout,
            renderer.render_into(&serialized_state, &surface.id),
        )
        .await;
        match outcome {
            Ok(Ok(markup)) => {
                surface.append(HostNode::Markup(markup));
                log::debug!("External render of `{}` complete", surface.id);
                Ok(())
            }
            Ok(Err(message)) => {
                log::warn!("External renderer failed: {message}");
                Err(RenderError::RendererFailed(message))
            }
            Err(_) => {
                log::warn!("External renderer timed out after {:?}", self.timeout);
                Err(RenderError::RendererTimedOut(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::RecordingHost;
    use serde_json::json;

    const COUNTER_SOURCE: &str = "render(() => Column(add => {\n  add(Text('Count ' + state.counter))\n  add(Button('counter = counter + 1', 'Add'))\n  add(Image('logo.png'))\n}))";

    struct MarkupRenderer(&'static str);

    impl ExternalRenderer for MarkupRenderer {
        fn render_into<'a>(
            &'a mut self,
            serialized_state: &'a str,
            target_id: &'a str,
        ) -> LocalBoxFuture<'a, Result<String, String>> {
            Box::pin(async move { Ok(format!("{}{target_id}:{serialized_state}", self.0)) })
        }
    }

    struct FailingRenderer;

    impl ExternalRenderer for FailingRenderer {
        fn render_into<'a>(
            &'a mut self,
            _serialized_state: &'a str,
            _target_id: &'a str,
        ) -> LocalBoxFuture<'a, Result<String, String>> {
            Box::pin(async { Err("renderer crashed".to_string()) })
        }
    }

    struct StalledRenderer;

    impl ExternalRenderer for StalledRenderer {
        fn render_into<'a>(
            &'a mut self,
            _serialized_state: &'a str,
            _target_id: &'a str,
        ) -> LocalBoxFuture<'a, Result<String, String>> {
            Box::pin(std::future::pending())
        }
    }

    #[test]
    fn test_materialize_props() {
        let mut host = RecordingHost::default();
        let root = evaluator::evaluate(
            COUNTER_SOURCE,
            &BuilderApi::standard(),
            &json!({ "counter": 2 }),
            &mut host,
        )
        .unwrap();
        let HostNode::Element(column) = materialize(&root) else {
            panic!("Expected element");
        };
        assert_eq!(column.style.get("flex-direction").map(String::as_str), Some("column"));
        let HostNode::Element(button) = &column.children[1] else {
            panic!("Expected button element");
        };
        assert_eq!(button.attributes.get("class").map(String::as_str), Some("compose-button"));
        assert!(button.listener("click").is_some());
        let HostNode::Element(image) = &column.children[2] else {
            panic!("Expected image element");
        };
        assert_eq!(image.style.get("max-width").map(String::as_str), Some("120px"));
        assert_eq!(image.style.get("border-radius").map(String::as_str), Some("8px"));
    }

    #[test]
    fn test_to_html_escapes() {
        let mut surface = Surface::new("preview");
        let mut element = HostElement::new("div");
        element.attributes.insert("title".to_string(), "a \"b\"".to_string());
        element.style.insert("font-size".to_string(), "14px".to_string());
        element.children.push(HostNode::Text("<script> & co".to_string()));
        element.children.push(HostNode::Element(HostElement::new("img")));
        surface.append(HostNode::Element(element));
        assert_eq!(
            surface.to_html(),
            "<div title=\"a &quot;b&quot;\" style=\"font-size: 14px\">&lt;script&gt; &amp; co<img></div>"
        );
    }

    #[tokio::test]
    async fn test_builtin_refresh_replaces_content() {
        let mut preview = Preview::new(RenderMode::Builtin);
        let mut surface = Surface::new("preview");
        let mut host = RecordingHost::default();
        for _ in 0..2 {
            preview
                .refresh(COUNTER_SOURCE, &json!({ "counter": 1 }), &mut surface, &mut host)
                .await
                .unwrap();
        }
        assert_eq!(surface.nodes().len(), 1);
        assert_eq!(surface.text_content(), "Count 1Add");
    }

    #[tokio::test]
    async fn test_builtin_error_box() {
        let mut preview = Preview::new(RenderMode::Builtin);
        let mut surface = Surface::new("preview");
        let mut host = RecordingHost::default();
        let error = preview
            .refresh("render(() => nope())", &json!({}), &mut surface, &mut host)
            .await
            .unwrap_err();
        assert!(matches!(error, RenderError::Eval(EvalError::Runtime { .. })));
        let HostNode::Element(pre) = &surface.nodes()[0] else {
            panic!("Expected error box");
        };
        assert_eq!(pre.tag, "pre");
        assert_eq!(pre.attributes.get("class").map(String::as_str), Some("dsl-error"));
        assert!(
            surface
                .text_content()
                .starts_with("DSL Runtime Error:\nnope is not defined\n\nat <anonymous> (1:14)")
        );
    }

    #[test]
    fn test_trigger_dispatches_and_reports() {
        let mut host = RecordingHost::default();
        let root = evaluator::evaluate(
            "render(() => Row(add => {\n  add(Button('a = 1', 'A'))\n  add(Button(() => missing(), 'B'))\n}))",
            &BuilderApi::standard(),
            &json!({}),
            &mut host,
        )
        .unwrap();
        let mut surface = Surface::new("preview");
        surface.append(materialize(&root));
        assert_eq!(surface.interactive().len(), 2);

        surface.trigger(0, "click", &mut host).unwrap();
        assert_eq!(host.actions, vec!["a = 1".to_string()]);

        let error = surface.trigger(1, "click", &mut host).unwrap_err();
        assert!(matches!(error, InteractionError::Handler(_)));
        assert_eq!(host.logs, vec!["Action error: missing is not defined".to_string()]);

        assert!(matches!(
            surface.trigger(5, "click", &mut host),
            Err(InteractionError::NoSuchElement(5))
        ));
        assert!(matches!(
            surface.trigger(0, "hover", &mut host),
            Err(InteractionError::NoListener { .. })
        ));
    }

    #[tokio::test]
    async fn test_external_without_renderer_keeps_output() {
        let mut preview = Preview::new(RenderMode::Builtin);
        let mut surface = Surface::new("preview");
        let mut host = RecordingHost::default();
        preview
            .refresh(COUNTER_SOURCE, &json!({ "counter": 0 }), &mut surface, &mut host)
            .await
            .unwrap();
        let before = surface.to_html();

        preview.set_mode(RenderMode::External);
        let error = preview
            .refresh(COUNTER_SOURCE, &json!({ "counter": 0 }), &mut surface, &mut host)
            .await
            .unwrap_err();
        assert!(matches!(error, RenderError::RendererUnavailable));
        assert_eq!(surface.to_html(), before);
    }

    #[tokio::test]
    async fn test_external_renderer_receives_state() {
        let mut preview = Preview::new(RenderMode::External);
        preview.load_renderer(Box::new(MarkupRenderer("state:")));
        let mut surface = Surface::new("preview");
        let mut host = RecordingHost::default();
        preview
            .refresh("", &json!({ "counter": 3 }), &mut surface, &mut host)
            .await
            .unwrap();
        assert_eq!(surface.to_html(), "state:preview:{\"counter\":3}");
        assert!(matches!(surface.nodes(), [HostNode::Markup(_)]));

        preview
            .refresh("", &json!({ "counter": 4 }), &mut surface, &mut host)
            .await
            .unwrap();
        assert_eq!(surface.to_html(), "state:preview:{\"counter\":4}");
    }

    #[tokio::test]
    async fn test_external_failure_and_timeout_clear_surface() {
        let mut surface = Surface::new("preview");
        surface.append(HostNode::Text("old".to_string()));
        let mut host = RecordingHost::default();

        let mut preview = Preview::new(RenderMode::External);
        preview.load_renderer(Box::new(FailingRenderer));
        let error = preview
            .refresh("", &json!({}), &mut surface, &mut host)
            .await
            .unwrap_err();
        assert!(matches!(error, RenderError::RendererFailed(message) if message == "renderer crashed"));
        assert!(surface.is_empty());

        surface.append(HostNode::Text("old".to_string()));
        let mut preview =
            Preview::new(RenderMode::External).with_timeout(Duration::from_millis(20));
        preview.load_renderer(Box::new(StalledRenderer));
        let error = preview
            .refresh("", &json!({}), &mut surface, &mut host)
            .await
            .unwrap_err();
        assert!(matches!(error, RenderError::RendererTimedOut(_)));
        assert!(surface.is_empty());
    }

    #[test]
    fn test_render_mode_parsing() {
        assert_eq!("External".parse::<RenderMode>(), Ok(RenderMode::External));
        assert_eq!("builtin".parse::<RenderMode>(), Ok(RenderMode::Builtin));
        assert!("wasm".parse::<RenderMode>().is_err());
        assert_eq!(RenderMode::External.to_string(), "external");
    }
}
