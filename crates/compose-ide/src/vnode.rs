//! Host-agnostic node tree produced by the evaluator.

use crate::parser::SourceCode;
use crate::value::Closure;
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct VNode {
    pub tag: String,
    pub props: BTreeMap<String, Prop>,
    pub children: Vec<Child>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Node(Rc<VNode>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    Data(serde_json::Value),
    Handler(Handler),
}

/// What happens when the user interacts with an element.
#[derive(Clone, PartialEq)]
pub enum Handler {
    /// Literal action text, dispatched as is.
    Action(String),
    /// DSL function run with the scope it captured.
    Callback(Callback),
}

#[derive(Clone)]
pub struct Callback {
    pub closure: Closure,
    pub source: SourceCode,
}

// Two renders of the same source produce equal trees.
impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.closure.function.span == other.closure.function.span
            && self.source.as_str() == other.source.as_str()
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Self::Callback(callback) => {
                write!(f, "Callback({:?})", callback.closure.function.span)
            }
        }
    }
}

impl VNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            props: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.props.insert(name.into(), Prop::Data(value));
        self
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: Handler) -> Self {
        self.props.insert(name.into(), Prop::Handler(handler));
        self
    }

    pub fn with_children(mut self, children: Vec<Child>) -> Self {
        self.children = children;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Child::Text(text.into()));
        self
    }

    /// Concatenated text of all descendants, in document order.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        for child in &self.children {
            match child {
                Child::Text(content) => text.push_str(content),
                Child::Node(node) => text.push_str(&node.text_content()),
            }
        }
        text
    }
}

impl Serialize for VNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut node = serializer.serialize_struct("VNode", 3)?;
        node.serialize_field("tag", &self.tag)?;
        node.serialize_field("props", &self.props)?;
        node.serialize_field("children", &self.children)?;
        node.end()
    }
}

impl Serialize for Child {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Node(node) => node.serialize(serializer),
            Self::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl Serialize for Prop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Data(value) => value.serialize(serializer),
            Self::Handler(Handler::Action(action)) => {
                let mut marker = serializer.serialize_map(Some(1))?;
                marker.serialize_entry("action", action)?;
                marker.end()
            }
            Self::Handler(Handler::Callback(_)) => {
                let mut marker = serializer.serialize_map(Some(1))?;
                marker.serialize_entry("handler", "function")?;
                marker.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_with_handler_marker() {
        let button = VNode::new("button")
            .with_prop("className", json!("primary"))
            .with_handler("onClick", Handler::Action("counter = 1".to_string()))
            .with_text("Go");
        let column = VNode::new("div").with_children(vec![
            Child::Node(Rc::new(button)),
            Child::Text("tail".to_string()),
        ]);
        assert_eq!(
            serde_json::to_value(&column).unwrap(),
            json!({
                "tag": "div",
                "props": {},
                "children": [
                    {
                        "tag": "button",
                        "props": { "className": "primary", "onClick": { "action": "counter = 1" } },
                        "children": ["Go"]
                    },
                    "tail"
                ]
            })
        );
    }

    #[test]
    fn test_text_content() {
        let node = VNode::new("div").with_children(vec![
            Child::Text("a".to_string()),
            Child::Node(Rc::new(VNode::new("span").with_text("b"))),
        ]);
        assert_eq!(node.text_content(), "ab");
    }
}
