//! Sandboxed tree-walking evaluator of the Compose DSL.
//!
//! Every evaluation starts from a fresh global scope that contains only the
//! builder vocabulary, `render`, `state`, `execute` and `log`. Nothing the
//! program does can reach past that scope, and nothing survives the call.

use crate::error::{EvalError, ItemRenderError};
use crate::parser::{
    self, BinaryOperator, Expression, FunctionBody, Literal, SourceCode, Span, Spanned, Statement,
    SyntaxError, UnaryOperator,
};
use crate::value::{Closure, Native, NativeFn, RuntimeError, Scope, Value, number_to_json};
use crate::vnode::{Callback, Child, Handler, VNode};
use serde_json::json;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

pub const MAX_CALL_DEPTH: usize = 256;

const SCREEN_FILENAME: &str = "screen.dsl";
const ACTION_FILENAME: &str = "action";

/// Collector ids are never reused, so an `add` kept past its container matches nothing.
static NEXT_COLLECTOR: AtomicUsize = AtomicUsize::new(0);

/// Capabilities injected into a running program.
pub trait Host {
    /// Hand an action string to the action interpreter.
    fn dispatch(&mut self, action: &str);
    fn log(&mut self, message: &str);
}

/// Host that keeps dispatched actions and log lines for the caller to apply later.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    pub actions: Vec<String>,
    pub logs: Vec<String>,
}

impl Host for RecordingHost {
    fn dispatch(&mut self, action: &str) {
        self.actions.push(action.to_string());
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }
}

/// The builder vocabulary visible to screen sources.
#[derive(Clone)]
pub struct BuilderApi {
    builders: Vec<Native>,
}

impl BuilderApi {
    pub fn standard() -> Self {
        Self {
            builders: vec![
                native("Column", column),
                native("Row", row),
                native("Text", text),
                native("Button", button),
                native("Image", image),
                native("LazyColumn", lazy_column),
            ],
        }
    }

    /// Add or replace a builder.
    pub fn with_builder(mut self, name: &'static str, function: NativeFn) -> Self {
        self.builders.retain(|builder| builder.name != name);
        self.builders.push(native(name, function));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.builders.iter().map(|builder| builder.name)
    }
}

impl Default for BuilderApi {
    fn default() -> Self {
        Self::standard()
    }
}

fn native(name: &'static str, function: NativeFn) -> Native {
    Native { name, function }
}

/// Evaluate a screen source into its root node.
pub fn evaluate(
    source: &str,
    api: &BuilderApi,
    state: &serde_json::Value,
    host: &mut dyn Host,
) -> Result<VNode, EvalError> {
    log::debug!("Evaluating screen source ({} bytes)", source.len());
    let source = SourceCode::from(source);
    let program = parser::parse_program(SCREEN_FILENAME, source.as_str()).map_err(syntax_error)?;

    let mut scope = Scope::default();
    for builder in &api.builders {
        scope = scope.bind(builder.name, Value::Native(*builder));
    }
    let scope = scope
        .bind("render", Value::Native(native("render", render)))
        .bind("execute", Value::Native(native("execute", execute)))
        .bind("log", Value::Native(native("log", log_message)))
        .bind("state", Value::from_json(state));

    let mut interpreter = Interpreter::new(source, host);
    interpreter.execute_block(&program, scope)?;
    match interpreter.root.take() {
        Some(root) => Ok(Rc::unwrap_or_clone(root)),
        None => Err(EvalError::NoRoot),
    }
}

/// Evaluate a single expression against a state document.
///
/// `state` names the whole document and every top-level key is bound as a
/// variable, so a key called `state` shadows the document.
pub fn evaluate_expression(
    source: &str,
    state: &serde_json::Value,
    host: &mut dyn Host,
) -> Result<Value, EvalError> {
    let expression = parser::parse_expression(ACTION_FILENAME, source).map_err(syntax_error)?;
    let scope = Scope::default().bind("state", Value::from_json(state));
    let scope = state.as_object().into_iter().flatten().fold(scope, |scope, (name, value)| {
        scope.bind(name.as_str(), Value::from_json(value))
    });
    let mut interpreter = Interpreter::new(SourceCode::from(source), host);
    Ok(interpreter.evaluate(&expression, &scope)?)
}

impl Handler {
    /// Run the handler. Literal actions are dispatched, callbacks run in a fresh interpreter.
    pub fn invoke(&self, host: &mut dyn Host) -> Result<(), EvalError> {
        match self {
            Handler::Action(action) => {
                host.dispatch(action);
                Ok(())
            }
            Handler::Callback(Callback { closure, source }) => {
                let span = closure.function.span;
                let mut interpreter = Interpreter::new(source.clone(), host);
                interpreter.call_named(
                    "<handler>".to_string(),
                    &Value::Function(closure.clone()),
                    &[],
                    span,
                )?;
                Ok(())
            }
        }
    }
}

fn syntax_error(error: SyntaxError) -> EvalError {
    EvalError::Syntax {
        message: error.message,
        report: error.report,
    }
}

impl From<RuntimeError> for EvalError {
    fn from(error: RuntimeError) -> Self {
        EvalError::Runtime {
            message: error.message,
            stack: error.stack,
        }
    }
}

struct CallFrame {
    callee: String,
    span: Span,
}

enum Flow {
    Next,
    Return(Value),
}

pub struct Interpreter<'host> {
    source: SourceCode,
    host: &'host mut dyn Host,
    collectors: BTreeMap<usize, Vec<Child>>,
    root: Option<Rc<VNode>>,
    frames: Vec<CallFrame>,
}

impl<'host> Interpreter<'host> {
    fn new(source: SourceCode, host: &'host mut dyn Host) -> Self {
        Self {
            source,
            host,
            collectors: BTreeMap::new(),
            root: None,
            frames: Vec::new(),
        }
    }

    /// Build a runtime error at `span` with the current call trace.
    pub fn error(&self, span: Span, message: impl Into<String>) -> RuntimeError {
        let mut stack = Vec::with_capacity(self.frames.len() + 1);
        let mut location = span;
        for frame in self.frames.iter().rev() {
            stack.push(self.trace_line(&frame.callee, location));
            location = frame.span;
        }
        stack.push(self.trace_line("<program>", location));
        RuntimeError {
            message: message.into(),
            stack,
        }
    }

    fn trace_line(&self, callee: &str, span: Span) -> String {
        let (line, column) = self.source.line_col(span.start);
        format!("at {callee} ({line}:{column})")
    }

    pub fn call(
        &mut self,
        callee: &Value,
        arguments: &[Value],
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let name = match callee {
            Value::Native(native) => native.name.to_string(),
            Value::Appender(_) => "add".to_string(),
            _ => "<anonymous>".to_string(),
        };
        self.call_named(name, callee, arguments, span)
    }

    fn call_named(
        &mut self,
        name: String,
        callee: &Value,
        arguments: &[Value],
        span: Span,
    ) -> Result<Value, RuntimeError> {
        if !callee.is_callable() {
            return Err(self.error(span, format!("{name} is not a function")));
        }
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(self.error(span, "Maximum call stack size exceeded"));
        }
        self.frames.push(CallFrame { callee: name, span });
        let result = match callee {
            Value::Native(native) => (native.function)(self, arguments, span),
            Value::Function(closure) => self.call_closure(closure, arguments),
            Value::Appender(collector) => self.append(*collector, arguments, span),
            other => Err(self.error(span, format!("{} is not a function", other.type_name()))),
        };
        self.frames.pop();
        result
    }

    fn call_closure(&mut self, closure: &Closure, arguments: &[Value]) -> Result<Value, RuntimeError> {
        let function = Rc::clone(&closure.function);
        let mut scope = closure.scope.clone();
        for (index, parameter) in function.parameters.iter().enumerate() {
            let argument = arguments.get(index).cloned().unwrap_or(Value::Null);
            scope = scope.bind(parameter.as_str(), argument);
        }
        match &function.body {
            FunctionBody::Expression(body) => self.evaluate(body, &scope),
            FunctionBody::Block(statements) => match self.execute_block(statements, scope)? {
                Flow::Return(value) => Ok(value),
                Flow::Next => Ok(Value::Null),
            },
        }
    }

    fn execute_block(
        &mut self,
        statements: &[Spanned<Statement>],
        mut scope: Scope,
    ) -> Result<Flow, RuntimeError> {
        for statement in statements {
            match &statement.node {
                Statement::Let { name, value } => {
                    let value = self.evaluate(value, &scope)?;
                    scope = scope.bind(name.as_str(), value);
                }
                Statement::Expression(expression) => {
                    self.evaluate(expression, &scope)?;
                }
                Statement::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    let flow = if self.evaluate(condition, &scope)?.is_truthy() {
                        self.execute_block(then_branch, scope.clone())?
                    } else if let Some(else_branch) = else_branch {
                        self.execute_block(else_branch, scope.clone())?
                    } else {
                        Flow::Next
                    };
                    if let Flow::Return(_) = flow {
                        return Ok(flow);
                    }
                }
                Statement::Return(value) => {
                    let value = match value {
                        Some(value) => self.evaluate(value, &scope)?,
                        None => Value::Null,
                    };
                    return Ok(Flow::Return(value));
                }
            }
        }
        Ok(Flow::Next)
    }

    fn evaluate(
        &mut self,
        expression: &Spanned<Expression>,
        scope: &Scope,
    ) -> Result<Value, RuntimeError> {
        let span = expression.span;
        match &expression.node {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Number(number) => Value::Number(*number),
                Literal::Text(text) => Value::text(text.as_str()),
                Literal::Bool(value) => Value::Bool(*value),
                Literal::Null => Value::Null,
            }),
            Expression::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.evaluate(item, scope)?);
                }
                Ok(Value::Array(Rc::new(values)))
            }
            Expression::Object(entries) => {
                let mut object = BTreeMap::new();
                for (key, value) in entries {
                    let value = self.evaluate(value, scope)?;
                    object.insert(key.clone(), value);
                }
                Ok(Value::Object(Rc::new(object)))
            }
            Expression::Identifier(name) => match scope.lookup(name) {
                Some(value) => Ok(value.clone()),
                None => Err(self.error(span, format!("{name} is not defined"))),
            },
            Expression::Member { object, property } => {
                let target = self.evaluate(object, scope)?;
                self.member(&target, property, span)
            }
            Expression::Index { object, index } => {
                let target = self.evaluate(object, scope)?;
                let index = self.evaluate(index, scope)?;
                self.index(&target, &index, span)
            }
            Expression::Call { callee, arguments } => {
                let function = self.evaluate(callee, scope)?;
                let mut values: SmallVec<[Value; 4]> = SmallVec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument, scope)?);
                }
                let name = match (&callee.node, &function) {
                    (Expression::Identifier(name), _) => name.clone(),
                    (Expression::Member { property, .. }, _) => property.clone(),
                    (_, Value::Native(native)) => native.name.to_string(),
                    _ => "<anonymous>".to_string(),
                };
                self.call_named(name, &function, &values, span)
            }
            Expression::Function(function) => Ok(Value::Function(Closure {
                function: Rc::clone(function),
                scope: scope.clone(),
            })),
            Expression::Unary { operator, operand } => {
                let operand = self.evaluate(operand, scope)?;
                Ok(match operator {
                    UnaryOperator::Not => Value::Bool(!operand.is_truthy()),
                    UnaryOperator::Negate => Value::Number(-operand.to_number()),
                })
            }
            Expression::Binary {
                operator,
                operand_a,
                operand_b,
            } => {
                let a = self.evaluate(operand_a, scope)?;
                match operator {
                    BinaryOperator::And if !a.is_truthy() => Ok(a),
                    BinaryOperator::Or if a.is_truthy() => Ok(a),
                    BinaryOperator::And | BinaryOperator::Or => self.evaluate(operand_b, scope),
                    _ => {
                        let b = self.evaluate(operand_b, scope)?;
                        Ok(binary(*operator, &a, &b))
                    }
                }
            }
            Expression::Conditional {
                condition,
                consequent,
                alternative,
            } => {
                if self.evaluate(condition, scope)?.is_truthy() {
                    self.evaluate(consequent, scope)
                } else {
                    self.evaluate(alternative, scope)
                }
            }
        }
    }

    fn member(&self, target: &Value, property: &str, span: Span) -> Result<Value, RuntimeError> {
        match target {
            Value::Object(entries) => Ok(entries.get(property).cloned().unwrap_or(Value::Null)),
            Value::Array(items) if property == "length" => Ok(Value::Number(items.len() as f64)),
            Value::Text(text) if property == "length" => {
                Ok(Value::Number(text.chars().count() as f64))
            }
            Value::Null => Err(self.error(
                span,
                format!("Cannot read properties of null (reading '{property}')"),
            )),
            _ => Ok(Value::Null),
        }
    }

    fn index(&self, target: &Value, index: &Value, span: Span) -> Result<Value, RuntimeError> {
        match (target, index) {
            (Value::Array(items), Value::Number(position)) => Ok(position_of(*position)
                .and_then(|position| items.get(position).cloned())
                .unwrap_or(Value::Null)),
            (Value::Text(text), Value::Number(position)) => Ok(position_of(*position)
                .and_then(|position| text.chars().nth(position))
                .map(|character| Value::text(character.to_string()))
                .unwrap_or(Value::Null)),
            (target, key) => self.member(target, &key.to_string(), span),
        }
    }

    /// Open a child collector, run `builder(add)` once and close the collector.
    fn collect_children(
        &mut self,
        builder: Option<&Value>,
        span: Span,
    ) -> Result<Vec<Child>, RuntimeError> {
        let builder = match builder {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(builder) if builder.is_callable() => builder.clone(),
            Some(other) => {
                return Err(self.error(
                    span,
                    format!("container expects a builder function, got {}", other.type_name()),
                ));
            }
        };
        let collector = NEXT_COLLECTOR.fetch_add(1, AtomicOrdering::Relaxed);
        self.collectors.insert(collector, Vec::new());
        let result = self.call(&builder, &[Value::Appender(collector)], span);
        let children = self.collectors.remove(&collector).unwrap_or_default();
        result?;
        Ok(children)
    }

    fn append(
        &mut self,
        collector: usize,
        arguments: &[Value],
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let child = self.child(arguments.first().cloned().unwrap_or(Value::Null), span)?;
        if let Some(children) = self.collectors.get_mut(&collector) {
            children.extend(child);
            return Ok(Value::Null);
        }
        Err(self.error(span, "add() was called after its container was built"))
    }

    /// Convert a value into a child. `null` is skipped.
    fn child(&self, value: Value, span: Span) -> Result<Option<Child>, RuntimeError> {
        match value {
            Value::Null => Ok(None),
            Value::Node(node) => Ok(Some(Child::Node(node))),
            Value::Text(text) => Ok(Some(Child::Text(text.to_string()))),
            value @ (Value::Number(_) | Value::Bool(_)) => Ok(Some(Child::Text(value.to_string()))),
            other => Err(self.error(span, format!("cannot add a {} as a child", other.type_name()))),
        }
    }
}

fn position_of(position: f64) -> Option<usize> {
    (position >= 0.0 && position.fract() == 0.0).then_some(position as usize)
}

fn is_primitive(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_))
}

fn binary(operator: BinaryOperator, a: &Value, b: &Value) -> Value {
    let compare = || match (a, b) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => a.to_number().partial_cmp(&b.to_number()),
    };
    match operator {
        BinaryOperator::Or => (if a.is_truthy() { a } else { b }).clone(),
        BinaryOperator::And => (if a.is_truthy() { b } else { a }).clone(),
        BinaryOperator::Equal => Value::Bool(a.strict_equals(b)),
        BinaryOperator::NotEqual => Value::Bool(!a.strict_equals(b)),
        BinaryOperator::Less => Value::Bool(compare() == Some(Ordering::Less)),
        BinaryOperator::LessOrEqual => {
            Value::Bool(matches!(compare(), Some(Ordering::Less | Ordering::Equal)))
        }
        BinaryOperator::Greater => Value::Bool(compare() == Some(Ordering::Greater)),
        BinaryOperator::GreaterOrEqual => {
            Value::Bool(matches!(compare(), Some(Ordering::Greater | Ordering::Equal)))
        }
        BinaryOperator::Add if is_primitive(a) && is_primitive(b) => {
            Value::Number(a.to_number() + b.to_number())
        }
        BinaryOperator::Add => Value::text(format!("{a}{b}")),
        BinaryOperator::Subtract => Value::Number(a.to_number() - b.to_number()),
        BinaryOperator::Multiply => Value::Number(a.to_number() * b.to_number()),
        BinaryOperator::Divide => Value::Number(a.to_number() / b.to_number()),
        BinaryOperator::Remainder => Value::Number(a.to_number() % b.to_number()),
    }
}

fn node(node: VNode) -> Value {
    Value::Node(Rc::new(node))
}

fn column(
    interpreter: &mut Interpreter,
    arguments: &[Value],
    span: Span,
) -> Result<Value, RuntimeError> {
    let children = interpreter.collect_children(arguments.first(), span)?;
    Ok(node(
        VNode::new("div")
            .with_prop(
                "style",
                json!({ "display": "flex", "flexDirection": "column", "gap": "8px" }),
            )
            .with_children(children),
    ))
}

fn row(interpreter: &mut Interpreter, arguments: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let children = interpreter.collect_children(arguments.first(), span)?;
    Ok(node(
        VNode::new("div")
            .with_prop(
                "style",
                json!({
                    "display": "flex",
                    "flexDirection": "row",
                    "gap": "8px",
                    "alignItems": "center",
                }),
            )
            .with_children(children),
    ))
}

fn text(interpreter: &mut Interpreter, arguments: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let content = match arguments.first() {
        Some(producer) if producer.is_callable() => match interpreter.call(producer, &[], span)? {
            Value::Null => String::new(),
            content => content.to_string(),
        },
        Some(content) if content.is_truthy() => content.to_string(),
        _ => String::new(),
    };
    Ok(node(
        VNode::new("div")
            .with_prop("style", json!({ "fontSize": "14px", "color": "#e6f6ff" }))
            .with_text(content),
    ))
}

fn button(
    interpreter: &mut Interpreter,
    arguments: &[Value],
    span: Span,
) -> Result<Value, RuntimeError> {
    let handler = match arguments.first() {
        None | Some(Value::Null) => None,
        Some(Value::Function(closure)) => Some(Handler::Callback(Callback {
            closure: closure.clone(),
            source: interpreter.source.clone(),
        })),
        Some(other) if other.is_callable() => {
            return Err(interpreter.error(
                span,
                "Button action must be an action string or an arrow function",
            ));
        }
        Some(action) => Some(Handler::Action(action.to_string())),
    };

    let label = match arguments.get(1) {
        Some(producer) if producer.is_callable() => match interpreter.call(producer, &[], span)? {
            Value::Null => String::new(),
            label => label.to_string(),
        },
        Some(label) if label.is_truthy() => label.to_string(),
        _ => "Button".to_string(),
    };

    let mut button = VNode::new("button").with_prop("className", json!("compose-button"));
    if let Some(handler) = handler {
        button = button.with_handler("onClick", handler);
    }
    Ok(node(button.with_text(label)))
}

fn image(
    _interpreter: &mut Interpreter,
    arguments: &[Value],
    _span: Span,
) -> Result<Value, RuntimeError> {
    let src = match arguments.first() {
        None | Some(Value::Null) => String::new(),
        Some(src) => src.to_string(),
    };
    let width = match arguments.get(1) {
        Some(Value::Object(options)) => options
            .get("width")
            .filter(|width| width.is_truthy())
            .map(Value::to_number),
        _ => None,
    }
    .unwrap_or(120.0);
    Ok(node(
        VNode::new("img")
            .with_prop("src", json!(src))
            .with_prop(
                "style",
                json!({ "maxWidth": number_to_json(width), "borderRadius": "8px" }),
            ),
    ))
}

fn lazy_column(
    interpreter: &mut Interpreter,
    arguments: &[Value],
    span: Span,
) -> Result<Value, RuntimeError> {
    let items = match arguments.first() {
        None | Some(Value::Null) => Rc::new(Vec::new()),
        Some(Value::Array(items)) => Rc::clone(items),
        Some(other) => {
            return Err(interpreter.error(
                span,
                format!("LazyColumn expects an array of items, got {}", other.type_name()),
            ));
        }
    };
    let render_item = arguments.get(1).cloned().unwrap_or(Value::Null);
    if !render_item.is_callable() {
        return Err(interpreter.error(span, "LazyColumn expects an item renderer function"));
    }

    let mut children = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let rendered = interpreter
            .call(&render_item, &[item.clone(), Value::Number(index as f64)], span)
            .and_then(|value| match interpreter.child(value, span)? {
                Some(child) => Ok(child),
                None => Err(interpreter.error(span, "item renderer returned null")),
            });
        match rendered {
            Ok(child) => children.push(child),
            Err(error) => {
                let failure = ItemRenderError {
                    index,
                    message: error.message,
                };
                log::warn!("{failure}");
                interpreter.host.log(&failure.to_string());
                children.push(Child::Node(Rc::new(
                    VNode::new("div")
                        .with_prop("className", json!("item-error"))
                        .with_text(format!("Error rendering item {index}")),
                )));
            }
        }
    }

    Ok(node(
        VNode::new("div")
            .with_prop(
                "style",
                json!({ "display": "flex", "flexDirection": "column", "gap": "6px" }),
            )
            .with_children(children),
    ))
}

fn render(interpreter: &mut Interpreter, arguments: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let Some(producer) = arguments.first().filter(|producer| producer.is_callable()) else {
        return Err(interpreter.error(span, "render() expects a function"));
    };
    match interpreter.call(producer, &[], span)? {
        Value::Node(root) => {
            if interpreter.root.is_some() {
                log::debug!("render() called again, the previous root is replaced");
            }
            interpreter.root = Some(root);
            Ok(Value::Null)
        }
        other => Err(interpreter.error(
            span,
            format!("render() function must return a node, got {}", other.type_name()),
        )),
    }
}

fn execute(
    interpreter: &mut Interpreter,
    arguments: &[Value],
    _span: Span,
) -> Result<Value, RuntimeError> {
    match arguments.first() {
        None | Some(Value::Null) => {}
        Some(action) => interpreter.host.dispatch(&action.to_string()),
    }
    Ok(Value::Null)
}

fn log_message(
    interpreter: &mut Interpreter,
    arguments: &[Value],
    _span: Span,
) -> Result<Value, RuntimeError> {
    let message = arguments
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    interpreter.host.log(&message);
    Ok(Value::Null)
}
