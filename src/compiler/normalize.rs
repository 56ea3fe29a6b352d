//! Lowering from the MPD AST to a [`PresentationDocument`].
//!
//! `let` bindings and `$var` references are resolved here, constant
//! expressions are folded, and statements become action definitions. Input
//! is expected to have gone through [`validate`](super::validate::validate);
//! normalization still succeeds on invalid trees and reports what it had to
//! drop.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Number, Value, json};

use super::ast::*;
use super::diagnostic::{Diagnostic, codes};
use crate::runtime::document::{
    ActionDefinition, BindingDefinition, DiagramSpec, ErrorPolicy, PresentationDocument,
    StepDefinition, TargetDescriptor, TargetSpec,
};

/// Action type emitted for `focus`.
pub const FOCUS_ACTION: &str = "camera.fit";
/// Action type emitted for `assert`.
pub const ASSERT_ACTION: &str = "assert";

/// Document plus the diagnostics found while lowering.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// Lowered document. Step ids are unique.
    pub document: PresentationDocument,
    /// Normalization warnings.
    pub diagnostics: Vec<Diagnostic>,
}

/// Lower a program to a presentation document.
pub fn normalize(program: &Program) -> Normalized {
    let mut lowering = Lowering::default();
    let items = program.deck_items();

    // Top-level lets are visible everywhere, including earlier scenes.
    let mut globals = Scope::default();
    for item in &items {
        if let Item::Const(decl) = item {
            let value = lowering.eval(&decl.value, &globals).value;
            globals.bind(&decl.name, value);
        }
    }

    let mut document = PresentationDocument::default();
    let mut deck_bindings: Vec<(i64, Vec<BindingDefinition>)> = Vec::new();
    let mut used_ids = HashSet::new();
    let mut selectors = Map::new();

    for item in &items {
        match item {
            Item::Scene(scene) => {
                for step in &scene.steps {
                    let mut definition = lowering.step(step, &globals);
                    definition.id = unique_id(&step.name, &mut used_ids);
                    document.steps.push(definition);
                }
            }
            Item::Binding(binding) => {
                let rules = lowering.binding(binding, &globals);
                deck_bindings.push((binding.priority.unwrap_or_default(), rules));
            }
            Item::Diagram(diagram) if document.diagram.is_none() => {
                if let Some(source) = &diagram.source {
                    document.diagram = Some(DiagramSpec {
                        kind: "mermaid".to_string(),
                        source: source.text().to_string(),
                        name: diagram.name.clone(),
                        config: diagram
                            .config
                            .as_ref()
                            .map(|config| lowering.eval(config, &globals).value),
                    });
                }
            }
            Item::Meta(meta) => {
                for entry in &meta.entries {
                    let value = lowering.eval(&entry.value, &globals).value;
                    document.meta.insert(entry.key.clone(), value);
                }
            }
            Item::Selectors(decl) => {
                for entry in &decl.entries {
                    selectors.insert(entry.name.clone(), target_value(&entry.target));
                }
            }
            _ => {}
        }
    }
    // An explicit `meta { selectors: .. }` wins.
    if !selectors.is_empty() {
        document
            .meta
            .entry("selectors")
            .or_insert(Value::Object(selectors));
    }

    // Stable: equal priorities keep source order.
    deck_bindings.sort_by(|a, b| b.0.cmp(&a.0));
    document.bindings = deck_bindings.into_iter().flat_map(|(_, rules)| rules).collect();

    Normalized {
        document,
        diagnostics: lowering.diagnostics,
    }
}

fn unique_id(name: &str, used: &mut HashSet<String>) -> String {
    let base = if name.is_empty() { "step" } else { name };
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while used.contains(&candidate) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    used.insert(candidate.clone());
    candidate
}

#[derive(Debug, Clone, Default)]
struct Scope {
    vars: HashMap<String, Value>,
}

impl Scope {
    fn bind(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    fn lookup(&self, path: &[String]) -> Option<Value> {
        let (head, rest) = path.split_first()?;
        let mut current = self.vars.get(head)?;
        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }
}

/// JSON value plus whether it is fully known at compile time.
struct Evaluated {
    value: Value,
    constant: bool,
}

impl Evaluated {
    fn constant(value: Value) -> Self {
        Self {
            value,
            constant: true,
        }
    }

    fn deferred(value: Value) -> Self {
        Self {
            value,
            constant: false,
        }
    }
}

#[derive(Default)]
struct Lowering {
    diagnostics: Vec<Diagnostic>,
}

impl Lowering {
    fn step(&mut self, step: &Step, globals: &Scope) -> StepDefinition {
        let mut scope = globals.clone();
        let mut definition = StepDefinition {
            name: step.title.clone(),
            ..Default::default()
        };
        for statement in &step.statements {
            if let StatementKind::Meta(meta) = &statement.kind {
                self.step_meta(meta, &scope, &mut definition);
                continue;
            }
            if let Some(action) = self.statement(statement, &mut scope) {
                definition.actions.push(action);
            }
        }

        let mut bindings: Vec<(i64, Vec<BindingDefinition>)> = step
            .bindings
            .iter()
            .map(|binding| (binding.priority.unwrap_or_default(), self.binding(binding, &scope)))
            .collect();
        bindings.sort_by(|a, b| b.0.cmp(&a.0));
        definition.bindings = bindings.into_iter().flat_map(|(_, rules)| rules).collect();
        definition
    }

    fn step_meta(&mut self, meta: &MetaDecl, scope: &Scope, definition: &mut StepDefinition) {
        for entry in &meta.entries {
            let value = self.eval(&entry.value, scope).value;
            if entry.key != "errorPolicy" {
                definition.meta.insert(entry.key.clone(), value);
                continue;
            }
            match value.as_str().and_then(ErrorPolicy::from_name) {
                Some(policy) => definition.error_policy = Some(policy),
                None => self.diagnostics.push(Diagnostic::warning(
                    codes::INVALID_ERROR_POLICY,
                    format!("errorPolicy must be \"haltOnError\" or \"continueOnError\", got {value}"),
                    entry.span,
                )),
            }
        }
    }

    /// Lower one statement. `let` only updates the scope.
    fn statement(&mut self, statement: &Statement, scope: &mut Scope) -> Option<ActionDefinition> {
        match &statement.kind {
            StatementKind::Focus(focus) => {
                let mut payload = Map::new();
                payload.insert("target".into(), target_value(&focus.target));
                if let Some(pad) = &focus.pad {
                    payload.insert("pad".into(), self.eval(pad, scope).value);
                }
                if let Some(align) = &focus.align {
                    payload.insert("align".into(), Value::String(align.clone()));
                }
                if let Some(lock) = &focus.lock {
                    payload.insert("lock".into(), self.eval(lock, scope).value);
                }
                Some(ActionDefinition::with_payload(FOCUS_ACTION, Value::Object(payload)))
            }
            StatementKind::Do(call) => Some(self.call(call, scope)),
            StatementKind::Let(decl) => {
                let value = self.eval(&decl.value, scope).value;
                scope.bind(&decl.name, value);
                None
            }
            StatementKind::Assert(assert) => {
                let mut payload = Map::new();
                payload.insert("condition".into(), self.eval(&assert.condition, scope).value);
                if let Some(message) = &assert.message {
                    payload.insert("message".into(), self.eval(message, scope).value);
                }
                Some(ActionDefinition::with_payload(ASSERT_ACTION, Value::Object(payload)))
            }
            StatementKind::Meta(_) => None,
        }
    }

    /// `ns.fn(a, k: v)` becomes `{type: "ns.fn", payload: {args: [a], k: v}}`.
    fn call(&mut self, call: &CallExpr, scope: &Scope) -> ActionDefinition {
        if call.args.is_empty() {
            return ActionDefinition::new(call.callee.clone());
        }
        let mut payload = Map::new();
        let mut positional = Vec::new();
        for arg in &call.args {
            let value = self.eval(&arg.value, scope).value;
            match &arg.name {
                Some(name) => {
                    payload.insert(name.clone(), value);
                }
                None => positional.push(value),
            }
        }
        if !positional.is_empty() {
            payload.insert("args".into(), Value::Array(positional));
        }
        ActionDefinition::with_payload(call.callee.clone(), Value::Object(payload))
    }

    fn binding(&mut self, binding: &BindingDecl, scope: &Scope) -> Vec<BindingDefinition> {
        let mut rules = Vec::new();
        for rule in &binding.rules {
            let Some(event) = rule.event.kind else {
                continue;
            };
            if let Some(when) = &rule.when {
                self.diagnostics.push(Diagnostic::warning(
                    codes::UNSUPPORTED_WHEN,
                    "`when` guards are not carried into the document; the rule fires unconditionally",
                    when.span,
                ));
            }
            let mut definition = BindingDefinition::new(event);
            definition.target = rule
                .target
                .as_ref()
                .map(|target| TargetDescriptor::Spec(target_spec(target)));
            definition.key = rule.event.key.clone();
            definition.event_name = rule.event.name.clone();
            definition.delay_ms = rule.event.delay.as_ref().and_then(delay_ms);

            let mut local = scope.clone();
            definition.actions = rule
                .actions
                .iter()
                .filter_map(|statement| self.statement(statement, &mut local))
                .collect();
            rules.push(definition);
        }
        rules
    }

    fn eval(&mut self, expr: &Expr, scope: &Scope) -> Evaluated {
        match &expr.kind {
            ExprKind::Literal(literal) => Evaluated::constant(literal_value(literal)),
            ExprKind::Var(var) => match scope.lookup(&var.path) {
                Some(value) => Evaluated::constant(value),
                None => {
                    self.diagnostics.push(Diagnostic::warning(
                        codes::UNRESOLVED_VARIABLE,
                        format!("`${}` is not bound by any `let`", var.path.join(".")),
                        expr.span,
                    ));
                    Evaluated::constant(Value::Null)
                }
            },
            ExprKind::Object(object) => {
                let mut map = Map::new();
                let mut constant = true;
                for entry in &object.entries {
                    let value = self.eval(&entry.value, scope);
                    constant &= value.constant;
                    map.insert(entry.key.clone(), value.value);
                }
                Evaluated {
                    value: Value::Object(map),
                    constant,
                }
            }
            ExprKind::Array(array) => {
                let mut items = Vec::with_capacity(array.items.len());
                let mut constant = true;
                for item in &array.items {
                    let value = self.eval(item, scope);
                    constant &= value.constant;
                    items.push(value.value);
                }
                Evaluated {
                    value: Value::Array(items),
                    constant,
                }
            }
            ExprKind::Call(call) => {
                let action = self.call(call, scope);
                Evaluated::deferred(serde_json::to_value(action).unwrap_or(Value::Null))
            }
            ExprKind::Unary(unary) => {
                let operand = self.eval(&unary.operand, scope);
                if operand.constant {
                    if let Some(value) = fold_unary(unary.op, &operand.value) {
                        return Evaluated::constant(value);
                    }
                }
                Evaluated::deferred(json!({ "op": unary.op.as_str(), "operand": operand.value }))
            }
            ExprKind::Binary(binary) => {
                let left = self.eval(&binary.left, scope);
                let right = self.eval(&binary.right, scope);
                if left.constant && right.constant {
                    if let Some(value) = fold_binary(binary.op, &left.value, &right.value) {
                        return Evaluated::constant(value);
                    }
                }
                Evaluated::deferred(json!({
                    "op": binary.op.as_str(),
                    "left": left.value,
                    "right": right.value,
                }))
            }
            ExprKind::Target(target) => Evaluated::constant(target_value(target)),
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match &literal.value {
        LiteralValue::Number(n) | LiteralValue::Duration(n) => float(*n),
        LiteralValue::Int(i) => Value::from(*i),
        LiteralValue::Percent(_) => Value::String(literal.raw.clone()),
        LiteralValue::Boolean(b) => Value::Bool(*b),
        LiteralValue::Null => Value::Null,
        LiteralValue::String(s) | LiteralValue::Color(s) => Value::String(s.clone()),
    }
}

/// Integral floats become JSON integers so `250ms` serializes as `250`.
fn float(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn delay_ms(literal: &Literal) -> Option<u64> {
    match literal.value {
        LiteralValue::Duration(ms) | LiteralValue::Number(ms) if ms >= 0.0 => Some(ms.round() as u64),
        LiteralValue::Int(ms) => u64::try_from(ms).ok(),
        _ => None,
    }
}

fn fold_unary(op: UnaryOp, value: &Value) -> Option<Value> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Some(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Number(n)) => match n.as_i64() {
            Some(i) => i.checked_neg().map(Value::from),
            None => n.as_f64().map(|f| float(-f)),
        },
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    match op {
        BinaryOp::Eq => return Some(Value::Bool(left == right)),
        BinaryOp::Ne => return Some(Value::Bool(left != right)),
        BinaryOp::And | BinaryOp::Or => {
            let (Value::Bool(a), Value::Bool(b)) = (left, right) else {
                return None;
            };
            let result = if op == BinaryOp::And { *a && *b } else { *a || *b };
            return Some(Value::Bool(result));
        }
        _ => {}
    }

    if let (BinaryOp::Add, Value::String(a), Value::String(b)) = (op, left, right) {
        return Some(Value::String(format!("{a}{b}")));
    }

    let (Value::Number(a), Value::Number(b)) = (left, right) else {
        return None;
    };
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let folded = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Rem => a.checked_rem(b),
            _ => None,
        };
        if let Some(result) = folded {
            return Some(Value::from(result));
        }
    }

    let (a, b) = (a.as_f64()?, b.as_f64()?);
    let value = match op {
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
        BinaryOp::Add => float(a + b),
        BinaryOp::Sub => float(a - b),
        BinaryOp::Mul => float(a * b),
        BinaryOp::Div if b != 0.0 => float(a / b),
        BinaryOp::Rem if b != 0.0 => float(a % b),
        _ => return None,
    };
    Some(value)
}

fn ref_text(r: &TargetRef) -> String {
    match r {
        TargetRef::Id(id) => id.clone(),
        TargetRef::Wildcard => "*".to_string(),
    }
}

/// JSON mirror of a target expression.
pub fn target_spec(target: &Target) -> TargetSpec {
    fn list(items: &[Target]) -> Vec<TargetSpec> {
        items.iter().map(target_spec).collect()
    }
    match &target.kind {
        TargetKind::Node(r) => TargetSpec::Node { id: ref_text(r) },
        TargetKind::Subgraph(r) => TargetSpec::Subgraph { id: ref_text(r) },
        TargetKind::Edge(EdgeRef::Id(r)) => TargetSpec::Edge {
            id: Some(ref_text(r)),
            from: None,
            to: None,
        },
        TargetKind::Edge(EdgeRef::Between(from, to)) => TargetSpec::Edge {
            id: None,
            from: Some(ref_text(from)),
            to: Some(ref_text(to)),
        },
        TargetKind::Css(selector) => TargetSpec::Css {
            selector: selector.clone(),
        },
        TargetKind::Id(id) => TargetSpec::Id { id: id.clone() },
        TargetKind::Text(text) => TargetSpec::Text { text: text.clone() },
        TargetKind::Group(items) => TargetSpec::Group {
            targets: list(items),
        },
        TargetKind::Union(items) => TargetSpec::Union {
            targets: list(items),
        },
        TargetKind::Intersect(items) => TargetSpec::Intersect {
            targets: list(items),
        },
        TargetKind::Except(base, remove) => TargetSpec::Except {
            base: Box::new(target_spec(base)),
            remove: Box::new(target_spec(remove)),
        },
    }
}

fn target_value(target: &Target) -> Value {
    serde_json::to_value(target_spec(target)).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parser::parse;

    fn lower(src: &str) -> Normalized {
        let out = parse(src);
        assert!(
            !crate::compiler::diagnostic::has_errors(&out.diagnostics),
            "{:?}",
            out.diagnostics
        );
        normalize(&out.ast.expect("program"))
    }

    #[test]
    fn named_selectors_land_in_meta() {
        let normalized = lower(
            r#"mpd 1.0
selectors { hero: node A, links: css ".link" }
selectors { flow: edge A -> B }
meta { title: "T" }
scene { step s { } }"#,
        );
        assert!(normalized.diagnostics.is_empty(), "{:?}", normalized.diagnostics);
        assert_eq!(
            normalized.document.meta.get("selectors"),
            Some(&json!({
                "hero": { "type": "node", "id": "A" },
                "links": { "type": "css", "selector": ".link" },
                "flow": { "type": "edge", "from": "A", "to": "B" }
            }))
        );
        assert_eq!(normalized.document.meta.get("title"), Some(&json!("T")));
    }

    #[test]
    fn focus_and_do_become_actions() {
        let normalized = lower(
            r##"mpd 1.0
let accent = "#f80"
scene {
  step intro as "Intro" {
    focus node A pad 24 align center
    do style.highlight(node A, color: $accent)
    do overlay.clear()
  }
}"##,
        );
        let step = &normalized.document.steps[0];
        assert_eq!(step.id, "intro");
        assert_eq!(step.name.as_deref(), Some("Intro"));
        assert_eq!(
            serde_json::to_value(&step.actions).expect("json"),
            json!([
                { "type": "camera.fit", "payload": { "target": { "type": "node", "id": "A" }, "pad": 24, "align": "center" } },
                { "type": "style.highlight", "payload": { "args": [{ "type": "node", "id": "A" }], "color": "#f80" } },
                { "type": "overlay.clear" }
            ])
        );
    }

    #[test]
    fn folds_constants_and_keeps_the_rest_symbolic() {
        let normalized = lower(
            r#"mpd 1.0
let base = { pad: 8, sizes: [10, 20] }
scene {
  step s {
    let extra = $base.sizes.1 * 2
    assert $extra + $base.pad == 48 else "sizes"
    do camera.zoom(level: 1.5 / 2, when: state() > 1, skip: !true, label: "a" + "b")
  }
}"#,
        );
        let actions = &normalized.document.steps[0].actions;
        assert_eq!(
            actions[0].payload,
            Some(json!({ "condition": true, "message": "sizes" }))
        );
        let payload = actions[1].payload.as_ref().expect("payload");
        assert_eq!(payload["level"], json!(0.75));
        assert_eq!(payload["skip"], json!(false));
        assert_eq!(payload["label"], json!("ab"));
        assert_eq!(payload["when"]["op"], json!(">"));
        assert_eq!(payload["when"]["left"], json!({ "type": "state" }));
        assert!(normalized.diagnostics.is_empty(), "{:?}", normalized.diagnostics);
    }

    #[test]
    fn durations_and_percents() {
        let normalized = lower("mpd 1\nscene { step s { do wait(250ms, 1.5s, 40%) } }");
        assert_eq!(
            normalized.document.steps[0].actions[0].payload,
            Some(json!({ "args": [250, 1500, "40%"] }))
        );
    }

    #[test]
    fn duplicate_step_ids_are_suffixed() {
        let normalized = lower("mpd 1\nscene { step a { } step b { } }\nscene { step a { } step a { } }");
        let ids: Vec<_> = normalized.document.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "a-2", "a-3"]);
        assert!(normalized.document.validate().is_ok());
    }

    #[test]
    fn step_meta_sets_error_policy() {
        let normalized = lower(
            "mpd 1\nscene { step a { meta { errorPolicy: \"haltOnError\", note: 1 } } step b { meta { errorPolicy: \"sometimes\" } } }",
        );
        let steps = &normalized.document.steps;
        assert_eq!(steps[0].error_policy, Some(ErrorPolicy::HaltOnError));
        assert_eq!(steps[0].meta.get("note"), Some(&json!(1)));
        assert_eq!(steps[1].error_policy, None);
        assert_eq!(
            normalized.diagnostics[0].code.as_deref(),
            Some(codes::INVALID_ERROR_POLICY)
        );
    }

    #[test]
    fn bindings_are_ordered_by_priority() {
        let normalized = lower(
            r#"mpd 1
binding low { on click { do a() } }
binding high { priority 5 on key "Enter" { do b() } }
binding mid { priority 5 on timer 2s { do c() } on custom "jump" when $x { do d($missing) } }
scene { step s { binding { on hover target css ".n" { do e() } } } }"#,
        );
        let document = &normalized.document;
        let kinds: Vec<_> = document.bindings.iter().map(|b| b.actions[0].kind.as_str()).collect();
        assert_eq!(kinds, vec!["b", "c", "d", "a"]);
        assert_eq!(document.bindings[0].key.as_deref(), Some("Enter"));
        assert_eq!(document.bindings[1].delay_ms, Some(2000));
        assert_eq!(document.bindings[2].event_name.as_deref(), Some("jump"));
        assert_eq!(
            document.steps[0].bindings[0].target,
            Some(TargetDescriptor::Spec(TargetSpec::Css {
                selector: ".n".into()
            }))
        );
        let codes_seen: Vec<_> = normalized
            .diagnostics
            .iter()
            .filter_map(|d| d.code.as_deref())
            .collect();
        assert!(codes_seen.contains(&codes::UNSUPPORTED_WHEN));
        assert!(codes_seen.contains(&codes::UNRESOLVED_VARIABLE));
    }

    #[test]
    fn diagram_and_meta_are_carried() {
        let normalized = lower(
            "mpd 1\ndeck {\n  meta { title: \"Tour\" }\n  diagram flow {\n    mermaid \"graph TD; A-->B\"\n    config { theme: \"dark\" }\n  }\n}",
        );
        let document = &normalized.document;
        let diagram = document.diagram.as_ref().expect("diagram");
        assert_eq!(diagram.source, "graph TD; A-->B");
        assert_eq!(diagram.name.as_deref(), Some("flow"));
        assert_eq!(diagram.config, Some(json!({ "theme": "dark" })));
        assert_eq!(document.meta.get("title"), Some(&json!("Tour")));
    }
}
