//! Canonical MPD printer.
//!
//! Re-parsing the printed text yields the same tree modulo spans: literals
//! print their original spelling, compound operands are parenthesised and
//! names that would not lex back as the same word are quoted.

use std::fmt::Write as _;

use super::ast::*;
use super::token::is_keyword;

const INDENT: &str = "  ";

/// Print a program as MPD source.
pub fn print(program: &Program) -> String {
    let mut printer = Printer::default();
    printer.line(&format!("mpd {}", program.version.raw));
    for item in &program.items {
        printer.item(item);
    }
    printer.out
}

/// Print a single expression.
pub fn print_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

/// Print a single target expression.
pub fn print_target(target: &Target) -> String {
    let mut out = String::new();
    write_target(&mut out, target);
    out
}

#[derive(Default)]
struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, header: &str) {
        self.line(&format!("{header} {{"));
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn item(&mut self, item: &Item) {
        match item {
            Item::Deck(deck) => {
                self.open("deck");
                for item in &deck.items {
                    self.item(item);
                }
                self.close();
            }
            Item::Diagram(diagram) => self.diagram(diagram),
            Item::Runtime(runtime) => {
                self.open("runtime");
                for section in &runtime.sections {
                    let line = format!("{} {}", section.kind.as_str(), entries(&section.entries));
                    self.line(&line);
                }
                self.close();
            }
            Item::Selectors(selectors) => {
                self.open("selectors");
                for entry in &selectors.entries {
                    let line = format!("{}: {},", name(&entry.name), print_target(&entry.target));
                    self.line(&line);
                }
                self.close();
            }
            Item::Styles(styles) => self.line(&format!("styles {}", entries(&styles.entries))),
            Item::Const(decl) => self.line(&let_decl(decl)),
            Item::Scene(scene) => {
                let header = match &scene.name {
                    Some(scene_name) => format!("scene {}", name(scene_name)),
                    None => "scene".to_string(),
                };
                self.open(&header);
                for step in &scene.steps {
                    self.step(step);
                }
                self.close();
            }
            Item::Binding(binding) => self.binding(binding),
            Item::Plugin(plugin) => {
                let mut line = format!("use {}", quote(&plugin.source));
                if let Some(alias) = &plugin.alias {
                    let _ = write!(line, " as {}", name(alias));
                }
                if let Some(options) = &plugin.options {
                    let _ = write!(line, " {}", print_expr(options));
                }
                self.line(&line);
            }
            Item::Meta(meta) => self.line(&format!("meta {}", entries(&meta.entries))),
            Item::Unknown(block) => {
                if block.raw.is_empty() {
                    self.line(&block.name);
                } else {
                    self.line(&format!("{} {}", block.name, block.raw));
                }
            }
        }
    }

    fn diagram(&mut self, diagram: &DiagramDecl) {
        let header = match &diagram.name {
            Some(diagram_name) => format!("diagram {}", name(diagram_name)),
            None => "diagram".to_string(),
        };
        self.open(&header);
        match &diagram.source {
            Some(DiagramSource::Heredoc { tag, body }) => {
                self.line(&format!("mermaid <<<{tag}"));
                // Heredoc bodies are verbatim and never indented.
                self.out.push_str(body);
                self.out.push('\n');
                self.out.push_str(tag);
                self.out.push_str(">>>\n");
            }
            Some(DiagramSource::String(source)) => self.line(&format!("mermaid {}", quote(source))),
            None => {}
        }
        if let Some(config) = &diagram.config {
            self.line(&format!("config {}", print_expr(config)));
        }
        if let Some(assets) = &diagram.assets {
            self.line(&format!("assets {}", print_expr(assets)));
        }
        self.close();
    }

    fn step(&mut self, step: &Step) {
        let mut header = format!("step {}", name(&step.name));
        if let Some(title) = &step.title {
            let _ = write!(header, " as {}", quote(title));
        }
        self.open(&header);
        for statement in &step.statements {
            self.line(&statement_text(statement));
        }
        for binding in &step.bindings {
            self.binding(binding);
        }
        self.close();
    }

    fn binding(&mut self, binding: &BindingDecl) {
        let header = match &binding.name {
            Some(binding_name) => format!("binding {}", name(binding_name)),
            None => "binding".to_string(),
        };
        self.open(&header);
        if let Some(priority) = binding.priority {
            self.line(&format!("priority {priority}"));
        }
        for rule in &binding.rules {
            let mut header = format!("on {}", event_text(&rule.event));
            if let Some(target) = &rule.target {
                let _ = write!(header, " target {}", print_target(target));
            }
            if let Some(when) = &rule.when {
                let _ = write!(header, " when {}", print_expr(when));
            }
            self.open(&header);
            for action in &rule.actions {
                self.line(&statement_text(action));
            }
            self.close();
        }
        self.close();
    }
}

fn let_decl(decl: &ConstDecl) -> String {
    format!("let {} = {}", name(&decl.name), print_expr(&decl.value))
}

fn statement_text(statement: &Statement) -> String {
    match &statement.kind {
        StatementKind::Focus(focus) => {
            let mut out = format!("focus {}", print_target(&focus.target));
            if let Some(pad) = &focus.pad {
                let _ = write!(out, " pad {}", print_expr(pad));
            }
            if let Some(align) = &focus.align {
                let _ = write!(out, " align {}", name(align));
            }
            if let Some(lock) = &focus.lock {
                let _ = write!(out, " lock {}", print_expr(lock));
            }
            out
        }
        StatementKind::Do(call) => {
            let mut out = "do ".to_string();
            write_call(&mut out, call);
            out
        }
        StatementKind::Let(decl) => let_decl(decl),
        StatementKind::Assert(assert) => {
            let mut out = format!("assert {}", print_expr(&assert.condition));
            if let Some(message) = &assert.message {
                let _ = write!(out, " else {}", print_expr(message));
            }
            out
        }
        StatementKind::Meta(meta) => format!("meta {}", entries(&meta.entries)),
    }
}

fn event_text(event: &EventSpec) -> String {
    let Some(kind) = event.kind else {
        return String::new();
    };
    let mut out = kind.as_str().to_string();
    if let Some(key) = &event.key {
        let _ = write!(out, " {}", quote(key));
    }
    if let Some(delay) = &event.delay {
        let _ = write!(out, " {}", delay.raw);
    }
    if let Some(event_name) = &event.name {
        let _ = write!(out, " {}", quote(event_name));
    }
    out
}

fn entries(entries: &[ObjectEntry]) -> String {
    if entries.is_empty() {
        return "{ }".to_string();
    }
    let mut out = "{ ".to_string();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}: ", name(&entry.key));
        write_expr(&mut out, &entry.value);
    }
    out.push_str(" }");
    out
}

fn write_expr(out: &mut String, expr: &Expr) {
    match &expr.kind {
        ExprKind::Literal(literal) => out.push_str(&literal.raw),
        ExprKind::Var(var) => {
            out.push('$');
            out.push_str(&var.path.join("."));
        }
        ExprKind::Object(object) => out.push_str(&entries(&object.entries)),
        ExprKind::Array(array) => {
            out.push('[');
            for (i, item) in array.items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, item);
            }
            out.push(']');
        }
        ExprKind::Call(call) => write_call(out, call),
        ExprKind::Unary(unary) => {
            out.push_str(unary.op.as_str());
            // `-(2)` must not collapse into the literal `-2`.
            let wrap = matches!(
                unary.operand.kind,
                ExprKind::Literal(_) | ExprKind::Unary(_) | ExprKind::Binary(_)
            );
            write_operand(out, &unary.operand, wrap);
        }
        ExprKind::Binary(binary) => {
            write_operand(out, &binary.left, is_compound(&binary.left));
            let _ = write!(out, " {} ", binary.op.as_str());
            write_operand(out, &binary.right, is_compound(&binary.right));
        }
        ExprKind::Target(target) => write_target(out, target),
    }
}

fn is_compound(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Unary(_) | ExprKind::Binary(_))
}

fn write_operand(out: &mut String, expr: &Expr, wrap: bool) {
    if wrap {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_call(out: &mut String, call: &CallExpr) {
    out.push_str(&call.callee);
    out.push('(');
    for (i, arg) in call.args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if let Some(arg_name) = &arg.name {
            let _ = write!(out, "{arg_name}: ");
        }
        write_expr(out, &arg.value);
    }
    out.push(')');
}

fn write_target(out: &mut String, target: &Target) {
    match &target.kind {
        TargetKind::Node(r) => {
            out.push_str("node ");
            write_ref(out, r);
        }
        TargetKind::Subgraph(r) => {
            out.push_str("subgraph ");
            write_ref(out, r);
        }
        TargetKind::Edge(EdgeRef::Id(r)) => {
            out.push_str("edge ");
            write_ref(out, r);
        }
        TargetKind::Edge(EdgeRef::Between(from, to)) => {
            out.push_str("edge (");
            write_ref(out, from);
            out.push_str(", ");
            write_ref(out, to);
            out.push(')');
        }
        TargetKind::Css(s) => {
            let _ = write!(out, "css {}", quote(s));
        }
        TargetKind::Id(s) => {
            let _ = write!(out, "id {}", quote(s));
        }
        TargetKind::Text(s) => {
            let _ = write!(out, "text {}", quote(s));
        }
        TargetKind::Group(items) => write_target_list(out, "group", items.iter()),
        TargetKind::Union(items) => write_target_list(out, "union", items.iter()),
        TargetKind::Intersect(items) => write_target_list(out, "intersect", items.iter()),
        TargetKind::Except(base, removed) => {
            write_target_list(out, "except", [base.as_ref(), removed.as_ref()].into_iter())
        }
    }
}

fn write_target_list<'a>(out: &mut String, keyword: &str, items: impl Iterator<Item = &'a Target>) {
    out.push_str(keyword);
    out.push('(');
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_target(out, item);
    }
    out.push(')');
}

fn write_ref(out: &mut String, r: &TargetRef) {
    match r {
        TargetRef::Wildcard => out.push('*'),
        TargetRef::Id(id) => out.push_str(&name(id)),
    }
}

/// A bare word when it lexes back as the same identifier, else a string.
fn name(text: &str) -> String {
    if is_identifier(text) {
        text.to_string()
    } else {
        quote(text)
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars().peekable();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    while let Some(c) = chars.next() {
        let ok = match c {
            '-' => matches!(chars.peek(), Some(n) if n.is_alphanumeric() || *n == '_'),
            c => c.is_alphanumeric() || c == '_',
        };
        if !ok {
            return false;
        }
    }
    !is_keyword(text) && !matches!(text, "true" | "false" | "null")
}

/// Double-quoted string with the escapes the lexer understands.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::diagnostic::has_errors;
    use crate::compiler::parser::parse;

    fn reprint(src: &str) -> String {
        let out = parse(src);
        assert!(!has_errors(&out.diagnostics), "{:?}", out.diagnostics);
        print(&out.ast.expect("program"))
    }

    #[test]
    fn prints_canonical_layout() {
        let printed = reprint(
            "mpd 1.0 scene intro { step a as \"A\" { focus node A pad 8; do x.y(1, k: 'v') } }",
        );
        assert_eq!(
            printed,
            "mpd 1.0\nscene intro {\n  step a as \"A\" {\n    focus node A pad 8\n    do x.y(1, k: 'v')\n  }\n}\n"
        );
    }

    #[test]
    fn operands_are_parenthesised() {
        let printed = reprint("mpd 1\nlet v = -(2) + 3 * (4 - 1) || !$ok");
        assert!(printed.contains("let v = ((-(2)) + (3 * (4 - 1))) or (!$ok)"), "{printed}");
    }

    #[test]
    fn names_that_are_not_identifiers_are_quoted() {
        let printed = reprint("mpd 1\nscene { step \"two words\" { focus node \"n 1\" } step focus { } }");
        assert!(printed.contains("step \"two words\""));
        assert!(printed.contains("node \"n 1\""));
        assert!(printed.contains("step \"focus\""));
    }

    #[test]
    fn heredoc_body_is_verbatim() {
        let src = "mpd 1\ndiagram main {\n  mermaid <<<MMD\nflowchart LR\n  A --> B\nMMD>>>\n}\n";
        let printed = reprint(src);
        assert_eq!(printed, src);
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote("a\"b\nc"), "\"a\\\"b\\nc\"");
        assert_eq!(quote("C:\\dir\\"), r#""C:\\dir\\""#);
    }

    #[test]
    fn backslashes_survive_a_round_trip() {
        for text in ["C:\\dir\\", "a\\nb", "\\\""] {
            let out = crate::compiler::lexer::lex(&quote(text));
            assert!(out.diagnostics.is_empty(), "{text:?}");
            assert_eq!(out.tokens[0].text(), text);
        }
    }
}
