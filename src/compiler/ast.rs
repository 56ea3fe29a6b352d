//! Abstract syntax tree for MPD documents.
//!
//! Every node carries the [`Span`] it was parsed from. Trees are immutable
//! once produced; re-parsing yields a new tree.

use serde::{Deserialize, Serialize};

use super::diagnostic::Span;

/// Root of a parsed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Declared `mpd <version>`.
    pub version: Version,
    /// Top-level items, in source order. A `deck { ... }` document holds a
    /// single [`Item::Deck`].
    pub items: Vec<Item>,
    /// Whole document.
    pub span: Span,
}

impl Program {
    /// Items of the deck block, or the top-level items of a flat document.
    pub fn deck_items(&self) -> Vec<&Item> {
        let mut items = Vec::new();
        for item in &self.items {
            match item {
                Item::Deck(deck) => items.extend(deck.items.iter()),
                other => items.push(other),
            }
        }
        items
    }
}

/// Dotted numeric version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Source spelling, e.g. `1.0`.
    pub raw: String,
    /// Numeric components.
    pub parts: Vec<u64>,
    /// Location.
    pub span: Span,
}

/// Top-level or deck-level declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Item {
    /// `deck { ... }`
    Deck(Deck),
    /// `diagram name { ... }`
    Diagram(DiagramDecl),
    /// `runtime { ... }`
    Runtime(RuntimeDecl),
    /// `selectors { ... }`
    Selectors(SelectorsDecl),
    /// `styles { ... }`
    Styles(StylesDecl),
    /// `let name = expr`
    Const(ConstDecl),
    /// `scene name { step ... }`
    Scene(SceneDecl),
    /// `binding name { on ... }`
    Binding(BindingDecl),
    /// `use "plugin" as alias { ... }`
    Plugin(PluginDecl),
    /// `meta { ... }`
    Meta(MetaDecl),
    /// Syntax that is not understood, kept verbatim.
    Unknown(UnknownBlock),
}

impl Item {
    /// Source span of the item.
    pub fn span(&self) -> Span {
        match self {
            Item::Deck(d) => d.span,
            Item::Diagram(d) => d.span,
            Item::Runtime(d) => d.span,
            Item::Selectors(d) => d.span,
            Item::Styles(d) => d.span,
            Item::Const(d) => d.span,
            Item::Scene(d) => d.span,
            Item::Binding(d) => d.span,
            Item::Plugin(d) => d.span,
            Item::Meta(d) => d.span,
            Item::Unknown(d) => d.span,
        }
    }
}

/// `deck { items }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    /// Declarations inside the deck.
    pub items: Vec<Item>,
    /// Location.
    pub span: Span,
}

/// Raw source text attached to a diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiagramSource {
    /// `<<<TAG ... TAG>>>`
    Heredoc {
        /// Delimiter tag.
        tag: String,
        /// Verbatim body.
        body: String,
    },
    /// Quoted string.
    String(String),
}

impl DiagramSource {
    /// The diagram text regardless of how it was quoted.
    pub fn text(&self) -> &str {
        match self {
            DiagramSource::Heredoc { body, .. } => body,
            DiagramSource::String(s) => s,
        }
    }
}

/// `diagram name { mermaid ... config {...} assets {...} }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramDecl {
    /// Optional diagram name.
    pub name: Option<String>,
    /// Mermaid source.
    pub source: Option<DiagramSource>,
    /// `config { ... }` object.
    pub config: Option<Expr>,
    /// `assets { ... }` object.
    pub assets: Option<Expr>,
    /// Location.
    pub span: Span,
}

/// Section of a `runtime` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeSectionKind {
    /// Camera behaviour (`bounds`, padding, ...).
    Camera,
    /// Overlay configuration.
    Overlay,
    /// Navigation toggles.
    Navigation,
    /// Performance hints.
    Performance,
}

impl RuntimeSectionKind {
    /// Keyword spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeSectionKind::Camera => "camera",
            RuntimeSectionKind::Overlay => "overlay",
            RuntimeSectionKind::Navigation => "navigation",
            RuntimeSectionKind::Performance => "performance",
        }
    }
}

/// One `camera { ... }` / `navigation { ... }` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// Which section.
    pub kind: RuntimeSectionKind,
    /// Key/value settings.
    pub entries: Vec<ObjectEntry>,
    /// Location.
    pub span: Span,
}

/// `runtime { camera {...} overlay {...} navigation {...} performance {...} }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDecl {
    /// Sections in source order.
    pub sections: Vec<RuntimeSection>,
    /// Location.
    pub span: Span,
}

/// Named target, `name: target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorEntry {
    /// Selector name.
    pub name: String,
    /// Target it stands for.
    pub target: Target,
    /// Location.
    pub span: Span,
}

/// `selectors { name: target, ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorsDecl {
    /// Named targets.
    pub entries: Vec<SelectorEntry>,
    /// Location.
    pub span: Span,
}

/// `styles { name: expr, ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StylesDecl {
    /// Named style values.
    pub entries: Vec<ObjectEntry>,
    /// Location.
    pub span: Span,
}

/// `let name = value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDecl {
    /// Bound name.
    pub name: String,
    /// Bound value.
    pub value: Expr,
    /// Location.
    pub span: Span,
}

/// `scene name { step ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDecl {
    /// Optional scene name.
    pub name: Option<String>,
    /// Ordered steps.
    pub steps: Vec<Step>,
    /// Location.
    pub span: Span,
}

/// `step name as "Title" { statements }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step name, used as the step id.
    pub name: String,
    /// Display title from `as "..."`.
    pub title: Option<String>,
    /// Statements in order.
    pub statements: Vec<Statement>,
    /// Step-scoped bindings.
    pub bindings: Vec<BindingDecl>,
    /// Location.
    pub span: Span,
}

/// Step statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement payload.
    pub kind: StatementKind,
    /// Location.
    pub span: Span,
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatementKind {
    /// `focus target pad 24 align center lock true`
    Focus(FocusStmt),
    /// `do callee(args)`
    Do(CallExpr),
    /// `let name = expr`
    Let(ConstDecl),
    /// `assert expr else message`
    Assert(AssertStmt),
    /// `meta { ... }`
    Meta(MetaDecl),
}

/// Camera focus on a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusStmt {
    /// What to frame.
    pub target: Target,
    /// Padding around the framed elements.
    pub pad: Option<Expr>,
    /// Alignment word (`center`, `top`, ...).
    pub align: Option<String>,
    /// Whether user panning is locked while focused.
    pub lock: Option<Expr>,
}

/// Runtime assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertStmt {
    /// Condition that must hold.
    pub condition: Expr,
    /// Message reported when it does not.
    pub message: Option<Expr>,
}

/// Event kinds a binding rule can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Pointer click.
    Click,
    /// Pointer enters the target.
    Hover,
    /// Key press.
    Key,
    /// One-shot delay.
    Timer,
    /// Host-defined event name.
    Custom,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 5] = [
        EventKind::Click,
        EventKind::Hover,
        EventKind::Key,
        EventKind::Timer,
        EventKind::Custom,
    ];

    /// Source spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Hover => "hover",
            EventKind::Key => "key",
            EventKind::Timer => "timer",
            EventKind::Custom => "custom",
        }
    }

    /// Parse a source spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// `click`, `key "Enter"`, `timer 2s`, `custom "name"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    /// Event kind; `None` for the placeholder produced on a parse error.
    pub kind: Option<EventKind>,
    /// Key filter for `key`.
    pub key: Option<String>,
    /// Delay for `timer`.
    pub delay: Option<Literal>,
    /// Event name for `custom`.
    pub name: Option<String>,
    /// Location.
    pub span: Span,
}

/// `on event target T when cond { statements }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingRule {
    /// Triggering event.
    pub event: EventSpec,
    /// Element to listen on.
    pub target: Option<Target>,
    /// Guard expression.
    pub when: Option<Expr>,
    /// Statements run when the rule fires.
    pub actions: Vec<Statement>,
    /// Location.
    pub span: Span,
}

/// `binding name { priority N on ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingDecl {
    /// Optional name.
    pub name: Option<String>,
    /// Ordering hint; higher binds first.
    pub priority: Option<i64>,
    /// Rules in order.
    pub rules: Vec<BindingRule>,
    /// Location.
    pub span: Span,
}

/// `use "source" as alias { options }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDecl {
    /// Plugin source string.
    pub source: String,
    /// Local alias.
    pub alias: Option<String>,
    /// Options object.
    pub options: Option<Expr>,
    /// Location.
    pub span: Span,
}

/// `meta { key: value, ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDecl {
    /// Metadata entries.
    pub entries: Vec<ObjectEntry>,
    /// Location.
    pub span: Span,
}

/// Unrecognised syntax, kept for forward compatibility and reprinting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownBlock {
    /// Leading word.
    pub name: String,
    /// Verbatim source following the name.
    pub raw: String,
    /// Location.
    pub span: Span,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// Expression payload.
    pub kind: ExprKind,
    /// Location.
    pub span: Span,
}

impl Expr {
    /// Wrap a payload with a span.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExprKind {
    /// Literal value.
    Literal(Literal),
    /// `$a.b.c`
    Var(VarRef),
    /// `{ key: value }`
    Object(ObjectExpr),
    /// `[a, b]`
    Array(ArrayExpr),
    /// `name(args)`
    Call(CallExpr),
    /// `!x`, `-x`
    Unary(UnaryExpr),
    /// `a + b`
    Binary(BinaryExpr),
    /// Target expression.
    Target(Target),
}

/// Literal with its parsed value and original spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    /// Parsed value.
    pub value: LiteralValue,
    /// Source spelling.
    pub raw: String,
}

/// Literal kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum LiteralValue {
    /// Decimal number.
    Number(f64),
    /// Integer.
    Int(i64),
    /// Duration in milliseconds.
    Duration(f64),
    /// Percentage (`40%` is `40.0`).
    Percent(f64),
    /// Boolean.
    Boolean(bool),
    /// Null.
    Null,
    /// String.
    String(String),
    /// Hex color including the `#`.
    Color(String),
}

impl Literal {
    /// Empty string literal used as a parse-error placeholder.
    pub fn placeholder() -> Self {
        Self {
            value: LiteralValue::String(String::new()),
            raw: "\"\"".to_string(),
        }
    }
}

/// `$path.to.value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    /// Dotted path segments.
    pub path: Vec<String>,
}

/// `key: value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Entry key.
    pub key: String,
    /// Entry value.
    pub value: Expr,
    /// Location.
    pub span: Span,
}

/// `{ entries }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectExpr {
    /// Entries in order.
    pub entries: Vec<ObjectEntry>,
}

/// `[items]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayExpr {
    /// Items in order.
    pub items: Vec<Expr>,
}

/// Call argument, positional or `name: value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Name for keyword arguments.
    pub name: Option<String>,
    /// Argument value.
    pub value: Expr,
}

/// `a.b.c(args)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    /// Dotted callee, e.g. `camera.fit`.
    pub callee: String,
    /// Arguments in order.
    pub args: Vec<Argument>,
}

impl CallExpr {
    /// Empty call used as a parse-error placeholder.
    pub fn placeholder() -> Self {
        Self {
            callee: String::new(),
            args: Vec::new(),
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

impl UnaryOp {
    /// Source spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }
}

/// `op operand`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr {
    /// Operator.
    pub op: UnaryOp,
    /// Operand.
    pub operand: Box<Expr>,
}

/// Binary operators, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `or` / `||`
    Or,
    /// `and` / `&&`
    And,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

impl BinaryOp {
    /// Canonical source spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// `left op right`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    /// Operator.
    pub op: BinaryOp,
    /// Left operand.
    pub left: Box<Expr>,
    /// Right operand.
    pub right: Box<Expr>,
}

/// Target expression: a set of diagram elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Target payload.
    pub kind: TargetKind,
    /// Location.
    pub span: Span,
}

impl Target {
    /// Empty group used as a parse-error placeholder.
    pub fn placeholder(span: Span) -> Self {
        Self {
            kind: TargetKind::Group(Vec::new()),
            span,
        }
    }

    /// Node/edge/subgraph reference by wildcard.
    pub fn is_wildcard(&self) -> bool {
        match &self.kind {
            TargetKind::Node(r) | TargetKind::Subgraph(r) => r.is_wildcard(),
            TargetKind::Edge(EdgeRef::Id(r)) => r.is_wildcard(),
            _ => false,
        }
    }
}

/// Logical element reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetRef {
    /// Diagram id.
    Id(String),
    /// `*`
    Wildcard,
}

impl TargetRef {
    /// Whether this is `*`.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, TargetRef::Wildcard)
    }
}

/// How an edge is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeRef {
    /// By edge id.
    Id(TargetRef),
    /// By its two endpoint nodes.
    Between(TargetRef, TargetRef),
}

/// Target variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TargetKind {
    /// `node A`
    Node(TargetRef),
    /// `edge e1`, `edge A -> B`
    Edge(EdgeRef),
    /// `subgraph S`
    Subgraph(TargetRef),
    /// `css ".cls"`
    Css(String),
    /// `id "dom-id"`
    Id(String),
    /// `text "label"`
    Text(String),
    /// `group(a, b)`
    Group(Vec<Target>),
    /// `union(a, b)`
    Union(Vec<Target>),
    /// `intersect(a, b)`
    Intersect(Vec<Target>),
    /// `except(base, removed)`
    Except(Box<Target>, Box<Target>),
}
