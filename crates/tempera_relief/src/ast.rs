//! Parse node types.
//!
//! Every grammar front end produces nodes of the same shape: a kind tag, a
//! source location and a small ordered collection of branch lists. Nodes
//! live in a [`ParseTree`](crate::ParseTree) arena and are addressed by
//! [`NodeId`]; node identity is the id, never the content.

use std::fmt;

use tempera_carton::{CompactString, SmallVec};

/// Upper bound on the number of branch lists of a single node.
pub const MAX_BRANCHES: usize = 8;

/// Node identity inside a parse tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline(always)]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Node kind discriminant.
///
/// Kinds are grouped by the grammar that produces them. A node's kind may
/// be refined in place once its role is known (see
/// [`ParseTree::specialize`](crate::ParseTree::specialize)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    Root = 0,
    /// Content spliced in from another template or a macro
    Expanded = 1,

    // Template tag grammar
    Content = 10,
    TemplateTag = 11,
    TemplateTagElement = 12,
    TemplateVariable = 13,
    TemplateVariablePart = 14,
    TemplateComment = 15,
    TemplateMultilineComment = 16,
    // Inline template tags
    Extends = 20,
    Include = 21,
    Load = 22,
    Trans = 23,
    Plural = 24,
    Url = 25,
    CallMacro = 26,
    PreprocessorConfig = 27,
    // Block template tags
    Block = 30,
    BlockTrans = 31,
    Macro = 32,
    IfDebug = 33,
    Decorate = 34,
    Compress = 35,
    RawOutput = 36,
    If = 37,
    For = 38,
    IfEqual = 39,
    IfNotEqual = 40,
    With = 41,
    Spaceless = 42,
    Filter = 43,
    AutoEscape = 44,

    // Markup grammar
    HtmlDoctype = 50,
    HtmlEntity = 51,
    HtmlCdata = 52,
    HtmlComment = 53,
    HtmlTag = 54,
    HtmlTagName = 55,
    HtmlEndTag = 56,
    HtmlTagEndSign = 57,
    HtmlTagAttribute = 58,
    HtmlAttributeKey = 59,
    HtmlAttributeValue = 60,
    HtmlTagWhitespace = 61,
    HtmlContent = 62,
    HtmlWhitespace = 63,
    HtmlConditionalStart = 64,
    HtmlConditionalEnd = 65,
    HtmlConditionalComment = 66,
    HtmlScript = 67,
    HtmlStyle = 68,
    HtmlPre = 69,
    HtmlTextarea = 70,

    // Stylesheet grammar
    CssOperator = 80,
    CssString = 81,
    CssWhitespace = 82,
    CssUrl = 83,

    // Script grammar
    JsScope = 90,
    JsParentheses = 91,
    JsSquareBrackets = 92,
    JsVariable = 93,
    JsKeyword = 94,
    JsWhitespace = 95,
    JsOperator = 96,
    JsDoubleQuotedString = 97,
    JsSingleQuotedString = 98,
    JsRegex = 99,
    JsNumber = 100,
    RequiredWhitespace = 101,
}

impl NodeKind {
    /// Template constructs produced by block nesting.
    pub const TEMPLATE_CONSTRUCTS: &'static [NodeKind] = &[
        NodeKind::Block,
        NodeKind::BlockTrans,
        NodeKind::Macro,
        NodeKind::IfDebug,
        NodeKind::Decorate,
        NodeKind::Compress,
        NodeKind::If,
        NodeKind::For,
        NodeKind::IfEqual,
        NodeKind::IfNotEqual,
        NodeKind::With,
        NodeKind::Spaceless,
        NodeKind::Filter,
        NodeKind::AutoEscape,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Expanded => "expanded",
            NodeKind::Content => "content",
            NodeKind::TemplateTag => "template-tag",
            NodeKind::TemplateTagElement => "template-tag-element",
            NodeKind::TemplateVariable => "template-variable",
            NodeKind::TemplateVariablePart => "template-variable-part",
            NodeKind::TemplateComment => "template-comment",
            NodeKind::TemplateMultilineComment => "template-multiline-comment",
            NodeKind::Extends => "extends",
            NodeKind::Include => "include",
            NodeKind::Load => "load",
            NodeKind::Trans => "trans",
            NodeKind::Plural => "plural",
            NodeKind::Url => "url",
            NodeKind::CallMacro => "callmacro",
            NodeKind::PreprocessorConfig => "preprocessor-config",
            NodeKind::Block => "block",
            NodeKind::BlockTrans => "blocktrans",
            NodeKind::Macro => "macro",
            NodeKind::IfDebug => "ifdebug",
            NodeKind::Decorate => "decorate",
            NodeKind::Compress => "compress",
            NodeKind::RawOutput => "raw-output",
            NodeKind::If => "if",
            NodeKind::For => "for",
            NodeKind::IfEqual => "ifequal",
            NodeKind::IfNotEqual => "ifnotequal",
            NodeKind::With => "with",
            NodeKind::Spaceless => "spaceless",
            NodeKind::Filter => "filter",
            NodeKind::AutoEscape => "autoescape",
            NodeKind::HtmlDoctype => "html-doctype",
            NodeKind::HtmlEntity => "html-entity",
            NodeKind::HtmlCdata => "html-cdata",
            NodeKind::HtmlComment => "html-comment",
            NodeKind::HtmlTag => "html-tag",
            NodeKind::HtmlTagName => "html-tag-name",
            NodeKind::HtmlEndTag => "html-end-tag",
            NodeKind::HtmlTagEndSign => "html-tag-end-sign",
            NodeKind::HtmlTagAttribute => "html-tag-attribute",
            NodeKind::HtmlAttributeKey => "html-tag-attribute-key",
            NodeKind::HtmlAttributeValue => "html-tag-attribute-value",
            NodeKind::HtmlTagWhitespace => "html-tag-whitespace",
            NodeKind::HtmlContent => "html-content",
            NodeKind::HtmlWhitespace => "html-whitespace",
            NodeKind::HtmlConditionalStart => "html-start-conditional-comment",
            NodeKind::HtmlConditionalEnd => "html-end-conditional-comment",
            NodeKind::HtmlConditionalComment => "html-conditional-comment",
            NodeKind::HtmlScript => "html-script",
            NodeKind::HtmlStyle => "html-style",
            NodeKind::HtmlPre => "html-pre",
            NodeKind::HtmlTextarea => "html-textarea",
            NodeKind::CssOperator => "css-operator",
            NodeKind::CssString => "css-string",
            NodeKind::CssWhitespace => "css-whitespace",
            NodeKind::CssUrl => "css-url",
            NodeKind::JsScope => "js-scope",
            NodeKind::JsParentheses => "js-parentheses",
            NodeKind::JsSquareBrackets => "js-square-brackets",
            NodeKind::JsVariable => "js-varname",
            NodeKind::JsKeyword => "js-keyword",
            NodeKind::JsWhitespace => "js-whitespace",
            NodeKind::JsOperator => "js-operator",
            NodeKind::JsDoubleQuotedString => "js-double-quoted-string",
            NodeKind::JsSingleQuotedString => "js-single-quoted-string",
            NodeKind::JsRegex => "js-regex-object",
            NodeKind::JsNumber => "js-number",
            NodeKind::RequiredWhitespace => "required-whitespace",
        }
    }

    /// Text emitted around the node's own children by default.
    pub fn delimiters(self) -> Option<(&'static str, &'static str)> {
        use NodeKind::*;
        match self {
            TemplateTag | Extends | Include | Load | Trans | Plural | Url | CallMacro
            | PreprocessorConfig => Some(("{%", "%}")),
            TemplateVariable => Some(("{{", "}}")),
            HtmlTag => Some(("<", ">")),
            HtmlEndTag => Some(("</", ">")),
            HtmlTagEndSign => Some(("/", "")),
            HtmlComment => Some(("<!--", "-->")),
            HtmlCdata => Some(("<![CDATA[", "]]>")),
            CssUrl => Some(("url(", ")")),
            JsScope => Some(("{", "}")),
            JsParentheses => Some(("(", ")")),
            JsSquareBrackets => Some(("[", "]")),
            JsDoubleQuotedString => Some(("\"", "\"")),
            JsSingleQuotedString => Some(("'", "'")),
            _ => None,
        }
    }

    /// Text emitted around the parameters of a nested construct.
    ///
    /// Parameters are the children of the opening marker, so they are
    /// wrapped in that marker's delimiters.
    pub fn param_delimiters(self) -> (&'static str, &'static str) {
        use NodeKind::*;
        match self {
            HtmlScript | HtmlStyle | HtmlPre | HtmlTextarea => ("<", ">"),
            HtmlConditionalComment => ("", ""),
            _ if self.is_template_construct() || self == RawOutput => ("{%", "%}"),
            _ => ("", ""),
        }
    }

    #[inline]
    pub fn is_template_construct(self) -> bool {
        Self::TEMPLATE_CONSTRUCTS.contains(&self)
    }

    /// Script tokens that separate other tokens without meaning.
    #[inline]
    pub fn is_js_whitespace(self) -> bool {
        matches!(self, NodeKind::JsWhitespace | NodeKind::RequiredWhitespace)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source location of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Template path (or any name given by the caller)
    pub path: CompactString,
    /// 1-indexed line number
    pub line: u32,
    /// 1-indexed column number, counted in characters
    pub column: u32,
}

impl SourceLocation {
    pub fn new(path: impl Into<CompactString>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }

    /// Start of the file at `path`.
    pub fn start_of(path: impl Into<CompactString>) -> Self {
        Self::new(path, 1, 1)
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::start_of("")
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "In: {}\nLine {}, column {}", self.path, self.line, self.column)
    }
}

/// One entry of a branch list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Text(CompactString),
    Node(NodeId),
}

impl Child {
    #[inline]
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Child::Node(id) => Some(*id),
            Child::Text(_) => None,
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Child::Text(text) => Some(text),
            Child::Node(_) => None,
        }
    }
}

/// Branch lists of a node. Most nodes only use the first one.
pub type Branches = SmallVec<[Vec<Child>; 1]>;

/// Payload of a node built by block nesting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Construct {
    /// Children of the opening marker
    pub params: Vec<Child>,
    /// Alternate markers, with the branch index each one opened
    pub markers: SmallVec<[(usize, NodeId); 2]>,
    /// Terminating marker
    pub end: Option<NodeId>,
}

/// Payload of a script identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    /// Name assigned by minification (declarations only)
    pub rename: Option<CompactString>,
    /// Declaration this reference resolves to
    pub link: Option<NodeId>,
}

/// Kind-specific payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeData {
    #[default]
    None,
    Construct(Construct),
    Binding(Binding),
}

/// A parse node.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: SourceLocation,
    pub branches: Branches,
    pub data: NodeData,
}

impl Node {
    pub fn new(kind: NodeKind, loc: SourceLocation) -> Self {
        let mut branches = Branches::new();
        branches.push(Vec::new());
        Self {
            kind,
            loc,
            branches,
            data: NodeData::None,
        }
    }

    /// Primary branch ("children").
    #[inline]
    pub fn children(&self) -> &[Child] {
        self.branches.first().map_or(&[], Vec::as_slice)
    }

    #[inline]
    pub fn construct(&self) -> Option<&Construct> {
        match &self.data {
            NodeData::Construct(c) => Some(c),
            _ => None,
        }
    }

    #[inline]
    pub fn binding(&self) -> Option<&Binding> {
        match &self.data {
            NodeData::Binding(b) => Some(b),
            _ => None,
        }
    }

    /// Branch list `index`, growing the collection when needed.
    pub(crate) fn branch_mut(&mut self, index: usize) -> &mut Vec<Child> {
        debug_assert!(index < MAX_BRANCHES, "branch index {index} out of bounds");
        while self.branches.len() <= index {
            self.branches.push(Vec::new());
        }
        &mut self.branches[index]
    }

    /// Every node id referenced from this node, in emission order.
    pub(crate) fn referenced_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        let (params, markers, end) = match &self.data {
            NodeData::Construct(c) => (c.params.as_slice(), c.markers.as_slice(), c.end),
            _ => (&[][..], &[][..], None),
        };
        params
            .iter()
            .filter_map(Child::as_node)
            .chain(markers.iter().map(|(_, id)| *id))
            .chain(
                self.branches
                    .iter()
                    .flat_map(|b| b.iter().filter_map(Child::as_node)),
            )
            .chain(end)
    }
}
