//! Source parsing: the syntax-tree model the extractor walks, the typed
//! traversal over it, and the tree-sitter backed C++ parser.
//!
//! The lowered tree mirrors what a compiler front end exposes for
//! declarations: records, fields, methods, enums and namespaces, with every
//! annotation attribute attached as a child of the declaration it decorates.
//! Statements, expressions and preprocessor text are not modelled.

use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::{ControlFlow, Range};
use std::path::{Path, PathBuf};
use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    TranslationUnit,
    Namespace,
    ClassDecl,
    StructDecl,
    EnumDecl,
    EnumConstant,
    FieldDecl,
    MethodDecl,
    /// An `annotate("...")` attribute; `spelling` holds the string.
    Annotation,
}

impl NodeKind {
    /// Kinds that open a named scope for their children.
    pub fn is_scope(self) -> bool {
        matches!(
            self,
            NodeKind::Namespace | NodeKind::ClassDecl | NodeKind::StructDecl | NodeKind::EnumDecl
        )
    }

    pub fn is_record(self) -> bool {
        matches!(self, NodeKind::ClassDecl | NodeKind::StructDecl)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// Declared name, or the attribute text for annotations.
    pub spelling: String,
    /// Declared type of a field, as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_spelling: Option<String>,
    /// 1-based source line.
    pub line: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, spelling: impl Into<String>) -> Self {
        Self {
            kind,
            spelling: spelling.into(),
            type_spelling: None,
            line: 0,
            children: Vec::new(),
        }
    }

    pub fn annotation(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Annotation, text)
    }

    pub fn with_type(mut self, type_spelling: impl Into<String>) -> Self {
        self.type_spelling = Some(type_spelling.into());
        self
    }

    pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
        self.children = children;
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }
}

/// Options forwarded verbatim from the command line to the parser.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub include_paths: Vec<PathBuf>,
}

/// Turns one header into a traversable syntax tree.
pub trait SourceParser: Send + Sync {
    fn parse(&self, path: &Path, options: &ParseOptions) -> Result<SyntaxNode, ParseError>;
}

/// What a [`Visitor`] wants to happen after entering a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitFlow {
    /// Visit the node's children.
    Recurse,
    /// Do not visit the children; continue with the next sibling.
    Skip,
    /// Abandon the whole traversal.
    Stop,
}

pub trait Visitor<'ast> {
    fn enter(&mut self, node: &'ast SyntaxNode, parent: Option<&'ast SyntaxNode>) -> VisitFlow;
    fn exit(&mut self, _node: &'ast SyntaxNode) {}
}

/// Depth-first, pre-order walk starting at `node` (which is visited too).
///
/// `exit` runs for every entered node unless the traversal was stopped.
/// Returns `false` if a visitor returned [`VisitFlow::Stop`].
pub fn traverse<'ast>(node: &'ast SyntaxNode, visitor: &mut dyn Visitor<'ast>) -> bool {
    walk(node, None, visitor).is_continue()
}

fn walk<'ast>(
    node: &'ast SyntaxNode,
    parent: Option<&'ast SyntaxNode>,
    visitor: &mut dyn Visitor<'ast>,
) -> ControlFlow<()> {
    match visitor.enter(node, parent) {
        VisitFlow::Stop => return ControlFlow::Break(()),
        VisitFlow::Skip => {}
        VisitFlow::Recurse => {
            for child in &node.children {
                walk(child, Some(node), visitor)?;
            }
        }
    }
    visitor.exit(node);
    ControlFlow::Continue(())
}

struct FnVisitor<F>(F);

impl<'ast, F> Visitor<'ast> for FnVisitor<F>
where
    F: FnMut(&'ast SyntaxNode, Option<&'ast SyntaxNode>) -> VisitFlow,
{
    fn enter(&mut self, node: &'ast SyntaxNode, parent: Option<&'ast SyntaxNode>) -> VisitFlow {
        (self.0)(node, parent)
    }
}

/// [`traverse`] with a closure in place of a visitor type.
pub fn traverse_with<'ast, F>(node: &'ast SyntaxNode, f: F) -> bool
where
    F: FnMut(&'ast SyntaxNode, Option<&'ast SyntaxNode>) -> VisitFlow,
{
    traverse(node, &mut FnVisitor(f))
}

// ---------------------------------------------------------------------------
// Marker macros
// ---------------------------------------------------------------------------

static MARKER_MACRO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bREFLECT_(CLASS|STRUCT|FIELD|METHOD|ENUM)\b").expect("marker macro regex")
});

static ANNOTATE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"annotate\s*\(\s*((?:"(?:[^"\\]|\\.)*"\s*)+)"#).expect("annotate regex")
});

static STRING_PIECE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("string literal regex"));

/// Which declarations a marker macro can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerTarget {
    /// Class, struct or enum.
    Type,
    /// Field or method inside a class body.
    Member,
}

/// A marker macro invocation blanked out of the source before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSite {
    /// Byte offset of the macro name.
    pub offset: usize,
    /// Byte length of the whole invocation, arguments included.
    pub len: usize,
    pub target: MarkerTarget,
    /// Annotation text the macro stands for, e.g. `reflect-class;Serializable`.
    pub annotation: String,
}

fn marker_tag(macro_suffix: &str) -> (&'static str, MarkerTarget) {
    match macro_suffix {
        "CLASS" => ("reflect-class", MarkerTarget::Type),
        "STRUCT" => ("reflect-struct", MarkerTarget::Type),
        "FIELD" => ("reflect-field", MarkerTarget::Member),
        "METHOD" => ("reflect-method", MarkerTarget::Member),
        _ => ("reflect-enum", MarkerTarget::Type),
    }
}

/// Finds marker macro invocations and replaces them with blanks.
///
/// Every byte of an invocation except line breaks becomes a space, so byte
/// offsets and line numbers in the returned text match the original. The
/// macro arguments become the later `;`-separated segments of the
/// annotation: `REFLECT_CLASS(Serializable)` stands for
/// `reflect-class;Serializable`. Occurrences inside comments and string or
/// character literals, and on preprocessor lines (the macro definitions
/// themselves), are left alone.
pub fn strip_markers(source: &str) -> (Cow<'_, str>, Vec<MarkerSite>) {
    let literals = literal_ranges(source);
    let mut sites = Vec::new();
    let mut cursor = 0;
    for caps in MARKER_MACRO.captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() < cursor
            || inside(&literals, whole.start())
            || on_directive_line(source, whole.start())
        {
            continue;
        }

        let (tag, target) = marker_tag(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
        let (args, end) = macro_arguments(source, whole.end()).unwrap_or(("", whole.end()));
        let mut annotation = tag.to_string();
        let args = args.split_whitespace().collect::<Vec<_>>().join(" ");
        if !args.is_empty() {
            annotation.push(';');
            annotation.push_str(&args);
        }
        sites.push(MarkerSite {
            offset: whole.start(),
            len: end - whole.start(),
            target,
            annotation,
        });
        cursor = end;
    }

    if sites.is_empty() {
        return (Cow::Borrowed(source), sites);
    }

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for site in &sites {
        out.push_str(&source[last..site.offset]);
        for ch in source[site.offset..site.offset + site.len].chars() {
            match ch {
                '\n' | '\r' => out.push(ch),
                _ => out.extend(std::iter::repeat(' ').take(ch.len_utf8())),
            }
        }
        last = site.offset + site.len;
    }
    out.push_str(&source[last..]);
    (Cow::Owned(out), sites)
}

/// Byte ranges of comments and string, raw string and character literals,
/// in source order. An unterminated literal ends at the line break.
fn literal_ranges(source: &str) -> Vec<Range<usize>> {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < len {
        let start = i;
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i += 2;
                while i < len && bytes[i] != b'\n' {
                    // a backslash continues the comment onto the next line
                    if bytes[i] == b'\\' {
                        i += 1;
                        if bytes.get(i) == Some(&b'\r') {
                            i += 1;
                        }
                    }
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = source[i + 2..]
                    .find("*/")
                    .map(|end| i + 2 + end + 2)
                    .unwrap_or(len);
            }
            b'"' => i = string_end(source, i),
            b'\'' if i == 0 || !is_ident_byte(bytes[i - 1]) => i = quoted_end(bytes, i, b'\''),
            _ => {
                i += 1;
                continue;
            }
        }
        ranges.push(start..i.min(len));
    }
    ranges
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// End of the string literal opening at `quote`, raw strings included.
fn string_end(source: &str, quote: usize) -> usize {
    let bytes = source.as_bytes();
    let mut prefix = quote;
    while prefix > 0 && is_ident_byte(bytes[prefix - 1]) {
        prefix -= 1;
    }
    if matches!(&source[prefix..quote], "R" | "LR" | "uR" | "u8R" | "UR") {
        if let Some(open) = source[quote + 1..].find('(') {
            let delimiter = &source[quote + 1..quote + 1 + open];
            let closing = format!("){delimiter}\"");
            let body = quote + 1 + open;
            return source[body..]
                .find(&closing)
                .map(|end| body + end + closing.len())
                .unwrap_or(source.len());
        }
    }
    quoted_end(bytes, quote, b'"')
}

fn quoted_end(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn inside(ranges: &[Range<usize>], offset: usize) -> bool {
    let idx = ranges.partition_point(|r| r.end <= offset);
    ranges.get(idx).is_some_and(|r| r.start <= offset)
}

/// Returns the argument text between balanced parentheses following `from`
/// (after optional whitespace) and the offset just past the closing paren.
fn macro_arguments(source: &str, from: usize) -> Option<(&str, usize)> {
    let rest = &source[from..];
    let open = rest.len() - rest.trim_start().len();
    if !rest[open..].starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    for (i, ch) in rest[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let start = from + open + 1;
                    let close = from + open + i;
                    return Some((&source[start..close], close + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether `offset` sits on a logical preprocessor line, following
/// backslash continuations back to the line that started it.
fn on_directive_line(source: &str, offset: usize) -> bool {
    let mut line_start = source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    while line_start > 0 {
        let prev_end = line_start - 1;
        let prev = source[..prev_end].trim_end_matches('\r');
        if !prev.ends_with('\\') {
            break;
        }
        line_start = source[..prev_end].rfind('\n').map(|i| i + 1).unwrap_or(0);
    }
    source[line_start..].trim_start().starts_with('#')
}

fn unescape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Every `annotate("...")` string inside an attribute's text, with adjacent
/// literals concatenated.
pub fn annotation_strings(attribute_text: &str) -> Vec<String> {
    ANNOTATE_CALL
        .captures_iter(attribute_text)
        .filter_map(|caps| caps.get(1))
        .map(|literals| {
            STRING_PIECE
                .captures_iter(literals.as_str())
                .filter_map(|p| p.get(1))
                .map(|p| unescape_literal(p.as_str()))
                .collect::<String>()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// tree-sitter backend
// ---------------------------------------------------------------------------

/// Syntactic C++ parser built on tree-sitter.
///
/// It does not run the preprocessor: `#include`s are not followed. Marker
/// macros are blanked out before parsing and re-attached by position to the
/// declaration they sit in or precede.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterParser;

impl TreeSitterParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses in-memory source; `file` is only used for diagnostics.
    pub fn parse_source(&self, source: &str, file: &Path) -> Result<SyntaxNode, ParseError> {
        let (stripped, sites) = strip_markers(source);
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_cpp::LANGUAGE.into())
            .map_err(|e| ParseError::Backend(e.to_string()))?;
        let tree = parser
            .parse(stripped.as_bytes(), None)
            .ok_or_else(|| ParseError::NoTree {
                file: file.to_path_buf(),
            })?;

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error(root).map(|n| n.start_position().row + 1);
            tracing::warn!(
                file = %file.display(),
                line = line.unwrap_or(0),
                "syntax errors in header, extracting from the recovered tree"
            );
        }

        let lowering = Lowering {
            src: stripped.as_bytes(),
            markers: attach_markers(root, &sites, file),
        };
        let mut unit =
            SyntaxNode::new(NodeKind::TranslationUnit, file.display().to_string()).at_line(1);
        lowering.lower_children(root, &mut unit.children);
        Ok(unit)
    }
}

impl SourceParser for TreeSitterParser {
    fn parse(&self, path: &Path, options: &ParseOptions) -> Result<SyntaxNode, ParseError> {
        if !options.include_paths.is_empty() {
            tracing::debug!(
                file = %path.display(),
                include_paths = ?options.include_paths,
                "include paths are not consulted by the syntactic parser"
            );
        }
        let source = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            file: path.to_path_buf(),
            source,
        })?;
        self.parse_source(&source, path)
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}

const SPECIFIER_KINDS: [&str; 3] = ["class_specifier", "struct_specifier", "enum_specifier"];

const MEMBER_KINDS: [&str; 3] = ["field_declaration", "function_definition", "declaration"];

/// Nodes a marker never looks past when searching for its declaration.
const BOUNDARY_KINDS: [&str; 10] = [
    "translation_unit",
    "declaration_list",
    "field_declaration_list",
    "enumerator_list",
    "compound_statement",
    "preproc_if",
    "preproc_ifdef",
    "preproc_else",
    "preproc_elif",
    "preproc_elifdef",
];

/// Conditional blocks a class body member can sit in.
const PREPROC_BLOCK_KINDS: [&str; 5] = [
    "preproc_if",
    "preproc_ifdef",
    "preproc_else",
    "preproc_elif",
    "preproc_elifdef",
];

/// Text that only looks like code.
const LITERAL_KINDS: [&str; 6] = [
    "comment",
    "string_literal",
    "raw_string_literal",
    "char_literal",
    "string_content",
    "concatenated_string",
];

/// Maps each marker to the tree-sitter node (by id) of the declaration it
/// belongs to: the one whose header it sits inside, else the next sibling
/// declaration after it.
fn attach_markers(
    root: Node<'_>,
    sites: &[MarkerSite],
    file: &Path,
) -> HashMap<usize, Vec<String>> {
    let mut attached: HashMap<usize, Vec<String>> = HashMap::new();
    for site in sites {
        // strictly inside the blanked run, so no token can contain it
        let probe = site.offset + 1;
        let container = root
            .descendant_for_byte_range(probe, probe)
            .filter(|c| !LITERAL_KINDS.contains(&c.kind()));
        let target = container.and_then(|container| match site.target {
            MarkerTarget::Type => enclosing_specifier(container, probe)
                .or_else(|| following(container, probe).and_then(specifier_of)),
            MarkerTarget::Member => enclosing_member(container)
                .or_else(|| following(container, probe).and_then(member_of)),
        });
        match target {
            Some(node) => attached
                .entry(node.id())
                .or_default()
                .push(site.annotation.clone()),
            None => tracing::warn!(
                file = %file.display(),
                marker = %site.annotation,
                offset = site.offset,
                "marker is not attached to any declaration"
            ),
        }
    }
    attached
}

fn enclosing_specifier(container: Node<'_>, probe: usize) -> Option<Node<'_>> {
    let mut node = Some(container);
    while let Some(n) = node {
        if SPECIFIER_KINDS.contains(&n.kind()) {
            let before_body = n
                .child_by_field_name("body")
                .map(|body| probe < body.start_byte())
                .unwrap_or(true);
            return before_body.then_some(n);
        }
        if BOUNDARY_KINDS.contains(&n.kind()) {
            return None;
        }
        node = n.parent();
    }
    None
}

fn enclosing_member(container: Node<'_>) -> Option<Node<'_>> {
    let mut node = Some(container);
    while let Some(n) = node {
        if MEMBER_KINDS.contains(&n.kind()) {
            return Some(n);
        }
        if BOUNDARY_KINDS.contains(&n.kind()) {
            return None;
        }
        node = n.parent();
    }
    None
}

fn following(container: Node<'_>, probe: usize) -> Option<Node<'_>> {
    let mut cursor = container.walk();
    let children: Vec<Node<'_>> = container.named_children(&mut cursor).collect();
    children
        .into_iter()
        .find(|c| c.start_byte() >= probe && c.kind() != "comment")
}

fn specifier_of(node: Node<'_>) -> Option<Node<'_>> {
    if SPECIFIER_KINDS.contains(&node.kind()) {
        return Some(node);
    }
    node.child_by_field_name("type")
        .filter(|ty| SPECIFIER_KINDS.contains(&ty.kind()))
}

fn member_of(node: Node<'_>) -> Option<Node<'_>> {
    MEMBER_KINDS.contains(&node.kind()).then_some(node)
}

const IDENTIFIER_KINDS: [&str; 7] = [
    "identifier",
    "field_identifier",
    "type_identifier",
    "qualified_identifier",
    "destructor_name",
    "operator_name",
    "template_method",
];

/// Lowers the tree-sitter concrete syntax tree into [`SyntaxNode`]s.
/// Unmodelled nodes are flattened: their lowered descendants are hoisted into
/// the nearest modelled ancestor.
struct Lowering<'src> {
    src: &'src [u8],
    markers: HashMap<usize, Vec<String>>,
}

impl<'src> Lowering<'src> {
    fn text(&self, node: Node<'_>) -> String {
        node.utf8_text(self.src).unwrap_or_default().to_string()
    }

    fn line(node: Node<'_>) -> usize {
        node.start_position().row + 1
    }

    fn lower_children(&self, node: Node<'_>, out: &mut Vec<SyntaxNode>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.lower(child, out);
        }
    }

    fn lower(&self, node: Node<'_>, out: &mut Vec<SyntaxNode>) {
        match node.kind() {
            "attribute_specifier" | "attribute_declaration" => out.extend(self.annotations(node)),
            "namespace_definition" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n))
                    .unwrap_or_default();
                let mut ns = SyntaxNode::new(NodeKind::Namespace, name).at_line(Self::line(node));
                if let Some(body) = node.child_by_field_name("body") {
                    self.lower_children(body, &mut ns.children);
                }
                out.push(ns);
            }
            "class_specifier" | "struct_specifier" => self.lower_record(node, out),
            "enum_specifier" => self.lower_enum(node, out),
            "field_declaration" => self.lower_member(node, out),
            "declaration" if in_record_body(node) => self.lower_member(node, out),
            "function_definition" => {
                if in_record_body(node) {
                    self.lower_member(node, out);
                }
            }
            "compound_statement" | "preproc_def" | "preproc_function_def" | "comment"
            | "string_literal" | "raw_string_literal" => {}
            _ => self.lower_children(node, out),
        }
    }

    /// Annotations from marker macros attached to `node`.
    fn marked(&self, node: Node<'_>) -> Vec<SyntaxNode> {
        let line = Self::line(node);
        self.markers
            .get(&node.id())
            .map(|texts| {
                texts
                    .iter()
                    .map(|t| SyntaxNode::annotation(t.clone()).at_line(line))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Annotations written as attributes.
    fn annotations(&self, attribute: Node<'_>) -> Vec<SyntaxNode> {
        let line = Self::line(attribute);
        annotation_strings(&self.text(attribute))
            .into_iter()
            .map(|text| SyntaxNode::annotation(text).at_line(line))
            .collect()
    }

    fn lower_record(&self, node: Node<'_>, out: &mut Vec<SyntaxNode>) {
        if node.child_by_field_name("body").is_none() {
            // forward declaration
            return;
        }
        let kind = if node.kind() == "class_specifier" {
            NodeKind::ClassDecl
        } else {
            NodeKind::StructDecl
        };
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let mut record = SyntaxNode::new(kind, name)
            .at_line(Self::line(node))
            .with_children(self.marked(node));
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            // base classes never contribute members
            if child.kind() != "base_class_clause" {
                self.lower(child, &mut record.children);
            }
        }
        out.push(record);
    }

    fn lower_enum(&self, node: Node<'_>, out: &mut Vec<SyntaxNode>) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let mut decl = SyntaxNode::new(NodeKind::EnumDecl, name)
            .at_line(Self::line(node))
            .with_children(self.marked(node));
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            if matches!(child.kind(), "attribute_specifier" | "attribute_declaration") {
                decl.children.extend(self.annotations(child));
            }
        }
        let mut cursor = body.walk();
        let enumerators: Vec<Node<'_>> = body.named_children(&mut cursor).collect();
        for enumerator in enumerators {
            if enumerator.kind() != "enumerator" {
                continue;
            }
            if let Some(name) = enumerator.child_by_field_name("name") {
                decl.children.push(
                    SyntaxNode::new(NodeKind::EnumConstant, self.text(name))
                        .at_line(Self::line(enumerator)),
                );
            }
        }
        out.push(decl);
    }

    /// Lowers a declaration inside a class body into fields and methods.
    fn lower_member(&self, node: Node<'_>, out: &mut Vec<SyntaxNode>) {
        let mut annotations = self.marked(node);
        let mut qualifiers = Vec::new();
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in &children {
            match child.kind() {
                "attribute_specifier" | "attribute_declaration" => {
                    annotations.extend(self.annotations(*child))
                }
                "type_qualifier" => qualifiers.push(self.text(*child)),
                _ => {}
            }
        }

        let type_node = node.child_by_field_name("type");
        let mut nested = Vec::new();
        if let Some(ty) = type_node {
            if SPECIFIER_KINDS.contains(&ty.kind()) {
                self.lower(ty, &mut nested);
            }
        }

        let mut cursor = node.walk();
        let declarators: Vec<Node<'_>> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();

        if declarators.is_empty() {
            // `[[...]] struct Inner { ... };`: the attribute belongs to the type
            if let Some(record) = nested.last_mut() {
                record.children.splice(0..0, annotations);
            }
            out.extend(nested);
            return;
        }
        out.extend(nested);

        let base_type = type_node.map(|ty| self.type_name(ty));
        for declarator in declarators {
            let line = Self::line(declarator);
            if let Some(name) = self.method_name(declarator) {
                out.push(
                    SyntaxNode::new(NodeKind::MethodDecl, name)
                        .at_line(line)
                        .with_children(annotations.clone()),
                );
                continue;
            }
            let mut spelling = qualifiers.clone();
            if let Some(base) = &base_type {
                spelling.push(base.clone());
            }
            let mut type_spelling = spelling.join(" ");
            if let Some(name) = self.decorate(declarator, &mut type_spelling) {
                out.push(
                    SyntaxNode::new(NodeKind::FieldDecl, name)
                        .with_type(type_spelling)
                        .at_line(line)
                        .with_children(annotations.clone()),
                );
            }
        }
    }

    fn type_name(&self, ty: Node<'_>) -> String {
        match ty.kind() {
            "class_specifier" | "struct_specifier" | "enum_specifier" | "union_specifier" => ty
                .child_by_field_name("name")
                .map(|n| self.text(n))
                .unwrap_or_else(|| self.text(ty)),
            _ => self.text(ty),
        }
    }

    /// Name of the member if `declarator` declares a function rather than
    /// a function pointer.
    fn method_name(&self, declarator: Node<'_>) -> Option<String> {
        let mut current = declarator;
        loop {
            match current.kind() {
                "function_declarator" => {
                    let inner = current.child_by_field_name("declarator")?;
                    return IDENTIFIER_KINDS
                        .contains(&inner.kind())
                        .then(|| self.text(inner));
                }
                "pointer_declarator" | "reference_declarator" | "attributed_declarator"
                | "init_declarator" => current = inner_declarator(current)?,
                _ => return None,
            }
        }
    }

    /// Walks a field declarator, appending pointer/reference/array
    /// decorations to `spelling`; returns the declared name.
    fn decorate(&self, declarator: Node<'_>, spelling: &mut String) -> Option<String> {
        match declarator.kind() {
            k if IDENTIFIER_KINDS.contains(&k) => Some(self.text(declarator)),
            "pointer_declarator" => {
                spelling.push_str(" *");
                self.decorate(inner_declarator(declarator)?, spelling)
            }
            "reference_declarator" => {
                let sigil = match declarator.child(0).map(|c| c.kind()) {
                    Some("&&") => "&&",
                    _ => "&",
                };
                spelling.push(' ');
                spelling.push_str(sigil);
                self.decorate(inner_declarator(declarator)?, spelling)
            }
            "array_declarator" => {
                let name = self.decorate(inner_declarator(declarator)?, spelling)?;
                let size = declarator
                    .child_by_field_name("size")
                    .map(|s| self.text(s))
                    .unwrap_or_default();
                spelling.push('[');
                spelling.push_str(&size);
                spelling.push(']');
                Some(name)
            }
            "init_declarator" | "parenthesized_declarator" | "attributed_declarator"
            | "function_declarator" => self.decorate(inner_declarator(declarator)?, spelling),
            _ => None,
        }
    }
}

fn inner_declarator(node: Node<'_>) -> Option<Node<'_>> {
    if let Some(inner) = node.child_by_field_name("declarator") {
        return Some(inner);
    }
    let count = node.named_child_count();
    (0..count).rev().filter_map(|i| node.named_child(i)).find(|c| {
        !matches!(
            c.kind(),
            "type_qualifier" | "attribute_declaration" | "ms_pointer_modifier"
        )
    })
}

/// Whether `node` is a member of a class body, looking through templates
/// and conditional blocks.
fn in_record_body(node: Node<'_>) -> bool {
    let mut parent = node.parent();
    while let Some(p) = parent {
        match p.kind() {
            "field_declaration_list" => return true,
            "template_declaration" => parent = p.parent(),
            kind if PREPROC_BLOCK_KINDS.contains(&kind) => parent = p.parent(),
            _ => return false,
        }
    }
    false
}
