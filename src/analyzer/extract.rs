use super::metadata::{
    Annotation, AnnotationTag, EnumDescription, FieldDescription, FileEntities, MethodDescription,
    Registration, TypeDescription, TypeKind,
};
use crate::error::ParseError;
use crate::parser::{
    traverse, traverse_with, NodeKind, ParseOptions, SourceParser, SyntaxNode, VisitFlow, Visitor,
};
use std::path::{Component, Path, PathBuf};

/// Parses headers and pulls marked declarations out of them.
pub struct EntityExtractor<'p> {
    parser: &'p dyn SourceParser,
    options: ParseOptions,
    source_root: PathBuf,
}

impl<'p> EntityExtractor<'p> {
    pub fn new(
        parser: &'p dyn SourceParser,
        options: ParseOptions,
        source_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            parser,
            options,
            source_root: source_root.into(),
        }
    }

    pub fn extract_file(&self, path: &Path) -> Result<FileEntities, ParseError> {
        let unit = self.parser.parse(path, &self.options)?;
        let registrations = extract_entities(&unit, path);
        tracing::debug!(
            file = %path.display(),
            found = registrations.len(),
            "extracted marked declarations"
        );
        Ok(FileEntities {
            path: path.to_path_buf(),
            include_path: include_path(&self.source_root, path),
            registrations,
        })
    }
}

/// A marked declaration waiting for its members to be collected.
struct Found<'ast> {
    node: &'ast SyntaxNode,
    tag: AnnotationTag,
    qualified_name: String,
}

/// First pass: every ClassMarker on a class, StructMarker on a struct and
/// EnumMarker on an enum, in traversal order. A declaration carrying the same
/// marker twice is queued twice.
#[derive(Default)]
struct TypeFinder<'ast> {
    scopes: Vec<&'ast str>,
    found: Vec<Found<'ast>>,
}

impl<'ast> TypeFinder<'ast> {
    fn qualified(&self) -> String {
        self.scopes
            .iter()
            .copied()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("::")
    }
}

impl<'ast> Visitor<'ast> for TypeFinder<'ast> {
    fn enter(&mut self, node: &'ast SyntaxNode, parent: Option<&'ast SyntaxNode>) -> VisitFlow {
        if node.kind == NodeKind::Annotation {
            if let (Some(parent), Some(annotation)) = (parent, Annotation::parse(&node.spelling)) {
                let fires = matches!(
                    (annotation.tag, parent.kind),
                    (AnnotationTag::ClassMarker, NodeKind::ClassDecl)
                        | (AnnotationTag::StructMarker, NodeKind::StructDecl)
                        | (AnnotationTag::EnumMarker, NodeKind::EnumDecl)
                );
                if fires {
                    // the parent already pushed its own scope
                    self.found.push(Found {
                        node: parent,
                        tag: annotation.tag,
                        qualified_name: self.qualified(),
                    });
                }
            }
            return VisitFlow::Skip;
        }
        if node.kind.is_scope() {
            self.scopes.push(&node.spelling);
        }
        VisitFlow::Recurse
    }

    fn exit(&mut self, node: &'ast SyntaxNode) {
        if node.kind.is_scope() {
            self.scopes.pop();
        }
    }
}

/// Pure extraction over one parsed header.
///
/// Returns every marked type and enum in discovery order, duplicates
/// included; deduplication by name is the session's job.
pub fn extract_entities(unit: &SyntaxNode, file: &Path) -> Vec<Registration> {
    let mut finder = TypeFinder::default();
    traverse(unit, &mut finder);

    let mut out = Vec::with_capacity(finder.found.len());
    for found in finder.found {
        let node = found.node;
        if node.spelling.is_empty() {
            tracing::warn!(
                file = %file.display(),
                line = node.line,
                "marked declaration has no name, skipped"
            );
            continue;
        }
        let registration = match found.tag {
            AnnotationTag::EnumMarker => Registration::Enum(EnumDescription {
                name: node.spelling.clone(),
                qualified_name: found.qualified_name,
                values: node
                    .children
                    .iter()
                    .filter(|c| c.kind == NodeKind::EnumConstant)
                    .map(|c| c.spelling.clone())
                    .collect(),
                file: file.to_path_buf(),
                line: node.line,
            }),
            tag => {
                let (fields, methods) = collect_members(node);
                Registration::Type(TypeDescription {
                    kind: if tag == AnnotationTag::ClassMarker {
                        TypeKind::Class
                    } else {
                        TypeKind::Struct
                    },
                    name: node.spelling.clone(),
                    qualified_name: found.qualified_name,
                    fields,
                    methods,
                    file: file.to_path_buf(),
                    line: node.line,
                })
            }
        };
        out.push(registration);
    }
    out
}

/// Second pass over one record: FieldMarker on a field, MethodMarker on a
/// method. Nested classes, structs and enums are not entered; their members
/// belong to them, not to `record`.
fn collect_members(record: &SyntaxNode) -> (Vec<FieldDescription>, Vec<MethodDescription>) {
    let owner = record.spelling.as_str();
    let mut fields = Vec::new();
    let mut methods = Vec::new();

    traverse_with(record, |node, parent| {
        if std::ptr::eq(node, record) {
            return VisitFlow::Recurse;
        }
        match node.kind {
            kind if kind.is_record() || kind == NodeKind::EnumDecl => VisitFlow::Skip,
            NodeKind::Annotation => {
                let annotation = Annotation::parse(&node.spelling);
                let (Some(parent), Some(annotation)) = (parent, annotation) else {
                    return VisitFlow::Skip;
                };
                match (annotation.tag, parent.kind) {
                    (AnnotationTag::FieldMarker, NodeKind::FieldDecl) => {
                        fields.push(FieldDescription {
                            name: parent.spelling.clone(),
                            type_spelling: parent.type_spelling.clone().unwrap_or_default(),
                            owner: owner.to_string(),
                        })
                    }
                    (AnnotationTag::MethodMarker, NodeKind::MethodDecl) => {
                        methods.push(MethodDescription {
                            name: parent.spelling.clone(),
                            owner: owner.to_string(),
                        })
                    }
                    _ => {}
                }
                VisitFlow::Skip
            }
            _ => VisitFlow::Recurse,
        }
    });

    (fields, methods)
}

/// `file` relative to `root`, joined with `/` whatever the host separator.
/// Files outside the root keep their full path.
pub fn include_path(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
