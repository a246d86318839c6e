use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Marker kinds, selected by the first `;`-separated segment of an
/// annotation string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationTag {
    ClassMarker,
    StructMarker,
    FieldMarker,
    MethodMarker,
    EnumMarker,
}

impl AnnotationTag {
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment.trim() {
            "reflect-class" => Some(Self::ClassMarker),
            "reflect-struct" => Some(Self::StructMarker),
            "reflect-field" => Some(Self::FieldMarker),
            "reflect-method" => Some(Self::MethodMarker),
            "reflect-enum" => Some(Self::EnumMarker),
            _ => None,
        }
    }
}

/// A parsed annotation string. `args` are the segments after the tag; they
/// are carried along but nothing consumes them yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub tag: AnnotationTag,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl Annotation {
    /// `None` for annotations that are not ours.
    pub fn parse(text: &str) -> Option<Self> {
        let mut segments = text.split(';');
        let tag = AnnotationTag::from_segment(segments.next()?)?;
        let args = segments
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Some(Self { tag, args })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    Struct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    pub name: String,
    /// Declared type as written; never interpreted.
    pub type_spelling: String,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescription {
    pub name: String,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescription {
    pub kind: TypeKind,
    /// Registration key; unique within one generation session.
    pub name: String,
    /// `name` prefixed with enclosing namespaces and classes, for C++ expressions.
    pub qualified_name: String,
    pub fields: Vec<FieldDescription>,
    pub methods: Vec<MethodDescription>,
    pub file: PathBuf,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDescription {
    pub name: String,
    pub qualified_name: String,
    pub values: Vec<String>,
    pub file: PathBuf,
    pub line: usize,
}

/// One marked declaration, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "registration", rename_all = "lowercase")]
pub enum Registration {
    Type(TypeDescription),
    Enum(EnumDescription),
}

impl Registration {
    pub fn name(&self) -> &str {
        match self {
            Registration::Type(t) => &t.name,
            Registration::Enum(e) => &e.name,
        }
    }

    pub fn qualified_name(&self) -> &str {
        match self {
            Registration::Type(t) => &t.qualified_name,
            Registration::Enum(e) => &e.qualified_name,
        }
    }
}

/// Everything one header contributed before session-wide dedup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntities {
    pub path: PathBuf,
    /// Path relative to the source root with `/` separators, as written
    /// into the generated include list.
    pub include_path: String,
    pub registrations: Vec<Registration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_segment_selects_the_tag() {
        let a = Annotation::parse("reflect-class;Serializable; Hidden").unwrap();
        assert_eq!(a.tag, AnnotationTag::ClassMarker);
        assert_eq!(a.args, vec!["Serializable", "Hidden"]);

        assert_eq!(
            Annotation::parse("reflect-method").map(|a| a.tag),
            Some(AnnotationTag::MethodMarker)
        );
        assert!(Annotation::parse("some-other-tool;reflect-class").is_none());
        assert!(Annotation::parse("").is_none());
    }

    #[test]
    fn registration_serializes_with_its_variant() {
        let reg = Registration::Enum(EnumDescription {
            name: "Color".into(),
            qualified_name: "gfx::Color".into(),
            values: vec!["Red".into()],
            file: PathBuf::from("Color.h"),
            line: 3,
        });
        let json = serde_json::to_value(&reg).unwrap();
        assert_eq!(json["registration"], "enum");
        assert_eq!(json["qualified_name"], "gfx::Color");
        assert_eq!(reg.name(), "Color");
    }
}
