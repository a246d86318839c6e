//! Renders the registration IR into the generated C++ unit.
//!
//! The chained `Register<T>(name).AddField(...).AddMethod(...)` shape is what
//! the runtime reflection registry consumes; keep it byte-stable.

use crate::analyzer::metadata::{EnumDescription, Registration, TypeDescription};

pub const SOURCE_FILE_NAME: &str = "register_all.cpp";
pub const HEADER_FILE_NAME: &str = "register_all.h";
pub const ENTRY_POINT: &str = "RegisterAll";

const TYPE_REGISTRATION: &str = "Reflection::Register";
const ENUM_REGISTRATION: &str = "Reflection::RegisterEnum";
const INDENT: &str = "    ";

#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    /// Extra header included ahead of the type headers, normally the one
    /// declaring the registry API.
    pub registry_header: Option<String>,
}

/// Accumulates deduplicated registrations across one session.
#[derive(Debug, Default)]
pub struct CodeEmitter {
    options: EmitOptions,
    includes: Vec<String>,
    registrations: Vec<Registration>,
}

impl CodeEmitter {
    pub fn new(options: EmitOptions) -> Self {
        Self {
            options,
            includes: Vec::new(),
            registrations: Vec::new(),
        }
    }

    /// Adds one file's surviving registrations. Files that contributed
    /// nothing new are not included.
    pub fn add_file(&mut self, include_path: impl Into<String>, registrations: Vec<Registration>) {
        if registrations.is_empty() {
            return;
        }
        self.includes.push(include_path.into());
        self.registrations.extend(registrations);
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn clear(&mut self) {
        self.includes.clear();
        self.registrations.clear();
    }

    pub fn render_source(&self) -> String {
        let mut out = String::new();
        out.push_str("// Generated by reflgen. Do not edit.\n\n");
        out.push_str(&format!("#include \"{HEADER_FILE_NAME}\"\n"));
        if let Some(registry) = &self.options.registry_header {
            out.push_str(&format!("#include \"{registry}\"\n"));
        }
        for include in &self.includes {
            out.push_str(&format!("#include \"{include}\"\n"));
        }
        out.push('\n');
        out.push_str(&format!("void {ENTRY_POINT}()\n{{\n"));
        for registration in &self.registrations {
            out.push_str(&render_registration(registration));
        }
        out.push_str("}\n");
        out
    }

    pub fn render_header(&self) -> String {
        format!("// Generated by reflgen. Do not edit.\n\n#pragma once\n\nvoid {ENTRY_POINT}();\n")
    }
}

/// One chained registration statement followed by a blank line.
pub fn render_registration(registration: &Registration) -> String {
    match registration {
        Registration::Type(ty) => render_type(ty),
        Registration::Enum(en) => render_enum(en),
    }
}

fn render_type(ty: &TypeDescription) -> String {
    let qualified = &ty.qualified_name;
    let mut out = format!(
        "{INDENT}{TYPE_REGISTRATION}<{qualified}>({})",
        quote(&ty.name)
    );
    for field in &ty.fields {
        out.push_str(&format!(
            "\n{INDENT}{INDENT}.AddField({},{},&{qualified}::{})",
            quote(&field.name),
            quote(&field.type_spelling),
            field.name
        ));
    }
    for method in &ty.methods {
        out.push_str(&format!(
            "\n{INDENT}{INDENT}.AddMethod({},&{qualified}::{})",
            quote(&method.name),
            method.name
        ));
    }
    out.push_str(";\n\n");
    out
}

fn render_enum(en: &EnumDescription) -> String {
    let qualified = &en.qualified_name;
    let mut out = format!(
        "{INDENT}{ENUM_REGISTRATION}<{qualified}>({})",
        quote(&en.name)
    );
    for value in &en.values {
        out.push_str(&format!(
            "\n{INDENT}{INDENT}.AddValue({},{qualified}::{value})",
            quote(value)
        ));
    }
    out.push_str(";\n\n");
    out
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}
