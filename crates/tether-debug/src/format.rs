//! Text rendering for results, exceptions and inspected objects.

use std::fmt::Write;

use tether_runtime::{ExceptionDescription, ExceptionKind, ExecResult, FrameInfo};

use crate::mirror::{ClassMirror, FieldEntry, ObjectMirror};

/// User exceptions render with their full stack. Internal failures only show
/// their generic message; the detail is in the log.
pub fn render_exception(description: &ExceptionDescription) -> String {
    match description.kind {
        ExceptionKind::User => description.to_string(),
        ExceptionKind::Internal => description
            .message
            .clone()
            .unwrap_or_else(|| description.type_name.clone()),
    }
}

pub fn render_result(result: &ExecResult<Option<ObjectMirror>>) -> String {
    match result {
        ExecResult::Success(Some(mirror)) => mirror.to_string(),
        ExecResult::Success(None) => "null".to_string(),
        ExecResult::Exception(description) => render_exception(description),
        ExecResult::Terminated => "<terminated>".to_string(),
    }
}

pub fn render_fields(fields: &[FieldEntry]) -> String {
    let mut out = String::new();
    for field in fields {
        let _ = writeln!(out, "{} {} = {}", field.type_name, field.name, field.value);
    }
    out
}

/// Class summary: constructors first, then the remaining methods.
pub fn render_class(class: &ClassMirror) -> String {
    let mut out = format!("class {}", class.name);
    if let Some(file) = &class.source_file {
        let _ = write!(out, " ({file})");
    }
    out.push('\n');
    for ctor in class.constructors() {
        let _ = writeln!(out, "  new {}", ctor.signature());
    }
    for method in class.methods.iter().filter(|m| !m.is_constructor) {
        let modifier = if method.is_static { "static " } else { "" };
        let _ = writeln!(out, "  {modifier}{} {}", method.return_type, method.signature());
    }
    out
}

/// One line per frame, innermost first, with its locals indented below.
pub fn render_stack(frames: &[FrameInfo]) -> String {
    let mut out = String::new();
    for (index, frame) in frames.iter().enumerate() {
        let _ = writeln!(out, "#{index} {}", frame.location());
        for local in &frame.locals {
            let _ = writeln!(out, "    {} {} = {:?}", local.type_name, local.name, local.value);
        }
    }
    out
}
