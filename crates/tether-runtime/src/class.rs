use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::{CallContext, ObjectCategory, Thrown, Value};

/// Body of a debuggee method. Instance methods and constructors reach their
/// receiver through [`CallContext::this`].
pub type MethodBody =
    Arc<dyn Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, Thrown> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub type_name: String,
    pub is_static: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    pub name: String,
    pub param_types: Vec<String>,
    pub return_type: String,
    pub is_static: bool,
    pub is_constructor: bool,
}

/// Point-in-time description of a loaded class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub source_file: Option<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    /// Lines that carry executable code, ascending.
    pub lines: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MethodKind {
    Static,
    Instance,
    Constructor,
}

#[derive(Clone)]
pub(crate) struct MethodDef {
    pub(crate) name: String,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) return_type: String,
    pub(crate) kind: MethodKind,
    pub(crate) lines: Vec<u32>,
    pub(crate) body: MethodBody,
}

impl MethodDef {
    pub(crate) fn param_types(&self) -> Vec<String> {
        self.params.iter().map(|(_, ty)| ty.clone()).collect()
    }

    pub(crate) fn first_line(&self) -> u32 {
        self.lines.first().copied().unwrap_or(0)
    }

    fn accepts_types(&self, param_types: &[String]) -> bool {
        self.params.len() == param_types.len()
            && self
                .params
                .iter()
                .zip(param_types)
                .all(|((_, declared), requested)| declared == requested)
    }

    fn accepts_args(&self, args: &[Value]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|((_, declared), arg)| arg.is_assignable_to(declared))
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Selects an overload either by declared parameter types or by the runtime
/// types of the arguments at hand.
pub(crate) enum Overload<'a> {
    Types(&'a [String]),
    Args(&'a [Value]),
}

/// A class loaded into a [`crate::LocalVm`].
#[derive(Debug)]
pub struct ClassDef {
    pub(crate) name: String,
    pub(crate) source_file: Option<String>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) category: ObjectCategory,
}

impl ClassDef {
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            class: ClassDef {
                name: name.into(),
                source_file: None,
                fields: Vec::new(),
                methods: Vec::new(),
                category: ObjectCategory::Instance,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn instance_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| !f.is_static)
    }

    pub(crate) fn static_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.is_static)
    }

    pub(crate) fn has_constructors(&self) -> bool {
        self.methods.iter().any(|m| m.kind == MethodKind::Constructor)
    }

    pub(crate) fn find_method(
        &self,
        name: &str,
        kind: MethodKind,
        overload: Overload<'_>,
    ) -> Option<&MethodDef> {
        self.methods.iter().find(|m| {
            m.kind == kind
                && (kind == MethodKind::Constructor || m.name == name)
                && match overload {
                    Overload::Types(types) => m.accepts_types(types),
                    Overload::Args(args) => m.accepts_args(args),
                }
        })
    }

    pub(crate) fn find_by_name(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub(crate) fn executable_lines(&self) -> BTreeSet<u32> {
        self.methods
            .iter()
            .flat_map(|m| m.lines.iter().copied())
            .collect()
    }

    pub fn info(&self) -> ClassInfo {
        ClassInfo {
            name: self.name.clone(),
            source_file: self.source_file.clone(),
            fields: self.fields.clone(),
            methods: self
                .methods
                .iter()
                .map(|m| MethodInfo {
                    name: m.name.clone(),
                    param_types: m.param_types(),
                    return_type: m.return_type.clone(),
                    is_static: m.kind == MethodKind::Static,
                    is_constructor: m.kind == MethodKind::Constructor,
                })
                .collect(),
            lines: self.executable_lines().into_iter().collect(),
        }
    }
}

/// Builder for debuggee classes.
///
/// ```
/// use tether_runtime::{ClassDef, Value};
///
/// let class = ClassDef::builder("Counter")
///     .source_file("Counter.java")
///     .field("count", "int")
///     .method("increment", &[], "void", 5..=6, |ctx, _args| {
///         ctx.line(5)?;
///         let this = ctx.this().expect("instance method");
///         let count = ctx.get_field(&this, "count")?.as_int().unwrap_or(0);
///         ctx.line(6)?;
///         ctx.set_field(&this, "count", Value::from(count + 1))?;
///         Ok(Value::Void)
///     })
///     .build();
/// assert_eq!(class.info().lines, vec![5, 6]);
/// ```
pub struct ClassBuilder {
    class: ClassDef,
}

impl ClassBuilder {
    pub fn source_file(mut self, file: impl Into<String>) -> Self {
        self.class.source_file = Some(file.into());
        self
    }

    /// Mark the class as VM infrastructure; its instances are never mirrored.
    pub fn internal(mut self) -> Self {
        self.class.category = ObjectCategory::Internal;
        self
    }

    pub(crate) fn category(mut self, category: ObjectCategory) -> Self {
        self.class.category = category;
        self
    }

    pub fn field(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.push_field(name.into(), type_name.into(), false)
    }

    pub fn static_field(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.push_field(name.into(), type_name.into(), true)
    }

    fn push_field(mut self, name: String, type_name: String, is_static: bool) -> Self {
        self.class.fields.push(FieldInfo {
            name,
            type_name,
            is_static,
        });
        self
    }

    /// `params` are `(name, type)` pairs; the names become the frame's first
    /// locals.
    pub fn constructor<F>(
        self,
        params: &[(&str, &str)],
        lines: impl IntoIterator<Item = u32>,
        body: F,
    ) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        let name = self.class.name.clone();
        self.push_method(name, params, "void", MethodKind::Constructor, lines, body)
    }

    pub fn method<F>(
        self,
        name: impl Into<String>,
        params: &[(&str, &str)],
        return_type: &str,
        lines: impl IntoIterator<Item = u32>,
        body: F,
    ) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        self.push_method(
            name.into(),
            params,
            return_type,
            MethodKind::Instance,
            lines,
            body,
        )
    }

    pub fn static_method<F>(
        self,
        name: impl Into<String>,
        params: &[(&str, &str)],
        return_type: &str,
        lines: impl IntoIterator<Item = u32>,
        body: F,
    ) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        self.push_method(
            name.into(),
            params,
            return_type,
            MethodKind::Static,
            lines,
            body,
        )
    }

    fn push_method<F>(
        mut self,
        name: String,
        params: &[(&str, &str)],
        return_type: &str,
        kind: MethodKind,
        lines: impl IntoIterator<Item = u32>,
        body: F,
    ) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        let mut lines: Vec<u32> = lines.into_iter().collect();
        lines.sort_unstable();
        lines.dedup();
        self.class.methods.push(MethodDef {
            name,
            params: params
                .iter()
                .map(|(name, ty)| (name.to_string(), ty.to_string()))
                .collect(),
            return_type: return_type.to_string(),
            kind,
            lines,
            body: Arc::new(body),
        });
        self
    }

    pub fn build(self) -> ClassDef {
        self.class
    }
}
