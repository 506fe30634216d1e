use std::fmt;
use std::hash::{Hash, Hasher};

use tether_runtime::{ClassInfo, Handle, Primitive};

/// A debuggee object seen from the controller, addressed by handle.
///
/// Two mirrors are equal exactly when their handles are; the class name is
/// informational. Dropping a mirror releases nothing.
#[derive(Clone, Debug)]
pub struct ObjectMirror {
    handle: Handle,
    class_name: String,
}

impl ObjectMirror {
    pub fn new(handle: Handle, class_name: impl Into<String>) -> Self {
        Self {
            handle,
            class_name: class_name.into(),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

impl PartialEq for ObjectMirror {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for ObjectMirror {}

impl Hash for ObjectMirror {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl fmt::Display for ObjectMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class_name, self.handle)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMirror {
    pub name: String,
    pub type_name: String,
    pub is_static: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodMirror {
    pub name: String,
    pub param_types: Vec<String>,
    pub return_type: String,
    pub is_static: bool,
    pub is_constructor: bool,
}

impl MethodMirror {
    /// `name(type, type)`.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.param_types.join(", "))
    }
}

/// A class loaded in the debuggee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassMirror {
    pub name: String,
    pub source_file: Option<String>,
    pub fields: Vec<FieldMirror>,
    pub methods: Vec<MethodMirror>,
    pub lines: Vec<u32>,
}

impl ClassMirror {
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn constructors(&self) -> impl Iterator<Item = &MethodMirror> {
        self.methods.iter().filter(|m| m.is_constructor)
    }

    pub fn static_method(&self, name: &str, param_types: &[&str]) -> Option<&MethodMirror> {
        self.methods.iter().find(|m| {
            m.is_static
                && m.name == name
                && m.param_types.len() == param_types.len()
                && m.param_types.iter().zip(param_types).all(|(a, b)| a == b)
        })
    }
}

impl From<ClassInfo> for ClassMirror {
    fn from(info: ClassInfo) -> Self {
        Self {
            name: info.name,
            source_file: info.source_file,
            fields: info
                .fields
                .into_iter()
                .map(|f| FieldMirror {
                    name: f.name,
                    type_name: f.type_name,
                    is_static: f.is_static,
                })
                .collect(),
            methods: info
                .methods
                .into_iter()
                .map(|m| MethodMirror {
                    name: m.name,
                    param_types: m.param_types,
                    return_type: m.return_type,
                    is_static: m.is_static,
                    is_constructor: m.is_constructor,
                })
                .collect(),
            lines: info.lines,
        }
    }
}

/// A value as the controller sees it: debuggee objects only appear as mirrors.
#[derive(Clone, Debug, PartialEq)]
pub enum MirrorValue {
    Null,
    Primitive(Primitive),
    Object(ObjectMirror),
}

impl MirrorValue {
    pub fn as_object(&self) -> Option<&ObjectMirror> {
        match self {
            MirrorValue::Object(mirror) => Some(mirror),
            _ => None,
        }
    }
}

impl From<ObjectMirror> for MirrorValue {
    fn from(mirror: ObjectMirror) -> Self {
        MirrorValue::Object(mirror)
    }
}

impl From<Primitive> for MirrorValue {
    fn from(value: Primitive) -> Self {
        MirrorValue::Primitive(value)
    }
}

macro_rules! mirror_from_primitive {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for MirrorValue {
                fn from(value: $ty) -> Self {
                    MirrorValue::Primitive(Primitive::from(value))
                }
            }
        )+
    };
}

mirror_from_primitive!(bool, i8, i16, i32, i64, f32, f64, char);

impl fmt::Display for MirrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorValue::Null => write!(f, "null"),
            MirrorValue::Primitive(p) => write!(f, "{p}"),
            MirrorValue::Object(mirror) => write!(f, "{mirror}"),
        }
    }
}

/// One instance field of an inspected object.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldEntry {
    pub name: String,
    pub type_name: String,
    pub value: MirrorValue,
}
