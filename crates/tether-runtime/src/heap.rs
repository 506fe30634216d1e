use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::class::ClassDef;
use crate::{ObjectCategory, ObjectId, ObjectRef, PrimitiveKind, Value};

#[derive(Debug)]
pub(crate) struct HeapObject {
    pub(crate) class: Arc<ClassDef>,
    /// Instance field values in declaration order.
    pub(crate) fields: Vec<(String, Value)>,
    pub(crate) string: Option<String>,
}

impl HeapObject {
    pub(crate) fn category(&self) -> ObjectCategory {
        self.class.category
    }

    pub(crate) fn as_ref(&self, id: ObjectId) -> ObjectRef {
        ObjectRef {
            id,
            runtime_type: self.class.name.clone(),
        }
    }
}

/// Debuggee object storage plus static field values.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    objects: HashMap<ObjectId, HeapObject>,
    statics: HashMap<String, BTreeMap<String, Value>>,
    next_id: ObjectId,
}

pub(crate) fn default_for(type_name: &str) -> Value {
    match PrimitiveKind::from_type_name(type_name) {
        Some(kind) => Value::Primitive(kind.default_value()),
        None => Value::Null,
    }
}

impl Heap {
    pub(crate) fn allocate(&mut self, class: &Arc<ClassDef>) -> ObjectRef {
        let fields = class
            .instance_fields()
            .map(|f| (f.name.clone(), default_for(&f.type_name)))
            .collect();
        self.insert(HeapObject {
            class: class.clone(),
            fields,
            string: None,
        })
    }

    pub(crate) fn allocate_string(&mut self, class: &Arc<ClassDef>, value: &str) -> ObjectRef {
        self.insert(HeapObject {
            class: class.clone(),
            fields: Vec::new(),
            string: Some(value.to_string()),
        })
    }

    fn insert(&mut self, object: HeapObject) -> ObjectRef {
        self.next_id += 1;
        let id = self.next_id;
        let object_ref = object.as_ref(id);
        self.objects.insert(id, object);
        object_ref
    }

    pub(crate) fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(&id)
    }

    pub(crate) fn field(&self, id: ObjectId, name: &str) -> Option<&Value> {
        self.objects
            .get(&id)?
            .fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Returns `false` if the object or field does not exist.
    pub(crate) fn set_field(&mut self, id: ObjectId, name: &str, value: Value) -> bool {
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        match object.fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn init_statics(&mut self, class: &ClassDef) {
        let values = class
            .static_fields()
            .map(|f| (f.name.clone(), default_for(&f.type_name)))
            .collect();
        self.statics.insert(class.name.clone(), values);
    }

    pub(crate) fn static_field(&self, class: &str, name: &str) -> Option<&Value> {
        self.statics.get(class)?.get(name)
    }

    pub(crate) fn set_static(&mut self, class: &str, name: &str, value: Value) -> bool {
        match self
            .statics
            .get_mut(class)
            .and_then(|fields| fields.get_mut(name))
        {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Drop all objects and reset statics. Object ids are never reused.
    pub(crate) fn reset(&mut self) {
        self.objects.clear();
        self.statics.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }
}
