use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Size charged for every object header.
pub const OBJECT_HEADER_SIZE: usize = 16;
/// Extra size charged for the GC header of container objects.
pub const GC_HEAD_SIZE: usize = 16;
const POINTER_SIZE: usize = 8;

static NEXT_OBJECT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    pub id: usize,
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectId {
    pub fn new() -> Self {
        Self {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub const fn from_raw(id: usize) -> Self {
        Self { id }
    }

    pub fn as_usize(&self) -> usize {
        self.id
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.id)
    }
}

const COLLECTING: u8 = 0x1;
const UNREACHABLE: u8 = 0x2;

/// Per-object bookkeeping used while a collection pass runs.
#[derive(Debug, Clone, Default)]
pub struct PyGCHead {
    refs: isize,
    flags: u8,
    pub generation: usize,
}

impl PyGCHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refs(&mut self, refs: isize) {
        self.refs = refs;
    }

    pub fn get_refs(&self) -> isize {
        self.refs
    }

    pub fn dec_refs(&mut self) {
        if self.refs > 0 {
            self.refs -= 1;
        }
    }

    pub fn set_collecting(&mut self) {
        self.flags |= COLLECTING;
    }

    pub fn clear_collecting(&mut self) {
        self.flags &= !COLLECTING;
        self.refs = 0;
    }

    pub fn is_collecting(&self) -> bool {
        (self.flags & COLLECTING) != 0
    }

    pub fn set_unreachable(&mut self) {
        self.flags |= UNREACHABLE;
    }

    pub fn clear_unreachable(&mut self) {
        self.flags &= !UNREACHABLE;
    }

    pub fn is_unreachable(&self) -> bool {
        (self.flags & UNREACHABLE) != 0
    }
}

/// An outgoing reference, labelled the way it is reached from its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referent {
    pub label: String,
    pub target: ObjectId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectData {
    None,
    Integer(i64),
    Float(f64),
    Str(String),
    List(Vec<ObjectId>),
    Dict(Vec<(String, ObjectId)>),
    Instance(Vec<(String, ObjectId)>),
}

impl ObjectData {
    /// Containers are the only objects able to take part in a cycle.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ObjectData::List(_) | ObjectData::Dict(_) | ObjectData::Instance(_)
        )
    }

    pub fn referents(&self) -> Vec<Referent> {
        match self {
            ObjectData::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, target)| Referent {
                    label: format!("[{i}]"),
                    target: *target,
                })
                .collect(),
            ObjectData::Dict(entries) => entries
                .iter()
                .map(|(key, target)| Referent {
                    label: format!("['{key}']"),
                    target: *target,
                })
                .collect(),
            ObjectData::Instance(attrs) => attrs
                .iter()
                .map(|(name, target)| Referent {
                    label: name.clone(),
                    target: *target,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn payload_size(&self) -> usize {
        match self {
            ObjectData::None => 0,
            ObjectData::Integer(_) | ObjectData::Float(_) => 8,
            ObjectData::Str(s) => s.len(),
            ObjectData::List(items) => items.len() * POINTER_SIZE,
            ObjectData::Dict(entries) | ObjectData::Instance(entries) => entries
                .iter()
                .map(|(key, _)| key.len() + POINTER_SIZE)
                .sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PyObject {
    pub gc_head: PyGCHead,
    pub type_name: String,
    pub data: ObjectData,
    pub refcount: usize,
    pub gc_tracked: bool,
    pub has_finalizer: bool,
    pub id: ObjectId,
}

impl PyObject {
    pub fn new(type_name: impl Into<String>, data: ObjectData) -> Self {
        let gc_tracked = data.is_container();
        Self {
            gc_head: PyGCHead::new(),
            type_name: type_name.into(),
            data,
            refcount: 1,
            gc_tracked,
            has_finalizer: false,
            id: ObjectId::new(),
        }
    }

    pub fn new_with_finalizer(type_name: impl Into<String>, data: ObjectData) -> Self {
        Self {
            has_finalizer: true,
            ..Self::new(type_name, data)
        }
    }

    pub fn get_refcount(&self) -> usize {
        self.refcount
    }

    pub fn inc_ref(&mut self) {
        self.refcount += 1;
    }

    /// Returns true when the last reference went away.
    pub fn dec_ref(&mut self) -> bool {
        if self.refcount > 0 {
            self.refcount -= 1;
            self.refcount == 0
        } else {
            false
        }
    }

    pub fn has_finalizer(&self) -> bool {
        self.has_finalizer
    }

    pub fn referents(&self) -> Vec<Referent> {
        self.data.referents()
    }

    pub fn flat_size(&self) -> usize {
        let gc_head = if self.gc_tracked { GC_HEAD_SIZE } else { 0 };
        OBJECT_HEADER_SIZE + gc_head + self.data.payload_size()
    }

    fn short_repr(&self) -> String {
        match &self.data {
            ObjectData::None => "None".to_string(),
            ObjectData::Integer(v) => v.to_string(),
            ObjectData::Float(v) => format!("{v:?}"),
            ObjectData::Str(s) => format!("'{s}'"),
            _ => format!("<{} object at {}>", self.type_name, self.id),
        }
    }

    /// Textual representation; container members are shown in short form so
    /// self-referencing structures never recurse.
    pub fn repr_with(&self, lookup: impl Fn(ObjectId) -> Option<String>) -> String {
        let member = |id: ObjectId| lookup(id).unwrap_or_else(|| format!("<freed {id}>"));
        match &self.data {
            ObjectData::List(items) => {
                let parts: Vec<String> = items.iter().map(|id| member(*id)).collect();
                format!("[{}]", parts.join(", "))
            }
            ObjectData::Dict(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(key, id)| format!("'{key}': {}", member(*id)))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            _ => self.short_repr(),
        }
    }

    pub fn member_repr(&self) -> String {
        self.short_repr()
    }
}

impl PartialEq for PyObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PyObject {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ids_are_unique() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert_eq!(ObjectId::from_raw(255).to_string(), "0x000000ff");
    }

    #[test]
    fn test_only_containers_are_tracked() {
        let int = PyObject::new("int", ObjectData::Integer(1));
        let list = PyObject::new("list", ObjectData::List(Vec::new()));
        assert!(!int.gc_tracked);
        assert!(list.gc_tracked);
        assert_eq!(int.flat_size(), OBJECT_HEADER_SIZE + 8);
        assert_eq!(list.flat_size(), OBJECT_HEADER_SIZE + GC_HEAD_SIZE);
    }

    #[test]
    fn test_refcount() {
        let mut obj = PyObject::new("int", ObjectData::Integer(7));
        obj.inc_ref();
        assert!(!obj.dec_ref());
        assert!(obj.dec_ref());
        assert!(!obj.dec_ref());
        assert_eq!(obj.get_refcount(), 0);
    }

    #[test]
    fn test_referent_labels() {
        let a = ObjectId::from_raw(1);
        let b = ObjectId::from_raw(2);
        let list = ObjectData::List(vec![a, b]);
        let labels: Vec<String> = list.referents().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["[0]", "[1]"]);

        let dict = ObjectData::Dict(vec![("k".to_string(), a)]);
        assert_eq!(dict.referents()[0].label, "['k']");

        let inst = ObjectData::Instance(vec![("next".to_string(), b)]);
        assert_eq!(inst.referents()[0].label, "next");
        assert_eq!(inst.referents()[0].target, b);
    }

    #[test]
    fn test_gc_head_flags() {
        let mut head = PyGCHead::new();
        head.set_refs(2);
        head.set_collecting();
        head.dec_refs();
        assert_eq!(head.get_refs(), 1);
        assert!(head.is_collecting());
        head.set_unreachable();
        assert!(head.is_unreachable());
        head.clear_unreachable();
        head.clear_collecting();
        assert!(!head.is_collecting());
        assert_eq!(head.get_refs(), 0);
    }

    #[test]
    fn test_repr() {
        let s = PyObject::new("str", ObjectData::Str("hi".to_string()));
        assert_eq!(s.repr_with(|_| None), "'hi'");

        let member = ObjectId::from_raw(3);
        let list = PyObject::new("list", ObjectData::List(vec![member]));
        assert_eq!(list.repr_with(|_| Some("1".to_string())), "[1]");
        assert_eq!(list.repr_with(|_| None), "[<freed 0x00000003>]");
    }
}
