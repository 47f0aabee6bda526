//! Typed objects, the light type model, and the identifier tables.
//!
//! Every named entity the resolver sees (variables, struct fields, functions
//! and methods, type names, constants, package names, labels, builtins) is an
//! [`Object`] stored once in an arena and referred to by [`ObjectId`].
//! Identity comparisons are by id, never by name.

use std::collections::HashMap;

use gotug_core::position::Pos;
use gotug_core::types::SymbolKind;

/// Index of an object in [`TypeInfo::objects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

/// Index of a loaded package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PkgId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjKind {
    Var,
    Field { embedded: bool },
    Func { has_receiver: bool },
    TypeName,
    Const,
    /// An imported package name. `target` is set when the imported package
    /// was loaded into the same program.
    PkgName { path: String, target: Option<PkgId> },
    Label,
    Builtin,
    Nil,
}

#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub kind: ObjKind,
    /// Declaring identifier; `Pos::NONE` for universe objects.
    pub pos: Pos,
    /// Declaring package; `None` for universe objects.
    pub pkg: Option<PkgId>,
    pub typ: TypeRef,
}

impl Object {
    pub fn symbol_kind(&self) -> SymbolKind {
        match self.kind {
            ObjKind::Var => SymbolKind::Variable,
            ObjKind::Field { .. } => SymbolKind::Field,
            ObjKind::Func { has_receiver: true } => SymbolKind::Method,
            ObjKind::Func { has_receiver: false } => SymbolKind::Function,
            ObjKind::TypeName => SymbolKind::Type,
            ObjKind::Const => SymbolKind::Constant,
            ObjKind::PkgName { .. } => SymbolKind::Package,
            ObjKind::Label => SymbolKind::Label,
            ObjKind::Builtin => SymbolKind::Builtin,
            ObjKind::Nil => SymbolKind::Nil,
        }
    }

    pub fn is_pkg_name(&self) -> bool {
        matches!(self.kind, ObjKind::PkgName { .. })
    }
}

// ============================================================================
// Types
// ============================================================================

/// A function signature. Receivers are not included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub params: Vec<TypeRef>,
    pub results: Vec<TypeRef>,
    pub variadic: bool,
}

/// The light type model used for selector resolution and inference.
///
/// It records enough structure to find fields and methods through
/// pointers, containers, calls and embedding; anything else is `Unknown`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TypeRef {
    #[default]
    Unknown,
    Basic(&'static str),
    /// A defined type (or type parameter) named by a `TypeName` object.
    Named(ObjectId),
    Pointer(Box<TypeRef>),
    Slice(Box<TypeRef>),
    Array(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
    Chan(Box<TypeRef>),
    Func(Box<Signature>),
    /// Field objects, in declaration order.
    Struct(Vec<ObjectId>),
    Interface {
        methods: Vec<ObjectId>,
        embedded: Vec<TypeRef>,
    },
    /// The results of a multi-value call.
    Tuple(Vec<TypeRef>),
}

impl TypeRef {
    pub fn pointer(t: TypeRef) -> TypeRef {
        TypeRef::Pointer(Box::new(t))
    }

    pub fn slice(t: TypeRef) -> TypeRef {
        TypeRef::Slice(Box::new(t))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeRef::Unknown)
    }

    /// The first value of a tuple, or the type itself.
    pub fn single(self) -> TypeRef {
        match self {
            TypeRef::Tuple(mut items) if !items.is_empty() => items.swap_remove(0),
            TypeRef::Tuple(_) => TypeRef::Unknown,
            other => other,
        }
    }
}

/// Underlying type and method set of a defined type.
#[derive(Debug, Clone, Default)]
pub struct NamedInfo {
    pub underlying: TypeRef,
    pub methods: Vec<ObjectId>,
}

// ============================================================================
// TypeInfo
// ============================================================================

/// Maximum embedding depth followed during member lookup.
const MAX_EMBED_DEPTH: usize = 8;

/// Object arena plus the three identifier tables, keyed by the identifier's
/// start position:
///
/// - `defs`: identifier declares the object
/// - `uses`: identifier refers to the object
/// - `implicits`: identifier introduces the object implicitly (the guard
///   variable of a type switch)
#[derive(Debug, Default)]
pub struct TypeInfo {
    pub objects: Vec<Object>,
    pub named: HashMap<ObjectId, NamedInfo>,
    pub defs: HashMap<Pos, ObjectId>,
    pub uses: HashMap<Pos, ObjectId>,
    pub implicits: HashMap<Pos, ObjectId>,
    pub universe: HashMap<String, ObjectId>,
}

const BASIC_TYPES: &[&str] = &[
    "bool",
    "byte",
    "complex64",
    "complex128",
    "float32",
    "float64",
    "int",
    "int8",
    "int16",
    "int32",
    "int64",
    "rune",
    "string",
    "uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "uintptr",
];

const BUILTIN_FUNCS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max",
    "min", "new", "panic", "print", "println", "real", "recover",
];

impl TypeInfo {
    /// Create an empty table with the universe scope populated.
    pub fn new() -> Self {
        let mut info = TypeInfo::default();
        for name in BASIC_TYPES {
            let id = info.universe_object(name, ObjKind::TypeName, TypeRef::Unknown);
            info.objects[id.0 as usize].typ = TypeRef::Named(id);
            info.named.insert(
                id,
                NamedInfo {
                    underlying: TypeRef::Basic(name),
                    methods: Vec::new(),
                },
            );
        }

        // error is an interface with a single Error() string method
        let error_id = info.universe_object("error", ObjKind::TypeName, TypeRef::Unknown);
        info.objects[error_id.0 as usize].typ = TypeRef::Named(error_id);
        let error_method = info.alloc(Object {
            name: "Error".to_string(),
            kind: ObjKind::Func { has_receiver: true },
            pos: Pos::NONE,
            pkg: None,
            typ: TypeRef::Func(Box::new(Signature {
                params: vec![],
                results: vec![TypeRef::Basic("string")],
                variadic: false,
            })),
        });
        info.named.insert(
            error_id,
            NamedInfo {
                underlying: TypeRef::Interface {
                    methods: vec![error_method],
                    embedded: vec![],
                },
                methods: Vec::new(),
            },
        );

        for name in ["any", "comparable"] {
            info.universe_object(
                name,
                ObjKind::TypeName,
                TypeRef::Interface {
                    methods: vec![],
                    embedded: vec![],
                },
            );
        }
        for name in ["true", "false"] {
            info.universe_object(name, ObjKind::Const, TypeRef::Basic("bool"));
        }
        info.universe_object("iota", ObjKind::Const, TypeRef::Basic("int"));
        info.universe_object("nil", ObjKind::Nil, TypeRef::Unknown);
        for name in BUILTIN_FUNCS {
            info.universe_object(name, ObjKind::Builtin, TypeRef::Unknown);
        }
        info
    }

    fn universe_object(&mut self, name: &str, kind: ObjKind, typ: TypeRef) -> ObjectId {
        let id = self.alloc(Object {
            name: name.to_string(),
            kind,
            pos: Pos::NONE,
            pkg: None,
            typ,
        });
        self.universe.insert(name.to_string(), id);
        id
    }

    pub fn alloc(&mut self, object: Object) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0 as usize]
    }

    pub fn object_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.0 as usize]
    }

    /// The object an identifier declares or refers to (`defs` first).
    pub fn object_of(&self, pos: Pos) -> Option<ObjectId> {
        self.defs.get(&pos).or_else(|| self.uses.get(&pos)).copied()
    }

    /// Follow defined types to their underlying type.
    pub fn underlying(&self, t: &TypeRef) -> TypeRef {
        let mut current = t.clone();
        for _ in 0..MAX_EMBED_DEPTH {
            match current {
                TypeRef::Named(id) => match self.named.get(&id) {
                    Some(info) => current = info.underlying.clone(),
                    None => return TypeRef::Unknown,
                },
                other => return other,
            }
        }
        TypeRef::Unknown
    }

    /// Find field or method `name` of a value of type `t`.
    ///
    /// Looks through one level of pointer, then breadth-first through
    /// embedded fields and embedded interfaces; the shallowest match wins.
    pub fn lookup_member(&self, t: &TypeRef, name: &str) -> Option<ObjectId> {
        let start = match t {
            TypeRef::Pointer(inner) => (**inner).clone(),
            other => other.clone(),
        };
        let mut level = vec![start];
        let mut seen: Vec<ObjectId> = Vec::new();

        for _ in 0..MAX_EMBED_DEPTH {
            let mut next = Vec::new();
            for t in &level {
                let t = match t {
                    TypeRef::Pointer(inner) => (**inner).clone(),
                    other => other.clone(),
                };
                if let TypeRef::Named(id) = t {
                    if seen.contains(&id) {
                        continue;
                    }
                    seen.push(id);
                    if let Some(info) = self.named.get(&id) {
                        if let Some(m) = self.find_named(&info.methods, name) {
                            return Some(m);
                        }
                    }
                }
                match self.underlying(&t) {
                    TypeRef::Struct(fields) => {
                        if let Some(f) = self.find_named(&fields, name) {
                            return Some(f);
                        }
                        for f in fields {
                            let obj = self.object(f);
                            if obj.kind == (ObjKind::Field { embedded: true }) {
                                next.push(obj.typ.clone());
                            }
                        }
                    }
                    TypeRef::Interface { methods, embedded } => {
                        if let Some(m) = self.find_named(&methods, name) {
                            return Some(m);
                        }
                        next.extend(embedded);
                    }
                    _ => {}
                }
            }
            if next.is_empty() {
                break;
            }
            level = next;
        }
        None
    }

    /// Direct (non-promoted) field `name` of a struct type.
    pub fn direct_field(&self, t: &TypeRef, name: &str) -> Option<ObjectId> {
        let t = match t {
            TypeRef::Pointer(inner) => (**inner).clone(),
            other => other.clone(),
        };
        match self.underlying(&t) {
            TypeRef::Struct(fields) => self.find_named(&fields, name),
            _ => None,
        }
    }

    fn find_named(&self, ids: &[ObjectId], name: &str) -> Option<ObjectId> {
        ids.iter().copied().find(|id| self.object(*id).name == name)
    }
}
