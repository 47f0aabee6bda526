//! Name and type resolution over loaded packages.
//!
//! The checker runs three phases over every package:
//!
//! 1. **declare**: package-level objects and per-file import scopes
//! 2. **signatures**: type declarations, function signatures, method sets
//!    and declared variable/constant types
//! 3. **bodies**: package-level initializers, then function bodies; packages
//!    are visited in import order so inferred types of imported variables
//!    are known
//!
//! Results are the `defs`, `uses` and `implicits` tables of [`TypeInfo`].
//! Identifiers that cannot be resolved are left out of the tables. A plain
//! identifier found in no scope is also reported as the file's type error,
//! unless the file's scope is not fully known (a dot import of a package
//! outside the program). Members of packages outside the program are never
//! reported.

use std::collections::{HashMap, HashSet};

use gotug_core::position::{Pos, PositionTable};
use tracing::trace;
use tree_sitter::Node;

use crate::loader::{Package, SourceFile};
use crate::objects::{NamedInfo, ObjKind, Object, ObjectId, PkgId, Signature, TypeInfo, TypeRef};
use crate::syntax::{
    self, default_package_name, field_children, has_token, named_children, text, Diagnostic,
    ImportName,
};

const TYPE_KINDS: &[&str] = &[
    "type_identifier",
    "qualified_type",
    "pointer_type",
    "slice_type",
    "array_type",
    "implicit_length_array_type",
    "map_type",
    "channel_type",
    "function_type",
    "struct_type",
    "interface_type",
    "generic_type",
    "parenthesized_type",
];

fn is_type_kind(kind: &str) -> bool {
    TYPE_KINDS.contains(&kind)
}

/// Resolve every package of a program, filling `info`. Returns the first
/// type error of each file, indexed like `files`.
///
/// `external` maps import paths of packages outside the program to their
/// package clause names, where known.
pub fn check_program<'a>(
    files: &'a [SourceFile],
    packages: &mut [Package],
    positions: &'a PositionTable,
    info: &mut TypeInfo,
    external: &'a HashMap<String, String>,
) -> Vec<Option<Diagnostic>> {
    let mut checker = Checker::new(files, packages, positions, info, external);
    checker.run();
    checker.type_errors
}

#[derive(Debug, Clone)]
struct Binding {
    obj: ObjectId,
    /// Type override inside a type switch clause.
    narrowed: Option<TypeRef>,
}

#[derive(Debug, Default)]
struct FileScope {
    names: HashMap<String, ObjectId>,
    dot_imports: Vec<PkgId>,
    /// A dot import of a package outside the program.
    opaque: bool,
    /// Some import name was derived from its path, not from a loaded
    /// package clause.
    guessed_names: bool,
}

/// Result of evaluating an expression.
#[derive(Debug, Clone)]
enum Operand {
    Value(TypeRef),
    Type(TypeRef),
    Package(ObjectId),
    Builtin(ObjectId),
    NoValue,
}

impl Operand {
    fn value_type(self) -> TypeRef {
        match self {
            Operand::Value(t) => t,
            _ => TypeRef::Unknown,
        }
    }
}

/// Package-level work carried from one phase to the next.
enum TopDecl<'a> {
    Type {
        file: usize,
        spec: Node<'a>,
        obj: ObjectId,
    },
    Func {
        file: usize,
        decl: Node<'a>,
        obj: ObjectId,
        method: bool,
    },
    Var {
        file: usize,
        spec: Node<'a>,
        objs: Vec<Option<ObjectId>>,
    },
    Const {
        file: usize,
        spec: Node<'a>,
        objs: Vec<Option<ObjectId>>,
        /// Earlier spec of the same group whose values this one repeats.
        inherit: Option<usize>,
    },
}

struct Checker<'a, 'p> {
    files: &'a [SourceFile],
    packages: &'p mut [Package],
    positions: &'a PositionTable,
    info: &'p mut TypeInfo,
    by_path: HashMap<String, PkgId>,
    external: &'a HashMap<String, String>,
    file_scopes: Vec<FileScope>,
    pending: Vec<Vec<TopDecl<'a>>>,
    /// Resolved type per type node id, so re-resolution adds no objects.
    type_cache: HashMap<usize, TypeRef>,
    /// Objects declared by a function header (type params, receiver,
    /// params, named results), keyed by the declaration node id.
    headers: HashMap<usize, Vec<(String, ObjectId)>>,
    cur_file: usize,
    cur_pkg: PkgId,
    blocks: Vec<HashMap<String, Binding>>,
    labels: Vec<HashMap<String, ObjectId>>,
    type_errors: Vec<Option<Diagnostic>>,
}

impl<'a, 'p> Checker<'a, 'p> {
    fn new(
        files: &'a [SourceFile],
        packages: &'p mut [Package],
        positions: &'a PositionTable,
        info: &'p mut TypeInfo,
        external: &'a HashMap<String, String>,
    ) -> Self {
        let mut by_path = HashMap::new();
        for pkg in packages.iter() {
            by_path.entry(pkg.import_path.clone()).or_insert(pkg.id);
        }
        let pending = packages.iter().map(|_| Vec::new()).collect();
        Checker {
            files,
            packages,
            positions,
            info,
            by_path,
            external,
            file_scopes: files.iter().map(|_| FileScope::default()).collect(),
            pending,
            type_cache: HashMap::new(),
            headers: HashMap::new(),
            cur_file: 0,
            cur_pkg: PkgId(0),
            blocks: Vec::new(),
            labels: Vec::new(),
            type_errors: vec![None; files.len()],
        }
    }

    fn run(&mut self) {
        let count = self.packages.len();
        for p in 0..count {
            self.declare_package(PkgId(p as u32));
        }
        for p in 0..count {
            self.resolve_signatures(PkgId(p as u32));
        }
        for p in self.import_order() {
            self.check_bodies(p);
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn src(&self) -> &'a str {
        let files = self.files;
        &files[self.cur_file].source
    }

    fn node_text(&self, node: Node<'_>) -> &'a str {
        text(node, self.src())
    }

    fn pos(&self, node: Node<'_>) -> Pos {
        self.positions
            .pos(self.files[self.cur_file].id, node.start_byte() as u32)
    }

    fn enter_file(&mut self, file: usize) {
        self.cur_file = file;
        self.cur_pkg = self.files[file].package;
    }

    fn new_object(&mut self, name: &str, kind: ObjKind, node: Node<'_>, typ: TypeRef) -> ObjectId {
        let pos = self.pos(node);
        self.info.alloc(Object {
            name: name.to_string(),
            kind,
            pos,
            pkg: Some(self.cur_pkg),
            typ,
        })
    }

    fn record_def(&mut self, node: Node<'_>, obj: ObjectId) {
        let pos = self.pos(node);
        self.info.defs.insert(pos, obj);
    }

    fn record_use(&mut self, node: Node<'_>, obj: ObjectId) {
        let pos = self.pos(node);
        trace!(pos = pos.0, name = %self.info.object(obj).name, "use");
        self.info.uses.insert(pos, obj);
    }

    fn push_block(&mut self) {
        self.blocks.push(HashMap::new());
    }

    fn pop_block(&mut self) {
        self.blocks.pop();
    }

    fn bind(&mut self, name: &str, obj: ObjectId) {
        if name == "_" {
            return;
        }
        if let Some(block) = self.blocks.last_mut() {
            block.insert(
                name.to_string(),
                Binding {
                    obj,
                    narrowed: None,
                },
            );
        }
    }

    /// Declare a local object and bind it in the innermost block.
    fn declare_local(&mut self, ident: Node<'a>, kind: ObjKind, typ: TypeRef) -> Option<ObjectId> {
        let name = self.node_text(ident);
        if name == "_" {
            return None;
        }
        let obj = self.new_object(name, kind, ident, typ);
        self.record_def(ident, obj);
        self.bind(name, obj);
        Some(obj)
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        for block in self.blocks.iter().rev() {
            if let Some(b) = block.get(name) {
                return Some(b.clone());
            }
        }
        let plain = |obj: ObjectId| Binding {
            obj,
            narrowed: None,
        };
        let scope = &self.file_scopes[self.cur_file];
        if let Some(&obj) = scope.names.get(name) {
            return Some(plain(obj));
        }
        if let Some(&obj) = self.packages[self.cur_pkg.0 as usize].scope.get(name) {
            return Some(plain(obj));
        }
        if syntax::is_exported(name) {
            for pkg in &scope.dot_imports {
                if let Some(&obj) = self.packages[pkg.0 as usize].scope.get(name) {
                    return Some(plain(obj));
                }
            }
        }
        self.info.universe.get(name).copied().map(plain)
    }

    /// Record `name` at `node` as undefined, keeping the first per file.
    fn undefined(&mut self, node: Node<'_>, name: &str) {
        let file = self.cur_file;
        if self.file_scopes[file].opaque || self.type_errors[file].is_some() {
            return;
        }
        trace!(name, "undefined");
        self.type_errors[file] = Some(Diagnostic::at(node, format!("undefined: {}", name)));
    }

    /// Exported member `name` of a loaded package.
    fn package_member(&self, pkg: PkgId, name: &str) -> Option<ObjectId> {
        if !syntax::is_exported(name) {
            return None;
        }
        self.packages[pkg.0 as usize].scope.get(name).copied()
    }

    fn pkg_target(&self, obj: ObjectId) -> Option<PkgId> {
        match &self.info.object(obj).kind {
            ObjKind::PkgName { target, .. } => *target,
            _ => None,
        }
    }

    /// Packages in an order where imports come before importers.
    fn import_order(&self) -> Vec<PkgId> {
        let mut deps: Vec<HashSet<PkgId>> = vec![HashSet::new(); self.packages.len()];
        for (idx, file) in self.files.iter().enumerate() {
            let scope = &self.file_scopes[idx];
            for &obj in scope.names.values() {
                if let Some(t) = self.pkg_target(obj) {
                    deps[file.package.0 as usize].insert(t);
                }
            }
            for &t in &scope.dot_imports {
                deps[file.package.0 as usize].insert(t);
            }
        }
        let mut order = Vec::new();
        let mut state = vec![0u8; self.packages.len()];
        fn visit(p: usize, deps: &[HashSet<PkgId>], state: &mut [u8], order: &mut Vec<PkgId>) {
            if state[p] != 0 {
                return;
            }
            state[p] = 1;
            let mut ds: Vec<PkgId> = deps[p].iter().copied().collect();
            ds.sort();
            for d in ds {
                visit(d.0 as usize, deps, state, order);
            }
            state[p] = 2;
            order.push(PkgId(p as u32));
        }
        for p in 0..self.packages.len() {
            visit(p, &deps, &mut state, &mut order);
        }
        order
    }

    // ------------------------------------------------------------------
    // Phase 1: declare
    // ------------------------------------------------------------------

    fn declare_package(&mut self, pkg: PkgId) {
        let members = self.packages[pkg.0 as usize].files.clone();
        for file in members {
            self.enter_file(file);
            let files = self.files;
            let root = files[file].tree.root_node();
            self.declare_imports(root);
            for decl in named_children(root) {
                self.declare_top_level(pkg, file, decl);
            }
        }
    }

    fn declare_imports(&mut self, root: Node<'a>) {
        for spec in syntax::import_specs(root) {
            let path = spec.path_value(self.src());
            let target = self.by_path.get(&path).copied();
            let known = self.external.get(&path);
            let default_name = match (target, known) {
                (Some(t), _) => self.packages[t.0 as usize].name.clone(),
                (None, Some(name)) => name.clone(),
                (None, None) => default_package_name(&path),
            };
            let guessed = target.is_none() && known.is_none();
            let kind = ObjKind::PkgName { path, target };
            match spec.import_name(self.src()) {
                ImportName::Named(name) => {
                    let Some(name_node) = spec.name else { continue };
                    let obj = self.new_object(&name, kind, name_node, TypeRef::Unknown);
                    self.record_def(name_node, obj);
                    self.file_scopes[self.cur_file].names.insert(name, obj);
                }
                ImportName::Default => {
                    let obj = self.new_object(&default_name, kind, spec.path, TypeRef::Unknown);
                    let pos = self.pos(spec.path);
                    self.info.implicits.insert(pos, obj);
                    let scope = &mut self.file_scopes[self.cur_file];
                    scope.names.insert(default_name, obj);
                    scope.guessed_names |= guessed;
                }
                ImportName::Dot => {
                    let obj = self.new_object(&default_name, kind, spec.path, TypeRef::Unknown);
                    let pos = self.pos(spec.path);
                    self.info.implicits.insert(pos, obj);
                    match target {
                        Some(t) => self.file_scopes[self.cur_file].dot_imports.push(t),
                        None => self.file_scopes[self.cur_file].opaque = true,
                    }
                }
                ImportName::Blank => {
                    let obj = self.new_object("_", kind, spec.path, TypeRef::Unknown);
                    let pos = self.pos(spec.path);
                    self.info.implicits.insert(pos, obj);
                }
            }
        }
    }

    fn declare_package_object(&mut self, pkg: PkgId, ident: Node<'a>, kind: ObjKind) -> Option<ObjectId> {
        let name = self.node_text(ident);
        if name == "_" {
            return None;
        }
        let obj = self.new_object(name, kind, ident, TypeRef::Unknown);
        self.record_def(ident, obj);
        if name != "init" {
            self.packages[pkg.0 as usize]
                .scope
                .insert(name.to_string(), obj);
        }
        Some(obj)
    }

    fn declare_top_level(&mut self, pkg: PkgId, file: usize, decl: Node<'a>) {
        match decl.kind() {
            "function_declaration" => {
                let Some(name) = decl.child_by_field_name("name") else { return };
                if let Some(obj) =
                    self.declare_package_object(pkg, name, ObjKind::Func { has_receiver: false })
                {
                    self.pending[pkg.0 as usize].push(TopDecl::Func {
                        file,
                        decl,
                        obj,
                        method: false,
                    });
                }
            }
            "method_declaration" => {
                let Some(name) = decl.child_by_field_name("name") else { return };
                let obj = self.new_object(
                    self.node_text(name),
                    ObjKind::Func { has_receiver: true },
                    name,
                    TypeRef::Unknown,
                );
                self.record_def(name, obj);
                self.pending[pkg.0 as usize].push(TopDecl::Func {
                    file,
                    decl,
                    obj,
                    method: true,
                });
            }
            "type_declaration" => {
                for spec in syntax::decl_specs(decl, &["type_spec", "type_alias"]) {
                    let Some(name) = spec.child_by_field_name("name") else { continue };
                    if let Some(obj) = self.declare_package_object(pkg, name, ObjKind::TypeName) {
                        if spec.kind() == "type_spec" {
                            self.info.object_mut(obj).typ = TypeRef::Named(obj);
                            self.info.named.insert(obj, NamedInfo::default());
                        }
                        self.pending[pkg.0 as usize].push(TopDecl::Type { file, spec, obj });
                    }
                }
            }
            "var_declaration" => {
                for spec in syntax::decl_specs(decl, &["var_spec"]) {
                    let objs = field_children(spec, "name")
                        .into_iter()
                        .map(|n| self.declare_package_object(pkg, n, ObjKind::Var))
                        .collect();
                    self.pending[pkg.0 as usize].push(TopDecl::Var { file, spec, objs });
                }
            }
            "const_declaration" => {
                let mut last_with_values: Option<usize> = None;
                for spec in syntax::decl_specs(decl, &["const_spec"]) {
                    let objs = field_children(spec, "name")
                        .into_iter()
                        .map(|n| self.declare_package_object(pkg, n, ObjKind::Const))
                        .collect();
                    let has_values = spec.child_by_field_name("value").is_some();
                    let index = self.pending[pkg.0 as usize].len();
                    let inherit = if has_values { None } else { last_with_values };
                    if has_values {
                        last_with_values = Some(index);
                    }
                    self.pending[pkg.0 as usize].push(TopDecl::Const {
                        file,
                        spec,
                        objs,
                        inherit,
                    });
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Phase 2: signatures
    // ------------------------------------------------------------------

    fn resolve_signatures(&mut self, pkg: PkgId) {
        let pending = std::mem::take(&mut self.pending[pkg.0 as usize]);
        for item in &pending {
            match *item {
                TopDecl::Type { file, spec, obj } => {
                    self.enter_file(file);
                    self.push_block();
                    if let Some(tparams) = spec.child_by_field_name("type_parameters") {
                        self.declare_type_params(tparams);
                    }
                    let t = spec
                        .child_by_field_name("type")
                        .map(|n| self.resolve_type(n))
                        .unwrap_or_default();
                    self.pop_block();
                    if spec.kind() == "type_alias" {
                        self.info.object_mut(obj).typ = t;
                    } else if let Some(named) = self.info.named.get_mut(&obj) {
                        named.underlying = t;
                    }
                }
                TopDecl::Func {
                    file,
                    decl,
                    obj,
                    method,
                } => {
                    self.enter_file(file);
                    let (sig, recv_base) = self.declare_header(decl, method);
                    self.info.object_mut(obj).typ = TypeRef::Func(Box::new(sig));
                    if let Some(base) = recv_base {
                        if let Some(named) = self.info.named.get_mut(&base) {
                            named.methods.push(obj);
                        }
                    }
                }
                TopDecl::Var {
                    file,
                    spec,
                    ref objs,
                } => {
                    self.enter_file(file);
                    if let Some(tn) = spec.child_by_field_name("type") {
                        let t = self.resolve_type(tn);
                        for obj in objs.iter().flatten() {
                            self.info.object_mut(*obj).typ = t.clone();
                        }
                    }
                }
                TopDecl::Const {
                    file,
                    spec,
                    ref objs,
                    ..
                } => {
                    self.enter_file(file);
                    if let Some(tn) = spec.child_by_field_name("type") {
                        let t = self.resolve_type(tn);
                        for obj in objs.iter().flatten() {
                            self.info.object_mut(*obj).typ = t.clone();
                        }
                    }
                }
            }
        }
        self.pending[pkg.0 as usize] = pending;
    }

    fn declare_type_params(&mut self, list: Node<'a>) -> Vec<(String, ObjectId)> {
        let mut out = Vec::new();
        for decl in named_children(list) {
            if decl.kind() != "type_parameter_declaration" {
                continue;
            }
            let names = field_children(decl, "name");
            let mut objs = Vec::new();
            for name in names {
                let n = self.node_text(name);
                let obj = self.new_object(n, ObjKind::TypeName, name, TypeRef::Unknown);
                self.info.object_mut(obj).typ = TypeRef::Named(obj);
                self.info.named.insert(obj, NamedInfo::default());
                self.record_def(name, obj);
                self.bind(n, obj);
                objs.push(obj);
                out.push((n.to_string(), obj));
            }
            // Constraints may mention the parameters themselves.
            let constraint = decl
                .child_by_field_name("type")
                .map(|c| self.resolve_type(c))
                .unwrap_or_default();
            for obj in objs {
                if let Some(named) = self.info.named.get_mut(&obj) {
                    named.underlying = constraint.clone();
                }
            }
        }
        out
    }

    /// Resolve the header of a function, method or function literal:
    /// declares its type parameters, receiver, parameters and named results
    /// and returns the signature plus the receiver's base type name.
    fn declare_header(&mut self, decl: Node<'a>, method: bool) -> (Signature, Option<ObjectId>) {
        self.push_block();
        let mut bindings = Vec::new();
        if let Some(tparams) = decl.child_by_field_name("type_parameters") {
            bindings.extend(self.declare_type_params(tparams));
        }

        let mut recv_base = None;
        if method {
            if let Some(recv) = decl.child_by_field_name("receiver") {
                if let Some(param) = named_children(recv)
                    .into_iter()
                    .find(|n| n.kind() == "parameter_declaration")
                {
                    let (recv_type, base) = match param.child_by_field_name("type") {
                        Some(t) => self.receiver_type(t, &mut bindings),
                        None => (TypeRef::Unknown, None),
                    };
                    recv_base = base;
                    for name in field_children(param, "name") {
                        if let Some(obj) = self.declare_local(name, ObjKind::Var, recv_type.clone())
                        {
                            bindings.push((self.node_text(name).to_string(), obj));
                        }
                    }
                }
            }
        }

        let mut sig = Signature::default();
        if let Some(params) = decl.child_by_field_name("parameters") {
            let (types, variadic) = self.declare_params(params, &mut bindings);
            sig.params = types;
            sig.variadic = variadic;
        }
        if let Some(result) = decl.child_by_field_name("result") {
            if result.kind() == "parameter_list" {
                sig.results = self.declare_params(result, &mut bindings).0;
            } else {
                sig.results = vec![self.resolve_type(result)];
            }
        }
        self.pop_block();
        self.headers.insert(decl.id(), bindings);
        (sig, recv_base)
    }

    fn declare_params(
        &mut self,
        list: Node<'a>,
        bindings: &mut Vec<(String, ObjectId)>,
    ) -> (Vec<TypeRef>, bool) {
        let mut types = Vec::new();
        let mut variadic = false;
        for param in named_children(list) {
            let t = match param.kind() {
                "parameter_declaration" => self.resolve_field_type(param, "type"),
                "variadic_parameter_declaration" => {
                    variadic = true;
                    TypeRef::slice(self.resolve_field_type(param, "type"))
                }
                _ => continue,
            };
            let names = field_children(param, "name");
            if names.is_empty() {
                types.push(t.clone());
            }
            for name in names {
                types.push(t.clone());
                if let Some(obj) = self.declare_local(name, ObjKind::Var, t.clone()) {
                    bindings.push((self.node_text(name).to_string(), obj));
                }
            }
        }
        (types, variadic)
    }

    /// Receiver type and base type name; receiver type parameters are
    /// declared along the way.
    fn receiver_type(
        &mut self,
        node: Node<'a>,
        bindings: &mut Vec<(String, ObjectId)>,
    ) -> (TypeRef, Option<ObjectId>) {
        match node.kind() {
            "pointer_type" | "parenthesized_type" => {
                let Some(inner) = named_children(node).into_iter().next() else {
                    return (TypeRef::Unknown, None);
                };
                let (t, base) = self.receiver_type(inner, bindings);
                if node.kind() == "pointer_type" {
                    (TypeRef::pointer(t), base)
                } else {
                    (t, base)
                }
            }
            "generic_type" => {
                if let Some(args) = node.child_by_field_name("type_arguments") {
                    let mut stack = named_children(args);
                    while let Some(n) = stack.pop() {
                        if matches!(n.kind(), "type_identifier" | "identifier") {
                            let name = self.node_text(n);
                            let obj = self.new_object(name, ObjKind::TypeName, n, TypeRef::Unknown);
                            self.info.object_mut(obj).typ = TypeRef::Named(obj);
                            self.info.named.insert(obj, NamedInfo::default());
                            self.record_def(n, obj);
                            self.bind(name, obj);
                            bindings.push((name.to_string(), obj));
                        } else {
                            stack.extend(named_children(n));
                        }
                    }
                }
                match node.child_by_field_name("type") {
                    Some(base) => self.receiver_type(base, bindings),
                    None => (TypeRef::Unknown, None),
                }
            }
            "type_identifier" | "identifier" => {
                let name = self.node_text(node);
                match self.packages[self.cur_pkg.0 as usize].scope.get(name).copied() {
                    Some(obj) if self.info.object(obj).kind == ObjKind::TypeName => {
                        self.record_use(node, obj);
                        (self.info.object(obj).typ.clone(), Some(obj))
                    }
                    _ => (TypeRef::Unknown, None),
                }
            }
            _ => (TypeRef::Unknown, None),
        }
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn resolve_type(&mut self, node: Node<'a>) -> TypeRef {
        if let Some(t) = self.type_cache.get(&node.id()) {
            return t.clone();
        }
        let t = self.resolve_type_uncached(node);
        self.type_cache.insert(node.id(), t.clone());
        t
    }

    fn resolve_type_uncached(&mut self, node: Node<'a>) -> TypeRef {
        let first_child = |n: Node<'a>| named_children(n).into_iter().find(|c| c.kind() != "comment");
        match node.kind() {
            "type_identifier" | "identifier" => {
                let name = self.node_text(node);
                match self.lookup(name) {
                    Some(b) => {
                        self.record_use(node, b.obj);
                        let obj = self.info.object(b.obj);
                        if obj.kind == ObjKind::TypeName {
                            obj.typ.clone()
                        } else {
                            TypeRef::Unknown
                        }
                    }
                    None => {
                        self.undefined(node, name);
                        TypeRef::Unknown
                    }
                }
            }
            "qualified_type" => {
                let pkg = node.child_by_field_name("package");
                let name = node.child_by_field_name("name");
                let (Some(pkg), Some(name)) = (pkg, name) else {
                    return TypeRef::Unknown;
                };
                let pkg_name = self.node_text(pkg);
                let Some(b) = self.lookup(pkg_name) else {
                    if !self.file_scopes[self.cur_file].guessed_names {
                        self.undefined(pkg, pkg_name);
                    }
                    return TypeRef::Unknown;
                };
                if !self.info.object(b.obj).is_pkg_name() {
                    return TypeRef::Unknown;
                }
                self.record_use(pkg, b.obj);
                match self
                    .pkg_target(b.obj)
                    .and_then(|t| self.package_member(t, self.node_text(name)))
                {
                    Some(member) => {
                        self.record_use(name, member);
                        self.info.object(member).typ.clone()
                    }
                    None => TypeRef::Unknown,
                }
            }
            "pointer_type" => match first_child(node) {
                Some(inner) => TypeRef::pointer(self.resolve_type(inner)),
                None => TypeRef::Unknown,
            },
            "parenthesized_type" | "negated_type" => match first_child(node) {
                Some(inner) => self.resolve_type(inner),
                None => TypeRef::Unknown,
            },
            "slice_type" => {
                let elem = self.resolve_field_type(node, "element");
                TypeRef::slice(elem)
            }
            "array_type" | "implicit_length_array_type" => {
                if let Some(len) = node.child_by_field_name("length") {
                    self.eval(len);
                }
                TypeRef::Array(Box::new(self.resolve_field_type(node, "element")))
            }
            "map_type" => {
                let k = self.resolve_field_type(node, "key");
                let v = self.resolve_field_type(node, "value");
                TypeRef::Map(Box::new(k), Box::new(v))
            }
            "channel_type" => TypeRef::Chan(Box::new(self.resolve_field_type(node, "value"))),
            "function_type" => {
                let mut sig = Signature::default();
                let mut scratch = Vec::new();
                self.push_block();
                if let Some(params) = node.child_by_field_name("parameters") {
                    let (types, variadic) = self.declare_params(params, &mut scratch);
                    sig.params = types;
                    sig.variadic = variadic;
                }
                if let Some(result) = node.child_by_field_name("result") {
                    sig.results = if result.kind() == "parameter_list" {
                        self.declare_params(result, &mut scratch).0
                    } else {
                        vec![self.resolve_type(result)]
                    };
                }
                self.pop_block();
                TypeRef::Func(Box::new(sig))
            }
            "struct_type" => self.resolve_struct(node),
            "interface_type" => self.resolve_interface(node),
            "generic_type" => {
                if let Some(args) = node.child_by_field_name("type_arguments") {
                    for arg in named_children(args) {
                        self.resolve_type(arg);
                    }
                }
                match node.child_by_field_name("type") {
                    Some(base) => self.resolve_type(base),
                    None => TypeRef::Unknown,
                }
            }
            "type_elem" | "type_constraint" | "type_arguments" => {
                let parts: Vec<Node<'a>> = named_children(node)
                    .into_iter()
                    .filter(|c| c.kind() != "comment")
                    .collect();
                let types: Vec<TypeRef> = parts.iter().map(|p| self.resolve_type(*p)).collect();
                if types.len() == 1 {
                    types.into_iter().next().unwrap_or_default()
                } else {
                    TypeRef::Unknown
                }
            }
            _ => TypeRef::Unknown,
        }
    }

    fn resolve_field_type(&mut self, node: Node<'a>, field: &str) -> TypeRef {
        node.child_by_field_name(field)
            .map(|n| self.resolve_type(n))
            .unwrap_or_default()
    }

    fn resolve_struct(&mut self, node: Node<'a>) -> TypeRef {
        let mut fields = Vec::new();
        let Some(list) = named_children(node)
            .into_iter()
            .find(|n| n.kind() == "field_declaration_list")
        else {
            return TypeRef::Struct(fields);
        };
        for decl in named_children(list) {
            if decl.kind() != "field_declaration" {
                continue;
            }
            let Some(type_node) = decl.child_by_field_name("type") else { continue };
            let names = field_children(decl, "name");
            let t = self.resolve_type(type_node);
            if names.is_empty() {
                let t = if has_token(decl, "*") { TypeRef::pointer(t) } else { t };
                if let Some(ident) = embedded_name(type_node) {
                    let name = self.node_text(ident);
                    let obj = self.new_object(name, ObjKind::Field { embedded: true }, ident, t);
                    self.record_def(ident, obj);
                    fields.push(obj);
                }
            } else {
                for name in names {
                    let n = self.node_text(name);
                    let obj = self.new_object(n, ObjKind::Field { embedded: false }, name, t.clone());
                    self.record_def(name, obj);
                    fields.push(obj);
                }
            }
        }
        TypeRef::Struct(fields)
    }

    fn resolve_interface(&mut self, node: Node<'a>) -> TypeRef {
        let mut methods = Vec::new();
        let mut embedded = Vec::new();
        for elem in named_children(node) {
            match elem.kind() {
                "method_elem" | "method_spec" => {
                    let Some(name) = elem.child_by_field_name("name") else { continue };
                    let mut sig = Signature::default();
                    let mut scratch = Vec::new();
                    self.push_block();
                    if let Some(params) = elem.child_by_field_name("parameters") {
                        let (types, variadic) = self.declare_params(params, &mut scratch);
                        sig.params = types;
                        sig.variadic = variadic;
                    }
                    if let Some(result) = elem.child_by_field_name("result") {
                        sig.results = if result.kind() == "parameter_list" {
                            self.declare_params(result, &mut scratch).0
                        } else {
                            vec![self.resolve_type(result)]
                        };
                    }
                    self.pop_block();
                    let n = self.node_text(name);
                    let obj = self.new_object(
                        n,
                        ObjKind::Func { has_receiver: true },
                        name,
                        TypeRef::Func(Box::new(sig)),
                    );
                    self.record_def(name, obj);
                    methods.push(obj);
                }
                "comment" => {}
                _ => {
                    let t = self.resolve_type(elem);
                    if !t.is_unknown() {
                        embedded.push(t);
                    }
                }
            }
        }
        TypeRef::Interface { methods, embedded }
    }

    // ------------------------------------------------------------------
    // Phase 3: bodies
    // ------------------------------------------------------------------

    fn check_bodies(&mut self, pkg: PkgId) {
        let pending = std::mem::take(&mut self.pending[pkg.0 as usize]);
        let mut const_types: HashMap<usize, TypeRef> = HashMap::new();

        for (index, item) in pending.iter().enumerate() {
            match *item {
                TopDecl::Var {
                    file,
                    spec,
                    ref objs,
                } => {
                    self.enter_file(file);
                    if let Some(values) = spec.child_by_field_name("value") {
                        let types = self.eval_rhs(values, objs.len());
                        for (obj, t) in objs.iter().zip(types) {
                            if let Some(obj) = obj {
                                if self.info.object(*obj).typ.is_unknown() {
                                    self.info.object_mut(*obj).typ = t;
                                }
                            }
                        }
                    }
                }
                TopDecl::Const {
                    file,
                    spec,
                    ref objs,
                    inherit,
                } => {
                    self.enter_file(file);
                    let t = match spec.child_by_field_name("value") {
                        Some(values) => self.eval_rhs(values, 1).into_iter().next().unwrap_or_default(),
                        None => inherit
                            .and_then(|i| const_types.get(&i).cloned())
                            .unwrap_or_default(),
                    };
                    const_types.insert(index, t.clone());
                    for obj in objs.iter().flatten() {
                        if self.info.object(*obj).typ.is_unknown() {
                            self.info.object_mut(*obj).typ = t.clone();
                        }
                    }
                }
                _ => {}
            }
        }

        for item in &pending {
            if let TopDecl::Func { file, decl, .. } = *item {
                self.enter_file(file);
                if let Some(body) = decl.child_by_field_name("body") {
                    self.check_function_body(decl, body);
                }
            }
        }
        self.pending[pkg.0 as usize] = pending;
    }

    fn check_function_body(&mut self, decl: Node<'a>, body: Node<'a>) {
        self.push_block();
        if let Some(bindings) = self.headers.get(&decl.id()).cloned() {
            for (name, obj) in bindings {
                self.bind(&name, obj);
            }
        }
        let labels = self.collect_labels(body);
        self.labels.push(labels);
        self.stmt(body);
        self.labels.pop();
        self.pop_block();
    }

    /// Declare every label of a function body, excluding nested literals.
    fn collect_labels(&mut self, body: Node<'a>) -> HashMap<String, ObjectId> {
        let mut labels = HashMap::new();
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            if node.kind() == "func_literal" {
                continue;
            }
            if node.kind() == "labeled_statement" {
                let label = node.child_by_field_name("label").or_else(|| {
                    named_children(node)
                        .into_iter()
                        .find(|n| n.kind() == "label_name")
                });
                if let Some(label) = label {
                    let name = self.node_text(label);
                    let obj = self.new_object(name, ObjKind::Label, label, TypeRef::Unknown);
                    self.record_def(label, obj);
                    labels.insert(name.to_string(), obj);
                }
            }
            stack.extend(named_children(node));
        }
        labels
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn stmt(&mut self, node: Node<'a>) {
        match node.kind() {
            "block" => {
                self.push_block();
                for child in named_children(node) {
                    self.stmt(child);
                }
                self.pop_block();
            }
            "statement_list" => {
                for child in named_children(node) {
                    self.stmt(child);
                }
            }
            "short_var_declaration" => {
                let left = node.child_by_field_name("left");
                let right = node.child_by_field_name("right");
                let lhs: Vec<Node<'a>> = left.map(expr_items).unwrap_or_default();
                let types = match right {
                    Some(r) => self.eval_rhs(r, lhs.len()),
                    None => vec![],
                };
                self.define_vars(&lhs, types);
            }
            "assignment_statement" => {
                if let Some(left) = node.child_by_field_name("left") {
                    for item in expr_items(left) {
                        self.eval(item);
                    }
                }
                if let Some(right) = node.child_by_field_name("right") {
                    for item in expr_items(right) {
                        self.eval(item);
                    }
                }
            }
            "var_declaration" => {
                for spec in syntax::decl_specs(node, &["var_spec"]) {
                    self.local_var_spec(spec);
                }
            }
            "const_declaration" => {
                let mut last = TypeRef::Unknown;
                for spec in syntax::decl_specs(node, &["const_spec"]) {
                    let declared = spec.child_by_field_name("type").map(|t| self.resolve_type(t));
                    let value_type = spec
                        .child_by_field_name("value")
                        .map(|v| self.eval_rhs(v, 1).into_iter().next().unwrap_or_default());
                    let t = declared.or(value_type).unwrap_or_else(|| last.clone());
                    last = t.clone();
                    for name in field_children(spec, "name") {
                        self.declare_local(name, ObjKind::Const, t.clone());
                    }
                }
            }
            "type_declaration" => {
                for spec in syntax::decl_specs(node, &["type_spec", "type_alias"]) {
                    self.local_type_spec(spec);
                }
            }
            "if_statement" => {
                self.push_block();
                for field in ["initializer", "condition", "consequence", "alternative"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        if field == "condition" {
                            self.eval(child);
                        } else {
                            self.stmt(child);
                        }
                    }
                }
                self.pop_block();
            }
            "for_statement" => {
                self.push_block();
                let body = node.child_by_field_name("body");
                for child in named_children(node) {
                    if Some(child) == body {
                        continue;
                    }
                    match child.kind() {
                        "for_clause" => {
                            if let Some(init) = child.child_by_field_name("initializer") {
                                self.stmt(init);
                            }
                            if let Some(cond) = child.child_by_field_name("condition") {
                                self.eval(cond);
                            }
                            if let Some(update) = child.child_by_field_name("update") {
                                self.stmt(update);
                            }
                        }
                        "range_clause" => self.range_clause(child),
                        _ => {
                            self.eval(child);
                        }
                    }
                }
                if let Some(body) = body {
                    self.stmt(body);
                }
                self.pop_block();
            }
            "expression_switch_statement" => {
                self.push_block();
                if let Some(init) = node.child_by_field_name("initializer") {
                    self.stmt(init);
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.eval(value);
                }
                for case in named_children(node) {
                    if !matches!(case.kind(), "expression_case" | "default_case") {
                        continue;
                    }
                    self.push_block();
                    let value = case.child_by_field_name("value");
                    if let Some(value) = value {
                        for item in expr_items(value) {
                            self.eval(item);
                        }
                    }
                    for child in named_children(case) {
                        if Some(child) != value {
                            self.stmt(child);
                        }
                    }
                    self.pop_block();
                }
                self.pop_block();
            }
            "type_switch_statement" => self.type_switch(node),
            "select_statement" => {
                for case in named_children(node) {
                    if !matches!(case.kind(), "communication_case" | "default_case") {
                        continue;
                    }
                    self.push_block();
                    let comm = case.child_by_field_name("communication");
                    if let Some(comm) = comm {
                        if comm.kind() == "receive_statement" {
                            self.receive_statement(comm);
                        } else {
                            self.stmt(comm);
                        }
                    }
                    for child in named_children(case) {
                        if Some(child) != comm {
                            self.stmt(child);
                        }
                    }
                    self.pop_block();
                }
            }
            "receive_statement" => self.receive_statement(node),
            "labeled_statement" => {
                for child in named_children(node) {
                    if child.kind() != "label_name" {
                        self.stmt(child);
                    }
                }
            }
            "break_statement" | "continue_statement" | "goto_statement" => {
                if let Some(label) = named_children(node)
                    .into_iter()
                    .find(|n| n.kind() == "label_name")
                {
                    let name = self.node_text(label);
                    let found = self.labels.last().and_then(|l| l.get(name)).copied();
                    if let Some(obj) = found {
                        self.record_use(label, obj);
                    }
                }
            }
            "fallthrough_statement" | "empty_statement" | "comment" | "ERROR" => {}
            _ => {
                // expression, send, inc/dec, return, go, defer statements
                self.eval(node);
            }
        }
    }

    /// `a, b := ...`: names not yet declared in the innermost block become
    /// new variables; the others are assignments.
    fn define_vars(&mut self, lhs: &[Node<'a>], types: Vec<TypeRef>) {
        let mut types = types.into_iter();
        for item in lhs {
            let t = types.next().unwrap_or_default();
            if item.kind() != "identifier" {
                self.eval(*item);
                continue;
            }
            let name = self.node_text(*item);
            if name == "_" {
                continue;
            }
            let existing = self
                .blocks
                .last()
                .and_then(|b| b.get(name))
                .map(|b| b.obj);
            match existing {
                Some(obj) => self.record_use(*item, obj),
                None => {
                    self.declare_local(*item, ObjKind::Var, t);
                }
            }
        }
    }

    fn local_var_spec(&mut self, spec: Node<'a>) {
        let names = field_children(spec, "name");
        let declared = spec.child_by_field_name("type").map(|t| self.resolve_type(t));
        let values = match spec.child_by_field_name("value") {
            Some(v) => self.eval_rhs(v, names.len()),
            None => vec![],
        };
        let mut values = values.into_iter();
        for name in names {
            let t = match &declared {
                Some(t) => t.clone(),
                None => values.next().unwrap_or_default(),
            };
            self.declare_local(name, ObjKind::Var, t);
        }
    }

    fn local_type_spec(&mut self, spec: Node<'a>) {
        let Some(name) = spec.child_by_field_name("name") else { return };
        let Some(obj) = self.declare_local(name, ObjKind::TypeName, TypeRef::Unknown) else {
            return;
        };
        let alias = spec.kind() == "type_alias";
        if !alias {
            self.info.object_mut(obj).typ = TypeRef::Named(obj);
            self.info.named.insert(obj, NamedInfo::default());
        }
        self.push_block();
        if let Some(tparams) = spec.child_by_field_name("type_parameters") {
            self.declare_type_params(tparams);
        }
        let t = self.resolve_field_type(spec, "type");
        self.pop_block();
        if alias {
            self.info.object_mut(obj).typ = t;
        } else if let Some(named) = self.info.named.get_mut(&obj) {
            named.underlying = t;
        }
    }

    fn range_clause(&mut self, node: Node<'a>) {
        let range_t = node
            .child_by_field_name("right")
            .map(|r| self.eval(r).value_type().single())
            .unwrap_or_default();
        let Some(left) = node.child_by_field_name("left") else { return };
        if has_token(node, ":=") {
            let (k, v) = self.range_types(&range_t);
            self.define_vars(&expr_items(left), vec![k, v]);
        } else {
            for item in expr_items(left) {
                self.eval(item);
            }
        }
    }

    fn range_types(&self, t: &TypeRef) -> (TypeRef, TypeRef) {
        let under = match self.info.underlying(t) {
            TypeRef::Pointer(inner) => self.info.underlying(&inner),
            other => other,
        };
        match under {
            TypeRef::Slice(e) | TypeRef::Array(e) => (TypeRef::Basic("int"), *e),
            TypeRef::Map(k, v) => (*k, *v),
            TypeRef::Chan(e) => (*e, TypeRef::Unknown),
            TypeRef::Basic("string") => (TypeRef::Basic("int"), TypeRef::Basic("rune")),
            TypeRef::Basic(_) => (t.clone(), TypeRef::Unknown),
            _ => (TypeRef::Unknown, TypeRef::Unknown),
        }
    }

    fn receive_statement(&mut self, node: Node<'a>) {
        let t = node
            .child_by_field_name("right")
            .map(|r| self.eval(r).value_type())
            .unwrap_or_default();
        let Some(left) = node.child_by_field_name("left") else { return };
        if has_token(node, ":=") {
            self.define_vars(&expr_items(left), vec![t, TypeRef::Basic("bool")]);
        } else {
            for item in expr_items(left) {
                self.eval(item);
            }
        }
    }

    /// One guard object per switch, recorded in `implicits` at the guard
    /// identifier; each clause sees it with the clause's type.
    fn type_switch(&mut self, node: Node<'a>) {
        self.push_block();
        if let Some(init) = node.child_by_field_name("initializer") {
            self.stmt(init);
        }
        let alias = node
            .child_by_field_name("alias")
            .and_then(|a| expr_items(a).into_iter().next());
        let value_t = node
            .child_by_field_name("value")
            .map(|v| self.eval(v).value_type())
            .unwrap_or_default();
        let guard = match alias {
            Some(ident) if self.node_text(ident) != "_" => {
                let obj = self.new_object(self.node_text(ident), ObjKind::Var, ident, value_t.clone());
                let pos = self.pos(ident);
                self.info.implicits.insert(pos, obj);
                Some((self.node_text(ident).to_string(), obj))
            }
            _ => None,
        };

        for case in named_children(node) {
            if !matches!(case.kind(), "type_case" | "default_case") {
                continue;
            }
            self.push_block();
            let type_nodes = field_children(case, "type");
            let case_types: Vec<TypeRef> = type_nodes.iter().map(|t| self.resolve_type(*t)).collect();
            if let Some((name, obj)) = &guard {
                let narrowed = if case_types.len() == 1 {
                    case_types[0].clone()
                } else {
                    value_t.clone()
                };
                if let Some(block) = self.blocks.last_mut() {
                    block.insert(
                        name.clone(),
                        Binding {
                            obj: *obj,
                            narrowed: Some(narrowed),
                        },
                    );
                }
            }
            for child in named_children(case) {
                if !type_nodes.contains(&child) {
                    self.stmt(child);
                }
            }
            self.pop_block();
        }
        self.pop_block();
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Evaluate a right-hand side list into `want` value types, unpacking
    /// multi-value calls and comma-ok forms.
    fn eval_rhs(&mut self, list: Node<'a>, want: usize) -> Vec<TypeRef> {
        let items = expr_items(list);
        if items.len() == 1 && want > 1 {
            let item = items[0];
            let t = self.eval(item).value_type();
            return match t {
                TypeRef::Tuple(types) => types,
                t => vec![t, TypeRef::Basic("bool")],
            };
        }
        items
            .into_iter()
            .map(|item| self.eval(item).value_type().single())
            .collect()
    }

    fn eval(&mut self, node: Node<'a>) -> Operand {
        match node.kind() {
            "identifier" | "nil" | "true" | "false" | "iota" => self.eval_ident(node),
            "int_literal" => Operand::Value(TypeRef::Basic("int")),
            "float_literal" => Operand::Value(TypeRef::Basic("float64")),
            "imaginary_literal" => Operand::Value(TypeRef::Basic("complex128")),
            "rune_literal" => Operand::Value(TypeRef::Basic("rune")),
            "interpreted_string_literal" | "raw_string_literal" => {
                Operand::Value(TypeRef::Basic("string"))
            }
            "parenthesized_expression" => match expr_items(node).into_iter().next() {
                Some(inner) => self.eval(inner),
                None => Operand::NoValue,
            },
            "selector_expression" => self.eval_selector(node),
            "call_expression" => self.eval_call(node),
            "index_expression" => {
                let operand = node
                    .child_by_field_name("operand")
                    .map(|o| self.eval(o))
                    .unwrap_or(Operand::NoValue);
                for index in field_children(node, "index") {
                    self.eval(index);
                }
                match operand {
                    Operand::Value(t) => Operand::Value(self.element_type(&t)),
                    other => other,
                }
            }
            "slice_expression" => {
                let operand = node
                    .child_by_field_name("operand")
                    .map(|o| self.eval(o).value_type())
                    .unwrap_or_default();
                for field in ["start", "end", "capacity"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        self.eval(child);
                    }
                }
                let t = match self.info.underlying(&operand) {
                    TypeRef::Array(e) => TypeRef::Slice(e),
                    TypeRef::Pointer(inner) => match self.info.underlying(&inner) {
                        TypeRef::Array(e) => TypeRef::Slice(e),
                        _ => operand,
                    },
                    _ => operand,
                };
                Operand::Value(t)
            }
            "type_assertion_expression" => {
                if let Some(operand) = node.child_by_field_name("operand") {
                    self.eval(operand);
                }
                Operand::Value(self.resolve_field_type(node, "type"))
            }
            "type_conversion_expression" => {
                let t = self.resolve_field_type(node, "type");
                if let Some(operand) = node.child_by_field_name("operand") {
                    self.eval(operand);
                }
                Operand::Value(t)
            }
            "unary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.node_text(o))
                    .unwrap_or("");
                let t = node
                    .child_by_field_name("operand")
                    .map(|o| self.eval(o).value_type())
                    .unwrap_or_default();
                let t = match op {
                    "&" => TypeRef::pointer(t),
                    "*" => match t {
                        TypeRef::Pointer(inner) => *inner,
                        _ => TypeRef::Unknown,
                    },
                    "<-" => match self.info.underlying(&t) {
                        TypeRef::Chan(e) => *e,
                        _ => TypeRef::Unknown,
                    },
                    "!" => TypeRef::Basic("bool"),
                    _ => t,
                };
                Operand::Value(t)
            }
            "binary_expression" => {
                let left = node
                    .child_by_field_name("left")
                    .map(|l| self.eval(l).value_type())
                    .unwrap_or_default();
                let right = node
                    .child_by_field_name("right")
                    .map(|r| self.eval(r).value_type())
                    .unwrap_or_default();
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.node_text(o))
                    .unwrap_or("");
                let t = match op {
                    "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||" => TypeRef::Basic("bool"),
                    "<<" | ">>" => left,
                    _ if left.is_unknown() => right,
                    _ => left,
                };
                Operand::Value(t)
            }
            "composite_literal" => {
                let t = self.resolve_field_type(node, "type");
                if let Some(body) = node.child_by_field_name("body") {
                    self.literal_value(body, &t);
                }
                Operand::Value(t)
            }
            "literal_value" => {
                self.literal_value(node, &TypeRef::Unknown);
                Operand::Value(TypeRef::Unknown)
            }
            "func_literal" => {
                let (sig, _) = self.declare_header(node, false);
                if let Some(body) = node.child_by_field_name("body") {
                    let outer_labels = std::mem::take(&mut self.labels);
                    self.check_function_body(node, body);
                    self.labels = outer_labels;
                }
                Operand::Value(TypeRef::Func(Box::new(sig)))
            }
            "ERROR" | "comment" | "field_identifier" | "label_name" => Operand::NoValue,
            kind if is_type_kind(kind) => Operand::Type(self.resolve_type(node)),
            _ => {
                for child in named_children(node) {
                    if matches!(child.kind(), "block" | "statement_list") {
                        self.stmt(child);
                    } else {
                        self.eval(child);
                    }
                }
                Operand::NoValue
            }
        }
    }

    fn eval_ident(&mut self, node: Node<'a>) -> Operand {
        let name = self.node_text(node);
        if name == "_" {
            return Operand::NoValue;
        }
        let Some(binding) = self.lookup(name) else {
            self.undefined(node, name);
            return Operand::NoValue;
        };
        self.record_use(node, binding.obj);
        let obj = self.info.object(binding.obj);
        match obj.kind {
            ObjKind::Var | ObjKind::Field { .. } | ObjKind::Const | ObjKind::Func { .. } => {
                Operand::Value(binding.narrowed.unwrap_or_else(|| obj.typ.clone()))
            }
            ObjKind::TypeName => Operand::Type(obj.typ.clone()),
            ObjKind::PkgName { .. } => Operand::Package(binding.obj),
            ObjKind::Builtin => Operand::Builtin(binding.obj),
            ObjKind::Nil => Operand::Value(TypeRef::Unknown),
            ObjKind::Label => Operand::NoValue,
        }
    }

    fn eval_selector(&mut self, node: Node<'a>) -> Operand {
        let Some(operand) = node.child_by_field_name("operand") else {
            return Operand::NoValue;
        };
        // An unknown `x` in `x.f` may be an import whose name was guessed.
        if operand.kind() == "identifier"
            && self.file_scopes[self.cur_file].guessed_names
            && self.lookup(self.node_text(operand)).is_none()
        {
            return Operand::NoValue;
        }
        let base = self.eval(operand);
        let Some(field) = node.child_by_field_name("field") else {
            return Operand::NoValue;
        };
        let name = self.node_text(field);
        let member = match &base {
            Operand::Package(pkg_obj) => self
                .pkg_target(*pkg_obj)
                .and_then(|t| self.package_member(t, name)),
            Operand::Type(t) | Operand::Value(t) => self.info.lookup_member(t, name),
            _ => None,
        };
        let Some(member) = member else {
            return Operand::NoValue;
        };
        self.record_use(field, member);
        let obj = self.info.object(member);
        if obj.kind == ObjKind::TypeName {
            Operand::Type(obj.typ.clone())
        } else {
            Operand::Value(obj.typ.clone())
        }
    }

    fn eval_call(&mut self, node: Node<'a>) -> Operand {
        let callee = node
            .child_by_field_name("function")
            .map(|f| self.eval(f))
            .unwrap_or(Operand::NoValue);
        if let Some(targs) = node.child_by_field_name("type_arguments") {
            for arg in named_children(targs) {
                self.resolve_type(arg);
            }
        }
        let args: Vec<Node<'a>> = node
            .child_by_field_name("arguments")
            .map(expr_items)
            .unwrap_or_default();

        match callee {
            Operand::Type(t) => {
                for arg in args {
                    self.eval(arg);
                }
                Operand::Value(t)
            }
            Operand::Builtin(id) => {
                let name = self.info.object(id).name.clone();
                let mut arg_types = Vec::new();
                for arg in args {
                    let t = match self.eval(arg) {
                        Operand::Value(t) | Operand::Type(t) => t,
                        _ => TypeRef::Unknown,
                    };
                    arg_types.push(t);
                }
                let first = arg_types.into_iter().next().unwrap_or_default();
                let t = match name.as_str() {
                    "new" => TypeRef::pointer(first),
                    "make" | "append" | "min" | "max" => first,
                    "len" | "cap" | "copy" => TypeRef::Basic("int"),
                    "complex" => TypeRef::Basic("complex128"),
                    "real" | "imag" => TypeRef::Basic("float64"),
                    _ => return Operand::NoValue,
                };
                Operand::Value(t)
            }
            Operand::Value(t) => {
                for arg in args {
                    self.eval(arg);
                }
                match self.info.underlying(&t) {
                    TypeRef::Func(sig) => match sig.results.len() {
                        0 => Operand::NoValue,
                        1 => Operand::Value(sig.results[0].clone()),
                        _ => Operand::Value(TypeRef::Tuple(sig.results.clone())),
                    },
                    _ => Operand::Value(TypeRef::Unknown),
                }
            }
            _ => {
                for arg in args {
                    self.eval(arg);
                }
                Operand::Value(TypeRef::Unknown)
            }
        }
    }

    fn element_type(&self, t: &TypeRef) -> TypeRef {
        let under = match self.info.underlying(t) {
            TypeRef::Pointer(inner) => self.info.underlying(&inner),
            other => other,
        };
        match under {
            TypeRef::Slice(e) | TypeRef::Array(e) => *e,
            TypeRef::Map(_, v) => *v,
            TypeRef::Basic("string") => TypeRef::Basic("byte"),
            TypeRef::Func(_) => t.clone(),
            _ => TypeRef::Unknown,
        }
    }

    /// Walk a `{...}` literal body of type `t`. Struct keys resolve to
    /// fields of `t`; other keys are expressions.
    fn literal_value(&mut self, body: Node<'a>, t: &TypeRef) {
        let under = match self.info.underlying(t) {
            TypeRef::Pointer(inner) => self.info.underlying(&inner),
            other => other,
        };
        let (key_t, elem_t) = match &under {
            TypeRef::Map(k, v) => ((**k).clone(), (**v).clone()),
            TypeRef::Slice(e) | TypeRef::Array(e) => (TypeRef::Basic("int"), (**e).clone()),
            _ => (TypeRef::Unknown, TypeRef::Unknown),
        };
        for elem in named_children(body) {
            match elem.kind() {
                "comment" => {}
                "keyed_element" => {
                    let parts: Vec<Node<'a>> = named_children(elem)
                        .into_iter()
                        .filter(|n| n.kind() != "comment")
                        .collect();
                    let (Some(&key), Some(&value)) = (parts.first(), parts.last()) else {
                        continue;
                    };
                    let key = unwrap_literal_element(key);
                    let value = unwrap_literal_element(value);
                    let mut value_t = elem_t.clone();
                    match &under {
                        TypeRef::Struct(_) => {
                            if matches!(key.kind(), "identifier" | "field_identifier") {
                                let name = self.node_text(key);
                                if let Some(f) = self.info.direct_field(&under, name) {
                                    self.record_use(key, f);
                                    value_t = self.info.object(f).typ.clone();
                                }
                            }
                        }
                        TypeRef::Map(..) | TypeRef::Slice(_) | TypeRef::Array(_) => {
                            self.literal_element(key, &key_t);
                        }
                        _ => {
                            // Unknown literal type: a bare identifier key may be
                            // a field name, so leave it unresolved.
                            if !matches!(key.kind(), "identifier" | "field_identifier") {
                                self.literal_element(key, &TypeRef::Unknown);
                            }
                        }
                    }
                    self.literal_element(value, &value_t);
                }
                _ => {
                    let inner = unwrap_literal_element(elem);
                    self.literal_element(inner, &elem_t);
                }
            }
        }
    }

    fn literal_element(&mut self, node: Node<'a>, t: &TypeRef) {
        if node.kind() == "literal_value" {
            let t = match t {
                TypeRef::Pointer(inner) => (**inner).clone(),
                other => other.clone(),
            };
            self.literal_value(node, &t);
        } else {
            self.eval(node);
        }
    }
}

/// Expression items of a list node, or the node itself.
fn expr_items(node: Node<'_>) -> Vec<Node<'_>> {
    match node.kind() {
        "expression_list" | "argument_list" | "special_argument_list" | "parenthesized_expression" => {
            named_children(node)
                .into_iter()
                .filter(|n| n.kind() != "comment")
                .collect()
        }
        _ => vec![node],
    }
}

fn unwrap_literal_element(node: Node<'_>) -> Node<'_> {
    if node.kind() == "literal_element" {
        if let Some(inner) = named_children(node)
            .into_iter()
            .find(|n| n.kind() != "comment")
        {
            return inner;
        }
    }
    node
}

/// Identifier naming an embedded field: `T`, `*T`, `pkg.T`, `T[int]`.
fn embedded_name(type_node: Node<'_>) -> Option<Node<'_>> {
    match type_node.kind() {
        "type_identifier" | "identifier" => Some(type_node),
        "qualified_type" => type_node.child_by_field_name("name"),
        "generic_type" => type_node
            .child_by_field_name("type")
            .and_then(embedded_name),
        "pointer_type" | "parenthesized_type" => named_children(type_node)
            .into_iter()
            .next()
            .and_then(embedded_name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load_program, Program};
    use gotug_core::types::SymbolKind;
    use std::fs;
    use tempfile::TempDir;

    fn load(files: &[(&str, &str)]) -> (TempDir, Program) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let p = dir.path().join(path);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, content).unwrap();
        }
        let program = load_program(dir.path(), None).unwrap();
        (dir, program)
    }

    /// Object at the `nth` occurrence of `needle` in `path`.
    fn object_at<'p>(program: &'p Program, path: &str, needle: &str, nth: usize) -> Option<&'p Object> {
        let id = program.positions.file_id(path)?;
        let source = &program.file(id).source;
        let offset = source.match_indices(needle).nth(nth)?.0;
        let pos = program.positions.pos(id, offset as u32);
        let obj = program
            .info
            .object_of(pos)
            .or_else(|| program.info.implicits.get(&pos).copied())?;
        Some(program.info.object(obj))
    }

    fn same_object(program: &Program, path: &str, a: (&str, usize), b: (&str, usize)) -> bool {
        let oa = object_at(program, path, a.0, a.1).map(|o| (o.name.clone(), o.pos));
        let ob = object_at(program, path, b.0, b.1).map(|o| (o.name.clone(), o.pos));
        oa.is_some() && oa == ob
    }

    mod scopes {
        use super::*;

        #[test]
        fn local_shadows_package_level() {
            let src = "package p\n\nvar x = 1\n\nfunc f() int {\n\tx := 2\n\treturn x\n}\n\nfunc g() int { return x }\n";
            let (_d, program) = load(&[("p.go", src)]);
            // `x` in f's return refers to the local
            assert!(same_object(&program, "p.go", ("x := 2", 0), ("x\n}", 0)));
            // `x` in g refers to the package var
            assert!(same_object(&program, "p.go", ("x = 1", 0), ("x }", 0)));
            assert!(!same_object(&program, "p.go", ("x = 1", 0), ("x\n}", 0)));
        }

        #[test]
        fn params_and_named_results() {
            let src = "package p\n\nfunc f(a int) (out int) {\n\tout = a\n\treturn\n}\n";
            let (_d, program) = load(&[("p.go", src)]);
            let a = object_at(&program, "p.go", "a\n", 0).unwrap();
            assert_eq!(a.symbol_kind(), SymbolKind::Variable);
            assert!(same_object(&program, "p.go", ("out int", 0), ("out = a", 0)));
        }

        #[test]
        fn labels_resolve_within_function() {
            let src = "package p\n\nfunc f() {\nouter:\n\tfor {\n\t\tbreak outer\n\t}\n}\n";
            let (_d, program) = load(&[("p.go", src)]);
            let label = object_at(&program, "p.go", "outer\n", 0).unwrap();
            assert_eq!(label.symbol_kind(), SymbolKind::Label);
            assert!(same_object(&program, "p.go", ("outer:", 0), ("outer\n", 0)));
        }

        #[test]
        fn builtins_and_nil_resolve_to_universe() {
            let src = "package p\n\nfunc f(s []int) bool {\n\treturn len(s) > 0 && s != nil\n}\n";
            let (_d, program) = load(&[("p.go", src)]);
            let len = object_at(&program, "p.go", "len", 0).unwrap();
            assert_eq!(len.symbol_kind(), SymbolKind::Builtin);
            assert_eq!(len.pos, Pos::NONE);
            let nil = object_at(&program, "p.go", "nil", 0).unwrap();
            assert_eq!(nil.symbol_kind(), SymbolKind::Nil);
        }
    }

    mod selectors {
        use super::*;

        #[test]
        fn field_and_method_through_pointer() {
            let src = "package p\n\ntype T struct{ N int }\n\nfunc (t *T) Inc() { t.N++ }\n\nfunc use() {\n\tv := &T{N: 1}\n\tv.Inc()\n\t_ = v.N\n}\n";
            let (_d, program) = load(&[("p.go", src)]);
            let inc = object_at(&program, "p.go", "Inc()\n", 0).unwrap();
            assert_eq!(inc.symbol_kind(), SymbolKind::Method);
            assert!(same_object(&program, "p.go", ("Inc() {", 0), ("Inc()\n", 0)));
            assert!(same_object(&program, "p.go", ("N int", 0), ("N++", 0)));
            assert!(same_object(&program, "p.go", ("N int", 0), ("N: 1", 0)));
            assert!(same_object(&program, "p.go", ("N int", 0), ("N\n}", 0)));
            let n = object_at(&program, "p.go", "N int", 0).unwrap();
            assert_eq!(n.symbol_kind(), SymbolKind::Field);
        }

        #[test]
        fn promoted_field_through_embedding() {
            let src = "package p\n\ntype Base struct{ ID int }\n\ntype Item struct {\n\tBase\n\tName string\n}\n\nfunc f(i Item) int { return i.ID }\n";
            let (_d, program) = load(&[("p.go", src)]);
            assert!(same_object(&program, "p.go", ("ID int", 0), ("ID }", 0)));
            let embedded = object_at(&program, "p.go", "Base\n", 0).unwrap();
            assert_eq!(embedded.symbol_kind(), SymbolKind::Field);
        }

        #[test]
        fn call_results_carry_types() {
            let src = "package p\n\ntype T struct{ N int }\n\nfunc mk() (*T, error) { return nil, nil }\n\nfunc f() int {\n\tt, err := mk()\n\tif err != nil {\n\t\treturn 0\n\t}\n\treturn t.N\n}\n";
            let (_d, program) = load(&[("p.go", src)]);
            assert!(same_object(&program, "p.go", ("N int", 0), ("N\n}", 0)));
            let err = object_at(&program, "p.go", "err :=", 0).unwrap();
            assert_eq!(err.symbol_kind(), SymbolKind::Variable);
        }

        #[test]
        fn type_switch_guard_is_one_object() {
            let src = "package p\n\ntype A struct{ X int }\n\nfunc f(v any) int {\n\tswitch t := v.(type) {\n\tcase A:\n\t\treturn t.X\n\tdefault:\n\t\t_ = t\n\t}\n\treturn 0\n}\n";
            let (_d, program) = load(&[("p.go", src)]);
            assert!(same_object(&program, "p.go", ("t :=", 0), ("t.X", 0)));
            assert!(same_object(&program, "p.go", ("t :=", 0), ("t\n", 0)));
            assert!(same_object(&program, "p.go", ("X int", 0), ("X\n", 0)));
        }
    }

    mod packages {
        use super::*;

        #[test]
        fn imported_package_members_resolve() {
            let (_d, program) = load(&[
                ("go.mod", "module example.com/m\n"),
                (
                    "lib/lib.go",
                    "package lib\n\ntype Conf struct{ Name string }\n\nfunc New() *Conf { return &Conf{} }\n",
                ),
                (
                    "main.go",
                    "package main\n\nimport \"example.com/m/lib\"\n\nfunc main() {\n\tc := lib.New()\n\tprintln(c.Name)\n\tvar x lib.Conf\n\t_ = x\n}\n",
                ),
            ]);
            let pkg = object_at(&program, "main.go", "lib.New", 0).unwrap();
            assert!(pkg.is_pkg_name());
            let new = object_at(&program, "main.go", "New", 0).unwrap();
            assert_eq!(new.symbol_kind(), SymbolKind::Function);
            let name = object_at(&program, "main.go", "Name", 0).unwrap();
            assert_eq!(name.symbol_kind(), SymbolKind::Field);
            let conf = object_at(&program, "main.go", "Conf", 0).unwrap();
            assert_eq!(conf.symbol_kind(), SymbolKind::Type);
        }

        #[test]
        fn unloaded_imports_resolve_only_the_package_name() {
            let src = "package main\n\nimport \"fmt\"\n\nfunc main() { fmt.Println(1) }\n";
            let (_d, program) = load(&[("main.go", src)]);
            let fmt = object_at(&program, "main.go", "fmt.", 0).unwrap();
            assert!(fmt.is_pkg_name());
            assert!(object_at(&program, "main.go", "Println", 0).is_none());
        }

        #[test]
        fn dot_import_brings_exports_into_scope() {
            let (_d, program) = load(&[
                ("go.mod", "module example.com/m\n"),
                ("lib/lib.go", "package lib\n\nfunc Hello() {}\n"),
                (
                    "main.go",
                    "package main\n\nimport . \"example.com/m/lib\"\n\nfunc main() { Hello() }\n",
                ),
            ]);
            let hello = object_at(&program, "main.go", "Hello", 0).unwrap();
            assert_eq!(hello.symbol_kind(), SymbolKind::Function);
        }
    }
}
