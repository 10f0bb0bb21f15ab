//! The versioned global store threaded through every pass.
//!
//! A `GlobalState` owns the name, symbol, and file tables, the diagnostic
//! queue, and the epoch bookkeeping. Tables are frozen by default; passes
//! that mutate a table do so inside a scoped [`Unfreeze`] acquisition that
//! re-freezes on every exit path. The slow path works on a [`deep
//! copy`](GlobalState::deep_copy) that is either swapped in on commit or
//! discarded on cancellation.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use ecow::{EcoString, eco_format};
use rustc_hash::FxHashMap;
use smallvec::smallvec;

use crate::diag::ErrorQueue;
use crate::epochs::EpochManager;
use crate::files::{File, FileRef, FileType};
use crate::loc::Loc;
use crate::names::{NameRef, NameTable, UniqueNameKind};
use crate::query::Query;
use crate::symbols::{
    ArgInfo, ArgKind, ClassKind, ClassOrModuleData, ClassOrModuleRef, FieldData, FieldRef,
    MethodData, MethodFlags, MethodRef, SymbolTable, SymbolRef, TypeMemberData, TypeMemberRef,
};
use crate::types::Ty;

/// Symbols entered by [`GlobalState::new`], at fixed indices.
pub mod well_known {
    use crate::symbols::ClassOrModuleRef;

    /// The global root scope.
    pub const ROOT: ClassOrModuleRef = ClassOrModuleRef::ROOT;
    /// The stub class substituted for unresolved constants.
    pub const STUB: ClassOrModuleRef = ClassOrModuleRef::STUB;
    /// `BasicObject`.
    pub const BASIC_OBJECT: ClassOrModuleRef = ClassOrModuleRef::from_index(2);
    /// `Object`.
    pub const OBJECT: ClassOrModuleRef = ClassOrModuleRef::from_index(3);
    /// `Kernel`.
    pub const KERNEL: ClassOrModuleRef = ClassOrModuleRef::from_index(4);
    /// `Module`.
    pub const MODULE: ClassOrModuleRef = ClassOrModuleRef::from_index(5);
    /// `Class`.
    pub const CLASS: ClassOrModuleRef = ClassOrModuleRef::from_index(6);
    /// `NilClass`.
    pub const NIL_CLASS: ClassOrModuleRef = ClassOrModuleRef::from_index(7);
    /// `TrueClass`.
    pub const TRUE_CLASS: ClassOrModuleRef = ClassOrModuleRef::from_index(8);
    /// `FalseClass`.
    pub const FALSE_CLASS: ClassOrModuleRef = ClassOrModuleRef::from_index(9);
    /// `Numeric`.
    pub const NUMERIC: ClassOrModuleRef = ClassOrModuleRef::from_index(10);
    /// `Integer`.
    pub const INTEGER: ClassOrModuleRef = ClassOrModuleRef::from_index(11);
    /// `Float`.
    pub const FLOAT: ClassOrModuleRef = ClassOrModuleRef::from_index(12);
    /// `String`.
    pub const STRING: ClassOrModuleRef = ClassOrModuleRef::from_index(13);
    /// `Symbol`.
    pub const SYMBOL: ClassOrModuleRef = ClassOrModuleRef::from_index(14);
    /// `Array`.
    pub const ARRAY: ClassOrModuleRef = ClassOrModuleRef::from_index(15);
    /// `Hash`.
    pub const HASH: ClassOrModuleRef = ClassOrModuleRef::from_index(16);
    /// `Proc`.
    pub const PROC: ClassOrModuleRef = ClassOrModuleRef::from_index(17);
    /// `Exception`.
    pub const EXCEPTION: ClassOrModuleRef = ClassOrModuleRef::from_index(18);
    /// `StandardError`.
    pub const STANDARD_ERROR: ClassOrModuleRef = ClassOrModuleRef::from_index(19);
    /// The `T` module carrying type assertions.
    pub const T: ClassOrModuleRef = ClassOrModuleRef::from_index(20);
}

/// Frequently consulted names, interned once at startup so frozen-table
/// phases can refer to them without lookups.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct WellKnownNames {
    pub is_a_q: NameRef,
    pub kind_of_q: NameRef,
    pub nil_q: NameRef,
    pub bang: NameRef,
    pub eq_eq: NameRef,
    pub to_s: NameRef,
    pub each: NameRef,
    pub call: NameRef,
    pub raise_name: NameRef,
    pub sig: NameRef,
    pub params: NameRef,
    pub returns: NameRef,
    pub void: NameRef,
    pub abstract_name: NameRef,
    pub overridable_name: NameRef,
    pub final_name: NameRef,
    pub attr_reader: NameRef,
    pub attr_writer: NameRef,
    pub attr_accessor: NameRef,
    pub let_name: NameRef,
    pub cast_name: NameRef,
    pub unsafe_name: NameRef,
    pub absurd: NameRef,
    pub nilable: NameRef,
    pub any: NameRef,
    pub all: NameRef,
    pub untyped: NameRef,
    pub self_type: NameRef,
    pub t_const: NameRef,
}

/// The process-wide, versioned store. See the module docs.
pub struct GlobalState {
    names: NameTable,
    symbols: SymbolTable,
    files: Vec<Arc<File>>,
    files_by_path: FxHashMap<EcoString, FileRef>,
    /// The diagnostic and query-response queue for the current run.
    pub errors: ErrorQueue,
    /// Epoch counter and cancellation flag, shared with deep copies.
    pub epochs: Arc<EpochManager>,
    /// The query attached to the current run, if any.
    pub lsp_query: Query,
    /// Pre-interned names.
    pub wk_names: WellKnownNames,
    names_frozen: bool,
    symbols_frozen: bool,
    files_frozen: bool,
    unique_counters: FxHashMap<(UniqueNameKind, NameRef), u32>,
}

impl GlobalState {
    /// Creates a state populated with the builtin core library, with all
    /// tables frozen.
    pub fn new() -> GlobalState {
        let mut names = NameTable::default();
        let wk_names = WellKnownNames {
            is_a_q: names.enter_utf8("is_a?"),
            kind_of_q: names.enter_utf8("kind_of?"),
            nil_q: names.enter_utf8("nil?"),
            bang: names.enter_utf8("!"),
            eq_eq: names.enter_utf8("=="),
            to_s: names.enter_utf8("to_s"),
            each: names.enter_utf8("each"),
            call: names.enter_utf8("call"),
            raise_name: names.enter_utf8("raise"),
            sig: names.enter_utf8("sig"),
            params: names.enter_utf8("params"),
            returns: names.enter_utf8("returns"),
            void: names.enter_utf8("void"),
            abstract_name: names.enter_utf8("abstract"),
            overridable_name: names.enter_utf8("overridable"),
            final_name: names.enter_utf8("final"),
            attr_reader: names.enter_utf8("attr_reader"),
            attr_writer: names.enter_utf8("attr_writer"),
            attr_accessor: names.enter_utf8("attr_accessor"),
            let_name: names.enter_utf8("let"),
            cast_name: names.enter_utf8("cast"),
            unsafe_name: names.enter_utf8("unsafe"),
            absurd: names.enter_utf8("absurd"),
            nilable: names.enter_utf8("nilable"),
            any: names.enter_utf8("any"),
            all: names.enter_utf8("all"),
            untyped: names.enter_utf8("untyped"),
            self_type: names.enter_utf8("self_type"),
            t_const: {
                let utf8 = names.enter_utf8("T");
                names.enter_constant(utf8)
            },
        };

        let mut gs = GlobalState {
            names,
            symbols: SymbolTable::default(),
            files: Vec::new(),
            files_by_path: FxHashMap::default(),
            errors: ErrorQueue::new(),
            epochs: Arc::new(EpochManager::new()),
            lsp_query: Query::None,
            wk_names,
            names_frozen: false,
            symbols_frozen: false,
            files_frozen: false,
            unique_counters: FxHashMap::default(),
        };
        gs.enter_builtins();
        gs.names_frozen = true;
        gs.symbols_frozen = true;
        gs.files_frozen = true;
        gs
    }

    /// Snapshots the state for a cancellable slow path. The copy shares the
    /// epoch manager (so cancellation reaches it) but gets a fresh error
    /// queue and no attached query.
    pub fn deep_copy(&self) -> GlobalState {
        GlobalState {
            names: self.names.clone(),
            symbols: self.symbols.clone(),
            files: self.files.clone(),
            files_by_path: self.files_by_path.clone(),
            errors: ErrorQueue::new(),
            epochs: Arc::clone(&self.epochs),
            lsp_query: Query::None,
            wk_names: self.wk_names.clone(),
            names_frozen: true,
            symbols_frozen: true,
            files_frozen: true,
            unique_counters: self.unique_counters.clone(),
        }
    }

    // === Names ===========================================================

    /// The name table.
    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// Interns raw identifier text. Requires an unfrozen name table.
    pub fn enter_name_utf8(&mut self, text: &str) -> NameRef {
        assert!(!self.names_frozen, "name table is frozen");
        self.names.enter_utf8(text)
    }

    /// Interns the constant-position form of `text`.
    pub fn enter_name_constant(&mut self, text: &str) -> NameRef {
        assert!(!self.names_frozen, "name table is frozen");
        let utf8 = self.names.enter_utf8(text);
        self.names.enter_constant(utf8)
    }

    /// Mints a fresh compiler-generated derivative of `original`.
    pub fn fresh_unique_name(&mut self, kind: UniqueNameKind, original: NameRef) -> NameRef {
        assert!(!self.names_frozen, "name table is frozen");
        let counter = self.unique_counters.entry((kind, original)).or_insert(0);
        *counter += 1;
        let num = *counter;
        self.names.enter_unique(kind, original, num)
    }

    /// Renders a name.
    pub fn show_name(&self, name: NameRef) -> EcoString {
        self.names.show(name)
    }

    // === Symbols =========================================================

    /// The symbol table.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Finds or creates the class/module `name` under `owner`.
    pub fn enter_class(
        &mut self,
        owner: ClassOrModuleRef,
        name: NameRef,
        kind: ClassKind,
        loc: Loc,
    ) -> ClassOrModuleRef {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        if let Some(existing) = self.symbols.find_member(owner, name) {
            if let SymbolRef::ClassOrModule(sym) = existing {
                let data = self.symbols.class_data_mut(sym);
                if data.kind == ClassKind::Unknown {
                    data.kind = kind;
                }
                if loc.exists() {
                    data.locs.push(loc);
                }
                return sym;
            }
        }
        let sym = ClassOrModuleRef::from_index(self.symbols.classes.len() as u32);
        self.symbols.classes.push(ClassOrModuleData {
            owner,
            name,
            kind,
            superclass: None,
            mixins: Vec::new(),
            type_params: Vec::new(),
            members: Default::default(),
            self_members: Default::default(),
            locs: if loc.exists() {
                smallvec![loc]
            } else {
                smallvec![]
            },
        });
        if sym != owner {
            self.symbols
                .class_data_mut(owner)
                .members
                .insert(name, sym.into());
        }
        sym
    }

    /// Creates a method symbol under `owner`, replacing any same-named one.
    /// Returns the previous holder of the name alongside the new symbol.
    pub fn enter_method(
        &mut self,
        owner: ClassOrModuleRef,
        name: NameRef,
        arguments: Vec<ArgInfo>,
        flags: MethodFlags,
        loc: Loc,
    ) -> (MethodRef, Option<SymbolRef>) {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        if let Some(arg) = arguments.iter().position(|arg| arg.kind == ArgKind::Block) {
            assert!(
                arg == arguments.len() - 1,
                "block argument must come last"
            );
        }
        let sym = MethodRef::from_index(self.symbols.methods.len() as u32);
        self.symbols.methods.push(MethodData {
            owner,
            name,
            arguments,
            result_type: Ty::Untyped,
            flags,
            has_sig: false,
            locs: if loc.exists() {
                smallvec![loc]
            } else {
                smallvec![]
            },
        });
        let members = if flags.is_self_method {
            &mut self.symbols.class_data_mut(owner).self_members
        } else {
            &mut self.symbols.class_data_mut(owner).members
        };
        let previous = members.insert(name, sym.into());
        (sym, previous)
    }

    /// Finds or creates a field (or static field) `name` under `owner`.
    pub fn enter_field(
        &mut self,
        owner: ClassOrModuleRef,
        name: NameRef,
        is_static: bool,
        loc: Loc,
    ) -> FieldRef {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        if let Some(SymbolRef::Field(sym)) = self.symbols.find_member(owner, name) {
            if loc.exists() {
                self.symbols.field_data_mut(sym).locs.push(loc);
            }
            return sym;
        }
        let sym = FieldRef::from_index(self.symbols.fields.len() as u32);
        self.symbols.fields.push(FieldData {
            owner,
            name,
            declared_type: Ty::Untyped,
            is_static,
            is_exported: false,
            locs: if loc.exists() {
                smallvec![loc]
            } else {
                smallvec![]
            },
        });
        self.symbols
            .class_data_mut(owner)
            .members
            .insert(name, sym.into());
        sym
    }

    /// Creates a type member under `owner`.
    pub fn enter_type_member(&mut self, data: TypeMemberData) -> TypeMemberRef {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        let owner = data.owner;
        let sym = TypeMemberRef::from_index(self.symbols.type_members.len() as u32);
        self.symbols.type_members.push(data);
        self.symbols.class_data_mut(owner).type_params.push(sym);
        sym
    }

    /// Mutable access to a class entry. Requires an unfrozen symbol table.
    pub fn class_data_mut(&mut self, sym: ClassOrModuleRef) -> &mut ClassOrModuleData {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        self.symbols.class_data_mut(sym)
    }

    /// Mutable access to a method entry. Requires an unfrozen symbol table.
    pub fn method_data_mut(&mut self, sym: MethodRef) -> &mut MethodData {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        self.symbols.method_data_mut(sym)
    }

    /// Mutable access to a field entry. Requires an unfrozen symbol table.
    pub fn field_data_mut(&mut self, sym: FieldRef) -> &mut FieldData {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        self.symbols.field_data_mut(sym)
    }

    /// Renders a class's full constant path.
    pub fn show_class(&self, sym: ClassOrModuleRef) -> EcoString {
        if sym.is_root() {
            return "<root>".into();
        }
        if sym.is_stub() {
            return "<stub>".into();
        }
        let data = self.symbols.class_data(sym);
        if data.owner.is_root() {
            return self.show_name(data.name);
        }
        eco_format!("{}::{}", self.show_class(data.owner), self.show_name(data.name))
    }

    /// Renders any symbol for diagnostics.
    pub fn show_symbol(&self, sym: SymbolRef) -> EcoString {
        match sym {
            SymbolRef::ClassOrModule(sym) => self.show_class(sym),
            SymbolRef::Method(sym) => {
                let data = self.symbols.method_data(sym);
                let sep = if data.flags.is_self_method { "." } else { "#" };
                eco_format!(
                    "{}{sep}{}",
                    self.show_class(data.owner),
                    self.show_name(data.name)
                )
            }
            SymbolRef::Field(sym) => {
                let data = self.symbols.field_data(sym);
                if data.is_static {
                    eco_format!(
                        "{}::{}",
                        self.show_class(data.owner),
                        self.show_name(data.name)
                    )
                } else {
                    self.show_name(data.name)
                }
            }
            SymbolRef::TypeMember(sym) => self.show_name(self.symbols.type_member_data(sym).name),
        }
    }

    /// The declaration location of any symbol.
    pub fn symbol_decl_loc(&self, sym: SymbolRef) -> Loc {
        match sym {
            SymbolRef::ClassOrModule(sym) => self.symbols.class_data(sym).decl_loc(),
            SymbolRef::Method(sym) => self.symbols.method_data(sym).decl_loc(),
            SymbolRef::Field(sym) => self
                .symbols
                .field_data(sym)
                .locs
                .last()
                .copied()
                .unwrap_or(Loc::NONE),
            SymbolRef::TypeMember(sym) => self
                .symbols
                .type_member_data(sym)
                .locs
                .last()
                .copied()
                .unwrap_or(Loc::NONE),
        }
    }

    // === Files ===========================================================

    /// Enters a new file, or replaces the content of an existing path.
    pub fn enter_file(
        &mut self,
        path: impl Into<EcoString>,
        source: impl Into<Arc<str>>,
        file_type: FileType,
    ) -> FileRef {
        let path = path.into();
        if let Some(&existing) = self.files_by_path.get(&path) {
            self.replace_file(existing, File::new(path, source, file_type));
            return existing;
        }
        assert!(!self.files_frozen, "file table is frozen");
        let fref = FileRef::from_index(self.files.len() as u32);
        self.files
            .push(Arc::new(File::new(path.clone(), source, file_type)));
        self.files_by_path.insert(path, fref);
        fref
    }

    /// Replaces an existing file's content in place. Allowed while the file
    /// table is frozen: the table's shape is unchanged.
    pub fn replace_file(&mut self, fref: FileRef, file: File) {
        let slot = &mut self.files[fref.index() as usize];
        assert_eq!(slot.path, file.path, "replace_file must keep the path");
        *slot = Arc::new(file);
    }

    /// The file behind `fref`.
    pub fn file(&self, fref: FileRef) -> &Arc<File> {
        &self.files[fref.index() as usize]
    }

    /// Looks up a file by path.
    pub fn find_file_by_path(&self, path: &str) -> Option<FileRef> {
        self.files_by_path.get(path).copied()
    }

    /// All file refs, in entry order.
    pub fn file_refs(&self) -> impl Iterator<Item = FileRef> + use<> {
        (0..self.files.len() as u32).map(FileRef::from_index)
    }

    /// The number of files.
    pub fn files_len(&self) -> usize {
        self.files.len()
    }

    // === Freezing ========================================================

    /// Unfreezes the name table until the guard drops.
    pub fn unfreeze_name_table(&mut self) -> Unfreeze<'_> {
        Unfreeze::new(self, true, false, false)
    }

    /// Unfreezes the symbol table until the guard drops.
    pub fn unfreeze_symbol_table(&mut self) -> Unfreeze<'_> {
        Unfreeze::new(self, false, true, false)
    }

    /// Unfreezes the file table until the guard drops.
    pub fn unfreeze_file_table(&mut self) -> Unfreeze<'_> {
        Unfreeze::new(self, false, false, true)
    }

    /// Unfreezes the name and file tables, the set indexing mutates.
    pub fn unfreeze_for_indexing(&mut self) -> Unfreeze<'_> {
        Unfreeze::new(self, true, false, true)
    }

    /// Unfreezes the name and symbol tables, the set the namer mutates.
    pub fn unfreeze_for_namer(&mut self) -> Unfreeze<'_> {
        Unfreeze::new(self, true, true, false)
    }

    /// Whether the name table currently accepts insertions.
    pub fn name_table_unfrozen(&self) -> bool {
        !self.names_frozen
    }

    /// Whether the symbol table currently accepts insertions.
    pub fn symbol_table_unfrozen(&self) -> bool {
        !self.symbols_frozen
    }

    // === Builtins ========================================================

    fn enter_builtin_class(
        &mut self,
        name: &str,
        kind: ClassKind,
        superclass: Option<ClassOrModuleRef>,
    ) -> ClassOrModuleRef {
        let name = self.enter_name_constant(name);
        let sym = self.enter_class(ClassOrModuleRef::ROOT, name, kind, Loc::NONE);
        self.symbols.class_data_mut(sym).superclass = superclass;
        sym
    }

    fn enter_builtin_method(
        &mut self,
        owner: ClassOrModuleRef,
        name: &str,
        args: &[(&str, Ty)],
        result: Ty,
    ) -> MethodRef {
        let name = self.enter_name_utf8(name);
        let arguments = args
            .iter()
            .map(|(arg_name, ty)| ArgInfo {
                name: self.names.enter_utf8(arg_name),
                kind: ArgKind::Positional,
                ty: ty.clone(),
                loc: Loc::NONE,
            })
            .collect();
        let (sym, _) = self.enter_method(owner, name, arguments, MethodFlags::default(), Loc::NONE);
        let data = self.symbols.method_data_mut(sym);
        data.result_type = result;
        data.has_sig = true;
        sym
    }

    fn enter_builtin_method_with_block(
        &mut self,
        owner: ClassOrModuleRef,
        name: &str,
        result: Ty,
    ) -> MethodRef {
        let name = self.enter_name_utf8(name);
        let blk = self.names.enter_utf8("blk");
        let arguments = vec![ArgInfo {
            name: blk,
            kind: ArgKind::Block,
            ty: Ty::Untyped,
            loc: Loc::NONE,
        }];
        let (sym, _) = self.enter_method(owner, name, arguments, MethodFlags::default(), Loc::NONE);
        let data = self.symbols.method_data_mut(sym);
        data.result_type = result;
        data.has_sig = true;
        sym
    }

    fn enter_builtins(&mut self) {
        use well_known as wk;

        // The root owns itself; entering it specially avoids a member-map
        // entry for its own name.
        let root_name = self.enter_name_constant("<root>");
        self.symbols.classes.push(ClassOrModuleData {
            owner: ClassOrModuleRef::ROOT,
            name: root_name,
            kind: ClassKind::Module,
            superclass: None,
            mixins: Vec::new(),
            type_params: Vec::new(),
            members: Default::default(),
            self_members: Default::default(),
            locs: smallvec![],
        });

        let stub_name = self.enter_name_constant("<stub>");
        let stub = self.enter_class(ClassOrModuleRef::ROOT, stub_name, ClassKind::Class, Loc::NONE);
        assert_eq!(stub, wk::STUB);

        let basic_object = self.enter_builtin_class("BasicObject", ClassKind::Class, None);
        let object = self.enter_builtin_class("Object", ClassKind::Class, Some(basic_object));
        let kernel = self.enter_builtin_class("Kernel", ClassKind::Module, None);
        let module = self.enter_builtin_class("Module", ClassKind::Class, Some(object));
        let class = self.enter_builtin_class("Class", ClassKind::Class, Some(module));
        let nil_class = self.enter_builtin_class("NilClass", ClassKind::Class, Some(object));
        let true_class = self.enter_builtin_class("TrueClass", ClassKind::Class, Some(object));
        let false_class = self.enter_builtin_class("FalseClass", ClassKind::Class, Some(object));
        let numeric = self.enter_builtin_class("Numeric", ClassKind::Class, Some(object));
        let integer = self.enter_builtin_class("Integer", ClassKind::Class, Some(numeric));
        let float = self.enter_builtin_class("Float", ClassKind::Class, Some(numeric));
        let string = self.enter_builtin_class("String", ClassKind::Class, Some(object));
        let symbol = self.enter_builtin_class("Symbol", ClassKind::Class, Some(object));
        let array = self.enter_builtin_class("Array", ClassKind::Class, Some(object));
        let hash = self.enter_builtin_class("Hash", ClassKind::Class, Some(object));
        let proc = self.enter_builtin_class("Proc", ClassKind::Class, Some(object));
        let exception = self.enter_builtin_class("Exception", ClassKind::Class, Some(object));
        let standard_error =
            self.enter_builtin_class("StandardError", ClassKind::Class, Some(exception));
        let t_module = self.enter_builtin_class("T", ClassKind::Module, None);

        assert_eq!(basic_object, wk::BASIC_OBJECT);
        assert_eq!(object, wk::OBJECT);
        assert_eq!(kernel, wk::KERNEL);
        assert_eq!(module, wk::MODULE);
        assert_eq!(class, wk::CLASS);
        assert_eq!(nil_class, wk::NIL_CLASS);
        assert_eq!(true_class, wk::TRUE_CLASS);
        assert_eq!(false_class, wk::FALSE_CLASS);
        assert_eq!(numeric, wk::NUMERIC);
        assert_eq!(integer, wk::INTEGER);
        assert_eq!(float, wk::FLOAT);
        assert_eq!(string, wk::STRING);
        assert_eq!(symbol, wk::SYMBOL);
        assert_eq!(array, wk::ARRAY);
        assert_eq!(hash, wk::HASH);
        assert_eq!(proc, wk::PROC);
        assert_eq!(exception, wk::EXCEPTION);
        assert_eq!(standard_error, wk::STANDARD_ERROR);
        assert_eq!(t_module, wk::T);

        self.symbols.class_data_mut(object).mixins.push(kernel);
        // Top-level code runs against an object, so the root scope
        // dispatches like one.
        self.symbols.class_data_mut(ClassOrModuleRef::ROOT).superclass = Some(object);

        let obj = Ty::Class(object);
        let int = Ty::Class(integer);
        let flt = Ty::Class(float);
        let str_ty = Ty::Class(string);
        let sym_ty = Ty::Class(symbol);
        let boolean = Ty::boolean();
        let nil = Ty::nil();

        // Object
        self.enter_builtin_method(object, "==", &[("other", obj.clone())], boolean.clone());
        self.enter_builtin_method(object, "!=", &[("other", obj.clone())], boolean.clone());
        self.enter_builtin_method(object, "!", &[], boolean.clone());
        self.enter_builtin_method(object, "nil?", &[], boolean.clone());
        self.enter_builtin_method(object, "is_a?", &[("klass", Ty::Untyped)], boolean.clone());
        self.enter_builtin_method(object, "kind_of?", &[("klass", Ty::Untyped)], boolean.clone());
        self.enter_builtin_method(object, "to_s", &[], str_ty.clone());
        self.enter_builtin_method(object, "inspect", &[], str_ty.clone());
        self.enter_builtin_method(object, "hash", &[], int.clone());
        self.enter_builtin_method(object, "class", &[], Ty::Untyped);
        self.enter_builtin_method(object, "freeze", &[], Ty::SelfType);
        self.enter_builtin_method(object, "dup", &[], Ty::SelfType);

        // Kernel
        self.enter_builtin_method(kernel, "puts", &[("arg0", Ty::Untyped)], nil.clone());
        self.enter_builtin_method(kernel, "print", &[("arg0", Ty::Untyped)], nil.clone());
        self.enter_builtin_method(kernel, "p", &[("arg0", Ty::Untyped)], Ty::Untyped);
        self.enter_builtin_method(kernel, "raise", &[("arg0", Ty::Untyped)], Ty::Bottom);
        self.enter_builtin_method(kernel, "rand", &[], flt.clone());

        // Integer
        self.enter_builtin_method(integer, "+", &[("arg0", int.clone())], int.clone());
        self.enter_builtin_method(integer, "-", &[("arg0", int.clone())], int.clone());
        self.enter_builtin_method(integer, "*", &[("arg0", int.clone())], int.clone());
        self.enter_builtin_method(integer, "/", &[("arg0", int.clone())], int.clone());
        self.enter_builtin_method(integer, "%", &[("arg0", int.clone())], int.clone());
        self.enter_builtin_method(integer, "<", &[("arg0", int.clone())], boolean.clone());
        self.enter_builtin_method(integer, "<=", &[("arg0", int.clone())], boolean.clone());
        self.enter_builtin_method(integer, ">", &[("arg0", int.clone())], boolean.clone());
        self.enter_builtin_method(integer, ">=", &[("arg0", int.clone())], boolean.clone());
        self.enter_builtin_method(integer, "to_s", &[], str_ty.clone());
        self.enter_builtin_method(integer, "to_f", &[], flt.clone());
        self.enter_builtin_method(integer, "abs", &[], int.clone());
        self.enter_builtin_method(integer, "succ", &[], int.clone());
        self.enter_builtin_method(integer, "zero?", &[], boolean.clone());

        // Float
        self.enter_builtin_method(float, "+", &[("arg0", flt.clone())], flt.clone());
        self.enter_builtin_method(float, "-", &[("arg0", flt.clone())], flt.clone());
        self.enter_builtin_method(float, "*", &[("arg0", flt.clone())], flt.clone());
        self.enter_builtin_method(float, "/", &[("arg0", flt.clone())], flt.clone());
        self.enter_builtin_method(float, "<", &[("arg0", flt.clone())], boolean.clone());
        self.enter_builtin_method(float, ">", &[("arg0", flt.clone())], boolean.clone());
        self.enter_builtin_method(float, "to_i", &[], int.clone());
        self.enter_builtin_method(float, "to_s", &[], str_ty.clone());

        // String
        self.enter_builtin_method(string, "+", &[("arg0", str_ty.clone())], str_ty.clone());
        self.enter_builtin_method(string, "*", &[("arg0", int.clone())], str_ty.clone());
        self.enter_builtin_method(string, "<<", &[("arg0", str_ty.clone())], str_ty.clone());
        self.enter_builtin_method(string, "length", &[], int.clone());
        self.enter_builtin_method(string, "size", &[], int.clone());
        self.enter_builtin_method(string, "empty?", &[], boolean.clone());
        self.enter_builtin_method(string, "upcase", &[], str_ty.clone());
        self.enter_builtin_method(string, "downcase", &[], str_ty.clone());
        self.enter_builtin_method(string, "to_s", &[], str_ty.clone());
        self.enter_builtin_method(string, "to_sym", &[], sym_ty.clone());
        self.enter_builtin_method(
            string,
            "include?",
            &[("arg0", str_ty.clone())],
            boolean.clone(),
        );

        // Symbol
        self.enter_builtin_method(symbol, "to_s", &[], str_ty.clone());
        self.enter_builtin_method(symbol, "to_sym", &[], sym_ty.clone());

        // NilClass
        self.enter_builtin_method(nil_class, "to_s", &[], str_ty.clone());
        self.enter_builtin_method(nil_class, "nil?", &[], boolean.clone());

        // Array
        self.enter_builtin_method_with_block(array, "each", Ty::SelfType);
        self.enter_builtin_method_with_block(array, "map", Ty::Class(array));
        self.enter_builtin_method(array, "push", &[("arg0", Ty::Untyped)], Ty::SelfType);
        self.enter_builtin_method(array, "<<", &[("arg0", Ty::Untyped)], Ty::SelfType);
        self.enter_builtin_method(array, "[]", &[("arg0", int.clone())], Ty::Untyped);
        self.enter_builtin_method(array, "first", &[], Ty::Untyped);
        self.enter_builtin_method(array, "size", &[], int.clone());
        self.enter_builtin_method(array, "length", &[], int.clone());
        self.enter_builtin_method(array, "empty?", &[], boolean.clone());

        // Hash
        self.enter_builtin_method(hash, "[]", &[("arg0", Ty::Untyped)], Ty::Untyped);
        self.enter_builtin_method(
            hash,
            "[]=",
            &[("arg0", Ty::Untyped), ("arg1", Ty::Untyped)],
            Ty::Untyped,
        );
        self.enter_builtin_method(hash, "key?", &[("arg0", Ty::Untyped)], boolean.clone());
        self.enter_builtin_method(hash, "size", &[], int.clone());
        self.enter_builtin_method_with_block(hash, "each", Ty::SelfType);

        // Proc
        self.enter_builtin_method(proc, "call", &[("arg0", Ty::Untyped)], Ty::Untyped);

        // Exception
        self.enter_builtin_method(exception, "message", &[], str_ty.clone());
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped mutability for the normally-frozen tables. Re-freezes exactly the
/// tables it unfroze when dropped, on every exit path.
pub struct Unfreeze<'gs> {
    gs: &'gs mut GlobalState,
    names: bool,
    symbols: bool,
    files: bool,
}

impl<'gs> Unfreeze<'gs> {
    fn new(gs: &'gs mut GlobalState, names: bool, symbols: bool, files: bool) -> Self {
        // Tables already unfrozen by an outer scope stay that scope's
        // responsibility.
        let names = names && gs.names_frozen;
        let symbols = symbols && gs.symbols_frozen;
        let files = files && gs.files_frozen;
        if names {
            gs.names_frozen = false;
        }
        if symbols {
            gs.symbols_frozen = false;
        }
        if files {
            gs.files_frozen = false;
        }
        Self {
            gs,
            names,
            symbols,
            files,
        }
    }
}

impl Drop for Unfreeze<'_> {
    fn drop(&mut self) {
        if self.names {
            self.gs.names_frozen = true;
        }
        if self.symbols {
            self.gs.symbols_frozen = true;
        }
        if self.files {
            self.gs.files_frozen = true;
        }
    }
}

impl Deref for Unfreeze<'_> {
    type Target = GlobalState;

    fn deref(&self) -> &GlobalState {
        self.gs
    }
}

impl DerefMut for Unfreeze<'_> {
    fn deref_mut(&mut self) -> &mut GlobalState {
        self.gs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_land_on_their_well_known_indices() {
        let gs = GlobalState::new();
        assert_eq!(gs.show_class(well_known::OBJECT), "Object");
        assert_eq!(gs.show_class(well_known::INTEGER), "Integer");
        assert!(
            gs.symbols()
                .derives_from(well_known::INTEGER, well_known::OBJECT)
        );
        assert!(
            gs.symbols()
                .derives_from(well_known::STANDARD_ERROR, well_known::EXCEPTION)
        );
        // Kernel is mixed into Object, so every object responds to puts.
        let puts = gs.names().lookup_utf8("puts").unwrap();
        assert!(
            gs.symbols()
                .find_member_transitive(well_known::INTEGER, puts)
                .is_some()
        );
    }

    #[test]
    #[should_panic(expected = "name table is frozen")]
    fn frozen_name_table_rejects_insertions() {
        let mut gs = GlobalState::new();
        gs.enter_name_utf8("nope");
    }

    #[test]
    fn unfreeze_refreezes_on_drop() {
        let mut gs = GlobalState::new();
        {
            let mut unfrozen = gs.unfreeze_name_table();
            unfrozen.enter_name_utf8("fine");
            assert!(unfrozen.name_table_unfrozen());
        }
        assert!(!gs.name_table_unfrozen());
    }

    #[test]
    fn nested_unfreeze_leaves_outer_scope_in_charge() {
        let mut gs = GlobalState::new();
        let mut outer = gs.unfreeze_for_namer();
        {
            let inner = outer.unfreeze_name_table();
            assert!(inner.name_table_unfrozen());
        }
        // The inner guard must not have refrozen what the outer one holds.
        assert!(outer.name_table_unfrozen());
        assert!(outer.symbol_table_unfrozen());
    }

    #[test]
    fn deep_copy_shares_epochs_but_not_errors() {
        let gs = GlobalState::new();
        let copy = gs.deep_copy();
        gs.epochs.request_cancellation();
        assert!(copy.epochs.cancellation_requested());
        copy.errors.push_diagnostic(crate::diag::Diagnostic::new(
            crate::diag::DiagnosticCode::DeadCode,
            Loc::NONE,
            "only in copy",
        ));
        assert!(gs.errors.drain().0.is_empty());
        assert_eq!(copy.errors.drain().0.len(), 1);
    }

    #[test]
    fn enter_class_is_find_or_create() {
        let mut gs = GlobalState::new();
        let mut gs = gs.unfreeze_for_namer();
        let name = gs.enter_name_constant("Foo");
        let first = gs.enter_class(ClassOrModuleRef::ROOT, name, ClassKind::Class, Loc::NONE);
        let second = gs.enter_class(ClassOrModuleRef::ROOT, name, ClassKind::Class, Loc::NONE);
        assert_eq!(first, second);
    }
}
