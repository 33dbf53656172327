use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::types::TypeExpr;
use crate::errors::errors::{Error, ErrorKind};
use crate::generics::generics::{sanitize_symbol, substitute_type};
use crate::type_checker::type_checker::{
    canonical_generic_name, canonical_name, FLOAT_WIDTHS, INTEGER_TYPES,
};

use super::info::{Binding, FunctionInfo, Member, TypeInfo};

/// Opaque handle to a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Signature of the injected method-name mangler.
pub type MethodMangler = fn(&str, &str) -> String;

/// Default mangling scheme for struct methods: `Struct__method`, with the
/// struct's canonical name sanitized for use as a linkage symbol.
pub fn default_method_mangler(struct_name: &str, method: &str) -> String {
    format!("{}__{}", sanitize_symbol(struct_name), method)
}

/// One node of the scope tree. Variables are scope-local; `local_types`
/// holds type bindings re-registered during generic instantiation so plain
/// lookups succeed afterwards.
#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    vars: HashMap<String, Binding>,
    local_types: HashMap<String, Rc<RefCell<TypeInfo>>>,
}

/// The symbol table: a scope arena plus the global type and function
/// namespaces of the compilation unit.
///
/// The global type map doubles as the generic-instantiation cache; cache
/// entries are keyed by canonical instantiation names and shared through
/// `Rc`, so repeated resolution of the same instantiation returns the
/// identical object.
pub struct SymbolTable {
    scopes: Vec<Scope>,
    types: HashMap<String, Rc<RefCell<TypeInfo>>>,
    functions: HashMap<String, FunctionInfo>,
    mangler: MethodMangler,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::with_mangler(default_method_mangler)
    }

    /// Builds a table with a caller-supplied method mangler. The mangler is
    /// fixed for the table's lifetime; every method registration and lookup
    /// goes through it.
    pub fn with_mangler(mangler: MethodMangler) -> Self {
        let mut table = SymbolTable {
            scopes: vec![Scope::default()],
            types: HashMap::new(),
            functions: HashMap::new(),
            mangler,
        };
        table.seed_primitives();
        table
    }

    fn seed_primitives(&mut self) {
        for (name, info) in INTEGER_TYPES.iter() {
            let bytes = (info.bits / 8) as u64;
            self.types.insert(
                String::from(*name),
                Rc::new(RefCell::new(TypeInfo::primitive(name, bytes, bytes))),
            );
        }
        for (name, bits) in FLOAT_WIDTHS.iter() {
            let bytes = (*bits / 8) as u64;
            self.types.insert(
                String::from(*name),
                Rc::new(RefCell::new(TypeInfo::primitive(name, bytes, bytes))),
            );
        }
        // `string` is a pointer under the hood.
        self.types.insert(
            String::from("string"),
            Rc::new(RefCell::new(TypeInfo::primitive("string", 8, 8))),
        );
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(parent),
            ..Scope::default()
        });
        ScopeId(self.scopes.len() - 1)
    }

    pub fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    /// Scope-local insert. Defining a name already present in an ancestor
    /// shadows it; a duplicate within the same scope is an error.
    pub fn define(&mut self, scope: ScopeId, name: &str, binding: Binding) -> Result<(), Error> {
        let line = binding.line;
        if self.scopes[scope.0].vars.contains_key(name) {
            return Err(Error::new(
                ErrorKind::VariableAlreadyDefined {
                    name: String::from(name),
                },
                line,
            ));
        }
        self.scopes[scope.0].vars.insert(String::from(name), binding);
        Ok(())
    }

    /// Walks the scope chain for a variable and bumps its usage counter.
    pub fn resolve(&mut self, scope: ScopeId, name: &str) -> Option<Binding> {
        let owner = self.owner_of(scope, name)?;
        let binding = self.scopes[owner.0].vars.get_mut(name)?;
        binding.uses += 1;
        Some(binding.clone())
    }

    /// Chain lookup that does not count as a read (assignment targets).
    pub fn resolve_for_write(&self, scope: ScopeId, name: &str) -> Option<&Binding> {
        let owner = self.owner_of(scope, name)?;
        self.scopes[owner.0].vars.get(name)
    }

    fn owner_of(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if self.scopes[id.0].vars.contains_key(name) {
                return Some(id);
            }
            current = self.scopes[id.0].parent;
        }
        None
    }

    pub fn bindings(&self, scope: ScopeId) -> impl Iterator<Item = (&String, &Binding)> {
        self.scopes[scope.0].vars.iter()
    }

    /// Registers a function in the global namespace.
    ///
    /// Redefining a non-external function is an error. An external function
    /// may be re-declared: a strictly wider argument list replaces the prior
    /// entry, otherwise the call is a no-op.
    pub fn define_function(&mut self, info: FunctionInfo, line: u32) -> Result<(), Error> {
        match self.functions.get(&info.name) {
            Some(existing) => {
                if existing.is_external() && info.is_external() {
                    if info.params.len() > existing.params.len() {
                        self.functions.insert(info.name.clone(), info);
                    }
                    Ok(())
                } else {
                    Err(Error::new(
                        ErrorKind::FunctionAlreadyDefined { name: info.name },
                        line,
                    ))
                }
            }
            None => {
                self.functions.insert(info.name.clone(), info);
                Ok(())
            }
        }
    }

    pub fn resolve_function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.functions.values()
    }

    pub fn mangle_method(&self, struct_name: &str, method: &str) -> String {
        (self.mangler)(struct_name, method)
    }

    /// Registers a type in the global namespace. A duplicate name is an
    /// error. If no layout ran, the size falls back to the unpadded sum of
    /// the member sizes (the padded layout is canonical; this fallback only
    /// applies to members registered without layout).
    pub fn define_type(&mut self, mut info: TypeInfo, line: u32) -> Result<Rc<RefCell<TypeInfo>>, Error> {
        if self.types.contains_key(&info.name) {
            return Err(Error::new(
                ErrorKind::TypeAlreadyDefined { name: info.name },
                line,
            ));
        }
        if info.size == 0 && !info.members.is_empty() {
            info.size = unpadded_size(&info.members);
        }
        let rc = Rc::new(RefCell::new(info));
        let name = rc.borrow().name.clone();
        self.types.insert(name, Rc::clone(&rc));
        Ok(rc)
    }

    /// Re-registers an already-resolved type in a specific scope so plain
    /// lookups from that scope succeed later.
    pub fn register_local_type(&mut self, scope: ScopeId, ty: Rc<RefCell<TypeInfo>>) {
        let name = ty.borrow().name.clone();
        self.scopes[scope.0].local_types.insert(name, ty);
    }

    /// Scope-chain type lookup: local bindings first, then the global
    /// namespace.
    pub fn resolve_type(&self, scope: ScopeId, name: &str) -> Option<Rc<RefCell<TypeInfo>>> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(ty) = self.scopes[id.0].local_types.get(name) {
                return Some(Rc::clone(ty));
            }
            current = self.scopes[id.0].parent;
        }
        self.types.get(name).map(Rc::clone)
    }

    pub fn struct_types(&self) -> impl Iterator<Item = Rc<RefCell<TypeInfo>>> + '_ {
        self.types.values().map(Rc::clone)
    }

    /// Resolves a type reference, instantiating generics on demand.
    pub fn resolve_type_expr(
        &mut self,
        ty: &TypeExpr,
        scope: ScopeId,
        context: Option<ScopeId>,
        line: u32,
    ) -> Result<Rc<RefCell<TypeInfo>>, Error> {
        if !ty.generic_args.is_empty() {
            return self.resolve_generic_type(&ty.name, &ty.generic_args, scope, context, line);
        }
        self.resolve_type(scope, &ty.name).ok_or_else(|| {
            Error::new(
                ErrorKind::TypeNotDefined {
                    name: ty.name.clone(),
                },
                line,
            )
        })
    }

    /// Resolves `Base<args>` against the instantiation cache, creating and
    /// registering the concrete instance on a miss.
    ///
    /// The new instance is registered *before* its members are filled so
    /// self-referential pointer fields resolve against the live entry.
    /// Member types are resolved with a three-tier fallback: the current
    /// scope, the template's defining scope, then the caller-supplied
    /// context scope; only the final miss is fatal.
    pub fn resolve_generic_type(
        &mut self,
        base: &str,
        args: &[TypeExpr],
        scope: ScopeId,
        context: Option<ScopeId>,
        line: u32,
    ) -> Result<Rc<RefCell<TypeInfo>>, Error> {
        let canonical = canonical_generic_name(base, args);
        if let Some(cached) = self.resolve_type(scope, &canonical) {
            return Ok(cached);
        }

        let template_rc = self.resolve_type(scope, base).ok_or_else(|| {
            Error::new(
                ErrorKind::TypeNotDefined {
                    name: String::from(base),
                },
                line,
            )
        })?;

        let (params, template_fields, parent, defining_scope, template_methods) = {
            let template = template_rc.borrow();
            let params = template.generic_params.clone().ok_or_else(|| {
                Error::new(
                    ErrorKind::GenericArgumentCount {
                        name: String::from(base),
                        expected: 0,
                        received: args.len(),
                    },
                    line,
                )
            })?;
            if params.len() != args.len() {
                return Err(Error::new(
                    ErrorKind::GenericArgumentCount {
                        name: String::from(base),
                        expected: params.len(),
                        received: args.len(),
                    },
                    line,
                ));
            }
            (
                params,
                template.template_fields.clone().unwrap_or_default(),
                template.parent.clone(),
                template.defining_scope,
                template.template_methods.clone(),
            )
        };

        // Register the stub first so recursive fields see a live entry.
        let stub = TypeInfo {
            parent: parent.clone(),
            defining_scope: Some(scope),
            template_methods,
            ..TypeInfo::named(&canonical)
        };
        let instance = self.define_type(stub, line)?;

        let mut substitution = HashMap::new();
        for (param, arg) in params.iter().zip(args.iter()) {
            substitution.insert(param.clone(), arg.clone());
        }

        // Inherited members come first, keeping their layout; template
        // fields are laid out after them.
        let mut members = vec![];
        let mut offset = 0;
        let mut max_align = 1;
        if let Some(parent_name) = &parent {
            let parent_rc = self.resolve_type(scope, parent_name).ok_or_else(|| {
                Error::new(
                    ErrorKind::TypeNotDefined {
                        name: parent_name.clone(),
                    },
                    line,
                )
            })?;
            let parent_info = parent_rc.borrow();
            for member in &parent_info.members {
                offset = member.offset + member.size;
                max_align = max_align.max(member.alignment);
                members.push(member.clone());
            }
        }

        for field in &template_fields {
            let concrete = substitute_type(&field.ty, &substitution);
            let (size, alignment) =
                self.field_size_align(&concrete, scope, defining_scope, context, field.line)?;
            offset = align_to(offset, alignment);
            members.push(Member {
                name: field.name.clone(),
                type_name: canonical_name(&concrete),
                size,
                offset,
                alignment,
                index: members.len(),
            });
            offset += size;
            max_align = max_align.max(alignment);
        }

        let total = align_to(offset, max_align);
        {
            let mut info = instance.borrow_mut();
            info.members = members;
            info.size = total;
            info.alignment = max_align;
        }

        Ok(instance)
    }

    /// Size and alignment of a concrete type reference resolved from one
    /// scope, with no extra fallback tiers.
    pub fn size_and_align_of(
        &mut self,
        ty: &TypeExpr,
        scope: ScopeId,
        line: u32,
    ) -> Result<(u64, u64), Error> {
        self.field_size_align(ty, scope, None, None, line)
    }

    fn field_size_align(
        &mut self,
        ty: &TypeExpr,
        scope: ScopeId,
        defining: Option<ScopeId>,
        context: Option<ScopeId>,
        line: u32,
    ) -> Result<(u64, u64), Error> {
        if !ty.array_dims.is_empty() {
            // Unsized arrays decay to pointers.
            if ty.array_dims.contains(&0) {
                return Ok((8, 8));
            }
            let element = TypeExpr {
                array_dims: vec![],
                ..ty.clone()
            };
            let (element_size, element_align) =
                self.field_size_align(&element, scope, defining, context, line)?;
            let count: u64 = ty.array_dims.iter().product();
            return Ok((element_size * count, element_align));
        }

        if ty.pointer_depth > 0 {
            return Ok((8, 8));
        }

        let info = self.lookup_type_tiered(ty, scope, defining, context, line)?;
        let info = info.borrow();
        Ok((info.size, info.alignment))
    }

    /// The ordered resolution chain for member types: current scope, the
    /// template's defining scope, then the caller context. Each tier returns
    /// an option; only exhausting the chain is fatal. A hit from a fallback
    /// tier is re-registered in the current scope.
    fn lookup_type_tiered(
        &mut self,
        ty: &TypeExpr,
        scope: ScopeId,
        defining: Option<ScopeId>,
        context: Option<ScopeId>,
        line: u32,
    ) -> Result<Rc<RefCell<TypeInfo>>, Error> {
        let tiers = [Some(scope), defining, context];
        for (tier, tier_scope) in tiers.iter().flatten().enumerate() {
            let found = if ty.generic_args.is_empty() {
                self.resolve_type(*tier_scope, &ty.name)
            } else {
                self.resolve_generic_type(&ty.name, &ty.generic_args, *tier_scope, context, line)
                    .ok()
            };
            if let Some(found) = found {
                if tier > 0 {
                    self.register_local_type(scope, Rc::clone(&found));
                }
                return Ok(found);
            }
        }
        Err(Error::new(
            ErrorKind::TypeNotDefined {
                name: canonical_name(ty),
            },
            line,
        ))
    }

    /// C layout for a field list: each field is padded to its own
    /// alignment, offsets increase strictly, and the total size is padded to
    /// the maximum member alignment.
    pub fn layout_struct(
        &mut self,
        fields: &[(String, TypeExpr)],
        scope: ScopeId,
        context: Option<ScopeId>,
        line: u32,
    ) -> Result<(Vec<Member>, u64, u64), Error> {
        let mut members = vec![];
        let mut offset = 0;
        let mut max_align = 1;

        for (name, ty) in fields {
            let (size, alignment) = self.field_size_align(ty, scope, None, context, line)?;
            offset = align_to(offset, alignment);
            members.push(Member {
                name: name.clone(),
                type_name: canonical_name(ty),
                size,
                offset,
                alignment,
                index: members.len(),
            });
            offset += size;
            max_align = max_align.max(alignment);
        }

        Ok((members, align_to(offset, max_align), max_align))
    }
}

pub fn align_to(offset: u64, align: u64) -> u64 {
    if align == 0 {
        return offset;
    }
    offset.div_ceil(align) * align
}

/// The deliberately-unused fallback size formula: a plain sum of member
/// sizes. Equal to the padded layout only for naturally-aligned field
/// orders.
pub fn unpadded_size(members: &[Member]) -> u64 {
    members.iter().map(|member| member.size).sum()
}
