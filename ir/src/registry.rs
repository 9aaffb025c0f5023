//! Typed function and method records built from trace bindings.

use std::sync::Arc;

use gpumap_host::Value;
use gpumap_host::ast::FunctionDef;
use snafu::{OptionExt, ResultExt};
use tracing::debug;

use crate::class::ClassDescriptor;
use crate::error::{
    LayoutError, LayoutSnafu, NotObservedSnafu, Result, TraceSnafu, UnknownFunctionSnafu, UntranslatableReturnSnafu,
    UnsupportedArgumentSnafu,
};
use crate::extract::Extractor;
use crate::trace::TypeBinding;
use crate::types::Type;

/// A free variable of a translated function, passed as an extra parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureParam {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct FunctionIr {
    pub name: String,
    pub params: Vec<String>,
    pub param_types: Vec<Type>,
    /// `None` when the function returns no value.
    pub ret: Option<Type>,
    pub def: Arc<FunctionDef>,
    pub closure: Vec<ClosureParam>,
}

impl FunctionIr {
    pub fn param_type(&self, name: &str) -> Option<&Type> {
        self.params.iter().position(|p| p == name).map(|i| &self.param_types[i])
    }

    pub fn closure_param(&self, name: &str) -> Option<&ClosureParam> {
        self.closure.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct MethodIr {
    pub owner: Arc<ClassDescriptor>,
    /// Parameters include the receiver at position 0.
    pub function: FunctionIr,
    pub is_constructor: bool,
}

impl MethodIr {
    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn receiver(&self) -> &str {
        &self.function.params[0]
    }

    /// Parameters after the receiver, with their types.
    pub fn args(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.function.params.iter().zip(&self.function.param_types).skip(1).map(|(n, t)| (n.as_str(), t))
    }
}

/// Every class, function and method discovered for one translation.
#[derive(Debug, Default)]
pub struct Registry {
    extractor: Extractor,
    functions: Vec<FunctionIr>,
    methods: Vec<MethodIr>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bindings(bindings: &[TypeBinding]) -> Result<Self> {
        let mut registry = Self::new();
        for binding in bindings {
            registry.add_binding(binding)?;
        }
        Ok(registry)
    }

    /// Register one traced call. A pair already present is left untouched.
    pub fn add_binding(&mut self, binding: &TypeBinding) -> Result<()> {
        let qualified = binding.qualified_name();

        let mut param_types = Vec::with_capacity(binding.args.len());
        for (param, arg) in binding.params.iter().zip(&binding.args) {
            let ty = self.extractor.type_of(arg).map_err(|err| match err {
                LayoutError::UnsupportedValue { type_name } => {
                    UnsupportedArgumentSnafu { function: qualified.clone(), param: param.clone(), type_name }.build()
                }
                other => other,
            });
            param_types.push(ty.context(LayoutSnafu)?);
        }

        let ret = binding.ret.as_ref().context(NotObservedSnafu { function: qualified.clone() }).context(TraceSnafu)?;
        let ret = match ret {
            Value::None => None,
            Value::List(_) => {
                return UntranslatableReturnSnafu { function: qualified, type_name: "list" }.fail().context(TraceSnafu);
            }
            value => Some(self.extractor.type_of(value).ok().context(UntranslatableReturnSnafu {
                function: qualified.clone(),
                type_name: value.type_name(),
            }).context(TraceSnafu)?),
        };

        let function = FunctionIr {
            name: binding.name.clone(),
            params: binding.params.clone(),
            param_types,
            ret,
            def: binding.function.def.clone(),
            closure: Vec::new(),
        };

        match &binding.owner {
            None => {
                if self.function(&binding.name).is_none() {
                    debug!(function = %binding.name, params = function.params.len(), "registered function");
                    self.functions.push(function);
                }
            }
            Some(owner_name) => {
                let owner = function.param_types.first().and_then(Type::class).cloned();
                let Some(owner) = owner.filter(|c| &c.name == owner_name) else {
                    return UnsupportedArgumentSnafu {
                        function: qualified,
                        param: "self",
                        type_name: binding.args.first().map(Value::type_name).unwrap_or_default(),
                    }
                    .fail()
                    .context(LayoutSnafu);
                };
                if self.method(owner_name, &binding.name).is_none() {
                    debug!(method = %qualified, "registered method");
                    let is_constructor = binding.name == "__init__";
                    self.methods.push(MethodIr { owner, function, is_constructor });
                }
            }
        }
        Ok(())
    }

    /// Append closure parameters to a free function.
    pub fn append_closure_params(&mut self, function: &str, params: Vec<ClosureParam>) -> Result<()> {
        let entry = self
            .functions
            .iter_mut()
            .find(|f| f.name == function)
            .context(UnknownFunctionSnafu { function })?;
        entry.closure.extend(params);
        Ok(())
    }

    /// Type of an arbitrary host value, registering any classes it contains.
    pub fn type_of(&mut self, value: &Value) -> Result<Type> {
        self.extractor.type_of(value).context(LayoutSnafu)
    }

    pub fn classes(&self) -> &[Arc<ClassDescriptor>] {
        self.extractor.classes()
    }

    pub fn class(&self, name: &str) -> Option<&Arc<ClassDescriptor>> {
        self.extractor.get(name)
    }

    pub fn functions(&self) -> &[FunctionIr] {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&FunctionIr> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn methods(&self) -> &[MethodIr] {
        &self.methods
    }

    pub fn methods_of<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a MethodIr> + 'a {
        self.methods.iter().filter(move |m| m.owner.name == class)
    }

    pub fn method(&self, class: &str, name: &str) -> Option<&MethodIr> {
        self.methods.iter().find(|m| m.owner.name == class && m.function.name == name)
    }
}
