//! Statement execution.
//!
//! The block executor halts a statement sequence as soon as a non-normal
//! [`Flow`] comes back and hands it to the nearest scope that consumes it:
//! loops take `Break`/`Continue`, function calls take `Return`, `try/catch`
//! frames take throws travelling as `Err`.

use std::rc::Rc;

use conch_types::{ErrorCode, RuntimeError};

use crate::ast::{
    Assignment, AssignTarget, Block, ClassDecl, ClassMember, ForStmt, FuncDecl, IfStmt, Import,
    InterfaceDecl, MethodSig, Stmt, StmtKind, SwitchStmt, TryCatch, WhileStmt,
};
use crate::object::{
    eq_values, index_set, is_truthy, iter_has_next, iter_next, obj_iter, AbstractMethod, DeclClass,
    Interface, Kind, ObjectRef, ParamSpec, Repr,
};

use super::expr::{attr_set, eval_param_specs};
use super::{eval_expr, ExecCtx, Flow, Interpreter, ScopeExec, SymbolTableStack, TableKind};

/// Execute a statement sequence, stopping at the first non-normal flow.
pub(crate) fn exec_stmts(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    statements: &[Stmt],
    scope: &mut ScopeExec,
) -> Result<Flow, RuntimeError> {
    for stmt in statements {
        match exec_stmt(ctx, stack, stmt, scope)? {
            Flow::Normal => {}
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

/// Execute a block in a fresh nested scope table.
fn exec_block(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    block: &Block,
    scope: &mut ScopeExec,
) -> Result<Flow, RuntimeError> {
    let mut inner = stack.clone();
    inner.push_table(TableKind::Block);
    exec_stmts(ctx, &inner, &block.statements, scope)
}

/// Execute a single statement.
pub(crate) fn exec_stmt(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    stmt: &Stmt,
    scope: &mut ScopeExec,
) -> Result<Flow, RuntimeError> {
    let result = match &stmt.kind {
        StmtKind::Expr(expr) => {
            eval_expr(ctx, stack, expr)?;
            Ok(Flow::Normal)
        }
        StmtKind::Assignment(assignment) => exec_assignment(ctx, stack, assignment),
        StmtKind::If(if_stmt) => exec_if(ctx, stack, if_stmt, scope),
        StmtKind::For(for_stmt) => exec_for(ctx, stack, for_stmt, scope),
        StmtKind::While(while_stmt) => exec_while(ctx, stack, while_stmt, scope),
        StmtKind::Switch(switch_stmt) => exec_switch(ctx, stack, switch_stmt, scope),
        StmtKind::Break => Ok(Flow::Break),
        StmtKind::Continue => Ok(Flow::Continue),
        StmtKind::Return(value) => {
            let obj = match value {
                Some(expr) => eval_expr(ctx, stack, expr)?,
                None => ctx.factory.new_null(),
            };
            Ok(Flow::Return(obj))
        }
        StmtKind::Throw(expr) => {
            let obj = eval_expr(ctx, stack, expr)?;
            let message = crate::object::str_value(ctx, &obj)?;
            Err(RuntimeError::new(ErrorCode::Assert, message))
        }
        StmtKind::TryCatch(try_catch) => exec_try_catch(ctx, stack, try_catch, scope),
        StmtKind::Defer(inner) => {
            scope.push_defer((**inner).clone(), stack.clone());
            Ok(Flow::Normal)
        }
        StmtKind::FuncDecl(decl) => exec_func_decl(ctx, stack, decl),
        StmtKind::ClassDecl(decl) => exec_class_decl(ctx, stack, decl),
        StmtKind::InterfaceDecl(decl) => exec_interface_decl(ctx, stack, decl),
        StmtKind::Import(import) => exec_import(ctx, stack, import),
        StmtKind::Block(block) => exec_block(ctx, stack, block, scope),
    };
    result.map_err(|e| e.at(stmt.pos))
}

fn exec_assignment(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    assignment: &Assignment,
) -> Result<Flow, RuntimeError> {
    let mut values = Vec::with_capacity(assignment.values.len());
    for expr in &assignment.values {
        values.push(eval_expr(ctx, stack, expr)?);
    }

    let targets = &assignment.targets;
    let resolved: Vec<ObjectRef> = if targets.len() == values.len() {
        values
    } else if targets.len() > 1 && values.len() == 1 {
        unpack(&values[0], targets.len())?
    } else if targets.len() == 1 {
        vec![ctx.factory.new_tuple(values)]
    } else {
        return Err(RuntimeError::new(
            ErrorCode::IncompatibleType,
            format!(
                "can't assign {} values to {} targets",
                values.len(),
                targets.len()
            ),
        ));
    };

    for (target, value) in targets.iter().zip(resolved) {
        match target {
            AssignTarget::Name(name) => stack.set(name, value),
            AssignTarget::Attribute { object, name } => {
                let obj = eval_expr(ctx, stack, object)?;
                attr_set(ctx, &obj, name, value)?;
            }
            AssignTarget::Index { object, index } => {
                let obj = eval_expr(ctx, stack, object)?;
                let key = eval_expr(ctx, stack, index)?;
                index_set(ctx, &obj, &key, value)?;
            }
        }
    }
    Ok(Flow::Normal)
}

fn unpack(value: &ObjectRef, want: usize) -> Result<Vec<ObjectRef>, RuntimeError> {
    let items: Vec<ObjectRef> = match &value.repr {
        Repr::Tuple(items) => items.clone(),
        Repr::Array(items) => items.borrow().clone(),
        _ => {
            return Err(RuntimeError::new(
                ErrorCode::IncompatibleType,
                format!("can't unpack '{}'", value.kind().name()),
            ))
        }
    };
    if items.len() != want {
        return Err(RuntimeError::new(
            ErrorCode::IncompatibleType,
            format!("expected {want} values to unpack, got {}", items.len()),
        ));
    }
    Ok(items)
}

fn exec_if(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    if_stmt: &IfStmt,
    scope: &mut ScopeExec,
) -> Result<Flow, RuntimeError> {
    let cond = eval_expr(ctx, stack, &if_stmt.condition)?;
    if is_truthy(ctx, &cond)? {
        exec_block(ctx, stack, &if_stmt.then_block, scope)
    } else if let Some(else_block) = &if_stmt.else_block {
        exec_block(ctx, stack, else_block, scope)
    } else {
        Ok(Flow::Normal)
    }
}

fn exec_for(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    for_stmt: &ForStmt,
    scope: &mut ScopeExec,
) -> Result<Flow, RuntimeError> {
    let iterable = eval_expr(ctx, stack, &for_stmt.iterable)?;
    let iter = obj_iter(ctx, &iterable)?;

    let mut inner = stack.clone();
    inner.push_table(TableKind::Block);

    while iter_has_next(ctx, &iter)? {
        let element = iter_next(ctx, &iter)?;
        if for_stmt.vars.len() == 1 {
            inner.insert_top(&for_stmt.vars[0], element);
        } else {
            let parts = unpack(&element, for_stmt.vars.len())?;
            for (var, part) in for_stmt.vars.iter().zip(parts) {
                inner.insert_top(var, part);
            }
        }
        match exec_stmts(ctx, &inner, &for_stmt.block.statements, scope)? {
            Flow::Normal | Flow::Continue => {}
            Flow::Break => break,
            flow @ Flow::Return(_) => return Ok(flow),
        }
    }
    Ok(Flow::Normal)
}

fn exec_while(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    while_stmt: &WhileStmt,
    scope: &mut ScopeExec,
) -> Result<Flow, RuntimeError> {
    loop {
        let cond = eval_expr(ctx, stack, &while_stmt.condition)?;
        if !is_truthy(ctx, &cond)? {
            break;
        }
        match exec_block(ctx, stack, &while_stmt.block, scope)? {
            Flow::Normal | Flow::Continue => {}
            Flow::Break => break,
            flow @ Flow::Return(_) => return Ok(flow),
        }
    }
    Ok(Flow::Normal)
}

fn exec_switch(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    switch_stmt: &SwitchStmt,
    scope: &mut ScopeExec,
) -> Result<Flow, RuntimeError> {
    let value = eval_expr(ctx, stack, &switch_stmt.expr)?;
    for case in &switch_stmt.cases {
        for case_expr in &case.exprs {
            let candidate = eval_expr(ctx, stack, case_expr)?;
            if eq_values(ctx, &value, &candidate)? {
                return consume_break(exec_block(ctx, stack, &case.block, scope)?);
            }
        }
    }
    if let Some(default) = &switch_stmt.default {
        return consume_break(exec_block(ctx, stack, default, scope)?);
    }
    Ok(Flow::Normal)
}

fn consume_break(flow: Flow) -> Result<Flow, RuntimeError> {
    Ok(match flow {
        Flow::Break => Flow::Normal,
        other => other,
    })
}

fn exec_try_catch(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    try_catch: &TryCatch,
    scope: &mut ScopeExec,
) -> Result<Flow, RuntimeError> {
    match exec_block(ctx, stack, &try_catch.try_block, scope) {
        Ok(flow) => Ok(flow),
        Err(err) => {
            for clause in &try_catch.catches {
                if clause.codes.is_empty() || clause.codes.contains(&err.code) {
                    let mut inner = stack.clone();
                    inner.push_table(TableKind::Block);
                    if let Some(name) = &clause.name {
                        inner.insert_top(name, ctx.factory.new_str(err.message.clone()));
                    }
                    return exec_stmts(ctx, &inner, &clause.block.statements, scope);
                }
            }
            // no clause matched: rethrow
            Err(err)
        }
    }
}

fn exec_func_decl(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    decl: &FuncDecl,
) -> Result<Flow, RuntimeError> {
    let specs = eval_param_specs(ctx, stack, &decl.params)?;
    let func = ctx.factory.new_declared_func(
        Some(decl.name.clone()),
        specs,
        decl.variadic.clone(),
        Rc::new(decl.block.clone()),
        stack.clone(),
        false,
    );
    stack.insert_top(&decl.name, func);
    Ok(Flow::Normal)
}

fn exec_class_decl(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    decl: &ClassDecl,
) -> Result<Flow, RuntimeError> {
    let base = match &decl.base {
        Some(name) => {
            let obj = stack.lookup(name).ok_or_else(|| {
                RuntimeError::new(
                    ErrorCode::SymbolNotFound,
                    format!("undefined symbol '{name}'"),
                )
            })?;
            if obj.kind() != Kind::DeclType {
                return Err(RuntimeError::new(
                    ErrorCode::IncompatibleType,
                    format!("base of class '{}' must be a declared class", decl.name),
                ));
            }
            Some(obj)
        }
        None => None,
    };

    let mut interfaces = Vec::with_capacity(decl.interfaces.len());
    for name in &decl.interfaces {
        let obj = stack.lookup(name).ok_or_else(|| {
            RuntimeError::new(
                ErrorCode::SymbolNotFound,
                format!("undefined symbol '{name}'"),
            )
        })?;
        if obj.kind() != Kind::DeclIface {
            return Err(RuntimeError::new(
                ErrorCode::IncompatibleType,
                "only interfaces can be implemented",
            ));
        }
        interfaces.push(obj);
    }

    let class = DeclClass::new(&decl.name, stack, base, interfaces, decl.is_abstract)?;
    let class_obj = ctx.factory.new_decl_class(class);
    let Repr::DeclType(class) = &class_obj.repr else {
        unreachable!("just constructed as a declared class");
    };

    for member in &decl.members {
        match member {
            ClassMember::Method { decl: method, is_static } => {
                // non-static methods take the implicit leading self slot
                let mut specs: Vec<ParamSpec> = Vec::with_capacity(method.params.len() + 1);
                if !is_static {
                    specs.push(ParamSpec {
                        name: "self".to_string(),
                        default: None,
                    });
                }
                specs.extend(eval_param_specs(ctx, stack, &method.params)?);
                let func = ctx.factory.new_declared_func(
                    Some(method.name.clone()),
                    specs,
                    method.variadic.clone(),
                    Rc::new(method.block.clone()),
                    class.scope().clone(),
                    *is_static,
                );
                class.register_method(&method.name, func)?;
            }
            ClassMember::Abstract(sig) => {
                class.add_abstract_method(&sig.name, abstract_method(sig))?;
            }
        }
    }

    class.check_abstract_methods()?;
    class.check_interfaces()?;

    stack.insert_top(&decl.name, class_obj);
    Ok(Flow::Normal)
}

fn abstract_method(sig: &MethodSig) -> AbstractMethod {
    AbstractMethod {
        num_params: sig.num_params,
        num_default_params: sig.num_default_params,
        variadic: sig.variadic,
    }
}

fn exec_interface_decl(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    decl: &InterfaceDecl,
) -> Result<Flow, RuntimeError> {
    let mut bases = Vec::with_capacity(decl.bases.len());
    for name in &decl.bases {
        let obj = stack.lookup(name).ok_or_else(|| {
            RuntimeError::new(
                ErrorCode::SymbolNotFound,
                format!("undefined symbol '{name}'"),
            )
        })?;
        if obj.kind() != Kind::DeclIface {
            return Err(RuntimeError::new(
                ErrorCode::IncompatibleType,
                format!("base of interface '{}' must be an interface", decl.name),
            ));
        }
        bases.push(obj);
    }

    let methods = decl
        .methods
        .iter()
        .map(|sig| (sig.name.clone(), abstract_method(sig)))
        .collect();
    let iface = Interface::new(&decl.name, &bases, methods)?;
    stack.insert_top(&decl.name, ctx.factory.new_interface(iface));
    Ok(Flow::Normal)
}

fn exec_import(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    import: &Import,
) -> Result<Flow, RuntimeError> {
    let program = ctx.shell.loader().load(&import.module, import.is_path)?;
    tracing::debug!(module = %import.module, "importing module");
    let module_stack = Interpreter::exec_module(ctx, &program)?;

    let bind_name = match &import.alias {
        Some(alias) => alias.clone(),
        None => module_stem(&import.module),
    };
    let module = ctx.factory.new_module(&bind_name, module_stack);
    stack.insert_top(&bind_name, module);
    Ok(Flow::Normal)
}

/// Derive the binding name for an unaliased import from its module string.
fn module_stem(module: &str) -> String {
    let base = module.rsplit('/').next().unwrap_or(module);
    base.strip_suffix(".csh").unwrap_or(base).to_string()
}
