//! The resumable tree-walking dispatch loop (spec.md §4.4).
//!
//! `advance` performs exactly one step on the session's top stack frame,
//! mirroring the teacher's `ExecutionEngine::execute_*` dispatch split
//! across `interpreter/execution_engine.rs`/`control_flow.rs`. Frames
//! address nodes by `(unit id, root, index path)` (see
//! `crate::evaluator::frame`) rather than by pointer, so looking up "the
//! node this frame is evaluating" always goes through the `Environment`.

use crate::ast::{ExecContextTarget, LiteralKind, Node, NodeKind, Resolution};
use crate::environment::{Context, EnvLookup, LinkageTarget};
use crate::evaluator::errors::EvalError;
use crate::evaluator::frame::{CallTarget, NodeAddress, PathStep, RootRef, WaitState};
use crate::evaluator::session::Session;
use crate::evaluator::stdlib;
use crate::parser::precedence::OperatorKind;
use crate::value::{Binding, Value};

/// Resolves a frame's address to the node it names. `None` means a stale
/// address (the unit was uninstalled out from under a running session,
/// or a malformed path) — callers treat this as a `MysteriousState` error.
pub fn node_at<'a>(env: &'a dyn EnvLookup, addr: &NodeAddress) -> Option<&'a Node> {
    let unit = env.unit(&addr.unit_id)?;
    let mut node = match &addr.root {
        RootRef::Body => &unit.body.body,
        RootRef::Function(name) => &unit.find_function(name)?.body,
    };
    for step in &addr.path {
        node = match step {
            PathStep::Child(i) => node.children.get(*i)?,
            PathStep::WaitAmount => match &node.kind {
                NodeKind::Wait { amount: Some(b), .. } => b.as_ref(),
                _ => return None,
            },
            PathStep::Argument(i) => match &node.kind {
                NodeKind::Symbol { arguments, .. } => arguments.get(*i)?.value_node.as_deref()?,
                _ => return None,
            },
        };
    }
    Some(node)
}

fn push(session: &mut Session, addr: NodeAddress) {
    session.stack.push(crate::evaluator::frame::StackFrame::new(addr));
}

/// Pops the current frame with `value`, handing it to the new top (if
/// any) according to that frame's `accumulator` flag, or finishing the
/// session if the stack is now empty.
fn finish(session: &mut Session, value: Value) {
    session.stack.pop();
    match session.stack.last_mut() {
        Some(parent) => {
            if parent.accumulator {
                parent.child_results.push(value);
            } else {
                parent.child_results = vec![value];
            }
            parent.child_index += 1;
        }
        None => {
            session.result_value = value;
            session.finished = true;
        }
    }
}

fn raise(session: &mut Session, err: EvalError) {
    session.errors.push(err.into());
}

fn literal_value(kind: &LiteralKind) -> Value {
    match kind {
        LiteralKind::Int(i) => Value::int(*i),
        LiteralKind::Float(f) => Value::float(*f),
        LiteralKind::Bool(b) => Value::Bool(*b),
        LiteralKind::Str(s) => Value::string(s.clone()),
    }
}

/// Sequential "children in order, result = last child" dispatch shared by
/// `Block`, `Else`, and `Case` (spec.md §4.4: "Else/Case: trivial
/// container dispatch").
fn advance_sequence(session: &mut Session, addr: &NodeAddress, children_len: usize) {
    let frame = session.top().unwrap();
    if frame.child_index < children_len {
        let idx = frame.child_index;
        push(session, addr.child(idx));
    } else {
        let value = session.top().unwrap().child_results.last().cloned().unwrap_or(Value::Null);
        finish(session, value);
    }
}

fn apply_operator(op: &str, unary: bool, operands: &[Value], session_id: u64) -> Value {
    let Ok(kind) = OperatorKind::try_from(op) else {
        return Value::Null;
    };

    if unary {
        let v = &operands[0];
        return match kind {
            OperatorKind::Not => Value::Bool(!v.as_bool()),
            OperatorKind::Sub => {
                if matches!(v, Value::Float(_)) {
                    Value::float(-v.as_float())
                } else {
                    Value::int(-v.as_int())
                }
            }
            OperatorKind::Add => v.clone(),
            _ => Value::Null,
        };
    }

    let (a, b) = (&operands[0], &operands[1]);
    match kind {
        OperatorKind::Add | OperatorKind::Sub | OperatorKind::Mul | OperatorKind::Div => {
            let is_float = matches!(a, Value::Float(_)) || matches!(b, Value::Float(_));
            if kind == OperatorKind::Div {
                if is_float {
                    let (af, bf) = (a.as_float(), b.as_float());
                    if bf == 0.0 {
                        tracing::warn!(session_id, "float divide by zero");
                        return Value::int(0);
                    }
                    Value::float(af / bf)
                } else {
                    let (ai, bi) = (a.as_int(), b.as_int());
                    if bi == 0 {
                        tracing::warn!(session_id, "integer divide by zero");
                        return Value::int(0);
                    }
                    Value::int(ai / bi)
                }
            } else if is_float {
                let (af, bf) = (a.as_float(), b.as_float());
                Value::float(match kind {
                    OperatorKind::Add => af + bf,
                    OperatorKind::Sub => af - bf,
                    OperatorKind::Mul => af * bf,
                    _ => unreachable!(),
                })
            } else {
                let (ai, bi) = (a.as_int(), b.as_int());
                Value::int(match kind {
                    OperatorKind::Add => ai + bi,
                    OperatorKind::Sub => ai - bi,
                    OperatorKind::Mul => ai * bi,
                    _ => unreachable!(),
                })
            }
        }
        OperatorKind::Eq => Value::Bool(a.loose_eq(b)),
        OperatorKind::Ne => Value::Bool(!a.loose_eq(b)),
        OperatorKind::Lt => Value::Bool(a.as_float() < b.as_float()),
        OperatorKind::Le => Value::Bool(a.as_float() <= b.as_float()),
        OperatorKind::Gt => Value::Bool(a.as_float() > b.as_float()),
        OperatorKind::Ge => Value::Bool(a.as_float() >= b.as_float()),
        OperatorKind::And => Value::Bool(a.as_bool() && b.as_bool()),
        OperatorKind::Or => Value::Bool(a.as_bool() || b.as_bool()),
        OperatorKind::Not => Value::Null,
    }
}

/// True for the symbol resolutions that dispatch through the call path
/// (push argument frames, then a callee body or a host action) rather
/// than the plain value-read path.
fn is_call_resolution(res: &Resolution, env: &dyn EnvLookup) -> bool {
    match res {
        Resolution::InnerFunction(_) | Resolution::RootFunction(_) => true,
        Resolution::Linkage(q) => env.linkage(q).map(|l| l.is_function).unwrap_or(false),
        Resolution::External(name) => env.external(name).map(|e| e.is_function).unwrap_or(false),
        _ => false,
    }
}

fn resolve_call_target(res: &Resolution, addr: &NodeAddress, env: &dyn EnvLookup) -> Option<CallTarget> {
    match res {
        Resolution::InnerFunction(name) => Some(CallTarget::Function { unit_id: addr.unit_id.clone(), name: name.clone() }),
        Resolution::RootFunction(name) => Some(CallTarget::Function { unit_id: addr.unit_id.clone(), name: name.clone() }),
        Resolution::Linkage(q) => {
            let lk = env.linkage(q)?;
            match &lk.target {
                LinkageTarget::Function(name) => Some(CallTarget::Function { unit_id: lk.owner_unit_id.clone(), name: name.clone() }),
                LinkageTarget::Variable(_) => None,
            }
        }
        Resolution::External(name) => env.external(name).cloned().map(CallTarget::External),
        _ => None,
    }
}

/// Drives `session` forward until it hits one of the four suspension
/// points (spec.md §5): transitioning, an unfinished wait, errors, or an
/// empty stack. Called once by the Conductor per `advance(ctx)` cycle for
/// each live session (spec.md §4.4 "the run loop").
pub fn run(env: &dyn EnvLookup, ctx: &dyn Context, session: &mut Session) {
    while session.is_runnable() {
        advance(env, ctx, session);
    }
}

/// Runs one step of the node at the top of `session`'s stack.
pub fn advance(env: &dyn EnvLookup, ctx: &dyn Context, session: &mut Session) {
    let addr = match session.stack.last() {
        Some(f) => f.addr.clone(),
        None => return,
    };
    let node = match node_at(env, &addr) {
        Some(n) => n,
        None => {
            raise(session, EvalError::MysteriousState);
            return;
        }
    };

    match &node.kind {
        NodeKind::Literal(lit) => {
            let v = literal_value(lit);
            finish(session, v);
        }

        NodeKind::Block { .. } => advance_sequence(session, &addr, node.children.len()),

        NodeKind::Else | NodeKind::Case => advance_sequence(session, &addr, node.children.len()),

        NodeKind::Symbol { resolution, arguments } => {
            if is_call_resolution(resolution, env) {
                advance_call(env, ctx, session, &addr, resolution, arguments);
            } else {
                advance_symbol_read(env, ctx, session, resolution, &node.token.value);
            }
        }

        NodeKind::VariableDef { name, .. } => {
            let has_init = !node.children.is_empty();
            let frame = session.top().unwrap();
            if has_init && frame.child_index == 0 {
                push(session, addr.child(0));
                return;
            }
            let value = session.top().unwrap().child_results.last().cloned().unwrap_or(Value::Null);
            let name = name.clone();
            if !bind_in_nearest_block(session, &name, value) {
                raise(session, EvalError::VariableDefOutsideBlock);
                return;
            }
            finish(session, Value::Null);
        }

        NodeKind::FunctionDef { .. } => finish(session, Value::Null),

        NodeKind::Assignment => advance_assignment(env, ctx, session, &addr, node),

        NodeKind::Reference { position } => {
            let v = session.find_positional(*position).map(|b| b.value.clone()).unwrap_or(Value::Null);
            finish(session, v);
        }

        NodeKind::Operator { op, unary } => {
            let arity = if *unary { 1 } else { 2 };
            let frame = session.top().unwrap();
            if frame.child_index < arity {
                let idx = frame.child_index;
                session.top().unwrap().accumulator = true;
                push(session, addr.child(idx));
                return;
            }
            let operands = session.top().unwrap().child_results.clone();
            let value = apply_operator(op, *unary, &operands, session.id);
            finish(session, value);
        }

        NodeKind::If => advance_if(session, &addr, node),

        NodeKind::Wait { wait_type, unit, amount } => {
            advance_wait(ctx, session, &addr, *wait_type, unit.clone(), amount.is_some());
        }

        NodeKind::In => advance_in(session, &addr, node),

        NodeKind::Context { target } => {
            if session.current_context != *target {
                session.transitioning = true;
            }
            finish(session, Value::Null);
        }

        NodeKind::End => {
            session.result_value = Value::string("end");
            session.stack.clear();
            session.finished = true;
        }

        NodeKind::Echo { trace } => {
            let has_arg = !node.children.is_empty();
            let frame = session.top().unwrap();
            if has_arg && frame.child_index == 0 {
                push(session, addr.child(0));
                return;
            }
            let value = session.top().unwrap().child_results.last().cloned().unwrap_or(Value::Null);
            let text = value.to_display_string();
            ctx.echo(&text);
            if *trace {
                tracing::info!(session_id = session.id, trace = %text, "script trace");
            } else {
                tracing::debug!(session_id = session.id, echo = %text, "script echo");
            }
            finish(session, Value::Null);
        }

        NodeKind::AddResult => {
            let has_arg = !node.children.is_empty();
            let frame = session.top().unwrap();
            if has_arg && frame.child_index == 0 {
                push(session, addr.child(0));
                return;
            }
            let value = session.top().unwrap().child_results.last().cloned().unwrap_or(Value::Null);
            session.results.push(value.clone());
            finish(session, value);
        }
    }
}

/// `var`/`variable` binds into the nearest enclosing `Block` frame below
/// the one currently running the def (spec.md §4.4 "create a binding in
/// the nearest enclosing block").
fn bind_in_nearest_block(session: &mut Session, name: &str, value: Value) -> bool {
    if session.stack.len() < 2 {
        return false;
    }
    let idx = session.stack.len() - 2;
    session.stack[idx].bindings.push(Binding::new(name, value));
    true
}

fn advance_if(session: &mut Session, addr: &NodeAddress, node: &Node) {
    let frame = session.top().unwrap();
    match frame.phase {
        0 => {
            push(session, addr.child(0));
            session.top().unwrap().phase = 1;
        }
        1 => {
            let cond = session.top().unwrap().child_results.last().cloned().unwrap_or(Value::Null);
            session.top().unwrap().phase = 2;
            if cond.as_bool() {
                push(session, addr.child(1));
            } else if node.children.len() > 2 {
                push(session, addr.child(2));
            } else {
                finish(session, Value::Null);
            }
        }
        _ => {
            let value = session.top().unwrap().child_results.last().cloned().unwrap_or(Value::Null);
            finish(session, value);
        }
    }
}

fn start_wait(ctx: &dyn Context, session: &mut Session, wait_type: crate::ast::WaitType, unit: crate::ast::WaitUnit, amount: i64) {
    let mut ws = WaitState::new(wait_type, unit, amount);
    ctx.wait(&mut ws);
    ws.active = true;
    session.top().unwrap().wait = Some(ws);
}

fn advance_wait(ctx: &dyn Context, session: &mut Session, addr: &NodeAddress, wait_type: crate::ast::WaitType, unit: crate::ast::WaitUnit, has_amount: bool) {
    let frame = session.top().unwrap();
    if has_amount && frame.child_index == 0 && frame.phase == 0 {
        push(session, addr.step(PathStep::WaitAmount));
        return;
    }
    let amount = session.top().unwrap().child_results.last().map(Value::as_int).unwrap_or(0);

    match session.top().unwrap().phase {
        0 | 1 => {
            if session.current_context != ExecContextTarget::Kernel {
                if session.top().unwrap().phase == 1 {
                    raise(session, EvalError::WaitTransitionDenied);
                    return;
                }
                session.transitioning = true;
                session.top().unwrap().phase = 1;
                return;
            }
            start_wait(ctx, session, wait_type, unit, amount);
            session.top().unwrap().phase = 2;
        }
        _ => {
            let finished = session.top().unwrap().wait.as_ref().map(|w| w.finished).unwrap_or(true);
            if finished {
                finish(session, Value::Null);
            }
        }
    }
}

fn advance_in(session: &mut Session, addr: &NodeAddress, node: &Node) {
    if node.children.is_empty() {
        finish(session, Value::Null);
        return;
    }
    let n_scopes = node.children.len() - 1;
    let body_idx = node.children.len() - 1;
    let frame = session.top().unwrap();

    if frame.child_index < n_scopes {
        let idx = frame.child_index;
        session.top().unwrap().accumulator = true;
        push(session, addr.child(idx));
        return;
    }

    let done_iters = frame.child_index - n_scopes;
    if done_iters > 0 {
        session.scope_stack.pop();
    }

    let scope_ids: Vec<i64> = session.top().unwrap().child_results[..n_scopes].iter().map(Value::as_int).collect();
    if done_iters < scope_ids.len() {
        session.scope_stack.push(scope_ids[done_iters]);
        push(session, addr.child(body_idx));
    } else {
        let value = session.top().unwrap().child_results.last().cloned().unwrap_or(Value::Null);
        finish(session, value);
    }
}

fn advance_assignment(env: &dyn EnvLookup, ctx: &dyn Context, session: &mut Session, addr: &NodeAddress, node: &Node) {
    let frame = session.top().unwrap();
    if frame.child_index == 0 {
        push(session, addr.child(1));
        return;
    }

    let rhs = session.top().unwrap().child_results.last().cloned().unwrap_or(Value::Null);
    let lhs = &node.children[0];
    let NodeKind::Symbol { resolution, .. } = &lhs.kind else {
        raise(session, EvalError::AssignToNonVariable);
        return;
    };

    match resolution {
        Resolution::FunctionArgument(pos) => {
            if !session.set_binding_by_position(*pos, rhs.clone()) {
                raise(session, EvalError::AssignToNonVariable);
                return;
            }
        }
        Resolution::InnerVariable(name) => {
            if !session.set_binding(name, rhs.clone()) {
                if let Some(var) = session.unit.find_variable(name) {
                    var.set(session.current_scope(), rhs.clone());
                } else {
                    raise(session, EvalError::AssignToNonVariable);
                    return;
                }
            }
        }
        Resolution::StaticVariable(name) => {
            if let Some(var) = session.unit.find_variable(name) {
                var.set(session.current_scope(), rhs.clone());
            } else {
                raise(session, EvalError::AssignToNonVariable);
                return;
            }
        }
        Resolution::Linkage(q) => {
            let target = env.linkage(q).map(|l| l.target.clone());
            match target {
                Some(LinkageTarget::Variable(vname)) => {
                    let owner = env.linkage(q).unwrap().owner_unit_id.clone();
                    if let Some(unit) = env.unit(&owner) {
                        if let Some(var) = unit.find_variable(&vname) {
                            var.set(session.current_scope(), rhs.clone());
                        }
                    }
                }
                _ => {
                    raise(session, EvalError::AssignToNonVariable);
                    return;
                }
            }
        }
        Resolution::External(name) => match env.external(name) {
            Some(ext) if !ext.is_function => {
                if let Err(e) = ctx.action(ext, std::slice::from_ref(&rhs), session.current_scope()) {
                    raise(session, EvalError::ContextAction(e));
                    return;
                }
            }
            _ => {
                raise(session, EvalError::AssignToNonVariable);
                return;
            }
        },
        _ => {
            raise(session, EvalError::AssignToNonVariable);
            return;
        }
    }

    finish(session, rhs);
}

fn advance_symbol_read(env: &dyn EnvLookup, ctx: &dyn Context, session: &mut Session, resolution: &Resolution, raw_name: &str) {
    match resolution {
        Resolution::Unresolved => finish(session, Value::string(raw_name.to_string())),
        Resolution::Keyword(name) => finish(session, Value::Keyword(name.clone())),
        Resolution::UsageArgument(name) => finish(session, Value::Keyword(name.clone())),
        Resolution::FunctionArgument(pos) => {
            let v = session.find_positional(*pos).map(|b| b.value.clone()).unwrap_or(Value::Null);
            finish(session, v);
        }
        Resolution::InnerVariable(name) | Resolution::StaticVariable(name) => {
            if let Some(b) = session.find_binding(name) {
                let v = b.value.clone();
                finish(session, v);
            } else if let Some(var) = session.unit.find_variable(name) {
                let v = var.get(session.current_scope());
                finish(session, v);
            } else {
                finish(session, Value::Null);
            }
        }
        Resolution::External(name) => match env.external(name) {
            Some(ext) => match ctx.query(ext, session.current_scope()) {
                Ok(v) => finish(session, v),
                Err(e) => raise(session, EvalError::ContextQuery(e)),
            },
            None => finish(session, Value::Null),
        },
        Resolution::StandardLibrary(id) => {
            let v = stdlib::invoke(*id, ctx, session);
            finish(session, v);
        }
        Resolution::Linkage(q) => {
            let resolved = env.linkage(q).and_then(|lk| match &lk.target {
                LinkageTarget::Variable(vname) => env.unit(&lk.owner_unit_id).and_then(|u| u.find_variable(vname)).map(|v| v.get(session.current_scope())),
                LinkageTarget::Function(_) => None,
            });
            finish(session, resolved.unwrap_or(Value::Null));
        }
        Resolution::InnerFunction(_) | Resolution::RootFunction(_) => {
            raise(session, EvalError::UnresolvedCall(raw_name.to_string()));
        }
    }
}

fn advance_call(
    env: &dyn EnvLookup,
    ctx: &dyn Context,
    session: &mut Session,
    addr: &NodeAddress,
    resolution: &Resolution,
    arguments: &[crate::ast::CallArgument],
) {
    let frame = session.top().unwrap();

    if frame.child_index < arguments.len() {
        let i = frame.child_index;
        if arguments[i].value_node.is_some() {
            session.top().unwrap().accumulator = true;
            push(session, addr.step(PathStep::Argument(i)));
        } else {
            let f = session.top().unwrap();
            f.child_results.push(Value::Null);
            f.child_index += 1;
        }
        return;
    }

    if session.top().unwrap().phase == 0 {
        let bindings: Vec<Binding> = arguments
            .iter()
            .zip(session.top().unwrap().child_results.iter())
            .map(|(a, v)| Binding::positional(a.name.clone(), v.clone(), a.position))
            .collect();

        let target = match resolve_call_target(resolution, addr, env) {
            Some(t) => t,
            None => {
                raise(session, EvalError::UnresolvedCall(String::new()));
                return;
            }
        };

        match target {
            CallTarget::Function { unit_id, name } => {
                session.top().unwrap().phase = 1;
                session.top().unwrap().call_target = Some(CallTarget::Function { unit_id: unit_id.clone(), name: name.clone() });
                let body_addr = NodeAddress::root(unit_id, RootRef::Function(name));
                let mut body_frame = crate::evaluator::frame::StackFrame::new(body_addr);
                body_frame.bindings = bindings;
                session.stack.push(body_frame);
            }
            CallTarget::External(ext) => {
                let args: Vec<Value> = session.top().unwrap().child_results.clone();
                match ctx.action(&ext, &args, session.current_scope()) {
                    Ok((value, _event)) => finish(session, value),
                    Err(e) => raise(session, EvalError::ContextAction(e)),
                }
            }
        }
        return;
    }

    let value = session.top().unwrap().child_results.last().cloned().unwrap_or(Value::Null);
    finish(session, value);
}
