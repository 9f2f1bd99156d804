// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async tree-walking interpreter.
//!
//! Evaluation is an async function (boxed-future recursion), executing as
//! exactly one task — the VM thread. User code is atomic between `await`
//! expressions: the only suspension points are promise waits and the
//! blocking host calls behind them, so script variables never see
//! concurrent mutation. Cancellation is checked at statement boundaries
//! and inside every wait, surfacing as an interrupt that `try`/`catch`
//! cannot swallow.

use crate::ast::*;
use crate::env::Env;
use crate::promise::Promise;
use crate::token::Pos;
use crate::value::{Closure, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Non-local control flow.
#[derive(Debug)]
pub enum Flow {
    Return(Value),
    Break,
    Continue,
    /// A thrown (catchable) value.
    Throw(Value),
    /// VM interrupt: cancellation, assertion failure, YAML failure.
    /// Propagates through `catch` untouched.
    Interrupt(String),
}

pub type Eval<T> = Result<T, Flow>;

/// Marker property carried by values that must interrupt rather than throw.
const INTERRUPT_MARKER: &str = "__kiln_interrupt";

/// Build a value that, when thrown from a native, interrupts the VM.
pub fn interrupt_value(message: impl Into<String>) -> Value {
    let message = message.into();
    let obj = Value::error(&message);
    if let Value::Object(map) = &obj {
        map.lock().insert(INTERRUPT_MARKER.to_string(), Value::Bool(true));
    }
    obj
}

fn as_interrupt(value: &Value) -> Option<String> {
    if let Value::Object(map) = value {
        let map = map.lock();
        if matches!(map.get(INTERRUPT_MARKER), Some(Value::Bool(true))) {
            let message = match map.get("message") {
                Some(Value::Str(s)) => s.clone(),
                _ => "interrupted".to_string(),
            };
            return Some(message);
        }
    }
    None
}

/// The evaluator. Cheap to clone; carries only the cancel context.
#[derive(Clone)]
pub struct Interp {
    pub ctx: CancellationToken,
}

type BoxedEval<'a, T> = Pin<Box<dyn Future<Output = Eval<T>> + Send + 'a>>;

impl Interp {
    pub fn new(ctx: CancellationToken) -> Self {
        Self { ctx }
    }

    fn check_interrupt(&self) -> Eval<()> {
        if self.ctx.is_cancelled() {
            Err(Flow::Interrupt("context cancelled".to_string()))
        } else {
            Ok(())
        }
    }

    /// Execute statements in `env`. A `return` bubbles as flow.
    pub fn exec_block<'a>(&'a self, env: &'a Env, stmts: &'a [Stmt]) -> BoxedEval<'a, ()> {
        Box::pin(async move {
            for stmt in stmts {
                self.exec_stmt(env, stmt).await?;
            }
            Ok(())
        })
    }

    fn exec_stmt<'a>(&'a self, env: &'a Env, stmt: &'a Stmt) -> BoxedEval<'a, ()> {
        Box::pin(async move {
            self.check_interrupt()?;
            match stmt {
                Stmt::Let { pattern, value, constant, pos } => {
                    let value = match value {
                        Some(expr) => self.eval(env, expr).await?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(env, pattern, value, *constant, *pos)
                }
                Stmt::Assign { target, op, value, pos } => {
                    let value = self.eval(env, value).await?;
                    self.assign_target(env, target, *op, value, *pos).await
                }
                Stmt::Expr(expr) => {
                    self.eval(env, expr).await?;
                    Ok(())
                }
                Stmt::If { cond, then, els } => {
                    if self.eval(env, cond).await?.truthy() {
                        self.exec_block(&env.child(), then).await
                    } else if let Some(els) = els {
                        self.exec_block(&env.child(), els).await
                    } else {
                        Ok(())
                    }
                }
                Stmt::While { cond, body } => {
                    while self.eval(env, cond).await?.truthy() {
                        match self.exec_block(&env.child(), body).await {
                            Ok(()) => {}
                            Err(Flow::Break) => break,
                            Err(Flow::Continue) => continue,
                            Err(flow) => return Err(flow),
                        }
                    }
                    Ok(())
                }
                Stmt::ForOf { pattern, iterable, body, pos } => {
                    let iterable = self.eval(env, iterable).await?;
                    let items: Vec<Value> = match &iterable {
                        Value::Array(items) => items.lock().clone(),
                        Value::Str(s) => {
                            s.chars().map(|c| Value::string(c.to_string())).collect()
                        }
                        other => {
                            return Err(throw_at(
                                *pos,
                                format!("{} is not iterable", other.type_name()),
                            ))
                        }
                    };
                    for item in items {
                        let scope = env.child();
                        self.bind_pattern(&scope, pattern, item, false, *pos)?;
                        match self.exec_block(&scope, body).await {
                            Ok(()) => {}
                            Err(Flow::Break) => break,
                            Err(Flow::Continue) => continue,
                            Err(flow) => return Err(flow),
                        }
                    }
                    Ok(())
                }
                Stmt::Return(value) => {
                    let value = match value {
                        Some(expr) => self.eval(env, expr).await?,
                        None => Value::Undefined,
                    };
                    Err(Flow::Return(value))
                }
                Stmt::Throw(expr, _pos) => {
                    let value = self.eval(env, expr).await?;
                    Err(Flow::Throw(value))
                }
                Stmt::Try { body, param, handler, finalizer } => {
                    let result = self.exec_block(&env.child(), body).await;
                    let result = match result {
                        Err(Flow::Throw(thrown)) => {
                            if let Some(handler) = handler {
                                let scope = env.child();
                                if let Some(param) = param {
                                    scope.declare(param, thrown, false);
                                }
                                self.exec_block(&scope, handler).await
                            } else {
                                Err(Flow::Throw(thrown))
                            }
                        }
                        other => other,
                    };
                    if let Some(finalizer) = finalizer {
                        self.exec_block(&env.child(), finalizer).await?;
                    }
                    result
                }
                Stmt::Function { func, .. } => {
                    let closure = Arc::new(Closure { func: func.clone(), env: env.clone() });
                    if let Some(name) = &func.name {
                        env.declare(name, Value::Closure(closure), false);
                    }
                    Ok(())
                }
                Stmt::ExportBinding { name, value, .. } => {
                    let value = self.eval(env, value).await?;
                    env.declare(name, value, true);
                    Ok(())
                }
                Stmt::Break => Err(Flow::Break),
                Stmt::Continue => Err(Flow::Continue),
            }
        })
    }

    fn bind_pattern(
        &self,
        env: &Env,
        pattern: &Pattern,
        value: Value,
        constant: bool,
        pos: Pos,
    ) -> Eval<()> {
        match pattern {
            Pattern::Ident(name) => {
                env.declare(name, value, constant);
                Ok(())
            }
            Pattern::Array(names) => {
                let Value::Array(items) = &value else {
                    return Err(throw_at(
                        pos,
                        format!("cannot destructure {} as an array", value.type_name()),
                    ));
                };
                let items = items.lock();
                for (i, name) in names.iter().enumerate() {
                    if let Some(name) = name {
                        env.declare(
                            name,
                            items.get(i).cloned().unwrap_or(Value::Undefined),
                            constant,
                        );
                    }
                }
                Ok(())
            }
        }
    }

    async fn assign_target(
        &self,
        env: &Env,
        target: &Target,
        op: AssignOp,
        value: Value,
        pos: Pos,
    ) -> Eval<()> {
        let value = match op {
            AssignOp::Set => value,
            AssignOp::Add | AssignOp::Sub => {
                let current = self.read_target(env, target, pos).await?;
                let bin = if op == AssignOp::Add { BinaryOp::Add } else { BinaryOp::Sub };
                binary_op(bin, &current, &value, pos)?
            }
        };
        match target {
            Target::Ident(name) => {
                env.assign(name, value).map_err(|e| throw_at(pos, e))
            }
            Target::Member { object, property } => {
                let object = self.eval(env, object).await?;
                match object {
                    Value::Object(map) => {
                        map.lock().insert(property.clone(), value);
                        Ok(())
                    }
                    other => Err(throw_at(
                        pos,
                        format!("cannot set property on {}", other.type_name()),
                    )),
                }
            }
            Target::Index { object, index } => {
                let object = self.eval(env, object).await?;
                let index = self.eval(env, index).await?;
                match (&object, &index) {
                    (Value::Array(items), Value::Number(n)) => {
                        let mut items = items.lock();
                        let i = *n as usize;
                        if i >= items.len() {
                            items.resize(i + 1, Value::Undefined);
                        }
                        items[i] = value;
                        Ok(())
                    }
                    (Value::Object(map), Value::Str(key)) => {
                        map.lock().insert(key.clone(), value);
                        Ok(())
                    }
                    _ => Err(throw_at(
                        pos,
                        format!(
                            "cannot index {} with {}",
                            object.type_name(),
                            index.type_name()
                        ),
                    )),
                }
            }
        }
    }

    async fn read_target(&self, env: &Env, target: &Target, pos: Pos) -> Eval<Value> {
        match target {
            Target::Ident(name) => env
                .get(name)
                .ok_or_else(|| throw_at(pos, format!("{:?} is not defined", name))),
            Target::Member { object, property } => {
                let object = self.eval(env, object).await?;
                member_get(&object, property, pos)
            }
            Target::Index { object, index } => {
                let object = self.eval(env, object).await?;
                let index = self.eval(env, index).await?;
                index_get(&object, &index, pos)
            }
        }
    }

    pub fn eval<'a>(&'a self, env: &'a Env, expr: &'a Expr) -> BoxedEval<'a, Value> {
        Box::pin(async move {
            match expr {
                Expr::Number(n) => Ok(Value::Number(*n)),
                Expr::Str(s) => Ok(Value::string(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Null => Ok(Value::Null),
                Expr::Undefined => Ok(Value::Undefined),
                Expr::Template(chunks) => {
                    let mut out = String::new();
                    for chunk in chunks {
                        match chunk {
                            TemplateChunk::Literal(text) => out.push_str(text),
                            TemplateChunk::Expr(expr) => {
                                out.push_str(&self.eval(env, expr).await?.render());
                            }
                        }
                    }
                    Ok(Value::string(out))
                }
                Expr::Ident(name, pos) => env
                    .get(name)
                    .ok_or_else(|| throw_at(*pos, format!("{:?} is not defined", name))),
                Expr::Array(items) => {
                    let mut out = Vec::new();
                    for item in items {
                        match item {
                            Arg::Item(expr) => out.push(self.eval(env, expr).await?),
                            Arg::Spread(expr) => {
                                let spread = self.eval(env, expr).await?;
                                match spread {
                                    Value::Array(inner) => out.extend(inner.lock().clone()),
                                    other => {
                                        return Err(Flow::Throw(Value::error(format!(
                                            "cannot spread {}",
                                            other.type_name()
                                        ))))
                                    }
                                }
                            }
                        }
                    }
                    Ok(Value::array(out))
                }
                Expr::Object(props) => {
                    let mut map = indexmap::IndexMap::new();
                    for prop in props {
                        match prop {
                            Prop::Pair(key, expr) => {
                                map.insert(key.clone(), self.eval(env, expr).await?);
                            }
                            Prop::Shorthand(name) => {
                                let value = env.get(name).ok_or_else(|| {
                                    Flow::Throw(Value::error(format!(
                                        "{:?} is not defined",
                                        name
                                    )))
                                })?;
                                map.insert(name.clone(), value);
                            }
                            Prop::Spread(expr) => {
                                let spread = self.eval(env, expr).await?;
                                match spread {
                                    Value::Object(inner) => {
                                        for (k, v) in inner.lock().iter() {
                                            map.insert(k.clone(), v.clone());
                                        }
                                    }
                                    Value::Undefined | Value::Null => {}
                                    other => {
                                        return Err(Flow::Throw(Value::error(format!(
                                            "cannot spread {} into an object",
                                            other.type_name()
                                        ))))
                                    }
                                }
                            }
                        }
                    }
                    Ok(Value::object(map))
                }
                Expr::Unary { op, expr } => {
                    let value = self.eval(env, expr).await?;
                    match op {
                        UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                        UnaryOp::Neg => match value {
                            Value::Number(n) => Ok(Value::Number(-n)),
                            other => Err(Flow::Throw(Value::error(format!(
                                "cannot negate {}",
                                other.type_name()
                            )))),
                        },
                    }
                }
                Expr::Binary { op, lhs, rhs, pos } => {
                    let lhs = self.eval(env, lhs).await?;
                    let rhs = self.eval(env, rhs).await?;
                    binary_op(*op, &lhs, &rhs, *pos)
                }
                Expr::Logical { op, lhs, rhs } => {
                    let lhs = self.eval(env, lhs).await?;
                    match op {
                        LogicalOp::And => {
                            if lhs.truthy() {
                                self.eval(env, rhs).await
                            } else {
                                Ok(lhs)
                            }
                        }
                        LogicalOp::Or => {
                            if lhs.truthy() {
                                Ok(lhs)
                            } else {
                                self.eval(env, rhs).await
                            }
                        }
                        LogicalOp::Coalesce => {
                            if matches!(lhs, Value::Undefined | Value::Null) {
                                self.eval(env, rhs).await
                            } else {
                                Ok(lhs)
                            }
                        }
                    }
                }
                Expr::Ternary { cond, then, els } => {
                    if self.eval(env, cond).await?.truthy() {
                        self.eval(env, then).await
                    } else {
                        self.eval(env, els).await
                    }
                }
                Expr::Member { object, property, pos } => {
                    let object = self.eval(env, object).await?;
                    member_get(&object, property, *pos)
                }
                Expr::Index { object, index, pos } => {
                    let object = self.eval(env, object).await?;
                    let index = self.eval(env, index).await?;
                    index_get(&object, &index, *pos)
                }
                Expr::Call { callee, args, pos } => self.eval_call(env, callee, args, *pos).await,
                Expr::Func(func) => Ok(Value::Closure(Arc::new(Closure {
                    func: (**func).clone(),
                    env: env.clone(),
                }))),
                Expr::Await(expr, pos) => {
                    let value = self.eval(env, expr).await?;
                    self.await_value(value, *pos).await
                }
            }
        })
    }

    /// Await a value: promises suspend (flattening chains), everything
    /// else passes through.
    pub async fn await_value(&self, value: Value, _pos: Pos) -> Eval<Value> {
        let mut value = value;
        loop {
            let Value::Promise(promise) = value else { return Ok(value) };
            tokio::select! {
                settled = promise.wait() => match settled {
                    Ok(next) => value = next,
                    Err(thrown) => {
                        return match as_interrupt(&thrown) {
                            Some(message) => Err(Flow::Interrupt(message)),
                            None => Err(Flow::Throw(thrown)),
                        }
                    }
                },
                _ = self.ctx.cancelled() => {
                    return Err(Flow::Interrupt("context cancelled".to_string()))
                }
            }
        }
    }

    async fn eval_call(
        &self,
        env: &Env,
        callee: &Expr,
        args: &[Arg],
        pos: Pos,
    ) -> Eval<Value> {
        let mut evaluated = Vec::new();
        // Method-style calls resolve the receiver first so built-in array
        // and string methods can dispatch on it.
        let callee_value = match callee {
            Expr::Member { object, property, pos: member_pos } => {
                let receiver = self.eval(env, object).await?;
                for arg in args {
                    self.eval_arg(env, arg, &mut evaluated).await?;
                }
                match self.builtin_method(&receiver, property, &evaluated, pos).await? {
                    Some(result) => return Ok(result),
                    None => member_get(&receiver, property, *member_pos)?,
                }
            }
            other => {
                let callee_value = self.eval(env, other).await?;
                for arg in args {
                    self.eval_arg(env, arg, &mut evaluated).await?;
                }
                callee_value
            }
        };
        self.call(callee_value, evaluated, pos).await
    }

    async fn eval_arg(&self, env: &Env, arg: &Arg, out: &mut Vec<Value>) -> Eval<()> {
        match arg {
            Arg::Item(expr) => out.push(self.eval(env, expr).await?),
            Arg::Spread(expr) => {
                let spread = self.eval(env, expr).await?;
                match spread {
                    Value::Array(items) => out.extend(items.lock().clone()),
                    other => {
                        return Err(Flow::Throw(Value::error(format!(
                            "cannot spread {} into arguments",
                            other.type_name()
                        ))))
                    }
                }
            }
        }
        Ok(())
    }

    /// Call any callable value.
    pub fn call<'a>(
        &'a self,
        callee: Value,
        args: Vec<Value>,
        pos: Pos,
    ) -> BoxedEval<'a, Value> {
        Box::pin(async move {
            match callee {
                Value::Closure(closure) => {
                    let scope = closure.env.child();
                    for (i, param) in closure.func.params.iter().enumerate() {
                        scope.declare(
                            param,
                            args.get(i).cloned().unwrap_or(Value::Undefined),
                            false,
                        );
                    }
                    let outcome = self.exec_block(&scope, &closure.func.body).await;
                    let result = match outcome {
                        Ok(()) => Ok(Value::Undefined),
                        Err(Flow::Return(value)) => Ok(value),
                        Err(Flow::Throw(thrown)) => Err(thrown),
                        Err(flow) => return Err(flow),
                    };
                    if closure.func.is_async {
                        // Async functions yield a settled promise; rejection
                        // surfaces when (and if) the caller awaits it.
                        Ok(Value::Promise(match result {
                            Ok(value) => Promise::resolved(value),
                            Err(thrown) => Promise::rejected(thrown),
                        }))
                    } else {
                        result.map_err(Flow::Throw)
                    }
                }
                Value::Native { f, .. } => {
                    let fut = f(args);
                    tokio::select! {
                        result = fut => match result {
                            Ok(value) => Ok(value),
                            Err(thrown) => match as_interrupt(&thrown) {
                                Some(message) => Err(Flow::Interrupt(message)),
                                None => Err(Flow::Throw(thrown)),
                            },
                        },
                        _ = self.ctx.cancelled() => {
                            Err(Flow::Interrupt("context cancelled".to_string()))
                        }
                    }
                }
                other => Err(throw_at(
                    pos,
                    format!("{} is not callable", other.type_name()),
                )),
            }
        })
    }

    /// Built-in methods on arrays, strings, and promises. Returns `None`
    /// when the property is not a built-in (plain member call instead).
    async fn builtin_method(
        &self,
        receiver: &Value,
        method: &str,
        args: &[Value],
        pos: Pos,
    ) -> Eval<Option<Value>> {
        match receiver {
            Value::Array(items) => self.array_method(items, method, args, pos).await,
            Value::Str(s) => Ok(string_method(s, method, args)),
            _ => Ok(None),
        }
    }

    async fn array_method(
        &self,
        items: &crate::value::Array,
        method: &str,
        args: &[Value],
        pos: Pos,
    ) -> Eval<Option<Value>> {
        let result = match method {
            "push" => {
                let mut items = items.lock();
                for arg in args {
                    items.push(arg.clone());
                }
                Value::Number(items.len() as f64)
            }
            "pop" => items.lock().pop().unwrap_or(Value::Undefined),
            "includes" => {
                let needle = args.first().cloned().unwrap_or(Value::Undefined);
                Value::Bool(items.lock().iter().any(|v| v.loose_eq(&needle)))
            }
            "indexOf" => {
                let needle = args.first().cloned().unwrap_or(Value::Undefined);
                let index =
                    items.lock().iter().position(|v| v.loose_eq(&needle));
                Value::Number(index.map(|i| i as f64).unwrap_or(-1.0))
            }
            "join" => {
                let sep = match args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    _ => ",".to_string(),
                };
                let rendered: Vec<String> =
                    items.lock().iter().map(Value::render).collect();
                Value::string(rendered.join(&sep))
            }
            "slice" => {
                let items = items.lock();
                let len = items.len() as i64;
                let start = arg_index(args.first(), 0, len);
                let end = arg_index(args.get(1), len, len);
                Value::array(
                    items
                        .iter()
                        .skip(start as usize)
                        .take((end - start).max(0) as usize)
                        .cloned()
                        .collect(),
                )
            }
            "concat" => {
                let mut out = items.lock().clone();
                for arg in args {
                    match arg {
                        Value::Array(more) => out.extend(more.lock().clone()),
                        other => out.push(other.clone()),
                    }
                }
                Value::array(out)
            }
            "map" => {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                let snapshot = items.lock().clone();
                let mut out = Vec::with_capacity(snapshot.len());
                for (i, item) in snapshot.into_iter().enumerate() {
                    out.push(
                        self.call(callback.clone(), vec![item, Value::Number(i as f64)], pos)
                            .await?,
                    );
                }
                Value::array(out)
            }
            "filter" => {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                let snapshot = items.lock().clone();
                let mut out = Vec::new();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let keep = self
                        .call(
                            callback.clone(),
                            vec![item.clone(), Value::Number(i as f64)],
                            pos,
                        )
                        .await?;
                    if keep.truthy() {
                        out.push(item);
                    }
                }
                Value::array(out)
            }
            "find" => {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                let snapshot = items.lock().clone();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let hit = self
                        .call(
                            callback.clone(),
                            vec![item.clone(), Value::Number(i as f64)],
                            pos,
                        )
                        .await?;
                    if hit.truthy() {
                        return Ok(Some(item));
                    }
                }
                Value::Undefined
            }
            "forEach" => {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                let snapshot = items.lock().clone();
                for (i, item) in snapshot.into_iter().enumerate() {
                    self.call(callback.clone(), vec![item, Value::Number(i as f64)], pos)
                        .await?;
                }
                Value::Undefined
            }
            _ => return Ok(None),
        };
        Ok(Some(result))
    }
}

fn arg_index(arg: Option<&Value>, default: i64, len: i64) -> i64 {
    let raw = match arg {
        Some(Value::Number(n)) => *n as i64,
        _ => default,
    };
    if raw < 0 {
        (len + raw).max(0)
    } else {
        raw.min(len)
    }
}

fn string_method(s: &str, method: &str, args: &[Value]) -> Option<Value> {
    let first_str = || match args.first() {
        Some(Value::Str(v)) => v.clone(),
        Some(other) => other.render(),
        None => String::new(),
    };
    Some(match method {
        "includes" => Value::Bool(s.contains(&first_str())),
        "startsWith" => Value::Bool(s.starts_with(&first_str())),
        "endsWith" => Value::Bool(s.ends_with(&first_str())),
        "trim" => Value::string(s.trim()),
        "toUpperCase" => Value::string(s.to_uppercase()),
        "toLowerCase" => Value::string(s.to_lowercase()),
        "split" => {
            let sep = first_str();
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(&sep).map(Value::string).collect()
            };
            Value::array(parts)
        }
        "replace" => {
            let from = first_str();
            let to = match args.get(1) {
                Some(Value::Str(v)) => v.clone(),
                Some(other) => other.render(),
                None => String::new(),
            };
            Value::string(s.replacen(&from, &to, 1))
        }
        "replaceAll" => {
            let from = first_str();
            let to = match args.get(1) {
                Some(Value::Str(v)) => v.clone(),
                Some(other) => other.render(),
                None => String::new(),
            };
            Value::string(s.replace(&from, &to))
        }
        "indexOf" => {
            Value::Number(s.find(&first_str()).map(|i| i as f64).unwrap_or(-1.0))
        }
        "slice" => {
            let len = s.chars().count() as i64;
            let start = arg_index(args.first(), 0, len);
            let end = arg_index(args.get(1), len, len);
            let out: String = s
                .chars()
                .skip(start as usize)
                .take((end - start).max(0) as usize)
                .collect();
            Value::string(out)
        }
        "repeat" => {
            let times = match args.first() {
                Some(Value::Number(n)) => *n as usize,
                _ => 0,
            };
            Value::string(s.repeat(times))
        }
        _ => return None,
    })
}

/// Property read.
fn member_get(object: &Value, property: &str, pos: Pos) -> Eval<Value> {
    match object {
        Value::Object(map) => Ok(map.lock().get(property).cloned().unwrap_or(Value::Undefined)),
        Value::Array(items) => match property {
            "length" => Ok(Value::Number(items.lock().len() as f64)),
            _ => Ok(Value::Undefined),
        },
        Value::Str(s) => match property {
            "length" => Ok(Value::Number(s.chars().count() as f64)),
            _ => Ok(Value::Undefined),
        },
        Value::Undefined | Value::Null => Err(throw_at(
            pos,
            format!("cannot read property {:?} of {}", property, object.type_name()),
        )),
        _ => Ok(Value::Undefined),
    }
}

fn index_get(object: &Value, index: &Value, pos: Pos) -> Eval<Value> {
    match (object, index) {
        (Value::Array(items), Value::Number(n)) => {
            Ok(items.lock().get(*n as usize).cloned().unwrap_or(Value::Undefined))
        }
        (Value::Object(map), Value::Str(key)) => {
            Ok(map.lock().get(key).cloned().unwrap_or(Value::Undefined))
        }
        (Value::Str(s), Value::Number(n)) => Ok(s
            .chars()
            .nth(*n as usize)
            .map(|c| Value::string(c.to_string()))
            .unwrap_or(Value::Undefined)),
        _ => Err(throw_at(
            pos,
            format!("cannot index {} with {}", object.type_name(), index.type_name()),
        )),
    }
}

fn binary_op(op: BinaryOp, lhs: &Value, rhs: &Value, pos: Pos) -> Eval<Value> {
    use BinaryOp::*;
    match op {
        Add => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Ok(Value::string(format!("{}{}", lhs.render(), rhs.render())))
            }
            _ => Err(throw_at(
                pos,
                format!("cannot add {} and {}", lhs.type_name(), rhs.type_name()),
            )),
        },
        Sub | Mul | Div | Rem => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(match op {
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                _ => a % b,
            })),
            _ => Err(throw_at(
                pos,
                format!(
                    "arithmetic needs numbers, got {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ),
            )),
        },
        Eq => Ok(Value::Bool(lhs.loose_eq(rhs))),
        NotEq => Ok(Value::Bool(!lhs.loose_eq(rhs))),
        Lt | Gt | LtEq | GtEq => {
            let ordering = match (lhs, rhs) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(throw_at(
                    pos,
                    format!(
                        "cannot compare {} and {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                ));
            };
            Ok(Value::Bool(match op {
                Lt => ordering.is_lt(),
                Gt => ordering.is_gt(),
                LtEq => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }
    }
}

fn throw_at(pos: Pos, message: impl Into<String>) -> Flow {
    Flow::Throw(Value::error(format!("{} (at {})", message.into(), pos)))
}

#[cfg(test)]
#[path = "interp_tests.rs"]
mod tests;
