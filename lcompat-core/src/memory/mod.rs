//! In-memory host implementation
//!
//! [`MemoryHost`] implements [`RawApi`] over plain Rust collections. It has
//! no garbage collector and no parser: text chunks compile only if their
//! source was registered with [`MemoryHost::register_source`], any other text
//! compiles to a function returning the text itself. It is meant for tests
//! and for exercising the shim without linking a real interpreter.

mod value;

pub use value::{format_number, Value};

use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;

use lcompat_config::LimitConfig;
use tracing::trace;

use crate::error::{CompatError, CompatResult};
#[cfg(feature = "lua52")]
use crate::host::CompareOp;
use crate::host::{
    ArithOp, Frame, FrameInfo, FrameKind, NativeFn, RawApi, Status, ValueType, ENVIRON_INDEX,
    GLOBALS_INDEX, MULTRET, REGISTRY_INDEX, SIGNATURE,
};

/// Native closure body
pub type NativeImpl = Rc<dyn Fn(&mut MemoryHost) -> CompatResult<i32>>;

/// Header every precompiled chunk starts with
const BINARY_HEADER: &[u8] = b"\x1bLua";

#[derive(Default)]
struct Table {
    entries: Vec<(Value, Value)>,
    metatable: Option<usize>,
}

impl Table {
    fn position(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    fn get(&self, key: &Value) -> Value {
        self.position(key)
            .map(|i| self.entries[i].1.clone())
            .unwrap_or_default()
    }

    fn set(&mut self, key: Value, value: Value) {
        match (self.position(&key), value.is_nil()) {
            (Some(i), true) => {
                self.entries.remove(i);
            }
            (Some(i), false) => self.entries[i].1 = value,
            (None, true) => {}
            (None, false) => self.entries.push((key, value)),
        }
    }

    /// Border of the array part
    fn border(&self) -> usize {
        let mut n = 0;
        while !self.get(&Value::Number((n + 1) as f64)).is_nil() {
            n += 1;
        }
        n
    }
}

struct Closure {
    body: NativeImpl,
    upvalues: Vec<Value>,
}

struct Userdata {
    data: Vec<u8>,
    metatable: Option<usize>,
}

struct CallInfo {
    base: usize,
    closure: Option<usize>,
}

struct DebugFrame {
    info: FrameInfo,
    function: Value,
}

enum Slot {
    Stack(usize),
    Registry,
    Globals,
    Upvalue(usize),
    Invalid,
}

/// In-memory reference host
pub struct MemoryHost {
    stack: Vec<Value>,
    calls: Vec<CallInfo>,
    frames: Vec<DebugFrame>,
    tables: Vec<Table>,
    closures: Vec<Closure>,
    userdata: Vec<Userdata>,
    registry: usize,
    globals: usize,
    sources: HashMap<Vec<u8>, NativeImpl>,
    compile_count: usize,
    managed_bytes: usize,
    limits: LimitConfig,
}

impl MemoryHost {
    /// Create a host with default limits.
    pub fn new() -> Self {
        Self::with_limits(LimitConfig::default())
    }

    /// Create a host with explicit limits.
    pub fn with_limits(limits: LimitConfig) -> Self {
        let mut host = MemoryHost {
            stack: Vec::new(),
            calls: Vec::new(),
            frames: Vec::new(),
            tables: Vec::new(),
            closures: Vec::new(),
            userdata: Vec::new(),
            registry: 0,
            globals: 0,
            sources: HashMap::new(),
            compile_count: 0,
            managed_bytes: 0,
            limits,
        };
        host.registry = host.alloc_table();
        host.globals = host.alloc_table();
        let loaded = host.alloc_table();
        host.tables[host.registry].set(Value::str("_LOADED"), Value::Table(loaded));
        host.tables[host.globals].set(Value::str("_G"), Value::Table(host.globals));
        host.register_builtin_sources();
        host
    }

    #[cfg(feature = "lua51")]
    fn register_builtin_sources(&mut self) {
        self.register_source(crate::operator::ARITH_SNIPPET, builtin_arith);
        self.register_source(crate::operator::COMPARE_LE_SNIPPET, builtin_less_equal);
    }

    #[cfg(not(feature = "lua51"))]
    fn register_builtin_sources(&mut self) {}

    /// Make `source` compile to `body`.
    pub fn register_source<F>(&mut self, source: &str, body: F)
    where
        F: Fn(&mut MemoryHost) -> CompatResult<i32> + 'static,
    {
        self.sources.insert(source.as_bytes().to_vec(), Rc::new(body));
    }

    /// Number of chunks compiled so far
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    /// Bytes handed out through [`RawApi::new_userdata`]
    pub fn managed_bytes(&self) -> usize {
        self.managed_bytes
    }

    pub fn limits(&self) -> &LimitConfig {
        &self.limits
    }

    // ==================== values ====================

    /// Value at `idx`, `Nil` for invalid indices
    pub fn value(&self, idx: i32) -> Value {
        self.value_opt(idx).unwrap_or_default()
    }

    /// All values of the current frame, bottom first
    pub fn values(&self) -> Vec<Value> {
        self.stack[self.base()..].to_vec()
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn push_str(&mut self, s: &str) {
        self.push(Value::str(s));
    }

    /// String at `idx` without converting numbers
    pub fn string_at(&self, idx: i32) -> Option<String> {
        match self.value_opt(idx)? {
            Value::Str(s) => Some(String::from_utf8_lossy(&s).into_owned()),
            _ => None,
        }
    }

    pub fn number_at(&self, idx: i32) -> Option<f64> {
        match self.value_opt(idx)? {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Push a native closure with a Rust closure body.
    pub fn push_closure<F>(&mut self, body: F, nup: i32)
    where
        F: Fn(&mut MemoryHost) -> CompatResult<i32> + 'static,
    {
        self.push_closure_impl(Rc::new(body), nup);
    }

    fn push_closure_impl(&mut self, body: NativeImpl, nup: i32) {
        let split = self.stack.len() - nup.max(0) as usize;
        let upvalues = self.stack.split_off(split);
        self.closures.push(Closure { body, upvalues });
        self.push(Value::Function(self.closures.len() - 1));
    }

    /// Upvalues captured by the closure at `idx`
    pub fn upvalues_of(&self, idx: i32) -> Vec<Value> {
        match self.value(idx) {
            Value::Function(id) => self.closures[id].upvalues.clone(),
            _ => Vec::new(),
        }
    }

    /// Pop the top value into global `name`.
    pub fn set_global(&mut self, name: &str) {
        let value = self.stack.pop().unwrap_or_default();
        self.tables[self.globals].set(Value::str(name), value);
    }

    /// Push global `name`.
    pub fn get_global(&mut self, name: &str) {
        let value = self.tables[self.globals].get(&Value::str(name));
        self.push(value);
    }

    // ==================== debug frames ====================

    /// Enter a synthetic call frame; it becomes level 0.
    pub fn push_frame(&mut self, info: FrameInfo) {
        self.frames.push(DebugFrame {
            info,
            function: Value::Nil,
        });
    }

    /// Enter a synthetic call frame running the function popped from the top.
    pub fn push_frame_with_function(&mut self, info: FrameInfo) {
        let function = self.stack.pop().unwrap_or_default();
        self.frames.push(DebugFrame { info, function });
    }

    // ==================== internals ====================

    fn base(&self) -> usize {
        self.calls.last().map(|c| c.base).unwrap_or(0)
    }

    fn alloc_table(&mut self) -> usize {
        self.tables.push(Table::default());
        self.tables.len() - 1
    }

    fn slot(&self, idx: i32) -> Slot {
        if idx > 0 {
            let pos = self.base() + idx as usize - 1;
            if pos < self.stack.len() {
                Slot::Stack(pos)
            } else {
                Slot::Invalid
            }
        } else if idx == 0 {
            Slot::Invalid
        } else if idx > REGISTRY_INDEX {
            let pos = self.stack.len() as i64 + idx as i64;
            if pos >= self.base() as i64 {
                Slot::Stack(pos as usize)
            } else {
                Slot::Invalid
            }
        } else if idx == REGISTRY_INDEX {
            Slot::Registry
        } else if idx == GLOBALS_INDEX || idx == ENVIRON_INDEX {
            Slot::Globals
        } else {
            Slot::Upvalue((GLOBALS_INDEX - idx) as usize - 1)
        }
    }

    fn value_opt(&self, idx: i32) -> Option<Value> {
        match self.slot(idx) {
            Slot::Stack(pos) => Some(self.stack[pos].clone()),
            Slot::Registry => Some(Value::Table(self.registry)),
            Slot::Globals => Some(Value::Table(self.globals)),
            Slot::Upvalue(n) => {
                let closure = self.calls.last()?.closure?;
                self.closures[closure].upvalues.get(n).cloned()
            }
            Slot::Invalid => None,
        }
    }

    fn store(&mut self, slot: Slot, value: Value) {
        match slot {
            Slot::Stack(pos) if pos < self.stack.len() => self.stack[pos] = value,
            Slot::Upvalue(n) => {
                if let Some(closure) = self.calls.last().and_then(|c| c.closure) {
                    if let Some(up) = self.closures[closure].upvalues.get_mut(n) {
                        *up = value;
                    }
                }
            }
            // registry and globals tables cannot be replaced
            _ => {}
        }
    }

    fn pop_value(&mut self) -> Value {
        if self.stack.len() > self.base() {
            self.stack.pop().unwrap_or_default()
        } else {
            Value::Nil
        }
    }

    fn metatable_of(&self, value: &Value) -> Option<usize> {
        match value {
            Value::Table(id) => self.tables[*id].metatable,
            Value::Userdata(id) => self.userdata[*id].metatable,
            _ => None,
        }
    }

    fn metamethod(&self, value: &Value, event: &str) -> Value {
        self.metatable_of(value)
            .map(|mt| self.tables[mt].get(&Value::str(event)))
            .unwrap_or_default()
    }

    /// Call `function` with `args`, returning exactly one result.
    fn call_value(&mut self, function: Value, args: &[Value]) -> CompatResult<Value> {
        self.push(function);
        for arg in args {
            self.push(arg.clone());
        }
        self.call(args.len() as i32, 1)?;
        Ok(self.pop_value())
    }

    fn index_value(&mut self, object: Value, key: Value) -> CompatResult<Value> {
        let mut current = object;
        for _ in 0..100 {
            let handler = match &current {
                Value::Table(id) => {
                    let raw = self.tables[*id].get(&key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    let handler = self.metamethod(&current, "__index");
                    if handler.is_nil() {
                        return Ok(Value::Nil);
                    }
                    handler
                }
                other => {
                    let handler = self.metamethod(other, "__index");
                    if handler.is_nil() {
                        return Err(CompatError::Runtime(format!(
                            "attempt to index a {} value",
                            other.value_type().name()
                        )));
                    }
                    handler
                }
            };
            if let Value::Function(_) = handler {
                return self.call_value(handler, &[current, key]);
            }
            current = handler;
        }
        Err(CompatError::Runtime("loop in gettable".to_string()))
    }

    fn check_key(key: &Value) -> CompatResult<()> {
        match key {
            Value::Nil => Err(CompatError::Runtime("table index is nil".to_string())),
            Value::Number(n) if n.is_nan() => {
                Err(CompatError::Runtime("table index is NaN".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn compare_error(a: &Value, b: &Value) -> CompatError {
        let (ta, tb) = (a.value_type().name(), b.value_type().name());
        if ta == tb {
            CompatError::Runtime(format!("attempt to compare two {ta} values"))
        } else {
            CompatError::Runtime(format!("attempt to compare {ta} with {tb}"))
        }
    }

    /// Ordering with the `__lt` / `__le` fallbacks
    fn order(&mut self, a: &Value, b: &Value, event: &str) -> CompatResult<bool> {
        let strict = event == "__lt";
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(if strict { x < y } else { x <= y }),
            (Value::Str(x), Value::Str(y)) => Ok(if strict { x < y } else { x <= y }),
            _ => {
                let handler = self.metamethod(a, event);
                if handler.is_nil() || a.value_type() != b.value_type() {
                    return Err(Self::compare_error(a, b));
                }
                let result = self.call_value(handler, &[a.clone(), b.clone()])?;
                Ok(result.truthy())
            }
        }
    }

    /// Arithmetic with the `__add`, `__sub`, ... fallbacks
    fn arith_values(&mut self, op: ArithOp, a: Value, b: Value) -> CompatResult<Value> {
        let (x, y) = (a.as_number(), b.as_number());
        if let (Some(x), Some(y)) = (x, y) {
            return Ok(Value::Number(op.apply(x, y)));
        }
        let mut handler = self.metamethod(&a, op.event());
        if handler.is_nil() {
            handler = self.metamethod(&b, op.event());
        }
        if handler.is_nil() {
            let culprit = if x.is_none() { &a } else { &b };
            return Err(CompatError::Runtime(format!(
                "attempt to perform arithmetic on a {} value",
                culprit.value_type().name()
            )));
        }
        self.call_value(handler, &[a, b])
    }

    fn compile_chunk(&mut self, chunk: &[u8], chunkname: &str) -> Status {
        trace!(target: "lcompat::host", chunkname, len = chunk.len(), "loading chunk");
        if chunk.first() == Some(&SIGNATURE) {
            self.compile_binary(chunk, chunkname)
        } else {
            self.compile_text(chunk, chunkname)
        }
    }

    fn compile_text(&mut self, source: &[u8], chunkname: &str) -> Status {
        if source.contains(&0) {
            let msg = format!("{}:1: unexpected symbol near '<\\0>'", chunk_id(chunkname));
            self.push(Value::str(&msg));
            return Status::ErrSyntax;
        }
        let body = match self.sources.get(source) {
            Some(body) => body.clone(),
            None => {
                let text = Value::bytes(source);
                Rc::new(move |host: &mut MemoryHost| {
                    host.push(text.clone());
                    Ok(1)
                })
            }
        };
        self.compile_count += 1;
        self.push_closure_impl(body, 0);
        Status::Ok
    }

    fn compile_binary(&mut self, chunk: &[u8], chunkname: &str) -> Status {
        if !chunk.starts_with(BINARY_HEADER) {
            let msg = format!("{}: bad header in precompiled chunk", chunk_id(chunkname));
            self.push(Value::str(&msg));
            return Status::ErrSyntax;
        }
        let payload = Value::bytes(&chunk[BINARY_HEADER.len()..]);
        self.compile_count += 1;
        self.push_closure_impl(
            Rc::new(move |host: &mut MemoryHost| {
                host.push(payload.clone());
                Ok(1)
            }),
            0,
        );
        Status::Ok
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Display form of a chunk name
fn chunk_id(chunkname: &str) -> String {
    if let Some(rest) = chunkname
        .strip_prefix('=')
        .or_else(|| chunkname.strip_prefix('@'))
    {
        return rest.to_string();
    }
    let first_line = chunkname.lines().next().unwrap_or("");
    if first_line.len() < chunkname.len() || first_line.len() > 40 {
        let cut: String = first_line.chars().take(40).collect();
        format!("[string \"{cut}...\"]")
    } else {
        format!("[string \"{first_line}\"]")
    }
}

/// Drain `reader`; a failing reader ends the chunk and the caller inspects it
fn read_chunk(reader: &mut dyn Read) -> Vec<u8> {
    let mut chunk = Vec::new();
    let mut block = [0u8; 512];
    loop {
        match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => chunk.extend_from_slice(&block[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    chunk
}

#[cfg(feature = "lua51")]
fn builtin_arith(host: &mut MemoryHost) -> CompatResult<i32> {
    let op = match ArithOp::try_from(host.to_integer(1) as i32) {
        Ok(op) => op,
        Err(_) => return Ok(0),
    };
    let (a, b) = (host.value(2), host.value(3));
    let result = host.arith_values(op, a, b)?;
    host.push(result);
    Ok(1)
}

#[cfg(feature = "lua51")]
fn builtin_less_equal(host: &mut MemoryHost) -> CompatResult<i32> {
    let (a, b) = (host.value(1), host.value(2));
    let result = host.order(&a, &b, "__le")?;
    host.push(Value::Boolean(result));
    Ok(1)
}

impl RawApi for MemoryHost {
    fn get_top(&self) -> i32 {
        (self.stack.len() - self.base()) as i32
    }

    fn set_top(&mut self, idx: i32) {
        let base = self.base();
        let new_len = if idx >= 0 {
            base + idx as usize
        } else {
            (self.stack.len() as i64 + idx as i64 + 1).max(base as i64) as usize
        };
        self.stack.resize(new_len, Value::Nil);
    }

    fn push_value(&mut self, idx: i32) {
        let value = self.value(idx);
        self.push(value);
    }

    fn replace(&mut self, idx: i32) {
        let slot = self.slot(idx);
        let value = self.pop_value();
        self.store(slot, value);
    }

    fn check_stack(&mut self, extra: i32) -> bool {
        self.stack.len() + extra.max(0) as usize <= self.limits.max_stack_size
    }

    fn type_of(&self, idx: i32) -> ValueType {
        self.value_opt(idx)
            .map(|v| v.value_type())
            .unwrap_or(ValueType::None)
    }

    fn is_number(&self, idx: i32) -> bool {
        self.value(idx).as_number().is_some()
    }

    fn is_string(&self, idx: i32) -> bool {
        matches!(self.value(idx), Value::Str(_) | Value::Number(_))
    }

    fn to_number(&self, idx: i32) -> f64 {
        self.value(idx).as_number().unwrap_or(0.0)
    }

    fn to_integer(&self, idx: i32) -> i64 {
        self.value(idx).as_number().map(|n| n as i64).unwrap_or(0)
    }

    fn to_boolean(&self, idx: i32) -> bool {
        self.value(idx).truthy()
    }

    fn to_bytes(&mut self, idx: i32) -> Option<Vec<u8>> {
        let slot = self.slot(idx);
        match self.value(idx) {
            Value::Str(s) => Some(s.to_vec()),
            Value::Number(n) => {
                let text = format_number(n);
                self.store(slot, Value::str(&text));
                Some(text.into_bytes())
            }
            _ => None,
        }
    }

    fn to_pointer(&self, idx: i32) -> usize {
        self.value(idx).pointer()
    }

    fn to_userdata(&self, idx: i32) -> Option<usize> {
        match self.value(idx) {
            v @ (Value::Userdata(_) | Value::LightUserdata(_)) => Some(v.pointer()),
            _ => None,
        }
    }

    fn obj_len(&self, idx: i32) -> usize {
        match self.value(idx) {
            Value::Str(s) => s.len(),
            Value::Number(n) => format_number(n).len(),
            Value::Table(id) => self.tables[id].border(),
            Value::Userdata(id) => self.userdata[id].data.len(),
            _ => 0,
        }
    }

    fn raw_equal(&self, a: i32, b: i32) -> bool {
        match (self.value_opt(a), self.value_opt(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    fn equal(&mut self, a: i32, b: i32) -> CompatResult<bool> {
        let (x, y) = match (self.value_opt(a), self.value_opt(b)) {
            (Some(x), Some(y)) => (x, y),
            _ => return Ok(false),
        };
        if x == y {
            return Ok(true);
        }
        if x.value_type() != y.value_type()
            || !matches!(x, Value::Table(_) | Value::Userdata(_))
        {
            return Ok(false);
        }
        let handler = self.metamethod(&x, "__eq");
        if handler.is_nil() || handler != self.metamethod(&y, "__eq") {
            return Ok(false);
        }
        Ok(self.call_value(handler, &[x, y])?.truthy())
    }

    fn less_than(&mut self, a: i32, b: i32) -> CompatResult<bool> {
        match (self.value_opt(a), self.value_opt(b)) {
            (Some(x), Some(y)) => self.order(&x, &y, "__lt"),
            _ => Ok(false),
        }
    }

    fn push_nil(&mut self) {
        self.push(Value::Nil);
    }

    fn push_number(&mut self, n: f64) {
        self.push(Value::Number(n));
    }

    fn push_integer(&mut self, n: i64) {
        self.push(Value::Number(n as f64));
    }

    fn push_boolean(&mut self, b: bool) {
        self.push(Value::Boolean(b));
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.push(Value::bytes(bytes));
    }

    fn push_light_userdata(&mut self, p: usize) {
        self.push(Value::LightUserdata(p));
    }

    fn push_native(&mut self, f: NativeFn<Self>, nup: i32) {
        self.push_closure_impl(Rc::new(f), nup);
    }

    fn new_table(&mut self) {
        let id = self.alloc_table();
        self.push(Value::Table(id));
    }

    fn new_userdata(&mut self, size: usize) {
        self.userdata.push(Userdata {
            data: vec![0; size],
            metatable: None,
        });
        self.managed_bytes += size;
        trace!(target: "lcompat::host", size, "new userdata");
        self.push(Value::Userdata(self.userdata.len() - 1));
    }

    fn userdata_bytes(&self, idx: i32) -> Option<&[u8]> {
        match self.value_opt(idx)? {
            Value::Userdata(id) => Some(self.userdata[id].data.as_slice()),
            _ => None,
        }
    }

    fn userdata_bytes_mut(&mut self, idx: i32) -> Option<&mut [u8]> {
        match self.value_opt(idx)? {
            Value::Userdata(id) => Some(self.userdata[id].data.as_mut_slice()),
            _ => None,
        }
    }

    fn get_table(&mut self, idx: i32) -> CompatResult<()> {
        let object = self.value(idx);
        let key = self.pop_value();
        let result = self.index_value(object, key)?;
        self.push(result);
        Ok(())
    }

    fn set_table(&mut self, idx: i32) -> CompatResult<()> {
        let object = self.value(idx);
        let value = self.pop_value();
        let key = self.pop_value();
        match object {
            Value::Table(id) => {
                Self::check_key(&key)?;
                self.tables[id].set(key, value);
                Ok(())
            }
            other => Err(CompatError::Runtime(format!(
                "attempt to index a {} value",
                other.value_type().name()
            ))),
        }
    }

    fn get_field(&mut self, idx: i32, key: &str) -> CompatResult<()> {
        let object = self.value(idx);
        let result = self.index_value(object, Value::str(key))?;
        self.push(result);
        Ok(())
    }

    fn set_field(&mut self, idx: i32, key: &str) -> CompatResult<()> {
        let slot_value = self.value(idx);
        let value = self.pop_value();
        match slot_value {
            Value::Table(id) => {
                self.tables[id].set(Value::str(key), value);
                Ok(())
            }
            other => Err(CompatError::Runtime(format!(
                "attempt to index a {} value",
                other.value_type().name()
            ))),
        }
    }

    fn raw_get(&mut self, idx: i32) {
        let object = self.value(idx);
        let key = self.pop_value();
        let result = match object {
            Value::Table(id) => self.tables[id].get(&key),
            _ => Value::Nil,
        };
        self.push(result);
    }

    fn raw_set(&mut self, idx: i32) {
        let object = self.value(idx);
        let value = self.pop_value();
        let key = self.pop_value();
        if let Value::Table(id) = object {
            if Self::check_key(&key).is_ok() {
                self.tables[id].set(key, value);
            }
        }
    }

    fn next(&mut self, idx: i32) -> CompatResult<bool> {
        let object = self.value(idx);
        let key = self.pop_value();
        let Value::Table(id) = object else {
            return Err(CompatError::Runtime(format!(
                "bad argument #1 to 'next' (table expected, got {})",
                object.value_type().name()
            )));
        };
        let table = &self.tables[id];
        let position = if key.is_nil() {
            0
        } else {
            match table.position(&key) {
                Some(i) => i + 1,
                None => return Err(CompatError::Runtime("invalid key to 'next'".to_string())),
            }
        };
        match table.entries.get(position).cloned() {
            Some((k, v)) => {
                self.push(k);
                self.push(v);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_metatable(&mut self, idx: i32) -> bool {
        match self.metatable_of(&self.value(idx)) {
            Some(mt) => {
                self.push(Value::Table(mt));
                true
            }
            None => false,
        }
    }

    fn set_metatable(&mut self, idx: i32) {
        let target = self.value(idx);
        let metatable = match self.pop_value() {
            Value::Table(mt) => Some(mt),
            _ => None,
        };
        match target {
            Value::Table(id) => self.tables[id].metatable = metatable,
            Value::Userdata(id) => self.userdata[id].metatable = metatable,
            _ => {}
        }
    }

    fn call(&mut self, nargs: i32, nresults: i32) -> CompatResult<()> {
        let func_pos = self.stack.len() - nargs as usize - 1;
        let function = self.stack[func_pos].clone();
        let id = match function {
            Value::Function(id) => id,
            other => {
                let handler = self.metamethod(&other, "__call");
                if handler.is_nil() {
                    self.stack.truncate(func_pos);
                    return Err(CompatError::Runtime(format!(
                        "attempt to call a {} value",
                        other.value_type().name()
                    )));
                }
                self.stack.insert(func_pos, handler);
                return self.call(nargs + 1, nresults);
            }
        };
        if self.calls.len() >= self.limits.max_call_depth {
            self.stack.truncate(func_pos);
            return Err(CompatError::Runtime("C stack overflow".to_string()));
        }

        self.calls.push(CallInfo {
            base: func_pos + 1,
            closure: Some(id),
        });
        self.frames.push(DebugFrame {
            info: FrameInfo::new("[C]", FrameKind::Native),
            function: Value::Function(id),
        });
        let body = self.closures[id].body.clone();
        let outcome = body(self);
        self.frames.pop();
        self.calls.pop();

        let nret = match outcome {
            Ok(n) => (n.max(0) as usize).min(self.stack.len() - func_pos - 1),
            Err(e) => {
                self.stack.truncate(func_pos);
                return Err(e);
            }
        };
        let mut results = self.stack.split_off(self.stack.len() - nret);
        self.stack.truncate(func_pos);
        if nresults != MULTRET {
            results.resize(nresults as usize, Value::Nil);
        }
        self.stack.extend(results);
        Ok(())
    }

    fn call_meta(&mut self, idx: i32, event: &str) -> CompatResult<bool> {
        let object = self.value(idx);
        let handler = self.metamethod(&object, event);
        if handler.is_nil() {
            return Ok(false);
        }
        let result = self.call_value(handler, &[object])?;
        self.push(result);
        Ok(true)
    }

    fn concat(&mut self, n: i32) -> CompatResult<()> {
        if n == 0 {
            self.push(Value::str(""));
            return Ok(());
        }
        let start = self.stack.len() - n as usize;
        let mut joined = Vec::new();
        for value in &self.stack[start..] {
            match value.as_bytes() {
                Some(bytes) => joined.extend_from_slice(&bytes),
                None => {
                    return Err(CompatError::Runtime(format!(
                        "attempt to concatenate a {} value",
                        value.value_type().name()
                    )))
                }
            }
        }
        self.stack.truncate(start);
        self.push(Value::bytes(&joined));
        Ok(())
    }

    fn load(&mut self, reader: &mut dyn Read, chunkname: &str) -> Status {
        let chunk = read_chunk(reader);
        self.compile_chunk(&chunk, chunkname)
    }

    fn get_stack(&self, level: i32) -> Option<Frame> {
        if level < 0 || level as usize >= self.frames.len() {
            return None;
        }
        Some(Frame(self.frames.len() - 1 - level as usize))
    }

    fn get_info(&self, frame: &Frame) -> FrameInfo {
        self.frames[frame.0].info.clone()
    }

    fn push_frame_function(&mut self, frame: &Frame) {
        let function = self.frames[frame.0].function.clone();
        self.push(function);
    }

    // ===== 5.2 entry points =====

    #[cfg(feature = "lua52")]
    fn abs_index(&self, idx: i32) -> i32 {
        crate::index::abs_index(self, idx)
    }

    #[cfg(feature = "lua52")]
    fn arith(&mut self, op: i32) -> CompatResult<()> {
        let op = ArithOp::try_from(op)?;
        let b = self.pop_value();
        let a = if op == ArithOp::Unm {
            b.clone()
        } else {
            self.pop_value()
        };
        let result = self.arith_values(op, a, b)?;
        self.push(result);
        Ok(())
    }

    #[cfg(feature = "lua52")]
    fn compare(&mut self, idx1: i32, idx2: i32, op: i32) -> CompatResult<bool> {
        let op = CompareOp::try_from(op)?;
        let (a, b) = match (self.value_opt(idx1), self.value_opt(idx2)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(false),
        };
        match op {
            CompareOp::Eq => self.equal(idx1, idx2),
            CompareOp::Lt => self.order(&a, &b, "__lt"),
            CompareOp::Le => self.order(&a, &b, "__le"),
        }
    }

    #[cfg(feature = "lua52")]
    fn copy(&mut self, from: i32, to: i32) -> CompatResult<()> {
        let value = self.value(from);
        let slot = self.slot(to);
        self.store(slot, value);
        Ok(())
    }

    #[cfg(feature = "lua52")]
    fn len(&mut self, idx: i32) -> CompatResult<()> {
        let object = self.value(idx);
        if let Value::Str(s) = &object {
            let n = s.len();
            self.push(Value::Number(n as f64));
            return Ok(());
        }
        if self.call_meta(idx, "__len")? {
            return Ok(());
        }
        match object {
            Value::Table(id) => {
                let n = self.tables[id].border();
                self.push(Value::Number(n as f64));
                Ok(())
            }
            other => Err(CompatError::Type(format!(
                "attempt to get length of a {} value",
                other.value_type().name()
            ))),
        }
    }

    #[cfg(feature = "lua52")]
    fn raw_getp(&mut self, idx: i32, p: usize) -> ValueType {
        let result = match self.value(idx) {
            Value::Table(id) => self.tables[id].get(&Value::LightUserdata(p)),
            _ => Value::Nil,
        };
        let ty = result.value_type();
        self.push(result);
        ty
    }

    #[cfg(feature = "lua52")]
    fn raw_setp(&mut self, idx: i32, p: usize) -> CompatResult<()> {
        let object = self.value(idx);
        let value = self.pop_value();
        match object {
            Value::Table(id) => {
                self.tables[id].set(Value::LightUserdata(p), value);
                Ok(())
            }
            other => Err(CompatError::Runtime(format!(
                "attempt to index a {} value",
                other.value_type().name()
            ))),
        }
    }

    #[cfg(feature = "lua52")]
    fn to_integer_x(&self, idx: i32) -> Option<i64> {
        self.value(idx).as_number().map(|n| n as i64)
    }

    #[cfg(feature = "lua52")]
    fn to_number_x(&self, idx: i32) -> Option<f64> {
        self.value(idx).as_number()
    }

    #[cfg(feature = "lua52")]
    fn load_with_mode(&mut self, reader: &mut dyn Read, chunkname: &str, mode: &str) -> Status {
        let chunk = read_chunk(reader);
        let binary = chunk.first() == Some(&SIGNATURE);
        let (kind, flag) = if binary { ("binary", 'b') } else { ("text", 't') };
        if !mode.contains(flag) {
            let msg = format!("attempt to load a {kind} chunk (mode is '{mode}')");
            self.push(Value::str(&msg));
            return Status::ErrSyntax;
        }
        self.compile_chunk(&chunk, chunkname)
    }
}
