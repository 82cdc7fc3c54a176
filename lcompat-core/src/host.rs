//! Host boundary
//!
//! [`RawApi`] is the fixed stack-machine interface of the host. Every
//! revision provides the primitives of the oldest one; a `lua52` build also
//! declares the entry points that revision added, which a 5.1 build
//! synthesizes in [`crate::Compat`] under the same names.

use std::fmt;
use std::io::Read;

use crate::error::{CompatError, CompatResult};

/// Pseudo-index of the registry table
pub const REGISTRY_INDEX: i32 = -10000;
/// Pseudo-index of the running function's environment
pub const ENVIRON_INDEX: i32 = -10001;
/// Pseudo-index of the global table
pub const GLOBALS_INDEX: i32 = -10002;

/// Pseudo-index of the `i`-th upvalue of the running native closure
pub fn upvalue_index(i: i32) -> i32 {
    GLOBALS_INDEX - i
}

/// Whether `idx` addresses a pseudo slot rather than a stack position
pub fn is_pseudo(idx: i32) -> bool {
    idx <= REGISTRY_INDEX
}

/// Leading byte of every precompiled chunk (`"\x1bLua"`)
pub const SIGNATURE: u8 = 0x1B;

/// Ask `call` to keep every result
pub const MULTRET: i32 = -1;

/// Native function: reads its arguments from the stack, returns the number of
/// results left on top.
pub type NativeFn<H> = fn(&mut H) -> CompatResult<i32>;

/// Arithmetic operator selector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ArithOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Mod = 4,
    Pow = 5,
    Unm = 6,
}

impl ArithOp {
    /// Metamethod consulted for non-numeric operands
    pub fn event(&self) -> &'static str {
        match self {
            ArithOp::Add => "__add",
            ArithOp::Sub => "__sub",
            ArithOp::Mul => "__mul",
            ArithOp::Div => "__div",
            ArithOp::Mod => "__mod",
            ArithOp::Pow => "__pow",
            ArithOp::Unm => "__unm",
        }
    }

    /// Apply the operator to plain numbers; `b` is ignored by `Unm`.
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a - (a / b).floor() * b,
            ArithOp::Pow => a.powf(b),
            ArithOp::Unm => -a,
        }
    }
}

impl TryFrom<i32> for ArithOp {
    type Error = CompatError;

    fn try_from(op: i32) -> Result<Self, Self::Error> {
        Ok(match op {
            0 => ArithOp::Add,
            1 => ArithOp::Sub,
            2 => ArithOp::Mul,
            3 => ArithOp::Div,
            4 => ArithOp::Mod,
            5 => ArithOp::Pow,
            6 => ArithOp::Unm,
            _ => {
                return Err(CompatError::Argument(
                    "invalid 'op' argument for lua_arith".to_string(),
                ))
            }
        })
    }
}

/// Comparison operator selector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum CompareOp {
    Eq = 0,
    Lt = 1,
    Le = 2,
}

impl TryFrom<i32> for CompareOp {
    type Error = CompatError;

    fn try_from(op: i32) -> Result<Self, Self::Error> {
        match op {
            0 => Ok(CompareOp::Eq),
            1 => Ok(CompareOp::Lt),
            2 => Ok(CompareOp::Le),
            _ => Err(CompatError::Argument(
                "invalid 'op' argument for lua_compare".to_string(),
            )),
        }
    }
}

/// Type tag of a stack value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ValueType {
    None = -1,
    Nil = 0,
    Boolean = 1,
    LightUserdata = 2,
    Number = 3,
    String = 4,
    Table = 5,
    Function = 6,
    Userdata = 7,
    Thread = 8,
}

impl ValueType {
    /// Type name as the host reports it (`lua_typename`)
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::None => "no value",
            ValueType::Nil => "nil",
            ValueType::Boolean => "boolean",
            ValueType::LightUserdata | ValueType::Userdata => "userdata",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Table => "table",
            ValueType::Function => "function",
            ValueType::Thread => "thread",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status code of loads and protected calls
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Yield = 1,
    ErrRun = 2,
    ErrSyntax = 3,
    ErrMem = 4,
    ErrErr = 5,
    ErrFile = 6,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        *self == Status::Ok
    }
}

/// What kind of function a frame is running
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Top-level chunk
    Main,
    /// Native (non-host-language) function
    Native,
    /// Host-language function
    Script,
    /// Frame reused by a tail call
    Tail,
}

/// Frame descriptor, produced by the host per query
#[derive(Clone, Debug, PartialEq)]
pub struct FrameInfo {
    pub short_src: String,
    /// Line being executed, `-1` when unknown
    pub current_line: i32,
    pub kind: FrameKind,
    pub name: Option<String>,
    /// How the name was found (`"global"`, `"local"`, `"method"`, `"field"`);
    /// empty when the call site gives no name
    pub name_what: String,
    pub line_defined: i32,
}

impl FrameInfo {
    pub fn new(short_src: impl Into<String>, kind: FrameKind) -> Self {
        Self {
            short_src: short_src.into(),
            current_line: -1,
            kind,
            name: None,
            name_what: String::new(),
            line_defined: -1,
        }
    }

    pub fn at_line(mut self, line: i32) -> Self {
        self.current_line = line;
        self
    }

    pub fn defined_at(mut self, line: i32) -> Self {
        self.line_defined = line;
        self
    }

    pub fn named(mut self, name: impl Into<String>, name_what: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.name_what = name_what.into();
        self
    }
}

/// Opaque activation record returned by [`RawApi::get_stack`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame(pub usize);

/// Primitive stack API of the host
///
/// Indices follow the host convention: positive indices are absolute and
/// 1-based, negative ones count down from the top, and values at or below
/// [`REGISTRY_INDEX`] are pseudo-indices. Pushing requires headroom the caller
/// has validated with [`RawApi::check_stack`].
pub trait RawApi {
    // ===== stack =====

    fn get_top(&self) -> i32;
    fn set_top(&mut self, idx: i32);
    fn push_value(&mut self, idx: i32);
    /// Pop the top value into `idx`
    fn replace(&mut self, idx: i32);
    /// Make room for `extra` more slots; false if the host cannot
    fn check_stack(&mut self, extra: i32) -> bool;

    // ===== access =====

    fn type_of(&self, idx: i32) -> ValueType;
    /// Number, or string convertible to a number
    fn is_number(&self, idx: i32) -> bool;
    /// String, or number (always convertible to a string)
    fn is_string(&self, idx: i32) -> bool;
    /// `0.0` when not convertible
    fn to_number(&self, idx: i32) -> f64;
    /// Truncated toward zero, `0` when not convertible
    fn to_integer(&self, idx: i32) -> i64;
    fn to_boolean(&self, idx: i32) -> bool;
    /// String contents; a number in the slot is converted in place
    fn to_bytes(&mut self, idx: i32) -> Option<Vec<u8>>;
    /// Identity of a reference value, `0` for non-references
    fn to_pointer(&self, idx: i32) -> usize;
    /// Address of a (full or light) userdata
    fn to_userdata(&self, idx: i32) -> Option<usize>;
    /// Raw length of strings, tables and userdata
    fn obj_len(&self, idx: i32) -> usize;
    fn raw_equal(&self, a: i32, b: i32) -> bool;
    fn equal(&mut self, a: i32, b: i32) -> CompatResult<bool>;
    fn less_than(&mut self, a: i32, b: i32) -> CompatResult<bool>;

    // ===== push =====

    fn push_nil(&mut self);
    fn push_number(&mut self, n: f64);
    fn push_integer(&mut self, n: i64);
    fn push_boolean(&mut self, b: bool);
    fn push_bytes(&mut self, bytes: &[u8]);
    fn push_light_userdata(&mut self, p: usize);
    /// Pop `nup` upvalues and push a native closure capturing them
    fn push_native(&mut self, f: NativeFn<Self>, nup: i32)
    where
        Self: Sized;
    fn new_table(&mut self);
    /// Push a fresh managed block of `size` bytes
    fn new_userdata(&mut self, size: usize);
    /// Memory block of the full userdata at `idx`
    fn userdata_bytes(&self, idx: i32) -> Option<&[u8]>;
    fn userdata_bytes_mut(&mut self, idx: i32) -> Option<&mut [u8]>;

    // ===== tables =====

    /// `t[k]` with `t` at `idx` and `k` popped from the top
    fn get_table(&mut self, idx: i32) -> CompatResult<()>;
    /// `t[k] = v` with `k`, `v` popped from the top
    fn set_table(&mut self, idx: i32) -> CompatResult<()>;
    fn get_field(&mut self, idx: i32, key: &str) -> CompatResult<()>;
    fn set_field(&mut self, idx: i32, key: &str) -> CompatResult<()>;
    fn raw_get(&mut self, idx: i32);
    fn raw_set(&mut self, idx: i32);
    /// Pop a key, push the next key/value pair; false at the end
    fn next(&mut self, idx: i32) -> CompatResult<bool>;
    /// Push the metatable of the value at `idx`; false (nothing pushed) if none
    fn get_metatable(&mut self, idx: i32) -> bool;
    /// Pop a table (or nil) and make it the metatable of the value at `idx`
    fn set_metatable(&mut self, idx: i32);

    // ===== calls =====

    fn call(&mut self, nargs: i32, nresults: i32) -> CompatResult<()>;
    /// Call metamethod `event` of the value at `idx` with it as argument;
    /// pushes the result and returns true if the metamethod exists.
    fn call_meta(&mut self, idx: i32, event: &str) -> CompatResult<bool>;
    /// Pop `n` values and push their concatenation
    fn concat(&mut self, n: i32) -> CompatResult<()>;
    /// Raw chunk loader; pushes the compiled function or an error message
    fn load(&mut self, reader: &mut dyn Read, chunkname: &str) -> Status;

    // ===== debug =====

    fn get_stack(&self, level: i32) -> Option<Frame>;
    fn get_info(&self, frame: &Frame) -> FrameInfo;
    /// Push the function running in `frame`
    fn push_frame_function(&mut self, frame: &Frame);

    // ===== entry points added by 5.2 =====

    #[cfg(feature = "lua52")]
    fn abs_index(&self, idx: i32) -> i32;
    /// Pop the operands (one for `Unm`, two otherwise) and push the result
    #[cfg(feature = "lua52")]
    fn arith(&mut self, op: i32) -> CompatResult<()>;
    /// False when either index is not valid
    #[cfg(feature = "lua52")]
    fn compare(&mut self, idx1: i32, idx2: i32, op: i32) -> CompatResult<bool>;
    #[cfg(feature = "lua52")]
    fn copy(&mut self, from: i32, to: i32) -> CompatResult<()>;
    /// Push the length of the value at `idx`, honouring `__len`
    #[cfg(feature = "lua52")]
    fn len(&mut self, idx: i32) -> CompatResult<()>;
    #[cfg(feature = "lua52")]
    fn raw_getp(&mut self, idx: i32, p: usize) -> ValueType;
    #[cfg(feature = "lua52")]
    fn raw_setp(&mut self, idx: i32, p: usize) -> CompatResult<()>;
    #[cfg(feature = "lua52")]
    fn to_integer_x(&self, idx: i32) -> Option<i64>;
    #[cfg(feature = "lua52")]
    fn to_number_x(&self, idx: i32) -> Option<f64>;
    /// Chunk loader restricted to the chunk kinds named in `mode`
    /// (`"b"`, `"t"` or `"bt"`)
    #[cfg(feature = "lua52")]
    fn load_with_mode(&mut self, reader: &mut dyn Read, chunkname: &str, mode: &str) -> Status;
}

/// Pop the error value at the top and turn it into a runtime error
#[cfg(feature = "lua51")]
pub(crate) fn raise_top<H: RawApi>(host: &mut H) -> CompatError {
    let message = match host.to_bytes(-1) {
        Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        None => format!("(error object is a {} value)", host.type_of(-1).name()),
    };
    host.set_top(-2);
    CompatError::Runtime(message)
}
