//! Operator dispatch
//!
//! The old host has no arithmetic entry point and no primitive for `<=`.
//! Both are synthesized by running a small host-language snippet. Each
//! snippet is compiled at most once per context and kept in the registry
//! under a light-userdata key: the address of the snippet's static text.

use tracing::debug;

use crate::access::{raw_getp, raw_setp};
use crate::error::{CompatError, CompatResult};
use crate::host::{raise_top, ArithOp, CompareOp, RawApi, Status, ValueType, REGISTRY_INDEX};
use crate::index::abs_index;
use crate::rotate::insert;

/// Whole arithmetic family, selected by the first argument
pub static ARITH_SNIPPET: &str = "local op,a,b=...\n\
if op==0 then return a+b\n\
elseif op==1 then return a-b\n\
elseif op==2 then return a*b\n\
elseif op==3 then return a/b\n\
elseif op==4 then return a%b\n\
elseif op==5 then return a^b\n\
elseif op==6 then return -a\n\
end\n";

pub static COMPARE_LE_SNIPPET: &str = "local a,b=...\nreturn a<=b\n";

/// Chunk name the snippets are compiled under
const SNIPPET_CHUNKNAME: &str = "=none";

/// Run `code` with the `nargs` values on top as arguments.
fn call_snippet<H: RawApi>(
    host: &mut H,
    code: &'static str,
    nargs: i32,
    nresults: i32,
) -> CompatResult<()> {
    let key = code.as_ptr() as usize;
    raw_getp(host, REGISTRY_INDEX, key);
    if host.type_of(-1) != ValueType::Function {
        host.set_top(-2);
        let mut source = code.as_bytes();
        if host.load(&mut source, SNIPPET_CHUNKNAME) != Status::Ok {
            return Err(raise_top(host));
        }
        host.push_value(-1);
        raw_setp(host, REGISTRY_INDEX, key)?;
        debug!(target: "lcompat::operator", key, "operator snippet compiled");
    }
    insert(host, -nargs - 1)?;
    host.call(nargs, nresults)
}

/// Pop the operands (one for `Unm`, two otherwise) and push the result.
pub fn arith<H: RawApi>(host: &mut H, op: i32) -> CompatResult<()> {
    let op = ArithOp::try_from(op)?;
    if !host.check_stack(5) {
        return Err(CompatError::no_headroom("not enough stack slots"));
    }
    if op == ArithOp::Unm {
        // second operand is ignored but the snippet takes two
        host.push_value(-1);
    }
    host.push_number(op as i32 as f64);
    insert(host, -3)?;
    call_snippet(host, ARITH_SNIPPET, 3, 1)
}

/// Compare the values at `idx1` and `idx2`; the stack is left unchanged.
pub fn compare<H: RawApi>(host: &mut H, idx1: i32, idx2: i32, op: i32) -> CompatResult<bool> {
    match CompareOp::try_from(op)? {
        CompareOp::Eq => host.equal(idx1, idx2),
        CompareOp::Lt => host.less_than(idx1, idx2),
        CompareOp::Le => {
            if !host.check_stack(5) {
                return Err(CompatError::no_headroom("not enough stack slots"));
            }
            let idx1 = abs_index(host, idx1);
            let idx2 = abs_index(host, idx2);
            host.push_value(idx1);
            host.push_value(idx2);
            call_snippet(host, COMPARE_LE_SNIPPET, 2, 1)?;
            let result = host.to_boolean(-1);
            host.set_top(-2);
            Ok(result)
        }
    }
}
