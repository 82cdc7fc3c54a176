//! Module and metatable registration helpers

use tracing::debug;

use crate::error::{CompatError, CompatResult};
use crate::host::{NativeFn, RawApi, ValueType, GLOBALS_INDEX, REGISTRY_INDEX};
use crate::index::abs_index;

/// Registry field holding the loaded-modules table
pub const LOADED_TABLE: &str = "_LOADED";

/// Register `funcs` into the table below the `nup` upvalues on top.
///
/// Every closure captures its own copy of the upvalues; the upvalues are
/// popped afterwards.
pub fn set_funcs<H: RawApi>(host: &mut H, funcs: &[(&str, NativeFn<H>)], nup: i32) -> CompatResult<()> {
    if !host.check_stack(nup + 1) {
        return Err(CompatError::no_headroom("too many upvalues"));
    }
    for (name, f) in funcs {
        for _ in 0..nup {
            host.push_value(-nup);
        }
        host.push_native(*f, nup);
        // table sits below the upvalues and the closure
        host.set_field(-(nup + 2), name)?;
    }
    host.set_top(-nup - 1);
    debug!(target: "lcompat::registrar", count = funcs.len(), nup, "functions registered");
    Ok(())
}

/// Ensure `t[name]` is a table and push it; true if it already existed.
pub fn get_subtable<H: RawApi>(host: &mut H, idx: i32, name: &str) -> CompatResult<bool> {
    let idx = abs_index(host, idx);
    if !host.check_stack(3) {
        return Err(CompatError::no_headroom("not enough stack slots"));
    }
    host.get_field(idx, name)?;
    if host.type_of(-1) == ValueType::Table {
        return Ok(true);
    }
    host.set_top(-2);
    host.new_table();
    host.push_value(-1);
    host.set_field(idx, name)?;
    Ok(false)
}

/// Give the value on top the metatable registered as `tname`.
pub fn set_metatable_named<H: RawApi>(host: &mut H, tname: &str) -> CompatResult<()> {
    if !host.check_stack(1) {
        return Err(CompatError::no_headroom("not enough stack slots"));
    }
    host.get_field(REGISTRY_INDEX, tname)?;
    host.set_metatable(-2);
    Ok(())
}

/// Address of the userdata at `idx` if its metatable is the one registered
/// as `tname`.
pub fn test_udata<H: RawApi>(host: &mut H, idx: i32, tname: &str) -> CompatResult<Option<usize>> {
    let p = host.to_userdata(idx);
    if !host.check_stack(2) {
        return Err(CompatError::no_headroom("not enough stack slots"));
    }
    let Some(p) = p else {
        return Ok(None);
    };
    if !host.get_metatable(idx) {
        return Ok(None);
    }
    host.get_field(REGISTRY_INDEX, tname)?;
    let same = host.raw_equal(-1, -2);
    host.set_top(-3);
    Ok(same.then_some(p))
}

/// Open module `modname` with `openf` unless it is already loaded, and
/// leave the module on top.
///
/// The module is recorded in the loaded-modules table and, with `global`,
/// also stored as a global of the same name.
pub fn requiref<H: RawApi>(
    host: &mut H,
    modname: &str,
    openf: NativeFn<H>,
    global: bool,
) -> CompatResult<()> {
    if !host.check_stack(3) {
        return Err(CompatError::no_headroom("not enough stack slots available"));
    }
    host.get_field(REGISTRY_INDEX, LOADED_TABLE)?;
    host.get_field(-1, modname)?;
    if !host.to_boolean(-1) {
        host.set_top(-2);
        host.push_native(openf, 0);
        host.push_bytes(modname.as_bytes());
        host.call(1, 1)?;
        host.push_value(-1);
        host.set_field(-3, modname)?;
        debug!(target: "lcompat::registrar", modname, "module opened");
    }
    if global {
        host.push_value(-1);
        host.set_field(GLOBALS_INDEX, modname)?;
    }
    host.replace(-2);
    Ok(())
}
