//! Slot and table access helpers

use crate::compat::Compat;
use crate::error::{CompatError, CompatResult};
use crate::host::{RawApi, ValueType};
use crate::index::abs_index;
use crate::rotate::insert;

/// Copy the value at `from` into slot `to`.
#[cfg(feature = "lua51")]
pub fn copy<H: RawApi>(host: &mut H, from: i32, to: i32) -> CompatResult<()> {
    let to = abs_index(host, to);
    if !host.check_stack(1) {
        return Err(CompatError::no_headroom("not enough stack slots"));
    }
    host.push_value(from);
    host.replace(to);
    Ok(())
}

/// Push the length of the value at `idx`.
///
/// Strings and tables report their raw length; userdata must provide
/// `__len`.
#[cfg(feature = "lua51")]
pub fn len<H: RawApi>(host: &mut H, idx: i32) -> CompatResult<()> {
    let ty = host.type_of(idx);
    match ty {
        ValueType::String | ValueType::Table => {
            let n = host.obj_len(idx);
            host.push_number(n as f64);
            Ok(())
        }
        ValueType::Userdata => {
            if host.call_meta(idx, "__len")? {
                return Ok(());
            }
            Err(length_error(ty))
        }
        _ => Err(length_error(ty)),
    }
}

#[cfg(feature = "lua51")]
fn length_error(ty: ValueType) -> CompatError {
    CompatError::Type(format!("attempt to get length of a {} value", ty.name()))
}

/// Length of the value at `idx` as an integer.
pub fn len_l<H: Compat>(host: &mut H, idx: i32) -> CompatResult<i64> {
    if !host.check_stack(1) {
        return Err(CompatError::no_headroom("not enough stack slots"));
    }
    host.len(idx)?;
    let n = host.to_integer_x(-1);
    host.set_top(-2);
    n.ok_or_else(|| CompatError::Type("object length is not a number".to_string()))
}

/// Push `t[p]` without metamethods, `p` being a light userdata key.
#[cfg(feature = "lua51")]
pub fn raw_getp<H: RawApi>(host: &mut H, idx: i32, p: usize) -> ValueType {
    let idx = abs_index(host, idx);
    host.push_light_userdata(p);
    host.raw_get(idx);
    host.type_of(-1)
}

/// Pop a value into `t[p]` without metamethods.
#[cfg(feature = "lua51")]
pub fn raw_setp<H: RawApi>(host: &mut H, idx: i32, p: usize) -> CompatResult<()> {
    let idx = abs_index(host, idx);
    if !host.check_stack(1) {
        return Err(CompatError::no_headroom("not enough stack slots"));
    }
    host.push_light_userdata(p);
    insert(host, -2)?;
    host.raw_set(idx);
    Ok(())
}

/// Push `t[i]`, honouring `__index`, and return its type.
pub fn geti<H: RawApi>(host: &mut H, idx: i32, i: i64) -> CompatResult<ValueType> {
    let idx = abs_index(host, idx);
    host.push_integer(i);
    host.get_table(idx)?;
    Ok(host.type_of(-1))
}

/// Pop a value into `t[i]`.
pub fn seti<H: RawApi>(host: &mut H, idx: i32, i: i64) -> CompatResult<()> {
    if !host.check_stack(1) {
        return Err(CompatError::no_headroom("not enough stack slots available"));
    }
    let idx = abs_index(host, idx);
    host.push_integer(i);
    insert(host, -2)?;
    host.set_table(idx)
}
