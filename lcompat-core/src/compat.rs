//! Newer-revision API surface as methods on any host
//!
//! On a 5.2 host the core functions the host already has come from
//! [`RawApi`]; the rest are filled in here for both revisions.
//!
//! ```ignore
//! use lcompat_core::{Compat, MemoryHost, RawApi};
//!
//! let mut host = MemoryHost::new();
//! host.push_number(10.0);
//! host.push_number(3.0);
//! host.arith(1)?; // subtraction
//! ```

use std::io::{self, Read};
use std::path::Path;

use crate::buffer::Buffer;
use crate::error::CompatResult;
use crate::host::{NativeFn, RawApi, Status, ValueType};
use crate::{access, convert, loader, registrar, rotate, traceback};
#[cfg(feature = "lua51")]
use crate::{index, operator};

/// Extension trait implemented for every [`RawApi`] host
pub trait Compat: RawApi + Sized {
    // ===== stack =====

    #[cfg(feature = "lua51")]
    fn abs_index(&self, idx: i32) -> i32 {
        index::abs_index(self, idx)
    }

    fn rotate(&mut self, idx: i32, n: i32) -> CompatResult<()> {
        rotate::rotate(self, idx, n)
    }

    fn insert(&mut self, idx: i32) -> CompatResult<()> {
        rotate::insert(self, idx)
    }

    fn remove(&mut self, idx: i32) -> CompatResult<()> {
        rotate::remove(self, idx)
    }

    #[cfg(feature = "lua51")]
    fn copy(&mut self, from: i32, to: i32) -> CompatResult<()> {
        access::copy(self, from, to)
    }

    // ===== access =====

    #[cfg(feature = "lua51")]
    fn len(&mut self, idx: i32) -> CompatResult<()> {
        access::len(self, idx)
    }

    fn len_l(&mut self, idx: i32) -> CompatResult<i64> {
        access::len_l(self, idx)
    }

    #[cfg(feature = "lua51")]
    fn raw_getp(&mut self, idx: i32, p: usize) -> ValueType {
        access::raw_getp(self, idx, p)
    }

    #[cfg(feature = "lua51")]
    fn raw_setp(&mut self, idx: i32, p: usize) -> CompatResult<()> {
        access::raw_setp(self, idx, p)
    }

    fn geti(&mut self, idx: i32, i: i64) -> CompatResult<ValueType> {
        access::geti(self, idx, i)
    }

    fn seti(&mut self, idx: i32, i: i64) -> CompatResult<()> {
        access::seti(self, idx, i)
    }

    // ===== conversions =====

    #[cfg(feature = "lua51")]
    fn to_integer_x(&self, idx: i32) -> Option<i64> {
        convert::to_integer_x(self, idx)
    }

    #[cfg(feature = "lua51")]
    fn to_number_x(&self, idx: i32) -> Option<f64> {
        convert::to_number_x(self, idx)
    }

    fn is_integer(&self, idx: i32) -> bool {
        convert::is_integer(self, idx)
    }

    fn string_to_number(&mut self, s: &str) -> usize {
        convert::string_to_number(self, s)
    }

    fn to_lstring(&mut self, idx: i32) -> CompatResult<Vec<u8>> {
        convert::to_lstring(self, idx)
    }

    // ===== operators =====

    #[cfg(feature = "lua51")]
    fn arith(&mut self, op: i32) -> CompatResult<()> {
        operator::arith(self, op)
    }

    #[cfg(feature = "lua51")]
    fn compare(&mut self, idx1: i32, idx2: i32, op: i32) -> CompatResult<bool> {
        operator::compare(self, idx1, idx2, op)
    }

    // ===== auxiliary library =====

    fn new_buffer(&mut self) -> Buffer<'_, Self> {
        Buffer::new(self)
    }

    fn get_subtable(&mut self, idx: i32, name: &str) -> CompatResult<bool> {
        registrar::get_subtable(self, idx, name)
    }

    fn set_funcs(&mut self, funcs: &[(&str, NativeFn<Self>)], nup: i32) -> CompatResult<()> {
        registrar::set_funcs(self, funcs, nup)
    }

    fn set_metatable_named(&mut self, tname: &str) -> CompatResult<()> {
        registrar::set_metatable_named(self, tname)
    }

    fn test_udata(&mut self, idx: i32, tname: &str) -> CompatResult<Option<usize>> {
        registrar::test_udata(self, idx, tname)
    }

    fn requiref(&mut self, modname: &str, openf: NativeFn<Self>, global: bool) -> CompatResult<()> {
        registrar::requiref(self, modname, openf, global)
    }

    fn traceback(&mut self, msg: Option<&str>, level: i32) -> CompatResult<()> {
        traceback::traceback(self, msg, level)
    }

    fn file_result<T>(&mut self, result: &io::Result<T>, fname: Option<&str>) -> i32 {
        loader::file_result(self, result, fname)
    }

    // ===== loading =====

    fn load_bufferx(&mut self, buff: &[u8], name: &str, mode: Option<&str>) -> CompatResult<Status> {
        loader::load_bufferx(self, buff, name, mode)
    }

    fn loadx<R: Read>(&mut self, reader: R, chunkname: &str, mode: Option<&str>) -> CompatResult<Status> {
        loader::loadx(self, reader, chunkname, mode)
    }

    fn load_filex(&mut self, path: Option<&Path>, mode: Option<&str>) -> CompatResult<Status> {
        loader::load_filex(self, path, mode)
    }
}

impl<H: RawApi> Compat for H {}
