//! 集成测试 - 通过 Compat 扩展方法的端到端场景
//!
//! 除标注 lua51 的用例外，`--no-default-features --features lua52` 下同样运行

mod common;

use common::{host_with_frames, host_with_numbers, host_with_strings, rendered, top_string};
use lcompat_core::{
    compiled_revision, ArithOp, Compat, CompareOp, HostRevision, FrameInfo, FrameKind, MemoryHost, NativeFn, RawApi, ValueType,
    BUFFER_SIZE, REGISTRY_INDEX,
};

#[test]
fn test_subtract_end_to_end() {
    let mut host = host_with_numbers(&[10.0, 3.0]);
    host.arith(ArithOp::Sub as i32).unwrap();
    assert_eq!(rendered(&host), vec!["7"]);
}

#[test]
fn test_arith_uses_metamethods() {
    let mut host = MemoryHost::new();
    host.new_table();
    host.new_table();
    host.push_closure(
        |h: &mut MemoryHost| {
            h.push_str("added");
            Ok(1)
        },
        0,
    );
    host.set_field(-2, "__add").unwrap();
    host.set_metatable(-2);
    host.push_number(1.0);
    host.arith(ArithOp::Add as i32).unwrap();
    assert_eq!(rendered(&host), vec!["added"]);

    host.set_top(0);
    host.push_boolean(true);
    host.push_number(1.0);
    let err = host.arith(ArithOp::Sub as i32).unwrap_err();
    assert_eq!(err.to_string(), "attempt to perform arithmetic on a boolean value");
}

#[test]
fn test_compare_invalid_index_is_false() {
    let mut host = host_with_numbers(&[1.0]);
    assert!(!host.compare(1, 2, CompareOp::Eq as i32).unwrap());
    assert!(!host.compare(2, 1, CompareOp::Lt as i32).unwrap());
    assert!(host.compare(1, -1, CompareOp::Le as i32).unwrap());
}

#[test]
fn test_conversions_and_copy() {
    let mut host = host_with_strings(&["12", "x"]);
    assert_eq!(host.to_integer_x(1), Some(12));
    assert_eq!(host.to_number_x(2), None);
    host.copy(1, 2).unwrap();
    assert_eq!(rendered(&host), vec!["12", "12"]);
    assert_eq!(host.abs_index(-1), 2);
}

#[test]
fn test_same_surface_on_both_revisions() {
    let expected = if cfg!(feature = "lua52") {
        HostRevision::Lua52
    } else {
        HostRevision::Lua51
    };
    assert_eq!(compiled_revision(), expected);

    // 5.2 宿主不编译任何脚本片段
    let mut host = host_with_numbers(&[2.0, 3.0]);
    host.arith(ArithOp::Pow as i32).unwrap();
    assert_eq!(rendered(&host), vec!["8"]);
    let compiled = if cfg!(feature = "lua52") { 0 } else { 1 };
    assert_eq!(host.compile_count(), compiled);
}

#[test]
fn test_rotate_end_to_end() {
    let mut host = host_with_strings(&["a", "b", "c", "d", "e"]);
    host.rotate(1, 2).unwrap();
    assert_eq!(rendered(&host), vec!["d", "e", "a", "b", "c"]);
}

#[test]
fn test_insert_and_remove_keep_order() {
    let mut host = host_with_strings(&["a", "b", "c", "d"]);
    host.insert(2).unwrap();
    assert_eq!(rendered(&host), vec!["a", "d", "b", "c"]);
    host.remove(-1).unwrap();
    host.remove(1).unwrap();
    assert_eq!(rendered(&host), vec!["d", "b"]);
}

// 5.1 宿主上由脚本片段实现
#[cfg(feature = "lua51")]
#[test]
fn test_less_equal_compiles_once() {
    let mut host = host_with_numbers(&[1.0, 2.0]);
    for _ in 0..5 {
        assert!(host.compare(1, 2, CompareOp::Le as i32).unwrap());
        assert!(!host.compare(2, 1, CompareOp::Le as i32).unwrap());
    }
    assert_eq!(host.compile_count(), 1);
    assert_eq!(host.get_top(), 2);
}

#[cfg(feature = "lua51")]
#[test]
fn test_operator_caches_are_per_context() {
    let mut first = host_with_numbers(&[1.0, 2.0]);
    let mut second = host_with_numbers(&[1.0, 2.0]);
    first.arith(ArithOp::Add as i32).unwrap();
    second.arith(ArithOp::Mul as i32).unwrap();
    assert_eq!(first.compile_count(), 1);
    assert_eq!(second.compile_count(), 1);
    assert_eq!(rendered(&first), vec!["3"]);
    assert_eq!(rendered(&second), vec!["2"]);
}

#[test]
fn test_buffer_accumulates_values() {
    let mut host = MemoryHost::new();
    host.push_str("kept");
    let mut buffer = host.new_buffer();
    for i in 0..2000 {
        buffer.host().push_number(i as f64);
        buffer.add_value().unwrap();
        buffer.add_char(b',').unwrap();
    }
    assert!(buffer.len() > BUFFER_SIZE);
    buffer.finish();

    let expected: String = (0..2000).map(|i| format!("{i},")).collect();
    assert_eq!(host.get_top(), 2);
    assert_eq!(top_string(&host), expected);
    assert_eq!(host.string_at(1).as_deref(), Some("kept"));
}

fn open_geometry(host: &mut MemoryHost) -> lcompat_core::CompatResult<i32> {
    host.new_table();
    host.push_number(2.0);
    host.set_field(-2, "dimensions")?;
    Ok(1)
}

fn area(host: &mut MemoryHost) -> lcompat_core::CompatResult<i32> {
    let product = host.to_number(1) * host.to_number(2);
    host.push_number(product);
    Ok(1)
}

#[test]
fn test_module_registration_flow() {
    let mut host = MemoryHost::new();
    host.requiref("geometry", open_geometry, true).unwrap();
    let funcs: [(&str, NativeFn<MemoryHost>); 1] = [("area", area)];
    host.set_funcs(&funcs, 0).unwrap();

    host.get_field(-1, "area").unwrap();
    host.push_number(3.0);
    host.push_number(4.0);
    host.call(2, 1).unwrap();
    assert_eq!(host.number_at(-1), Some(12.0));
    host.set_top(0);

    // the global and the loaded entry are the same table
    host.get_global("geometry");
    host.get_field(REGISTRY_INDEX, "_LOADED").unwrap();
    host.get_field(-1, "geometry").unwrap();
    assert!(host.raw_equal(1, 3));
    assert!(!host.get_subtable(1, "shapes").unwrap());
    assert!(host.get_subtable(1, "shapes").unwrap());
}

#[test]
fn test_userdata_with_named_metatable() {
    let mut host = MemoryHost::new();
    host.new_table();
    host.push_closure(
        |h: &mut MemoryHost| {
            h.push_str("<vector>");
            Ok(1)
        },
        0,
    );
    host.set_field(-2, "__tostring").unwrap();
    host.push_closure(
        |h: &mut MemoryHost| {
            h.push_number(3.0);
            Ok(1)
        },
        0,
    );
    host.set_field(-2, "__len").unwrap();
    host.set_field(REGISTRY_INDEX, "Vector").unwrap();

    host.new_userdata(24);
    host.set_metatable_named("Vector").unwrap();
    assert!(host.test_udata(-1, "Vector").unwrap().is_some());
    assert_eq!(host.len_l(-1).unwrap(), 3);
    assert_eq!(host.to_lstring(-1).unwrap(), b"<vector>");
    assert_eq!(host.get_top(), 2);
}

#[test]
fn test_raw_pointer_slots_in_registry() {
    let mut host = MemoryHost::new();
    static KEY: u8 = 0;
    let key = &KEY as *const u8 as usize;
    host.push_str("private");
    host.raw_setp(REGISTRY_INDEX, key).unwrap();
    assert_eq!(host.raw_getp(REGISTRY_INDEX, key), ValueType::String);
    assert_eq!(top_string(&host), "private");
}

#[test]
fn test_traceback_depth_windows() {
    for depth in [1usize, 5, 22] {
        let mut host = host_with_frames(depth);
        host.traceback(None, 0).unwrap();
        let text = top_string(&host);
        assert!(!text.contains("..."));
        // outermost frame comes last
        let positions: Vec<usize> = (0..depth)
            .rev()
            .map(|i| text.find(&format!("'f{i}'")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "depth {depth}");
    }

    let depth = 30;
    let mut host = host_with_frames(depth);
    host.traceback(Some("failure"), 0).unwrap();
    let text = top_string(&host);
    assert!(text.starts_with("failure\nstack traceback:"));
    assert_eq!(text.matches("...").count(), 1);
    let shown: Vec<usize> = (0..depth)
        .filter(|i| text.contains(&format!("'f{i}'")))
        .collect();
    // the last 12 pushed are the innermost levels, the first 10 the outermost
    let expected: Vec<usize> = (0..10).chain(depth - 12..depth).collect();
    assert_eq!(shown, expected);
}

#[test]
fn test_traceback_names_native_caller() {
    let mut host = MemoryHost::new();
    host.push_frame(FrameInfo::new("main.lua", FrameKind::Main).at_line(3));
    host.push_closure(
        |h: &mut MemoryHost| {
            h.traceback(Some("inside"), 0)?;
            Ok(1)
        },
        0,
    );
    host.push_value(-1);
    host.set_global("reporter");
    host.call(0, 1).unwrap();

    assert_eq!(
        top_string(&host),
        "inside\nstack traceback:\n\t[C]: in function 'reporter'\n\tmain.lua:3: in main chunk"
    );
}
