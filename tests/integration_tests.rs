//! 集成测试 - 门面包：配置、日志与宿主

use std::fs;

use lcompat::logger::{self, LogFormat};
use lcompat::{Compat, Config, HostRevision, MemoryHost, RawApi, Status};

fn open_empty(host: &mut MemoryHost) -> lcompat::CompatResult<i32> {
    host.new_table();
    Ok(1)
}

// 全局配置与订阅者只能设置一次，放在同一个测试中
#[test]
fn test_configured_host_and_file_logging() {
    let cfg = Config::from_json(
        r#"{
            "log": { "global": "warn", "components": { "loader": "debug" } },
            "limits": { "max_stack_size": 64 }
        }"#,
    )
    .unwrap();
    lcompat::init(cfg).unwrap();
    assert!(lcompat::config::is_initialized());
    assert!(lcompat::init(Config::default()).is_err());

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("lcompat.log");
    logger::init_with_file(LogFormat::Compact, Some(&log_path)).unwrap();

    let mut host = lcompat::new_host();
    assert_eq!(host.limits().max_stack_size, 64);
    assert!(host.check_stack(32));
    assert!(!host.check_stack(100));

    assert_eq!(
        host.load_bufferx(b"return 1", "=configured", Some("t")).unwrap(),
        Status::Ok
    );
    host.requiref("empty", open_empty, false).unwrap();

    let written = fs::read_to_string(&log_path).unwrap();
    assert!(written.contains("chunk loaded"), "{written}");
    // registrar 只开启到 warn
    assert!(!written.contains("module opened"), "{written}");
}

#[test]
fn test_compiled_revision_matches_feature() {
    let expected = if cfg!(feature = "lua52") {
        HostRevision::Lua52
    } else {
        HostRevision::Lua51
    };
    assert_eq!(lcompat::compiled_revision(), expected);
}

#[test]
fn test_facade_reexports_the_shim() {
    let mut host = MemoryHost::new();
    for item in ["x", "y", "z"] {
        host.push_str(item);
    }
    host.insert(1).unwrap();
    assert_eq!(host.string_at(1).as_deref(), Some("z"));

    let mut buffer = host.new_buffer();
    buffer.add_str("facade").unwrap();
    buffer.finish();
    assert_eq!(host.string_at(-1).as_deref(), Some("facade"));
    assert_eq!(host.get_top(), 4);
}

#[test]
fn test_invalid_config_is_reported() {
    let err = Config::from_json(r#"{ "limits": { "max_stack_size": "big" } }"#).unwrap_err();
    assert!(matches!(err, lcompat::ConfigError::Json(_)));
}
