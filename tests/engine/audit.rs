use std::io;
use std::sync::{Arc, Mutex};

use saavy_license::engine::AUDIT_TARGET;
use saavy_license::{ErrorCode, ValidationStatus};

use crate::common::{FakeAuthority, TestEnv};

const RAW_KEY: &str = "RAWSECRET-ABCDE-FGHIJ-97531";

/// Shared in-memory sink for formatted log lines.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}

#[test]
fn test_failed_validation_logs_obfuscated_key() {
    let env = TestEnv::new();
    let authority = FakeAuthority::down();
    let mut engine = env.engine(RAW_KEY, env.config(), &authority);

    let (result, logs) = capture(|| engine.validate());
    let err = result.unwrap_err();
    assert_eq!(err.code, ErrorCode::OfflineUnavailable);

    assert!(logs.contains(AUDIT_TARGET));
    assert!(logs.contains("XXXX-XXXX-7531"));
    assert!(!logs.contains(RAW_KEY));
    assert!(!err.to_string().contains(RAW_KEY));
    assert!(!err.root_cause().to_string().contains(RAW_KEY));

    let report = serde_json::to_string(&engine.status_report()).unwrap();
    assert!(!report.contains(RAW_KEY));
    assert!(report.contains("XXXX-XXXX-7531"));
}

#[test]
fn test_successful_validation_logs_obfuscated_key() {
    let env = TestEnv::new();
    let authority = FakeAuthority::answering(ValidationStatus::valid());
    let mut engine = env.engine(RAW_KEY, env.config(), &authority);

    let (result, logs) = capture(|| engine.validate());
    assert!(result.unwrap().valid);

    assert!(logs.contains("License validation succeeded"));
    assert!(logs.contains("XXXX-XXXX-7531"));
    assert!(!logs.contains(RAW_KEY));

    let report = serde_json::to_string(&engine.status_report()).unwrap();
    assert!(!report.contains(RAW_KEY));
}

#[test]
fn test_cache_files_never_hold_raw_key() {
    let env = TestEnv::new();
    let authority = FakeAuthority::answering(ValidationStatus::valid());
    env.engine(RAW_KEY, env.config(), &authority).validate().unwrap();

    for name in ["license.json", "license.key"] {
        let contents = std::fs::read_to_string(env.dir.path().join(name)).unwrap();
        assert!(!contents.contains(RAW_KEY), "{name}");
    }
}
