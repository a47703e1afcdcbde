//! Integration tests for startup logging
//!
//! Output is captured through a shared buffer writer under a scoped
//! subscriber.

use std::io;
use std::sync::{Arc, Mutex};

use btr_common::config::load_config;
use btr_svc::logging;
use serial_test::serial;
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter(Arc::clone(&self.0))
    }
}

impl io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "lock poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[test]
#[serial]
fn test_missing_config_warning_is_logged() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let sink = SharedBuffer::default();
    let (subscriber, _handle) = logging::subscriber(None, sink.clone());

    let config = tracing::subscriber::with_default(subscriber, || load_config(Some(&missing)));

    assert!(config.is_ok());
    let output = sink.text();
    assert!(output.contains("WARN"), "output: {}", output);
    assert!(
        output.contains("not found, using defaults"),
        "output: {}",
        output
    );
}

#[test]
#[serial]
fn test_configured_level_replaces_default_filter() {
    let sink = SharedBuffer::default();
    let (subscriber, handle) = logging::subscriber(None, sink.clone());
    assert!(!handle.from_env());

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("visible at default level");
        assert!(handle.apply_configured_level("warn").unwrap());
        tracing::info!("hidden after reload");
        tracing::warn!("still visible");
    });

    let output = sink.text();
    assert!(output.contains("visible at default level"));
    assert!(!output.contains("hidden after reload"), "output: {}", output);
    assert!(output.contains("still visible"));
}

#[test]
#[serial]
fn test_rust_log_takes_precedence_over_configured_level() {
    let (_subscriber, handle) = logging::subscriber(Some("debug"), io::sink);
    assert!(handle.from_env());
    assert!(!handle.apply_configured_level("error").unwrap());
}

#[test]
#[serial]
fn test_invalid_configured_level_is_rejected() {
    let (_subscriber, handle) = logging::subscriber(None, io::sink);
    let result = handle.apply_configured_level("btr_svc=notalevel");
    assert!(matches!(result, Err(btr_common::Error::Config(_))));
}
