//! [`FailureSink`] backed by `tracing`.
//!
//! User notices are emitted as `warn!` events carrying the localization key so
//! whatever renders the UI can subscribe to them; failure records are
//! `error!` events with the `log_code`, `error_code` and `error_message`
//! fields.

use tracing::{error, warn};
use uuid::Uuid;

use crate::application::{FailureLogRecord, FailureSink, UserNotice};

/// Emits failure notices and records for one host session.
pub struct TracingFailureSink {
    session_id: Uuid,
}

impl TracingFailureSink {
    pub fn new(session_id: Uuid) -> Self {
        Self { session_id }
    }
}

impl FailureSink for TracingFailureSink {
    fn notify(&self, notice: &UserNotice) {
        warn!(
            session = %self.session_id,
            message_key = notice.message_key,
            error_code = notice.error_code,
            "screenshare notice: {}",
            notice.message_key
        );
    }

    fn log_failure(&self, record: &FailureLogRecord) {
        error!(
            session = %self.session_id,
            log_code = record.log_code,
            error_code = record.error_code,
            error_message = %record.error_message,
            "Screenshare failed: {} (code={})",
            record.error_message,
            record.error_code
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        out.text()
    }

    #[test]
    fn test_log_failure_emits_error_with_structured_fields() {
        // Arrange
        let sink = TracingFailureSink::new(Uuid::nil());
        let record = FailureLogRecord {
            log_code: "screenshare_failed",
            error_code: 1136,
            error_message: "Permission denied".to_string(),
        };

        // Act
        let output = capture(|| sink.log_failure(&record));

        // Assert
        assert!(output.contains("ERROR"), "{output}");
        assert!(output.contains("Screenshare failed: Permission denied (code=1136)"));
        assert!(output.contains("log_code=\"screenshare_failed\""), "{output}");
        assert!(output.contains("error_code=1136"));
    }

    #[test]
    fn test_notify_emits_message_key() {
        let sink = TracingFailureSink::new(Uuid::nil());
        let notice = UserNotice {
            message_key: "app.screenshare.screenshareRetryError",
            error_code: 1121,
        };

        let output = capture(|| sink.notify(&notice));

        assert!(output.contains("WARN"));
        assert!(output.contains("app.screenshare.screenshareRetryError"));
    }
}
