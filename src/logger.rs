//! Logging that is safe to do from inside an allocator.
//!
//! Heap events go through the `log` facade, after the heap lock has been
//! dropped. A logger that allocates would call straight back into the
//! allocator and log again, so events are only emitted from a thread that is
//! not already emitting one.
//!
//! [`StderrLogger`] is a sink that never allocates: records are formatted
//! into a fixed line buffer and written to file descriptor 2 with
//! `write(2)`. It is the logger to install when this crate is the process
//! allocator.

use std::{cell::Cell, fmt};

use libc::{STDERR_FILENO, c_int, c_void, write};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

thread_local! {
  static EMITTING: Cell<bool> = const { Cell::new(false) };
}

struct EmitGuard;

impl Drop for EmitGuard {
  fn drop(&mut self) {
    let _ = EMITTING.try_with(|flag| flag.set(false));
  }
}

/// Runs `emit` unless this thread is already inside an `emit`.
pub(crate) fn non_reentrant(emit: impl FnOnce()) {
  let entered = EMITTING
    .try_with(|flag| !flag.replace(true))
    .unwrap_or(false);

  if !entered {
    return;
  }

  let _guard = EmitGuard;
  emit();
}

/// `log::log!` behind [`non_reentrant`].
macro_rules! heap_log {
  ($level:expr, $($arg:tt)+) => {
    if ::log::log_enabled!($level) {
      $crate::logger::non_reentrant(|| ::log::log!($level, $($arg)+));
    }
  };
}

const LINE_CAPACITY: usize = 256;

/// A `fmt::Write` sink over a raw file descriptor with a stack buffer.
///
/// Flushes when the buffer fills and on drop.
pub struct FdWriter {
  fd: c_int,
  buffer: [u8; LINE_CAPACITY],
  len: usize,
}

impl FdWriter {
  pub const fn new(fd: c_int) -> Self {
    Self {
      fd,
      buffer: [0; LINE_CAPACITY],
      len: 0,
    }
  }

  pub const fn stderr() -> Self {
    Self::new(STDERR_FILENO)
  }

  pub fn flush(&mut self) {
    let mut written = 0;

    while written < self.len {
      let remaining = &self.buffer[written..self.len];
      let result = unsafe {
        write(
          self.fd,
          remaining.as_ptr() as *const c_void,
          remaining.len(),
        )
      };

      if result <= 0 {
        break;
      }
      written += result as usize;
    }

    self.len = 0;
  }
}

impl fmt::Write for FdWriter {
  fn write_str(
    &mut self,
    s: &str,
  ) -> fmt::Result {
    let mut bytes = s.as_bytes();

    while !bytes.is_empty() {
      if self.len == LINE_CAPACITY {
        self.flush();
      }

      let take = bytes.len().min(LINE_CAPACITY - self.len);
      self.buffer[self.len..self.len + take].copy_from_slice(&bytes[..take]);
      self.len += take;
      bytes = &bytes[take..];
    }

    Ok(())
  }
}

impl Drop for FdWriter {
  fn drop(&mut self) {
    self.flush();
  }
}

/// `log` sink writing `[LEVEL] target: message` lines to stderr.
pub struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl StderrLogger {
  /// Installs the logger and sets the maximum level.
  pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
  }
}

impl Log for StderrLogger {
  fn enabled(
    &self,
    metadata: &Metadata,
  ) -> bool {
    metadata.level() <= log::max_level()
  }

  fn log(
    &self,
    record: &Record,
  ) {
    if !self.enabled(record.metadata()) {
      return;
    }

    let mut out = FdWriter::stderr();
    let _ = fmt::Write::write_fmt(
      &mut out,
      format_args!(
        "[{}] {}: {}\n",
        record.level(),
        record.target(),
        record.args()
      ),
    );
  }

  fn flush(&self) {}
}
