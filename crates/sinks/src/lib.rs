//! Scribe - Sinks
//!
//! Built-in targets and the file layer beneath them.
//!
//! # Available Targets
//!
//! | Target | Purpose |
//! |--------|---------|
//! | `file` | Rolling log files through a bounded appender cache |
//! | `console` | Human-readable stdout/stderr output |
//! | `memory` | Bounded in-process line buffer |
//! | `null` | Discard everything (benchmarking) |
//!
//! Every target implements `scribe_pipeline::Target` and is wrapped in a
//! `DispatchPipeline` by configuration.
//!
//! # Example
//!
//! ```ignore
//! use scribe_sinks::file::{FileTarget, FileTargetConfig};
//! use scribe_sinks::Layout;
//!
//! let target = FileTarget::new(
//!     "app",
//!     FileTargetConfig::new(Layout::parse("logs/${shortdate}.log")?)
//!         .with_max_archive_files(7),
//! );
//! let pipeline = DispatchPipeline::builder(Arc::new(target))
//!     .with_async(Default::default())
//!     .build(&context)?;
//! ```

// =============================================================================
// Targets
// =============================================================================

/// Console target - stdout/stderr output
pub mod console;

/// File target, appender cache, locking and archive state
pub mod file;

/// Memory target - bounded line buffer
pub mod memory;

/// Null target - discards everything
pub mod null;

// =============================================================================
// Shared utilities
// =============================================================================

pub mod layout;

/// Buffer and string pools
pub mod util;

pub use console::{ConsoleConfig, ConsoleStream, ConsoleTarget};
pub use file::{FileAppenderCache, FileError, FileTarget, FileTargetConfig, LockingMode};
pub use layout::{DEFAULT_LAYOUT, Layout, LayoutError};
pub use memory::{MemoryConfig, MemoryTarget};
pub use null::NullTarget;
pub use util::{BufferPool, StringPool};
