//! Baseline capture and checksumming.
//!
//! A baseline is the normalized `--help` output of one command sequence. It
//! is written to `<root>/<tool>/<tool_id>.txt` next to a skeleton definition
//! `<tool_id>.json`, and summarized by a CRC-32 used as a drift signal.

mod capture;
mod generator;
mod normalize;

pub use capture::{CaptureOutput, Capturer};
pub use generator::{BaselineGenerator, BaselineResult, BaselineStatus, ensure_skeleton};
pub use normalize::{crc32_hex, normalize};
