#![allow(dead_code)]

pub use modulebus_test_utils::builders::ConfigBuilder;
pub use modulebus_test_utils::recorder::{Journal, Recorder, Silent, recorder, register};
pub use modulebus_test_utils::{capture_logs, init_tracing, serve_with, wait_for_state, wait_until, with_timeout};

use std::error::Error;

pub type TestResult = Result<(), Box<dyn Error>>;
