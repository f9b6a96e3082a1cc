// 捕获配置：两个输出路径与捕获超时，超时可通过环境变量覆盖
use crate::errno::Errno;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) const CAPTURE_TIMEOUT_ENV: &str = "ANR_TRACE_CAPTURE_TIMEOUT_MS";
pub(crate) const DEBUG_ENV: &str = "ANR_TRACE_DEBUG";

const CAPTURE_TIMEOUT_DEFAULT: Duration = Duration::from_secs(20);
const CAPTURE_TIMEOUT_MIN: Duration = Duration::from_millis(100);
const CAPTURE_TIMEOUT_MAX: Duration = Duration::from_secs(120);

/// Output files for captured trace text.
///
/// `anr_trace_path` receives dumps caused by the platform watchdog,
/// `self_trace_path` receives dumps the process requested itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceDestinations {
    anr_trace_path: PathBuf,
    self_trace_path: PathBuf,
}

impl TraceDestinations {
    pub fn new(
        anr_trace_path: impl Into<PathBuf>,
        self_trace_path: impl Into<PathBuf>,
    ) -> Result<Self, Errno> {
        let anr_trace_path = anr_trace_path.into();
        let self_trace_path = self_trace_path.into();
        validate_destination(&anr_trace_path)?;
        validate_destination(&self_trace_path)?;
        Ok(Self {
            anr_trace_path,
            self_trace_path,
        })
    }

    pub fn anr_trace_path(&self) -> &Path {
        &self.anr_trace_path
    }

    pub fn self_trace_path(&self) -> &Path {
        &self.self_trace_path
    }
}

// 仅接受非空绝对路径
fn validate_destination(path: &Path) -> Result<(), Errno> {
    if path.as_os_str().is_empty() || !path.is_absolute() {
        return Err(Errno::InvalidArg);
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub destinations: TraceDestinations,
    pub capture_timeout: Duration,
}

impl MonitorConfig {
    pub fn new(destinations: TraceDestinations) -> Self {
        Self {
            destinations,
            capture_timeout: capture_timeout_from_env(),
        }
    }

    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = clamp_timeout(timeout);
        self
    }
}

fn capture_timeout_from_env() -> Duration {
    let Ok(value) = env::var(CAPTURE_TIMEOUT_ENV) else {
        return CAPTURE_TIMEOUT_DEFAULT;
    };
    parse_timeout_ms(&value).unwrap_or(CAPTURE_TIMEOUT_DEFAULT)
}

pub(crate) fn parse_timeout_ms(value: &str) -> Option<Duration> {
    let millis = value.trim().parse::<u64>().ok()?;
    Some(clamp_timeout(Duration::from_millis(millis)))
}

fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.clamp(CAPTURE_TIMEOUT_MIN, CAPTURE_TIMEOUT_MAX)
}

pub(crate) fn debug_from_env() -> Option<bool> {
    let value = env::var(DEBUG_ENV).ok()?;
    parse_bool_env_value(&value)
}

pub(crate) fn parse_bool_env_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
