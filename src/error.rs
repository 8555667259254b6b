//! 定义库的统一错误类型。
//!
//! 所有初始化阶段的失败都属于"平台错误"：以可读消息上报，并中止初始化。

use i_slint_core::api::PlatformError;
use thiserror::Error;

/// `slint-backend-vivante` 后端的主错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// 所有候选库名均无法打开。
    #[error("Vivante: EGL library not found (tried {})", .tried.join(", "))]
    LibraryNotFound { tried: Vec<String> },

    /// 库已打开，但缺少必需的入口点。
    #[error("Vivante: Failed to load required entry points: {}", .0.join(", "))]
    MissingEntryPoints(Vec<&'static str>),

    #[error("Vivante: Failed to open display")]
    DisplayOpen,

    #[error("Vivante: Failed to create native window {width}x{height}")]
    WindowCreate { width: i32, height: i32 },

    /// 辅助子系统 (evdev、摇杆等) 初始化失败。
    #[error("Vivante: Failed to initialize {name}: {reason}")]
    Subsystem { name: &'static str, reason: String },

    #[error("平台已经初始化")]
    AlreadyInitialized,

    #[error("平台尚未初始化")]
    NotInitialized,

    /// 输入设备目录等系统资源不可访问。
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn subsystem(name: &'static str, reason: impl ToString) -> Self {
        Error::Subsystem { name, reason: reason.to_string() }
    }
}

impl From<Error> for PlatformError {
    fn from(err: Error) -> Self {
        PlatformError::Other(err.to_string())
    }
}
