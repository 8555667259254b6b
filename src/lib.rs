//! Slint 的 Vivante fbdev/EGL 平台后端
//!
//! 运行时从 `libEGL` 加载 Vivante 的 `fb*` 显示接口，打开显示器并登记为主显示器，
//! 再把 evdev 输入 (键盘、字符、指针移动、点击、滚轮) 转发给当前持有焦点的窗口。
//! EGL 表面与上下文由调用方用 [`VivanteWindow::native_window`] 自行创建。
pub mod cursor;
pub mod error;
pub mod event;
pub mod input;
pub mod joystick;
pub mod monitor;
pub mod platform;
pub mod timer;
pub mod tty;
pub mod vivante;
pub mod window;

pub use error::Error;
pub use platform::{version_string, VivantePlatform, VivantePlatformBuilder};
pub use window::{SlintWindowInput, VivanteWindow, WindowInput};

/// 使用默认配置创建并初始化平台。
///
/// 默认配置依次尝试 `libEGL.so.1`、`libEGL.so`，打开默认显示器，
/// 切换 `/dev/tty1` 到图形模式，并自动发现输入设备。
/// 如需自定义，请使用 [`VivantePlatformBuilder`]。
pub fn init() -> Result<VivantePlatform, Error> {
    let mut platform = VivantePlatform::builder().build();
    platform.init()?;
    Ok(platform)
}
