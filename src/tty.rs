//! 控制台 (VT) 模式切换
//!
//! Vivante 直接接管 framebuffer，但 fbcon 仍会在上面绘制光标和内核日志。
//! 初始化时把 TTY 切到图形模式，终止或收到 Ctrl+C 时恢复文本模式。

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// <linux/kd.h>
const KDSETMODE: libc::c_ulong = 0x4B3A;
const KD_TEXT: libc::c_ulong = 0x00;
const KD_GRAPHICS: libc::c_ulong = 0x01;

/// 默认 TTY，打不开时回退到 /dev/tty0
pub const DEFAULT_TTY: &str = "/dev/tty1";
const FALLBACK_TTY: &str = "/dev/tty0";

// 全局静态变量，用于在 Ctrl+C 信号处理器中恢复 TTY
static ACTIVE_TTY_PATH: Mutex<Option<PathBuf>> = Mutex::new(None);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMode {
    Text,
    Graphics,
}

impl TerminalMode {
    fn to_ulong(self) -> libc::c_ulong {
        match self {
            TerminalMode::Text => KD_TEXT,
            TerminalMode::Graphics => KD_GRAPHICS,
        }
    }
}

/// 切换终端模式。`tty` 必须是真实的 `/dev/tty*`。
pub fn set_terminal_mode(tty: &impl AsRawFd, mode: TerminalMode) -> io::Result<()> {
    // SAFETY: KDSETMODE 只读取整数参数
    match unsafe { libc::ioctl(tty.as_raw_fd(), KDSETMODE as _, mode.to_ulong()) } {
        -1 => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}

fn open_tty(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

/// 持有处于图形模式的 TTY；析构时恢复文本模式
#[derive(Debug)]
pub struct TerminalGuard {
    tty: File,
    path: PathBuf,
}

impl TerminalGuard {
    /// 打开 TTY 并切到图形模式。失败只记录警告并返回 `None`。
    pub fn acquire(path: Option<PathBuf>) -> Option<Self> {
        let preferred = path.unwrap_or_else(|| PathBuf::from(DEFAULT_TTY));
        let (tty, path) = match open_tty(&preferred) {
            Ok(file) => (file, preferred),
            // 如果首选失败且是默认的 tty1，尝试 tty0
            Err(_) if preferred == Path::new(DEFAULT_TTY) => match open_tty(Path::new(FALLBACK_TTY)) {
                Ok(file) => (file, PathBuf::from(FALLBACK_TTY)),
                Err(e) => {
                    tracing::warn!("无法打开 TTY ({}): {}。fbcon 光标可能会干扰显示。", FALLBACK_TTY, e);
                    return None;
                }
            },
            Err(e) => {
                tracing::warn!("无法打开 TTY {:?}: {}。fbcon 光标可能会干扰显示。", preferred, e);
                return None;
            }
        };

        if let Err(e) = set_terminal_mode(&tty, TerminalMode::Graphics) {
            tracing::warn!("无法将 TTY 切换到图形模式: {}", e);
        } else {
            tracing::info!("TTY {:?} 已切换到图形模式 (KD_GRAPHICS)。", path);
        }

        if let Ok(mut guard) = ACTIVE_TTY_PATH.lock() {
            *guard = Some(path.clone());
        }
        install_signal_handler();

        Some(Self { tty, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        tracing::info!("正在恢复 TTY 到文本模式...");
        if let Err(e) = set_terminal_mode(&self.tty, TerminalMode::Text) {
            tracing::error!("无法恢复 TTY 到文本模式: {}", e);
        }
        if let Ok(mut guard) = ACTIVE_TTY_PATH.lock() {
            *guard = None;
        }
    }
}

/// 注册信号处理器 (处理 SIGINT/SIGTERM)。ctrlc 只允许注册一次，重复注册的错误被忽略。
fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("接收到退出信号，正在恢复 TTY...");
        if let Ok(guard) = ACTIVE_TTY_PATH.lock() {
            if let Some(ref path) = *guard {
                if let Ok(file) = open_tty(path) {
                    let _ = set_terminal_mode(&file, TerminalMode::Text);
                }
            }
        }
        std::process::exit(0);
    });
}
