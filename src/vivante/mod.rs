//! Vivante fbdev 显示 API 的能力表
//!
//! Vivante GPU 的 `libEGL` 额外导出了一组 `fb*` 函数，用于在没有窗口系统的
//! 嵌入式 Linux 上获取 EGL 所需的原生显示与原生窗口句柄。平台只依赖
//! [`DisplayApi`] 这一 trait；实际的符号加载由 [`DisplayLoader`] 完成并注入。

mod loader;

use std::ffi::c_void;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::error::Error;

pub use self::loader::{VivanteLibrary, VivanteLoader, DEFAULT_LIBRARY_NAMES, REQUIRED_SYMBOLS};

/// 原生显示句柄 (`EGLNativeDisplayType`)，保证非空
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeDisplay(NonNull<c_void>);

impl NativeDisplay {
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// 原生窗口句柄 (`EGLNativeWindowType`)，保证非空
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeWindow(NonNull<c_void>);

impl NativeWindow {
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// `fbGetDisplayInfo` 的输出
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayInfo {
    pub width: i32,
    pub height: i32,
    /// 显存物理地址
    pub physical: u64,
    pub stride: i32,
    pub bits_per_pixel: i32,
}

/// 窗口在显示器上的位置和尺寸 (像素)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl WindowGeometry {
    /// 设备坐标是否落在窗口内 (含边界)
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (left, top) = (f64::from(self.x), f64::from(self.y));
        x >= left && y >= top && x <= left + f64::from(self.width) && y <= top + f64::from(self.height)
    }

    /// 设备坐标 -> 窗口局部坐标
    pub fn to_local(&self, x: f64, y: f64) -> (f64, f64) {
        (x - f64::from(self.x), y - f64::from(self.y))
    }
}

/// `fbGetWindowInfo` 的输出
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowInfo {
    pub geometry: WindowGeometry,
    pub bits_per_pixel: i32,
    pub offset: u32,
}

/// 平台所需的九个显示操作
pub trait DisplayApi {
    /// `fbGetDisplay`: `context` 为空时打开默认显示
    fn get_display(&self, context: Option<NonNull<c_void>>) -> Option<NativeDisplay>;
    fn get_display_by_index(&self, index: i32) -> Option<NativeDisplay>;
    fn get_display_geometry(&self, display: NativeDisplay) -> (i32, i32);
    fn get_display_info(&self, display: NativeDisplay) -> DisplayInfo;
    fn destroy_display(&self, display: NativeDisplay);
    fn create_window(&self, display: NativeDisplay, geometry: WindowGeometry) -> Option<NativeWindow>;
    fn get_window_geometry(&self, window: NativeWindow) -> WindowGeometry;
    fn get_window_info(&self, window: NativeWindow) -> WindowInfo;
    fn destroy_window(&self, window: NativeWindow);
}

/// 负责构造 [`DisplayApi`]。加载成功意味着全部入口点都可用。
pub trait DisplayLoader {
    fn load(&self) -> Result<Rc<dyn DisplayApi>, Error>;
}
