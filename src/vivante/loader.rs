//! 通过 `libloading` 在运行时打开 `libEGL` 并解析 `fb*` 入口点。

use std::ffi::c_void;
use std::fmt::Display;
use std::ptr::NonNull;
use std::rc::Rc;

use libc::{c_int, c_uint, c_ulong};
use libloading::Library;

use super::{
    DisplayApi, DisplayInfo, DisplayLoader, NativeDisplay, NativeWindow, WindowGeometry, WindowInfo,
};
use crate::error::Error;

/// 默认的候选库名，按顺序尝试
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["libEGL.so.1", "libEGL.so"];

/// 必需的入口点；顺序与 [`EntryPoints::resolve`] 中的槽位一致
pub const REQUIRED_SYMBOLS: [&str; 9] = [
    "fbGetDisplay",
    "fbGetDisplayByIndex",
    "fbGetDisplayGeometry",
    "fbGetDisplayInfo",
    "fbDestroyDisplay",
    "fbCreateWindow",
    "fbGetWindowGeometry",
    "fbGetWindowInfo",
    "fbDestroyWindow",
];

type PfnGetDisplay = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type PfnGetDisplayByIndex = unsafe extern "C" fn(c_int) -> *mut c_void;
type PfnGetDisplayGeometry = unsafe extern "C" fn(*mut c_void, *mut c_int, *mut c_int);
type PfnGetDisplayInfo =
    unsafe extern "C" fn(*mut c_void, *mut c_int, *mut c_int, *mut c_ulong, *mut c_int, *mut c_int);
type PfnDestroyDisplay = unsafe extern "C" fn(*mut c_void);
type PfnCreateWindow = unsafe extern "C" fn(*mut c_void, c_int, c_int, c_int, c_int) -> *mut c_void;
type PfnGetWindowGeometry = unsafe extern "C" fn(*mut c_void, *mut c_int, *mut c_int, *mut c_int, *mut c_int);
type PfnGetWindowInfo = unsafe extern "C" fn(
    *mut c_void,
    *mut c_int,
    *mut c_int,
    *mut c_int,
    *mut c_int,
    *mut c_int,
    *mut c_uint,
);
type PfnDestroyWindow = unsafe extern "C" fn(*mut c_void);

/// 已解析的函数指针表。只有全部解析成功才能构造出来。
#[derive(Clone, Copy)]
struct EntryPoints {
    get_display: PfnGetDisplay,
    get_display_by_index: PfnGetDisplayByIndex,
    get_display_geometry: PfnGetDisplayGeometry,
    get_display_info: PfnGetDisplayInfo,
    destroy_display: PfnDestroyDisplay,
    create_window: PfnCreateWindow,
    get_window_geometry: PfnGetWindowGeometry,
    get_window_info: PfnGetWindowInfo,
    destroy_window: PfnDestroyWindow,
}

impl EntryPoints {
    /// 用 `lookup` 按名字逐个查找符号。任何一个缺失都会返回
    /// [`Error::MissingEntryPoints`]，列出所有缺失的名字。
    ///
    /// # Safety
    /// `lookup` 返回的地址必须指向签名与 Vivante `fb*` API 一致的函数，
    /// 且在返回的表被使用期间保持有效。
    unsafe fn resolve(mut lookup: impl FnMut(&'static str) -> Option<NonNull<c_void>>) -> Result<Self, Error> {
        let mut slots = [std::ptr::null_mut::<c_void>(); REQUIRED_SYMBOLS.len()];
        let mut missing = Vec::new();

        for (slot, name) in slots.iter_mut().zip(REQUIRED_SYMBOLS) {
            match lookup(name) {
                Some(ptr) => *slot = ptr.as_ptr(),
                None => missing.push(name),
            }
        }

        if !missing.is_empty() {
            return Err(Error::MissingEntryPoints(missing));
        }

        use std::mem::transmute;
        Ok(Self {
            get_display: transmute::<*mut c_void, PfnGetDisplay>(slots[0]),
            get_display_by_index: transmute::<*mut c_void, PfnGetDisplayByIndex>(slots[1]),
            get_display_geometry: transmute::<*mut c_void, PfnGetDisplayGeometry>(slots[2]),
            get_display_info: transmute::<*mut c_void, PfnGetDisplayInfo>(slots[3]),
            destroy_display: transmute::<*mut c_void, PfnDestroyDisplay>(slots[4]),
            create_window: transmute::<*mut c_void, PfnCreateWindow>(slots[5]),
            get_window_geometry: transmute::<*mut c_void, PfnGetWindowGeometry>(slots[6]),
            get_window_info: transmute::<*mut c_void, PfnGetWindowInfo>(slots[7]),
            destroy_window: transmute::<*mut c_void, PfnDestroyWindow>(slots[8]),
        })
    }
}

/// 依次尝试打开 `names` 中的每个库，返回第一个成功的结果及其名字。
fn open_first<T, E: Display>(
    names: &[String],
    mut open: impl FnMut(&str) -> Result<T, E>,
) -> Result<(T, String), Error> {
    for name in names {
        match open(name) {
            Ok(handle) => return Ok((handle, name.clone())),
            Err(e) => tracing::debug!("无法打开 {}: {}", name, e),
        }
    }
    Err(Error::LibraryNotFound { tried: names.to_vec() })
}

/// 已打开的 `libEGL` 及其 `fb*` 入口点
pub struct VivanteLibrary {
    entry: EntryPoints,
    name: String,
    // 必须在 entry 之后析构；函数指针只在库存活期间有效
    _library: Library,
}

impl VivanteLibrary {
    /// 按顺序尝试候选库名并解析全部入口点
    pub fn open(names: &[String]) -> Result<Self, Error> {
        // SAFETY: 加载 libEGL 会运行其初始化代码，这是使用该库的前提
        let (library, name) = open_first(names, |name| unsafe { Library::new(name) })?;

        // SAFETY: 符号按 Vivante 头文件 (EGL/eglvivante.h) 中的签名解释；
        // 表与 `library` 存放在同一结构体中，生命周期一致
        let entry = unsafe {
            EntryPoints::resolve(|symbol| {
                library
                    .get::<*mut c_void>(symbol.as_bytes())
                    .ok()
                    .and_then(|sym| NonNull::new(*sym))
            })
        };

        // 解析失败时 library 在这里被释放
        let entry = entry?;
        tracing::info!("已加载 {} 中的 Vivante fbdev 入口点", name);

        Ok(Self { entry, name, _library: library })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for VivanteLibrary {
    fn drop(&mut self) {
        tracing::debug!("释放 {}", self.name);
    }
}

impl DisplayApi for VivanteLibrary {
    fn get_display(&self, context: Option<NonNull<c_void>>) -> Option<NativeDisplay> {
        let context = context.map_or(std::ptr::null_mut(), NonNull::as_ptr);
        // SAFETY: fbGetDisplay 接受空上下文
        NativeDisplay::from_raw(unsafe { (self.entry.get_display)(context) })
    }

    fn get_display_by_index(&self, index: i32) -> Option<NativeDisplay> {
        // SAFETY: 无效索引时返回空指针
        NativeDisplay::from_raw(unsafe { (self.entry.get_display_by_index)(index) })
    }

    fn get_display_geometry(&self, display: NativeDisplay) -> (i32, i32) {
        let (mut width, mut height) = (0, 0);
        // SAFETY: display 来自 fbGetDisplay*，输出指针指向栈上变量
        unsafe { (self.entry.get_display_geometry)(display.as_ptr(), &mut width, &mut height) };
        (width, height)
    }

    fn get_display_info(&self, display: NativeDisplay) -> DisplayInfo {
        let (mut width, mut height, mut stride, mut bpp) = (0, 0, 0, 0);
        let mut physical: c_ulong = 0;
        // SAFETY: 同上
        unsafe {
            (self.entry.get_display_info)(
                display.as_ptr(),
                &mut width,
                &mut height,
                &mut physical,
                &mut stride,
                &mut bpp,
            )
        };
        DisplayInfo { width, height, physical: physical as u64, stride, bits_per_pixel: bpp }
    }

    fn destroy_display(&self, display: NativeDisplay) {
        // SAFETY: 调用方保证 display 不再被使用
        unsafe { (self.entry.destroy_display)(display.as_ptr()) };
    }

    fn create_window(&self, display: NativeDisplay, geometry: WindowGeometry) -> Option<NativeWindow> {
        let WindowGeometry { x, y, width, height } = geometry;
        // SAFETY: display 有效；失败时返回空指针
        NativeWindow::from_raw(unsafe { (self.entry.create_window)(display.as_ptr(), x, y, width, height) })
    }

    fn get_window_geometry(&self, window: NativeWindow) -> WindowGeometry {
        let mut geometry = WindowGeometry::default();
        // SAFETY: window 来自 fbCreateWindow
        unsafe {
            (self.entry.get_window_geometry)(
                window.as_ptr(),
                &mut geometry.x,
                &mut geometry.y,
                &mut geometry.width,
                &mut geometry.height,
            )
        };
        geometry
    }

    fn get_window_info(&self, window: NativeWindow) -> WindowInfo {
        let mut info = WindowInfo::default();
        let g = &mut info.geometry;
        // SAFETY: 同上
        unsafe {
            (self.entry.get_window_info)(
                window.as_ptr(),
                &mut g.x,
                &mut g.y,
                &mut g.width,
                &mut g.height,
                &mut info.bits_per_pixel,
                &mut info.offset,
            )
        };
        info
    }

    fn destroy_window(&self, window: NativeWindow) {
        // SAFETY: 调用方保证 window 不再被使用
        unsafe { (self.entry.destroy_window)(window.as_ptr()) };
    }
}

/// 默认加载器：按配置的库名顺序加载 [`VivanteLibrary`]
#[derive(Debug, Clone)]
pub struct VivanteLoader {
    names: Vec<String>,
}

impl VivanteLoader {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl Default for VivanteLoader {
    fn default() -> Self {
        Self::new(DEFAULT_LIBRARY_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

impl DisplayLoader for VivanteLoader {
    fn load(&self) -> Result<Rc<dyn DisplayApi>, Error> {
        Ok(Rc::new(VivanteLibrary::open(&self.names)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn dummy() {}

    fn dummy_ptr() -> Option<NonNull<c_void>> {
        NonNull::new(dummy as *mut c_void)
    }

    #[test]
    fn open_first_falls_back_in_order() {
        let names = vec!["libEGL.so.1".to_string(), "libEGL.so".to_string()];
        let mut attempts = Vec::new();
        let (handle, name) = open_first(&names, |name| {
            attempts.push(name.to_string());
            if name == "libEGL.so" { Ok(42) } else { Err("not found") }
        })
        .unwrap();

        assert_eq!(handle, 42);
        assert_eq!(name, "libEGL.so");
        assert_eq!(attempts, names);
    }

    #[test]
    fn open_first_reports_every_name_tried() {
        let names = vec!["a.so".to_string(), "b.so".to_string()];
        let err = open_first::<(), _>(&names, |_| Err("nope")).unwrap_err();
        match err {
            Error::LibraryNotFound { tried } => assert_eq!(tried, names),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_requires_every_symbol() {
        let mut asked = Vec::new();
        let result = unsafe {
            EntryPoints::resolve(|name| {
                asked.push(name);
                if name == "fbGetDisplayInfo" || name == "fbDestroyWindow" { None } else { dummy_ptr() }
            })
        };

        // 即使前面已缺失，也会继续查找，以便一次报告全部缺失项
        assert_eq!(asked, REQUIRED_SYMBOLS);
        match result {
            Err(Error::MissingEntryPoints(missing)) => {
                assert_eq!(missing, vec!["fbGetDisplayInfo", "fbDestroyWindow"]);
            }
            _ => panic!("expected missing entry points"),
        }
    }

    #[test]
    fn resolve_succeeds_when_all_present() {
        assert!(unsafe { EntryPoints::resolve(|_| dummy_ptr()) }.is_ok());
    }

    #[test]
    fn missing_library_fails_without_resolving() {
        let err = VivanteLibrary::open(&["libdefinitely-not-vivante-egl.so.0".to_string()]);
        assert!(matches!(err, Err(Error::LibraryNotFound { .. })));
    }
}
