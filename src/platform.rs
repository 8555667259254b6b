use crate::cursor::{CursorPosition, CursorTracker};
use crate::error::Error;
use crate::event::{Action, KeyInput, Modifiers, MouseButton, RawInput};
use crate::input::{EvdevBridge, InputConfig, InputSubsystem};
use crate::joystick::LinuxJoysticks;
use crate::monitor::{Monitor, MonitorCallback, MonitorList, Placement, DISPLAY_NAME};
use crate::timer::MonotonicTimer;
use crate::tty::TerminalGuard;
use crate::vivante::{
    DisplayApi, DisplayInfo, DisplayLoader, NativeDisplay, NativeWindow, VivanteLoader, WindowGeometry, DEFAULT_LIBRARY_NAMES,
};
use crate::window::{VivanteWindow, WindowInput};
use std::cell::Cell;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::sync::OnceLock;

/// 优先尝试的库名
const ENV_LIBRARY: &str = "SLINT_VIVANTE_LIBRARY";
/// 使用 `fbGetDisplayByIndex` 打开的显示器编号
const ENV_DISPLAY: &str = "SLINT_VIVANTE_DISPLAY";
const ENV_TTY: &str = "SLINT_TTY_DEVICE";

/// 后端版本字符串，由编译期特性拼接，只生成一次
pub fn version_string() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| {
        let mut version = format!("{} Vivante EGL", env!("CARGO_PKG_VERSION"));
        version.push_str(if cfg!(unix) { " clock_gettime" } else { " gettimeofday" });
        if cfg!(target_os = "linux") {
            version.push_str(" evdev");
        }
        if cfg!(feature = "xkb") {
            version.push_str(" xkb");
        }
        version
    })
}

/// Vivante 平台构建器
pub struct VivantePlatformBuilder {
    library_names: Option<Vec<String>>,
    display_index: Option<i32>,
    tty_path: Option<PathBuf>,
    manage_tty: bool,
    input_config: InputConfig,
    joysticks: bool,
    loader: Option<Box<dyn DisplayLoader>>,
    evdev: Option<Box<dyn InputSubsystem>>,
    joystick_subsystem: Option<Box<dyn InputSubsystem>>,
    monitor_callback: Option<MonitorCallback>,
}

impl Default for VivantePlatformBuilder {
    fn default() -> Self {
        Self {
            library_names: None,
            display_index: None,
            tty_path: None,
            manage_tty: true,
            input_config: InputConfig::default(),
            joysticks: true,
            loader: None,
            evdev: None,
            joystick_subsystem: None,
            monitor_callback: None,
        }
    }
}

impl VivantePlatformBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序尝试的 EGL 库名 (默认 `libEGL.so.1`, `libEGL.so`)。
    /// 环境变量 `SLINT_VIVANTE_LIBRARY` 总是最先尝试。
    pub fn with_library_names(mut self, names: Vec<String>) -> Self {
        self.library_names = Some(names);
        self
    }

    /// 用 `fbGetDisplayByIndex` 打开指定显示器，而不是默认显示器。
    /// 如果不设置，尝试读取环境变量 `SLINT_VIVANTE_DISPLAY`。
    pub fn with_display_index(mut self, index: i32) -> Self {
        self.display_index = Some(index);
        self
    }

    /// 设置 TTY 设备路径 (例如 "/dev/tty3")
    /// 如果不设置，默认尝试使用环境变量 `SLINT_TTY_DEVICE`，然后是 /dev/tty1, /dev/tty0
    pub fn with_tty(mut self, path: impl Into<PathBuf>) -> Self {
        self.tty_path = Some(path.into());
        self
    }

    /// 是否在运行期间把 TTY 切到图形模式 (默认: true)
    pub fn with_tty_management(mut self, enable: bool) -> Self {
        self.manage_tty = enable;
        self
    }

    /// 配置是否自动发现输入设备
    pub fn with_input_autodiscovery(mut self, enable: bool) -> Self {
        self.input_config.autodiscovery = enable;
        self
    }

    /// 开启或关闭多线程输入设备扫描 (默认: true)
    pub fn with_threaded_input(mut self, enable: bool) -> Self {
        self.input_config.threaded_input = enable;
        self
    }

    /// 只有名称包含列表中字符串的设备会被加载。
    pub fn with_input_whitelist(mut self, list: Vec<String>) -> Self {
        self.input_config.whitelist = list;
        self
    }

    /// 名称包含列表中字符串的设备将被忽略。
    pub fn with_input_blacklist(mut self, list: Vec<String>) -> Self {
        self.input_config.blacklist = list;
        self
    }

    /// 是否枚举摇杆 (默认: true)
    pub fn with_joysticks(mut self, enable: bool) -> Self {
        self.joysticks = enable;
        self
    }

    /// 替换显示 API 的加载方式
    pub fn with_loader(mut self, loader: impl DisplayLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// 替换默认的 evdev 输入子系统
    pub fn with_input_subsystem(mut self, subsystem: Box<dyn InputSubsystem>) -> Self {
        self.evdev = Some(subsystem);
        self
    }

    /// 替换默认的摇杆子系统
    pub fn with_joystick_subsystem(mut self, subsystem: Box<dyn InputSubsystem>) -> Self {
        self.joystick_subsystem = Some(subsystem);
        self
    }

    /// 显示器连接/断开时的回调
    pub fn on_monitor_event(mut self, callback: MonitorCallback) -> Self {
        self.monitor_callback = Some(callback);
        self
    }

    /// 构建平台上下文 (尚未初始化)
    pub fn build(self) -> VivantePlatform {
        VivantePlatform::new_with_config(self)
    }
}

/// Vivante 平台上下文
///
/// 生命周期: `build` -> [`init`](Self::init) -> 使用 -> [`terminate`](Self::terminate) -> drop。
/// 所有方法都应在事件循环线程上调用。
pub struct VivantePlatform {
    loader: Box<dyn DisplayLoader>,
    display_index: Option<i32>,
    tty_path: Option<PathBuf>,
    manage_tty: bool,

    api: Option<Rc<dyn DisplayApi>>,
    display: Option<NativeDisplay>,
    /// 通过 `create_window` 创建的原生窗口，终止时先于显示器销毁
    windows: Vec<Weak<Cell<Option<NativeWindow>>>>,
    monitor: Option<Rc<Monitor>>,
    monitors: MonitorList,
    cursor: CursorTracker,
    focused: Option<Weak<dyn WindowInput>>,

    evdev: Box<dyn InputSubsystem>,
    evdev_ready: bool,
    joysticks: Option<Box<dyn InputSubsystem>>,
    joysticks_ready: bool,
    timer: Option<MonotonicTimer>,
    tty: Option<TerminalGuard>,
}

impl VivantePlatform {
    pub fn builder() -> VivantePlatformBuilder {
        VivantePlatformBuilder::new()
    }

    fn new_with_config(config: VivantePlatformBuilder) -> Self {
        // --- 确定库名 ---
        let mut names: Vec<String> = std::env::var(ENV_LIBRARY).ok().into_iter().collect();
        match config.library_names {
            Some(list) => names.extend(list),
            None => names.extend(DEFAULT_LIBRARY_NAMES.iter().map(|s| s.to_string())),
        }

        let loader = config.loader.unwrap_or_else(|| Box::new(VivanteLoader::new(names)));

        let display_index = config
            .display_index
            .or_else(|| std::env::var(ENV_DISPLAY).ok().and_then(|v| v.trim().parse().ok()));

        let tty_path = config.tty_path.or_else(|| std::env::var(ENV_TTY).ok().map(PathBuf::from));

        let evdev = config.evdev.unwrap_or_else(|| Box::new(EvdevBridge::new(config.input_config)));

        let joysticks = match (config.joystick_subsystem, config.joysticks) {
            (Some(subsystem), true) => Some(subsystem),
            (None, true) => Some(Box::new(LinuxJoysticks::new()) as Box<dyn InputSubsystem>),
            (_, false) => None,
        };

        let mut monitors = MonitorList::new();
        if let Some(callback) = config.monitor_callback {
            monitors.on_event(callback);
        }

        Self {
            loader,
            display_index,
            tty_path,
            manage_tty: config.manage_tty,
            api: None,
            display: None,
            windows: Vec::new(),
            monitor: None,
            monitors,
            cursor: CursorTracker::default(),
            focused: None,
            evdev,
            evdev_ready: false,
            joysticks,
            joysticks_ready: false,
            timer: None,
            tty: None,
        }
    }

    /// 加载入口点、打开显示器、启动输入子系统并登记显示器。
    ///
    /// 任一步骤失败都会上报平台错误，释放已获取的资源并返回 `Err`。
    pub fn init(&mut self) -> Result<(), Error> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }

        if let Err(e) = self.try_init() {
            tracing::error!("{}", e);
            self.terminate();
            return Err(e);
        }

        tracing::info!("Vivante 平台已初始化: {}", version_string());
        Ok(())
    }

    fn try_init(&mut self) -> Result<(), Error> {
        let api = self.loader.load()?;
        self.api = Some(api.clone());

        let display = match self.display_index {
            Some(index) => api.get_display_by_index(index),
            None => api.get_display(None),
        }
        .ok_or(Error::DisplayOpen)?;
        self.display = Some(display);

        if self.manage_tty {
            self.tty = TerminalGuard::acquire(self.tty_path.clone());
        }

        self.evdev.init()?;
        self.evdev_ready = true;

        if let Some(joysticks) = self.joysticks.as_mut() {
            joysticks.init()?;
            self.joysticks_ready = true;
        }

        self.timer = Some(MonotonicTimer::start());

        self.register_monitor(api.as_ref(), display);
        Ok(())
    }

    /// 查询一次显示器尺寸，登记为主显示器，并把光标放到中心
    fn register_monitor(&mut self, api: &dyn DisplayApi, display: NativeDisplay) {
        let (width, height) = api.get_display_geometry(display);
        self.cursor.reset(width, height);

        let (w, h) = (width.max(0) as u32, height.max(0) as u32);
        self.evdev.set_display_size(w, h);
        if let Some(joysticks) = self.joysticks.as_mut() {
            joysticks.set_display_size(w, h);
        }

        let monitor = self.monitors.connect(Monitor::new(DISPLAY_NAME, width, height), Placement::First);
        self.monitor = Some(monitor);
    }

    /// 按初始化的逆序释放资源。可在部分初始化失败后调用，也可重复调用。
    pub fn terminate(&mut self) {
        if let Some(joysticks) = self.joysticks.as_mut() {
            if std::mem::take(&mut self.joysticks_ready) {
                joysticks.terminate();
            }
        }

        if std::mem::take(&mut self.evdev_ready) {
            self.evdev.terminate();
        }

        self.focused = None;
        self.timer = None;

        if let Some(monitor) = self.monitor.take() {
            self.monitors.disconnect(&monitor.name);
        }

        let windows = std::mem::take(&mut self.windows);
        if let Some(api) = &self.api {
            for native in windows.iter().filter_map(Weak::upgrade).filter_map(|slot| slot.take()) {
                tracing::warn!("终止时原生窗口仍然存活，提前销毁");
                api.destroy_window(native);
            }
            if let Some(display) = self.display.take() {
                api.destroy_display(display);
            }
        }

        if self.api.take().is_some() {
            tracing::info!("Vivante 平台已终止");
        }

        self.tty = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.api.is_some()
    }

    /// 在已打开的显示器上创建原生窗口
    pub fn create_window(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<VivanteWindow, Error> {
        let (Some(api), Some(display)) = (&self.api, self.display) else {
            return Err(Error::NotInitialized);
        };
        let window = VivanteWindow::create(api.clone(), display, WindowGeometry { x, y, width, height })?;

        self.windows.retain(|slot| slot.upgrade().is_some_and(|native| native.get().is_some()));
        self.windows.push(window.slot());
        Ok(window)
    }

    /// 交给 EGL 的原生显示句柄
    pub fn native_display(&self) -> Option<NativeDisplay> {
        self.display
    }

    pub fn display_info(&self) -> Option<DisplayInfo> {
        let (api, display) = (self.api.as_ref()?, self.display?);
        Some(api.get_display_info(display))
    }

    /// 初始化时记录的显示器尺寸
    pub fn display_size(&self) -> Option<(i32, i32)> {
        self.monitor.as_ref().map(|m| (m.width, m.height))
    }

    pub fn monitors(&self) -> &MonitorList {
        &self.monitors
    }

    pub fn timer(&self) -> Option<&MonotonicTimer> {
        self.timer.as_ref()
    }

    // --- 焦点 ---

    /// 只保存弱引用；窗口被释放后自动视为无焦点
    pub fn set_focused_window(&mut self, window: &Rc<dyn WindowInput>) {
        self.focused = Some(Rc::downgrade(window));
    }

    pub fn clear_focus(&mut self) {
        self.focused = None;
    }

    /// 窗口销毁时调用；如果它持有焦点则清除
    pub fn window_destroyed(&mut self, window: &Rc<dyn WindowInput>) {
        let is_focused = self
            .focused
            .as_ref()
            .is_some_and(|w| w.as_ptr() as *const () == Rc::as_ptr(window) as *const ());
        if is_focused {
            self.focused = None;
        }
    }

    pub fn focused_window(&mut self) -> Option<Rc<dyn WindowInput>> {
        let window = self.focused.as_ref()?.upgrade();
        if window.is_none() {
            tracing::debug!("焦点窗口已释放，清除焦点");
            self.focused = None;
        }
        window
    }

    // --- 光标 ---

    pub fn cursor_position(&self) -> CursorPosition {
        self.cursor.position()
    }

    /// 直接设置设备光标 (夹取到显示器范围)，不产生事件
    pub fn set_cursor_position(&mut self, x: f64, y: f64) -> CursorPosition {
        self.cursor.set_position(x, y)
    }

    /// 焦点窗口且指针悬停其上时，按窗口自己的坐标重新注入位置
    fn notify_cursor_position_changed(&mut self) {
        let Some(window) = self.focused_window() else { return };
        let device = self.cursor.position();
        if window.hovered(device) {
            let (x, y) = window.cursor_position(device);
            window.input_cursor_pos(x, y);
        }
    }

    // --- 输入转发 ---

    pub fn input_key(&mut self, key: &KeyInput) {
        if let Some(window) = self.focused_window() {
            window.input_key(key);
        }
    }

    pub fn input_char(&mut self, codepoint: char, mods: Modifiers, plain: bool) {
        if let Some(window) = self.focused_window() {
            window.input_char(codepoint, mods, plain);
        }
    }

    pub fn input_scroll(&mut self, xoffset: f64, yoffset: f64) {
        if let Some(window) = self.focused_window() {
            window.input_scroll(xoffset, yoffset);
        }
    }

    pub fn input_mouse_click(&mut self, button: MouseButton, action: Action, mods: Modifiers) {
        if let Some(window) = self.focused_window() {
            window.input_mouse_click(button, action, mods);
        }
    }

    /// 绝对移动 (设备坐标)。设备光标总是更新，即使没有焦点窗口
    pub fn input_cursor_pos(&mut self, x: f64, y: f64) {
        self.cursor.set_position(x, y);
        self.notify_cursor_position_changed();
    }

    /// 相对移动
    pub fn input_cursor_move(&mut self, dx: f64, dy: f64) {
        self.cursor.move_by(dx, dy);
        self.notify_cursor_position_changed();
    }

    /// 把桥接层的一个事件转发到对应的入口
    pub fn dispatch(&mut self, input: RawInput) {
        match input {
            RawInput::Key(key) => self.input_key(&key),
            RawInput::Char { codepoint, mods, plain } => self.input_char(codepoint, mods, plain),
            RawInput::Scroll { xoffset, yoffset } => self.input_scroll(xoffset, yoffset),
            RawInput::MouseClick { button, action, mods } => self.input_mouse_click(button, action, mods),
            RawInput::CursorPos { x, y } => self.input_cursor_pos(x, y),
            RawInput::CursorMove { dx, dy } => self.input_cursor_move(dx, dy),
        }
    }

    /// 读取所有子系统的待处理输入并转发，返回事件数量
    pub fn poll_events(&mut self) -> usize {
        let mut events = Vec::new();
        if self.evdev_ready {
            events.extend(self.evdev.poll());
        }
        if let Some(joysticks) = self.joysticks.as_mut() {
            if self.joysticks_ready {
                events.extend(joysticks.poll());
            }
        }

        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    /// 事件循环中需要等待可读的输入设备描述符
    pub fn poll_fds(&self) -> Vec<RawFd> {
        let mut fds = Vec::new();
        if self.evdev_ready {
            fds.extend(self.evdev.poll_fds());
        }
        if let Some(joysticks) = self.joysticks.as_ref() {
            if self.joysticks_ready {
                fds.extend(joysticks.poll_fds());
            }
        }
        fds
    }
}

impl Drop for VivantePlatform {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorEvent;
    use crate::vivante::{NativeWindow, WindowInfo};
    use std::cell::{Cell, RefCell};
    use std::ffi::c_void;
    use std::ptr::NonNull;

    type Log = Rc<RefCell<Vec<String>>>;

    struct MockApi {
        geometry: (i32, i32),
        opens_display: bool,
        log: Log,
    }

    impl DisplayApi for MockApi {
        fn get_display(&self, context: Option<NonNull<c_void>>) -> Option<NativeDisplay> {
            assert!(context.is_none());
            self.log.borrow_mut().push("get_display".into());
            self.opens_display.then(|| NativeDisplay::from_raw(0x10 as *mut c_void)).flatten()
        }
        fn get_display_by_index(&self, index: i32) -> Option<NativeDisplay> {
            self.log.borrow_mut().push(format!("get_display_by_index {index}"));
            self.opens_display.then(|| NativeDisplay::from_raw(0x20 as *mut c_void)).flatten()
        }
        fn get_display_geometry(&self, _display: NativeDisplay) -> (i32, i32) {
            self.geometry
        }
        fn get_display_info(&self, _display: NativeDisplay) -> DisplayInfo {
            DisplayInfo { width: self.geometry.0, height: self.geometry.1, stride: self.geometry.0 * 4, bits_per_pixel: 32, physical: 0 }
        }
        fn destroy_display(&self, _display: NativeDisplay) {
            self.log.borrow_mut().push("destroy_display".into());
        }
        fn create_window(&self, _display: NativeDisplay, _geometry: WindowGeometry) -> Option<NativeWindow> {
            NativeWindow::from_raw(0x30 as *mut c_void)
        }
        fn get_window_geometry(&self, _window: NativeWindow) -> WindowGeometry {
            WindowGeometry { x: 0, y: 0, width: self.geometry.0, height: self.geometry.1 }
        }
        fn get_window_info(&self, window: NativeWindow) -> WindowInfo {
            WindowInfo { geometry: self.get_window_geometry(window), bits_per_pixel: 32, offset: 0 }
        }
        fn destroy_window(&self, _window: NativeWindow) {
            self.log.borrow_mut().push("destroy_window".into());
        }
    }

    /// `api` 为 None 时模拟找不到库
    struct MockLoader {
        api: Option<Rc<MockApi>>,
        missing: bool,
    }

    impl DisplayLoader for MockLoader {
        fn load(&self) -> Result<Rc<dyn DisplayApi>, Error> {
            if self.missing {
                return Err(Error::MissingEntryPoints(vec!["fbGetWindowInfo"]));
            }
            match &self.api {
                Some(api) => Ok(api.clone() as Rc<dyn DisplayApi>),
                None => Err(Error::LibraryNotFound { tried: vec!["libEGL.so.1".into(), "libEGL.so".into()] }),
            }
        }
    }

    struct MockSubsystem {
        name: &'static str,
        fail: bool,
        log: Log,
        queued: Rc<RefCell<Vec<RawInput>>>,
    }

    impl InputSubsystem for MockSubsystem {
        fn name(&self) -> &'static str {
            self.name
        }
        fn init(&mut self) -> Result<(), Error> {
            self.log.borrow_mut().push(format!("{}:init", self.name));
            if self.fail {
                return Err(Error::subsystem(self.name, "no devices"));
            }
            Ok(())
        }
        fn terminate(&mut self) {
            self.log.borrow_mut().push(format!("{}:terminate", self.name));
        }
        fn poll(&mut self) -> Vec<RawInput> {
            self.queued.borrow_mut().drain(..).collect()
        }
        fn set_display_size(&mut self, width: u32, height: u32) {
            self.log.borrow_mut().push(format!("{}:size {width}x{height}", self.name));
        }
    }

    #[derive(Default)]
    struct RecordingWindow {
        hovered: Cell<bool>,
        origin: (f64, f64),
        events: RefCell<Vec<String>>,
        keys: RefCell<Vec<KeyInput>>,
    }

    impl WindowInput for RecordingWindow {
        fn input_key(&self, key: &KeyInput) {
            self.events.borrow_mut().push(format!("key {} {:?}", key.scancode, key.action));
            self.keys.borrow_mut().push(key.clone());
        }
        fn input_char(&self, codepoint: char, _mods: Modifiers, plain: bool) {
            self.events.borrow_mut().push(format!("char {codepoint} {plain}"));
        }
        fn input_scroll(&self, xoffset: f64, yoffset: f64) {
            self.events.borrow_mut().push(format!("scroll {xoffset} {yoffset}"));
        }
        fn input_mouse_click(&self, button: MouseButton, action: Action, _mods: Modifiers) {
            self.events.borrow_mut().push(format!("click {button:?} {action:?}"));
        }
        fn input_cursor_pos(&self, x: f64, y: f64) {
            self.events.borrow_mut().push(format!("cursor {x} {y}"));
        }
        fn hovered(&self, _cursor: CursorPosition) -> bool {
            self.hovered.get()
        }
        fn cursor_position(&self, cursor: CursorPosition) -> (f64, f64) {
            (cursor.x - self.origin.0, cursor.y - self.origin.1)
        }
    }

    struct Harness {
        platform: VivantePlatform,
        api: Option<Rc<MockApi>>,
        log: Log,
        queued: Rc<RefCell<Vec<RawInput>>>,
    }

    fn harness(api: Option<(i32, i32, bool)>, fail_evdev: bool, fail_joystick: bool) -> Harness {
        let log: Log = Rc::default();
        let queued = Rc::new(RefCell::new(Vec::new()));
        let api = api.map(|(w, h, opens_display)| Rc::new(MockApi { geometry: (w, h), opens_display, log: log.clone() }));

        let platform = VivantePlatform::builder()
            .with_tty_management(false)
            .with_loader(MockLoader { api: api.clone(), missing: false })
            .with_input_subsystem(Box::new(MockSubsystem { name: "evdev", fail: fail_evdev, log: log.clone(), queued: queued.clone() }))
            .with_joystick_subsystem(Box::new(MockSubsystem { name: "joystick", fail: fail_joystick, log: log.clone(), queued: Rc::default() }))
            .build();

        Harness { platform, api, log, queued }
    }

    fn ready() -> Harness {
        let mut h = harness(Some((800, 480, true)), false, false);
        h.platform.init().unwrap();
        h.log.borrow_mut().clear();
        h
    }

    fn focus(platform: &mut VivantePlatform, window: &Rc<RecordingWindow>) {
        let window: Rc<dyn WindowInput> = window.clone();
        platform.set_focused_window(&window);
    }

    #[test]
    fn missing_library_fails_without_partial_state() {
        let mut h = harness(None, false, false);
        assert!(matches!(h.platform.init(), Err(Error::LibraryNotFound { .. })));
        assert!(!h.platform.is_initialized());
        assert!(h.platform.native_display().is_none());
        assert!(h.platform.display_info().is_none());
        assert!(h.log.borrow().is_empty());
    }

    #[test]
    fn missing_entry_points_fail_init() {
        let log: Log = Rc::default();
        let mut platform = VivantePlatform::builder()
            .with_tty_management(false)
            .with_loader(MockLoader { api: None, missing: true })
            .with_input_subsystem(Box::new(MockSubsystem { name: "evdev", fail: false, log: log.clone(), queued: Rc::default() }))
            .with_joysticks(false)
            .build();

        let err = platform.init().unwrap_err();
        assert!(err.to_string().contains("fbGetWindowInfo"));
        assert!(!platform.is_initialized());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn display_open_failure_releases_the_library() {
        let mut h = harness(Some((800, 480, false)), false, false);
        let refs = Rc::strong_count(h.api.as_ref().unwrap());
        assert!(matches!(h.platform.init(), Err(Error::DisplayOpen)));
        assert!(!h.platform.is_initialized());
        // 平台不再持有 API
        assert_eq!(Rc::strong_count(h.api.as_ref().unwrap()), refs);
        assert_eq!(*h.log.borrow(), ["get_display"]);
    }

    #[test]
    fn subsystem_failure_tears_down_in_reverse_order() {
        let mut h = harness(Some((800, 480, true)), false, true);
        let err = h.platform.init().unwrap_err();
        assert!(matches!(err, Error::Subsystem { name: "joystick", .. }));
        assert!(!h.platform.is_initialized());
        assert!(h.platform.monitors().is_empty());
        assert_eq!(
            *h.log.borrow(),
            ["get_display", "evdev:init", "joystick:init", "evdev:terminate", "destroy_display"]
        );
    }

    #[test]
    fn init_registers_monitor_and_centers_cursor() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let log: Log = Rc::default();
        let api = Rc::new(MockApi { geometry: (1279, 719), opens_display: true, log: log.clone() });
        let mut platform = VivantePlatform::builder()
            .with_tty_management(false)
            .with_loader(MockLoader { api: Some(api), missing: false })
            .with_input_subsystem(Box::new(MockSubsystem { name: "evdev", fail: false, log: log.clone(), queued: Rc::default() }))
            .with_joysticks(false)
            .on_monitor_event(Box::new(move |m: &Monitor, e| sink.borrow_mut().push((m.clone(), e))))
            .build();

        platform.init().unwrap();

        let monitor = platform.monitors().primary().unwrap();
        assert_eq!((monitor.width, monitor.height), (1279, 719));
        assert_eq!(monitor.name, DISPLAY_NAME);
        assert_eq!(platform.display_size(), Some((1279, 719)));
        assert_eq!(platform.cursor_position(), CursorPosition::new(639.0, 359.0));
        assert!(platform.timer().is_some());
        assert_eq!(*log.borrow(), ["get_display", "evdev:init", "evdev:size 1279x719"]);
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(events.borrow()[0].1, MonitorEvent::Connected);
    }

    #[test]
    fn display_index_uses_get_display_by_index() {
        let log: Log = Rc::default();
        let api = Rc::new(MockApi { geometry: (640, 480), opens_display: true, log: log.clone() });
        let mut platform = VivantePlatform::builder()
            .with_tty_management(false)
            .with_display_index(1)
            .with_loader(MockLoader { api: Some(api), missing: false })
            .with_input_subsystem(Box::new(MockSubsystem { name: "evdev", fail: false, log: log.clone(), queued: Rc::default() }))
            .with_joysticks(false)
            .build();

        platform.init().unwrap();
        assert_eq!(log.borrow()[0], "get_display_by_index 1");
    }

    #[test]
    fn init_twice_is_rejected() {
        let mut h = ready();
        assert!(matches!(h.platform.init(), Err(Error::AlreadyInitialized)));
        assert!(h.platform.is_initialized());
        assert!(h.log.borrow().is_empty());
    }

    #[test]
    fn terminate_is_idempotent() {
        let mut h = ready();
        let refs = Rc::strong_count(h.api.as_ref().unwrap());
        h.platform.terminate();
        h.platform.terminate();

        assert!(!h.platform.is_initialized());
        assert!(h.platform.monitors().is_empty());
        assert_eq!(*h.log.borrow(), ["joystick:terminate", "evdev:terminate", "destroy_display"]);
        assert_eq!(Rc::strong_count(h.api.as_ref().unwrap()), refs - 1);
    }

    #[test]
    fn terminate_after_failed_init_is_safe() {
        let mut h = harness(Some((800, 480, true)), true, false);
        assert!(h.platform.init().is_err());
        h.platform.terminate();
        h.platform.terminate();
        assert_eq!(*h.log.borrow(), ["get_display", "evdev:init", "destroy_display"]);
    }

    #[test]
    fn relays_are_noops_without_focus() {
        let mut h = ready();
        let window = Rc::new(RecordingWindow::default());
        window.hovered.set(true);

        let key = KeyInput {
            key: evdev::KeyCode::KEY_A,
            scancode: 30,
            action: Action::Press,
            mods: Modifiers::default(),
            text: Some('a'),
        };
        h.platform.input_key(&key);
        h.platform.input_char('a', Modifiers::default(), true);
        h.platform.input_scroll(0.0, 1.0);
        h.platform.input_mouse_click(MouseButton::Left, Action::Press, Modifiers::default());
        h.platform.input_cursor_pos(10.0, 10.0);
        h.platform.input_cursor_move(5.0, 5.0);

        assert!(window.events.borrow().is_empty());
        // 设备光标仍然跟随输入
        assert_eq!(h.platform.cursor_position(), CursorPosition::new(15.0, 15.0));
    }

    #[test]
    fn focused_window_receives_keys_unchanged() {
        let mut h = ready();
        let window = Rc::new(RecordingWindow::default());
        focus(&mut h.platform, &window);

        let key = KeyInput {
            key: evdev::KeyCode::KEY_B,
            scancode: 48,
            action: Action::Press,
            mods: Modifiers { shift: true, caps_lock: true, ..Modifiers::default() },
            text: Some('B'),
        };
        h.platform.input_key(&key);
        h.platform.dispatch(RawInput::Key(KeyInput { action: Action::Release, ..key.clone() }));

        assert_eq!(*window.keys.borrow(), [key.clone(), KeyInput { action: Action::Release, ..key }]);
    }

    #[test]
    fn focused_window_receives_events_unchanged() {
        let mut h = ready();
        let window = Rc::new(RecordingWindow::default());
        focus(&mut h.platform, &window);

        h.platform.input_char('ß', Modifiers::default(), true);
        h.platform.input_scroll(-1.0, 2.5);
        h.platform.input_mouse_click(MouseButton::Right, Action::Release, Modifiers::default());

        assert_eq!(*window.events.borrow(), ["char ß true", "scroll -1 2.5", "click Right Release"]);
    }

    #[test]
    fn unhovered_window_gets_no_position_event() {
        let mut h = ready();
        let window = Rc::new(RecordingWindow::default());
        focus(&mut h.platform, &window);

        h.platform.input_cursor_pos(100.0, 900.0);
        assert_eq!(h.platform.cursor_position(), CursorPosition::new(100.0, 480.0));
        assert!(window.events.borrow().is_empty());
    }

    #[test]
    fn hovered_window_gets_its_own_coordinates() {
        let mut h = ready();
        let window = Rc::new(RecordingWindow { origin: (100.0, 50.0), ..RecordingWindow::default() });
        window.hovered.set(true);
        focus(&mut h.platform, &window);

        h.platform.input_cursor_pos(150.0, 75.0);
        h.platform.input_cursor_move(-1000.0, 10.0);

        assert_eq!(h.platform.cursor_position(), CursorPosition::new(0.0, 85.0));
        assert_eq!(*window.events.borrow(), ["cursor 50 25", "cursor -100 35"]);
    }

    #[test]
    fn relative_and_absolute_motion_agree() {
        let mut a = ready();
        let mut b = ready();
        let window = Rc::new(RecordingWindow::default());
        focus(&mut a.platform, &window);
        focus(&mut b.platform, &window);

        a.platform.set_cursor_position(700.0, 20.0);
        a.platform.input_cursor_move(250.0, -30.0);
        b.platform.set_cursor_position(700.0, 20.0);
        b.platform.input_cursor_pos(950.0, -10.0);

        assert_eq!(a.platform.cursor_position(), b.platform.cursor_position());
        assert_eq!(a.platform.cursor_position(), CursorPosition::new(800.0, 0.0));
    }

    #[test]
    fn focus_does_not_outlive_the_window() {
        let mut h = ready();
        let window = Rc::new(RecordingWindow::default());
        focus(&mut h.platform, &window);
        assert!(h.platform.focused_window().is_some());

        drop(window);
        assert!(h.platform.focused_window().is_none());
        // 已释放的窗口不会导致崩溃
        h.platform.input_scroll(1.0, 1.0);
    }

    #[test]
    fn window_destroyed_clears_matching_focus_only() {
        let mut h = ready();
        let focused: Rc<dyn WindowInput> = Rc::new(RecordingWindow::default());
        let other: Rc<dyn WindowInput> = Rc::new(RecordingWindow::default());
        h.platform.set_focused_window(&focused);

        h.platform.window_destroyed(&other);
        assert!(h.platform.focused_window().is_some());

        h.platform.window_destroyed(&focused);
        assert!(h.platform.focused_window().is_none());
    }

    #[test]
    fn poll_events_dispatches_bridge_input() {
        let mut h = ready();
        let window = Rc::new(RecordingWindow::default());
        window.hovered.set(true);
        focus(&mut h.platform, &window);

        let key = KeyInput {
            key: evdev::KeyCode::KEY_Q,
            scancode: 16,
            action: Action::Repeat,
            mods: Modifiers::default(),
            text: Some('q'),
        };
        h.queued.borrow_mut().extend([
            RawInput::CursorMove { dx: 10.0, dy: -10.0 },
            RawInput::MouseClick { button: MouseButton::Left, action: Action::Press, mods: Modifiers::default() },
            RawInput::CursorPos { x: 20.0, y: 30.0 },
            RawInput::Scroll { xoffset: 0.0, yoffset: -2.0 },
            RawInput::Key(key),
            RawInput::Char { codepoint: 'q', mods: Modifiers::default(), plain: true },
        ]);

        assert_eq!(h.platform.poll_events(), 6);
        assert_eq!(
            *window.events.borrow(),
            [
                "cursor 410 230",
                "click Left Press",
                "cursor 20 30",
                "scroll 0 -2",
                "key 16 Repeat",
                "char q true",
            ]
        );
        assert_eq!(h.platform.poll_events(), 0);
    }

    #[test]
    fn windows_require_an_open_display() {
        let mut h = harness(Some((800, 480, true)), false, false);
        assert!(matches!(h.platform.create_window(0, 0, 800, 480), Err(Error::NotInitialized)));

        let mut h = ready();
        let window = h.platform.create_window(0, 0, 800, 480).unwrap();
        assert_eq!(window.geometry().width, 800);
        drop(window);
        assert_eq!(*h.log.borrow(), ["destroy_window"]);
    }

    #[test]
    fn live_windows_are_destroyed_before_the_display() {
        let mut h = ready();
        let first = h.platform.create_window(0, 0, 400, 480).unwrap();
        let second = h.platform.create_window(400, 0, 400, 480).unwrap();
        drop(second);

        h.platform.terminate();
        assert!(first.native_window().is_none());
        drop(first);

        assert_eq!(
            *h.log.borrow(),
            ["destroy_window", "joystick:terminate", "evdev:terminate", "destroy_window", "destroy_display"]
        );
    }

    #[test]
    fn version_string_lists_build_features() {
        let version = version_string();
        assert!(version.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(version.contains("Vivante EGL"));
        assert!(version.contains("clock_gettime"));
        assert_eq!(version.contains("xkb"), cfg!(feature = "xkb"));
    }
}
