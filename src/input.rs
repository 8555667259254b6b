//! evdev 输入桥接
//!
//! 负责发现 `/dev/input/event*` 设备，读取原始事件并转换为 [`RawInput`]，
//! 由平台转发给当前的焦点窗口。

mod keyboard;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use evdev::{AbsInfo, AbsoluteAxisCode, AttributeSetRef, Device, EventSummary, InputEvent, KeyCode, RelativeAxisCode, SynchronizationCode};

use crate::error::Error;
use crate::event::{Action, KeyInput, Modifiers, MouseButton, RawInput};
use self::keyboard::{is_text_char, KeyboardHandler};

/// 重新扫描输入设备的时间间隔
pub(crate) const RESCAN_INTERVAL: Duration = Duration::from_secs(3);
pub(crate) const INPUT_DIR: &str = "/dev/input";

/// 平台在初始化时启动、终止时关闭的辅助输入子系统
pub trait InputSubsystem {
    fn name(&self) -> &'static str;

    /// 失败会中止整个平台的初始化
    fn init(&mut self) -> Result<(), Error>;

    /// 可重复调用
    fn terminate(&mut self);

    /// 取出自上次调用以来产生的事件
    fn poll(&mut self) -> Vec<RawInput> {
        Vec::new()
    }

    /// 供事件循环 `poll(2)` 等待的文件描述符
    fn poll_fds(&self) -> Vec<RawFd> {
        Vec::new()
    }

    /// 显示器尺寸确定后调用，用于把绝对坐标映射到像素
    fn set_display_size(&mut self, _width: u32, _height: u32) {}
}

/// 输入设备配置选项
#[derive(Debug, Clone)]
pub struct InputConfig {
    pub autodiscovery: bool,
    pub threaded_input: bool,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            autodiscovery: true,
            threaded_input: true,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

impl InputConfig {
    /// 黑名单优先；白名单非空时设备名必须包含其中一项
    fn accepts(&self, name: &str) -> bool {
        if self.blacklist.iter().any(|block| name.contains(block.as_str())) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.iter().any(|allow| name.contains(allow.as_str()))
    }
}

/// 绝对坐标轴的范围，用于映射到显示器像素
#[derive(Debug, Clone, Copy, Default)]
struct AbsAxes {
    x: Option<AbsInfo>,
    y: Option<AbsInfo>,
}

/// 一个 SYN_REPORT 周期内累积的指针状态
#[derive(Debug, Default)]
struct PendingFrame {
    rel_dx: i32,
    rel_dy: i32,
    /// 最近一次的绝对坐标，跨帧保留
    abs_x: Option<i32>,
    abs_y: Option<i32>,
    abs_dirty: bool,
    /// 当前 MT 槽位 (Protocol B)
    slot: i32,
    wheel_dx: i32,
    wheel_dy: i32,
    buttons: Vec<(MouseButton, Action)>,
}

/// 内部结构：封装 evdev 设备及状态
struct ManagedDevice {
    path: PathBuf,
    device: Device,
    axes: AbsAxes,
    frame: PendingFrame,
}

fn map_axis(value: i32, info: Option<&AbsInfo>, screen_max: Option<u32>) -> f64 {
    match (info, screen_max) {
        (Some(info), Some(max)) if info.maximum() > info.minimum() => {
            let min = f64::from(info.minimum());
            let range = f64::from(info.maximum()) - min;
            (f64::from(value) - min) / range * f64::from(max)
        }
        // 兜底：没有 abs info 或显示尺寸时直接返回原始值
        _ => f64::from(value),
    }
}

/// 跨设备共享的状态：修饰键、键盘布局、显示器尺寸
struct BridgeState {
    keyboard: Option<KeyboardHandler>,
    mods: Modifiers,
    display: Option<(u32, u32)>,
}

impl BridgeState {
    fn process_events(
        &mut self,
        frame: &mut PendingFrame,
        axes: &AbsAxes,
        events: impl IntoIterator<Item = InputEvent>,
    ) -> Vec<RawInput> {
        let mut output = Vec::new();

        for ev in events {
            match ev.destructure() {
                // --- 相对移动 (鼠标) ---
                EventSummary::RelativeAxis(_, RelativeAxisCode::REL_X, value) => frame.rel_dx += value,
                EventSummary::RelativeAxis(_, RelativeAxisCode::REL_Y, value) => frame.rel_dy += value,
                EventSummary::RelativeAxis(_, RelativeAxisCode::REL_WHEEL, value) => frame.wheel_dy += value,
                EventSummary::RelativeAxis(_, RelativeAxisCode::REL_HWHEEL, value) => frame.wheel_dx += value,

                // --- 绝对坐标 (触摸屏 / 数位板)，只跟踪第一个触点 ---
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_SLOT, value) => frame.slot = value,
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_POSITION_X | AbsoluteAxisCode::ABS_MT_POSITION_Y, _)
                    if frame.slot != 0 => {}
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_X | AbsoluteAxisCode::ABS_MT_POSITION_X, value) => {
                    frame.abs_x = Some(value);
                    frame.abs_dirty = true;
                }
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_Y | AbsoluteAxisCode::ABS_MT_POSITION_Y, value) => {
                    frame.abs_y = Some(value);
                    frame.abs_dirty = true;
                }

                // --- 按键 ---
                EventSummary::Key(_, key, value) => {
                    let Some(action) = Action::from_evdev(value) else { continue };
                    if let Some(button) = MouseButton::from_key_code(key) {
                        // 按钮自动重复没有意义
                        if action != Action::Repeat {
                            frame.buttons.push((button, action));
                        }
                    } else {
                        self.handle_key(key, action, &mut output);
                    }
                }

                // --- 帧同步 ---
                EventSummary::Synchronization(_, SynchronizationCode::SYN_REPORT, _) => {
                    self.flush_frame(frame, axes, &mut output);
                }
                _ => {}
            }
        }
        output
    }

    fn handle_key(&mut self, key: KeyCode, action: Action, output: &mut Vec<RawInput>) {
        self.mods.update(key, action);
        let mods = self.mods;
        let text = self
            .keyboard
            .as_mut()
            .and_then(|keyboard| keyboard.handle_key_event(key, action, &mods));

        output.push(RawInput::Key(KeyInput { key, scancode: key.code(), action, mods, text }));

        if action != Action::Release {
            if let Some(codepoint) = text.filter(|c| is_text_char(*c)) {
                output.push(RawInput::Char { codepoint, mods, plain: mods.is_plain() });
            }
        }
    }

    /// 顺序: 先移动，再按钮，最后滚轮，保证点击发生在新位置上
    fn flush_frame(&self, frame: &mut PendingFrame, axes: &AbsAxes, output: &mut Vec<RawInput>) {
        if frame.rel_dx != 0 || frame.rel_dy != 0 {
            output.push(RawInput::CursorMove { dx: f64::from(frame.rel_dx), dy: f64::from(frame.rel_dy) });
        }

        // 只更新了一个轴时另一轴沿用上一次的值；两个轴都出现过之后才上报
        if let (true, Some(x), Some(y)) = (frame.abs_dirty, frame.abs_x, frame.abs_y) {
            let (w, h) = self.display.unzip();
            output.push(RawInput::CursorPos {
                x: map_axis(x, axes.x.as_ref(), w),
                y: map_axis(y, axes.y.as_ref(), h),
            });
        }

        for (button, action) in frame.buttons.drain(..) {
            output.push(RawInput::MouseClick { button, action, mods: self.mods });
        }

        if frame.wheel_dx != 0 || frame.wheel_dy != 0 {
            output.push(RawInput::Scroll { xoffset: f64::from(frame.wheel_dx), yoffset: f64::from(frame.wheel_dy) });
        }

        frame.rel_dx = 0;
        frame.rel_dy = 0;
        frame.abs_dirty = false;
        frame.wheel_dx = 0;
        frame.wheel_dy = 0;
    }
}

/// evdev 输入子系统
pub struct EvdevBridge {
    devices: Vec<ManagedDevice>,
    last_rescan: Instant,
    config: InputConfig,
    state: BridgeState,
    hotplug_receiver: Option<Receiver<ManagedDevice>>,
    hotplug_stop: Option<Arc<AtomicBool>>,
}

impl EvdevBridge {
    pub fn new(config: InputConfig) -> Self {
        Self {
            devices: Vec::new(),
            last_rescan: Instant::now(),
            config,
            state: BridgeState { keyboard: None, mods: Modifiers::default(), display: None },
            hotplug_receiver: None,
            hotplug_stop: None,
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn rescan_devices_blocking(&mut self) {
        let found_paths = scan_input_dir();
        self.devices.retain(|dev| found_paths.contains(&dev.path));

        for path in found_paths {
            if !self.devices.iter().any(|dev| dev.path == path) {
                if let Ok(Some(managed_device)) = open_device_if_compatible(&path, &self.config) {
                    self.devices.push(managed_device);
                }
            }
        }
        self.last_rescan = Instant::now();
    }
}

impl InputSubsystem for EvdevBridge {
    fn name(&self) -> &'static str {
        "evdev"
    }

    fn init(&mut self) -> Result<(), Error> {
        tracing::info!(
            "evdev 初始化: 自动发现: {}, 多线程: {}, XKB支持: {}",
            self.config.autodiscovery,
            self.config.threaded_input,
            cfg!(feature = "xkb")
        );

        self.state.keyboard = match KeyboardHandler::new() {
            Ok(keyboard) => Some(keyboard),
            Err(e) => {
                tracing::warn!("键盘布局不可用，按键将不携带文本: {}", e);
                None
            }
        };

        if !self.config.autodiscovery {
            return Ok(());
        }

        if let Err(e) = fs::read_dir(INPUT_DIR) {
            tracing::error!("无法读取 {}: {}", INPUT_DIR, e);
            return Err(e.into());
        }

        if self.config.threaded_input {
            let (tx, rx) = channel();
            let stop = Arc::new(AtomicBool::new(false));
            spawn_hotplug_thread(tx, self.config.clone(), stop.clone());
            self.hotplug_receiver = Some(rx);
            self.hotplug_stop = Some(stop);
        } else {
            self.rescan_devices_blocking();
        }
        Ok(())
    }

    fn terminate(&mut self) {
        if let Some(stop) = self.hotplug_stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        self.hotplug_receiver = None;
        if !self.devices.is_empty() {
            tracing::info!("关闭 {} 个输入设备", self.devices.len());
        }
        self.devices.clear();
        self.state.keyboard = None;
        self.state.mods = Modifiers::default();
    }

    fn poll(&mut self) -> Vec<RawInput> {
        if self.config.autodiscovery {
            if let Some(rx) = &self.hotplug_receiver {
                while let Ok(device) = rx.try_recv() {
                    tracing::info!("热插拔: 添加新设备 {:?}", device.path);
                    self.devices.push(device);
                }
            } else if !self.config.threaded_input && self.last_rescan.elapsed() > RESCAN_INTERVAL {
                self.rescan_devices_blocking();
            }
        }

        let mut output = Vec::new();
        let mut indices_to_remove = Vec::new();

        for (i, managed_dev) in self.devices.iter_mut().enumerate() {
            let events: Vec<_> = match managed_dev.device.fetch_events() {
                Ok(iter) => iter.collect(),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Vec::new(),
                Err(e) => {
                    tracing::error!("设备读取失败 {:?}: {}", managed_dev.path, e);
                    indices_to_remove.push(i);
                    Vec::new()
                }
            };

            if !events.is_empty() {
                let axes = managed_dev.axes;
                output.extend(self.state.process_events(&mut managed_dev.frame, &axes, events));
            }
        }

        for &i in indices_to_remove.iter().rev() {
            self.devices.remove(i);
        }

        output
    }

    fn poll_fds(&self) -> Vec<RawFd> {
        self.devices.iter().map(|dev| dev.device.as_raw_fd()).collect()
    }

    fn set_display_size(&mut self, width: u32, height: u32) {
        self.state.display = Some((width, height));
    }
}

// --- 独立函数与线程逻辑 ---

pub(crate) fn scan_input_dir() -> HashSet<PathBuf> {
    let mut found = HashSet::new();
    if let Ok(entries) = fs::read_dir(INPUT_DIR) {
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with("event")) {
                found.insert(path);
            }
        }
    }
    found
}

fn spawn_hotplug_thread(sender: Sender<ManagedDevice>, config: InputConfig, stop: Arc<AtomicBool>) {
    thread::spawn(move || {
        let mut known_paths = HashSet::new();
        while !stop.load(Ordering::Relaxed) {
            let current_paths = scan_input_dir();
            for path in &current_paths {
                if !known_paths.contains(path) {
                    if let Ok(Some(device)) = open_device_if_compatible(path, &config) {
                        if sender.send(device).is_err() {
                            return;
                        }
                        known_paths.insert(path.clone());
                    }
                }
            }
            known_paths.retain(|p| current_paths.contains(p));
            thread::sleep(RESCAN_INTERVAL);
        }
    });
}

fn open_device_if_compatible(path: &Path, config: &InputConfig) -> io::Result<Option<ManagedDevice>> {
    let mut device = Device::open(path)?;
    let name = device.name().unwrap_or("Unknown Device").to_string();

    if !config.accepts(&name) {
        return Ok(None);
    }

    let mut axes = AbsAxes::default();

    if is_pointer_absolute(&device) {
        if let Ok(infos) = device.get_absinfo() {
            for (code, info) in infos {
                match code {
                    AbsoluteAxisCode::ABS_X | AbsoluteAxisCode::ABS_MT_POSITION_X => axes.x = Some(info),
                    AbsoluteAxisCode::ABS_Y | AbsoluteAxisCode::ABS_MT_POSITION_Y => axes.y = Some(info),
                    _ => {}
                }
            }
        }
    } else if is_mouse(&device) {
        // 相对坐标设备无需额外配置
    } else if is_keyboard(&device) {
        let repeat_config = evdev::AutoRepeat { delay: 250, period: 33 };
        let _ = device.update_auto_repeat(&repeat_config);
    } else {
        return Ok(None);
    }

    device.set_nonblocking(true)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    tracing::info!("打开输入设备 {:?}: {}", path, name);

    Ok(Some(ManagedDevice { path: path.to_path_buf(), device, axes, frame: PendingFrame::default() }))
}

fn is_pointer_absolute(dev: &Device) -> bool {
    dev.supported_absolute_axes().is_some_and(|axes| {
        axes.contains(AbsoluteAxisCode::ABS_MT_POSITION_X) || axes.contains(AbsoluteAxisCode::ABS_X)
    }) && !is_joystick(dev)
}

fn is_mouse(dev: &Device) -> bool {
    let has_rel = dev.supported_relative_axes().is_some_and(|axes| axes.contains(RelativeAxisCode::REL_X));
    let has_btn = dev.supported_keys().is_some_and(|keys| keys.contains(KeyCode::BTN_LEFT));
    has_rel && has_btn
}

fn is_keyboard(dev: &Device) -> bool {
    dev.supported_keys().is_some_and(|keys| keys.contains(KeyCode::KEY_A) && keys.contains(KeyCode::KEY_ENTER))
}

pub(crate) fn is_joystick(dev: &Device) -> bool {
    dev.supported_keys().is_some_and(has_joystick_buttons)
}

/// BTN_JOYSTICK (= BTN_TRIGGER) 或 BTN_GAMEPAD (= BTN_SOUTH)
fn has_joystick_buttons(keys: &AttributeSetRef<KeyCode>) -> bool {
    keys.contains(KeyCode::BTN_TRIGGER) || keys.contains(KeyCode::BTN_SOUTH)
}
