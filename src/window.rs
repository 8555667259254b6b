//! 窗口：焦点目标接口、Vivante 原生窗口、Slint 适配
//!
//! 平台只通过 [`WindowInput`] 与窗口交互：注入输入事件，以及查询指针是否悬停、
//! 指针在窗口坐标系中的位置。设备坐标到窗口坐标的变换由窗口负责。

use std::cell::Cell;
use std::rc::{Rc, Weak};

use i_slint_core::api::LogicalPosition;
use i_slint_core::platform::{PointerEventButton, WindowAdapter, WindowEvent};
use i_slint_core::SharedString;

use crate::cursor::CursorPosition;
use crate::error::Error;
use crate::event::{Action, KeyInput, Modifiers, MouseButton};
use crate::vivante::{DisplayApi, NativeDisplay, NativeWindow, WindowGeometry, WindowInfo};

/// 每格滚轮对应的逻辑像素
const SCROLL_STEP: f64 = 20.0;

/// 窗口库为每个窗口提供的输入注入接口
pub trait WindowInput {
    fn input_key(&self, key: &KeyInput);
    fn input_char(&self, codepoint: char, mods: Modifiers, plain: bool);
    fn input_scroll(&self, xoffset: f64, yoffset: f64);
    fn input_mouse_click(&self, button: MouseButton, action: Action, mods: Modifiers);
    /// `x`/`y` 为窗口坐标
    fn input_cursor_pos(&self, x: f64, y: f64);

    /// 设备坐标 `cursor` 是否位于窗口上
    fn hovered(&self, cursor: CursorPosition) -> bool;
    /// 设备坐标 -> 窗口坐标
    fn cursor_position(&self, cursor: CursorPosition) -> (f64, f64);
}

/// 平台与窗口共享的原生句柄槽位；任何一方销毁窗口后置为 `None`
pub(crate) type NativeWindowSlot = Rc<Cell<Option<NativeWindow>>>;

/// 通过 `fbCreateWindow` 创建的原生窗口，析构时调用 `fbDestroyWindow`
///
/// 平台终止时会先销毁所有仍存活的窗口，再销毁显示器；之后句柄不再可用。
pub struct VivanteWindow {
    api: Rc<dyn DisplayApi>,
    native: NativeWindowSlot,
    geometry: Cell<WindowGeometry>,
}

impl VivanteWindow {
    pub(crate) fn create(api: Rc<dyn DisplayApi>, display: NativeDisplay, requested: WindowGeometry) -> Result<Self, Error> {
        let native = api
            .create_window(display, requested)
            .ok_or(Error::WindowCreate { width: requested.width, height: requested.height })?;
        // 驱动可能调整尺寸，以实际几何为准
        let geometry = api.get_window_geometry(native);
        tracing::info!(
            "创建原生窗口 {}x{} @ ({}, {})",
            geometry.width, geometry.height, geometry.x, geometry.y
        );
        Ok(Self { api, native: Rc::new(Cell::new(Some(native))), geometry: Cell::new(geometry) })
    }

    pub(crate) fn slot(&self) -> Weak<Cell<Option<NativeWindow>>> {
        Rc::downgrade(&self.native)
    }

    /// 交给 EGL 创建窗口表面的句柄；平台终止后为 `None`
    pub fn native_window(&self) -> Option<NativeWindow> {
        self.native.get()
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.geometry.get()
    }

    /// 重新向驱动查询几何信息
    pub fn refresh_geometry(&self) -> Option<WindowGeometry> {
        let geometry = self.api.get_window_geometry(self.native.get()?);
        self.geometry.set(geometry);
        Some(geometry)
    }

    pub fn info(&self) -> Option<WindowInfo> {
        Some(self.api.get_window_info(self.native.get()?))
    }
}

impl Drop for VivanteWindow {
    fn drop(&mut self) {
        if let Some(native) = self.native.take() {
            self.api.destroy_window(native);
        }
    }
}

fn key_event(action: Action, text: SharedString) -> WindowEvent {
    match action {
        Action::Press => WindowEvent::KeyPressed { text },
        Action::Repeat => WindowEvent::KeyPressRepeated { text },
        Action::Release => WindowEvent::KeyReleased { text },
    }
}

fn pointer_button(button: MouseButton) -> PointerEventButton {
    match button {
        MouseButton::Left => PointerEventButton::Left,
        MouseButton::Right => PointerEventButton::Right,
        MouseButton::Middle => PointerEventButton::Middle,
        MouseButton::Back => PointerEventButton::Back,
        MouseButton::Forward => PointerEventButton::Forward,
    }
}

/// 把输入注入到 Slint 窗口
///
/// 持有窗口适配器的弱引用；适配器销毁后所有事件被丢弃。
pub struct SlintWindowInput {
    adapter: Weak<dyn WindowAdapter>,
    geometry: Cell<WindowGeometry>,
    /// 最近一次的窗口坐标 (逻辑像素)，点击和滚轮事件需要位置
    last_position: Cell<LogicalPosition>,
}

impl SlintWindowInput {
    pub fn new(adapter: &Rc<dyn WindowAdapter>, geometry: WindowGeometry) -> Self {
        Self {
            adapter: Rc::downgrade(adapter),
            geometry: Cell::new(geometry),
            last_position: Cell::new(LogicalPosition::new(0.0, 0.0)),
        }
    }

    pub fn set_geometry(&self, geometry: WindowGeometry) {
        self.geometry.set(geometry);
    }

    fn dispatch(&self, event: WindowEvent) {
        match self.adapter.upgrade() {
            Some(adapter) => adapter.window().dispatch_event(event),
            None => tracing::debug!("Slint 窗口已销毁，丢弃事件 {:?}", event),
        }
    }

    fn scale_factor(&self) -> f64 {
        self.adapter.upgrade().map_or(1.0, |adapter| f64::from(adapter.window().scale_factor()))
    }

    /// 物理像素 -> 逻辑像素，并记住位置供点击和滚轮使用
    fn pointer_moved(&self, x: f64, y: f64, scale: f64) -> WindowEvent {
        let position = LogicalPosition::new((x / scale) as f32, (y / scale) as f32);
        self.last_position.set(position);
        WindowEvent::PointerMoved { position }
    }

    fn pointer_scrolled(&self, xoffset: f64, yoffset: f64) -> WindowEvent {
        WindowEvent::PointerScrolled {
            position: self.last_position.get(),
            delta_x: (xoffset * SCROLL_STEP) as f32,
            delta_y: (yoffset * SCROLL_STEP) as f32,
        }
    }

    fn pointer_clicked(&self, button: MouseButton, action: Action) -> Option<WindowEvent> {
        let position = self.last_position.get();
        let button = pointer_button(button);
        match action {
            Action::Press => Some(WindowEvent::PointerPressed { position, button }),
            Action::Release => Some(WindowEvent::PointerReleased { position, button }),
            Action::Repeat => None,
        }
    }
}

impl WindowInput for SlintWindowInput {
    fn input_key(&self, key: &KeyInput) {
        // Slint 的文本输入由按键事件携带；没有文本的按键对 Slint 无意义
        if let Some(text) = key.text {
            self.dispatch(key_event(key.action, text.into()));
        }
    }

    fn input_char(&self, _codepoint: char, _mods: Modifiers, _plain: bool) {}

    fn input_scroll(&self, xoffset: f64, yoffset: f64) {
        self.dispatch(self.pointer_scrolled(xoffset, yoffset));
    }

    fn input_mouse_click(&self, button: MouseButton, action: Action, _mods: Modifiers) {
        if let Some(event) = self.pointer_clicked(button, action) {
            self.dispatch(event);
        }
    }

    fn input_cursor_pos(&self, x: f64, y: f64) {
        let event = self.pointer_moved(x, y, self.scale_factor());
        self.dispatch(event);
    }

    fn hovered(&self, cursor: CursorPosition) -> bool {
        self.geometry.get().contains(cursor.x, cursor.y)
    }

    fn cursor_position(&self, cursor: CursorPosition) -> (f64, f64) {
        self.geometry.get().to_local(cursor.x, cursor.y)
    }
}
