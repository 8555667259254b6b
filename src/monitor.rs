//! 显示器登记
//!
//! Vivante fbdev 只有一块固定尺寸的显示器，初始化时登记一次，终止时移除。

use std::fmt;
use std::rc::Rc;

/// 登记时使用的固定显示器名称
pub const DISPLAY_NAME: &str = "Display";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub name: String,
    pub width: i32,
    pub height: i32,
}

impl Monitor {
    pub fn new(name: impl Into<String>, width: i32, height: i32) -> Self {
        Self { name: name.into(), width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    Connected,
    Disconnected,
}

/// 新显示器插入列表的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    First,
    Last,
}

pub type MonitorCallback = Box<dyn FnMut(&Monitor, MonitorEvent)>;

/// 已连接显示器的列表，第一个为主显示器
#[derive(Default)]
pub struct MonitorList {
    monitors: Vec<Rc<Monitor>>,
    callback: Option<MonitorCallback>,
}

impl fmt::Debug for MonitorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorList")
            .field("monitors", &self.monitors)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl MonitorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置显示器连接/断开的监听器
    pub fn on_event(&mut self, callback: MonitorCallback) {
        self.callback = Some(callback);
    }

    pub fn connect(&mut self, monitor: Monitor, placement: Placement) -> Rc<Monitor> {
        let monitor = Rc::new(monitor);
        match placement {
            Placement::First => self.monitors.insert(0, monitor.clone()),
            Placement::Last => self.monitors.push(monitor.clone()),
        }
        tracing::info!("显示器已连接: {} {}x{}", monitor.name, monitor.width, monitor.height);
        self.notify(&monitor, MonitorEvent::Connected);
        monitor
    }

    /// 按名称移除显示器，返回被移除的记录
    pub fn disconnect(&mut self, name: &str) -> Option<Rc<Monitor>> {
        let index = self.monitors.iter().position(|m| m.name == name)?;
        let monitor = self.monitors.remove(index);
        tracing::info!("显示器已断开: {}", monitor.name);
        self.notify(&monitor, MonitorEvent::Disconnected);
        Some(monitor)
    }

    pub fn primary(&self) -> Option<&Rc<Monitor>> {
        self.monitors.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Monitor>> {
        self.monitors.iter()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    fn notify(&mut self, monitor: &Monitor, event: MonitorEvent) {
        if let Some(callback) = self.callback.as_mut() {
            callback(monitor, event);
        }
    }
}
