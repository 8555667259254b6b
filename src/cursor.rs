//! 设备空间中的光标位置
//!
//! 相对移动和绝对移动都经过 [`CursorTracker::set_position`]，
//! 这是光标坐标唯一的写入口，每个轴独立夹取到 `[0, 显示器尺寸]`。

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl CursorPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CursorTracker {
    position: CursorPosition,
    width: f64,
    height: f64,
}

impl CursorTracker {
    /// 设置边界并把光标放到显示器中心 (按整数像素取半)
    pub fn new(width: i32, height: i32) -> Self {
        let mut tracker = Self { position: CursorPosition::default(), width: 0.0, height: 0.0 };
        tracker.reset(width, height);
        tracker
    }

    pub fn reset(&mut self, width: i32, height: i32) {
        self.width = f64::from(width.max(0));
        self.height = f64::from(height.max(0));
        self.set_position(f64::from(width / 2), f64::from(height / 2));
    }

    pub fn position(&self) -> CursorPosition {
        self.position
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn set_position(&mut self, x: f64, y: f64) -> CursorPosition {
        // NaN 视为 0，避免污染后续的相对移动
        let clamp = |v: f64, max: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, max) };
        self.position = CursorPosition { x: clamp(x, self.width), y: clamp(y, self.height) };
        self.position
    }

    pub fn move_by(&mut self, dx: f64, dy: f64) -> CursorPosition {
        let CursorPosition { x, y } = self.position;
        self.set_position(x + dx, y + dy)
    }
}
