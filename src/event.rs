//! evdev 桥接层与平台之间传递的原始输入事件。

use evdev::KeyCode;

/// 按键/按钮动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Release,
    Press,
    Repeat,
}

impl Action {
    /// evdev 的 value: 0 抬起, 1 按下, 2 自动重复
    pub fn from_evdev(value: i32) -> Option<Self> {
        match value {
            0 => Some(Action::Release),
            1 => Some(Action::Press),
            2 => Some(Action::Repeat),
            _ => None,
        }
    }
}

/// 当前按下的修饰键
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    pub super_key: bool,
    pub caps_lock: bool,
    pub num_lock: bool,
}

impl Modifiers {
    /// 没有 Ctrl/Alt/Super 参与时产生的字符才算普通文本输入
    pub fn is_plain(&self) -> bool {
        !(self.control || self.alt || self.super_key)
    }

    /// 根据修饰键的按下/抬起更新状态，返回该键是否为修饰键
    pub fn update(&mut self, key: KeyCode, action: Action) -> bool {
        let down = action != Action::Release;
        match key {
            KeyCode::KEY_LEFTSHIFT | KeyCode::KEY_RIGHTSHIFT => self.shift = down,
            KeyCode::KEY_LEFTCTRL | KeyCode::KEY_RIGHTCTRL => self.control = down,
            KeyCode::KEY_LEFTALT | KeyCode::KEY_RIGHTALT => self.alt = down,
            KeyCode::KEY_LEFTMETA | KeyCode::KEY_RIGHTMETA => self.super_key = down,
            // 锁定键只在按下时翻转
            KeyCode::KEY_CAPSLOCK => {
                if action == Action::Press {
                    self.caps_lock = !self.caps_lock;
                }
            }
            KeyCode::KEY_NUMLOCK => {
                if action == Action::Press {
                    self.num_lock = !self.num_lock;
                }
            }
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

impl MouseButton {
    pub fn from_key_code(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::BTN_LEFT | KeyCode::BTN_TOUCH => Some(MouseButton::Left),
            KeyCode::BTN_RIGHT => Some(MouseButton::Right),
            KeyCode::BTN_MIDDLE => Some(MouseButton::Middle),
            KeyCode::BTN_SIDE => Some(MouseButton::Back),
            KeyCode::BTN_EXTRA => Some(MouseButton::Forward),
            _ => None,
        }
    }
}

/// 一次键盘按键
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInput {
    pub key: KeyCode,
    /// 原始扫描码 (evdev code)
    pub scancode: u16,
    pub action: Action,
    pub mods: Modifiers,
    /// 键盘布局解析出的文本；功能键使用 Slint 的私有区字符
    pub text: Option<char>,
}

/// 桥接层产生、由平台转发给焦点窗口的事件
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Key(KeyInput),
    Char { codepoint: char, mods: Modifiers, plain: bool },
    Scroll { xoffset: f64, yoffset: f64 },
    MouseClick { button: MouseButton, action: Action, mods: Modifiers },
    /// 绝对坐标 (显示器像素)
    CursorPos { x: f64, y: f64 },
    /// 相对位移
    CursorMove { dx: f64, dy: f64 },
}
