//! 键盘文本解析
//!
//! 把 evdev 的按键转换为该键产生的文本字符；功能键使用 Slint 的私有区字符
//! (`i_slint_core::input::key_codes`)，这样 Slint 侧可以直接把它作为按键文本。
//!
//! 通过编译特性 `xkb` 选择实现：
//! 1. **XKB 实现** (`feature = "xkb"`): 使用 `libxkbcommon` 处理布局、修饰键和死键，
//!    支持 `XKB_DEFAULT_LAYOUT` 等环境变量。
//! 2. **简易实现** (`feature != "xkb"`): 内置 US QWERTY 映射，适用于资源受限的设备。

use crate::error::Error;
use crate::event::{Action, Modifiers};
use evdev::KeyCode;
use i_slint_core::input::key_codes;

/// 该字符是否应作为字符输入事件上报 (排除控制字符与 Slint 功能键私有区)
pub fn is_text_char(c: char) -> bool {
    !c.is_control() && !('\u{F700}'..='\u{F8FF}').contains(&c)
}

/// 与布局无关的功能键
fn special_key(code: KeyCode) -> Option<char> {
    let c = match code {
        KeyCode::KEY_LEFTSHIFT => key_codes::Shift,
        KeyCode::KEY_RIGHTSHIFT => key_codes::ShiftR,
        KeyCode::KEY_LEFTCTRL => key_codes::Control,
        KeyCode::KEY_RIGHTCTRL => key_codes::ControlR,
        KeyCode::KEY_LEFTALT => key_codes::Alt,
        KeyCode::KEY_RIGHTALT => key_codes::AltGr,
        KeyCode::KEY_LEFTMETA => key_codes::Meta,
        KeyCode::KEY_RIGHTMETA => key_codes::MetaR,
        KeyCode::KEY_CAPSLOCK => key_codes::CapsLock,

        KeyCode::KEY_ESC => key_codes::Escape,
        KeyCode::KEY_ENTER | KeyCode::KEY_KPENTER => key_codes::Return,
        KeyCode::KEY_BACKSPACE => key_codes::Backspace,
        KeyCode::KEY_SPACE => key_codes::Space,
        KeyCode::KEY_DELETE => key_codes::Delete,
        KeyCode::KEY_INSERT => key_codes::Insert,
        KeyCode::KEY_HOME => key_codes::Home,
        KeyCode::KEY_END => key_codes::End,
        KeyCode::KEY_PAGEUP => key_codes::PageUp,
        KeyCode::KEY_PAGEDOWN => key_codes::PageDown,
        KeyCode::KEY_UP => key_codes::UpArrow,
        KeyCode::KEY_DOWN => key_codes::DownArrow,
        KeyCode::KEY_LEFT => key_codes::LeftArrow,
        KeyCode::KEY_RIGHT => key_codes::RightArrow,
        KeyCode::KEY_SYSRQ => key_codes::SysReq,
        KeyCode::KEY_SCROLLLOCK => key_codes::ScrollLock,
        KeyCode::KEY_PAUSE => key_codes::Pause,
        KeyCode::KEY_STOP => key_codes::Stop,
        KeyCode::KEY_MENU => key_codes::Menu,
        KeyCode::KEY_BACK => key_codes::Back,

        KeyCode::KEY_F1 => key_codes::F1,
        KeyCode::KEY_F2 => key_codes::F2,
        KeyCode::KEY_F3 => key_codes::F3,
        KeyCode::KEY_F4 => key_codes::F4,
        KeyCode::KEY_F5 => key_codes::F5,
        KeyCode::KEY_F6 => key_codes::F6,
        KeyCode::KEY_F7 => key_codes::F7,
        KeyCode::KEY_F8 => key_codes::F8,
        KeyCode::KEY_F9 => key_codes::F9,
        KeyCode::KEY_F10 => key_codes::F10,
        KeyCode::KEY_F11 => key_codes::F11,
        KeyCode::KEY_F12 => key_codes::F12,
        _ => return None,
    };
    Some(c)
}

// -----------------------------------------------------------------------------
// 实现 1: 使用 xkbcommon (feature = "xkb")
// -----------------------------------------------------------------------------

#[cfg(feature = "xkb")]
mod impl_xkb {
    use super::*;
    use xkbcommon_rs::{self as xkb, keycode, xkb_context, xkb_keymap, xkb_state};

    /// 基于 xkbcommon 的键盘处理器
    pub struct KeyboardHandler {
        /// 维护当前的修饰键和键盘组状态
        state: xkb::State,
    }

    impl KeyboardHandler {
        /// 优先读取 `XKB_DEFAULT_*` 环境变量配置，否则使用系统默认值。
        pub fn new() -> Result<Self, Error> {
            let context = xkb::Context::new(xkb_context::ContextFlags::NO_FLAGS)
                .map_err(|_| Error::subsystem("xkb", "failed to create xkb context"))?;

            let rmlvo = xkb_keymap::RuleNames {
                rules: None,
                model: None,
                layout: None,
                variant: None,
                options: None,
            };

            let keymap = xkb::Keymap::new_from_names(context, Some(rmlvo), xkb_keymap::CompileFlags::NO_FLAGS)
                .map_err(|_| Error::subsystem("xkb", "failed to compile xkb keymap"))?;

            tracing::info!("Keyboard: 使用 xkbcommon 布局");
            Ok(Self { state: xkb::State::new(keymap) })
        }

        /// 修饰键状态由 xkb 自己维护，`_mods` 仅用于简易实现
        pub fn handle_key_event(&mut self, key_code: KeyCode, action: Action, _mods: &Modifiers) -> Option<char> {
            // Linux evdev keycodes 需要 +8 偏移量才能映射到 XKB keycodes
            let xkb_keycode = keycode::Keycode(u32::from(key_code.code()) + 8);

            let direction = match action {
                Action::Release => xkb_state::KeyDirection::Up,
                Action::Press | Action::Repeat => xkb_state::KeyDirection::Down,
            };
            self.state.update_key(xkb_keycode, direction);

            // 功能键不依赖布局；其余交给 keysym 解析
            special_key(key_code).or_else(|| {
                self.state
                    .key_get_one_sym(xkb_keycode)
                    .and_then(keysym_text)
            })
        }
    }

    fn keysym_text(sym: xkeysym::Keysym) -> Option<char> {
        let raw = sym.raw();
        match raw {
            xkeysym::key::Tab | xkeysym::key::KP_Tab => Some(key_codes::Tab),
            xkeysym::key::ISO_Left_Tab => Some(key_codes::Backtab),
            xkeysym::key::ISO_Level3_Shift => Some(key_codes::AltGr),
            xkeysym::key::KP_Delete => Some(key_codes::Delete),
            xkeysym::key::F13..=xkeysym::key::F24 => {
                char::from_u32(key_codes::F13 as u32 + (raw - xkeysym::key::F13))
            }
            _ => sym.key_char(),
        }
    }
}

// -----------------------------------------------------------------------------
// 实现 2: 简易映射 (无 xkb, feature != "xkb")
// -----------------------------------------------------------------------------

#[cfg(not(feature = "xkb"))]
mod impl_simple {
    use super::*;

    /// (按键, 普通字符, Shift 字符)
    const US_QWERTY: &[(KeyCode, char, char)] = &[
        (KeyCode::KEY_1, '1', '!'),
        (KeyCode::KEY_2, '2', '@'),
        (KeyCode::KEY_3, '3', '#'),
        (KeyCode::KEY_4, '4', '$'),
        (KeyCode::KEY_5, '5', '%'),
        (KeyCode::KEY_6, '6', '^'),
        (KeyCode::KEY_7, '7', '&'),
        (KeyCode::KEY_8, '8', '*'),
        (KeyCode::KEY_9, '9', '('),
        (KeyCode::KEY_0, '0', ')'),
        (KeyCode::KEY_MINUS, '-', '_'),
        (KeyCode::KEY_EQUAL, '=', '+'),
        (KeyCode::KEY_LEFTBRACE, '[', '{'),
        (KeyCode::KEY_RIGHTBRACE, ']', '}'),
        (KeyCode::KEY_BACKSLASH, '\\', '|'),
        (KeyCode::KEY_SEMICOLON, ';', ':'),
        (KeyCode::KEY_APOSTROPHE, '\'', '"'),
        (KeyCode::KEY_COMMA, ',', '<'),
        (KeyCode::KEY_DOT, '.', '>'),
        (KeyCode::KEY_SLASH, '/', '?'),
        (KeyCode::KEY_GRAVE, '`', '~'),
        (KeyCode::KEY_Q, 'q', 'Q'),
        (KeyCode::KEY_W, 'w', 'W'),
        (KeyCode::KEY_E, 'e', 'E'),
        (KeyCode::KEY_R, 'r', 'R'),
        (KeyCode::KEY_T, 't', 'T'),
        (KeyCode::KEY_Y, 'y', 'Y'),
        (KeyCode::KEY_U, 'u', 'U'),
        (KeyCode::KEY_I, 'i', 'I'),
        (KeyCode::KEY_O, 'o', 'O'),
        (KeyCode::KEY_P, 'p', 'P'),
        (KeyCode::KEY_A, 'a', 'A'),
        (KeyCode::KEY_S, 's', 'S'),
        (KeyCode::KEY_D, 'd', 'D'),
        (KeyCode::KEY_F, 'f', 'F'),
        (KeyCode::KEY_G, 'g', 'G'),
        (KeyCode::KEY_H, 'h', 'H'),
        (KeyCode::KEY_J, 'j', 'J'),
        (KeyCode::KEY_K, 'k', 'K'),
        (KeyCode::KEY_L, 'l', 'L'),
        (KeyCode::KEY_Z, 'z', 'Z'),
        (KeyCode::KEY_X, 'x', 'X'),
        (KeyCode::KEY_C, 'c', 'C'),
        (KeyCode::KEY_V, 'v', 'V'),
        (KeyCode::KEY_B, 'b', 'B'),
        (KeyCode::KEY_N, 'n', 'N'),
        (KeyCode::KEY_M, 'm', 'M'),
        (KeyCode::KEY_KPMINUS, '-', '-'),
        (KeyCode::KEY_KPPLUS, '+', '+'),
        (KeyCode::KEY_KPASTERISK, '*', '*'),
        (KeyCode::KEY_KPSLASH, '/', '/'),
        (KeyCode::KEY_KPDOT, '.', '.'),
    ];

    /// 简易键盘处理器 (静态 US QWERTY 布局)
    pub struct KeyboardHandler;

    impl KeyboardHandler {
        pub fn new() -> Result<Self, Error> {
            tracing::info!("Keyboard: Using simple static mapping (No XKB)");
            Ok(Self)
        }

        pub fn handle_key_event(&mut self, key_code: KeyCode, _action: Action, mods: &Modifiers) -> Option<char> {
            if key_code == KeyCode::KEY_TAB {
                return Some(if mods.shift { key_codes::Backtab } else { key_codes::Tab });
            }
            if let Some(c) = special_key(key_code) {
                return Some(c);
            }

            let &(_, plain, shifted) = US_QWERTY.iter().find(|(code, _, _)| *code == key_code)?;
            // Caps Lock 只影响字母
            let upper = if plain.is_ascii_alphabetic() { mods.shift != mods.caps_lock } else { mods.shift };
            Some(if upper { shifted } else { plain })
        }
    }
}

// -----------------------------------------------------------------------------
// 统一导出类型
// -----------------------------------------------------------------------------

#[cfg(feature = "xkb")]
pub use impl_xkb::KeyboardHandler;

#[cfg(not(feature = "xkb"))]
pub use impl_simple::KeyboardHandler;
