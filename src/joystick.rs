//! Linux 摇杆/手柄枚举
//!
//! 只负责在初始化时发现并持有设备，不产生输入事件。

use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

use evdev::Device;

use crate::error::Error;
use crate::input::{is_joystick, scan_input_dir, InputSubsystem};

pub struct Joystick {
    pub path: PathBuf,
    pub name: String,
    device: Device,
}

impl Joystick {
    pub fn raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }
}

#[derive(Default)]
pub struct LinuxJoysticks {
    joysticks: Vec<Joystick>,
}

impl LinuxJoysticks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn joysticks(&self) -> &[Joystick] {
        &self.joysticks
    }
}

impl InputSubsystem for LinuxJoysticks {
    fn name(&self) -> &'static str {
        "joystick"
    }

    fn init(&mut self) -> Result<(), Error> {
        let mut paths: Vec<_> = scan_input_dir().into_iter().collect();
        paths.sort();

        for path in paths {
            // 没有权限的节点直接跳过
            let Ok(device) = Device::open(&path) else { continue };
            if !is_joystick(&device) {
                continue;
            }
            let name = device.name().unwrap_or("Unknown Joystick").to_string();
            tracing::info!("发现摇杆 {:?}: {}", path, name);
            self.joysticks.push(Joystick { path, name, device });
        }
        Ok(())
    }

    fn terminate(&mut self) {
        self.joysticks.clear();
    }
}
