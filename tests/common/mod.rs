// ============================================================================
// tests/common/mod.rs - 計測用 GPE レジスタスタブ
// ============================================================================
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use cht_vgpio::io::GpeRegisters;

pub const PME: u32 = 0x2000;
pub const CO_OWNER: u32 = 0x0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadStatus,
    WriteStatus(u32),
    ReadEnable,
    WriteEnable(u32),
}

impl Access {
    pub fn is_write(&self) -> bool {
        matches!(self, Access::WriteStatus(_) | Access::WriteEnable(_))
    }
}

#[derive(Default)]
pub struct Hw {
    pub status: u32,
    pub enable: u32,
    pub log: Vec<(ThreadId, Access)>,
}

/// 全アクセスをスレッドIDつきで記録する GPE ブロック
#[derive(Clone)]
pub struct RecordingGpe {
    hw: Arc<Mutex<Hw>>,
    slow: Arc<AtomicBool>,
}

impl RecordingGpe {
    pub fn new(status: u32, enable: u32) -> Self {
        Self {
            hw: Arc::new(Mutex::new(Hw {
                status,
                enable,
                log: Vec::new(),
            })),
            slow: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 読み出しのたびに待つ（後段を実行中に留めるため）
    pub fn set_slow(&self, slow: bool) {
        self.slow.store(slow, Ordering::SeqCst);
    }

    /// ハードウェア（または共有相手）によるステータスのアサート。記録しない
    pub fn assert_status(&self, bits: u32) {
        self.hw.lock().unwrap().status |= bits;
    }

    pub fn status(&self) -> u32 {
        self.hw.lock().unwrap().status
    }

    pub fn enable(&self) -> u32 {
        self.hw.lock().unwrap().enable
    }

    pub fn log(&self) -> Vec<(ThreadId, Access)> {
        self.hw.lock().unwrap().log.clone()
    }

    pub fn access_count(&self) -> usize {
        self.hw.lock().unwrap().log.len()
    }

    pub fn write_count(&self) -> usize {
        self.hw
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(_, a)| a.is_write())
            .count()
    }

    fn record(&self, access: Access) -> std::sync::MutexGuard<'_, Hw> {
        let mut hw = self.hw.lock().unwrap();
        hw.log.push((thread::current().id(), access));
        hw
    }

    fn pause(&self) {
        if self.slow.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(30));
        } else {
            thread::yield_now();
        }
    }
}

impl GpeRegisters for RecordingGpe {
    fn read_status(&mut self) -> u32 {
        let v = self.record(Access::ReadStatus).status;
        self.pause();
        v
    }

    fn write_status(&mut self, value: u32) {
        self.record(Access::WriteStatus(value)).status &= !value;
        thread::yield_now();
    }

    fn read_enable(&mut self) -> u32 {
        let v = self.record(Access::ReadEnable).enable;
        self.pause();
        v
    }

    fn write_enable(&mut self, value: u32) {
        self.record(Access::WriteEnable(value)).enable = value;
        thread::yield_now();
    }
}

/// 各応答サイクル（ReadStatus で始まる区間）が1スレッドで完結しているか
pub fn cycles_are_unsplit(log: &[(ThreadId, Access)]) -> bool {
    let mut owner: Option<ThreadId> = None;
    for (tid, access) in log {
        match access {
            Access::ReadStatus => owner = Some(*tid),
            _ => {
                if let Some(o) = owner {
                    if o != *tid {
                        return false;
                    }
                }
            }
        }
    }
    true
}
