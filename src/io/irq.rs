// ============================================================================
// src/io/irq.rs - Shared Legacy IRQ Lines
// ============================================================================
//!
//! # 共有レガシー割り込みライン
//!
//! 1本のラインに複数のハンドラをぶら下げられる。共有できるのは
//! 既存・新規のすべてのハンドラが `IrqFlags::SHARED` を宣言した場合のみ。
//!
//! `dispatch()` はプラットフォームの ISR から呼ばれ、登録順に全ハンドラを
//! 呼び出す。ハンドラはラインのロックを保持したまま実行されるため、
//! `free_irq()` は実行中のハンドラが戻るまで待つ。

use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::error::IrqError;
use crate::sync::without_interrupts;

// ============================================================================
// Constants
// ============================================================================

/// レガシー (PIC) IRQ ライン数
pub const LEGACY_IRQ_LINES: usize = 16;

// ============================================================================
// Handler Types
// ============================================================================

/// ハンドラの戻り値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// このデバイスの割り込みではない
    None,
    /// 処理した
    Handled,
}

bitflags! {
    /// 割り込み要求フラグ
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqFlags: u32 {
        /// 他のデバイスとラインを共有する
        const SHARED = 1 << 0;
    }
}

/// 割り込みハンドラ
///
/// 割り込みコンテキストで実行される。ブロックしてはならない。
pub trait IrqHandler: Send + Sync {
    fn handle_irq(&self, irq: u8) -> IrqReturn;
}

impl<F> IrqHandler for F
where
    F: Fn(u8) -> IrqReturn + Send + Sync,
{
    fn handle_irq(&self, irq: u8) -> IrqReturn {
        self(irq)
    }
}

/// 登録済みハンドラの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IrqCookie(u64);

impl IrqCookie {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// Controller
// ============================================================================

/// 割り込みの購読・解除を行うプラットフォーム側の窓口
pub trait IrqController: Send + Sync {
    fn request_irq(
        &self,
        irq: u8,
        flags: IrqFlags,
        name: &'static str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<IrqCookie, IrqError>;

    /// 登録を解除する。戻った時点で該当ハンドラは実行中でない
    fn free_irq(&self, irq: u8, cookie: IrqCookie) -> Result<(), IrqError>;
}

/// ラインに登録された1ハンドラ
struct IrqAction {
    cookie: IrqCookie,
    name: &'static str,
    flags: IrqFlags,
    handler: Arc<dyn IrqHandler>,
}

/// レガシー IRQ ライン表
pub struct SharedIrqTable {
    lines: [Mutex<Vec<IrqAction>>; LEGACY_IRQ_LINES],
    counts: [AtomicU64; LEGACY_IRQ_LINES],
    next_cookie: AtomicU64,
}

impl SharedIrqTable {
    pub const fn new() -> Self {
        Self {
            lines: [const { Mutex::new(Vec::new()) }; LEGACY_IRQ_LINES],
            counts: [const { AtomicU64::new(0) }; LEGACY_IRQ_LINES],
            next_cookie: AtomicU64::new(1),
        }
    }

    fn line(&self, irq: u8) -> Result<&Mutex<Vec<IrqAction>>, IrqError> {
        self.lines.get(irq as usize).ok_or(IrqError::InvalidLine)
    }

    /// プラットフォーム ISR 入口
    ///
    /// いずれかのハンドラが `Handled` を返したら `Handled`。
    pub fn dispatch(&self, irq: u8) -> IrqReturn {
        let Ok(line) = self.line(irq) else {
            return IrqReturn::None;
        };
        self.counts[irq as usize].fetch_add(1, Ordering::Relaxed);

        without_interrupts(|| {
            let actions = line.lock();
            let mut ret = IrqReturn::None;
            for action in actions.iter() {
                if action.handler.handle_irq(irq) == IrqReturn::Handled {
                    ret = IrqReturn::Handled;
                }
            }
            ret
        })
    }

    /// ラインの登録ハンドラ数
    pub fn handler_count(&self, irq: u8) -> usize {
        self.line(irq)
            .map(|line| without_interrupts(|| line.lock().len()))
            .unwrap_or(0)
    }

    /// ラインの登録名一覧（デバッグ用）
    pub fn handler_names(&self, irq: u8) -> Vec<&'static str> {
        self.line(irq)
            .map(|line| without_interrupts(|| line.lock().iter().map(|a| a.name).collect()))
            .unwrap_or_default()
    }

    /// ラインの割り込み発生回数
    pub fn dispatch_count(&self, irq: u8) -> u64 {
        self.counts
            .get(irq as usize)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Default for SharedIrqTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqController for SharedIrqTable {
    fn request_irq(
        &self,
        irq: u8,
        flags: IrqFlags,
        name: &'static str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<IrqCookie, IrqError> {
        let line = self.line(irq)?;

        without_interrupts(|| {
            let mut actions = line.lock();
            let shareable = flags.contains(IrqFlags::SHARED)
                && actions.iter().all(|a| a.flags.contains(IrqFlags::SHARED));
            if !actions.is_empty() && !shareable {
                return Err(IrqError::Busy);
            }

            let cookie = IrqCookie(self.next_cookie.fetch_add(1, Ordering::Relaxed));
            actions.push(IrqAction {
                cookie,
                name,
                flags,
                handler,
            });
            Ok(cookie)
        })
    }

    fn free_irq(&self, irq: u8, cookie: IrqCookie) -> Result<(), IrqError> {
        let line = self.line(irq)?;

        without_interrupts(|| {
            let mut actions = line.lock();
            let pos = actions
                .iter()
                .position(|a| a.cookie == cookie)
                .ok_or(IrqError::NotRegistered)?;
            actions.remove(pos);
            Ok(())
        })
    }
}
