// ============================================================================
// src/io/vgpio.rs - Virtual GPIO IRQ#9 Debouncer
// ============================================================================
//!
//! # 共有 GPE イベントのデバウンサ
//!
//! 一部の Cherry Trail 機種では PME イベントが GPE0a 経由で共有 IRQ#9 に
//! 配線されており、ステータスを落とさない限り割り込みが鳴り続ける。
//!
//! ## 処理の流れ
//! 1. ISR: 後段の Work を予約して `Handled` を返すだけ。レジスタには触れない
//! 2. 後段: レジスタロックを取り、GPE レジスタ対に対して
//!    「無効化 → ステータスクリア → イネーブル復元」を行う
//!
//! 共有ブロックへの書き込みは常に自分のビットだけ。ステータスは W1C なので
//! 自ビットのみを書き、イネーブルは読んだ値をそのまま戻す。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};
use log::{debug, info, log, warn};
use spin::Mutex;

use crate::config::{CYCLE_LOG_LEVEL, VgpioConfig};
use crate::error::Result;
use crate::io::gpe::{GpeBits, GpeRegisters};
use crate::io::irq::{IrqController, IrqCookie, IrqFlags, IrqHandler, IrqReturn};
use crate::platform::{PlatformDevice, VgpioResources};
use crate::task::{Work, WorkQueue};

// ============================================================================
// Acknowledge Cycle
// ============================================================================

/// 1回の応答サイクルの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckCycle {
    /// サイクル開始時のステータススナップショット
    pub status: u32,
    /// サイクル開始時のイネーブルスナップショット
    pub enable: u32,
    /// 自ビットを一時的に無効化したか
    pub disabled: bool,
    /// 自ビットのステータスをクリアしたか
    pub cleared: bool,
}

impl AckCycle {
    /// レジスタへの書き込みが一切なかったか
    pub fn is_noop(&self) -> bool {
        !self.disabled && !self.cleared
    }
}

/// GPE レジスタ対と、それを直列化するレジスタロック
pub struct GpeDebouncer<R> {
    regs: Mutex<R>,
    status_bit: GpeBits,
    enable_bit: GpeBits,
    cycles: AtomicU64,
    cleared: AtomicU64,
}

impl<R: GpeRegisters> GpeDebouncer<R> {
    pub fn new(regs: R, status_bit: GpeBits, enable_bit: GpeBits) -> Self {
        Self {
            regs: Mutex::new(regs),
            status_bit,
            enable_bit,
            cycles: AtomicU64::new(0),
            cleared: AtomicU64::new(0),
        }
    }

    pub fn from_config(regs: R, config: &VgpioConfig) -> Self {
        Self::new(regs, config.status_bit, config.enable_bit)
    }

    /// 自ビットを有効化し、有効化前のイネーブル値を返す
    ///
    /// 共有前（`&mut self`）にのみ呼べるため、ロックは取らない。
    pub fn arm_enable(&mut self) -> u32 {
        let regs = self.regs.get_mut();
        let before = regs.read_enable();
        regs.write_enable(before | self.enable_bit.bits());
        before
    }

    /// 自ビットだけを `before` の状態に戻す（アタッチ失敗時のロールバック）
    pub fn restore_enable_bit(&self, before: u32) {
        let bit = self.enable_bit.bits();
        let mut regs = self.regs.lock();
        let current = regs.read_enable();
        regs.write_enable((current & !bit) | (before & bit));
    }

    /// 自ビットを無条件に無効化する（デタッチ時）
    pub fn disable(&self) {
        let mut regs = self.regs.lock();
        let current = regs.read_enable();
        regs.write_enable(current & !self.enable_bit.bits());
    }

    /// 応答サイクル: 無効化 → ステータスクリア → イネーブル復元
    ///
    /// レジスタはロック内で各1回だけ読む。両方のビットが既に落ちていれば
    /// 何も書かない。
    pub fn acknowledge(&self) -> AckCycle {
        let en_bit = self.enable_bit.bits();
        let sts_bit = self.status_bit.bits();

        let mut regs = self.regs.lock();
        let status = regs.read_status();
        let enable = regs.read_enable();

        let disabled = enable & en_bit != 0;
        let cleared = status & sts_bit != 0;

        // ステータスを落とした瞬間にハードが再アサートしないよう先に無効化
        if disabled {
            regs.write_enable(enable & !en_bit);
        }
        if cleared {
            regs.write_status(sts_bit);
        }
        if disabled {
            regs.write_enable(enable);
        }
        drop(regs);

        self.cycles.fetch_add(1, Ordering::Relaxed);
        if cleared {
            self.cleared.fetch_add(1, Ordering::Relaxed);
        }

        let cycle = AckCycle {
            status,
            enable,
            disabled,
            cleared,
        };
        log!(
            CYCLE_LOG_LEVEL,
            "cht-vgpio: ack sts={:#010x} en={:#010x} cleared={}",
            status,
            enable,
            cleared
        );
        cycle
    }

    /// 実行した応答サイクル数
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// ステータスをクリアしたサイクル数
    pub fn cleared_count(&self) -> u64 {
        self.cleared.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Device Instance
// ============================================================================

/// デバイスのアーム状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    Unarmed,
    Armed,
}

/// 共有ラインの ISR
///
/// Work の予約だけを行う。ライン共有のため常に `Handled` を返す。
struct VgpioIrqHandler {
    work: Arc<Work>,
}

impl IrqHandler for VgpioIrqHandler {
    fn handle_irq(&self, _irq: u8) -> IrqReturn {
        self.work.schedule();
        IrqReturn::Handled
    }
}

/// プローブ済みデバイス1個分の状態
///
/// ISR と後段はこのハンドルが所有する `Arc` 経由でのみ状態に触れる。
/// ドロップ時、未デタッチならデタッチする。
pub struct VgpioDevice<R: GpeRegisters + 'static> {
    device: PlatformDevice,
    config: VgpioConfig,
    debouncer: Arc<GpeDebouncer<R>>,
    work: Arc<Work>,
    irq: Arc<dyn IrqController>,
    queue: Arc<dyn WorkQueue>,
    cookie: Option<IrqCookie>,
}

impl<R: GpeRegisters + 'static> VgpioDevice<R> {
    /// アーム: 自ビットを有効化してから共有ラインを購読する
    ///
    /// 購読に失敗した場合は自ビットをアーム前の状態に戻してからエラーを返す。
    pub fn attach(
        device: PlatformDevice,
        config: VgpioConfig,
        regs: R,
        resources: &VgpioResources,
    ) -> Result<Self> {
        // 後段キューの領域確保。ここで失敗してもまだ何もアームしていない
        resources.queue.reserve()?;

        let mut debouncer = GpeDebouncer::from_config(regs, &config);
        let before = debouncer.arm_enable();
        let debouncer = Arc::new(debouncer);

        let d = Arc::clone(&debouncer);
        let work = Work::new(Arc::clone(&resources.queue), move || {
            d.acknowledge();
        });
        let handler: Arc<dyn IrqHandler> = Arc::new(VgpioIrqHandler {
            work: Arc::clone(&work),
        });

        info!("{}.{}: Assigning IRQ {}", device.name, device.id, config.irq);
        let cookie = match resources
            .irq
            .request_irq(config.irq, IrqFlags::SHARED, config.name, handler)
        {
            Ok(cookie) => cookie,
            Err(e) => {
                warn!(
                    "{}.{}: IRQ {} request failed: {}",
                    device.name, device.id, config.irq, e
                );
                work.cancel_sync();
                debouncer.restore_enable_bit(before);
                resources.queue.release();
                return Err(e.into());
            }
        };

        debug!(
            "{}.{}: armed (handler #{}), enable before={:#010x}",
            device.name,
            device.id,
            cookie.as_u64(),
            before
        );

        Ok(Self {
            device,
            config,
            debouncer,
            work,
            irq: Arc::clone(&resources.irq),
            queue: Arc::clone(&resources.queue),
            cookie: Some(cookie),
        })
    }

    /// ディスアーム: 後段をキャンセルして完了を待ち、自ビットを無効化し、
    /// 最後に購読を解除する
    pub fn detach(mut self) {
        self.disarm();
    }

    fn disarm(&mut self) {
        let Some(cookie) = self.cookie.take() else {
            return;
        };

        // ISR がまだ飛んでいても、キャンセル後の schedule は何もしない
        let was_pending = self.work.cancel_sync();
        self.debouncer.disable();
        if let Err(e) = self.irq.free_irq(self.config.irq, cookie) {
            warn!(
                "{}.{}: free IRQ {} (handler #{}) failed: {}",
                self.device.name,
                self.device.id,
                self.config.irq,
                cookie.as_u64(),
                e
            );
        }
        self.queue.release();

        info!(
            "{}.{}: detached ({} cycles, {} cleared, pending dropped: {})",
            self.device.name,
            self.device.id,
            self.debouncer.cycles(),
            self.debouncer.cleared_count(),
            was_pending
        );
    }

    pub fn state(&self) -> ArmState {
        if self.cookie.is_some() {
            ArmState::Armed
        } else {
            ArmState::Unarmed
        }
    }

    pub fn device(&self) -> &PlatformDevice {
        &self.device
    }

    pub fn config(&self) -> &VgpioConfig {
        &self.config
    }

    pub fn debouncer(&self) -> &Arc<GpeDebouncer<R>> {
        &self.debouncer
    }

    pub fn work(&self) -> &Arc<Work> {
        &self.work
    }
}

impl<R: GpeRegisters + 'static> Drop for VgpioDevice<R> {
    fn drop(&mut self) {
        self.disarm();
    }
}
