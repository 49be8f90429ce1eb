// ============================================================================
// src/task/work.rs - Deferred Work (割り込みの後半処理)
// ============================================================================
//!
//! # 二段パイプライン
//!
//! - 前段: ISR から `Work::schedule()` を呼ぶ。アトミック操作とキュー投入のみで
//!   ブロックもアロケーションもしない。
//! - 後段: ワーカーコンテキストが `WorkQueue` からアイテムを取り出して
//!   `Work::run()` を実行する。ここではブロックしてよい。
//!
//! ## 状態
//! - `pending`: 実行待ち。複数回の schedule は1回の実行にまとめられる
//! - `running`: 後段で本体を実行中のワーカー数。pending は本体に入る前に
//!   落ちるため、実行中に再予約されると別ワーカーが並行して本体に入りうる
//! - `disabled`: `cancel_sync()` 後。以降の schedule/run は何もしない
//!
//! `run()` は running を加算してから disabled/pending を見る。
//! `cancel_sync()` は disabled を立て pending を落としてから running が 0 になるのを待つ。
//! どちらも SeqCst なので、片方は必ずもう片方の書き込みを観測する。

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use log::warn;
use spin::Mutex;

use crate::error::Result;
use crate::sync::{relax, without_interrupts};

// ============================================================================
// Work Queue
// ============================================================================

/// 後段（ワーカー）への投入口
pub trait WorkQueue: Send + Sync {
    /// アイテム1個分のキュー領域を確保する（アタッチ時、ブロック可能な文脈）
    fn reserve(&self) -> Result<()>;

    /// `reserve()` で確保した領域を返す
    fn release(&self);

    /// アイテムを投入する。ISR から呼ばれるため、ブロックもアロケーションもしない
    fn enqueue(&self, work: Arc<Work>);
}

/// ポーリング型のワーカーキュー
///
/// ホストカーネルのスレッドコンテキストが `run_pending()` を回す。
pub struct DeferredQueue {
    queue: Mutex<Slots>,
}

/// キュー本体と確保済みスロット数（同じロックで守る）
struct Slots {
    items: VecDeque<Arc<Work>>,
    reserved: usize,
}

impl DeferredQueue {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(Slots {
                items: VecDeque::new(),
                reserved: 0,
            }),
        }
    }

    /// 実行待ちのアイテムをすべて実行し、本体を実行した回数を返す
    pub fn run_pending(&self) -> usize {
        let mut executed = 0;
        while let Some(work) = self.pop() {
            if work.run() {
                executed += 1;
            }
        }
        executed
    }

    /// キュー内のアイテム数
    pub fn len(&self) -> usize {
        without_interrupts(|| self.queue.lock().items.len())
    }

    /// 確保済みスロット数
    pub fn reserved(&self) -> usize {
        without_interrupts(|| self.queue.lock().reserved)
    }

    /// キューの現在の容量
    pub fn capacity(&self) -> usize {
        without_interrupts(|| self.queue.lock().items.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Option<Arc<Work>> {
        without_interrupts(|| self.queue.lock().items.pop_front())
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue for DeferredQueue {
    fn reserve(&self) -> Result<()> {
        without_interrupts(|| {
            let mut slots = self.queue.lock();
            let wanted = slots.reserved + 1;
            let additional = wanted.saturating_sub(slots.items.len());
            slots.items.try_reserve(additional)?;
            slots.reserved = wanted;
            Ok(())
        })
    }

    fn release(&self) {
        let released = without_interrupts(|| {
            let mut slots = self.queue.lock();
            match slots.reserved.checked_sub(1) {
                Some(n) => {
                    slots.reserved = n;
                    true
                }
                None => false,
            }
        });
        if !released {
            warn!("deferred queue: release without matching reserve");
        }
    }

    fn enqueue(&self, work: Arc<Work>) {
        without_interrupts(|| self.queue.lock().items.push_back(work));
    }
}

// ============================================================================
// Work Item
// ============================================================================

/// 後段で実行される作業単位
///
/// 本体は同時に1つしか pending にならないが、実行の排他は保証しない
/// （本体側でロックを取ること）。
pub struct Work {
    pending: AtomicBool,
    /// 本体を実行中のワーカー数
    running: AtomicUsize,
    disabled: AtomicBool,
    queue: Arc<dyn WorkQueue>,
    func: Box<dyn Fn() + Send + Sync>,
}

impl Work {
    /// 新しい Work を作成
    pub fn new<F>(queue: Arc<dyn WorkQueue>, func: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            pending: AtomicBool::new(false),
            running: AtomicUsize::new(0),
            disabled: AtomicBool::new(false),
            queue,
            func: Box::new(func),
        })
    }

    /// 実行を予約する（ISR から呼び出し可能）
    ///
    /// 新たにキューへ投入した場合のみ `true`。既に pending、
    /// またはキャンセル済みなら `false`。
    pub fn schedule(self: &Arc<Self>) -> bool {
        if self.disabled.load(Ordering::SeqCst) {
            return false;
        }
        if self.pending.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.queue.enqueue(Arc::clone(self));
        true
    }

    /// 本体を実行する（ワーカーコンテキストから呼ぶ）
    ///
    /// 実際に本体を実行したら `true`。
    pub fn run(&self) -> bool {
        self.running.fetch_add(1, Ordering::SeqCst);
        if self.disabled.load(Ordering::SeqCst) || !self.pending.swap(false, Ordering::SeqCst) {
            self.running.fetch_sub(1, Ordering::SeqCst);
            return false;
        }

        (self.func)();

        self.running.fetch_sub(1, Ordering::SeqCst);
        true
    }

    /// キャンセルし、実行中のすべての本体が終わるまで待つ
    ///
    /// 戻った後、本体が実行されることはない。
    /// 実行待ちの予約を取り消した場合は `true`。
    pub fn cancel_sync(&self) -> bool {
        self.disabled.store(true, Ordering::SeqCst);
        let was_pending = self.pending.swap(false, Ordering::SeqCst);

        while self.running.load(Ordering::SeqCst) != 0 {
            relax();
        }
        was_pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running_count() != 0
    }

    /// 本体を実行中のワーカー数
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Work")
            .field("pending", &self.is_pending())
            .field("running", &self.running_count())
            .field("disabled", &self.is_disabled())
            .finish()
    }
}
