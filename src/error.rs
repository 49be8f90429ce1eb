//! 統一エラーハンドリングモジュール
//!
//! ドライバ全体で使用されるエラー型を定義し、
//! 割り込み要求エラーからの変換を提供します。

use core::fmt;

/// ドライバ全体の統一エラー型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// 対象ハードウェアではない（エラーではなく「アタッチしない」結果）
    NotPresent,
    /// 割り込み要求関連エラー
    Irq(IrqError),
    /// メモリ不足
    OutOfMemory,
    /// ドライバまたはデバイスが既に登録済み
    AlreadyRegistered,
}

/// 割り込み要求関連エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    /// 無効なIRQライン
    InvalidLine,
    /// ラインが非共有ハンドラに占有されている
    Busy,
    /// 登録されていないハンドラの解放
    NotRegistered,
}

/// ドライバ用のResult型
pub type Result<T> = core::result::Result<T, DriverError>;

impl DriverError {
    /// Linux互換の負のerrno値
    pub fn errno(&self) -> i32 {
        match self {
            DriverError::NotPresent => -19,
            DriverError::Irq(e) => e.errno(),
            DriverError::OutOfMemory => -12,
            DriverError::AlreadyRegistered => -17,
        }
    }

    /// 「対象外」による中断か（エラー経路ではない）
    pub fn is_not_present(&self) -> bool {
        matches!(self, DriverError::NotPresent)
    }
}

impl IrqError {
    pub fn errno(&self) -> i32 {
        match self {
            IrqError::InvalidLine => -22,
            IrqError::Busy => -16,
            IrqError::NotRegistered => -2,
        }
    }
}

// ===== Display implementations =====

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::NotPresent => write!(f, "no matching hardware"),
            DriverError::Irq(e) => write!(f, "IRQ error: {}", e),
            DriverError::OutOfMemory => write!(f, "out of memory"),
            DriverError::AlreadyRegistered => write!(f, "already registered"),
        }
    }
}

impl fmt::Display for IrqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrqError::InvalidLine => write!(f, "invalid IRQ line"),
            IrqError::Busy => write!(f, "IRQ line busy"),
            IrqError::NotRegistered => write!(f, "handler not registered"),
        }
    }
}

// ===== From implementations for sub-errors =====

impl From<IrqError> for DriverError {
    fn from(e: IrqError) -> Self {
        DriverError::Irq(e)
    }
}

impl From<alloc::collections::TryReserveError> for DriverError {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        DriverError::OutOfMemory
    }
}
