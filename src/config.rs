// ============================================================================
// src/config.rs - ドライバ静的設定
// ============================================================================
//!
//! Cherry Trail 系の一部機種では、PME イベントが GPE0a ブロック経由で
//! レガシー IRQ#9 に誤配線されている。このモジュールはその配線を
//! 記述する定数群をまとめる。

use crate::io::gpe::{GpeBits, GpeBlockLayout};

/// ドライバ名（IRQ要求名・プラットフォームデバイス名）
pub const DRIVER_NAME: &str = "cht-vgpio";

/// 共有レガシーIRQライン
pub const VGPIO_IRQ: u8 = 9;

/// GPE0a ステータスポート
pub const GPE0A_STS_PORT: u16 = 0x420;

/// GPE0a イネーブルポート
pub const GPE0A_EN_PORT: u16 = 0x428;

/// デバウンサ設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VgpioConfig {
    /// IRQ要求名
    pub name: &'static str,
    /// 共有IRQライン
    pub irq: u8,
    /// ステータスレジスタ上の所有ビット
    pub status_bit: GpeBits,
    /// イネーブルレジスタ上の所有ビット
    pub enable_bit: GpeBits,
    /// ステータス/イネーブルのポート配置
    pub layout: GpeBlockLayout,
}

impl VgpioConfig {
    /// 別のGPEブロック配置で同じ設定を使う（FADT由来の配置など）
    pub const fn with_layout(self, layout: GpeBlockLayout) -> Self {
        Self { layout, ..self }
    }
}

/// Cherry Trail 向け既定設定
pub const CHT_VGPIO: VgpioConfig = VgpioConfig {
    name: DRIVER_NAME,
    irq: VGPIO_IRQ,
    status_bit: GpeBits::PME,
    enable_bit: GpeBits::PME,
    layout: GpeBlockLayout {
        status_port: GPE0A_STS_PORT,
        enable_port: GPE0A_EN_PORT,
    },
};

/// 応答サイクルのログレベル
#[cfg(feature = "verbose_logging")]
pub(crate) const CYCLE_LOG_LEVEL: log::Level = log::Level::Debug;

#[cfg(not(feature = "verbose_logging"))]
pub(crate) const CYCLE_LOG_LEVEL: log::Level = log::Level::Trace;
