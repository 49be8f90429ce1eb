// ============================================================================
// src/lib.rs - Cherry Trail virtual GPIO IRQ#9 workaround
// ============================================================================
//!
//! 一部の Cherry Trail 機種（Dell Wyse 3040, ASUS E200HA）では、
//! GPE0a の PME イベントが共有レガシー IRQ#9 に誤配線されている。
//! このクレートはそのラインを購読し、後段で GPE ステータスを
//! 安全に落とすドライバを提供する。
//!
//! ## 構成
//! - `io::dmi`: 起動時の機種判定
//! - `io::vgpio`: ISR と後段（応答サイクル）、アタッチ/デタッチ
//! - `io::irq`, `task`: 共有ライン表と後段ワーカーキュー
//! - `platform`: モジュール初期化/終了
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod io;
pub mod platform;
pub mod sync;
pub mod task;

pub use config::{CHT_VGPIO, VgpioConfig};
pub use error::{DriverError, IrqError, Result};
pub use io::{SystemIdentity, VgpioDevice, matches_target_hardware};
pub use platform::{ChtVgpioModule, PlatformBus, PlatformDevice, VgpioResources};
pub use task::{DeferredQueue, Work, WorkQueue};
