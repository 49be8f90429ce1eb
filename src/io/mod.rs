// ============================================================================
// I/O Subsystem Module
// 機種判定・GPE レジスタ・共有 IRQ ライン・デバウンサ本体
// ============================================================================
pub mod dmi;
pub mod gpe;
pub mod irq;
pub mod vgpio;

pub use dmi::{DmiSystemId, SystemIdentity, matches_target_hardware};
pub use gpe::{GpeBits, GpeBlockLayout, GpeRegisters};
#[cfg(target_arch = "x86_64")]
pub use gpe::PortGpeBlock;
pub use irq::{IrqController, IrqCookie, IrqFlags, IrqHandler, IrqReturn, SharedIrqTable};
pub use vgpio::{AckCycle, ArmState, GpeDebouncer, VgpioDevice};
