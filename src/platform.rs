// ============================================================================
// src/platform.rs - Platform Device Lifecycle
// ============================================================================
//!
//! モジュール初期化: 機種判定 → ドライバ登録 → デバイス登録 → プローブ。
//! どこかで失敗したら、それまでに登録したものを逆順に外す。

use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, info};
use spin::Mutex;

use crate::config::VgpioConfig;
use crate::error::{DriverError, Result};
use crate::io::dmi::{self, SystemIdentity};
use crate::io::gpe::GpeRegisters;
use crate::io::irq::IrqController;
use crate::io::vgpio::VgpioDevice;
use crate::sync::without_interrupts;
use crate::task::WorkQueue;

/// プラットフォームデバイス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDevice {
    pub name: &'static str,
    pub id: i32,
}

impl PlatformDevice {
    pub const fn new(name: &'static str, id: i32) -> Self {
        Self { name, id }
    }
}

/// デバイスがアタッチ時に借りるプラットフォーム資源
#[derive(Clone)]
pub struct VgpioResources {
    /// 共有ラインの購読先
    pub irq: Arc<dyn IrqController>,
    /// 後段の実行先
    pub queue: Arc<dyn WorkQueue>,
}

/// 登録済みドライバ名とデバイスの一覧
pub struct PlatformBus {
    drivers: Mutex<Vec<&'static str>>,
    devices: Mutex<Vec<PlatformDevice>>,
}

impl PlatformBus {
    pub const fn new() -> Self {
        Self {
            drivers: Mutex::new(Vec::new()),
            devices: Mutex::new(Vec::new()),
        }
    }

    pub fn register_driver(&self, name: &'static str) -> Result<()> {
        without_interrupts(|| {
            let mut drivers = self.drivers.lock();
            if drivers.contains(&name) {
                return Err(DriverError::AlreadyRegistered);
            }
            drivers.try_reserve(1)?;
            drivers.push(name);
            Ok(())
        })
    }

    pub fn unregister_driver(&self, name: &'static str) {
        without_interrupts(|| self.drivers.lock().retain(|d| *d != name));
    }

    pub fn register_device(&self, device: PlatformDevice) -> Result<()> {
        without_interrupts(|| {
            let mut devices = self.devices.lock();
            if devices.contains(&device) {
                return Err(DriverError::AlreadyRegistered);
            }
            devices.try_reserve(1)?;
            devices.push(device);
            Ok(())
        })
    }

    pub fn unregister_device(&self, device: &PlatformDevice) {
        without_interrupts(|| self.devices.lock().retain(|d| d != device));
    }

    pub fn is_driver_registered(&self, name: &str) -> bool {
        without_interrupts(|| self.drivers.lock().iter().any(|d| *d == name))
    }

    pub fn device_count(&self) -> usize {
        without_interrupts(|| self.devices.lock().len())
    }
}

impl Default for PlatformBus {
    fn default() -> Self {
        Self::new()
    }
}

/// ロード済みモジュール（ドライバ + デバイス1個）
pub struct ChtVgpioModule<R: GpeRegisters + 'static> {
    bus: Arc<PlatformBus>,
    device: Option<VgpioDevice<R>>,
}

impl<R: GpeRegisters + 'static> ChtVgpioModule<R> {
    /// モジュール初期化
    ///
    /// 対象機種でなければ `DriverError::NotPresent`。
    /// この場合レジスタにも割り込みにも一切触れない。
    pub fn init(
        identity: &SystemIdentity<'_>,
        config: VgpioConfig,
        regs: R,
        bus: Arc<PlatformBus>,
        resources: &VgpioResources,
    ) -> Result<Self> {
        let Some(entry) = dmi::check_system(dmi::CHT_VGPIO_DMI_TABLE, identity) else {
            debug!(
                "{}: no match for {:?} / {:?}",
                config.name, identity.vendor, identity.product
            );
            return Err(DriverError::NotPresent);
        };
        info!("{}: matched {}", config.name, entry.ident);

        bus.register_driver(config.name)?;

        let device = PlatformDevice::new(config.name, 0);
        if let Err(e) = bus.register_device(device) {
            bus.unregister_driver(config.name);
            return Err(e);
        }

        match VgpioDevice::attach(device, config, regs, resources) {
            Ok(dev) => Ok(Self {
                bus,
                device: Some(dev),
            }),
            Err(e) => {
                bus.unregister_device(&device);
                bus.unregister_driver(config.name);
                Err(e)
            }
        }
    }

    pub fn device(&self) -> Option<&VgpioDevice<R>> {
        self.device.as_ref()
    }

    /// モジュール終了: デバイスを外し、ドライバ登録を解除する
    pub fn exit(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(dev) = self.device.take() else {
            return;
        };
        let device = *dev.device();
        let name = dev.config().name;

        dev.detach();
        self.bus.unregister_device(&device);
        self.bus.unregister_driver(name);
    }
}

impl<R: GpeRegisters + 'static> Drop for ChtVgpioModule<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// 実機の I/O ポートでモジュールを初期化する
///
/// # Safety
/// ring 0 で実行され、`config.layout` が実在する GPE0a ブロックを指すこと。
#[cfg(target_arch = "x86_64")]
pub unsafe fn init_with_ports(
    identity: &SystemIdentity<'_>,
    config: VgpioConfig,
    bus: Arc<PlatformBus>,
    resources: &VgpioResources,
) -> Result<ChtVgpioModule<crate::io::gpe::PortGpeBlock>> {
    // SAFETY: 呼び出し側の契約による
    let regs = unsafe { crate::io::gpe::PortGpeBlock::new(config.layout) };
    ChtVgpioModule::init(identity, config, regs, bus, resources)
}
