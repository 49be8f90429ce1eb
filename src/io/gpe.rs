// ============================================================================
// src/io/gpe.rs - ACPI General Purpose Event レジスタ
// ============================================================================
//!
//! # GPE ステータス/イネーブル レジスタ対
//!
//! GPE ブロックは前半がステータス（W1C）、後半がイネーブル（R/W）。
//! どちらも同じブロックを共有する複数のイベントソースで共用されるため、
//! 書き込みは常に自分のビットだけに限定しなければならない。

use bitflags::bitflags;

bitflags! {
    /// GPE0a のイベントビット
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GpeBits: u32 {
        /// Power Management Event (bit 13)
        const PME = 1 << 13;
    }
}

/// GPE ブロックのポート配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpeBlockLayout {
    /// ステータスレジスタ (W1C)
    pub status_port: u16,
    /// イネーブルレジスタ
    pub enable_port: u16,
}

impl GpeBlockLayout {
    /// FADT の GPE0_BLK / GPE0_BLK_LEN から配置を求める
    ///
    /// ステータス半分がブロック先頭、イネーブル半分が `base + len / 2`。
    /// ブロックが存在しない、長さが奇数、I/O 空間外のいずれかなら `None`。
    pub fn from_fadt(gpe0_block: u32, gpe0_block_length: u8) -> Option<Self> {
        if gpe0_block == 0 || gpe0_block_length == 0 || gpe0_block_length % 2 != 0 {
            return None;
        }
        let end = gpe0_block.checked_add(gpe0_block_length as u32)?;
        if end > u16::MAX as u32 + 1 {
            return None;
        }

        let status_port = gpe0_block as u16;
        Some(Self {
            status_port,
            enable_port: status_port + (gpe0_block_length / 2) as u16,
        })
    }
}

/// GPE レジスタ対へのアクセス
///
/// 実機では I/O ポート、テストでは計測用スタブを使う。
/// アクセスは失敗しない（バスフォルトは扱わない）。
pub trait GpeRegisters: Send {
    fn read_status(&mut self) -> u32;
    /// W1C: 1 を書いたビットだけがクリアされる
    fn write_status(&mut self, value: u32);
    fn read_enable(&mut self) -> u32;
    fn write_enable(&mut self, value: u32);
}

/// x86 I/O ポート上の GPE ブロック
#[cfg(target_arch = "x86_64")]
pub struct PortGpeBlock {
    status: x86_64::instructions::port::Port<u32>,
    enable: x86_64::instructions::port::Port<u32>,
}

#[cfg(target_arch = "x86_64")]
impl PortGpeBlock {
    /// # Safety
    /// `layout` のポートが実在する GPE ブロックを指し、
    /// ring 0 で実行されていること。
    pub const unsafe fn new(layout: GpeBlockLayout) -> Self {
        use x86_64::instructions::port::Port;

        Self {
            status: Port::new(layout.status_port),
            enable: Port::new(layout.enable_port),
        }
    }
}

#[cfg(target_arch = "x86_64")]
impl GpeRegisters for PortGpeBlock {
    fn read_status(&mut self) -> u32 {
        // SAFETY: new() の契約によりポートは有効
        unsafe { self.status.read() }
    }

    fn write_status(&mut self, value: u32) {
        // SAFETY: 同上
        unsafe { self.status.write(value) }
    }

    fn read_enable(&mut self) -> u32 {
        // SAFETY: 同上
        unsafe { self.enable.read() }
    }

    fn write_enable(&mut self, value: u32) {
        // SAFETY: 同上
        unsafe { self.enable.write(value) }
    }
}
