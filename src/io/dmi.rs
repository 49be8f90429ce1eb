// ============================================================================
// src/io/dmi.rs - DMI System Identity Gate
// ============================================================================
//!
//! 起動時に一度だけ評価される機種判定。
//! ベンダ名と製品名の完全一致のみ（ワイルドカード・部分一致なし）。

/// プラットフォームが提供するシステム識別情報
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemIdentity<'a> {
    /// DMI_SYS_VENDOR
    pub vendor: &'a str,
    /// DMI_PRODUCT_NAME
    pub product: &'a str,
}

impl<'a> SystemIdentity<'a> {
    pub const fn new(vendor: &'a str, product: &'a str) -> Self {
        Self { vendor, product }
    }
}

/// 許可リストの1エントリ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmiSystemId {
    /// 表示名
    pub ident: &'static str,
    pub vendor: &'static str,
    pub product: &'static str,
}

impl DmiSystemId {
    pub fn matches(&self, id: &SystemIdentity<'_>) -> bool {
        self.vendor == id.vendor && self.product == id.product
    }
}

/// IRQ#9 が誤配線されている機種
pub static CHT_VGPIO_DMI_TABLE: &[DmiSystemId] = &[
    DmiSystemId {
        ident: "Dell Wyse 3040",
        vendor: "Dell Inc.",
        product: "Wyse 3040",
    },
    DmiSystemId {
        ident: "ASUS E200HA",
        vendor: "ASUSTeK COMPUTER INC.",
        product: "E200HA",
    },
];

/// テーブルから一致するエントリを探す
pub fn check_system<'t>(
    table: &'t [DmiSystemId],
    id: &SystemIdentity<'_>,
) -> Option<&'t DmiSystemId> {
    table.iter().find(|entry| entry.matches(id))
}

/// 実行中のシステムがワークアラウンド対象か
pub fn matches_target_hardware(id: &SystemIdentity<'_>) -> bool {
    check_system(CHT_VGPIO_DMI_TABLE, id).is_some()
}
