// ============================================================================
// src/sync/mod.rs - 同期プリミティブ
// 割り込みハンドラと共有されるデータ用の割り込み安全なクリティカルセクション
// ============================================================================
//!
//! `spin::Mutex` はロック中でも割り込みを許可する。
//! 割り込みハンドラが同じロックを取るとデッドロックするため、
//! ISR と共有するロックは `without_interrupts` の内側で取得する。
//!
//! ホスト上のテストビルドでは `cli` が使えないため素通しになる。

/// 割り込みを禁止した状態で処理を実行
///
/// 元々割り込みが有効だった場合のみ終了時に再有効化する。
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[inline]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    x86_64::instructions::interrupts::without_interrupts(f)
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
#[inline]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

/// ブロッキング待機の1回分
///
/// ワーカーが完了するまでスピンする箇所で使う。どのビルドでも同じ純粋な
/// スピンで、相手の進行は別 CPU（ベアメタル）か OS のプリエンプション
/// （ホスト上のテスト）に任せる。
#[inline]
pub(crate) fn relax() {
    core::hint::spin_loop();
}
