// ============================================================================
// tests/debouncer.rs - 共有 GPE デバウンサの統合テスト
// ============================================================================
mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use cht_vgpio::io::{ArmState, GpeDebouncer, IrqController, IrqFlags, IrqReturn, SharedIrqTable};
use cht_vgpio::{
    CHT_VGPIO, DeferredQueue, DriverError, IrqError, PlatformDevice, VgpioDevice, VgpioResources,
};
use common::{Access, CO_OWNER, PME, RecordingGpe, cycles_are_unsplit};

fn debouncer(block: &RecordingGpe) -> GpeDebouncer<RecordingGpe> {
    GpeDebouncer::from_config(block.clone(), &CHT_VGPIO)
}

fn platform() -> (VgpioResources, Arc<SharedIrqTable>, Arc<DeferredQueue>) {
    let table = Arc::new(SharedIrqTable::new());
    let queue = Arc::new(DeferredQueue::new());
    let resources = VgpioResources {
        irq: table.clone(),
        queue: queue.clone(),
    };
    (resources, table, queue)
}

fn attach(
    block: &RecordingGpe,
    resources: &VgpioResources,
) -> cht_vgpio::Result<VgpioDevice<RecordingGpe>> {
    VgpioDevice::attach(
        PlatformDevice::new("cht-vgpio", 0),
        CHT_VGPIO,
        block.clone(),
        resources,
    )
}

/// run_pending を回し続けるワーカースレッド
fn spawn_worker(queue: Arc<DeferredQueue>, stop: Arc<AtomicBool>) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut executed = 0;
        while !stop.load(Ordering::SeqCst) {
            executed += queue.run_pending();
            thread::yield_now();
        }
        executed + queue.run_pending()
    })
}

#[test]
fn enable_state_is_preserved_across_cycles() {
    for initial_enable in [0, PME, CO_OWNER, PME | CO_OWNER] {
        let block = RecordingGpe::new(0, initial_enable);
        let d = debouncer(&block);

        for round in 0..16u32 {
            if round % 3 != 0 {
                block.assert_status(PME);
            }
            if round % 5 == 0 {
                block.assert_status(CO_OWNER);
            }
            d.acknowledge();
            assert_eq!(block.enable(), initial_enable);
        }
    }
}

#[test]
fn owned_status_is_cleared_and_co_owner_status_kept() {
    let block = RecordingGpe::new(PME | CO_OWNER, PME | CO_OWNER);
    let d = debouncer(&block);

    let cycle = d.acknowledge();
    assert!(cycle.cleared);
    assert_eq!(block.status(), CO_OWNER);

    // ステータスへの書き込みは自ビットのみ
    for (_, access) in block.log() {
        if let Access::WriteStatus(v) = access {
            assert_eq!(v, PME);
        }
    }
}

#[test]
fn owned_status_is_cleared_even_when_source_disabled() {
    let block = RecordingGpe::new(PME, 0);
    let d = debouncer(&block);
    d.acknowledge();
    assert_eq!(block.status(), 0);
    assert_eq!(block.enable(), 0);
}

#[test]
fn idle_cycle_writes_nothing() {
    for (status, enable) in [(0, 0), (CO_OWNER, CO_OWNER), (0, CO_OWNER)] {
        let block = RecordingGpe::new(status, enable);
        let d = debouncer(&block);

        let cycle = d.acknowledge();
        assert!(cycle.is_noop());
        assert_eq!(block.write_count(), 0);
        assert_eq!(block.access_count(), 2);
    }
}

#[test]
fn concurrent_cycles_never_interleave() {
    let block = RecordingGpe::new(PME, PME | CO_OWNER);
    let d = Arc::new(debouncer(&block));
    let stop = Arc::new(AtomicBool::new(false));

    let hw = {
        let block = block.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                block.assert_status(PME);
                thread::yield_now();
            }
        })
    };

    let ackers: Vec<_> = (0..4)
        .map(|_| {
            let d = d.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    d.acknowledge();
                }
            })
        })
        .collect();
    for t in ackers {
        t.join().unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    hw.join().unwrap();

    assert_eq!(d.cycles(), 400);
    assert!(cycles_are_unsplit(&block.log()));
    assert_eq!(block.enable(), PME | CO_OWNER);
}

#[test]
fn overlapping_workers_are_serialized_by_register_lock() {
    let (resources, table, queue) = platform();
    let block = RecordingGpe::new(0, 0);
    let dev = attach(&block, &resources).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..2)
        .map(|_| spawn_worker(queue.clone(), stop.clone()))
        .collect();

    for _ in 0..300 {
        block.assert_status(PME);
        assert_eq!(table.dispatch(9), IrqReturn::Handled);
        thread::yield_now();
    }

    // 残りの予約が捌けるまで待つ
    while dev.work().is_pending() || dev.work().is_running() {
        thread::yield_now();
    }
    stop.store(true, Ordering::SeqCst);
    for w in workers {
        w.join().unwrap();
    }

    assert!(dev.debouncer().cycles() >= 1);
    assert!(cycles_are_unsplit(&block.log()));
    assert_eq!(block.enable(), PME);
    dev.detach();
}

#[test]
fn failed_subscription_restores_enable_register() {
    for initial_enable in [0, CO_OWNER, PME | CO_OWNER] {
        let (resources, table, _queue) = platform();
        table
            .request_irq(9, IrqFlags::empty(), "rtc0", Arc::new(|_irq: u8| IrqReturn::None))
            .unwrap();
        let block = RecordingGpe::new(0, initial_enable);

        let err = attach(&block, &resources).err().unwrap();
        assert_eq!(err, DriverError::Irq(IrqError::Busy));
        assert_eq!(block.enable(), initial_enable);
        assert_eq!(table.handler_names(9), ["rtc0"]);
    }
}

#[test]
fn detach_waits_for_in_flight_cycle() {
    let (resources, table, queue) = platform();
    let block = RecordingGpe::new(0, CO_OWNER);
    let dev = attach(&block, &resources).unwrap();
    assert_eq!(dev.state(), ArmState::Armed);

    let stop = Arc::new(AtomicBool::new(false));
    let worker = spawn_worker(queue.clone(), stop.clone());

    block.set_slow(true);
    block.assert_status(PME);
    table.dispatch(9);
    while !dev.work().is_running() {
        thread::yield_now();
    }

    let work = dev.work().clone();
    dev.detach();
    assert!(!work.is_running());
    block.set_slow(false);

    // サイクルは完了しており、その後にデタッチの無効化が続く
    let log: Vec<Access> = block.log().into_iter().map(|(_, a)| a).collect();
    let tail = &log[log.len() - 7..];
    assert_eq!(
        tail,
        [
            Access::ReadStatus,
            Access::ReadEnable,
            Access::WriteEnable(CO_OWNER),
            Access::WriteStatus(PME),
            Access::WriteEnable(PME | CO_OWNER),
            Access::ReadEnable,
            Access::WriteEnable(CO_OWNER),
        ]
    );
    assert_eq!(block.status(), 0);
    assert_eq!(block.enable(), CO_OWNER);

    // デタッチ後はレジスタに一切触れない
    let frozen = block.access_count();
    block.assert_status(PME);
    assert_eq!(table.dispatch(9), IrqReturn::None);
    assert!(!work.schedule());
    thread::sleep(Duration::from_millis(20));
    stop.store(true, Ordering::SeqCst);
    worker.join().unwrap();
    assert_eq!(block.access_count(), frozen);
}

#[test]
fn detach_waits_for_every_overlapping_run() {
    let (resources, table, queue) = platform();
    let block = RecordingGpe::new(0, 0);
    let dev = attach(&block, &resources).unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let workers: Vec<_> = (0..2)
        .map(|_| spawn_worker(queue.clone(), stop.clone()))
        .collect();

    // 1本目の実行中に再予約し、2本目をもう一方のワーカーで走らせる
    block.set_slow(true);
    block.assert_status(PME);
    table.dispatch(9);
    while !dev.work().is_running() {
        thread::yield_now();
    }
    table.dispatch(9);
    while dev.work().running_count() < 2 {
        thread::yield_now();
    }

    let work = dev.work().clone();
    dev.detach();
    assert_eq!(work.running_count(), 0);
    let frozen = block.access_count();
    assert_eq!(
        block.log().last(),
        Some(&(thread::current().id(), Access::WriteEnable(0)))
    );

    block.set_slow(false);
    stop.store(true, Ordering::SeqCst);
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(block.access_count(), frozen);
    assert_eq!(block.enable() & PME, 0);
    assert_eq!(block.status(), 0);
}

#[test]
fn detach_right_after_schedule_leaves_no_late_access() {
    for _ in 0..50 {
        let (resources, table, queue) = platform();
        let block = RecordingGpe::new(0, 0);
        let dev = attach(&block, &resources).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = spawn_worker(queue.clone(), stop.clone());

        block.assert_status(PME);
        table.dispatch(9);
        dev.detach();
        let frozen = block.access_count();

        stop.store(true, Ordering::SeqCst);
        worker.join().unwrap();
        assert_eq!(block.access_count(), frozen);
        assert_eq!(block.enable(), 0);
        assert_eq!(block.log().last(), Some(&(thread::current().id(), Access::WriteEnable(0))));
    }
}

#[test]
fn co_owner_on_shared_line_still_runs() {
    let (resources, table, queue) = platform();
    let hits = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let h = hits.clone();
    table
        .request_irq(
            9,
            IrqFlags::SHARED,
            "acpi",
            Arc::new(move |_irq: u8| {
                h.fetch_add(1, Ordering::SeqCst);
                IrqReturn::None
            }),
        )
        .unwrap();

    let block = RecordingGpe::new(PME, 0);
    let dev = attach(&block, &resources).unwrap();
    assert_eq!(table.dispatch(9), IrqReturn::Handled);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(queue.run_pending(), 1);
    assert_eq!(block.status(), 0);

    dev.detach();
    assert_eq!(table.handler_names(9), ["acpi"]);
}
