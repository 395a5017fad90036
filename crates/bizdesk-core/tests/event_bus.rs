use bizdesk_core::event_bus::{
    BusNotification, DispatchMode, Event, EventBus, EventBusConfig, EventFilter, NewEvent,
    Priority, SubscribeOptions,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

/// Subscriber that appends the `n` field of each payload to a shared log
fn recorder(log: &Arc<Mutex<Vec<u64>>>) -> impl Fn(&Event) -> anyhow::Result<()> + Send + Sync {
    let log = log.clone();
    move |event| {
        let n = event.data()["n"].as_u64().unwrap_or(u64::MAX);
        log.lock().unwrap().push(n);
        Ok(())
    }
}

#[test]
fn test_higher_priority_delivered_first_within_drain() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe("order_created", recorder(&log)).unwrap();

    bus.pause();
    bus.publish(
        NewEvent::new("order_created")
            .data(json!({"n": 2}))
            .priority(Priority::Normal),
    )
    .unwrap();
    bus.publish(
        NewEvent::new("order_created")
            .data(json!({"n": 1}))
            .priority(Priority::High),
    )
    .unwrap();
    bus.resume();

    assert!(bus.flush(WAIT));
    assert_eq!(*log.lock().unwrap(), vec![1, 2]);
}

#[test]
fn test_mixed_priorities_drain_in_order() {
    let config = EventBusConfig {
        batch_size: 3,
        ..Default::default()
    };
    let bus = EventBus::with_config(config).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe_global(recorder(&log)).unwrap();

    bus.pause();
    let priorities = [
        Priority::Low,
        Priority::Critical,
        Priority::Normal,
        Priority::High,
        Priority::Low,
        Priority::Critical,
    ];
    for (n, priority) in priorities.iter().enumerate() {
        bus.publish(
            NewEvent::new("audit")
                .data(json!({ "n": n }))
                .priority(*priority),
        )
        .unwrap();
    }
    bus.resume();

    assert!(bus.flush(WAIT));
    assert_eq!(*log.lock().unwrap(), vec![1, 5, 3, 2, 0, 4]);
}

#[test]
fn test_equal_priority_is_fifo() {
    let bus = EventBus::new();
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe("payment_received", recorder(&first)).unwrap();
    bus.subscribe_global(recorder(&second)).unwrap();

    for n in 0..50u64 {
        bus.publish(NewEvent::new("payment_received").data(json!({ "n": n })))
            .unwrap();
    }

    assert!(bus.flush(WAIT));
    let expected: Vec<u64> = (0..50).collect();
    assert_eq!(*first.lock().unwrap(), expected);
    assert_eq!(*second.lock().unwrap(), expected);
}

#[test]
fn test_equal_priority_is_fifo_for_async_subscribers() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();

    bus.subscribe_with(
        "ledger_entry",
        SubscribeOptions::new().asynchronous(),
        move |event| {
            let n = event.data()["n"].as_u64().unwrap_or(u64::MAX);
            if n % 7 == 0 {
                std::thread::sleep(Duration::from_millis(2));
            }
            log_clone.lock().unwrap().push(n);
            Ok(())
        },
    )
    .unwrap();

    for n in 0..200u64 {
        bus.publish(NewEvent::new("ledger_entry").data(json!({ "n": n })))
            .unwrap();
    }

    assert!(bus.flush(WAIT));
    assert_eq!(*log.lock().unwrap(), (0..200).collect::<Vec<u64>>());
}

#[test]
fn test_unsubscribe_before_drain_prevents_delivery() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();

    bus.pause();
    let id = bus
        .subscribe("supplier_updated", move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    bus.publish(NewEvent::new("supplier_updated")).unwrap();
    assert!(bus.unsubscribe(id));
    bus.resume();

    assert!(bus.flush(WAIT));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failing_subscriber_does_not_block_others() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();

    bus.subscribe("contract_signed", |_| anyhow::bail!("always fails"))
        .unwrap();
    bus.subscribe("contract_signed", move |_| {
        count_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    bus.publish(NewEvent::new("contract_signed")).unwrap();
    assert!(bus.flush(WAIT));

    assert_eq!(count.load(Ordering::SeqCst), 1);
    let stats = bus.get_processing_stats()["contract_signed"];
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.count, 1);
}

#[test]
fn test_panicking_subscriber_is_contained() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();

    bus.subscribe("contract_signed", |_| panic!("subscriber bug"))
        .unwrap();
    bus.subscribe("contract_signed", move |_| {
        count_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    // Twice, so the dispatch thread must have survived the first panic
    bus.publish(NewEvent::new("contract_signed")).unwrap();
    bus.publish(NewEvent::new("contract_signed")).unwrap();
    assert!(bus.flush(WAIT));

    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(bus.get_processing_stats()["contract_signed"].errors, 2);
}

#[test]
fn test_async_subscriber_failures_are_counted() {
    let bus = EventBus::new();
    let mut notifications = bus.notifications();

    bus.subscribe_with(
        "report_generated",
        SubscribeOptions::new().asynchronous(),
        |_| anyhow::bail!("disk full"),
    )
    .unwrap();

    bus.publish(NewEvent::new("report_generated")).unwrap();
    assert!(bus.flush(WAIT));

    let stats = bus.get_processing_stats()["report_generated"];
    assert_eq!(stats.count, 1);
    assert_eq!(stats.errors, 1);

    let mut saw_error = false;
    while let Ok(notification) = notifications.try_recv() {
        if let BusNotification::EventError { message, .. } = notification {
            assert!(message.contains("disk full"));
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[test]
fn test_history_is_bounded() {
    let capacity = 8;
    let config = EventBusConfig {
        history_capacity: capacity,
        ..Default::default()
    };
    let bus = EventBus::with_config(config).unwrap();

    let mut ids = Vec::new();
    for n in 0..=capacity {
        ids.push(
            bus.publish(NewEvent::new("customer_created").data(json!({ "n": n })))
                .unwrap(),
        );
    }

    let history = bus.get_event_history(None, None);
    assert_eq!(history.len(), capacity);
    assert!(history.iter().all(|e| e.id() != &ids[0]));
    assert_eq!(history[0].id(), &ids[capacity]);
}

#[test]
fn test_history_filter_and_limit() {
    let bus = EventBus::new();
    for n in 0..5 {
        bus.publish(NewEvent::new("a").data(json!({ "n": n }))).unwrap();
        bus.publish(NewEvent::new("b").data(json!({ "n": n }))).unwrap();
    }

    let recent_a = bus.get_event_history(Some("a"), Some(3));
    let ns: Vec<_> = recent_a.iter().map(|e| e.data()["n"].clone()).collect();
    assert_eq!(ns, vec![json!(4), json!(3), json!(2)]);
    assert!(recent_a.iter().all(|e| e.event_type() == "a"));
}

#[test]
fn test_sync_publish_returns_after_subscribers_ran() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();

    bus.subscribe("invoice_issued", move |event| {
        std::thread::sleep(Duration::from_millis(20));
        seen_clone
            .lock()
            .unwrap()
            .push(event.id().to_string());
        Ok(())
    })
    .unwrap();

    let id = bus
        .publish_sync(NewEvent::new("invoice_issued"))
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![id.to_string()]);
}

#[test]
fn test_sync_publish_runs_on_caller_thread() {
    let bus = EventBus::new();
    let caller = std::thread::current().id();
    let ran_on = Arc::new(Mutex::new(None));
    let ran_on_clone = ran_on.clone();

    bus.subscribe("x", move |_| {
        *ran_on_clone.lock().unwrap() = Some(std::thread::current().id());
        Ok(())
    })
    .unwrap();

    bus.publish(NewEvent::new("x").sync(true)).unwrap();
    assert_eq!(*ran_on.lock().unwrap(), Some(caller));
}

#[test]
fn test_global_and_typed_subscribers() {
    let bus = EventBus::new();
    let global = Arc::new(Mutex::new(Vec::new()));
    let typed = Arc::new(Mutex::new(Vec::new()));

    let global_clone = global.clone();
    bus.subscribe_global(move |event| {
        global_clone
            .lock()
            .unwrap()
            .push(event.event_type().to_string());
        Ok(())
    })
    .unwrap();

    let typed_clone = typed.clone();
    bus.subscribe("customer_created", move |event| {
        typed_clone
            .lock()
            .unwrap()
            .push(event.event_type().to_string());
        Ok(())
    })
    .unwrap();

    for event_type in ["customer_created", "order_created", "invoice_paid"] {
        bus.publish_sync(NewEvent::new(event_type)).unwrap();
    }

    assert_eq!(
        *global.lock().unwrap(),
        vec!["customer_created", "order_created", "invoice_paid"]
    );
    assert_eq!(*typed.lock().unwrap(), vec!["customer_created"]);
}

#[test]
fn test_stats_count_and_errors() {
    let bus = EventBus::new();
    let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fail_clone = fail.clone();

    bus.subscribe("finance_sync", move |_| {
        if fail_clone.load(Ordering::SeqCst) {
            anyhow::bail!("ledger unavailable");
        }
        Ok(())
    })
    .unwrap();

    for _ in 0..3 {
        bus.publish_sync(NewEvent::new("finance_sync")).unwrap();
    }
    fail.store(true, Ordering::SeqCst);
    for _ in 0..2 {
        bus.publish_sync(NewEvent::new("finance_sync")).unwrap();
    }

    let stats = bus.get_processing_stats()["finance_sync"];
    assert_eq!(stats.count, 5);
    assert_eq!(stats.errors, 2);
    assert!(stats.avg_time() <= stats.total_time);

    bus.reset_stats();
    assert!(bus.get_processing_stats().is_empty());
}

#[test]
fn test_order_created_scenario() {
    let bus = EventBus::new();
    let log_payloads = Arc::new(Mutex::new(Vec::new()));
    let audit_count = Arc::new(AtomicUsize::new(0));

    let log_clone = log_payloads.clone();
    bus.subscribe("order_created", move |event| {
        log_clone.lock().unwrap().push(event.data().clone());
        Ok(())
    })
    .unwrap();

    let audit_clone = audit_count.clone();
    bus.subscribe_global(move |_| {
        audit_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    bus.publish(
        NewEvent::new("order_created")
            .data(json!({"id": 1}))
            .priority(Priority::High)
            .sync(true),
    )
    .unwrap();

    assert_eq!(*log_payloads.lock().unwrap(), vec![json!({"id": 1})]);
    assert_eq!(audit_count.load(Ordering::SeqCst), 1);
    assert_eq!(bus.get_event_history(Some("order_created"), None).len(), 1);
    assert_eq!(bus.get_processing_stats()["order_created"].count, 1);
}

#[test]
fn test_target_routing_uses_owner() {
    let bus = EventBus::new();
    let crm = Arc::new(AtomicUsize::new(0));
    let finance = Arc::new(AtomicUsize::new(0));

    let crm_clone = crm.clone();
    bus.subscribe_with(
        "record_changed",
        SubscribeOptions::new().owner("crm"),
        move |_| {
            crm_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )
    .unwrap();

    let finance_clone = finance.clone();
    bus.subscribe_with(
        "record_changed",
        SubscribeOptions::new().owner("finance"),
        move |_| {
            finance_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )
    .unwrap();

    bus.publish_sync(NewEvent::new("record_changed").target("crm"))
        .unwrap();
    bus.publish_sync(NewEvent::new("record_changed")).unwrap();

    assert_eq!(crm.load(Ordering::SeqCst), 2);
    assert_eq!(finance.load(Ordering::SeqCst), 1);
}

#[test]
fn test_registry_changes_during_dispatch_affect_later_events_only() {
    let bus = Arc::new(EventBus::new());
    let late = Arc::new(AtomicUsize::new(0));
    let victim = Arc::new(AtomicUsize::new(0));

    let victim_clone = victim.clone();
    let victim_id = Arc::new(Mutex::new(None));

    // Registered first, so it runs before the victim for the same event
    let bus_weak = Arc::downgrade(&bus);
    let late_clone = late.clone();
    let victim_id_clone = victim_id.clone();
    bus.subscribe("a", move |_| {
        let Some(bus) = bus_weak.upgrade() else {
            return Ok(());
        };
        if let Some(id) = victim_id_clone.lock().unwrap().take() {
            bus.unsubscribe(id);
            let late_clone = late_clone.clone();
            bus.subscribe("a", move |_| {
                late_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })?;
        }
        Ok(())
    })
    .unwrap();

    let id = bus
        .subscribe("a", move |_| {
            victim_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    *victim_id.lock().unwrap() = Some(id);

    bus.publish_sync(NewEvent::new("a")).unwrap();
    // Snapshot taken before the first callback: victim still sees this event,
    // the late subscriber does not
    assert_eq!(victim.load(Ordering::SeqCst), 1);
    assert_eq!(late.load(Ordering::SeqCst), 0);

    bus.publish_sync(NewEvent::new("a")).unwrap();
    assert_eq!(victim.load(Ordering::SeqCst), 1);
    assert_eq!(late.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsubscribe_all() {
    let bus = EventBus::new();
    for _ in 0..3 {
        bus.subscribe("a", |_| Ok(())).unwrap();
    }
    bus.subscribe("b", |_| Ok(())).unwrap();
    bus.subscribe_global(|_| Ok(())).unwrap();

    assert_eq!(bus.subscriber_count_for("a"), 3);
    assert_eq!(bus.unsubscribe_all(Some("a")), 3);
    assert_eq!(bus.subscriber_count(), 2);
    assert_eq!(bus.unsubscribe_all(None), 2);
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn test_async_mode_does_not_block_publisher() {
    let bus = EventBus::new();
    let (tx, rx) = std::sync::mpsc::channel();
    let release = Arc::new(std::sync::Barrier::new(2));
    let release_clone = release.clone();

    bus.subscribe_with(
        "slow_export",
        SubscribeOptions::new().mode(DispatchMode::Async),
        move |_| {
            release_clone.wait();
            let _ = tx.send(());
            Ok(())
        },
    )
    .unwrap();

    // Returns while the async callback is still blocked on the barrier
    bus.publish_sync(NewEvent::new("slow_export")).unwrap();
    assert!(rx.try_recv().is_err());

    release.wait();
    rx.recv_timeout(WAIT).unwrap();
    assert!(bus.flush(WAIT));
}

/// Subscriber that drops the last handle to its own bus on the first
/// event and reports how long that took
fn drop_bus_in_callback(options: SubscribeOptions) -> Duration {
    let bus = Arc::new(EventBus::new());
    let slot: Arc<Mutex<Option<Arc<EventBus>>>> = Arc::new(Mutex::new(None));
    let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
    let go_rx = Mutex::new(go_rx);
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let done_tx = Mutex::new(done_tx);

    let slot_clone = slot.clone();
    bus.subscribe_with("teardown", options, move |_| {
        let _ = go_rx.lock().unwrap().recv_timeout(WAIT);
        let started = std::time::Instant::now();
        drop(slot_clone.lock().unwrap().take());
        let _ = done_tx.lock().unwrap().send(started.elapsed());
        Ok(())
    })
    .unwrap();

    bus.publish(NewEvent::new("teardown")).unwrap();
    // Hand over the only handle, then let the callback drop it
    *slot.lock().unwrap() = Some(bus);
    go_tx.send(()).unwrap();

    done_rx.recv_timeout(WAIT).unwrap()
}

#[test]
fn test_dropping_bus_on_dispatch_thread_returns_promptly() {
    let elapsed = drop_bus_in_callback(SubscribeOptions::new());
    assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
}

#[test]
fn test_dropping_bus_on_worker_thread_returns_promptly() {
    let elapsed = drop_bus_in_callback(SubscribeOptions::new().asynchronous());
    assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
}

#[test]
fn test_shutdown_from_callback_still_drains_queue() {
    let bus = Arc::new(EventBus::new());
    let count = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let done_tx = Mutex::new(done_tx);

    let bus_weak = Arc::downgrade(&bus);
    bus.subscribe("close_books", move |_| {
        if let Some(bus) = bus_weak.upgrade() {
            bus.shutdown();
        }
        Ok(())
    })
    .unwrap();

    let count_clone = count.clone();
    bus.subscribe("late_entry", move |_| {
        if count_clone.fetch_add(1, Ordering::SeqCst) == 2 {
            let _ = done_tx.lock().unwrap().send(());
        }
        Ok(())
    })
    .unwrap();

    bus.pause();
    bus.publish(NewEvent::new("close_books").priority(Priority::High))
        .unwrap();
    for _ in 0..3 {
        bus.publish(NewEvent::new("late_entry")).unwrap();
    }
    bus.resume();

    // Queued before shutdown, so still delivered
    done_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert!(bus.is_closed());
    assert!(bus.publish(NewEvent::new("late_entry")).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_type_filter_rejects_other_types(event_type in "[a-z_]{1,16}") {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        bus.subscribe_global_with(
            SubscribeOptions::new().filter(EventFilter::types(["A"])),
            move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .unwrap();

        bus.publish_sync(NewEvent::new(event_type.as_str())).unwrap();
        bus.publish(NewEvent::new(event_type)).unwrap();
        prop_assert!(bus.flush(WAIT));
        prop_assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
