use crate::{
    BatchContext, CompletionEntry, CompletionRegistry, DebugStats, ObjectPool, RequestCallContext,
    Tag,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::scope;

fn assert_send<T: Send>() {}
fn assert_sync<T: Sync>() {}

fn registry() -> (CompletionRegistry, Arc<DebugStats>) {
    let stats = Arc::new(DebugStats::new());
    (CompletionRegistry::new(Arc::clone(&stats)), stats)
}

#[test]
fn extract_returns_registered_entry() {
    let (registry, stats) = registry();
    let ctx = BatchContext::new();
    let expected = ctx.tag();

    let tag = registry.register_batch_completion(ctx, |_, _, ()| {}, ());
    assert_eq!(tag, expected);
    assert_eq!(registry.len(), 1);
    assert_eq!(stats.pending_batch_completions(), 1);

    let entry = registry.extract(tag);
    assert_eq!(entry.tag(), tag);
    assert!(registry.is_empty());
    assert_eq!(stats.pending_batch_completions(), 0);
    assert!(registry.try_extract(tag).is_none());
}

#[test]
fn callback_receives_success_and_state() {
    let (registry, _stats) = registry();
    let seen = Arc::new(AtomicUsize::new(0));

    let tag = registry.register_batch_completion(
        BatchContext::new(),
        |success, ctx, (seen, bonus): (Arc<AtomicUsize>, usize)| {
            assert!(!success);
            ctx.set_received_message(Some(vec![7]));
            seen.fetch_add(bonus, Ordering::SeqCst);
        },
        (Arc::clone(&seen), 42),
    );

    registry.extract(tag).invoke(false);
    assert_eq!(seen.load(Ordering::SeqCst), 42);
}

#[test]
fn invoke_recycles_pooled_context() {
    let (registry, _stats) = registry();
    let pool = Arc::new(ObjectPool::for_batch_contexts(8, 4));
    let ctx = pool.lease_context();

    let tag = registry.register_batch_completion(
        ctx,
        |_, ctx, ()| ctx.send_message_mut().extend_from_slice(b"payload"),
        (),
    );
    registry.extract(tag).invoke(true);

    assert_eq!(pool.local_len(), 1);
    let reused = pool.lease();
    assert_eq!(reused.tag(), tag);
    assert!(reused.send_message().is_empty());
}

#[test]
fn panicking_callback_is_contained() {
    let (registry, _stats) = registry();
    let pool = Arc::new(ObjectPool::for_batch_contexts(8, 4));

    let tag = registry.register_batch_completion(
        pool.lease_context(),
        |_, _, ()| panic!("callback failure"),
        (),
    );
    registry.extract(tag).invoke(true);

    // The context still went back to its pool.
    assert_eq!(pool.local_len(), 1);
}

#[test]
fn request_call_completion_sees_call_details() {
    let (registry, _stats) = registry();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    let tag = registry.register_request_call_completion(RequestCallContext::new(), move |success, ctx| {
        *sink.lock().unwrap() = Some((success, ctx.method().to_owned()));
    });

    let CompletionEntry::RequestCall { mut ctx, callback } = registry.extract(tag) else {
        panic!("expected a request call entry");
    };
    // The engine fills in the incoming call before the completion is delivered.
    ctx.set_call_details("/echo.Echo/Say", "localhost", None);
    CompletionEntry::RequestCall { ctx, callback }.invoke(true);

    assert_eq!(*seen.lock().unwrap(), Some((true, String::from("/echo.Echo/Say"))));
    assert!(registry.is_empty());
}

#[test]
#[should_panic(expected = "registered twice")]
fn registering_a_tag_twice_panics() {
    let (registry, _stats) = registry();
    let tag = Tag::from_raw(0x1000).unwrap();
    registry.register_under(tag, CompletionEntry::batch(BatchContext::new(), |_, _, ()| {}, ()));
    registry.register_under(tag, CompletionEntry::batch(BatchContext::new(), |_, _, ()| {}, ()));
}

#[test]
fn register_keys_entry_by_its_context_tag() {
    let (registry, stats) = registry();
    let ctx = BatchContext::new();
    let expected = ctx.tag();

    let tag = registry.register(CompletionEntry::batch(ctx, |_, _, ()| {}, ()));
    assert_eq!(tag, expected);
    assert_eq!(stats.pending_batch_completions(), 1);
    assert_eq!(registry.extract(tag).tag(), expected);
    assert!(registry.is_empty());
}

#[test]
fn registry_is_shareable_across_threads() {
    assert_send::<CompletionEntry>();
    assert_sync::<CompletionRegistry>();
    assert_send::<Arc<CompletionRegistry>>();
}

#[test]
fn callback_state_needs_only_send() {
    let (registry, _stats) = registry();
    // A receiver is `Send` but not `Sync`.
    let (tx, rx) = mpsc::channel::<u32>();

    scope(|s| {
        let tag = registry.register_batch_completion(
            BatchContext::new(),
            |_, _, rx: mpsc::Receiver<u32>| assert_eq!(rx.recv().unwrap(), 9),
            rx,
        );
        tx.send(9).unwrap();
        let registry = &registry;
        s.spawn(move || registry.extract(tag).invoke(true));
    });

    assert!(registry.is_empty());
}

#[test]
#[should_panic(expected = "no pending completion")]
fn extracting_unknown_tag_panics() {
    let (registry, _stats) = registry();
    let _ = registry.extract(Tag::from_raw(0xdead_beef).unwrap());
}

#[test]
#[should_panic(expected = "no pending completion")]
fn extracting_twice_panics() {
    let (registry, _stats) = registry();
    let tag = registry.register_batch_completion(BatchContext::new(), |_, _, ()| {}, ());
    let _first = registry.extract(tag);
    let _ = registry.extract(tag);
}

#[test]
fn concurrent_registration_on_distinct_tags() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 1_000;

    let (registry, stats) = registry();
    let delivered = Arc::new(AtomicUsize::new(0));

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let tags: Vec<Tag> = (0..PER_THREAD)
                    .map(|_| {
                        registry.register_batch_completion(
                            BatchContext::new(),
                            |_, _, delivered: Arc<AtomicUsize>| {
                                delivered.fetch_add(1, Ordering::Relaxed);
                            },
                            Arc::clone(&delivered),
                        )
                    })
                    .collect();
                for tag in tags {
                    registry.extract(tag).invoke(true);
                }
            });
        }
    });

    assert_eq!(delivered.load(Ordering::Relaxed), THREADS * PER_THREAD);
    assert!(registry.is_empty());
    assert_eq!(stats.pending_batch_completions(), 0);
}
