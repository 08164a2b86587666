//! Adaptor behaviour: transformation laws, channel routing, boundaries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strand::{
    bulk, bulk_chunked, bulk_unchunked, just, just_error, just_stopped, sync_wait, when_all,
    when_all3, when_all_vec, Error, Policy, SenderExt,
};

#[test]
fn then_identity_preserves_the_value() {
    assert_eq!(sync_wait(just(17).then(|x| x)).unwrap(), Some(17));
}

#[test]
fn then_chains_left_to_right() {
    let sender = just(2).then(|x| x + 3).then(|x| x * 10);
    assert_eq!(sync_wait(sender).unwrap(), Some(50));
}

#[test]
fn then_void_result_yields_unit() {
    let sender = just(5).then(|_| ());
    assert_eq!(sync_wait(sender).unwrap(), Some(()));
}

#[test]
fn panic_in_then_reaches_the_error_channel() {
    let err = sync_wait(just(1).then(|_| -> i32 { panic!("mapper died") })).unwrap_err();
    assert!(err.is_panic());
    assert_eq!(err.context(), Some("mapper died"));
}

#[test]
fn upon_error_unwraps_the_seeded_error() {
    let sender = just_error::<String>(Error::user("seed"))
        .upon_error(|e| e.context().unwrap_or_default().to_owned());
    assert_eq!(sync_wait(sender).unwrap(), Some("seed".to_owned()));
}

#[test]
fn upon_stopped_replaces_stop() {
    let sender = just_stopped::<i32>().upon_stopped(|| -1);
    assert_eq!(sync_wait(sender).unwrap(), Some(-1));
}

#[test]
fn let_value_binding_is_observationally_transparent() {
    // sender.let_value(just) ≈ sender for value completions.
    let direct = sync_wait(just(9)).unwrap();
    let bound = sync_wait(just(9).let_value(strand::just)).unwrap();
    assert_eq!(direct, bound);
}

#[test]
fn let_error_recovery_runs_a_full_pipeline() {
    let sender = just_error::<i32>(Error::user("gone"))
        .let_error(|_| just(20).then(|x| x + 1));
    assert_eq!(sync_wait(sender).unwrap(), Some(21));
}

#[test]
fn let_stopped_fallback_pipeline() {
    let sender = just_stopped::<i32>().let_stopped(|| just(4));
    assert_eq!(sync_wait(sender).unwrap(), Some(4));
}

#[test]
fn bulk_zero_shape_forwards_untouched() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = Arc::clone(&calls);
    let sender = just(3).bulk(Policy::Par, 0, move |_, _| {
        calls2.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(sync_wait(sender).unwrap(), Some(3));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn bulk_unchunked_seq_runs_in_index_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    let sender = just(()).bulk_unchunked(Policy::Seq, 8, move |i, _| {
        seen2.lock().unwrap().push(i);
    });
    sync_wait(sender).unwrap();
    assert_eq!(*seen.lock().unwrap(), (0..8).collect::<Vec<_>>());
}

#[test]
fn bulk_unchunked_par_covers_every_index_exactly_once() {
    let counts = Arc::new((0..32).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
    let counts2 = Arc::clone(&counts);
    let sender = just(()).bulk_unchunked(Policy::Par, 32, move |i, _| {
        counts2[i].fetch_add(1, Ordering::SeqCst);
    });
    sync_wait(sender).unwrap();
    assert!(counts.iter().all(|c| c.load(Ordering::SeqCst) == 1));
}

#[test]
fn bulk_chunked_partitions_are_contiguous_and_cover() {
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let chunks2 = Arc::clone(&chunks);
    let sender = just(()).bulk_chunked(Policy::ParUnseq, 97, move |begin, end, _| {
        chunks2.lock().unwrap().push((begin, end));
    });
    sync_wait(sender).unwrap();

    let mut chunks = chunks.lock().unwrap().clone();
    chunks.sort_unstable();
    assert!(!chunks.is_empty());
    assert_eq!(chunks.first().unwrap().0, 0);
    assert_eq!(chunks.last().unwrap().1, 97);
    for window in chunks.windows(2) {
        assert_eq!(window[0].1, window[1].0, "gap or overlap between chunks");
    }
}

#[test]
fn bulk_free_functions_match_the_methods() {
    let a = sync_wait(bulk(just(1), Policy::Seq, 2, |_, _| {})).unwrap();
    let b = sync_wait(bulk_chunked(just(1), Policy::Seq, 2, |_, _, _| {})).unwrap();
    let c = sync_wait(bulk_unchunked(just(1), Policy::Seq, 2, |_, _| {})).unwrap();
    assert_eq!((a, b, c), (Some(1), Some(1), Some(1)));
}

#[test]
fn when_all_aggregates_in_declaration_order() {
    assert_eq!(
        sync_wait(when_all3(just(1), just(2), just(3))).unwrap(),
        Some((1, 2, 3))
    );
}

#[test]
fn when_all_mixed_types() {
    let sender = when_all(just("id"), just(9_u64));
    assert_eq!(sync_wait(sender).unwrap(), Some(("id", 9)));
}

#[test]
fn when_all_first_failure_wins() {
    let sender = when_all(just_error::<i32>(Error::user("lhs")), just(2));
    assert_eq!(sync_wait(sender).unwrap_err().context(), Some("lhs"));
}

#[test]
fn when_all_empty_vec_is_immediate() {
    let sender = when_all_vec(Vec::<strand::factories::Just<u8>>::new());
    assert_eq!(sync_wait(sender).unwrap(), Some(Vec::new()));
}

#[test]
fn adaptors_compose_across_channels() {
    // Error recovery inside a let_value binding, then a final map.
    let sender = just(10)
        .let_value(|x| {
            just_error::<i32>(Error::user("inner"))
                .upon_error(move |_| x * 2)
        })
        .then(|x| x + 1);
    assert_eq!(sync_wait(sender).unwrap(), Some(21));
}
