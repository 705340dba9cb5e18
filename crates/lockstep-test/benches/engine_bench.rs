//! Benchmarks for the safe-advance calculator and the stepper

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lockstep_core::{Event, SessionId, SimState, VirtualTime};
use lockstep_engine::{calculate_safe_advance_point, calculate_safe_zone, Engine};
use lockstep_test::{amount_payload, CounterExtension, CounterWorld};
use lockstep_wire::Value;

fn populated_state(sessions: u64, events_per_session: u64) -> SimState<()> {
    let mut state = SimState::new(());
    state.clock = VirtualTime::new(events_per_session + 1);
    for session in 1..=sessions {
        state.session_ids.insert(SessionId::new(session));
        for vt in 0..events_per_session {
            state.enqueue(Event::custom(
                SessionId::new(session),
                VirtualTime::new(vt),
                Value::Null,
            ));
        }
    }
    state
}

fn bench_safe_zone(c: &mut Criterion) {
    let state = populated_state(16, 64);

    c.bench_function("safe_zone_16_sessions_1k_events", |b| {
        b.iter(|| black_box(calculate_safe_zone(black_box(&state))))
    });
}

fn bench_safe_advance_point(c: &mut Criterion) {
    let state = populated_state(64, 4);
    let zone = calculate_safe_zone(&state);

    c.bench_function("safe_advance_point_64_sessions", |b| {
        b.iter(|| black_box(calculate_safe_advance_point(black_box(&zone))))
    });
}

fn bench_advance_to(c: &mut Criterion) {
    let engine = Engine::new().with_extension(CounterExtension);

    c.bench_function("advance_1k_ticks_with_events", |b| {
        b.iter(|| {
            let mut state = SimState::new(CounterWorld::new(5));
            state.clock = VirtualTime::new(1_000);
            state.session_ids.insert(SessionId::new(1));
            for vt in (0..1_000).step_by(10) {
                state.enqueue(Event::custom(
                    SessionId::new(1),
                    VirtualTime::new(vt),
                    amount_payload(1),
                ));
            }
            engine.advance_to(&mut state, VirtualTime::new(1_000));
            black_box(state.data.total)
        })
    });
}

fn bench_snapshot_roundtrip(c: &mut Criterion) {
    let engine = Engine::new().with_extension(CounterExtension);
    let mut state = SimState::new(CounterWorld::new(5));
    state.clock = VirtualTime::new(200);
    state.session_ids.insert(SessionId::new(1));
    for vt in 0..100 {
        state.enqueue(Event::custom(
            SessionId::new(1),
            VirtualTime::new(vt),
            amount_payload(1),
        ));
    }
    engine.advance_to(&mut state, VirtualTime::new(50));

    c.bench_function("snapshot_roundtrip_mid_history", |b| {
        b.iter(|| black_box(state.replicate().unwrap()))
    });
}

criterion_group!(
    benches,
    bench_safe_zone,
    bench_safe_advance_point,
    bench_advance_to,
    bench_snapshot_roundtrip
);
criterion_main!(benches);
