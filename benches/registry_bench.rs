// Benchmark for the registry paths the web UI polls
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use gpio_stepper::board::Board;
use gpio_stepper::config::PulseSettings;
use gpio_stepper::hardware::SimulatedActuator;
use gpio_stepper::{ConfigStore, ConfigurationDocument, MotorRegistry, PinAssignment};
use std::sync::Arc;

fn registry_with_motors(dir: &std::path::Path, motors: u8) -> MotorRegistry {
    let doc = (0..motors).fold(ConfigurationDocument::empty(), |doc, i| {
        doc.with_motor(&format!("motor{}", i + 1), PinAssignment::new(i * 2, i * 2 + 1))
    });
    let store = ConfigStore::new(dir.join("motor_config.json"), Board::raspberry_pi());
    store.save(&doc).unwrap();
    let pulse = PulseSettings { min_half_period_us: 0, ..PulseSettings::default() };
    MotorRegistry::new(store, Arc::new(SimulatedActuator::new()), pulse)
}

fn bench_status_snapshot(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with_motors(dir.path(), 14);
    c.bench_function("status snapshot (14 motors)", |b| {
        b.iter(|| {
            let status = registry.status();
            assert_eq!(status.len(), 14);
        });
    });
}

fn bench_pin_usage(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with_motors(dir.path(), 14);
    c.bench_function("pin usage report (28 pins)", |b| {
        b.iter(|| {
            let usage = registry.board().usage(&registry.document());
            assert_eq!(usage.iter().filter(|p| p.in_use).count(), 28);
        });
    });
}

fn bench_step_pulses(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with_motors(dir.path(), 2);
    let rt = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("step 100 pulses (zero half period)", |b| {
        b.iter(|| {
            rt.block_on(async {
                registry
                    .step_with_half_period("motor1", gpio_stepper::Direction::Forward, 100, Some(0))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_status_snapshot, bench_pin_usage, bench_step_pulses);
criterion_main!(benches);
