use crate::algebra::{RingElement, Z32, Z64};
use crate::preprocessing::{Demand, RandomnessKind};
use crate::sharing::SharedTensor;
use crate::simulation::{LocalEngine, Simulation};
use crate::transport::testing::Tampered;
use crate::transport::{LocalNetwork, LocalTransport, Transport};
use crate::*;

use std::collections::HashSet;

use rand::{thread_rng, Rng};

type Cheating = Tampered<LocalTransport, fn(u64, &mut Vec<u8>)>;

fn honest(_: u64, _: &mut Vec<u8>) {}

// flips the low bit of the first value party 1 sends in its first opening
fn flip_first_opening(round: u64, payload: &mut Vec<u8>) {
    if round == 0 {
        payload[8] ^= 1;
    }
}

fn cheating_network(parties: usize) -> Vec<Cheating> {
    LocalNetwork::new(parties)
        .into_iter()
        .map(|t| {
            let tamper: fn(u64, &mut Vec<u8>) = if t.party() == 1 {
                flip_first_opening
            } else {
                honest
            };
            Tampered::new(t, tamper)
        })
        .collect()
}

fn simulation(config: BoundConfig, parties: usize) -> Simulation<Z64> {
    Simulation::new(config, parties, b"end to end").unwrap()
}

fn unanimous<O: PartialEq + std::fmt::Debug>(results: Vec<Result<O>>) -> O {
    let mut results = results.into_iter().map(|r| r.unwrap());
    let first = results.next().unwrap();
    for other in results {
        assert_eq!(other, first);
    }
    first
}

#[test]
fn test_multiply_within_one_ulp() {
    let mut rng = thread_rng();
    let a_reals: Vec<f64> = (0..50).map(|_| rng.gen_range(-100.0..100.0)).collect();
    let b_reals: Vec<f64> = (0..50).map(|_| rng.gen_range(-100.0..100.0)).collect();

    let mut sim = simulation(BoundConfig::default(), 3);
    let a = sim.share_reals(vec![50], &a_reals).unwrap();
    let b = sim.share_reals(vec![50], &b_reals).unwrap();
    let codec = FixedPoint::new(sim.config().float_precision);

    let results = sim
        .run(&Demand::new(), |engine| {
            let p = engine.party();
            let product = engine.multiply(a.part(p), b.part(p))?;
            engine.reveal(&product)
        })
        .unwrap();

    let revealed = unanimous(results);
    for ((x, y), z) in a_reals.iter().zip(b_reals.iter()).zip(revealed) {
        let (x, y): (Z64, Z64) = (codec.encode(*x), codec.encode(*y));
        let exact = (x.as_i128() * y.as_i128()).div_euclid(1 << codec.precision());
        let got = z.as_i128();
        assert!(got == exact || got == exact + 1, "{} vs {}", got, exact);
    }
}

#[test]
fn test_compare_select_relu() {
    let mut sim = simulation(BoundConfig::default(), 3);
    let x = sim.share_reals(vec![5], &[-1.5, 0.0, 2.25, 1000.0, -0.5]).unwrap();
    let y = sim.share_reals(vec![5], &[0.5, 0.0, 2.0, 999.75, -0.25]).unwrap();

    let results = sim
        .run(&Demand::new(), |engine| {
            let p = engine.party();
            let (x, y) = (x.part(p), y.part(p));
            let ge = engine.compare(x, y)?;
            let min = engine.select(&ge, y, x)?;
            let relu = engine.relu(x)?;
            Ok((
                engine.reveal(&ge)?,
                engine.reveal_reals(&min)?,
                engine.reveal_reals(&relu)?,
            ))
        })
        .unwrap();

    let (ge, min, relu) = unanimous(results);
    let bits: Vec<u64> = ge.iter().map(|b| b.as_u64()).collect();
    assert_eq!(bits, vec![0, 1, 1, 1, 0]);
    assert_eq!(min, vec![-1.5, 0.0, 2.0, 999.75, -0.5]);
    assert_eq!(relu, vec![0.0, 0.0, 2.25, 1000.0, 0.0]);
}

#[test]
fn test_tampered_opening_detected_by_everyone() {
    let mut sim = simulation(BoundConfig::default(), 3);
    let a = sim.share_reals(vec![2], &[1.0, 2.0]).unwrap();
    let b = sim.share_reals(vec![2], &[3.0, 4.0]).unwrap();

    let results = sim
        .run_with(
            &Demand::new(),
            cheating_network(3),
            |engine: &mut LocalEngine<Z64, Cheating>| {
                let p = engine.party();
                let product = engine.multiply(a.part(p), b.part(p));
                let after = engine.add(a.part(p), b.part(p));
                Ok((product.err(), after.err(), engine.is_aborted()))
            },
        )
        .unwrap();

    assert_eq!(results.len(), 3);
    for result in results {
        let (product, after, aborted) = result.unwrap();
        assert!(
            matches!(
                product,
                Some(Error::MaliciousDeviationDetected {
                    check: Check::PerOperation,
                    ..
                })
            ),
            "{:?}",
            product
        );
        assert!(matches!(after, Some(Error::Aborted)));
        assert!(aborted);
    }
}

#[test]
fn test_small_deviations_accumulate_over_batch() {
    let config = BoundConfig {
        rogue_bound: u64::MAX,
        gforce_bound: 1,
        ..Default::default()
    };
    let mut sim = simulation(config, 3);
    let a = sim.share_reals(vec![2], &[1.0, 2.0]).unwrap();
    let b = sim.share_reals(vec![2], &[3.0, 4.0]).unwrap();

    let results = sim
        .run_with(
            &Demand::new(),
            cheating_network(3),
            |engine: &mut LocalEngine<Z64, Cheating>| {
                let p = engine.party();
                // passes the per-operation check
                engine.multiply(a.part(p), b.part(p))?;
                Ok(engine.end_batch().err())
            },
        )
        .unwrap();

    for result in results {
        assert!(matches!(
            result.unwrap(),
            Some(Error::MaliciousDeviationDetected {
                check: Check::Accumulated,
                bound: 1,
                ..
            })
        ));
    }
}

#[test]
fn test_preloaded_pool_runs_out() {
    let config = BoundConfig {
        enable_offline_randomness: true,
        ..Default::default()
    };
    let mut sim = simulation(config, 2);
    let a = sim.share(vec![4], &[Z64(1), Z64(2), Z64(3), Z64(4)]).unwrap();

    let mut demand = Demand::new();
    demand.multiply_integer(2);
    let results = sim
        .run(&demand, |engine| {
            let p = engine.party();
            let result = engine.multiply_integer(a.part(p), a.part(p));
            let after = engine.add(a.part(p), a.part(p));
            Ok((result.err(), after.err(), engine.is_aborted()))
        })
        .unwrap();

    for result in results {
        let (err, after, aborted) = result.unwrap();
        match err {
            Some(Error::RandomnessExhausted { kind, served }) => {
                assert_eq!(kind, RandomnessKind::Triple);
                assert_eq!(served, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(after, Some(Error::Aborted)));
        assert!(aborted);
    }
}

#[test]
fn test_truncation_runs_out_after_beaver_round() {
    let config = BoundConfig {
        enable_offline_randomness: true,
        ..Default::default()
    };
    let mut sim = simulation(config, 2);
    let a = sim.share_reals(vec![2], &[1.0, 2.0]).unwrap();

    // triples and reveal masks, but no truncation pairs
    let mut demand = Demand::new();
    demand.multiply_integer(2).reveal(2);
    let results = sim
        .run(&demand, |engine| {
            let p = engine.party();
            let product = engine.multiply(a.part(p), a.part(p));
            let revealed = engine.reveal_reals(a.part(p));
            Ok((product.err(), revealed.err(), engine.is_aborted()))
        })
        .unwrap();

    for result in results {
        let (product, revealed, aborted) = result.unwrap();
        assert!(
            matches!(
                product,
                Some(Error::RandomnessExhausted {
                    kind: RandomnessKind::Truncation { shift: 12 },
                    served: 0
                })
            ),
            "{:?}",
            product
        );
        assert!(matches!(revealed, Some(Error::Aborted)));
        assert!(aborted);
    }
}

#[test]
fn test_serials_unique() {
    let mut sim = simulation(BoundConfig::default(), 3);
    let dealer = sim.dealer();
    let kinds = [
        RandomnessKind::Triple,
        RandomnessKind::Truncation { shift: 12 },
        RandomnessKind::Comparison,
        RandomnessKind::InputMask { owner: 2 },
        RandomnessKind::RevealMask,
    ];
    let mut seen = HashSet::new();
    for _ in 0..25 {
        for kind in kinds.iter() {
            let items = dealer.generate(*kind).unwrap();
            let serial = items[0].serial();
            assert!(items.iter().all(|item| item.serial() == serial));
            assert!(seen.insert(serial), "serial {} reused", serial);
        }
    }
    assert_eq!(dealer.served(), 125);
}

#[test]
fn test_epoch_of_ten_batches() {
    let log = 5;
    let config = BoundConfig {
        mini_batch_size: 1 << log,
        log_mini_batch: log,
        ..Default::default()
    };
    let coordinator = BatchCoordinator::new(config.clone());
    let mut sim = simulation(config, 2);
    let ones = vec![1.0; 320];
    let x = sim.share_reals(vec![320, 1], &ones).unwrap();

    let results = sim
        .run(&Demand::new(), |engine| {
            let p = engine.party();
            let mut sums = Vec::new();
            let batches = coordinator.run_epoch(engine, 320, |engine, range| {
                let rows = engine.slice_rows(x.part(p), range)?;
                let sum = engine.sum(&rows)?;
                sums.push(engine.reveal_reals(&sum)?[0]);
                Ok(())
            })?;
            Ok((batches, sums))
        })
        .unwrap();

    let (batches, sums) = unanimous(results);
    assert_eq!(batches, 10);
    assert_eq!(sums, vec![32.0; 10]);
}

#[test]
fn test_update_scaled_exactly() {
    let config = BoundConfig {
        mini_batch_size: 32,
        log_mini_batch: 5,
        log_learning_rate: 3,
        ..Default::default()
    };
    let coordinator = BatchCoordinator::new(config.clone());
    let codec = FixedPoint::from_config(&config);
    assert_eq!(codec.encode::<Z64>(1.5), Z64(6144));

    let mut sim = simulation(config, 3);
    let w = sim.share_reals(vec![1], &[1.5]).unwrap();
    // a batch of 32 gradients of 6.0, scaled by 1/32 and 1/8
    let g = sim.share_reals(vec![1], &[192.0]).unwrap();

    let results = sim
        .run(&Demand::new(), |engine| {
            let p = engine.party();
            let updated = coordinator.apply_update(engine, w.part(p), g.part(p))?;
            engine.reveal_reals(&updated)
        })
        .unwrap();
    assert_eq!(unanimous(results), vec![0.75]);
}

#[test]
fn test_scale_update_by_eighth() {
    let config = BoundConfig {
        log_learning_rate: 3,
        ..Default::default()
    };
    let coordinator = BatchCoordinator::new(config.clone());
    let mut sim = simulation(config, 3);
    // multiples of 8 in fixed point
    let raw = [6144i128, -1536, 0, 8 * 4097, -8];
    let values: Vec<Z64> = raw.iter().map(|v| Z64::from_i128(*v)).collect();
    let u = sim.share(vec![raw.len()], &values).unwrap();

    let results = sim
        .run(&Demand::new(), |engine| {
            let p = engine.party();
            let scaled = coordinator.scale_update(engine, u.part(p))?;
            engine.reveal(&scaled)
        })
        .unwrap();

    let scaled: Vec<i128> = unanimous(results).iter().map(|v| v.as_i128()).collect();
    assert_eq!(scaled, vec![768, -192, 0, 4097, -1]);
}

#[test]
fn test_average_summed_batch() {
    let log = 5;
    let config = BoundConfig {
        mini_batch_size: 1 << log,
        log_mini_batch: log,
        ..Default::default()
    };
    let coordinator = BatchCoordinator::new(config.clone());
    let mut sim = simulation(config, 2);
    // 0, 0.25, ..., 7.75 with mean 3.875
    let gradients: Vec<f64> = (0..32).map(|i| i as f64 * 0.25).collect();
    let g = sim.share_reals(vec![32, 1], &gradients).unwrap();

    let results = sim
        .run(&Demand::new(), |engine| {
            let p = engine.party();
            let sum = engine.sum(g.part(p))?;
            let mean = coordinator.average(engine, &sum)?;
            Ok((engine.reveal_reals(&sum)?, engine.reveal_reals(&mean)?))
        })
        .unwrap();

    let (sum, mean) = unanimous(results);
    assert_eq!(sum, vec![124.0]);
    assert_eq!(mean, vec![3.875]);
}

#[test]
fn test_online_and_preloaded_agree() {
    let reals = [1.5, -2.0, 0.25, 8.0];
    let config = BoundConfig::default();
    let mut demand = Demand::new();
    demand.multiply(&config, 4).relu(&config, 4).reveal(4);

    let run = |offline: bool| {
        let config = BoundConfig {
            enable_offline_randomness: offline,
            ..Default::default()
        };
        let mut sim = simulation(config, 3);
        let a = sim.share_reals(vec![4], &reals).unwrap();
        let results = sim
            .run(&demand, |engine| {
                let p = engine.party();
                let squared = engine.multiply(a.part(p), a.part(p))?;
                let negated = engine.neg(&squared)?;
                let shifted = engine.add(&negated, a.part(p))?;
                let relu = engine.relu(&shifted)?;
                engine.reveal_reals(&relu)
            })
            .unwrap();
        unanimous(results)
    };

    // squares of these values truncate exactly
    let online = run(false);
    assert_eq!(online, vec![0.0, 0.0, 0.1875, 0.0]);
    assert_eq!(run(true), online);
}

#[test]
fn test_preload_then_run_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = BoundConfig {
        enable_offline_randomness: true,
        preload_path: dir.path().to_path_buf(),
        ..Default::default()
    };
    let mut demand = Demand::new();
    demand.multiply(&config, 3).reveal(3);

    let paths = simulation(config.clone(), 2).preload(&demand).unwrap();
    assert_eq!(paths.len(), 2);

    let mut sim = simulation(config, 2);
    let a = sim.share_reals(vec![3], &[0.5, -3.0, 2.0]).unwrap();
    let results = sim
        .run_preloaded(dir.path(), |engine| {
            let p = engine.party();
            let squared = engine.multiply(a.part(p), a.part(p))?;
            engine.reveal_reals(&squared)
        })
        .unwrap();
    assert_eq!(unanimous(results), vec![0.25, 9.0, 4.0]);

    let other = Simulation::<Z64>::new(BoundConfig::default(), 2, b"another seed").unwrap();
    assert!(matches!(
        other.run_preloaded(dir.path(), |engine| Ok(engine.party())),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_export_delta_after_update() {
    let config = BoundConfig {
        mini_batch_size: 32,
        log_mini_batch: 5,
        log_learning_rate: 1,
        ..Default::default()
    };
    let coordinator = BatchCoordinator::new(config.clone());
    let mut sim = simulation(config, 3);
    // the delta ring is authenticated under alpha mod 2^64
    let key = Z64(sim.dealer().mac_key().as_u64());
    let w = sim.share_reals(vec![2], &[0.0, 1.0]).unwrap();
    let g = sim.share_reals(vec![2], &[64.0, -64.0]).unwrap();

    let results = sim
        .run(&Demand::new(), |engine| {
            let p = engine.party();
            let updated = coordinator.apply_update(engine, w.part(p), g.part(p))?;
            coordinator.export_delta::<Z64, Z32>(&updated)
        })
        .unwrap();

    let parts = results.into_iter().map(|r| r.unwrap()).collect();
    let delta = SharedTensor::new(parts).unwrap();
    // 0 - 64 / 64 and 1 + 64 / 64
    assert_eq!(
        delta.reconstruct().unwrap(),
        vec![Z32::from_i128(-4096), Z32(2 * 4096)]
    );
    assert!(delta.macs_hold(key));
}
