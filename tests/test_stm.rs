// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use rand::{distributions::Bernoulli, prelude::Distribution, Rng};
use std::collections::HashSet;
use threadpool::ThreadPool;
use tl2_stm::Stm;

#[allow(unused_imports)]
use log::*;

#[cfg(feature = "verbose")]
fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

#[cfg(not(feature = "verbose"))]
fn init_logging() {}

#[test]
fn test_stm_basic() {
    init_logging();

    let stm = Stm::default();

    let bank_alice = stm.create(10usize);
    let bank_bob = stm.create(100usize);
    let bank_charly = stm.create(0usize);

    let ba = bank_alice.clone();
    let bb = bank_bob.clone();
    let bc = bank_charly.clone();

    let transfer_bob_charly = 30;
    let alice_bonus = 40;
    let result = stm.atomically(move |tx| {
        let mut amt_alice = tx.read(&ba);
        let mut amt_bob = tx.read(&bb);
        let mut amt_charly = tx.read(&bc);
        amt_alice += alice_bonus;
        amt_bob -= transfer_bob_charly;
        amt_charly += transfer_bob_charly;

        tx.write(&ba, amt_alice);
        tx.write(&bb, amt_bob);
        tx.write(&bc, amt_charly);
    });

    assert!(result.is_ok(), "Transaction failed");

    assert_eq!(bank_alice.read_atomic(), 50);
    assert_eq!(bank_bob.read_atomic(), 70);
    assert_eq!(bank_charly.read_atomic(), 30);
}

#[test]
fn test_stm_threaded_one_tvar() {
    init_logging();

    let stm = Stm::default();
    let entries: usize = 1000;

    // Bernoulli distribution over reads vs read/write transactions.
    let distribution = Bernoulli::new(0.7).unwrap();

    let mut expected: HashSet<String> = (0..entries).map(|e: usize| format!("{:04}", e)).collect();

    let set = stm.create(HashSet::<String>::new());
    let pool = ThreadPool::new(8);

    let mut removal = HashSet::new();

    for value in expected.iter() {
        let stm_a = stm.clone();
        let set_a = set.clone();
        let value = value.clone();

        let read_percent = distribution.sample(&mut rand::thread_rng());

        // We store the value that won't be written.
        if read_percent {
            removal.insert(value.clone());
        }

        pool.execute(move || {
            let result = match read_percent {
                false => stm_a.atomically(move |tx| {
                    let mut inner = tx.read(&set_a);
                    inner.insert(value.clone());
                    tx.write(&set_a, inner);
                }),
                true => stm_a.atomically(move |tx| {
                    let _inner = tx.read(&set_a);
                }),
            };

            assert!(result.is_ok(), "Failed to run transaction");
        });
    }

    pool.join();

    for value in removal.iter() {
        expected.remove(value);
    }

    let actual = set.read_atomic();

    assert!(
        expected == actual,
        "Actual collection is not equal to expected collection: missing {:?}",
        expected.symmetric_difference(&actual)
    );
}

#[test]
fn test_multiple_readers_single_writer_single_thread() {
    const EXPECTED: usize = 15usize;

    let stm = Stm::default();

    let tvar = stm.create(6usize);

    let tvar1 = tvar.clone();
    let stm1 = stm.clone();

    stm1.atomically(move |tx| {
        let data = tx.read(&tvar1);
        tx.write(&tvar1, data + 9);
    })
    .unwrap();

    for _ in 0..10000 {
        let tvar1 = tvar.clone();
        let stm1 = stm.clone();

        let result = stm1.atomically(move |tx| tx.read(&tvar1));
        assert_eq!(result.unwrap(), EXPECTED);
    }

    assert_eq!(tvar.read_atomic(), EXPECTED);
}

// Additional tests adapted from the paper:
// "Testing patterns for software transactional memory engines"
// (https://www.researchgate.net/publication/220854689)

// High frequency of variables being added/removed from the transactional space.
#[test]
fn test_paper_1() {
    const NB_MSG: usize = 5000;
    let msg_in_the_list = "In the vec";

    let stm = Stm::default();
    let init_v = vec![String::from(msg_in_the_list); NB_MSG];
    let tvar = stm.create(init_v);

    let tvar1 = tvar.clone();
    let stm1 = stm.clone();
    let tvar2 = tvar.clone();
    let stm2 = stm.clone();

    let reader = std::thread::spawn(move || loop {
        let tvar = tvar1.clone();
        let is_empty = stm1.atomically(move |tx| {
            let v: Vec<String> = tx.read(&tvar);
            for s in v.iter() {
                assert_eq!(*s, String::from(msg_in_the_list));
            }
            v.is_empty()
        });

        if is_empty.unwrap() {
            break;
        }
    });

    let writer = std::thread::spawn(move || {
        for _ in 0..NB_MSG {
            let tvar = tvar2.clone();
            stm2.atomically(move |tx| {
                let mut v: Vec<String> = tx.read(&tvar);
                let rand_index = rand::thread_rng().gen_range(0..v.len());
                let mut s = v.remove(rand_index);
                s.clear();
                tx.write(&tvar, v);
            })
            .unwrap();
        }
    });

    reader.join().expect("reader panicked");
    writer.join().expect("writer panicked");

    assert!(tvar.read_atomic().is_empty());
}

// High number of transactions on a single tvar to force a lot of abort/restart.
#[test]
fn test_paper_2() {
    const SIZE: usize = 100;
    const NB_ITER: usize = 500;
    const NB_THREADS: usize = 16;

    let stm = Stm::default();
    let init_v: Vec<usize> = vec![0; SIZE];
    let tvar = stm.create(init_v);

    let handles: Vec<_> = (0..NB_THREADS)
        .map(|_| {
            let tvar1 = tvar.clone();
            let stm1 = stm.clone();
            std::thread::spawn(move || {
                for _ in 0..NB_ITER {
                    let tvar2 = tvar1.clone();
                    stm1.atomically(move |tx| {
                        let mut vec: Vec<usize> = tx.read(&tvar2);
                        for v in vec.iter_mut() {
                            *v += 1;
                        }
                        tx.write(&tvar2, vec);
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    assert_eq!(tvar.read_atomic(), vec![NB_THREADS * NB_ITER; SIZE]);
}

// High number of transactional variables to check that collisions in the
// read/write logs' HashMap/HashSet are highly improbable.
#[test]
fn test_paper_3() {
    const NB_TVAR: usize = 5000;
    const NB_THREADS: usize = 10;

    let stm = Stm::default();
    let init_v: Vec<_> = (0..NB_TVAR).map(|_| stm.create(0usize)).collect();

    let handles: Vec<_> = (0..NB_THREADS)
        .map(|_| {
            let stm1 = stm.clone();
            let vector = init_v.clone();
            std::thread::spawn(move || {
                stm1.atomically(move |tx| {
                    for tvar in &vector {
                        let v: usize = tx.read(tvar);
                        tx.write(tvar, v + 1);
                    }
                })
                .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    for tvar in init_v.iter() {
        assert_eq!(tvar.read_atomic(), NB_THREADS);
    }
}
